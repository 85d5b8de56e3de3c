use tracing::warn;

use crate::error::SessionError;
use crate::items::SafetyCheck;
use crate::prompt::Prompter;

/// Walks every pending check past the human. A single refusal aborts with
/// [`SessionError::SafetyCheckRejected`]; no partial acknowledgment is carried
/// forward. Runs after the action has already executed, so consent only
/// controls whether the result is acknowledged into history.
pub async fn acknowledge_all(
    prompter: &dyn Prompter,
    checks: &[SafetyCheck],
) -> Result<Vec<SafetyCheck>, SessionError> {
    for check in checks {
        if !prompter.confirm(&check.message).await? {
            warn!(code = %check.code, "safety check declined");
            return Err(SessionError::SafetyCheckRejected(check.message.clone()));
        }
    }
    Ok(checks.to_vec())
}

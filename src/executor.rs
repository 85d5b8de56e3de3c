//! Executes one action directive against the capability and assembles the
//! call-output record that answers it.

use tracing::info;

use crate::computer::Computer;
use crate::error::SessionError;
use crate::items::{Action, Item, Observation, SafetyCheck};
use crate::policy::UrlPolicy;
use crate::prompt::Prompter;
use crate::safety;

/// Runs `action`, captures the post-action observation, gates it through the
/// pending safety checks, and returns a `computer_call_output` answering
/// `call_id`: always the id passed in, never the originating call's own id.
/// The critique path relies on that to replay under a substituted id.
///
/// Non-idempotent: the action really happens, and re-invoking for a modified
/// action performs it again rather than undoing the previous one.
pub async fn execute_call(
    computer: &dyn Computer,
    prompter: &dyn Prompter,
    policy: &UrlPolicy,
    action: &Action,
    pending_checks: &[SafetyCheck],
    call_id: &str,
) -> Result<Item, SessionError> {
    info!(call_id, ?action, "executing action");
    dispatch(computer, action).await?;

    let shot = computer.screenshot().await?;
    let acknowledged = safety::acknowledge_all(prompter, pending_checks).await?;

    let mut output = Observation::screenshot(&shot);
    if computer.environment().is_url_addressable() {
        let location = computer.current_url().await?;
        output.current_url = Some(location.clone());
        policy.check(&location)?;
    }

    Ok(Item::ComputerCallOutput {
        call_id: call_id.to_string(),
        acknowledged_safety_checks: acknowledged,
        output,
    })
}

async fn dispatch(computer: &dyn Computer, action: &Action) -> Result<(), SessionError> {
    match action {
        Action::Click { x, y, button } => {
            computer
                .click(*x, *y, button.as_deref().unwrap_or("left"))
                .await
        }
        Action::DoubleClick { x, y } => computer.double_click(*x, *y).await,
        Action::Move { x, y } => computer.move_mouse(*x, *y).await,
        Action::Scroll {
            x,
            y,
            scroll_x,
            scroll_y,
        } => computer.scroll(*x, *y, *scroll_x, *scroll_y).await,
        Action::Type { text } => computer.type_text(text).await,
        Action::Keypress { keys } => computer.keypress(keys).await,
        Action::Drag { path } => computer.drag(path).await,
        Action::Wait => computer.wait().await,
        // the observation is captured right after dispatch regardless
        Action::Screenshot => Ok(()),
        Action::Goto { url } => computer.goto(url).await,
        Action::Back => computer.back().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeComputer, ScriptedPrompter};

    fn check(message: &str) -> SafetyCheck {
        SafetyCheck {
            id: "sc".into(),
            code: "irreversible".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn output_answers_the_passed_call_id_not_the_calls_own() {
        let computer = FakeComputer::browser("https://example.com/page");
        let prompter = ScriptedPrompter::new(vec![], vec![]);
        // the directive originally belonged to some other call; the executor
        // must answer with the id it was handed
        let out = execute_call(
            &computer,
            &prompter,
            &UrlPolicy::default(),
            &Action::Click {
                x: 3,
                y: 4,
                button: None,
            },
            &[],
            "orig-7",
        )
        .await
        .unwrap();
        assert_eq!(out.call_id(), Some("orig-7"));
        assert!(computer.invoked().contains(&"click 3,4 left".to_string()));
    }

    #[tokio::test]
    async fn declined_check_fails_closed_with_no_output() {
        let computer = FakeComputer::browser("https://example.com");
        let prompter = ScriptedPrompter::new(vec![], vec![false]);
        let err = execute_call(
            &computer,
            &prompter,
            &UrlPolicy::default(),
            &Action::Type {
                text: "rm -rf".into(),
            },
            &[check("typing into a terminal")],
            "c1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::SafetyCheckRejected(_)));
        // the side effect did happen before the gate; only acknowledgment is refused
        assert!(computer.invoked().iter().any(|c| c.starts_with("type")));
    }

    #[tokio::test]
    async fn acknowledged_checks_are_echoed_in_the_output() {
        let computer = FakeComputer::browser("https://example.com");
        let prompter = ScriptedPrompter::new(vec![], vec![true]);
        let out = execute_call(
            &computer,
            &prompter,
            &UrlPolicy::default(),
            &Action::Wait,
            &[check("waiting is dangerous")],
            "c1",
        )
        .await
        .unwrap();
        match out {
            Item::ComputerCallOutput {
                acknowledged_safety_checks,
                ..
            } => {
                assert_eq!(acknowledged_safety_checks.len(), 1);
                assert_eq!(acknowledged_safety_checks[0].message, "waiting is dangerous");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn browser_environment_records_and_polices_location() {
        let computer = FakeComputer::browser("https://evilvideos.com/watch");
        let prompter = ScriptedPrompter::new(vec![], vec![]);
        let err = execute_call(
            &computer,
            &prompter,
            &UrlPolicy::default(),
            &Action::Wait,
            &[],
            "c1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::BlockedUrl(_)));
    }

    #[tokio::test]
    async fn non_browser_environment_skips_location_entirely() {
        let computer = FakeComputer::desktop();
        let prompter = ScriptedPrompter::new(vec![], vec![]);
        let out = execute_call(
            &computer,
            &prompter,
            &UrlPolicy::default(),
            &Action::Keypress {
                keys: vec!["CTRL".into(), "L".into()],
            },
            &[],
            "c1",
        )
        .await
        .unwrap();
        match out {
            Item::ComputerCallOutput { output, .. } => assert!(output.current_url.is_none()),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(!computer.invoked().contains(&"current_url".to_string()));
    }

    #[tokio::test]
    async fn screenshot_action_only_captures_the_observation() {
        let computer = FakeComputer::browser("https://example.com");
        let prompter = ScriptedPrompter::new(vec![], vec![]);
        execute_call(
            &computer,
            &prompter,
            &UrlPolicy::default(),
            &Action::Screenshot,
            &[],
            "c1",
        )
        .await
        .unwrap();
        assert_eq!(
            computer
                .invoked()
                .iter()
                .filter(|c| *c == "screenshot")
                .count(),
            1
        );
    }
}

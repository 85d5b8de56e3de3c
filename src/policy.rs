use url::Url;

use crate::error::SessionError;

/// Deny-list over hostnames, matched exactly or as a parent domain. Checked
/// against the post-action location of URL-addressable environments.
#[derive(Clone, Debug)]
pub struct UrlPolicy {
    blocked_domains: Vec<String>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::new(
            [
                "maliciousbook.com",
                "evilvideos.com",
                "darkwebforum.com",
                "shadytok.com",
                "suspiciouspins.com",
            ]
            .into_iter()
            .map(String::from),
        )
    }
}

impl UrlPolicy {
    pub fn new(blocked_domains: impl IntoIterator<Item = String>) -> Self {
        Self {
            blocked_domains: blocked_domains.into_iter().collect(),
        }
    }

    pub fn check(&self, raw: &str) -> Result<(), SessionError> {
        let host = Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default();
        let hit = self
            .blocked_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")));
        if hit {
            return Err(SessionError::BlockedUrl(raw.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_domain_is_blocked() {
        let policy = UrlPolicy::default();
        assert!(matches!(
            policy.check("https://evilvideos.com/watch"),
            Err(SessionError::BlockedUrl(_))
        ));
    }

    #[test]
    fn subdomain_is_blocked() {
        let policy = UrlPolicy::default();
        assert!(policy.check("http://cdn.shadytok.com/").is_err());
    }

    #[test]
    fn unrelated_host_passes() {
        let policy = UrlPolicy::default();
        assert!(policy.check("https://example.com/evilvideos.com").is_ok());
        // suffix of the name without a dot boundary is a different domain
        assert!(policy.check("https://notevilvideos.com/").is_ok());
    }

    #[test]
    fn hostless_urls_pass() {
        let policy = UrlPolicy::default();
        assert!(policy.check("about:blank").is_ok());
        assert!(policy.check("not a url").is_ok());
    }

    #[test]
    fn custom_list_applies() {
        let policy = UrlPolicy::new(vec!["internal.test".to_string()]);
        assert!(policy.check("https://internal.test/admin").is_err());
        assert!(policy.check("https://evilvideos.com/").is_ok());
    }
}

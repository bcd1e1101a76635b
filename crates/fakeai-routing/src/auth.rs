//! API-key authentication against a configured allowlist.
//!
//! Keys are compared verbatim — the spec's non-goals explicitly exclude
//! cryptographic strength of API keys or request ids.

use std::collections::HashSet;

use fakeai_core::error::Error;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub allowlist: HashSet<String>,
    pub require_api_key: bool,
}

impl AuthConfig {
    pub fn new(allowlist: impl IntoIterator<Item = String>, require_api_key: bool) -> Self {
        Self { allowlist: allowlist.into_iter().collect(), require_api_key }
    }

    /// Parses a key file: non-empty lines that don't start with `#` are keys.
    pub fn from_key_file_contents(contents: &str, require_api_key: bool) -> Self {
        let allowlist = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { allowlist, require_api_key }
    }

    /// Authenticates `api_key`. If the allowlist is empty and auth is
    /// disabled, all requests pass.
    pub fn authenticate(&self, api_key: Option<&str>) -> Result<(), Error> {
        if self.allowlist.is_empty() && !self.require_api_key {
            return Ok(());
        }

        let Some(key) = api_key else {
            return Err(Error::MissingApiKey);
        };

        if self.allowlist.contains(key) {
            Ok(())
        } else {
            Err(Error::InvalidApiKey)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_with_auth_disabled_passes_all() {
        let config = AuthConfig::new(Vec::new(), false);
        assert!(config.authenticate(None).is_ok());
    }

    #[test]
    fn missing_key_is_rejected_when_required() {
        let config = AuthConfig::new(["sk-valid".to_string()], true);
        assert!(matches!(config.authenticate(None), Err(Error::MissingApiKey)));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let config = AuthConfig::new(["sk-valid".to_string()], true);
        assert!(matches!(config.authenticate(Some("sk-bogus")), Err(Error::InvalidApiKey)));
    }

    #[test]
    fn known_key_passes() {
        let config = AuthConfig::new(["sk-valid".to_string()], true);
        assert!(config.authenticate(Some("sk-valid")).is_ok());
    }

    #[test]
    fn key_file_ignores_comments_and_blank_lines() {
        let contents = "# comment\nsk-a\n\nsk-b\n";
        let config = AuthConfig::from_key_file_contents(contents, true);
        assert_eq!(config.allowlist.len(), 2);
        assert!(config.allowlist.contains("sk-a"));
    }
}

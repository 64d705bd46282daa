//! Git forge configuration.
//!
//! Credentials for a GitHub-compatible REST API plus the list of
//! organisations whose repositories are backed up.

use serde::{Deserialize, Serialize};

/// Forge credentials and the organisations to back up.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    /// Account used for API listing and for the authenticated clone
    /// transport.
    pub username: String,

    /// Password or personal access token for `username`.
    /// Usually supplied via `${FORGE_PASSWORD}` interpolation.
    pub password: String,

    /// Base URL of the forge's REST API.
    /// Default: "https://api.github.com". Point this at a GitHub
    /// Enterprise instance (or a test server) as needed.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Organisations whose repositories are backed up, in order.
    pub organisations: Vec<String>,
}

impl std::fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("username", &self.username)
            .field("password", &"****")
            .field("api_base", &self.api_base)
            .field("organisations", &self.organisations)
            .finish()
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

impl ForgeConfig {
    /// Validate the forge configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_empty() {
            return Err("forge.username cannot be empty".to_string());
        }
        if self.password.is_empty() {
            return Err("forge.password cannot be empty".to_string());
        }
        if self.organisations.iter().any(|org| org.is_empty()) {
            return Err("forge.organisations entries cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_password() {
        let config = ForgeConfig {
            username: "backup-bot".to_string(),
            password: "hunter2".to_string(),
            api_base: default_api_base(),
            organisations: vec!["acme".to_string()],
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("****"));
    }

    #[test]
    fn test_empty_organisation_name_rejected() {
        let config = ForgeConfig {
            username: "backup-bot".to_string(),
            password: "hunter2".to_string(),
            api_base: default_api_base(),
            organisations: vec!["acme".to_string(), String::new()],
        };
        assert!(config.validate().is_err());
    }
}

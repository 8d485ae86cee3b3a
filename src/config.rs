use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const ENV_URL: &str = "MCP_CALDAV_URI";
pub const ENV_USERNAME: &str = "MCP_CALDAV_USERNAME";
pub const ENV_PASSWORD: &str = "MCP_CALDAV_PASSWORD";
pub const ENV_ALLOW_INSECURE: &str = "MCP_CALDAV_ALLOW_INSECURE_CERTS";

/// Connection settings for the CalDAV server.
///
/// Values come from `config.toml` under the platform config directory,
/// with `MCP_CALDAV_*` environment variables taking precedence. MCP hosts
/// typically pass the environment variables in the server registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url: String,
    pub username: String,
    pub password: String,
    pub allow_insecure_certs: bool,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "caldav-mcp", "caldav-mcp")
            .map(|proj| proj.config_dir().join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?.unwrap_or_default();

        if let Ok(v) = env::var(ENV_URL) {
            config.url = v;
        }
        if let Ok(v) = env::var(ENV_USERNAME) {
            config.username = v;
        }
        if let Ok(v) = env::var(ENV_PASSWORD) {
            config.password = v;
        }
        if let Ok(v) = env::var(ENV_ALLOW_INSECURE) {
            config.allow_insecure_certs = matches!(v.as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    fn load_file() -> Result<Option<Self>> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let raw = fs::read_to_string(&path)?;
            return Ok(Some(toml::from_str(&raw)?));
        }
        Ok(None)
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.url.is_empty() {
            missing.push(ENV_URL);
        }
        if self.username.is_empty() {
            missing.push(ENV_USERNAME);
        }
        if self.password.is_empty() {
            missing.push(ENV_PASSWORD);
        }
        if missing.is_empty() {
            return Ok(());
        }
        let file_hint = Self::config_path()
            .map(|p| format!(" or set them in {}", p.display()))
            .unwrap_or_default();
        Err(Error::Config(format!(
            "missing {}; export the environment variable(s){}",
            missing.join(", "),
            file_hint
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_names_missing_variables() {
        let config = Config {
            url: "https://caldav.example.com/".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(ENV_USERNAME));
        assert!(msg.contains(ENV_PASSWORD));
        assert!(!msg.contains(ENV_URL));
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        let config = Config {
            url: "https://caldav.example.com/".to_string(),
            username: "user".to_string(),
            password: "secret".to_string(),
            allow_insecure_certs: false,
        };
        assert!(config.validate().is_ok());
    }
}

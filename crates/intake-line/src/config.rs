use std::env;

use crate::LineError;

pub const DEFAULT_API_BASE: &str = "https://api.line.me";

pub const TOKEN_VAR: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const SECRET_VAR: &str = "LINE_CHANNEL_SECRET";
pub const API_BASE_VAR: &str = "LINE_API_BASE";

/// Channel credentials. Blank values count as unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub channel_access_token: Option<String>,
    pub channel_secret: Option<String>,
    pub api_base: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            channel_secret: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl LineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            channel_access_token: read(TOKEN_VAR),
            channel_secret: read(SECRET_VAR),
            api_base: read(API_BASE_VAR)
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    pub fn access_token(&self) -> Result<&str, LineError> {
        self.channel_access_token
            .as_deref()
            .ok_or(LineError::MissingSetting(TOKEN_VAR))
    }

    pub fn secret(&self) -> Result<&str, LineError> {
        self.channel_secret
            .as_deref()
            .ok_or(LineError::MissingSetting(SECRET_VAR))
    }
}

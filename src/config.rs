//! Configuration types.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "./data/lifepoint.db";
const DEFAULT_AI_MODEL: &str = "gemini-2.0-flash";

/// Identity token verification settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 shared secret used to verify identity tokens.
    pub jwt_secret: SecretString,
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// Required `aud` claim, if any.
    pub audience: Option<String>,
}

/// Generative-text upstream settings.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    /// Upstream API key. `None` leaves the proxy answering with a configuration error.
    pub api_key: Option<SecretString>,
    pub model: String,
}

/// Service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Profile store location; `:memory:` for an ephemeral store.
    pub db_path: String,
    pub auth: AuthConfig,
    pub assist: AssistConfig,
    /// When set, logs are also written to daily-rotated files here.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match get("LIFEPOINT_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "LIFEPOINT_PORT".to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => DEFAULT_PORT,
        };

        let bind = match get("LIFEPOINT_BIND") {
            Some(raw) => raw.parse::<IpAddr>().map_err(|e| ConfigError::InvalidValue {
                key: "LIFEPOINT_BIND".to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        let jwt_secret = get("LIFEPOINT_JWT_SECRET").ok_or_else(|| ConfigError::MissingRequired {
            key: "LIFEPOINT_JWT_SECRET".to_string(),
            hint: "Set it to the secret your identity provider signs tokens with.".to_string(),
        })?;

        Ok(Self {
            bind,
            port,
            db_path: get("LIFEPOINT_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            auth: AuthConfig {
                jwt_secret: SecretString::from(jwt_secret),
                issuer: get("LIFEPOINT_JWT_ISSUER"),
                audience: get("LIFEPOINT_JWT_AUDIENCE"),
            },
            assist: AssistConfig {
                api_key: get("GEMINI_API_KEY").map(SecretString::from),
                model: get("LIFEPOINT_AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            },
            log_dir: get("LIFEPOINT_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Socket address the server listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

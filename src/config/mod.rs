//! Configuration loading
//!
//! All configuration is consumed from the environment:
//!
//! - `GEMINI_API_KEY`, `GEMINI_MODEL` - AI completion credential/model
//! - `GITHUB_TOKEN`, `GITHUB_REPOSITORY`, `GITHUB_MENTION` - issue tracker
//! - `DOMAIN_API_MAPPINGS` - trust table (`domain1:key1,key2;domain2:key3`)
//! - `CHIRP_HOST`, `CHIRP_PORT` - bind address (default `127.0.0.1:3100`)
//! - `CHIRP_DEV` - plaintext dev logging instead of JSON
//! - `CHIRP_LOG` / `RUST_LOG` - log filter
//!
//! Missing AI or tracker credentials are not startup errors: the
//! affected endpoints fail per-request so the rest of the gateway
//! stays usable. A malformed bind address does abort startup.

use std::env;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tracing::warn;

use crate::auth::TrustTable;

/// Default bind port.
pub const DEFAULT_PORT: u16 = 3100;

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Default mention appended to issue bodies.
pub const DEFAULT_GITHUB_MENTION: &str = "@claude";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {var}: {message}")]
    InvalidValue { var: &'static str, message: String },
}

/// AI completion service configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

/// Issue tracker configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
    /// Default repository when the request carries no `X-GitHub-Repo`.
    pub default_repository: Option<String>,
    /// Mention string appended to issue bodies; empty disables it.
    pub mention: String,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub gemini: Option<GeminiConfig>,
    pub github: Option<GitHubConfig>,
    pub trust_table: TrustTable,
    pub dev_mode: bool,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_nonempty("CHIRP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let host: IpAddr = host.parse().map_err(|e| ConfigError::InvalidValue {
            var: "CHIRP_HOST",
            message: format!("{e}"),
        })?;
        let port = match env_nonempty("CHIRP_PORT") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                var: "CHIRP_PORT",
                message: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };

        let gemini = env_nonempty("GEMINI_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: env_nonempty("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        });

        let github = env_nonempty("GITHUB_TOKEN").map(|token| GitHubConfig {
            token,
            default_repository: env_nonempty("GITHUB_REPOSITORY"),
            mention: env::var("GITHUB_MENTION")
                .unwrap_or_else(|_| DEFAULT_GITHUB_MENTION.to_string()),
        });

        let trust_table = match env_nonempty("DOMAIN_API_MAPPINGS") {
            Some(mappings) => {
                let table = TrustTable::parse(&mappings);
                if table.is_empty() {
                    warn!("DOMAIN_API_MAPPINGS is set but contains no valid entries");
                }
                table
            }
            None => {
                warn!("DOMAIN_API_MAPPINGS not set - all authenticated requests will be rejected");
                TrustTable::default()
            }
        };

        Ok(Config {
            bind: SocketAddr::new(host, port),
            gemini,
            github,
            trust_table,
            dev_mode: dev_mode_from_env(),
        })
    }
}

/// Read an env var, treating empty values as unset.
fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Whether CHIRP_DEV requests development (plaintext) logging.
pub fn dev_mode_from_env() -> bool {
    env::var("CHIRP_DEV")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

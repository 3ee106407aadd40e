// Server configuration.
//
// Centralizes environment variable parsing into an immutable value built
// once at startup and handed to every component by reference. Nothing else
// in the crate reads the process environment after this runs.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PORT: u16 = 2555;
const DEFAULT_MIRROR_DIR: &str = "/var/lib/gitmirror";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Configuration errors surfaced before the server starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("GITMIRROR_REPOSITORIES does not name any repository")]
    NoRepositories,
}

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables, falling back to defaults for the optional ones.
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Base URL of the source remote; repository URLs are `<base>/<name>`.
    pub source_url: String,
    /// Base URL of the destination remote.
    pub destination_url: String,
    /// Allow-list of repository names, ordered, distinct, case-sensitive.
    pub repositories: Vec<String>,
    /// Basic-Auth username for the protected endpoints.
    pub auth_username: String,
    /// Basic-Auth password. Redacted from `Debug` output.
    pub auth_password: String,
    /// Shared webhook secret; `None` disables signature checks entirely.
    pub webhook_secret: Option<String>,
    /// Base directory holding one `<name>.git` mirror per repository.
    pub mirror_dir: PathBuf,
    /// Deadline applied to every external git invocation.
    pub command_timeout: Duration,
    /// Debug flag: raises the effective log level to `debug`.
    pub debug: bool,
    /// Log filter directive (e.g. `info`, `gitmirror_server=debug`).
    pub log_filter: String,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `GITMIRROR_HOST` | `0.0.0.0` |
    /// | `GITMIRROR_PORT` | `2555` |
    /// | `GITMIRROR_SOURCE_URL` | *(required)* |
    /// | `GITMIRROR_DESTINATION_URL` | *(required)* |
    /// | `GITMIRROR_REPOSITORIES` | *(required, space-separated)* |
    /// | `GITMIRROR_AUTH_USER` | *(required)* |
    /// | `GITMIRROR_AUTH_PASSWORD` | *(required)* |
    /// | `GITMIRROR_WEBHOOK_SECRET` | *(none; signature checks skipped)* |
    /// | `GITMIRROR_MIRROR_DIR` | `/var/lib/gitmirror` |
    /// | `GITMIRROR_COMMAND_TIMEOUT` | `300` (seconds) |
    /// | `GITMIRROR_DEBUG` | off |
    /// | `GITMIRROR_LOG_FILTER` | `info` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("GITMIRROR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("GITMIRROR_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let source_url = require(&env, "GITMIRROR_SOURCE_URL").map(normalize_base_url)?;
        let destination_url = require(&env, "GITMIRROR_DESTINATION_URL").map(normalize_base_url)?;

        let repositories = parse_repositories(&require(&env, "GITMIRROR_REPOSITORIES")?);
        if repositories.is_empty() {
            return Err(ConfigError::NoRepositories);
        }

        let auth_username = require(&env, "GITMIRROR_AUTH_USER")?;
        let auth_password = require(&env, "GITMIRROR_AUTH_PASSWORD")?;

        let webhook_secret = env("GITMIRROR_WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty());

        let mirror_dir = env("GITMIRROR_MIRROR_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MIRROR_DIR));

        let command_timeout = Duration::from_secs(
            env("GITMIRROR_COMMAND_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        );

        let debug = env("GITMIRROR_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let log_filter = env("GITMIRROR_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Ok(Self {
            listen_addr,
            source_url,
            destination_url,
            repositories,
            auth_username,
            auth_password,
            webhook_secret,
            mirror_dir,
            command_timeout,
            debug,
            log_filter,
        })
    }

    /// Effective tracing filter: the debug flag wins over the configured one.
    pub fn log_directive(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_filter
        }
    }
}

// The Basic-Auth password and webhook secret must never reach the logs,
// so Debug is written out by hand instead of derived.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("source_url", &self.source_url)
            .field("destination_url", &self.destination_url)
            .field("repositories", &self.repositories)
            .field("auth_username", &self.auth_username)
            .field("auth_password", &"<redacted>")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("mirror_dir", &self.mirror_dir)
            .field("command_timeout", &self.command_timeout)
            .field("debug", &self.debug)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

fn require<F>(env: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    env(key).map_err(|_| ConfigError::Missing(key))
}

/// Repository URLs are built as `<base>/<name>`; a trailing slash on the
/// base would produce `//` in every derived URL.
fn normalize_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Space-separated allow-list, ordered and de-duplicated, case-sensitive.
fn parse_repositories(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split_whitespace() {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

//! Relay configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `KNOTSTATS_*` environment variables. The result is fixed for the lifetime
//! of the process.

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Config file read when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/knotstats/config.toml";

/// Knot Resolver `webmgmt` statistics endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8453/stats";

/// Short enough that a stalled resolver never blocks the one-second poll cycle.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 500;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5001";

/// Interval at which the dashboard polls `/api/stats`.
pub const POLL_INTERVAL_MS: u64 = 1000;

const ENV_UPSTREAM_URL: &str = "KNOTSTATS_UPSTREAM_URL";
const ENV_UPSTREAM_TIMEOUT_MS: &str = "KNOTSTATS_UPSTREAM_TIMEOUT_MS";
const ENV_LISTEN_ADDR: &str = "KNOTSTATS_LISTEN_ADDR";
const ENV_TEMPLATES_DIR: &str = "KNOTSTATS_TEMPLATES_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Resolver statistics endpoint polled once per client request
    pub upstream_url: Url,

    /// Bound on the whole upstream exchange, body included
    pub upstream_timeout_ms: u64,

    /// Address the HTTP listener binds to when no socket is inherited
    pub listen_addr: SocketAddr,

    /// Serve the dashboard from this directory, reloading on change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: Url::parse(DEFAULT_UPSTREAM_URL).expect("default upstream URL is valid"),
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .expect("default listen address is valid"),
            templates_dir: None,
        }
    }
}

impl RelayConfig {
    /// Load the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
    /// read if present and the defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                debug!("No config file at {}, using defaults", DEFAULT_CONFIG_PATH);
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Environment variables take precedence over the config file so container
    /// deployments can point the relay elsewhere without editing files.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENV_UPSTREAM_URL) {
            self.upstream_url = Url::parse(raw.trim())
                .with_context(|| format!("{} is not a valid URL: {}", ENV_UPSTREAM_URL, raw))?;
            info!("Upstream URL overridden by {}", ENV_UPSTREAM_URL);
        }
        if let Ok(raw) = std::env::var(ENV_UPSTREAM_TIMEOUT_MS) {
            self.upstream_timeout_ms = raw.trim().parse().with_context(|| {
                format!("{} must be a number of milliseconds: {}", ENV_UPSTREAM_TIMEOUT_MS, raw)
            })?;
        }
        if let Ok(raw) = std::env::var(ENV_LISTEN_ADDR) {
            self.listen_addr = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a socket address: {}", ENV_LISTEN_ADDR, raw))?;
        }
        if let Ok(raw) = std::env::var(ENV_TEMPLATES_DIR) {
            let raw = raw.trim();
            self.templates_dir = if raw.is_empty() { None } else { Some(PathBuf::from(raw)) };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.upstream_timeout_ms == 0 {
            bail!("upstream_timeout_ms must be greater than zero");
        }
        match self.upstream_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "upstream_url must use http or https, got '{}' in {}",
                    other,
                    self.upstream_url
                ));
            }
        }
        if self.upstream_url.host_str().is_none() {
            bail!("upstream_url has no host: {}", self.upstream_url);
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

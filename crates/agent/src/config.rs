//! Agent configuration
//!
//! Read from an optional file named by `HOSTMETRICS_CONFIG`, then from
//! `HOSTMETRICS_*` environment variables, which take precedence.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest report buffer that still holds a document header
pub const MIN_BUFFER_CAPACITY: usize = 256;

pub const ENV_PREFIX: &str = "HOSTMETRICS";
pub const CONFIG_FILE_VAR: &str = "HOSTMETRICS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Host name reported in documents and log events
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    #[serde(default = "default_sys_root")]
    pub sys_root: PathBuf,

    /// Report buffer size in bytes
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Lifetime of the cached status document, 0 to disable
    #[serde(default = "default_status_cache_secs")]
    pub status_cache_secs: u64,

    /// How often family cadences are polled
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

fn default_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_sys_root() -> PathBuf {
    PathBuf::from("/sys")
}

fn default_buffer_capacity() -> usize {
    65536
}

fn default_status_cache_secs() -> u64 {
    10
}

fn default_tick_millis() -> u64 {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host_name: default_host_name(),
            api_port: default_api_port(),
            proc_root: default_proc_root(),
            sys_root: default_sys_root(),
            buffer_capacity: default_buffer_capacity(),
            status_cache_secs: default_status_cache_secs(),
            tick_millis: default_tick_millis(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_VAR).ok();
        Self::from_sources(
            file.as_deref(),
            config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
    }

    /// Builds the configuration from explicit sources.
    pub fn from_sources(file: Option<&str>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let config: AgentConfig = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host_name.trim().is_empty() {
            bail!("host_name must not be empty");
        }
        if self.buffer_capacity < MIN_BUFFER_CAPACITY {
            bail!(
                "buffer_capacity must be at least {MIN_BUFFER_CAPACITY} bytes, got {}",
                self.buffer_capacity
            );
        }
        if self.tick_millis == 0 {
            bail!("tick_millis must be positive");
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn status_cache_ttl(&self) -> i64 {
        i64::try_from(self.status_cache_secs).unwrap_or(i64::MAX)
    }
}

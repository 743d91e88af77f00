//! Orchestrator configuration: load from YAML, overlay environment, validate.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! runnable development setup.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_ENV: &str = "ORCHESTRATOR_CONFIG";

const MAX_CHALLENGE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long an HTTP caller blocks on a process result.
    pub waiter_timeout_ms: u64,
    pub challenge_ttl_secs: u64,
    pub registry_shards: usize,
    /// Maximum number of workflow jobs executing at once.
    pub worker_count: usize,
    pub job_queue_capacity: usize,
    pub janitor_interval_secs: u64,
    pub bind_addr: String,
    /// Base URL of the notification service. In-memory channel when unset.
    pub notifications_base_path: Option<String>,
    /// Base URL of the SCA service. In-memory ledger when unset.
    pub sca_base_path: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            waiter_timeout_ms: 30_000,
            challenge_ttl_secs: 300,
            registry_shards: crate::registry::DEFAULT_SHARDS,
            worker_count: 4,
            job_queue_capacity: 256,
            janitor_interval_secs: 60,
            bind_addr: "0.0.0.0:8080".to_string(),
            notifications_base_path: None,
            sca_base_path: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn waiter_timeout(&self) -> Duration {
        Duration::from_millis(self.waiter_timeout_ms)
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    /// Registry entries older than this are swept by the janitor. Twice the
    /// waiter timeout, so only entries whose owner vanished qualify.
    pub fn stale_waiter_age(&self) -> Duration {
        self.waiter_timeout().saturating_mul(2)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Parsing orchestrator config")
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Parsing {}", path.display()))
    }

    /// Resolve the effective config: file from `ORCHESTRATOR_CONFIG` if set,
    /// then `ORCHESTRATOR_*` overrides, then validation.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            raw.trim()
                .parse()
                .with_context(|| format!("Invalid value for {key}: {raw:?}"))
        }

        if let Some(v) = lookup("ORCHESTRATOR_WAITER_TIMEOUT_MS") {
            self.waiter_timeout_ms = parsed("ORCHESTRATOR_WAITER_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_CHALLENGE_TTL_SECS") {
            self.challenge_ttl_secs = parsed("ORCHESTRATOR_CHALLENGE_TTL_SECS", v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_REGISTRY_SHARDS") {
            self.registry_shards = parsed("ORCHESTRATOR_REGISTRY_SHARDS", v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_WORKER_COUNT") {
            self.worker_count = parsed("ORCHESTRATOR_WORKER_COUNT", v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_JOB_QUEUE_CAPACITY") {
            self.job_queue_capacity = parsed("ORCHESTRATOR_JOB_QUEUE_CAPACITY", v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_JANITOR_INTERVAL_SECS") {
            self.janitor_interval_secs = parsed("ORCHESTRATOR_JANITOR_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("ORCHESTRATOR_NOTIFICATIONS_BASE_PATH") {
            self.notifications_base_path = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("ORCHESTRATOR_SCA_BASE_PATH") {
            self.sca_base_path = Some(v).filter(|s| !s.is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.waiter_timeout_ms == 0 {
            bail!("waiter_timeout_ms must be greater than zero");
        }
        if self.challenge_ttl_secs == 0 {
            bail!("challenge_ttl_secs must be greater than zero");
        }
        if self.challenge_ttl_secs > MAX_CHALLENGE_TTL_SECS {
            bail!(
                "challenge_ttl_secs={} exceeds the 24h ceiling for one-time codes",
                self.challenge_ttl_secs
            );
        }
        if self.registry_shards == 0 {
            bail!("registry_shards must be greater than zero");
        }
        if self.worker_count == 0 {
            bail!("worker_count must be greater than zero");
        }
        if self.job_queue_capacity == 0 {
            bail!("job_queue_capacity must be greater than zero");
        }
        if self.janitor_interval_secs == 0 {
            bail!("janitor_interval_secs must be greater than zero");
        }
        Ok(())
    }
}

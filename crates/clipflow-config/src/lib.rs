//! Configuration management for clipflow
//!
//! One immutable [`Config`] is constructed at process start and passed by
//! reference into the evaluator and orchestrator; there is no ambient
//! mutable configuration. Discovery precedence: explicit path >
//! `.clipflow/config.toml` in the working directory > the user config
//! directory > built-in defaults.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use clipflow_guard::{Evaluator, GuardrailConfig};
use clipflow_utils::Platform;

/// Retry parameters for one stage, applied uniformly by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempt cap, first attempt included.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds; doubles per attempt.
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retrying after attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Per-stage retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub transcript: RetryPolicy,
    pub generation: RetryPolicy,
    pub publish: RetryPolicy,
    pub feed: RetryPolicy,
    pub approval: RetryPolicy,
}

/// Approval gate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Edit cycles allowed before the item is forced to rejection.
    pub max_edit_cycles: u32,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { max_edit_cycles: 3 }
    }
}

/// Worker pool and polling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent workers, each holding at most one item.
    pub concurrency: usize,
    /// Seconds between feed polls in `run` mode.
    pub poll_interval_secs: u64,
    /// Lookback window for the first poll, in hours.
    pub poll_lookback_hours: u64,
    /// Timeout applied to every collaborator call, in seconds.
    pub stage_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval_secs: 21_600,
            poll_lookback_hours: 6,
            stage_timeout_secs: 120,
        }
    }
}

/// Prompt template settings for the drafting stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Directory holding per-platform template files (`<platform>.toml`).
    /// When absent, compiled-in defaults are used.
    pub dir: Option<Utf8PathBuf>,
    /// Max tokens requested from the text-generation service.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

/// Complete process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for the file-backed record store.
    pub store_root: Utf8PathBuf,
    /// Target publishing platform.
    pub platform: Platform,
    pub workers: WorkerConfig,
    pub retry: RetryConfig,
    pub approval: ApprovalConfig,
    pub prompts: PromptConfig,
    pub guardrails: GuardrailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: Utf8PathBuf::from(".clipflow/store"),
            platform: Platform::Threads,
            workers: WorkerConfig::default(),
            retry: RetryConfig::default(),
            approval: ApprovalConfig::default(),
            prompts: PromptConfig::default(),
            guardrails: GuardrailConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with discovery.
    ///
    /// Search order: `explicit` if given, then `.clipflow/config.toml` in the
    /// working directory, then `<user config dir>/clipflow/config.toml`.
    /// Falls back to built-in defaults when nothing is found. The loaded
    /// configuration is validated before being returned.
    ///
    /// # Errors
    /// Fails when an explicit path does not exist, a found file cannot be
    /// read or parsed, or validation rejects the values.
    pub fn discover(explicit: Option<&Utf8Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {path}");
            }
            return Self::load_from_path(path);
        }

        let local = Utf8PathBuf::from(".clipflow/config.toml");
        if local.exists() {
            return Self::load_from_path(&local);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("clipflow").join("config.toml");
            if user.exists() {
                let user = Utf8PathBuf::from_path_buf(user)
                    .map_err(|p| anyhow::anyhow!("Non-UTF8 config path: {}", p.display()))?;
                return Self::load_from_path(&user);
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a specific TOML file.
    ///
    /// # Errors
    /// Fails when the file cannot be read or parsed, or validation rejects
    /// the values.
    pub fn load_from_path(path: &Utf8Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML: {path}"))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {path}"))?;

        Ok(config)
    }

    /// Validate value ranges and compile the guardrail patterns once so bad
    /// configuration fails at startup, not mid-workflow.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.workers.concurrency == 0 {
            anyhow::bail!("workers.concurrency must be at least 1");
        }
        if self.workers.stage_timeout_secs == 0 {
            anyhow::bail!("workers.stage_timeout_secs must be at least 1");
        }
        if self.approval.max_edit_cycles == 0 {
            anyhow::bail!("approval.max_edit_cycles must be at least 1");
        }
        for (name, policy) in [
            ("transcript", self.retry.transcript),
            ("generation", self.retry.generation),
            ("publish", self.retry.publish),
            ("feed", self.retry.feed),
            ("approval", self.retry.approval),
        ] {
            if policy.max_attempts == 0 {
                anyhow::bail!("retry.{name}.max_attempts must be at least 1");
            }
        }

        Evaluator::new(&self.guardrails)
            .map_err(|e| anyhow::anyhow!("Invalid guardrail configuration: {e}"))?;

        Ok(())
    }

    /// Timeout applied to every collaborator call.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.workers.stage_timeout_secs)
    }
}

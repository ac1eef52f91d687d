use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use action_flow::{ExecutorConfig, RecoveryConfig};
use agent_core::PlannerConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tabpilot_orchestrator::OrchestratorConfig;
use tabpilot_registry::SessionConfig;
use tracing::debug;

const ENV_PREFIX: &str = "TABPILOT_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub execution: ExecutorConfig,
    pub recovery: RecoveryConfig,
    pub planner: PlannerConfig,
    pub server: ServerConfig,
    /// Site fixture served to every origin; the built-in demo site when unset
    pub site_fixture: Option<PathBuf>,
    pub provider: ProviderKind,
    /// Remembered values for type steps planned without one, keyed by a
    /// free-form description such as "shipping email"
    pub memory: BTreeMap<String, String>,
}

/// Source of analyzed plans, replans and recovery suggestions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Template plans only; replanning and suggestions have nothing to ask
    #[default]
    None,
    /// Local pattern-rule analysis
    Rules,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::None => "none",
            ProviderKind::Rules => "rules",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(ProviderKind::None),
            "rules" => Ok(ProviderKind::Rules),
            other => bail!("unknown provider {other:?} (expected none or rules)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub event_capacity: usize,
    /// Origins allowed by CORS; empty allows any
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            event_capacity: 256,
            cors_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("Failed to parse config file")
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            session: self.session,
            execution: self.execution,
            recovery: self.recovery,
            planner: self.planner.clone(),
            event_capacity: self.server.event_capacity,
        }
    }

    /// Apply `TABPILOT_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `TABPILOT_<KEY>=value` pairs; unknown keys are ignored so other
    /// tabpilot variables can share the prefix
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(key) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            if self.apply_override(key, value)? {
                debug!(key, value, "config override applied");
            }
        }
        Ok(())
    }

    fn apply_override(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "HOST" => self.server.host = value.to_string(),
            "PORT" => self.server.port = parse(key, value)?,
            "EVENT_CAPACITY" => self.server.event_capacity = parse(key, value)?,
            "CORS_ORIGINS" => {
                self.server.cors_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "SITE_FIXTURE" => self.site_fixture = Some(PathBuf::from(value)),
            "PROVIDER" => {
                self.provider = value
                    .parse()
                    .with_context(|| format!("invalid value for {ENV_PREFIX}{key}"))?
            }
            "CONTEXT_IDLE" => self.session.context_idle_secs = seconds(key, value)?,
            "SESSION_IDLE" => self.session.session_idle_secs = seconds(key, value)?,
            "SWEEP_INTERVAL" => self.session.sweep_interval_secs = seconds(key, value)?,
            "STEP_TIMEOUT" => self.execution.step_timeout_ms = millis(key, value)?,
            "SETTLE" => self.execution.settle_ms = millis(key, value)?,
            "NAV_RETRIES" => self.execution.nav_retries = parse(key, value)?,
            "MAX_CONSECUTIVE_FAILURES" => {
                self.recovery.max_consecutive_failures = parse(key, value)?
            }
            "STRICT_VERIFICATION" => self.recovery.strict_verification = flag(key, value)?,
            "USE_SUGGESTIONS" => self.recovery.use_suggestions = flag(key, value)?,
            "REPLAN_ON_FAILURE" => self.planner.replan_on_failure = flag(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value for {ENV_PREFIX}{key}: {value:?}"))
}

fn flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid value for {ENV_PREFIX}{key}: {value:?} (expected true or false)"),
    }
}

/// Accepts plain numbers as the unit, or humantime strings such as `90s` or `5m`
fn duration(key: &str, value: &str, unit: Duration) -> Result<Duration> {
    if let Ok(count) = value.parse::<u64>() {
        let nanos = unit.as_nanos().saturating_mul(u128::from(count));
        return Ok(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)));
    }
    humantime::parse_duration(value)
        .with_context(|| format!("invalid duration for {ENV_PREFIX}{key}: {value:?}"))
}

fn seconds(key: &str, value: &str) -> Result<u64> {
    Ok(duration(key, value, Duration::from_secs(1))?.as_secs())
}

fn millis(key: &str, value: &str) -> Result<u64> {
    let ms = duration(key, value, Duration::from_millis(1))?.as_millis();
    Ok(u64::try_from(ms).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_units_and_plain_numbers() {
        assert_eq!(seconds("SESSION_IDLE", "90").unwrap(), 90);
        assert_eq!(seconds("SESSION_IDLE", "5m").unwrap(), 300);
        assert_eq!(millis("STEP_TIMEOUT", "2s").unwrap(), 2_000);
        assert_eq!(millis("STEP_TIMEOUT", "750").unwrap(), 750);
        assert!(seconds("SESSION_IDLE", "soon").is_err());
    }

    #[test]
    fn flags_reject_garbage() {
        assert!(flag("REPLAN_ON_FAILURE", "ON").unwrap());
        assert!(!flag("REPLAN_ON_FAILURE", "0").unwrap());
        assert!(flag("REPLAN_ON_FAILURE", "maybe").is_err());
    }
}

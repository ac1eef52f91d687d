use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use action_flow::StaticMemory;
use agent_core::MockAnalysisProvider;
use anyhow::{Context, Result};
use page_driver::memory::{demo_site, FixtureContextProvider, SiteFixture};
use tabpilot_orchestrator::SessionOrchestrator;
use tokio::fs;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, ProviderKind};

const LOG_FORMAT_ENV: &str = "TABPILOT_LOG_FORMAT";

/// Logs go to stderr so `--output json` keeps stdout machine readable
pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let json = env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let (plain_layer, json_layer) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(plain_layer)
        .with(json_layer)
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File the config came from, when one existed
    pub path: Option<PathBuf>,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Priority: ./config/tabpilot.yaml > ~/.config/tabpilot/config.yaml
            let local_config = PathBuf::from("config/tabpilot.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("tabpilot");
                path.push("config.yaml");
                path
            }
        }
    };

    if !config_path.exists() {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        return Ok(LoadedConfig {
            config: AppConfig::default(),
            path: None,
        });
    }

    let content = fs::read_to_string(&config_path)
        .await
        .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
    let config = AppConfig::from_yaml_str(&content)?;
    info!("Loaded configuration from: {}", config_path.display());
    Ok(LoadedConfig {
        config,
        path: Some(config_path),
    })
}

pub fn load_site(config: &AppConfig) -> Result<SiteFixture> {
    match &config.site_fixture {
        Some(path) => SiteFixture::load(path)
            .with_context(|| format!("Failed to load site fixture {}", path.display())),
        None => demo_site().context("Failed to load the built-in demo site"),
    }
}

/// Orchestrator wired to fixture-backed page contexts, plus the configured
/// analysis provider and memory
pub fn build_orchestrator(
    config: &AppConfig,
) -> Result<(Arc<SessionOrchestrator>, Arc<FixtureContextProvider>)> {
    let contexts = Arc::new(FixtureContextProvider::new(load_site(config)?));
    let mut builder = SessionOrchestrator::builder(contexts.clone()).config(config.orchestrator());

    match config.provider {
        ProviderKind::Rules => {
            builder = builder.provider(Arc::new(MockAnalysisProvider::new()));
        }
        ProviderKind::None => {
            if config.planner.replan_on_failure || config.recovery.use_suggestions {
                debug!(
                    replan = config.planner.replan_on_failure,
                    suggestions = config.recovery.use_suggestions,
                    "no analysis provider configured; replanning and suggestions are off"
                );
            }
        }
    }
    if !config.memory.is_empty() {
        let memory = config
            .memory
            .iter()
            .fold(StaticMemory::new(), |memory, (key, text)| {
                memory.with_entry(key.as_str(), text.as_str())
            });
        builder = builder.memory(Arc::new(memory));
    }
    info!(
        provider = config.provider.as_str(),
        memory_entries = config.memory.len(),
        "orchestrator wired"
    );

    let orchestrator = builder.build().context("Failed to build the orchestrator")?;
    Ok((Arc::new(orchestrator), contexts))
}

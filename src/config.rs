use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the omics runner
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OmicsRunnerConfig {
    /// Orchestration graph settings
    pub orchestrator: OrchestratorConfig,
    /// Continuation store settings
    pub persistence: PersistenceConfig,
    /// Retry policy applied to job service calls
    pub retry: RetryConfig,
    /// Resumption scheduler settings
    pub scheduler: SchedulerConfig,
    /// Local simulated job service
    pub simulation: SimulationConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Length of the WaitForJob suspension
    pub poll_interval_seconds: u64,
    /// Suffix appended to the analysis id to name the nested visualization run
    pub visualization_name_suffix: String,
    /// Transition records kept per continuation
    pub max_history_entries: usize,
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            visualization_name_suffix: "visualization".to_string(),
            max_history_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory holding one continuation file per analysis
    pub directory: PathBuf,
    /// Verify the integrity hash when loading a continuation
    pub enable_integrity_checks: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".omics-runner/continuations"),
            enable_integrity_checks: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay unit; the n-th retry waits base * 2^n
    pub base_delay_millis: u64,
    pub max_delay_seconds: u64,
    pub jitter: bool,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_millis)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_seconds)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_millis: 500,
            max_delay_seconds: 30,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the store is scanned for due continuations
    pub tick_interval_millis: u64,
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_millis.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_millis: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Where simulated job records are kept
    pub state_directory: PathBuf,
    /// Wall-clock time a simulated job takes to finish
    pub run_duration_seconds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            state_directory: PathBuf::from(".omics-runner/simulated-jobs"),
            run_duration_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
    /// Log orchestrator counters on exit
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
        }
    }
}

impl OmicsRunnerConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (omics-runner.toml, .omics-runner-rc)
    /// 3. Environment variables (prefixed with OMICS_RUNNER_, `__` between sections)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("omics-runner.toml").exists() {
            builder = builder.add_source(File::with_name("omics-runner"));
        }

        if Path::new(".omics-runner-rc").exists() {
            builder = builder.add_source(
                File::with_name(".omics-runner-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("OMICS_RUNNER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from an explicit file on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path.as_ref()))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<OmicsRunnerConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = OmicsRunnerConfig::load_env_file();
        OmicsRunnerConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static OmicsRunnerConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

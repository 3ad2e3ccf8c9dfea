use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use taskdag_core::RunOptions;

pub const DEFAULT_FILTER: &str = "taskdag=info,taskdag_core=info";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

/// Settings for the stand-in pipeline steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Name of a step that should fail when run
    #[serde(default)]
    pub fail_step: Option<String>,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_step_delay_ms() -> u64 {
    200
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay_ms: default_delay_ms(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            fail_step: None,
        }
    }
}

impl CliConfig {
    /// Read the configuration file. Returns `None` when it does not exist.
    pub fn read(config_path: &Path) -> Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read configuration file")?;
        let config = toml::from_str(&content).context("Failed to parse configuration file")?;
        Ok(Some(config))
    }

    /// Retry options, with command-line values taking precedence
    pub fn run_options(&self, max_retries: Option<u32>, delay_ms: Option<u64>) -> RunOptions {
        RunOptions::new()
            .with_max_retries(max_retries.unwrap_or(self.run.max_retries))
            .with_delay(Duration::from_millis(delay_ms.unwrap_or(self.run.delay_ms)))
    }
}

impl DemoConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

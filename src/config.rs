//! File-based scenario configuration.
//!
//! Scenario files are TOML or JSON, dispatched on extension. Every field is
//! optional; present fields overlay [`ScenarioConfig::default`]. Durations
//! are human-readable strings ("250ms", "10s").
//!
//! ```toml
//! [scenario]
//! name = "my-run"
//! duration = "30s"
//! node_count = 5
//!
//! [scenario.chaos]
//! enabled = true
//! interval = "2s"
//! attack_types = ["kill", "delay"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ChaosKvsError, Result};
use crate::events::AttackType;
use crate::scenario::ScenarioConfig;

/// Root of a scenario configuration file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// The scenario section.
    pub scenario: FileScenario,
}

/// The `[scenario]` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileScenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Run length, e.g. `"30s"`.
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,
    /// Number of nodes; zero keeps the default.
    pub node_count: Option<usize>,
    /// Load generator settings.
    pub client: FileClient,
    /// Chaos injector settings.
    pub chaos: FileChaos,
    /// Recovery supervisor settings.
    pub recovery: FileRecovery,
}

/// The `[scenario.client]` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileClient {
    /// Worker count; `0` means CPU count.
    pub workers: Option<usize>,
    /// Write fraction in `[0.0, 1.0]`.
    pub write_ratio: Option<f64>,
}

/// The `[scenario.chaos]` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileChaos {
    /// Enable the injector.
    pub enabled: bool,
    /// Attack tick period.
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Targets per tick; zero keeps the default.
    pub targets: Option<usize>,
    /// Attack type names (`kill`, `suspend`, `delay`).
    pub attack_types: Vec<String>,
}

/// The `[scenario.recovery]` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileRecovery {
    /// Enable the supervisor.
    pub enabled: bool,
    /// Grace period before intervening.
    #[serde(with = "humantime_serde")]
    pub delay: Option<Duration>,
    /// Retry budget; `0` means unlimited.
    pub max_retries: Option<u32>,
}

impl FileConfig {
    /// Load a configuration file, dispatching on its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let config: FileConfig = match ext.as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| ChaosKvsError::Config(format!("failed to parse TOML: {e}")))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| ChaosKvsError::Config(format!("failed to parse JSON: {e}")))?,
            other => {
                return Err(ChaosKvsError::Config(format!(
                    "unsupported config format: .{other}"
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let sc = &self.scenario;

        if let Some(ratio) = sc.client.write_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ChaosKvsError::Config(
                    "client.write_ratio must be between 0 and 1".to_string(),
                ));
            }
        }
        for name in &sc.chaos.attack_types {
            name.parse::<AttackType>()?;
        }

        Ok(())
    }

    /// Overlay the file's present fields on the default scenario config.
    pub fn to_scenario_config(&self) -> Result<ScenarioConfig> {
        let sc = &self.scenario;
        let mut config = ScenarioConfig::default();

        if !sc.name.is_empty() {
            config.name = sc.name.clone();
        }
        if !sc.description.is_empty() {
            config.description = sc.description.clone();
        }
        if let Some(duration) = sc.duration {
            config.duration = duration;
        }
        // A zero count keeps the default, same as an absent field.
        if let Some(node_count) = sc.node_count.filter(|&n| n > 0) {
            config.node_count = node_count;
        }

        if let Some(workers) = sc.client.workers {
            config.client_workers = workers;
        }
        if let Some(ratio) = sc.client.write_ratio {
            config.write_ratio = ratio;
        }

        config.enable_chaos = sc.chaos.enabled;
        if let Some(interval) = sc.chaos.interval {
            config.chaos_interval = interval;
        }
        if let Some(targets) = sc.chaos.targets.filter(|&t| t > 0) {
            config.chaos_targets = targets;
        }
        if !sc.chaos.attack_types.is_empty() {
            config.attack_types = sc
                .chaos
                .attack_types
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<AttackType>>>()?;
        }

        config.enable_recovery = sc.recovery.enabled;
        if let Some(delay) = sc.recovery.delay {
            config.recovery_delay = delay;
        }
        if let Some(max_retries) = sc.recovery.max_retries {
            config.max_retries = max_retries;
        }

        Ok(config)
    }
}

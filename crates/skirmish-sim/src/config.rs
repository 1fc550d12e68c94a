//! Simulation configuration.
//!
//! Provides tick rate, run length, seeding and logging settings for the
//! headless simulator. Configuration can be loaded from and saved to a file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "skirmish.toml";

/// Simulation configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // === Timing ===
    /// Fixed ticks per simulated second
    pub tick_rate: u32,
    /// Tick limit for a scenario that does not set its own
    pub max_ticks: u64,

    // === Determinism ===
    /// Base seed for crit rolls (None = random)
    pub seed: Option<u64>,

    // === Plumbing ===
    /// Tracing filter directive for the binary
    pub log_filter: String,
    /// Event bus capacity (events per tick before dropping)
    pub event_bus_capacity: usize,
    /// Directory scanned for loadout files
    pub loadout_path: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_ticks: 600, // 10 seconds
            seed: None,
            log_filter: "skirmish=info".to_string(),
            event_bus_capacity: 4096,
            loadout_path: crate::loadout::DEFAULT_LOADOUT_PATH.to_string(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let mut contents = String::new();
        if let Err(e) = fs::File::open(path).and_then(|mut f| f.read_to_string(&mut contents)) {
            warn!("Failed to read config file: {e}");
            return Self::default();
        }

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.tick_rate = self.tick_rate.clamp(1, 1000);
        self.max_ticks = self.max_ticks.max(1);
        self.event_bus_capacity = self.event_bus_capacity.clamp(64, 1 << 20);
    }

    /// Seconds per tick.
    #[must_use]
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_ticks, 600);
        assert_eq!(config.seed, None);
        assert_eq!(config.log_filter, "skirmish=info");
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimConfig {
            tick_rate: 0,
            max_ticks: 0,
            event_bus_capacity: 1,
            ..SimConfig::default()
        };

        config.validate();

        assert_eq!(config.tick_rate, 1);
        assert_eq!(config.max_ticks, 1);
        assert_eq!(config.event_bus_capacity, 64);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("skirmish.toml");

        let config = SimConfig {
            tick_rate: 20,
            seed: Some(12345),
            ..SimConfig::default()
        };
        config.save_to(&config_path).expect("Failed to save config");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded.tick_rate, 20);
        assert_eq!(loaded.seed, Some(12345));
        assert!((loaded.dt() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("skirmish.toml");
        fs::write(&config_path, "max_ticks = 42\n").expect("write config");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded.max_ticks, 42);
        assert_eq!(loaded.tick_rate, 60);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = SimConfig::load_from("/nonexistent/path/skirmish.toml");
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_config_load_garbage_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("skirmish.toml");
        fs::write(&config_path, "tick_rate = \"fast\"").expect("write config");

        assert_eq!(SimConfig::load_from(&config_path), SimConfig::default());
    }
}

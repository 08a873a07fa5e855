use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::channel::Channel;
use super::constants::*;
use super::error::ConfigError;

/// Structure representing a dashboard configuration. Contains the channel set, the
/// rolling statistics settings and the buffer sizes of a session.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channels: Vec<String>,
    pub active_channel: String,
    pub reference_channel: String,
    pub correlation_channel: Option<String>,
    pub window_size: usize,
    pub min_periods: usize,
    pub buffer_capacity: usize,
    pub scatter_limit: usize,
    pub density_bins: usize,
    pub density_history: usize,
    pub tick_period_ms: u64,
    pub log_capacity: usize,
    pub csv_path: PathBuf,
    pub autosave_ticks: Option<u64>,
}

impl Default for Config {
    /// Generate the standard ipm2/ipm3 over ebeam dashboard
    fn default() -> Self {
        Self {
            channels: vec![
                String::from("ipm2"),
                String::from("ipm3"),
                String::from("ebeam"),
            ],
            active_channel: String::from("ipm2"),
            reference_channel: String::from("ebeam"),
            correlation_channel: None,
            window_size: DEFAULT_WINDOW_SIZE,
            min_periods: DEFAULT_MIN_PERIODS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            scatter_limit: DEFAULT_SCATTER_LIMIT,
            density_bins: DEFAULT_DENSITY_BINS,
            density_history: DEFAULT_DENSITY_HISTORY,
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            csv_path: PathBuf::from("beam_snapshot.csv"),
            autosave_ticks: None,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file, overwriting anything already there
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check that the configuration describes a session that can actually be built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        let mut seen = BTreeSet::new();
        for name in self.channels.iter() {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateChannel(name.clone()));
            }
        }

        let named = [
            Some(&self.active_channel),
            Some(&self.reference_channel),
            self.correlation_channel.as_ref(),
        ];
        for name in named.into_iter().flatten() {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::UnknownChannel(name.clone()));
            }
        }

        if self.window_size == 0 {
            return Err(ConfigError::InvalidWindow(self.window_size));
        }
        if self.min_periods == 0 || self.min_periods > self.window_size {
            return Err(ConfigError::InvalidMinPeriods {
                min_periods: self.min_periods,
                window: self.window_size,
            });
        }

        let capacities = [
            ("buffer", self.buffer_capacity, MIN_BUFFER_CAPACITY),
            ("scatter", self.scatter_limit, 1),
            ("density bin", self.density_bins, 1),
            ("density history", self.density_history, 1),
            ("channel log", self.log_capacity, 1),
        ];
        for (name, value, min) in capacities {
            if value < min {
                return Err(ConfigError::InvalidCapacity { name, value, min });
            }
        }

        if self.tick_period_ms == 0 {
            return Err(ConfigError::InvalidTickPeriod);
        }
        Ok(())
    }

    /// The configured channels in declaration order
    pub fn channel_list(&self) -> Vec<Channel> {
        self.channels.iter().map(|name| Channel::new(name)).collect()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c == name)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn has_correlation(&self) -> bool {
        self.correlation_channel.is_some()
    }
}

//! Configuration management for the slot planner
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (slot-planner.toml)
//! - Environment variables (SLOT_PLANNER__*)
//!
//! ## Example config file (slot-planner.toml):
//! ```toml
//! [slots]
//! capacity = 4
//! strategy = "interval-partition"
//! max_colors_per_slot = 4
//! affinity_threshold = 20.0
//!
//! [timing]
//! buffer_layers = 2
//! prefer_early = true
//! seconds_per_swap = 30
//!
//! [similarity]
//! max_visual_distance = 25.0
//!
//! [output]
//! format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};

/// Main configuration for the planner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Slot packing settings
    #[serde(default)]
    pub slots: SlotConfig,

    /// Swap timing settings
    #[serde(default)]
    pub timing: TimingConfig,

    /// Color substitution settings
    #[serde(default)]
    pub similarity: SimilarityConfig,

    /// Layer constraint validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// CLI output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which slot assignment strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStrategy {
    /// Clique growth over the interval compatibility graph
    #[default]
    IntervalPartition,
    /// Greedy multi-factor affinity clustering
    AffinityClustering,
}

/// Slot packing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Number of physical slots (pooled across all units)
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Assignment strategy
    #[serde(default)]
    pub strategy: AssignmentStrategy,

    /// Upper bound on colors sharing one slot
    #[serde(default = "default_max_colors_per_slot")]
    pub max_colors_per_slot: usize,

    /// Minimum affinity for a candidate to join a cluster
    #[serde(default = "default_affinity_threshold")]
    pub affinity_threshold: f64,

    /// Interval gap (layers) over which the proximity bonus decays to zero
    #[serde(default = "default_proximity_window")]
    pub proximity_window: u32,
}

/// Swap timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Soft buffer kept between a color's last use and its swap
    #[serde(default = "default_buffer_layers")]
    pub buffer_layers: u32,

    /// Reward alternatives earlier than the nominal swap layer
    #[serde(default = "default_true")]
    pub prefer_early: bool,

    /// Maximum ranked alternatives per swap
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,

    /// Seconds of operator time one manual swap costs
    #[serde(default = "default_seconds_per_swap")]
    pub seconds_per_swap: u32,
}

/// Color substitution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Pairs further apart than this are never considered
    #[serde(default = "default_max_visual_distance")]
    pub max_visual_distance: f64,

    /// Minimum feasibility for a substitution to be reported
    #[serde(default = "default_min_feasibility")]
    pub min_feasibility: f64,
}

/// Layer constraint validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum consolidation suggestions per violation range
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

/// CLI output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON output format
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

// Default value functions
fn default_capacity() -> usize {
    4
}

fn default_max_colors_per_slot() -> usize {
    4
}

fn default_affinity_threshold() -> f64 {
    20.0
}

fn default_proximity_window() -> u32 {
    3
}

fn default_buffer_layers() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_max_alternatives() -> usize {
    5
}

fn default_seconds_per_swap() -> u32 {
    30
}

fn default_max_visual_distance() -> f64 {
    25.0
}

fn default_min_feasibility() -> f64 {
    60.0
}

fn default_max_suggestions() -> usize {
    5
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            strategy: AssignmentStrategy::default(),
            max_colors_per_slot: default_max_colors_per_slot(),
            affinity_threshold: default_affinity_threshold(),
            proximity_window: default_proximity_window(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            buffer_layers: default_buffer_layers(),
            prefer_early: true,
            max_alternatives: default_max_alternatives(),
            seconds_per_swap: default_seconds_per_swap(),
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_visual_distance: default_max_visual_distance(),
            min_feasibility: default_min_feasibility(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_suggestions: default_max_suggestions(),
        }
    }
}

impl PlannerConfig {
    /// Defaults with a different slot capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let mut config = Self::default();
        config.slots.capacity = capacity;
        config
    }

    /// Defaults with a different assignment strategy
    pub fn with_strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.slots.strategy = strategy;
        self
    }

    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "slot-planner.toml",
            ".slot-planner.toml",
            "config/slot-planner.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) =
            directories::ProjectDirs::from("dev", "familiar", "slot-planner")
        {
            let xdg_config = config_dir.config_dir().join("slot-planner.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SLOT_PLANNER__SLOTS__CAPACITY=8 and friends
        builder = builder.add_source(
            Environment::with_prefix("SLOT_PLANNER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Reject settings no pass can run with
    pub fn validate(&self) -> Result<()> {
        if self.slots.capacity == 0 {
            return Err(PlannerError::InvalidInput(
                "slot capacity must be at least 1".to_string(),
            ));
        }
        if self.slots.max_colors_per_slot == 0 {
            return Err(PlannerError::InvalidInput(
                "max_colors_per_slot must be at least 1".to_string(),
            ));
        }
        if !self.similarity.max_visual_distance.is_finite()
            || self.similarity.max_visual_distance < 0.0
        {
            return Err(PlannerError::InvalidInput(format!(
                "max_visual_distance must be a non-negative number, got {}",
                self.similarity.max_visual_distance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlannerConfig::default();
        assert_eq!(config.slots.capacity, 4);
        assert_eq!(config.slots.strategy, AssignmentStrategy::IntervalPartition);
        assert_eq!(config.slots.max_colors_per_slot, 4);
        assert_eq!(config.timing.buffer_layers, 2);
        assert_eq!(config.similarity.max_visual_distance, 25.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_config() {
        let config = PlannerConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[slots]"));
        assert!(toml_str.contains("[timing]"));
        assert!(toml_str.contains("strategy = \"interval-partition\""));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PlannerConfig::with_capacity(0);
        assert!(matches!(config.validate(), Err(PlannerError::InvalidInput(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planner.toml");
        let path_str = path.to_str().unwrap();

        let config =
            PlannerConfig::with_capacity(8).with_strategy(AssignmentStrategy::AffinityClustering);
        config.save(path_str).unwrap();

        let loaded = PlannerConfig::load_from(Some(path_str)).unwrap();
        assert_eq!(loaded.slots.capacity, 8);
        assert_eq!(loaded.slots.strategy, AssignmentStrategy::AffinityClustering);
        assert_eq!(loaded.timing.seconds_per_swap, 30);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[timing]\nbuffer_layers = 5\n").unwrap();

        let loaded = PlannerConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.timing.buffer_layers, 5);
        assert_eq!(loaded.slots.capacity, 4);
        assert!(loaded.timing.prefer_early);
    }
}

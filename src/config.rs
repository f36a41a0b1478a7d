//! Layered configuration for clustering runs.
//!
//! Sources, lowest to highest precedence:
//! - Default values
//! - TOML configuration file (`.clusterfetch/settings.toml`)
//! - Environment variables
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CF_` and use double underscores
//! to separate nested levels:
//! - `CF_KMEANS__K=8` sets `kmeans.k`
//! - `CF_SOM__EPOCHS=250` sets `som.epochs`
//! - `CF_EVALUATION__PREFETCH_THRESHOLD=0.4` sets `evaluation.prefetch_threshold`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::clustering::kmeans::ConvergenceRule;
use crate::clustering::som::DEFAULT_LEARNING_RATE;
use crate::error::{ClusterError, ClusterResult};
use crate::evaluation::{DEFAULT_PREFETCH_THRESHOLD, PartitionAssignment};

const CONFIG_DIR: &str = ".clusterfetch";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Seed for prototype initialization. A random seed is drawn when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default)]
    pub kmeans: KMeansConfig,

    #[serde(default)]
    pub som: SomConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KMeansConfig {
    /// Number of clusters
    #[serde(default = "default_k")]
    pub k: usize,

    /// Upper bound on reassignment iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Stopping rule
    #[serde(default)]
    pub convergence: ConvergenceMode,

    /// Iterations the transfer count must stay unchanged under `stable-transfers`
    #[serde(default = "default_stable_window")]
    pub stable_window: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConvergenceMode {
    #[default]
    NoTransfers,
    StableTransfers,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SomConfig {
    /// Side length of the square map
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_learning_rate")]
    pub initial_learning_rate: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EvaluationConfig {
    /// Prototype components strictly above this value are prefetched
    #[serde(default = "default_prefetch_threshold")]
    pub prefetch_threshold: f64,

    /// How k-means finds the owning cluster of a test vector
    #[serde(default)]
    pub partition_assignment: PartitionAssignment,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `kmeans = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_k() -> usize { 4 }
fn default_max_iterations() -> usize { 1000 }
fn default_stable_window() -> usize { 50 }
fn default_grid_size() -> usize { 4 }
fn default_epochs() -> usize { 100 }
fn default_learning_rate() -> f64 { DEFAULT_LEARNING_RATE }
fn default_prefetch_threshold() -> f64 { DEFAULT_PREFETCH_THRESHOLD }
fn default_log_level() -> String { "warn".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            seed: None,
            kmeans: KMeansConfig::default(),
            som: SomConfig::default(),
            evaluation: EvaluationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            max_iterations: default_max_iterations(),
            convergence: ConvergenceMode::default(),
            stable_window: default_stable_window(),
        }
    }
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            epochs: default_epochs(),
            initial_learning_rate: default_learning_rate(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            prefetch_threshold: default_prefetch_threshold(),
            partition_assignment: PartitionAssignment::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl KMeansConfig {
    pub fn convergence_rule(&self) -> ConvergenceRule {
        match self.convergence {
            ConvergenceMode::NoTransfers => ConvergenceRule::NoTransfers,
            ConvergenceMode::StableTransfers => ConvergenceRule::StableTransfers {
                window: self.stable_window,
            },
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> ClusterResult<Self> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring `CF_` variables
    pub fn load_from(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("CF_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Find `.clusterfetch/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Reject hyperparameters the algorithms cannot run with.
    ///
    /// Dataset-dependent bounds (k against the training size) are checked by
    /// the clusterers themselves.
    pub fn validate(&self) -> ClusterResult<()> {
        let invalid = |msg: String| Err(ClusterError::InvalidConfiguration(msg));

        if self.kmeans.k == 0 {
            return invalid("kmeans.k must be at least 1".to_string());
        }
        if self.kmeans.max_iterations == 0 {
            return invalid("kmeans.max_iterations must be at least 1".to_string());
        }
        if self.kmeans.convergence == ConvergenceMode::StableTransfers
            && self.kmeans.stable_window == 0
        {
            return invalid("kmeans.stable_window must be at least 1".to_string());
        }
        if self.som.grid_size == 0 {
            return invalid("som.grid_size must be at least 1".to_string());
        }
        if self.som.epochs == 0 {
            return invalid("som.epochs must be at least 1".to_string());
        }
        let rate = self.som.initial_learning_rate;
        if !(rate > 0.0 && rate <= 1.0) {
            return invalid(format!(
                "som.initial_learning_rate must be in (0, 1], got {rate}"
            ));
        }
        if !self.evaluation.prefetch_threshold.is_finite() {
            return invalid("evaluation.prefetch_threshold must be finite".to_string());
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `root`
    pub fn init_config_file(
        root: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

//! Configuration for the pipeline and the services built on it
//!
//! Loaded from TOML, then overridden from `CSVISION_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{PipelineError, Result};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CSVISION_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Text featurization
    pub text: TextConfig,
    /// SDCA linear regression
    pub sdca: SdcaConfig,
    /// Logistic regression
    pub logistic: LogisticConfig,
    /// Gradient-boosted trees
    pub trees: TreeConfig,
    /// Upload cleaning
    pub cleaning: CleaningConfig,
    /// HTTP service
    pub server: ServerConfig,
}

/// Bag-of-words featurization of text columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Max vocabulary entries kept per text column
    pub max_vocabulary: usize,
    /// Add adjacent-word bigrams to the vocabulary
    pub bigrams: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdcaConfig {
    /// L2 regularization strength
    pub l2: f64,
    pub max_epochs: usize,
    /// Stop once the largest weight step of an epoch falls below this
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    pub l2: f64,
    pub learning_rate: f64,
    pub max_iterations: usize,
    /// Stop once the gradient norm falls below this
    pub tolerance: f64,
}

/// Boosted tree ensemble parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub learning_rate: f64,
    /// Max candidate thresholds per feature and node
    pub max_bins: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Drop columns whose header cell is blank
    pub drop_unnamed_columns: bool,
    /// Drop columns whose blank fraction exceeds this value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_missing_fraction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Minimum data rows (excluding header) an upload must contain
    pub min_rows: usize,
    /// Max accepted request body size
    pub max_upload_bytes: usize,
    /// Directory for staged uploads; system temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            max_vocabulary: 1000,
            bigrams: true,
        }
    }
}

impl Default for SdcaConfig {
    fn default() -> Self {
        Self {
            l2: 1e-6,
            max_epochs: 50,
            tolerance: 1e-6,
        }
    }
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            l2: 1e-4,
            learning_rate: 1.0,
            max_iterations: 500,
            tolerance: 1e-6,
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            max_depth: 4,
            min_samples_leaf: 10,
            learning_rate: 0.2,
            max_bins: 255,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            min_rows: 100,
            max_upload_bytes: 50 * 1024 * 1024, // 50MB
            staging_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvOverrides {
            lookup: &lookup,
            applied: 0,
        };

        env.apply("TEXT_MAX_VOCABULARY", &mut self.text.max_vocabulary);
        env.apply("TEXT_BIGRAMS", &mut self.text.bigrams);
        env.apply("SDCA_L2", &mut self.sdca.l2);
        env.apply("SDCA_MAX_EPOCHS", &mut self.sdca.max_epochs);
        env.apply("LOGISTIC_L2", &mut self.logistic.l2);
        env.apply("LOGISTIC_MAX_ITERATIONS", &mut self.logistic.max_iterations);
        env.apply("TREES_NUM_TREES", &mut self.trees.num_trees);
        env.apply("TREES_MAX_DEPTH", &mut self.trees.max_depth);
        env.apply("TREES_MIN_SAMPLES_LEAF", &mut self.trees.min_samples_leaf);
        env.apply("TREES_LEARNING_RATE", &mut self.trees.learning_rate);
        env.apply("CLEANING_DROP_UNNAMED", &mut self.cleaning.drop_unnamed_columns);
        env.apply("SERVER_HOST", &mut self.server.host);
        env.apply("SERVER_PORT", &mut self.server.port);
        env.apply("SERVER_MIN_ROWS", &mut self.server.min_rows);
        env.apply("SERVER_MAX_UPLOAD_BYTES", &mut self.server.max_upload_bytes);

        if let Some(fraction) = env.value("CLEANING_MAX_MISSING_FRACTION") {
            match fraction.parse::<f64>() {
                Ok(v) => {
                    self.cleaning.max_missing_fraction = Some(v);
                    env.applied += 1;
                }
                Err(_) => warn!(value = %fraction, "ignoring invalid CLEANING_MAX_MISSING_FRACTION"),
            }
        }
        if let Some(dir) = env.value("SERVER_STAGING_DIR") {
            self.server.staging_dir = Some(PathBuf::from(dir));
            env.applied += 1;
        }

        if env.applied > 0 {
            info!("Applied {} environment overrides", env.applied);
        }
        self.validate()
    }

    /// Reject values no trainer can work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PipelineError::Config(msg.to_string()));

        if self.text.max_vocabulary == 0 {
            return invalid("text.max_vocabulary must be at least 1");
        }
        if !(self.sdca.l2 > 0.0) {
            return invalid("sdca.l2 must be positive");
        }
        if self.sdca.max_epochs == 0 {
            return invalid("sdca.max_epochs must be at least 1");
        }
        if !(self.logistic.learning_rate > 0.0) || self.logistic.l2 < 0.0 {
            return invalid("logistic.learning_rate must be positive and logistic.l2 non-negative");
        }
        if self.trees.num_trees == 0 || self.trees.min_samples_leaf == 0 || self.trees.max_bins < 2 {
            return invalid("trees.num_trees, trees.min_samples_leaf must be positive and trees.max_bins at least 2");
        }
        if !(self.trees.learning_rate > 0.0 && self.trees.learning_rate <= 1.0) {
            return invalid("trees.learning_rate must be in (0, 1]");
        }
        if let Some(fraction) = self.cleaning.max_missing_fraction {
            if !(0.0..=1.0).contains(&fraction) {
                return invalid("cleaning.max_missing_fraction must be in [0, 1]");
            }
        }
        Ok(())
    }
}

struct EnvOverrides<'a, F> {
    lookup: &'a F,
    applied: usize,
}

impl<'a, F> EnvOverrides<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn value(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}"))
    }

    fn apply<T: FromStr>(&mut self, key: &str, field: &mut T) {
        if let Some(raw) = self.value(key) {
            match raw.parse::<T>() {
                Ok(v) => {
                    *field = v;
                    self.applied += 1;
                }
                Err(_) => warn!(key = %key, value = %raw, "ignoring invalid environment override"),
            }
        }
    }
}

//! Network architecture, training hyperparameters and the `key = value`
//! text format used by the training, camera and light files.
//!
//! # Example
//!
//! ```rust
//! use sirensdf::SirenConfig;
//!
//! let config = SirenConfig::sdf(2, 64, 512);
//! assert_eq!(config.layer_dims(), vec![3, 64, 64, 64, 1]);
//! assert!(config.validate().is_ok());
//!
//! let bad = SirenConfig { hidden_size: 0, ..Default::default() };
//! assert!(bad.validate().is_err());
//! ```
//!
//! # Text configs
//!
//! Training, camera and light settings are stored one per line:
//!
//! ```text
//! lr = 1e-4
//! n_epochs  = 100
//! log_every_n_epochs  = 10
//! ```
//!
//! Vector values are comma separated (`camera_position = 0, 1.5, -3`).
//! Blank lines and lines starting with `#` are ignored.

use std::path::Path;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SirenResult;
use crate::layout::LayerShape;

/// Default number of hidden-to-hidden layers.
pub const DEFAULT_N_HIDDEN: usize = 2;

/// Default hidden width.
pub const DEFAULT_HIDDEN_SIZE: usize = 64;

/// Default batch capacity.
pub const DEFAULT_BATCH_SIZE: usize = 512;

/// Architecture and buffer capacity of a SIREN network.
///
/// The layer sequence is `(hidden_size, input_dim)`, then `n_hidden` copies
/// of `(hidden_size, hidden_size)`, then `(output_dim, hidden_size)`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SirenConfig {
    /// Number of hidden-to-hidden layers (may be zero).
    pub n_hidden: usize,
    /// Width of every hidden layer.
    pub hidden_size: usize,
    /// Largest batch a single forward may carry.
    pub batch_size: usize,
    /// Input features per sample (3 for an SDF).
    pub input_dim: usize,
    /// Output features per sample (1 for an SDF).
    pub output_dim: usize,
    /// Seed for weight initialization, `None` draws from entropy.
    pub init_seed: Option<u64>,
}

impl Default for SirenConfig {
    fn default() -> Self {
        Self::sdf(DEFAULT_N_HIDDEN, DEFAULT_HIDDEN_SIZE, DEFAULT_BATCH_SIZE)
    }
}

impl SirenConfig {
    /// Signed-distance preset: 3D points in, one distance out.
    pub fn sdf(n_hidden: usize, hidden_size: usize, batch_size: usize) -> Self {
        Self {
            n_hidden,
            hidden_size,
            batch_size,
            input_dim: 3,
            output_dim: 1,
            init_seed: None,
        }
    }

    /// Returns a copy with a fixed initialization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.init_seed = Some(seed);
        self
    }

    /// Returns a copy with a different batch capacity.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Feature widths from input to output, e.g. `[3, 64, 64, 1]`.
    pub fn layer_dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.n_hidden + 3);
        dims.push(self.input_dim);
        dims.extend(std::iter::repeat(self.hidden_size).take(self.n_hidden + 1));
        dims.push(self.output_dim);
        dims
    }

    /// Ordered `(out_dim, in_dim)` shape of every linear layer.
    pub fn layer_shapes(&self) -> Vec<LayerShape> {
        self.layer_dims()
            .windows(2)
            .map(|w| LayerShape::new(w[1], w[0]))
            .collect()
    }

    /// Total number of weights and biases.
    pub fn param_count(&self) -> usize {
        self.layer_shapes().iter().map(LayerShape::param_count).sum()
    }

    /// Checks that every dimension is positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_dim == 0 {
            return Err(ConfigError::InvalidDimension("input_dim must be > 0"));
        }
        if self.output_dim == 0 {
            return Err(ConfigError::InvalidDimension("output_dim must be > 0"));
        }
        if self.hidden_size == 0 {
            return Err(ConfigError::InvalidDimension("hidden_size must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidDimension("batch_size must be > 0"));
        }
        Ok(())
    }
}

/// Training loop hyperparameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainConfig {
    /// Adam learning rate.
    pub lr: f32,
    /// Number of passes over the data.
    pub n_epochs: usize,
    /// Epoch loss is logged every this many epochs.
    pub log_every_n_epochs: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            n_epochs: 100,
            log_every_n_epochs: 10,
        }
    }
}

impl TrainConfig {
    /// Reads a training config file.
    pub fn load<P: AsRef<Path>>(path: P) -> SirenResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(text.parse()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.lr));
        }
        if self.log_every_n_epochs == 0 {
            return Err(ConfigError::InvalidDimension(
                "log_every_n_epochs must be > 0",
            ));
        }
        Ok(())
    }
}

impl FromStr for TrainConfig {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let kv = KeyValues::parse(text)?;
        let config = Self {
            lr: kv.f32("lr")?,
            n_epochs: kv.usize("n_epochs")?,
            log_every_n_epochs: kv.usize("log_every_n_epochs")?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parsed `key = value` lines.
#[derive(Clone, Debug, Default)]
pub struct KeyValues {
    entries: Vec<(String, String)>,
}

impl KeyValues {
    /// Splits `text` into trimmed key/value pairs. Later keys shadow earlier ones.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(ConfigError::InvalidLine(idx + 1))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::InvalidLine(idx + 1));
            }
            entries.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self { entries })
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Result<&str, ConfigError> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn f32(&self, key: &str) -> Result<f32, ConfigError> {
        parse_value(key, self.get(key)?)
    }

    pub fn usize(&self, key: &str) -> Result<usize, ConfigError> {
        parse_value(key, self.get(key)?)
    }

    /// Three comma separated floats.
    pub fn vec3(&self, key: &str) -> Result<[f32; 3], ConfigError> {
        let value = self.get(key)?;
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        Ok([
            parse_value(key, parts[0])?,
            parse_value(key, parts[1])?,
            parse_value(key, parts[2])?,
        ])
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Configuration validation and parsing errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(&'static str),

    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(f32),

    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Line {0} is not of the form `key = value`")]
    InvalidLine(usize),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_shapes() {
        let config = SirenConfig::sdf(1, 8, 4);
        let shapes = config.layer_shapes();
        assert_eq!(
            shapes,
            vec![
                LayerShape::new(8, 3),
                LayerShape::new(8, 8),
                LayerShape::new(1, 8)
            ]
        );
        assert_eq!(config.param_count(), (8 * 3 + 8) + (8 * 8 + 8) + (8 + 1));
    }

    #[test]
    fn test_zero_hidden_layers() {
        let config = SirenConfig::sdf(0, 2, 2);
        assert_eq!(config.layer_dims(), vec![3, 2, 1]);
        assert_eq!(config.layer_shapes().len(), 2);
    }

    #[test]
    fn test_validate_rejects_zero() {
        for bad in [
            SirenConfig { hidden_size: 0, ..Default::default() },
            SirenConfig { batch_size: 0, ..Default::default() },
            SirenConfig { input_dim: 0, ..Default::default() },
            SirenConfig { output_dim: 0, ..Default::default() },
        ] {
            assert!(matches!(
                bad.validate(),
                Err(ConfigError::InvalidDimension(_))
            ));
        }
    }

    #[test]
    fn test_train_config_parse() {
        let text = "lr = 1e-4\nn_epochs  = 100\nlog_every_n_epochs  = 10\n";
        let config: TrainConfig = text.parse().unwrap();
        assert_eq!(config.lr, 1e-4);
        assert_eq!(config.n_epochs, 100);
        assert_eq!(config.log_every_n_epochs, 10);
    }

    #[test]
    fn test_train_config_missing_key() {
        let err = "lr = 0.1\nn_epochs = 3".parse::<TrainConfig>().unwrap_err();
        assert_eq!(err, ConfigError::MissingKey("log_every_n_epochs".into()));
    }

    #[test]
    fn test_train_config_rejects_bad_lr() {
        let err = "lr = -1\nn_epochs = 3\nlog_every_n_epochs = 1"
            .parse::<TrainConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLearningRate(_)));
    }

    #[test]
    fn test_key_values_vec3_and_comments() {
        let kv = KeyValues::parse("# camera\ncamera_position = 0, 1.5, -3\n\nz_near = 0.1").unwrap();
        assert_eq!(kv.vec3("camera_position").unwrap(), [0.0, 1.5, -3.0]);
        assert_eq!(kv.f32("z_near").unwrap(), 0.1);
        assert!(kv.vec3("z_near").is_err());
    }

    #[test]
    fn test_key_values_invalid_line() {
        assert_eq!(
            KeyValues::parse("lr = 1\ngarbage").unwrap_err(),
            ConfigError::InvalidLine(2)
        );
    }
}

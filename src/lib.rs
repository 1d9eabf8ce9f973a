//! # rs-gpt2-config
//!
//! Typed loading and validation of the configuration documents that drive
//! GPT-2 style language model training runs.
//!
//! ## Core Concept
//!
//! A training run is parameterized by one document with three sections:
//! - **data**: remote shard URL patterns and a tokenized cache directory
//! - **model**: transformer shape and attention tweaks
//! - **trainer**: tracking metadata, precision policy, optimizer and parallelism
//!
//! Documents are parsed once at process start, defaults are applied, every
//! field is range-checked, and the result is held read-only for the run.
//!
//! ## Example
//!
//! ```ignore
//! use rs_gpt2_config::TrainConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = TrainConfig::from_file("config/gpt2_large.yaml")?;
//!     println!("head size: {}", config.model.head_size());
//!     for url in config.data.shard_urls("train")? {
//!         println!("{}", url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;

// Re-exports for convenience
pub use config::{
    Activation, DataConfig, Gpt2Config, LrSchedule, MixedPrecisionPolicy, ParallelismLayout,
    ParamEstimate, TrainConfig, TrainerConfig, WandbConfig, WandbMode,
};

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid shard pattern '{pattern}': {reason}")]
    ShardPattern { pattern: String, reason: String },

    #[error("Invalid precision policy '{policy}': {reason}")]
    Precision { policy: String, reason: String },

    #[error("Invalid override: {0}")]
    Override(String),

    #[error("Unknown split: {0}")]
    UnknownSplit(String),

    #[error("Invalid parallelism layout: {0}")]
    Layout(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

//! Data source configuration: shard locations and the tokenized cache.

use serde::{Deserialize, Serialize};

use super::shards::{expand_pattern, validate_pattern};
use crate::{ConfigError, Result};

pub const TRAIN_SPLIT: &str = "train";
pub const VALIDATION_SPLIT: &str = "validation";

/// Where training and validation text comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Shard URL patterns for the training split
    pub train_urls: Vec<String>,

    /// Shard URL patterns for the validation split
    #[serde(default)]
    pub validation_urls: Vec<String>,

    /// Directory (local or object store) holding tokenized shards
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Tokenizer name or path
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,

    /// Documents per cache chunk
    #[serde(default = "default_rows_per_chunk")]
    pub rows_per_chunk: usize,
}

fn default_cache_dir() -> String {
    "cache/".to_string()
}

fn default_tokenizer() -> String {
    "gpt2".to_string()
}

fn default_rows_per_chunk() -> usize {
    8192
}

impl DataConfig {
    pub fn new(train_urls: Vec<String>) -> Self {
        Self {
            train_urls,
            validation_urls: Vec::new(),
            cache_dir: default_cache_dir(),
            tokenizer: default_tokenizer(),
            rows_per_chunk: default_rows_per_chunk(),
        }
    }

    /// Splits that have at least one source pattern
    pub fn splits(&self) -> Vec<&'static str> {
        [TRAIN_SPLIT, VALIDATION_SPLIT]
            .into_iter()
            .filter(|split| self.urls_for(split).is_ok_and(|urls| !urls.is_empty()))
            .collect()
    }

    /// Raw URL patterns for a split
    pub fn urls_for(&self, split: &str) -> Result<&[String]> {
        match split {
            TRAIN_SPLIT => Ok(&self.train_urls),
            VALIDATION_SPLIT => Ok(&self.validation_urls),
            other => Err(ConfigError::UnknownSplit(other.to_string())),
        }
    }

    /// Concrete shard URLs for a split, in document order
    pub fn shard_urls(&self, split: &str) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        for pattern in self.urls_for(split)? {
            urls.extend(expand_pattern(pattern)?);
        }
        Ok(urls)
    }

    /// Cache location for one split.
    ///
    /// Joined with `/` since the cache may live in an object store.
    pub fn split_cache_dir(&self, split: &str) -> Result<String> {
        self.urls_for(split)?;
        let base = self.cache_dir.trim_end_matches('/');
        Ok(format!("{}/{}", base, split))
    }

    pub fn validate(&self) -> Result<()> {
        if self.train_urls.is_empty() {
            return Err(ConfigError::invalid(
                "data.train_urls",
                "at least one training shard pattern is required",
            ));
        }

        for pattern in self.train_urls.iter().chain(&self.validation_urls) {
            validate_pattern(pattern)?;
        }

        if self.cache_dir.trim().is_empty() {
            return Err(ConfigError::invalid("data.cache_dir", "must not be empty"));
        }
        if self.tokenizer.trim().is_empty() {
            return Err(ConfigError::invalid("data.tokenizer", "must not be empty"));
        }
        if self.rows_per_chunk == 0 {
            return Err(ConfigError::invalid("data.rows_per_chunk", "must be positive"));
        }

        if self.validation_urls.is_empty() {
            tracing::warn!("No validation urls configured, evaluation will be skipped");
        }

        Ok(())
    }
}

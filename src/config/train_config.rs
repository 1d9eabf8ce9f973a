//! Top-level training document and loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::data_config::DataConfig;
use super::model_config::Gpt2Config;
use super::overrides::apply_overrides;
use super::shards::is_remote;
use super::trainer_config::TrainerConfig;
use crate::{ConfigError, Result};

/// On-disk document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from a file extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A complete training run document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    pub data: DataConfig,

    #[serde(default)]
    pub model: Gpt2Config,

    #[serde(default)]
    pub trainer: TrainerConfig,
}

impl TrainConfig {
    /// Load and validate a document from a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_overrides(path, &[] as &[&str])
    }

    /// Load a document, apply `key.path=value` overrides, then validate
    pub fn from_file_with_overrides<S: AsRef<str>>(
        path: impl AsRef<Path>,
        overrides: &[S],
    ) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        tracing::info!("Loading training config from {:?}", path);

        let content = std::fs::read_to_string(path)?;
        let mut doc: serde_yaml::Value = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(&content)?,
            ConfigFormat::Json => serde_json::from_str(&content)?,
        };

        if !overrides.is_empty() {
            apply_overrides(&mut doc, overrides)?;
        }

        let config: TrainConfig = serde_yaml::from_value(doc)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: TrainConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: TrainConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize every field, defaults included
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the normalized document to a file, format chosen by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Yaml => self.to_yaml_string()?,
            ConfigFormat::Json => self.to_json_string()?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.model.validate()?;
        self.trainer.validate()?;

        let remote_sources = self
            .data
            .train_urls
            .iter()
            .chain(&self.data.validation_urls)
            .any(|url| is_remote(url));
        if remote_sources && !is_remote(&self.data.cache_dir) {
            tracing::warn!(
                "Shards are remote but cache_dir {:?} is local; each host builds its own cache",
                self.data.cache_dir
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Activation, LrSchedule, TRAIN_SPLIT, VALIDATION_SPLIT};
    use candle_core::DType;
    use std::io::Write;

    const GPT2_LARGE: &str = include_str!("../../config/gpt2_large.yaml");

    const MINIMAL: &str = r#"
data:
  train_urls: ["gs://b/train.{1..4}.jsonl.gz"]
model:
  hidden_dim: 256
  num_heads: 4
  num_layers: 2
  seq_len: 128
"#;

    #[test]
    fn test_gpt2_large_document() {
        let config = TrainConfig::from_yaml_str(GPT2_LARGE).unwrap();

        assert_eq!(config.model.hidden_dim, 1280);
        assert_eq!(config.model.num_heads, 20);
        assert_eq!(config.model.num_layers, 36);
        assert_eq!(config.model.seq_len, 1024);
        assert!(config.model.gradient_checkpointing);
        assert!(config.model.scale_attn_by_inverse_layer_idx);
        assert_eq!(config.model.head_size(), 64);

        assert_eq!(config.trainer.wandb.project, "levanter");
        assert_eq!(config.trainer.wandb.tags, vec!["openwebtext", "gpt2"]);
        assert_eq!(config.trainer.mp.param, DType::F32);
        assert_eq!(config.trainer.mp.compute, DType::BF16);
        assert_eq!(config.trainer.learning_rate, 1e-4);
        assert_eq!(config.trainer.weight_decay, 0.1);
        assert_eq!(config.trainer.model_axis_size, 1);
        assert_eq!(config.trainer.per_device_parallelism, Some(8));

        assert_eq!(config.data.shard_urls(TRAIN_SPLIT).unwrap().len(), 128);
        assert_eq!(config.data.shard_urls(VALIDATION_SPLIT).unwrap().len(), 8);
        assert_eq!(
            config.data.split_cache_dir(TRAIN_SPLIT).unwrap(),
            "gs://pubmed-mosaic/tokenized/openwebtext/train"
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config = TrainConfig::from_yaml_str(MINIMAL).unwrap();

        assert!(!config.model.scale_attn_by_inverse_layer_idx);
        assert!(!config.model.upcast_attn);
        assert_eq!(config.model.mlp_scale, 4);
        assert_eq!(config.model.activation_function, Activation::GeluNew);
        assert!(config.data.validation_urls.is_empty());
        assert_eq!(config.data.cache_dir, "cache/");
        assert_eq!(config.trainer.mp.compute, DType::F32);
        assert_eq!(config.trainer.lr_schedule, LrSchedule::Cosine);
        assert_eq!(config.trainer.per_device_parallelism, None);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = TrainConfig::from_yaml_str(GPT2_LARGE).unwrap();
        let yaml = config.to_yaml_string().unwrap();
        let reparsed = TrainConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_json_round_trip() {
        let config = TrainConfig::from_yaml_str(GPT2_LARGE).unwrap();
        let json = config.to_json_string().unwrap();
        let reparsed = TrainConfig::from_json_str(&json).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_rejects_heads_not_dividing_hidden_dim() {
        let doc = GPT2_LARGE.replace("num_heads: 20", "num_heads: 24");
        let err = TrainConfig::from_yaml_str(&doc).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "model.num_heads"));
    }

    #[test]
    fn test_rejects_missing_train_urls() {
        let doc = "data:\n  cache_dir: cache/\nmodel:\n  num_layers: 2\n";
        let err = TrainConfig::from_yaml_str(doc).unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
        assert!(err.to_string().contains("train_urls"));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let doc = MINIMAL.replace("num_layers: 2", "num_layers: 2\n  num_experts: 8");
        assert!(TrainConfig::from_yaml_str(&doc).is_err());
    }

    #[test]
    fn test_rejects_malformed_url() {
        let doc = MINIMAL.replace("{1..4}", "{1..");
        let err = TrainConfig::from_yaml_str(&doc).unwrap_err();
        assert!(matches!(err, ConfigError::ShardPattern { .. }));
    }

    #[test]
    fn test_rejects_bad_precision_policy() {
        let doc = GPT2_LARGE.replace("c=bfloat16", "c=int4");
        assert!(TrainConfig::from_yaml_str(&doc).is_err());
    }

    #[test]
    fn test_load_file_with_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(GPT2_LARGE.as_bytes()).unwrap();

        let config = TrainConfig::from_file_with_overrides(
            file.path(),
            &["model.num_layers=24", "trainer.mp=bf16"],
        )
        .unwrap();
        assert_eq!(config.model.num_layers, 24);
        assert_eq!(config.trainer.mp.param, DType::BF16);
    }

    #[test]
    fn test_override_can_invalidate() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(GPT2_LARGE.as_bytes()).unwrap();

        let result = TrainConfig::from_file_with_overrides(file.path(), &["model.num_heads=7"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload_json() {
        let config = TrainConfig::from_yaml_str(MINIMAL).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        config.save(&path).unwrap();
        assert_eq!(TrainConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            TrainConfig::from_file("run.toml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}

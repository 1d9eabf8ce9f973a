//! Trainer configuration: tracking, precision, optimizer and parallelism.

use serde::{Deserialize, Serialize};

use super::precision::MixedPrecisionPolicy;
use crate::{ConfigError, Result};

/// Experiment tracker run mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WandbMode {
    #[default]
    Online,
    Offline,
    Disabled,
}

/// Experiment tracking metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WandbConfig {
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Run tags, treated as a set
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub mode: WandbMode,
}

impl Default for WandbConfig {
    fn default() -> Self {
        Self {
            project: "gpt2".to_string(),
            entity: None,
            name: None,
            tags: Vec::new(),
            notes: None,
            mode: WandbMode::Online,
        }
    }
}

/// Learning rate decay after warmup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LrSchedule {
    Constant,
    Linear,
    #[default]
    Cosine,
}

/// Optimizer, precision and device-mesh settings for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    pub wandb: WandbConfig,

    /// Mixed precision policy, e.g. `p=f32,c=bfloat16`
    pub mp: MixedPrecisionPolicy,

    pub seed: u64,

    pub num_train_steps: usize,

    /// Global batch size in sequences
    pub train_batch_size: usize,

    /// Sequences per device per microbatch; derived from the batch size when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_device_parallelism: Option<usize>,

    /// Devices a single model replica is sharded across
    pub model_axis_size: usize,

    pub learning_rate: f64,
    pub weight_decay: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,

    /// Gradient clipping threshold, none disables clipping
    pub max_grad_norm: Option<f64>,

    /// Fraction of steps spent warming up the learning rate
    pub warmup_ratio: f64,
    pub lr_schedule: LrSchedule,
    /// Final learning rate as a fraction of the peak
    pub min_lr_ratio: f64,

    pub steps_per_eval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            wandb: WandbConfig::default(),
            mp: MixedPrecisionPolicy::default(),
            seed: 0,
            num_train_steps: 400_000,
            train_batch_size: 512,
            per_device_parallelism: None,
            model_axis_size: 1,
            learning_rate: 6e-4,
            weight_decay: 0.0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            max_grad_norm: Some(1.0),
            warmup_ratio: 0.01,
            lr_schedule: LrSchedule::Cosine,
            min_lr_ratio: 0.0,
            steps_per_eval: 1000,
        }
    }
}

/// How a global batch maps onto a device mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelismLayout {
    pub num_devices: usize,
    pub model_axis_size: usize,
    /// Number of model replicas
    pub data_axis_size: usize,
    pub per_device_parallelism: usize,
    /// Microbatches accumulated per optimizer step
    pub grad_accum_steps: usize,
}

impl ParallelismLayout {
    /// Sequences processed by the whole mesh in one microbatch
    pub fn microbatch_size(&self) -> usize {
        self.per_device_parallelism * self.data_axis_size
    }
}

impl TrainerConfig {
    /// Number of warmup steps implied by `warmup_ratio`
    pub fn warmup_steps(&self) -> usize {
        (self.warmup_ratio * self.num_train_steps as f64).round() as usize
    }

    /// Work out the device mesh for `num_devices` accelerators
    pub fn layout(&self, num_devices: usize) -> Result<ParallelismLayout> {
        if num_devices == 0 {
            return Err(ConfigError::Layout("no devices".to_string()));
        }
        if self.model_axis_size == 0 || self.train_batch_size == 0 {
            return Err(ConfigError::Layout(
                "model_axis_size and train_batch_size must be positive".to_string(),
            ));
        }
        if num_devices % self.model_axis_size != 0 {
            return Err(ConfigError::Layout(format!(
                "model_axis_size {} does not divide {} devices",
                self.model_axis_size, num_devices
            )));
        }
        let data_axis_size = num_devices / self.model_axis_size;

        let per_device_parallelism = match self.per_device_parallelism {
            Some(0) => {
                return Err(ConfigError::Layout("per_device_parallelism is zero".to_string()));
            }
            Some(n) => n,
            None => {
                if self.train_batch_size % data_axis_size != 0 {
                    return Err(ConfigError::Layout(format!(
                        "train_batch_size {} is not divisible by data axis size {}",
                        self.train_batch_size, data_axis_size
                    )));
                }
                self.train_batch_size / data_axis_size
            }
        };

        let microbatch = per_device_parallelism
            .checked_mul(data_axis_size)
            .ok_or_else(|| ConfigError::Layout("microbatch size overflows".to_string()))?;
        if self.train_batch_size % microbatch != 0 {
            return Err(ConfigError::Layout(format!(
                "train_batch_size {} is not divisible by microbatch size {} ({} per device x {} replicas)",
                self.train_batch_size, microbatch, per_device_parallelism, data_axis_size
            )));
        }

        Ok(ParallelismLayout {
            num_devices,
            model_axis_size: self.model_axis_size,
            data_axis_size,
            per_device_parallelism,
            grad_accum_steps: self.train_batch_size / microbatch,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.wandb.project.trim().is_empty() {
            return Err(ConfigError::invalid("trainer.wandb.project", "must not be empty"));
        }
        for (i, tag) in self.wandb.tags.iter().enumerate() {
            if self.wandb.tags[..i].contains(tag) {
                return Err(ConfigError::invalid(
                    "trainer.wandb.tags",
                    format!("duplicate tag '{}'", tag),
                ));
            }
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::invalid(
                "trainer.learning_rate",
                format!("{} is not positive", self.learning_rate),
            ));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(ConfigError::invalid(
                "trainer.weight_decay",
                format!("{} is negative", self.weight_decay),
            ));
        }

        for (field, value) in [
            ("trainer.model_axis_size", self.model_axis_size),
            ("trainer.train_batch_size", self.train_batch_size),
            ("trainer.num_train_steps", self.num_train_steps),
            ("trainer.steps_per_eval", self.steps_per_eval),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        if self.per_device_parallelism == Some(0) {
            return Err(ConfigError::invalid(
                "trainer.per_device_parallelism",
                "must be positive",
            ));
        }

        for (field, beta) in [("trainer.beta1", self.beta1), ("trainer.beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(ConfigError::invalid(field, format!("{} is not in [0, 1)", beta)));
            }
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(ConfigError::invalid("trainer.epsilon", "must be positive"));
        }
        if let Some(norm) = self.max_grad_norm {
            if !norm.is_finite() || norm <= 0.0 {
                return Err(ConfigError::invalid("trainer.max_grad_norm", "must be positive"));
            }
        }

        for (field, ratio) in [
            ("trainer.warmup_ratio", self.warmup_ratio),
            ("trainer.min_lr_ratio", self.min_lr_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::invalid(field, format!("{} is not in [0, 1]", ratio)));
            }
        }

        if self.weight_decay > 1.0 {
            tracing::warn!("Weight decay {} is unusually large", self.weight_decay);
        }

        Ok(())
    }
}

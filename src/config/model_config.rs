//! GPT-2 model configuration.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Activation used between the two MLP projections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Tanh approximation of GELU used by the original GPT-2
    #[default]
    GeluNew,
    Gelu,
    Relu,
    Silu,
    QuickGelu,
}

/// Model architecture hyperparameters for a GPT-2 style decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Gpt2Config {
    /// Maximum sequence length (context window)
    pub seq_len: usize,

    /// Hidden size (embedding dimension)
    pub hidden_dim: usize,

    /// Number of transformer layers
    pub num_layers: usize,

    /// Number of attention heads, must divide `hidden_dim`
    pub num_heads: usize,

    /// MLP width as a multiple of the hidden size
    pub mlp_scale: usize,

    /// Standard deviation of the weight initializer
    pub initializer_range: f64,

    pub embed_pdrop: f64,
    pub resid_pdrop: f64,
    pub attn_pdrop: f64,

    pub layer_norm_epsilon: f64,

    pub activation_function: Activation,

    /// Divide attention scores by `layer_idx + 1` to keep deep stacks stable
    pub scale_attn_by_inverse_layer_idx: bool,

    /// Compute attention scores in f32 regardless of compute dtype
    pub upcast_attn: bool,

    /// Recompute activations in the backward pass instead of storing them
    pub gradient_checkpointing: bool,

    /// Layers per checkpointed block
    pub gradient_checkpointing_block_size: usize,

    /// Use bias in linear projections
    pub use_bias: bool,
}

impl Default for Gpt2Config {
    fn default() -> Self {
        Self {
            seq_len: 512,
            hidden_dim: 768,
            num_layers: 12,
            num_heads: 12,
            mlp_scale: 4,
            initializer_range: 0.02,
            // dropout doesn't help at this scale
            embed_pdrop: 0.0,
            resid_pdrop: 0.0,
            attn_pdrop: 0.0,
            layer_norm_epsilon: 1e-5,
            activation_function: Activation::GeluNew,
            scale_attn_by_inverse_layer_idx: false,
            upcast_attn: false,
            gradient_checkpointing: true,
            gradient_checkpointing_block_size: 5,
            use_bias: true,
        }
    }
}

/// Approximate parameter counts for a model shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamEstimate {
    /// Token and position embeddings
    pub embedding: usize,
    /// One transformer block
    pub per_layer: usize,
    /// Everything, with the LM head tied to the token embedding
    pub total: usize,
}

impl Gpt2Config {
    /// Get head dimension
    pub fn head_size(&self) -> usize {
        self.hidden_dim / self.num_heads
    }

    /// Get MLP intermediate size
    pub fn mlp_dim(&self) -> usize {
        self.hidden_dim.saturating_mul(self.mlp_scale)
    }

    /// Multiplier applied to queries before the attention dot product
    pub fn attention_scale(&self, layer_idx: usize) -> f64 {
        let scale = 1.0 / (self.head_size() as f64).sqrt();
        if self.scale_attn_by_inverse_layer_idx {
            scale / (layer_idx as f64 + 1.0)
        } else {
            scale
        }
    }

    /// Estimate parameter counts for the given vocabulary size.
    ///
    /// Fails when any count does not fit in `usize`.
    pub fn param_estimate(&self, vocab_size: usize) -> Result<ParamEstimate> {
        let overflow = || ConfigError::invalid("model", "parameter count overflows usize");
        let mul = |a: usize, b: usize| a.checked_mul(b).ok_or_else(overflow);
        let sum = |parts: &[usize]| {
            parts
                .iter()
                .try_fold(0usize, |acc, &n| acc.checked_add(n))
                .ok_or_else(overflow)
        };
        let bias = |n: usize| if self.use_bias { n } else { 0 };

        let h = self.hidden_dim;
        let mlp = mul(h, self.mlp_scale)?;
        let layer_norm = mul(2, h)?;

        let qkv = mul(mul(h, 3)?, h)?;
        let attention = sum(&[qkv, bias(mul(3, h)?), mul(h, h)?, bias(h)])?;
        let projection = mul(h, mlp)?;
        let feed_forward = sum(&[projection, bias(mlp), projection, bias(h)])?;
        let per_layer = sum(&[mul(2, layer_norm)?, attention, feed_forward])?;

        let embedding = sum(&[mul(vocab_size, h)?, mul(self.seq_len, h)?])?;
        let total = sum(&[embedding, mul(per_layer, self.num_layers)?, layer_norm])?;

        Ok(ParamEstimate {
            embedding,
            per_layer,
            total,
        })
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("model.seq_len", self.seq_len),
            ("model.hidden_dim", self.hidden_dim),
            ("model.num_layers", self.num_layers),
            ("model.num_heads", self.num_heads),
            ("model.mlp_scale", self.mlp_scale),
            (
                "model.gradient_checkpointing_block_size",
                self.gradient_checkpointing_block_size,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }

        if self.hidden_dim % self.num_heads != 0 {
            return Err(ConfigError::invalid(
                "model.num_heads",
                format!(
                    "{} heads do not divide hidden_dim {}",
                    self.num_heads, self.hidden_dim
                ),
            ));
        }

        // Every validated shape can be sized without overflow
        self.param_estimate(0)?;

        for (field, p) in [
            ("model.embed_pdrop", self.embed_pdrop),
            ("model.resid_pdrop", self.resid_pdrop),
            ("model.attn_pdrop", self.attn_pdrop),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(ConfigError::invalid(field, format!("{} is not in [0, 1)", p)));
            }
        }

        for (field, value) in [
            ("model.initializer_range", self.initializer_range),
            ("model.layer_norm_epsilon", self.layer_norm_epsilon),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::invalid(field, format!("{} is not positive", value)));
            }
        }

        if self.gradient_checkpointing
            && self.gradient_checkpointing_block_size > self.num_layers
        {
            tracing::warn!(
                "Checkpoint block size {} exceeds layer count {}",
                self.gradient_checkpointing_block_size,
                self.num_layers
            );
        }

        Ok(())
    }
}

//! Mixed precision policy parsing.
//!
//! A policy names the dtype used to store parameters, the dtype used for
//! compute, and the dtype of outputs, e.g. `p=f32,c=bfloat16`.

use std::fmt;
use std::str::FromStr;

use candle_core::DType;

use crate::{ConfigError, Result};

/// Parse a dtype name to candle DType
pub fn parse_dtype(dtype_str: &str) -> Option<DType> {
    match dtype_str.trim().to_lowercase().as_str() {
        "f32" | "float32" | "full" => Some(DType::F32),
        "f16" | "float16" | "half" => Some(DType::F16),
        "bf16" | "bfloat16" => Some(DType::BF16),
        _ => None,
    }
}

/// Parameter, compute and output dtypes for a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixedPrecisionPolicy {
    /// Dtype parameters are stored in
    pub param: DType,
    /// Dtype matmuls and activations run in
    pub compute: DType,
    /// Dtype of model outputs
    pub output: DType,
}

impl Default for MixedPrecisionPolicy {
    fn default() -> Self {
        Self::uniform(DType::F32)
    }
}

impl MixedPrecisionPolicy {
    /// A policy that uses one dtype everywhere
    pub fn uniform(dtype: DType) -> Self {
        Self {
            param: dtype,
            compute: dtype,
            output: dtype,
        }
    }

    /// Whether compute runs in a different dtype than parameters
    pub fn is_mixed(&self) -> bool {
        self.param != self.compute
    }

    /// Bytes needed to store `num_params` parameters under this policy,
    /// `None` if that does not fit in `usize`
    pub fn param_bytes(&self, num_params: usize) -> Option<usize> {
        num_params.checked_mul(self.param.size_in_bytes())
    }

    /// Parse a policy string.
    ///
    /// Either a single dtype applying to everything, or comma-separated
    /// `key=dtype` pairs with keys `p`/`params`, `c`/`compute`, `o`/`output`.
    /// Compute defaults to the param dtype and output to the compute dtype.
    pub fn parse(policy: &str) -> Result<Self> {
        let err = |reason: String| ConfigError::Precision {
            policy: policy.to_string(),
            reason,
        };

        let trimmed = policy.trim();
        if trimmed.is_empty() {
            return Err(err("empty policy".to_string()));
        }

        if !trimmed.contains('=') {
            let dtype =
                parse_dtype(trimmed).ok_or_else(|| err(format!("unknown dtype '{}'", trimmed)))?;
            return Ok(Self::uniform(dtype));
        }

        let mut param = None;
        let mut compute = None;
        let mut output = None;

        for part in trimmed.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| err(format!("expected key=dtype, got '{}'", part)))?;
            let dtype = parse_dtype(value)
                .ok_or_else(|| err(format!("unknown dtype '{}'", value.trim())))?;

            let slot = match key.trim() {
                "p" | "params" => &mut param,
                "c" | "compute" => &mut compute,
                "o" | "output" => &mut output,
                other => return Err(err(format!("unknown key '{}'", other))),
            };
            if slot.replace(dtype).is_some() {
                return Err(err(format!("duplicate key '{}'", key.trim())));
            }
        }

        let param = param.unwrap_or(DType::F32);
        let compute = compute.unwrap_or(param);
        let output = output.unwrap_or(compute);
        Ok(Self {
            param,
            compute,
            output,
        })
    }
}

impl FromStr for MixedPrecisionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MixedPrecisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p={},c={}", self.param.as_str(), self.compute.as_str())?;
        if self.output != self.compute {
            write!(f, ",o={}", self.output.as_str())?;
        }
        Ok(())
    }
}

impl serde::Serialize for MixedPrecisionPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for MixedPrecisionPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dtype_aliases() {
        assert_eq!(parse_dtype("f32"), Some(DType::F32));
        assert_eq!(parse_dtype("full"), Some(DType::F32));
        assert_eq!(parse_dtype("Half"), Some(DType::F16));
        assert_eq!(parse_dtype("bfloat16"), Some(DType::BF16));
        assert_eq!(parse_dtype("int8"), None);
    }

    #[test]
    fn test_parse_param_compute_policy() {
        let policy = MixedPrecisionPolicy::parse("p=f32,c=bfloat16").unwrap();
        assert_eq!(policy.param, DType::F32);
        assert_eq!(policy.compute, DType::BF16);
        assert_eq!(policy.output, DType::BF16);
        assert!(policy.is_mixed());
    }

    #[test]
    fn test_single_dtype_policy() {
        let policy: MixedPrecisionPolicy = "bf16".parse().unwrap();
        assert_eq!(policy, MixedPrecisionPolicy::uniform(DType::BF16));
        assert!(!policy.is_mixed());
    }

    #[test]
    fn test_long_keys_and_output() {
        let policy = MixedPrecisionPolicy::parse("params=f32, compute=f16, output=f32").unwrap();
        assert_eq!(policy.compute, DType::F16);
        assert_eq!(policy.output, DType::F32);
        assert_eq!(policy.to_string(), "p=f32,c=f16,o=f32");
    }

    #[test]
    fn test_compute_only_defaults_params_to_f32() {
        let policy = MixedPrecisionPolicy::parse("c=bf16").unwrap();
        assert_eq!(policy.param, DType::F32);
        assert_eq!(policy.compute, DType::BF16);
    }

    #[test]
    fn test_canonical_display() {
        let policy = MixedPrecisionPolicy::parse("p=float32,c=bfloat16").unwrap();
        assert_eq!(policy.to_string(), "p=f32,c=bf16");
        assert_eq!(MixedPrecisionPolicy::parse(&policy.to_string()).unwrap(), policy);
    }

    #[test]
    fn test_rejects_bad_policies() {
        for bad in ["", "p=f32,p=bf16", "x=f32", "p=int8", "p=f32,", "fp8"] {
            assert!(
                matches!(
                    MixedPrecisionPolicy::parse(bad),
                    Err(ConfigError::Precision { .. })
                ),
                "policy {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_param_bytes() {
        let policy = MixedPrecisionPolicy::parse("p=bf16,c=bf16").unwrap();
        assert_eq!(policy.param_bytes(1000), Some(2000));
        assert_eq!(policy.param_bytes(usize::MAX), None);
    }
}

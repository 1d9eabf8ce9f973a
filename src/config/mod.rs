//! Configuration module for training run documents.

mod data_config;
mod model_config;
mod overrides;
mod precision;
mod shards;
mod train_config;
mod trainer_config;

pub use data_config::{DataConfig, TRAIN_SPLIT, VALIDATION_SPLIT};
pub use model_config::{Activation, Gpt2Config, ParamEstimate};
pub use overrides::apply_overrides;
pub use precision::{MixedPrecisionPolicy, parse_dtype};
pub use shards::{expand_pattern, is_remote, validate_pattern};
pub use train_config::{ConfigFormat, TrainConfig};
pub use trainer_config::{
    LrSchedule, ParallelismLayout, TrainerConfig, WandbConfig, WandbMode,
};

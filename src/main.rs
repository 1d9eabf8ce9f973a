//! gpt2cfg - inspect and validate GPT-2 training configs
//!
//! Loads a training document, applies overrides, and reports what the
//! external trainer will see.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use rs_gpt2_config::{
    TrainConfig,
    config::{TRAIN_SPLIT, VALIDATION_SPLIT},
};

/// GPT-2 BPE vocabulary size
const GPT2_VOCAB_SIZE: usize = 50257;

#[derive(Parser)]
#[command(name = "gpt2cfg")]
#[command(author, version, about = "Inspect and validate GPT-2 training configs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a config
    Validate {
        /// Config file (.yaml, .yml or .json)
        config: PathBuf,

        /// Override a value, e.g. --set trainer.learning_rate=3e-4
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// Show model shape, size estimates and parallelism layout
    Info {
        config: PathBuf,

        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Vocabulary size used for the parameter estimate
        #[arg(long, default_value_t = GPT2_VOCAB_SIZE)]
        vocab_size: usize,

        /// Number of accelerators to lay the batch out on
        #[arg(long, env = "GPT2CFG_DEVICES")]
        devices: Option<usize>,
    },

    /// List expanded shard URLs
    Shards {
        config: PathBuf,

        /// Only list one split
        #[arg(long, value_enum)]
        split: Option<SplitArg>,
    },

    /// Print the normalized config with all defaults filled in
    Dump {
        config: PathBuf,

        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SplitArg {
    Train,
    Validation,
}

impl SplitArg {
    fn name(self) -> &'static str {
        match self {
            SplitArg::Train => TRAIN_SPLIT,
            SplitArg::Validation => VALIDATION_SPLIT,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rs_gpt2_config=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config, overrides } => {
            TrainConfig::from_file_with_overrides(&config, &overrides)?;
            println!("OK");
        }

        Commands::Info {
            config,
            overrides,
            vocab_size,
            devices,
        } => {
            let config = TrainConfig::from_file_with_overrides(&config, &overrides)?;
            show_info(&config, vocab_size, devices)?;
        }

        Commands::Shards { config, split } => {
            let config = TrainConfig::from_file(&config)?;
            let splits = match split {
                Some(split) => vec![split.name()],
                None => config.data.splits(),
            };
            for split in splits {
                for url in config.data.shard_urls(split)? {
                    println!("{}\t{}", split, url);
                }
            }
        }

        Commands::Dump {
            config,
            overrides,
            format,
        } => {
            let config = TrainConfig::from_file_with_overrides(&config, &overrides)?;
            let out = match format {
                OutputFormat::Yaml => config.to_yaml_string()?,
                OutputFormat::Json => config.to_json_string()?,
            };
            println!("{}", out.trim_end());
        }
    }

    Ok(())
}

fn show_info(config: &TrainConfig, vocab_size: usize, devices: Option<usize>) -> anyhow::Result<()> {
    let model = &config.model;
    let trainer = &config.trainer;

    println!("Model");
    println!("=====");
    println!("Hidden dim: {}", model.hidden_dim);
    println!("Num heads: {}", model.num_heads);
    println!("Head size: {}", model.head_size());
    println!("Num layers: {}", model.num_layers);
    println!("MLP dim: {}", model.mlp_dim());
    println!("Seq len: {}", model.seq_len);
    println!("Activation: {:?}", model.activation_function);
    println!("Gradient checkpointing: {}", model.gradient_checkpointing);
    println!(
        "Scale attn by inverse layer idx: {}",
        model.scale_attn_by_inverse_layer_idx
    );

    let estimate = model.param_estimate(vocab_size)?;

    println!("\nEstimated Parameters");
    println!("====================");
    println!("Embeddings: ~{:.1}M", estimate.embedding as f64 / 1e6);
    println!("Per layer: ~{:.1}M", estimate.per_layer as f64 / 1e6);
    println!("Total: ~{:.1}M", estimate.total as f64 / 1e6);
    match trainer.mp.param_bytes(estimate.total) {
        Some(bytes) => println!(
            "Param memory ({}): ~{:.2} GB",
            trainer.mp.param.as_str(),
            bytes as f64 / 1e9
        ),
        None => println!("Param memory ({}): overflows", trainer.mp.param.as_str()),
    }

    println!("\nTrainer");
    println!("=======");
    println!("Precision policy: {}", trainer.mp);
    println!("Learning rate: {:e}", trainer.learning_rate);
    println!("Weight decay: {}", trainer.weight_decay);
    println!("Schedule: {:?} (warmup {} steps)", trainer.lr_schedule, trainer.warmup_steps());
    println!("Train batch size: {}", trainer.train_batch_size);
    println!("Model axis size: {}", trainer.model_axis_size);
    match trainer.per_device_parallelism {
        Some(n) => println!("Per device parallelism: {}", n),
        None => println!("Per device parallelism: derived"),
    }
    println!("Tracking: {} {:?}", trainer.wandb.project, trainer.wandb.tags);

    if let Some(devices) = devices {
        let layout = trainer.layout(devices)?;
        println!("\nLayout on {} devices", layout.num_devices);
        println!("====================");
        println!("Data axis size: {}", layout.data_axis_size);
        println!("Per device parallelism: {}", layout.per_device_parallelism);
        println!("Microbatch size: {}", layout.microbatch_size());
        println!("Grad accumulation steps: {}", layout.grad_accum_steps);
    }

    Ok(())
}

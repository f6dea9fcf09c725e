// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::{ComputeDevice, TrainConfig};
use crate::domain::dialogue::Split;
use crate::ml::optimization::NonFinitePolicy;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the emotion classifier, keeping the best dev checkpoint
    Train(TrainArgs),

    /// Score a saved checkpoint on one partition
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding train.json, dev.json and test.json
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Directory for model.bin, tokenizer and run metadata
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Append-only plain-text run log
    #[arg(long, default_value = "erc.log")]
    pub log_file: String,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    /// Peak learning rate, reached after one epoch of warmup
    #[arg(long, default_value_t = 1e-6)]
    pub lr: f64,

    /// Global L2 norm the gradients are clipped to
    #[arg(long, default_value_t = 10.0)]
    pub max_grad_norm: f64,

    /// Hidden dimension; must be divisible by --num-heads
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 2)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Tokens per context sequence, [CLS] included
    #[arg(long, default_value_t = 128)]
    pub max_seq_len: usize,

    /// Earlier utterances of the same speaker fed to the memory
    #[arg(long, default_value_t = 8)]
    pub max_memory_turns: usize,

    /// Vocabulary cap when a tokenizer has to be built
    #[arg(long, default_value_t = 30000)]
    pub max_vocab: usize,

    /// Seed for the per-epoch training shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Background threads preparing batches
    #[arg(long, default_value_t = 2)]
    pub prefetch_workers: usize,

    /// wgpu | cpu
    #[arg(long, default_value_t = ComputeDevice::Wgpu)]
    pub device: ComputeDevice,

    /// What to do on a non-finite loss or gradient: abort | skip-step
    #[arg(long, default_value_t = NonFinitePolicy::Abort)]
    pub non_finite: NonFinitePolicy,

    /// Continue from the state saved with the last checkpoint
    #[arg(long)]
    pub resume: bool,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:         a.data_dir,
            checkpoint_dir:   a.checkpoint_dir,
            log_file:         a.log_file,
            epochs:           a.epochs,
            batch_size:       a.batch_size,
            lr:               a.lr,
            max_grad_norm:    a.max_grad_norm,
            d_model:          a.d_model,
            num_heads:        a.num_heads,
            num_layers:       a.num_layers,
            d_ff:             a.d_ff,
            dropout:          a.dropout,
            max_seq_len:      a.max_seq_len,
            max_memory_turns: a.max_memory_turns,
            max_vocab:        a.max_vocab,
            seed:             a.seed,
            prefetch_workers: a.prefetch_workers,
            device:           a.device,
            non_finite:       a.non_finite,
            resume:           a.resume,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory written by a previous `train` run
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Defaults to the data directory recorded at training time
    #[arg(long)]
    pub data_dir: Option<String>,

    /// train | dev | test
    #[arg(long, default_value = "test", value_parser = parse_split)]
    pub split: Split,

    /// Defaults to the device recorded at training time
    #[arg(long)]
    pub device: Option<ComputeDevice>,
}

fn parse_split(s: &str) -> Result<Split, String> {
    match s {
        "train" => Ok(Split::Train),
        "dev"   => Ok(Split::Dev),
        "test"  => Ok(Split::Test),
        other   => Err(format!("unknown split '{other}' (expected train|dev|test)")),
    }
}

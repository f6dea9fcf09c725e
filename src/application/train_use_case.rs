// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full training run in order:
//
//   Step 1: Validate configuration        (Layer 2)
//   Step 2: Open the run log              (Layer 6 - infra)
//   Step 3: Load train/dev/test dialogues (Layer 4 - data)
//   Step 4: Fix the emotion label set     (Layer 3 - domain)
//   Step 5: Build / load tokenizer        (Layer 6 - infra)
//   Step 6: Build utterance samples       (Layer 4 - data)
//   Step 7: Save config + labels          (Layer 6 - infra)
//   Step 8: Run training on the device    (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::data::{
    dataset::{ErcDataset, ErcSample, SampleBuilder, SampleLimits},
    loader::JsonDialogueLoader,
    preprocessor::Preprocessor,
};
use crate::domain::{
    dialogue::{Dialogue, LabelSet, Split},
    error::{ErcError, ErcResult},
    traits::DialogueSource,
};
use crate::infra::{
    checkpoint::CheckpointStore,
    run_log::RunLog,
    tokenizer_store::{SpecialTokens, TokenizerStore},
};
use crate::ml::{
    model::ErcModelConfig,
    optimization::NonFinitePolicy,
    trainer::{run_training, TrainingData, TrainingReport},
};

// ─── Compute device ──────────────────────────────────────────────────────────
/// Where tensors live. Chosen once on the command line and handed
/// to every batcher and to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Wgpu,
    Cpu,
}

impl FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            "cpu" | "ndarray" => Ok(Self::Cpu),
            other => Err(format!("unknown device '{other}' (expected wgpu|cpu)")),
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wgpu => "wgpu",
            Self::Cpu  => "cpu",
        })
    }
}

pub type WgpuTrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
pub type CpuTrainBackend  = burn::backend::Autodiff<burn::backend::NdArray<f32>>;

// ─── Training Configuration ──────────────────────────────────────────────────
// Serialisable so `evaluate` can rebuild the exact architecture
// from <checkpoint_dir>/train_config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:         String,
    pub checkpoint_dir:   String,
    pub log_file:         String,
    pub epochs:           usize,
    pub batch_size:       usize,
    pub lr:               f64,
    pub max_grad_norm:    f64,
    pub d_model:          usize,
    pub num_heads:        usize,
    pub num_layers:       usize,
    pub d_ff:             usize,
    pub dropout:          f64,
    pub max_seq_len:      usize,
    pub max_memory_turns: usize,
    pub max_vocab:        usize,
    pub seed:             u64,
    pub prefetch_workers: usize,
    pub device:           ComputeDevice,
    pub non_finite:       NonFinitePolicy,
    #[serde(default)]
    pub resume:           bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:         "data".to_string(),
            checkpoint_dir:   "checkpoints".to_string(),
            log_file:         "erc.log".to_string(),
            epochs:           10,
            batch_size:       4,
            lr:               1e-6,
            max_grad_norm:    10.0,
            d_model:          256,
            num_heads:        4,
            num_layers:       2,
            d_ff:             1024,
            dropout:          0.1,
            max_seq_len:      128,
            max_memory_turns: 8,
            max_vocab:        30000,
            seed:             42,
            prefetch_workers: 2,
            device:           ComputeDevice::default(),
            non_finite:       NonFinitePolicy::default(),
            resume:           false,
        }
    }
}

impl TrainConfig {
    /// Reject settings that could only fail later, mid-run.
    pub fn validate(&self) -> ErcResult<()> {
        let fail = |msg: String| Err(ErcError::Configuration(msg));

        if self.epochs == 0 {
            return fail("epochs must be at least 1".into());
        }
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".into());
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return fail(format!("lr must be a positive number, got {}", self.lr));
        }
        if !(self.max_grad_norm.is_finite() && self.max_grad_norm > 0.0) {
            return fail(format!("max_grad_norm must be positive, got {}", self.max_grad_norm));
        }
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return fail(format!(
                "d_model ({}) must be divisible by num_heads ({})",
                self.d_model, self.num_heads
            ));
        }
        if self.num_layers == 0 || self.d_ff == 0 {
            return fail("num_layers and d_ff must be at least 1".into());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if self.max_seq_len < 2 {
            return fail("max_seq_len must leave room for [CLS] and one token".into());
        }
        if self.prefetch_workers == 0 {
            return fail("prefetch_workers must be at least 1".into());
        }
        if self.max_vocab <= 4 {
            return fail("max_vocab must exceed the four special tokens".into());
        }
        Ok(())
    }

    pub fn model_config(&self, vocab_size: usize, num_classes: usize) -> ErcModelConfig {
        ErcModelConfig::new(vocab_size, self.max_seq_len, num_classes)
            .with_d_model(self.d_model)
            .with_num_heads(self.num_heads)
            .with_num_layers(self.num_layers)
            .with_d_ff(self.d_ff)
            .with_dropout(self.dropout)
    }

    pub fn sample_limits(&self) -> SampleLimits {
        SampleLimits {
            max_seq_len:      self.max_seq_len,
            max_memory_turns: self.max_memory_turns,
        }
    }
}

// ─── TrainUseCase ────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainingReport> {
        let cfg = &self.config;

        // ── Step 1: Validate ─────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Run log ──────────────────────────────────────────────────
        let log = RunLog::open(&cfg.log_file)
            .with_context(|| format!("cannot open run log '{}'", cfg.log_file))?;

        // ── Step 3: Dialogues ────────────────────────────────────────────────
        let source = JsonDialogueLoader::new(&cfg.data_dir);
        let train  = load_non_empty(&source, Split::Train)?;
        let dev    = load_non_empty(&source, Split::Dev)?;
        let test   = load_non_empty(&source, Split::Test)?;

        // ── Step 4: Label set ────────────────────────────────────────────────
        // Fixed by the training partition; an emotion seen only in dev
        // or test is a dataset error when samples are built.
        let labels = LabelSet::from_dialogues(&train);
        if labels.is_empty() {
            return Err(ErcError::Dataset("training partition has no labelled turns".into()).into());
        }
        tracing::info!("Emotion labels ({}): {:?}", labels.len(), labels.names());

        // ── Step 5: Tokenizer ────────────────────────────────────────────────
        let preprocessor = Preprocessor::new();
        let texts: Vec<String> = train
            .iter()
            .flat_map(|d| d.turns.iter().map(|t| preprocessor.clean(&t.utterance)))
            .collect();
        let tokenizer = TokenizerStore::new(&cfg.checkpoint_dir)
            .load_or_build(&texts, cfg.max_vocab)?;
        let specials  = SpecialTokens::resolve(&tokenizer)?;

        // ── Step 6: Samples ──────────────────────────────────────────────────
        let builder = SampleBuilder::new(&tokenizer, specials, &labels, cfg.sample_limits());
        let data = TrainingData {
            train:       dataset(&builder, &train, Split::Train)?,
            dev:         dataset(&builder, &dev, Split::Dev)?,
            test:        dataset(&builder, &test, Split::Test)?,
            vocab_size:  tokenizer.get_vocab_size(true),
            num_classes: labels.len(),
            pad_id:      specials.pad,
        };

        // ── Step 7: Persist run description ──────────────────────────────────
        let store = CheckpointStore::new(&cfg.checkpoint_dir);
        store.save_config(cfg)?;
        store.save_labels(&labels)?;

        // ── Step 8: Train ────────────────────────────────────────────────────
        tracing::info!("Training on {} device", cfg.device);
        let report = match cfg.device {
            ComputeDevice::Wgpu => run_training::<WgpuTrainBackend>(
                cfg, data, &store, &log, burn::backend::wgpu::WgpuDevice::default(),
            ),
            ComputeDevice::Cpu => run_training::<CpuTrainBackend>(
                cfg, data, &store, &log, burn::backend::ndarray::NdArrayDevice::Cpu,
            ),
        }?;

        Ok(report)
    }
}

pub(crate) fn load_non_empty(source: &dyn DialogueSource, split: Split) -> ErcResult<Vec<Dialogue>> {
    let dialogues = source.load(split)?;
    if dialogues.iter().all(|d| d.turns.is_empty()) {
        return Err(ErcError::Dataset(format!(
            "the {} partition contains no turns",
            split.file_stem()
        )));
    }
    Ok(dialogues)
}

fn dataset(builder: &SampleBuilder<'_>, dialogues: &[Dialogue], split: Split) -> ErcResult<ErcDataset> {
    let samples: Vec<ErcSample> = builder.build(dialogues)?;
    tracing::info!("Built {} {} samples", samples.len(), split.file_stem());
    Ok(ErcDataset::new(samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dialogue::Turn;
    use std::fs;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.lr, 1e-6);
        assert_eq!(cfg.max_grad_norm, 10.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let bad = [
            TrainConfig { epochs: 0, ..TrainConfig::default() },
            TrainConfig { batch_size: 0, ..TrainConfig::default() },
            TrainConfig { lr: f64::NAN, ..TrainConfig::default() },
            TrainConfig { max_grad_norm: -1.0, ..TrainConfig::default() },
            TrainConfig { d_model: 10, num_heads: 4, ..TrainConfig::default() },
            TrainConfig { dropout: 1.0, ..TrainConfig::default() },
            TrainConfig { prefetch_workers: 0, ..TrainConfig::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(ErcError::Configuration(_))), "{cfg:?}");
        }
    }

    #[test]
    fn test_device_parses() {
        assert_eq!("CPU".parse::<ComputeDevice>().unwrap(), ComputeDevice::Cpu);
        assert_eq!("wgpu".parse::<ComputeDevice>().unwrap(), ComputeDevice::Wgpu);
        assert!("tpu".parse::<ComputeDevice>().is_err());
    }

    struct InMemorySource(Vec<Dialogue>);

    impl DialogueSource for InMemorySource {
        fn load(&self, _split: Split) -> ErcResult<Vec<Dialogue>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_partition_without_turns_is_rejected() {
        let empty = InMemorySource(vec![Dialogue::new(1, vec![])]);
        assert!(matches!(load_non_empty(&empty, Split::Dev), Err(ErcError::Dataset(_))));

        let full = InMemorySource(vec![Dialogue::new(1, vec![Turn::new("A", "hi", "joy")])]);
        assert_eq!(load_non_empty(&full, Split::Dev).unwrap().len(), 1);
    }

    fn write_split(dir: &std::path::Path, split: Split, dialogues: &[Dialogue]) {
        let path = dir.join(format!("{}.json", split.file_stem()));
        fs::write(path, serde_json::to_string(dialogues).unwrap()).unwrap();
    }

    #[test]
    fn test_execute_on_cpu_writes_run_artifacts() {
        let tmp  = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();

        let chat = |id| {
            Dialogue::new(id, vec![
                Turn::new("A", "I got the job!", "joy"),
                Turn::new("B", "That is awful news.", "sadness"),
                Turn::new("A", "Why would you say that?", "anger"),
            ])
        };
        write_split(&data, Split::Train, &[chat(1), chat(2)]);
        write_split(&data, Split::Dev, &[chat(3)]);
        write_split(&data, Split::Test, &[chat(4)]);

        let ckpt = tmp.path().join("ckpt");
        let cfg  = TrainConfig {
            data_dir:       data.to_string_lossy().into_owned(),
            checkpoint_dir: ckpt.to_string_lossy().into_owned(),
            log_file:       tmp.path().join("erc.log").to_string_lossy().into_owned(),
            epochs:         1,
            batch_size:     2,
            d_model:        8,
            num_heads:      2,
            num_layers:     1,
            d_ff:           16,
            max_seq_len:    32,
            device:         ComputeDevice::Cpu,
            ..TrainConfig::default()
        };

        let report = TrainUseCase::new(cfg).execute().unwrap();
        assert_eq!(report.epochs.len(), 1);
        assert_eq!(report.global_step, 3);
        assert!(ckpt.join("train_config.json").is_file());
        assert!(ckpt.join("labels.json").is_file());
        assert!(ckpt.join("tokenizer.json").is_file());
        assert!(ckpt.join("metrics.csv").is_file());
        assert!(fs::read_to_string(tmp.path().join("erc.log")).unwrap().contains("Dev W-avg F1: "));
    }

    #[test]
    fn test_unknown_dev_label_is_a_dataset_error() {
        let tmp = tempfile::tempdir().unwrap();
        let one = |emotion: &str| vec![Dialogue::new(1, vec![Turn::new("A", "hello", emotion)])];
        write_split(tmp.path(), Split::Train, &one("joy"));
        write_split(tmp.path(), Split::Dev, &one("fear"));
        write_split(tmp.path(), Split::Test, &one("joy"));

        let cfg = TrainConfig {
            data_dir:       tmp.path().to_string_lossy().into_owned(),
            checkpoint_dir: tmp.path().join("ckpt").to_string_lossy().into_owned(),
            log_file:       tmp.path().join("erc.log").to_string_lossy().into_owned(),
            device:         ComputeDevice::Cpu,
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<ErcError>(), Some(ErcError::Dataset(_))));
    }
}

// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a saved checkpoint on one partition without training:
//
//   Step 1: Read train_config.json + labels.json   (Layer 6 - infra)
//   Step 2: Load tokenizer.json                    (Layer 6 - infra)
//   Step 3: Build samples for the chosen split     (Layer 4 - data)
//   Step 4: Rebuild the model, load model.bin      (Layer 5 - ml)
//   Step 5: One evaluation pass + weighted P/R/F1  (Layer 5 - ml)

use anyhow::{Context, Result};
use std::sync::Arc;

use burn::prelude::*;

use crate::application::train_use_case::{load_non_empty, ComputeDevice};
use crate::data::{
    batcher::ErcBatcher,
    dataset::{ErcDataset, SampleBuilder},
    loader::JsonDialogueLoader,
    prefetch::{LoaderOptions, PrefetchLoader},
};
use crate::domain::dialogue::Split;
use crate::infra::{
    checkpoint::CheckpointStore,
    tokenizer_store::{SpecialTokens, TokenizerStore},
};
use crate::ml::{
    evaluator::{evaluate, EvaluationOutcome},
    model::{ErcModel, ErcModelConfig},
    scoring::WeightedScores,
};

#[derive(Debug, Clone)]
pub struct EvaluationSummary {
    pub split:   Split,
    pub outcome: EvaluationOutcome,
    pub scores:  WeightedScores,
}

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    /// Overrides the data directory recorded at training time
    data_dir:       Option<String>,
    split:          Split,
    device:         Option<ComputeDevice>,
}

impl EvaluateUseCase {
    pub fn new(
        checkpoint_dir: String,
        data_dir:       Option<String>,
        split:          Split,
        device:         Option<ComputeDevice>,
    ) -> Self {
        Self { checkpoint_dir, data_dir, split, device }
    }

    pub fn execute(&self) -> Result<EvaluationSummary> {
        // ── Step 1: Run description ──────────────────────────────────────────
        let store  = CheckpointStore::new(&self.checkpoint_dir);
        let cfg    = store.load_config().context("run 'train' before 'evaluate'")?;
        let labels = store.load_labels()?;

        // ── Step 2: Tokenizer ────────────────────────────────────────────────
        let tokenizer = TokenizerStore::new(&self.checkpoint_dir).load()?;
        let specials  = SpecialTokens::resolve(&tokenizer)?;

        // ── Step 3: Samples ──────────────────────────────────────────────────
        let data_dir  = self.data_dir.clone().unwrap_or_else(|| cfg.data_dir.clone());
        let dialogues = load_non_empty(&JsonDialogueLoader::new(&data_dir), self.split)?;
        let samples   = SampleBuilder::new(&tokenizer, specials, &labels, cfg.sample_limits())
            .build(&dialogues)?;
        let dataset   = ErcDataset::new(samples);

        let model_cfg = cfg.model_config(tokenizer.get_vocab_size(true), labels.len());
        let options   = LoaderOptions {
            batch_size: cfg.batch_size,
            shuffle:    None,
            workers:    cfg.prefetch_workers,
        };

        // ── Steps 4-5: Model + evaluation ────────────────────────────────────
        let device  = self.device.unwrap_or(cfg.device);
        let outcome = match device {
            ComputeDevice::Wgpu => score_checkpoint::<burn::backend::Wgpu>(
                &store, &model_cfg, dataset, specials.pad, options,
                burn::backend::wgpu::WgpuDevice::default(),
            ),
            ComputeDevice::Cpu => score_checkpoint::<burn::backend::NdArray<f32>>(
                &store, &model_cfg, dataset, specials.pad, options,
                burn::backend::ndarray::NdArrayDevice::Cpu,
            ),
        }?;

        let scores = outcome.weighted_scores()?;
        tracing::info!(
            "{} | examples={} | acc={:.4} | W-avg P={:.4} R={:.4} F1={:.4}",
            self.split.file_stem(),
            outcome.len(),
            outcome.accuracy,
            scores.precision,
            scores.recall,
            scores.f1,
        );

        Ok(EvaluationSummary { split: self.split, outcome, scores })
    }
}

fn score_checkpoint<B: Backend>(
    store:     &CheckpointStore,
    model_cfg: &ErcModelConfig,
    dataset:   ErcDataset,
    pad_id:    u32,
    options:   LoaderOptions,
    device:    B::Device,
) -> Result<EvaluationOutcome> {
    let model: ErcModel<B> = model_cfg.init(&device);
    let model  = store.load_model::<B, _>(model, &device)?;
    let loader = PrefetchLoader::new(
        Arc::new(dataset),
        Arc::new(ErcBatcher::<B>::new(device, pad_id)),
        options,
    );
    Ok(evaluate(&model, loader.iter(0))?)
}

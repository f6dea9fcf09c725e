// ============================================================
// Layer 5 — Training Orchestrator
// ============================================================
// Drives a whole run through a fixed state machine:
//
//   Init → { TrainEpoch → Evaluate → MaybeCheckpoint } × epochs → Done
//
//   Init             loaders, model, AdamW, schedule
//                    (warmup = one epoch of batches,
//                     total  = batches × epochs)
//   TrainEpoch       every train batch once, in stream order:
//                    forward → cross-entropy → controller step
//   Evaluate         dev pass → weighted F1 → "Dev W-avg F1: …"
//   MaybeCheckpoint  only on a STRICT dev-F1 improvement:
//                    test pass → save model.bin (+ resume state)
//                    → "Epoch:…, Test W-avg F1: …"
//
// There is no early stopping: the configured number of epochs
// always runs. The model lives on the autodiff backend B while
// training; evaluation goes through model.valid(), which is the
// same weights on B::InnerBackend with dropout off and no graph.
//
// Reference: Burn Book §5 (Custom Training Loop)

use std::sync::Arc;

use burn::{
    module::AutodiffModule,
    optim::{AdamWConfig, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::ErcBatcher,
    dataset::ErcDataset,
    prefetch::{LoaderOptions, PrefetchLoader},
};
use crate::domain::error::{ErcError, ErcResult};
use crate::infra::{
    checkpoint::{CheckpointStore, TrainingState},
    metrics::{EpochMetrics, MetricsLogger},
    run_log::RunLog,
};
use crate::ml::{
    evaluator::{evaluate, EvaluationOutcome},
    model::ErcModel,
    optimization::{OptimizationController, StepOutcome},
    scheduler::LinearWarmupDecay,
};

// ─── Best-so-far record ──────────────────────────────────────────────────────
/// Highest dev score seen so far. Starts at 0.0, so an epoch
/// scoring exactly 0.0 never counts as an improvement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestScore {
    best: f64,
}

impl Default for BestScore {
    fn default() -> Self {
        Self { best: 0.0 }
    }
}

impl BestScore {
    pub fn starting_at(best: f64) -> Self {
        Self { best }
    }

    pub fn value(&self) -> f64 {
        self.best
    }

    /// Record `score` and return true only if it beats the best strictly.
    pub fn offer(&mut self, score: f64) -> bool {
        if score > self.best {
            self.best = score;
            true
        } else {
            false
        }
    }
}

// ─── Inputs / outputs ────────────────────────────────────────────────────────
pub struct TrainingData {
    pub train:       ErcDataset,
    pub dev:         ErcDataset,
    pub test:        ErcDataset,
    pub vocab_size:  usize,
    pub num_classes: usize,
    pub pad_id:      u32,
}

#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch:      usize,
    pub train_loss: f64,
    pub dev:        EvaluationOutcome,
    pub dev_f1:     f64,
    /// Only present when the epoch improved on the best dev score
    pub test_f1:    Option<f64>,
}

impl EpochReport {
    pub fn improved(&self) -> bool {
        self.test_f1.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub epochs:      Vec<EpochReport>,
    pub best_dev_f1: f64,
    pub global_step: usize,
}

// ─── Orchestrator ────────────────────────────────────────────────────────────
pub fn run_training<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    data:   TrainingData,
    store:  &CheckpointStore,
    log:    &RunLog,
    device: B::Device,
) -> ErcResult<TrainingReport> {

    // ── Init: batch streams ──────────────────────────────────────────────────
    // Train batches carry autodiff tensors; dev/test go straight to
    // the inner backend so evaluation never builds a graph.
    let train_opts = LoaderOptions {
        batch_size: cfg.batch_size,
        shuffle:    Some(cfg.seed),
        workers:    cfg.prefetch_workers,
    };
    let eval_opts = LoaderOptions { shuffle: None, ..train_opts };

    let train_loader = PrefetchLoader::new(
        Arc::new(data.train),
        Arc::new(ErcBatcher::<B>::new(device.clone(), data.pad_id)),
        train_opts,
    );
    let dev_loader = PrefetchLoader::new(
        Arc::new(data.dev),
        Arc::new(ErcBatcher::<B::InnerBackend>::new(device.clone(), data.pad_id)),
        eval_opts,
    );
    let test_loader = PrefetchLoader::new(
        Arc::new(data.test),
        Arc::new(ErcBatcher::<B::InnerBackend>::new(device.clone(), data.pad_id)),
        eval_opts,
    );

    let batches_per_epoch = train_loader.num_batches();
    if batches_per_epoch == 0 {
        return Err(ErcError::Dataset("training partition has no examples".into()));
    }

    // ── Init: model + optimisation controller ────────────────────────────────
    let model_cfg = cfg.model_config(data.vocab_size, data.num_classes);
    let mut model: ErcModel<B> = model_cfg.init(&device);

    let schedule = LinearWarmupDecay::new(
        cfg.lr,
        batches_per_epoch,
        batches_per_epoch * cfg.epochs,
    )?;
    let optim = AdamWConfig::new()
        .with_weight_decay(0.01)
        .with_epsilon(1e-8)
        .init::<B, ErcModel<B>>();
    let mut controller =
        OptimizationController::new(optim, schedule, cfg.max_grad_norm, cfg.non_finite)?;
    let schedule = controller.schedule();
    tracing::info!(
        "Schedule: peak lr {:e}, {} warmup steps, {} total steps, clip at {}",
        schedule.base_lr(),
        schedule.warmup_steps(),
        schedule.total_steps(),
        cfg.max_grad_norm,
    );

    let metrics = MetricsLogger::new(store.dir())?;
    let mut best        = BestScore::default();
    let mut first_epoch = 0;

    if cfg.resume {
        if store.has_resume_state() {
            model = store.load_model::<B, _>(model, &device)?;
            let (record, state) = store.load_resume_state::<B, _>(&device)?;
            controller  = controller.restore(state.global_step, record);
            best        = BestScore::starting_at(state.best_dev_f1);
            first_epoch = state.epoch + 1;
            log.line(format!(
                "Resuming after epoch {} at step {} (best dev W-avg F1: {})",
                state.epoch, state.global_step, state.best_dev_f1
            ))?;
            metrics.log_resume(state.epoch, state.global_step)?;
        } else {
            tracing::warn!(
                "--resume given but '{}' holds no resumable state; starting fresh",
                store.dir().display()
            );
        }
    }

    tracing::info!(
        "Run log: '{}', epoch metrics: '{}'",
        log.path().display(),
        metrics.csv_path().display()
    );
    log.line(format!(
        "Training: {} train / {} dev / {} test examples, {} batches per epoch, {} epochs, {} classes",
        train_loader.num_items(),
        dev_loader.num_items(),
        test_loader.num_items(),
        batches_per_epoch,
        cfg.epochs,
        data.num_classes,
    ))?;

    // ── Epoch loop ───────────────────────────────────────────────────────────
    let mut epochs = Vec::with_capacity(cfg.epochs.saturating_sub(first_epoch));

    for epoch in first_epoch..cfg.epochs {

        // ── TrainEpoch ───────────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        let mut updates  = 0usize;
        let mut last_lr  = controller.learning_rate();

        for batch in train_loader.iter(epoch) {
            let batch = batch?;
            batch.validate()?;
            let (loss, _) = model.forward_loss(&batch);
            let (next, outcome) = controller.step(model, loss)?;
            model = next;

            if let StepOutcome::Applied { loss, grad_norm, lr } = outcome {
                loss_sum += loss;
                updates  += 1;
                last_lr   = lr;
                tracing::debug!(
                    "step {:>6} | loss={:.4} | grad_norm={:.4} | lr={:.3e}",
                    controller.global_step(),
                    loss,
                    grad_norm,
                    lr,
                );
            }
        }
        let train_loss = if updates > 0 { loss_sum / updates as f64 } else { f64::NAN };

        // ── Evaluate ─────────────────────────────────────────────────────────
        let model_valid = model.valid();
        let dev         = evaluate(&model_valid, dev_loader.iter(epoch))?;
        let dev_f1      = dev.weighted_scores()?.f1;
        log.line(format!("Dev W-avg F1: {dev_f1}"))?;

        // ── MaybeCheckpoint ──────────────────────────────────────────────────
        let mut test_f1 = None;
        if best.offer(dev_f1) {
            let test = evaluate(&model_valid, test_loader.iter(epoch))?;
            let f1   = test.weighted_scores()?.f1;

            store.save_model::<B::InnerBackend, _>(&model_valid)?;
            store.save_resume_state::<B, _>(
                controller.optimizer().to_record(),
                &TrainingState {
                    epoch,
                    global_step: controller.global_step(),
                    best_dev_f1: best.value(),
                },
            )?;
            log.line(format!("Epoch:{epoch}, Test W-avg F1: {f1}"))?;
            test_f1 = Some(f1);
        }

        metrics.log(&EpochMetrics {
            epoch,
            global_step:   controller.global_step(),
            learning_rate: last_lr,
            train_loss,
            dev_acc:       dev.accuracy,
            dev_f1,
            test_f1,
            improved:      test_f1.is_some(),
        })?;

        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | dev_acc={:.1}% | dev_f1={:.4} | best={:.4}",
            epoch + 1,
            cfg.epochs,
            train_loss,
            dev.accuracy * 100.0,
            dev_f1,
            best.value(),
        );

        epochs.push(EpochReport { epoch, train_loss, dev, dev_f1, test_f1 });
    }

    tracing::info!("Training complete after {} optimizer steps", controller.global_step());
    Ok(TrainingReport {
        epochs,
        best_dev_f1: best.value(),
        global_step: controller.global_step(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ErcSample;
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    type Ad = Autodiff<NdArray<f32>>;

    #[test]
    fn test_best_score_is_strictly_increasing() {
        let mut best = BestScore::default();
        let fired: Vec<usize> = [0.40, 0.35, 0.50, 0.50]
            .iter()
            .enumerate()
            .filter_map(|(epoch, &f1)| best.offer(f1).then_some(epoch))
            .collect();
        assert_eq!(fired, vec![0, 2]);
        assert_eq!(best.value(), 0.50);
    }

    #[test]
    fn test_zero_score_never_improves_fresh_record() {
        assert!(!BestScore::default().offer(0.0));
    }

    fn sample(tokens: &[u32], label: usize) -> ErcSample {
        let mut token_ids = vec![2];
        token_ids.extend_from_slice(tokens);
        token_ids.push(3);
        ErcSample { token_ids, speaker_memory: vec![tokens.to_vec()], label }
    }

    fn tiny_config(dir: &std::path::Path, epochs: usize) -> TrainConfig {
        TrainConfig {
            checkpoint_dir:   dir.to_string_lossy().into_owned(),
            epochs,
            batch_size:       1,
            lr:               1e-3,
            d_model:          8,
            num_heads:        2,
            num_layers:       1,
            d_ff:             16,
            dropout:          0.0,
            max_seq_len:      8,
            prefetch_workers: 2,
            ..TrainConfig::default()
        }
    }

    /// Dev examples share one input but cover all three labels, so
    /// whatever the model predicts, one of them is right and the
    /// first epoch's dev F1 is strictly positive.
    fn data(dev: Vec<ErcSample>) -> TrainingData {
        TrainingData {
            train:       ErcDataset::new(vec![
                sample(&[4, 5], 0),
                sample(&[6], 1),
                sample(&[7, 8, 9], 2),
            ]),
            dev:         ErcDataset::new(dev),
            test:        ErcDataset::new(vec![sample(&[4], 0), sample(&[6], 1)]),
            vocab_size:  12,
            num_classes: 3,
            pad_id:      0,
        }
    }

    fn checkpoint_files(dir: &std::path::Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("model"))
            .count()
    }

    #[test]
    fn test_two_epoch_run_end_to_end() {
        let tmp   = tempfile::tempdir().unwrap();
        let cfg   = tiny_config(tmp.path(), 2);
        let store = CheckpointStore::new(tmp.path());
        let log   = RunLog::open(tmp.path().join("erc.log")).unwrap();

        let dev    = vec![sample(&[4, 5], 0), sample(&[6], 1)];
        let report = run_training::<Ad>(&cfg, data(dev), &store, &log, Default::default()).unwrap();

        assert_eq!(report.epochs.len(), 2);
        assert_eq!(report.global_step, 6);
        for epoch in &report.epochs {
            assert_eq!(epoch.dev.len(), 2);
            assert!([0.0, 0.5, 1.0].contains(&epoch.dev.accuracy));
            assert!((0.0..=1.0).contains(&epoch.dev_f1));
        }

        let any_improved = report.epochs.iter().any(EpochReport::improved);
        assert_eq!(store.has_model(), any_improved);
        assert_eq!(checkpoint_files(tmp.path()), usize::from(any_improved));

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.matches("Dev W-avg F1: ").count(), 2);
        let improvements = report.epochs.iter().filter(|e| e.improved()).count();
        assert_eq!(text.matches("Test W-avg F1: ").count(), improvements);
    }

    #[test]
    fn test_resume_continues_after_saved_epoch() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let log   = RunLog::open(tmp.path().join("erc.log")).unwrap();
        let dev   = || vec![sample(&[4], 0), sample(&[4], 1), sample(&[4], 2)];

        let first = run_training::<Ad>(
            &tiny_config(tmp.path(), 1),
            data(dev()),
            &store,
            &log,
            Default::default(),
        )
        .unwrap();
        assert!(first.epochs[0].improved());
        assert!(store.has_resume_state());

        let cfg    = TrainConfig { resume: true, ..tiny_config(tmp.path(), 2) };
        let second = run_training::<Ad>(&cfg, data(dev()), &store, &log, Default::default()).unwrap();

        assert_eq!(second.epochs.len(), 1);
        assert_eq!(second.epochs[0].epoch, 1);
        assert_eq!(second.global_step, 6);
        assert!(second.best_dev_f1 >= first.best_dev_f1);

        let csv = std::fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("0,3,"));
        assert_eq!(lines[2], "# resumed after epoch 0 at step 3");
        assert!(lines[3].starts_with("1,6,"));
    }

    #[test]
    fn test_empty_training_partition_is_rejected() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let log   = RunLog::open(tmp.path().join("erc.log")).unwrap();
        let mut d = data(vec![sample(&[4], 0)]);
        d.train   = ErcDataset::new(vec![]);

        let result = run_training::<Ad>(&tiny_config(tmp.path(), 1), d, &store, &log, Default::default());
        assert!(matches!(result, Err(ErcError::Dataset(_))));
    }
}

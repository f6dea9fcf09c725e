// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Everything a training run leaves behind in its checkpoint
// directory:
//
//   checkpoints/
//     model.bin            ← best-so-far weights, overwritten on
//                            every strict dev-F1 improvement
//     optimizer.bin        ← AdamW moments at that same moment
//     training_state.json  ← epoch / global_step / best_dev_f1
//     train_config.json    ← architecture + hyperparameters
//     labels.json          ← emotion label set (index order)
//     tokenizer.json       ← written by TokenizerStore
//
// Burn's BinFileRecorder with full precision is used instead of
// the compressed recorder: the same weights always produce the
// same bytes, so saving an unchanged model twice leaves the file
// identical.
//
// Nothing here is ever deleted; the directory tree is created on
// the first write.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    prelude::*,
    record::{BinFileRecorder, FullPrecisionSettings, Record, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::domain::{
    dialogue::LabelSet,
    error::{ErcError, ErcResult},
};

type StoreRecorder = BinFileRecorder<FullPrecisionSettings>;

const MODEL_STEM:     &str = "model";
const OPTIMIZER_STEM: &str = "optimizer";
const STATE_FILE:     &str = "training_state.json";
const CONFIG_FILE:    &str = "train_config.json";
const LABELS_FILE:    &str = "labels.json";

/// Where a run stopped, enough to pick it up again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Last epoch whose checkpoint was written (0-based)
    pub epoch:       usize,
    pub global_step: usize,
    pub best_dev_f1: f64,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_STEM).with_extension("bin")
    }

    pub fn has_model(&self) -> bool {
        self.model_path().is_file()
    }

    pub fn has_resume_state(&self) -> bool {
        self.has_model()
            && self.dir.join(STATE_FILE).is_file()
            && self.dir.join(OPTIMIZER_STEM).with_extension("bin").is_file()
    }

    // ─── Model weights ────────────────────────────────────────────────────────

    /// Write `model.bin`, replacing any previous one.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M) -> ErcResult<()> {
        self.ensure_dir()?;
        StoreRecorder::new()
            .record(model.clone().into_record(), self.dir.join(MODEL_STEM))
            .map_err(|e| ErcError::persistence(self.model_path(), format!("{e:?}")))?;
        tracing::debug!("Saved model weights to '{}'", self.model_path().display());
        Ok(())
    }

    /// Load `model.bin` into a freshly initialised model of the same architecture.
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        model:  M,
        device: &B::Device,
    ) -> ErcResult<M> {
        let record = StoreRecorder::new()
            .load(self.dir.join(MODEL_STEM), device)
            .map_err(|e| ErcError::persistence(self.model_path(), format!("{e:?}")))?;
        Ok(model.load_record(record))
    }

    // ─── Resume state ─────────────────────────────────────────────────────────

    pub fn save_resume_state<B: Backend, R: Record<B>>(
        &self,
        optimizer: R,
        state:     &TrainingState,
    ) -> ErcResult<()> {
        self.ensure_dir()?;
        let stem = self.dir.join(OPTIMIZER_STEM);
        StoreRecorder::new()
            .record(optimizer, stem.clone())
            .map_err(|e| ErcError::persistence(stem.with_extension("bin"), format!("{e:?}")))?;
        self.write_json(STATE_FILE, state)
    }

    pub fn load_resume_state<B: Backend, R: Record<B>>(
        &self,
        device: &B::Device,
    ) -> ErcResult<(R, TrainingState)> {
        let stem   = self.dir.join(OPTIMIZER_STEM);
        let record = StoreRecorder::new()
            .load(stem.clone(), device)
            .map_err(|e| ErcError::persistence(stem.with_extension("bin"), format!("{e:?}")))?;
        let state  = self.read_json(STATE_FILE)?;
        Ok((record, state))
    }

    // ─── Run description ──────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &TrainConfig) -> ErcResult<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> ErcResult<TrainConfig> {
        self.read_json(CONFIG_FILE)
    }

    pub fn save_labels(&self, labels: &LabelSet) -> ErcResult<()> {
        self.write_json(LABELS_FILE, labels)
    }

    pub fn load_labels(&self) -> ErcResult<LabelSet> {
        self.read_json(LABELS_FILE)
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    fn ensure_dir(&self) -> ErcResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ErcError::persistence(&self.dir, e))
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> ErcResult<()> {
        self.ensure_dir()?;
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| ErcError::persistence(&path, e))?;
        fs::write(&path, json).map_err(|e| ErcError::persistence(&path, e))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> ErcResult<T> {
        let path = self.dir.join(file);
        let json = fs::read_to_string(&path).map_err(|e| ErcError::persistence(&path, e))?;
        serde_json::from_str(&json).map_err(|e| ErcError::persistence(&path, e))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{ErcModel, ErcModelConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> ErcModel<TestBackend> {
        ErcModelConfig::new(12, 8, 3)
            .with_d_model(8)
            .with_num_heads(2)
            .with_num_layers(1)
            .with_d_ff(16)
            .init(device)
    }

    #[test]
    fn test_saving_unchanged_model_twice_is_byte_identical() {
        let tmp    = tempfile::tempdir().unwrap();
        let store  = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let model  = tiny_model(&device);

        store.save_model::<TestBackend, _>(&model).unwrap();
        let first = fs::read(store.model_path()).unwrap();
        store.save_model::<TestBackend, _>(&model).unwrap();
        let second = fs::read(store.model_path()).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_creates_nested_directories() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path().join("runs").join("a"));
        store.save_model::<TestBackend, _>(&tiny_model(&Default::default())).unwrap();
        assert!(store.has_model());
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_restores_saved_weights() {
        let tmp    = tempfile::tempdir().unwrap();
        let store  = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let saved  = tiny_model(&device);
        store.save_model::<TestBackend, _>(&saved).unwrap();

        let loaded = store.load_model::<TestBackend, _>(tiny_model(&device), &device).unwrap();
        assert_eq!(
            loaded.classifier.weight.val().into_data(),
            saved.classifier.weight.val().into_data(),
        );
    }

    #[test]
    fn test_unwritable_directory_is_a_persistence_error() {
        let tmp     = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let store  = CheckpointStore::new(blocker.join("ckpt"));
        let result = store.save_model::<TestBackend, _>(&tiny_model(&Default::default()));
        assert!(matches!(result, Err(ErcError::Persistence { .. })));
    }

    #[test]
    fn test_missing_model_is_a_persistence_error() {
        let tmp    = tempfile::tempdir().unwrap();
        let store  = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let result = store.load_model::<TestBackend, _>(tiny_model(&device), &device);
        assert!(matches!(result, Err(ErcError::Persistence { .. })));
    }

    #[test]
    fn test_config_and_labels_round_trip() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let cfg   = TrainConfig { epochs: 3, batch_size: 2, ..TrainConfig::default() };
        store.save_config(&cfg).unwrap();
        assert_eq!(store.load_config().unwrap().epochs, 3);

        let labels = LabelSet::from_names(["joy", "anger", "neutral"]);
        store.save_labels(&labels).unwrap();
        assert_eq!(store.load_labels().unwrap(), labels);
    }

    #[test]
    fn test_training_state_requires_all_files() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store.save_model::<TestBackend, _>(&tiny_model(&Default::default())).unwrap();
        assert!(!store.has_resume_state());
    }
}

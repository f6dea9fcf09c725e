// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// One CSV row per epoch in <checkpoint_dir>/metrics.csv:
//
//   epoch,global_step,learning_rate,train_loss,dev_acc,dev_f1,test_f1,improved
//   0,3,0.000001,1.098612,0.500000,0.333333,0.400000,true
//   1,6,0.000000,1.097001,0.500000,0.333333,,false
//
// test_f1 is empty on epochs where the dev score did not improve,
// because the test split is only evaluated on improvement.
//
// The header is written once; later runs append to the same file.
// A resumed run restarts after the last improving epoch, so epochs
// logged after that point appear twice. Each resume writes a marker
// line first:
//
//   # resumed after epoch 0 at step 3
//
// Rows below the last marker supersede earlier rows for the same
// epoch. Readers that want plain CSV should skip lines starting
// with '#'.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::{ErcError, ErcResult};

const HEADER: &str = "epoch,global_step,learning_rate,train_loss,dev_acc,dev_f1,test_f1,improved";

/// One row of the metrics file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:         usize,
    /// Optimizer steps taken so far, after this epoch
    pub global_step:   usize,
    /// Rate of the last update applied in this epoch
    pub learning_rate: f64,
    /// Mean cross-entropy over the batches that produced an update
    pub train_loss:    f64,
    pub dev_acc:       f64,
    pub dev_f1:        f64,
    pub test_f1:       Option<f64>,
    pub improved:      bool,
}

impl EpochMetrics {
    fn to_csv_row(&self) -> String {
        let test_f1 = self.test_f1.map(|f| format!("{f:.6}")).unwrap_or_default();
        format!(
            "{},{},{:.9},{:.6},{:.6},{:.6},{},{}",
            self.epoch,
            self.global_step,
            self.learning_rate,
            self.train_loss,
            self.dev_acc,
            self.dev_f1,
            test_f1,
            self.improved,
        )
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> ErcResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| ErcError::persistence(dir, e))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            fs::write(&csv_path, format!("{HEADER}\n"))
                .map_err(|e| ErcError::persistence(&csv_path, e))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> ErcResult<()> {
        self.append(&m.to_csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, dev_f1={:.4}",
            m.epoch,
            m.train_loss,
            m.dev_f1,
        );
        Ok(())
    }

    /// Marks where a resumed run starts appending.
    pub fn log_resume(&self, epoch: usize, global_step: usize) -> ErcResult<()> {
        self.append(&format!("# resumed after epoch {epoch} at step {global_step}"))
    }

    fn append(&self, line: &str) -> ErcResult<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| ErcError::persistence(&self.csv_path, e))?;
        writeln!(f, "{line}").map_err(|e| ErcError::persistence(&self.csv_path, e))
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

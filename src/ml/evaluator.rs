// ============================================================
// Layer 5 — Evaluation Runner
// ============================================================
// One pass over a finite batch stream with a classifier in
// evaluation mode. Every batch is consumed exactly once and the
// outcome keeps predictions and gold labels index-aligned with the
// stream order, so they can go straight into the metric aggregator.
//
// Accuracy is counted per example, not averaged per batch, so a
// short final batch carries exactly its own weight.

use burn::prelude::*;

use crate::data::batcher::ErcBatch;
use crate::domain::error::{ErcError, ErcResult};
use crate::ml::model::EmotionClassifier;
use crate::ml::scoring::{weighted_prf, WeightedScores};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    /// correct / total over all examples; 0.0 for an empty stream
    pub accuracy:    f64,
    pub predictions: Vec<usize>,
    pub labels:      Vec<usize>,
}

impl EvaluationOutcome {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn weighted_scores(&self) -> ErcResult<WeightedScores> {
        weighted_prf(&self.labels, &self.predictions)
    }
}

pub fn evaluate<B, M, I>(model: &M, batches: I) -> ErcResult<EvaluationOutcome>
where
    B: Backend,
    M: EmotionClassifier<B>,
    I: IntoIterator<Item = ErcResult<ErcBatch<B>>>,
{
    let mut predictions = Vec::new();
    let mut labels      = Vec::new();

    for batch in batches {
        let batch  = batch?;
        let rows   = batch.validate()?;
        let scores = model.class_scores(&batch);
        let [score_rows, _] = scores.dims();
        if score_rows != rows {
            return Err(ErcError::DataShape(format!(
                "classifier returned {score_rows} score rows for a batch of {rows}"
            )));
        }

        // argmax(1) keeps the reduced axis: [batch, 1] → [batch]
        let predicted = scores.argmax(1).flatten::<1>(0, 1);
        predictions.extend(to_indices(predicted)?);
        labels.extend(to_indices(batch.labels)?);
    }

    let correct = predictions
        .iter()
        .zip(&labels)
        .filter(|(p, t)| p == t)
        .count();
    let accuracy = if labels.is_empty() {
        0.0
    } else {
        correct as f64 / labels.len() as f64
    };

    tracing::debug!("Evaluated {} examples, {} correct", labels.len(), correct);
    Ok(EvaluationOutcome { accuracy, predictions, labels })
}

fn to_indices<B: Backend>(tensor: Tensor<B, 1, Int>) -> ErcResult<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ErcError::DataShape(format!("cannot read class indices: {e:?}")))?;
    values
        .into_iter()
        .map(|v| {
            usize::try_from(v)
                .map_err(|_| ErcError::DataShape(format!("negative class index {v}")))
        })
        .collect()
}

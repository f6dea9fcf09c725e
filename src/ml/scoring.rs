// ============================================================
// Layer 5 — Metric Aggregator
// ============================================================
// Support-weighted precision / recall / F1 over every class that
// appears in either the true or the predicted labels.
//
//   weighted_X = Σ_c  X_c · support_c  /  Σ_c support_c
//
// support_c counts class c in the TRUE labels, so a class that is
// only ever predicted (never true) carries zero weight but still
// costs precision on the classes it was confused with.
// Undefined ratios (0/0) count as 0.

use std::collections::BTreeMap;

use crate::domain::error::{ErcError, ErcResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScores {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
    pub support:   usize,
}

#[derive(Default, Clone, Copy)]
struct ClassCounts {
    true_positive: usize,
    predicted:     usize,
    actual:        usize,
}

pub fn weighted_prf(truth: &[usize], predicted: &[usize]) -> ErcResult<WeightedScores> {
    if truth.len() != predicted.len() {
        return Err(ErcError::InvalidInput(format!(
            "{} true labels vs {} predictions",
            truth.len(),
            predicted.len()
        )));
    }
    if truth.is_empty() {
        return Err(ErcError::InvalidInput("no labels to score".to_string()));
    }

    let mut classes: BTreeMap<usize, ClassCounts> = BTreeMap::new();
    for (&t, &p) in truth.iter().zip(predicted) {
        classes.entry(t).or_default().actual += 1;
        classes.entry(p).or_default().predicted += 1;
        if t == p {
            classes.entry(t).or_default().true_positive += 1;
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    let total = truth.len() as f64;
    let mut scores = WeightedScores { precision: 0.0, recall: 0.0, f1: 0.0, support: truth.len() };

    for counts in classes.values() {
        let p  = ratio(counts.true_positive, counts.predicted);
        let r  = ratio(counts.true_positive, counts.actual);
        let f1 = if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) };
        let w  = counts.actual as f64 / total;

        scores.precision += p * w;
        scores.recall    += r * w;
        scores.f1        += f1 * w;
    }

    Ok(scores)
}

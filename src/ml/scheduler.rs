// ============================================================
// Layer 5 — Linear Warmup + Linear Decay Schedule
// ============================================================
//
//   lr
//   base ┤        ╱╲
//        │      ╱    ╲
//        │    ╱        ╲
//        │  ╱            ╲
//      0 ┼╱────────────────╲──── step
//        0   warmup         total
//
// The rate is a pure function of the global step, which is why
// the optimization controller must advance the step exactly once
// per training batch.

use crate::domain::error::{ErcError, ErcResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearWarmupDecay {
    base_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
}

impl LinearWarmupDecay {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> ErcResult<Self> {
        if !(base_lr.is_finite() && base_lr > 0.0) {
            return Err(ErcError::Configuration(format!(
                "learning rate must be positive, got {base_lr}"
            )));
        }
        if total_steps == 0 {
            return Err(ErcError::Configuration(
                "schedule needs at least one training step".to_string(),
            ));
        }
        if warmup_steps > total_steps {
            return Err(ErcError::Configuration(format!(
                "warmup ({warmup_steps}) exceeds total steps ({total_steps})"
            )));
        }
        Ok(Self { base_lr, warmup_steps, total_steps })
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let span      = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        self.base_lr * (remaining / span).max(0.0)
    }

    pub fn base_lr(&self) -> f64 {
        self.base_lr
    }

    pub fn warmup_steps(&self) -> usize {
        self.warmup_steps
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

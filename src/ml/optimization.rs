// ============================================================
// Layer 5 — Optimization Controller
// ============================================================
// Owns the optimizer, the learning-rate schedule and the global
// step counter. One training batch = one call to `step`, which
// runs three phases in a fixed order:
//
//   1. backward  loss → gradients
//   2. clip      rescale ALL gradients together when their global
//                L2 norm exceeds `max_grad_norm`
//   3. apply     optimizer update at lr(global_step), then
//                global_step += 1
//
// Burn's optimizer consumes the GradientsParams it is given, so
// "zeroing the gradients" is simply the gradients going out of
// scope after phase 3.
//
// A non-finite loss or gradient norm never reaches the optimizer:
// depending on the policy the run aborts, or the update is dropped
// and only the schedule advances.
//
// Reference: Pascanu et al. (2013) On the difficulty of training RNNs
//            Loshchilov & Hutter (2019) AdamW

use std::{fmt, marker::PhantomData, str::FromStr};

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::{ErcError, ErcResult};
use crate::ml::scheduler::LinearWarmupDecay;

/// What to do when the loss or the gradients stop being finite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonFinitePolicy {
    #[default]
    Abort,
    SkipStep,
}

impl FromStr for NonFinitePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort"     => Ok(Self::Abort),
            "skip-step" => Ok(Self::SkipStep),
            other       => Err(format!("unknown policy '{other}' (expected abort|skip-step)")),
        }
    }
}

impl fmt::Display for NonFinitePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abort    => "abort",
            Self::SkipStep => "skip-step",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Applied { loss: f64, grad_norm: f64, lr: f64 },
    Skipped { quantity: &'static str },
}

pub struct OptimizationController<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    optimizer:     O,
    schedule:      LinearWarmupDecay,
    max_grad_norm: f64,
    policy:        NonFinitePolicy,
    global_step:   usize,
    _marker:       PhantomData<(B, M)>,
}

impl<B, M, O> OptimizationController<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(
        optimizer:     O,
        schedule:      LinearWarmupDecay,
        max_grad_norm: f64,
        policy:        NonFinitePolicy,
    ) -> ErcResult<Self> {
        if !(max_grad_norm.is_finite() && max_grad_norm > 0.0) {
            return Err(ErcError::Configuration(format!(
                "max_grad_norm must be positive, got {max_grad_norm}"
            )));
        }
        Ok(Self {
            optimizer,
            schedule,
            max_grad_norm,
            policy,
            global_step: 0,
            _marker: PhantomData,
        })
    }

    /// Continue from a saved step counter and optimizer record.
    pub fn restore(mut self, global_step: usize, record: O::Record) -> Self {
        self.optimizer   = self.optimizer.load_record(record);
        self.global_step = global_step;
        self
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Rate the next `apply` will use
    pub fn learning_rate(&self) -> f64 {
        self.schedule.lr_at(self.global_step)
    }

    pub fn schedule(&self) -> &LinearWarmupDecay {
        &self.schedule
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// Run the full backward → clip → apply sequence for one batch.
    pub fn step(&mut self, model: M, loss: Tensor<B, 1>) -> ErcResult<(M, StepOutcome)> {
        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return self.reject(model, "loss");
        }

        let grads = self.backward(loss, &model);
        let (grads, grad_norm) = self.clip(grads, &model);
        if !grad_norm.is_finite() {
            return self.reject(model, "gradient norm");
        }

        let lr    = self.learning_rate();
        let model = self.apply(model, grads);
        Ok((model, StepOutcome::Applied { loss: loss_value, grad_norm, lr }))
    }

    pub fn backward(&self, loss: Tensor<B, 1>, model: &M) -> GradientsParams {
        GradientsParams::from_grads(loss.backward(), model)
    }

    /// Returns the (possibly rescaled) gradients and their norm before clipping.
    pub fn clip(&self, mut grads: GradientsParams, model: &M) -> (GradientsParams, f64) {
        let norm = global_grad_norm::<B, M>(&grads, model);
        if let Some(coef) = clip_coefficient(norm, self.max_grad_norm) {
            let mut scaler = ScaleGrads::<B> { grads: &mut grads, factor: coef, _b: PhantomData };
            model.visit(&mut scaler);
        }
        (grads, norm)
    }

    pub fn apply(&mut self, model: M, grads: GradientsParams) -> M {
        let lr    = self.schedule.lr_at(self.global_step);
        let model = self.optimizer.step(lr, model, grads);
        self.global_step += 1;
        model
    }

    fn reject(&mut self, model: M, quantity: &'static str) -> ErcResult<(M, StepOutcome)> {
        match self.policy {
            NonFinitePolicy::Abort => Err(ErcError::NumericInstability {
                quantity,
                step: self.global_step,
            }),
            NonFinitePolicy::SkipStep => {
                tracing::warn!(
                    "Skipping update at step {}: non-finite {}",
                    self.global_step,
                    quantity
                );
                self.global_step += 1;
                Ok((model, StepOutcome::Skipped { quantity }))
            }
        }
    }
}

/// Scale factor to apply, or None when the norm is already within bounds.
pub fn clip_coefficient(norm: f64, max_norm: f64) -> Option<f64> {
    if !norm.is_finite() {
        return None;
    }
    let coef = max_norm / (norm + 1e-6);
    (coef < 1.0).then_some(coef)
}

/// L2 norm over every parameter gradient of `model`, taken together
pub fn global_grad_norm<B, M>(grads: &GradientsParams, model: &M) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut acc = SquaredNorm::<B> { grads, sum: 0.0, _b: PhantomData };
    model.visit(&mut acc);
    acc.sum.sqrt()
}

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum:   f64,
    _b:    PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct ScaleGrads<'a, B: AutodiffBackend> {
    grads:  &'a mut GradientsParams,
    factor: f64,
    _b:     PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

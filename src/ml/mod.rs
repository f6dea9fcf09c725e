// ============================================================
// Layer 5 — ML / Training Core (Burn)
// ============================================================
// All tensor maths and the training state machine live here.
//
//   model.rs       : context encoder + speaker-memory classifier
//   scheduler.rs   : linear warmup / linear decay learning rate
//   optimization.rs: backward → global-norm clip → AdamW step
//   scoring.rs     : support-weighted precision / recall / F1
//   evaluator.rs   : one evaluation pass over a batch stream
//   trainer.rs     : epochs, dev selection, best-so-far checkpoint
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

pub mod model;

pub mod scheduler;

pub mod optimization;

/// Weighted P/R/F1 over index-aligned label lists
pub mod scoring;

pub mod evaluator;

/// Epoch loop with best-so-far checkpoint selection
pub mod trainer;

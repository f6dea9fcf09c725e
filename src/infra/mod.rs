// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of a run:
//
//   checkpoint.rs     : model.bin, resume state, config and
//                        label set under the checkpoint dir
//   tokenizer_store.rs: tokenizer.json, loaded or built once
//   metrics.rs        : per-epoch metrics.csv
//   run_log.rs        : the append-only text log (erc.log)
//
// Reference: Rust Book §9 (Error Handling)
//            Burn Book §5 (Checkpointing)

/// Best-so-far model checkpoint and resumable training state
pub mod checkpoint;

/// Tokenizer training, saving, and loading
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;

pub mod run_log;

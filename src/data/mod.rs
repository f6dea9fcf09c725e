// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From dialogue files on disk to tensor batches on the device:
//
//   {train,dev,test}.json
//       │
//       ▼
//   JsonDialogueLoader → Vec<Dialogue> per partition
//       │
//       ▼
//   Preprocessor       → cleans utterance text
//       │
//       ▼
//   SampleBuilder      → one ErcSample per turn
//                        (context ids + speaker memory + label)
//       │
//       ▼
//   ErcDataset         → implements Burn's Dataset trait
//       │
//       ▼
//   ErcBatcher         → pads into ErcBatch tensors
//       │
//       ▼
//   PrefetchLoader     → worker threads, batches in stream order
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads dialogue partitions from JSON files
pub mod loader;

/// Cleans and normalises utterance text
pub mod preprocessor;

pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

pub mod prefetch;

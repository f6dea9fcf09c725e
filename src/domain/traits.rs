// ============================================================
// Layer 3 — Core Traits
// ============================================================
// Ingestion sits behind a trait so the training core never
// depends on the on-disk format of the corpus.

use crate::domain::dialogue::{Dialogue, Split};
use crate::domain::error::ErcResult;

/// Anything that can hand back the labelled dialogues of a partition.
///
/// Implementations:
///   - JsonDialogueLoader → one JSON file per partition
///   - in-memory sources in the use-case tests
pub trait DialogueSource {
    /// Load every dialogue of `split`, in file order.
    /// Calling it again restarts from the beginning.
    fn load(&self, split: Split) -> ErcResult<Vec<Dialogue>>;
}

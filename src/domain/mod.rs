// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer. Nothing in here
// touches Burn, the filesystem, or a tokenizer.

// Dialogues, turns, partitions and the emotion label set
pub mod dialogue;

// The error taxonomy of the training core
pub mod error;

// Abstractions over the data source
pub mod traits;

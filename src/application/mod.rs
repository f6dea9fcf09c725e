// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Wires the other layers together for one goal each. No tensor
// maths and no printing here: only workflow coordination.
//
// Reference: Clean Architecture pattern

// The training workflow
pub mod train_use_case;

// Scoring a saved checkpoint
pub mod evaluate_use_case;

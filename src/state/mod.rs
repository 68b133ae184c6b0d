//! Durable session state for cross-session continuity.

mod context;

pub use context::{CheckpointEntry, ContextStore, DecisionEntry, HandoffPackage};

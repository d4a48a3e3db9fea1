//! Moderation gate: text normalization, the external classifier client,
//! and the pass/block decision applied before a message reaches the hub.
//!
//! The gate performs no ML itself — it normalizes, calls the external
//! classifier capability, and applies a confidence threshold. A classifier
//! outage is handled per the configured fail-open/fail-closed policy and is
//! never fatal to the relay.

pub mod classifier;
pub mod gate;
pub mod normalize;

pub use classifier::{Classification, Classifier, HttpClassifier};
pub use gate::{Decision, FailurePolicy, ModerationGate, DEFAULT_THRESHOLD};
pub use normalize::normalize;

/// The classification capability was unreachable or returned garbage.
///
/// Recovered per the gate's failure policy; never propagated past the
/// session that triggered the call.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

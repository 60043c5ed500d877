//! Analysis modules.
//!
//! Aggregation turns raw study records into per-effect probabilities;
//! reconciliation decides which of them the store is missing.

pub mod aggregator;
pub mod reconciler;

pub use aggregator::{aggregate, DEFAULT_THRESHOLD};
pub use reconciler::{normalize_drug_name, reconcile, Reconciliation};

//! Pronunciation scoring core
//!
//! The artifact side of the train/export/verify contract between the offline
//! trainer and the on-device scorer.
//!
//! Modules:
//! - `features`: Feature-vector contract (39 features, `f0..f38`, binary label)
//! - `forest`: Decision trees and ensemble vote aggregation
//! - `graph`: Portable computation-graph artifact and its on-disk envelope
//! - `session`: Inference runtime executing exported artifacts
//! - `normalization`: Min-max bounds applied by the mobile scorer
//! - `serde_canon`: Canonical JSON and BLAKE3 hashing

pub mod errors;
pub mod features;
pub mod forest;
pub mod graph;
pub mod normalization;
pub mod serde_canon;
pub mod session;

pub use errors::{CoreError, Result};
pub use features::{
    feature_name, feature_names, CLASS_COUNT, CLASS_NAMES, FEATURE_COUNT, LABEL_COLUMN,
    LABEL_CORRECT, LABEL_MISPRONOUNCED, METADATA_COLUMNS,
};
pub use forest::{Node, Tree, TreeEnsemble, SCALE};
pub use graph::{Artifact, DataType, Graph, Producer, TensorSpec};
pub use normalization::NormalizationBounds;
pub use session::{Session, SessionOutput};

/// Crate version string for artifact producer metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

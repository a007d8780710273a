//! CSVision training pipeline
//!
//! Turns an uploaded CSV plus a small request (model kind, features, target,
//! seed) into a trained, evaluated model summarized as a [`ModelResult`].

pub mod config;
pub mod deterministic;
pub mod errors;
pub mod evaluation;
pub mod extract;
pub mod features;
pub mod labels;
pub mod pipeline;
pub mod schema;
pub mod serialization;
pub mod split;
pub mod staging;
pub mod table;
pub mod trainers;

pub use config::PipelineConfig;
pub use deterministic::{LcgRng, SplitTieBreaker, UNSEEDED};
pub use errors::{FitDiagnostics, PipelineError, Result};
pub use evaluation::{ConfusionMatrix, Metrics};
pub use pipeline::{train, train_from_path, train_table, ModelResult, Stage, TrainingRequest};
pub use schema::{infer_schema, infer_schema_from_csv, ColumnKind, ColumnSchema};
pub use staging::StagedUpload;
pub use table::RawTable;
pub use trainers::{ModelKind, TaskKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

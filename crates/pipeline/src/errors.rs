//! Error types for the training pipeline

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Number of encoded rows captured when a trainer fails.
pub const DIAGNOSTIC_PREVIEW_ROWS: usize = 5;

/// Errors returned by the training pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The uploaded CSV had no lines at all
    #[error("input is empty: expected a header line")]
    EmptyInput,

    /// Malformed or unusable data
    #[error("data error: {0}")]
    Data(String),

    /// The resolved schema cannot support the request
    #[error("schema error: {0}")]
    Schema(String),

    /// The target column does not exist in the inferred schema
    #[error("target column '{column}' not found in dataset")]
    SchemaMismatch { column: String },

    /// The trainer could not produce a usable model
    #[error("training failed: {reason}")]
    Fit {
        reason: String,
        diagnostics: FitDiagnostics,
    },

    /// Invalid configuration or request token
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Message that is safe to show to whoever submitted the dataset.
    ///
    /// Fit diagnostics and I/O details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::EmptyInput
            | PipelineError::Data(_)
            | PipelineError::Schema(_)
            | PipelineError::SchemaMismatch { .. }
            | PipelineError::Config(_) => self.to_string(),
            PipelineError::Csv(_) => "the uploaded file is not valid CSV".to_string(),
            PipelineError::Fit { reason, .. } => format!("model training failed: {reason}"),
            PipelineError::Io(_) => "an internal error occurred".to_string(),
        }
    }

    /// Whether the failure was caused by the submitted data rather than the service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PipelineError::Io(_))
    }

    pub(crate) fn fit(reason: impl Into<String>, diagnostics: FitDiagnostics) -> Self {
        PipelineError::Fit {
            reason: reason.into(),
            diagnostics,
        }
    }
}

/// Snapshot of the post-encoding training view, captured when fitting fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitDiagnostics {
    pub feature_names: Vec<String>,
    pub rows: Vec<PreviewRow>,
    pub total_rows: usize,
}

/// One encoded row of a [`FitDiagnostics`] preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub features: Vec<f32>,
    pub label: String,
}

impl fmt::Display for FitDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} training rows, features [{}]",
            self.total_rows,
            self.feature_names.join(", ")
        )?;
        for (i, row) in self.rows.iter().enumerate() {
            writeln!(f, "  row {}: label={} features={:?}", i, row.label, row.features)?;
        }
        Ok(())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_errors_hide_diagnostics_from_users() {
        let err = PipelineError::fit(
            "training split contains a single class",
            FitDiagnostics {
                feature_names: vec!["x_num".into()],
                rows: vec![PreviewRow {
                    features: vec![1.0],
                    label: "true".into(),
                }],
                total_rows: 1,
            },
        );
        let message = err.user_message();
        assert!(message.contains("single class"));
        assert!(!message.contains("x_num"));
    }

    #[test]
    fn io_errors_are_generic() {
        let err = PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "/tmp/secret path",
        ));
        assert_eq!(err.user_message(), "an internal error occurred");
        assert!(!err.is_client_error());
    }

    #[test]
    fn diagnostics_render_each_row() {
        let diagnostics = FitDiagnostics {
            feature_names: vec!["a_num".into(), "b_num".into()],
            rows: vec![
                PreviewRow {
                    features: vec![1.0, 2.0],
                    label: "0".into(),
                },
                PreviewRow {
                    features: vec![3.0, f32::NAN],
                    label: "1".into(),
                },
            ],
            total_rows: 2,
        };
        let text = diagnostics.to_string();
        assert!(text.contains("a_num, b_num"));
        assert!(text.contains("row 1"));
    }
}

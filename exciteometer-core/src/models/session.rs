use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One labelled capture and its result.
///
/// Created pending (aggregate = negative infinity, no file) when capture
/// starts and committed exactly once when it stops. A committed record is
/// never mutated again; the registry holds its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    label: String,
    aggregate_loudness: f64,
    output_file_path: Option<PathBuf>,
}

impl Session {
    /// A pending session that has not produced a result yet.
    pub fn pending(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            aggregate_loudness: f64::NEG_INFINITY,
            output_file_path: None,
        }
    }

    /// Consumes the pending record and returns the committed one.
    pub fn commit(self, aggregate_loudness: f64, output_file_path: PathBuf) -> Self {
        Self {
            label: self.label,
            aggregate_loudness,
            output_file_path: Some(output_file_path),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Mean decibel value, or negative infinity when no samples were kept.
    pub fn aggregate_loudness(&self) -> f64 {
        self.aggregate_loudness
    }

    pub fn output_file_path(&self) -> Option<&Path> {
        self.output_file_path.as_deref()
    }

    pub fn is_committed(&self) -> bool {
        self.output_file_path.is_some()
    }

    /// Aggregate loudness with two decimals, e.g. `-10.00`.
    pub fn display_loudness(&self) -> String {
        format!("{:.2}", self.aggregate_loudness)
    }
}

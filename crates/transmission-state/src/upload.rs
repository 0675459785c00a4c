//! # Upload and Processing Lifecycles
//!
//! ```text
//! UploadStatus:      PENDING ──▶ COMPLETE
//!                       └──────▶ FAILED
//!
//! ProcessingStatus:  PENDING ──▶ RUNNING ──▶ COMPLETE
//!                       │           └──────▶ FAILED
//!                       └──────────────────▶ FAILED
//! ```
//!
//! Documents only have an upload lifecycle. Imports have both; processing
//! starts only after the file landed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors raised by upload and processing transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Transition not in the graph.
    #[error("cannot change {field} from {from} to {to}")]
    InvalidTransition {
        /// Status attribute.
        field: &'static str,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Processing cannot start before the upload completed.
    #[error("processing cannot start until the upload is COMPLETE (upload_status is {upload})")]
    UploadIncomplete {
        /// Current upload status.
        upload: String,
    },
}

impl UploadError {
    /// Attribute the error points at.
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidTransition { field, .. } => field,
            Self::UploadIncomplete { .. } => "processing_status",
        }
    }
}

/// Upload status of a document or import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    /// Upload descriptor issued, object not yet confirmed.
    #[default]
    Pending,
    /// Object present in storage.
    Complete,
    /// Upload abandoned or rejected.
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// Next status after `to` is requested. Re-asserting the current status
    /// is accepted as a no-op.
    pub fn transition_to(self, to: UploadStatus) -> Result<UploadStatus, UploadError> {
        match (self, to) {
            (from, to) if from == to => Ok(to),
            (Self::Pending, Self::Complete | Self::Failed) => Ok(to),
            (from, to) => Err(UploadError::InvalidTransition {
                field: "upload_status",
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            }),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Waiting for a worker.
    #[default]
    Pending,
    /// Being processed.
    Running,
    /// Processed.
    Complete,
    /// Processing failed.
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// Advance processing given the current upload status.
    pub fn transition_to(
        self,
        to: ProcessingStatus,
        upload: UploadStatus,
    ) -> Result<ProcessingStatus, UploadError> {
        if self == to {
            return Ok(to);
        }
        let allowed = matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Complete)
                | (Self::Running, Self::Failed)
        );
        if !allowed {
            return Err(UploadError::InvalidTransition {
                field: "processing_status",
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        if to != Self::Failed && upload != UploadStatus::Complete {
            return Err(UploadError::UploadIncomplete {
                upload: upload.as_str().to_string(),
            });
        }
        Ok(to)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

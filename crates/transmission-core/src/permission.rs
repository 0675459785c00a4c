//! # Permission Levels and Shipment Endpoints
//!
//! Access to a shipment is granted per sub-resource ("endpoint") at one of
//! three totally ordered levels: `NONE < READ_ONLY < READ_WRITE`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ValidationError;

/// Number of shipment endpoints access can be granted on.
pub const ENDPOINT_COUNT: usize = 6;

/// Level of access granted on one endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    /// No access.
    #[default]
    None,
    /// Read access.
    ReadOnly,
    /// Read and write access.
    ReadWrite,
}

impl PermissionLevel {
    /// Whether this level satisfies a request for `required`.
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        self >= required
    }

    /// Parse the wire form (`NONE`, `READ_ONLY`, `READ_WRITE`).
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "NONE" => Ok(Self::None),
            "READ_ONLY" => Ok(Self::ReadOnly),
            "READ_WRITE" => Ok(Self::ReadWrite),
            other => Err(ValidationError::UnknownVariant {
                field: "permission",
                value: other.to_string(),
            }),
        }
    }

    /// Wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::ReadOnly => "READ_ONLY",
            Self::ReadWrite => "READ_WRITE",
        }
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shipment sub-resource that access is granted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The shipment record itself.
    Shipment,
    /// Tags, only visible through the shipment representation.
    Tags,
    /// Uploaded documents.
    Documents,
    /// Free-text notes.
    Notes,
    /// Device location points.
    Tracking,
    /// Device sensor readings.
    Telemetry,
}

impl Endpoint {
    /// All endpoints in canonical order.
    pub const ALL: [Endpoint; ENDPOINT_COUNT] = [
        Self::Shipment,
        Self::Tags,
        Self::Documents,
        Self::Notes,
        Self::Tracking,
        Self::Telemetry,
    ];

    /// Name of the access request attribute holding this endpoint's level.
    pub fn permission_field(self) -> &'static str {
        match self {
            Self::Shipment => "shipment_permission",
            Self::Tags => "tags_permission",
            Self::Documents => "documents_permission",
            Self::Notes => "notes_permission",
            Self::Tracking => "tracking_permission",
            Self::Telemetry => "telemetry_permission",
        }
    }

    /// Whether write access may be requested on this endpoint. Device data is
    /// only ever appended by the device itself.
    pub fn accepts_write_requests(self) -> bool {
        !matches!(self, Self::Tracking | Self::Telemetry)
    }

    /// Stable position in [`Endpoint::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::Shipment => 0,
            Self::Tags => 1,
            Self::Documents => 2,
            Self::Notes => 3,
            Self::Tracking => 4,
            Self::Telemetry => 5,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Shipment => "shipment",
            Self::Tags => "tags",
            Self::Documents => "documents",
            Self::Notes => "notes",
            Self::Tracking => "tracking",
            Self::Telemetry => "telemetry",
        };
        f.write_str(s)
    }
}

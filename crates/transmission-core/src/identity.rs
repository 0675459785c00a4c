//! # Identity Newtypes
//!
//! Each identifier is a distinct type, so a [`DeviceId`] cannot be passed
//! where a [`ShipmentId`] is expected.
//!
//! ## Validation
//!
//! UUID-based identifiers are always valid by construction. String-based
//! identifiers issued by external services ([`UserId`], [`WalletId`],
//! [`CertificateId`], ...) are trimmed and bounded at construction and at
//! deserialization time.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum length of an externally issued identifier.
pub const MAX_EXTERNAL_ID_LEN: usize = 255;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
        #[serde(transparent)]
        pub struct $ty(Uuid);

        impl $ty {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }
    };
}

macro_rules! external_id {
    ($(#[$meta:meta])* $ty:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
        #[serde(transparent)]
        pub struct $ty(String);

        impl $ty {
            /// Validate and wrap an externally issued identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::Empty { field: $field });
                }
                if trimmed.len() > MAX_EXTERNAL_ID_LEN {
                    return Err(ValidationError::TooLong {
                        field: $field,
                        max: MAX_EXTERNAL_ID_LEN,
                        actual: trimmed.len(),
                    });
                }
                if trimmed.chars().any(|c| c.is_control() || c == '/') {
                    return Err(ValidationError::Malformed {
                        field: $field,
                        value: trimmed.to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Locally issued identifiers
// ---------------------------------------------------------------------------

uuid_id!(
    /// Identifier of a shipment, the aggregate root.
    ShipmentId
);
uuid_id!(
    /// Identifier of a physical tracking device.
    DeviceId
);
uuid_id!(
    /// Identifier of an access request.
    AccessRequestId
);
uuid_id!(
    /// Identifier of a permission link. Possession of the id is the capability.
    PermissionLinkId
);
uuid_id!(
    /// Identifier of a shipment document.
    DocumentId
);
uuid_id!(
    /// Identifier of a bulk shipment import.
    ImportId
);
uuid_id!(
    /// Identifier of a shipment note.
    NoteId
);
uuid_id!(
    /// Identifier of a shipment tag.
    TagId
);
uuid_id!(
    /// Identifier of an audit history entry.
    HistoryId
);
uuid_id!(
    /// Identifier of one tracking point.
    TrackingId
);
uuid_id!(
    /// Identifier of one telemetry reading.
    TelemetryId
);

// ---------------------------------------------------------------------------
// Externally issued identifiers
// ---------------------------------------------------------------------------

external_id!(
    /// Subject of an authenticated caller, taken from the JWT `sub` claim.
    UserId,
    "user_id"
);
external_id!(
    /// Organization a caller belongs to.
    OrganizationId,
    "organization_id"
);
external_id!(
    /// Wallet held by a shipment party in the identity service.
    WalletId,
    "wallet_id"
);
external_id!(
    /// Storage credentials registered in the identity service.
    StorageCredentialsId,
    "storage_credentials_id"
);
external_id!(
    /// Certificate a device signs its payloads with.
    CertificateId,
    "certificate_id"
);

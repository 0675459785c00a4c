//! # transmission-core — Foundational Types for Transmission
//!
//! Leaf crate of the workspace. Defines the identifier newtypes every other
//! crate passes around, the three-level [`PermissionLevel`] lattice, and the
//! six shipment sub-resources ([`Endpoint`]) that access is granted on.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `transmission-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod permission;

pub use error::ValidationError;
pub use identity::{
    AccessRequestId, CertificateId, DeviceId, DocumentId, HistoryId, ImportId, NoteId,
    OrganizationId, PermissionLinkId, ShipmentId, StorageCredentialsId, TagId, TelemetryId,
    TrackingId, UserId, WalletId,
};
pub use permission::{Endpoint, PermissionLevel, ENDPOINT_COUNT};

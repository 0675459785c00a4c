//! # transmission-state — Lifecycle State Machines
//!
//! - [`shipment`]: `AWAITING_PICKUP → IN_TRANSIT → AWAITING_DELIVERY → DELIVERED`
//!   driven by an explicit `(state, action)` transition table, with the
//!   asset tag check as a pure function of the lifecycle and the input.
//! - [`upload`]: document/import upload and import processing lifecycles.
//! - [`access_request`]: permission request validation and the approval
//!   workflow.
//!
//! Everything here is synchronous and persistence-agnostic. Each operation
//! validates completely before mutating, so a rejected call leaves the
//! record unchanged.

pub mod access_request;
pub mod shipment;
pub mod upload;

pub use access_request::{
    AccessRequest, AccessRequestError, AccessRequestUpdate, PartialPermissionSet, PermissionSet,
    UpdateActor,
};
pub use shipment::{
    ActionInput, ExceptionType, GtxValidation, ShipmentAction, ShipmentError, ShipmentLifecycle,
    ShipmentState, Transition, TransitionEffect, TransitionRecord,
};
pub use upload::{ProcessingStatus, UploadError, UploadStatus};

//! # transmission-profiles -- Collaborator Clients
//!
//! Typed HTTP clients for the services Transmission depends on:
//! - **Profiles** identity service: wallet, storage credential and device
//!   ownership lookups made with the caller's own bearer token.
//! - **Device registry**: certificate status and public keys.
//! - **Device shadow**: desired-state updates after a shipment transition.
//! - **GTX**: asset validation requested at pickup.
//!
//! The API crate depends on the traits in [`gateway`], not on the HTTP
//! clients, so tests substitute in-process fakes.
//!
//! Calls are made once. There is no retry; a failed call surfaces to the
//! request that made it.

pub mod config;
pub mod error;
pub mod gateway;
pub mod gtx;
pub mod identity;
pub mod registry;
pub mod shadow;

pub use config::CollaboratorConfig;
pub use error::ProfilesError;
pub use gateway::{DeviceRegistry, GtxValidator, IdentityGateway, ShadowPublisher};
pub use gtx::{GtxClient, GtxOutcome};
pub use identity::ProfilesClient;
pub use registry::{CertificateRecord, CertificateStatus, DeviceRegistryClient};
pub use shadow::{ShadowClient, ShadowUpdate};

use std::time::Duration;

/// Build the shared HTTP client used by every collaborator client.
pub fn http_client(config: &CollaboratorConfig) -> Result<reqwest::Client, ProfilesError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ProfilesError::Http {
            endpoint: "client_init".into(),
            source: e,
        })
}

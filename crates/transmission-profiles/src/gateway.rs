//! Collaborator seams.

use async_trait::async_trait;
use transmission_core::{CertificateId, DeviceId, ShipmentId, StorageCredentialsId, WalletId};

use crate::error::ProfilesError;
use crate::gtx::GtxOutcome;
use crate::registry::CertificateRecord;
use crate::shadow::ShadowUpdate;

/// Ownership lookups against the identity service. Each call carries the
/// caller's bearer token; a positive answer means the caller holds the
/// resource.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn wallet_is_active(&self, token: &str, wallet: &WalletId) -> Result<bool, ProfilesError>;

    async fn storage_credentials_is_active(
        &self,
        token: &str,
        credentials: &StorageCredentialsId,
    ) -> Result<bool, ProfilesError>;

    async fn device_is_active(&self, token: &str, device: &DeviceId) -> Result<bool, ProfilesError>;
}

/// Device certificate registry.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Look up one certificate. `None` when the registry does not know it.
    async fn certificate(
        &self,
        certificate: &CertificateId,
    ) -> Result<Option<CertificateRecord>, ProfilesError>;

    /// The ACTIVE certificate attached to `device`, if any.
    async fn active_certificate_for_device(
        &self,
        device: &DeviceId,
    ) -> Result<Option<CertificateRecord>, ProfilesError>;
}

/// Device shadow updates.
#[async_trait]
pub trait ShadowPublisher: Send + Sync {
    async fn publish(&self, device: &DeviceId, update: &ShadowUpdate) -> Result<(), ProfilesError>;
}

/// GTX asset validation.
#[async_trait]
pub trait GtxValidator: Send + Sync {
    async fn request_validation(
        &self,
        shipment: &ShipmentId,
        asset_hash: &str,
    ) -> Result<GtxOutcome, ProfilesError>;
}

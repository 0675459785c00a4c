//! # Record Types
//!
//! Records held in the in-memory stores and written through to Postgres.
//! Each record serializes to the JSON body stored in its table; the
//! attributes returned to clients are built from the record by the route
//! modules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use transmission_access::PermissionLinkWindow;
use transmission_core::{
    CertificateId, DeviceId, DocumentId, ImportId, NoteId, OrganizationId, PermissionLinkId,
    ShipmentId, StorageCredentialsId, TagId, TelemetryId, TrackingId, UserId, WalletId,
};
use transmission_crypto::DevicePublicKey;
use transmission_state::{
    AccessRequest, ExceptionType, ProcessingStatus, ShipmentLifecycle, UploadStatus,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extractors::{check_opt_len, require_text, Validate};
use crate::history::HistoryEntry;

/// Maximum length of short descriptive strings.
pub const MAX_FIELD_LEN: usize = 255;

// ─── Persistence ─────────────────────────────────────────────────────

/// A record with its own table.
pub trait Persisted: Serialize + serde::de::DeserializeOwned + Send + Sync {
    const TABLE: &'static str;

    fn key(&self) -> Uuid;

    /// Parent shipment, when the record belongs to one.
    fn shipment_key(&self) -> Option<Uuid>;
}

macro_rules! persisted {
    ($ty:ty, $table:literal, |$r:ident| $key:expr, $shipment:expr) => {
        impl Persisted for $ty {
            const TABLE: &'static str = $table;

            fn key(&self) -> Uuid {
                let $r = self;
                $key
            }

            #[allow(unused_variables)]
            fn shipment_key(&self) -> Option<Uuid> {
                let $r = self;
                $shipment
            }
        }
    };
}

persisted!(ShipmentRecord, "shipments", |r| *r.id.as_uuid(), Some(*r.id.as_uuid()));
persisted!(DeviceRecord, "devices", |r| *r.id.as_uuid(), r.shipment_id.map(|s| *s.as_uuid()));
persisted!(AccessRequest, "access_requests", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));
persisted!(PermissionLinkRecord, "permission_links", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));
persisted!(DocumentRecord, "documents", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));
persisted!(ImportRecord, "shipment_imports", |r| *r.id.as_uuid(), None);
persisted!(NoteRecord, "notes", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));
persisted!(TagRecord, "tags", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));
persisted!(TrackingRecord, "tracking_data", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));
persisted!(TelemetryRecord, "telemetry_data", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));
persisted!(HistoryEntry, "history", |r| *r.id.as_uuid(), Some(*r.shipment_id.as_uuid()));

// ─── Shipments ───────────────────────────────────────────────────────

/// Descriptive shipment attributes. None of them affect behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ShipmentDetails {
    pub shippers_reference: Option<String>,
    pub forwarders_reference: Option<String>,
    pub carrier_scac: Option<String>,
    pub bill_master: Option<String>,
    pub bill_house: Option<String>,
    pub vessel_name: Option<String>,
    pub voyage_number: Option<String>,
    pub container_qty: Option<u32>,
    pub package_qty: Option<u32>,
    pub weight_gross_kgs: Option<f64>,
    pub volume_cbms: Option<f64>,
    pub pickup_est: Option<DateTime<Utc>>,
    pub port_arrival_est: Option<DateTime<Utc>>,
    pub delivery_est: Option<DateTime<Utc>>,
    pub special_instructions: Option<String>,
    /// Free-form key/value pairs defined by the customer.
    #[schema(value_type = Option<Object>)]
    pub customer_fields: Option<BTreeMap<String, Value>>,
}

impl Validate for ShipmentDetails {
    fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("shippers_reference", &self.shippers_reference),
            ("forwarders_reference", &self.forwarders_reference),
            ("carrier_scac", &self.carrier_scac),
            ("bill_master", &self.bill_master),
            ("bill_house", &self.bill_house),
            ("vessel_name", &self.vessel_name),
            ("voyage_number", &self.voyage_number),
        ] {
            check_opt_len(field, value.as_deref(), MAX_FIELD_LEN)?;
        }
        check_opt_len("special_instructions", self.special_instructions.as_deref(), 1000)?;
        for (field, value) in [
            ("weight_gross_kgs", self.weight_gross_kgs),
            ("volume_cbms", self.volume_cbms),
        ] {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(AppError::field(field, format!("{field} must be a non-negative number")));
            }
        }
        Ok(())
    }
}

/// Ship-from or ship-to location, created with the shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub address_1: Option<String>,
    #[serde(default)]
    pub address_2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Location {
    /// Validate as the attribute `prefix`.
    pub fn validate_as(&self, prefix: &str) -> Result<(), AppError> {
        require_text(&format!("{prefix}.name"), &self.name, MAX_FIELD_LEN)?;
        for (field, value) in [
            ("address_1", &self.address_1),
            ("address_2", &self.address_2),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ] {
            check_opt_len(&format!("{prefix}.{field}"), value.as_deref(), MAX_FIELD_LEN)?;
        }
        check_coordinates(prefix, self.latitude, self.longitude)
    }
}

/// Latitude in [-90, 90] and longitude in [-180, 180] when present.
pub fn check_coordinates(prefix: &str, latitude: Option<f64>, longitude: Option<f64>) -> Result<(), AppError> {
    let join = |field: &str| {
        if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        }
    };
    if latitude.is_some_and(|v| !(-90.0..=90.0).contains(&v)) {
        return Err(AppError::field(&join("latitude"), "latitude must be between -90 and 90"));
    }
    if longitude.is_some_and(|v| !(-180.0..=180.0).contains(&v)) {
        return Err(AppError::field(&join("longitude"), "longitude must be between -180 and 180"));
    }
    Ok(())
}

/// A shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub id: ShipmentId,
    pub owner_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub shipper_wallet_id: WalletId,
    pub carrier_wallet_id: WalletId,
    pub moderator_wallet_id: Option<WalletId>,
    pub storage_credentials_id: StorageCredentialsId,
    pub vault_id: Uuid,
    pub device_id: Option<DeviceId>,
    pub exception: ExceptionType,
    pub lifecycle: ShipmentLifecycle,
    pub details: ShipmentDetails,
    pub ship_from_location: Option<Location>,
    pub ship_to_location: Option<Location>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentRecord {
    /// Whether `user` owns the shipment or belongs to the owning organization.
    pub fn is_owned_by(&self, user: &AuthenticatedUser) -> bool {
        if user.id == self.owner_id {
            return true;
        }
        matches!(
            (&self.organization_id, &user.organization_id),
            (Some(owner_org), Some(user_org)) if owner_org == user_org
        )
    }

    /// Shipper, carrier and moderator wallets.
    pub fn party_wallets(&self) -> Vec<&WalletId> {
        let mut wallets = vec![&self.shipper_wallet_id, &self.carrier_wallet_id];
        if let Some(moderator) = &self.moderator_wallet_id {
            wallets.push(moderator);
        }
        wallets
    }
}

// ─── Devices ─────────────────────────────────────────────────────────

/// A tracking device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub certificate_id: Option<CertificateId>,
    pub public_key: Option<DevicePublicKey>,
    pub shipment_id: Option<ShipmentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Permission Links ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionLinkRecord {
    pub id: PermissionLinkId,
    pub shipment_id: ShipmentId,
    pub name: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PermissionLinkRecord {
    pub fn window(&self) -> PermissionLinkWindow {
        PermissionLinkWindow {
            expiration_date: self.expiration_date,
        }
    }
}

// ─── Documents ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Bol,
    Certificate,
    CommercialInvoice,
    Image,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    Pdf,
    Jpeg,
    Png,
}

impl FileType {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// A shipment document. The file itself lives in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub shipment_id: ShipmentId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub document_type: DocumentType,
    pub file_type: FileType,
    pub upload_status: UploadStatus,
    /// Object key, fixed at creation.
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Imports ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportFileType {
    Csv,
    Xls,
    Xlsx,
}

impl ImportFileType {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xls => "application/vnd.ms-excel",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

/// A bulk shipment import file and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: ImportId,
    pub owner_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub name: String,
    pub description: Option<String>,
    pub file_type: ImportFileType,
    pub storage_credentials_id: StorageCredentialsId,
    pub shipper_wallet_id: WalletId,
    pub carrier_wallet_id: WalletId,
    pub upload_status: UploadStatus,
    pub processing_status: ProcessingStatus,
    pub report: Option<Value>,
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Notes and Tags ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NoteRecord {
    pub id: NoteId,
    pub shipment_id: ShipmentId,
    pub author_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TagRecord {
    pub id: TagId,
    pub shipment_id: ShipmentId,
    pub owner_id: UserId,
    pub tag_type: String,
    pub tag_value: String,
    pub created_at: DateTime<Utc>,
}

// ─── Device Data ─────────────────────────────────────────────────────

/// One tracking point. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: TrackingId,
    pub shipment_id: ShipmentId,
    pub device_id: DeviceId,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub uncertainty: Option<f64>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

/// One sensor reading. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: TelemetryId,
    pub shipment_id: ShipmentId,
    pub device_id: DeviceId,
    pub hardware_id: String,
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, org: Option<&str>) -> AuthenticatedUser {
        AuthenticatedUser {
            id: UserId::new(id).unwrap(),
            organization_id: org.map(|o| OrganizationId::new(o).unwrap()),
            username: None,
        }
    }

    fn shipment(org: Option<&str>) -> ShipmentRecord {
        let now = Utc::now();
        ShipmentRecord {
            id: ShipmentId::new(),
            owner_id: UserId::new("owner").unwrap(),
            organization_id: org.map(|o| OrganizationId::new(o).unwrap()),
            shipper_wallet_id: WalletId::new("shipper").unwrap(),
            carrier_wallet_id: WalletId::new("carrier").unwrap(),
            moderator_wallet_id: None,
            storage_credentials_id: StorageCredentialsId::new("sc").unwrap(),
            vault_id: Uuid::new_v4(),
            device_id: None,
            exception: ExceptionType::None,
            lifecycle: ShipmentLifecycle::new(false),
            details: ShipmentDetails::default(),
            ship_from_location: None,
            ship_to_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ownership_by_user_or_organization() {
        let s = shipment(Some("org-1"));
        assert!(s.is_owned_by(&user("owner", None)));
        assert!(s.is_owned_by(&user("colleague", Some("org-1"))));
        assert!(!s.is_owned_by(&user("stranger", Some("org-2"))));
        assert!(!shipment(None).is_owned_by(&user("stranger", None)));
    }

    #[test]
    fn party_wallets_include_moderator_when_set() {
        let mut s = shipment(None);
        assert_eq!(s.party_wallets().len(), 2);
        s.moderator_wallet_id = Some(WalletId::new("mod").unwrap());
        assert_eq!(s.party_wallets().len(), 3);
    }

    #[test]
    fn record_round_trips_through_json() {
        let s = shipment(Some("org-1"));
        let json = serde_json::to_value(&s).unwrap();
        let back: ShipmentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
        assert_eq!(s.shipment_key(), Some(*s.id.as_uuid()));
    }

    #[test]
    fn coordinates_are_bounded() {
        assert!(check_coordinates("", Some(90.0), Some(-180.0)).is_ok());
        assert!(check_coordinates("", Some(90.1), None).is_err());
        assert!(check_coordinates("ship_to_location", None, Some(181.0)).is_err());
    }

    #[test]
    fn location_requires_name() {
        let location = Location {
            name: " ".into(),
            address_1: None,
            address_2: None,
            city: None,
            state: None,
            postal_code: None,
            country: None,
            latitude: None,
            longitude: None,
        };
        let err = location.validate_as("ship_from_location").unwrap_err();
        assert_eq!(err.to_string(), "ship_from_location.name must not be empty");
    }

    #[test]
    fn details_reject_negative_weight() {
        let details = ShipmentDetails {
            weight_gross_kgs: Some(-1.0),
            ..ShipmentDetails::default()
        };
        assert!(details.validate().is_err());
    }
}

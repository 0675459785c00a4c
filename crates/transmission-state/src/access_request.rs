//! # Access Requests
//!
//! A requester asks the owner of a shipment for a [`PermissionLevel`] on each
//! of the six [`Endpoint`]s. `approved` is tri-state: `None` pending,
//! `Some(true)` approved, `Some(false)` denied or revoked.
//!
//! ## Rules
//!
//! - At least one endpoint must be above NONE.
//! - Tracking and telemetry cannot be requested above READ_ONLY.
//! - Tags cannot be requested without shipment read access.
//! - Once approved, permission levels are frozen for everyone.
//! - While pending or denied, only the requester edits permissions. Editing a
//!   denied request puts it back to pending.
//! - Only the shipment owner decides `approved`. An approval must resubmit all
//!   six levels and they must equal what is stored, so an owner never approves
//!   something the requester changed after the owner looked at it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use transmission_core::{AccessRequestId, Endpoint, PermissionLevel, ShipmentId, UserId};
use utoipa::ToSchema;

// ─── Errors ──────────────────────────────────────────────────────────

/// Access request validation and workflow errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessRequestError {
    #[error("Access requests must contain at least one requested permission")]
    NoPermissionRequested,

    #[error("Cannot request write access to this field")]
    WriteNotAllowed {
        /// Endpoint the write was requested on.
        endpoint: Endpoint,
    },

    #[error("Cannot request to view tags without shipment read access")]
    TagsWithoutShipment,

    #[error("Shipment owners cannot request access to their own shipment")]
    OwnerRequest,

    #[error("Cannot modify the permission level of an approved access request")]
    ApprovedImmutable,

    /// Caller is not allowed to perform this change.
    #[error("{0}")]
    NotPermitted(&'static str),

    #[error("Approving an access request requires every permission field; missing: {}", missing.join(", "))]
    IncompletePermissionSet {
        /// Absent attributes.
        missing: Vec<&'static str>,
    },

    #[error("Requested permissions changed since they were reviewed ({field})")]
    PermissionsChanged {
        /// First attribute found to differ.
        field: &'static str,
    },
}

impl AccessRequestError {
    /// Whether this is an authorization failure (403) rather than a 400.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::NotPermitted(_))
    }

    /// Attribute the error points at.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::WriteNotAllowed { endpoint } => Some(endpoint.permission_field()),
            Self::TagsWithoutShipment => Some(Endpoint::Tags.permission_field()),
            Self::PermissionsChanged { field } => Some(field),
            Self::IncompletePermissionSet { missing } => missing.first().copied(),
            _ => None,
        }
    }
}

// ─── Permission Sets ─────────────────────────────────────────────────

/// One permission level per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
pub struct PermissionSet {
    #[serde(rename = "shipment_permission", default)]
    pub shipment: PermissionLevel,
    #[serde(rename = "tags_permission", default)]
    pub tags: PermissionLevel,
    #[serde(rename = "documents_permission", default)]
    pub documents: PermissionLevel,
    #[serde(rename = "notes_permission", default)]
    pub notes: PermissionLevel,
    #[serde(rename = "tracking_permission", default)]
    pub tracking: PermissionLevel,
    #[serde(rename = "telemetry_permission", default)]
    pub telemetry: PermissionLevel,
}

impl PermissionSet {
    /// Every endpoint at `level`.
    pub fn uniform(level: PermissionLevel) -> Self {
        Self {
            shipment: level,
            tags: level,
            documents: level,
            notes: level,
            tracking: level,
            telemetry: level,
        }
    }

    pub fn get(&self, endpoint: Endpoint) -> PermissionLevel {
        match endpoint {
            Endpoint::Shipment => self.shipment,
            Endpoint::Tags => self.tags,
            Endpoint::Documents => self.documents,
            Endpoint::Notes => self.notes,
            Endpoint::Tracking => self.tracking,
            Endpoint::Telemetry => self.telemetry,
        }
    }

    pub fn set(&mut self, endpoint: Endpoint, level: PermissionLevel) {
        let slot = match endpoint {
            Endpoint::Shipment => &mut self.shipment,
            Endpoint::Tags => &mut self.tags,
            Endpoint::Documents => &mut self.documents,
            Endpoint::Notes => &mut self.notes,
            Endpoint::Tracking => &mut self.tracking,
            Endpoint::Telemetry => &mut self.telemetry,
        };
        *slot = level;
    }

    /// Per-endpoint maximum of `self` and `other`.
    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        let mut out = *self;
        for endpoint in Endpoint::ALL {
            out.set(endpoint, self.get(endpoint).max(other.get(endpoint)));
        }
        out
    }

    /// Validate as a requested set.
    pub fn validate_request(&self) -> Result<(), AccessRequestError> {
        if Endpoint::ALL
            .iter()
            .all(|e| self.get(*e) == PermissionLevel::None)
        {
            return Err(AccessRequestError::NoPermissionRequested);
        }
        for endpoint in Endpoint::ALL {
            if !endpoint.accepts_write_requests() && self.get(endpoint) == PermissionLevel::ReadWrite
            {
                return Err(AccessRequestError::WriteNotAllowed { endpoint });
            }
        }
        if self.tags > PermissionLevel::None && self.shipment == PermissionLevel::None {
            return Err(AccessRequestError::TagsWithoutShipment);
        }
        Ok(())
    }
}

/// Permission fields present in a PATCH body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
pub struct PartialPermissionSet {
    #[serde(rename = "shipment_permission", default)]
    pub shipment: Option<PermissionLevel>,
    #[serde(rename = "tags_permission", default)]
    pub tags: Option<PermissionLevel>,
    #[serde(rename = "documents_permission", default)]
    pub documents: Option<PermissionLevel>,
    #[serde(rename = "notes_permission", default)]
    pub notes: Option<PermissionLevel>,
    #[serde(rename = "tracking_permission", default)]
    pub tracking: Option<PermissionLevel>,
    #[serde(rename = "telemetry_permission", default)]
    pub telemetry: Option<PermissionLevel>,
}

impl PartialPermissionSet {
    pub fn get(&self, endpoint: Endpoint) -> Option<PermissionLevel> {
        match endpoint {
            Endpoint::Shipment => self.shipment,
            Endpoint::Tags => self.tags,
            Endpoint::Documents => self.documents,
            Endpoint::Notes => self.notes,
            Endpoint::Tracking => self.tracking,
            Endpoint::Telemetry => self.telemetry,
        }
    }

    pub fn is_empty(&self) -> bool {
        Endpoint::ALL.iter().all(|e| self.get(*e).is_none())
    }

    /// Attributes not present.
    pub fn missing(&self) -> Vec<&'static str> {
        Endpoint::ALL
            .iter()
            .filter(|e| self.get(**e).is_none())
            .map(|e| e.permission_field())
            .collect()
    }

    /// `base` with the present fields overlaid.
    pub fn apply_to(&self, base: &PermissionSet) -> PermissionSet {
        let mut out = *base;
        for endpoint in Endpoint::ALL {
            if let Some(level) = self.get(endpoint) {
                out.set(endpoint, level);
            }
        }
        out
    }
}

impl From<PermissionSet> for PartialPermissionSet {
    fn from(set: PermissionSet) -> Self {
        Self {
            shipment: Some(set.shipment),
            tags: Some(set.tags),
            documents: Some(set.documents),
            notes: Some(set.notes),
            tracking: Some(set.tracking),
            telemetry: Some(set.telemetry),
        }
    }
}

// ─── Access Request ──────────────────────────────────────────────────

/// Who is attempting an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateActor {
    /// The user who filed the request.
    Requester,
    /// The shipment's owner, an organization member, or a party.
    ShipmentOwner,
    /// Anyone else.
    Other,
}

/// Body of an access request update.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AccessRequestUpdate {
    #[serde(flatten)]
    pub permissions: PartialPermissionSet,
    #[serde(default)]
    pub approved: Option<bool>,
}

/// A request for scoped access to one shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessRequest {
    pub id: AccessRequestId,
    pub shipment_id: ShipmentId,
    pub requester_id: UserId,
    #[serde(flatten)]
    pub permissions: PermissionSet,
    pub approved: Option<bool>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessRequest {
    /// File a new pending request. `requester_is_owner` rejects owners asking
    /// for access to their own shipment.
    pub fn create(
        shipment_id: ShipmentId,
        requester_id: UserId,
        permissions: PermissionSet,
        requester_is_owner: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, AccessRequestError> {
        if requester_is_owner {
            return Err(AccessRequestError::OwnerRequest);
        }
        permissions.validate_request()?;
        Ok(Self {
            id: AccessRequestId::new(),
            shipment_id,
            requester_id,
            permissions,
            approved: None,
            approved_at: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.approved.is_none()
    }

    pub fn is_approved(&self) -> bool {
        self.approved == Some(true)
    }

    /// Granted permissions, only while approved.
    pub fn grant(&self) -> Option<PermissionSet> {
        self.is_approved().then_some(self.permissions)
    }

    /// Apply an update. Validates completely before mutating.
    pub fn apply_update(
        &mut self,
        update: &AccessRequestUpdate,
        actor: UpdateActor,
        actor_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), AccessRequestError> {
        if actor == UpdateActor::Other {
            return Err(AccessRequestError::NotPermitted(
                "You do not have permission to modify this access request",
            ));
        }

        match update.approved {
            Some(decision) => {
                self.check_decision(update, decision, actor)?;
                if self.approved != Some(decision) {
                    self.approved = Some(decision);
                    self.approved_at = Some(now);
                    self.approved_by = Some(actor_id.clone());
                }
            }
            None if update.permissions.is_empty() => return Ok(()),
            None => {
                self.permissions = self.check_permission_edit(update, actor)?;
                if self.approved == Some(false) {
                    self.approved = None;
                    self.approved_at = None;
                    self.approved_by = None;
                }
            }
        }
        self.updated_at = now;
        Ok(())
    }

    fn check_decision(
        &self,
        update: &AccessRequestUpdate,
        decision: bool,
        actor: UpdateActor,
    ) -> Result<(), AccessRequestError> {
        if actor != UpdateActor::ShipmentOwner {
            return Err(AccessRequestError::NotPermitted(
                "Only the shipment owner can approve or deny access requests",
            ));
        }
        if decision {
            let missing = update.permissions.missing();
            if !missing.is_empty() {
                return Err(AccessRequestError::IncompletePermissionSet { missing });
            }
        }
        for endpoint in Endpoint::ALL {
            if let Some(level) = update.permissions.get(endpoint) {
                if level != self.permissions.get(endpoint) {
                    return Err(if self.is_approved() {
                        AccessRequestError::ApprovedImmutable
                    } else {
                        AccessRequestError::PermissionsChanged {
                            field: endpoint.permission_field(),
                        }
                    });
                }
            }
        }
        Ok(())
    }

    fn check_permission_edit(
        &self,
        update: &AccessRequestUpdate,
        actor: UpdateActor,
    ) -> Result<PermissionSet, AccessRequestError> {
        if self.is_approved() {
            return Err(AccessRequestError::ApprovedImmutable);
        }
        if actor != UpdateActor::Requester {
            return Err(AccessRequestError::NotPermitted(
                "Only the requester can modify the permissions of an access request",
            ));
        }
        let merged = update.permissions.apply_to(&self.permissions);
        merged.validate_request()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PermissionLevel::{None as N, ReadOnly as RO, ReadWrite as RW};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn requester() -> UserId {
        UserId::new("requester-1").unwrap()
    }

    fn owner() -> UserId {
        UserId::new("owner-1").unwrap()
    }

    fn shipment_ro() -> PermissionSet {
        PermissionSet {
            shipment: RO,
            ..PermissionSet::default()
        }
    }

    fn pending() -> AccessRequest {
        AccessRequest::create(ShipmentId::new(), requester(), shipment_ro(), false, now()).unwrap()
    }

    fn approve_body(set: PermissionSet) -> AccessRequestUpdate {
        AccessRequestUpdate {
            permissions: set.into(),
            approved: Some(true),
        }
    }

    fn edit(f: impl FnOnce(&mut PartialPermissionSet)) -> AccessRequestUpdate {
        let mut permissions = PartialPermissionSet::default();
        f(&mut permissions);
        AccessRequestUpdate {
            permissions,
            approved: None,
        }
    }

    #[test]
    fn all_none_is_rejected() {
        let err = PermissionSet::default().validate_request().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Access requests must contain at least one requested permission"
        );
    }

    #[test]
    fn write_on_device_data_is_rejected() {
        for endpoint in [Endpoint::Tracking, Endpoint::Telemetry] {
            let mut set = shipment_ro();
            set.set(endpoint, RW);
            let err = set.validate_request().unwrap_err();
            assert_eq!(err.to_string(), "Cannot request write access to this field");
            assert_eq!(err.field(), Some(endpoint.permission_field()));
        }
    }

    #[test]
    fn tags_need_shipment_read() {
        let set = PermissionSet {
            tags: RO,
            ..PermissionSet::default()
        };
        assert_eq!(
            set.validate_request().unwrap_err().to_string(),
            "Cannot request to view tags without shipment read access"
        );
        let ok = PermissionSet {
            tags: RW,
            shipment: RO,
            ..PermissionSet::default()
        };
        assert!(ok.validate_request().is_ok());
    }

    #[test]
    fn owner_cannot_request_own_shipment() {
        let err =
            AccessRequest::create(ShipmentId::new(), owner(), shipment_ro(), true, now()).unwrap_err();
        assert_eq!(err, AccessRequestError::OwnerRequest);
    }

    #[test]
    fn new_request_is_pending_and_grants_nothing() {
        let ar = pending();
        assert!(ar.is_pending());
        assert_eq!(ar.grant(), Option::None);
    }

    #[test]
    fn owner_approves_with_full_matching_set() {
        let mut ar = pending();
        ar.apply_update(&approve_body(shipment_ro()), UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap();
        assert!(ar.is_approved());
        assert_eq!(ar.approved_by, Some(owner()));
        assert_eq!(ar.grant(), Some(shipment_ro()));
    }

    #[test]
    fn approval_requires_every_field() {
        let mut ar = pending();
        let body = AccessRequestUpdate {
            permissions: PartialPermissionSet {
                shipment: Some(RO),
                ..PartialPermissionSet::default()
            },
            approved: Some(true),
        };
        let err = ar
            .apply_update(&body, UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap_err();
        assert!(matches!(err, AccessRequestError::IncompletePermissionSet { ref missing } if missing.len() == 5));
        assert!(ar.is_pending());
    }

    #[test]
    fn approval_rejects_stale_levels() {
        let mut ar = pending();
        let mut reviewed = shipment_ro();
        reviewed.notes = RO;
        let err = ar
            .apply_update(&approve_body(reviewed), UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap_err();
        assert_eq!(
            err,
            AccessRequestError::PermissionsChanged {
                field: "notes_permission"
            }
        );
        assert!(ar.is_pending());
    }

    #[test]
    fn requester_cannot_approve() {
        let mut ar = pending();
        let err = ar
            .apply_update(&approve_body(shipment_ro()), UpdateActor::Requester, &requester(), now())
            .unwrap_err();
        assert!(err.is_forbidden());
    }

    #[test]
    fn approved_permissions_are_frozen_for_everyone() {
        let mut ar = pending();
        ar.apply_update(&approve_body(shipment_ro()), UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap();
        let before = ar.clone();
        for actor in [UpdateActor::Requester, UpdateActor::ShipmentOwner] {
            let err = ar
                .apply_update(&edit(|p| p.notes = Some(RO)), actor, &requester(), now())
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "Cannot modify the permission level of an approved access request"
            );
        }
        assert_eq!(ar, before);
    }

    #[test]
    fn requester_edits_pending_request() {
        let mut ar = pending();
        ar.apply_update(&edit(|p| p.documents = Some(RW)), UpdateActor::Requester, &requester(), now())
            .unwrap();
        assert_eq!(ar.permissions.documents, RW);
        assert_eq!(ar.permissions.shipment, RO);
    }

    #[test]
    fn owner_cannot_edit_pending_permissions() {
        let mut ar = pending();
        let err = ar
            .apply_update(&edit(|p| p.notes = Some(RO)), UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap_err();
        assert!(err.is_forbidden());
        let err = ar
            .apply_update(&edit(|p| p.notes = Some(RO)), UpdateActor::Other, &owner(), now())
            .unwrap_err();
        assert!(err.is_forbidden());
    }

    #[test]
    fn edit_is_revalidated() {
        let mut ar = pending();
        let err = ar
            .apply_update(&edit(|p| p.shipment = Some(N)), UpdateActor::Requester, &requester(), now())
            .unwrap_err();
        assert_eq!(err, AccessRequestError::NoPermissionRequested);
        assert_eq!(ar.permissions, shipment_ro());
    }

    #[test]
    fn denied_request_returns_to_pending_when_edited() {
        let mut ar = pending();
        let deny = AccessRequestUpdate {
            permissions: PartialPermissionSet::default(),
            approved: Some(false),
        };
        ar.apply_update(&deny, UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap();
        assert_eq!(ar.approved, Some(false));

        ar.apply_update(&edit(|p| p.notes = Some(RO)), UpdateActor::Requester, &requester(), now())
            .unwrap();
        assert!(ar.is_pending());
        assert!(ar.approved_by.is_none());
    }

    #[test]
    fn revocation_removes_grant() {
        let mut ar = pending();
        ar.apply_update(&approve_body(shipment_ro()), UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap();
        let revoke = AccessRequestUpdate {
            permissions: PartialPermissionSet::default(),
            approved: Some(false),
        };
        ar.apply_update(&revoke, UpdateActor::ShipmentOwner, &owner(), now())
            .unwrap();
        assert_eq!(ar.grant(), Option::None);
    }

    #[test]
    fn union_takes_per_endpoint_max() {
        let a = PermissionSet {
            shipment: RO,
            documents: RW,
            ..PermissionSet::default()
        };
        let b = PermissionSet {
            shipment: RW,
            tracking: RO,
            ..PermissionSet::default()
        };
        let u = a.union(&b);
        assert_eq!(u.shipment, RW);
        assert_eq!(u.documents, RW);
        assert_eq!(u.tracking, RO);
        assert_eq!(u.notes, N);
    }

    #[test]
    fn serialized_field_names() {
        let json = serde_json::to_value(shipment_ro()).unwrap();
        assert_eq!(json["shipment_permission"], "READ_ONLY");
        assert_eq!(json["telemetry_permission"], "NONE");

        let update: AccessRequestUpdate =
            serde_json::from_str(r#"{"approved": true, "tags_permission": "READ_ONLY"}"#).unwrap();
        assert_eq!(update.approved, Some(true));
        assert_eq!(update.permissions.tags, Some(RO));
        assert_eq!(update.permissions.shipment, Option::None);
    }
}

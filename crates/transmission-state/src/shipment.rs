//! # Shipment Lifecycle State Machine
//!
//! ## States
//!
//! ```text
//! AWAITING_PICKUP ──PICK_UP──▶ IN_TRANSIT ──ARRIVAL──▶ AWAITING_DELIVERY ──DROP_OFF──▶ DELIVERED
//! ```
//!
//! Strictly linear: no cycles, no skips. The state has no setter; it only
//! changes through [`ShipmentLifecycle::apply`].
//!
//! ## Asset Tags
//!
//! A pickup carrying `asset_physical_id` stores its SHA-256 and never the raw
//! value. When GTX validation is required the tag is mandatory. Once a hash is
//! stored, drop-off must present the same raw value. Both failures are
//! permission failures: they indicate the wrong asset, not bad input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use transmission_crypto::AssetTagHash;
use utoipa::ToSchema;

// ─── States and Actions ──────────────────────────────────────────────

/// Lifecycle state of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentState {
    /// Created, waiting for the carrier.
    #[default]
    AwaitingPickup,
    /// Picked up and moving.
    InTransit,
    /// Arrived at the destination port.
    AwaitingDelivery,
    /// Delivered (terminal).
    Delivered,
}

impl ShipmentState {
    /// Whether no further action is available.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Whether the shipment is between pickup and delivery. Devices cannot
    /// be swapped and device data is accepted only in these states.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InTransit | Self::AwaitingDelivery)
    }

    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingPickup => "AWAITING_PICKUP",
            Self::InTransit => "IN_TRANSIT",
            Self::AwaitingDelivery => "AWAITING_DELIVERY",
            Self::Delivered => "DELIVERED",
        }
    }

    /// Parse the wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AWAITING_PICKUP" => Some(Self::AwaitingPickup),
            "IN_TRANSIT" => Some(Self::InTransit),
            "AWAITING_DELIVERY" => Some(Self::AwaitingDelivery),
            "DELIVERED" => Some(Self::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShipmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named operation that advances the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentAction {
    /// Carrier takes the asset.
    PickUp,
    /// Asset reaches the destination port.
    Arrival,
    /// Asset handed to the consignee.
    DropOff,
}

impl ShipmentAction {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PickUp => "PICK_UP",
            Self::Arrival => "ARRIVAL",
            Self::DropOff => "DROP_OFF",
        }
    }
}

impl std::fmt::Display for ShipmentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of GTX validation, set independently of the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GtxValidation {
    /// GTX validation was never started.
    #[default]
    NotRequested,
    /// Validation requested at pickup, result outstanding.
    Pending,
    /// Asset validated.
    Valid,
    /// Asset failed validation.
    Invalid,
}

/// Exception flag carried alongside the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionType {
    /// No exception.
    #[default]
    None,
    /// Held by customs.
    CustomsHold,
    /// Paperwork problem.
    DocumentationError,
}

// ─── Transition Table ────────────────────────────────────────────────

/// Side effect of a successful transition. Effects named here are carried
/// out by the caller after the lifecycle has been mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEffect {
    /// `pickup_act` stamped.
    RecordPickup,
    /// Raw asset tag hashed and stored.
    HashAssetTag,
    /// External GTX validation requested; `gtx_validation` becomes PENDING.
    RequestGtxValidation,
    /// `port_arrival_act` stamped.
    RecordPortArrival,
    /// Raw asset tag compared against the stored hash.
    VerifyAssetTag,
    /// `delivery_act` stamped.
    RecordDelivery,
    /// The assigned device's shadow is updated with the new state.
    UpdateDeviceShadow,
}

struct TransitionRule {
    from: ShipmentState,
    action: ShipmentAction,
    to: ShipmentState,
    effects: &'static [TransitionEffect],
}

const TRANSITION_TABLE: [TransitionRule; 3] = [
    TransitionRule {
        from: ShipmentState::AwaitingPickup,
        action: ShipmentAction::PickUp,
        to: ShipmentState::InTransit,
        effects: &[
            TransitionEffect::HashAssetTag,
            TransitionEffect::RequestGtxValidation,
            TransitionEffect::RecordPickup,
            TransitionEffect::UpdateDeviceShadow,
        ],
    },
    TransitionRule {
        from: ShipmentState::InTransit,
        action: ShipmentAction::Arrival,
        to: ShipmentState::AwaitingDelivery,
        effects: &[
            TransitionEffect::RecordPortArrival,
            TransitionEffect::UpdateDeviceShadow,
        ],
    },
    TransitionRule {
        from: ShipmentState::AwaitingDelivery,
        action: ShipmentAction::DropOff,
        to: ShipmentState::Delivered,
        effects: &[
            TransitionEffect::VerifyAssetTag,
            TransitionEffect::RecordDelivery,
            TransitionEffect::UpdateDeviceShadow,
        ],
    },
];

/// Target state of `action` from `state`, if the table allows it.
pub fn next_state(state: ShipmentState, action: ShipmentAction) -> Option<ShipmentState> {
    rule_for(state, action).map(|rule| rule.to)
}

/// Actions the table allows from `state`.
pub fn available_actions(state: ShipmentState) -> Vec<ShipmentAction> {
    TRANSITION_TABLE
        .iter()
        .filter(|rule| rule.from == state)
        .map(|rule| rule.action)
        .collect()
}

fn rule_for(state: ShipmentState, action: ShipmentAction) -> Option<&'static TransitionRule> {
    TRANSITION_TABLE
        .iter()
        .find(|rule| rule.from == state && rule.action == action)
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by shipment lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShipmentError {
    /// The action has no transition from the current state.
    #[error("Action {action} not available while Shipment is in state {state}")]
    ActionNotAvailable {
        /// Attempted action.
        action: ShipmentAction,
        /// Current state.
        state: ShipmentState,
    },

    /// GTX-required pickup without an asset tag.
    #[error("In order to proceed with this shipment pick up, you need to provide a value for the field [Shipment.asset_physical_id]")]
    AssetTagRequired,

    /// Drop-off asset tag missing or not matching the stored hash.
    #[error("Hash of asset tag does not match value for Shipment")]
    AssetTagMismatch,

    /// Direct write of the asset tag, which only PICK_UP may set.
    #[error("asset_physical_id is write-once and can only be set by the PICK_UP action")]
    AssetTagImmutable,

    /// `gtx_required` is frozen once the shipment has been picked up.
    #[error("gtx_required cannot be changed after pickup")]
    GtxLocked,
}

impl ShipmentError {
    /// Whether this error signals an integrity violation rather than bad input.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::AssetTagRequired | Self::AssetTagMismatch)
    }

    /// Attribute the error points at, when it concerns a single field.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::ActionNotAvailable { .. } => Some("action_type"),
            Self::AssetTagRequired | Self::AssetTagImmutable => Some("asset_physical_id"),
            Self::AssetTagMismatch => Some("raw_asset_physical_id"),
            Self::GtxLocked => Some("gtx_required"),
        }
    }
}

// ─── Transition Records ──────────────────────────────────────────────

/// Caller-supplied data for an action.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ActionInput {
    /// Raw asset tag presented at pickup.
    #[serde(default)]
    pub asset_physical_id: Option<String>,
    /// Raw asset tag presented at drop-off.
    #[serde(default)]
    pub raw_asset_physical_id: Option<String>,
}

/// Record of an applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Action applied.
    pub action: ShipmentAction,
    /// State before.
    pub from_state: ShipmentState,
    /// State after.
    pub to_state: ShipmentState,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Result of [`ShipmentLifecycle::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The logged record.
    pub record: TransitionRecord,
    /// Effects that applied, in table order.
    pub effects: Vec<TransitionEffect>,
}

impl Transition {
    /// Whether `effect` applied.
    pub fn has_effect(&self, effect: TransitionEffect) -> bool {
        self.effects.contains(&effect)
    }
}

// ─── Lifecycle ───────────────────────────────────────────────────────

/// Protected lifecycle portion of a shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentLifecycle {
    state: ShipmentState,
    gtx_required: bool,
    asset_physical_id: Option<AssetTagHash>,
    gtx_validation: GtxValidation,
    pickup_act: Option<DateTime<Utc>>,
    port_arrival_act: Option<DateTime<Utc>>,
    delivery_act: Option<DateTime<Utc>>,
    transitions: Vec<TransitionRecord>,
}

impl ShipmentLifecycle {
    /// A fresh lifecycle in AWAITING_PICKUP.
    pub fn new(gtx_required: bool) -> Self {
        Self {
            gtx_required,
            ..Self::default()
        }
    }

    pub fn state(&self) -> ShipmentState {
        self.state
    }

    pub fn gtx_required(&self) -> bool {
        self.gtx_required
    }

    pub fn asset_physical_id(&self) -> Option<&AssetTagHash> {
        self.asset_physical_id.as_ref()
    }

    pub fn gtx_validation(&self) -> GtxValidation {
        self.gtx_validation
    }

    pub fn pickup_act(&self) -> Option<DateTime<Utc>> {
        self.pickup_act
    }

    pub fn port_arrival_act(&self) -> Option<DateTime<Utc>> {
        self.port_arrival_act
    }

    pub fn delivery_act(&self) -> Option<DateTime<Utc>> {
        self.delivery_act
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Change the GTX requirement. Only allowed before pickup.
    pub fn set_gtx_required(&mut self, required: bool) -> Result<(), ShipmentError> {
        if required == self.gtx_required {
            return Ok(());
        }
        if self.state != ShipmentState::AwaitingPickup {
            return Err(ShipmentError::GtxLocked);
        }
        self.gtx_required = required;
        Ok(())
    }

    /// Record the external GTX validation result. Does not touch the state.
    pub fn record_gtx_result(&mut self, valid: bool) {
        self.gtx_validation = if valid {
            GtxValidation::Valid
        } else {
            GtxValidation::Invalid
        };
    }

    /// Apply `action`. Validates everything before mutating; on error the
    /// lifecycle is unchanged.
    pub fn apply(
        &mut self,
        action: ShipmentAction,
        input: &ActionInput,
        now: DateTime<Utc>,
    ) -> Result<Transition, ShipmentError> {
        let rule = rule_for(self.state, action).ok_or(ShipmentError::ActionNotAvailable {
            action,
            state: self.state,
        })?;

        let new_tag = match action {
            ShipmentAction::PickUp => self.check_pickup_tag(input)?,
            ShipmentAction::DropOff => {
                self.check_dropoff_tag(input)?;
                None
            }
            ShipmentAction::Arrival => None,
        };

        let effects: Vec<TransitionEffect> = rule
            .effects
            .iter()
            .copied()
            .filter(|effect| match effect {
                TransitionEffect::HashAssetTag => new_tag.is_some(),
                TransitionEffect::RequestGtxValidation => self.gtx_required,
                TransitionEffect::VerifyAssetTag => self.asset_physical_id.is_some(),
                _ => true,
            })
            .collect();

        for effect in &effects {
            match effect {
                TransitionEffect::RecordPickup => self.pickup_act = Some(now),
                TransitionEffect::RecordPortArrival => self.port_arrival_act = Some(now),
                TransitionEffect::RecordDelivery => self.delivery_act = Some(now),
                TransitionEffect::RequestGtxValidation => {
                    self.gtx_validation = GtxValidation::Pending
                }
                TransitionEffect::HashAssetTag
                | TransitionEffect::VerifyAssetTag
                | TransitionEffect::UpdateDeviceShadow => {}
            }
        }
        if let Some(tag) = new_tag {
            self.asset_physical_id = Some(tag);
        }

        let record = TransitionRecord {
            action,
            from_state: rule.from,
            to_state: rule.to,
            timestamp: now,
        };
        self.state = rule.to;
        self.transitions.push(record.clone());

        Ok(Transition { record, effects })
    }

    fn check_pickup_tag(&self, input: &ActionInput) -> Result<Option<AssetTagHash>, ShipmentError> {
        let raw = input
            .asset_physical_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match raw {
            None if self.gtx_required => Err(ShipmentError::AssetTagRequired),
            None => Ok(None),
            Some(_) if self.asset_physical_id.is_some() => Err(ShipmentError::AssetTagImmutable),
            Some(raw) => Ok(Some(AssetTagHash::from_raw(raw))),
        }
    }

    fn check_dropoff_tag(&self, input: &ActionInput) -> Result<(), ShipmentError> {
        verify_asset_tag(
            self.asset_physical_id.as_ref(),
            input.raw_asset_physical_id.as_deref(),
        )
    }

    /// Rebuild a lifecycle from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        state: ShipmentState,
        gtx_required: bool,
        asset_physical_id: Option<AssetTagHash>,
        gtx_validation: GtxValidation,
        pickup_act: Option<DateTime<Utc>>,
        port_arrival_act: Option<DateTime<Utc>>,
        delivery_act: Option<DateTime<Utc>>,
        transitions: Vec<TransitionRecord>,
    ) -> Self {
        Self {
            state,
            gtx_required,
            asset_physical_id,
            gtx_validation,
            pickup_act,
            port_arrival_act,
            delivery_act,
            transitions,
        }
    }
}

/// Drop-off asset tag check. Passes when nothing was stored at pickup.
pub fn verify_asset_tag(stored: Option<&AssetTagHash>, raw: Option<&str>) -> Result<(), ShipmentError> {
    match (stored, raw.map(str::trim)) {
        (None, _) => Ok(()),
        (Some(hash), Some(raw)) if !raw.is_empty() && hash.matches(raw) => Ok(()),
        (Some(_), _) => Err(ShipmentError::AssetTagMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn no_input() -> ActionInput {
        ActionInput::default()
    }

    fn tag(raw: &str) -> ActionInput {
        ActionInput {
            asset_physical_id: Some(raw.to_string()),
            raw_asset_physical_id: None,
        }
    }

    fn raw(raw: &str) -> ActionInput {
        ActionInput {
            asset_physical_id: None,
            raw_asset_physical_id: Some(raw.to_string()),
        }
    }

    #[test]
    fn happy_path_without_gtx() {
        let mut lc = ShipmentLifecycle::new(false);
        let pickup = lc.apply(ShipmentAction::PickUp, &no_input(), t0()).unwrap();
        assert_eq!(lc.state(), ShipmentState::InTransit);
        assert_eq!(lc.pickup_act(), Some(t0()));
        assert!(pickup.has_effect(TransitionEffect::UpdateDeviceShadow));
        assert!(!pickup.has_effect(TransitionEffect::RequestGtxValidation));
        assert_eq!(lc.gtx_validation(), GtxValidation::NotRequested);

        let t1 = t0() + Duration::hours(5);
        lc.apply(ShipmentAction::Arrival, &no_input(), t1).unwrap();
        assert_eq!(lc.state(), ShipmentState::AwaitingDelivery);
        assert_eq!(lc.port_arrival_act(), Some(t1));

        let t2 = t1 + Duration::hours(1);
        let drop = lc.apply(ShipmentAction::DropOff, &no_input(), t2).unwrap();
        assert_eq!(lc.state(), ShipmentState::Delivered);
        assert_eq!(lc.delivery_act(), Some(t2));
        assert!(!drop.has_effect(TransitionEffect::VerifyAssetTag));
        assert!(lc.state().is_terminal());
        assert_eq!(lc.transitions().len(), 3);
    }

    #[test]
    fn second_pickup_is_rejected_with_state_in_message() {
        let mut lc = ShipmentLifecycle::new(false);
        lc.apply(ShipmentAction::PickUp, &no_input(), t0()).unwrap();
        let err = lc
            .apply(ShipmentAction::PickUp, &no_input(), t0())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Action PICK_UP not available while Shipment is in state IN_TRANSIT"
        );
        assert_eq!(lc.state(), ShipmentState::InTransit);
        assert_eq!(lc.transitions().len(), 1);
    }

    #[test]
    fn skipping_is_rejected() {
        let mut lc = ShipmentLifecycle::new(false);
        let before = lc.clone();
        let err = lc
            .apply(ShipmentAction::DropOff, &no_input(), t0())
            .unwrap_err();
        assert!(matches!(err, ShipmentError::ActionNotAvailable { .. }));
        assert_eq!(lc, before);
        assert!(lc.apply(ShipmentAction::Arrival, &no_input(), t0()).is_err());
    }

    #[test]
    fn delivered_accepts_nothing() {
        let mut lc = ShipmentLifecycle::new(false);
        lc.apply(ShipmentAction::PickUp, &no_input(), t0()).unwrap();
        lc.apply(ShipmentAction::Arrival, &no_input(), t0()).unwrap();
        lc.apply(ShipmentAction::DropOff, &no_input(), t0()).unwrap();
        for action in [
            ShipmentAction::PickUp,
            ShipmentAction::Arrival,
            ShipmentAction::DropOff,
        ] {
            let err = lc.apply(action, &no_input(), t0()).unwrap_err();
            assert!(err.to_string().ends_with("DELIVERED"));
        }
        assert!(available_actions(ShipmentState::Delivered).is_empty());
    }

    #[test]
    fn gtx_pickup_requires_tag() {
        let mut lc = ShipmentLifecycle::new(true);
        let err = lc
            .apply(ShipmentAction::PickUp, &no_input(), t0())
            .unwrap_err();
        assert_eq!(err, ShipmentError::AssetTagRequired);
        assert!(err.is_permission_denied());
        assert_eq!(lc.state(), ShipmentState::AwaitingPickup);
        assert!(lc.pickup_act().is_none());

        let err = lc.apply(ShipmentAction::PickUp, &tag("   "), t0()).unwrap_err();
        assert_eq!(err, ShipmentError::AssetTagRequired);
    }

    #[test]
    fn gtx_pickup_hashes_tag_and_marks_pending() {
        let mut lc = ShipmentLifecycle::new(true);
        let transition = lc.apply(ShipmentAction::PickUp, &tag("ASSET-1"), t0()).unwrap();
        assert!(transition.has_effect(TransitionEffect::HashAssetTag));
        assert!(transition.has_effect(TransitionEffect::RequestGtxValidation));
        assert_eq!(lc.gtx_validation(), GtxValidation::Pending);
        let stored = lc.asset_physical_id().unwrap();
        assert!(stored.matches("ASSET-1"));
        assert_ne!(stored.to_hex(), "ASSET-1");

        lc.record_gtx_result(true);
        assert_eq!(lc.gtx_validation(), GtxValidation::Valid);
        assert_eq!(lc.state(), ShipmentState::InTransit);
    }

    #[test]
    fn dropoff_requires_matching_raw_tag() {
        let mut lc = ShipmentLifecycle::new(true);
        lc.apply(ShipmentAction::PickUp, &tag("ASSET-1"), t0()).unwrap();
        lc.apply(ShipmentAction::Arrival, &no_input(), t0()).unwrap();

        let err = lc
            .apply(ShipmentAction::DropOff, &no_input(), t0())
            .unwrap_err();
        assert_eq!(err, ShipmentError::AssetTagMismatch);
        assert!(err.is_permission_denied());

        let err = lc
            .apply(ShipmentAction::DropOff, &raw("ASSET-2"), t0())
            .unwrap_err();
        assert_eq!(err, ShipmentError::AssetTagMismatch);
        assert_eq!(lc.state(), ShipmentState::AwaitingDelivery);
        assert!(lc.delivery_act().is_none());

        let transition = lc
            .apply(ShipmentAction::DropOff, &raw("ASSET-1"), t0())
            .unwrap();
        assert!(transition.has_effect(TransitionEffect::VerifyAssetTag));
        assert_eq!(lc.state(), ShipmentState::Delivered);
        assert_eq!(lc.delivery_act(), Some(t0()));
    }

    #[test]
    fn non_gtx_pickup_with_tag_still_binds_dropoff() {
        let mut lc = ShipmentLifecycle::new(false);
        let transition = lc.apply(ShipmentAction::PickUp, &tag("X"), t0()).unwrap();
        assert!(transition.has_effect(TransitionEffect::HashAssetTag));
        assert!(!transition.has_effect(TransitionEffect::RequestGtxValidation));
        lc.apply(ShipmentAction::Arrival, &no_input(), t0()).unwrap();
        assert!(lc.apply(ShipmentAction::DropOff, &no_input(), t0()).is_err());
        assert!(lc.apply(ShipmentAction::DropOff, &raw("X"), t0()).is_ok());
    }

    #[test]
    fn gtx_flag_freezes_after_pickup() {
        let mut lc = ShipmentLifecycle::new(false);
        lc.set_gtx_required(true).unwrap();
        lc.set_gtx_required(false).unwrap();
        lc.apply(ShipmentAction::PickUp, &no_input(), t0()).unwrap();
        assert_eq!(lc.set_gtx_required(true), Err(ShipmentError::GtxLocked));
        assert!(lc.set_gtx_required(false).is_ok());
    }

    #[test]
    fn table_is_linear() {
        assert_eq!(
            next_state(ShipmentState::AwaitingPickup, ShipmentAction::PickUp),
            Some(ShipmentState::InTransit)
        );
        assert_eq!(
            available_actions(ShipmentState::InTransit),
            vec![ShipmentAction::Arrival]
        );
        assert_eq!(
            next_state(ShipmentState::InTransit, ShipmentAction::DropOff),
            None
        );
    }

    #[test]
    fn wire_forms() {
        assert_eq!(
            serde_json::to_string(&ShipmentAction::DropOff).unwrap(),
            "\"DROP_OFF\""
        );
        assert_eq!(
            serde_json::to_string(&ShipmentState::AwaitingDelivery).unwrap(),
            "\"AWAITING_DELIVERY\""
        );
        assert_eq!(ShipmentState::parse("IN_TRANSIT"), Some(ShipmentState::InTransit));
        assert_eq!(ShipmentState::parse("LOST"), None);
    }

    #[test]
    fn verify_asset_tag_is_pure() {
        let hash = AssetTagHash::from_raw("abc");
        assert!(verify_asset_tag(None, None).is_ok());
        assert!(verify_asset_tag(Some(&hash), Some("abc")).is_ok());
        assert!(verify_asset_tag(Some(&hash), Some("")).is_err());
        assert!(verify_asset_tag(Some(&hash), None).is_err());
    }

    fn arb_action() -> impl proptest::strategy::Strategy<Value = ShipmentAction> {
        proptest::prop_oneof![
            proptest::strategy::Just(ShipmentAction::PickUp),
            proptest::strategy::Just(ShipmentAction::Arrival),
            proptest::strategy::Just(ShipmentAction::DropOff),
        ]
    }

    proptest::proptest! {
        #[test]
        fn state_only_advances_in_order(actions in proptest::collection::vec(arb_action(), 0..12)) {
            let mut lc = ShipmentLifecycle::new(false);
            let order = [
                ShipmentState::AwaitingPickup,
                ShipmentState::InTransit,
                ShipmentState::AwaitingDelivery,
                ShipmentState::Delivered,
            ];
            let mut position = 0usize;
            for action in actions {
                let before = lc.state();
                match lc.apply(action, &ActionInput::default(), t0()) {
                    Ok(t) => {
                        position += 1;
                        proptest::prop_assert_eq!(t.record.from_state, before);
                        proptest::prop_assert_eq!(lc.state(), order[position]);
                    }
                    Err(_) => proptest::prop_assert_eq!(lc.state(), before),
                }
            }
            proptest::prop_assert_eq!(lc.transitions().len(), position);
        }
    }
}

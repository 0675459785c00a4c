//! # Grant Resolution
//!
//! Gathers the facts [`transmission_access::authorize`] needs for one caller
//! and one shipment. Local facts (ownership, the presented permission link,
//! approved access requests) are read from the stores; wallet party status
//! needs the identity service and is only looked up when the local facts do
//! not already grant the requested level.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use transmission_access::{authorize, explain, GrantFacts, LinkFact};
use transmission_core::{Endpoint, PermissionLevel, ShipmentId, WalletId};

use crate::auth::RequestContext;
use crate::error::AppError;
use crate::records::ShipmentRecord;
use crate::state::AppState;

/// Load a shipment or 404.
pub fn shipment_or_404(state: &AppState, id: &ShipmentId) -> Result<ShipmentRecord, AppError> {
    state
        .shipments
        .get(id)
        .ok_or_else(|| AppError::not_found("Shipment"))
}

/// Facts available without calling out.
pub fn local_facts(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
    now: DateTime<Utc>,
) -> GrantFacts {
    let is_owner = ctx
        .user
        .as_ref()
        .is_some_and(|user| shipment.is_owned_by(user));

    let link = ctx
        .permission_link
        .and_then(|id| state.permission_links.get(&id))
        .filter(|link| link.shipment_id == shipment.id)
        .map_or(LinkFact::Absent, |link| link.window().evaluate(now));

    let grants = match ctx.user_id() {
        Some(user_id) => state
            .access_requests
            .filter(|ar| ar.shipment_id == shipment.id && &ar.requester_id == user_id)
            .iter()
            .filter_map(|ar| ar.grant())
            .collect(),
        None => Vec::new(),
    };

    GrantFacts {
        is_owner,
        is_party: false,
        link,
        grants,
    }
}

/// Whether the caller holds any of the shipment's party wallets.
///
/// Anonymous callers and deployments without an identity service are never
/// parties.
pub async fn is_party(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
) -> Result<bool, AppError> {
    let (Some(_), Some(token), Some(identity)) = (&ctx.user, &ctx.token, &state.identity) else {
        return Ok(false);
    };
    for wallet in shipment.party_wallets() {
        if identity.wallet_is_active(token, wallet).await? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Full facts for `endpoint` at `level`. The party lookup is skipped when the
/// local facts already grant.
pub async fn resolve_facts(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
    endpoint: Endpoint,
    level: PermissionLevel,
) -> Result<GrantFacts, AppError> {
    let mut facts = local_facts(state, ctx, shipment, Utc::now());
    if !authorize(&facts, endpoint, level) {
        facts.is_party = is_party(state, ctx, shipment).await?;
    }
    Ok(facts)
}

/// Require `level` on `endpoint`, returning the facts that granted it.
pub async fn require(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
    endpoint: Endpoint,
    level: PermissionLevel,
) -> Result<GrantFacts, AppError> {
    let facts = resolve_facts(state, ctx, shipment, endpoint, level).await?;
    match explain(&facts, endpoint, level) {
        Some(source) => {
            tracing::debug!(shipment_id = %shipment.id, %endpoint, %level, %source, "access granted");
            Ok(facts)
        }
        None if level == PermissionLevel::None => Ok(facts),
        None => {
            if !facts.link.is_valid() {
                ctx.require_user()?;
            }
            tracing::debug!(shipment_id = %shipment.id, %endpoint, %level, "access denied");
            Err(AppError::forbidden())
        }
    }
}

/// Owner, organization member or party. Used for operations no access
/// request can grant.
pub async fn require_owner_or_party(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
) -> Result<(), AppError> {
    let user = ctx.require_user()?;
    if shipment.is_owned_by(user) || is_party(state, ctx, shipment).await? {
        return Ok(());
    }
    Err(AppError::forbidden())
}

/// Shipments the caller may see in listings with the facts that made them
/// visible: owned, granted read access by an approved request, or held as a
/// party. Permission links do not list. Wallet lookups are memoized for the
/// duration of the call.
pub async fn visible_shipments(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Vec<(ShipmentRecord, GrantFacts)>, AppError> {
    ctx.require_user()?;
    let now = Utc::now();
    let mut wallets: HashMap<WalletId, bool> = HashMap::new();
    let mut visible = Vec::new();

    for shipment in state.shipments.list() {
        let mut facts = local_facts(state, ctx, &shipment, now);
        facts.link = LinkFact::Absent;
        if !authorize(&facts, Endpoint::Shipment, PermissionLevel::ReadOnly) {
            facts.is_party = is_party_memoized(state, ctx, &shipment, &mut wallets).await?;
            if !facts.is_party {
                continue;
            }
        }
        visible.push((shipment, facts));
    }
    visible.sort_by(|(a, _), (b, _)| b.created_at.cmp(&a.created_at));
    Ok(visible)
}

async fn is_party_memoized(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
    wallets: &mut HashMap<WalletId, bool>,
) -> Result<bool, AppError> {
    let (Some(token), Some(identity)) = (&ctx.token, &state.identity) else {
        return Ok(false);
    };
    for wallet in shipment.party_wallets() {
        let active = match wallets.get(wallet) {
            Some(active) => *active,
            None => {
                let active = identity.wallet_is_active(token, wallet).await?;
                wallets.insert(wallet.clone(), active);
                active
            }
        };
        if active {
            return Ok(true);
        }
    }
    Ok(false)
}

//! # transmission-access — Permission Derivation
//!
//! Access to a shipment endpoint is the OR of four independent grant
//! sources. Callers pre-fetch the facts and pass them to [`authorize`],
//! which does no I/O and so is tested without HTTP or database fixtures.
//!
//! ```text
//! owner / organization ─┐
//! wallet party ─────────┤
//! permission link ──────┼──▶ authorize(facts, endpoint, level) -> bool
//! approved requests ────┘
//! ```

pub mod grant;
pub mod link;

pub use grant::{authorize, effective_permissions, explain, GrantFacts, GrantSource};
pub use link::{LinkFact, PermissionLinkWindow};

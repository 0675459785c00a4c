//! Permission link validity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of the permission link presented with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkFact {
    /// No link presented, or the link belongs to another shipment.
    #[default]
    Absent,
    /// A live link bound to this shipment.
    Valid,
    /// A link bound to this shipment whose expiration has passed.
    Expired,
}

impl LinkFact {
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Expiration window of a permission link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionLinkWindow {
    /// `None` never expires.
    pub expiration_date: Option<DateTime<Utc>>,
}

impl PermissionLinkWindow {
    /// Validity at `now`. Expiry is exclusive: a link is dead at its
    /// expiration instant.
    pub fn evaluate(&self, now: DateTime<Utc>) -> LinkFact {
        match self.expiration_date {
            Some(expires) if expires <= now => LinkFact::Expired,
            _ => LinkFact::Valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn open_ended_link_is_valid() {
        let window = PermissionLinkWindow {
            expiration_date: None,
        };
        assert_eq!(window.evaluate(Utc::now()), LinkFact::Valid);
    }

    #[test]
    fn expiry_boundary() {
        let now = Utc::now();
        let at = |expires| PermissionLinkWindow {
            expiration_date: Some(expires),
        };
        assert_eq!(at(now + Duration::seconds(1)).evaluate(now), LinkFact::Valid);
        assert_eq!(at(now).evaluate(now), LinkFact::Expired);
        assert_eq!(at(now - Duration::days(1)).evaluate(now), LinkFact::Expired);
    }
}

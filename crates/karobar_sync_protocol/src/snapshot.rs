//! Consolidated bootstrap snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `GET /api/sync`.
///
/// Entities are kept opaque; `units` and `companies` are optional on the
/// wire and default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSnapshot {
    /// Business profile, if the account has one.
    #[serde(default)]
    pub business: Option<Value>,
    /// Products.
    #[serde(default)]
    pub products: Vec<Value>,
    /// Parties.
    #[serde(default)]
    pub parties: Vec<Value>,
    /// Units.
    #[serde(default)]
    pub units: Vec<Value>,
    /// Companies.
    #[serde(default)]
    pub companies: Vec<Value>,
}

impl BootstrapSnapshot {
    /// Total number of entities, business profile included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        usize::from(self.business.is_some())
            + self.products.len()
            + self.parties.len()
            + self.units.len()
            + self.companies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_sections_default_empty() {
        let snap: BootstrapSnapshot = serde_json::from_value(json!({
            "business": {"name": "Ali Traders"},
            "products": [{"_id": "p"}],
            "parties": []
        }))
        .unwrap();
        assert!(snap.units.is_empty());
        assert!(snap.companies.is_empty());
        assert_eq!(snap.entity_count(), 2);
    }

    #[test]
    fn null_business() {
        let snap: BootstrapSnapshot =
            serde_json::from_value(json!({"business": null, "products": [], "parties": []}))
                .unwrap();
        assert!(snap.business.is_none());
        assert_eq!(snap.entity_count(), 0);
    }
}

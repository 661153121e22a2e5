//! Metadata record snapshots and paged listings.

use crate::reference::Reference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use units::Unit;

/// A versioned snapshot of a remote metadata object.
///
/// Records are immutable once stored in the cache: a refresh produces a new
/// record, never an in-place mutation. The `attributes` payload is opaque
/// to the synchronization core and is passed through untouched, with the
/// single exception of the conventional `valueUnits` block consulted by
/// [`expected_unit`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// The platform's internal object id.
    pub id: String,
    /// Business code, when the object carries one.
    #[serde(default)]
    pub code: Option<String>,
    /// Externally assigned identifier attribute, when present.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Modification marker used as the record version.
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    /// Domain-specific attributes, opaque to this core.
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl MetadataRecord {
    /// Every reference this record resolves by.
    ///
    /// The internal id is always present; code and identifier references
    /// are included when the record carries them. The cache stores the
    /// record under each of these so a later lookup by a different kind
    /// still hits.
    pub fn references(&self) -> Vec<Reference> {
        let mut references = vec![Reference::id(self.id.clone())];
        if let Some(code) = &self.code {
            references.push(Reference::code(code.clone()));
        }
        if let Some(identifier) = &self.identifier {
            references.push(Reference::identifier(identifier.clone()));
        }
        references
    }
}

/// Reads the unit the platform expects for a payload field.
///
/// By convention the record's attributes may carry a `valueUnits` object
/// mapping field names to wire unit strings, e.g.
/// `{"valueUnits": {"birthWeight": "g"}}`. Returns `None` when the record
/// declares nothing for the field or the declared string is not a known
/// unit.
pub fn expected_unit(record: &MetadataRecord, field: &str) -> Option<Unit> {
    record
        .attributes
        .get("valueUnits")
        .and_then(|units| units.get(field))
        .and_then(|value| value.as_str())
        .and_then(Unit::from_wire)
}

/// Equality filters applied to bulk listings.
///
/// Rendered into remote query parameters; an empty filter lists everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Exact-match filter on the object name.
    pub name: Option<String>,
    /// Exact-match filter on the business code.
    pub code: Option<String>,
}

impl MetadataFilter {
    /// Renders the filter as remote `filter=` query parameter values.
    pub fn to_query(&self) -> Vec<String> {
        let mut params = Vec::new();
        if let Some(name) = &self.name {
            params.push(format!("name:eq:{}", name));
        }
        if let Some(code) = &self.code {
            params.push(format!("code:eq:{}", code));
        }
        params
    }
}

/// One page of a bulk listing.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataPage {
    /// Records on this page.
    pub items: Vec<MetadataRecord>,
    /// Whether the remote reports further pages.
    pub more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceKind;
    use serde_json::json;

    fn record(code: Option<&str>, identifier: Option<&str>) -> MetadataRecord {
        MetadataRecord {
            id: "abc123".into(),
            code: code.map(Into::into),
            identifier: identifier.map(Into::into),
            name: "Birth weight".into(),
            last_updated: Utc::now(),
            attributes: serde_json::Value::Null,
        }
    }

    #[test]
    fn references_always_include_id() {
        let refs = record(None, None).references();
        assert_eq!(refs, vec![Reference::id("abc123")]);
    }

    #[test]
    fn references_cover_every_exposed_kind() {
        let refs = record(Some("DE_BW"), Some("urn:bw")).references();
        assert_eq!(refs.len(), 3);
        assert!(refs.contains(&Reference::id("abc123")));
        assert!(refs.contains(&Reference::code("DE_BW")));
        assert!(refs.contains(&Reference::identifier("urn:bw")));
        assert!(refs.iter().any(|r| r.kind() == ReferenceKind::Identifier));
    }

    #[test]
    fn expected_unit_reads_value_units_attribute() {
        let mut rec = record(None, None);
        rec.attributes = json!({"valueUnits": {"birthWeight": "g", "height": "cm"}});
        assert_eq!(expected_unit(&rec, "birthWeight"), Some(units::Unit::Gram));
        assert_eq!(expected_unit(&rec, "height"), Some(units::Unit::Centimetre));
        assert_eq!(expected_unit(&rec, "apgar"), None);
    }

    #[test]
    fn expected_unit_ignores_unknown_strings() {
        let mut rec = record(None, None);
        rec.attributes = json!({"valueUnits": {"birthWeight": "stone"}});
        assert_eq!(expected_unit(&rec, "birthWeight"), None);
    }

    #[test]
    fn filter_renders_query_params() {
        let filter = MetadataFilter {
            name: Some("Baby Postnatal".into()),
            code: Some("WHO_RMNCH".into()),
        };
        assert_eq!(
            filter.to_query(),
            vec!["name:eq:Baby Postnatal", "code:eq:WHO_RMNCH"]
        );
        assert!(MetadataFilter::default().to_query().is_empty());
    }

    #[test]
    fn record_wire_form_parses() {
        let rec: MetadataRecord = serde_json::from_value(json!({
            "id": "x1",
            "name": "Weight",
            "lastUpdated": "2026-01-05T10:15:00Z"
        }))
        .unwrap();
        assert_eq!(rec.id, "x1");
        assert_eq!(rec.code, None);
        assert!(rec.attributes.is_null());
    }
}

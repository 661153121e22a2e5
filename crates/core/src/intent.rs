//! Write intents and outgoing payloads.
//!
//! A [`WriteDraft`] is the caller-supplied half of an attempt: where to
//! write and what. The orchestrator resolves and normalizes it into a
//! [`WriteIntent`], which is created fresh per attempt, consumed once by
//! the transport collaborator, and never persisted.

use crate::{SyncError, SyncResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracker::metadata::expected_unit as record_expected_unit;
use tracker::{MetadataRecord, Reference, RequestMethod};
use units::{Measurement, Unit};

/// One outgoing field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PayloadValue {
    /// Free text.
    Text { value: String },
    /// Dimensionless number.
    Number { value: f64 },
    /// Boolean flag.
    Flag { value: bool },
    /// Calendar date, ISO `YYYY-MM-DD` on the wire.
    Date { value: NaiveDate },
    /// A measurement that may need unit normalization before dispatch.
    ///
    /// `expected_unit` is the unit the target system wants, when the
    /// mapping already knows it; left empty, the resolved metadata
    /// record's declaration is consulted instead.
    Measurement {
        value: Measurement,
        #[serde(default, rename = "expectedUnit")]
        expected_unit: Option<Unit>,
    },
}

impl PayloadValue {
    /// Renders the value into the wire body.
    fn to_wire(&self) -> serde_json::Value {
        match self {
            PayloadValue::Text { value } => json!(value),
            PayloadValue::Number { value } => json!(value),
            PayloadValue::Flag { value } => json!(value),
            PayloadValue::Date { value } => json!(value.to_string()),
            PayloadValue::Measurement { value, .. } => json!(value.magnitude),
        }
    }
}

/// The payload of one outgoing write.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Field name to value; ordered for stable wire bodies.
    #[serde(default)]
    pub fields: BTreeMap<String, PayloadValue>,
}

impl Payload {
    /// Payload with a single field, mostly a test convenience.
    pub fn with(name: impl Into<String>, value: PayloadValue) -> Self {
        let mut payload = Payload::default();
        payload.fields.insert(name.into(), value);
        payload
    }

    /// Renders the payload into the JSON wire body.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_wire());
        }
        serde_json::Value::Object(map)
    }
}

/// A candidate outgoing operation as supplied by the caller.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteDraft {
    /// Reference to the target object; possibly unresolved or new.
    pub target: Reference,
    /// Remote collection the write goes to, e.g. `trackedEntityInstances`.
    pub resource_type: String,
    /// Fields to write.
    pub payload: Payload,
}

/// A finished outgoing operation, ready for the transport collaborator.
#[derive(Clone, Debug)]
pub struct WriteIntent {
    /// Reference the attempt targets.
    pub target: Reference,
    /// Remote collection the write goes to.
    pub resource_type: String,
    /// Internal id of the target when resolution found one.
    pub resolved_id: Option<String>,
    /// Selected request method.
    pub method: RequestMethod,
    /// Normalized JSON wire body.
    pub body: serde_json::Value,
}

/// Normalizes every measurement in `payload` to the unit the target
/// system expects.
///
/// The expected unit comes from the draft itself when the mapping supplied
/// one, otherwise from the resolved metadata record's `valueUnits`
/// declaration. Fields with no expectation on either side pass through
/// unchanged.
///
/// # Errors
///
/// Returns [`SyncError::Payload`] when a measurement's dimension is
/// incompatible with the expected unit. This is fatal for the attempt and
/// must not be retried.
pub fn normalize_payload(
    payload: &Payload,
    record: Option<&MetadataRecord>,
) -> SyncResult<Payload> {
    let mut normalized = payload.clone();
    for (name, value) in normalized.fields.iter_mut() {
        if let PayloadValue::Measurement {
            value: measurement,
            expected_unit,
        } = value
        {
            let target_unit =
                expected_unit.or_else(|| record.and_then(|rec| record_expected_unit(rec, name)));
            if let Some(target_unit) = target_unit {
                *measurement = measurement
                    .convert_to(target_unit)
                    .map_err(|err| SyncError::Payload(format!("field '{}': {}", name, err)))?;
                *expected_unit = Some(target_unit);
            }
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn weight_record(unit: &str) -> MetadataRecord {
        MetadataRecord {
            id: "a1".into(),
            code: None,
            identifier: None,
            name: "Baby weight".into(),
            last_updated: Utc::now(),
            attributes: json!({"valueUnits": {"birthWeight": unit}}),
        }
    }

    #[test]
    fn measurement_is_converted_to_the_record_unit() {
        let payload = Payload::with(
            "birthWeight",
            PayloadValue::Measurement {
                value: Measurement::new(1.5, Unit::Kilogram),
                expected_unit: None,
            },
        );

        let normalized = normalize_payload(&payload, Some(&weight_record("g"))).unwrap();
        assert_eq!(
            normalized.fields["birthWeight"],
            PayloadValue::Measurement {
                value: Measurement::new(1500.0, Unit::Gram),
                expected_unit: Some(Unit::Gram),
            }
        );
        // the input payload is untouched
        assert_eq!(
            payload.fields["birthWeight"],
            PayloadValue::Measurement {
                value: Measurement::new(1.5, Unit::Kilogram),
                expected_unit: None,
            }
        );
    }

    #[test]
    fn draft_expectation_wins_over_the_record() {
        let payload = Payload::with(
            "birthWeight",
            PayloadValue::Measurement {
                value: Measurement::new(453.59237, Unit::Gram),
                expected_unit: Some(Unit::Pound),
            },
        );

        let normalized = normalize_payload(&payload, Some(&weight_record("g"))).unwrap();
        assert_eq!(
            normalized.fields["birthWeight"],
            PayloadValue::Measurement {
                value: Measurement::new(1.0, Unit::Pound),
                expected_unit: Some(Unit::Pound),
            }
        );
    }

    #[test]
    fn no_expectation_passes_through() {
        let payload = Payload::with(
            "birthWeight",
            PayloadValue::Measurement {
                value: Measurement::new(1.5, Unit::Kilogram),
                expected_unit: None,
            },
        );

        let normalized = normalize_payload(&payload, None).unwrap();
        assert_eq!(normalized, payload);
    }

    #[test]
    fn incompatible_dimension_is_a_payload_error() {
        let payload = Payload::with(
            "birthWeight",
            PayloadValue::Measurement {
                value: Measurement::new(50.0, Unit::Centimetre),
                expected_unit: None,
            },
        );

        let err = normalize_payload(&payload, Some(&weight_record("g"))).unwrap_err();
        assert!(matches!(err, SyncError::Payload(_)));
        assert!(err.to_string().contains("birthWeight"));
    }

    #[test]
    fn wire_body_renders_primitives() {
        let mut payload = Payload::default();
        payload
            .fields
            .insert("name".into(), PayloadValue::Text { value: "Ada".into() });
        payload
            .fields
            .insert("alive".into(), PayloadValue::Flag { value: true });
        payload.fields.insert(
            "birthDate".into(),
            PayloadValue::Date {
                value: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            },
        );
        payload.fields.insert(
            "birthWeight".into(),
            PayloadValue::Measurement {
                value: Measurement::new(1500.0, Unit::Gram),
                expected_unit: Some(Unit::Gram),
            },
        );

        assert_eq!(
            payload.to_wire(),
            json!({
                "name": "Ada",
                "alive": true,
                "birthDate": "2026-02-01",
                "birthWeight": 1500.0
            })
        );
    }

    #[test]
    fn draft_parses_from_spool_json() {
        let draft: WriteDraft = serde_json::from_value(json!({
            "target": {"kind": "identifier", "value": "urn:patient:17"},
            "resourceType": "trackedEntityInstances",
            "payload": {"fields": {
                "birthWeight": {
                    "type": "measurement",
                    "value": {"magnitude": 7.7, "unit": "lb"},
                    "expectedUnit": "g"
                },
                "note": {"type": "text", "value": "from maternity ward"}
            }}
        }))
        .unwrap();

        assert_eq!(draft.target, Reference::identifier("urn:patient:17"));
        assert_eq!(draft.resource_type, "trackedEntityInstances");
        assert_eq!(draft.payload.fields.len(), 2);
    }
}

//! Codec for the state documents exchanged with a state sink.
//!
//! The bus itself is binary, but device state leaves the controller as a
//! JSON shadow document and desired-state deltas come back the same way:
//!
//! ```text
//! reported:  {"state": {"reported": {"pool": true, "waterTemp": 78}}}
//! delta:     {"state": {"pool": false}, "version": 12}
//! ```
//!
//! The [`Codec`] trait keeps the document format swappable; [`JsonCodec`]
//! is the implementation used in practice. Nothing else in the crate
//! knows which format is in use, so a binary codec for a constrained
//! uplink would slot in without touching the pipelines.
//!
//! # Reported documents
//!
//! [`encode_reported`] wraps the whole [`DeviceState`] every time, not
//! just the keys that changed. Shadow services merge reported state on
//! their side, and a full snapshot means a dropped update is repaired by
//! the next one.
//!
//! # Delta documents
//!
//! A delta is decoded entry by entry. The shadow service is free to send
//! values this controller has no use for: `null` when an attribute was
//! deleted, a float from a slider, a nested object from some other
//! client. Each such entry lands in [`DecodedDelta::rejected`] as a
//! [`CommandError::InvalidValue`] while its siblings still reach the
//! encoders. Only a document that is not a delta at all (unparseable, or
//! with no `state` object) fails as a whole.
//!
//! ```text
//! {"state": {"pool": null, "spa": true}}
//!     desired:  {"spa": true}
//!     rejected: [("pool", invalid value for pool: null)]
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::types::{DesiredState, DeviceState, Value};
use crate::{CommandError, ProtocolError};

/// Encodes Rust values to bytes and back.
///
/// ## Trait bounds
///
/// - `Send + Sync`: the codec is shared with the poll task, which tokio
///   may move between worker threads.
/// - `'static`: a codec owns everything it needs, so it can be stored in
///   a long-lived state sink.
///
/// ## Generic methods
///
/// `encode` and `decode` are generic over the document type rather than
/// tied to [`ReportedDocument`] and [`DeltaDocument`]. Any `Serialize`
/// value can be encoded and any `DeserializeOwned` value decoded.
/// `DeserializeOwned` means the result does not borrow from `data`, so
/// the receive buffer can be dropped right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// Behind the `json` feature (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// `{"state": {"reported": {...}}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedDocument {
    pub state: ReportedSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedSection {
    pub reported: DeviceState,
}

impl ReportedDocument {
    pub fn new(reported: DeviceState) -> Self {
        Self {
            state: ReportedSection { reported },
        }
    }
}

/// `{"state": {...}}`. Other top-level keys (version, timestamp,
/// metadata) are ignored.
///
/// Entries are kept as [`DeltaValue`]s so one unusable value does not
/// fail the whole document; [`decode_delta`] sorts them out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeltaDocument {
    pub state: BTreeMap<String, DeltaValue>,
}

/// One entry of a delta document's `state` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaValue {
    /// A value the encoders can interpret.
    Accepted(Value),
    /// Anything else, with a short description of what arrived.
    Unsupported(String),
}

impl<'de> Deserialize<'de> for DeltaValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DeltaValueVisitor)
    }
}

/// Accepts every self-describing value. Scalars that map onto [`Value`]
/// are accepted; the rest are consumed and marked unsupported.
struct DeltaValueVisitor;

impl<'de> Visitor<'de> for DeltaValueVisitor {
    type Value = DeltaValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any delta value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<DeltaValue, E> {
        Ok(DeltaValue::Accepted(Value::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DeltaValue, E> {
        Ok(DeltaValue::Accepted(Value::Int(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DeltaValue, E> {
        Ok(match i64::try_from(v) {
            Ok(n) => DeltaValue::Accepted(Value::Int(n)),
            Err(_) => DeltaValue::Unsupported(format!("integer {v} out of range")),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<DeltaValue, E> {
        Ok(DeltaValue::Unsupported(format!("non-integer number {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DeltaValue, E> {
        Ok(DeltaValue::Accepted(Value::Text(v.to_string())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<DeltaValue, E> {
        Ok(DeltaValue::Accepted(Value::Text(v)))
    }

    fn visit_unit<E: de::Error>(self) -> Result<DeltaValue, E> {
        Ok(DeltaValue::Unsupported("null".to_string()))
    }

    fn visit_none<E: de::Error>(self) -> Result<DeltaValue, E> {
        self.visit_unit()
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<DeltaValue, D::Error> {
        DeltaValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DeltaValue, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(DeltaValue::Unsupported("array".to_string()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DeltaValue, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(DeltaValue::Unsupported("object".to_string()))
    }
}

/// The usable part of a delta document plus the entries that were not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedDelta {
    /// Deltas ready for the reverse pipeline.
    pub desired: DesiredState,
    /// Entries whose value could not be interpreted, one error each.
    pub rejected: Vec<(String, CommandError)>,
}

/// Encodes `state` as a reported-state document.
pub fn encode_reported<C: Codec>(codec: &C, state: &DeviceState) -> Result<Vec<u8>, ProtocolError> {
    codec.encode(&ReportedDocument::new(state.clone()))
}

/// Extracts the desired-state deltas from a delta document.
///
/// # Errors
/// Fails only when `data` is not a delta document. Unusable entry
/// values are returned in [`DecodedDelta::rejected`] instead.
pub fn decode_delta<C: Codec>(codec: &C, data: &[u8]) -> Result<DecodedDelta, ProtocolError> {
    let document: DeltaDocument = codec.decode(data)?;

    let mut decoded = DecodedDelta::default();
    for (selector, value) in document.state {
        match value {
            DeltaValue::Accepted(value) => {
                decoded.desired.insert(selector, value);
            }
            DeltaValue::Unsupported(reason) => {
                tracing::debug!(%selector, %reason, "delta value rejected");
                decoded.rejected.push((
                    selector.clone(),
                    CommandError::InvalidValue { selector, reason },
                ));
            }
        }
    }
    Ok(decoded)
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::types::{StatusFragment, Value};

    #[test]
    fn test_reported_document_shape() {
        let mut state = DeviceState::new();
        let fragment: StatusFragment = [
            ("pool".to_string(), Value::Bool(true)),
            ("waterTemp".to_string(), Value::Int(78)),
        ]
        .into_iter()
        .collect();
        state.merge(fragment);

        let bytes = encode_reported(&JsonCodec, &state).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["state"]["reported"]["pool"], true);
        assert_eq!(json["state"]["reported"]["waterTemp"], 78);
    }

    #[test]
    fn test_delta_document_ignores_metadata() {
        let raw = br#"{"version": 7, "timestamp": 1600000000,
                       "state": {"spa": true, "spaSetTemp": 102},
                       "metadata": {"spa": {"timestamp": 1600000000}}}"#;
        let delta = decode_delta(&JsonCodec, raw).unwrap();
        assert_eq!(delta.desired.len(), 2);
        assert_eq!(delta.desired["spa"], Value::Bool(true));
        assert_eq!(delta.desired["spaSetTemp"], Value::Int(102));
        assert!(delta.rejected.is_empty());
    }

    #[test]
    fn test_null_and_float_entries_do_not_drop_siblings() {
        let raw = br#"{"state": {"pool": null, "spa": true, "spaSetTemp": 102.5}}"#;
        let delta = decode_delta(&JsonCodec, raw).unwrap();

        assert_eq!(delta.desired.len(), 1);
        assert_eq!(delta.desired["spa"], Value::Bool(true));

        let rejected: Vec<&str> = delta.rejected.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(rejected, vec!["pool", "spaSetTemp"]);
        assert_eq!(
            delta.rejected[0].1,
            CommandError::InvalidValue {
                selector: "pool".into(),
                reason: "null".into(),
            }
        );
        assert!(matches!(
            delta.rejected[1].1,
            CommandError::InvalidValue { ref selector, .. } if selector == "spaSetTemp"
        ));
    }

    #[test]
    fn test_nested_entries_are_rejected_not_fatal() {
        let raw = br#"{"state": {"aux1": {"on": true, "levels": [1, 2]},
                                  "aux2": [0, 1], "pool": false}}"#;
        let delta = decode_delta(&JsonCodec, raw).unwrap();

        assert_eq!(delta.desired.len(), 1);
        assert_eq!(delta.desired["pool"], Value::Bool(false));
        assert_eq!(delta.rejected.len(), 2);
        assert_eq!(delta.rejected[0].0, "aux1");
        assert_eq!(delta.rejected[1].0, "aux2");
        assert!(
            delta
                .rejected
                .iter()
                .all(|(_, err)| matches!(err, CommandError::InvalidValue { .. }))
        );
    }

    #[test]
    fn test_text_and_negative_values_are_accepted() {
        let raw = br#"{"state": {"dayOfWeek": "Sunday", "offset": -3}}"#;
        let delta = decode_delta(&JsonCodec, raw).unwrap();
        assert_eq!(delta.desired["dayOfWeek"], Value::from("Sunday"));
        assert_eq!(delta.desired["offset"], Value::Int(-3));
        assert!(delta.rejected.is_empty());
    }

    #[test]
    fn test_delta_without_state_is_error() {
        let result = decode_delta(&JsonCodec, br#"{"desired": {}}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_garbage_is_error() {
        let result: Result<DeltaDocument, _> = JsonCodec.decode(b"not json at all");
        assert!(result.is_err());
    }
}

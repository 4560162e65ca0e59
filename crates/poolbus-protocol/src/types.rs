//! Data model shared by the decoder, encoder, and pipeline layers.
//!
//! Decoded payloads are loosely typed on purpose: the bus carries a small
//! closed set of payload shapes, but the consumers of device state (a
//! cloud shadow, a log line, a dashboard) all want a flat JSON object of
//! `field name -> scalar`. [`Value`] is that scalar and [`DeviceState`]
//! is that object.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single decoded field value.
///
/// `#[serde(untagged)]` keeps the JSON plain: `true`, `78`, `"Sunday"`
/// rather than `{"Bool": true}`. Variant order matters for untagged
/// deserialization, so booleans are tried before integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// On/off flags (circuits, heater, delay, ...).
    Bool(bool),
    /// Counters, modes, clock fields and signed temperatures.
    Int(i64),
    /// Named values such as the day of week.
    Text(String),
}

impl Value {
    /// Interprets the value as an on/off target.
    ///
    /// Accepts booleans and the integers `0`/`1`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Interprets the value as a single wire byte.
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Self::Int(n) => u8::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<i8> for Value {
    fn from(n: i8) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status fragment / device state
// ---------------------------------------------------------------------------

/// The fields decoded from one payload, e.g. `{"spa": true, "waterTemp": 78}`.
///
/// A `BTreeMap` keeps iteration (and therefore JSON output and merge
/// order within a fragment) deterministic.
pub type StatusFragment = BTreeMap<String, Value>;

/// A batch of desired-state deltas: selector name to target value.
pub type DesiredState = BTreeMap<String, Value>;

/// Last known value of every field seen on the bus.
///
/// Fragments are merged last-write-wins per key in arrival order. Nothing
/// is ever removed automatically; the owner decides when to
/// [`clear`](Self::clear).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceState {
    fields: BTreeMap<String, Value>,
}

impl DeviceState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one fragment, returning the keys whose value changed.
    pub fn merge(&mut self, fragment: StatusFragment) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in fragment {
            if self.fields.get(&key) != Some(&value) {
                changed.push(key.clone());
            }
            self.fields.insert(key, value);
        }
        changed
    }

    /// Merges fragments in order. A key set by several fragments keeps
    /// the value from the last one.
    pub fn merge_all<I>(&mut self, fragments: I) -> Vec<String>
    where
        I: IntoIterator<Item = StatusFragment>,
    {
        let mut changed = Vec::new();
        for fragment in fragments {
            for key in self.merge(fragment) {
                if !changed.contains(&key) {
                    changed.push(key);
                }
            }
        }
        changed
    }

    /// Returns the last value seen for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Forgets every field.
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl From<StatusFragment> for DeviceState {
    fn from(fields: StatusFragment) -> Self {
        Self { fields }
    }
}

// ---------------------------------------------------------------------------
// Payload key
// ---------------------------------------------------------------------------

/// Dispatch key for payload decoders: the frame's message type and
/// command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PayloadKey {
    pub message_type: u8,
    pub command: u8,
}

impl PayloadKey {
    pub const fn new(message_type: u8, command: u8) -> Self {
        Self {
            message_type,
            command,
        }
    }
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}/{:02X}", self.message_type, self.command)
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Parse counters. Only reset when the caller asks.
///
/// Serialized with the camelCase names the diagnostics consumers expect:
/// `{"frameCount": 12, "badFrames": 1, "unprocessedPayloads": 3}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStats {
    /// Candidate messages handed to the frame parser.
    pub frame_count: u64,
    /// Frame-shaped messages with a wrong start byte or checksum.
    pub bad_frames: u64,
    /// Valid frames with no decoder, or with an inconsistent length.
    pub unprocessed_payloads: u64,
}

impl fmt::Display for ProtocolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames={} bad={} unprocessed={}",
            self.frame_count, self.bad_frames, self.unprocessed_payloads
        )
    }
}

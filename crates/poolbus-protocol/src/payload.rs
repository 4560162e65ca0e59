//! Payload decoder registry.
//!
//! Each known `(message type, command)` pair maps to a plain function
//! that turns payload bytes into a [`StatusFragment`]. Decoders are
//! best-effort: a payload shorter than its shape yields whatever fields
//! could be read before the data ran out, never an error.
//!
//! Offsets follow the community reverse-engineering notes for the bus;
//! reserved bytes that are normally zero are checked and reported at
//! `debug` level only.

use std::collections::HashMap;

use tracing::debug;

use crate::error::FrameError;
use crate::types::{PayloadKey, StatusFragment, Value};

/// A payload decoder.
pub type Decoder = fn(&[u8]) -> StatusFragment;

/// Controller broadcast: clock, circuits, modes, temperatures.
pub const STATUS: PayloadKey = PayloadKey::new(0x24, 0x02);
/// Controller clock.
pub const DATE_TIME: PayloadKey = PayloadKey::new(0x24, 0x05);
/// Temperature and set-point summary.
pub const TEMPERATURES: PayloadKey = PayloadKey::new(0x24, 0x08);
/// Pump keep-alive.
pub const PUMP_PING: PayloadKey = PayloadKey::new(0x00, 0x04);
/// Pump run/stop acknowledgement.
pub const PUMP_STATUS: PayloadKey = PayloadKey::new(0x00, 0x06);
/// Pump telemetry.
pub const PUMP_TELEMETRY: PayloadKey = PayloadKey::new(0x00, 0x07);

/// Result of routing a payload through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A decoder ran; the fragment may be partial or empty.
    Decoded(StatusFragment),
    /// No decoder is registered for this key.
    Unmodeled(PayloadKey),
    /// The frame was rejected before reaching a decoder.
    Malformed(FrameError),
}

impl DecodeOutcome {
    /// The decoded fields, if a decoder ran.
    pub fn into_fragment(self) -> Option<StatusFragment> {
        match self {
            Self::Decoded(fields) => Some(fields),
            Self::Unmodeled(_) | Self::Malformed(_) => None,
        }
    }
}

/// Dispatch table from [`PayloadKey`] to [`Decoder`].
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<PayloadKey, Decoder>,
}

impl DecoderRegistry {
    /// A registry with no decoders.
    pub fn new() -> Self {
        Self::default()
    }

    /// The decoders for every modeled payload.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(STATUS, decode_status);
        registry.register(DATE_TIME, decode_date_time);
        registry.register(TEMPERATURES, decode_temperatures);
        registry.register(PUMP_PING, decode_ping);
        registry.register(PUMP_STATUS, decode_pump_status);
        registry.register(PUMP_TELEMETRY, decode_pump_telemetry);
        registry
    }

    /// Adds or replaces the decoder for `key`.
    pub fn register(&mut self, key: PayloadKey, decoder: Decoder) {
        self.decoders.insert(key, decoder);
    }

    pub fn contains(&self, key: PayloadKey) -> bool {
        self.decoders.contains_key(&key)
    }

    /// Runs the decoder registered for `key`, if any.
    pub fn decode(&self, key: PayloadKey, payload: &[u8]) -> DecodeOutcome {
        match self.decoders.get(&key) {
            Some(decoder) => DecodeOutcome::Decoded(decoder(payload)),
            None => DecodeOutcome::Unmodeled(key),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Runs a fallible field extractor and keeps whatever it managed to set.
fn best_effort<F>(payload: &[u8], extract: F) -> StatusFragment
where
    F: FnOnce(&[u8], &mut StatusFragment) -> Option<()>,
{
    let mut fields = StatusFragment::new();
    if extract(payload, &mut fields).is_none() {
        debug!(len = payload.len(), decoded = fields.len(), "payload shorter than its shape");
    }
    fields
}

fn set(fields: &mut StatusFragment, key: &str, value: impl Into<Value>) {
    fields.insert(key.to_string(), value.into());
}

fn byte(payload: &[u8], offset: usize) -> Option<u8> {
    payload.get(offset).copied()
}

fn signed(payload: &[u8], offset: usize) -> Option<i8> {
    byte(payload, offset).map(|b| b as i8)
}

fn be_u16(payload: &[u8], offset: usize) -> Option<u16> {
    let bytes = payload.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

// ---------------------------------------------------------------------------
// Status (24/02)
// ---------------------------------------------------------------------------

/// Circuit bits in status byte 2.
const CIRCUITS: [(&str, u8); 8] = [
    ("spa", 0x01),
    ("aux1", 0x02),
    ("aux2", 0x04),
    ("aux3", 0x08),
    ("feature1", 0x10),
    ("pool", 0x20),
    ("feature2", 0x40),
    ("feature3", 0x80),
];

/// Byte 3.
const FEATURE4: u8 = 0x01;

/// Byte 9 mode bits.
const RUN_MODE: u8 = 0x01;
const TEMP_UNITS: u8 = 0x04;
const FREEZE_PROTECT: u8 = 0x08;
const TIMEOUT: u8 = 0x10;

/// Byte 10 reads exactly this while a heater is firing.
const HEATER_ON: u8 = 0x0C;

/// Byte 12.
const DELAY: u8 = 0x04;

/// Byte 22: pool mode in bits 0-1, spa mode in bits 2-3.
const POOL_HEATER_MODE: u8 = 0x03;
const SPA_HEATER_MODE: u8 = 0x0C;

/// Decodes the controller status broadcast.
///
/// `runMode` is 0 (normal) or 1 (service); `tempUnits` is 0
/// (Fahrenheit) or 1 (Celsius). Temperatures are raw signed bytes in
/// the controller's configured unit.
pub fn decode_status(payload: &[u8]) -> StatusFragment {
    best_effort(payload, |p, fields| {
        set(fields, "hour", byte(p, 0)?);
        set(fields, "min", byte(p, 1)?);

        let circuits = byte(p, 2)?;
        for (name, mask) in CIRCUITS {
            set(fields, name, circuits & mask != 0);
        }
        set(fields, "feature4", byte(p, 3)? & FEATURE4 != 0);

        let reserved = p.get(4..9)?;
        if reserved.iter().any(|&b| b != 0) {
            debug!(?reserved, "unusual reserved bytes 4-8 in status payload");
        }

        let modes = byte(p, 9)?;
        set(fields, "runMode", u8::from(modes & RUN_MODE != 0));
        set(fields, "tempUnits", u8::from(modes & TEMP_UNITS != 0));
        set(fields, "freezeProtect", modes & FREEZE_PROTECT != 0);
        set(fields, "timeout", modes & TIMEOUT != 0);

        set(fields, "heater", byte(p, 10)? == HEATER_ON);

        let b11 = byte(p, 11)?;
        if b11 != 0 {
            debug!(byte = b11, "unusual byte 11 in status payload");
        }

        set(fields, "delay", byte(p, 12)? & DELAY != 0);

        set(fields, "waterTemp", signed(p, 14)?);
        set(fields, "spaTemp", signed(p, 15)?);
        set(fields, "airTemp", signed(p, 18)?);
        set(fields, "solarTemp", signed(p, 19)?);

        let heat = byte(p, 22)?;
        set(fields, "poolHeaterMode", heat & POOL_HEATER_MODE);
        set(fields, "spaHeaterMode", (heat & SPA_HEATER_MODE) >> 2);
        Some(())
    })
}

// ---------------------------------------------------------------------------
// Date/time (24/05)
// ---------------------------------------------------------------------------

/// Day-of-week is a single bit, Sunday = bit 0.
const DAYS: [(u8, &str); 7] = [
    (0x01, "Sunday"),
    (0x02, "Monday"),
    (0x04, "Tuesday"),
    (0x08, "Wednesday"),
    (0x10, "Thursday"),
    (0x20, "Friday"),
    (0x40, "Saturday"),
];

/// Name for a day-of-week bitmask, if exactly one known bit is set.
pub fn day_name(mask: u8) -> Option<&'static str> {
    DAYS.iter().find(|(bit, _)| *bit == mask).map(|(_, name)| *name)
}

/// Decodes the controller clock. An unrecognised day mask omits `dow`.
pub fn decode_date_time(payload: &[u8]) -> StatusFragment {
    best_effort(payload, |p, fields| {
        set(fields, "hour", byte(p, 0)?);
        set(fields, "min", byte(p, 1)?);
        let dow = byte(p, 2)?;
        match day_name(dow) {
            Some(name) => set(fields, "dow", name),
            None => debug!(mask = dow, "unknown day-of-week mask"),
        }
        set(fields, "day", byte(p, 3)?);
        set(fields, "month", byte(p, 4)?);
        set(fields, "year", byte(p, 5)?);
        set(fields, "adjust", byte(p, 6)?);
        set(fields, "dst", byte(p, 7)?);
        Some(())
    })
}

// ---------------------------------------------------------------------------
// Temperatures (24/08)
// ---------------------------------------------------------------------------

/// Decodes the temperature summary. Bytes after the fifth are padding.
pub fn decode_temperatures(payload: &[u8]) -> StatusFragment {
    best_effort(payload, |p, fields| {
        for (offset, name) in [
            "waterTemp",
            "spaTemp",
            "airTemp",
            "poolSetTemp",
            "spaSetTemp",
        ]
        .into_iter()
        .enumerate()
        {
            set(fields, name, signed(p, offset)?);
        }
        Some(())
    })
}

// ---------------------------------------------------------------------------
// Pump (00/04, 00/06, 00/07)
// ---------------------------------------------------------------------------

/// Byte 0 bits set while the pump is running.
const PUMP_STARTED: u8 = 0x0A;

/// Sentinel carried by a keep-alive.
const PING_SENTINEL: u8 = 0xFF;

/// Classifies a keep-alive. Produces no fields.
pub fn decode_ping(payload: &[u8]) -> StatusFragment {
    if let Some(&b) = payload.first() {
        if b != PING_SENTINEL {
            debug!(byte = b, "unknown ping data");
        }
    }
    StatusFragment::new()
}

/// Decodes a pump run/stop acknowledgement.
pub fn decode_pump_status(payload: &[u8]) -> StatusFragment {
    best_effort(payload, |p, fields| {
        set(fields, "pumpStarted", byte(p, 0)? & PUMP_STARTED != 0);
        Some(())
    })
}

/// Decodes pump telemetry: started flag, then mode, state, watts and
/// RPM as `u8, u8, u16 BE, u16 BE` from byte 1.
pub fn decode_pump_telemetry(payload: &[u8]) -> StatusFragment {
    best_effort(payload, |p, fields| {
        set(fields, "pumpStarted", byte(p, 0)? & PUMP_STARTED != 0);
        // Fields are only trusted as a block.
        p.get(1..9)?;
        set(fields, "pumpMode", byte(p, 1)?);
        set(fields, "pumpState", byte(p, 2)?);
        set(fields, "pumpWatts", be_u16(p, 3)?);
        set(fields, "pumpRPM", be_u16(p, 5)?);
        Some(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A realistic 29-byte status payload.
    fn status_payload() -> Vec<u8> {
        let mut p = vec![0u8; 29];
        p[0] = 14; // hour
        p[1] = 35; // min
        p[2] = 0x21; // SPA | POOL
        p[3] = 0x01; // feature4
        p[9] = 0x0C; // units C + freeze protect
        p[10] = 0x0C; // heater on
        p[12] = 0x34; // delay
        p[14] = 78;
        p[15] = 101;
        p[18] = 0xFE; // -2 air
        p[19] = 90;
        p[22] = 0x06; // spa mode 1, pool mode 2
        p
    }

    #[test]
    fn test_status_circuits_from_0x21() {
        let fields = decode_status(&status_payload());
        assert_eq!(fields["spa"], Value::Bool(true));
        assert_eq!(fields["pool"], Value::Bool(true));
        assert_eq!(fields["aux1"], Value::Bool(false));
        assert_eq!(fields["aux2"], Value::Bool(false));
        assert_eq!(fields["aux3"], Value::Bool(false));
        assert_eq!(fields["feature1"], Value::Bool(false));
        assert_eq!(fields["feature2"], Value::Bool(false));
        assert_eq!(fields["feature3"], Value::Bool(false));
        assert_eq!(fields["feature4"], Value::Bool(true));
    }

    #[test]
    fn test_status_modes_and_temperatures() {
        let fields = decode_status(&status_payload());
        assert_eq!(fields["hour"], Value::Int(14));
        assert_eq!(fields["min"], Value::Int(35));
        assert_eq!(fields["runMode"], Value::Int(0));
        assert_eq!(fields["tempUnits"], Value::Int(1));
        assert_eq!(fields["freezeProtect"], Value::Bool(true));
        assert_eq!(fields["timeout"], Value::Bool(false));
        assert_eq!(fields["heater"], Value::Bool(true));
        assert_eq!(fields["delay"], Value::Bool(true));
        assert_eq!(fields["waterTemp"], Value::Int(78));
        assert_eq!(fields["spaTemp"], Value::Int(101));
        assert_eq!(fields["airTemp"], Value::Int(-2));
        assert_eq!(fields["solarTemp"], Value::Int(90));
        assert_eq!(fields["poolHeaterMode"], Value::Int(2));
        assert_eq!(fields["spaHeaterMode"], Value::Int(1));
    }

    #[test]
    fn test_status_heater_requires_exact_byte() {
        let mut p = status_payload();
        p[10] = 0x0F;
        assert_eq!(decode_status(&p)["heater"], Value::Bool(false));
    }

    #[test]
    fn test_status_short_payload_is_partial() {
        let p = &status_payload()[..4];
        let fields = decode_status(p);
        assert_eq!(fields["pool"], Value::Bool(true));
        assert_eq!(fields["feature4"], Value::Bool(true));
        assert!(!fields.contains_key("runMode"));
        assert!(!fields.contains_key("waterTemp"));
    }

    #[test]
    fn test_status_empty_payload_is_empty() {
        assert!(decode_status(&[]).is_empty());
    }

    #[test]
    fn test_date_time() {
        let fields = decode_date_time(&[9, 5, 0x08, 17, 6, 20, 0, 1]);
        assert_eq!(fields["hour"], Value::Int(9));
        assert_eq!(fields["min"], Value::Int(5));
        assert_eq!(fields["dow"], Value::from("Wednesday"));
        assert_eq!(fields["day"], Value::Int(17));
        assert_eq!(fields["month"], Value::Int(6));
        assert_eq!(fields["year"], Value::Int(20));
        assert_eq!(fields["adjust"], Value::Int(0));
        assert_eq!(fields["dst"], Value::Int(1));
    }

    #[test]
    fn test_date_time_unknown_day_is_skipped() {
        let fields = decode_date_time(&[9, 5, 0x03, 17, 6, 20, 0, 1]);
        assert!(!fields.contains_key("dow"));
        assert_eq!(fields["day"], Value::Int(17));
    }

    #[test]
    fn test_day_name_lookup() {
        assert_eq!(day_name(0x01), Some("Sunday"));
        assert_eq!(day_name(0x40), Some("Saturday"));
        assert_eq!(day_name(0x80), None);
    }

    #[test]
    fn test_temperatures_signed_with_padding() {
        let payload = [0x4C, 0x4C, 0x3D, 0x55, 0x64, 0, 0, 0, 0, 0, 0, 0, 0];
        let fields = decode_temperatures(&payload);
        assert_eq!(fields["waterTemp"], Value::Int(76));
        assert_eq!(fields["spaTemp"], Value::Int(76));
        assert_eq!(fields["airTemp"], Value::Int(61));
        assert_eq!(fields["poolSetTemp"], Value::Int(85));
        assert_eq!(fields["spaSetTemp"], Value::Int(100));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_temperatures_negative_reading() {
        let fields = decode_temperatures(&[0xF6, 0, 0, 0, 0]);
        assert_eq!(fields["waterTemp"], Value::Int(-10));
    }

    #[test]
    fn test_pump_telemetry() {
        // 0A 02 02 03 11 09 60 00 00 ...
        let payload = [0x0A, 0x02, 0x02, 0x03, 0x11, 0x09, 0x60, 0x00, 0x00, 0x00, 0x00];
        let fields = decode_pump_telemetry(&payload);
        assert_eq!(fields["pumpStarted"], Value::Bool(true));
        assert_eq!(fields["pumpMode"], Value::Int(2));
        assert_eq!(fields["pumpState"], Value::Int(2));
        assert_eq!(fields["pumpWatts"], Value::Int(0x0311));
        assert_eq!(fields["pumpRPM"], Value::Int(0x0960));
    }

    #[test]
    fn test_pump_telemetry_truncated_keeps_started_flag() {
        let fields = decode_pump_telemetry(&[0x04, 0x02, 0x02]);
        assert_eq!(fields["pumpStarted"], Value::Bool(false));
        assert!(!fields.contains_key("pumpMode"));
    }

    #[test]
    fn test_pump_status() {
        assert_eq!(decode_pump_status(&[0x0A])["pumpStarted"], Value::Bool(true));
        assert_eq!(decode_pump_status(&[0x04])["pumpStarted"], Value::Bool(false));
    }

    #[test]
    fn test_ping_yields_no_fields() {
        assert!(decode_ping(&[0xFF]).is_empty());
        assert!(decode_ping(&[0x12]).is_empty());
        assert!(decode_ping(&[]).is_empty());
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = DecoderRegistry::standard();
        assert!(registry.contains(STATUS));
        assert!(matches!(
            registry.decode(STATUS, &status_payload()),
            DecodeOutcome::Decoded(f) if f["pool"] == Value::Bool(true)
        ));
        let unknown = PayloadKey::new(0x24, 0x99);
        assert_eq!(
            registry.decode(unknown, &[1, 2, 3]),
            DecodeOutcome::Unmodeled(unknown)
        );
    }

    #[test]
    fn test_registry_register_custom_decoder() {
        fn light(p: &[u8]) -> StatusFragment {
            let mut f = StatusFragment::new();
            if let Some(&b) = p.first() {
                f.insert("lightShow".into(), Value::from(b));
            }
            f
        }
        let key = PayloadKey::new(0x24, 0x60);
        let mut registry = DecoderRegistry::new();
        registry.register(key, light);
        assert_eq!(
            registry.decode(key, &[3]),
            DecodeOutcome::Decoded(
                [("lightShow".to_string(), Value::Int(3))].into_iter().collect()
            )
        );
    }
}

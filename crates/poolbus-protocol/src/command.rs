//! Command encoder registry: desired-state deltas to outbound commands.
//!
//! Two command shapes are supported:
//!
//! - **Circuit change** (`0x86`): `[circuit code, on/off]`.
//! - **Heat change** (`0x88`): `[pool set-point, spa set-point,
//!   (spa mode << 2) | pool mode, 0x00]`.
//!
//! A heat change always carries all four heating parameters, so a delta
//! that touches only one of them is completed from the current
//! [`DeviceState`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::types::{DeviceState, Value};

/// Command code for turning a circuit on or off.
pub const CIRCUIT_CHANGE: u8 = 0x86;

/// Command code for changing set-points and heater modes.
pub const HEAT_CHANGE: u8 = 0x88;

/// Circuit selector names and their wire codes.
pub const CIRCUIT_SELECTORS: [(&str, u8); 10] = [
    ("spa", 0x01),
    ("aux1", 0x02),
    ("aux2", 0x03),
    ("aux3", 0x04),
    ("feature1", 0x05),
    ("pool", 0x06),
    ("feature2", 0x07),
    ("feature3", 0x08),
    ("feature4", 0x09),
    ("heatBoost", 0x85),
];

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// An outbound request. One command becomes exactly one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub message_type: u8,
    pub destination: u8,
    pub source: u8,
    pub command_code: u8,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(
        message_type: u8,
        destination: u8,
        source: u8,
        command_code: u8,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            message_type,
            destination,
            source,
            command_code,
            payload,
        }
    }
}

/// Addressing used for every command the registry builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefaults {
    pub message_type: u8,
    /// The controller that executes the command.
    pub destination: u8,
    /// This device's own bus address.
    pub source: u8,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            message_type: 0x24,
            destination: 0x10,
            source: 0x21,
        }
    }
}

// ---------------------------------------------------------------------------
// Heating
// ---------------------------------------------------------------------------

/// Heat source selection, two bits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaterMode {
    Off = 0,
    Heater = 1,
    Solar = 2,
    SolarPreferred = 3,
}

impl TryFrom<u8> for HeaterMode {
    type Error = u8;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            0 => Ok(Self::Off),
            1 => Ok(Self::Heater),
            2 => Ok(Self::Solar),
            3 => Ok(Self::SolarPreferred),
            other => Err(other),
        }
    }
}

/// One of the four parameters carried by a heat change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeatParam {
    PoolSetTemp,
    SpaSetTemp,
    PoolHeaterMode,
    SpaHeaterMode,
}

impl HeatParam {
    pub const ALL: [HeatParam; 4] = [
        Self::PoolSetTemp,
        Self::SpaSetTemp,
        Self::PoolHeaterMode,
        Self::SpaHeaterMode,
    ];

    /// Selector name, identical to the device-state field name.
    pub fn name(self) -> &'static str {
        match self {
            Self::PoolSetTemp => "poolSetTemp",
            Self::SpaSetTemp => "spaSetTemp",
            Self::PoolHeaterMode => "poolHeaterMode",
            Self::SpaHeaterMode => "spaHeaterMode",
        }
    }
}

impl fmt::Display for HeatParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A complete set of heating parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatSettings {
    pub pool_set_point: u8,
    pub spa_set_point: u8,
    pub pool_mode: HeaterMode,
    pub spa_mode: HeaterMode,
}

impl HeatSettings {
    /// Fills each parameter from `overrides` first, then from `current`.
    pub fn resolve(
        overrides: &[(HeatParam, &Value)],
        current: &DeviceState,
    ) -> Result<Self, CommandError> {
        let byte = |param: HeatParam| -> Result<u8, CommandError> {
            let value = overrides
                .iter()
                .rev()
                .find(|(p, _)| *p == param)
                .map(|(_, v)| *v)
                .or_else(|| current.get(param.name()))
                .ok_or(CommandError::MissingParameter(param.name()))?;
            value.as_u8().ok_or_else(|| CommandError::InvalidValue {
                selector: param.name().to_string(),
                reason: format!("expected an integer 0-255, got {value}"),
            })
        };
        let mode = |param: HeatParam| -> Result<HeaterMode, CommandError> {
            HeaterMode::try_from(byte(param)?).map_err(|bits| CommandError::InvalidValue {
                selector: param.name().to_string(),
                reason: format!("heater mode must be 0-3, got {bits}"),
            })
        };

        Ok(Self {
            pool_set_point: byte(HeatParam::PoolSetTemp)?,
            spa_set_point: byte(HeatParam::SpaSetTemp)?,
            pool_mode: mode(HeatParam::PoolHeaterMode)?,
            spa_mode: mode(HeatParam::SpaHeaterMode)?,
        })
    }

    /// The four-byte heat-change payload.
    pub fn payload(&self) -> [u8; 4] {
        let modes = ((self.spa_mode as u8) << 2) | self.pool_mode as u8;
        [self.pool_set_point, self.spa_set_point, modes, 0x00]
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// What a selector name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// A circuit toggle with its wire code.
    Circuit(u8),
    /// One of the heating parameters.
    Heat(HeatParam),
}

/// Maps selector names to command builders.
#[derive(Debug, Clone)]
pub struct EncoderRegistry {
    defaults: CommandDefaults,
    selectors: HashMap<String, Selector>,
}

impl EncoderRegistry {
    /// An empty registry.
    pub fn new(defaults: CommandDefaults) -> Self {
        Self {
            defaults,
            selectors: HashMap::new(),
        }
    }

    /// Every circuit and heating selector the controller understands.
    pub fn standard(defaults: CommandDefaults) -> Self {
        let mut registry = Self::new(defaults);
        for (name, code) in CIRCUIT_SELECTORS {
            registry.register(name, Selector::Circuit(code));
        }
        for param in HeatParam::ALL {
            registry.register(param.name(), Selector::Heat(param));
        }
        registry
    }

    /// Adds or replaces a selector.
    pub fn register(&mut self, name: &str, selector: Selector) {
        self.selectors.insert(name.to_string(), selector);
    }

    pub fn defaults(&self) -> CommandDefaults {
        self.defaults
    }

    /// Resolves a selector name.
    pub fn lookup(&self, name: &str) -> Result<Selector, CommandError> {
        self.selectors
            .get(name)
            .copied()
            .ok_or_else(|| CommandError::UnknownSelector(name.to_string()))
    }

    /// Builds the command for a single delta.
    pub fn build(
        &self,
        name: &str,
        value: &Value,
        current: &DeviceState,
    ) -> Result<Command, CommandError> {
        match self.lookup(name)? {
            Selector::Circuit(code) => {
                let on = value.as_bool().ok_or_else(|| CommandError::InvalidValue {
                    selector: name.to_string(),
                    reason: format!("expected a boolean, got {value}"),
                })?;
                Ok(self.circuit_command(code, on))
            }
            Selector::Heat(param) => self.heat_command(&[(param, value)], current),
        }
    }

    /// `[code, 0x01 | 0x00]` addressed with the registry defaults.
    pub fn circuit_command(&self, code: u8, on: bool) -> Command {
        self.command(CIRCUIT_CHANGE, vec![code, u8::from(on)])
    }

    /// A heat change combining `overrides` with the current state.
    pub fn heat_command(
        &self,
        overrides: &[(HeatParam, &Value)],
        current: &DeviceState,
    ) -> Result<Command, CommandError> {
        let settings = HeatSettings::resolve(overrides, current)?;
        Ok(self.command(HEAT_CHANGE, settings.payload().to_vec()))
    }

    fn command(&self, code: u8, payload: Vec<u8>) -> Command {
        Command::new(
            self.defaults.message_type,
            self.defaults.destination,
            self.defaults.source,
            code,
            payload,
        )
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::standard(CommandDefaults::default())
    }
}

//! Command direction: desired-state deltas in, one write's worth of
//! bytes out.
//!
//! Circuit deltas become one circuit-change command each. Every heating
//! delta in the batch is folded into a single heat-change command, with
//! the parameters the batch does not mention taken from the current
//! device state. A delta that fails to encode is reported in
//! [`EncodedBatch::failures`] and the rest of the batch still goes out.

use poolbus_protocol::{
    Command, CommandError, DesiredState, DeviceState, EncoderRegistry, HeatParam, Selector, Value,
    frame,
};
use tracing::{debug, trace};

/// The result of encoding one batch of deltas.
#[derive(Debug, Clone, Default)]
pub struct EncodedBatch {
    /// Every successfully built frame, separator-bracketed and
    /// concatenated.
    pub bytes: Vec<u8>,
    /// The commands behind `bytes`, in write order.
    pub commands: Vec<Command>,
    /// Deltas that could not be encoded, by selector name.
    pub failures: Vec<(String, CommandError)>,
}

impl EncodedBatch {
    /// Nothing to write.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Turns desired-state deltas into wire bytes using an encoder registry.
#[derive(Debug, Clone, Copy)]
pub struct ReversePipeline<'a> {
    encoders: &'a EncoderRegistry,
}

impl<'a> ReversePipeline<'a> {
    pub fn new(encoders: &'a EncoderRegistry) -> Self {
        Self { encoders }
    }

    /// Encodes `desired` against `current`.
    pub fn encode(&self, desired: &DesiredState, current: &DeviceState) -> EncodedBatch {
        let mut batch = EncodedBatch::default();
        let mut heat: Vec<(HeatParam, &Value)> = Vec::new();

        for (name, value) in desired {
            match self.encoders.lookup(name) {
                Ok(Selector::Circuit(_)) => match self.encoders.build(name, value, current) {
                    Ok(command) => push(&mut batch, name, command),
                    Err(err) => fail(&mut batch, name, err),
                },
                Ok(Selector::Heat(param)) => heat.push((param, value)),
                Err(err) => fail(&mut batch, name, err),
            }
        }

        if !heat.is_empty() {
            match self.encoders.heat_command(&heat, current) {
                Ok(command) => {
                    let names = heat_names(&heat);
                    push(&mut batch, &names, command);
                }
                Err(err) => {
                    for (param, _) in &heat {
                        fail(&mut batch, param.name(), err.clone());
                    }
                }
            }
        }

        batch
    }
}

fn push(batch: &mut EncodedBatch, name: &str, command: Command) {
    match frame::serialize_frame(&command) {
        Ok(bytes) => {
            trace!(selector = name, code = command.command_code, "command encoded");
            batch.bytes.extend_from_slice(&bytes);
            batch.commands.push(command);
        }
        Err(err) => fail(batch, name, err.into()),
    }
}

fn fail(batch: &mut EncodedBatch, name: &str, err: CommandError) {
    debug!(selector = name, error = %err, "delta not encoded");
    batch.failures.push((name.to_string(), err));
}

fn heat_names(heat: &[(HeatParam, &Value)]) -> String {
    heat.iter()
        .map(|(param, _)| param.name())
        .collect::<Vec<_>>()
        .join(",")
}

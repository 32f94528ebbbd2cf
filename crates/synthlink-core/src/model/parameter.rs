// ── Parameter domain type ──

use serde::Serialize;

/// Highest value a MIDI data byte can carry.
pub const MAX_VALUE: u8 = 127;

/// A single synthesizer parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    /// Slash-delimited hierarchical address, unique within the table.
    pub address: String,
    /// Display label derived from the address; never authoritative.
    pub caption: String,
    pub value: u8,
}

impl Parameter {
    /// Build a parameter, deriving the caption and clamping the value.
    pub fn new(address: impl Into<String>, value: u8) -> Self {
        let address = address.into();
        let caption = caption_for(&address).to_owned();
        Self {
            address,
            caption,
            value: clamp_value(value),
        }
    }
}

/// Last path segment of an address; the whole address if it has no `/`.
pub fn caption_for(address: &str) -> &str {
    address
        .rsplit_once('/')
        .map_or(address, |(_, last)| last)
}

/// Clamp a wire value into the MIDI data range.
pub(crate) fn clamp_value(value: u8) -> u8 {
    if value > MAX_VALUE {
        tracing::debug!(value, "clamping out-of-range parameter value");
    }
    value.min(MAX_VALUE)
}

/// A store mutation of a single parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterChange {
    pub address: String,
    pub old: u8,
    pub new: u8,
}

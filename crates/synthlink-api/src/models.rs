// Wire types for the controller's HTTP and WebSocket surfaces.
//
// These mirror the JSON the controller actually emits. Domain types live
// in synthlink-core; nothing here derives captions or enforces selection
// invariants.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ── Devices ──────────────────────────────────────────────────────────

/// Direction of a MIDI port as seen by the controller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PortDirection {
    Input,
    Output,
}

/// A single MIDI port entry from `GET api/devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiPort {
    pub name: String,

    /// Advisory `type` label. Some controller builds tag every port as
    /// `INPUT`, so consumers should trust the list a port arrived in.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Response body of `GET api/devices`. Order is enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceListing {
    #[serde(default)]
    pub inputs: Vec<MidiPort>,
    #[serde(default)]
    pub outputs: Vec<MidiPort>,
}

// ── Parameters ───────────────────────────────────────────────────────

/// An `{address, value}` pair. Used for the `GET api/parameters` elements
/// and as the outbound WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub address: String,
    pub value: u8,
}

impl ParameterValue {
    pub fn new(address: impl Into<String>, value: u8) -> Self {
        Self {
            address: address.into(),
            value,
        }
    }
}

/// `GET api/parameters` has been served both as an array and as an
/// object keyed by address. Both collapse into an ordered sequence.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ParametersPayload {
    List(Vec<ParameterValue>),
    Keyed(IndexMap<String, u8>),
}

impl ParametersPayload {
    pub(crate) fn into_values(self) -> Vec<ParameterValue> {
        match self {
            Self::List(values) => values,
            Self::Keyed(map) => map
                .into_iter()
                .map(|(address, value)| ParameterValue { address, value })
                .collect(),
        }
    }
}

// ── Inbound WebSocket events ─────────────────────────────────────────

/// An event pushed by the controller over the duplex channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The controller's view of a parameter changed (hardware echo).
    ParamEcho { address: String, value: u8 },
    /// Bulk refresh progress, percent in `0..=100` (not clamped here).
    Progress { percent: f64 },
}

/// Raw frame shape: `{"type": "...", ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireFrame {
    Progress {
        msg: serde_json::Value,
    },
    Parameter {
        address: String,
        value: u8,
    },
    /// Keep-alive chatter ("Hello from server").
    Info,
    #[serde(other)]
    Unknown,
}

impl InboundEvent {
    /// Parse a text frame.
    ///
    /// Returns `Ok(None)` for frame kinds this client does not consume
    /// (`INFO` and unrecognized `type` values), and
    /// [`Error::MalformedMessage`] when the frame is not JSON, has no
    /// `type`, or carries an unparseable payload.
    pub fn parse(text: &str) -> Result<Option<Self>, Error> {
        let frame: WireFrame = serde_json::from_str(text).map_err(|e| malformed(e.to_string(), text))?;

        match frame {
            WireFrame::Progress { msg } => {
                let percent = parse_percent(&msg)
                    .ok_or_else(|| malformed(format!("non-numeric progress {msg}"), text))?;
                Ok(Some(Self::Progress { percent }))
            }
            WireFrame::Parameter { address, value } => Ok(Some(Self::ParamEcho { address, value })),
            WireFrame::Info | WireFrame::Unknown => Ok(None),
        }
    }
}

/// Progress arrives string-encoded (`"45"`); bare numbers are tolerated.
fn parse_percent(msg: &serde_json::Value) -> Option<f64> {
    let percent = match msg {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    percent.is_finite().then_some(percent)
}

fn malformed(message: String, raw: &str) -> Error {
    Error::MalformedMessage {
        message,
        raw: raw.to_owned(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

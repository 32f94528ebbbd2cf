//! Async client for a synthesizer editor controller.
//!
//! The controller exposes two surfaces:
//!
//! - **HTTP** ([`EditorClient`]) -- device discovery, device selection,
//!   the parameter table, and the bulk hardware refresh trigger.
//! - **WebSocket** ([`websocket`]) -- a duplex channel carrying parameter
//!   writes out and progress / parameter echoes in.
//!
//! [`Transport`] bundles both behind a single trait; [`LiveTransport`] is
//! the production implementation.

pub mod client;
pub mod error;
pub mod live;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::EditorClient;
pub use error::Error;
pub use live::LiveTransport;
pub use models::{DeviceListing, InboundEvent, MidiPort, ParameterValue, PortDirection};
pub use transport::{ConnectionState, Transport, TransportConfig};
pub use websocket::{ReconnectConfig, WebSocketHandle};

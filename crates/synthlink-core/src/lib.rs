//! Parameter state synchronization for a synthesizer editor.
//!
//! A [`Session`] mirrors the controller's parameter table and MIDI device
//! lists into an in-memory [`ParameterStore`], pushes local edits out over
//! the duplex channel, and reconciles inbound echoes without feeding them
//! back. All mutable state lives on one actor task; consumers observe it
//! through `watch` snapshots.
//!
//! ```rust,ignore
//! use synthlink_core::{Session, SessionConfig};
//!
//! let session = Session::live(SessionConfig::new("http://localhost:8080/".parse()?))?;
//! session.start().await?;
//! session.set_parameter("synth/env/attack", 64).await?;
//! let report = session.refresh().await?;
//! session.shutdown().await;
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod refresh;
pub mod selector;
pub mod session;
pub mod store;
pub mod sync;

pub use command::{Command, CommandResult};
pub use config::SessionConfig;
pub use error::CoreError;
pub use model::{Device, DeviceLists, Direction, MAX_VALUE, Parameter, ParameterChange, SelectionState};
pub use refresh::{RefreshCoordinator, RefreshOutcome, RefreshReport, RefreshState};
pub use selector::{DeviceSelector, SelectionRequest};
pub use session::{LiveSession, Session, SessionEvent};
pub use store::{ParameterStore, StoreReaders};
pub use sync::{EchoOutcome, SendOutcome, SyncController};

pub use synthlink_api::{ConnectionState, LiveTransport, ReconnectConfig, Transport};

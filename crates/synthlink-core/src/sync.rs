// ── Parameter synchronization ──
//
// Bridges store mutations and the duplex channel. Local edits go out as
// `{address, value}` frames; inbound echoes are applied to the store
// through the same change path with a one-shot suppression flag so they
// never bounce back to the controller.

use std::collections::HashMap;

use synthlink_api::{ParameterValue, Transport};
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::model::ParameterChange;
use crate::model::parameter::clamp_value;
use crate::store::ParameterStore;

/// Per-address bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
struct AddressSync {
    last_sent: Option<u8>,
    last_received: Option<u8>,
    /// Consumed by the next store change for this address.
    suppress_next: bool,
}

/// What happened to a store change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A frame was queued on the duplex channel.
    Sent,
    /// The controller already holds this value.
    Unchanged,
    /// The change came from an inbound echo.
    Suppressed,
}

/// What happened to an inbound echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    Applied,
    Unchanged,
    UnknownAddress,
}

#[derive(Debug, Default)]
pub struct SyncController {
    per_address: HashMap<String, AddressSync>,
}

impl SyncController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a store change outward.
    ///
    /// Sends when the value differs from what this client last sent, or
    /// when the controller last reported something else. `last_sent` is
    /// recorded only after the frame was queued.
    pub fn on_store_change<T: Transport>(
        &mut self,
        change: &ParameterChange,
        transport: &T,
    ) -> Result<SendOutcome, CoreError> {
        let entry = self.per_address.entry(change.address.clone()).or_default();

        if entry.suppress_next {
            entry.suppress_next = false;
            trace!(address = %change.address, value = change.new, "echo applied, not sending");
            return Ok(SendOutcome::Suppressed);
        }

        let controller_agrees = entry.last_received.is_none_or(|r| r == change.new);
        if entry.last_sent == Some(change.new) && controller_agrees {
            trace!(address = %change.address, value = change.new, "value already sent");
            return Ok(SendOutcome::Unchanged);
        }

        transport.send(&ParameterValue::new(change.address.as_str(), change.new))?;
        debug!(address = %change.address, value = change.new, "parameter sent");

        entry.last_sent = Some(change.new);
        Ok(SendOutcome::Sent)
    }

    /// Reconcile an inbound echo into the store without sending anything.
    pub fn apply_echo<T: Transport>(
        &mut self,
        store: &mut ParameterStore,
        address: &str,
        value: u8,
        transport: &T,
    ) -> Result<EchoOutcome, CoreError> {
        let value = clamp_value(value);
        let Some(current) = store.get(address).map(|p| p.value) else {
            warn!(address, value, "echo for unknown parameter dropped");
            return Ok(EchoOutcome::UnknownAddress);
        };

        let entry = self.per_address.entry(address.to_owned()).or_default();
        entry.last_received = Some(value);

        if current == value {
            return Ok(EchoOutcome::Unchanged);
        }

        let Some(change) = store.set_value(address, value) else {
            return Ok(EchoOutcome::Unchanged);
        };
        entry.suppress_next = true;
        debug!(address, value, "echo applied");
        self.on_store_change(&change, transport)?;
        Ok(EchoOutcome::Applied)
    }

    #[cfg(test)]
    fn last_received(&self, address: &str) -> Option<u8> {
        self.per_address.get(address).and_then(|e| e.last_received)
    }

    #[cfg(test)]
    fn last_sent(&self, address: &str) -> Option<u8> {
        self.per_address.get(address).and_then(|e| e.last_sent)
    }

    /// Forget all bookkeeping, after the table was replaced wholesale.
    pub fn reset(&mut self) {
        self.per_address.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use synthlink_api::{ConnectionState, DeviceListing, Error, InboundEvent};
    use tokio::sync::{mpsc, watch};

    use super::*;

    /// Records sends; can be flipped to disconnected.
    struct Recorder {
        sent: Mutex<Vec<ParameterValue>>,
        connected: bool,
    }

    impl Recorder {
        fn connected() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                connected: true,
            }
        }

        fn sent(&self) -> Vec<ParameterValue> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for Recorder {
        async fn fetch_devices(&self) -> Result<DeviceListing, Error> {
            Ok(DeviceListing::default())
        }
        async fn fetch_parameters(&self) -> Result<Vec<ParameterValue>, Error> {
            Ok(Vec::new())
        }
        async fn request_refresh(&self) -> Result<(), Error> {
            Ok(())
        }
        async fn select_input(&self, _name: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn select_output(&self, _name: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn connect(&self) -> Result<(), Error> {
            Ok(())
        }
        fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundEvent>> {
            None
        }
        fn send(&self, update: &ParameterValue) -> Result<(), Error> {
            if !self.connected {
                return Err(Error::NotConnected);
            }
            self.sent.lock().unwrap().push(update.clone());
            Ok(())
        }
        async fn close(&self) {}
        fn connection_state(&self) -> watch::Receiver<ConnectionState> {
            watch::channel(ConnectionState::Connected).1
        }
    }

    const ATTACK: &str = "synth/env/attack";

    fn store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.set_parameters(vec![
            ParameterValue::new(ATTACK, 0),
            ParameterValue::new("synth/osc1/level", 100),
        ]);
        store
    }

    fn local_edit(
        sync: &mut SyncController,
        store: &mut ParameterStore,
        transport: &Recorder,
        value: u8,
    ) -> Option<SendOutcome> {
        let change = store.set_value(ATTACK, value)?;
        Some(sync.on_store_change(&change, transport).unwrap())
    }

    #[test]
    fn local_edit_sends_once() {
        let transport = Recorder::connected();
        let mut store = store();
        let mut sync = SyncController::new();

        assert_eq!(
            local_edit(&mut sync, &mut store, &transport, 12),
            Some(SendOutcome::Sent)
        );
        assert_eq!(transport.sent(), vec![ParameterValue::new(ATTACK, 12)]);
        assert_eq!(sync.last_sent(ATTACK), Some(12));
    }

    #[test]
    fn echoes_never_send() {
        let transport = Recorder::connected();
        let mut store = store();
        let mut sync = SyncController::new();

        for value in [5, 9, 9, 127, 0, 64] {
            sync.apply_echo(&mut store, ATTACK, value, &transport).unwrap();
        }

        assert!(transport.sent().is_empty());
        assert_eq!(store.get(ATTACK).unwrap().value, 64);
        assert_eq!(sync.last_received(ATTACK), Some(64));
    }

    #[test]
    fn equal_echo_leaves_no_flag_armed() {
        let transport = Recorder::connected();
        let mut store = store();
        let mut sync = SyncController::new();

        // Store already holds 0.
        assert_eq!(
            sync.apply_echo(&mut store, ATTACK, 0, &transport).unwrap(),
            EchoOutcome::Unchanged
        );

        // The next local edit must not be swallowed.
        assert_eq!(
            local_edit(&mut sync, &mut store, &transport, 30),
            Some(SendOutcome::Sent)
        );
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn edit_back_to_sent_value_after_echo_is_sent() {
        let transport = Recorder::connected();
        let mut store = store();
        let mut sync = SyncController::new();

        local_edit(&mut sync, &mut store, &transport, 5);
        sync.apply_echo(&mut store, ATTACK, 7, &transport).unwrap();
        assert_eq!(store.get(ATTACK).unwrap().value, 7);

        // Controller now holds 7; restoring 5 must reach it.
        assert_eq!(
            local_edit(&mut sync, &mut store, &transport, 5),
            Some(SendOutcome::Sent)
        );
        assert_eq!(
            transport.sent(),
            vec![ParameterValue::new(ATTACK, 5), ParameterValue::new(ATTACK, 5)]
        );
    }

    #[test]
    fn unknown_address_echo_is_dropped() {
        let transport = Recorder::connected();
        let mut store = store();
        let mut sync = SyncController::new();

        let outcome = sync
            .apply_echo(&mut store, "synth/lfo/rate", 3, &transport)
            .unwrap();

        assert_eq!(outcome, EchoOutcome::UnknownAddress);
        assert!(store.get("synth/lfo/rate").is_none());
    }

    #[test]
    fn echo_values_are_clamped() {
        let transport = Recorder::connected();
        let mut store = store();
        let mut sync = SyncController::new();

        sync.apply_echo(&mut store, ATTACK, 200, &transport).unwrap();

        assert_eq!(store.get(ATTACK).unwrap().value, 127);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn failed_send_does_not_record_last_sent() {
        let transport = Recorder {
            sent: Mutex::new(Vec::new()),
            connected: false,
        };
        let mut store = store();
        let mut sync = SyncController::new();

        let change = store.set_value(ATTACK, 12).unwrap();
        let err = sync.on_store_change(&change, &transport).unwrap_err();

        assert!(matches!(err, CoreError::NotConnected));
        assert_eq!(sync.last_sent(ATTACK), None);
        // The local value stays put.
        assert_eq!(store.get(ATTACK).unwrap().value, 12);
    }
}

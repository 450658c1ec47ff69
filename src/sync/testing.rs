//! In-memory relay bridge for engine tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::bridge::{BridgeLaunch, RelayBridge};
use super::error::BridgeError;
use super::protocol::RelayRequest;

/// Records every request instead of talking to a relay.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    sent: Mutex<Vec<RelayRequest>>,
    launches: Mutex<Vec<BridgeLaunch>>,
    stops: AtomicUsize,
    fail_sends: AtomicBool,
    connected: AtomicBool,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<RelayRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn take_sent(&self) -> Vec<RelayRequest> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(RelayRequest::name).collect()
    }

    pub fn launches(&self) -> Vec<BridgeLaunch> {
        self.launches.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Simulates the relay closing the socket; sends fail until restarted.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RelayBridge for RecordingBridge {
    async fn start(&self, launch: &BridgeLaunch) -> Result<(), BridgeError> {
        self.launches.lock().unwrap().push(launch.clone());
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BridgeError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, request: RelayRequest) -> Result<(), BridgeError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BridgeError::NotConnected);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::Closed);
        }
        self.sent.lock().unwrap().push(request);
        Ok(())
    }
}

//! Readiness state machine.
//!
//! The relay acknowledges each of its sub-channels once. Traffic is gated
//! until all eight have been seen, at which point a latch fires and stays
//! set until the group is left. Callers that need readiness queue a
//! oneshot and are released in FIFO order when the latch fires.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use super::error::SyncError;

/// Relay sub-channels that must each acknowledge once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    SyncReady,
    FetchRecords,
    SendRecords,
    FetchDevices,
    ResolveRecords,
    DeleteUser,
    DeleteSiteSettings,
    DeleteCategory,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::SyncReady,
        Channel::FetchRecords,
        Channel::SendRecords,
        Channel::FetchDevices,
        Channel::ResolveRecords,
        Channel::DeleteUser,
        Channel::DeleteSiteSettings,
        Channel::DeleteCategory,
    ];

    /// Inbound message name acknowledging this channel.
    pub fn message_name(&self) -> &'static str {
        match self {
            Channel::SyncReady => "sync-ready",
            Channel::FetchRecords => "fetch-sync-records",
            Channel::SendRecords => "send-sync-records",
            Channel::FetchDevices => "fetch-sync-devices",
            Channel::ResolveRecords => "resolve-sync-records",
            Channel::DeleteUser => "delete-sync-user",
            Channel::DeleteSiteSettings => "delete-sync-site-settings",
            Channel::DeleteCategory => "delete-sync-category",
        }
    }

    pub fn from_message_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ch| ch.message_name() == name)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// One flag per channel, packed into a byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessVector(u8);

impl ReadinessVector {
    const FULL: u8 = u8::MAX;

    pub fn set(&mut self, channel: Channel) {
        self.0 |= channel.bit();
    }

    pub fn is_set(&self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    pub fn all_ready(&self) -> bool {
        self.0 == Self::FULL
    }

    pub fn missing(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|ch| !self.is_set(*ch))
            .collect()
    }
}

/// Result of recording a channel acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Other channels are still outstanding.
    Pending,
    /// This acknowledgement fired the latch.
    BecameReady,
    /// The latch was already set.
    AlreadyReady,
}

#[derive(Debug, Default)]
struct State {
    flags: ReadinessVector,
    latched: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
pub struct Readiness {
    state: Mutex<State>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, channel: Channel) -> MarkOutcome {
        let mut state = self.lock();
        if state.latched {
            return MarkOutcome::AlreadyReady;
        }

        state.flags.set(channel);
        if !state.flags.all_ready() {
            return MarkOutcome::Pending;
        }

        state.latched = true;
        while let Some(waiter) = state.waiters.pop_front() {
            // A dropped receiver just means the caller gave up.
            let _ = waiter.send(());
        }
        MarkOutcome::BecameReady
    }

    pub fn is_ready(&self) -> bool {
        self.lock().latched
    }

    pub fn flags(&self) -> ReadinessVector {
        self.lock().flags
    }

    /// Resolves once the latch is set, or fails with `Cancelled` if the
    /// state is reset first.
    pub async fn wait_ready(&self) -> Result<(), SyncError> {
        let rx = {
            let mut state = self.lock();
            if state.latched {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        rx.await.map_err(|_| SyncError::Cancelled)
    }

    /// Clears every flag and the latch. Pending waiters are cancelled.
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = State::default();
    }

    /// Clears the flags and the latch for a new handshake on the same group.
    /// Pending waiters stay queued for the next latch.
    pub fn restart(&self) {
        let mut state = self.lock();
        state.flags = ReadinessVector::default();
        state.latched = false;
    }
}

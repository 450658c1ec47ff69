//! The sync engine façade.
//!
//! One explicitly owned [`SyncEngine`] per store. Outbound work waits on the
//! readiness latch; inbound relay events are fed through
//! [`SyncEngine::handle_event`], usually by [`SyncEngine::run`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::bridge::{BridgeLaunch, RelayBridge};
use super::codec::{from_wire_records, to_wire_record, Syncable};
use super::cursor::{self, FetchProgress};
use super::devices::DeviceRegistry;
use super::error::SyncError;
use super::identity::Identity;
use super::protocol::{ClientConfig, RelayEvent, API_VERSION};
use super::readiness::{Channel, MarkOutcome, Readiness};
use super::reconcile::{self, ApplyOutcome};
use super::record::{SyncAction, SyncCategory};
use super::seed::SyncSeed;
use crate::db::Store;
use crate::models::{Device, ObjectId};

const DEFAULT_DEVICE_NAME: &str = "seedsync device";

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the background bookmark fetch.
    pub fetch_interval: Duration,
    /// Maximum records per fetched page.
    pub page_size: u32,
    /// How long `join_group` waits for the relay handshake.
    pub pairing_timeout: Duration,
    /// After this long an unanswered fetch no longer blocks the next one.
    pub in_flight_timeout: Duration,
    /// Announced to the relay in `got-init-data`.
    pub server_url: String,
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(30),
            page_size: 300,
            pairing_timeout: Duration::from_secs(25),
            in_flight_timeout: Duration::from_secs(90),
            server_url: String::new(),
            debug: false,
        }
    }
}

/// Notifications for the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The readiness latch fired.
    Ready,
    DeviceRemoved {
        object_id: ObjectId,
    },
    /// Another device removed this one from the group.
    CurrentDeviceRemoved,
    RecordsApplied {
        category: SyncCategory,
        created: usize,
        updated: usize,
        deleted: usize,
    },
    SetupError(String),
    PairingFailed,
    GroupLeft,
}

#[derive(Default)]
struct EngineState {
    /// A relay connection was requested; cleared on leave and shutdown.
    online: bool,
    started: bool,
    pending_new_group: bool,
    /// Bumped on leave; batches that started under an older epoch are discarded.
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    in_flight: HashMap<SyncCategory, Instant>,
    progress: HashMap<SyncCategory, FetchProgress>,
}

pub struct SyncEngine<B: RelayBridge + 'static> {
    me: Weak<SyncEngine<B>>,
    bridge: Arc<B>,
    store: Store,
    identity: Identity,
    devices: DeviceRegistry,
    readiness: Readiness,
    config: EngineConfig,
    state: Mutex<EngineState>,
    /// Serializes batch application against leave.
    apply_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SyncEvent>,
}

impl<B: RelayBridge + 'static> SyncEngine<B> {
    pub fn new(bridge: Arc<B>, store: Store, identity: Identity, config: EngineConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            bridge,
            devices: DeviceRegistry::new(store.clone()),
            store,
            identity,
            readiness: Readiness::new(),
            config,
            state: Mutex::new(EngineState::default()),
            apply_lock: tokio::sync::Mutex::new(()),
            events,
        })
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn bridge(&self) -> &Arc<B> {
        &self.bridge
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_in_group(&self) -> bool {
        self.identity.is_in_group()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn pending_channels(&self) -> Vec<Channel> {
        self.readiness.flags().missing()
    }

    /// Persisted bookmarks cursor.
    pub async fn last_successful_sync(&self) -> Result<i64, SyncError> {
        Ok(cursor::load(&self.store.preferences()).await?)
    }

    pub async fn devices(&self) -> Result<Vec<Device>, SyncError> {
        self.devices.list().await
    }

    // ==================== Lifecycle ====================

    /// Bootstrap entry point, safe to call on every start.
    ///
    /// A seed is only stored if the device is not in a group yet. The relay
    /// is contacted only when a seed is present.
    pub async fn initialize_sync(
        &self,
        seed: Option<&[u8]>,
        device_name: Option<&str>,
    ) -> Result<(), SyncError> {
        if let Some(name) = device_name {
            self.identity.set_device_name(name).await?;
        }

        if let Some(bytes) = seed {
            let seed = SyncSeed::try_from(bytes)?;
            self.identity.join(seed).await?;
        }

        if !self.identity.is_in_group() {
            debug!("Not in a sync group, relay not contacted");
            return Ok(());
        }

        self.ensure_current_device().await?;
        if self.reconnect_if_dropped().await? {
            return Ok(());
        }
        self.start_bridge().await
    }

    /// Starts the handshake for a brand-new group.
    ///
    /// Returns false without doing anything if already in a group. The relay
    /// allocates the seed and delivers it with `save-init-data`.
    pub async fn initialize_new_group(&self, device_name: &str) -> Result<bool, SyncError> {
        if self.identity.is_in_group() {
            warn!("Already in a sync group, not creating a new one");
            return Ok(false);
        }

        self.identity.set_device_name(device_name).await?;
        self.state().pending_new_group = true;
        self.start_bridge().await?;
        info!(device = device_name, "Creating new sync group");
        Ok(true)
    }

    /// Joins an existing group and waits for the relay to pair this device.
    pub async fn join_group(&self, seed: &[u8], device_name: &str) -> Result<(), SyncError> {
        self.initialize_sync(Some(seed), Some(device_name)).await?;
        self.wait_until_ready().await
    }

    /// Waits for the readiness latch, bounded by the pairing timeout.
    pub async fn wait_until_ready(&self) -> Result<(), SyncError> {
        match tokio::time::timeout(self.config.pairing_timeout, self.readiness.wait_ready()).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.config.pairing_timeout, "Device pairing timed out");
                self.emit(SyncEvent::PairingFailed);
                Err(SyncError::PairingTimeout(self.config.pairing_timeout))
            }
        }
    }

    /// Leaves the group and resets all sync state. Idempotent.
    pub async fn leave_group(&self) -> Result<(), SyncError> {
        let _apply = self.apply_lock.lock().await;

        let (was_active, timer) = {
            let mut state = self.state();
            let was_active = state.started || state.pending_new_group;
            state.epoch += 1;
            state.online = false;
            state.started = false;
            state.pending_new_group = false;
            state.in_flight.clear();
            state.progress.clear();
            (was_active, state.timer.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }

        if !was_active && !self.identity.is_in_group() {
            debug!("Not in a sync group, nothing to leave");
            return Ok(());
        }

        self.readiness.reset();
        if let Err(e) = self.bridge.stop().await {
            warn!(error = %e, "Failed to stop relay bridge");
        }

        self.identity.clear().await?;
        let purged = self.devices.purge().await?;
        cursor::reset(&self.store.preferences()).await?;

        info!(purged, "Left sync group");
        self.emit(SyncEvent::GroupLeft);
        Ok(())
    }

    /// Stops background work without leaving the group.
    pub async fn shutdown(&self) {
        let timer = {
            let mut state = self.state();
            state.online = false;
            state.started = false;
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        self.readiness.reset();
        if let Err(e) = self.bridge.stop().await {
            warn!(error = %e, "Failed to stop relay bridge");
        }
    }

    async fn start_bridge(&self) -> Result<(), SyncError> {
        {
            let mut state = self.state();
            state.online = true;
            if state.started {
                return Ok(());
            }
        }

        let device_name = self.device_name().await?;
        let launch = BridgeLaunch {
            fingerprint: self.identity.seed()?.map(|seed| seed.fingerprint()),
            device_name,
        };
        self.bridge.start(&launch).await?;
        self.state().started = true;
        Ok(())
    }

    /// Reopens the relay connection if it went away while online.
    ///
    /// The handshake runs again, so the latch is cleared; callers already
    /// waiting on readiness stay queued. Returns whether a reconnect was
    /// attempted.
    async fn reconnect_if_dropped(&self) -> Result<bool, SyncError> {
        let online = self.state().online;
        if !online || self.bridge.is_connected().await {
            return Ok(false);
        }

        warn!("Relay connection lost, reconnecting");
        {
            let mut state = self.state();
            state.started = false;
            // Requests sent on the old connection will never be answered.
            state.in_flight.clear();
            state.progress.clear();
        }
        self.readiness.restart();
        self.start_bridge().await?;
        Ok(true)
    }

    async fn device_name(&self) -> Result<String, SyncError> {
        Ok(self
            .identity
            .device_name()
            .await?
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()))
    }

    async fn ensure_current_device(&self) -> Result<Device, SyncError> {
        let name = self.device_name().await?;
        let device_id = self.identity.device_id().await?;
        self.devices.current_device(&name, device_id.as_ref()).await
    }

    // ==================== Outbound ====================

    /// Pushes local changes. No-op for an empty list or outside a group;
    /// otherwise waits for readiness first.
    pub async fn send_records<T: Syncable>(
        &self,
        action: SyncAction,
        entities: &[T],
    ) -> Result<(), SyncError> {
        if entities.is_empty() || !self.identity.is_in_group() {
            return Ok(());
        }

        self.readiness.wait_ready().await?;
        self.push(action, entities).await
    }

    async fn push<T: Syncable>(&self, action: SyncAction, entities: &[T]) -> Result<(), SyncError> {
        let device_id = self.identity.device_id().await?;
        let records: Vec<_> = entities
            .iter()
            .map(|entity| to_wire_record(entity, device_id.as_ref(), action))
            .collect();

        for chunk in records.chunks(self.config.page_size.max(1) as usize) {
            if let Err(e) = self.bridge.send_sync_records(T::CATEGORY, chunk.to_vec()).await {
                warn!(category = %T::CATEGORY, error = %e, "Failed to send sync records");
                return Ok(());
            }
        }
        debug!(category = %T::CATEGORY, count = records.len(), "Sent sync records");
        Ok(())
    }

    /// Requests the category's changes from the relay once ready.
    pub async fn fetch(&self, category: SyncCategory) -> Result<(), SyncError> {
        if !self.identity.is_in_group() {
            return Ok(());
        }

        self.readiness.wait_ready().await?;
        self.fetch_now(category).await.map(|_| ())
    }

    /// Catch up after the application returns to the foreground.
    pub async fn on_foreground(&self) -> Result<(), SyncError> {
        if !self.identity.is_in_group() {
            return Ok(());
        }
        // After a reconnect the ready edge does the catch-up.
        if self.reconnect_if_dropped().await? || !self.readiness.is_ready() {
            return Ok(());
        }

        self.fetch_now(SyncCategory::Bookmarks).await?;
        self.fetch_now(SyncCategory::Devices).await?;
        Ok(())
    }

    /// Issues a fetch unless one is already in flight for the category.
    /// Returns whether a request was sent.
    async fn fetch_now(&self, category: SyncCategory) -> Result<bool, SyncError> {
        if category == SyncCategory::History {
            debug!("History is not synchronized");
            return Ok(false);
        }
        if !self.try_begin_fetch(category) {
            debug!(%category, "Fetch already in flight, skipping");
            return Ok(false);
        }

        let sent = match category {
            SyncCategory::Devices => self.bridge.fetch_sync_devices().await,
            _ => {
                let start_at = match self.last_successful_sync().await {
                    Ok(start_at) => start_at,
                    Err(e) => {
                        self.end_fetch(category);
                        return Err(e);
                    }
                };
                self.bridge
                    .fetch_sync_records(&[category], start_at, self.config.page_size)
                    .await
            }
        };

        if let Err(e) = sent {
            warn!(%category, error = %e, "Failed to request sync records");
            self.end_fetch(category);
            return Ok(false);
        }
        Ok(true)
    }

    fn try_begin_fetch(&self, category: SyncCategory) -> bool {
        let now = Instant::now();
        let mut state = self.state();
        if let Some(started) = state.in_flight.get(&category) {
            if now.duration_since(*started) < self.config.in_flight_timeout {
                return false;
            }
            warn!(%category, "Previous fetch never completed, starting a new one");
        }
        state.in_flight.insert(category, now);
        true
    }

    fn end_fetch(&self, category: SyncCategory) {
        self.state().in_flight.remove(&category);
    }

    /// Soft-deletes a device and tells the other devices about it.
    pub async fn remove_device(&self, object_id: &ObjectId) -> Result<bool, SyncError> {
        let Some(device) = self.devices.remove(object_id).await? else {
            return Ok(false);
        };

        self.emit(SyncEvent::DeviceRemoved {
            object_id: device.object_id.clone(),
        });
        self.send_records(SyncAction::Delete, std::slice::from_ref(&device))
            .await?;
        if device.is_current {
            self.leave_group().await?;
        } else {
            self.fetch(SyncCategory::Devices).await?;
        }
        Ok(true)
    }

    pub async fn delete_remote_category(&self, category: SyncCategory) -> Result<(), SyncError> {
        self.ready_in_group().await?;
        Ok(self.bridge.delete_sync_category(category).await?)
    }

    pub async fn delete_remote_user(&self) -> Result<(), SyncError> {
        self.ready_in_group().await?;
        Ok(self.bridge.delete_sync_user().await?)
    }

    pub async fn delete_remote_site_settings(&self) -> Result<(), SyncError> {
        self.ready_in_group().await?;
        Ok(self.bridge.delete_sync_site_settings().await?)
    }

    async fn ready_in_group(&self) -> Result<(), SyncError> {
        if !self.identity.is_in_group() {
            return Err(SyncError::NotInGroup);
        }
        self.readiness.wait_ready().await
    }

    // ==================== Inbound ====================

    /// Dispatches relay events until the channel closes.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<RelayEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event).await {
                warn!(error = %e, "Failed to handle relay event");
            }
        }
        debug!("Relay event stream ended");
    }

    pub async fn handle_event(&self, event: RelayEvent) -> Result<(), SyncError> {
        match event {
            RelayEvent::GetInitData => self.send_init_data().await,
            RelayEvent::SaveInitData { seed, device_id } => {
                self.save_init_data(seed.as_deref(), device_id.as_deref())
                    .await
            }
            RelayEvent::GetExistingObjects {
                category,
                records,
                last_record_timestamp,
                is_truncated,
            } => {
                self.answer_existing_objects(category, records, last_record_timestamp, is_truncated)
                    .await
            }
            RelayEvent::ResolvedSyncRecords { category, records } => {
                self.apply_resolved(category, records).await
            }
            RelayEvent::ChannelReady(channel) => {
                match self.readiness.mark(channel) {
                    MarkOutcome::BecameReady => self.on_ready().await?,
                    MarkOutcome::Pending => debug!(channel = channel.message_name(), "Channel ready"),
                    MarkOutcome::AlreadyReady => {}
                }
                Ok(())
            }
            RelayEvent::SyncSetupError { error } => {
                error!(%error, "Relay reported a setup error");
                self.emit(SyncEvent::SetupError(error));
                Ok(())
            }
            RelayEvent::SyncDebug { text } => {
                debug!(%text, "Relay debug");
                Ok(())
            }
            RelayEvent::Unknown { name } => {
                warn!(%name, "Ignoring unknown relay message");
                Ok(())
            }
        }
    }

    async fn send_init_data(&self) -> Result<(), SyncError> {
        let config = ClientConfig {
            api_version: API_VERSION.to_string(),
            server_url: self.config.server_url.clone(),
            debug: self.config.debug,
        };
        let result = self
            .bridge
            .got_init_data(
                self.identity.seed()?,
                self.identity.device_id().await?,
                Some(self.device_name().await?),
                config,
            )
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Failed to answer init data request");
        }
        Ok(())
    }

    async fn save_init_data(
        &self,
        seed: Option<&[u8]>,
        device_id: Option<&[u8]>,
    ) -> Result<(), SyncError> {
        let outcome = self.identity.accept_init_data(seed, device_id).await?;
        if outcome.seed_saved {
            self.state().pending_new_group = false;
        }
        if self.identity.is_in_group() {
            self.ensure_current_device().await?;
        }
        debug!(?outcome, "Processed init data");
        Ok(())
    }

    /// Edge actions when the latch fires, in order.
    async fn on_ready(&self) -> Result<(), SyncError> {
        info!("Sync is ready");
        self.emit(SyncEvent::Ready);

        if let Some(me) = self.devices.current().await? {
            if !me.synced {
                let record = to_wire_record(&me, None, SyncAction::Create);
                match self
                    .bridge
                    .send_sync_records(SyncCategory::Devices, vec![record])
                    .await
                {
                    Ok(()) => self.devices.mark_synced(&me.object_id).await?,
                    Err(e) => warn!(error = %e, "Failed to announce this device"),
                }
            }
        }

        if let Err(e) = self.fetch_now(SyncCategory::Devices).await {
            warn!(error = %e, "Devices fetch failed");
        }

        if self.last_successful_sync().await? == 0 {
            let bookmarks = self.store.bookmarks().list().await?;
            info!(count = bookmarks.len(), "First sync, uploading existing bookmarks");
            self.push(SyncAction::Create, &bookmarks).await?;
        }
        self.start_timer();
        Ok(())
    }

    fn start_timer(&self) {
        let engine = self.me.clone();
        let period = self.config.fetch_interval.max(Duration::from_millis(1));

        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if let Err(e) = engine.tick().await {
                    warn!(error = %e, "Periodic fetch failed");
                }
            }
        });

        if let Some(old) = self.state().timer.replace(timer) {
            old.abort();
        }
    }

    async fn tick(&self) -> Result<(), SyncError> {
        if self.reconnect_if_dropped().await? || !self.readiness.is_ready() {
            return Ok(());
        }
        self.fetch_now(SyncCategory::Bookmarks).await.map(|_| ())
    }

    async fn answer_existing_objects(
        &self,
        category: SyncCategory,
        records: Vec<Value>,
        last_record_timestamp: Option<i64>,
        is_truncated: bool,
    ) -> Result<(), SyncError> {
        if !self.identity.is_in_group() {
            debug!(%category, "Not in a sync group, ignoring existing-objects request");
            return Ok(());
        }

        let device_id = self.identity.device_id().await?;
        let mut conn = self.store.pool().acquire().await?;
        let answer =
            reconcile::existing_objects(&mut conn, category, &records, device_id.as_ref()).await?;
        drop(conn);

        if category == SyncCategory::Bookmarks {
            self.state().progress.insert(
                category,
                FetchProgress {
                    last_fetched: last_record_timestamp.or(answer.newest),
                    trimmed: is_truncated,
                },
            );
        }

        if let Err(e) = self.bridge.resolve_sync_records(category, answer.pairs).await {
            warn!(%category, error = %e, "Failed to send resolved pairs");
            self.end_fetch(category);
        }
        Ok(())
    }

    async fn apply_resolved(
        &self,
        category: SyncCategory,
        records: Vec<Value>,
    ) -> Result<(), SyncError> {
        let result = self.commit_batch(category, &records).await;
        self.end_fetch(category);

        let Some(outcome) = result? else {
            return Ok(());
        };

        self.emit(SyncEvent::RecordsApplied {
            category,
            created: outcome.created,
            updated: outcome.updated,
            deleted: outcome.deleted,
        });
        for object_id in outcome.removed_devices {
            self.emit(SyncEvent::DeviceRemoved { object_id });
        }

        if outcome.current_device_removed {
            warn!("This device was removed from the sync group");
            self.emit(SyncEvent::CurrentDeviceRemoved);
            return self.leave_group().await;
        }

        let trimmed = {
            let mut state = self.state();
            let progress = state.progress.entry(category).or_default();
            std::mem::take(&mut progress.trimmed)
        };
        if trimmed {
            debug!(%category, "Page was truncated, fetching the rest");
            self.fetch_now(category).await?;
        }
        Ok(())
    }

    /// Applies one resolved batch and advances the cursor in one transaction.
    ///
    /// Returns `None` when the batch was discarded because the group was
    /// left.
    async fn commit_batch(
        &self,
        category: SyncCategory,
        records: &[Value],
    ) -> Result<Option<ApplyOutcome>, SyncError> {
        let _apply = self.apply_lock.lock().await;
        let epoch = self.state().epoch;
        if !self.identity.is_in_group() {
            debug!(%category, "Not in a sync group, discarding resolved records");
            return Ok(None);
        }

        let records = from_wire_records(category, records);
        let mut tx = self.store.begin().await?;
        let outcome = match category {
            SyncCategory::Bookmarks => reconcile::apply_bookmarks(&mut tx, &records).await?,
            SyncCategory::Devices => reconcile::apply_devices(&mut tx, &records).await?,
            SyncCategory::History => return Ok(None),
        };

        if category == SyncCategory::Bookmarks {
            let last_fetched = self
                .state()
                .progress
                .get(&category)
                .and_then(|p| p.last_fetched);
            let previous = cursor::load_in(&mut tx).await?;
            let next = cursor::next_cursor(previous, last_fetched, outcome.newest);
            cursor::store_in(&mut tx, next).await?;
            debug!(previous, next, "Advancing bookmarks cursor");
        }

        let stale = self.state().epoch != epoch;
        if stale || !self.identity.is_in_group() {
            tx.rollback().await?;
            info!(%category, "Group left during reconciliation, batch discarded");
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(outcome))
    }
}

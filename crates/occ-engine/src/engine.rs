//! Engine orchestration
//!
//! The OccupancyEngine ties the registry, evaluator, activity tracker,
//! timer scheduler and trigger dispatcher together. Sensor events, periodic
//! ticks and host actions all funnel through one evaluation guard, so no
//! two evaluation passes for any zone ever overlap.

use chrono::{DateTime, Utc};
use occ_config::{parse_burst_zone, parse_threshold_zone, PropertyMap};
use occ_core::events::{DeviceChangedData, DeviceRemovedData, OccupancyChangedData};
use occ_core::{
    Context, SensorPolarity, TimerKind, TriggerConfig, TriggerId, ZoneConfig, ZoneId,
};
use occ_devices::DeviceStore;
use occ_event_bus::EventBus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::activity::ActivityWindowTracker;
use crate::dispatcher::TriggerDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::evaluator::evaluate_threshold;
use crate::registry::ZoneRegistry;
use crate::timers::{format_countdown, TimerScheduler};

/// Period of the evaluation tick loop
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Structured result of a host action entry point
///
/// Actions report failures as a field -> message map instead of raising, so
/// the host can surface them next to the offending configuration fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub errors: BTreeMap<String, String>,
}

impl ActionOutcome {
    /// Successful action
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: BTreeMap::new(),
        }
    }

    /// Failed action with a single field error
    pub fn failed(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), message.into());
        Self {
            success: false,
            errors,
        }
    }

    fn from_error(err: &EngineError) -> Self {
        match err {
            EngineError::Config(config_err) => Self {
                success: false,
                errors: config_err.errors().clone(),
            },
            EngineError::ZoneNotFound(_) => Self::failed("zone", err.to_string()),
            EngineError::TriggerNotFound(_) => Self::failed("trigger", err.to_string()),
            EngineError::AlreadyActive(_) => Self::failed("device", err.to_string()),
        }
    }
}

/// The occupancy engine
///
/// Owns all mutable occupancy state. Constructed per host session and
/// passed around as `Arc<OccupancyEngine>`; there are no process-wide
/// singletons.
pub struct OccupancyEngine {
    /// Event bus delivering the device feed and carrying engine output
    event_bus: Arc<EventBus>,
    /// Device registry (sensor lookups and the occupancy write path)
    devices: Arc<DeviceStore>,
    /// Active zones and the sensor watch index
    registry: ZoneRegistry,
    /// Per-zone delay / force-off timer slots
    scheduler: TimerScheduler,
    /// Burst-zone event records
    tracker: ActivityWindowTracker,
    /// Trigger subscriptions
    dispatcher: TriggerDispatcher,
    /// Serializes every evaluation pass (events, ticks, actions)
    eval_lock: Mutex<()>,
    /// Running flag
    running: AtomicBool,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
}

impl OccupancyEngine {
    /// Create a new engine on the given bus and device store
    pub fn new(event_bus: Arc<EventBus>, devices: Arc<DeviceStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            dispatcher: TriggerDispatcher::new(event_bus.clone()),
            event_bus,
            devices,
            registry: ZoneRegistry::new(),
            scheduler: TimerScheduler::new(),
            tracker: ActivityWindowTracker::new(),
            eval_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// The zone registry (read access for hosts and tests)
    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    /// The timer scheduler (read access for hosts and tests)
    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    /// The trigger dispatcher (read access for hosts and tests)
    pub fn dispatcher(&self) -> &TriggerDispatcher {
        &self.dispatcher
    }

    // --- Zone lifecycle ---

    /// Activate a zone
    ///
    /// Registers the zone, then runs the zero-event initial evaluation: the
    /// starting verdict is committed immediately (the initial state is
    /// always written out, triggers fire only if the committed value
    /// actually flipped) and, for change-polarity zones, the force-off
    /// timer is armed.
    pub fn activate_zone(
        &self,
        zone_id: ZoneId,
        config: ZoneConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let _guard = self.guard();

        self.registry.insert(zone_id, config.clone())?;
        let ctx = Context::new();

        match &config {
            ZoneConfig::Threshold(zone) => {
                let candidate = evaluate_threshold(zone, |id| self.devices.on_state(id));
                self.commit(zone_id, candidate, true, &ctx);

                if zone.polarity == SensorPolarity::Change {
                    if let Some(force_off) = zone.force_off_delay {
                        self.scheduler
                            .schedule(zone_id, TimerKind::ForceOff, force_off, None, now);
                    }
                }
            }
            ZoneConfig::Burst(zone) => {
                // cold start: record is empty, so this commits unoccupied
                let count = self.tracker.evict_and_count(zone_id, zone.activity_window, now);
                self.commit(zone_id, count >= zone.activity_count, true, &ctx);
            }
        }

        Ok(())
    }

    /// Deactivate a zone
    ///
    /// Cancels outstanding timers (they can no longer fire), drops the
    /// activity record and removes the zone from every sensor's watch entry.
    pub fn deactivate_zone(&self, zone_id: ZoneId) -> EngineResult<()> {
        let _guard = self.guard();

        self.registry.remove(zone_id)?;
        let cancelled = self.scheduler.cancel_zone(zone_id);
        if cancelled > 0 {
            debug!(zone_id = %zone_id, cancelled, "Cancelled outstanding timers on deactivation");
        }
        self.tracker.remove(zone_id);
        Ok(())
    }

    /// Replace a zone's mutable configuration fields in place
    pub fn update_zone(&self, zone_id: ZoneId, config: ZoneConfig) -> EngineResult<()> {
        let _guard = self.guard();
        self.registry.update_config(zone_id, config)
    }

    // --- Trigger lifecycle ---

    /// Register a trigger subscription
    pub fn start_trigger(&self, trigger_id: TriggerId, config: TriggerConfig) -> EngineResult<()> {
        let _guard = self.guard();
        self.dispatcher.start(trigger_id, config)
    }

    /// Remove a trigger subscription
    pub fn stop_trigger(&self, trigger_id: TriggerId) -> EngineResult<()> {
        let _guard = self.guard();
        self.dispatcher.stop(trigger_id).map(|_| ())
    }

    // --- Event handling ---

    /// Process a device state-change event
    ///
    /// Display-only writes (`old_on == new_on`) are ignored. Affected zones
    /// are resolved through the watch index; each gets an evaluation pass,
    /// and any timers that came due (including zero-length delays scheduled
    /// by this very pass) fire before returning.
    pub fn handle_device_changed(
        &self,
        data: &DeviceChangedData,
        context: &Context,
        now: DateTime<Utc>,
    ) {
        let _guard = self.guard();

        if data.old_on == data.new_on {
            return;
        }

        let watchers = self.registry.watchers(data.device_id);
        if watchers.is_empty() {
            return;
        }

        debug!(
            device_id = %data.device_id,
            new_on = data.new_on,
            zones = watchers.len(),
            "Watched device changed"
        );

        for zone_id in watchers {
            self.process_zone_event(zone_id, data, context, now);
        }

        self.run_due(now, context);
    }

    /// Process a device removal
    ///
    /// Zone configuration referencing the device is left in place; the
    /// evaluator excludes missing sensors from then on. Each watching zone
    /// gets one warning so the stale reference is visible.
    pub fn handle_device_removed(&self, data: &DeviceRemovedData) {
        let _guard = self.guard();

        for zone_id in self.registry.watchers(data.device_id) {
            warn!(
                zone_id = %zone_id,
                device_id = %data.device_id,
                name = %data.name,
                "Watched sensor deleted; zone will evaluate without it"
            );
        }
    }

    /// Run one periodic evaluation pass
    ///
    /// Drains expired activity-record entries (burst zones may drop to
    /// unoccupied with no sensor event), fires due timers, and refreshes
    /// the countdown readout of every pending delay timer.
    pub fn tick(&self, now: DateTime<Utc>) {
        let _guard = self.guard();
        let ctx = Context::new();

        for zone_id in self.registry.zone_ids() {
            if let Some(ZoneConfig::Burst(zone)) = self.registry.config(zone_id) {
                let count = self.tracker.evict_and_count(zone_id, zone.activity_window, now);
                self.commit_if_changed(zone_id, count >= zone.activity_count, &ctx);
            }
        }

        self.run_due(now, &ctx);
        self.refresh_countdowns(now, &ctx);
    }

    // --- Host actions ---

    /// Cancel a zone's outstanding timers, optionally forcing a state
    ///
    /// Missing timers are warn-logged no-ops, never failures.
    pub fn cancel_timer(&self, zone_id: ZoneId, force_state: Option<bool>) -> ActionOutcome {
        let _guard = self.guard();

        if !self.registry.contains(zone_id) {
            return ActionOutcome::from_error(&EngineError::ZoneNotFound(zone_id));
        }

        let ctx = Context::new();
        self.scheduler.cancel(zone_id, TimerKind::Delay);
        self.scheduler.cancel(zone_id, TimerKind::ForceOff);
        self.clear_display(zone_id, &ctx);

        if let Some(state) = force_state {
            self.commit_if_changed(zone_id, state, &ctx);
        }

        ActionOutcome::ok()
    }

    /// Cancel timers and force a zone unoccupied immediately
    pub fn force_zone_off(&self, zone_id: ZoneId) -> ActionOutcome {
        let _guard = self.guard();

        if !self.registry.contains(zone_id) {
            return ActionOutcome::from_error(&EngineError::ZoneNotFound(zone_id));
        }

        let ctx = Context::new();
        self.scheduler.cancel_zone(zone_id);
        self.clear_display(zone_id, &ctx);
        self.commit_if_changed(zone_id, false, &ctx);
        ActionOutcome::ok()
    }

    /// Update a threshold zone from host properties
    pub fn update_occupancy_zone_config(
        &self,
        zone_id: ZoneId,
        props: &PropertyMap,
    ) -> ActionOutcome {
        let _guard = self.guard();

        let config = match parse_threshold_zone(zone_id, props) {
            Ok(config) => config,
            Err(err) => return ActionOutcome::from_error(&err.into()),
        };
        match self.registry.update_config(zone_id, config) {
            Ok(()) => ActionOutcome::ok(),
            Err(err) => ActionOutcome::from_error(&err),
        }
    }

    /// Update a burst zone from host properties
    pub fn update_activity_zone_config(
        &self,
        zone_id: ZoneId,
        props: &PropertyMap,
    ) -> ActionOutcome {
        let _guard = self.guard();

        let config = match parse_burst_zone(zone_id, props) {
            Ok(config) => config,
            Err(err) => return ActionOutcome::from_error(&err.into()),
        };
        match self.registry.update_config(zone_id, config) {
            Ok(()) => ActionOutcome::ok(),
            Err(err) => ActionOutcome::from_error(&err),
        }
    }

    // --- Async lifecycle ---

    /// Start the engine loop
    ///
    /// Subscribes to the device feed and begins processing events and ticks.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Occupancy engine already running");
            return;
        }

        info!("Starting occupancy engine");

        let engine = Arc::clone(self);
        let mut changed_rx = self.event_bus.subscribe_typed::<DeviceChangedData>();
        let mut removed_rx = self.event_bus.subscribe_typed::<DeviceRemovedData>();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(TICK_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        engine.tick(Utc::now());
                    }
                    event = changed_rx.recv() => {
                        match event {
                            Ok(event) => {
                                engine.handle_device_changed(&event.data, &event.context, Utc::now());
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Device feed lagged by {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Device feed closed, stopping occupancy engine");
                                break;
                            }
                        }
                    }
                    event = removed_rx.recv() => {
                        match event {
                            Ok(event) => engine.handle_device_removed(&event.data),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Removal feed lagged by {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Removal feed closed, stopping occupancy engine");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            engine.running.store(false, Ordering::SeqCst);
            info!("Occupancy engine stopped");
        });
    }

    /// Signal the engine loop to stop
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping occupancy engine");
        let _ = self.shutdown_tx.send(());
    }

    /// Whether the engine loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // --- Evaluation internals (callers hold the evaluation guard) ---

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.eval_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_zone_event(
        &self,
        zone_id: ZoneId,
        data: &DeviceChangedData,
        context: &Context,
        now: DateTime<Utc>,
    ) {
        let Some(config) = self.registry.config(zone_id) else {
            return;
        };

        match config {
            ZoneConfig::Threshold(zone) => {
                let candidate = evaluate_threshold(&zone, |id| self.devices.on_state(id));
                let delay = if candidate { zone.on_delay } else { zone.off_delay };

                trace!(zone_id = %zone_id, candidate, delay_secs = delay.as_secs_f64(), "Debounce scheduled");
                self.scheduler
                    .schedule(zone_id, TimerKind::Delay, delay, Some(candidate), now);

                if zone.polarity == SensorPolarity::Change {
                    if let Some(force_off) = zone.force_off_delay {
                        self.scheduler
                            .schedule(zone_id, TimerKind::ForceOff, force_off, None, now);
                    }
                }
            }
            ZoneConfig::Burst(zone) => {
                if !data.old_on && data.new_on {
                    self.tracker.record(zone_id, now);
                }
                let count = self.tracker.evict_and_count(zone_id, zone.activity_window, now);
                self.commit_if_changed(zone_id, count >= zone.activity_count, context);
            }
        }
    }

    fn run_due(&self, now: DateTime<Utc>, context: &Context) {
        for timer in self.scheduler.due(now) {
            match timer.kind {
                TimerKind::Delay => {
                    let candidate = timer.candidate.unwrap_or(false);
                    let changed = self.commit_if_changed(timer.zone_id, candidate, context);
                    if !changed {
                        // converged with no write; drop any stale countdown
                        self.clear_display(timer.zone_id, context);
                    }
                }
                TimerKind::ForceOff => {
                    if self.commit_if_changed(timer.zone_id, false, context) {
                        debug!(zone_id = %timer.zone_id, "Force-off cleared zone");
                    }
                }
            }
        }
    }

    /// Commit a verdict as the zone's observable state
    ///
    /// Writes the device state only when the committed value changed (or on
    /// the one initial write at activation) and dispatches triggers only on
    /// actual flips.
    fn commit(&self, zone_id: ZoneId, occupied: bool, initial: bool, context: &Context) -> bool {
        let old = match self.registry.set_occupied(zone_id, occupied) {
            Ok(old) => old,
            Err(err) => {
                warn!(zone_id = %zone_id, error = %err, "Commit on inactive zone skipped");
                return false;
            }
        };

        let changed = old != occupied;
        if changed || initial {
            if let Err(err) = self
                .devices
                .update_occupancy(zone_id, occupied, None, context.child())
            {
                warn!(zone_id = %zone_id, error = %err, "Zone device missing on occupancy write");
            }
        }

        if changed {
            info!(zone_id = %zone_id, occupied, "Zone occupancy committed");
            self.event_bus
                .fire_typed(OccupancyChangedData { zone_id, occupied }, context.child());
            self.dispatcher.notify(zone_id, occupied, context);
        }

        changed
    }

    fn commit_if_changed(&self, zone_id: ZoneId, occupied: bool, context: &Context) -> bool {
        self.commit(zone_id, occupied, false, context)
    }

    fn clear_display(&self, zone_id: ZoneId, context: &Context) {
        if let Err(err) = self.devices.set_display(zone_id, None, context.child()) {
            trace!(zone_id = %zone_id, error = %err, "Display clear skipped");
        }
    }

    fn refresh_countdowns(&self, now: DateTime<Utc>, context: &Context) {
        for zone_id in self.registry.zone_ids() {
            if let Some(remaining) = self.scheduler.remaining(zone_id, TimerKind::Delay, now) {
                if let Err(err) =
                    self.devices
                        .set_display(zone_id, Some(format_countdown(remaining)), context.child())
                {
                    trace!(zone_id = %zone_id, error = %err, "Countdown write skipped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use occ_core::{AggregationMode, DeviceId, ThresholdZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn make_engine() -> (Arc<OccupancyEngine>, Arc<DeviceStore>) {
        let bus = Arc::new(EventBus::new());
        let devices = Arc::new(DeviceStore::new(bus.clone()));
        (Arc::new(OccupancyEngine::new(bus, devices.clone())), devices)
    }

    fn threshold(sensors: &[u64], on_delay: u64, off_delay: u64) -> ZoneConfig {
        ZoneConfig::Threshold(ThresholdZone {
            sensors: sensors.iter().map(|&id| DeviceId::new(id)).collect(),
            aggregation: AggregationMode::All,
            polarity: SensorPolarity::On,
            on_delay: Duration::from_secs(on_delay),
            off_delay: Duration::from_secs(off_delay),
            force_off_delay: None,
        })
    }

    #[tokio::test]
    async fn test_activation_writes_initial_state() {
        let (engine, devices) = make_engine();
        devices.add(DeviceId::new(1), "motion", true).unwrap();
        devices.add(DeviceId::new(100), "zone", false).unwrap();

        engine
            .activate_zone(ZoneId::new(100), threshold(&[1], 0, 0), at(0))
            .unwrap();

        // the sensor was already on, so the zero-event evaluation commits occupied
        assert_eq!(engine.registry().occupied(ZoneId::new(100)), Some(true));
        assert!(devices.get(DeviceId::new(100)).unwrap().on_state);
    }

    #[tokio::test]
    async fn test_cancel_timer_unknown_zone() {
        let (engine, _devices) = make_engine();
        let outcome = engine.cancel_timer(ZoneId::new(5), None);
        assert!(!outcome.success);
        assert!(outcome.errors.contains_key("zone"));
    }

    #[tokio::test]
    async fn test_cancel_timer_without_outstanding_is_noop() {
        let (engine, devices) = make_engine();
        devices.add(DeviceId::new(1), "motion", false).unwrap();
        devices.add(DeviceId::new(100), "zone", false).unwrap();
        engine
            .activate_zone(ZoneId::new(100), threshold(&[1], 5, 5), at(0))
            .unwrap();

        // no timers outstanding: still a success (warn-logged no-op)
        let outcome = engine.cancel_timer(ZoneId::new(100), None);
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_update_config_validation_surface() {
        let (engine, devices) = make_engine();
        devices.add(DeviceId::new(1), "motion", false).unwrap();
        devices.add(DeviceId::new(100), "zone", false).unwrap();
        engine
            .activate_zone(ZoneId::new(100), threshold(&[1], 5, 5), at(0))
            .unwrap();

        let mut props = PropertyMap::new();
        props.insert("sensors".to_string(), "1".to_string());
        props.insert("on_delay".to_string(), "nope".to_string());
        props.insert("off_delay".to_string(), "5".to_string());

        let outcome = engine.update_occupancy_zone_config(ZoneId::new(100), &props);
        assert!(!outcome.success);
        assert!(outcome.errors.contains_key("on_delay"));
    }

    #[tokio::test]
    async fn test_engine_loop_start_stop() {
        let (engine, _devices) = make_engine();

        engine.start();
        assert!(engine.is_running());

        engine.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!engine.is_running());
    }
}

//! Trigger dispatch
//!
//! Trigger subscriptions bind a trigger id to a zone and a polarity
//! (occupied/unoccupied). When a zone's committed occupancy flips, the
//! dispatcher fires every matching subscription as a `trigger_fired` event
//! on the bus.

use dashmap::DashMap;
use occ_core::events::TriggerFiredData;
use occ_core::{Context, TriggerConfig, TriggerId, TriggerPolarity, ZoneId};
use occ_event_bus::EventBus;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Registered trigger subscriptions
pub struct TriggerDispatcher {
    subscriptions: DashMap<TriggerId, TriggerConfig>,
    event_bus: Arc<EventBus>,
}

impl TriggerDispatcher {
    /// Create a dispatcher with no subscriptions
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            subscriptions: DashMap::new(),
            event_bus,
        }
    }

    /// Register a trigger subscription
    pub fn start(&self, trigger_id: TriggerId, config: TriggerConfig) -> EngineResult<()> {
        if self.subscriptions.contains_key(&trigger_id) {
            return Err(EngineError::AlreadyActive(trigger_id));
        }

        info!(
            trigger_id = %trigger_id,
            zone_id = %config.zone_id,
            polarity = ?config.polarity,
            "Trigger started"
        );
        self.subscriptions.insert(trigger_id, config);
        Ok(())
    }

    /// Remove a trigger subscription
    pub fn stop(&self, trigger_id: TriggerId) -> EngineResult<TriggerConfig> {
        let (_, config) = self
            .subscriptions
            .remove(&trigger_id)
            .ok_or(EngineError::TriggerNotFound(trigger_id))?;

        info!(trigger_id = %trigger_id, "Trigger stopped");
        Ok(config)
    }

    /// Fire every subscription matching a committed occupancy flip
    ///
    /// Returns the number of triggers fired. Callers invoke this only on
    /// actual flips, so a matching subscription always represents a real
    /// edge, never a re-affirmation.
    pub fn notify(&self, zone_id: ZoneId, occupied: bool, context: &Context) -> usize {
        let mut fired = 0;

        for entry in self.subscriptions.iter() {
            let config = entry.value();
            if config.zone_id != zone_id {
                continue;
            }

            let matches = match config.polarity {
                TriggerPolarity::Occupied => occupied,
                TriggerPolarity::Unoccupied => !occupied,
            };
            if !matches {
                continue;
            }

            debug!(trigger_id = %entry.key(), zone_id = %zone_id, occupied, "Firing trigger");
            self.event_bus.fire_typed(
                TriggerFiredData {
                    trigger_id: *entry.key(),
                    zone_id,
                    occupied,
                },
                context.child(),
            );
            fired += 1;
        }

        fired
    }

    /// Registered subscription count
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no subscriptions are registered
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use occ_core::DeviceId;

    fn make_dispatcher() -> (TriggerDispatcher, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        (TriggerDispatcher::new(bus.clone()), bus)
    }

    #[tokio::test]
    async fn test_fires_matching_polarity() {
        let (dispatcher, bus) = make_dispatcher();
        let zone = ZoneId::new(100);

        dispatcher
            .start(
                DeviceId::new(1),
                TriggerConfig {
                    zone_id: zone,
                    polarity: TriggerPolarity::Occupied,
                },
            )
            .unwrap();
        dispatcher
            .start(
                DeviceId::new(2),
                TriggerConfig {
                    zone_id: zone,
                    polarity: TriggerPolarity::Unoccupied,
                },
            )
            .unwrap();

        let mut rx = bus.subscribe_typed::<TriggerFiredData>();

        assert_eq!(dispatcher.notify(zone, true, &Context::new()), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.trigger_id, DeviceId::new(1));
        assert!(event.data.occupied);

        assert_eq!(dispatcher.notify(zone, false, &Context::new()), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.trigger_id, DeviceId::new(2));
        assert!(!event.data.occupied);
    }

    #[tokio::test]
    async fn test_other_zones_unaffected() {
        let (dispatcher, _bus) = make_dispatcher();

        dispatcher
            .start(
                DeviceId::new(1),
                TriggerConfig {
                    zone_id: ZoneId::new(100),
                    polarity: TriggerPolarity::Occupied,
                },
            )
            .unwrap();

        assert_eq!(dispatcher.notify(ZoneId::new(200), true, &Context::new()), 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_trigger() {
        let (dispatcher, _bus) = make_dispatcher();
        assert_eq!(
            dispatcher.stop(DeviceId::new(9)).unwrap_err(),
            EngineError::TriggerNotFound(DeviceId::new(9))
        );
    }

    #[tokio::test]
    async fn test_duplicate_start_rejected() {
        let (dispatcher, _bus) = make_dispatcher();
        let config = TriggerConfig {
            zone_id: ZoneId::new(100),
            polarity: TriggerPolarity::Occupied,
        };

        dispatcher.start(DeviceId::new(1), config).unwrap();
        assert_eq!(
            dispatcher.start(DeviceId::new(1), config).unwrap_err(),
            EngineError::AlreadyActive(DeviceId::new(1))
        );
    }

    #[tokio::test]
    async fn test_stopped_trigger_no_longer_fires() {
        let (dispatcher, _bus) = make_dispatcher();
        let zone = ZoneId::new(100);

        dispatcher
            .start(
                DeviceId::new(1),
                TriggerConfig {
                    zone_id: zone,
                    polarity: TriggerPolarity::Occupied,
                },
            )
            .unwrap();
        dispatcher.stop(DeviceId::new(1)).unwrap();

        assert_eq!(dispatcher.notify(zone, true, &Context::new()), 0);
    }
}

//! Zone occupancy engine
//!
//! This crate implements the occupancy state machine: zones aggregate the
//! on/off state of watched sensors into a committed occupied/unoccupied
//! verdict, debounced through per-zone delay timers, bounded by a force-off
//! safety timeout, or inferred from event density in a trailing activity
//! window.
//!
//! # Architecture
//!
//! ```text
//! device event -> watch index -> evaluator / activity tracker
//!              -> timer scheduler -> commit -> trigger dispatcher
//! ```
//!
//! - [`ZoneRegistry`] - active zones and the sensor watch index
//! - [`evaluate_threshold`] - pure candidate verdict for threshold zones
//! - [`ActivityWindowTracker`] - sliding-window records for burst zones
//! - [`TimerScheduler`] - per-zone delay / force-off timer slots
//! - [`TriggerDispatcher`] - occupied/unoccupied trigger subscriptions
//! - [`OccupancyEngine`] - the serialized evaluation loop and host actions

pub mod activity;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod registry;
pub mod timers;

pub use activity::ActivityWindowTracker;
pub use dispatcher::TriggerDispatcher;
pub use engine::{ActionOutcome, OccupancyEngine, TICK_INTERVAL};
pub use error::{EngineError, EngineResult};
pub use evaluator::evaluate_threshold;
pub use registry::{ZoneRegistry, ZoneState};
pub use timers::{format_countdown, PendingTimer, TimerScheduler};

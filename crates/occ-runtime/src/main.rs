//! Occupancy engine runtime
//!
//! Main entry point: wires the event bus, device store and engine together
//! for a host session and runs the evaluation loop until interrupted.

use anyhow::Result;
use occ_devices::DeviceStore;
use occ_engine::OccupancyEngine;
use occ_event_bus::EventBus;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// The per-session occupancy runtime
///
/// Owns every registry the engine works against; nothing here is a
/// process-wide singleton, so a host can run several sessions side by side.
pub struct OccupancyRuntime {
    /// Event bus for pub/sub communication
    pub bus: Arc<EventBus>,
    /// Device registry and occupancy write path
    pub devices: Arc<DeviceStore>,
    /// The occupancy engine
    pub engine: Arc<OccupancyEngine>,
}

impl OccupancyRuntime {
    /// Create a new runtime
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let devices = Arc::new(DeviceStore::new(bus.clone()));
        let engine = Arc::new(OccupancyEngine::new(bus.clone(), devices.clone()));

        Self {
            bus,
            devices,
            engine,
        }
    }
}

impl Default for OccupancyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting occupancy runtime");

    let runtime = OccupancyRuntime::new();
    runtime.engine.start();

    info!("Occupancy engine is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.engine.stop();

    Ok(())
}

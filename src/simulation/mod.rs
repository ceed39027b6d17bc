//! Device simulation
//!
//! The [`engine`] owns simulated time and publishes telemetry through the
//! register bank, using the [`state`] machine and the [`model`] of the
//! inverter's physics. [`sma`] names the logical registers involved.

pub mod engine;
pub mod model;
pub mod sma;
pub mod state;

pub use engine::{EngineHandle, SimulationEngine, TickSummary};
pub use state::{Commands, DeviceState, StateMachine};

//! # Voltage Twin - Modbus TCP Digital Twin of a Solar Inverter
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **Version:** 0.1.0
//! **License:** MIT
//!
//! A simulated SMA-style PV inverter that answers Modbus TCP requests the way
//! the real device does. A background simulation evolves the register values
//! over time (solar curve, weather, temperature, grid quantities, faults), so
//! monitoring software and protocol test harnesses can run against a
//! realistic, stateful target without hardware.
//!
//! ## Features
//!
//! - **🔒 Consistent Register Store**: multi-word values never tear, reads and writes are all-or-nothing
//! - **🧭 SMA Address Layout**: input registers at 30001+, holding registers at 40001+
//! - **🌞 Physical Model**: diurnal and seasonal curve, weather, thermal derating, three-phase split
//! - **🔄 Device State Machine**: start/stop and error acknowledge commands over Modbus
//! - **📊 Built-in Monitoring**: server, register bank and tick statistics
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Logical address |
//! |------|----------|-----------------|
//! | 0x03 | Read Holding Registers | wire + 40001 |
//! | 0x04 | Read Input Registers | wire + 30001 |
//! | 0x06 | Write Single Register | wire + 40001 |
//! | 0x10 | Write Multiple Registers | wire + 40001 |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltage_twin::{Config, ModbusServer, ModbusTcpServer, RegisterBank, SimulationEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config/sma_inverter_profile.yaml")?;
//!     config.validate()?;
//!
//!     let bank = Arc::new(RegisterBank::with_registers(config.to_registers()?)?);
//!     let engine = SimulationEngine::new(
//!         bank.clone(),
//!         &config.device_identity,
//!         config.simulation_parameters.clone(),
//!     )
//!     .spawn();
//!
//!     let mut server = ModbusTcpServer::new("0.0.0.0:1502", bank)?;
//!     server.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     engine.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │  Modbus Client  │    │  Configuration  │
//! └─────────────────┘    └─────────────────┘
//!          │                       │
//! ┌─────────────────┐              │
//! │   TCP Server    │              │
//! └─────────────────┘              │
//!          │                       │
//! ┌─────────────────┐    ┌─────────────────┐
//! │ Protocol Handler│    │ Simulation      │
//! │ (addr translate)│    │ Engine          │
//! └─────────────────┘    └─────────────────┘
//!          │                       │
//!          └──────────┬────────────┘
//!           ┌─────────────────┐
//!           │  Register Bank  │
//!           └─────────────────┘
//! ```

/// Core error types and result handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod error;

/// Register data model
pub mod register;

/// Thread-safe register storage shared by the server and the simulation
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod register_bank;

/// Wire to logical address translation
pub mod address;

/// Modbus protocol definitions and message handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod protocol;

/// Request processing against the register bank
pub mod handler;

/// Modbus TCP server
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod server;

/// Device profile loading and validation
pub mod config;

/// Inverter state machine, physical model and simulation engine
pub mod simulation;

/// Utility functions and performance monitoring
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod utils;

/// Logger setup and packet tracing
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod logging;

// Re-export main types for convenience
pub use error::{ModbusError, ModbusResult};
pub use register::{Register, RegisterAccess, RegisterFormat, RegisterKind, RegisterValue};
pub use register_bank::{RegisterBank, RegisterBankStats, RegisterDescriptor};
pub use protocol::{ModbusException, ModbusFunction, ModbusRequest, ModbusResponse};
pub use handler::ProtocolHandler;
pub use server::{ModbusServer, ModbusTcpServer, ModbusTcpServerConfig, ServerStats};
pub use config::{Config, DeviceIdentity, SimulationParams, WeatherModel};
pub use simulation::{DeviceState, EngineHandle, SimulationEngine};
pub use utils::{OperationTimer, PerformanceMetrics};
pub use logging::{LoggingMode, PacketLogger};

/// Maximum number of registers that can be read in a single request
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Maximum Modbus TCP frame size (MBAP header + PDU)
pub const MAX_TCP_FRAME_SIZE: usize = 260;

/// MBAP header size, unit identifier included
pub const MBAP_HEADER_SIZE: usize = 7;

/// Default listen port of the simulated device
pub const DEFAULT_TCP_PORT: u16 = 1502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Voltage Twin v{} - Modbus TCP digital twin of an SMA-style solar inverter", VERSION)
}

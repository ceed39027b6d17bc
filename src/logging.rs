/// Logger setup and Modbus packet tracing
///
/// Library code logs through the `log` macros. The binary installs
/// `env_logger`; packet tracing is opt-in and shows each frame as a hex
/// dump, as decoded fields, or both.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use env_logger::Env;
use log::{debug, info, LevelFilter};

use crate::error::ModbusError;
use crate::protocol::{ModbusRequest, ModbusResponse, ResponseBody};

/// Install `env_logger`, with `RUST_LOG` taking precedence over `default_filter`
pub fn init_logging(default_filter: &str) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}

/// Initialize a debug logger for tests, ignoring repeated calls
pub fn init_test_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Logging mode for packet display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    /// No packet tracing
    #[default]
    Off,
    /// Show raw packet data only
    Raw,
    /// Show interpreted packet data with field descriptions
    Interpreted,
    /// Show both raw and interpreted data
    Both,
}

impl FromStr for LoggingMode {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LoggingMode::Off),
            "raw" => Ok(LoggingMode::Raw),
            "interpreted" => Ok(LoggingMode::Interpreted),
            "both" => Ok(LoggingMode::Both),
            other => Err(ModbusError::configuration(format!(
                "Unknown packet logging mode '{}' (expected off, raw, interpreted or both)",
                other
            ))),
        }
    }
}

impl fmt::Display for LoggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoggingMode::Off => "off",
            LoggingMode::Raw => "raw",
            LoggingMode::Interpreted => "interpreted",
            LoggingMode::Both => "both",
        };
        f.write_str(name)
    }
}

/// Traces request and response frames of client connections
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketLogger {
    mode: LoggingMode,
}

impl PacketLogger {
    pub fn new(mode: LoggingMode) -> Self {
        Self { mode }
    }

    pub fn disabled() -> Self {
        Self::new(LoggingMode::Off)
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != LoggingMode::Off
    }

    /// Log a request frame received from `peer`
    pub fn log_request(&self, peer: SocketAddr, frame: &[u8], request: &ModbusRequest) {
        self.emit("->", peer, frame, || interpret_request(request));
    }

    /// Log a response frame sent to `peer`
    pub fn log_response(&self, peer: SocketAddr, frame: &[u8], response: &ModbusResponse) {
        self.emit("<-", peer, frame, || interpret_response(response));
    }

    fn emit<F: FnOnce() -> String>(&self, direction: &str, peer: SocketAddr, frame: &[u8], interpret: F) {
        match self.mode {
            LoggingMode::Off => {}
            LoggingMode::Raw => {
                info!("{} {} Raw: {}", peer, direction, hex_dump(frame));
            }
            LoggingMode::Interpreted => {
                info!("{} {} {}", peer, direction, interpret());
            }
            LoggingMode::Both => {
                info!("{} {} {}", peer, direction, interpret());
                debug!("{} {} Raw: {}", peer, direction, hex_dump(frame));
            }
        }
    }
}

/// Space separated upper-case hex bytes
pub fn hex_dump(data: &[u8]) -> String {
    let encoded = hex::encode_upper(data);
    encoded
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Field view of a decoded request
pub fn interpret_request(request: &ModbusRequest) -> String {
    let mut text = format!(
        "Unit: {}, Function: {} (0x{:02X}), Address: {}, Quantity: {}",
        request.unit_id,
        request.function.name(),
        request.function.to_u8(),
        request.address,
        request.quantity
    );
    if request.function.is_write_function() {
        text.push_str(&format!(", Values: {:?}", request.values));
    }
    text
}

/// Field view of a response
pub fn interpret_response(response: &ModbusResponse) -> String {
    let body = match &response.body {
        ResponseBody::Registers(words) => format!(
            "Byte count: {}, Registers: {:?}",
            words.len() * 2,
            &words[..words.len().min(8)]
        ),
        ResponseBody::WriteSingle { address, value } => {
            format!("Address: {}, Value: {} (0x{:04X})", address, value, value)
        }
        ResponseBody::WriteMultiple { address, quantity } => {
            format!("Address: {}, Quantity: {}", address, quantity)
        }
        ResponseBody::Exception(exception) => {
            format!("Exception: {} (0x{:02X})", exception.description(), exception.to_u8())
        }
    };
    format!("Unit: {}, Function: 0x{:02X}, {}", response.unit_id, response.function_code, body)
}

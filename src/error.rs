//! # Voltage Twin Error Handling
//!
//! Error types shared by the register bank, the protocol handler, the TCP
//! server, configuration loading and the simulation engine.
//!
//! ## Error Categories
//!
//! ### Transport Errors
//! - **I/O Errors**: socket and file failures
//! - **Connection Errors**: bind/listen/accept problems
//!
//! ### Register Errors
//! - **Unmapped**: no logical register owns the requested word
//! - **Access Denied**: a client tried to write a read-only register
//! - **Type Mismatch**: a logical write carried the wrong value kind
//!
//! ### Protocol Errors
//! - **Invalid Function**: function code outside 0x03/0x04/0x06/0x10
//! - **Invalid Data**: bad quantity or byte count in a request PDU
//! - **Frame Errors**: malformed MBAP header
//! - **Exception Mapping**: each request error maps to a standard exception code
//!
//! ### System Errors
//! - **Configuration Errors**: rejected configuration input, fatal at startup
//! - **Internal Errors**: poisoned locks, task join failures
//!
//! ## Mapping to Modbus exceptions
//!
//! ```rust
//! use voltage_twin::ModbusError;
//!
//! let err = ModbusError::access_denied(30775);
//! assert_eq!(err.exception_code(), Some(0x02));
//!
//! let err = ModbusError::invalid_function(0x2B);
//! assert_eq!(err.exception_code(), Some(0x01));
//! ```

use thiserror::Error;

use crate::register::RegisterKind;

/// Result type alias used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Error conditions of the digital twin
///
/// Per-request errors (`Unmapped`, `AccessDenied`, `InvalidFunction`,
/// `InvalidData`) are answered with a Modbus exception and never close the
/// connection. `Configuration` and `Connection` errors are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModbusError {
    /// I/O related errors (network, file system)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Connection errors
    ///
    /// # Examples
    /// - Port already in use
    /// - Permission denied binding a privileged port
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// No logical register owns the address
    #[error("Unmapped register address {address}")]
    Unmapped { address: u32 },

    /// Write to a word owned by a read-only register
    #[error("Write denied to read-only register at {address}")]
    AccessDenied { address: u16 },

    /// Logical write whose value kind differs from the register kind
    #[error("Type mismatch at {address}: register is {expected}, value is {actual}")]
    TypeMismatch {
        address: u16,
        expected: RegisterKind,
        actual: RegisterKind,
    },

    /// Invalid or unsupported function code
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Invalid data value
    ///
    /// # Examples
    /// - Reading 200 registers (max 125)
    /// - Byte count not matching the quantity in a 0x10 request
    #[error("Invalid data: {message}")]
    InvalidData { message: String },


    /// Frame parsing errors
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Configuration errors
    ///
    /// # Examples
    /// - Duplicate register addresses
    /// - Overlapping multi-word register ranges
    /// - Empty weather model list
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal errors (should not occur in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ModbusError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create an unmapped address error
    ///
    /// The address is widened to `u32` because translated protocol addresses
    /// can land beyond the 16-bit logical space.
    pub fn unmapped(address: impl Into<u32>) -> Self {
        Self::Unmapped { address: address.into() }
    }

    /// Create an access denied error
    pub fn access_denied(address: u16) -> Self {
        Self::AccessDenied { address }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(address: u16, expected: RegisterKind, actual: RegisterKind) -> Self {
        Self::TypeMismatch { address, expected, actual }
    }

    /// Create an invalid function error
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData { message: message.into() }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Modbus exception code a server should answer with for this error
    ///
    /// Returns `None` for errors that are not answered on the wire
    /// (transport, framing and startup errors).
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::InvalidFunction { .. } => Some(0x01),
            Self::Unmapped { .. } | Self::AccessDenied { .. } => Some(0x02),
            Self::InvalidData { .. } => Some(0x03),
            Self::Internal { .. } | Self::TypeMismatch { .. } => Some(0x04),
            _ => None,
        }
    }

    /// Check if the error is a network/transport issue
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Connection { .. })
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ModbusError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML error: {}", err))
    }
}

/// Modbus protocol definitions and PDU encoding
///
/// This module contains the function and exception codes the twin supports
/// and the decoded request/reply types exchanged between the TCP transport
/// and the protocol handler. Addresses here are always wire addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModbusError, ModbusResult};
use crate::MAX_REGISTERS_PER_REQUEST;

/// Modbus wire address type (0-65535)
pub type ModbusAddress = u16;

/// Modbus unit identifier
pub type UnitId = u8;

/// Maximum number of registers in a single 0x10 request
pub const MAX_WRITE_REGISTERS_PER_REQUEST: u16 = 123;

/// Modbus function codes served by the twin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModbusFunction {
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl ModbusFunction {
    /// Convert from u8 to ModbusFunction
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            0x03 => Ok(ModbusFunction::ReadHoldingRegisters),
            0x04 => Ok(ModbusFunction::ReadInputRegisters),
            0x06 => Ok(ModbusFunction::WriteSingleRegister),
            0x10 => Ok(ModbusFunction::WriteMultipleRegisters),
            _ => Err(ModbusError::invalid_function(value)),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a read function
    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters
        )
    }

    /// Check if this is a write function
    pub fn is_write_function(self) -> bool {
        !self.is_read_function()
    }

    /// Human-readable function name
    pub fn name(self) -> &'static str {
        match self {
            ModbusFunction::ReadHoldingRegisters => "Read Holding Registers",
            ModbusFunction::ReadInputRegisters => "Read Input Registers",
            ModbusFunction::WriteSingleRegister => "Write Single Register",
            ModbusFunction::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), *self as u8)
    }
}

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
}

impl ModbusException {
    /// Convert from u8 to ModbusException
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ModbusException::IllegalFunction),
            0x02 => Some(ModbusException::IllegalDataAddress),
            0x03 => Some(ModbusException::IllegalDataValue),
            0x04 => Some(ModbusException::ServerDeviceFailure),
            _ => None,
        }
    }

    /// Exception to answer an error with
    pub fn from_error(error: &ModbusError) -> Self {
        error
            .exception_code()
            .and_then(Self::from_u8)
            .unwrap_or(ModbusException::ServerDeviceFailure)
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ModbusException::IllegalFunction => "The function code received in the query is not an allowable action for the server",
            ModbusException::IllegalDataAddress => "The data address received in the query is not an allowable address for the server",
            ModbusException::IllegalDataValue => "A value contained in the query data field is not an allowable value for server",
            ModbusException::ServerDeviceFailure => "An unrecoverable error occurred while the server was attempting to perform the requested action",
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus Exception 0x{:02X}: {}", self.to_u8(), self.description())
    }
}

/// Decoded Modbus request: `(function, address, quantity[, values])`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub unit_id: UnitId,
    pub function: ModbusFunction,
    /// Zero-based wire address
    pub address: ModbusAddress,
    pub quantity: u16,
    /// Register values for write requests, empty for reads
    pub values: Vec<u16>,
}

impl ModbusRequest {
    /// Create a new read request
    pub fn new_read(unit_id: UnitId, function: ModbusFunction, address: ModbusAddress, quantity: u16) -> Self {
        Self {
            unit_id,
            function,
            address,
            quantity,
            values: Vec::new(),
        }
    }

    /// Create a write single register request
    pub fn new_write_single(unit_id: UnitId, address: ModbusAddress, value: u16) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteSingleRegister,
            address,
            quantity: 1,
            values: vec![value],
        }
    }

    /// Create a write multiple registers request
    pub fn new_write_multiple(unit_id: UnitId, address: ModbusAddress, values: Vec<u16>) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteMultipleRegisters,
            address,
            quantity: values.len() as u16,
            values,
        }
    }

    /// Decode a request PDU (function code followed by its data)
    ///
    /// Unsupported functions fail with `InvalidFunction`, malformed quantities
    /// and byte counts with `InvalidData`.
    pub fn decode_pdu(unit_id: UnitId, pdu: &[u8]) -> ModbusResult<Self> {
        let (&code, data) = pdu
            .split_first()
            .ok_or_else(|| ModbusError::frame("Empty PDU"))?;
        let function = ModbusFunction::from_u8(code)?;

        if data.len() < 4 {
            return Err(ModbusError::invalid_data(format!("PDU too short for {}", function)));
        }
        let address = u16::from_be_bytes([data[0], data[1]]);
        let second = u16::from_be_bytes([data[2], data[3]]);

        let request = match function {
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
                Self::new_read(unit_id, function, address, second)
            }
            ModbusFunction::WriteSingleRegister => Self::new_write_single(unit_id, address, second),
            ModbusFunction::WriteMultipleRegisters => {
                let byte_count = *data
                    .get(4)
                    .ok_or_else(|| ModbusError::invalid_data("Missing byte count"))?
                    as usize;
                if byte_count != second as usize * 2 || data.len() < 5 + byte_count {
                    return Err(ModbusError::invalid_data(format!(
                        "Byte count {} does not match quantity {}",
                        byte_count, second
                    )));
                }
                let values = data[5..5 + byte_count]
                    .chunks_exact(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .collect();
                Self::new_write_multiple(unit_id, address, values)
            }
        };

        request.validate()?;
        Ok(request)
    }

    /// Validate quantities against protocol limits
    pub fn validate(&self) -> ModbusResult<()> {
        let max = match self.function {
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
                MAX_REGISTERS_PER_REQUEST
            }
            ModbusFunction::WriteSingleRegister => 1,
            ModbusFunction::WriteMultipleRegisters => MAX_WRITE_REGISTERS_PER_REQUEST,
        };
        if self.quantity == 0 || self.quantity > max {
            return Err(ModbusError::invalid_data(format!(
                "Invalid quantity {} for {}",
                self.quantity, self.function
            )));
        }
        if self.function.is_write_function() && self.values.len() != self.quantity as usize {
            return Err(ModbusError::invalid_data("Value count does not match quantity"));
        }
        Ok(())
    }
}

/// Reply body of a processed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Words read, in wire address order
    Registers(Vec<u16>),
    /// Echo of a single register write
    WriteSingle { address: ModbusAddress, value: u16 },
    /// Echo of a multiple register write
    WriteMultiple { address: ModbusAddress, quantity: u16 },
    /// Exception reply, no data
    Exception(ModbusException),
}

/// Modbus response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    pub unit_id: UnitId,
    /// Raw function code of the request, kept even when it was unsupported
    pub function_code: u8,
    pub body: ResponseBody,
}

impl ModbusResponse {
    /// Create a successful response
    pub fn new_success(unit_id: UnitId, function: ModbusFunction, body: ResponseBody) -> Self {
        Self {
            unit_id,
            function_code: function.to_u8(),
            body,
        }
    }

    /// Create an exception response
    pub fn new_exception(unit_id: UnitId, function_code: u8, exception: ModbusException) -> Self {
        Self {
            unit_id,
            function_code,
            body: ResponseBody::Exception(exception),
        }
    }

    /// Check if this is an exception response
    pub fn is_exception(&self) -> bool {
        matches!(self.body, ResponseBody::Exception(_))
    }

    /// Exception carried by the response, if any
    pub fn exception(&self) -> Option<ModbusException> {
        match self.body {
            ResponseBody::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// Registers carried by a read response
    pub fn registers(&self) -> Option<&[u16]> {
        match &self.body {
            ResponseBody::Registers(words) => Some(words),
            _ => None,
        }
    }

    /// Encode the reply PDU (function code followed by its data)
    pub fn encode_pdu(&self) -> Vec<u8> {
        match &self.body {
            ResponseBody::Registers(words) => {
                let mut pdu = Vec::with_capacity(2 + words.len() * 2);
                pdu.push(self.function_code);
                pdu.push((words.len() * 2) as u8);
                pdu.extend(data_utils::registers_to_bytes(words));
                pdu
            }
            ResponseBody::WriteSingle { address, value } => {
                let mut pdu = vec![self.function_code];
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&value.to_be_bytes());
                pdu
            }
            ResponseBody::WriteMultiple { address, quantity } => {
                let mut pdu = vec![self.function_code];
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&quantity.to_be_bytes());
                pdu
            }
            ResponseBody::Exception(exception) => {
                vec![self.function_code | 0x80, exception.to_u8()]
            }
        }
    }
}

/// Data conversion utilities
pub mod data_utils {
    /// Convert register values to bytes (big-endian)
    pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
        registers.iter().flat_map(|r| r.to_be_bytes()).collect()
    }
}

//! Protocol-to-logical address translation
//!
//! Modbus wire addresses are zero-based per register table. The simulated
//! device uses SMA-style logical numbering instead: input registers live at
//! 30001 and up, holding registers at 40001 and up. The offset is chosen by
//! function code only, never by the numeric value of the wire address.
//!
//! | Function | Table | Logical address |
//! |----------|-------|-----------------|
//! | 0x04 | input registers | `wire + 30001` |
//! | 0x03, 0x06, 0x10 | holding registers | `wire + 40001` |

use crate::protocol::ModbusFunction;

/// First logical address of the input register table
pub const INPUT_REGISTER_BASE: u32 = 30001;

/// First logical address of the holding register table
pub const HOLDING_REGISTER_BASE: u32 = 40001;

/// Logical base address for a function code
pub const fn base_address(function: ModbusFunction) -> u32 {
    match function {
        ModbusFunction::ReadInputRegisters => INPUT_REGISTER_BASE,
        ModbusFunction::ReadHoldingRegisters
        | ModbusFunction::WriteSingleRegister
        | ModbusFunction::WriteMultipleRegisters => HOLDING_REGISTER_BASE,
    }
}

/// Translate a wire address into the logical address space
///
/// The result is `u32` because high wire addresses land beyond the 16-bit
/// logical space; such addresses are never mapped.
pub const fn to_logical(function: ModbusFunction, wire_address: u16) -> u32 {
    wire_address as u32 + base_address(function)
}

/// Translate a wire address into a logical address that fits the register bank
pub fn to_logical_u16(function: ModbusFunction, wire_address: u16) -> Option<u16> {
    u16::try_from(to_logical(function, wire_address)).ok()
}

/// Translate a logical address back to the wire address a client would send
///
/// Returns `None` for logical addresses below the table base or above the
/// 16-bit wire range.
pub fn to_wire(function: ModbusFunction, logical_address: u16) -> Option<u16> {
    (logical_address as u32)
        .checked_sub(base_address(function))
        .and_then(|wire| u16::try_from(wire).ok())
}

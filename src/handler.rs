/// Protocol handler
///
/// Turns decoded Modbus requests into register bank operations. The handler
/// owns nothing but a reference to the bank; every reply reflects the bank at
/// the moment the request was served.

use std::sync::Arc;
use log::{debug, warn};

use crate::address;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusException, ModbusFunction, ModbusRequest, ModbusResponse, ResponseBody};
use crate::register_bank::RegisterBank;
use crate::utils::format::registers_to_hex;

/// Serves read and write requests against a shared register bank
#[derive(Debug, Clone)]
pub struct ProtocolHandler {
    register_bank: Arc<RegisterBank>,
}

impl ProtocolHandler {
    pub fn new(register_bank: Arc<RegisterBank>) -> Self {
        Self { register_bank }
    }

    /// Register bank served by this handler
    pub fn register_bank(&self) -> &Arc<RegisterBank> {
        &self.register_bank
    }

    /// Process a decoded request, answering failures with an exception reply
    pub fn handle(&self, request: &ModbusRequest) -> ModbusResponse {
        match self.process(request) {
            Ok(body) => ModbusResponse::new_success(request.unit_id, request.function, body),
            Err(e) => {
                let exception = ModbusException::from_error(&e);
                debug!(
                    "{} at wire address {} (x{}) rejected: {}",
                    request.function, request.address, request.quantity, e
                );
                ModbusResponse::new_exception(request.unit_id, request.function.to_u8(), exception)
            }
        }
    }

    /// Process a decoded request
    ///
    /// Reads and writes are all-or-nothing: any unmapped or read-only word in
    /// the requested range fails the whole request and leaves the bank as it was.
    pub fn process(&self, request: &ModbusRequest) -> ModbusResult<ResponseBody> {
        request.validate()?;

        let start = address::to_logical_u16(request.function, request.address).ok_or_else(|| {
            ModbusError::unmapped(address::to_logical(request.function, request.address))
        })?;

        match request.function {
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
                let words = self.register_bank.read_words(start, request.quantity)?;
                Ok(ResponseBody::Registers(words))
            }
            ModbusFunction::WriteSingleRegister => {
                self.write(start, &request.values)?;
                Ok(ResponseBody::WriteSingle {
                    address: request.address,
                    value: request.values[0],
                })
            }
            ModbusFunction::WriteMultipleRegisters => {
                self.write(start, &request.values)?;
                Ok(ResponseBody::WriteMultiple {
                    address: request.address,
                    quantity: request.quantity,
                })
            }
        }
    }

    fn write(&self, start: u16, values: &[u16]) -> ModbusResult<()> {
        self.register_bank.write_words(start, values).map_err(|e| {
            warn!("Rejected write of {} word(s) at logical {}: {}", values.len(), start, e);
            e
        })?;
        debug!("Wrote [{}] at logical address {}", registers_to_hex(values), start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{Register, RegisterAccess, RegisterFormat, RegisterKind, RegisterValue};

    fn handler() -> ProtocolHandler {
        let bank = RegisterBank::with_registers(vec![
            Register::new(30201, RegisterKind::U32, RegisterFormat::Enum, RegisterAccess::RO),
            Register::new(30775, RegisterKind::S32, RegisterFormat::Fix0, RegisterAccess::RO),
            Register::new(30777, RegisterKind::S32, RegisterFormat::Fix0, RegisterAccess::RO),
            Register::new(40009, RegisterKind::U32, RegisterFormat::Enum, RegisterAccess::RW),
            Register::new(40011, RegisterKind::U32, RegisterFormat::Enum, RegisterAccess::RW),
            Register::new(40029, RegisterKind::U32, RegisterFormat::Enum, RegisterAccess::RO),
        ])
        .unwrap();
        ProtocolHandler::new(Arc::new(bank))
    }

    #[test]
    fn test_read_input_registers() {
        let handler = handler();
        handler
            .register_bank()
            .set_logical(30775, RegisterValue::S32(4998))
            .unwrap();

        let request = ModbusRequest::new_read(1, ModbusFunction::ReadInputRegisters, 774, 2);
        let response = handler.handle(&request);
        assert_eq!(response.registers(), Some(&[0u16, 4998][..]));
    }

    #[test]
    fn test_read_spanning_unmapped_word_is_exception() {
        let handler = handler();
        // 30775..30778 mapped, 30779 not
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadInputRegisters, 774, 5);
        let response = handler.handle(&request);
        assert_eq!(response.exception(), Some(ModbusException::IllegalDataAddress));
        assert_eq!(response.encode_pdu(), vec![0x84, 0x02]);
    }

    #[test]
    fn test_holding_read_does_not_reach_input_table() {
        let handler = handler();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadHoldingRegisters, 774, 2);
        assert!(handler.handle(&request).is_exception());
    }

    #[test]
    fn test_write_single_register() {
        let handler = handler();
        let request = ModbusRequest::new_write_single(1, 9, 381);
        let response = handler.handle(&request);
        assert_eq!(response.body, ResponseBody::WriteSingle { address: 9, value: 381 });
        assert_eq!(
            handler.register_bank().get_logical(40009),
            Some(RegisterValue::U32(381))
        );
    }

    #[test]
    fn test_write_multiple_is_all_or_nothing() {
        let handler = handler();
        handler.handle(&ModbusRequest::new_write_multiple(1, 8, vec![0, 295]));

        // 40009..40012 writable, 40013 unmapped
        let request = ModbusRequest::new_write_multiple(1, 8, vec![0, 381, 0, 26, 1]);
        let response = handler.handle(&request);
        assert_eq!(response.exception(), Some(ModbusException::IllegalDataAddress));
        assert_eq!(handler.register_bank().get_logical(40009), Some(RegisterValue::U32(295)));
        assert_eq!(handler.register_bank().get_logical(40011), Some(RegisterValue::U32(0)));
    }

    #[test]
    fn test_write_to_read_only_is_exception() {
        let handler = handler();
        let bank = handler.register_bank().clone();
        bank.set_logical(40029, RegisterValue::U32(307)).unwrap();

        for request in [
            ModbusRequest::new_write_single(1, 29, 303),
            ModbusRequest::new_write_multiple(1, 28, vec![0, 303]),
        ] {
            let response = handler.handle(&request);
            assert_eq!(response.exception(), Some(ModbusException::IllegalDataAddress));
        }
        assert_eq!(bank.get_logical(40029), Some(RegisterValue::U32(307)));
    }

    #[test]
    fn test_translation_past_address_space_is_exception() {
        let handler = handler();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadHoldingRegisters, 30_000, 1);
        assert_eq!(
            handler.handle(&request).exception(),
            Some(ModbusException::IllegalDataAddress)
        );
    }

    #[test]
    fn test_invalid_quantity_is_illegal_data_value() {
        let handler = handler();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadInputRegisters, 774, 0);
        assert_eq!(
            handler.handle(&request).exception(),
            Some(ModbusException::IllegalDataValue)
        );
    }
}

/// Register bank: the single source of truth for device state
///
/// The bank holds every logical register of the device and serves two views of
/// it: the logical view (one typed value per register) used by the simulation
/// engine, and the word view (one `u16` per Modbus address) used by the
/// protocol handler. Both views are derived from the same entry, so they are
/// always consistent after any successful write.
///
/// All operations take one exclusive lock for their whole duration and never
/// call back out while holding it. Lock hold time is a map lookup plus a copy
/// of at most four words per register.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use log::{debug, warn};

use crate::error::{ModbusError, ModbusResult};
use crate::register::{Register, RegisterFormat, RegisterKind, RegisterValue};

type RegisterMap = BTreeMap<u16, Register>;

/// Thread-safe register storage shared by the engine and the protocol handler
#[derive(Debug, Clone, Default)]
pub struct RegisterBank {
    /// Logical registers keyed by start address
    registers: Arc<Mutex<RegisterMap>>,
}

/// Static description of a register, used by publishers to pick a scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub address: u16,
    pub kind: RegisterKind,
    pub format: RegisterFormat,
}

impl RegisterBank {
    /// Create an empty bank; call [`RegisterBank::initialize`] before use
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bank and initialise it in one step
    pub fn with_registers(registers: Vec<Register>) -> ModbusResult<Self> {
        let bank = Self::new();
        bank.initialize(registers)?;
        Ok(bank)
    }

    fn lock(&self) -> ModbusResult<MutexGuard<'_, RegisterMap>> {
        self.registers
            .lock()
            .map_err(|_| ModbusError::internal("Failed to lock register bank"))
    }

    /// Populate the bank from the initial register list
    ///
    /// Rejects duplicate addresses and overlapping word ranges. On success
    /// any previous content is replaced; on failure the bank is left as it was.
    pub fn initialize(&self, registers: Vec<Register>) -> ModbusResult<()> {
        validate_layout(&registers)?;
        let map: RegisterMap = registers.into_iter().map(|reg| (reg.address, reg)).collect();

        let count = map.len();
        *self.lock()? = map;
        debug!("Register bank initialized with {} logical registers", count);
        Ok(())
    }

    /// Find the register owning word `address` by range containment
    fn owner_mut(map: &mut RegisterMap, address: u16) -> Option<&mut Register> {
        map.range_mut(..=address)
            .next_back()
            .map(|(_, reg)| reg)
            .filter(|reg| reg.contains(address))
    }

    fn owner(map: &RegisterMap, address: u16) -> Option<&Register> {
        map.range(..=address)
            .next_back()
            .map(|(_, reg)| reg)
            .filter(|reg| reg.contains(address))
    }

    fn word_of(map: &RegisterMap, address: u16) -> Option<u16> {
        Self::owner(map, address).map(|reg| reg.words()[(address - reg.address) as usize])
    }

    /// Read the physical word at `address`, `None` if unmapped
    pub fn get_word(&self, address: u16) -> Option<u16> {
        let map = self.lock().ok()?;
        Self::word_of(&map, address)
    }

    /// Write a single physical word on behalf of a client
    ///
    /// The owning register's logical value is recomposed from its words after
    /// the update. A multi-word value written one word at a time is only fully
    /// consistent once every word has been written; use
    /// [`RegisterBank::write_words`] to update a whole range atomically.
    pub fn set_word(&self, address: u16, value: u16) -> ModbusResult<()> {
        let mut map = self.lock()?;
        let register = Self::owner_mut(&mut map, address).ok_or_else(|| {
            warn!("Write to unmapped address {}", address);
            ModbusError::unmapped(address)
        })?;
        if !register.access.is_writable() {
            warn!("Denied write to read-only register {}", register.address);
            return Err(ModbusError::access_denied(register.address));
        }
        register.replace_word(address, value)
    }

    /// Read `count` consecutive words under a single lock acquisition
    ///
    /// All-or-nothing: fails with `Unmapped` on the first address without an
    /// owner and returns no partial data.
    pub fn read_words(&self, start: u16, count: u16) -> ModbusResult<Vec<u16>> {
        let map = self.lock()?;
        let mut words = Vec::with_capacity(count as usize);
        for offset in 0..count as u32 {
            let address = start as u32 + offset;
            let word = u16::try_from(address)
                .ok()
                .and_then(|addr| Self::word_of(&map, addr))
                .ok_or_else(|| ModbusError::unmapped(address))?;
            words.push(word);
        }
        Ok(words)
    }

    /// Write consecutive words under a single lock acquisition
    ///
    /// Every target word is validated before any is modified: if one word is
    /// unmapped or owned by a read-only register, nothing changes.
    pub fn write_words(&self, start: u16, values: &[u16]) -> ModbusResult<()> {
        let mut map = self.lock()?;

        let mut targets = Vec::with_capacity(values.len());
        for (offset, &value) in values.iter().enumerate() {
            let address = start as u32 + offset as u32;
            let addr = u16::try_from(address).map_err(|_| ModbusError::unmapped(address))?;
            let register = Self::owner(&map, addr).ok_or_else(|| {
                warn!("Write to unmapped address {}", address);
                ModbusError::unmapped(address)
            })?;
            if !register.access.is_writable() {
                warn!("Denied write to read-only register {}", register.address);
                return Err(ModbusError::access_denied(register.address));
            }
            targets.push((addr, value));
        }

        for (addr, value) in targets {
            if let Some(register) = Self::owner_mut(&mut map, addr) {
                register.replace_word(addr, value)?;
            }
        }
        Ok(())
    }

    /// Read the logical value of the register starting at `address`
    pub fn get_logical(&self, address: u16) -> Option<RegisterValue> {
        let map = self.lock().ok()?;
        map.get(&address).map(Register::value)
    }

    /// Write a logical value, bypassing client access rights
    ///
    /// Used by the simulation engine, which may update read-only telemetry.
    /// The value and all of its words change under one lock acquisition.
    pub fn set_logical(&self, address: u16, value: RegisterValue) -> ModbusResult<()> {
        let mut map = self.lock()?;
        let register = map
            .get_mut(&address)
            .ok_or_else(|| ModbusError::unmapped(address))?;
        register.set_value(value)
    }

    /// Static description of the register starting at `address`
    pub fn descriptor(&self, address: u16) -> Option<RegisterDescriptor> {
        let map = self.lock().ok()?;
        map.get(&address).map(|reg| RegisterDescriptor {
            address: reg.address,
            kind: reg.kind,
            format: reg.format,
        })
    }

    /// Get register bank statistics
    pub fn get_stats(&self) -> RegisterBankStats {
        match self.lock() {
            Ok(map) => RegisterBankStats {
                logical_registers: map.len(),
                mapped_words: map.values().map(|reg| reg.width_words() as usize).sum(),
                writable_registers: map.values().filter(|reg| reg.access.is_writable()).count(),
            },
            Err(_) => RegisterBankStats::default(),
        }
    }
}

/// Check that register word ranges are unique, disjoint and inside the address space
pub fn validate_layout(registers: &[Register]) -> ModbusResult<()> {
    let mut by_address: BTreeMap<u16, &Register> = BTreeMap::new();
    for register in registers {
        if register.end_address() > u16::MAX as u32 + 1 {
            return Err(ModbusError::configuration(format!(
                "Register {} ({}) runs past the end of the address space",
                register.address, register.kind
            )));
        }
        if by_address.insert(register.address, register).is_some() {
            return Err(ModbusError::configuration(format!(
                "Duplicate register address {}",
                register.address
            )));
        }
    }

    let mut previous: Option<&Register> = None;
    for &register in by_address.values() {
        if let Some(prev) = previous {
            if prev.end_address() > register.address as u32 {
                return Err(ModbusError::configuration(format!(
                    "Register {} ({}, {} words) overlaps register {}",
                    prev.address,
                    prev.kind,
                    prev.width_words(),
                    register.address
                )));
            }
        }
        previous = Some(register);
    }
    Ok(())
}

/// Register bank statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterBankStats {
    pub logical_registers: usize,
    pub mapped_words: usize,
    pub writable_registers: usize,
}

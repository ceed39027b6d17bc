/// Register data model
///
/// A logical register is one named slot of the simulated device. It may span
/// one, two or four consecutive 16-bit Modbus words; multi-word values are
/// stored big-endian (most significant word at the lowest address).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModbusError, ModbusResult};

/// Storage kind of a logical register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterKind {
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
}

impl RegisterKind {
    /// Number of 16-bit words a register of this kind occupies
    pub const fn width_words(self) -> u16 {
        match self {
            RegisterKind::U16 | RegisterKind::S16 => 1,
            RegisterKind::U32 | RegisterKind::S32 => 2,
            RegisterKind::U64 | RegisterKind::S64 => 4,
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterKind::U16 => "U16",
            RegisterKind::S16 => "S16",
            RegisterKind::U32 => "U32",
            RegisterKind::S32 => "S32",
            RegisterKind::U64 => "U64",
            RegisterKind::S64 => "S64",
        };
        f.write_str(name)
    }
}

/// Display semantics of a register
///
/// The format never changes how a value is stored. It tells a consumer how to
/// render the raw integer, and tells the simulation engine which fixed-point
/// scale to apply when it publishes a physical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterFormat {
    #[serde(rename = "RAW")]
    Raw,
    #[serde(rename = "ENUM")]
    Enum,
    #[serde(rename = "FIX0")]
    Fix0,
    #[serde(rename = "FIX1")]
    Fix1,
    #[serde(rename = "FIX2")]
    Fix2,
    #[serde(rename = "FIX3")]
    Fix3,
    #[serde(rename = "FIX4")]
    Fix4,
    /// Date/time as seconds since the Unix epoch
    #[serde(rename = "DT")]
    DateTime,
    /// Firmware version
    #[serde(rename = "FW")]
    Firmware,
    /// Temperature in tenths of a degree Celsius
    #[serde(rename = "TEMP")]
    Temperature,
    /// Duration in seconds
    #[serde(rename = "Duration")]
    Duration,
}

impl RegisterFormat {
    /// Number of implied decimal places
    pub const fn decimals(self) -> u32 {
        match self {
            RegisterFormat::Fix1 | RegisterFormat::Temperature => 1,
            RegisterFormat::Fix2 => 2,
            RegisterFormat::Fix3 => 3,
            RegisterFormat::Fix4 => 4,
            _ => 0,
        }
    }

    /// Factor a real value is multiplied by before it is stored
    pub fn scale(self) -> f64 {
        10f64.powi(self.decimals() as i32)
    }

    /// Convert a real quantity into the stored integer, rounding to nearest
    pub fn to_raw(self, value: f64) -> i64 {
        let scaled = (value * self.scale()).round();
        if scaled.is_nan() {
            0
        } else {
            // `as` saturates at the i64 bounds
            scaled as i64
        }
    }

    /// Convert a stored integer back into the real quantity
    pub fn to_real(self, raw: i64) -> f64 {
        raw as f64 / self.scale()
    }
}

/// Access rights a Modbus client has on a register
///
/// The simulation engine ignores access rights: it may always update
/// telemetry through the logical write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterAccess {
    RO,
    RW,
    WO,
}

impl RegisterAccess {
    /// Check if clients may write the register
    pub const fn is_writable(self) -> bool {
        matches!(self, RegisterAccess::RW | RegisterAccess::WO)
    }
}

/// Logical register value, one variant per storage kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterValue {
    U16(u16),
    S16(i16),
    U32(u32),
    S32(i32),
    U64(u64),
    S64(i64),
}

impl RegisterValue {
    /// Zero of the given kind
    pub const fn zero(kind: RegisterKind) -> Self {
        match kind {
            RegisterKind::U16 => RegisterValue::U16(0),
            RegisterKind::S16 => RegisterValue::S16(0),
            RegisterKind::U32 => RegisterValue::U32(0),
            RegisterKind::S32 => RegisterValue::S32(0),
            RegisterKind::U64 => RegisterValue::U64(0),
            RegisterKind::S64 => RegisterValue::S64(0),
        }
    }

    /// Storage kind of this value
    pub const fn kind(&self) -> RegisterKind {
        match self {
            RegisterValue::U16(_) => RegisterKind::U16,
            RegisterValue::S16(_) => RegisterKind::S16,
            RegisterValue::U32(_) => RegisterKind::U32,
            RegisterValue::S32(_) => RegisterKind::S32,
            RegisterValue::U64(_) => RegisterKind::U64,
            RegisterValue::S64(_) => RegisterKind::S64,
        }
    }

    /// Raw two's complement bits, zero-extended from the register width
    fn to_bits(self) -> u64 {
        match self {
            RegisterValue::U16(v) => v as u64,
            RegisterValue::S16(v) => v as u16 as u64,
            RegisterValue::U32(v) => v as u64,
            RegisterValue::S32(v) => v as u32 as u64,
            RegisterValue::U64(v) => v,
            RegisterValue::S64(v) => v as u64,
        }
    }

    fn from_bits(kind: RegisterKind, bits: u64) -> Self {
        match kind {
            RegisterKind::U16 => RegisterValue::U16(bits as u16),
            RegisterKind::S16 => RegisterValue::S16(bits as u16 as i16),
            RegisterKind::U32 => RegisterValue::U32(bits as u32),
            RegisterKind::S32 => RegisterValue::S32(bits as u32 as i32),
            RegisterKind::U64 => RegisterValue::U64(bits),
            RegisterKind::S64 => RegisterValue::S64(bits as i64),
        }
    }

    /// Decompose into Modbus words, most significant word first
    pub fn to_words(self) -> Vec<u16> {
        let width = self.kind().width_words();
        let bits = self.to_bits();
        (0..width)
            .map(|i| (bits >> (16 * (width - 1 - i))) as u16)
            .collect()
    }

    /// Compose a value from exactly `kind.width_words()` words
    pub fn from_words(kind: RegisterKind, words: &[u16]) -> ModbusResult<Self> {
        if words.len() != kind.width_words() as usize {
            return Err(ModbusError::invalid_data(format!(
                "{} needs {} words, got {}",
                kind,
                kind.width_words(),
                words.len()
            )));
        }
        let bits = words.iter().fold(0u64, |acc, &w| (acc << 16) | w as u64);
        Ok(Self::from_bits(kind, bits))
    }

    /// Build a value of `kind` from a wide integer, saturating at the kind's bounds
    pub fn saturating_from_i64(kind: RegisterKind, raw: i64) -> Self {
        match kind {
            RegisterKind::U16 => RegisterValue::U16(raw.clamp(0, u16::MAX as i64) as u16),
            RegisterKind::S16 => {
                RegisterValue::S16(raw.clamp(i16::MIN as i64, i16::MAX as i64) as i16)
            }
            RegisterKind::U32 => RegisterValue::U32(raw.clamp(0, u32::MAX as i64) as u32),
            RegisterKind::S32 => {
                RegisterValue::S32(raw.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            }
            RegisterKind::U64 => RegisterValue::U64(raw.max(0) as u64),
            RegisterKind::S64 => RegisterValue::S64(raw),
        }
    }

    /// Build a value of `kind` from a wide integer, failing if it does not fit
    pub fn checked_from_i128(kind: RegisterKind, raw: i128) -> Option<Self> {
        let value = match kind {
            RegisterKind::U16 => RegisterValue::U16(u16::try_from(raw).ok()?),
            RegisterKind::S16 => RegisterValue::S16(i16::try_from(raw).ok()?),
            RegisterKind::U32 => RegisterValue::U32(u32::try_from(raw).ok()?),
            RegisterKind::S32 => RegisterValue::S32(i32::try_from(raw).ok()?),
            RegisterKind::U64 => RegisterValue::U64(u64::try_from(raw).ok()?),
            RegisterKind::S64 => RegisterValue::S64(i64::try_from(raw).ok()?),
        };
        Some(value)
    }

    /// Value as a wide signed integer (lossless for every kind)
    pub fn as_i128(&self) -> i128 {
        match *self {
            RegisterValue::U16(v) => v as i128,
            RegisterValue::S16(v) => v as i128,
            RegisterValue::U32(v) => v as i128,
            RegisterValue::S32(v) => v as i128,
            RegisterValue::U64(v) => v as i128,
            RegisterValue::S64(v) => v as i128,
        }
    }

    /// Value as `u64`, `None` when negative
    pub fn as_u64(&self) -> Option<u64> {
        u64::try_from(self.as_i128()).ok()
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.as_i128())
    }
}

/// One logical register of the device model
///
/// Address, kind, format and access are fixed once the register bank is
/// initialised; only the value changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    /// Logical start address (SMA-style numbering, e.g. 30775)
    pub address: u16,
    pub kind: RegisterKind,
    pub format: RegisterFormat,
    pub access: RegisterAccess,
    /// Human-readable name, empty when the profile does not give one
    pub name: String,
    value: RegisterValue,
}

impl Register {
    /// Create a register holding zero of its kind
    pub fn new(address: u16, kind: RegisterKind, format: RegisterFormat, access: RegisterAccess) -> Self {
        Self {
            address,
            kind,
            format,
            access,
            name: String::new(),
            value: RegisterValue::zero(kind),
        }
    }

    /// Set the display name
    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Set the initial value, which must match the register kind
    pub fn with_value(mut self, value: RegisterValue) -> ModbusResult<Self> {
        self.set_value(value)?;
        Ok(self)
    }

    /// Current logical value
    pub fn value(&self) -> RegisterValue {
        self.value
    }

    /// Replace the value, rejecting a kind mismatch
    pub fn set_value(&mut self, value: RegisterValue) -> ModbusResult<()> {
        if value.kind() != self.kind {
            return Err(ModbusError::type_mismatch(self.address, self.kind, value.kind()));
        }
        self.value = value;
        Ok(())
    }

    /// Number of words owned, always derived from the kind
    pub fn width_words(&self) -> u16 {
        self.kind.width_words()
    }

    /// One past the last owned word address
    pub fn end_address(&self) -> u32 {
        self.address as u32 + self.width_words() as u32
    }

    /// Check if `address` is one of the words this register owns
    pub fn contains(&self, address: u16) -> bool {
        address >= self.address && (address as u32) < self.end_address()
    }

    /// Current value as Modbus words
    pub fn words(&self) -> Vec<u16> {
        self.value.to_words()
    }

    /// Replace the word at `address` and recompose the logical value
    pub(crate) fn replace_word(&mut self, address: u16, word: u16) -> ModbusResult<()> {
        if !self.contains(address) {
            return Err(ModbusError::unmapped(address));
        }
        let mut words = self.words();
        words[(address - self.address) as usize] = word;
        self.value = RegisterValue::from_words(self.kind, &words)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [RegisterKind; 6] = [
        RegisterKind::U16,
        RegisterKind::S16,
        RegisterKind::U32,
        RegisterKind::S32,
        RegisterKind::U64,
        RegisterKind::S64,
    ];

    #[test]
    fn test_width_is_derived_from_kind() {
        let widths: Vec<u16> = KINDS.iter().map(|k| k.width_words()).collect();
        assert_eq!(widths, vec![1, 1, 2, 2, 4, 4]);

        for kind in KINDS {
            assert_eq!(RegisterValue::zero(kind).to_words().len(), kind.width_words() as usize);
        }
    }

    #[test]
    fn test_big_endian_word_order() {
        assert_eq!(RegisterValue::U32(0x1234_5678).to_words(), vec![0x1234, 0x5678]);
        assert_eq!(RegisterValue::S32(-2).to_words(), vec![0xFFFF, 0xFFFE]);
        assert_eq!(
            RegisterValue::U64(0x0001_0002_0003_0004).to_words(),
            vec![0x0001, 0x0002, 0x0003, 0x0004]
        );
        assert_eq!(RegisterValue::S16(-1).to_words(), vec![0xFFFF]);
    }

    #[test]
    fn test_words_compose_back_to_value() {
        let samples = [
            RegisterValue::U16(0xBEEF),
            RegisterValue::S16(i16::MIN),
            RegisterValue::U32(u32::MAX),
            RegisterValue::S32(-123_456),
            RegisterValue::U64(u64::MAX - 7),
            RegisterValue::S64(i64::MIN + 3),
        ];
        for value in samples {
            let words = value.to_words();
            assert_eq!(RegisterValue::from_words(value.kind(), &words).unwrap(), value);
        }
    }

    #[test]
    fn test_from_words_checks_width() {
        assert!(RegisterValue::from_words(RegisterKind::U32, &[1]).is_err());
        assert!(RegisterValue::from_words(RegisterKind::U16, &[1, 2]).is_err());
    }

    #[test]
    fn test_saturating_conversion() {
        assert_eq!(RegisterValue::saturating_from_i64(RegisterKind::U16, -5), RegisterValue::U16(0));
        assert_eq!(
            RegisterValue::saturating_from_i64(RegisterKind::S16, 70_000),
            RegisterValue::S16(i16::MAX)
        );
        assert_eq!(RegisterValue::saturating_from_i64(RegisterKind::U64, 42), RegisterValue::U64(42));
        assert_eq!(
            RegisterValue::saturating_from_i64(RegisterKind::S32, -5000),
            RegisterValue::S32(-5000)
        );
    }

    #[test]
    fn test_checked_conversion() {
        assert_eq!(
            RegisterValue::checked_from_i128(RegisterKind::U32, 381),
            Some(RegisterValue::U32(381))
        );
        assert_eq!(RegisterValue::checked_from_i128(RegisterKind::U16, 65_536), None);
        assert_eq!(RegisterValue::checked_from_i128(RegisterKind::U64, -1), None);
    }

    #[test]
    fn test_fixed_point_scaling() {
        assert_eq!(RegisterFormat::Fix3.to_raw(21.7391), 21_739);
        assert_eq!(RegisterFormat::Temperature.to_raw(43.26), 433);
        assert_eq!(RegisterFormat::Fix0.to_raw(4999.6), 5000);
        assert_eq!(RegisterFormat::Enum.scale(), 1.0);
        assert!((RegisterFormat::Fix2.to_real(23_015) - 230.15).abs() < 1e-9);
    }

    #[test]
    fn test_replace_word_recomposes_value() {
        let mut reg = Register::new(40009, RegisterKind::U32, RegisterFormat::Enum, RegisterAccess::RW);
        reg.replace_word(40010, 381).unwrap();
        assert_eq!(reg.value(), RegisterValue::U32(381));
        reg.replace_word(40009, 1).unwrap();
        assert_eq!(reg.value(), RegisterValue::U32(0x0001_017D));
        assert!(reg.replace_word(40011, 0).is_err());
    }

    #[test]
    fn test_set_value_rejects_kind_mismatch() {
        let mut reg = Register::new(30775, RegisterKind::S32, RegisterFormat::Fix0, RegisterAccess::RO);
        assert!(matches!(
            reg.set_value(RegisterValue::U16(1)),
            Err(ModbusError::TypeMismatch { .. })
        ));
        assert_eq!(reg.value(), RegisterValue::S32(0));
    }
}

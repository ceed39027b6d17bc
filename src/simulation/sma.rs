//! Logical register map of the simulated SMA-style inverter
//!
//! Addresses are logical (30xxx input, 40xxx holding). The engine publishes
//! into whichever of these the loaded profile defines and skips the rest.

// Identity, written once at engine construction
pub const SUSY_ID: u16 = 30003;
pub const SERIAL_NUMBER: u16 = 30005;
pub const DEVICE_CLASS: u16 = 30051;
pub const SUSY_ID_MIRROR: u16 = 30053;
pub const MANUFACTURER: u16 = 30055;
pub const SERIAL_NUMBER_MIRROR: u16 = 30057;
pub const SOFTWARE_PACKAGE: u16 = 30059;
pub const RATED_POWER: u16 = 30231;

// Status
pub const DEVICE_STATUS: u16 = 30201;
pub const GRID_CONTACTOR: u16 = 30217;

// Accumulators
pub const TOTAL_YIELD: u16 = 30513;
pub const DAILY_YIELD: u16 = 30517;
pub const OPERATING_TIME: u16 = 30521;
pub const FEED_IN_TIME: u16 = 30525;
pub const GRID_CONNECTIONS: u16 = 30599;

// DC input A
pub const DC_CURRENT_A: u16 = 30769;
pub const DC_VOLTAGE_A: u16 = 30771;
pub const DC_POWER_A: u16 = 30773;

// AC output
pub const AC_POWER: u16 = 30775;
pub const AC_POWER_L1: u16 = 30777;
pub const AC_POWER_L2: u16 = 30779;
pub const AC_POWER_L3: u16 = 30781;
pub const GRID_VOLTAGE_L1: u16 = 30783;
pub const GRID_VOLTAGE_L2: u16 = 30785;
pub const GRID_VOLTAGE_L3: u16 = 30787;
pub const GRID_CURRENT: u16 = 30797;
pub const GRID_FREQUENCY: u16 = 30803;
pub const REACTIVE_POWER: u16 = 30805;
pub const APPARENT_POWER: u16 = 30813;
pub const POWER_FACTOR: u16 = 30949;
pub const INTERNAL_TEMPERATURE: u16 = 30953;

// DC input B
pub const DC_CURRENT_B: u16 = 30957;
pub const DC_VOLTAGE_B: u16 = 30959;
pub const DC_POWER_B: u16 = 30961;

pub const GRID_CURRENT_L1: u16 = 30977;
pub const GRID_CURRENT_L2: u16 = 30979;
pub const GRID_CURRENT_L3: u16 = 30981;

// Commands
pub const OPERATING_STATE_CMD: u16 = 40009;
pub const ACKNOWLEDGE_CMD: u16 = 40011;

/// Operating state command: start in MPP mode
pub const CMD_MPP: u32 = 295;
/// Operating state command: stop
pub const CMD_STOP: u32 = 381;
/// Acknowledge command: acknowledge the pending error
pub const CMD_ACKNOWLEDGE: u32 = 26;

/// Device status enumerators
pub const STATUS_OK: u32 = 307;
pub const STATUS_OFF: u32 = 303;
pub const STATUS_ERROR: u32 = 35;
pub const STATUS_WARNING: u32 = 455;

/// Grid contactor enumerators
pub const CONTACTOR_CLOSED: u32 = 51;
pub const CONTACTOR_OPEN: u32 = 311;

//! Device profile configuration
//!
//! A profile describes the simulated device in three sections: the static
//! identity, the simulation parameters (including the weather scenarios), and
//! the initial register list. Profiles are YAML or JSON documents:
//!
//! ```yaml
//! device_identity:
//!   unit_id: 3
//!   serial_number: 3001234567
//!   susy_id: 9346
//!   device_class: 8001
//!   manufacturer: 461
//!   software_package: 50462756
//! simulation_parameters:
//!   update_interval_ms: 1000
//!   max_power_watts: 5000
//!   efficiency_percent: 97.0
//!   max_internal_temp_celsius: 60.0
//!   fault_probability_percent: 0.0
//!   weather_change_interval_seconds: 300
//!   weather_models:
//!     - { name: Sunny, power_multiplier: 1.0 }
//! registers:
//!   - { address: 30775, type: S32, format: FIX0, access: RO, name: "AC power" }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ModbusError, ModbusResult};
use crate::register::{Register, RegisterAccess, RegisterFormat, RegisterKind, RegisterValue};
use crate::register_bank;

/// Static identification of the simulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub unit_id: u8,
    pub serial_number: u32,
    pub susy_id: u32,
    pub device_class: u32,
    pub manufacturer: u32,
    pub software_package: u32,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            unit_id: 3,
            serial_number: 3_001_234_567,
            susy_id: 9346,
            device_class: 8001,
            manufacturer: 461,
            software_package: 50_462_756,
        }
    }
}

/// Named weather scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherModel {
    pub name: String,
    /// Scales the instantaneous power output
    pub power_multiplier: f64,
    /// Scales the thermal heating contribution
    #[serde(default = "default_temp_increase_factor")]
    pub temp_increase_factor: f64,
}

impl WeatherModel {
    pub fn new<S: Into<String>>(name: S, power_multiplier: f64) -> Self {
        Self {
            name: name.into(),
            power_multiplier,
            temp_increase_factor: default_temp_increase_factor(),
        }
    }
}

fn default_temp_increase_factor() -> f64 {
    1.0
}

fn default_power_variation_percent() -> f64 {
    3.0
}

fn default_phase_imbalance_percent() -> f64 {
    1.0
}

fn default_voltage_variation_percent() -> f64 {
    1.0
}

fn default_grid_voltage_nominal() -> f64 {
    230.0
}

fn default_grid_frequency_nominal() -> f64 {
    50.0
}

fn default_frequency_variation_hz() -> f64 {
    0.05
}

fn default_ambient_temp_celsius() -> f64 {
    25.0
}

/// Parameters controlling the simulation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Tick interval
    pub update_interval_ms: u64,
    /// Rated AC power
    pub max_power_watts: f64,
    /// DC to AC conversion efficiency
    pub efficiency_percent: f64,
    /// Internal temperature reached at rated power
    pub max_internal_temp_celsius: f64,
    /// Per-tick chance of a fault at zero load
    pub fault_probability_percent: f64,
    /// Bound of the short-term random variation of the power output
    #[serde(default = "default_power_variation_percent")]
    pub power_variation_percent: f64,
    /// Bound of the random imbalance applied to phases L1 and L2
    #[serde(default = "default_phase_imbalance_percent")]
    pub phase_imbalance_percent: f64,
    #[serde(default = "default_voltage_variation_percent")]
    pub voltage_variation_percent: f64,
    #[serde(default = "default_grid_voltage_nominal")]
    pub grid_voltage_nominal: f64,
    #[serde(default = "default_grid_frequency_nominal")]
    pub grid_frequency_nominal: f64,
    #[serde(default = "default_frequency_variation_hz")]
    pub frequency_variation_hz: f64,
    /// Local hour at which the daily yield is zeroed
    #[serde(default)]
    pub daily_yield_reset_hour: u32,
    #[serde(default = "default_ambient_temp_celsius")]
    pub ambient_temp_celsius: f64,
    #[serde(default)]
    pub startup_delay_seconds: u64,
    #[serde(default)]
    pub shutdown_delay_seconds: u64,
    pub weather_change_interval_seconds: u64,
    pub weather_models: Vec<WeatherModel>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            update_interval_ms: 1000,
            max_power_watts: 5000.0,
            efficiency_percent: 97.0,
            max_internal_temp_celsius: 60.0,
            fault_probability_percent: 0.0,
            power_variation_percent: default_power_variation_percent(),
            phase_imbalance_percent: default_phase_imbalance_percent(),
            voltage_variation_percent: default_voltage_variation_percent(),
            grid_voltage_nominal: default_grid_voltage_nominal(),
            grid_frequency_nominal: default_grid_frequency_nominal(),
            frequency_variation_hz: default_frequency_variation_hz(),
            daily_yield_reset_hour: 0,
            ambient_temp_celsius: default_ambient_temp_celsius(),
            startup_delay_seconds: 0,
            shutdown_delay_seconds: 0,
            weather_change_interval_seconds: 300,
            weather_models: vec![
                WeatherModel::new("Sunny", 1.0),
                WeatherModel {
                    name: "Partly cloudy".to_string(),
                    power_multiplier: 0.6,
                    temp_increase_factor: 0.8,
                },
                WeatherModel {
                    name: "Overcast".to_string(),
                    power_multiplier: 0.2,
                    temp_increase_factor: 0.5,
                },
            ],
        }
    }
}

/// Initial value of a register entry
///
/// Unsigned is tried first so values above `i64::MAX` still load into U64
/// registers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialValue {
    Unsigned(u64),
    Signed(i64),
}

impl InitialValue {
    fn as_i128(self) -> i128 {
        match self {
            InitialValue::Unsigned(v) => v as i128,
            InitialValue::Signed(v) => v as i128,
        }
    }
}

/// One entry of the register list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterConfig {
    pub address: u16,
    #[serde(rename = "type")]
    pub kind: RegisterKind,
    pub format: RegisterFormat,
    pub access: RegisterAccess,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<InitialValue>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl RegisterConfig {
    pub fn new(address: u16, kind: RegisterKind, format: RegisterFormat, access: RegisterAccess) -> Self {
        Self {
            address,
            kind,
            format,
            access,
            value: None,
            name: String::new(),
        }
    }

    /// Build the register, checking that the initial value fits its kind
    pub fn to_register(&self) -> ModbusResult<Register> {
        let register = Register::new(self.address, self.kind, self.format, self.access)
            .named(self.name.clone());
        match self.value {
            None => Ok(register),
            Some(initial) => {
                let value = RegisterValue::checked_from_i128(self.kind, initial.as_i128())
                    .ok_or_else(|| {
                        ModbusError::configuration(format!(
                            "Initial value {} of register {} does not fit {}",
                            initial.as_i128(),
                            self.address,
                            self.kind
                        ))
                    })?;
                register.with_value(value)
            }
        }
    }
}

/// Complete device profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub device_identity: DeviceIdentity,
    pub simulation_parameters: SimulationParams,
    #[serde(default)]
    pub registers: Vec<RegisterConfig>,
}

impl Config {
    /// Load a profile, choosing the parser from the file extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> ModbusResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ModbusError::configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") | None => Self::from_yaml_str(&content),
            Some(other) => Err(ModbusError::configuration(format!(
                "Unsupported configuration format '.{}'",
                other
            ))),
        }
    }

    pub fn from_yaml_str(content: &str) -> ModbusResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> ModbusResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build the initial register list
    pub fn to_registers(&self) -> ModbusResult<Vec<Register>> {
        self.registers.iter().map(RegisterConfig::to_register).collect()
    }

    /// Check the whole profile before any component starts
    pub fn validate(&self) -> ModbusResult<()> {
        let params = &self.simulation_parameters;

        if params.update_interval_ms == 0 {
            return Err(ModbusError::configuration("update_interval_ms must be positive"));
        }
        if !(params.max_power_watts > 0.0) {
            return Err(ModbusError::configuration("max_power_watts must be positive"));
        }
        if !(params.efficiency_percent > 0.0 && params.efficiency_percent <= 100.0) {
            return Err(ModbusError::configuration(format!(
                "efficiency_percent {} is outside (0, 100]",
                params.efficiency_percent
            )));
        }
        if !(0.0..=100.0).contains(&params.fault_probability_percent) {
            return Err(ModbusError::configuration(format!(
                "fault_probability_percent {} is outside [0, 100]",
                params.fault_probability_percent
            )));
        }
        if params.daily_yield_reset_hour > 23 {
            return Err(ModbusError::configuration(format!(
                "daily_yield_reset_hour {} is not an hour of the day",
                params.daily_yield_reset_hour
            )));
        }
        for (name, value) in [
            ("power_variation_percent", params.power_variation_percent),
            ("phase_imbalance_percent", params.phase_imbalance_percent),
            ("voltage_variation_percent", params.voltage_variation_percent),
            ("frequency_variation_hz", params.frequency_variation_hz),
        ] {
            if !(value >= 0.0) {
                return Err(ModbusError::configuration(format!("{} must not be negative", name)));
            }
        }

        if params.weather_models.is_empty() {
            return Err(ModbusError::configuration("At least one weather model is required"));
        }
        for model in &params.weather_models {
            if !(model.power_multiplier >= 0.0) || !(model.temp_increase_factor >= 0.0) {
                return Err(ModbusError::configuration(format!(
                    "Weather model '{}' has a negative multiplier",
                    model.name
                )));
            }
        }

        let registers = self.to_registers()?;
        register_bank::validate_layout(&registers)
    }
}

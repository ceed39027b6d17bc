//! Physical model of the inverter
//!
//! Pure functions of simulated time, configuration and an injected random
//! source. Nothing here touches the register bank.

use chrono::{Datelike, NaiveDateTime, Timelike};
use rand::Rng;
use std::f64::consts::PI;

use crate::config::{SimulationParams, WeatherModel};

/// Internal temperature above which output is derated
pub const DERATING_THRESHOLD_CELSIUS: f64 = 65.0;
/// Output lost per degree above the threshold
pub const DERATING_PER_DEGREE: f64 = 0.02;
/// Lowest derating factor
pub const DERATING_FLOOR: f64 = 0.5;

/// Share of DC power on string A; string B takes the rest
pub const STRING_A_SHARE: f64 = 0.52;

/// Power factor published while not producing
pub const IDLE_POWER_FACTOR: f64 = 1.0;

/// Uniform draw in `[-bound, bound]`, zero when the bound is not positive
fn symmetric<R: Rng>(rng: &mut R, bound: f64) -> f64 {
    if bound > 0.0 {
        rng.random_range(-bound..=bound)
    } else {
        0.0
    }
}

/// Position of `day_of_year` in the yearly cycle, zero at the spring equinox
fn season_phase(day_of_year: u32) -> f64 {
    (2.0 * PI * (day_of_year as f64 - 80.0) / 365.0).sin()
}

/// Sunrise and sunset in fractional local hours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarWindow {
    pub sunrise: f64,
    pub sunset: f64,
}

impl SolarWindow {
    /// Days are 12 h at the equinoxes and 15 h at midsummer
    pub fn for_day(day_of_year: u32) -> Self {
        let s = season_phase(day_of_year);
        Self {
            sunrise: 6.0 - 1.5 * s,
            sunset: 18.0 + 1.5 * s,
        }
    }

    /// Check if the sun is up; both ends of the window are dark
    pub fn contains(&self, hour: f64) -> bool {
        hour > self.sunrise && hour < self.sunset
    }
}

/// Fractional local hour of day
pub fn hour_of_day(now: &NaiveDateTime) -> f64 {
    now.hour() as f64 + now.minute() as f64 / 60.0 + now.second() as f64 / 3600.0
}

/// Bell-shaped irradiance factor in `[0, 1]`, peaking at the middle of the window
pub fn solar_factor(hour: f64, day_of_year: u32) -> f64 {
    let window = SolarWindow::for_day(day_of_year);
    if !window.contains(hour) {
        return 0.0;
    }
    let progress = (hour - window.sunrise) / (window.sunset - window.sunrise);
    (PI * progress).sin().powi(2)
}

/// Yearly irradiance factor, 0.7 at midwinter and 1.0 at midsummer
pub fn seasonal_factor(day_of_year: u32) -> f64 {
    0.85 + 0.15 * season_phase(day_of_year)
}

/// Instantaneous AC power before derating
///
/// Zero outside the sunrise to sunset window; inside it, the product of the
/// solar, seasonal and weather factors with a short-term variation of at most
/// `power_variation_percent`, clamped to rated power.
pub fn calculate_power_output<R: Rng>(
    params: &SimulationParams,
    now: &NaiveDateTime,
    weather: &WeatherModel,
    rng: &mut R,
) -> f64 {
    let solar = solar_factor(hour_of_day(now), now.ordinal());
    if solar <= 0.0 {
        return 0.0;
    }

    let variation = 1.0 + symmetric(rng, params.power_variation_percent / 100.0);
    let power = params.max_power_watts * solar * seasonal_factor(now.ordinal())
        * weather.power_multiplier
        * variation;
    power.clamp(0.0, params.max_power_watts)
}

/// Internal temperature the device settles at for a given load
pub fn internal_temperature(params: &SimulationParams, power_ratio: f64, weather: &WeatherModel) -> f64 {
    let heating = (params.max_internal_temp_celsius - params.ambient_temp_celsius)
        * power_ratio.clamp(0.0, 1.0)
        * weather.temp_increase_factor;
    params.ambient_temp_celsius + heating
}

/// Output factor applied at `temperature`
pub fn derating_factor(temperature: f64) -> f64 {
    if temperature <= DERATING_THRESHOLD_CELSIUS {
        1.0
    } else {
        (1.0 - DERATING_PER_DEGREE * (temperature - DERATING_THRESHOLD_CELSIUS)).max(DERATING_FLOOR)
    }
}

/// Split whole-watt `total` over three phases
///
/// L1 and L2 get an independent imbalance of up to `imbalance_percent` and are
/// rounded to whole watts; L3 takes the remainder so the phases always add up
/// to `total` exactly.
pub fn split_phases<R: Rng>(total: f64, imbalance_percent: f64, rng: &mut R) -> [f64; 3] {
    let total = total.round();
    let share = total / 3.0;
    let bound = imbalance_percent / 100.0;
    let l1 = (share * (1.0 + symmetric(rng, bound))).round();
    let l2 = (share * (1.0 + symmetric(rng, bound))).round();
    [l1, l2, total - l1 - l2]
}

/// Electrical quantities of one DC input
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DcString {
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
}

impl DcString {
    fn at(power: f64, normalized: f64, base_voltage: f64, slope: f64) -> Self {
        if power <= 0.0 {
            return Self::default();
        }
        let voltage = base_voltage + slope * normalized;
        Self {
            power,
            voltage,
            current: power / voltage,
        }
    }
}

/// DC side of the inverter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DcSide {
    pub total_power: f64,
    pub string_a: DcString,
    pub string_b: DcString,
}

/// DC input needed to deliver `ac_power` at the configured efficiency
pub fn dc_side(params: &SimulationParams, ac_power: f64) -> DcSide {
    let total_power = ac_power.max(0.0) / (params.efficiency_percent / 100.0);
    let normalized = (ac_power / params.max_power_watts).clamp(0.0, 1.0);
    DcSide {
        total_power,
        string_a: DcString::at(total_power * STRING_A_SHARE, normalized, 320.0, 180.0),
        string_b: DcString::at(total_power * (1.0 - STRING_A_SHARE), normalized, 300.0, 170.0),
    }
}

/// AC grid side of the inverter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridSide {
    pub voltages: [f64; 3],
    pub currents: [f64; 3],
    pub total_current: f64,
    pub frequency: f64,
    pub power_factor: f64,
    pub reactive_power: f64,
    pub apparent_power: f64,
}

/// Power factor for a load ratio, 0.95 at no load up to 0.99 at rated power
pub fn power_factor(power_ratio: f64) -> f64 {
    0.95 + 0.04 * power_ratio.clamp(0.0, 1.0)
}

/// Grid voltages, currents, frequency and power triangle
///
/// `elapsed_secs` drives a small periodic ripple on the phase voltages,
/// shifted by a third of a period per phase.
pub fn grid_side<R: Rng>(
    params: &SimulationParams,
    phase_powers: &[f64; 3],
    elapsed_secs: f64,
    rng: &mut R,
) -> GridSide {
    let ac_power: f64 = phase_powers.iter().sum();
    let variation = params.voltage_variation_percent / 100.0;

    let mut voltages = [0.0; 3];
    let mut currents = [0.0; 3];
    for phase in 0..3 {
        let ripple = 0.002 * (2.0 * PI * elapsed_secs / 60.0 + phase as f64 * 2.0 * PI / 3.0).sin();
        voltages[phase] = params.grid_voltage_nominal * (1.0 + symmetric(rng, variation) + ripple);
        currents[phase] = if voltages[phase] > 0.0 {
            phase_powers[phase].max(0.0) / voltages[phase]
        } else {
            0.0
        };
    }

    let frequency = params.grid_frequency_nominal + symmetric(rng, params.frequency_variation_hz);

    let (power_factor, reactive_power, apparent_power) = if ac_power > 0.0 {
        let pf = power_factor(ac_power / params.max_power_watts);
        (pf, ac_power * pf.acos().tan(), ac_power / pf)
    } else {
        (IDLE_POWER_FACTOR, 0.0, 0.0)
    };

    GridSide {
        voltages,
        currents,
        total_current: currents.iter().sum(),
        frequency,
        power_factor,
        reactive_power,
        apparent_power,
    }
}

/// Exponential smoothing giving the published temperature thermal inertia
pub fn smooth_temperature(previous: f64, instantaneous: f64) -> f64 {
    0.9 * previous + 0.1 * instantaneous
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(day_of_year: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_yo_opt(2024, day_of_year)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn quiet_params() -> SimulationParams {
        SimulationParams {
            power_variation_percent: 0.0,
            phase_imbalance_percent: 0.0,
            voltage_variation_percent: 0.0,
            frequency_variation_hz: 0.0,
            ..SimulationParams::default()
        }
    }

    #[test]
    fn test_solar_window_follows_season() {
        let summer = SolarWindow::for_day(172);
        let winter = SolarWindow::for_day(355);
        assert!(summer.sunrise < 4.6 && summer.sunset > 19.4);
        assert!(winter.sunrise > 7.4 && winter.sunset < 16.6);
        let equinox = SolarWindow::for_day(80);
        assert!((equinox.sunrise - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_solar_factor_is_bell_shaped() {
        assert!((solar_factor(12.0, 172) - 1.0).abs() < 1e-3);
        assert!(solar_factor(9.0, 172) < solar_factor(11.0, 172));
        assert!((solar_factor(9.0, 80) - solar_factor(15.0, 80)).abs() < 1e-9);
        assert_eq!(solar_factor(2.0, 172), 0.0);
        assert_eq!(solar_factor(6.0, 80), 0.0);
        assert_eq!(solar_factor(18.0, 80), 0.0);
    }

    #[test]
    fn test_power_is_zero_outside_window() {
        let params = SimulationParams::default();
        let weather = WeatherModel::new("Sunny", 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        for hour in [0, 3, 5, 20, 23] {
            assert_eq!(calculate_power_output(&params, &at(80, hour, 0), &weather, &mut rng), 0.0);
        }
    }

    #[test]
    fn test_power_inside_window_is_positive_and_bounded() {
        let params = SimulationParams::default();
        let weather = WeatherModel::new("Partly cloudy", 0.6);
        let bound = params.max_power_watts * weather.power_multiplier
            * (1.0 + params.power_variation_percent / 100.0);
        let mut rng = StdRng::seed_from_u64(2);
        for hour in 7..18 {
            for minute in [0, 30] {
                let power = calculate_power_output(&params, &at(120, hour, minute), &weather, &mut rng);
                assert!(power > 0.0, "{}:{} gave {}", hour, minute, power);
                assert!(power <= bound);
            }
        }
    }

    #[test]
    fn test_power_is_clamped_to_rated() {
        let params = SimulationParams {
            power_variation_percent: 10.0,
            ..SimulationParams::default()
        };
        let weather = WeatherModel::new("Clear sky", 1.5);
        let mut rng = StdRng::seed_from_u64(3);
        let power = calculate_power_output(&params, &at(172, 12, 0), &weather, &mut rng);
        assert_eq!(power, params.max_power_watts);
    }

    #[test]
    fn test_noon_midsummer_reaches_rated_power() {
        let params = quiet_params();
        let weather = WeatherModel::new("Sunny", 1.0);
        let power = calculate_power_output(&params, &at(172, 12, 0), &weather, &mut StdRng::seed_from_u64(4));
        assert!((power - 5000.0).abs() < 5.0, "power {}", power);
    }

    #[test]
    fn test_temperature_and_derating() {
        let params = SimulationParams {
            ambient_temp_celsius: 25.0,
            max_internal_temp_celsius: 85.0,
            ..SimulationParams::default()
        };
        let weather = WeatherModel::new("Sunny", 1.0);
        assert_eq!(internal_temperature(&params, 0.0, &weather), 25.0);
        assert_eq!(internal_temperature(&params, 1.0, &weather), 85.0);

        assert_eq!(derating_factor(60.0), 1.0);
        assert_eq!(derating_factor(65.0), 1.0);
        assert!((derating_factor(75.0) - 0.8).abs() < 1e-9);
        assert_eq!(derating_factor(120.0), DERATING_FLOOR);
    }

    #[test]
    fn test_phase_split_conserves_total() {
        let mut rng = StdRng::seed_from_u64(5);
        for total in [0.0, 1.0, 2.0, 1234.4, 4999.6, 5000.0] {
            let phases = split_phases(total, 5.0, &mut rng);
            assert_eq!(phases.iter().sum::<f64>(), total.round());
            for phase in phases {
                assert_eq!(phase, phase.round());
            }
        }
    }

    #[test]
    fn test_phase_imbalance_is_bounded() {
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..100 {
            let [l1, l2, l3] = split_phases(3000.0, 1.0, &mut rng);
            for phase in [l1, l2, l3] {
                assert!((phase - 1000.0).abs() <= 21.0, "phase {}", phase);
            }
        }
    }

    #[test]
    fn test_dc_side_uses_efficiency() {
        let params = SimulationParams {
            efficiency_percent: 96.0,
            ..SimulationParams::default()
        };
        let dc = dc_side(&params, 4800.0);
        assert!((dc.total_power - 5000.0).abs() < 1e-6);
        assert!((dc.string_a.power - 2600.0).abs() < 1e-6);
        assert!((dc.string_b.power - 2400.0).abs() < 1e-6);
        let a = dc.string_a;
        assert!((a.voltage * a.current - a.power).abs() < 1e-6);

        let night = dc_side(&params, 0.0);
        assert_eq!(night.string_a, DcString::default());
        assert_eq!(night.total_power, 0.0);
    }

    #[test]
    fn test_grid_side_power_triangle() {
        let params = quiet_params();
        let mut rng = StdRng::seed_from_u64(7);
        let grid = grid_side(&params, &[1000.0, 1000.0, 1000.0], 0.0, &mut rng);
        assert_eq!(grid.frequency, 50.0);
        assert!((grid.power_factor - (0.95 + 0.04 * 0.6)).abs() < 1e-9);
        let s2 = grid.apparent_power.powi(2);
        let pq2 = 3000f64.powi(2) + grid.reactive_power.powi(2);
        assert!((s2 - pq2).abs() / s2 < 1e-9);
        for voltage in grid.voltages {
            assert!((voltage - 230.0).abs() <= 230.0 * 0.002 + 1e-9);
        }
        assert!((grid.total_current - 3000.0 / 230.0).abs() < 0.1);
    }

    #[test]
    fn test_grid_side_idle() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(8);
        let grid = grid_side(&params, &[0.0; 3], 12.5, &mut rng);
        assert_eq!(grid.power_factor, IDLE_POWER_FACTOR);
        assert_eq!(grid.reactive_power, 0.0);
        assert_eq!(grid.total_current, 0.0);
        assert!((grid.frequency - 50.0).abs() <= 0.05);
    }

    #[test]
    fn test_temperature_smoothing() {
        let mut temperature = 25.0;
        for _ in 0..10 {
            temperature = smooth_temperature(temperature, 60.0);
        }
        assert!(temperature > 40.0 && temperature < 60.0);
    }
}

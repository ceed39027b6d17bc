//! Simulation engine
//!
//! Once per tick the engine reads the command registers, advances the state
//! machine, runs the physical model and publishes a complete telemetry
//! snapshot into the register bank. A tick never fails: registers missing
//! from the profile are read as their defaults and skipped on publish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::model::{self, GridSide};
use super::sma;
use super::state::{Commands, DeviceState, StateMachine};
use crate::config::{DeviceIdentity, SimulationParams, WeatherModel};
use crate::error::{ModbusError, ModbusResult};
use crate::register::RegisterValue;
use crate::register_bank::RegisterBank;
use crate::utils::{OperationTimer, PerformanceMetrics};

/// AC output below which the device is not feeding in
pub const FEED_IN_THRESHOLD_WATTS: f64 = 10.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Values computed by one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub state: DeviceState,
    pub weather: String,
    pub ac_power: f64,
    pub phase_powers: [f64; 3],
    pub internal_temperature: f64,
    pub contactor_closed: bool,
}

/// Drives the register bank through simulated time
#[derive(Debug)]
pub struct SimulationEngine<R: Rng = StdRng> {
    register_bank: Arc<RegisterBank>,
    params: SimulationParams,
    state: StateMachine,
    rng: R,
    weather_index: usize,
    /// Simulated time of the last weather draw
    last_weather_change: Option<f64>,
    last_reset_day: Option<NaiveDate>,
    smoothed_temperature: f64,
    last_power_ratio: f64,
    /// Seconds of simulated time since the engine was created
    simulated_secs: f64,
    // Fractions not yet published to integer accumulators
    energy_carry_wh: f64,
    operating_carry_secs: f64,
    feed_in_carry_secs: f64,
    /// Time the contactor has been closed without interruption
    contactor_closed_secs: f64,
    metrics: PerformanceMetrics,
}

impl SimulationEngine<StdRng> {
    /// Create an engine seeded from the operating system
    pub fn new(register_bank: Arc<RegisterBank>, identity: &DeviceIdentity, params: SimulationParams) -> Self {
        Self::with_rng(register_bank, identity, params, StdRng::from_os_rng())
    }
}

impl<R: Rng> SimulationEngine<R> {
    /// Create an engine with an explicit random source
    ///
    /// Identity registers are published here, once.
    pub fn with_rng(
        register_bank: Arc<RegisterBank>,
        identity: &DeviceIdentity,
        params: SimulationParams,
        rng: R,
    ) -> Self {
        let engine = Self {
            register_bank,
            smoothed_temperature: params.ambient_temp_celsius,
            params,
            state: StateMachine::default(),
            rng,
            weather_index: 0,
            last_weather_change: None,
            last_reset_day: None,
            last_power_ratio: 0.0,
            simulated_secs: 0.0,
            energy_carry_wh: 0.0,
            operating_carry_secs: 0.0,
            feed_in_carry_secs: 0.0,
            contactor_closed_secs: 0.0,
            metrics: PerformanceMetrics::new(),
        };
        engine.publish_identity(identity);
        engine
    }

    pub fn register_bank(&self) -> &Arc<RegisterBank> {
        &self.register_bank
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn state(&self) -> DeviceState {
        self.state.state()
    }

    /// Weather model currently in effect
    pub fn weather(&self) -> Option<&WeatherModel> {
        self.params.weather_models.get(self.weather_index)
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    fn publish_identity(&self, identity: &DeviceIdentity) {
        self.publish_counter(sma::SUSY_ID, identity.susy_id as u64);
        self.publish_counter(sma::SUSY_ID_MIRROR, identity.susy_id as u64);
        self.publish_counter(sma::SERIAL_NUMBER, identity.serial_number as u64);
        self.publish_counter(sma::SERIAL_NUMBER_MIRROR, identity.serial_number as u64);
        self.publish_counter(sma::DEVICE_CLASS, identity.device_class as u64);
        self.publish_counter(sma::MANUFACTURER, identity.manufacturer as u64);
        self.publish_counter(sma::SOFTWARE_PACKAGE, identity.software_package as u64);
        self.publish(sma::RATED_POWER, self.params.max_power_watts);
        debug!("Published identity of unit {} (serial {})", identity.unit_id, identity.serial_number);
    }

    /// Run one tick at simulated local time `now`
    ///
    /// `elapsed_secs` is the simulated time since the previous tick and drives
    /// the accumulators.
    pub fn tick_at(&mut self, now: NaiveDateTime, elapsed_secs: f64) -> TickSummary {
        let timer = OperationTimer::start("simulation tick");
        let elapsed_secs = elapsed_secs.max(0.0);
        self.simulated_secs += elapsed_secs;

        self.reset_daily_yield(&now);

        let commands = self.read_commands();
        let transition = self.state.step(
            commands,
            self.params.fault_probability_percent,
            self.last_power_ratio,
            &mut self.rng,
        );
        if transition.acknowledged {
            self.publish_counter(sma::ACKNOWLEDGE_CMD, 0);
        }

        self.update_weather();
        let weather = self
            .weather()
            .cloned()
            .unwrap_or_else(|| WeatherModel::new("Clear", 1.0));

        let state = self.state.state();
        let raw_power = if state == DeviceState::Ok {
            model::calculate_power_output(&self.params, &now, &weather, &mut self.rng)
        } else {
            0.0
        };

        let rated = self.params.max_power_watts;
        let temperature = model::internal_temperature(&self.params, raw_power / rated, &weather);
        let derating = model::derating_factor(temperature);
        if derating < 1.0 {
            debug!("Derating to {:.0}% at {:.1} °C", derating * 100.0, temperature);
        }
        let ac_power = (raw_power * derating).round();

        let phase_powers = model::split_phases(ac_power, self.params.phase_imbalance_percent, &mut self.rng);
        let dc = model::dc_side(&self.params, ac_power);
        let grid = model::grid_side(&self.params, &phase_powers, self.simulated_secs, &mut self.rng);

        let feeding_in = ac_power > FEED_IN_THRESHOLD_WATTS;
        let contactor_closed = state == DeviceState::Ok && feeding_in;
        self.update_accumulators(elapsed_secs, ac_power, feeding_in, contactor_closed);

        self.smoothed_temperature = model::smooth_temperature(self.smoothed_temperature, temperature);
        self.last_power_ratio = ac_power / rated;

        self.publish(sma::DEVICE_STATUS, state.status_code() as f64);
        let contactor = if contactor_closed {
            sma::CONTACTOR_CLOSED
        } else {
            sma::CONTACTOR_OPEN
        };
        self.publish(sma::GRID_CONTACTOR, contactor as f64);

        self.publish(sma::AC_POWER, ac_power);
        self.publish(sma::AC_POWER_L1, phase_powers[0]);
        self.publish(sma::AC_POWER_L2, phase_powers[1]);
        self.publish(sma::AC_POWER_L3, phase_powers[2]);

        self.publish(sma::DC_POWER_A, dc.string_a.power);
        self.publish(sma::DC_VOLTAGE_A, dc.string_a.voltage);
        self.publish(sma::DC_CURRENT_A, dc.string_a.current);
        self.publish(sma::DC_POWER_B, dc.string_b.power);
        self.publish(sma::DC_VOLTAGE_B, dc.string_b.voltage);
        self.publish(sma::DC_CURRENT_B, dc.string_b.current);

        self.publish_grid(&grid);
        self.publish(sma::INTERNAL_TEMPERATURE, self.smoothed_temperature);

        let duration = timer.stop();
        self.metrics
            .record_tick(duration, Duration::from_millis(self.params.update_interval_ms));

        debug!(
            "Tick: state={} weather={} ac={}W temp={:.1}°C contactor={}",
            state,
            weather.name,
            ac_power,
            self.smoothed_temperature,
            if contactor_closed { "closed" } else { "open" }
        );

        TickSummary {
            state,
            weather: weather.name,
            ac_power,
            phase_powers,
            internal_temperature: self.smoothed_temperature,
            contactor_closed,
        }
    }

    fn reset_daily_yield(&mut self, now: &NaiveDateTime) {
        let today = now.date();
        if self.last_reset_day != Some(today) && now.hour() == self.params.daily_yield_reset_hour {
            self.publish_counter(sma::DAILY_YIELD, 0);
            self.last_reset_day = Some(today);
            info!("📅 Daily yield reset for {}", today);
        }
    }

    fn read_commands(&self) -> Commands {
        let defaults = Commands::default();
        Commands {
            operating_state: self
                .read_u32(sma::OPERATING_STATE_CMD)
                .unwrap_or(defaults.operating_state),
            acknowledge: self.read_u32(sma::ACKNOWLEDGE_CMD).unwrap_or(defaults.acknowledge),
        }
    }

    fn update_weather(&mut self) {
        let models = self.params.weather_models.len();
        if models == 0 {
            return;
        }
        let due = match self.last_weather_change {
            None => true,
            Some(last) => {
                self.simulated_secs - last >= self.params.weather_change_interval_seconds as f64
            }
        };
        if due {
            let previous = self.weather_index;
            self.weather_index = self.rng.random_range(0..models);
            self.last_weather_change = Some(self.simulated_secs);
            if previous != self.weather_index || self.metrics.total_ticks == 0 {
                info!(
                    "🌤️ Weather changed to: {}",
                    self.params.weather_models[self.weather_index].name
                );
            }
        }
    }

    fn update_accumulators(&mut self, elapsed_secs: f64, ac_power: f64, feeding_in: bool, contactor_closed: bool) {
        let operating = take_whole(&mut self.operating_carry_secs, elapsed_secs);
        self.add_to_counter(sma::OPERATING_TIME, operating);

        if feeding_in {
            let feed_in = take_whole(&mut self.feed_in_carry_secs, elapsed_secs);
            self.add_to_counter(sma::FEED_IN_TIME, feed_in);

            let energy = take_whole(&mut self.energy_carry_wh, ac_power * elapsed_secs / SECONDS_PER_HOUR);
            self.add_to_counter(sma::TOTAL_YIELD, energy);
            self.add_to_counter(sma::DAILY_YIELD, energy);
        }

        if contactor_closed {
            self.contactor_closed_secs += elapsed_secs;
            while self.contactor_closed_secs >= SECONDS_PER_HOUR {
                self.contactor_closed_secs -= SECONDS_PER_HOUR;
                self.add_to_counter(sma::GRID_CONNECTIONS, 1);
            }
        } else {
            self.contactor_closed_secs = 0.0;
        }
    }

    fn publish_grid(&self, grid: &GridSide) {
        self.publish(sma::GRID_VOLTAGE_L1, grid.voltages[0]);
        self.publish(sma::GRID_VOLTAGE_L2, grid.voltages[1]);
        self.publish(sma::GRID_VOLTAGE_L3, grid.voltages[2]);
        self.publish(sma::GRID_CURRENT_L1, grid.currents[0]);
        self.publish(sma::GRID_CURRENT_L2, grid.currents[1]);
        self.publish(sma::GRID_CURRENT_L3, grid.currents[2]);
        self.publish(sma::GRID_CURRENT, grid.total_current);
        self.publish(sma::GRID_FREQUENCY, grid.frequency);
        self.publish(sma::POWER_FACTOR, grid.power_factor);
        self.publish(sma::REACTIVE_POWER, grid.reactive_power);
        self.publish(sma::APPARENT_POWER, grid.apparent_power);
    }

    fn read_u32(&self, address: u16) -> Option<u32> {
        self.register_bank
            .get_logical(address)
            .and_then(|value| u32::try_from(value.as_i128()).ok())
    }

    fn read_counter(&self, address: u16) -> u64 {
        self.register_bank
            .get_logical(address)
            .and_then(|value| value.as_u64())
            .unwrap_or(0)
    }

    fn add_to_counter(&self, address: u16, amount: u64) {
        if amount > 0 {
            let total = self.read_counter(address).saturating_add(amount);
            self.publish_counter(address, total);
        }
    }

    /// Publish a physical quantity using the register's fixed-point scale
    fn publish(&self, address: u16, value: f64) {
        let Some(descriptor) = self.register_bank.descriptor(address) else {
            return;
        };
        let raw = descriptor.format.to_raw(value);
        self.store(address, RegisterValue::saturating_from_i64(descriptor.kind, raw));
    }

    /// Publish an integer counter or enumerator unscaled
    fn publish_counter(&self, address: u16, value: u64) {
        let Some(descriptor) = self.register_bank.descriptor(address) else {
            return;
        };
        let raw = i64::try_from(value).unwrap_or(i64::MAX);
        self.store(address, RegisterValue::saturating_from_i64(descriptor.kind, raw));
    }

    fn store(&self, address: u16, value: RegisterValue) {
        if let Err(e) = self.register_bank.set_logical(address, value) {
            warn!("Failed to publish register {}: {}", address, e);
        }
    }
}

/// Add `amount` to `carry` and take out the whole units
fn take_whole(carry: &mut f64, amount: f64) -> u64 {
    *carry += amount;
    let whole = carry.floor();
    *carry -= whole;
    whole as u64
}

impl<R: Rng + Send + 'static> SimulationEngine<R> {
    /// Run the engine on the tokio runtime until stopped
    pub fn spawn(self) -> EngineHandle<R> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));
        EngineHandle { shutdown_tx, task }
    }

    async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Self {
        let interval = Duration::from_millis(self.params.update_interval_ms);
        info!("🌞 Simulation engine started, tick every {:?}", interval);

        let mut last_tick: Option<Instant> = None;
        loop {
            let started = Instant::now();
            let elapsed = last_tick.map_or(interval, |last| started - last);
            last_tick = Some(started);

            self.tick_at(Local::now().naive_local(), elapsed.as_secs_f64());

            let sleep_for = interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        info!("🛑 Simulation engine stopped after {} ticks", self.metrics.total_ticks);
        self
    }
}

/// Handle to a running engine task
#[derive(Debug)]
pub struct EngineHandle<R: Rng = StdRng> {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<SimulationEngine<R>>,
}

impl<R: Rng> EngineHandle<R> {
    /// Check if the engine task is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the engine and wait for its current tick to finish
    ///
    /// Returns the engine so final statistics can be inspected.
    pub async fn stop(self) -> ModbusResult<SimulationEngine<R>> {
        let _ = self.shutdown_tx.send(());
        self.task
            .await
            .map_err(|e| ModbusError::internal(format!("Simulation task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{Register, RegisterAccess, RegisterFormat, RegisterKind};
    use chrono::NaiveDate;

    fn bank() -> Arc<RegisterBank> {
        let ro = RegisterAccess::RO;
        let bank = RegisterBank::with_registers(vec![
            Register::new(sma::SUSY_ID, RegisterKind::U32, RegisterFormat::Raw, ro),
            Register::new(sma::SERIAL_NUMBER, RegisterKind::U32, RegisterFormat::Raw, ro),
            Register::new(sma::DEVICE_STATUS, RegisterKind::U32, RegisterFormat::Enum, ro),
            Register::new(sma::GRID_CONTACTOR, RegisterKind::U32, RegisterFormat::Enum, ro),
            Register::new(sma::RATED_POWER, RegisterKind::U32, RegisterFormat::Fix0, ro),
            Register::new(sma::TOTAL_YIELD, RegisterKind::U64, RegisterFormat::Fix0, ro),
            Register::new(sma::DAILY_YIELD, RegisterKind::U64, RegisterFormat::Fix0, ro),
            Register::new(sma::OPERATING_TIME, RegisterKind::U64, RegisterFormat::Duration, ro),
            Register::new(sma::FEED_IN_TIME, RegisterKind::U64, RegisterFormat::Duration, ro),
            Register::new(sma::GRID_CONNECTIONS, RegisterKind::U32, RegisterFormat::Fix0, ro),
            Register::new(sma::AC_POWER, RegisterKind::S32, RegisterFormat::Fix0, ro),
            Register::new(sma::AC_POWER_L1, RegisterKind::S32, RegisterFormat::Fix0, ro),
            Register::new(sma::AC_POWER_L2, RegisterKind::S32, RegisterFormat::Fix0, ro),
            Register::new(sma::AC_POWER_L3, RegisterKind::S32, RegisterFormat::Fix0, ro),
            Register::new(sma::GRID_FREQUENCY, RegisterKind::U32, RegisterFormat::Fix2, ro),
            Register::new(sma::INTERNAL_TEMPERATURE, RegisterKind::S32, RegisterFormat::Temperature, ro),
            Register::new(sma::OPERATING_STATE_CMD, RegisterKind::U32, RegisterFormat::Enum, RegisterAccess::RW),
            Register::new(sma::ACKNOWLEDGE_CMD, RegisterKind::U32, RegisterFormat::Enum, RegisterAccess::RW),
        ])
        .unwrap();
        Arc::new(bank)
    }

    fn params() -> SimulationParams {
        SimulationParams {
            power_variation_percent: 0.0,
            weather_models: vec![WeatherModel::new("Sunny", 1.0)],
            ..SimulationParams::default()
        }
    }

    fn engine(params: SimulationParams) -> SimulationEngine<StdRng> {
        SimulationEngine::with_rng(bank(), &DeviceIdentity::default(), params, StdRng::seed_from_u64(42))
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn logical(engine: &SimulationEngine, address: u16) -> i128 {
        engine.register_bank().get_logical(address).unwrap().as_i128()
    }

    #[test]
    fn test_identity_is_published_on_construction() {
        let engine = engine(params());
        let identity = DeviceIdentity::default();
        assert_eq!(logical(&engine, sma::SUSY_ID), identity.susy_id as i128);
        assert_eq!(logical(&engine, sma::SERIAL_NUMBER), identity.serial_number as i128);
        assert_eq!(logical(&engine, sma::RATED_POWER), 5000);
    }

    #[test]
    fn test_night_tick_is_ok_with_open_contactor() {
        let mut engine = engine(params());
        let summary = engine.tick_at(at(20, 1, 0), 1.0);
        assert_eq!(summary.state, DeviceState::Ok);
        assert_eq!(summary.ac_power, 0.0);
        assert_eq!(logical(&engine, sma::DEVICE_STATUS), 307);
        assert_eq!(logical(&engine, sma::GRID_CONTACTOR), 311);
        assert_eq!(logical(&engine, sma::FEED_IN_TIME), 0);
        assert_eq!(logical(&engine, sma::OPERATING_TIME), 1);
    }

    #[test]
    fn test_noon_tick_publishes_power_and_closes_contactor() {
        let mut engine = engine(params());
        let summary = engine.tick_at(at(20, 12, 0), 1.0);
        assert!(summary.contactor_closed);
        assert!(summary.ac_power > 4900.0);
        assert_eq!(logical(&engine, sma::AC_POWER), summary.ac_power as i128);
        assert_eq!(logical(&engine, sma::GRID_CONTACTOR), 51);

        let sum: i128 = [sma::AC_POWER_L1, sma::AC_POWER_L2, sma::AC_POWER_L3]
            .iter()
            .map(|&address| logical(&engine, address))
            .sum();
        assert_eq!(sum, logical(&engine, sma::AC_POWER));

        let frequency = logical(&engine, sma::GRID_FREQUENCY);
        assert!((4995..=5005).contains(&frequency), "frequency {}", frequency);
    }

    #[test]
    fn test_acknowledge_clears_error_and_command() {
        let mut engine = engine(SimulationParams {
            fault_probability_percent: 100.0,
            ..params()
        });
        engine.tick_at(at(20, 12, 0), 1.0);
        assert_eq!(engine.state(), DeviceState::Error);
        assert_eq!(logical(&engine, sma::DEVICE_STATUS), 35);
        assert_eq!(logical(&engine, sma::AC_POWER), 0);

        let bank = engine.register_bank().clone();
        bank.set_logical(sma::ACKNOWLEDGE_CMD, RegisterValue::U32(26)).unwrap();
        engine.params.fault_probability_percent = 0.0;
        engine.tick_at(at(20, 12, 0), 1.0);
        assert_eq!(engine.state(), DeviceState::Ok);
        assert_eq!(logical(&engine, sma::ACKNOWLEDGE_CMD), 0);
    }

    #[test]
    fn test_missing_command_registers_default_to_mpp() {
        let bank = Arc::new(
            RegisterBank::with_registers(vec![Register::new(
                sma::DEVICE_STATUS,
                RegisterKind::U32,
                RegisterFormat::Enum,
                RegisterAccess::RO,
            )])
            .unwrap(),
        );
        let mut engine = SimulationEngine::with_rng(
            bank.clone(),
            &DeviceIdentity::default(),
            params(),
            StdRng::seed_from_u64(1),
        );
        let summary = engine.tick_at(at(20, 12, 0), 1.0);
        assert_eq!(summary.state, DeviceState::Ok);
        assert_eq!(bank.get_logical(sma::DEVICE_STATUS), Some(RegisterValue::U32(307)));
    }

    #[test]
    fn test_energy_accumulates_fractions() {
        let mut engine = engine(params());
        // about 5000 W for 3.6 s is 5 Wh, delivered in ten ticks
        for _ in 0..10 {
            engine.tick_at(at(20, 12, 0), 0.36);
        }
        let total = logical(&engine, sma::TOTAL_YIELD);
        assert!((4..=5).contains(&total), "total yield {}", total);
        assert_eq!(logical(&engine, sma::DAILY_YIELD), total);
        assert_eq!(logical(&engine, sma::OPERATING_TIME), 3);
    }

    #[test]
    fn test_grid_connection_counted_per_closed_hour() {
        let mut engine = engine(params());
        for _ in 0..3 {
            engine.tick_at(at(20, 12, 0), 1800.0);
        }
        assert_eq!(logical(&engine, sma::GRID_CONNECTIONS), 1);

        engine.tick_at(at(20, 1, 0), 1.0);
        engine.tick_at(at(20, 12, 0), 1800.0);
        assert_eq!(logical(&engine, sma::GRID_CONNECTIONS), 1);
    }

    #[test]
    fn test_weather_is_redrawn_once_per_interval() {
        let mut engine = engine(SimulationParams {
            weather_change_interval_seconds: 300,
            weather_models: SimulationParams::default().weather_models,
            ..params()
        });

        engine.tick_at(at(20, 12, 0), 1.0);
        assert_eq!(engine.last_weather_change, Some(1.0));

        // Inside the interval the model is kept
        let index = engine.weather_index;
        engine.tick_at(at(20, 12, 2), 100.0);
        engine.tick_at(at(20, 12, 4), 100.0);
        assert_eq!(engine.last_weather_change, Some(1.0));
        assert_eq!(engine.weather_index, index);

        // Local time stepping back an hour does not hold up the next draw
        engine.tick_at(at(20, 11, 5), 100.0);
        assert_eq!(engine.last_weather_change, Some(301.0));

        let mut changes = 0;
        for minute in 0..50 {
            let before = (engine.weather_index, engine.last_weather_change);
            engine.tick_at(at(20, 11, 10 + minute), 100.0);
            if engine.weather_index != before.0 {
                assert_ne!(engine.last_weather_change, before.1);
                changes += 1;
            }
        }
        assert!(changes > 0);
        assert_eq!(engine.weather().unwrap().name, engine.params.weather_models[engine.weather_index].name);
    }

    #[test]
    fn test_temperature_is_smoothed() {
        let mut engine = engine(params());
        let first = engine.tick_at(at(20, 12, 0), 1.0).internal_temperature;
        let second = engine.tick_at(at(20, 12, 0), 1.0).internal_temperature;
        assert!(first > 25.0 && first < 30.0, "first {}", first);
        assert!(second > first);
        assert_eq!(logical(&engine, sma::INTERNAL_TEMPERATURE), (second * 10.0).round() as i128);
    }

    #[tokio::test]
    async fn test_spawned_engine_ticks_and_stops() {
        let engine = engine(SimulationParams {
            update_interval_ms: 10,
            ..params()
        });
        let handle = engine.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_running());

        let engine = handle.stop().await.unwrap();
        assert!(engine.metrics().total_ticks >= 1);
    }
}

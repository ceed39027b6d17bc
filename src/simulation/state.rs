//! Device state machine
//!
//! Transitions evaluated once per tick, in this order:
//!
//! 1. `Error -> Ok` when the acknowledge command reads 26; the command is consumed.
//! 2. `* -> Off` when the operating state command reads 381 (stop).
//! 3. `Ok -> Error` at random, more likely the closer output is to rated power.
//! 4. `Off | Warning -> Ok` when the operating state command reads 295 (MPP).
//!
//! Acknowledge and stop in the same tick leaves the device `Off`.

use log::info;
use rand::Rng;
use std::fmt;

use super::sma;

/// Operating state of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    Off,
    #[default]
    Ok,
    /// Reserved, not entered by the default model
    Warning,
    Error,
}

impl DeviceState {
    /// Device status enumerator published for this state
    pub const fn status_code(self) -> u32 {
        match self {
            DeviceState::Off => sma::STATUS_OFF,
            DeviceState::Ok => sma::STATUS_OK,
            DeviceState::Warning => sma::STATUS_WARNING,
            DeviceState::Error => sma::STATUS_ERROR,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Off => "OFF",
            DeviceState::Ok => "OK",
            DeviceState::Warning => "WARNING",
            DeviceState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Command register values read at the start of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commands {
    pub operating_state: u32,
    pub acknowledge: u32,
}

impl Default for Commands {
    /// Values assumed when the command registers are not configured
    fn default() -> Self {
        Self {
            operating_state: sma::CMD_MPP,
            acknowledge: 0,
        }
    }
}

/// Outcome of one evaluation of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: DeviceState,
    pub to: DeviceState,
    /// The acknowledge command was consumed and must be cleared
    pub acknowledged: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Holds the current device state and applies the transition rules
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: DeviceState,
}

impl StateMachine {
    pub fn new(initial: DeviceState) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Advance one tick
    ///
    /// `power_ratio` is last tick's output relative to rated power; the fault
    /// chance is `fault_probability_percent * (1 + power_ratio)`. A stop
    /// command always wins over the fault draw.
    pub fn step<R: Rng>(
        &mut self,
        commands: Commands,
        fault_probability_percent: f64,
        power_ratio: f64,
        rng: &mut R,
    ) -> Transition {
        let from = self.state;
        let mut acknowledged = false;

        if self.state == DeviceState::Error && commands.acknowledge == sma::CMD_ACKNOWLEDGE {
            self.state = DeviceState::Ok;
            acknowledged = true;
        }

        // No fault draw on the tick that cleared an error
        if commands.operating_state == sma::CMD_STOP {
            self.state = DeviceState::Off;
        } else if self.state == DeviceState::Ok && !acknowledged {
            let risk = fault_probability_percent * (1.0 + power_ratio.clamp(0.0, 1.0));
            if risk > 0.0 && rng.random_range(0.0..100.0) < risk {
                self.state = DeviceState::Error;
            }
        } else if matches!(self.state, DeviceState::Off | DeviceState::Warning)
            && commands.operating_state == sma::CMD_MPP
        {
            self.state = DeviceState::Ok;
        }

        let transition = Transition {
            from,
            to: self.state,
            acknowledged,
        };
        if transition.changed() {
            info!("🔄 Device state {} -> {}", from, self.state);
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn commands(operating_state: u32, acknowledge: u32) -> Commands {
        Commands { operating_state, acknowledge }
    }

    #[test]
    fn test_initial_state_is_ok() {
        assert_eq!(StateMachine::default().state(), DeviceState::Ok);
        assert_eq!(DeviceState::Ok.status_code(), 307);
        assert_eq!(DeviceState::Off.status_code(), 303);
    }

    #[test]
    fn test_stop_command_turns_device_off() {
        let mut machine = StateMachine::default();
        let t = machine.step(commands(381, 0), 0.0, 0.0, &mut rng());
        assert_eq!(t.to, DeviceState::Off);
        assert!(t.changed());

        let t = machine.step(commands(381, 0), 0.0, 0.0, &mut rng());
        assert!(!t.changed());
    }

    #[test]
    fn test_stop_wins_over_certain_fault() {
        let mut machine = StateMachine::default();
        let t = machine.step(commands(381, 0), 100.0, 1.0, &mut rng());
        assert_eq!(t.to, DeviceState::Off);
    }

    #[test]
    fn test_acknowledged_tick_skips_fault_draw() {
        let mut machine = StateMachine::new(DeviceState::Error);
        let t = machine.step(commands(295, 26), 100.0, 1.0, &mut rng());
        assert_eq!(t.to, DeviceState::Ok);
        assert!(t.acknowledged);

        // The next tick draws again
        let t = machine.step(commands(295, 0), 100.0, 1.0, &mut rng());
        assert_eq!(t.to, DeviceState::Error);
    }

    #[test]
    fn test_mpp_command_restarts_device() {
        let mut machine = StateMachine::new(DeviceState::Off);
        machine.step(commands(295, 0), 0.0, 0.0, &mut rng());
        assert_eq!(machine.state(), DeviceState::Ok);

        let mut machine = StateMachine::new(DeviceState::Warning);
        machine.step(commands(295, 0), 0.0, 0.0, &mut rng());
        assert_eq!(machine.state(), DeviceState::Ok);
    }

    #[test]
    fn test_error_is_sticky_until_acknowledged() {
        let mut machine = StateMachine::new(DeviceState::Error);
        let t = machine.step(commands(295, 0), 0.0, 0.0, &mut rng());
        assert_eq!(t.to, DeviceState::Error);
        assert!(!t.acknowledged);

        let t = machine.step(commands(295, 26), 0.0, 0.0, &mut rng());
        assert_eq!(t.to, DeviceState::Ok);
        assert!(t.acknowledged);
    }

    #[test]
    fn test_acknowledge_outside_error_is_not_consumed() {
        let mut machine = StateMachine::default();
        let t = machine.step(commands(295, 26), 0.0, 0.0, &mut rng());
        assert!(!t.acknowledged);
    }

    #[test]
    fn test_stop_wins_over_acknowledge() {
        let mut machine = StateMachine::new(DeviceState::Error);
        let t = machine.step(commands(381, 26), 0.0, 0.0, &mut rng());
        assert!(t.acknowledged);
        assert_eq!(t.to, DeviceState::Off);
    }

    #[test]
    fn test_certain_fault_enters_error() {
        let mut machine = StateMachine::default();
        machine.step(commands(295, 0), 100.0, 0.0, &mut rng());
        assert_eq!(machine.state(), DeviceState::Error);
    }

    #[test]
    fn test_zero_probability_never_faults() {
        let mut machine = StateMachine::default();
        let mut rng = rng();
        for _ in 0..1000 {
            machine.step(commands(295, 0), 0.0, 1.0, &mut rng);
        }
        assert_eq!(machine.state(), DeviceState::Ok);
    }

    #[test]
    fn test_fault_rate_scales_with_load() {
        let mut rng = rng();
        let mut count = |ratio: f64| {
            (0..20_000)
                .filter(|_| {
                    let mut machine = StateMachine::default();
                    machine.step(commands(295, 0), 5.0, ratio, &mut rng).to == DeviceState::Error
                })
                .count()
        };
        let idle = count(0.0);
        let full = count(1.0);
        // about 5% and 10% of the runs
        assert!((700..1300).contains(&idle), "idle faults: {}", idle);
        assert!((1600..2400).contains(&full), "full load faults: {}", full);
    }
}

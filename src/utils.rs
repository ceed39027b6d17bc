/// Timing helpers for the simulation loop
///
/// Tick duration metrics, a small operation timer and formatting helpers
/// used when statistics are logged at shutdown.

use std::time::{Duration, Instant};
use log::{debug, warn};

/// Duration statistics of engine ticks
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_ticks: u64,
    /// Ticks that took longer than the configured interval
    pub overruns: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    pub avg_duration: Duration,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tick measured against its time budget
    pub fn record_tick(&mut self, duration: Duration, budget: Duration) {
        self.total_ticks += 1;
        self.total_duration += duration;

        self.min_duration = Some(self.min_duration.map_or(duration, |min| min.min(duration)));
        self.max_duration = Some(self.max_duration.map_or(duration, |max| max.max(duration)));

        if duration > budget {
            self.overruns += 1;
            warn!("⏱️ Simulation tick took {:?}, over its {:?} budget", duration, budget);
        }

        self.avg_duration = self.total_duration / u32::try_from(self.total_ticks).unwrap_or(u32::MAX);
    }

    /// Share of ticks that overran, as percentage
    pub fn overrun_rate(&self) -> f64 {
        if self.total_ticks == 0 {
            return 0.0;
        }
        (self.overruns as f64 / self.total_ticks as f64) * 100.0
    }
}

/// Timer for measuring operation duration
pub struct OperationTimer {
    start: Instant,
    operation_name: &'static str,
}

impl OperationTimer {
    pub fn start(operation_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation_name,
        }
    }

    /// Stop the timer and return duration
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Operation '{}' completed in {:?}", self.operation_name, duration);
        duration
    }
}

/// Formatting and display utilities
pub mod format {
    use super::*;

    /// Format register values as hex
    pub fn registers_to_hex(registers: &[u16]) -> String {
        registers
            .iter()
            .map(|r| format!("{:04X}", r))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format duration in a human-readable way
    pub fn format_duration(duration: Duration) -> String {
        let micros = duration.as_micros();
        if micros < 1000 {
            format!("{}µs", micros)
        } else if micros < 1_000_000 {
            format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
        } else if micros < 60_000_000 {
            format!("{:.2}s", duration.as_secs_f64())
        } else {
            let secs = duration.as_secs();
            format!("{}m {}s", secs / 60, secs % 60)
        }
    }

    /// Format tick metrics as a table
    pub fn format_metrics(metrics: &PerformanceMetrics) -> String {
        format!(
            "Simulation Metrics:\n\
             ├─ Ticks: {}\n\
             ├─ Overruns: {} ({:.1}%)\n\
             ├─ Average Tick: {}\n\
             ├─ Min Tick: {}\n\
             └─ Max Tick: {}",
            metrics.total_ticks,
            metrics.overruns,
            metrics.overrun_rate(),
            format_duration(metrics.avg_duration),
            metrics.min_duration.map_or("N/A".to_string(), format_duration),
            metrics.max_duration.map_or("N/A".to_string(), format_duration),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_metrics() {
        let mut metrics = PerformanceMetrics::new();
        let budget = Duration::from_millis(150);

        metrics.record_tick(Duration::from_millis(100), budget);
        metrics.record_tick(Duration::from_millis(200), budget);
        metrics.record_tick(Duration::from_millis(150), budget);

        assert_eq!(metrics.total_ticks, 3);
        assert_eq!(metrics.overruns, 1);
        assert_eq!(metrics.min_duration, Some(Duration::from_millis(100)));
        assert_eq!(metrics.max_duration, Some(Duration::from_millis(200)));
        assert_eq!(metrics.avg_duration, Duration::from_millis(150));
        assert!((metrics.overrun_rate() - 33.33).abs() < 0.1);
        assert_eq!(PerformanceMetrics::new().overrun_rate(), 0.0);
    }

    #[test]
    fn test_formatting() {
        let registers = vec![0x1234, 0x5678];
        assert_eq!(format::registers_to_hex(&registers), "1234 5678");

        assert_eq!(format::format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format::format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format::format_duration(Duration::from_secs(125)), "2m 5s");

        let text = format::format_metrics(&PerformanceMetrics::new());
        assert!(text.contains("Ticks: 0"));
        assert!(text.contains("N/A"));
    }
}

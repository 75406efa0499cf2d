use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Aggregate engine throughput.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub ticks: u64,
    pub detections: u64,
    pub target_failures: u64,
    pub average_tick_ms: f64,
    /// Ticks per second of wall time spent inside ticks.
    pub average_fps: f64,
}

pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Default)]
struct Metrics {
    ticks: u64,
    detections: u64,
    target_failures: u64,
    busy: Duration,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_tick(&self, elapsed: Duration, detections: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.ticks += 1;
            metrics.detections += detections as u64;
            metrics.busy += elapsed;
        }
    }

    pub fn record_target_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.target_failures += 1;
        }
    }

    pub fn snapshot(&self) -> PerformanceReport {
        let Ok(metrics) = self.inner.lock() else {
            return PerformanceReport::default();
        };
        let busy = metrics.busy.as_secs_f64();
        let (average_tick_ms, average_fps) = if metrics.ticks > 0 && busy > 0.0 {
            (busy * 1_000.0 / metrics.ticks as f64, metrics.ticks as f64 / busy)
        } else {
            (0.0, 0.0)
        };
        PerformanceReport {
            ticks: metrics.ticks,
            detections: metrics.detections,
            target_failures: metrics.target_failures,
            average_tick_ms,
            average_fps,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_averages_tick_time() {
        let recorder = MetricsRecorder::new();
        recorder.record_tick(Duration::from_millis(10), 2);
        recorder.record_tick(Duration::from_millis(30), 1);
        recorder.record_target_failure();
        let report = recorder.snapshot();
        assert_eq!(report.ticks, 2);
        assert_eq!(report.detections, 3);
        assert_eq!(report.target_failures, 1);
        assert!((report.average_tick_ms - 20.0).abs() < 1e-9);
        assert!((report.average_fps - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_report_has_zero_rates() {
        assert_eq!(MetricsRecorder::new().snapshot(), PerformanceReport::default());
    }
}

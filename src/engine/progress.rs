use std::sync::{Arc, Mutex, PoisonError};

use super::ProgressCallback;

/// Forwards progress to an observer as a clamped, non-decreasing fraction.
///
/// Values outside `[0, 1]` are clamped, NaN is dropped, and anything below
/// the last forwarded value is ignored.
pub struct ProgressTracker {
    last: Mutex<Option<f64>>,
    sink: ProgressCallback,
}

impl ProgressTracker {
    pub fn new(sink: ProgressCallback) -> Self {
        Self {
            last: Mutex::new(None),
            sink,
        }
    }

    pub fn report(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*last, Some(previous) if fraction < previous) {
                return;
            }
            *last = Some(fraction);
        }

        (self.sink)(fraction);
    }

    /// Last value forwarded to the observer
    pub fn last(&self) -> Option<f64> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_callback(self) -> ProgressCallback {
        let tracker = Arc::new(self);
        Arc::new(move |fraction| tracker.report(fraction))
    }
}

/// Elapsed output time in seconds from an ffmpeg `-progress` line.
///
/// ffmpeg reports both `out_time_us` and `out_time_ms` in microseconds.
pub fn parse_out_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    if key != "out_time_us" && key != "out_time_ms" {
        return None;
    }
    let micros = value.trim().parse::<i64>().ok()?;
    (micros >= 0).then(|| micros as f64 / 1_000_000.0)
}

/// Whether an ffmpeg `-progress` line marks the end of encoding
pub fn is_progress_end(line: &str) -> bool {
    line.trim() == "progress=end"
}

/// Duration in seconds from ffprobe `-print_format json -show_format` output
pub fn parse_probe_duration(json: &[u8]) -> Option<f64> {
    let info: serde_json::Value = serde_json::from_slice(json).ok()?;
    let duration = info["format"]["duration"].as_str()?.parse::<f64>().ok()?;
    (duration.is_finite() && duration > 0.0).then_some(duration)
}

/// `elapsed / total`, or `None` when the total is unusable
pub fn fraction(elapsed: f64, total: f64) -> Option<f64> {
    (total.is_finite() && total > 0.0).then(|| (elapsed / total).clamp(0.0, 1.0))
}

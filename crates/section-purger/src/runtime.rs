//! Runtime measurement
//!
//! Tracks how long a single invalidation takes so the orchestrator can
//! budget its work. Slow batches raise the estimate at once; fast batches
//! only pull it halfway down, so one lucky batch does not make the purger
//! look cheaper than it is.

use parking_lot::Mutex;
use section_core::{Invalidation, InvalidationState, MAX_TIME_HINT_SECS, MIN_TIME_HINT_SECS};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RuntimeMeasurement {
    value: Mutex<Option<f64>>,
}

impl RuntimeMeasurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Instant {
        Instant::now()
    }

    /// Finish measuring a batch that started at `started`
    pub fn stop(&self, started: Instant, invalidations: &[Invalidation]) -> Option<f64> {
        self.record(started.elapsed(), invalidations)
    }

    /// Record a batch duration.
    ///
    /// Only batches in which every invalidation succeeded are representative;
    /// anything else is ignored and `None` returned.
    pub fn record(&self, elapsed: Duration, invalidations: &[Invalidation]) -> Option<f64> {
        if invalidations.is_empty()
            || invalidations
                .iter()
                .any(|i| i.state() != InvalidationState::Succeeded)
        {
            return None;
        }

        let measured = elapsed.as_secs_f64() / invalidations.len() as f64;
        let mut value = self.value.lock();
        let updated = match *value {
            Some(current) if measured < current => (current + measured) / 2.0,
            _ => measured,
        };
        *value = Some(updated);

        debug!(
            "Runtime measurement: {:.3}s per invalidation (batch of {}), estimate now {:.3}s",
            measured,
            invalidations.len(),
            updated
        );
        Some(updated)
    }

    /// Current estimate in seconds, if any batch has been measured
    pub fn value(&self) -> Option<f64> {
        *self.value.lock()
    }

    /// Estimate clamped to the allowed time hint range, `fallback` until
    /// the first measurement
    pub fn time_hint(&self, fallback: f64) -> f64 {
        clamp_time_hint(self.value().unwrap_or(fallback))
    }
}

/// Clamp a time hint to the range the orchestrator accepts
pub fn clamp_time_hint(seconds: f64) -> f64 {
    seconds.clamp(MIN_TIME_HINT_SECS, MAX_TIME_HINT_SECS)
}

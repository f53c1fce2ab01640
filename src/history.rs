use chrono::{DateTime, Utc};

use crate::pipeline::integrator;
use crate::scale::ScaleReading;

/// One motion-proxy sample. `t` is seconds since session start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSample {
    pub t: f64,
    pub raw: f64,
    pub smoothed: f64,
    pub captured_at: DateTime<Utc>,
}

/// One calibrated estimate derived from the flow history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratedSample {
    pub t: f64,
    pub integrated_raw: f64,
    pub mass_g: f64,
}

/// The three per-session sequences. Append-only with non-decreasing
/// timestamps; owned by the sampling task, created empty at session start.
#[derive(Debug, Default)]
pub struct SessionHistory {
    flow: Vec<FlowSample>,
    integrated: Vec<IntegratedSample>,
    readings: Vec<ScaleReading>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.flow.clear();
        self.integrated.clear();
        self.readings.clear();
    }

    pub fn push_flow(&mut self, sample: FlowSample) {
        debug_assert!(self.flow.last().map_or(true, |prev| sample.t >= prev.t));
        self.flow.push(sample);
    }

    pub fn push_integrated(&mut self, sample: IntegratedSample) {
        debug_assert!(
            self.integrated
                .last()
                .map_or(true, |prev| sample.t >= prev.t)
        );
        self.integrated.push(sample);
    }

    pub fn push_reading(&mut self, reading: ScaleReading) {
        debug_assert!(self.readings.last().map_or(true, |prev| reading.t >= prev.t));
        self.readings.push(reading);
    }

    pub fn flow(&self) -> &[FlowSample] {
        &self.flow
    }

    pub fn integrated(&self) -> &[IntegratedSample] {
        &self.integrated
    }

    pub fn readings(&self) -> &[ScaleReading] {
        &self.readings
    }

    /// Trapezoidal integral of the smoothed proxy over the whole history.
    pub fn integrate_flow(&self) -> f64 {
        integrator::integrate(self.flow.iter().map(|s| (s.t, s.smoothed)))
    }

    /// Integral restricted to samples at or before `t_limit`.
    pub fn integrate_flow_until(&self, t_limit: f64) -> f64 {
        integrator::integrate(
            self.flow
                .iter()
                .take_while(|s| s.t <= t_limit)
                .map(|s| (s.t, s.smoothed)),
        )
    }

    /// One (integrated, mass) pair per scale reading, each evaluated over
    /// the flow prefix up to that reading's timestamp.
    pub fn calibration_points(&self) -> Vec<(f64, f64)> {
        self.readings
            .iter()
            .map(|r| (self.integrate_flow_until(r.t), r.mass_g))
            .collect()
    }
}

//! Forcing signal sampled on a two-phase time axis
//!
//! Constant `baseline` through equilibration, then
//! `baseline * (1 + A * sin(2 pi (t - t_eq) / period))^p`. With `p = 1` the
//! signal drives a rate directly (uplift); other exponents express forcing
//! applied through a power law, e.g. erodibility scaling with precipitation
//! raised to the drainage-area exponent.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use crate::schedule::{ScheduleParams, TimeAxis};
use crate::ForcingError;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForcingParams {
    #[serde_as(as = "DefaultOnNull")]
    pub baseline: f64,
    #[serde_as(as = "DefaultOnNull")]
    pub relative_amplitude: f64,
    #[serde_as(as = "DefaultOnNull")]
    pub signal_exponent: f64,
}

impl Default for ForcingParams {
    fn default() -> Self {
        Self {
            baseline: 1.0e-3,
            relative_amplitude: 0.5,
            signal_exponent: 1.0,
        }
    }
}

impl ForcingParams {
    pub fn new(baseline: f64, relative_amplitude: f64) -> Self {
        Self {
            baseline,
            relative_amplitude,
            signal_exponent: 1.0,
        }
    }

    pub fn with_exponent(mut self, signal_exponent: f64) -> Self {
        self.signal_exponent = signal_exponent;
        self
    }

    pub fn validate(&self) -> Result<(), ForcingError> {
        if !self.baseline.is_finite() || self.baseline <= 0.0 {
            return Err(ForcingError::InvalidParameter(format!(
                "baseline must be finite and > 0, got {}",
                self.baseline
            )));
        }

        if !self.relative_amplitude.is_finite() {
            return Err(ForcingError::InvalidParameter(
                "relative_amplitude must be finite".to_string(),
            ));
        }

        if !self.signal_exponent.is_finite() {
            return Err(ForcingError::InvalidParameter(
                "signal_exponent must be finite".to_string(),
            ));
        }

        Ok(())
    }

    pub fn value_at(&self, t: f64, t_eq: f64, period: f64) -> f64 {
        if t <= t_eq {
            return self.baseline;
        }

        let phase = TAU * (t - t_eq) / period;
        let factor = 1.0 + self.relative_amplitude * phase.sin();
        self.baseline * factor.powf(self.signal_exponent)
    }

    /// Envelope `(low, high)` of the perturbation segment.
    pub fn bounds(&self) -> (f64, f64) {
        let amplitude = self.relative_amplitude.abs();
        let a = self.baseline * (1.0 - amplitude).powf(self.signal_exponent);
        let b = self.baseline * (1.0 + amplitude).powf(self.signal_exponent);
        (a.min(b), a.max(b))
    }
}

/// Forcing values index-aligned with a [`TimeAxis`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingSignal {
    values: Vec<f64>,
}

impl ForcingSignal {
    pub fn sample(axis: &TimeAxis, params: &ForcingParams) -> Result<Self, ForcingError> {
        params.validate()?;

        let values: Vec<f64> = axis
            .times()
            .iter()
            .map(|&t| params.value_at(t, axis.t_eq(), axis.period()))
            .collect();

        if let Some(idx) = values.iter().position(|value| !value.is_finite()) {
            return Err(ForcingError::InvalidParameter(format!(
                "forcing is not finite at t = {} (relative_amplitude {} with exponent {})",
                axis.times()[idx],
                params.relative_amplitude,
                params.signal_exponent
            )));
        }

        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at the first sample, i.e. the equilibration baseline.
    pub fn initial(&self) -> Option<f64> {
        self.values.first().copied()
    }
}

impl From<Vec<f64>> for ForcingSignal {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}

pub fn build_forcing(
    schedule: &ScheduleParams,
    forcing: &ForcingParams,
) -> Result<(TimeAxis, ForcingSignal), ForcingError> {
    let axis = TimeAxis::two_phase(schedule)?;
    let signal = ForcingSignal::sample(&axis, forcing)?;
    Ok((axis, signal))
}

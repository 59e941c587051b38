use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use crate::engine::{EngineConfig, ForcingTarget};
use crate::forcing::ForcingParams;
use crate::response::ExtractionWindows;
use crate::schedule::ScheduleParams;
use crate::ForcingError;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub schedule: ScheduleParams,
    pub forcing: ForcingParams,
    pub engine: EngineConfig,
    pub target: ForcingTarget,
    /// Constant uplift rate used when the forcing drives erodibility
    #[serde_as(as = "DefaultOnNull")]
    pub uplift: f64,
    pub windows: ExtractionWindows,
    #[serde(default)]
    pub periods: Vec<f64>,
    #[serde(default)]
    pub relative_amplitudes: Vec<f64>,
    #[serde_as(as = "DefaultOnNull")]
    pub write_timeseries: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleParams::default(),
            forcing: ForcingParams::default(),
            engine: EngineConfig::default(),
            target: ForcingTarget::UpliftRate,
            uplift: 1.0e-3,
            windows: ExtractionWindows::default(),
            periods: Vec::new(),
            relative_amplitudes: Vec::new(),
            write_timeseries: false,
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), ForcingError> {
        self.schedule.validate()?;
        self.forcing.validate()?;
        self.engine.validate()?;

        if self.target == ForcingTarget::Erodibility
            && (!self.uplift.is_finite() || self.uplift <= 0.0)
        {
            return Err(ForcingError::InvalidConfig(
                "uplift must be finite and > 0 when target is erodibility".to_string(),
            ));
        }

        if self
            .periods
            .iter()
            .any(|&period| !period.is_finite() || period <= 0.0)
        {
            return Err(ForcingError::InvalidConfig(
                "periods must contain only finite values greater than zero".to_string(),
            ));
        }

        if self
            .relative_amplitudes
            .iter()
            .any(|amplitude| !amplitude.is_finite())
        {
            return Err(ForcingError::InvalidConfig(
                "relative_amplitudes must contain only finite values".to_string(),
            ));
        }

        Ok(())
    }

    pub fn sweep_periods(&self) -> Vec<f64> {
        if self.periods.is_empty() {
            vec![self.schedule.period]
        } else {
            self.periods.clone()
        }
    }

    pub fn sweep_amplitudes(&self) -> Vec<f64> {
        if self.relative_amplitudes.is_empty() {
            vec![self.forcing.relative_amplitude]
        } else {
            self.relative_amplitudes.clone()
        }
    }

    /// `(period, relative_amplitude)` pairs, periods outermost.
    pub fn sweep_grid(&self) -> Vec<(f64, f64)> {
        let amplitudes = self.sweep_amplitudes();
        self.sweep_periods()
            .into_iter()
            .flat_map(|period| amplitudes.iter().map(move |&amplitude| (period, amplitude)))
            .collect()
    }

    pub fn at_point(&self, period: f64, relative_amplitude: f64) -> (ScheduleParams, ForcingParams) {
        let schedule = ScheduleParams {
            period,
            ..self.schedule.clone()
        };
        let forcing = ForcingParams {
            relative_amplitude,
            ..self.forcing.clone()
        };
        (schedule, forcing)
    }
}

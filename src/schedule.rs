//! Two-phase time axis for periodic-forcing experiments
//!
//! The axis is an equilibration segment sampled uniformly over `[0, t_eq]`
//! followed by a perturbation segment sampled uniformly over
//! `[t_eq + seam_offset * period, t_eq + num_cycles * period]`.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use crate::ForcingError;

/// Default gap between `t_eq` and the first perturbation sample, in periods.
pub const DEFAULT_SEAM_OFFSET: f64 = 0.1;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleParams {
    /// Equilibration time, end of the constant-forcing segment
    #[serde_as(as = "DefaultOnNull")]
    pub t_eq: f64,
    /// Forcing period
    #[serde_as(as = "DefaultOnNull")]
    pub period: f64,
    /// Number of full forcing cycles after `t_eq`
    #[serde_as(as = "DefaultOnNull")]
    pub num_cycles: u32,
    /// Samples in the equilibration segment
    #[serde_as(as = "DefaultOnNull")]
    pub n_pre: usize,
    /// Samples in the perturbation segment
    #[serde_as(as = "DefaultOnNull")]
    pub n_post: usize,
    /// Gap between `t_eq` and the first perturbation sample, in periods
    #[serde_as(as = "DefaultOnNull")]
    pub seam_offset: f64,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            t_eq: 1.0e7,
            period: 1.0e8,
            num_cycles: 5,
            n_pre: 101,
            n_post: 100,
            seam_offset: DEFAULT_SEAM_OFFSET,
        }
    }
}

impl ScheduleParams {
    pub fn new(t_eq: f64, period: f64, num_cycles: u32, n_pre: usize, n_post: usize) -> Self {
        Self {
            t_eq,
            period,
            num_cycles,
            n_pre,
            n_post,
            seam_offset: DEFAULT_SEAM_OFFSET,
        }
    }

    pub fn with_seam_offset(mut self, seam_offset: f64) -> Self {
        self.seam_offset = seam_offset;
        self
    }

    pub fn t_final(&self) -> f64 {
        self.t_eq + f64::from(self.num_cycles) * self.period
    }

    pub fn validate(&self) -> Result<(), ForcingError> {
        if !self.t_eq.is_finite() || self.t_eq <= 0.0 {
            return Err(ForcingError::InvalidParameter(format!(
                "t_eq must be finite and > 0, got {}",
                self.t_eq
            )));
        }

        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(ForcingError::InvalidParameter(format!(
                "period must be finite and > 0, got {}",
                self.period
            )));
        }

        if self.num_cycles < 1 {
            return Err(ForcingError::InvalidParameter(
                "num_cycles must be at least 1".to_string(),
            ));
        }

        if self.n_pre < 2 || self.n_post < 2 {
            return Err(ForcingError::InvalidParameter(format!(
                "n_pre and n_post must be at least 2, got {} and {}",
                self.n_pre, self.n_post
            )));
        }

        if !self.seam_offset.is_finite() || self.seam_offset <= 0.0 {
            return Err(ForcingError::InvalidParameter(format!(
                "seam_offset must be finite and > 0, got {}",
                self.seam_offset
            )));
        }

        if self.seam_offset >= f64::from(self.num_cycles) {
            return Err(ForcingError::InvalidParameter(format!(
                "seam_offset ({}) must be smaller than num_cycles ({})",
                self.seam_offset, self.num_cycles
            )));
        }

        if !self.t_final().is_finite() {
            return Err(ForcingError::InvalidParameter(
                "t_final overflows".to_string(),
            ));
        }

        Ok(())
    }
}

/// Strictly increasing sample times, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    times: Vec<f64>,
    t_eq: f64,
    period: f64,
    n_pre: usize,
}

impl TimeAxis {
    pub fn two_phase(params: &ScheduleParams) -> Result<Self, ForcingError> {
        params.validate()?;

        let t_final = params.t_final();
        let post_start = params.t_eq + params.period * params.seam_offset;
        if post_start <= params.t_eq {
            return Err(ForcingError::InvalidParameter(format!(
                "seam offset {} vanishes against t_eq {}",
                params.seam_offset, params.t_eq
            )));
        }

        let mut times = Vec::with_capacity(params.n_pre + params.n_post);
        times.extend(linspace(0.0, params.t_eq, params.n_pre));
        times.extend(linspace(post_start, t_final, params.n_post));

        if let Some(idx) = times.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(ForcingError::InvalidParameter(format!(
                "sample spacing underflows at t = {}: period {} over {} samples is too fine for t_eq {}",
                times[idx], params.period, params.n_post, params.t_eq
            )));
        }

        Ok(Self {
            times,
            t_eq: params.t_eq,
            period: params.period,
            n_pre: params.n_pre,
        })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn t_eq(&self) -> f64 {
        self.t_eq
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn t_final(&self) -> f64 {
        *self.times.last().unwrap_or(&self.t_eq)
    }

    /// Index of the first perturbation sample.
    pub fn perturbation_start(&self) -> usize {
        self.n_pre
    }

    pub fn n_post(&self) -> usize {
        self.times.len() - self.n_pre
    }

    pub fn equilibration(&self) -> &[f64] {
        &self.times[..self.n_pre]
    }

    pub fn perturbation(&self) -> &[f64] {
        &self.times[self.n_pre..]
    }
}

/// `n` evenly spaced points over `[start, stop]`, both endpoints exact.
pub(crate) fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|idx| {
                    if idx == n - 1 {
                        stop
                    } else {
                        start + step * idx as f64
                    }
                })
                .collect()
        }
    }
}

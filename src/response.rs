//! Response extraction: amplitude ratio and phase lag of an output signal
//! against the forcing that produced it.

use serde::{Deserialize, Serialize};

use crate::forcing::ForcingSignal;
use crate::schedule::TimeAxis;
use crate::{ensure_len, ForcingError};

/// Share of the perturbation segment used for peak detection by default.
pub const DEFAULT_TAIL_FRACTION: f64 = 0.2;

const MIN_WINDOW_POINTS: usize = 2;

/// Output quantity sampled on the same axis as the forcing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSignal {
    values: Vec<f64>,
}

impl ResponseSignal {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f64>> for ResponseSignal {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// Window starts as absolute indices into the aligned arrays.
///
/// `None` selects the defaults: the midpoint of the perturbation segment for
/// the amplitude window and its last 20 % for peak detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionWindows {
    pub post_start: Option<usize>,
    pub tail_start: Option<usize>,
}

impl ExtractionWindows {
    pub fn resolve(&self, axis: &TimeAxis) -> (usize, usize) {
        let n_pre = axis.perturbation_start();
        let n_post = axis.n_post();

        let post_start = self.post_start.unwrap_or(n_pre + n_post / 2);
        let tail_len = ((n_post as f64) * DEFAULT_TAIL_FRACTION).ceil() as usize;
        let tail_len = tail_len.max(MIN_WINDOW_POINTS).min(n_post);
        let tail_start = self.tail_start.unwrap_or(n_pre + n_post - tail_len);

        (post_start, tail_start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    /// Peak-to-trough range of the response over that of the forcing
    pub amplitude_ratio: f64,
    /// Peak delay in periods, positive when the response lags.
    ///
    /// Wrapped into `(-0.5, 0.5]`: a lag of 0.6 periods reads as a lead of
    /// 0.4, since peaks one cycle apart are indistinguishable.
    pub phase_lag_fraction: f64,
}

pub fn extract_response(
    axis: &TimeAxis,
    forcing: &ForcingSignal,
    response: &ResponseSignal,
    windows: &ExtractionWindows,
) -> Result<ResponseMetrics, ForcingError> {
    let n = axis.len();
    ensure_len("forcing signal", n, forcing.len())?;
    ensure_len("response signal", n, response.len())?;

    let (post_start, tail_start) = windows.resolve(axis);
    let times = axis.times();
    let forcing = forcing.values();
    let response = response.values();

    let post_len = n.saturating_sub(post_start);
    if post_len < MIN_WINDOW_POINTS {
        return Err(ForcingError::InsufficientData {
            context: "amplitude window",
            needed: MIN_WINDOW_POINTS,
            got: post_len,
        });
    }

    let forcing_range = peak_to_trough(&forcing[post_start..]);
    if forcing_range.is_nan() || forcing_range <= 0.0 {
        return Err(ForcingError::DegenerateSignal(
            "forcing has zero range over the amplitude window",
        ));
    }
    let amplitude_ratio = peak_to_trough(&response[post_start..]) / forcing_range;

    let tail_len = n.saturating_sub(tail_start);
    if tail_len < MIN_WINDOW_POINTS {
        return Err(ForcingError::InsufficientData {
            context: "peak window",
            needed: MIN_WINDOW_POINTS,
            got: tail_len,
        });
    }

    let forcing_peak = tail_start + stable_argmax(&forcing[tail_start..]);
    let response_peak = tail_start + stable_argmax(&response[tail_start..]);
    let delay = (times[response_peak] - times[forcing_peak]) / axis.period();

    Ok(ResponseMetrics {
        amplitude_ratio,
        phase_lag_fraction: wrap_half_cycle(delay),
    })
}

/// Outgoing flux `uplift - dh/dt` from a mean-elevation history.
///
/// Second-order central differences on the non-uniform axis inside, one-sided
/// differences at both ends.
pub fn outflux_from_elevation(
    axis: &TimeAxis,
    mean_elevation: &[f64],
    uplift: &[f64],
) -> Result<ResponseSignal, ForcingError> {
    let n = axis.len();
    ensure_len("mean elevation", n, mean_elevation.len())?;
    ensure_len("uplift", n, uplift.len())?;
    if n < MIN_WINDOW_POINTS {
        return Err(ForcingError::InsufficientData {
            context: "elevation derivative",
            needed: MIN_WINDOW_POINTS,
            got: n,
        });
    }

    let rate = gradient(axis.times(), mean_elevation);
    let values = uplift
        .iter()
        .zip(rate.iter())
        .map(|(&u, &dh)| u - dh)
        .collect();

    Ok(ResponseSignal { values })
}

fn gradient(t: &[f64], f: &[f64]) -> Vec<f64> {
    let n = t.len();
    let mut out = Vec::with_capacity(n);

    out.push((f[1] - f[0]) / (t[1] - t[0]));
    for i in 1..n - 1 {
        let hs = t[i] - t[i - 1];
        let hd = t[i + 1] - t[i];
        let numer = hs * hs * f[i + 1] + (hd * hd - hs * hs) * f[i] - hd * hd * f[i - 1];
        out.push(numer / (hs * hd * (hd + hs)));
    }
    out.push((f[n - 1] - f[n - 2]) / (t[n - 1] - t[n - 2]));

    out
}

fn peak_to_trough(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    max - min
}

/// Index of the first maximum; later ties never replace it.
fn stable_argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, &value) in values.iter().enumerate().skip(1) {
        if value > values[best] {
            best = idx;
        }
    }
    best
}

/// Maps a delay in periods onto `(-0.5, 0.5]`.
fn wrap_half_cycle(delay: f64) -> f64 {
    let wrapped = delay - delay.round();
    if wrapped <= -0.5 {
        wrapped + 1.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use super::{
        extract_response, outflux_from_elevation, stable_argmax, wrap_half_cycle,
        ExtractionWindows, ResponseSignal,
    };
    use crate::forcing::{ForcingParams, ForcingSignal};
    use crate::schedule::{ScheduleParams, TimeAxis};
    use crate::ForcingError;

    fn axis() -> TimeAxis {
        TimeAxis::two_phase(&ScheduleParams::new(1.0, 1.0, 5, 11, 1001)).unwrap()
    }

    fn sinusoid(axis: &TimeAxis, amplitude: f64, shift: f64) -> Vec<f64> {
        axis.times()
            .iter()
            .map(|&t| {
                if t <= axis.t_eq() {
                    1.0
                } else {
                    1.0 + amplitude * (TAU * (t - axis.t_eq() - shift) / axis.period()).sin()
                }
            })
            .collect()
    }

    #[test]
    fn default_windows_follow_the_perturbation_segment() {
        let axis = TimeAxis::two_phase(&ScheduleParams::new(1.0e7, 1.0e8, 5, 101, 100)).unwrap();
        let (post, tail) = ExtractionWindows::default().resolve(&axis);
        assert_eq!(post, 151);
        assert_eq!(tail, 181);
    }

    #[test]
    fn identical_signals_give_unit_ratio_and_no_lag() {
        let axis = axis();
        let forcing = ForcingSignal::sample(&axis, &ForcingParams::new(2.0e-3, 0.5)).unwrap();
        let response = ResponseSignal::from(forcing.values().to_vec());
        let metrics =
            extract_response(&axis, &forcing, &response, &ExtractionWindows::default()).unwrap();
        assert!((metrics.amplitude_ratio - 1.0).abs() < 1e-12);
        assert_eq!(metrics.phase_lag_fraction, 0.0);
    }

    #[test]
    fn amplitude_ratio_of_scaled_sinusoids() {
        let axis = axis();
        let forcing = ForcingSignal::from(sinusoid(&axis, 0.5, 0.0));
        let response = ResponseSignal::from(sinusoid(&axis, 0.1, 0.0));
        let metrics =
            extract_response(&axis, &forcing, &response, &ExtractionWindows::default()).unwrap();
        assert!((metrics.amplitude_ratio - 0.2).abs() < 1e-9);
    }

    #[test]
    fn quarter_period_delay_is_a_positive_lag() {
        let axis = axis();
        let forcing = ForcingSignal::from(sinusoid(&axis, 0.5, 0.0));
        let response = ResponseSignal::from(sinusoid(&axis, 0.5, 0.25));
        let metrics =
            extract_response(&axis, &forcing, &response, &ExtractionWindows::default()).unwrap();
        assert!((metrics.phase_lag_fraction - 0.25).abs() < 0.01);
    }

    #[test]
    fn leading_response_is_a_negative_lag() {
        let axis = axis();
        let forcing = ForcingSignal::from(sinusoid(&axis, 0.5, 0.0));
        let response = ResponseSignal::from(sinusoid(&axis, 0.5, -0.1));
        let metrics =
            extract_response(&axis, &forcing, &response, &ExtractionWindows::default()).unwrap();
        assert!((metrics.phase_lag_fraction + 0.1).abs() < 0.01);
    }

    #[test]
    fn lag_beyond_half_a_period_reads_as_a_lead() {
        let axis = axis();
        let forcing = ForcingSignal::from(sinusoid(&axis, 0.5, 0.0));
        let response = ResponseSignal::from(sinusoid(&axis, 0.5, 0.6));
        let metrics =
            extract_response(&axis, &forcing, &response, &ExtractionWindows::default()).unwrap();
        assert!((metrics.phase_lag_fraction + 0.4).abs() < 0.01);
    }

    #[test]
    fn constant_forcing_is_degenerate() {
        let axis = axis();
        let forcing = ForcingSignal::sample(&axis, &ForcingParams::new(1.0, 0.0)).unwrap();
        let response = ResponseSignal::from(sinusoid(&axis, 0.5, 0.0));
        let result = extract_response(&axis, &forcing, &response, &ExtractionWindows::default());
        assert!(matches!(result, Err(ForcingError::DegenerateSignal(_))));
    }

    #[test]
    fn short_windows_are_rejected() {
        let axis = axis();
        let forcing = ForcingSignal::from(sinusoid(&axis, 0.5, 0.0));
        let response = ResponseSignal::from(sinusoid(&axis, 0.5, 0.0));

        let late_tail = ExtractionWindows {
            post_start: None,
            tail_start: Some(axis.len() - 1),
        };
        assert!(matches!(
            extract_response(&axis, &forcing, &response, &late_tail),
            Err(ForcingError::InsufficientData { context: "peak window", .. })
        ));

        let past_end = ExtractionWindows {
            post_start: Some(axis.len() + 5),
            tail_start: None,
        };
        assert!(matches!(
            extract_response(&axis, &forcing, &response, &past_end),
            Err(ForcingError::InsufficientData { got: 0, .. })
        ));
    }

    #[test]
    fn misaligned_response_is_rejected() {
        let axis = axis();
        let forcing = ForcingSignal::from(sinusoid(&axis, 0.5, 0.0));
        let response = ResponseSignal::from(vec![1.0; 3]);
        assert!(matches!(
            extract_response(&axis, &forcing, &response, &ExtractionWindows::default()),
            Err(ForcingError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn argmax_keeps_the_earliest_tie() {
        assert_eq!(stable_argmax(&[0.0, 3.0, 1.0, 3.0]), 1);
        assert_eq!(stable_argmax(&[5.0]), 0);
    }

    #[test]
    fn wrap_maps_into_half_open_cycle() {
        assert_eq!(wrap_half_cycle(0.0), 0.0);
        assert!((wrap_half_cycle(-0.75) - 0.25).abs() < 1e-12);
        assert!((wrap_half_cycle(0.8) + 0.2).abs() < 1e-12);
        assert_eq!(wrap_half_cycle(0.5), 0.5);
        assert_eq!(wrap_half_cycle(-0.5), 0.5);
    }

    #[test]
    fn outflux_of_steady_elevation_is_uplift() {
        let axis = axis();
        let elevation = vec![250.0; axis.len()];
        let uplift = vec![1.0e-3; axis.len()];
        let flux = outflux_from_elevation(&axis, &elevation, &uplift).unwrap();
        assert!(flux.values().iter().all(|&f| (f - 1.0e-3).abs() < 1e-9));
    }

    #[test]
    fn outflux_of_linear_ramp_subtracts_slope() {
        let axis = axis();
        let elevation: Vec<f64> = axis.times().iter().map(|&t| 10.0 + 0.5 * t).collect();
        let uplift = vec![2.0; axis.len()];
        let flux = outflux_from_elevation(&axis, &elevation, &uplift).unwrap();
        assert!(flux.values().iter().all(|&f| (f - 1.5).abs() < 1e-9));
    }
}

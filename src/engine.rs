//! Boundary with the landscape-evolution engine
//!
//! The 2D solver is external. [`LandscapeEngine`] is the narrow interface a
//! driver talks to; [`LumpedEngine`] implements it with a zero-dimensional
//! mean-elevation balance so that experiments run without the external solver.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use tracing::debug;

use crate::forcing::ForcingSignal;
use crate::schedule::TimeAxis;
use crate::{ensure_len, ForcingError};

const NEWTON_ITERATIONS: usize = 32;
const MAX_SUBSTEPS: usize = 100_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    #[default]
    FixedValue,
    Core,
    Looped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConditions {
    pub left: BoundaryKind,
    pub right: BoundaryKind,
    pub top: BoundaryKind,
    pub bottom: BoundaryKind,
}

impl Default for BoundaryConditions {
    fn default() -> Self {
        Self {
            left: BoundaryKind::Looped,
            right: BoundaryKind::Looped,
            top: BoundaryKind::FixedValue,
            bottom: BoundaryKind::FixedValue,
        }
    }
}

impl BoundaryConditions {
    pub fn validate(&self) -> Result<(), ForcingError> {
        let looped = |kind: BoundaryKind| kind == BoundaryKind::Looped;

        if looped(self.left) != looped(self.right) {
            return Err(ForcingError::InvalidConfig(
                "left and right boundaries must both be looped or neither".to_string(),
            ));
        }

        if looped(self.top) != looped(self.bottom) {
            return Err(ForcingError::InvalidConfig(
                "top and bottom boundaries must both be looped or neither".to_string(),
            ));
        }

        let edges = [self.left, self.right, self.top, self.bottom];
        if !edges.contains(&BoundaryKind::FixedValue) {
            return Err(ForcingError::InvalidConfig(
                "at least one boundary must be fixed_value (base level)".to_string(),
            ));
        }

        Ok(())
    }
}

/// Which engine input the forcing signal drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcingTarget {
    #[default]
    UpliftRate,
    Erodibility,
}

impl ForcingTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForcingTarget::UpliftRate => "uplift_rate",
            ForcingTarget::Erodibility => "erodibility",
        }
    }
}

/// Static engine configuration with a fixed set of recognized fields.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grid nodes `[rows, cols]`
    pub grid_shape: [usize; 2],
    /// Grid physical size `[ly, lx]` [m]
    pub grid_length: [f64; 2],
    pub boundaries: BoundaryConditions,
    /// Drainage-area exponent of the stream-power law
    #[serde_as(as = "DefaultOnNull")]
    pub area_exponent: f64,
    /// Slope exponent of the stream-power law
    #[serde_as(as = "DefaultOnNull")]
    pub slope_exponent: f64,
    /// Bedrock erodibility [m^(1-2m)/yr]
    #[serde_as(as = "DefaultOnNull")]
    pub k_coef: f64,
    /// Hillslope diffusivity [m^2/yr]
    #[serde_as(as = "DefaultOnNull")]
    pub diffusivity: f64,
    /// Standard deviation of the random initial topography [m]
    #[serde_as(as = "DefaultOnNull")]
    pub initial_roughness: f64,
    #[serde_as(as = "DefaultOnNull")]
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_shape: [101, 201],
            grid_length: [1.0e4, 2.0e4],
            boundaries: BoundaryConditions::default(),
            area_exponent: 0.4,
            slope_exponent: 1.0,
            k_coef: 2.0e-6,
            diffusivity: 1.0e-2,
            initial_roughness: 1.0,
            seed: 42,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ForcingError> {
        if self.grid_shape.iter().any(|&nodes| nodes < 2) {
            return Err(ForcingError::InvalidConfig(format!(
                "grid_shape must have at least 2 nodes per axis, got {:?}",
                self.grid_shape
            )));
        }

        if self.grid_shape[0].checked_mul(self.grid_shape[1]).is_none() {
            return Err(ForcingError::InvalidConfig(format!(
                "grid_shape {:?} has more nodes than fit in usize",
                self.grid_shape
            )));
        }

        if self
            .grid_length
            .iter()
            .any(|&length| !length.is_finite() || length <= 0.0)
        {
            return Err(ForcingError::InvalidConfig(format!(
                "grid_length must be finite and > 0, got {:?}",
                self.grid_length
            )));
        }

        self.boundaries.validate()?;

        for (name, value) in [
            ("area_exponent", self.area_exponent),
            ("slope_exponent", self.slope_exponent),
            ("k_coef", self.k_coef),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ForcingError::InvalidConfig(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("diffusivity", self.diffusivity),
            ("initial_roughness", self.initial_roughness),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ForcingError::InvalidConfig(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }

        Ok(())
    }

    /// Length of the longer grid side [m].
    pub fn relief_length(&self) -> f64 {
        self.grid_length[0].max(self.grid_length[1])
    }

    /// Saturates for shapes that `validate` rejects.
    pub fn node_count(&self) -> usize {
        self.grid_shape[0].saturating_mul(self.grid_shape[1])
    }

    /// e-folding time of the mean-elevation balance at steady state under `uplift`.
    pub fn response_time(&self, uplift: f64) -> f64 {
        let balance = ErosionBalance::new(self, self.k_coef);
        let h = balance.steady_state(uplift);
        1.0 / balance.rate_derivative(h)
    }
}

/// Engine output sampled on the experiment's time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub mean_elevation: Vec<f64>,
    /// Uplift rate actually applied at each sample
    pub uplift: Vec<f64>,
}

pub trait LandscapeEngine: Send + Sync {
    fn name(&self) -> &str;

    fn run(
        &self,
        config: &EngineConfig,
        target: ForcingTarget,
        axis: &TimeAxis,
        forcing: &ForcingSignal,
        uplift: f64,
    ) -> Result<EngineOutput, ForcingError>;
}

/// Mean-elevation balance `dh/dt = U - c_s h^n - c_d h`.
///
/// `c_s = K A^m / L^n` follows from the stream-power law with slope `h / L`
/// and catchment area `A = L^2`; `c_d = D pi^2 / L^2` is the decay rate of
/// the fundamental diffusive mode.
#[derive(Debug, Clone, Copy)]
struct ErosionBalance {
    c_stream: f64,
    c_diffusion: f64,
    n: f64,
}

impl ErosionBalance {
    fn new(config: &EngineConfig, k_coef: f64) -> Self {
        let length = config.relief_length();
        let area = length * length;
        Self {
            c_stream: k_coef * area.powf(config.area_exponent)
                / length.powf(config.slope_exponent),
            c_diffusion: config.diffusivity * std::f64::consts::PI.powi(2) / (length * length),
            n: config.slope_exponent,
        }
    }

    fn erosion_rate(&self, h: f64) -> f64 {
        let h = h.max(0.0);
        self.c_stream * h.powf(self.n) + self.c_diffusion * h
    }

    fn rate_derivative(&self, h: f64) -> f64 {
        let h = h.max(f64::MIN_POSITIVE);
        self.c_stream * self.n * h.powf(self.n - 1.0) + self.c_diffusion
    }

    fn steady_state(&self, uplift: f64) -> f64 {
        let mut h = (uplift.max(0.0) / self.c_stream).powf(1.0 / self.n);
        for _ in 0..NEWTON_ITERATIONS {
            let residual = self.erosion_rate(h) - uplift;
            let step = residual / self.rate_derivative(h);
            h = (h - step).max(0.0);
            if step.abs() <= 1e-14 * h.max(1.0) {
                break;
            }
        }
        h
    }

    /// One backward-Euler step of length `dt` ending at uplift `u`.
    fn implicit_step(&self, h: f64, u: f64, dt: f64) -> f64 {
        let mut next = h;
        for _ in 0..NEWTON_ITERATIONS {
            let residual = next - h - dt * (u - self.erosion_rate(next));
            let slope = 1.0 + dt * self.rate_derivative(next);
            let step = residual / slope;
            next = (next - step).max(0.0);
            if step.abs() <= 1e-14 * next.max(1.0) {
                break;
            }
        }
        next
    }
}

/// Zero-dimensional stand-in for the 2D landscape-evolution solver.
#[derive(Debug, Clone, Copy)]
pub struct LumpedEngine {
    /// Internal substeps per local response time
    pub substeps_per_tau: usize,
}

impl Default for LumpedEngine {
    fn default() -> Self {
        Self {
            substeps_per_tau: 20,
        }
    }
}

impl LumpedEngine {
    fn initial_offset(&self, config: &EngineConfig) -> Result<f64, ForcingError> {
        if config.initial_roughness == 0.0 {
            return Ok(0.0);
        }

        // mean of N iid Normal(0, s) nodes is Normal(0, s / sqrt(N))
        let spread = config.initial_roughness / (config.node_count() as f64).sqrt();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let noise = Normal::new(0.0, spread)
            .map_err(|err| ForcingError::InvalidConfig(format!("initial_roughness: {err}")))?;
        Ok(noise.sample(&mut rng))
    }
}

impl LandscapeEngine for LumpedEngine {
    fn name(&self) -> &str {
        "lumped"
    }

    fn run(
        &self,
        config: &EngineConfig,
        target: ForcingTarget,
        axis: &TimeAxis,
        forcing: &ForcingSignal,
        uplift: f64,
    ) -> Result<EngineOutput, ForcingError> {
        config.validate()?;
        ensure_len("engine forcing", axis.len(), forcing.len())?;
        if self.substeps_per_tau == 0 {
            return Err(ForcingError::InvalidConfig(
                "substeps_per_tau must be greater than zero".to_string(),
            ));
        }

        let reference = forcing.initial().ok_or(ForcingError::InsufficientData {
            context: "engine forcing",
            needed: 1,
            got: 0,
        })?;

        let (uplift_series, erodibility): (Vec<f64>, Vec<f64>) = match target {
            ForcingTarget::UpliftRate => (
                forcing.values().to_vec(),
                vec![config.k_coef; forcing.len()],
            ),
            ForcingTarget::Erodibility => {
                if !uplift.is_finite() || uplift <= 0.0 {
                    return Err(ForcingError::InvalidParameter(format!(
                        "uplift must be finite and > 0 under erodibility forcing, got {uplift}"
                    )));
                }
                (
                    vec![uplift; forcing.len()],
                    forcing
                        .values()
                        .iter()
                        .map(|&f| config.k_coef * f / reference)
                        .collect(),
                )
            }
        };

        let times = axis.times();
        let start_balance = ErosionBalance::new(config, erodibility[0]);
        let mut h =
            (start_balance.steady_state(uplift_series[0]) + self.initial_offset(config)?).max(0.0);

        let mut mean_elevation = Vec::with_capacity(axis.len());
        mean_elevation.push(h);
        let mut total_substeps = 0_usize;

        for i in 0..times.len() - 1 {
            let dt = times[i + 1] - times[i];
            let local = ErosionBalance::new(config, erodibility[i]);
            let tau = 1.0 / local.rate_derivative(h);
            let substeps = ((dt * self.substeps_per_tau as f64 / tau).ceil() as usize)
                .clamp(1, MAX_SUBSTEPS);
            let sub_dt = dt / substeps as f64;

            for k in 1..=substeps {
                let frac = k as f64 / substeps as f64;
                let u = lerp(uplift_series[i], uplift_series[i + 1], frac);
                let kf = lerp(erodibility[i], erodibility[i + 1], frac);
                h = ErosionBalance::new(config, kf).implicit_step(h, u, sub_dt);
            }

            total_substeps += substeps;
            mean_elevation.push(h);
        }

        debug!(
            engine = self.name(),
            target = target.as_str(),
            samples = axis.len(),
            substeps = total_substeps,
            "engine run finished"
        );

        Ok(EngineOutput {
            mean_elevation,
            uplift: uplift_series,
        })
    }
}

fn lerp(a: f64, b: f64, frac: f64) -> f64 {
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::{
        BoundaryConditions, BoundaryKind, EngineConfig, ErosionBalance, ForcingTarget,
        LandscapeEngine, LumpedEngine,
    };
    use crate::forcing::{build_forcing, ForcingParams};
    use crate::schedule::ScheduleParams;
    use crate::ForcingError;

    fn unit_config() -> EngineConfig {
        EngineConfig {
            grid_shape: [4, 4],
            grid_length: [1.0, 1.0],
            k_coef: 2.0,
            diffusivity: 0.0,
            initial_roughness: 0.0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn boundaries_need_a_base_level() {
        let boundaries = BoundaryConditions {
            left: BoundaryKind::Core,
            right: BoundaryKind::Core,
            top: BoundaryKind::Looped,
            bottom: BoundaryKind::Looped,
        };
        assert!(matches!(
            boundaries.validate(),
            Err(ForcingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn looped_boundaries_come_in_pairs() {
        let boundaries = BoundaryConditions {
            left: BoundaryKind::Looped,
            right: BoundaryKind::FixedValue,
            ..BoundaryConditions::default()
        };
        assert!(boundaries.validate().is_err());
    }

    #[test]
    fn rejects_node_count_overflow() {
        let config = EngineConfig {
            grid_shape: [1 << 33, 1 << 33],
            ..unit_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ForcingError::InvalidConfig(_))
        ));

        let (axis, forcing) = build_forcing(
            &ScheduleParams::new(1.0, 1.0, 1, 3, 3),
            &ForcingParams::new(1.0e-3, 0.5),
        )
        .unwrap();
        let result = LumpedEngine::default().run(
            &config,
            ForcingTarget::UpliftRate,
            &axis,
            &forcing,
            0.0,
        );
        assert!(matches!(result, Err(ForcingError::InvalidConfig(_))));
    }

    #[test]
    fn initial_offset_shrinks_with_grid_size() {
        let small = EngineConfig {
            initial_roughness: 5.0,
            seed: 11,
            ..unit_config()
        };
        let large = EngineConfig {
            grid_shape: [1 << 20, 1 << 20],
            ..small.clone()
        };
        let engine = LumpedEngine::default();
        let small_offset = engine.initial_offset(&small).unwrap();
        let large_offset = engine.initial_offset(&large).unwrap();

        // same seed, same standard-normal draw, scaled by 1 / sqrt(N)
        let ratio = (large.node_count() as f64 / small.node_count() as f64).sqrt();
        assert!((small_offset - large_offset * ratio).abs() < 1e-9 * small_offset.abs().max(1.0));
        assert!(large_offset.abs() < small_offset.abs() || small_offset == 0.0);
    }

    #[test]
    fn rejects_non_positive_erodibility() {
        let config = EngineConfig {
            k_coef: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ForcingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn linear_balance_has_closed_form_response_time() {
        let config = unit_config();
        assert!((config.response_time(1.0e-3) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn nonlinear_steady_state_balances_uplift() {
        let config = EngineConfig {
            slope_exponent: 1.5,
            diffusivity: 1.0,
            ..unit_config()
        };
        let balance = ErosionBalance::new(&config, config.k_coef);
        let h = balance.steady_state(0.3);
        assert!((balance.erosion_rate(h) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn steady_forcing_keeps_steady_state() {
        let config = unit_config();
        let (axis, forcing) = build_forcing(
            &ScheduleParams::new(1.0, 1.0, 2, 5, 20),
            &ForcingParams::new(1.0e-3, 0.0),
        )
        .unwrap();

        let output = LumpedEngine::default()
            .run(&config, ForcingTarget::UpliftRate, &axis, &forcing, 0.0)
            .unwrap();

        assert_eq!(output.mean_elevation.len(), axis.len());
        for &h in &output.mean_elevation {
            assert!((h - 5.0e-4).abs() < 1e-15);
        }
    }

    #[test]
    fn random_initial_topography_is_seeded() {
        let config = EngineConfig {
            initial_roughness: 5.0,
            seed: 7,
            ..unit_config()
        };
        let (axis, forcing) = build_forcing(
            &ScheduleParams::new(1.0, 1.0, 1, 3, 3),
            &ForcingParams::new(1.0e-3, 0.5),
        )
        .unwrap();
        let engine = LumpedEngine::default();

        let a = engine
            .run(&config, ForcingTarget::UpliftRate, &axis, &forcing, 0.0)
            .unwrap();
        let b = engine
            .run(&config, ForcingTarget::UpliftRate, &axis, &forcing, 0.0)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a.mean_elevation[0], 5.0e-4);
    }

    #[test]
    fn erodibility_forcing_keeps_uplift_constant() {
        let config = unit_config();
        let (axis, forcing) = build_forcing(
            &ScheduleParams::new(1.0, 1.0, 2, 5, 40),
            &ForcingParams::new(1.0, 0.5).with_exponent(0.4),
        )
        .unwrap();

        let output = LumpedEngine::default()
            .run(&config, ForcingTarget::Erodibility, &axis, &forcing, 1.0e-3)
            .unwrap();
        assert!(output.uplift.iter().all(|&u| u == 1.0e-3));
        assert!(output.mean_elevation.iter().all(|h| h.is_finite() && *h > 0.0));
    }

    #[test]
    fn erodibility_forcing_requires_uplift() {
        let (axis, forcing) = build_forcing(
            &ScheduleParams::new(1.0, 1.0, 1, 3, 3),
            &ForcingParams::new(1.0, 0.5),
        )
        .unwrap();
        let result = LumpedEngine::default().run(
            &unit_config(),
            ForcingTarget::Erodibility,
            &axis,
            &forcing,
            0.0,
        );
        assert!(matches!(result, Err(ForcingError::InvalidParameter(_))));
    }
}

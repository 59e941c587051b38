//! lem-forcing - periodic forcing schedules and response analysis
//!
//! Builds two-phase (equilibration + periodic perturbation) time axes with a
//! sampled forcing signal, drives a landscape-evolution engine with them, and
//! measures the landscape's response as an amplitude ratio and a phase lag.

pub mod config;
pub mod engine;
pub mod forcing;
pub mod output;
pub mod response;
pub mod schedule;
pub mod sweep;
pub mod telemetry;

use thiserror::Error;

pub use config::ExperimentConfig;
pub use engine::{
    BoundaryConditions, BoundaryKind, EngineConfig, EngineOutput, ForcingTarget, LandscapeEngine,
    LumpedEngine,
};
pub use forcing::{build_forcing, ForcingParams, ForcingSignal};
pub use output::create_timestamped_output_dir;
pub use response::{
    extract_response, outflux_from_elevation, ExtractionWindows, ResponseMetrics, ResponseSignal,
};
pub use schedule::{ScheduleParams, TimeAxis};
pub use sweep::{
    run_experiment, run_sweep, run_sweep_into_dir, ExperimentRun, SweepRecord, SweepResult,
};
pub use telemetry::init_tracing;

#[derive(Debug, Error)]
pub enum ForcingError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("insufficient data for {context}: need at least {needed} points, got {got}")]
    InsufficientData {
        context: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("degenerate signal: {0}")]
    DegenerateSignal(&'static str),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn ensure_len(
    context: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), ForcingError> {
    if expected == actual {
        return Ok(());
    }

    Err(ForcingError::LengthMismatch {
        context,
        expected,
        got: actual,
    })
}

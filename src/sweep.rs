use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ExperimentConfig;
use crate::engine::{EngineOutput, ForcingTarget, LandscapeEngine};
use crate::forcing::{build_forcing, ForcingSignal};
use crate::output::{write_summary_json, write_sweep_csv, write_timeseries_csv, SweepSummary};
use crate::response::{extract_response, outflux_from_elevation, ResponseMetrics, ResponseSignal};
use crate::schedule::TimeAxis;
use crate::ForcingError;

/// One `(builder -> engine -> extractor)` pipeline with every intermediate kept.
#[derive(Debug, Clone)]
pub struct ExperimentRun {
    pub period: f64,
    pub relative_amplitude: f64,
    pub response_time: f64,
    pub axis: TimeAxis,
    pub forcing: ForcingSignal,
    pub output: EngineOutput,
    pub outflux: ResponseSignal,
    pub metrics: ResponseMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRecord {
    pub run_id: usize,
    pub target: String,
    pub period: f64,
    pub relative_amplitude: f64,
    pub response_time: f64,
    pub amplitude_ratio: f64,
    pub phase_lag_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct SweepResult {
    pub output_dir: Option<PathBuf>,
    pub engine: String,
    pub records: Vec<SweepRecord>,
    /// Full pipelines, kept only when `write_timeseries` is set
    pub runs: Vec<ExperimentRun>,
}

/// Runs the pipeline at the configured period and relative amplitude.
pub fn run_experiment<E>(config: &ExperimentConfig, engine: &E) -> Result<ExperimentRun, ForcingError>
where
    E: LandscapeEngine + ?Sized,
{
    config.validate()?;
    run_point(
        config,
        config.schedule.period,
        config.forcing.relative_amplitude,
        engine,
    )
}

fn run_point<E>(
    config: &ExperimentConfig,
    period: f64,
    relative_amplitude: f64,
    engine: &E,
) -> Result<ExperimentRun, ForcingError>
where
    E: LandscapeEngine + ?Sized,
{
    let (schedule, forcing_params) = config.at_point(period, relative_amplitude);
    let (axis, forcing) = build_forcing(&schedule, &forcing_params)?;

    let output = engine.run(&config.engine, config.target, &axis, &forcing, config.uplift)?;
    let outflux = outflux_from_elevation(&axis, &output.mean_elevation, &output.uplift)?;
    let metrics = extract_response(&axis, &forcing, &outflux, &config.windows)?;

    let base_uplift = match config.target {
        ForcingTarget::UpliftRate => forcing_params.baseline,
        ForcingTarget::Erodibility => config.uplift,
    };
    let response_time = config.engine.response_time(base_uplift);

    debug!(
        period,
        relative_amplitude,
        response_time,
        amplitude_ratio = metrics.amplitude_ratio,
        phase_lag_fraction = metrics.phase_lag_fraction,
        "experiment finished"
    );

    Ok(ExperimentRun {
        period,
        relative_amplitude,
        response_time,
        axis,
        forcing,
        output,
        outflux,
        metrics,
    })
}

/// Evaluates every grid point as an independent pipeline, in parallel.
///
/// Records come back in grid order regardless of scheduling.
pub fn run_sweep<E>(config: &ExperimentConfig, engine: &E) -> Result<SweepResult, ForcingError>
where
    E: LandscapeEngine + ?Sized,
{
    config.validate()?;
    let grid = config.sweep_grid();
    info!(
        engine = engine.name(),
        target = config.target.as_str(),
        points = grid.len(),
        "starting forcing sweep"
    );

    let runs: Vec<ExperimentRun> = grid
        .par_iter()
        .map(|&(period, amplitude)| run_point(config, period, amplitude, engine))
        .collect::<Result<_, _>>()?;

    let records = runs
        .iter()
        .enumerate()
        .map(|(run_id, run)| SweepRecord {
            run_id,
            target: config.target.as_str().to_string(),
            period: run.period,
            relative_amplitude: run.relative_amplitude,
            response_time: run.response_time,
            amplitude_ratio: run.metrics.amplitude_ratio,
            phase_lag_fraction: run.metrics.phase_lag_fraction,
        })
        .collect();

    info!(points = grid.len(), "forcing sweep finished");

    Ok(SweepResult {
        output_dir: None,
        engine: engine.name().to_string(),
        records,
        runs: if config.write_timeseries {
            runs
        } else {
            Vec::new()
        },
    })
}

pub fn run_sweep_into_dir<E>(
    config: &ExperimentConfig,
    engine: &E,
    output_dir: &Path,
) -> Result<SweepResult, ForcingError>
where
    E: LandscapeEngine + ?Sized,
{
    fs::create_dir_all(output_dir)?;
    let mut result = run_sweep(config, engine)?;

    write_sweep_csv(&output_dir.join("sweep.csv"), &result.records)?;
    write_summary_json(
        &output_dir.join("summary.json"),
        &SweepSummary {
            engine: result.engine.clone(),
            config: config.clone(),
            records: result.records.clone(),
        },
    )?;

    if !result.runs.is_empty() {
        let series_dir = output_dir.join("timeseries");
        fs::create_dir_all(&series_dir)?;
        for (idx, run) in result.runs.iter().enumerate() {
            let filename = format!("run_{idx:03}.csv");
            write_timeseries_csv(
                &series_dir.join(filename),
                run.axis.times(),
                run.forcing.values(),
                &run.output.mean_elevation,
                run.outflux.values(),
            )?;
        }
    }

    info!(output_dir = %output_dir.display(), "sweep output written");
    result.output_dir = Some(output_dir.to_path_buf());
    Ok(result)
}

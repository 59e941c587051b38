use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::Writer;
use serde::Serialize;

use crate::config::ExperimentConfig;
use crate::sweep::SweepRecord;
use crate::{ensure_len, ForcingError};

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub engine: String,
    pub config: ExperimentConfig,
    pub records: Vec<SweepRecord>,
}

pub fn create_timestamped_output_dir(output_root: &Path) -> Result<PathBuf, ForcingError> {
    fs::create_dir_all(output_root)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = output_root.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = output_root.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10e}")
}

pub fn write_timeseries_csv(
    path: &Path,
    times: &[f64],
    forcing: &[f64],
    mean_elevation: &[f64],
    outflux: &[f64],
) -> Result<(), ForcingError> {
    ensure_len("timeseries forcing", times.len(), forcing.len())?;
    ensure_len("timeseries mean_elevation", times.len(), mean_elevation.len())?;
    ensure_len("timeseries outflux", times.len(), outflux.len())?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["t", "forcing", "mean_elevation", "outflux"])?;

    for idx in 0..times.len() {
        writer.write_record([
            fmt_f64(times[idx]),
            fmt_f64(forcing[idx]),
            fmt_f64(mean_elevation[idx]),
            fmt_f64(outflux[idx]),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_sweep_csv(path: &Path, records: &[SweepRecord]) -> Result<(), ForcingError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "run_id",
        "target",
        "period",
        "relative_amplitude",
        "response_time",
        "amplitude_ratio",
        "phase_lag_fraction",
    ])?;

    for record in records {
        writer.write_record([
            record.run_id.to_string(),
            record.target.clone(),
            fmt_f64(record.period),
            fmt_f64(record.relative_amplitude),
            fmt_f64(record.response_time),
            fmt_f64(record.amplitude_ratio),
            fmt_f64(record.phase_lag_fraction),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_json(path: &Path, summary: &SweepSummary) -> Result<(), ForcingError> {
    fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

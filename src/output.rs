/// Run artifacts: `latest.json`, `exceedance.csv` and `summary.md`.
///
/// Only called with a completed run. Each file is written to a sibling
/// `.tmp` path and renamed into place, so a reader never sees a half-written
/// artifact.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::forecast::ForecastRun;
use crate::model::{ExceedanceRow, ForecastSummary, Result};

pub const LATEST_JSON: &str = "latest.json";
pub const EXCEEDANCE_CSV: &str = "exceedance.csv";
pub const SUMMARY_MD: &str = "summary.md";

/// Paths of the files written for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenOutputs {
    pub latest_json: PathBuf,
    pub exceedance_csv: PathBuf,
    pub summary_md: PathBuf,
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Exceedance rows as CSV, one line per forecast time.
pub fn exceedance_csv(rows: &[ExceedanceRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()).into())
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

fn fmt_ft(v: Option<f64>) -> String {
    v.map(|v| format!("{:.2} ft", v)).unwrap_or_else(|| "n/a".to_string())
}

/// Short Markdown brief for people reading the run.
pub fn render_markdown(summary: &ForecastSummary) -> String {
    let s = summary;
    let mut md = String::new();

    let _ = writeln!(md, "# Storm-tide outlook: {}", s.station.name);
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "CO-OPS {} / PETSS {} ({}). Generated {}.",
        s.station.coops_id,
        s.station.petss_id,
        s.station.datum,
        fmt_time(Some(s.generated_utc))
    );
    let _ = writeln!(md);
    let _ = writeln!(md, "**{}**", s.recommendation);
    let _ = writeln!(md);

    let _ = writeln!(md, "## Peak");
    let _ = writeln!(md);
    let _ = writeln!(md, "- Window: {} to {}", fmt_time(s.peak_window.start_utc), fmt_time(s.peak_window.end_utc));
    let _ = writeln!(md, "- Peak time: {}", fmt_time(s.peak_window.peak_time_utc));
    match &s.peak {
        Some(p) => {
            let _ = writeln!(
                md,
                "- Chance of minor / moderate / major flooding: {:.0}% / {:.0}% / {:.0}%",
                p.p_minor, p.p_moderate, p.p_major
            );
            let _ = writeln!(md, "- Ensemble mean {:.2} ft, p10-p90 spread {:.2} ft", p.mean_ft, p.spread_ft);
        }
        None => {
            let _ = writeln!(md, "- No forecast times available");
        }
    }
    let _ = writeln!(md, "- Confidence: {:.0}%", s.confidence * 100.0);
    let _ = writeln!(md);

    let _ = writeln!(md, "## Inputs");
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "- Thresholds ({}): minor {:.2} ft, moderate {:.2} ft, major {:.2} ft",
        s.thresholds.source.as_str(), s.thresholds.minor, s.thresholds.moderate, s.thresholds.major
    );
    let _ = writeln!(
        md,
        "- Bias applied: {:+.2} ft (n={}), updated to {:+.2} ft (n={})",
        s.bias.applied_bias_ft, s.bias.applied_n, s.bias.updated_bias_ft, s.bias.updated_n
    );
    let trend = if s.trend.applied {
        format!("applied, {:+.2} ft x {:.2} within {} h", s.trend.trend_adj_ft, s.trend.weight, s.trend.horizon_hours)
    } else if s.trend.trend_used {
        format!("fitted {:+.2} ft but not applied", s.trend.trend_adj_ft)
    } else {
        "not available".to_string()
    };
    let _ = writeln!(md, "- Observed trend: {}", trend);
    let _ = writeln!(
        md,
        "- Last observed: {} at {}; {} h max {}",
        fmt_ft(s.observed.last_value_ft),
        fmt_time(s.observed.last_time_utc),
        s.observed.lookback_hours,
        fmt_ft(s.observed.max_lookback_ft)
    );
    let _ = writeln!(md, "- Forecast times: {}, members: up to {}", s.n_times, s.n_members_max);

    md
}

/// Writes all artifacts for a completed run into `dir`, creating it.
pub fn write_run(dir: &Path, run: &ForecastRun) -> Result<WrittenOutputs> {
    fs::create_dir_all(dir)?;

    let outputs = WrittenOutputs {
        latest_json: dir.join(LATEST_JSON),
        exceedance_csv: dir.join(EXCEEDANCE_CSV),
        summary_md: dir.join(SUMMARY_MD),
    };

    // Render everything before touching the directory contents.
    let json = serde_json::to_vec_pretty(&run.summary)?;
    let csv = exceedance_csv(&run.rows)?;
    let md = render_markdown(&run.summary);

    write_atomically(&outputs.exceedance_csv, &csv)?;
    write_atomically(&outputs.summary_md, md.as_bytes())?;
    write_atomically(&outputs.latest_json, &json)?;

    info!(dir = %dir.display(), rows = run.rows.len(), "wrote run outputs");
    Ok(outputs)
}

/// One forecast correction run for a single station.
///
/// Pure with respect to I/O: the caller fetches the archive members,
/// observations and threshold lookup, loads the bias state, and persists
/// whatever comes back. `now` is injected so runs are reproducible.
///
/// ```text
/// sources ─► extract ─► bias-correct ─► trend blend ─► exceedance ─► peak
///                │                                                    │
///                └─ raw mean vs latest observation ─► bias update ◄───┘
/// ```

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::analysis::exceedance::{compute_exceedance, mean_by_time};
use crate::analysis::extract::{extract_station_series_parallel, SourceMap};
use crate::analysis::peak::{confidence_from_spread, recommend, select_peak_window};
use crate::analysis::trend::{apply_trend, assess_trend, TrendParams};
use crate::bias::{self, BiasState};
use crate::config::{EngineConfig, PolicyConfig, StationConfig};
use crate::model::{
    BiasReport, ExceedanceRow, FloodThresholds, ForecastError, ForecastSummary, ObservationPoint,
    ObservationSummary, PeakProbabilities, ResolvedThresholds, Result, StationSeriesRow,
    ThresholdSource,
};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Merges override and lookup levels, override first, level by level.
///
/// # Errors
/// - `ThresholdUnavailable`: a level is missing from both sources.
/// - `InvalidThresholds`: the merged levels are not ascending or not finite.
pub fn resolve_thresholds(
    station_id: &str,
    override_levels: &FloodThresholds,
    lookup: &FloodThresholds,
) -> Result<ResolvedThresholds> {
    let minor = override_levels.minor.or(lookup.minor);
    let moderate = override_levels.moderate.or(lookup.moderate);
    let major = override_levels.major.or(lookup.major);

    let (Some(minor), Some(moderate), Some(major)) = (minor, moderate, major) else {
        let missing: Vec<&str> = [("minor", minor), ("moderate", moderate), ("major", major)]
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect();
        return Err(ForecastError::ThresholdUnavailable {
            station: station_id.to_string(),
            missing: missing.join(", "),
        });
    };

    if ![minor, moderate, major].iter().all(|v| v.is_finite()) {
        return Err(ForecastError::InvalidThresholds("non-finite flood level".to_string()));
    }
    if !(minor <= moderate && moderate <= major) {
        return Err(ForecastError::InvalidThresholds(format!(
            "expected minor <= moderate <= major, got {} / {} / {}",
            minor, moderate, major
        )));
    }

    let source = if override_levels.is_empty() {
        ThresholdSource::Lookup
    } else {
        ThresholdSource::Override
    };
    Ok(ResolvedThresholds { minor, moderate, major, source })
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// Latest value and the maximum over the `lookback_hours` before it.
pub fn summarize_observations(observations: &[ObservationPoint], lookback_hours: i64) -> ObservationSummary {
    let last = observations
        .iter()
        .filter(|o| o.value_ft.is_finite())
        .max_by_key(|o| o.time);

    let Some(last) = last else {
        return ObservationSummary {
            last_value_ft: None,
            last_time_utc: None,
            max_lookback_ft: None,
            lookback_hours,
            n_points: 0,
        };
    };

    let cutoff = last.time - Duration::hours(lookback_hours);
    let window: Vec<f64> = observations
        .iter()
        .filter(|o| o.time >= cutoff && o.value_ft.is_finite())
        .map(|o| o.value_ft)
        .collect();

    ObservationSummary {
        last_value_ft: Some(last.value_ft),
        last_time_utc: Some(last.time),
        max_lookback_ft: window.iter().copied().reduce(f64::max),
        lookback_hours,
        n_points: window.len(),
    }
}

/// This run's `forecast - observed` error.
///
/// Compares the raw ensemble mean at the forecast time nearest the latest
/// observation with that observation. `None` when there is no observation or
/// the nearest forecast time is further away than `tolerance_minutes`.
pub fn match_bias_error(
    raw_rows: &[StationSeriesRow],
    observations: &[ObservationPoint],
    tolerance_minutes: i64,
) -> Option<f64> {
    let latest = observations
        .iter()
        .filter(|o| o.value_ft.is_finite())
        .max_by_key(|o| o.time)?;

    // Earliest time wins ties.
    let (time, mean) = mean_by_time(raw_rows)
        .into_iter()
        .min_by_key(|(t, _)| (*t - latest.time).num_seconds().abs())?;

    let gap_minutes = (time - latest.time).num_minutes().abs();
    if gap_minutes > tolerance_minutes {
        debug!(gap_minutes, "no forecast time near the latest observation");
        return None;
    }
    Some(mean - latest.value_ft)
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Everything a run needs, already fetched.
#[derive(Debug, Clone)]
pub struct RunInputs<'a> {
    pub station: &'a StationConfig,
    pub engine: &'a EngineConfig,
    pub policy: &'a PolicyConfig,
    pub sources: &'a SourceMap,
    pub observations: &'a [ObservationPoint],
    pub lookup_thresholds: FloodThresholds,
    pub bias: BiasState,
    pub now: DateTime<Utc>,
}

/// A finished run, ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRun {
    pub summary: ForecastSummary,
    pub rows: Vec<ExceedanceRow>,
    pub bias_after: BiasState,
    pub matched_sources: Vec<String>,
    pub skipped_sources: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No archive member had rows for the station. Nothing should be written.
    NoStationData { skipped_sources: usize },
    Completed(Box<ForecastRun>),
}

/// Runs the correction and exceedance pipeline.
///
/// # Errors
/// Threshold failures only. Unusable sources, an unreadable bias state and
/// an unfittable trend are absorbed.
pub fn run(inputs: &RunInputs<'_>) -> Result<RunOutcome> {
    let station = inputs.station;
    let engine = inputs.engine;

    let thresholds = resolve_thresholds(&station.id, &station.threshold_override(), &inputs.lookup_thresholds)?;

    let extraction = extract_station_series_parallel(inputs.sources, &station.petss_id, engine.normalize_workers);
    for skipped in &extraction.skipped {
        warn!(source = %skipped.name, reason = %skipped.reason, "skipped forecast source");
    }
    if extraction.is_empty() {
        info!(station = %station.petss_id, sources = inputs.sources.len(), "no rows for station");
        return Ok(RunOutcome::NoStationData { skipped_sources: extraction.skipped.len() });
    }
    info!(
        station = %station.petss_id,
        rows = extraction.rows.len(),
        sources = extraction.matched_sources.len(),
        "extracted station series"
    );

    let max_n = engine.bias_max_n.max(1);
    let applied = BiasState { n: inputs.bias.n.min(max_n), ..inputs.bias };
    let new_error_ft = match_bias_error(&extraction.rows, inputs.observations, engine.bias_match_tolerance_minutes);

    let mut rows = extraction.rows;
    for row in rows.iter_mut() {
        row.value_ft = applied.correct(row.value_ft);
    }

    let trend = assess_trend(inputs.observations, &TrendParams::from(engine));
    apply_trend(&mut rows, &trend, inputs.now);

    let exceedance = compute_exceedance(&rows, &thresholds);
    let (peak_window, peak_row) = select_peak_window(&exceedance, engine.min_probability_gate);
    let peak = peak_row.map(PeakProbabilities::from);

    let confidence = peak
        .map(|p| confidence_from_spread(p.spread_ft, station.typical_spread_ft))
        .unwrap_or(0.0);
    let recommendation = recommend(
        inputs.policy,
        peak.map_or(0.0, |p| p.p_minor),
        peak.map_or(0.0, |p| p.p_moderate),
    );

    let bias_after = match new_error_ft {
        Some(err) => bias::update(applied, err, max_n),
        None => applied,
    };

    let summary = ForecastSummary {
        generated_utc: inputs.now,
        station: station.identity(),
        thresholds,
        bias: BiasReport {
            applied_bias_ft: applied.rolling_bias_ft,
            applied_n: applied.n,
            new_error_ft,
            updated_bias_ft: bias_after.rolling_bias_ft,
            updated_n: bias_after.n,
        },
        trend,
        observed: summarize_observations(inputs.observations, engine.observation_lookback_hours),
        peak_window,
        peak,
        confidence,
        recommendation_category: recommendation.category,
        recommendation: recommendation.message,
        n_times: exceedance.len(),
        n_members_max: exceedance.iter().map(|r| r.n_members).max().unwrap_or(0),
    };

    Ok(RunOutcome::Completed(Box::new(ForecastRun {
        summary,
        rows: exceedance,
        bias_after,
        matched_sources: extraction.matched_sources,
        skipped_sources: extraction.skipped.len(),
    })))
}

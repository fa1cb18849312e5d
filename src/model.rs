/// Core data types for the storm-tide forecast correction service.
///
/// This module defines the shared domain model imported by all other modules:
/// the normalized station series, thresholds, exceedance rows, the run summary
/// and the crate error types. It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Station series
// ---------------------------------------------------------------------------

/// How the source file encoded its water levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    /// Values were already in feet.
    Ft,
    /// Values were integer tenths of a foot and have been divided by 10.
    TenthsFt,
    /// No values survived parsing, so nothing could be inferred.
    Unknown,
}

impl Scaling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scaling::Ft => "ft",
            Scaling::TenthsFt => "tenths_ft",
            Scaling::Unknown => "unknown",
        }
    }
}

/// One ensemble member's predicted water level at one instant.
///
/// `value_ft` is always in feet regardless of the source scaling, and
/// `valid_time` is always UTC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSeriesRow {
    pub station_id: String,
    pub valid_time: DateTime<Utc>,
    pub member: String,
    pub value_ft: f64,
    pub scaling: Scaling,
}

/// A single observed water level from the tide gauge, in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObservationPoint {
    pub time: DateTime<Utc>,
    pub value_ft: f64,
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

/// Coastal flood levels for a station, in feet above the station datum.
///
/// Any level may be missing: the CO-OPS lookup does not publish all three for
/// every station, and a config override may set only some of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FloodThresholds {
    pub minor: Option<f64>,
    pub moderate: Option<f64>,
    pub major: Option<f64>,
}

impl FloodThresholds {
    pub fn is_empty(&self) -> bool {
        self.minor.is_none() && self.moderate.is_none() && self.major.is_none()
    }
}

/// Where the thresholds used for a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    Override,
    Lookup,
}

impl ThresholdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdSource::Override => "override",
            ThresholdSource::Lookup => "lookup",
        }
    }
}

/// Fully populated thresholds, guaranteed `minor <= moderate <= major`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedThresholds {
    pub minor: f64,
    pub moderate: f64,
    pub major: f64,
    pub source: ThresholdSource,
}

// ---------------------------------------------------------------------------
// Engine outputs
// ---------------------------------------------------------------------------

/// Exceedance probabilities and ensemble statistics for one forecast time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceedanceRow {
    pub valid_time: DateTime<Utc>,
    pub p_minor: f64,
    pub p_moderate: f64,
    pub p_major: f64,
    pub mean_ft: f64,
    pub p10_ft: f64,
    pub p90_ft: f64,
    pub n_members: usize,
}

/// The span of elevated risk. `start_utc`/`end_utc` are `None` when no
/// forecast time met the probability gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakWindow {
    pub start_utc: Option<DateTime<Utc>>,
    pub end_utc: Option<DateTime<Utc>>,
    pub peak_time_utc: Option<DateTime<Utc>>,
}

/// Result of fitting and (maybe) applying the short-term observed trend.
///
/// `trend_used` reports that a slope was fitted; `applied` reports that it
/// actually moved forecast values. A fitted trend beyond the guardrail is
/// recorded but not applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBlend {
    pub trend_used: bool,
    pub applied: bool,
    pub slope_ft_per_hr: Option<f64>,
    pub trend_adj_ft: f64,
    pub weight: f64,
    pub horizon_hours: i64,
    pub n_points: usize,
}

/// Recent observed conditions at the gauge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationSummary {
    pub last_value_ft: Option<f64>,
    pub last_time_utc: Option<DateTime<Utc>>,
    pub max_lookback_ft: Option<f64>,
    pub lookback_hours: i64,
    pub n_points: usize,
}

/// Station identity carried into the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationIdentity {
    pub name: String,
    pub coops_id: String,
    pub petss_id: String,
    pub datum: String,
}

/// Bias figures reported in the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiasReport {
    /// Bias subtracted from the forecast in this run.
    pub applied_bias_ft: f64,
    /// Samples backing the applied bias.
    pub applied_n: u32,
    /// Error observed in this run (`forecast - observed`), if one was matched.
    pub new_error_ft: Option<f64>,
    /// State persisted for the next run.
    pub updated_bias_ft: f64,
    pub updated_n: u32,
}

/// Probabilities at the peak forecast time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakProbabilities {
    pub p_minor: f64,
    pub p_moderate: f64,
    pub p_major: f64,
    pub mean_ft: f64,
    pub spread_ft: f64,
}

/// Everything a run produces apart from the per-time rows. Built once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub generated_utc: DateTime<Utc>,
    pub station: StationIdentity,
    pub thresholds: ResolvedThresholds,
    pub bias: BiasReport,
    pub trend: TrendBlend,
    pub observed: ObservationSummary,
    pub peak_window: PeakWindow,
    pub peak: Option<PeakProbabilities>,
    pub confidence: f64,
    pub recommendation_category: String,
    pub recommendation: String,
    pub n_times: usize,
    pub n_members_max: usize,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A role a source column can play during schema normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Station,
    Time,
    Member,
    Value,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Station => write!(f, "station"),
            ColumnRole::Time => write!(f, "time"),
            ColumnRole::Member => write!(f, "member"),
            ColumnRole::Value => write!(f, "value"),
        }
    }
}

/// Why a single source file could not be normalized. Fatal to that file only.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("no {0} column could be resolved")]
    UnresolvedColumn(ColumnRole),

    #[error("unreadable header: {0}")]
    Header(String),
}

/// Errors that abort a run or a collaborator call.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("flood thresholds unavailable for station {station}: missing {missing}")]
    ThresholdUnavailable { station: String, missing: String },

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_serializes_as_snake_case() {
        let json = serde_json::to_string(&Scaling::TenthsFt).unwrap();
        assert_eq!(json, "\"tenths_ft\"");
        assert_eq!(Scaling::TenthsFt.as_str(), "tenths_ft");
    }

    #[test]
    fn test_threshold_source_text_matches_json() {
        for source in [ThresholdSource::Override, ThresholdSource::Lookup] {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
        }
    }

    #[test]
    fn test_schema_error_names_the_role() {
        let err = ForecastError::from(SchemaError::UnresolvedColumn(ColumnRole::Time));
        assert_eq!(err.to_string(), "schema error: no time column could be resolved");
    }

    #[test]
    fn test_empty_thresholds() {
        assert!(FloodThresholds::default().is_empty());
        let t = FloodThresholds { minor: Some(1.5), ..Default::default() };
        assert!(!t.is_empty());
    }
}

/// Station configuration loader - parses stations.toml
///
/// Separates station metadata, engine tunables and the recommendation policy
/// from code, so thresholds or cutoffs can be adjusted without recompiling
/// the service.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{FloodThresholds, ForecastError, Result, StationIdentity};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "stations.toml";

/// Upper bound for every hour-valued engine setting (31 days).
pub const MAX_ENGINE_HOURS: i64 = 24 * 31;

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV_VAR: &str = "STORMTIDE_CONFIG";

/// Station metadata loaded from stations.toml
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// CO-OPS station id, e.g. "8747437".
    pub id: String,
    /// Station id used inside the PETSS ensemble CSVs, e.g. "WVLM6".
    pub petss_id: String,
    pub name: String,

    #[serde(default = "default_datum")]
    pub coops_datum: String,
    /// Observation timestamps are read as UTC, so only "gmt" is accepted.
    #[serde(default = "default_time_zone")]
    pub coops_time_zone: String,

    /// Flood levels that take precedence over the CO-OPS lookup.
    pub thresholds: Option<ThresholdOverride>,

    /// Ensemble spread (p90 - p10, ft) considered normal at this station.
    #[serde(default = "default_typical_spread")]
    pub typical_spread_ft: f64,
}

/// Flood levels from configuration, in feet. Levels left out fall back to
/// the lookup.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ThresholdOverride {
    pub minor: Option<f64>,
    pub moderate: Option<f64>,
    pub major: Option<f64>,
}

/// Numerical tunables for one run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bias_max_n: u32,
    pub min_probability_gate: f64,
    pub trend_min_points: usize,
    pub trend_window_hours: i64,
    pub trend_projection_hours: f64,
    pub trend_guardrail_ft: f64,
    pub trend_blend_weight: f64,
    pub trend_horizon_hours: i64,
    pub bias_match_tolerance_minutes: i64,
    pub normalize_workers: usize,
    pub observation_lookback_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bias_max_n: 60,
            min_probability_gate: 40.0,
            trend_min_points: 8,
            trend_window_hours: 6,
            trend_projection_hours: 6.0,
            trend_guardrail_ft: 2.0,
            trend_blend_weight: 0.30,
            trend_horizon_hours: 12,
            bias_match_tolerance_minutes: 60,
            normalize_workers: 4,
            observation_lookback_hours: 48,
        }
    }
}

/// One row of the recommendation decision table.
///
/// A rule matches when the peak probability meets any of its cutoffs.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRule {
    pub category: String,
    pub message: String,
    pub min_p_minor: Option<f64>,
    pub min_p_moderate: Option<f64>,
}

/// Recommendation decision table, most severe rule first.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_rules", rename = "rule")]
    pub rules: Vec<PolicyRule>,
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            fallback_category: default_fallback_category(),
            fallback_message: default_fallback_message(),
        }
    }
}

/// Where run artifacts and the persisted bias live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub bias_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            bias_dir: PathBuf::from("state/bias"),
        }
    }
}

impl PathsConfig {
    /// Bias file for a station, keyed by its CO-OPS id.
    pub fn bias_path(&self, station_id: &str) -> PathBuf {
        self.bias_dir.join(format!("{}.json", station_id))
    }

    /// Output directory for a station's run artifacts.
    pub fn station_output_dir(&self, station: &StationConfig) -> PathBuf {
        self.output_dir.join(station.slug())
    }
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub station: Vec<StationConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

fn default_datum() -> String {
    "MLLW".to_string()
}

fn default_time_zone() -> String {
    "gmt".to_string()
}

fn default_typical_spread() -> f64 {
    2.0
}

fn default_fallback_category() -> String {
    "none".to_string()
}

fn default_fallback_message() -> String {
    "No coastal flooding expected. Routine monitoring.".to_string()
}

fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            category: "moderate_likely".to_string(),
            message: "Moderate coastal flooding likely. Prepare for road and property impacts.".to_string(),
            min_p_minor: None,
            min_p_moderate: Some(60.0),
        },
        PolicyRule {
            category: "minor_likely".to_string(),
            message: "Minor coastal flooding likely. Move vehicles from low-lying areas.".to_string(),
            min_p_minor: Some(70.0),
            min_p_moderate: None,
        },
        PolicyRule {
            category: "minor_possible".to_string(),
            message: "Minor coastal flooding possible near the peak tide.".to_string(),
            min_p_minor: Some(50.0),
            min_p_moderate: None,
        },
        PolicyRule {
            category: "monitor".to_string(),
            message: "Elevated water levels. Monitor later forecasts.".to_string(),
            min_p_minor: Some(40.0),
            min_p_moderate: None,
        },
    ]
}

impl StationConfig {
    /// Directory-safe name used for output folders.
    pub fn slug(&self) -> String {
        let slug: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let slug = slug.trim_matches('_').to_string();
        if slug.is_empty() { self.id.clone() } else { slug }
    }

    pub fn identity(&self) -> StationIdentity {
        StationIdentity {
            name: self.name.clone(),
            coops_id: self.id.clone(),
            petss_id: self.petss_id.clone(),
            datum: self.coops_datum.clone(),
        }
    }

    pub fn threshold_override(&self) -> FloodThresholds {
        self.thresholds
            .map(FloodThresholds::from)
            .unwrap_or_default()
    }
}

/// Converts ThresholdOverride from TOML to the FloodThresholds model type.
impl From<ThresholdOverride> for FloodThresholds {
    fn from(config: ThresholdOverride) -> Self {
        FloodThresholds {
            minor: config.minor,
            moderate: config.moderate,
            major: config.major,
        }
    }
}

impl ServiceConfig {
    /// Picks a station by CO-OPS id or PETSS id, or the first entry when
    /// `wanted` is `None`.
    pub fn select_station(&self, wanted: Option<&str>) -> Result<&StationConfig> {
        match wanted {
            None => self
                .station
                .first()
                .ok_or_else(|| ForecastError::Config("no [[station]] entries".to_string())),
            Some(id) => self
                .station
                .iter()
                .find(|s| s.id == id || s.petss_id.eq_ignore_ascii_case(id))
                .ok_or_else(|| ForecastError::Config(format!("station {} is not configured", id))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.station.is_empty() {
            return Err(ForecastError::Config("stations.toml has no [[station]] entries".to_string()));
        }
        for station in &self.station {
            if station.id.trim().is_empty() || station.petss_id.trim().is_empty() {
                return Err(ForecastError::Config(format!(
                    "station '{}' must have non-empty id and petss_id",
                    station.name
                )));
            }
            if !(station.typical_spread_ft > 0.0) {
                return Err(ForecastError::Config(format!(
                    "{}: typical_spread_ft must be positive",
                    station.id
                )));
            }
            if !station.coops_time_zone.eq_ignore_ascii_case("gmt") {
                return Err(ForecastError::Config(format!(
                    "{}: coops_time_zone must be \"gmt\", got \"{}\"",
                    station.id, station.coops_time_zone
                )));
            }
            if let Some(t) = &station.thresholds {
                check_ascending(&station.id, t)?;
            }
        }
        self.engine.validate_spans()?;
        if self.engine.bias_max_n == 0 {
            return Err(ForecastError::Config("engine.bias_max_n must be at least 1".to_string()));
        }
        if !(0.0..=100.0).contains(&self.engine.min_probability_gate) {
            return Err(ForecastError::Config(
                "engine.min_probability_gate must be within 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Keeps every window, horizon and tolerance inside `0..=MAX_ENGINE_HOURS`
    /// so later `Duration` arithmetic cannot overflow.
    fn validate_spans(&self) -> Result<()> {
        let spans = [
            ("trend_window_hours", self.trend_window_hours, MAX_ENGINE_HOURS),
            ("trend_horizon_hours", self.trend_horizon_hours, MAX_ENGINE_HOURS),
            ("observation_lookback_hours", self.observation_lookback_hours, MAX_ENGINE_HOURS),
            ("bias_match_tolerance_minutes", self.bias_match_tolerance_minutes, MAX_ENGINE_HOURS * 60),
        ];
        for (name, value, max) in spans {
            if !(0..=max).contains(&value) {
                return Err(ForecastError::Config(format!(
                    "engine.{} must be within 0..={}, got {}",
                    name, max, value
                )));
            }
        }
        let projection = self.trend_projection_hours;
        if !projection.is_finite() || !(0.0..=MAX_ENGINE_HOURS as f64).contains(&projection) {
            return Err(ForecastError::Config(format!(
                "engine.trend_projection_hours must be within 0..={}, got {}",
                MAX_ENGINE_HOURS, projection
            )));
        }
        Ok(())
    }
}

fn check_ascending(station_id: &str, t: &ThresholdOverride) -> Result<()> {
    let levels: Vec<f64> = [t.minor, t.moderate, t.major].into_iter().flatten().collect();
    if levels.windows(2).any(|w| w[0] > w[1]) {
        return Err(ForecastError::Config(format!(
            "{}: threshold override must satisfy minor <= moderate <= major",
            station_id
        )));
    }
    Ok(())
}

/// Parses and validates a configuration document.
pub fn parse_config(contents: &str) -> Result<ServiceConfig> {
    let config: ServiceConfig = toml::from_str(contents)
        .map_err(|e| ForecastError::Config(format!("failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Loads the service configuration from `path`.
pub fn load_config_from(path: &Path) -> Result<ServiceConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ForecastError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&contents)
}

/// Resolves the config path from `STORMTIDE_CONFIG` (after reading `.env`),
/// falling back to `stations.toml` in the working directory.
pub fn config_path() -> PathBuf {
    dotenv::dotenv().ok();
    std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads the service configuration from the default location.
pub fn load_config() -> Result<ServiceConfig> {
    load_config_from(&config_path())
}

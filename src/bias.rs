/// Persisted rolling estimate of forecast bias.
///
/// Bias is `forecast - observed` in feet; a positive bias means the ensemble
/// over-forecasts, and the correction applied downstream is
/// `forecast - rolling_bias_ft`.
///
/// The state is an explicit value: the caller loads it once at run start,
/// passes it through the pure [`update`] function at most once, and saves it
/// once at run end. Nothing here holds global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::model::Result;

/// Sample count at which the estimator switches to an exponential average.
pub const DEFAULT_MAX_N: u32 = 60;

/// Rolling bias and the number of samples backing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasState {
    #[serde(default)]
    pub rolling_bias_ft: f64,
    #[serde(default)]
    pub n: u32,
}

impl BiasState {
    /// Applies the correction to a raw forecast value.
    pub fn correct(&self, forecast_ft: f64) -> f64 {
        forecast_ft - self.rolling_bias_ft
    }
}

/// Folds one new `forecast - observed` error into the state.
///
/// While fewer than `max_n` samples have been seen this is a cumulative
/// average; once saturated it becomes an EMA with `alpha = 1 / max_n`, so the
/// estimate keeps tracking drift without a single outlier dominating.
pub fn update(state: BiasState, new_error_ft: f64, max_n: u32) -> BiasState {
    let max_n = max_n.max(1);
    let n = state.n.saturating_add(1).min(max_n);

    let rolling = if state.n < max_n {
        (state.rolling_bias_ft * state.n as f64 + new_error_ft) / n as f64
    } else {
        let alpha = 1.0 / max_n as f64;
        (1.0 - alpha) * state.rolling_bias_ft + alpha * new_error_ft
    };

    BiasState { rolling_bias_ft: rolling, n }
}

/// Loads the persisted state, falling back to the zero state on any failure.
///
/// A missing, empty or malformed file is never an error: the run simply
/// starts fresh.
pub fn load(path: &Path) -> BiasState {
    if !path.exists() {
        debug!(path = %path.display(), "no bias state file, starting fresh");
        return BiasState::default();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|contents| serde_json::from_str::<BiasState>(&contents).map_err(|e| e.to_string()));

    match parsed {
        Ok(state) if state.rolling_bias_ft.is_finite() => state,
        Ok(_) => {
            warn!(path = %path.display(), "bias state is not finite, starting fresh");
            BiasState::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "bias state unreadable, starting fresh");
            BiasState::default()
        }
    }
}

/// Writes the state as pretty JSON, creating parent directories as needed.
pub fn save(path: &Path, state: &BiasState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json)?;
    debug!(path = %path.display(), bias = state.rolling_bias_ft, n = state.n, "saved bias state");
    Ok(())
}

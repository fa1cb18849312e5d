/// Short-term observed trend blending.
///
/// Fits a slope to the last few hours of gauge observations, projects it
/// forward, and nudges only the near-term bias-corrected forecast by a fixed
/// fraction of that projection. Persistence of an observed trend is only
/// defensible for a few hours, so rows beyond the horizon are untouched.
///
/// # Fit
/// With `x` the seconds since the first observation in the window:
///
/// ```text
/// slope = Σ xᵢ·(yᵢ − ȳ) / Σ xᵢ²      (ft/s)
/// trend_adj = slope · 3600 · projection_hours
/// ```
///
/// Fewer than `min_points` observations, or all observations at the same
/// instant, means no trend. A projection larger than the guardrail is
/// recorded but never applied.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::EngineConfig;
use crate::model::{ObservationPoint, StationSeriesRow, TrendBlend};

/// Trend parameters for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendParams {
    pub min_points: usize,
    pub window_hours: i64,
    pub projection_hours: f64,
    pub guardrail_ft: f64,
    pub weight: f64,
    pub horizon_hours: i64,
}

impl Default for TrendParams {
    fn default() -> Self {
        TrendParams::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for TrendParams {
    fn from(engine: &EngineConfig) -> Self {
        Self {
            min_points: engine.trend_min_points,
            window_hours: engine.trend_window_hours,
            projection_hours: engine.trend_projection_hours,
            guardrail_ft: engine.trend_guardrail_ft,
            weight: engine.trend_blend_weight,
            horizon_hours: engine.trend_horizon_hours,
        }
    }
}

/// A fitted slope and its forward projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFit {
    pub slope_ft_per_hr: f64,
    pub trend_adj_ft: f64,
    pub n_points: usize,
}

/// Observations within `window_hours` of the latest one, ascending.
pub fn recent_window(observations: &[ObservationPoint], window_hours: i64) -> Vec<ObservationPoint> {
    let Some(latest) = observations.iter().map(|o| o.time).max() else {
        return Vec::new();
    };
    let cutoff = latest - Duration::hours(window_hours);
    let mut window: Vec<ObservationPoint> = observations
        .iter()
        .filter(|o| o.time >= cutoff && o.value_ft.is_finite())
        .copied()
        .collect();
    window.sort_by_key(|o| o.time);
    window
}

/// Fits the trend over an ascending window. `None` when unfittable.
pub fn fit_trend(window: &[ObservationPoint], params: &TrendParams) -> Option<TrendFit> {
    if window.len() < params.min_points.max(2) {
        return None;
    }

    let first = window[0].time;
    let xs: Vec<f64> = window
        .iter()
        .map(|o| (o.time - first).num_milliseconds() as f64 / 1000.0)
        .collect();
    let mean_y = window.iter().map(|o| o.value_ft).sum::<f64>() / window.len() as f64;

    let denom: f64 = xs.iter().map(|x| x * x).sum();
    if denom == 0.0 {
        return None;
    }
    let numer: f64 = xs
        .iter()
        .zip(window)
        .map(|(x, o)| x * (o.value_ft - mean_y))
        .sum();

    let slope_ft_per_hr = numer / denom * 3600.0;
    Some(TrendFit {
        slope_ft_per_hr,
        trend_adj_ft: slope_ft_per_hr * params.projection_hours,
        n_points: window.len(),
    })
}

/// Fits the trend from raw observations and decides whether it may be applied.
pub fn assess_trend(observations: &[ObservationPoint], params: &TrendParams) -> TrendBlend {
    let window = recent_window(observations, params.window_hours);

    match fit_trend(&window, params) {
        None => {
            debug!(points = window.len(), "trend unfittable, not applied");
            TrendBlend {
                trend_used: false,
                applied: false,
                slope_ft_per_hr: None,
                trend_adj_ft: 0.0,
                weight: params.weight,
                horizon_hours: params.horizon_hours,
                n_points: window.len(),
            }
        }
        Some(fit) => {
            let applied = fit.trend_adj_ft.abs() <= params.guardrail_ft;
            if !applied {
                debug!(trend_adj_ft = fit.trend_adj_ft, "trend beyond guardrail, not applied");
            }
            TrendBlend {
                trend_used: true,
                applied,
                slope_ft_per_hr: Some(fit.slope_ft_per_hr),
                trend_adj_ft: fit.trend_adj_ft,
                weight: params.weight,
                horizon_hours: params.horizon_hours,
                n_points: fit.n_points,
            }
        }
    }
}

/// Adds `weight * trend_adj_ft` to rows valid within `[now, now + horizon]`.
/// Does nothing unless the blend was applied.
pub fn apply_trend(rows: &mut [StationSeriesRow], blend: &TrendBlend, now: DateTime<Utc>) {
    if !blend.applied {
        return;
    }
    let horizon_end = now + Duration::hours(blend.horizon_hours);
    let delta = blend.weight * blend.trend_adj_ft;

    for row in rows.iter_mut() {
        if row.valid_time >= now && row.valid_time <= horizon_end {
            row.value_ft += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scaling;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 13, 12, 0, 0).unwrap()
    }

    /// `n` observations every 30 minutes, the last one at `now()`.
    fn linear_obs(n: usize, start_ft: f64, ft_per_hr: f64) -> Vec<ObservationPoint> {
        let step_s: i64 = 1800;
        let first = now() - Duration::seconds(step_s * (n as i64 - 1));
        (0..n)
            .map(|i| {
                let offset_s = step_s * i as i64;
                ObservationPoint {
                    time: first + Duration::seconds(offset_s),
                    value_ft: start_ft + ft_per_hr * offset_s as f64 / 3600.0,
                }
            })
            .collect()
    }

    fn forecast_row(hours_from_now: i64, value: f64) -> StationSeriesRow {
        StationSeriesRow {
            station_id: "WVLM6".to_string(),
            valid_time: now() + Duration::hours(hours_from_now),
            member: "e01".to_string(),
            value_ft: value,
            scaling: Scaling::Ft,
        }
    }

    // Evenly spaced points from x = 0: Σx(y-ȳ)/Σx² = b · (1 - 3(n-1) / (2(2n-1))).
    fn fitted_fraction(n: usize) -> f64 {
        1.0 - 3.0 * (n as f64 - 1.0) / (2.0 * (2.0 * n as f64 - 1.0))
    }

    #[test]
    fn test_fitted_fraction_matches_direct_fit() {
        // n = 8 keeps 0.3 of the true slope.
        assert_relative_eq!(fitted_fraction(8), 0.3, epsilon = 1e-12);
        let fit = fit_trend(&linear_obs(8, 0.0, 1.0), &TrendParams::default()).unwrap();
        assert_relative_eq!(fit.slope_ft_per_hr, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_too_few_points_means_no_trend() {
        let blend = assess_trend(&linear_obs(7, 1.0, 0.1), &TrendParams::default());
        assert!(!blend.trend_used);
        assert!(!blend.applied);
        assert_eq!(blend.trend_adj_ft, 0.0);
        assert_eq!(blend.slope_ft_per_hr, None);
    }

    #[test]
    fn test_coincident_points_are_unfittable() {
        let obs: Vec<ObservationPoint> = (0..10)
            .map(|i| ObservationPoint { time: now(), value_ft: i as f64 })
            .collect();
        assert!(!assess_trend(&obs, &TrendParams::default()).trend_used);
    }

    #[test]
    fn test_slope_follows_centered_formula() {
        let obs = linear_obs(8, 1.0, 0.2);
        let window = recent_window(&obs, 6);
        let fit = fit_trend(&window, &TrendParams::default()).unwrap();
        assert_relative_eq!(fit.slope_ft_per_hr, 0.2 * fitted_fraction(8), epsilon = 1e-9);
        assert_relative_eq!(fit.trend_adj_ft, fit.slope_ft_per_hr * 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_window_drops_old_observations() {
        let mut obs = linear_obs(8, 1.0, 0.0);
        obs.push(ObservationPoint { time: now() - Duration::hours(20), value_ft: 9.0 });
        assert_eq!(recent_window(&obs, 6).len(), 8);
    }

    #[test]
    fn test_plausible_trend_is_applied_within_horizon_only() {
        let obs = linear_obs(8, 1.0, 0.2);
        let blend = assess_trend(&obs, &TrendParams::default());
        assert!(blend.trend_used && blend.applied);

        let mut rows = vec![forecast_row(-1, 2.0), forecast_row(3, 2.0), forecast_row(12, 2.0), forecast_row(13, 2.0)];
        apply_trend(&mut rows, &blend, now());

        let delta = 0.30 * blend.trend_adj_ft;
        assert_relative_eq!(rows[0].value_ft, 2.0);
        assert_relative_eq!(rows[1].value_ft, 2.0 + delta);
        assert_relative_eq!(rows[2].value_ft, 2.0 + delta);
        assert_relative_eq!(rows[3].value_ft, 2.0);
    }

    #[test]
    fn test_guardrail_records_but_does_not_apply() {
        // Fitted projection of exactly 3.0 ft over 6 h.
        let b = 0.5 / fitted_fraction(8);
        let blend = assess_trend(&linear_obs(8, 1.0, b), &TrendParams::default());
        assert!(blend.trend_used);
        assert!(!blend.applied);
        assert_relative_eq!(blend.trend_adj_ft, 3.0, epsilon = 1e-6);

        let mut rows = vec![forecast_row(1, 2.4)];
        apply_trend(&mut rows, &blend, now());
        assert_eq!(rows[0].value_ft, 2.4);
    }

    #[test]
    fn test_falling_trend_is_negative() {
        let blend = assess_trend(&linear_obs(12, 3.0, -0.1), &TrendParams::default());
        assert!(blend.applied);
        assert!(blend.trend_adj_ft < 0.0);
    }
}

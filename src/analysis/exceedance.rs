/// Exceedance probabilities over an ensemble station series.
///
/// For each distinct forecast time, the members present at that time vote on
/// whether the water level meets each flood threshold. Comparison is
/// inclusive (`>=`). Ensemble statistics (mean, p10, p90) are reported
/// alongside so the peak selector and confidence score can use them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{ExceedanceRow, ResolvedThresholds, StationSeriesRow};

/// Percentile of an ascending slice, linearly interpolating between order
/// statistics (rank `q * (n - 1)`). `q` is a fraction in `[0, 1]`.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
        }
    }
}

fn pct_at_or_above(values: &[f64], threshold: f64) -> f64 {
    let hits = values.iter().filter(|v| **v >= threshold).count();
    100.0 * hits as f64 / values.len() as f64
}

/// Groups member values by forecast time. A member reported twice for the
/// same time counts once, with its last value.
pub fn members_by_time(rows: &[StationSeriesRow]) -> BTreeMap<DateTime<Utc>, BTreeMap<&str, f64>> {
    let mut grouped: BTreeMap<DateTime<Utc>, BTreeMap<&str, f64>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.valid_time)
            .or_default()
            .insert(row.member.as_str(), row.value_ft);
    }
    grouped
}

/// Ensemble mean per forecast time over the grouped members.
pub fn mean_by_time(rows: &[StationSeriesRow]) -> BTreeMap<DateTime<Utc>, f64> {
    members_by_time(rows)
        .into_iter()
        .filter(|(_, m)| !m.is_empty())
        .map(|(t, m)| (t, m.values().sum::<f64>() / m.len() as f64))
        .collect()
}

/// One exceedance row per distinct `valid_time`, ascending.
///
/// An empty series yields an empty result.
pub fn compute_exceedance(
    rows: &[StationSeriesRow],
    thresholds: &ResolvedThresholds,
) -> Vec<ExceedanceRow> {
    members_by_time(rows)
        .into_iter()
        .filter(|(_, members)| !members.is_empty())
        .map(|(valid_time, members)| {
            let mut values: Vec<f64> = members.into_values().collect();
            values.sort_by(|a, b| a.total_cmp(b));

            let n = values.len();
            let mean_ft = values.iter().sum::<f64>() / n as f64;

            ExceedanceRow {
                valid_time,
                p_minor: pct_at_or_above(&values, thresholds.minor),
                p_moderate: pct_at_or_above(&values, thresholds.moderate),
                p_major: pct_at_or_above(&values, thresholds.major),
                mean_ft,
                p10_ft: percentile(&values, 0.10).unwrap_or(mean_ft),
                p90_ft: percentile(&values, 0.90).unwrap_or(mean_ft),
                n_members: n,
            }
        })
        .collect()
}

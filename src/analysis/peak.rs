/// Peak window, confidence and recommendation selection.
///
/// Consumes the exceedance table (ascending by time) and reduces it to the
/// handful of figures that go into flood-risk messaging: when risk is
/// elevated, when the water peaks, how much the ensemble agrees, and which
/// advisory category applies.

use crate::config::PolicyConfig;
use crate::model::{ExceedanceRow, PeakProbabilities, PeakWindow};

// ---------------------------------------------------------------------------
// Peak window
// ---------------------------------------------------------------------------

fn max_mean<'a, I>(rows: I) -> Option<&'a ExceedanceRow>
where
    I: IntoIterator<Item = &'a ExceedanceRow>,
{
    // Earliest row wins ties.
    rows.into_iter().fold(None, |best: Option<&ExceedanceRow>, row| match best {
        Some(b) if b.mean_ft >= row.mean_ft => Some(b),
        _ => Some(row),
    })
}

/// Finds the span where `p_minor >= gate` and the peak moment.
///
/// The window runs from the first to the last gated time. The peak is the
/// gated row with the highest ensemble mean; when nothing meets the gate the
/// window is empty and the peak falls back to the highest mean overall.
pub fn select_peak_window(rows: &[ExceedanceRow], gate: f64) -> (PeakWindow, Option<&ExceedanceRow>) {
    let gated: Vec<&ExceedanceRow> = rows.iter().filter(|r| r.p_minor >= gate).collect();

    if let (Some(first), Some(last)) = (gated.first(), gated.last()) {
        let peak = max_mean(gated.iter().copied());
        let window = PeakWindow {
            start_utc: Some(first.valid_time),
            end_utc: Some(last.valid_time),
            peak_time_utc: peak.map(|p| p.valid_time),
        };
        return (window, peak);
    }

    let peak = max_mean(rows);
    let window = PeakWindow {
        start_utc: None,
        end_utc: None,
        peak_time_utc: peak.map(|p| p.valid_time),
    };
    (window, peak)
}

impl From<&ExceedanceRow> for PeakProbabilities {
    fn from(row: &ExceedanceRow) -> Self {
        PeakProbabilities {
            p_minor: row.p_minor,
            p_moderate: row.p_moderate,
            p_major: row.p_major,
            mean_ft: row.mean_ft,
            spread_ft: row.p90_ft - row.p10_ft,
        }
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Confidence in `[0, 1]` from the p10–p90 spread at the peak.
///
/// A spread equal to the station's typical spread scores 0.5; no spread
/// scores 1.0; twice the typical spread or more scores 0.0.
pub fn confidence_from_spread(spread_ft: f64, typical_spread_ft: f64) -> f64 {
    if !spread_ft.is_finite() || !(typical_spread_ft > 0.0) {
        return 0.0;
    }
    (1.0 - 0.5 * spread_ft.max(0.0) / typical_spread_ft).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// Advisory picked from the policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub category: String,
    pub message: String,
    /// Position in the rule table; the fallback ranks after every rule.
    pub rank: usize,
}

/// First rule (most severe first) whose cutoffs are met wins.
///
/// A rule matches when `p_minor >= min_p_minor` or `p_moderate >=
/// min_p_moderate`. Raising either probability can only add matching rules,
/// so the outcome never becomes less severe as risk grows.
pub fn recommend(policy: &PolicyConfig, p_minor: f64, p_moderate: f64) -> Recommendation {
    let hit = policy.rules.iter().enumerate().find(|(_, rule)| {
        rule.min_p_minor.is_some_and(|cut| p_minor >= cut)
            || rule.min_p_moderate.is_some_and(|cut| p_moderate >= cut)
    });

    match hit {
        Some((rank, rule)) => Recommendation {
            category: rule.category.clone(),
            message: rule.message.clone(),
            rank,
        },
        None => Recommendation {
            category: policy.fallback_category.clone(),
            message: policy.fallback_message.clone(),
            rank: policy.rules.len(),
        },
    }
}

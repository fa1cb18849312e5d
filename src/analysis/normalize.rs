/// Schema normalization for ensemble forecast CSVs.
///
/// PETSS archive members and hand-exported tables name their columns
/// inconsistently (`stid` vs `station`, `date` vs `valid_time`, ...). This
/// module resolves each column role against an ordered synonym table and
/// emits canonical [`StationSeriesRow`]s in feet and UTC.
///
/// # Resolution order
/// Roles are resolved station, time, member, value. Within a role the first
/// unclaimed header (left to right) whose lower-cased name is a synonym wins.
/// A missing member column means the file is a single trace, labelled
/// `"mean"`. A missing value column falls back to the first remaining column
/// whose cells are all numeric.
///
/// # Scaling
/// Some archives store integer tenths of a foot with no unit metadata. If more
/// than 80% of surviving values are integers and the largest magnitude exceeds
/// 20.0, the whole file is divided by 10 and tagged `tenths_ft`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::model::{ColumnRole, Scaling, SchemaError, StationSeriesRow};

/// Member label assigned to single-trace files.
pub const SINGLE_TRACE_MEMBER: &str = "mean";

/// Fraction of integer-like values above which tenths are suspected.
pub const TENTHS_INTEGER_FRACTION: f64 = 0.8;

/// Magnitude above which integer-like values are taken to be tenths.
pub const TENTHS_MIN_MAGNITUDE: f64 = 20.0;

const INTEGER_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Role rules
// ---------------------------------------------------------------------------

/// Synonyms per role, evaluated in this order.
const ROLE_RULES: &[(ColumnRole, &[&str])] = &[
    (
        ColumnRole::Station,
        &[
            "station", "station_id", "stid", "id", "gauge", "gauge_id", "petss_id", "site",
            "site_id",
        ],
    ),
    (
        ColumnRole::Time,
        &[
            "valid_time", "validtime", "time", "datetime", "date_time", "date(gmt)", "date",
            "timestamp", "t",
        ],
    ),
    (
        ColumnRole::Member,
        &[
            "member", "ensemble", "ens", "member_id", "ensemble_member", "realization", "run",
        ],
    ),
    (
        ColumnRole::Value,
        &[
            "value_ft", "value", "stormtide", "storm_tide", "stormtide_ft", "total_water_level",
            "twl", "water_level", "surge", "v",
        ],
    ),
];

/// Column indices chosen for each role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub station: usize,
    pub time: usize,
    pub member: Option<usize>,
    pub value: usize,
}

/// Canonical rows from one source plus how they were interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub rows: Vec<StationSeriesRow>,
    pub scaling: Scaling,
    pub columns: ResolvedColumns,
}

fn header_key(name: &str) -> String {
    name.trim()
        .trim_start_matches('\u{feff}')
        .trim_matches('"')
        .trim()
        .to_lowercase()
}

fn find_role(keys: &[String], claimed: &[usize], synonyms: &[&str]) -> Option<usize> {
    keys.iter()
        .enumerate()
        .find(|(idx, key)| !claimed.contains(idx) && synonyms.contains(&key.as_str()))
        .map(|(idx, _)| idx)
}

/// Gap markers that leave a column numeric; the row itself is still dropped.
const MISSING_MARKERS: &[&str] = &["na", "n/a", "nan", "null", "none", "missing"];

fn is_missing_marker(cell: &str) -> bool {
    let cell = cell.trim_matches('"').trim();
    cell.is_empty()
        || MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m))
        || cell.parse::<f64>().is_ok_and(|v| !v.is_finite())
}

fn is_numeric_column(records: &[StringRecord], idx: usize) -> bool {
    let mut seen = false;
    for record in records {
        match record.get(idx).map(str::trim) {
            None => continue,
            Some(cell) if is_missing_marker(cell) => continue,
            Some(cell) => {
                if parse_value(cell).is_none() {
                    return false;
                }
                seen = true;
            }
        }
    }
    seen
}

fn resolve_columns(headers: &StringRecord, records: &[StringRecord]) -> Result<ResolvedColumns, SchemaError> {
    let keys: Vec<String> = headers.iter().map(header_key).collect();
    let mut claimed: Vec<usize> = Vec::new();
    let mut found = [None; 4];

    for (slot, (_, synonyms)) in ROLE_RULES.iter().enumerate() {
        if let Some(idx) = find_role(&keys, &claimed, synonyms) {
            claimed.push(idx);
            found[slot] = Some(idx);
        }
    }

    let station = found[0].ok_or(SchemaError::UnresolvedColumn(ColumnRole::Station))?;
    let time = found[1].ok_or(SchemaError::UnresolvedColumn(ColumnRole::Time))?;
    let member = found[2];
    let value = match found[3] {
        Some(idx) => idx,
        None => (0..keys.len())
            .filter(|idx| !claimed.contains(idx))
            .find(|&idx| is_numeric_column(records, idx))
            .ok_or(SchemaError::UnresolvedColumn(ColumnRole::Value))?,
    };

    Ok(ResolvedColumns { station, time, member, value })
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

/// Decodes raw bytes as UTF-8, falling back to Latin-1.
pub fn decode_bytes(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    }
}

/// Canonical text form of a station id, so `8747437`, `"8747437"` and
/// `8747437.0` compare equal.
pub fn coerce_station_id(raw: &str) -> String {
    let s = raw.trim().trim_matches('"').trim();
    if let Ok(v) = s.parse::<f64>() {
        if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
            return format!("{}", v as i64);
        }
    }
    s.to_string()
}

/// Parses a numeric cell, rejecting NaN and infinities.
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_matches('"')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%z",
    "%Y-%m-%dT%H:%M%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y%m%d %H:%M",
    "%Y%m%d%H%M",
];

/// Permissive timestamp parsing. Offsets are converted to UTC; timestamps
/// without one are taken to be UTC already.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim().trim_matches('"').trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = s
        .trim_end_matches(" UTC")
        .trim_end_matches(" GMT")
        .trim_end_matches('Z')
        .trim();
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }

    // YYYYMMDDHH, as used for forecast cycle stamps.
    if naive.len() == 10 && naive.bytes().all(|b| b.is_ascii_digit()) {
        let date = NaiveDate::parse_from_str(&naive[..8], "%Y%m%d").ok()?;
        let hour: u32 = naive[8..].parse().ok()?;
        return date.and_hms_opt(hour, 0, 0).map(|dt| dt.and_utc());
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ---------------------------------------------------------------------------
// Scaling
// ---------------------------------------------------------------------------

/// Decides whether values are feet or integer tenths of a foot.
pub fn detect_scaling(values: &[f64]) -> Scaling {
    if values.is_empty() {
        return Scaling::Unknown;
    }
    let integer_like = values
        .iter()
        .filter(|v| (*v - v.round()).abs() <= INTEGER_TOLERANCE)
        .count();
    let fraction = integer_like as f64 / values.len() as f64;
    let max_abs = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));

    if fraction > TENTHS_INTEGER_FRACTION && max_abs > TENTHS_MIN_MAGNITUDE {
        Scaling::TenthsFt
    } else {
        Scaling::Ft
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalizes one raw tabular source into canonical station-series rows.
///
/// Rows whose time or value cannot be parsed are dropped. A source whose rows
/// are all dropped is a valid empty table with `Scaling::Unknown`.
///
/// # Errors
/// `SchemaError` when the header is unreadable or the station, time or
/// value column cannot be resolved.
pub fn normalize(raw: &[u8]) -> Result<NormalizedTable, SchemaError> {
    let text = decode_bytes(raw);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SchemaError::Header(e.to_string()))?
        .clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(SchemaError::Header("no header row".to_string()));
    }

    let records: Vec<StringRecord> = reader
        .records()
        .filter_map(|r| match r {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "skipping unreadable CSV record");
                None
            }
        })
        .collect();

    let columns = resolve_columns(&headers, &records)?;

    let mut parsed: Vec<(String, DateTime<Utc>, String, f64)> = Vec::with_capacity(records.len());
    for record in &records {
        let Some(valid_time) = record.get(columns.time).and_then(parse_timestamp) else {
            continue;
        };
        let Some(value) = record.get(columns.value).and_then(parse_value) else {
            continue;
        };
        let station_id = coerce_station_id(record.get(columns.station).unwrap_or(""));
        let member = columns
            .member
            .and_then(|idx| record.get(idx))
            .map(|m| m.trim_matches('"').trim())
            .filter(|m| !m.is_empty())
            .unwrap_or(SINGLE_TRACE_MEMBER)
            .to_string();
        parsed.push((station_id, valid_time, member, value));
    }

    let values: Vec<f64> = parsed.iter().map(|p| p.3).collect();
    let scaling = detect_scaling(&values);
    let divisor = if scaling == Scaling::TenthsFt { 10.0 } else { 1.0 };

    let rows = parsed
        .into_iter()
        .map(|(station_id, valid_time, member, value)| StationSeriesRow {
            station_id,
            valid_time,
            member,
            value_ft: value / divisor,
            scaling,
        })
        .collect();

    Ok(NormalizedTable { rows, scaling, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    // --- Column resolution --------------------------------------------------

    #[test]
    fn test_canonical_headers_resolve() {
        let csv = "station_id,valid_time,member,value_ft\nWVLM6,2026-02-13 06:00,e01,2.4\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert_eq!(
            table.columns,
            ResolvedColumns { station: 0, time: 1, member: Some(2), value: 3 }
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].member, "e01");
        assert_eq!(table.scaling, Scaling::Ft);
    }

    #[test]
    fn test_synonyms_are_case_insensitive() {
        let csv = "STID,Date,Ens,StormTide\nWVLM6,2026-02-13T06:00:00Z,3,1.7\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert_eq!(table.rows[0].station_id, "WVLM6");
        assert_eq!(table.rows[0].member, "3");
        assert_relative_eq!(table.rows[0].value_ft, 1.7);
    }

    #[test]
    fn test_missing_member_column_means_single_trace() {
        let csv = "station,time,value\nWVLM6,2026-02-13 06:00,2.0\nWVLM6,2026-02-13 07:00,2.1\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert!(table.columns.member.is_none());
        assert!(table.rows.iter().all(|r| r.member == SINGLE_TRACE_MEMBER));
    }

    #[test]
    fn test_value_falls_back_to_first_numeric_column() {
        let csv = "station,time,label,level\nWVLM6,2026-02-13 06:00,a,2.5\nWVLM6,2026-02-13 07:00,b,2.6\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert_eq!(table.columns.value, 3);
        assert_relative_eq!(table.rows[1].value_ft, 2.6);
    }

    #[test]
    fn test_gap_markers_keep_fallback_column_numeric() {
        let csv = "station,time,member,level\n\
                   WVLM6,2026-02-13 06:00,e01,2.5\n\
                   WVLM6,2026-02-13 07:00,e01,NaN\n\
                   WVLM6,2026-02-13 08:00,e01,NA\n\
                   WVLM6,2026-02-13 09:00,e01,null\n\
                   WVLM6,2026-02-13 10:00,e01,2.7\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert_eq!(table.columns.value, 3);
        assert_eq!(table.rows.len(), 2);
        assert_relative_eq!(table.rows[1].value_ft, 2.7);
    }

    #[test]
    fn test_missing_station_column_is_schema_error() {
        let csv = "time,value\n2026-02-13 06:00,2.0\n";
        let err = normalize(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedColumn(ColumnRole::Station)));
    }

    #[test]
    fn test_missing_time_column_is_schema_error() {
        let csv = "station,value\nWVLM6,2.0\n";
        let err = normalize(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedColumn(ColumnRole::Time)));
    }

    #[test]
    fn test_no_numeric_column_is_value_error() {
        let csv = "station,time,note\nWVLM6,2026-02-13 06:00,high\n";
        let err = normalize(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedColumn(ColumnRole::Value)));
    }

    #[test]
    fn test_empty_input_is_header_error() {
        assert!(matches!(normalize(b"").unwrap_err(), SchemaError::Header(_)));
    }

    // --- Row filtering ------------------------------------------------------

    #[test]
    fn test_bad_times_and_values_are_dropped() {
        let csv = "station,time,value\n\
                   WVLM6,not a time,2.0\n\
                   WVLM6,2026-02-13 07:00,n/a\n\
                   WVLM6,2026-02-13 08:00,2.2\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_relative_eq!(table.rows[0].value_ft, 2.2);
    }

    #[test]
    fn test_all_rows_dropped_is_valid_empty_table() {
        let csv = "station,time,value\nWVLM6,garbage,2.0\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.scaling, Scaling::Unknown);
    }

    #[test]
    fn test_numeric_station_ids_are_coerced() {
        let csv = "station,time,value\n8747437.0,2026-02-13 06:00,1.0\n";
        let table = normalize(csv.as_bytes()).unwrap();
        assert_eq!(table.rows[0].station_id, "8747437");
    }

    #[test]
    fn test_latin1_bytes_are_decoded() {
        let mut raw = b"station,time,value,note\nWVLM6,2026-02-13 06:00,1.0,".to_vec();
        raw.push(0xB0); // degree sign in Latin-1
        raw.push(b'\n');
        let table = normalize(&raw).unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    // --- Time parsing -------------------------------------------------------

    #[test]
    fn test_timestamp_offsets_convert_to_utc() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 13, 11, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-02-13T05:00:00-06:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-02-13 11:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-02-13 11:00 UTC"), Some(expected));
        assert_eq!(parse_timestamp("2026021311"), Some(expected));
        assert_eq!(parse_timestamp("02/13/2026 11:00"), Some(expected));
    }

    #[test]
    fn test_unparseable_timestamps() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("tomorrow"), None);
        assert_eq!(parse_timestamp("2026-13-45 99:00"), None);
    }

    // --- Scaling ------------------------------------------------------------

    #[test]
    fn test_integer_tenths_detected_and_divided() {
        let values: Vec<f64> = (1..=30).map(|i| (i * 10) as f64).collect();
        assert_eq!(detect_scaling(&values), Scaling::TenthsFt);

        let mut csv = String::from("station,time,value\n");
        for (i, v) in values.iter().enumerate() {
            csv.push_str(&format!("WVLM6,2026-02-13 {:02}:00,{}\n", i % 24, v));
        }
        let table = normalize(csv.as_bytes()).unwrap();
        assert_eq!(table.scaling, Scaling::TenthsFt);
        assert_relative_eq!(table.rows[0].value_ft, 1.0);
        assert_relative_eq!(table.rows[29].value_ft, 30.0);
        assert!(table.rows.iter().all(|r| r.scaling == Scaling::TenthsFt));
    }

    #[test]
    fn test_fractional_values_stay_in_feet() {
        assert_eq!(detect_scaling(&[1.2, 3.4, 2.1]), Scaling::Ft);
    }

    #[test]
    fn test_small_integers_stay_in_feet() {
        // Integer-like but never above 20.0 ft.
        assert_eq!(detect_scaling(&[1.0, 2.0, 3.0, 20.0]), Scaling::Ft);
    }

    #[test]
    fn test_integer_fraction_must_exceed_cutoff() {
        // Exactly 80% integer-like is not enough.
        assert_eq!(detect_scaling(&[30.0, 40.0, 50.0, 60.0, 1.5]), Scaling::Ft);
        assert_eq!(detect_scaling(&[30.0, 40.0, 50.0, 60.0, 70.0, 1.5]), Scaling::TenthsFt);
    }

    #[test]
    fn test_empty_values_unknown_scaling() {
        assert_eq!(detect_scaling(&[]), Scaling::Unknown);
    }
}

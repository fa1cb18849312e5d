/// NOAA CO-OPS API client.
///
/// Two products are used:
/// - the Data API `water_level` product for recent observed water levels
///   (6-minute interval, feet, UTC), which feeds the bias update and the
///   trend blend;
/// - the Metadata API `floodlevels` resource for the station's NOS minor /
///   moderate / major flood thresholds.
///
/// API Documentation: https://api.tidesandcurrents.noaa.gov/api/prod/
///
/// Water level values arrive as JSON strings (`"v": "1.234"`), and are empty
/// when a sample is missing. Parsers skip those points rather than failing.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::analysis::normalize::{parse_timestamp, parse_value};
use crate::model::{FloodThresholds, ForecastError, ObservationPoint, Result};

const COOPS_DATA_API: &str = "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter";
const COOPS_MDAPI: &str = "https://api.tidesandcurrents.noaa.gov/mdapi/prod/webapi";
const APPLICATION: &str = "coastal-flood-intel";

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WaterLevelResponse {
    #[serde(default)]
    data: Option<Vec<WaterLevelEntry>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct WaterLevelEntry {
    t: String,
    #[serde(default)]
    v: Option<Value>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_value(s),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds a Data API URL for observed water levels between two dates
/// (inclusive, `YYYYMMDD`).
pub fn build_water_level_url(
    station_id: &str,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    datum: &str,
    time_zone: &str,
) -> String {
    format!(
        "{}?product=water_level&application={}&format=json&station={}&begin_date={}&end_date={}&datum={}&time_zone={}&units=english&interval=6",
        COOPS_DATA_API,
        APPLICATION,
        urlencoding::encode(station_id),
        begin.format("%Y%m%d"),
        end.format("%Y%m%d"),
        urlencoding::encode(datum),
        urlencoding::encode(time_zone),
    )
}

/// Builds the Metadata API URL for a station's flood levels.
pub fn build_flood_levels_url(station_id: &str) -> String {
    format!(
        "{}/stations/{}/floodlevels.json",
        COOPS_MDAPI,
        urlencoding::encode(station_id)
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a `water_level` JSON response into ascending observations.
///
/// # Errors
/// - `ForecastError::Json`: the body is not the expected JSON shape.
/// - `ForecastError::Parse`: the API returned an `error` object.
pub fn parse_water_levels(json: &str) -> Result<Vec<ObservationPoint>> {
    let response: WaterLevelResponse = serde_json::from_str(json)?;

    if let Some(err) = response.error {
        return Err(ForecastError::Parse(format!("CO-OPS: {}", err.message)));
    }

    let mut points: Vec<ObservationPoint> = response
        .data
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let time = parse_timestamp(&entry.t)?;
            let value_ft = entry.v.as_ref().and_then(value_to_f64)?;
            Some(ObservationPoint { time, value_ft })
        })
        .collect();

    points.sort_by_key(|p| p.time);
    Ok(points)
}

/// Parses a `t,v` observation CSV, as exported next to the run outputs.
pub fn parse_water_levels_csv(text: &str) -> Result<Vec<ObservationPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(t_idx), Some(v_idx)) = (find("t"), find("v")) else {
        return Err(ForecastError::Parse("observation CSV needs t and v columns".to_string()));
    };

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let time = record.get(t_idx).and_then(parse_timestamp);
        let value = record.get(v_idx).and_then(parse_value);
        if let (Some(time), Some(value_ft)) = (time, value) {
            points.push(ObservationPoint { time, value_ft });
        }
    }
    points.sort_by_key(|p| p.time);
    Ok(points)
}

/// Parses a `floodlevels.json` body.
///
/// The levels sit under `floodLevel` on some stations and at the top level on
/// others. Values may be numbers, numeric strings or null.
pub fn parse_flood_levels(json: &str) -> Result<FloodThresholds> {
    let root: Value = serde_json::from_str(json)?;
    let node = root.get("floodLevel").unwrap_or(&root);
    let level = |key: &str| node.get(key).and_then(value_to_f64);

    Ok(FloodThresholds {
        minor: level("nos_minor"),
        moderate: level("nos_moderate"),
        major: level("nos_major"),
    })
}

// ---------------------------------------------------------------------------
// API client
// ---------------------------------------------------------------------------

/// Fetches observed water levels for the last `lookback_hours`.
pub fn fetch_recent_water_levels(
    client: &reqwest::blocking::Client,
    station_id: &str,
    datum: &str,
    time_zone: &str,
    lookback_hours: i64,
) -> Result<Vec<ObservationPoint>> {
    let end = Utc::now();
    let begin = end - Duration::hours(lookback_hours);
    let url = build_water_level_url(station_id, begin, end, datum, time_zone);

    let body = client.get(&url).send()?.error_for_status()?.text()?;
    parse_water_levels(&body)
}

fn try_fetch_flood_levels(client: &reqwest::blocking::Client, station_id: &str) -> Result<FloodThresholds> {
    let url = build_flood_levels_url(station_id);
    let body = client.get(&url).send()?.error_for_status()?.text()?;
    parse_flood_levels(&body)
}

/// Fetches flood levels, degrading to empty thresholds on any failure so the
/// config override can still decide whether the run proceeds.
pub fn fetch_flood_levels(client: &reqwest::blocking::Client, station_id: &str) -> FloodThresholds {
    match try_fetch_flood_levels(client, station_id) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(station = station_id, error = %e, "flood level lookup failed");
            FloodThresholds::default()
        }
    }
}

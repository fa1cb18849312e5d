/// Test fixtures: representative payloads from PETSS archives and the
/// CO-OPS APIs.
///
/// Structurally faithful but trimmed to the minimum needed to exercise the
/// parsers. PETSS archive members are CSV with one row per station, time and
/// ensemble member:
///
///   stid,valid_time,member,stormtide
///
/// CO-OPS `water_level` responses carry values as JSON strings, and an
/// empty string for a missing sample:
///
///   { "metadata": {...}, "data": [ { "t": "...", "v": "1.234", ... } ] }

/// Waveland (WVLM6): four members across three hourly forecast times, plus
/// a neighbouring station that shares the file.
///
/// With minor = 2.0 ft the per-time p_minor is 0%, 50% and 100%.
#[cfg(test)]
pub(crate) fn fixture_petss_waveland_csv() -> &'static str {
    "stid,valid_time,member,stormtide\n\
     WVLM6,2026-02-13 12:00,e01,1.4\n\
     WVLM6,2026-02-13 12:00,e02,1.6\n\
     WVLM6,2026-02-13 12:00,e03,1.5\n\
     WVLM6,2026-02-13 12:00,e04,1.7\n\
     WVLM6,2026-02-13 13:00,e01,1.8\n\
     WVLM6,2026-02-13 13:00,e02,2.1\n\
     WVLM6,2026-02-13 13:00,e03,1.9\n\
     WVLM6,2026-02-13 13:00,e04,2.3\n\
     WVLM6,2026-02-13 14:00,e01,2.2\n\
     WVLM6,2026-02-13 14:00,e02,2.6\n\
     WVLM6,2026-02-13 14:00,e03,2.4\n\
     WVLM6,2026-02-13 14:00,e04,2.9\n\
     SHBM6,2026-02-13 12:00,e01,0.9\n\
     SHBM6,2026-02-13 13:00,e01,1.0\n"
}

/// A different archive member with other Gulf stations only. Never mentions
/// WVLM6, so the substring pre-filter rules it out.
#[cfg(test)]
pub(crate) fn fixture_petss_other_station_csv() -> &'static str {
    "station_id,date,ensemble,surge\n\
     GBIM6,2026-02-13 12:00,1,1.2\n\
     GBIM6,2026-02-13 13:00,1,1.3\n\
     PCLM6,2026-02-13 12:00,1,0.8\n\
     PCLM6,2026-02-13 13:00,1,0.7\n"
}

/// Ten 6-minute observations at Waveland, one with an empty value.
#[cfg(test)]
pub(crate) fn fixture_coops_water_level_json() -> &'static str {
    r#"{
      "metadata": { "id": "8747437", "name": "Bay Waveland Yacht Club", "lat": "30.3250", "lon": "-89.3258" },
      "data": [
        { "t": "2026-02-13 06:00", "v": "1.512", "s": "0.010", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:06", "v": "1.530", "s": "0.010", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:12", "v": "1.547", "s": "0.012", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:18", "v": "", "s": "", "f": "1,1,1,1", "q": "p" },
        { "t": "2026-02-13 06:24", "v": "1.581", "s": "0.011", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:30", "v": "1.602", "s": "0.009", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:36", "v": "1.618", "s": "0.010", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:42", "v": "1.633", "s": "0.010", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:48", "v": "1.651", "s": "0.013", "f": "0,0,0,0", "q": "p" },
        { "t": "2026-02-13 06:54", "v": "1.670", "s": "0.010", "f": "0,0,0,0", "q": "p" }
      ]
    }"#
}

/// CO-OPS error envelope for a request with no data in range.
#[cfg(test)]
pub(crate) fn fixture_coops_error_json() -> &'static str {
    r#"{ "error": { "message": "No data was found. This product may not be offered at this station at the requested time." } }"#
}

/// MDAPI flood levels with the levels nested under `floodLevel`.
#[cfg(test)]
pub(crate) fn fixture_coops_flood_levels_json() -> &'static str {
    r#"{
      "floodLevel": {
        "nos_minor": 3.3,
        "nos_moderate": "4.3",
        "nos_major": 5.8,
        "nws_minor": null,
        "nws_moderate": null,
        "nws_major": null
      },
      "self": "https://api.tidesandcurrents.noaa.gov/mdapi/prod/webapi/stations/8747437/floodlevels.json"
    }"#
}

/// NOMADS directory listing for the PETSS product root.
#[cfg(test)]
pub(crate) fn fixture_nomads_date_listing_html() -> &'static str {
    r#"<html><head><title>Index of /pub/data/nccf/com/petss/prod</title></head><body>
<h1>Index of /pub/data/nccf/com/petss/prod</h1>
<pre><a href="../">../</a>
<a href="petss.20260211/">petss.20260211/</a>          11-Feb-2026 00:41    -
<a href="petss.20260212/">petss.20260212/</a>          12-Feb-2026 00:40    -
<a href="petss.20260213/">petss.20260213/</a>          13-Feb-2026 00:39    -
<a href="petss_stats/">petss_stats/</a>              01-Jan-2026 00:00    -
</pre></body></html>"#
}

/// NOMADS listing for one PETSS date directory.
#[cfg(test)]
pub(crate) fn fixture_nomads_cycle_listing_html() -> &'static str {
    r#"<html><body><pre><a href="../">../</a>
<a href="petss.t00z.csv.tar.gz">petss.t00z.csv.tar.gz</a>   13-Feb-2026 01:52   3.1M
<a href="petss.t06z.csv.tar.gz">petss.t06z.csv.tar.gz</a>   13-Feb-2026 07:51   3.1M
<a href="petss.t12z.csv.tar.gz">petss.t12z.csv.tar.gz</a>   13-Feb-2026 13:50   3.2M
<a href="petss.t12z.stormtide.grib2">petss.t12z.stormtide.grib2</a> 13-Feb-2026 13:50  80M
</pre></body></html>"#
}

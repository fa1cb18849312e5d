/// stormtide_service: single-station storm-tide forecast correction and
/// flood exceedance service.
///
/// # Module structure
///
/// ```text
/// stormtide_service
/// ├── model       - shared data types (StationSeriesRow, ExceedanceRow, ForecastSummary, ForecastError, …)
/// ├── config      - station, engine and policy configuration loader (stations.toml)
/// ├── logging     - tracing subscriber setup
/// ├── bias        - persisted rolling forecast bias (pure update + JSON load/save)
/// ├── forecast    - one run: thresholds, extraction, correction, exceedance, peak, bias update
/// ├── output      - latest.json / exceedance.csv / summary.md writers
/// ├── ingest
/// │   ├── petss   - NOMADS PETSS run discovery, tarball download and CSV extraction
/// │   ├── coops   - CO-OPS water level and flood level API: URL construction + parsing
/// │   └── fixtures (test only) - representative payloads
/// └── analysis
///     ├── normalize  - heterogeneous ensemble CSV → canonical station rows
///     ├── extract    - one station's rows across archive members
///     ├── trend      - observed trend fit and near-term blend
///     ├── exceedance - per-time threshold exceedance probabilities
///     └── peak       - peak window, confidence and recommendation
/// ```

/// Public modules
pub mod analysis;
pub mod bias;
pub mod config;
pub mod forecast;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod output;

/// Station series extraction from a batch of raw forecast sources.
///
/// Takes every member of a PETSS archive (source name → raw bytes), runs
/// each through the schema normalizer, keeps the rows for one station and
/// returns them as a single table sorted by `valid_time`.
///
/// A source that fails normalization is skipped and reported back to the
/// caller; it never fails the batch. Zero matching rows is a valid "no data"
/// result.
///
/// # Substring pre-filter
/// Before parsing, a source is only considered if its raw bytes contain the
/// station id. That check is applied only when it cannot change the result:
/// for plain ASCII, non-numeric ids every matching cell necessarily contains
/// the id verbatim. Numeric ids (which are coerced, so `8.747437e6` would
/// match `8747437`) and ids containing quotes always take the full scan.

use std::collections::BTreeMap;
use std::sync::mpsc;

use threadpool::ThreadPool;
use tracing::debug;

use crate::analysis::normalize::{coerce_station_id, normalize};
use crate::model::{SchemaError, StationSeriesRow};

/// Archive members keyed by name. Ordered, so concatenation is deterministic.
pub type SourceMap = BTreeMap<String, Vec<u8>>;

/// A source that could not be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSource {
    pub name: String,
    pub reason: String,
}

/// Outcome of scanning one source.
#[derive(Debug)]
pub enum SourceScan {
    /// Pre-filter ruled the source out without parsing.
    NotCandidate,
    /// Parsed, but no rows for the station.
    NoMatch,
    /// Parsed rows for the station, in file order.
    Matched(Vec<StationSeriesRow>),
    /// Normalization failed.
    Failed(SchemaError),
}

/// Result of extracting one station from a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Matching rows, ascending by `valid_time`.
    pub rows: Vec<StationSeriesRow>,
    /// Sources that contributed rows, in source order.
    pub matched_sources: Vec<String>,
    /// Sources that failed normalization.
    pub skipped: Vec<SkippedSource>,
    /// Sources that were actually parsed.
    pub parsed: usize,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Whether the raw-byte pre-filter is exact for this station id.
pub fn prefilter_is_exact(station_id: &str) -> bool {
    let id = station_id.trim();
    !id.is_empty() && id.is_ascii() && !id.contains('"') && id.parse::<f64>().is_err()
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Normalizes one source and keeps the rows for `target` (already coerced).
pub fn scan_source(raw: &[u8], target: &str, use_prefilter: bool) -> SourceScan {
    if use_prefilter && !contains_subslice(raw, target.as_bytes()) {
        return SourceScan::NotCandidate;
    }

    match normalize(raw) {
        Ok(table) => {
            let rows: Vec<StationSeriesRow> = table
                .rows
                .into_iter()
                .filter(|r| r.station_id == target)
                .collect();
            if rows.is_empty() {
                SourceScan::NoMatch
            } else {
                SourceScan::Matched(rows)
            }
        }
        Err(e) => SourceScan::Failed(e),
    }
}

fn reduce<I>(scans: I) -> Extraction
where
    I: IntoIterator<Item = (String, SourceScan)>,
{
    let mut out = Extraction::default();

    for (name, scan) in scans {
        match scan {
            SourceScan::NotCandidate => {}
            SourceScan::NoMatch => out.parsed += 1,
            SourceScan::Matched(rows) => {
                out.parsed += 1;
                debug!(source = %name, rows = rows.len(), "source matched station");
                out.rows.extend(rows);
                out.matched_sources.push(name);
            }
            SourceScan::Failed(e) => {
                out.parsed += 1;
                out.skipped.push(SkippedSource { name, reason: e.to_string() });
            }
        }
    }

    // Stable, so rows sharing a time keep source-then-file order.
    out.rows.sort_by_key(|r| r.valid_time);
    out
}

/// Extracts one station's rows from every source, sequentially.
pub fn extract_station_series(sources: &SourceMap, station_id: &str) -> Extraction {
    let target = coerce_station_id(station_id);
    let use_prefilter = prefilter_is_exact(&target);

    reduce(
        sources
            .iter()
            .map(|(name, raw)| (name.clone(), scan_source(raw, &target, use_prefilter))),
    )
}

/// Same result as [`extract_station_series`], normalizing candidate sources
/// on a pool of `workers` threads.
pub fn extract_station_series_parallel(
    sources: &SourceMap,
    station_id: &str,
    workers: usize,
) -> Extraction {
    let target = coerce_station_id(station_id);
    let use_prefilter = prefilter_is_exact(&target);

    let candidates: Vec<(usize, &String, &Vec<u8>)> = sources
        .iter()
        .enumerate()
        .filter(|(_, (_, raw))| !use_prefilter || contains_subslice(raw, target.as_bytes()))
        .map(|(idx, (name, raw))| (idx, name, raw))
        .collect();

    if candidates.len() <= 1 || workers <= 1 {
        return extract_station_series(sources, station_id);
    }

    let pool = ThreadPool::new(workers.min(candidates.len()));
    let (tx, rx) = mpsc::channel();
    let expected = candidates.len();

    // Bytes are copied only once the pool is known to be used.
    for (idx, name, raw) in candidates {
        let (name, raw) = (name.clone(), raw.clone());
        let tx = tx.clone();
        let target = target.clone();
        pool.execute(move || {
            // Already pre-filtered above.
            let scan = scan_source(&raw, &target, false);
            let _ = tx.send((idx, name, scan));
        });
    }
    drop(tx);

    let mut results: Vec<(usize, String, SourceScan)> = rx.iter().take(expected).collect();
    pool.join();
    results.sort_by_key(|(idx, _, _)| *idx);

    reduce(results.into_iter().map(|(_, name, scan)| (name, scan)))
}

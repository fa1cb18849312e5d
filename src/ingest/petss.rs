/// NOAA PETSS (Probabilistic Extra-Tropical Storm Surge) archive retrieval.
///
/// NOMADS publishes one directory per forecast day and one CSV tarball per
/// cycle inside it:
///
/// ```text
/// https://nomads.ncep.noaa.gov/pub/data/nccf/com/petss/prod/
///   petss.20260213/
///     petss.t00z.csv.tar.gz
///     petss.t06z.csv.tar.gz
///     ...
/// ```
///
/// The latest run is the greatest date directory and, within it, the greatest
/// cycle. Directory listings are plain Apache index pages; only `href`
/// attributes are inspected.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};

use crate::model::{ForecastError, Result};

pub const NOMADS_PETSS_PROD: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/petss/prod/";

/// Archives are a few MB; the listing pages are tiny.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Location of one PETSS cycle's CSV tarball.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetssRunRef {
    /// `YYYYMMDD`
    pub date_dir: String,
    /// Cycle hour, `"00"`, `"06"`, `"12"` or `"18"`.
    pub cycle: String,
    pub csv_tar_url: String,
}

// ---------------------------------------------------------------------------
// Listing parsing
// ---------------------------------------------------------------------------

/// Every `href="..."` target in an HTML page, in document order.
fn hrefs(html: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = html;
    while let Some(pos) = rest.find("href=\"") {
        rest = &rest[pos + 6..];
        match rest.find('"') {
            Some(end) => {
                out.push(&rest[..end]);
                rest = &rest[end + 1..];
            }
            None => break,
        }
    }
    out
}

/// Greatest `petss.YYYYMMDD/` directory in a listing, returned as `YYYYMMDD`.
pub fn parse_latest_date_dir(listing_html: &str) -> Option<String> {
    hrefs(listing_html)
        .into_iter()
        .filter_map(|h| h.strip_prefix("petss.")?.strip_suffix('/'))
        .filter(|d| d.len() == 8 && d.bytes().all(|b| b.is_ascii_digit()))
        .max()
        .map(str::to_string)
}

/// Greatest `petss.tNNz.csv.tar.gz` cycle in a date listing, returned as
/// `(cycle, file_name)`.
pub fn parse_latest_cycle_tarball(listing_html: &str) -> Option<(String, String)> {
    hrefs(listing_html)
        .into_iter()
        .filter_map(|h| {
            let cycle = h.strip_prefix("petss.t")?.strip_suffix("z.csv.tar.gz")?;
            (cycle.len() == 2 && cycle.bytes().all(|b| b.is_ascii_digit()))
                .then(|| (cycle.to_string(), h.to_string()))
        })
        .max()
}

// ---------------------------------------------------------------------------
// Archive extraction
// ---------------------------------------------------------------------------

/// Extracts every `.csv` member of a gzip-compressed tarball, keyed by its
/// path inside the archive.
///
/// # Errors
/// - `ForecastError::Io`: the bytes are not a readable gzip/tar stream.
/// - `ForecastError::Archive`: the archive holds no CSV members.
pub fn extract_csvs(tar_gz: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = Archive::new(GzDecoder::new(tar_gz));
    let mut members = BTreeMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        if !name.to_ascii_lowercase().ends_with(".csv") {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        members.insert(name, bytes);
    }

    if members.is_empty() {
        return Err(ForecastError::Archive("no CSV members in PETSS tarball".to_string()));
    }
    debug!(members = members.len(), "extracted PETSS CSV members");
    Ok(members)
}

/// Reads a local tarball and extracts its CSV members.
pub fn extract_csvs_from_file(path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let bytes = std::fs::read(path)?;
    extract_csvs(&bytes)
}

// ---------------------------------------------------------------------------
// NOMADS client
// ---------------------------------------------------------------------------

fn fetch_listing(client: &reqwest::blocking::Client, url: &str) -> Result<String> {
    let body = client.get(url).send()?.error_for_status()?.text()?;
    Ok(body)
}

/// Locates the most recent PETSS cycle on NOMADS.
///
/// # Errors
/// `ForecastError::Archive` when a listing has no usable entry.
pub fn find_latest_run(client: &reqwest::blocking::Client) -> Result<PetssRunRef> {
    find_latest_run_at(client, NOMADS_PETSS_PROD)
}

/// Same as [`find_latest_run`] against another mirror of the product tree.
pub fn find_latest_run_at(client: &reqwest::blocking::Client, base_url: &str) -> Result<PetssRunRef> {
    let base = base_url.trim_end_matches('/');

    let root = fetch_listing(client, &format!("{}/", base))?;
    let date = parse_latest_date_dir(&root)
        .ok_or_else(|| ForecastError::Archive("no petss.YYYYMMDD directory on NOMADS".to_string()))?;

    let day_url = format!("{}/petss.{}/", base, date);
    let day = fetch_listing(client, &day_url)?;
    let (cycle, file) = parse_latest_cycle_tarball(&day)
        .ok_or_else(|| ForecastError::Archive(format!("no CSV tarball under petss.{}", date)))?;

    Ok(PetssRunRef {
        csv_tar_url: format!("{}{}", day_url, file),
        date_dir: date,
        cycle,
    })
}

/// Downloads a PETSS tarball.
pub fn download_tarball(client: &reqwest::blocking::Client, run: &PetssRunRef) -> Result<Vec<u8>> {
    info!(date = %run.date_dir, cycle = %run.cycle, "downloading PETSS tarball");
    let response = client
        .get(&run.csv_tar_url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()?
        .error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_latest_date_dir() {
        assert_eq!(
            parse_latest_date_dir(fixture_nomads_date_listing_html()),
            Some("20260213".to_string())
        );
        assert_eq!(parse_latest_date_dir("<pre><a href=\"../\">../</a></pre>"), None);
    }

    #[test]
    fn test_latest_cycle_ignores_other_products() {
        let (cycle, file) = parse_latest_cycle_tarball(fixture_nomads_cycle_listing_html()).unwrap();
        assert_eq!(cycle, "12");
        assert_eq!(file, "petss.t12z.csv.tar.gz");
    }

    #[test]
    fn test_extract_keeps_only_csv_members() {
        let gz = tarball(&[
            ("petss/stations_a.csv", "stid,valid_time,value\n"),
            ("petss/README.txt", "not data"),
            ("petss/stations_b.CSV", "stid,valid_time,value\n"),
        ]);
        let members = extract_csvs(&gz).unwrap();
        let names: Vec<&str> = members.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["petss/stations_a.csv", "petss/stations_b.CSV"]);
    }

    #[test]
    fn test_extract_without_csv_is_archive_error() {
        let gz = tarball(&[("petss/README.txt", "nothing here")]);
        assert!(matches!(extract_csvs(&gz), Err(ForecastError::Archive(_))));
    }

    #[test]
    fn test_extract_garbage_is_io_error() {
        assert!(matches!(extract_csvs(b"definitely not gzip"), Err(ForecastError::Io(_))));
    }
}

//! Storm-Tide Forecast Correction Service - batch entry point
//!
//! One invocation processes one coastal station:
//! 1. Locates and downloads the latest PETSS ensemble CSV tarball
//! 2. Fetches recent CO-OPS water levels and flood levels
//! 3. Corrects the ensemble for learned bias and the observed trend
//! 4. Computes threshold exceedance probabilities and the peak window
//! 5. Writes latest.json / exceedance.csv / summary.md and the bias state
//!
//! Usage:
//!   cargo run --release                                   # first station in stations.toml
//!   cargo run --release -- --station WVLM6 --dry-run      # compute and print only
//!   cargo run --release -- --archive petss.t12z.csv.tar.gz --observations obs.json
//!
//! Environment:
//!   STORMTIDE_CONFIG - path to stations.toml (default ./stations.toml)
//!   RUST_LOG         - tracing filter (default stormtide_service=info)

use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;

use stormtide_service::analysis::extract::SourceMap;
use stormtide_service::bias;
use stormtide_service::config::{self, ServiceConfig, StationConfig};
use stormtide_service::forecast::{self, RunInputs, RunOutcome};
use stormtide_service::ingest::{self, coops, petss};
use stormtide_service::logging;
use stormtide_service::model::{FloodThresholds, ForecastError, ObservationPoint, Result};
use stormtide_service::output;

#[derive(Debug, Default)]
struct CliArgs {
    station: Option<String>,
    config: Option<PathBuf>,
    archive: Option<PathBuf>,
    observations: Option<PathBuf>,
    dry_run: bool,
}

const USAGE: &str =
    "[--station ID] [--config PATH] [--archive FILE] [--observations FILE] [--dry-run]";

fn parse_args(args: &[String]) -> std::result::Result<CliArgs, String> {
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match flag {
            "--station" => cli.station = Some(value()?),
            "--config" => cli.config = Some(PathBuf::from(value()?)),
            "--archive" => cli.archive = Some(PathBuf::from(value()?)),
            "--observations" => cli.observations = Some(PathBuf::from(value()?)),
            "--dry-run" => {
                cli.dry_run = true;
                i += 1;
                continue;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
        i += 2;
    }
    Ok(cli)
}

fn load_sources(client: Option<&reqwest::blocking::Client>, archive: Option<&Path>) -> Result<SourceMap> {
    if let Some(path) = archive {
        println!("📦 Reading PETSS archive {}", path.display());
        return petss::extract_csvs_from_file(path);
    }
    let client = client
        .ok_or_else(|| ForecastError::Config("no HTTP client for PETSS download".to_string()))?;
    let run = petss::find_latest_run(client)?;
    println!("📦 Latest PETSS run: {} cycle {}z", run.date_dir, run.cycle);
    let bytes = petss::download_tarball(client, &run)?;
    petss::extract_csvs(&bytes)
}

fn load_observations(
    client: Option<&reqwest::blocking::Client>,
    station: &StationConfig,
    config: &ServiceConfig,
    path: Option<&Path>,
) -> Vec<ObservationPoint> {
    let result = match (path, client) {
        (Some(path), _) => std::fs::read_to_string(path)
            .map_err(Into::into)
            .and_then(|text| {
                if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
                    coops::parse_water_levels(&text)
                } else {
                    coops::parse_water_levels_csv(&text)
                }
            }),
        (None, Some(client)) => coops::fetch_recent_water_levels(
            client,
            &station.id,
            &station.coops_datum,
            &station.coops_time_zone,
            config.engine.observation_lookback_hours,
        ),
        (None, None) => Ok(Vec::new()),
    };

    // Observations only refine the run; without them it still completes.
    match result {
        Ok(points) => points,
        Err(e) => {
            eprintln!("   ⚠️  Observations unavailable: {}", e);
            Vec::new()
        }
    }
}

fn execute(cli: &CliArgs) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let config = config::load_config_from(&config_path)?;
    let station = config.select_station(cli.station.as_deref())?;
    println!("📍 {} (CO-OPS {}, PETSS {})", station.name, station.id, station.petss_id);

    let over = station.threshold_override();
    let needs_lookup = over.minor.is_none() || over.moderate.is_none() || over.major.is_none();
    let needs_network = cli.archive.is_none() || cli.observations.is_none() || needs_lookup;
    let client = if needs_network { Some(ingest::http_client()?) } else { None };

    let sources = load_sources(client.as_ref(), cli.archive.as_deref())?;
    println!("   {} CSV members", sources.len());

    let observations = load_observations(client.as_ref(), station, &config, cli.observations.as_deref());
    println!("   {} observations", observations.len());

    let lookup_thresholds = match (&client, needs_lookup) {
        (Some(client), true) => coops::fetch_flood_levels(client, &station.id),
        _ => FloodThresholds::default(),
    };

    let bias_path = config.paths.bias_path(&station.id);
    let inputs = RunInputs {
        station,
        engine: &config.engine,
        policy: &config.policy,
        sources: &sources,
        observations: &observations,
        lookup_thresholds,
        bias: bias::load(&bias_path),
        now: Utc::now(),
    };

    let run = match forecast::run(&inputs)? {
        RunOutcome::NoStationData { skipped_sources } => {
            println!(
                "\n⚠️  No rows for {} in this run ({} sources skipped). Nothing written.",
                station.petss_id, skipped_sources
            );
            return Ok(());
        }
        RunOutcome::Completed(run) => run,
    };

    let s = &run.summary;
    println!("\n📊 {}", s.recommendation);
    println!("   Category:   {}", s.recommendation_category);
    if let Some(peak) = &s.peak {
        println!(
            "   Peak:       {:.2} ft, minor {:.0}% / moderate {:.0}% / major {:.0}%",
            peak.mean_ft, peak.p_minor, peak.p_moderate, peak.p_major
        );
    }
    println!("   Confidence: {:.0}%", s.confidence * 100.0);
    println!("   Bias:       {:+.2} ft (n={})", s.bias.applied_bias_ft, s.bias.applied_n);

    if cli.dry_run {
        println!("\n✓ Dry run, nothing written");
        return Ok(());
    }

    let out_dir = config.paths.station_output_dir(station);
    let written = output::write_run(&out_dir, &run)?;
    bias::save(&bias_path, &run.bias_after)?;
    println!("\n✓ Wrote {}", written.latest_json.display());
    println!("✓ Bias state {}", bias_path.display());
    Ok(())
}

fn main() {
    println!("🌊 Storm-Tide Forecast Correction Service");
    println!("=========================================\n");

    logging::init_tracing(logging::DEFAULT_DIRECTIVE);

    let args: Vec<String> = env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            eprintln!("Usage: {} {}", args.first().map(String::as_str).unwrap_or("stormtide_service"), USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = execute(&cli) {
        eprintln!("\n❌ Run failed: {}\n", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("stormtide_service")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_all_flags() {
        let cli = parse_args(&args(&[
            "--station", "WVLM6", "--dry-run", "--archive", "a.tar.gz", "--observations", "obs.csv",
        ]))
        .unwrap();
        assert_eq!(cli.station.as_deref(), Some("WVLM6"));
        assert!(cli.dry_run);
        assert_eq!(cli.archive, Some(PathBuf::from("a.tar.gz")));
        assert_eq!(cli.observations, Some(PathBuf::from("obs.csv")));
        assert_eq!(cli.config, None);
    }

    #[test]
    fn test_missing_value_and_unknown_flag() {
        assert!(parse_args(&args(&["--station"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&[])).is_ok());
    }
}

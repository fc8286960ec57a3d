use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use risk_data::model::{ContextKey, RequestPath};
use risk_data::{Catalog, FeatureSourceConfig, RiskDataService, WfsFeatureSource};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Catalog JSON document describing hazards, risk analyses and dimensions
    #[arg(long, env = "RISKS_CATALOG", value_name = "FILE")]
    catalog: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// OGC server base URL used for WFS queries
    #[arg(
        long,
        env = "RISKS_OGC_LOCATION",
        default_value = "http://localhost:8080/geoserver/"
    )]
    ogc_location: String,

    #[arg(long, env = "RISKS_OGC_USER")]
    ogc_user: Option<String>,

    #[arg(long, env = "RISKS_OGC_PASSWORD", hide_env_values = true)]
    ogc_password: Option<String>,

    /// WMS base URL returned to map clients (default: the OGC location)
    #[arg(long, env = "RISKS_OGC_PUBLIC_LOCATION")]
    ogc_public_location: Option<String>,

    /// Feature request timeout in seconds
    #[arg(long, env = "RISKS_OGC_TIMEOUT", default_value_t = 30)]
    ogc_timeout: u64,
}

impl SourceArgs {
    fn config(&self) -> FeatureSourceConfig {
        FeatureSourceConfig {
            location: self.ogc_location.clone(),
            user: self.ogc_user.clone(),
            password: self.ogc_password.clone(),
            public_location: self
                .ogc_public_location
                .clone()
                .unwrap_or_else(|| self.ogc_location.clone()),
            timeout: Duration::from_secs(self.ogc_timeout),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hazard overview of a location
    Location {
        /// Administrative division code
        #[arg(long)]
        loc: String,
    },

    /// Hazard and analysis type details for a location
    Hazard {
        #[arg(long)]
        loc: String,

        /// Hazard type mnemonic
        #[arg(long)]
        ht: String,

        /// Analysis type name (default: the hazard's first)
        #[arg(long)]
        at: Option<String>,
    },

    /// Additional layer typenames of a risk analysis
    Layers {
        /// Risk analysis id
        #[arg(long = "an", value_name = "ID")]
        risk_id: String,
    },

    /// Extract reshaped data of one or more risk analyses
    Extract {
        #[arg(long)]
        loc: String,

        #[arg(long)]
        ht: String,

        #[arg(long)]
        at: Option<String>,

        /// Risk analysis id (repeatable)
        #[arg(long = "an", value_name = "ID", required = true)]
        analyses: Vec<String>,

        /// Primary dimension id (default: the dimension on axis x)
        #[arg(long)]
        dym: Option<String>,

        /// Write one `<id>.json` per risk analysis here instead of stdout
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Parallel extraction threads (default: number of CPU cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },
}

fn main() -> Result<()> {
    // stdout carries JSON only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    let catalog = Catalog::from_path(&args.catalog)
        .with_context(|| format!("Failed to load catalog {:?}", args.catalog))?;
    let config = args.source.config();
    let public_location = config.public_location.clone();
    let source = WfsFeatureSource::new(config).context("Failed to build feature source")?;
    let service = RiskDataService::new(&catalog, &source, public_location);

    match &args.command {
        Command::Location { loc } => {
            let path = RequestPath::new().with(ContextKey::Loc, loc.as_str());
            let overview = service
                .location_overview(&path)
                .with_context(|| format!("Location overview for {} failed", loc))?;
            print_json(&overview)?;
        }
        Command::Hazard { loc, ht, at } => {
            let path = request_path(loc, ht, at.as_deref(), None, None);
            let overview = service
                .hazard_overview(&path)
                .with_context(|| format!("Hazard overview for {}/{} failed", loc, ht))?;
            print_json(&overview)?;
        }
        Command::Layers { risk_id } => {
            let layers = service
                .risk_layers(risk_id)
                .with_context(|| format!("Layers of risk analysis {} unavailable", risk_id))?;
            print_json(&layers)?;
        }
        Command::Extract {
            loc,
            ht,
            at,
            analyses,
            dym,
            output,
            threads,
        } => {
            if let Some(threads) = threads {
                ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build_global()
                    .context("Failed to build thread pool")?;
            }
            if let Some(dir) = output {
                fs::create_dir_all(dir)?;
            }

            let paths: Vec<RequestPath> = analyses
                .iter()
                .map(|an| request_path(loc, ht, at.as_deref(), Some(an.as_str()), dym.as_deref()))
                .collect();
            extract_all(&service, &paths, output.as_deref())?;
        }
    }

    info!("Total processing time: {:?}", start_time.elapsed());
    Ok(())
}

fn request_path(
    loc: &str,
    ht: &str,
    at: Option<&str>,
    an: Option<&str>,
    dym: Option<&str>,
) -> RequestPath {
    let mut path = RequestPath::new()
        .with(ContextKey::Loc, loc)
        .with(ContextKey::Ht, ht);
    for (key, value) in [(ContextKey::At, at), (ContextKey::An, an), (ContextKey::Dym, dym)] {
        if let Some(value) = value {
            path = path.with(key, value);
        }
    }
    path
}

fn extract_all(
    service: &RiskDataService<'_, WfsFeatureSource>,
    paths: &[RequestPath],
    output: Option<&Path>,
) -> Result<()> {
    info!("Extracting {} risk analyses", paths.len());

    let results: Vec<Result<Option<serde_json::Value>>> = paths
        .par_iter()
        .map(|path| extract_one(service, path, output))
        .collect();

    let mut errors = Vec::new();
    let mut printed = Vec::new();
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(Some(value)) => printed.push(value),
            Ok(None) => {}
            Err(e) => errors.push(format!("{}: {:#}", path.an.as_deref().unwrap_or("?"), e)),
        }
    }

    match printed.as_slice() {
        [] => {}
        [single] => print_json(single)?,
        _ => print_json(&printed)?,
    }

    if !errors.is_empty() {
        error!("Failed to extract {} risk analyses:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} risk analyses failed to extract", errors.len());
    }

    Ok(())
}

/// Writes the extraction to `output` when given, otherwise hands it back for printing.
fn extract_one(
    service: &RiskDataService<'_, WfsFeatureSource>,
    path: &RequestPath,
    output: Option<&Path>,
) -> Result<Option<serde_json::Value>> {
    let an = path.an.as_deref().unwrap_or_default();
    let extraction = service.extract(path)?;
    info!(
        "Extracted {} rows for risk analysis {}",
        extraction.risk_analysis_data.data.values.len(),
        an
    );

    match output {
        Some(dir) => {
            let output_path = dir.join(format!("{}.json", an));
            let body = serde_json::to_string_pretty(&extraction)?;
            fs::write(&output_path, body)
                .with_context(|| format!("Failed to write {:?}", output_path))?;
            info!("Written: {:?}", output_path);
            Ok(None)
        }
        None => Ok(Some(serde_json::to_value(&extraction)?)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_args_collect_repeated_ids() {
        let args = Args::try_parse_from([
            "risk-data",
            "--catalog",
            "catalog.json",
            "extract",
            "--loc",
            "AF",
            "--ht",
            "EQ",
            "--an",
            "1",
            "--an",
            "2",
            "--threads",
            "2",
        ])
        .unwrap();

        match args.command {
            Command::Extract {
                analyses, threads, ..
            } => {
                assert_eq!(analyses, vec!["1", "2"]);
                assert_eq!(threads, Some(2));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_public_location_defaults_to_ogc_location() {
        let args = Args::try_parse_from([
            "risk-data",
            "--catalog",
            "catalog.json",
            "--ogc-location",
            "http://geo.example.org/geoserver/",
            "--ogc-timeout",
            "5",
            "location",
            "--loc",
            "AF",
        ])
        .unwrap();

        let config = args.source.config();
        assert_eq!(config.public_location, "http://geo.example.org/geoserver/");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_layers_takes_risk_id() {
        let args =
            Args::try_parse_from(["risk-data", "--catalog", "c.json", "layers", "--an", "4"])
                .unwrap();
        assert!(matches!(args.command, Command::Layers { risk_id } if risk_id == "4"));
    }

    #[test]
    fn test_request_path_skips_absent_keys() {
        let path = request_path("AF", "EQ", None, Some("1"), None);
        assert_eq!(path.get(ContextKey::An), Some("1"));
        assert_eq!(path.get(ContextKey::At), None);
    }
}

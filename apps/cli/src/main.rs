#![deny(warnings)]

//! Headless forecast runner: YAML config + JSON dataset bundle in, JSON
//! forecast out.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use data_pipeline::{DatasetBundle, DatasetMapping};
use demand_core::ForecastConfig;
use demand_runtime::{Engine, ForecastOutput};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: demand-forecast --config <file.yaml> --data <bundle.json> \
(--region <name> | --all-regions) [--scenario <label>] [--horizon <year>] [--output <file.json>]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    data: Option<PathBuf>,
    region: Option<String>,
    all_regions: bool,
    scenario: Option<String>,
    horizon: Option<i32>,
    output: Option<PathBuf>,
    version: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut out = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--config" => out.config = Some(value("--config")?.into()),
            "--data" => out.data = Some(value("--data")?.into()),
            "--region" => out.region = Some(value("--region")?),
            "--all-regions" => out.all_regions = true,
            "--scenario" => out.scenario = Some(value("--scenario")?),
            "--horizon" => {
                let v = value("--horizon")?;
                out.horizon = Some(v.parse().with_context(|| format!("bad --horizon {v}"))?);
            }
            "--output" => out.output = Some(value("--output")?.into()),
            "--version" => out.version = true,
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
    }
    Ok(out)
}

/// Contents of the YAML config file.
#[derive(Debug, Deserialize)]
struct CliConfig {
    #[serde(default)]
    forecast: ForecastConfig,
    datasets: DatasetMapping,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum RegionResult {
    Ok { forecast: Box<ForecastOutput> },
    Failed { error: String },
}

#[derive(Serialize)]
struct RunReport {
    generated_at: String,
    version: &'static str,
    git_sha: &'static str,
    scenario: String,
    regions: BTreeMap<String, RegionResult>,
}

fn load_config(args: &Args) -> Result<CliConfig> {
    let path = args.config.as_ref().with_context(|| format!("missing --config\n{USAGE}"))?;
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut cfg: CliConfig = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("parse {}", path.display()))?;
    if let Some(s) = &args.scenario {
        cfg.forecast.scenario = s.clone();
    }
    if let Some(h) = args.horizon {
        cfg.forecast.horizon_end = h;
    }
    Ok(cfg)
}

fn load_bundle(args: &Args) -> Result<DatasetBundle> {
    let path = args.data.as_ref().with_context(|| format!("missing --data\n{USAGE}"))?;
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    DatasetBundle::from_reader(BufReader::new(file))
        .with_context(|| format!("load {}", path.display()))
}

fn run(args: &Args, cfg: CliConfig, bundle: &DatasetBundle) -> Result<RunReport> {
    let regions: Vec<String> = match (&args.region, args.all_regions) {
        (Some(r), false) => vec![r.clone()],
        (None, true) => bundle.regions_for(&cfg.datasets).into_iter().collect(),
        _ => bail!("pass exactly one of --region or --all-regions\n{USAGE}"),
    };
    if regions.is_empty() {
        bail!("no region in the bundle has the configured datasets");
    }
    let scenario = cfg.forecast.scenario.clone();
    let engine = Engine::new(cfg.forecast).context("invalid forecast config")?;

    let mut results = BTreeMap::new();
    let mut inputs = Vec::with_capacity(regions.len());
    for region in &regions {
        match bundle.inputs_for(&cfg.datasets, region) {
            Ok(i) => inputs.push(i),
            Err(e) => {
                warn!(%region, error = %e, "region skipped");
                results.insert(region.clone(), RegionResult::Failed { error: e.to_string() });
            }
        }
    }
    for (region, outcome) in engine.run_regions(&inputs) {
        let result = match outcome {
            Ok(forecast) => RegionResult::Ok {
                forecast: Box::new(forecast),
            },
            Err(e) => RegionResult::Failed {
                error: e.to_string(),
            },
        };
        results.insert(region, result);
    }

    Ok(RunReport {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: env!("CARGO_PKG_VERSION"),
        git_sha: env!("GIT_SHA"),
        scenario,
        regions: results,
    })
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!("demand-forecast {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"));
        return Ok(());
    }
    let cfg = load_config(&args)?;
    let bundle = load_bundle(&args)?;
    info!(scenario = %cfg.forecast.scenario, horizon = cfg.forecast.horizon_end, "starting forecast");

    let report = run(&args, cfg, &bundle)?;
    let ok = report
        .regions
        .values()
        .filter(|r| matches!(r, RegionResult::Ok { .. }))
        .count();
    let passed = report
        .regions
        .values()
        .filter(|r| matches!(r, RegionResult::Ok { forecast } if forecast.report.passed))
        .count();
    info!(regions = report.regions.len(), ok, passed, "forecast finished");

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    if ok == 0 {
        bail!("no region could be forecast");
    }
    Ok(())
}

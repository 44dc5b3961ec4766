mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Overrides};
use rfwbench_core::{DatasetLayout, Harness, PairEnumerator, PairIndex, VerifyRequest};
use rfwbench_engine::{FaceVerifier, ModelCatalog};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rfwbench", about = "Face verification benchmark over the RFW race partitions")]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark over the configured races
    Run,
    /// Load one race's index files and report what they contain
    Index {
        /// Race partition (e.g. Asian)
        race: String,
    },
    /// Verify a single image pair
    Verify {
        image_a: PathBuf,
        image_b: PathBuf,
    },
    /// List supported models and detectors
    Models,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(&cli.overrides);
    tracing::debug!(?config, "effective configuration");

    match cli.command {
        Commands::Run => run(&config),
        Commands::Index { race } => index(&config, &race),
        Commands::Verify { image_a, image_b } => verify(&config, &image_a, &image_b),
        Commands::Models => {
            println!("Models:    {}", ModelCatalog::model_ids().collect::<Vec<_>>().join(", "));
            println!("Detectors: {}", ModelCatalog::detector_ids().collect::<Vec<_>>().join(", "));
            Ok(())
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let mut verifier = FaceVerifier::new(&config.model_dir, config.threshold);
    verifier
        .preload(&config.model, &config.detector)
        .with_context(|| format!("failed to load {} / {}", config.model, config.detector))?;

    let mut harness = Harness::new(
        verifier,
        DatasetLayout::new(&config.dataset_root),
        &config.output_dir,
        config.run_settings(),
    );
    let (report, ledger) = harness.run(config.races.as_slice()).context("benchmark run failed")?;

    print!("{}", report.format_summary());
    println!("Reports written to {}", harness.paths().dir().display());
    if !ledger.is_empty() {
        println!(
            "{} pair(s) skipped, see {}",
            ledger.len(),
            harness.paths().exceptions().display()
        );
    }
    Ok(())
}

fn index(config: &Config, race: &str) -> Result<()> {
    let layout = DatasetLayout::new(&config.dataset_root);
    let index = PairIndex::load(&layout.people_file(race), &layout.pairs_file(race), config.mode)
        .with_context(|| format!("failed to load index for {race}"))?;
    let planned = PairEnumerator::new(&index, config.limits).planned();

    println!("Race:              {race}");
    println!("Mode:              {}", index.mode());
    println!("Folders:           {}", index.sizes.len());
    println!("Photos:            {}", index.sizes.total_photos());
    println!("Listed pairs:      {}", index.records.len());
    println!("Other-shape lines: {}", index.other_shape);
    println!("Pairs to test:     {planned}");
    println!("Malformed lines:   {}", index.skipped());
    for warning in &index.warnings {
        println!("  {warning}");
    }
    Ok(())
}

fn verify(config: &Config, image_a: &Path, image_b: &Path) -> Result<()> {
    let mut verifier = FaceVerifier::new(&config.model_dir, config.threshold);
    let verdict = verifier
        .compare(&VerifyRequest {
            image_a,
            image_b,
            model: &config.model,
            detector: &config.detector,
            distance_metric: config.distance_metric,
        })
        .with_context(|| format!("failed to verify {} against {}", image_a.display(), image_b.display()))?;

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

//! abrank - rank antibody design candidates from a cohort bundle.
//!
//! Configuration is read from `--config` (or `$ABRANK_CONFIG`), else
//! `abrank.toml` in the working directory, else built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use abrank_common::PipelineConfig;
use abrank_pipeline::report::write_report;
use abrank_pipeline::{AbrankPipeline, CohortBundle, PipelineProgress};

const DEFAULT_CONFIG_PATH: &str = "abrank.toml";

#[derive(Parser, Debug)]
#[command(
    name = "abrank",
    version,
    about = "Score and rank antibody design candidates by developability and docking confidence."
)]
struct Cli {
    /// Cohort bundle JSON (variants plus structure, peptide and pose predictions).
    #[arg(value_name = "BUNDLE")]
    bundle: PathBuf,

    /// Prefix for the ranked CSV, JSON report, shortlist FASTA and effective config.
    #[arg(value_name = "OUT_PREFIX", default_value = "abrank")]
    out_prefix: String,

    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long, env = "ABRANK_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let path = match explicit {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
        None => {
            warn!("No {DEFAULT_CONFIG_PATH} found; using built-in defaults");
            return Ok(PipelineConfig::default());
        }
    };
    let config = PipelineConfig::load(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("abrank {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;
    info!(
        policy = ?config.fusion.missing_data,
        alpha = config.fusion.alpha,
        workers = config.execution.parallel_workers,
        "Pipeline configured"
    );

    let (variants, collaborators) = CohortBundle::from_path(&cli.bundle)
        .with_context(|| format!("reading cohort bundle {}", cli.bundle.display()))?
        .into_parts()?;

    let (tx, mut rx) = broadcast::channel::<PipelineProgress>(64);
    let progress = tokio::spawn(async move {
        while let Ok(p) = rx.recv().await {
            debug!(
                stage = %p.stage,
                scored = p.variants_scored,
                ranked = p.variants_ranked,
                total = p.variants_total,
                "{}",
                p.message
            );
        }
    });

    let pipeline = AbrankPipeline::new(config, collaborators)?.with_progress(tx);
    let config_path = format!("{}.config.yaml", cli.out_prefix);
    pipeline
        .config()
        .to_yaml(&config_path)
        .with_context(|| format!("writing effective configuration to {config_path}"))?;

    let report = pipeline.run(variants).await?;
    drop(pipeline);
    let _ = progress.await;

    let paths = write_report(&report, &cli.out_prefix)?;
    info!(
        "Ranked {} of {} variants → {} / {}",
        report.ranked.len(),
        report.cohort_size,
        paths.ranked_csv.display(),
        paths.report_json.display()
    );
    if let Some(fasta) = paths.shortlist_fasta {
        info!("Shortlisted {} candidates → {}", report.shortlist.len(), fasta.display());
    }
    Ok(())
}

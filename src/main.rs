// src/main.rs

mod artifact;
mod classifier;
mod config;
mod detector;
mod frame_source;
mod pipeline;
mod store;
mod types;
mod validation;

use anyhow::Result;
use artifact::ArtifactWriter;
use classifier::ClassifierGate;
use clap::Parser;
use detector::{Detector, OnnxDetector};
use frame_source::ImageSequenceSource;
use std::path::{Path, PathBuf};
use store::ViolationStore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use types::Config;
use validation::ValidationGate;

#[derive(Parser, Debug)]
#[command(name = "violation-detection")]
#[command(about = "Detect traffic violations in a frame stream and commit validated records")]
struct Args {
    /// Frame source: a directory of extracted frame images in filename
    /// order. Defaults to the sample source from the config.
    source: Option<PathBuf>,

    /// Config file path
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Suppress interactive display (accepted for front-end parity; this
    /// build is always headless)
    #[arg(long)]
    no_display: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "violation_detection={},ort=warn",
            config.logging.level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚦 Traffic Violation Detection System Starting");
    if args.no_display {
        info!("Interactive display suppressed");
    }
    info!("✓ Configuration loaded from {}", args.config);
    info!(
        "Tracked violations: {:?} | cooldown: {:.1}s",
        config.fines.keys().collect::<Vec<_>>(),
        config.detection.cooldown_sec
    );

    // Startup failures below are fatal: no loop is entered, nothing is
    // written, and the process exits non-zero.

    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
    for model in &config.models {
        detectors.push(Box::new(OnnxDetector::from_config(
            model,
            config.detection.iou_threshold,
        )?));
    }

    let source_dir = args
        .source
        .unwrap_or_else(|| PathBuf::from(&config.video.default_source));
    let mut source = ImageSequenceSource::open(&source_dir, config.video.fps)?;

    let gate = ClassifierGate::new(config.fines.clone(), config.detection.cooldown_sec);
    let mut artifacts = ArtifactWriter::new(
        Path::new(&config.artifacts.output_dir),
        &config.artifacts.prefix,
        config.artifacts.jpeg_quality,
    )?;
    let validator = ValidationGate::new(&config.validator)?;
    if validator.is_available() {
        info!("✓ External validator configured ({})", config.validator.model);
    } else {
        info!("⚪ No validator API key found - verdicts will be bypassed (fail-open)");
    }
    let record_store = ViolationStore::open(Path::new(&config.store.db_path))?;

    let stats = pipeline::run(
        &mut source,
        &mut detectors,
        &gate,
        &mut artifacts,
        &validator,
        &record_store,
    )
    .await?;

    info!("✅ End of stream reached");
    info!("  Frames processed: {}", stats.frames_processed);
    info!("  Candidates emitted: {}", stats.candidates_emitted);
    info!("  Artifacts written: {}", stats.artifacts_written);
    info!("  Verdicts rejected: {}", stats.verdicts_rejected);

    // The admin front end scrapes this exact line from stdout.
    println!("Total violations detected: {}", stats.violations_committed);

    Ok(())
}

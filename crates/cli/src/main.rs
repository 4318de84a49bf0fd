//! CLI entry point for vidshrink
//!
//! Parses command line arguments, loads configuration and runs one batch.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vidshrink::{check_encoder_available, BatchRunner, Config};

/// vidshrink - Resumable batch re-encoding of a folder of videos
#[derive(Parser, Debug)]
#[command(name = "vidshrink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder containing the videos to encode
    folder: PathBuf,

    /// Path to the configuration file
    #[arg(short, long, default_value = "vidshrink.toml")]
    config: PathBuf,

    /// Constant rate factor (0-63, higher means smaller output)
    #[arg(short, long)]
    quality: Option<u32>,

    /// Checkpoint file used to resume an interrupted batch
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Extension of the input files, e.g. mp4
    #[arg(short, long)]
    extension: Option<String>,

    /// Skip the encoder availability check
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// List what would be encoded without encoding anything
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Do not draw the progress bar
    #[arg(long, default_value = "false")]
    no_progress: bool,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(quality) = self.quality {
            config.encoder.quality = quality;
        }
        if let Some(checkpoint) = &self.checkpoint {
            config.batch.checkpoint_path = checkpoint.clone();
        }
        if let Some(extension) = &self.extension {
            config.batch.extension = extension.trim_start_matches('.').to_string();
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    args.apply_overrides(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
    } else {
        match check_encoder_available(&config.encoder.program) {
            Ok(banner) => info!(%banner, "encoder available"),
            Err(e) => {
                eprintln!("Startup check failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let runner = BatchRunner::new(&config, &args.folder).with_progress(!args.no_progress);

    if args.dry_run {
        return match runner.plan_only() {
            Ok(planned) => {
                for entry in &planned {
                    let status = if entry.done { "done" } else { "pending" };
                    println!(
                        "[{}] {} -> {}",
                        status,
                        entry.item.source_path.display(),
                        entry.item.output_path.display()
                    );
                }
                let pending = planned.iter().filter(|entry| !entry.done).count();
                println!("{} file(s) planned, {} to encode", planned.len(), pending);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to plan batch: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    match runner.run().await {
        Ok(report) => {
            println!("{}", report.summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Batch aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

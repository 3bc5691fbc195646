//! # Batch Image Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (su stderr)
//! - Caricamento dei task (JSON inline o file di handoff)
//! - Creazione del worker pool e avvio del batch
//!
//! ## Modalità:
//! - Batch: un array JSON di task (inline o via `--tasks-file`), processato
//!   dal worker pool; con `--json` ogni evento esce come riga NDJSON
//! - Singola immagine: `--input`/`--output` più flag di qualità/resize,
//!   stampa un solo risultato JSON
//!
//! ## Esempio di utilizzo:
//! ```bash
//! image-optimizer '[{"input":"a.png","output":"out/a.webp"}]' --workers 8 --json
//! image-optimizer --input photo.jpg --output out/photo.webp --quality 85
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use batch_image_optimizer::json_output::JsonMessage;
use batch_image_optimizer::settings::{ImageSettings, ResizeSettings};
use batch_image_optimizer::{
    ConsoleReporter, ImageCrateCodec, ImageOptimizer, ImageTask, JsonReporter, ProgressReporter,
    WorkerPool,
};

#[derive(Parser)]
#[command(name = "image-optimizer")]
#[command(about = "Batch image transcoding and resizing over a worker pool")]
struct Args {
    /// JSON array of tasks: [{"input": ..., "output": ..., "settings": ...}]
    tasks: Option<String>,

    /// Read the task array from this file instead; the file is deleted after
    /// a successful read (handoff file from a calling process)
    #[arg(long)]
    tasks_file: Option<PathBuf>,

    /// Number of parallel workers (default: number of CPU cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Emit newline-delimited JSON events on stdout instead of a progress bar
    #[arg(long)]
    json: bool,

    /// Single-image mode: source image path
    #[arg(long, conflicts_with = "tasks")]
    input: Option<PathBuf>,

    /// Single-image mode: destination path
    #[arg(long, requires = "input")]
    output: Option<PathBuf>,

    /// Quality (1-100); 100 selects the lossless preset
    #[arg(short, long, default_value = "90")]
    quality: u32,

    /// Output format: original, jpeg, png, webp, avif or tiff
    #[arg(short, long, default_value = "original")]
    format: String,

    /// Resize mode: none, width, height, longest, shortest
    #[arg(long, default_value = "none")]
    resize_mode: String,

    /// Target size in pixels for the constrained dimension
    #[arg(long)]
    size: Option<u32>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only results / NDJSON events.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.input.is_some() {
        return run_single(&args).await;
    }
    run_batch(&args).await
}

/// Optimizes one image and prints its result as a single JSON object.
async fn run_single(args: &Args) -> Result<()> {
    let input = args
        .input
        .as_ref()
        .ok_or_else(|| anyhow!("--input is required in single-image mode"))?;
    let output = args
        .output
        .as_ref()
        .ok_or_else(|| anyhow!("--output is required in single-image mode"))?;

    let mut settings = ImageSettings {
        output_format: args.format.clone(),
        resize: ResizeSettings {
            mode: args.resize_mode.clone(),
            size: args.size,
            maintain_aspect: true,
        },
        ..ImageSettings::default()
    };
    settings.quality.global = args.quality;

    let task = ImageTask {
        input_path: input.to_string_lossy().into_owned(),
        output_path: output.to_string_lossy().into_owned(),
        settings,
    };

    let optimizer = ImageOptimizer::new(Arc::new(ImageCrateCodec));
    match optimizer.optimize(&task).await {
        Ok(result) => {
            println!("{}", serde_json::to_string(&result)?);
            Ok(())
        }
        Err(e) => {
            if args.json {
                JsonMessage::Error {
                    message: e.to_string(),
                }
                .emit();
            }
            Err(e.into())
        }
    }
}

/// Loads the batch, runs it over the worker pool and reports the outcome.
async fn run_batch(args: &Args) -> Result<()> {
    let tasks = load_tasks(args)?;
    let total = tasks.len();

    let mut pool = WorkerPool::new(Arc::new(ImageCrateCodec), args.workers)?;
    info!("Starting batch: {} tasks, {} workers", total, pool.worker_count());

    let console = if args.json {
        None
    } else {
        Some(ConsoleReporter::new(total as u64))
    };
    let json_reporter = JsonReporter;
    let reporter: &dyn ProgressReporter = match &console {
        Some(console) => console,
        None => &json_reporter,
    };

    let outcome = pool.process_batch(tasks, reporter).await;
    pool.terminate();

    match outcome {
        Ok(output) => {
            let succeeded = output.results.iter().filter(|r| r.success).count();
            let saved: i64 = output
                .results
                .iter()
                .filter(|r| r.success)
                .map(|r| r.saved_bytes)
                .sum();
            let summary = format!(
                "{succeeded}/{total} images optimized, {} saved",
                batch_image_optimizer::utils::format_size(saved.max(0) as u64)
            );

            if args.json {
                JsonMessage::Complete {
                    results: output.results,
                    metrics: output.metrics,
                }
                .emit();
            } else if let Some(console) = &console {
                console.finish(&summary);
            }
            info!("{}", summary);
            Ok(())
        }
        Err(e) => {
            if args.json {
                JsonMessage::Error {
                    message: e.to_string(),
                }
                .emit();
            }
            Err(anyhow!("Batch rejected: {e}"))
        }
    }
}

/// Reads the task array from the inline argument or the handoff file.
///
/// The handoff file is removed after a successful parse so a crashed caller
/// cannot re-submit a stale batch.
fn load_tasks(args: &Args) -> Result<Vec<ImageTask>> {
    let raw = match (&args.tasks, &args.tasks_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read tasks file: {}", path.display()))?;
            content
        }
        (None, None) => {
            return Err(anyhow!(
                "No tasks given: pass a JSON array or --tasks-file (or --input for single-image mode)"
            ))
        }
    };

    let tasks: Vec<ImageTask> =
        serde_json::from_str(&raw).context("Tasks argument is not a valid JSON task array")?;

    if let (None, Some(path)) = (&args.tasks, &args.tasks_file) {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Could not remove tasks file {}: {}", path.display(), e);
        }
    }

    Ok(tasks)
}

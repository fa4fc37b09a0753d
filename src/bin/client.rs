//! Streaming Client
//!
//! Streams a WAV file through the processing service and writes the result.
//!
//! Usage: `relay-client <input.wav> <output.wav> [--config <path>] [--local]`
//!
//! `--local` runs the same transform pipeline in-process without a server.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcm_relay::{config::AppConfig, network, pipeline, transform};

struct Args {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    local: bool,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut local = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--local" => local = true,
            other if other.starts_with("--") => bail!("unknown option {}", other),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next()) {
        (Some(input), Some(output), None) => Ok(Args {
            input,
            output,
            config,
            local,
        }),
        _ => bail!("usage: relay-client <input.wav> <output.wav> [--config <path>] [--local]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;
    let config = AppConfig::load_or_default(args.config.as_deref())?;
    let start = Instant::now();

    if args.local {
        let transform = transform::from_config(&config.transform)?;
        let (input, output, pipeline_config) = (args.input.clone(), args.output.clone(), config.pipeline.clone());
        let summary = tokio::task::spawn_blocking(move || {
            pipeline::process_file(&input, &output, &pipeline_config, transform)
        })
        .await??;
        tracing::info!(
            "Processed {} chunks locally in {:.2?} (max reorder skew {})",
            summary.chunks,
            start.elapsed(),
            summary.reorder.max_skew
        );
        return Ok(());
    }

    let (input, output) = (args.input.clone(), args.output.clone());
    let report = tokio::task::spawn_blocking(move || network::stream_file(&config, &input, &output)).await??;
    if report.is_complete() {
        tracing::info!(
            "Wrote {} in {:.2?}: {}",
            args.output.display(),
            start.elapsed(),
            report.reassembly
        );
    } else {
        tracing::warn!(
            "Wrote incomplete {}: {} (missing {:?})",
            args.output.display(),
            report.reassembly,
            report.reassembly.missing
        );
    }
    Ok(())
}

//! PDF composition and compression CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_compose::file_ops::{read_input, read_inputs, write_artifact};
use pdf_compose::{
    compress_batch, compress_by_quality, compress_to_size, merge, parse_instructions, split,
    CompressOutcome, EngineConfig, Quality, SizeUnit, SplitRequest, TargetSize,
};
use std::path::{Path, PathBuf};

/// Merge, split and compress PDF files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose pages from several files into one PDF
    Merge {
        /// Input PDF files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Page instructions (JSON file); every page of every input when omitted
        #[arg(short, long)]
        instructions: Option<PathBuf>,

        /// Output file or directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Split one PDF into pages
    Split {
        input: PathBuf,

        /// Pages to split out, e.g. "1-3, 5"; every page when omitted
        #[arg(short, long, conflicts_with = "instructions")]
        pages: Option<String>,

        /// Page instructions (JSON file) composing a single extracted PDF
        #[arg(short, long)]
        instructions: Option<PathBuf>,

        /// Output file or directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Recompress images at a quality level
    Compress {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Quality, 0-100 or 0.0-1.0
        #[arg(short, long, default_value = "60")]
        quality: f64,

        /// Compress each input separately into a ZIP instead of merging them
        #[arg(long)]
        batch: bool,

        /// Page instructions (JSON file)
        #[arg(short, long, conflicts_with = "batch")]
        instructions: Option<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Recompress images until the output fits a size
    CompressSize {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target size
        #[arg(short, long)]
        size: u64,

        #[arg(short, long, value_enum, default_value = "kb")]
        unit: UnitArg,

        /// Page instructions (JSON file)
        #[arg(short, long)]
        instructions: Option<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum UnitArg {
    Kb,
    Mb,
}

impl From<UnitArg> for SizeUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Kb => SizeUnit::Kilobytes,
            UnitArg::Mb => SizeUnit::Megabytes,
        }
    }
}

fn read_instructions(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read instructions: {}", p.display()))
    })
    .transpose()
}

fn report(outcome: &CompressOutcome) {
    if let Some(preset) = outcome.preset {
        log::info!(
            "Preset: {} DPI, JPEG quality {}",
            preset.target_dpi,
            preset.jpeg_quality
        );
    }
    if let Some(report) = &outcome.report {
        log::info!(
            "Images: {} total, {} recompressed, {} unmodified, {} failed",
            report.total(),
            report.recompressed(),
            report.unmodified(),
            report.failed()
        );
    }
    if !outcome.budget_met {
        log::warn!("Target size not reached; wrote the smallest result found");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let (artifact, original_size, output) = match args.command {
        Command::Merge {
            inputs,
            instructions,
            output,
        } => {
            let files = read_inputs(&inputs)?;
            let instructions = read_instructions(instructions.as_deref())?;
            let artifact = merge(files, instructions.as_deref(), &config)
                .with_context(|| "Failed to merge PDFs")?;
            (artifact, None, output)
        }
        Command::Split {
            input,
            pages,
            instructions,
            output,
        } => {
            let (name, bytes) = read_input(&input)?;
            let request = match (pages, read_instructions(instructions.as_deref())?) {
                (Some(ranges), _) => SplitRequest::Ranges(ranges),
                (None, Some(json)) => SplitRequest::from_instructions(
                    parse_instructions(&json).context("Invalid page instructions")?,
                ),
                (None, None) => SplitRequest::Explode,
            };
            let artifact = split(&name, &bytes, request, &config)
                .with_context(|| format!("Failed to split {}", input.display()))?;
            (artifact, Some(bytes.len() as u64), output)
        }
        Command::Compress {
            inputs,
            quality,
            batch,
            instructions,
            output,
        } => {
            let quality = Quality::parse(quality)?;
            let files = read_inputs(&inputs)?;
            if batch {
                let artifact = compress_batch(files, quality, &config)
                    .with_context(|| "Failed to compress PDFs")?;
                (artifact, None, output)
            } else {
                let instructions = read_instructions(instructions.as_deref())?;
                let outcome = compress_by_quality(files, instructions.as_deref(), quality, &config)
                    .with_context(|| "Failed to compress PDFs")?;
                report(&outcome);
                (outcome.artifact, Some(outcome.original_size), output)
            }
        }
        Command::CompressSize {
            inputs,
            size,
            unit,
            instructions,
            output,
        } => {
            let files = read_inputs(&inputs)?;
            let instructions = read_instructions(instructions.as_deref())?;
            let target = TargetSize::new(size, unit.into());
            let outcome = compress_to_size(files, instructions.as_deref(), target, &config)
                .with_context(|| "Failed to compress PDFs")?;
            report(&outcome);
            (outcome.artifact, Some(outcome.original_size), output)
        }
    };

    let written = write_artifact(&artifact, &output)
        .with_context(|| format!("Failed to write output: {}", output.display()))?;

    match original_size {
        Some(original) => log::info!(
            "{} -> {} bytes, saved to {}",
            original,
            artifact.bytes.len(),
            written.display()
        ),
        None => log::info!("Saved {} bytes to {}", artifact.bytes.len(), written.display()),
    }

    Ok(())
}

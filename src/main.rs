use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use nori_tools::{
    nori_creator::create_file,
    nori_extractor::{ExtractOptions, NoriExtractor},
};

/// NORI sprite toolkit
#[derive(Parser)]
#[command(name = "nori")]
#[command(about = "Analyse, extract and create NORI sprite files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode NORI files and report their structure and quirks
    Analyze {
        /// NORI files to analyse
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write a JSON config next to each input
        #[arg(long)]
        config: bool,
    },

    /// Write the JSON config and one BMP per bitmap
    Extract {
        /// NORI file to extract
        file: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Also write PNG previews
        #[arg(long)]
        png: bool,

        /// Optimise the PNG previews with oxipng
        #[arg(long, requires = "png")]
        optimize: bool,
    },

    /// Build a NORI file from a JSON config and a BMP directory
    Create {
        /// JSON config written by `analyze --config` or `extract`
        config: PathBuf,

        /// Directory holding the BMP files, read in ascending name order
        bmp_dir: PathBuf,

        /// Output NORI file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { files, config } => analyze(&files, config),
        Commands::Extract {
            file,
            output,
            png,
            optimize,
        } => {
            let extractor = NoriExtractor::new(ExtractOptions {
                write_png: png,
                optimise_png: optimize,
            });
            extractor
                .extract_file(&file, &output)
                .with_context(|| format!("Failed to extract {}", file.display()))?;
            Ok(())
        }
        Commands::Create {
            config,
            bmp_dir,
            output,
        } => {
            create_file(&config, &bmp_dir, &output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            Ok(())
        }
    }
}

/// `RUST_LOG` directives when they parse, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Analyses each file on its own thread; every thread owns its document.
fn analyze(files: &[PathBuf], write_config: bool) -> Result<()> {
    let extractor = NoriExtractor::new(ExtractOptions::default());

    let failures = thread::scope(|scope| {
        let handles: Vec<_> = files
            .iter()
            .map(|path| {
                let extractor = &extractor;
                scope.spawn(move || {
                    extractor
                        .analyze_file(path, write_config)
                        .with_context(|| format!("Failed to analyse {}", path.display()))
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .filter(|result| match result {
                Ok(Ok(_)) => false,
                Ok(Err(e)) => {
                    error!("{:#}", e);
                    true
                }
                Err(_) => {
                    error!("Analysis thread panicked");
                    true
                }
            })
            .count()
    });

    if failures > 0 {
        bail!("{} of {} files failed", failures, files.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_log_filter_honours_quieter_levels() {
        assert_eq!(
            log_filter(Some("warn")).max_level_hint(),
            Some(LevelFilter::WARN)
        );
        assert_eq!(
            log_filter(Some("error")).max_level_hint(),
            Some(LevelFilter::ERROR)
        );
        assert_eq!(
            log_filter(Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            log_filter(Some("nori_tools=loudest")).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}

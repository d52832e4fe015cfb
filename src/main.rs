//! Main entry point for the s3unzip CLI application.
//!
//! Lists or extracts entries of a ZIP archive stored locally, behind an
//! HTTP(S) URL or in an S3-compatible bucket, fetching only the tail of
//! the archive and the byte ranges of the selected entries.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use s3unzip::cli::ArchiveLocation;
use s3unzip::zip::CatalogEntry;
use s3unzip::{Cli, Error, HttpRangeReader, LocalFileReader, ReadAt, ZipExtractor};
use s3unzip::{listing, output, pattern};

/// Writes `log` records to stderr, prefixed with their level.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level().as_str().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Application entry point.
///
/// All reads for one archive happen in sequence on a single thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(cli.log_level());
    }

    match cli.location()? {
        ArchiveLocation::Http(url) => {
            let reader = HttpRangeReader::new(url.clone())
                .await
                .with_context(|| format!("cannot open {url}"))?;
            let reader = Arc::new(reader);

            process_zip(reader.clone(), &cli).await?;

            if !cli.is_quiet() {
                eprintln!(
                    "\nTotal bytes transferred: {}",
                    format_size(reader.transferred_bytes())
                );
            }
        }
        ArchiveLocation::Local(path) => {
            let reader = LocalFileReader::new(&path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            process_zip(Arc::new(reader), &cli).await?;
        }
    }

    Ok(())
}

/// Process a ZIP archive based on CLI options.
///
/// # Arguments
///
/// * `reader` - A reader implementing the `ReadAt` trait for random access
/// * `cli` - Parsed command-line arguments
async fn process_zip<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let extractor = ZipExtractor::new(reader).with_buffer_size(cli.buffer_size);

    let catalog = extractor
        .catalog()
        .await
        .with_context(|| format!("cannot read the central directory of {}", cli.file))?;

    if cli.list {
        print!("{}", listing::render(&cli.file, &catalog));
        return Ok(());
    }

    if !cli.is_quiet() {
        println!("Archive:  {}", cli.file);
    }

    let selection = pattern::select(&catalog, &cli.files, &cli.exclude);
    if !cli.is_very_quiet() {
        for missing in selection.unmatched {
            eprintln!("{}", Error::NameNotFound(missing));
        }
    }

    for entry in selection.entries {
        extract_file(&extractor, entry, cli)
            .await
            .with_context(|| format!("cannot extract {}", entry.name))?;
    }

    Ok(())
}

/// Extract a single entry to stdout or to disk.
///
/// # Arguments
///
/// * `extractor` - The ZIP extractor instance
/// * `entry` - The catalog entry to extract
/// * `cli` - Parsed command-line arguments
///
/// In pipe mode the raw bytes of consecutive entries are concatenated.
async fn extract_file<R: ReadAt + 'static>(
    extractor: &ZipExtractor<R>,
    entry: &CatalogEntry,
    cli: &Cli,
) -> Result<()> {
    if cli.pipe {
        extractor.extract_to_stdout(entry).await?;
        return Ok(());
    }

    let Some(output_path) =
        output::output_path(&entry.name, cli.extract_dir.as_deref(), cli.junk_paths)
    else {
        if !cli.is_very_quiet() {
            eprintln!("Skipping: {} (unsafe path)", entry.name);
        }
        return Ok(());
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  inflating: {}", entry.name);
    }

    extractor.extract_to_file(entry, &output_path).await?;

    Ok(())
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

use clap::Parser;
use std::path::PathBuf;

use crate::error::Error;

#[derive(Parser, Debug)]
#[command(name = "s3unzip")]
#[command(version)]
#[command(
    about = "Extract files from a ZIP archive in object storage without downloading all of it",
    long_about = None
)]
#[command(after_help = "Examples:\n  \
  s3unzip -l https://host/bucket/archive.zip              list files in a remote ZIP\n  \
  s3unzip --endpoint https://host s3://bucket/a.zip '*.json'   extract matching files\n  \
  s3unzip -p data.zip report.csv | more                   send one file to a pipe")]
pub struct Cli {
    /// ZIP file path, HTTP(S) URL or s3://bucket/key
    #[arg(value_name = "ARCHIVE")]
    pub file: String,

    /// Files to extract, exact names or glob patterns (default: all)
    #[arg(value_name = "PATTERNS")]
    pub files: Vec<String>,

    /// List files
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Show diagnostics about unusual headers and fields
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Extract files to pipe, no messages
    #[arg(short = 'p', long = "pipe")]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "PATTERN", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Path-style endpoint that s3:// archives are fetched from
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Read-ahead size in bytes for each range request
    #[arg(long, value_name = "BYTES", default_value_t = crate::io::DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,
}

/// Where the archive bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLocation {
    Local(PathBuf),
    Http(String),
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_s3_url(&self) -> bool {
        self.file.starts_with("s3://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => log::LevelFilter::Error,
            (_, 0) => log::LevelFilter::Error,
            (_, 1) => log::LevelFilter::Warn,
            (_, 2) => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Resolve the ARCHIVE argument. `s3://bucket/key` becomes
    /// `<endpoint>/bucket/key`.
    pub fn location(&self) -> Result<ArchiveLocation, Error> {
        if self.is_http_url() {
            return Ok(ArchiveLocation::Http(self.file.clone()));
        }
        if !self.is_s3_url() {
            return Ok(ArchiveLocation::Local(PathBuf::from(&self.file)));
        }

        let invalid = |why| Error::InvalidLocation(self.file.clone(), why);
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| invalid("--endpoint is required for s3:// archives"))?;
        let path = &self.file["s3://".len()..];
        let (bucket, key) = path
            .split_once('/')
            .ok_or_else(|| invalid("expected s3://bucket/key"))?;
        if bucket.is_empty() || key.is_empty() {
            return Err(invalid("expected s3://bucket/key"));
        }

        Ok(ArchiveLocation::Http(format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            bucket,
            key
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("s3unzip").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn s3_urls_use_the_endpoint() {
        let cli = parse(&["--endpoint", "https://objects.example.com/", "s3://bkt/dir/a.zip"]);
        assert_eq!(
            cli.location().unwrap(),
            ArchiveLocation::Http("https://objects.example.com/bkt/dir/a.zip".into())
        );
    }

    #[test]
    fn s3_url_without_endpoint_is_rejected() {
        let cli = parse(&["s3://bkt/a.zip"]);
        assert!(matches!(cli.location(), Err(Error::InvalidLocation(..))));
        let cli = parse(&["--endpoint", "http://h", "s3://bkt"]);
        assert!(matches!(cli.location(), Err(Error::InvalidLocation(..))));
    }

    #[test]
    fn plain_paths_and_patterns() {
        let cli = parse(&["-l", "test1.zip", "somefile*.json", "b.txt"]);
        assert!(cli.list);
        assert_eq!(cli.location().unwrap(), ArchiveLocation::Local("test1.zip".into()));
        assert_eq!(cli.files, ["somefile*.json", "b.txt"]);
        assert_eq!(cli.buffer_size, crate::io::DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn quiet_and_verbose_levels() {
        assert_eq!(parse(&["a.zip"]).log_level(), log::LevelFilter::Error);
        assert_eq!(parse(&["-v", "a.zip"]).log_level(), log::LevelFilter::Warn);
        assert_eq!(parse(&["-vv", "a.zip"]).log_level(), log::LevelFilter::Debug);
        assert_eq!(parse(&["-qq", "-vv", "a.zip"]).log_level(), log::LevelFilter::Error);
        assert!(parse(&["-p", "a.zip"]).is_quiet());
    }
}

use std::io;

/// Failures raised by the byte-range transport.
///
/// These are surfaced unchanged from the reader that produced them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("HTTP request failed with status: {0}")]
    Status(reqwest::StatusCode),

    #[error("remote server does not support Range requests")]
    RangeUnsupported,

    #[error("remote server did not return Content-Length")]
    MissingLength,

    #[error("max retries exceeded ({0})")]
    RetriesExhausted(u32),

    #[error("invalid seek to a negative position ({0})")]
    InvalidSeek(i128),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("end-of-central-directory signature not found")]
    DirectoryNotFound,

    #[error("caution: filename not matched:  {0}")]
    NameNotFound(String),

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),

    #[error("invalid s3 location '{0}': {1}")]
    InvalidLocation(String, &'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedArchive(msg.into())
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            // Cursor reads over an in-memory record run out only when the record is truncated.
            io::ErrorKind::UnexpectedEof => Self::MalformedArchive(format!("truncated record: {e}")),
            _ => Self::Transport(TransportError::Io(e)),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(TransportError::Http(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

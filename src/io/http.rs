use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use crate::error::TransportError;

/// How often and how patiently a failed range request is repeated.
///
/// Timeouts, connection failures and the throttling statuses object stores
/// answer with under load (429, 500, 502, 503, 504) are retried with a
/// linearly growing delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    fn retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || matches!(status.as_u16(), 500 | 502 | 503 | 504)
    }
}

/// Reads byte ranges of an object behind an HTTP(S) URL.
///
/// Works against S3-compatible stores addressed path-style or through a
/// pre-signed URL, and against any web server honouring `Range` requests.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    retry: RetryPolicy,
}

impl HttpRangeReader {
    /// Open `url` and learn the object size.
    ///
    /// A HEAD request is tried first. Pre-signed URLs are only valid for
    /// GET, so when HEAD is refused or does not advertise byte ranges the
    /// size comes from a one-byte ranged GET instead.
    pub async fn new(url: String) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let size = match head_size(&client, &url).await? {
            Some(size) => size,
            None => probe_size(&client, &url).await?,
        };
        log::debug!("{url}: {size} bytes, ranges supported");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// GET `bytes=start-end`, retrying transient failures.
    async fn fetch(&self, start: u64, end: u64) -> Result<Response, TransportError> {
        let range = format!("bytes={start}-{end}");
        let mut attempt = 0;

        loop {
            let failure = match self.client.get(&self.url).header(RANGE, &range).send().await {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => return Ok(resp),
                // A full-body answer means the range was ignored.
                Ok(resp) if resp.status() == StatusCode::OK => {
                    return Err(TransportError::RangeUnsupported);
                }
                Ok(resp) if RetryPolicy::retryable_status(resp.status()) => {
                    format!("HTTP {}", resp.status())
                }
                Ok(resp) => return Err(TransportError::Status(resp.status())),
                Err(e) if e.is_timeout() || e.is_connect() => e.to_string(),
                Err(e) => return Err(e.into()),
            };

            attempt += 1;
            if attempt > self.retry.max_retries {
                return Err(TransportError::RetriesExhausted(self.retry.max_retries));
            }
            log::warn!(
                "range {range} failed ({failure}), retry {attempt}/{}",
                self.retry.max_retries
            );
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }
}

async fn head_size(client: &Client, url: &str) -> Result<Option<u64>, TransportError> {
    let resp = client.head(url).send().await?;
    let status = resp.status();

    if matches!(status, StatusCode::FORBIDDEN | StatusCode::METHOD_NOT_ALLOWED) {
        log::debug!("{url}: HEAD answered {status}, probing with GET");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(TransportError::Status(status));
    }

    let ranges = resp
        .headers()
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");
    if !ranges.contains("bytes") {
        return Ok(None);
    }

    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .map(Some)
        .ok_or(TransportError::MissingLength)
}

async fn probe_size(client: &Client, url: &str) -> Result<u64, TransportError> {
    let resp = client.get(url).header(RANGE, "bytes=0-0").send().await?;
    match resp.status() {
        StatusCode::PARTIAL_CONTENT => {}
        StatusCode::OK => return Err(TransportError::RangeUnsupported),
        status => return Err(TransportError::Status(status)),
    }

    resp.headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
        .map(|(_, _, total)| total)
        .ok_or(TransportError::MissingLength)
}

/// Parse `bytes <first>-<last>/<total>`.
fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let (range, total) = value.strip_prefix("bytes ")?.split_once('/')?;
    let (first, last) = range.split_once('-')?;
    Some((
        first.trim().parse().ok()?,
        last.trim().parse().ok()?,
        total.trim().parse().ok()?,
    ))
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let wanted = (end - offset + 1) as usize;
        let mut received = 0;

        // A server may answer with less than asked for; ask again for the rest.
        while received < wanted {
            let start = offset + received as u64;
            let resp = self.fetch(start, end).await?;

            let served_from = resp
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
                .map(|(first, _, _)| first);
            if served_from.is_some_and(|first| first != start) {
                return Err(TransportError::RangeUnsupported);
            }

            let bytes = resp.bytes().await?;
            if bytes.is_empty() {
                break;
            }
            let n = bytes.len().min(wanted - received);
            buf[received..received + n].copy_from_slice(&bytes[..n]);
            received += n;
            self.transferred_bytes.fetch_add(n as u64, Ordering::Relaxed);
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

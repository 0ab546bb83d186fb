//! HTTP retrieval with retry, backoff and transparent gzip handling
//!
//! The [`Fetcher`] trait is the seam between the pipeline and the network:
//! production uses [`HttpFetcher`], tests feed byte-exact fixtures through
//! [`MemoryFetcher`]. Bodies are never buffered whole; `open` returns a
//! [`ByteStream`] whose chunks flow through a bounded channel, and the
//! blocking parse stage reads them through a `std::io::Read` adapter,
//! optionally wrapped in a streaming gzip inflater.

use crate::config::FetchConfig;
use crate::domain::{FetchError, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use rand::Rng;
use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the chunk channel between the network task and the reader.
/// Bounds in-flight memory per open stream and applies backpressure to the
/// download when parsing falls behind.
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Result of a `head` probe
#[derive(Debug, Clone, Default)]
pub struct HeadInfo {
    /// Content-Length when the server reports one
    pub size: Option<u64>,
    /// Content-Encoding header, if any
    pub content_encoding: Option<String>,
}

/// Source of MRF bytes
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Opens a streaming body for the URL, retrying transient failures
    async fn open(&self, url: &str) -> Result<ByteStream>;

    /// Probes size and encoding without downloading the body
    async fn head(&self, url: &str) -> Result<HeadInfo>;
}

/// A streaming response body
///
/// Chunks arrive over a bounded channel from the network task. Convert into
/// a blocking reader with [`ByteStream::into_read`] before handing it to the
/// parse stage (which runs under `spawn_blocking`).
pub struct ByteStream {
    rx: mpsc::Receiver<std::result::Result<Vec<u8>, FetchError>>,
    gzip: bool,
}

impl ByteStream {
    /// Builds a stream from a pre-loaded body; used by [`MemoryFetcher`]
    pub fn from_bytes(body: Vec<u8>, gzip: bool) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // A capacity-1 channel always accepts the first send.
        let _ = tx.try_send(Ok(body));
        Self { rx, gzip }
    }

    /// True when the body will be gzip-inflated by `into_read`
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    /// Converts into a blocking reader, inflating gzip transparently.
    ///
    /// The returned reader parks on the chunk channel, so it must only be
    /// used from a blocking context (`tokio::task::spawn_blocking`).
    pub fn into_read(self) -> Box<dyn Read + Send> {
        let reader = ChannelReader {
            rx: self.rx,
            buffer: Vec::new(),
            pos: 0,
            finished: false,
        };
        if self.gzip {
            Box::new(GzDecoder::new(reader))
        } else {
            Box::new(reader)
        }
    }
}

/// Blocking `Read` over the chunk channel
struct ChannelReader {
    rx: mpsc::Receiver<std::result::Result<Vec<u8>, FetchError>>,
    buffer: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.pos < self.buffer.len() {
                let n = (self.buffer.len() - self.pos).min(out.len());
                out[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => {
                    self.buffer = chunk;
                    self.pos = 0;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                }
                None => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }
    }
}

/// Whether the payload should be gzip-inflated, by URL suffix or header
fn wants_gzip(url: &str, content_encoding: Option<&str>) -> bool {
    let path = url.split('?').next().unwrap_or(url);
    path.ends_with(".gz")
        || content_encoding
            .map(|e| e.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false)
}

/// Statuses worth retrying, per the usual throttling/outage set
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(
        status,
        reqwest::StatusCode::TOO_MANY_REQUESTS
            | reqwest::StatusCode::INTERNAL_SERVER_ERROR
            | reqwest::StatusCode::BAD_GATEWAY
            | reqwest::StatusCode::SERVICE_UNAVAILABLE
            | reqwest::StatusCode::GATEWAY_TIMEOUT
    )
}

/// Exponential backoff with jitter: doubles from the configured floor up to
/// the ceiling, then picks uniformly from the upper half of the window.
fn backoff_delay(attempt: usize, config: &FetchConfig) -> Duration {
    let exp = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(config.max_backoff_ms)
        .max(1);
    let jittered = rand::thread_rng().gen_range(exp / 2..=exp);
    Duration::from_millis(jittered)
}

/// HTTP fetcher backed by reqwest
///
/// Automatic content decompression is disabled so that `.gz` object-store
/// payloads and `Content-Encoding: gzip` responses take the same explicit
/// inflate path in [`ByteStream::into_read`].
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Creates a fetcher from retrieval configuration
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            // Idle timeout on the body; a whole-request deadline would kill
            // legitimate multi-GB transfers.
            .read_timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| FetchError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn send_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(url.to_string()).into());
        }

        let mut last_error: Option<FetchError> = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1, &self.config);
                tracing::warn!(
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                    "Retrying fetch"
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    let err = classify_transport_error(&e);
                    if err.is_transient() {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err.into());
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            let err = FetchError::from_status(status.as_u16(), url);
            if is_retryable_status(status) {
                last_error = Some(err);
                continue;
            }
            return Err(err.into());
        }

        Err(FetchError::RetriesExhausted {
            attempts: self.config.max_retries + 1,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }
        .into())
    }
}

impl FetchError {
    fn from_status(status: u16, url: &str) -> Self {
        if status >= 500 || status == 429 {
            FetchError::ServerError {
                status,
                message: url.to_string(),
            }
        } else {
            FetchError::ClientError {
                status,
                message: url.to_string(),
            }
        }
    }
}

fn classify_transport_error(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(e.to_string())
    } else if e.is_connect() {
        FetchError::ConnectionFailed(e.to_string())
    } else {
        FetchError::StreamInterrupted(e.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        let response = self.send_with_retry(url).await?;

        let content_encoding = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let gzip = wants_gzip(url, content_encoding.as_deref());

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let url_owned = url.to_string();
        tokio::spawn(async move {
            let mut response = response;
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        if tx.send(Ok(chunk.to_vec())).await.is_err() {
                            // Reader dropped; stop downloading.
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(url = %url_owned, error = %e, "Body stream interrupted");
                        let _ = tx
                            .send(Err(FetchError::StreamInterrupted(e.to_string())))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(ByteStream { rx, gzip })
    }

    async fn head(&self, url: &str) -> Result<HeadInfo> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let headers = response.headers();
        Ok(HeadInfo {
            size: headers
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            content_encoding: headers
                .get(reqwest::header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        })
    }
}

/// In-memory fetcher for tests and offline replays
///
/// Maps URLs to response bodies; `.gz` URLs are inflated exactly like HTTP
/// responses so fixtures exercise the real decompression path.
#[derive(Default)]
pub struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a body for a URL
    pub fn insert(&mut self, url: impl Into<String>, body: Vec<u8>) {
        self.bodies.insert(url.into(), body);
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        let body = self.bodies.get(url).ok_or_else(|| FetchError::ClientError {
            status: 404,
            message: url.to_string(),
        })?;
        Ok(ByteStream::from_bytes(body.clone(), wants_gzip(url, None)))
    }

    async fn head(&self, url: &str) -> Result<HeadInfo> {
        let body = self.bodies.get(url).ok_or_else(|| FetchError::ClientError {
            status: 404,
            message: url.to_string(),
        })?;
        Ok(HeadInfo {
            size: Some(body.len() as u64),
            content_encoding: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_wants_gzip() {
        assert!(wants_gzip("https://x/file.json.gz", None));
        assert!(wants_gzip("https://x/file.json.gz?sig=abc", None));
        assert!(wants_gzip("https://x/file.json", Some("gzip")));
        assert!(wants_gzip("https://x/file.json", Some("GZIP")));
        assert!(!wants_gzip("https://x/file.json", None));
        assert!(!wants_gzip("https://x/file.json?name=a.gz", None));
    }

    #[test]
    fn test_backoff_is_bounded() {
        let config = FetchConfig::default();
        for attempt in 0..20 {
            let d = backoff_delay(attempt, &config);
            assert!(d.as_millis() as u64 <= config.max_backoff_ms);
            assert!(d.as_millis() > 0);
        }
    }

    #[tokio::test]
    async fn test_memory_fetcher_round_trip() {
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert("https://x/a.json", b"{\"in_network\":[]}".to_vec());

        let stream = fetcher.open("https://x/a.json").await.unwrap();
        let body = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            stream.into_read().read_to_end(&mut out).unwrap();
            out
        })
        .await
        .unwrap();
        assert_eq!(body, b"{\"in_network\":[]}");

        assert!(fetcher.open("https://x/missing.json").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_fetcher_inflates_gz() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"in_network\":[]}").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut fetcher = MemoryFetcher::new();
        fetcher.insert("https://x/a.json.gz", compressed);

        let stream = fetcher.open("https://x/a.json.gz").await.unwrap();
        assert!(stream.is_gzip());
        let body = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            stream.into_read().read_to_end(&mut out).unwrap();
            out
        })
        .await
        .unwrap();
        assert_eq!(body, b"{\"in_network\":[]}");
    }
}

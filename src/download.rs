//! Resumable HTTP download engine.
//!
//! Streams response bytes into a sink (the open image file) and drives an
//! optional progress callback. Appears synchronous to the Worker: the
//! call blocks for the duration of the transfer, whatever the underlying
//! [`HttpClient`] implementation does internally.

use crate::error::DownloadOutcome;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Azure Blob REST API version required for `Range: bytes=N-` support on
/// older accounts.
const MS_BLOB_API_VERSION: &str = "2019-02-02";

/// Low-speed watchdog policy: abort if fewer than `limit_bytes_per_sec`
/// bytes, on average, arrive within the trailing `window`.
#[derive(Debug, Clone, Copy)]
pub struct LowSpeedPolicy {
    pub limit_bytes_per_sec: u64,
    pub window: Duration,
}

impl LowSpeedPolicy {
    #[must_use]
    pub fn from_config(config: &crate::config::AgentConfig) -> Self {
        Self {
            limit_bytes_per_sec: config.low_speed_limit_bytes_per_sec,
            window: Duration::from_secs(config.low_speed_window_secs),
        }
    }
}

/// Everything the Download Engine needs to issue one GET.
pub struct DownloadRequest {
    /// Effective URL, already including the `?sas` query string.
    pub effective_url: String,
    /// Byte offset to resume from; 0 means a fresh GET.
    pub resume_offset: u64,
    /// Low-speed watchdog thresholds for this request.
    pub low_speed: LowSpeedPolicy,
}

/// The HTTPS client capability, kept behind a trait so the Worker and
/// tests never depend on a concrete transport.
pub trait HttpClient: Send + Sync {
    /// Issues the GET described by `request`, writing each received chunk
    /// to `sink` and reporting cumulative bytes through `on_progress`.
    fn get(
        &self,
        request: &DownloadRequest,
        sink: &mut dyn Write,
        on_progress: &mut dyn FnMut(u64),
    ) -> DownloadOutcome;
}

/// Drives one resumable GET over any `Read` response body, enforcing the
/// low-speed watchdog and short-write detection uniformly regardless of
/// the concrete HTTP client behind it.
pub(crate) fn stream_body(
    mut body: impl Read,
    sink: &mut dyn Write,
    on_progress: &mut dyn FnMut(u64),
    low_speed: LowSpeedPolicy,
) -> DownloadOutcome {
    let mut buf = [0u8; 8192];
    let mut written: u64 = 0;
    let mut window: VecDeque<(Instant, usize)> = VecDeque::new();
    let start = Instant::now();

    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => return DownloadOutcome::Ok,
            Ok(n) => n,
            Err(e) => return DownloadOutcome::Io(e),
        };

        let now = Instant::now();
        window.push_back((now, n));
        while let Some(&(t, _)) = window.front() {
            if now.duration_since(t) > low_speed.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if now.duration_since(start) >= low_speed.window {
            let recent: u64 = window.iter().map(|&(_, b)| b as u64).sum();
            if recent < low_speed.limit_bytes_per_sec * low_speed.window.as_secs() {
                return DownloadOutcome::Timeout;
            }
        }

        match sink.write(&buf[..n]) {
            Ok(written_now) if written_now == n => {
                written += written_now as u64;
                on_progress(written);
            }
            Ok(_) => return DownloadOutcome::Write,
            Err(e) => return DownloadOutcome::Io(e),
        }
    }
}

/// Production [`HttpClient`] over `reqwest::blocking`.
pub struct ReqwestHttpClient {
    client: reqwest::blocking::Client,
}

impl ReqwestHttpClient {
    pub fn new(ca_bundle_pem: &[u8]) -> reqwest::Result<Self> {
        let cert = reqwest::Certificate::from_pem(ca_bundle_pem)?;
        let client = reqwest::blocking::Client::builder()
            .add_root_certificate(cert)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get(
        &self,
        request: &DownloadRequest,
        sink: &mut dyn Write,
        on_progress: &mut dyn FnMut(u64),
    ) -> DownloadOutcome {
        let mut builder = self
            .client
            .get(&request.effective_url)
            .header("x-ms-version", MS_BLOB_API_VERSION);

        if request.resume_offset > 0 {
            builder = builder.header("Range", format!("bytes={}-", request.resume_offset));
        }

        let response = match builder.send() {
            Ok(r) => r,
            Err(e) => {
                return e
                    .status()
                    .map(|s| DownloadOutcome::Http(s.as_u16()))
                    .unwrap_or_else(|| {
                        DownloadOutcome::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
                    })
            }
        };

        if !response.status().is_success() {
            return DownloadOutcome::Http(response.status().as_u16());
        }

        stream_body(response, sink, on_progress, request.low_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn generous_low_speed() -> LowSpeedPolicy {
        LowSpeedPolicy {
            limit_bytes_per_sec: 10,
            window: Duration::from_secs(30),
        }
    }

    #[test]
    fn clean_stream_returns_ok_and_writes_all_bytes() {
        let payload = vec![7u8; 4096];
        let mut out = Vec::new();
        let mut progress_calls = Vec::new();
        let outcome = stream_body(
            Cursor::new(payload.clone()),
            &mut out,
            &mut |p| progress_calls.push(p),
            generous_low_speed(),
        );
        assert!(matches!(outcome, DownloadOutcome::Ok));
        assert_eq!(out, payload);
        assert_eq!(*progress_calls.last().unwrap(), payload.len() as u64);
    }

    struct ShortWriteSink {
        cap: usize,
        written: usize,
    }
    impl Write for ShortWriteSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let remaining = self.cap.saturating_sub(self.written);
            let n = remaining.min(buf.len());
            self.written += n;
            Ok(n)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_write_aborts_as_write_error() {
        let payload = vec![1u8; 10_000];
        let mut sink = ShortWriteSink { cap: 100, written: 0 };
        let outcome = stream_body(Cursor::new(payload), &mut sink, &mut |_| {}, generous_low_speed());
        assert!(matches!(outcome, DownloadOutcome::Write));
    }

    struct FailingReader;
    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        }
    }

    #[test]
    fn read_error_maps_to_io_outcome() {
        let mut out = Vec::new();
        let outcome = stream_body(FailingReader, &mut out, &mut |_| {}, generous_low_speed());
        assert!(matches!(outcome, DownloadOutcome::Io(_)));
    }

    struct TrickleReader {
        remaining: usize,
    }
    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.remaining == 0 {
                return Ok(0);
            }
            std::thread::sleep(Duration::from_millis(5));
            buf[0] = 1;
            self.remaining -= 1;
            Ok(1)
        }
    }

    #[test]
    fn low_speed_below_threshold_aborts_as_timeout() {
        let body = TrickleReader { remaining: 100 };
        let mut out = Vec::new();
        let policy = LowSpeedPolicy {
            limit_bytes_per_sec: 1_000_000,
            window: Duration::from_millis(10),
        };
        let outcome = stream_body(body, &mut out, &mut |_| {}, policy);
        assert!(matches!(outcome, DownloadOutcome::Timeout));
    }
}

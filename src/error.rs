//! Error taxonomy for the OTA agent.
//!
//! The download/verify/apply pipeline produces several layers of outcome
//! codes (transport errors, local I/O errors, verification results). Each
//! layer gets its own small enum; the Worker folds all of them into the
//! single [`OtaError`] that the State Publisher exposes to callers.

use derive_more::{Display, Error, From};

/// Coarse, externally-visible error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum OtaError {
    /// SHA-256 mismatch after a complete download.
    #[display("sha-256 verification failed")]
    Verify,
    /// Non-2xx HTTP response.
    #[display("http error")]
    Http,
    /// Low-speed watchdog fired.
    #[display("download timed out")]
    Timeout,
    /// `ExtMCU.download()` returned failure.
    #[display("extmcu download failed")]
    McuDownload,
    /// Local filesystem read/write failure.
    #[display("local io error")]
    Io,
}

/// Result of a single [`crate::download`] attempt.
#[derive(Debug, Display, Error, From)]
pub enum DownloadOutcome {
    /// Clean end of stream; the caller still must compare sizes.
    #[display("download completed")]
    Ok,
    /// Low-speed watchdog fired: fewer than the configured minimum bytes
    /// arrived within the trailing window.
    #[display("download stalled below the low-speed watermark")]
    Timeout,
    /// The server returned a non-2xx status.
    #[display("http error, status {_0}")]
    Http(u16),
    /// The sink reported a short write.
    #[display("short write to local image file")]
    Write,
    /// Any other local I/O failure (open, seek, transport setup).
    #[display("io error: {_0}")]
    Io(std::io::Error),
}

impl From<DownloadOutcome> for Option<OtaError> {
    fn from(outcome: DownloadOutcome) -> Self {
        match outcome {
            DownloadOutcome::Ok => None,
            DownloadOutcome::Timeout => Some(OtaError::Timeout),
            DownloadOutcome::Http(_) => Some(OtaError::Http),
            DownloadOutcome::Write | DownloadOutcome::Io(_) => Some(OtaError::Io),
        }
    }
}

/// Result of [`crate::verify::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum VerifyOutcome {
    /// Digest matched.
    #[display("verification passed")]
    Pass,
    /// Digest did not match.
    #[display("verification failed")]
    Fail,
    /// Local read error while hashing.
    #[display("io error during verification")]
    Io,
}

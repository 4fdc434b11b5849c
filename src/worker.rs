//! The Worker: a single long-lived loop that composes every other module
//! into the OTA download/verify/apply state machine.
//!
//! One `Agent` value is built once at startup (no process-wide statics)
//! and handed to [`run`], which owns the `ProgressRecord` and the open
//! `ImageFile` for the duration of each request it processes. Producers
//! (Notice Intake, running on arbitrary threads) only ever touch
//! `Agent::queue` and `Agent::state`.

use crate::apply;
use crate::config::AgentConfig;
use crate::download::{DownloadRequest, HttpClient, LowSpeedPolicy};
use crate::error::{DownloadOutcome, OtaError, VerifyOutcome};
use crate::extmcu::ExtMcu;
use crate::fs::{Filesystem, ImageFile, MutableFile};
use crate::progress::ProgressRecord;
use crate::queue::{RequestQueue, UpdateRequest};
use crate::state::{Status, StatePublisher};
use crate::verify;
use std::io::{Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything the Worker needs, built once by the embedding application
/// and shared (via `Arc`) with whatever threads call [`crate::notice::submit`].
pub struct Agent {
    pub config: AgentConfig,
    pub fs: Arc<dyn Filesystem>,
    pub http: Arc<dyn HttpClient>,
    pub extmcu: Arc<dyn ExtMcu>,
    pub state: Arc<StatePublisher>,
    pub queue: Arc<RequestQueue>,
}

impl Agent {
    #[must_use]
    pub fn new(
        config: AgentConfig,
        fs: Arc<dyn Filesystem>,
        http: Arc<dyn HttpClient>,
        extmcu: Arc<dyn ExtMcu>,
    ) -> Self {
        let queue = Arc::new(RequestQueue::new(config.queue_capacity));
        Self {
            config,
            fs,
            http,
            extmcu,
            state: Arc::new(StatePublisher::new()),
            queue,
        }
    }
}

/// Runs the Worker loop until `shutdown` is observed set. `progress_file`
/// is the host-provided mutable file the `ProgressRecord` lives on;
/// the Worker owns it exclusively for the life of the process.
pub fn run<F: MutableFile>(agent: &Agent, progress_file: F, shutdown: &AtomicBool) {
    let mut progress = ProgressRecord::new(progress_file);

    while !shutdown.load(Ordering::Relaxed) {
        let req = agent.queue.dequeue();
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        process_one(agent, &mut progress, req, shutdown);
    }
}

/// One full pass through the state machine for a single dequeued request.
/// `shutdown` is rechecked between major sub-steps so a shutdown request
/// doesn't have to wait out an entire download; it never changes which
/// transition a completed sub-step takes, only whether the next one runs.
fn process_one<F: MutableFile>(
    agent: &Agent,
    progress: &mut ProgressRecord<F>,
    req: UpdateRequest,
    shutdown: &AtomicBool,
) {
    log::debug!(
        "checking ota: server version={}, url={}",
        req.version,
        req.url
    );

    let mut image = match agent.fs.open(&agent.config.image_path) {
        Ok(image) => image,
        Err(e) => {
            log::warn!("unable to open {}: {e}", agent.config.image_path);
            agent.state.set(Status::Error, Some(OtaError::Io));
            return;
        }
    };

    let (local_version, has_partial) = progress.read();
    let Plan {
        need_download,
        resume_offset,
        mut finish_download,
    } = plan_transfer(local_version, has_partial, &req, &mut *image);

    if need_download {
        if resume_offset == 0 {
            if let Err(e) = image.set_len(0) {
                log::warn!("truncating image file failed: {e}");
                agent.state.set(Status::Error, Some(OtaError::Io));
                return;
            }
            progress.write(req.version, false);
        }

        if let Err(e) = image.seek(SeekFrom::Start(resume_offset)) {
            log::warn!("seeking image file to {resume_offset} failed: {e}");
            agent.state.set(Status::Error, Some(OtaError::Io));
            return;
        }

        log::debug!("starting download from offset {resume_offset}");
        agent.state.set(Status::Downloading, None);

        let download_req = DownloadRequest {
            effective_url: req.effective_url(),
            resume_offset,
            low_speed: LowSpeedPolicy::from_config(&agent.config),
        };

        let outcome = agent.http.get(&download_req, &mut *image, &mut |written| {
            log::debug!("{written} bytes transferred");
        });

        match outcome {
            DownloadOutcome::Ok => finish_download = true,
            DownloadOutcome::Timeout => {
                log::info!("download interrupted: low-speed watchdog fired");
                agent.state.set(Status::Interrupted, Some(OtaError::Timeout));
            }
            DownloadOutcome::Http(status) => {
                log::info!("download interrupted: http status {status}");
                agent.state.set(Status::Interrupted, Some(OtaError::Http));
            }
            DownloadOutcome::Write | DownloadOutcome::Io(_) => {
                agent.state.set(Status::Error, Some(OtaError::Io));
            }
        }
    }

    if finish_download {
        finalize_download(agent, progress, &req, &mut *image);
    }

    if shutdown.load(Ordering::Relaxed) {
        return;
    }

    // Re-read: a good download just updated the record, and a prior
    // iteration may have left a `Completed` record whose apply step
    // still needs to run.
    let (local_version, has_partial) = progress.read();
    if !has_partial && agent.extmcu.get_version() < local_version {
        if let Err(e) = image.seek(SeekFrom::Start(0)) {
            log::warn!("seeking image file for apply failed: {e}");
            agent.state.set(Status::Error, Some(OtaError::Io));
            return;
        }
        let _ = apply::run(&*agent.extmcu, &agent.state, local_version, &mut *image);
    }
}

struct Plan {
    need_download: bool,
    resume_offset: u64,
    finish_download: bool,
}

/// Decides SKIP / RESUME / FRESH for the current request against whatever
/// progress was already on disk, per the branch table in the Worker's
/// state diagram.
fn plan_transfer(
    local_version: u32,
    has_partial: bool,
    req: &UpdateRequest,
    image: &mut dyn ImageFile,
) -> Plan {
    let mut need_download = true;
    let mut resume_offset: u64 = 0;
    let mut finish_download = false;

    if has_partial {
        if local_version > req.version {
            // A newer partial download is already in flight; don't roll back.
            need_download = false;
        } else if local_version == req.version {
            match image.size() {
                Ok(size) if size < u64::from(req.size) => resume_offset = size,
                Ok(size) if size == u64::from(req.size) => {
                    need_download = false;
                    finish_download = true;
                }
                Ok(_) => {
                    // Local file is larger than the expected size: treat as
                    // corruption, leave the record untouched, surface no error.
                    need_download = false;
                    log::warn!("local image larger than expected size; skipping");
                }
                Err(_) => resume_offset = 0,
            }
        }
        // local_version < req.version: abandon the stale partial and fall
        // through to a fresh download (resume_offset stays 0).
    } else if local_version >= req.version {
        // Already completed at or beyond the requested version: no downgrade.
        need_download = false;
    }

    Plan {
        need_download,
        resume_offset,
        finish_download,
    }
}

/// Verifies a just-completed (or already-on-disk-complete) image against
/// the expected size and digest, updating the progress record or
/// truncating the image on failure.
fn finalize_download<F: MutableFile>(
    agent: &Agent,
    progress: &mut ProgressRecord<F>,
    req: &UpdateRequest,
    image: &mut dyn ImageFile,
) {
    let size_matches = matches!(image.size(), Ok(size) if size == u64::from(req.size));
    if !size_matches {
        log::warn!("downloaded image size does not match expected size");
        let _ = image.set_len(0);
        agent.state.set(Status::Error, Some(OtaError::Verify));
        return;
    }

    match verify::check(image, &req.sha256_hex) {
        VerifyOutcome::Pass => {
            progress.write(req.version, true);
        }
        VerifyOutcome::Fail => {
            let _ = image.set_len(0);
            agent.state.set(Status::Error, Some(OtaError::Verify));
        }
        VerifyOutcome::Io => {
            agent.state.set(Status::Error, Some(OtaError::Io));
        }
    }
}

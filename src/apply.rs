//! Apply Coordinator.
//!
//! Runs once the Worker has seen a durable `Completed` record with no
//! partial image pending. Pushes the verified image into the ExtMCU only
//! when it is strictly behind the newly completed version.

use crate::error::OtaError;
use crate::extmcu::ExtMcu;
use crate::state::{Status, StatePublisher};
use std::io::Read;

/// Outcome of one apply attempt, for the Worker's own bookkeeping/logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// ExtMCU was already at or past `local_version`; nothing done.
    UpToDate,
    /// Push succeeded.
    Applied,
    /// Push failed; the `Completed` record is left intact so a future
    /// apply attempt can retry without re-downloading.
    Failed,
}

/// Applies `local_version` to `extmcu` if it is behind, publishing status
/// transitions on `state` as it goes.
pub fn run(
    extmcu: &dyn ExtMcu,
    state: &StatePublisher,
    local_version: u32,
    image: &mut dyn Read,
) -> ApplyOutcome {
    if extmcu.get_version() >= local_version {
        return ApplyOutcome::UpToDate;
    }

    state.set(Status::Applying, None);

    if extmcu.download(image) {
        state.set_applied_version(local_version);
        state.set(Status::Applied, None);
        ApplyOutcome::Applied
    } else {
        state.set(Status::Error, Some(OtaError::McuDownload));
        ApplyOutcome::Failed
    }
}

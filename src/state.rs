//! Thread-safe `{status, error, applied_version}` observable.
//!
//! A single `Mutex` guards the whole snapshot, including `applied_version`
//! alongside `status`/`error` so no field is ever read unsynchronized.
//! The "short critical section" contract holds: `get()` just locks,
//! clones, and unlocks.

use crate::error::OtaError;
use std::sync::Mutex;

/// Lifecycle status reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Downloading,
    Interrupted,
    Applying,
    Applied,
    Error,
    Invalid,
}

/// A point-in-time snapshot of the agent's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaState {
    pub status: Status,
    pub error: Option<OtaError>,
    pub applied_version: u32,
}

impl Default for OtaState {
    fn default() -> Self {
        Self {
            status: Status::Invalid,
            error: None,
            applied_version: 0,
        }
    }
}

/// Thread-safe holder for [`OtaState`]. Readers take a short critical
/// section and receive a copy; they never block a writer for longer than
/// a lock/clone/unlock.
#[derive(Default)]
pub struct StatePublisher {
    inner: Mutex<OtaState>,
}

impl StatePublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, status: Status, error: Option<OtaError>) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = status;
        inner.error = error;
    }

    #[must_use]
    pub fn get(&self) -> OtaState {
        *self.inner.lock().unwrap()
    }

    pub fn set_applied_version(&self, version: u32) {
        self.inner.lock().unwrap().applied_version = version;
    }

    #[must_use]
    pub fn get_applied_version(&self) -> u32 {
        self.inner.lock().unwrap().applied_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_invalid() {
        let sp = StatePublisher::new();
        let s = sp.get();
        assert_eq!(s.status, Status::Invalid);
        assert_eq!(s.error, None);
        assert_eq!(s.applied_version, 0);
    }

    #[test]
    fn set_and_get_round_trip() {
        let sp = StatePublisher::new();
        sp.set(Status::Error, Some(OtaError::Verify));
        let s = sp.get();
        assert_eq!(s.status, Status::Error);
        assert_eq!(s.error, Some(OtaError::Verify));
    }

    #[test]
    fn applied_version_is_monotonic_in_practice() {
        let sp = StatePublisher::new();
        sp.set_applied_version(2);
        sp.set_applied_version(5);
        assert_eq!(sp.get_applied_version(), 5);
    }
}

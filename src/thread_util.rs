//! Helper for spawning named threads.
//!
//! Thread names show up in panic messages and in `ps`/debugger output,
//! which matters for a long-lived agent that has exactly one Worker
//! thread plus whatever producer threads the embedding application adds.

use std::thread::{Builder, JoinHandle};

/// Spawns `f` on a new thread named `name`, panicking only if the OS
/// refuses to create the thread at all (an unrecoverable condition this
/// agent has no sensible fallback for).
pub fn spawn_named<F, T>(name: impl Into<String>, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Builder::new()
        .name(name.into())
        .spawn(f)
        .expect("failed to spawn thread")
}

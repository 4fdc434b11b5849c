//! Bounded, ring-lossy request queue.
//!
//! Producers (Notice Intake) never block: once the queue is full, the
//! oldest un-consumed slot is overwritten. The single consumer (the
//! Worker) blocks indefinitely on an empty queue.

use std::sync::{Condvar, Mutex};

/// A single update notice, owned end to end: allocated by Notice Intake,
/// transferred by value through the queue, released by the Worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub version: u32,
    pub size: u32,
    pub url: String,
    pub sas: String,
    pub sha256_hex: String,
}

impl UpdateRequest {
    /// Builds the effective blob URL: `url + "?" + sas`.
    pub fn effective_url(&self) -> String {
        format!("{}?{}", self.url, self.sas)
    }
}

struct QueueInner {
    slots: Vec<Option<UpdateRequest>>,
    wpos: usize,
    rpos: usize,
    len: usize,
}

/// Fixed-capacity FIFO. Capacity is 3 in production; parameterized here
/// for testability.
pub struct RequestQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
}

impl RequestQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(QueueInner {
                slots: vec![None; capacity],
                wpos: 0,
                rpos: 0,
                len: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueues `req`. Never blocks. Returns `true` if an unconsumed slot
    /// was overwritten (i.e. the queue was already full), purely so tests
    /// can observe the overwrite policy.
    pub fn enqueue(&self, req: UpdateRequest) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let capacity = inner.slots.len();
        let wpos = inner.wpos;
        // Dropping the previous occupant here (rather than a raw
        // overwrite) is what frees its owned strings before the new
        // request takes the slot.
        let overwrote = inner.slots[wpos].replace(req).is_some();
        inner.wpos = (wpos + 1) % capacity;
        if overwrote {
            // Queue was full: the write pointer lapped the read pointer,
            // so the oldest unconsumed entry was just discarded. Advance
            // rpos to match, and length stays at capacity.
            inner.rpos = (inner.rpos + 1) % capacity;
        } else {
            inner.len += 1;
        }
        drop(inner);
        self.not_empty.notify_one();
        overwrote
    }

    /// Blocks until a request is available, then returns it.
    #[must_use]
    pub fn dequeue(&self) -> UpdateRequest {
        let mut inner = self.inner.lock().unwrap();
        while inner.len == 0 {
            inner = self.not_empty.wait(inner).unwrap();
        }
        let rpos = inner.rpos;
        let capacity = inner.slots.len();
        let req = inner.slots[rpos].take().expect("slot marked filled but empty");
        inner.rpos = (rpos + 1) % capacity;
        inner.len -= 1;
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(version: u32) -> UpdateRequest {
        UpdateRequest {
            version,
            size: 1024,
            url: "https://h/f".into(),
            sas: "sig=x".into(),
            sha256_hex: "A".repeat(64),
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let q = RequestQueue::new(3);
        q.enqueue(req(1));
        q.enqueue(req(2));
        q.enqueue(req(3));
        assert_eq!(q.dequeue().version, 1);
        assert_eq!(q.dequeue().version, 2);
        assert_eq!(q.dequeue().version, 3);
    }

    #[test]
    fn overflow_overwrites_oldest_unconsumed_slot() {
        let q = RequestQueue::new(3);
        q.enqueue(req(1));
        q.enqueue(req(2));
        q.enqueue(req(3));
        let overwrote = q.enqueue(req(4));
        assert!(overwrote);
        // Exactly 3 survive: versions 2, 3, 4.
        assert_eq!(q.dequeue().version, 2);
        assert_eq!(q.dequeue().version, 3);
        assert_eq!(q.dequeue().version, 4);
    }

    #[test]
    fn effective_url_inserts_separator() {
        let r = req(1);
        assert_eq!(r.effective_url(), "https://h/f?sig=x");
    }

    #[test]
    fn dequeue_blocks_until_enqueue() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let q = Arc::new(RequestQueue::new(3));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue());

        thread::sleep(Duration::from_millis(50));
        q.enqueue(req(7));

        let got = handle.join().unwrap();
        assert_eq!(got.version, 7);
    }
}

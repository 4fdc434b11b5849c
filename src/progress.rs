//! Power-fail-safe persisted `{state, version}` record.
//!
//! The record lives on a host-provided mutable file, rewound and
//! overwritten in place on every write. Loss or corruption of the record
//! is never fatal: it degrades to "no prior progress" and costs at worst
//! a redundant re-download.

use crate::fs::MutableFile;
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, SeekFrom, Write};

/// Maximum on-disk size of one record.
const MAX_RECORD_LEN: usize = 50;

#[derive(Serialize, Deserialize)]
enum Record {
    Downloading(u32),
    Completed(u32),
}

/// Persisted download progress for a single image slot.
pub struct ProgressRecord<F: MutableFile> {
    file: F,
}

impl<F: MutableFile> ProgressRecord<F> {
    pub fn new(file: F) -> Self {
        Self { file }
    }

    /// Writes `{"Completed":V}` or `{"Downloading":V}`, rewinding first.
    ///
    /// The mutable file has no truncate operation, so a shorter record
    /// never erases a longer one it overwrites in place. A trailing NUL
    /// byte is written after the JSON; [`Self::read`] treats that NUL as
    /// the end of the document, which is what actually keeps stale bytes
    /// from a previous, longer write out of the parse.
    ///
    /// Best-effort: a write failure is logged and swallowed — the record
    /// is advisory, never load-bearing for correctness.
    pub fn write(&mut self, version: u32, done: bool) {
        let body = if done {
            format!("{{\"Completed\":{version}}}")
        } else {
            format!("{{\"Downloading\":{version}}}")
        };
        debug_assert!(body.len() + 1 <= MAX_RECORD_LEN);

        if let Err(e) = self.file.seek(SeekFrom::Start(0)) {
            log::warn!("progress record: seek failed: {e}");
            return;
        }
        if let Err(e) = self.file.write_all(body.as_bytes()).and_then(|()| self.file.write_all(&[0u8])) {
            log::warn!("progress record: write failed: {e}");
            return;
        }
        log::debug!("progress record: wrote {body}");
    }

    /// Reads back `(version, has_partial)`. Any failure — I/O error,
    /// empty file, unparseable JSON, or an absent/zero key — yields
    /// `(0, false)` without propagating an error.
    #[must_use]
    pub fn read(&mut self) -> (u32, bool) {
        if self.file.seek(SeekFrom::Start(0)).is_err() {
            return (0, false);
        }
        let mut buf = Vec::new();
        if self.file.read_to_end(&mut buf).is_err() || buf.is_empty() {
            return (0, false);
        }
        let doc = match buf.iter().position(|&b| b == 0) {
            Some(nul) => &buf[..nul],
            None => &buf[..],
        };
        let Ok(text) = std::str::from_utf8(doc) else {
            return (0, false);
        };
        match parse_record(text) {
            Some(Record::Downloading(v)) if v != 0 => (v, true),
            Some(Record::Completed(v)) if v != 0 => (v, false),
            _ => (0, false),
        }
    }
}

/// Parses the two permitted shapes. `version == 0` is treated as
/// "missing key" for both variants, so a record that somehow encodes a
/// zero version is indistinguishable from no record at all.
fn parse_record(text: &str) -> Option<Record> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;
    if let Some(v) = obj.get("Downloading").and_then(serde_json::Value::as_u64) {
        return Some(Record::Downloading(v as u32));
    }
    if let Some(v) = obj.get("Completed").and_then(serde_json::Value::as_u64) {
        return Some(Record::Completed(v as u32));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor() -> Cursor<Vec<u8>> {
        Cursor::new(Vec::new())
    }

    #[test]
    fn round_trips_downloading() {
        let mut rec = ProgressRecord::new(cursor());
        rec.write(2, false);
        assert_eq!(rec.read(), (2, true));
    }

    #[test]
    fn round_trips_completed() {
        let mut rec = ProgressRecord::new(cursor());
        rec.write(5, true);
        assert_eq!(rec.read(), (5, false));
    }

    #[test]
    fn empty_file_reads_as_absent() {
        let mut rec = ProgressRecord::new(cursor());
        assert_eq!(rec.read(), (0, false));
    }

    #[test]
    fn garbage_reads_as_absent() {
        let mut file = cursor();
        file.write_all(b"not json at all").unwrap();
        let mut rec = ProgressRecord::new(file);
        assert_eq!(rec.read(), (0, false));
    }

    #[test]
    fn zero_version_reads_as_absent() {
        let mut file = cursor();
        file.write_all(b"{\"Downloading\":0}").unwrap();
        let mut rec = ProgressRecord::new(file);
        assert_eq!(rec.read(), (0, false));
    }

    #[test]
    fn rewrite_rewinds_and_overwrites_in_place() {
        let mut rec = ProgressRecord::new(cursor());
        rec.write(2, false);
        rec.write(2, true);
        assert_eq!(rec.read(), (2, false));
    }

    #[test]
    fn shorter_write_over_longer_one_does_not_leak_stale_bytes() {
        // "Downloading" is longer than "Completed"; the mutable file has
        // no truncate, so the shrink must rely on the NUL terminator.
        let mut rec = ProgressRecord::new(cursor());
        rec.write(123, false);
        rec.write(123, true);
        assert_eq!(rec.read(), (123, false));
    }
}

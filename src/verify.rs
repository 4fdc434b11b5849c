//! Streaming SHA-256 verification of the stored image.
//!
//! Verification runs *after* the download completes, reading back from
//! flash rather than hashing in-line during receipt. That is deliberate:
//! it guarantees the verified bytes are the bytes actually persisted, so
//! a crash between socket-read and flash-program can never slip past
//! verification.

use crate::error::VerifyOutcome;
use sha2::{Digest, Sha256};
use std::io::{Read, Seek, SeekFrom};

/// Chunk size used while streaming the image through the hasher.
const CHUNK_SIZE: usize = 512;

/// Hashes `image` from offset 0 to EOF and compares against
/// `expected_hex` (64 uppercase hex characters).
///
/// `?Sized` so a `&mut dyn ImageFile` can be passed straight through
/// without an intermediate concrete type.
pub fn check<T: Read + Seek + ?Sized>(image: &mut T, expected_hex: &str) -> VerifyOutcome {
    if image.seek(SeekFrom::Start(0)).is_err() {
        return VerifyOutcome::Io;
    }

    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match image.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(_) => return VerifyOutcome::Io,
        }
    }

    let digest = hasher.finalize();
    let actual_hex = hex::encode_upper(digest);

    if actual_hex == expected_hex {
        VerifyOutcome::Pass
    } else {
        log::warn!("image verification failed, calculated sha256 = {actual_hex}");
        VerifyOutcome::Fail
    }
}

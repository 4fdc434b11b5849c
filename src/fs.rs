//! Filesystem capability boundary.
//!
//! The real device stores `ota.bin` on a SPI-flash chip through a
//! little-log-structured filesystem; that pairing is consumed here as a
//! black box behind the [`Filesystem`] trait. [`StdFilesystem`] is a
//! `std::fs`-rooted stand-in used for local development and the test
//! suite; production wiring swaps in a real flash-FS binding without
//! touching the Worker.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A single open image file: read/write/seek plus truncate-to-length.
pub trait ImageFile: Read + Write + Seek + Send {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
    fn size(&mut self) -> io::Result<u64>;
}

impl ImageFile for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn size(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }
}

/// Opens files by a well-known relative path (`ota.bin`) inside the local
/// flash filesystem. Creates on first open.
pub trait Filesystem: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn ImageFile>>;
}

/// `std::fs`-backed [`Filesystem`], rooted at a directory.
pub struct StdFilesystem {
    root: PathBuf,
}

impl StdFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

impl Filesystem for StdFilesystem {
    fn open(&self, path: &str) -> io::Result<Box<dyn ImageFile>> {
        let full = self.root.join(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(full)?;
        Ok(Box::new(file))
    }
}

/// The host-provided mutable file the [`crate::progress::ProgressRecord`]
/// lives on. Distinct from the flash filesystem: it persists across
/// reboots on a small reserved area outside the image's read-only package.
pub trait MutableFile: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> MutableFile for T {}

/// Resolves a path relative to the application's read-only image package
/// (stand-in for `Storage_GetAbsolutePathInImagePackage`), used to locate
/// the CA bundle.
#[must_use]
pub fn resolve_in_image_package(package_root: &Path, relpath: &str) -> PathBuf {
    package_root.join(relpath)
}

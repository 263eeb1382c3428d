//! Filesystem access for scanning.
//!
//! Scanning only ever needs a handful of read-only operations: listing a directory, checking a file's size or
//! existence, and reading (part of) a file. These are expressed by the [`FileAccess`] trait, so that the scanner,
//! classifier and initrd matcher can run against a real [`SimpleFileSystem`] through [`UefiFileSystem`] or against
//! an in-memory tree in tests.
//!
//! Any filesystem the firmware exposes through [`SimpleFileSystem`] can be scanned, including those provided by EFI
//! filesystem drivers loaded from the `drivers` directories.

use alloc::{boxed::Box, string::String, vec, vec::Vec};
use thiserror::Error;
use uefi::{
    Handle, Status,
    boot::{self, ScopedProtocol},
    fs::{COMMON_SKIP_DIRS, UefiDirectoryIter},
    proto::media::{
        file::{Directory, File, FileAttribute, FileInfo, FileMode, FileSystemVolumeLabel, RegularFile},
        fs::SimpleFileSystem,
    },
    runtime::Time,
};

use crate::system::helper::str_to_cstr;

#[cfg(test)]
pub mod mem;

/// The size of one gigabyte in bytes. Files bigger than this are never read whole.
pub(crate) const ONE_GIGABYTE: usize = 1024 * 1024 * 1024;

/// An error that may result from performing filesystem operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// A file or directory could not be opened.
    #[error("Failed to open file: {0}")]
    OpenErr(Status),

    /// A file could not be read.
    #[error("Failed to read file: {0}")]
    ReadErr(Status),

    /// The path could not be converted into a firmware string.
    #[error("Invalid path")]
    InvalidPath,

    /// Failed to get a volume label on a partition.
    #[error("Could not get volume label of a partition")]
    VolumeLabelErr,
}

impl FsError {
    /// The firmware status behind the error.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn status(&self) -> Status {
        match self {
            Self::OpenErr(status) | Self::ReadErr(status) => *status,
            Self::InvalidPath => Status::INVALID_PARAMETER,
            Self::VolumeLabelErr => Status::UNSUPPORTED,
        }
    }
}

/// A last-modification time reduced to a single comparable number of seconds.
///
/// Every month is counted as 31 days and every year as twelve such months from 1998. This is only ever used to order loaders within
/// one directory, so the approximation is harmless as long as it is monotonic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Builds a timestamp from calendar fields.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn from_parts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let years = year.saturating_sub(1998) as u64;
        Self(
            second as u64
                + minute as u64 * 60
                + hour as u64 * 3600
                + day as u64 * 86_400
                + month as u64 * 2_678_400
                + years * 32_140_800,
        )
    }

    /// Builds a timestamp from a firmware [`Time`].
    #[must_use = "Has no effect if the result is unused"]
    pub fn from_time(time: &Time) -> Self {
        Self::from_parts(
            time.year(),
            time.month(),
            time.day(),
            time.hour(),
            time.minute(),
            time.second(),
        )
    }
}

/// A single directory listing entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// The file name, without any directory component.
    pub name: String,

    /// The size recorded in the directory entry.
    pub size: u64,

    /// The last-modification time.
    pub modified: Timestamp,

    /// If the entry is a directory.
    pub is_dir: bool,
}

/// The result of listing a directory that could be opened.
///
/// Enumeration stops at the first entry the firmware fails to read. The entries before it are kept, and the failure
/// is reported alongside them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirListing {
    /// The entries read, in firmware enumeration order.
    pub entries: Vec<DirEntry>,

    /// The error that stopped the enumeration early.
    pub error: Option<FsError>,
}

/// Read-only access to the files of a single volume.
///
/// All paths are absolute, backslash separated and case-insensitive.
pub trait FileAccess {
    /// Lists a directory in firmware enumeration order, excluding `.` and `..`.
    ///
    /// A failure while reading entries ends the listing early and is recorded in [`DirListing::error`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the directory could not be opened.
    fn read_dir(&mut self, path: &str) -> Result<DirListing, FsError>;

    /// Returns the size reported by an opened file, or [`None`] if it could not be opened.
    fn file_size(&mut self, path: &str) -> Option<u64>;

    /// Checks if a file or directory exists.
    fn exists(&mut self, path: &str) -> bool;

    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the file could not be opened or read.
    fn read(&mut self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Reads at most `len` bytes from the start of a file.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the file could not be opened or read.
    fn read_head(&mut self, path: &str, len: usize) -> Result<Vec<u8>, FsError> {
        let mut content = self.read(path)?;
        content.truncate(len);
        Ok(content)
    }
}

/// A [`FileAccess`] implementation over [`SimpleFileSystem`].
pub struct UefiFileSystem(ScopedProtocol<SimpleFileSystem>);

impl UefiFileSystem {
    /// Create a new [`UefiFileSystem`] from a handle that supports [`SimpleFileSystem`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the handle does not actually support [`SimpleFileSystem`].
    pub fn from_handle(handle: Handle) -> uefi::Result<Self> {
        Ok(Self(boot::open_protocol_exclusive(handle)?))
    }

    /// Gets the volume label of the filesystem.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume could not be opened, or the volume does not support [`FileSystemVolumeLabel`]
    pub fn volume_label(&mut self) -> Result<String, FsError> {
        let mut root = self.root()?;
        let info = root
            .get_boxed_info::<FileSystemVolumeLabel>()
            .map_err(|_| FsError::VolumeLabelErr)?;
        Ok(String::from(info.volume_label()))
    }

    /// Opens the root directory of the volume.
    fn root(&mut self) -> Result<Directory, FsError> {
        self.0
            .open_volume()
            .map_err(|e| FsError::OpenErr(e.status()))
    }

    /// Gets a handle to a [`Directory`] in the filesystem.
    fn directory(&mut self, path: &str) -> Result<Directory, FsError> {
        let mut root = self.root()?;
        if path.is_empty() || path == "\\" {
            return Ok(root);
        }
        let path = str_to_cstr(path).map_err(|_| FsError::InvalidPath)?;
        root.open(&path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| FsError::OpenErr(e.status()))?
            .into_directory()
            .ok_or(FsError::OpenErr(Status::INVALID_PARAMETER))
    }

    /// Gets a handle to a [`RegularFile`] in the filesystem.
    fn regular_file(&mut self, path: &str) -> Result<RegularFile, FsError> {
        let mut root = self.root()?;
        let path = str_to_cstr(path).map_err(|_| FsError::InvalidPath)?;
        root.open(&path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| FsError::OpenErr(e.status()))?
            .into_regular_file()
            .ok_or(FsError::OpenErr(Status::INVALID_PARAMETER))
    }

    /// Reads up to `limit` bytes of a file.
    fn read_limited(&mut self, path: &str, limit: usize) -> Result<Vec<u8>, FsError> {
        let mut file = self.regular_file(path)?;
        let info = file
            .get_boxed_info::<FileInfo>()
            .map_err(|e| FsError::ReadErr(e.status()))?;
        let size = usize::try_from(info.file_size()).unwrap_or(ONE_GIGABYTE);

        let mut buf = vec![0; size.min(limit)];
        let read = file
            .read(&mut buf)
            .map_err(|e| FsError::ReadErr(e.status()))?;
        buf.truncate(read);
        Ok(buf)
    }
}

impl FileAccess for UefiFileSystem {
    fn read_dir(&mut self, path: &str) -> Result<DirListing, FsError> {
        let dir = self.directory(path)?;
        let mut listing = DirListing::default();
        for info in UefiDirectoryIter::new(dir) {
            // the firmware returns the failing entry again on every read
            let info: Box<FileInfo> = match info {
                Ok(info) => info,
                Err(e) => {
                    listing.error = Some(FsError::ReadErr(e.status()));
                    break;
                }
            };
            if COMMON_SKIP_DIRS.contains(&info.file_name()) {
                continue;
            }
            listing.entries.push(DirEntry {
                name: String::from(info.file_name()),
                size: info.file_size(),
                modified: Timestamp::from_time(info.modification_time()),
                is_dir: info.is_directory(),
            });
        }
        Ok(listing)
    }

    fn file_size(&mut self, path: &str) -> Option<u64> {
        let mut root = self.root().ok()?;
        let path = str_to_cstr(path).ok()?;
        let mut file = root
            .open(&path, FileMode::Read, FileAttribute::empty())
            .ok()?;
        file.get_boxed_info::<FileInfo>()
            .ok()
            .map(|info| info.file_size())
    }

    fn exists(&mut self, path: &str) -> bool {
        let Ok(mut root) = self.root() else {
            return false;
        };
        let Ok(path) = str_to_cstr(path) else {
            return false;
        };
        root.open(&path, FileMode::Read, FileAttribute::empty())
            .is_ok()
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        self.read_limited(path, ONE_GIGABYTE)
    }

    fn read_head(&mut self, path: &str, len: usize) -> Result<Vec<u8>, FsError> {
        self.read_limited(path, len)
    }
}

//! An in-memory [`FileAccess`] tree for tests.

use alloc::{
    borrow::ToOwned,
    string::{String, ToString},
    vec::Vec,
};

use uefi::Status;

use crate::{
    path::{basename, clean_path_slashes, eq_ci, find_path, starts_with_ci},
    system::fs::{DirEntry, DirListing, FileAccess, FsError, Timestamp},
};

/// A file stored in a [`MemFs`].
#[derive(Clone, Debug)]
struct MemFile {
    /// The cleaned absolute path.
    path: String,
    /// The file content.
    data: Vec<u8>,
    /// The modification time reported in listings.
    modified: Timestamp,
    /// A directory-entry size that differs from the content length.
    listed_size: Option<u64>,
}

/// A volume whose files live in memory, listed in insertion order.
#[derive(Clone, Debug, Default)]
pub struct MemFs {
    /// Every file, in insertion order.
    files: Vec<MemFile>,
    /// Directories whose listing fails.
    failing_dirs: Vec<(String, Status)>,
    /// Directories whose listing fails after a number of entries.
    failing_listings: Vec<(String, usize, Status)>,
}

impl MemFs {
    /// Creates an empty volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with a zero timestamp.
    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.with_dated_file(path, data, Timestamp::default())
    }

    /// Adds a file with a given modification time.
    pub fn with_dated_file(mut self, path: &str, data: &[u8], modified: Timestamp) -> Self {
        self.files.push(MemFile {
            path: clean_path_slashes(&normalize(path)),
            data: data.to_owned(),
            modified,
            listed_size: None,
        });
        self
    }

    /// Adds a file whose directory entry reports a different size than the opened file.
    pub fn with_alias(mut self, path: &str, data: &[u8], listed_size: u64) -> Self {
        self.files.push(MemFile {
            path: clean_path_slashes(&normalize(path)),
            data: data.to_owned(),
            modified: Timestamp::default(),
            listed_size: Some(listed_size),
        });
        self
    }

    /// Makes listing a directory fail with the given status.
    pub fn with_failing_dir(mut self, path: &str, status: Status) -> Self {
        self.failing_dirs
            .push((clean_path_slashes(&normalize(path)), status));
        self
    }

    /// Makes listing a directory fail with the given status after `after` entries were read.
    pub fn with_failing_listing(mut self, path: &str, after: usize, status: Status) -> Self {
        self.failing_listings
            .push((clean_path_slashes(&normalize(path)), after, status));
        self
    }

    /// Finds a file by path.
    fn file(&self, path: &str) -> Option<&MemFile> {
        let path = clean_path_slashes(&normalize(path));
        self.files.iter().find(|x| eq_ci(&x.path, &path))
    }

    /// Checks if any file lives below the path.
    fn is_dir(&self, path: &str) -> bool {
        let path = clean_path_slashes(&normalize(path));
        if path == "\\" {
            return true;
        }
        let prefix = alloc::format!("{path}\\");
        self.files.iter().any(|x| starts_with_ci(&x.path, &prefix))
    }
}

/// Prefixes a path with a backslash if it lacks one.
fn normalize(path: &str) -> String {
    if path.starts_with(['\\', '/']) {
        path.to_string()
    } else {
        alloc::format!("\\{path}")
    }
}

impl FileAccess for MemFs {
    fn read_dir(&mut self, path: &str) -> Result<DirListing, FsError> {
        let dir = clean_path_slashes(&normalize(path));
        if let Some((_, status)) = self.failing_dirs.iter().find(|(x, _)| eq_ci(x, &dir)) {
            return Err(FsError::OpenErr(*status));
        }
        if !self.is_dir(&dir) {
            return Err(FsError::OpenErr(Status::NOT_FOUND));
        }

        let prefix = if dir == "\\" {
            dir.clone()
        } else {
            alloc::format!("{dir}\\")
        };

        let mut entries: Vec<DirEntry> = Vec::new();
        for file in &self.files {
            if !starts_with_ci(&file.path, &prefix) {
                continue;
            }
            let rest = &file.path[prefix.len()..];
            let entry = match rest.split_once('\\') {
                Some((sub, _)) => DirEntry {
                    name: sub.to_string(),
                    size: 0,
                    modified: Timestamp::default(),
                    is_dir: true,
                },
                None => DirEntry {
                    name: rest.to_string(),
                    size: file
                        .listed_size
                        .unwrap_or(file.data.len() as u64),
                    modified: file.modified,
                    is_dir: false,
                },
            };
            if !entries.iter().any(|x| eq_ci(&x.name, &entry.name)) {
                entries.push(entry);
            }
        }

        let mut error = None;
        if let Some((_, after, status)) = self.failing_listings.iter().find(|(x, ..)| eq_ci(x, &dir)) {
            entries.truncate(*after);
            error = Some(FsError::ReadErr(*status));
        }
        Ok(DirListing { entries, error })
    }

    fn file_size(&mut self, path: &str) -> Option<u64> {
        self.file(path).map(|x| x.data.len() as u64)
    }

    fn exists(&mut self, path: &str) -> bool {
        self.file(path).is_some() || self.is_dir(path)
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        self.file(path)
            .map(|x| x.data.clone())
            .ok_or(FsError::OpenErr(Status::NOT_FOUND))
    }
}

#[test]
fn test_mem_listing() -> Result<(), FsError> {
    let mut fs = MemFs::new()
        .with_file("\\EFI\\BOOT\\bootx64.efi", b"MZ")
        .with_file("EFI/ubuntu/grubx64.efi", b"MZ")
        .with_file("\\vmlinuz", b"kernel");
    let root = fs.read_dir("\\")?.entries;
    assert_eq!(root.len(), 2);
    assert!(root[0].is_dir && root[0].name == "EFI");
    let efi = fs.read_dir("\\efi")?.entries;
    assert_eq!(efi.iter().map(|x| x.name.as_str()).collect::<Vec<_>>(), ["BOOT", "ubuntu"]);
    assert!(fs.exists("\\EFI\\Ubuntu\\GRUBX64.EFI"));
    assert_eq!(fs.read_dir("\\nope"), Err(FsError::OpenErr(Status::NOT_FOUND)));
    assert_eq!(basename(&fs.read_dir("\\EFI\\ubuntu")?.entries[0].name), "grubx64.efi");
    assert_eq!(find_path("\\vmlinuz"), "");
    Ok(())
}

#[test]
fn test_mem_failing_listing() -> Result<(), FsError> {
    let mut fs = MemFs::new()
        .with_file("\\EFI\\tools\\a.efi", b"MZ")
        .with_file("\\EFI\\tools\\b.efi", b"MZ")
        .with_file("\\EFI\\tools\\c.efi", b"MZ")
        .with_failing_listing("\\EFI\\tools", 1, Status::DEVICE_ERROR);
    let listing = fs.read_dir("\\EFI\\tools")?;
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name, "a.efi");
    assert_eq!(listing.error, Some(FsError::ReadErr(Status::DEVICE_ERROR)));
    assert_eq!(fs.read_dir("\\EFI")?.error, None);
    Ok(())
}

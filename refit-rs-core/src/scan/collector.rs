//! Collects EFI loaders from the directories of a volume.
//!
//! A volume is scanned in a fixed order: the Mac OS X and XOM loaders, the Microsoft boot manager, the root
//! directory, every directory below `\EFI`, the extra `also_scan_dirs`, and finally the fallback loader. Inside one
//! directory, candidates are sorted so that the most recently modified loader comes first.
//!
//! The fallback loader is usually a copy of a loader that was already found under its real name. It only gets its
//! own entry if no loader scanned before it has exactly the same content.

use alloc::{format, string::String, vec::Vec};

use log::{debug, warn};
use uefi::Status;

use crate::{
    boot::{arch, validate::is_valid_loader},
    entry::{
        Menu, MenuEntry,
        builder::LoaderEntryBuilder,
        cap_title,
        classify::{MAC_LOADER_PATH, set_loader_defaults},
        submenu::generate_submenu,
    },
    path::{
        basename, clean_path_slashes, contains_ci, eq_ci, find_extension, find_path, join_path, matches_any,
        split_volume_and_filename,
    },
    scan::{
        ScanContext,
        filter::{is_excluded_file, same_dir, should_scan},
    },
    system::fs::{DirEntry, FileAccess, Timestamp},
    volume::Volume,
};

/// File name patterns of EFI loaders.
pub const LOADER_MATCH_PATTERNS: &str = "*.efi,*.EFI";

/// File name patterns of Linux kernels without an `.efi` extension.
pub const LINUX_MATCH_PATTERNS: &str = "vmlinuz*,bzImage*";

/// The directory of the Mac OS X loader.
const MAC_DIR: &str = "\\System\\Library\\CoreServices";

/// The Windows XP on Mac loader.
const XOM_PATH: &str = "\\System\\Library\\CoreServices\\xom.efi";

/// The directory of the Microsoft boot manager.
const MICROSOFT_DIR: &str = "\\EFI\\Microsoft\\Boot";

/// The Boot Repair backup of the Microsoft boot manager.
const MICROSOFT_BACKUP_PATH: &str = "\\EFI\\Microsoft\\Boot\\bkpbootmgfw.efi";

/// The Microsoft boot manager.
const MICROSOFT_PATH: &str = "\\EFI\\Microsoft\\Boot\\bootmgfw.efi";

/// A loader found in a directory, waiting to be sorted.
struct Candidate {
    /// The full path of the loader.
    path: String,

    /// When the loader was last modified.
    modified: Timestamp,
}

/// Builds a loader entry with automatic classification, icon and submenu.
///
/// The title becomes "Boot `title` from `volume` ", or uses the loader path when there is no title. The trailing
/// space lets a search for one volume name skip over a longer name that starts with it.
pub fn loader_entry(ctx: &ScanContext<'_>, volume: &mut Volume, loader_path: &str, title: Option<&str>) -> MenuEntry {
    let path = clean_path_slashes(loader_path);
    let title = title.map_or_else(|| path.clone(), Into::into);
    let volume_name = volume.display_name().unwrap_or_default();

    let mut entry = LoaderEntryBuilder::new(&path)
        .title(cap_title(format!("Boot {title} from {volume_name} ")))
        .loader_title(title)
        .volume(volume)
        .build();

    set_loader_defaults(&mut entry, volume, ctx.config);
    generate_submenu(&mut entry, volume, ctx.config);
    entry
}

/// Adds a loader entry with automatic settings to the menu.
pub fn add_loader_entry(
    ctx: &ScanContext<'_>,
    volume: &mut Volume,
    loader_path: &str,
    title: Option<&str>,
    menu: &mut Menu,
) {
    let entry = loader_entry(ctx, volume, loader_path, title);
    debug!("Adding loader entry \"{}\"", entry.title);
    menu.add_entry(entry);
}

/// Checks if the file at `path` has exactly the content of the fallback loader, without being the fallback
/// loader itself.
pub fn duplicates_fallback(fs: &mut dyn FileAccess, path: &str) -> bool {
    let fallback = arch::fallback_path();
    let path = clean_path_slashes(path);
    if eq_ci(&path, &fallback) || !fs.exists(&path) || !fs.exists(&fallback) {
        return false;
    }

    match (fs.file_size(&path), fs.file_size(&fallback)) {
        (Some(a), Some(b)) if a == b => (),
        _ => return false,
    }

    match (fs.read(&path), fs.read(&fallback)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Checks if a directory entry reports a different size than the opened file.
///
/// Firmware has no symbolic links, but a link shows up exactly like this on the filesystems that have them. A file
/// that cannot be opened only counts as a link if its directory entry has a size.
fn is_symbolic_link(fs: &mut dyn FileAccess, path: &str, listed_size: u64) -> bool {
    match fs.file_size(path) {
        Some(size) => size != listed_size,
        None => listed_size != 0,
    }
}

/// Warns about a failed directory scan, unless the directory is just missing.
fn warn_scan_error(status: Status, dir: &str) {
    if status != Status::NOT_FOUND && status != Status::INVALID_PARAMETER {
        warn!("Error: {status} while scanning the {dir} directory");
    }
}

/// Lists a directory for scanning.
///
/// A listing that fails partway still returns the entries read before the failure.
fn list_dir(fs: &mut dyn FileAccess, dir: &str) -> Option<Vec<DirEntry>> {
    let listing = match fs.read_dir(dir) {
        Ok(listing) => listing,
        Err(e) => {
            warn_scan_error(e.status(), dir);
            return None;
        }
    };
    if let Some(e) = listing.error {
        warn_scan_error(e.status(), dir);
    }
    Some(listing.entries)
}

/// Checks if a signed copy, the same name with `.efi.signed` appended, sits next to the file.
fn has_signed_counterpart(fs: &mut dyn FileAccess, path: &str) -> bool {
    fs.exists(&format!("{path}.efi.signed"))
}

/// Scans one directory for loaders matching `patterns` and adds an entry for each of them.
///
/// Returns `true` if one of the loaders has exactly the content of the fallback loader.
pub fn scan_loader_dir(
    ctx: &ScanContext<'_>,
    volume: &mut Volume,
    index: usize,
    dir: &str,
    patterns: &str,
    menu: &mut Menu,
) -> bool {
    if !should_scan(ctx, volume, index, dir) {
        return false;
    }
    let Some(fs) = volume.fs() else {
        return false;
    };

    let Some(listing) = list_dir(fs, dir) else {
        return false;
    };

    let fallback_name = arch::fallback_basename();
    let mut found_fallback_duplicate = false;
    let mut candidates: Vec<Candidate> = Vec::new();

    for file in listing.iter().filter(|x| !x.is_dir && matches_any(&x.name, patterns)) {
        let extension = find_extension(&file.name);
        if file.name.starts_with('.')
            || eq_ci(extension, ".icns")
            || eq_ci(extension, ".png")
            || (eq_ci(&file.name, &fallback_name) && same_dir(dir, arch::FALLBACK_DIR))
            || contains_ci(&file.name, "shell")
            || is_excluded_file(volume, index, dir, &file.name, &ctx.config.dont_scan_files)
        {
            continue;
        }

        let path = join_path(dir, &file.name);
        let Some(fs) = volume.fs() else {
            break;
        };
        if is_symbolic_link(fs, &path, file.size) || has_signed_counterpart(fs, &path) {
            continue;
        }
        if !is_valid_loader(Some(&mut *fs), &path) {
            debug!("Skipping {path}, not a loader for this machine");
            continue;
        }

        if duplicates_fallback(fs, &path) {
            found_fallback_duplicate = true;
        }
        candidates.push(Candidate {
            path,
            modified: file.modified,
        });
    }

    // newest first, ties keep directory order
    candidates.sort_by(|a, b| b.modified.cmp(&a.modified));

    for candidate in &candidates {
        add_loader_entry(ctx, volume, &candidate.path, None, menu);
    }

    found_fallback_duplicate
}

/// Adds an entry for a loader at a fixed path, if it exists and its name is not excluded.
///
/// Returns `Some` with the fallback duplicate flag when an entry was added.
fn add_known_loader(
    ctx: &ScanContext<'_>,
    volume: &mut Volume,
    index: usize,
    path: &str,
    title: &str,
    menu: &mut Menu,
) -> Option<bool> {
    let dir = find_path(path);
    if is_excluded_file(volume, index, dir, basename(path), &ctx.config.dont_scan_files) {
        return None;
    }
    let fs = volume.fs()?;
    if !fs.exists(path) {
        return None;
    }
    let duplicate = duplicates_fallback(fs, path);
    add_loader_entry(ctx, volume, path, Some(title), menu);
    Some(duplicate)
}

/// Scans a whole volume for EFI loaders.
///
/// Only readable volumes with a name are scanned.
pub fn scan_efi_files(ctx: &ScanContext<'_>, volumes: &mut [Volume], index: usize, menu: &mut Menu) {
    let Some(volume) = volumes.get_mut(index) else {
        return;
    };
    if volume.fs.is_none() || volume.display_name().is_none() {
        return;
    }

    let patterns = if ctx.config.scan_all_linux_kernels {
        format!("{LOADER_MATCH_PATTERNS},{LINUX_MATCH_PATTERNS}")
    } else {
        String::from(LOADER_MATCH_PATTERNS)
    };
    let mut scan_fallback = true;

    if should_scan(ctx, volume, index, MAC_DIR) {
        for (path, title) in [(MAC_LOADER_PATH, "Mac OS X"), (XOM_PATH, "Windows XP (XoM)")] {
            if add_known_loader(ctx, volume, index, path, title, menu) == Some(true) {
                scan_fallback = false;
            }
        }
    }

    if should_scan(ctx, volume, index, MICROSOFT_DIR) {
        let backup = add_known_loader(
            ctx,
            volume,
            index,
            MICROSOFT_BACKUP_PATH,
            "Microsoft EFI boot (Boot Repair backup)",
            menu,
        );
        let title = if backup.is_some() {
            "Supposed Microsoft EFI boot (probably GRUB)"
        } else {
            "Microsoft EFI boot"
        };
        let main = add_known_loader(ctx, volume, index, MICROSOFT_PATH, title, menu);
        if backup == Some(true) || main == Some(true) {
            scan_fallback = false;
        }
    }

    if scan_loader_dir(ctx, volume, index, "\\", &patterns, menu) {
        scan_fallback = false;
    }

    for dir in efi_subdirs(volume) {
        if scan_loader_dir(ctx, volume, index, &dir, &patterns, menu) {
            scan_fallback = false;
        }
    }

    for dir in &ctx.config.also_scan_dirs {
        if !should_scan(ctx, volume, index, dir) {
            continue;
        }
        let (_, dir) = split_volume_and_filename(dir);
        let dir = clean_path_slashes(dir);
        if !dir.is_empty() && scan_loader_dir(ctx, volume, index, &join_path(&dir, ""), &patterns, menu) {
            scan_fallback = false;
        }
    }

    if ctx.is_self_volume(index)
        && volume
            .fs()
            .is_some_and(|fs| duplicates_fallback(fs, &ctx.self_image.path))
    {
        scan_fallback = false;
    }

    let fallback = arch::fallback_path();
    if scan_fallback
        && should_scan(ctx, volume, index, arch::FALLBACK_DIR)
        && volume.fs().is_some_and(|fs| fs.exists(&fallback))
    {
        add_loader_entry(ctx, volume, &fallback, Some("Fallback boot loader"), menu);
    }
}

/// Lists the directories below `\EFI` that may hold loaders.
///
/// `tools` is left out, since tools are found separately, and so are hidden directories.
fn efi_subdirs(volume: &mut Volume) -> Vec<String> {
    let Some(fs) = volume.fs() else {
        return Vec::new();
    };
    list_dir(fs, "\\EFI")
        .unwrap_or_default()
        .into_iter()
        .filter(|x| x.is_dir && !x.name.starts_with('.') && !eq_ci(&x.name, "tools"))
        .map(|x| join_path("\\EFI", &x.name))
        .collect()
}

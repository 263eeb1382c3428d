//! Decides which volumes, directories and files are scanned.
//!
//! Nothing here touches the filesystem, so the checks can run before a directory is opened, and on volumes that
//! cannot be read at all.

use crate::{
    path::{basename, clean_path_slashes, eq_ci, find_path, is_in, split_volume_and_filename, volume_number},
    scan::ScanContext,
    volume::Volume,
};

/// Checks if a `vol:` qualifier names the volume at `index`.
///
/// The qualifier is either a volume or partition name, or an `fsN` volume number.
#[must_use = "Has no effect if the result is unused"]
pub fn names_volume(qualifier: &str, volume: &Volume, index: usize) -> bool {
    if let Some(number) = volume_number(qualifier) {
        return number == index;
    }
    volume.name.as_deref().is_some_and(|x| eq_ci(x, qualifier))
        || volume.part_name.as_deref().is_some_and(|x| eq_ci(x, qualifier))
}

/// Compares two directory paths, ignoring case, separators and a leading backslash.
#[must_use = "Has no effect if the result is unused"]
pub fn same_dir(a: &str, b: &str) -> bool {
    eq_ci(relative(&clean_path_slashes(a)), relative(&clean_path_slashes(b)))
}

/// Drops the leading backslash of a cleaned path.
fn relative(path: &str) -> &str {
    path.trim_start_matches('\\')
}

/// Checks if the directory `path` of the volume at `index` may be scanned.
///
/// A directory is skipped when:
/// - the volume or its partition is listed in `dont_scan_volumes`
/// - it is the boot manager's own directory on the boot manager's own volume
/// - it carries a `vol:` qualifier that names another volume
/// - it is listed in `dont_scan_dirs`, with or without a qualifier naming this volume
#[must_use = "Has no effect if the result is unused"]
pub fn should_scan(ctx: &ScanContext<'_>, volume: &Volume, index: usize, path: &str) -> bool {
    let config = ctx.config;
    if volume
        .name
        .as_deref()
        .is_some_and(|x| is_in(x, &config.dont_scan_volumes))
        || volume
            .part_name
            .as_deref()
            .is_some_and(|x| is_in(x, &config.dont_scan_volumes))
    {
        return false;
    }

    if ctx.is_self_volume(index) && same_dir(path, &ctx.self_image.dir) {
        return false;
    }

    let (qualifier, path) = split_volume_and_filename(path);
    if qualifier.is_some_and(|x| !names_volume(x, volume, index)) {
        return false;
    }

    !config.dont_scan_dirs.iter().any(|excluded| {
        let (qualifier, excluded) = split_volume_and_filename(excluded);
        qualifier.is_none_or(|x| names_volume(x, volume, index)) && same_dir(excluded, path)
    })
}

/// Checks if the file `name` in directory `dir` is listed in `list`.
///
/// Entries of the list are either a bare file name, which matches in any directory, or a full path that may start
/// with a `vol:` qualifier.
#[must_use = "Has no effect if the result is unused"]
pub fn is_excluded_file<S: AsRef<str>>(volume: &Volume, index: usize, dir: &str, name: &str, list: &[S]) -> bool {
    list.iter().map(AsRef::as_ref).any(|excluded| {
        let (qualifier, excluded) = split_volume_and_filename(excluded);
        if qualifier.is_some_and(|x| !names_volume(x, volume, index)) {
            return false;
        }
        let excluded = clean_path_slashes(excluded);
        if excluded.contains('\\') {
            same_dir(find_path(&excluded), dir) && eq_ci(basename(&excluded), name)
        } else {
            eq_ci(&excluded, name)
        }
    })
}

// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Path and identity helpers.
//!
//! Firmware paths are backslash separated and case-insensitive. Everything here works on borrowed `&str` views
//! where possible, so callers keep ownership of the original string and the borrow checker ties the lifetime of
//! the result to it.

use alloc::{string::String, vec::Vec};

/// The maximum length a volume or option description is cut down to when shown as a title.
pub const MAX_DESCRIPTION_LEN: usize = 100;

/// Returns the final component of a path.
///
/// Both `\` and `/` are accepted as separators.
#[must_use = "Has no effect if the result is unused"]
pub fn basename(path: &str) -> &str {
    path.rfind(['\\', '/']).map_or(path, |idx| &path[idx + 1..])
}

/// Returns the directory portion of a path, without the trailing separator.
///
/// A file in the root directory yields an empty string.
#[must_use = "Has no effect if the result is unused"]
pub fn find_path(path: &str) -> &str {
    path.rfind(['\\', '/']).map_or("", |idx| &path[..idx])
}

/// Returns the name of the directory that directly contains the file at `path`.
#[must_use = "Has no effect if the result is unused"]
pub fn find_last_dir_name(path: &str) -> Option<&str> {
    let dir = basename(find_path(path));
    (!dir.is_empty()).then_some(dir)
}

/// Returns the extension of a filename including the leading dot, or an empty string.
#[must_use = "Has no effect if the result is unused"]
pub fn find_extension(path: &str) -> &str {
    let name = basename(path);
    name.rfind('.').map_or("", |idx| &name[idx..])
}

/// Returns the filename of a path with its extension removed.
#[must_use = "Has no effect if the result is unused"]
pub fn strip_extension(path: &str) -> &str {
    let name = basename(path);
    name.rfind('.').map_or(name, |idx| &name[..idx])
}

/// Normalizes the separators of a path.
///
/// Forward slashes become backslashes, doubled separators are collapsed, and any trailing separator is dropped
/// unless the path is the root directory itself.
#[must_use = "Has no effect if the result is unused"]
pub fn clean_path_slashes(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len());
    for ch in path.chars() {
        let ch = if ch == '/' { '\\' } else { ch };
        if ch == '\\' && cleaned.ends_with('\\') {
            continue;
        }
        cleaned.push(ch);
    }
    if cleaned.len() > 1 && cleaned.ends_with('\\') {
        cleaned.pop();
    }
    cleaned
}

/// Joins a directory and a filename with a single backslash.
#[must_use = "Has no effect if the result is unused"]
pub fn join_path(dir: &str, name: &str) -> String {
    let mut joined = String::with_capacity(dir.len() + name.len() + 2);
    if !dir.starts_with('\\') {
        joined.push('\\');
    }
    joined.push_str(dir);
    if !joined.ends_with('\\') {
        joined.push('\\');
    }
    joined.push_str(name.trim_start_matches(['\\', '/']));
    clean_path_slashes(&joined)
}

/// Splits an optional `volume:` qualifier off a path.
///
/// `"ESP:\EFI\tools"` yields `(Some("ESP"), "\EFI\tools")`, while an unqualified path yields `(None, path)`.
#[must_use = "Has no effect if the result is unused"]
pub fn split_volume_and_filename(path: &str) -> (Option<&str>, &str) {
    match path.split_once(':') {
        Some((volume, rest)) => (Some(volume), rest),
        None => (None, path),
    }
}

/// Resolves an `fsN` style volume qualifier into a volume index.
#[must_use = "Has no effect if the result is unused"]
pub fn volume_number(qualifier: &str) -> Option<usize> {
    let digits = qualifier
        .get(..2)
        .filter(|prefix| prefix.eq_ignore_ascii_case("fs"))
        .and_then(|_| qualifier.get(2..))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Returns the substring spanning from the first to the last ASCII digit of the filename.
///
/// This is the "version number" of a kernel or initial ramdisk, so `vmlinuz-5.10.0-rc1` yields `5.10.0-rc1`.
#[must_use = "Has no effect if the result is unused"]
pub fn find_numbers(path: &str) -> Option<&str> {
    let name = basename(path);
    let first = name.find(|c: char| c.is_ascii_digit())?;
    let last = name.rfind(|c: char| c.is_ascii_digit())?;
    Some(&name[first..=last])
}

/// Case-insensitive equality.
#[must_use = "Has no effect if the result is unused"]
pub fn eq_ci(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(a, b)| lower(a) == lower(b))
}

/// Case-insensitive substring search.
#[must_use = "Has no effect if the result is unused"]
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let haystack: Vec<char> = haystack.chars().map(lower).collect();
    let needle: Vec<char> = needle.chars().map(lower).collect();
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Case-insensitive prefix test.
#[must_use = "Has no effect if the result is unused"]
pub fn starts_with_ci(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .is_some_and(|start| eq_ci(start, prefix))
}

/// Returns true if `item` is equal to any of the elements of `list`, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn is_in<S: AsRef<str>>(item: &str, list: &[S]) -> bool {
    list.iter().any(|x| eq_ci(item, x.as_ref()))
}

/// Returns true if any non-empty element of `list` occurs somewhere in `item`, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn is_in_substring<S: AsRef<str>>(item: &str, list: &[S]) -> bool {
    list.iter()
        .map(AsRef::as_ref)
        .any(|x| !x.is_empty() && contains_ci(item, x))
}

/// Matches a name against a glob pattern, ignoring case.
///
/// `*` matches any run of characters and `?` matches exactly one character.
#[must_use = "Has no effect if the result is unused"]
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().map(lower).collect();
    let pattern: Vec<char> = pattern.chars().map(lower).collect();

    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Matches a name against a comma separated list of glob patterns.
#[must_use = "Has no effect if the result is unused"]
pub fn matches_any(name: &str, patterns: &str) -> bool {
    patterns
        .split(',')
        .map(str::trim)
        .any(|pattern| !pattern.is_empty() && matches_pattern(name, pattern))
}

/// Collapses runs of spaces, trims both ends and caps the length to `max` characters.
#[must_use = "Has no effect if the result is unused"]
pub fn limit_string_length(s: &str, max: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max));
    for word in s.split(' ').filter(|w| !w.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.chars().take(max).collect()
}

/// Lowercases a single character, keeping it a single character.
fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_components() {
        let path = "\\EFI\\ubuntu\\grubx64.efi";
        assert_eq!(basename(path), "grubx64.efi");
        assert_eq!(find_path(path), "\\EFI\\ubuntu");
        assert_eq!(find_last_dir_name(path), Some("ubuntu"));
        assert_eq!(find_extension(path), ".efi");
        assert_eq!(strip_extension(path), "grubx64");
        assert_eq!(find_last_dir_name("\\vmlinuz"), None);
        assert_eq!(find_path("vmlinuz"), "");
    }

    #[test]
    fn test_clean_path_slashes() {
        assert_eq!(clean_path_slashes("/EFI//BOOT/"), "\\EFI\\BOOT");
        assert_eq!(clean_path_slashes("\\"), "\\");
        assert_eq!(clean_path_slashes("//"), "\\");
        assert_eq!(clean_path_slashes("EFI\\tools"), "EFI\\tools");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("EFI\\BOOT", "bootx64.efi"), "\\EFI\\BOOT\\bootx64.efi");
        assert_eq!(join_path("\\", "vmlinuz"), "\\vmlinuz");
        assert_eq!(join_path("", "vmlinuz"), "\\vmlinuz");
    }

    #[test]
    fn test_split_volume() {
        assert_eq!(
            split_volume_and_filename("ESP:\\EFI\\tools"),
            (Some("ESP"), "\\EFI\\tools")
        );
        assert_eq!(split_volume_and_filename("\\EFI"), (None, "\\EFI"));
        assert_eq!(volume_number("fs3"), Some(3));
        assert_eq!(volume_number("FS12"), Some(12));
        assert_eq!(volume_number("fsx"), None);
        assert_eq!(volume_number("ESP"), None);
    }

    #[test]
    fn test_find_numbers() {
        assert_eq!(find_numbers("vmlinuz-5.10.0"), Some("5.10.0"));
        assert_eq!(find_numbers("initrd-5.10.0-rc1.img"), Some("5.10.0-rc1"));
        assert_eq!(find_numbers("\\boot7\\vmlinuz"), None);
        assert_eq!(find_numbers("bzImage-5.10.efi"), Some("5.10"));
    }

    #[test]
    fn test_matching() {
        assert!(matches_pattern("bootx64.EFI", "*.efi"));
        assert!(matches_pattern("vmlinuz-6.1", "vmlinuz*"));
        assert!(matches_pattern("initrd.img", "init*"));
        assert!(matches_pattern("a.efi", "?.efi"));
        assert!(!matches_pattern("ab.efi", "?.efi"));
        assert!(!matches_pattern("grub.cfg", "*.efi"));
        assert!(matches_any("bzImage", "*.efi,*.EFI,vmlinuz*,bzImage*"));
        assert!(is_in("SHIMX64.efi", &["shimx64.efi"]));
        assert!(is_in_substring("Boot Legacy OS from USB", &["usb"]));
        assert!(!is_in_substring("anything", &[""]));
        assert!(starts_with_ci("Start EFI Shell", "start "));
    }

    #[test]
    fn test_limit_string_length() {
        assert_eq!(limit_string_length("  WDC   WD10  ", 100), "WDC WD10");
        assert_eq!(limit_string_length("abcdef", 3), "abc");
    }

    proptest! {
        #[test]
        fn clean_never_doubles(s in "[a-zA-Z\\\\/]{0,64}") {
            let cleaned = clean_path_slashes(&s);
            prop_assert!(!cleaned.contains("\\\\"));
            prop_assert!(!cleaned.contains('/'));
        }

        #[test]
        fn star_matches_everything(s in "\\PC{0,32}") {
            prop_assert!(matches_pattern(&s, "*"));
        }

        #[test]
        fn numbers_are_bounded_by_digits(s in "[a-z0-9.\\-]{0,32}") {
            if let Some(numbers) = find_numbers(&s) {
                prop_assert!(numbers.starts_with(|c: char| c.is_ascii_digit()));
                prop_assert!(numbers.ends_with(|c: char| c.is_ascii_digit()));
            }
        }
    }
}

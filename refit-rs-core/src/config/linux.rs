//! Companion files read for Linux kernels with an EFI stub.
//!
//! A kernel's directory may hold an options file (`refit_linux.conf` or `refind_linux.conf`) with one boot option
//! set per line, written as quoted tokens:
//!
//! ```text
//! "Boot with standard options"  "root=/dev/sda2 ro quiet"
//! "Boot to single-user mode"    "root=/dev/sda2 ro single"
//! ```
//!
//! The first line provides the kernel's main options. On a Linux root filesystem, `etc\os-release` is used to guess
//! the distribution for the entry's icon.

use alloc::{
    borrow::ToOwned,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    config::{decode_text, tokenize_line},
    path::{contains_ci, eq_ci, find_path, join_path},
    system::fs::FileAccess,
};

/// Options file names, in lookup order.
pub const OPTIONS_FILE_NAMES: [&str; 2] = ["refit_linux.conf", "refind_linux.conf"];

/// Where a Linux root filesystem describes its distribution.
const OS_RELEASE_PATH: &str = "etc\\os-release";

/// The largest companion file that will be read.
const MAX_COMPANION_SIZE: usize = 16 * 1024;

/// A parsed options file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionsFile {
    /// Non-empty token lines, in file order.
    lines: Vec<Vec<String>>,
}

impl OptionsFile {
    /// Parses the contents of an options file. Comment and blank lines are dropped.
    #[must_use = "Has no effect if the result is unused"]
    pub fn parse(content: &[u8]) -> Self {
        let lines = decode_text(content)
            .map(|content| {
                content
                    .lines()
                    .map(tokenize_line)
                    .filter(|x| !x.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self { lines }
    }

    /// Reads the options file that sits next to the kernel at `loader_path`, if any.
    pub fn find(fs: &mut dyn FileAccess, loader_path: &str) -> Option<Self> {
        let dir = find_path(loader_path);
        OPTIONS_FILE_NAMES.iter().find_map(|name| {
            let path = join_path(dir, name);
            fs.read_head(&path, MAX_COMPANION_SIZE)
                .ok()
                .map(|x| Self::parse(&x))
        })
    }

    /// The title on the first line.
    #[must_use = "Has no effect if the result is unused"]
    pub fn first_title(&self) -> Option<&str> {
        self.lines.first()?.first().map(String::as_str)
    }

    /// The options on the first line.
    #[must_use = "Has no effect if the result is unused"]
    pub fn first_options(&self) -> Option<&str> {
        self.lines.first()?.get(1).map(String::as_str)
    }

    /// The `(title, options)` pairs after the first line.
    ///
    /// Iteration stops at the first line with fewer than two tokens.
    pub fn extra_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines
            .iter()
            .skip(1)
            .map_while(|x| match x.as_slice() {
                [title, options, ..] => Some((title.as_str(), options.as_str())),
                _ => None,
            })
    }
}

/// Appends `initrd=<initrd>` to `options`, unless the options already name an initrd.
#[must_use = "Has no effect if the result is unused"]
pub fn add_initrd_to_options(options: Option<&str>, initrd: Option<&str>) -> Option<String> {
    match (options, initrd) {
        (Some(options), Some(initrd)) if !contains_ci(options, "initrd=") => {
            if options.is_empty() {
                Some(alloc::format!("initrd={initrd}"))
            } else {
                Some(alloc::format!("{options} initrd={initrd}"))
            }
        }
        (None, Some(initrd)) => Some(alloc::format!("initrd={initrd}")),
        (options, _) => options.map(ToOwned::to_owned),
    }
}

/// Collects icon hints naming the Linux distribution of a kernel.
///
/// `ID` and `NAME` from `etc\os-release` come first, then guesses from the kernel's file name.
pub fn guess_distribution(fs: &mut dyn FileAccess, loader_path: &str) -> Vec<String> {
    let mut hints = Vec::new();

    if let Ok(content) = fs.read_head(OS_RELEASE_PATH, MAX_COMPANION_SIZE)
        && let Some(content) = decode_text(&content)
    {
        for tokens in content.lines().map(tokenize_line) {
            if let [key, value, ..] = tokens.as_slice()
                && (eq_ci(key, "ID") || eq_ci(key, "NAME"))
            {
                hints.push(value.clone());
            }
        }
    }

    if contains_ci(loader_path, ".fc") {
        hints.push("fedora".to_string());
    }
    if contains_ci(loader_path, ".el") {
        hints.push("redhat".to_string());
    }
    hints
}

// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`GlobalConfig`], the configuration file of the boot manager.
//!
//! The file is read from `refit-rs.conf` in the boot manager's own directory. Each line holds a key followed by
//! its values. Tokens are separated by spaces, tabs, `=` or `,`, and may be quoted to keep separators inside them.
//! Lines starting with `#` are comments, unknown keys are ignored.
//!
//! Example configuration:
//!
//! ```text
//! # Seconds before the default entry is booted, 0 waits forever
//! timeout 20
//!
//! # What to scan for, and in which order
//! scanfor internal,external,optical,manual
//!
//! # Skip these volumes, directories and files
//! dont_scan_volumes "Recovery HD"
//! dont_scan_dirs ESP:\EFI\debian,\EFI\old
//! dont_scan_files shimx64.efi,MokManager.efi
//!
//! # Hide submenu entries and pick what runs in graphics mode
//! hideui singleuser,safemode
//! use_graphics_for osx,linux
//!
//! # Tools row
//! showtools shell,gdisk,about,reboot,shutdown
//!
//! # A manual entry
//! menuentry "Arch Linux" ARCH:\vmlinuz-linux root=/dev/sda2 rw
//! ```

use alloc::{
    borrow::ToOwned,
    string::{String, ToString},
    vec,
    vec::Vec,
};

use bitflags::bitflags;
use log::{info, warn};

use crate::{
    path::{clean_path_slashes, eq_ci},
    system::fs::FileAccess,
};

pub mod linux;

/// The file name of the configuration file, looked up in the boot manager's own directory.
pub const CONFIG_FILE_NAME: &str = "refit-rs.conf";

/// The largest configuration file that will be read.
const MAX_CONFIG_SIZE: usize = 64 * 1024;

/// A category of boot targets to scan for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanCategory {
    /// EFI loaders on internal disks.
    Internal,

    /// EFI loaders on external disks.
    External,

    /// EFI loaders on optical discs.
    Optical,

    /// Manual `menuentry` stanzas from the configuration file.
    Manual,

    /// BIOS boot records on internal disks.
    LegacyInternal,

    /// BIOS boot records on external disks.
    LegacyExternal,

    /// BIOS boot records on optical discs.
    LegacyOptical,
}

impl ScanCategory {
    /// The scan order used when nothing was configured.
    pub const DEFAULT: &[Self] = &[Self::Internal, Self::External, Self::Optical, Self::Manual];

    /// The scan order used on Apple firmware when nothing was configured.
    pub const DEFAULT_MAC: &[Self] = &[
        Self::Internal,
        Self::LegacyInternal,
        Self::External,
        Self::LegacyExternal,
        Self::Optical,
        Self::LegacyOptical,
        Self::Manual,
    ];

    /// Parses a configuration token into a category.
    #[must_use = "Has no effect if the result is unused"]
    pub fn from_token(token: &str) -> Option<Self> {
        match &*token.to_ascii_lowercase() {
            "internal" => Some(Self::Internal),
            "external" => Some(Self::External),
            "optical" => Some(Self::Optical),
            "manual" => Some(Self::Manual),
            "hdbios" => Some(Self::LegacyInternal),
            "biosexternal" => Some(Self::LegacyExternal),
            "cd" => Some(Self::LegacyOptical),
            _ => None,
        }
    }

    /// Checks if the category scans for BIOS boot records.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_legacy(self) -> bool {
        matches!(
            self,
            Self::LegacyInternal | Self::LegacyExternal | Self::LegacyOptical
        )
    }
}

bitflags! {
    /// Parts of the UI that may be hidden.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct HideUi: u8 {
        /// Single-user and verbose boot submenu entries.
        const SINGLEUSER = 1 << 0;
        /// Safe mode submenu entries.
        const SAFEMODE = 1 << 1;
        /// Hardware test submenu entries.
        const HWTEST = 1 << 2;
        /// The boot options editor.
        const EDITOR = 1 << 3;
    }
}

bitflags! {
    /// OS families that are started in graphics mode instead of text mode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GraphicsFor: u8 {
        /// Mac OS X.
        const OSX = 1 << 0;
        /// Linux EFI stub kernels.
        const LINUX = 1 << 1;
        /// ELILO.
        const ELILO = 1 << 2;
        /// GRUB.
        const GRUB = 1 << 3;
        /// Windows.
        const WINDOWS = 1 << 4;
    }
}

impl Default for GraphicsFor {
    fn default() -> Self {
        Self::OSX
    }
}

/// A tool or action shown on the second row of the menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    /// The EFI shell.
    Shell,
    /// A memory tester.
    Memtest,
    /// The hybrid MBR tool.
    Gptsync,
    /// The GPT fdisk partitioning tool.
    Gdisk,
    /// The Apple recovery partition loader.
    AppleRecovery,
    /// The Windows recovery environment.
    WindowsRecovery,
    /// Machine owner key management utilities.
    MokTool,
    /// The about screen.
    About,
    /// Shut down the computer.
    Shutdown,
    /// Reboot the computer.
    Reboot,
    /// Reboot into the firmware setup utility.
    Firmware,
    /// Exit the boot manager.
    Exit,
}

impl ToolKind {
    /// The tools row used when nothing was configured.
    pub const DEFAULT: &[Self] = &[
        Self::Shell,
        Self::Memtest,
        Self::Gdisk,
        Self::AppleRecovery,
        Self::WindowsRecovery,
        Self::MokTool,
        Self::About,
        Self::Shutdown,
        Self::Reboot,
        Self::Firmware,
    ];

    /// Parses a configuration token into a tool.
    #[must_use = "Has no effect if the result is unused"]
    pub fn from_token(token: &str) -> Option<Self> {
        match &*token.to_ascii_lowercase() {
            "shell" => Some(Self::Shell),
            "memtest" | "memtest86" => Some(Self::Memtest),
            "gptsync" => Some(Self::Gptsync),
            "gdisk" => Some(Self::Gdisk),
            "apple_recovery" => Some(Self::AppleRecovery),
            "windows_recovery" => Some(Self::WindowsRecovery),
            "mok_tool" => Some(Self::MokTool),
            "about" => Some(Self::About),
            "shutdown" => Some(Self::Shutdown),
            "reboot" => Some(Self::Reboot),
            "firmware" => Some(Self::Firmware),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// A boot entry written by hand in the configuration file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManualEntry {
    /// The menu title.
    pub title: String,

    /// The volume the loader lives on, or [`None`] for the boot manager's own volume.
    pub volume: Option<String>,

    /// The path of the loader on the volume.
    pub loader: String,

    /// Options passed to the loader.
    pub options: Option<String>,
}

/// The configuration of the boot manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Seconds before the default entry is started. Zero waits forever.
    pub timeout: u32,

    /// The configured scan order, or [`None`] to pick one based on the firmware.
    pub scan_for: Option<Vec<ScanCategory>>,

    /// Volume or partition names that are never scanned.
    pub dont_scan_volumes: Vec<String>,

    /// Directories, optionally volume qualified, that are never scanned.
    pub dont_scan_dirs: Vec<String>,

    /// Loader file names that never become entries.
    pub dont_scan_files: Vec<String>,

    /// Extra directories scanned on every volume.
    pub also_scan_dirs: Vec<String>,

    /// Also scan for `vmlinuz*` and `bzImage*` files without an `.efi` extension.
    pub scan_all_linux_kernels: bool,

    /// UI elements that are hidden.
    pub hide_ui: HideUi,

    /// OS families started in graphics mode.
    pub graphics_for: GraphicsFor,

    /// The tools row, in display order.
    pub show_tools: Vec<ToolKind>,

    /// A substring of the title of the entry selected by default.
    pub default_selection: Option<String>,

    /// Seconds to wait before the initial scan, for slow disks.
    pub scan_delay: u32,

    /// Extra driver directories on the boot manager's volume.
    pub driver_dirs: Vec<String>,

    /// Loaders of the Windows recovery environment.
    pub windows_recovery_files: Vec<String>,

    /// Brings the firmware's legacy boot options in line with its BBS table before scanning.
    pub deep_legacy_scan: bool,

    /// Hand written boot entries.
    pub manual_entries: Vec<ManualEntry>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            timeout: 20,
            scan_for: None,
            dont_scan_volumes: Vec::new(),
            dont_scan_dirs: Vec::new(),
            dont_scan_files: [
                "shim.efi",
                "shim-fedora.efi",
                "shimx64.efi",
                "PreLoader.efi",
                "TextMode.efi",
                "ebounce.efi",
                "GraphicsConsole.efi",
                "MokManager.efi",
                "HashTool.efi",
                "HashTool-signed.efi",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            also_scan_dirs: vec!["boot".to_owned()],
            scan_all_linux_kernels: false,
            hide_ui: HideUi::empty(),
            graphics_for: GraphicsFor::default(),
            show_tools: ToolKind::DEFAULT.to_vec(),
            default_selection: None,
            scan_delay: 0,
            driver_dirs: Vec::new(),
            windows_recovery_files: vec!["EFI\\Microsoft\\Boot\\LrsBootmgr.efi".to_owned()],
            deep_legacy_scan: false,
            manual_entries: Vec::new(),
        }
    }
}

impl GlobalConfig {
    /// Reads the configuration file from a volume.
    ///
    /// Returns [`None`] if the file does not exist or cannot be read.
    pub fn load(fs: &mut dyn FileAccess, path: &str) -> Option<Self> {
        if !fs.exists(path) {
            info!("No configuration file at {path}");
            return None;
        }
        match fs.read_head(path, MAX_CONFIG_SIZE) {
            Ok(content) => Some(Self::parse(&content)),
            Err(e) => {
                warn!("Could not read {path}: {e}");
                None
            }
        }
    }

    /// Parses the contents of a configuration file.
    ///
    /// Content that is neither UTF-8 nor UTF-16 yields the default configuration.
    #[must_use = "Has no effect if the result is unused"]
    pub fn parse(content: &[u8]) -> Self {
        let mut config = Self::default();
        let Some(content) = decode_text(content) else {
            return config;
        };

        for line in content.lines() {
            let tokens = tokenize_line(line);
            let Some((key, values)) = tokens.split_first() else {
                continue;
            };
            config.apply(key, values, line);
        }

        config
    }

    /// Applies a single `key values...` line.
    fn apply(&mut self, key: &str, values: &[String], line: &str) {
        let first = values.first().map(String::as_str);
        match &*key.to_ascii_lowercase() {
            "timeout" => {
                if let Some(Ok(value)) = first.map(str::parse) {
                    self.timeout = value;
                }
            }
            "scanfor" => {
                self.scan_for = Some(
                    values
                        .iter()
                        .filter_map(|x| ScanCategory::from_token(x))
                        .collect(),
                );
            }
            "dont_scan_volumes" | "dont_scan_volume" => self.dont_scan_volumes = values.to_vec(),
            "dont_scan_dirs" | "dont_scan_dir" => {
                self.dont_scan_dirs = values.iter().map(|x| clean_path_slashes(x)).collect();
            }
            "dont_scan_files" | "dont_scan_file" => self.dont_scan_files = values.to_vec(),
            "also_scan_dirs" => {
                self.also_scan_dirs = values.iter().map(|x| clean_path_slashes(x)).collect();
            }
            "scan_all_linux_kernels" => self.scan_all_linux_kernels = parse_bool(first),
            "hideui" => {
                for value in values {
                    self.hide_ui |= match &*value.to_ascii_lowercase() {
                        "singleuser" => HideUi::SINGLEUSER,
                        "safemode" => HideUi::SAFEMODE,
                        "hwtest" => HideUi::HWTEST,
                        "editor" => HideUi::EDITOR,
                        "all" => HideUi::all(),
                        _ => HideUi::empty(),
                    };
                }
            }
            "use_graphics_for" => {
                self.graphics_for = GraphicsFor::empty();
                for value in values {
                    self.graphics_for |= match &*value.to_ascii_lowercase() {
                        "osx" => GraphicsFor::OSX,
                        "linux" => GraphicsFor::LINUX,
                        "elilo" => GraphicsFor::ELILO,
                        "grub" => GraphicsFor::GRUB,
                        "windows" => GraphicsFor::WINDOWS,
                        _ => GraphicsFor::empty(),
                    };
                }
            }
            "showtools" => {
                self.show_tools = values
                    .iter()
                    .filter_map(|x| ToolKind::from_token(x))
                    .collect();
            }
            "default_selection" => self.default_selection = first.map(ToOwned::to_owned),
            "scan_delay" => {
                if let Some(Ok(value)) = first.map(str::parse) {
                    self.scan_delay = value;
                }
            }
            "scan_driver_dirs" => {
                self.driver_dirs = values.iter().map(|x| clean_path_slashes(x)).collect();
            }
            "windows_recovery_files" => self.windows_recovery_files = values.to_vec(),
            "deep_legacy_scan" => self.deep_legacy_scan = parse_bool(first),
            "menuentry" => match parse_manual_entry(line) {
                Some(entry) => self.manual_entries.push(entry),
                None => warn!("Ignoring malformed menuentry: {line}"),
            },
            _ => (),
        }
    }

    /// Returns the effective scan order.
    ///
    /// Without a `scanfor` line the order depends on whether Apple legacy booting is available.
    #[must_use = "Has no effect if the result is unused"]
    pub fn scan_order(&self, mac_legacy: bool) -> &[ScanCategory] {
        match &self.scan_for {
            Some(order) => order,
            None if mac_legacy => ScanCategory::DEFAULT_MAC,
            None => ScanCategory::DEFAULT,
        }
    }

    /// Checks if a tool is enabled.
    #[must_use = "Has no effect if the result is unused"]
    pub fn shows(&self, tool: ToolKind) -> bool {
        self.show_tools.contains(&tool)
    }
}

/// Decodes a text file that is either UTF-8, or UTF-16LE with a byte order mark.
pub(crate) fn decode_text(content: &[u8]) -> Option<String> {
    if let Some(wide) = content.strip_prefix(&[0xff, 0xfe]) {
        let units = wide.chunks_exact(2).map(|x| u16::from_le_bytes([x[0], x[1]]));
        return char::decode_utf16(units).collect::<Result<String, _>>().ok();
    }
    let content = content.strip_prefix(&[0xef, 0xbb, 0xbf]).unwrap_or(content);
    core::str::from_utf8(content).ok().map(ToOwned::to_owned)
}

/// Parses a boolean token. Anything but `0`, `false`, `no` and `off` is true, including a missing value.
fn parse_bool(value: Option<&str>) -> bool {
    !value.is_some_and(|x| {
        ["0", "false", "no", "off"]
            .iter()
            .any(|no| eq_ci(x, no))
    })
}

/// Parses a `menuentry "Title" [volume:]\path\loader.efi [options...]` line.
///
/// The options are the rest of the line verbatim, so they may contain `=` and `,`.
fn parse_manual_entry(line: &str) -> Option<ManualEntry> {
    let rest = line.trim_start();
    let rest = rest.get("menuentry".len()..)?.trim_start();

    let (title, rest) = take_word(rest)?;
    let (loader, rest) = take_word(rest.trim_start())?;
    let options = rest.trim();

    let (volume, loader) = match loader.split_once(':') {
        Some((volume, loader)) => (Some(volume.to_owned()), loader),
        None => (None, loader.as_str()),
    };

    Some(ManualEntry {
        title,
        volume,
        loader: clean_path_slashes(loader),
        options: (!options.is_empty()).then(|| options.to_owned()),
    })
}

/// Takes a single space delimited, possibly quoted, word off the start of `s`.
fn take_word(s: &str) -> Option<(String, &str)> {
    if let Some(quoted) = s.strip_prefix('"') {
        let end = quoted.find('"')?;
        return Some((quoted[..end].to_owned(), &quoted[end + 1..]));
    }
    let end = s.find([' ', '\t']).unwrap_or(s.len());
    (end > 0).then(|| (s[..end].to_owned(), &s[end..]))
}

/// Splits a configuration line into tokens.
///
/// Separators are space, tab, `=` and `,` outside of double quotes. Quotes are removed. A line whose first
/// non-blank character is `#` has no tokens.
#[must_use = "Has no effect if the result is unused"]
pub fn tokenize_line(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.starts_with('#') {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            ' ' | '\t' | '=' | ',' if !in_quotes => {
                if has_token {
                    tokens.push(core::mem::take(&mut current));
                    has_token = false;
                }
            }
            _ => {
                current.push(ch);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

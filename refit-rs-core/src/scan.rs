// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Builds the main menu by scanning for boot targets.
//!
//! Scanning runs category by category in the configured order (see [`GlobalConfig::scan_order`]). Every category
//! appends to the same [`Menu`], so the order of categories is also the order of entries. Once everything has been
//! scanned, the first primary entries receive their digit shortcuts.
//!
//! Failures while scanning only ever affect one directory or volume. They are logged and the scan moves on.

use alloc::string::String;

use log::warn;

use crate::{
    config::{GlobalConfig, ScanCategory},
    entry::Menu,
    legacy::{self, LegacyStrategy, bbs::BootOption},
    volume::{DiskKind, Volume},
};

pub mod collector;
pub mod filter;
pub mod manual;
pub mod tools;

/// Where the boot manager itself was loaded from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelfImage {
    /// The index of the boot manager's volume, if it is one of the scanned volumes.
    pub volume: Option<usize>,

    /// The directory holding the boot manager, like `\EFI\refit`.
    pub dir: String,

    /// The full path of the boot manager's own image.
    pub path: String,
}

/// Everything a scan reads besides the volumes themselves.
#[derive(Clone, Copy, Debug)]
pub struct ScanContext<'a> {
    /// The configuration.
    pub config: &'a GlobalConfig,

    /// The location of the boot manager.
    pub self_image: &'a SelfImage,

    /// How legacy targets are found, if at all.
    pub legacy: Option<LegacyStrategy>,

    /// The firmware's boot options, for the standards-based legacy scan.
    pub boot_options: &'a [BootOption],
}

impl<'a> ScanContext<'a> {
    /// Creates a context without legacy support.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new(config: &'a GlobalConfig, self_image: &'a SelfImage) -> Self {
        Self {
            config,
            self_image,
            legacy: None,
            boot_options: &[],
        }
    }

    /// Checks if the volume at `index` is the boot manager's own volume.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_self_volume(&self, index: usize) -> bool {
        self.self_image.volume == Some(index)
    }
}

/// Scans every configured category and fills `menu` with the results.
///
/// Digit shortcuts are assigned once every category has run.
pub fn scan_for_bootloaders(ctx: &ScanContext<'_>, volumes: &mut [Volume], menu: &mut Menu) {
    let order = ctx
        .config
        .scan_order(ctx.legacy == Some(LegacyStrategy::Mac));

    for category in order {
        match category {
            ScanCategory::Internal => scan_efi_volumes(ctx, volumes, DiskKind::Internal, menu),
            ScanCategory::External => scan_efi_volumes(ctx, volumes, DiskKind::External, menu),
            ScanCategory::Optical => scan_efi_volumes(ctx, volumes, DiskKind::Optical, menu),
            ScanCategory::Manual => manual::scan_manual_entries(ctx, volumes, menu),
            ScanCategory::LegacyInternal => scan_legacy(ctx, volumes, DiskKind::Internal, menu),
            ScanCategory::LegacyExternal => scan_legacy(ctx, volumes, DiskKind::External, menu),
            ScanCategory::LegacyOptical => scan_legacy(ctx, volumes, DiskKind::Optical, menu),
        }
    }

    menu.assign_digit_shortcuts();
}

/// Scans every readable volume of one disk kind for EFI loaders.
fn scan_efi_volumes(ctx: &ScanContext<'_>, volumes: &mut [Volume], kind: DiskKind, menu: &mut Menu) {
    for index in 0..volumes.len() {
        if volumes[index].disk_kind == kind {
            collector::scan_efi_files(ctx, volumes, index, menu);
        }
    }
}

/// Scans for legacy targets of one disk kind with whatever strategy the firmware supports.
fn scan_legacy(ctx: &ScanContext<'_>, volumes: &[Volume], kind: DiskKind, menu: &mut Menu) {
    match ctx.legacy {
        Some(LegacyStrategy::Mac) => legacy::scan_legacy_volumes(ctx.config, volumes, kind, menu),
        Some(LegacyStrategy::Firmware) => {
            legacy::scan_legacy_firmware(ctx.config, ctx.boot_options, kind, menu);
        }
        None => warn!("Legacy scanning requested, but this firmware cannot boot legacy targets"),
    }
}

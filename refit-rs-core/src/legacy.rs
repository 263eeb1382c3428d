// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Legacy (BIOS) boot support.
//!
//! Two strategies exist, and at most one of them is used for a run:
//!
//! - [`LegacyStrategy::Mac`] is for Apple firmware. Every volume carrying boot code gets an entry, and booting one
//!   starts Apple's legacy loader from a table of known device paths (see [`mac`]).
//! - [`LegacyStrategy::Firmware`] is for firmware with a compatibility support module. The legacy entries of the
//!   firmware's own boot option table are offered, and booting one hands it to the Legacy BIOS protocol (see
//!   [`bbs`]).
//!
//! Booting an MBR partition first makes it the active partition (see [`mbr`]).

use alloc::{boxed::Box, format, string::String, vec::Vec};

use log::debug;
use thiserror::Error;
use uefi::Status;

use crate::{
    config::{GlobalConfig, HideUi},
    entry::{
        EntryKind, Icon, Menu, MenuEntry, MenuScreen, Row,
        submenu::{HINT_EDITOR, HINT_KEYS, HINT_NO_EDITOR},
    },
    legacy::{bbs::BootOption, mbr::MbrError},
    path::{MAX_DESCRIPTION_LEN, is_in_substring, limit_string_length},
    system::devpath::DevicePathBuf,
    volume::{DiskKind, Volume},
};

pub mod bbs;
pub mod mac;
pub mod mbr;

/// The icon of legacy targets without a recognized OS.
const LEGACY_ICON: &str = "legacy";

/// How legacy targets are found and booted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyStrategy {
    /// Apple's legacy loader, started from a known device path.
    Mac,

    /// The firmware's Legacy BIOS protocol and boot option table.
    Firmware,
}

/// An `Error` that may result from decoding or booting a legacy target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LegacyError {
    /// A boot option variable ended before its header, description or device path did.
    #[error("Boot option Boot{0:04X} is truncated")]
    Truncated(u16),

    /// A boot option carried a device path that could not be decoded.
    #[error("Boot option Boot{0:04X} has a malformed device path")]
    MalformedDevicePath(u16),

    /// A boot option does not fit the `Boot####` layout.
    #[error("Boot option Boot{0:04X} is too large to store")]
    TooLarge(u16),

    /// The firmware has no Legacy BIOS protocol.
    #[error("The firmware cannot boot legacy targets")]
    Unsupported,

    /// The firmware returned from a legacy boot.
    #[error("Legacy boot of \"{0}\" failed with status {1}")]
    BootFailed(String, Status),
}

/// A legacy target found on a volume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyEntry {
    /// The index of the volume in the scanned volume list.
    pub volume: usize,

    /// The kind of media, passed to the legacy loader: `HD`, `USB` or `CD`.
    pub load_options: &'static str,
}

/// A legacy target from the firmware's boot option table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyFirmwareEntry {
    /// The decoded boot option.
    pub option: BootOption,

    /// The kind of media: `HD`, `USB` or `CD`.
    pub load_options: &'static str,
}

/// Firmware services that legacy booting needs besides image loading.
pub trait LegacyServices {
    /// Makes the MBR partition of a volume the active partition of its disk.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the whole disk cannot be opened, or the partition table cannot be updated.
    fn activate_partition(&mut self, volume: &Volume) -> Result<(), MbrError>;

    /// Returns the device path of the device each currently loaded image was loaded from.
    fn loaded_image_device_paths(&mut self) -> Vec<DevicePathBuf>;

    /// Connects every controller along a device path, so that the device becomes bootable.
    fn connect_device_path(&mut self, device_path: &DevicePathBuf);

    /// Boots a legacy boot option. Returns only if the boot failed.
    fn legacy_boot(&mut self, option: &BootOption) -> Status;
}

/// The load options telling the legacy loader which kind of media to boot.
#[must_use = "Has no effect if the result is unused"]
pub const fn media_options(kind: DiskKind) -> &'static str {
    match kind {
        DiskKind::Internal => "HD",
        DiskKind::External => "USB",
        DiskKind::Optical => "CD",
    }
}

/// Starts a legacy submenu with the usual key hints.
fn legacy_submenu(title: String, config: &GlobalConfig) -> MenuScreen {
    let mut screen = MenuScreen::new(title);
    screen.hints = alloc::vec![
        HINT_KEYS,
        if config.hide_ui.contains(HideUi::EDITOR) {
            HINT_NO_EDITOR
        } else {
            HINT_EDITOR
        },
    ];
    screen
}

/// Checks if a legacy volume gets an entry.
///
/// Volumes with boot code are shown. Apple legacy volumes, and whole disks whose boot code was not recognized,
/// are hidden when another volume on the same disk carries boot code, so that the partition is offered instead.
fn shows_legacy_volume(volumes: &[Volume], index: usize) -> bool {
    let volume = &volumes[index];
    let hide_if_others = if volume.is_apple_legacy {
        true
    } else if volume.has_boot_code() {
        volume.is_whole_disk && volume.os_name().is_none()
    } else {
        return false;
    };

    !hide_if_others
        || !volumes.iter().enumerate().any(|(other_index, other)| {
            other_index != index
                && other.has_boot_code()
                && other.disk_id.is_some()
                && other.disk_id == volume.disk_id
        })
}

/// Builds the entry of a legacy volume, unless its title is excluded by `dont_scan_volumes`.
fn legacy_volume_entry(config: &GlobalConfig, volume: &Volume, index: usize) -> Option<MenuEntry> {
    let (os_title, shortcut) = match volume.os_name() {
        Some(name) => (name, name.chars().next().filter(|x| matches!(x, 'W' | 'L'))),
        None => ("Legacy OS", None),
    };
    let description = volume.name.as_deref().unwrap_or(match volume.disk_kind {
        DiskKind::Optical => "CD",
        _ => "HD",
    });

    let title = format!("Boot {os_title} from {description}");
    if is_in_substring(&title, &config.dont_scan_volumes) {
        debug!("Skipping excluded legacy volume \"{title}\"");
        return None;
    }

    let target = LegacyEntry {
        volume: index,
        load_options: media_options(volume.disk_kind),
    };
    let hints = volume.boot_code.map_or(LEGACY_ICON, |x| x.icon_hints);

    let mut submenu = legacy_submenu(format!("Boot Options for {os_title} on {description}"), config);
    submenu.add_entry(MenuEntry::new(
        format!("Boot {os_title}"),
        Row::Primary,
        EntryKind::Legacy(target.clone()),
    ));
    submenu.finish();

    Some(MenuEntry {
        shortcut,
        icon: Icon::Hints(format!("{hints},{LEGACY_ICON}")),
        badge: Some(volume.disk_kind),
        submenu: Some(Box::new(submenu)),
        ..MenuEntry::new(title, Row::Primary, EntryKind::Legacy(target))
    })
}

/// Adds an entry for every volume of one disk kind that carries legacy boot code.
pub fn scan_legacy_volumes(config: &GlobalConfig, volumes: &[Volume], kind: DiskKind, menu: &mut Menu) {
    for (index, volume) in volumes.iter().enumerate() {
        if volume.disk_kind != kind || !shows_legacy_volume(volumes, index) {
            continue;
        }
        if let Some(entry) = legacy_volume_entry(config, volume, index) {
            debug!("Adding legacy entry \"{}\"", entry.title);
            menu.add_entry(entry);
        }
    }
}

/// Builds the entry of a firmware boot option, unless its description is excluded by `dont_scan_volumes`.
fn legacy_firmware_entry(config: &GlobalConfig, option: &BootOption, kind: DiskKind) -> Option<MenuEntry> {
    if is_in_substring(&option.description, &config.dont_scan_volumes) {
        debug!("Skipping excluded legacy target \"{}\"", option.description);
        return None;
    }

    let description = limit_string_length(&option.description, MAX_DESCRIPTION_LEN);
    let target = LegacyFirmwareEntry {
        option: option.clone(),
        load_options: media_options(kind),
    };

    let mut submenu = legacy_submenu("No boot options for legacy target".into(), config);
    submenu.add_entry(MenuEntry::new(
        format!("Boot {description}"),
        Row::Primary,
        EntryKind::LegacyFirmware(target.clone()),
    ));
    submenu.finish();

    Some(MenuEntry {
        icon: Icon::Hints(LEGACY_ICON.into()),
        badge: Some(kind),
        submenu: Some(Box::new(submenu)),
        ..MenuEntry::new(
            format!("Boot legacy target {description}"),
            Row::Primary,
            EntryKind::LegacyFirmware(target),
        )
    })
}

/// Adds an entry for every firmware boot option that boots a legacy target of one disk kind.
///
/// `options` are the decoded boot options, in `BootOrder` order.
pub fn scan_legacy_firmware(config: &GlobalConfig, options: &[BootOption], kind: DiskKind, menu: &mut Menu) {
    for option in options.iter().filter(|x| bbs::is_legacy_target(x, kind)) {
        if let Some(entry) = legacy_firmware_entry(config, option, kind) {
            debug!("Adding legacy firmware entry \"{}\"", entry.title);
            menu.add_entry(entry);
        }
    }
}

//! Provides [`Volume`], a scannable partition, disc or whole disk.
//!
//! Volumes are produced once per scan by [`probe::enumerate_volumes`] and are then only read by the scanners. The
//! one exception is the filesystem handle, which is dropped before another image is started so that image can open
//! the volume itself, and reopened once control returns.

use alloc::{boxed::Box, string::String};
use core::fmt;

use uefi::Handle;

use crate::system::{devpath::DevicePathBuf, fs::FileAccess};

pub mod probe;

/// The kind of disk a volume lives on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiskKind {
    /// A fixed disk.
    #[default]
    Internal,

    /// A removable disk, like a USB flash drive.
    External,

    /// A CD or DVD.
    Optical,
}

/// Legacy boot code found in the first sector of a volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootCode {
    /// The OS the boot code belongs to, if it was recognized.
    pub os_name: Option<&'static str>,

    /// Comma separated icon hints for the OS.
    pub icon_hints: &'static str,
}

/// Known boot code signatures, searched for anywhere in the first sector.
const BOOT_CODE_SIGNATURES: &[(&[u8], &str, &str)] = &[
    (b"NTLDR", "Windows", "win"),
    (b"BOOTMGR", "Windows", "win,vista"),
    (b"GRUB", "Linux", "grub,linux"),
    (b"LILO", "Linux", "linux"),
    (b"SYSLINUX", "Linux", "linux"),
    (b"ISOLINUX", "Linux", "linux"),
    (b"FreeBSD", "FreeBSD", "freebsd,bsd"),
    (b"OpenBSD", "OpenBSD", "openbsd,bsd"),
    (b"NetBSD", "NetBSD", "netbsd,bsd"),
];

/// Inspects the first sector of a volume for legacy boot code.
///
/// A sector counts as bootable when it ends with the `0x55 0xaa` signature and does not start with a zero byte.
#[must_use = "Has no effect if the result is unused"]
pub fn detect_boot_code(sector: &[u8]) -> Option<BootCode> {
    if sector.len() < 512 || sector[510..512] != [0x55, 0xaa] || sector[0] == 0 {
        return None;
    }

    let sector = &sector[..512];
    let found = BOOT_CODE_SIGNATURES
        .iter()
        .find(|(sig, _, _)| sector.windows(sig.len()).any(|x| x == *sig));

    Some(match found {
        Some((_, os_name, icon_hints)) => BootCode {
            os_name: Some(os_name),
            icon_hints,
        },
        None => BootCode {
            os_name: None,
            icon_hints: "legacy",
        },
    })
}

/// A volume that may hold boot loaders or legacy boot code.
#[derive(Default)]
pub struct Volume {
    /// The device handle, or [`None`] for volumes that do not come from firmware.
    pub handle: Option<Handle>,

    /// The device path of the volume.
    pub device_path: Option<DevicePathBuf>,

    /// Open access to the filesystem, if the volume is readable.
    pub fs: Option<Box<dyn FileAccess>>,

    /// The filesystem label.
    pub name: Option<String>,

    /// The GPT partition name.
    pub part_name: Option<String>,

    /// What kind of disk the volume lives on.
    pub disk_kind: DiskKind,

    /// Legacy boot code in the first sector.
    pub boot_code: Option<BootCode>,

    /// If the volume is an Apple legacy (pre-EFI) boot volume.
    pub is_apple_legacy: bool,

    /// If this is the whole-disk pseudo-volume of an MBR disk.
    pub is_whole_disk: bool,

    /// If the volume is a partition listed in an MBR.
    pub is_mbr_partition: bool,

    /// The MBR partition number, counting from 0. Logical partitions start at 4.
    pub mbr_partition_index: usize,

    /// An identifier shared by every volume on the same physical disk.
    pub disk_id: Option<usize>,

    /// The handle of the whole disk, for writing the partition table.
    pub whole_disk: Option<Handle>,

    /// If the volume carries its own icon file.
    pub has_icon: bool,
}

impl Volume {
    /// The volume name, falling back to the partition name.
    #[must_use = "Has no effect if the result is unused"]
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.part_name.as_deref())
    }

    /// If the volume carries legacy boot code.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn has_boot_code(&self) -> bool {
        self.boot_code.is_some()
    }

    /// The name of the OS whose boot code was recognized.
    #[must_use = "Has no effect if the result is unused"]
    pub fn os_name(&self) -> Option<&'static str> {
        self.boot_code.and_then(|x| x.os_name)
    }

    /// Returns the filesystem, if the volume is readable.
    pub fn fs(&mut self) -> Option<&mut (dyn FileAccess + 'static)> {
        self.fs.as_deref_mut()
    }

    /// Checks if this is the same volume as `other`.
    ///
    /// Firmware volumes are compared by handle, others by name.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_same(&self, other: &Self) -> bool {
        match (self.handle, other.handle) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name && self.device_path == other.device_path,
            _ => false,
        }
    }

    /// Builds the full device path of a file on this volume.
    #[must_use = "Has no effect if the result is unused"]
    pub fn file_device_path(&self, path: &str) -> Option<DevicePathBuf> {
        self.device_path.as_ref()?.with_file_path(path).ok()
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("name", &self.name)
            .field("part_name", &self.part_name)
            .field("disk_kind", &self.disk_kind)
            .field("readable", &self.fs.is_some())
            .field("boot_code", &self.boot_code)
            .field("is_whole_disk", &self.is_whole_disk)
            .field("mbr_partition_index", &self.mbr_partition_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a bootable sector with the given text inside the boot code area.
    fn sector(text: &[u8]) -> [u8; 512] {
        let mut sector = [0; 512];
        sector[0] = 0xeb;
        sector[3..3 + text.len()].copy_from_slice(text);
        sector[510] = 0x55;
        sector[511] = 0xaa;
        sector
    }

    #[test]
    fn test_detect_boot_code() {
        assert_eq!(detect_boot_code(&sector(b"xxBOOTMGRxx")).and_then(|x| x.os_name), Some("Windows"));
        assert_eq!(detect_boot_code(&sector(b"GRUB ")).map(|x| x.icon_hints), Some("grub,linux"));
        assert_eq!(
            detect_boot_code(&sector(b"nothing")),
            Some(BootCode {
                os_name: None,
                icon_hints: "legacy"
            })
        );

        let mut empty = sector(b"NTLDR");
        empty[0] = 0;
        assert!(detect_boot_code(&empty).is_none());
        assert!(detect_boot_code(&[0xeb; 511]).is_none());

        let mut unsigned = sector(b"NTLDR");
        unsigned[511] = 0;
        assert!(detect_boot_code(&unsigned).is_none());
    }

    #[test]
    fn test_display_name() {
        let volume = Volume {
            part_name: Some("Basic data partition".into()),
            ..Volume::default()
        };
        assert_eq!(volume.display_name(), Some("Basic data partition"));
        assert!(!volume.has_boot_code());
        assert!(volume.file_device_path("\\a.efi").is_none());
    }
}

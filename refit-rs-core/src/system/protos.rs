//! UEFI protocols that are not implemented in the [`uefi`] crate.
//!
//! This exposes the following protocols:
//! - [`SecurityArch`] and [`Security2Arch`], hooked while loading images through Shim
//! - [`ShimImageLoader`], only used to detect Shim v16+
//! - [`LegacyBios`], for booting BIOS targets from the firmware's boot option table and reading its BBS table
//! - [`AppleSetOs`], which unlocks hardware on Apple firmware when a recent macOS is reported

use core::ffi::c_void;

use uefi::{
    CStr8, Status, StatusExt, guid,
    proto::{device_path::FfiDevicePath, unsafe_protocol},
};

/// A "boolean" that is actually a [`u8`]. Used for FFI interop.
type Bool = u8;

/// An entry of a protocol function table that is never called.
type Unused = *const c_void;

/// The raw Security Arch protocol implementation.
///
/// You should rarely ever need to use this, unless you are installing a custom validator.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct SecurityArchProtocol {
    /// Check the authentication status of a file using the `auth_status` parameter.
    pub auth_state: unsafe extern "efiapi" fn(
        this: *const Self,
        auth_status: u32,
        file: *const FfiDevicePath,
    ) -> Status,
}

impl SecurityArchProtocol {
    /// The GUID of the protocol.
    const GUID: uefi::Guid = guid!("a46423e3-4617-49f1-b9ff-d1bfa9115839");
}

/// Security Arch Protocol.
///
/// When Secure Boot is enabled, `LoadImage` asks this protocol to authenticate files according to platform policy.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
#[unsafe_protocol(SecurityArchProtocol::GUID)]
pub struct SecurityArch(SecurityArchProtocol);

impl SecurityArch {
    /// Get a shared reference to the inner raw [`SecurityArchProtocol`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn get_inner(&self) -> &SecurityArchProtocol {
        &self.0
    }

    /// Get a mutable reference to the inner raw [`SecurityArchProtocol`].
    pub const fn get_inner_mut(&mut self) -> &mut SecurityArchProtocol {
        &mut self.0
    }
}

/// The raw Security2 Arch protocol implementation.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Security2ArchProtocol {
    /// Check the authentication status of a file from either a device path or a file buffer.
    pub authentication: unsafe extern "efiapi" fn(
        this: *const Self,
        device_path: *const FfiDevicePath,
        file_buffer: *mut c_void,
        file_size: usize,
        boot_policy: Bool,
    ) -> Status,
}

impl Security2ArchProtocol {
    /// The GUID of the protocol.
    const GUID: uefi::Guid = guid!("94ab2f58-1438-4ef1-9152-18941a3a0e68");
}

/// Security2 Arch Protocol.
///
/// Takes priority over [`SecurityArch`] when both are published.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
#[unsafe_protocol(Security2ArchProtocol::GUID)]
pub struct Security2Arch(Security2ArchProtocol);

impl Security2Arch {
    /// Get a shared reference to the inner raw [`Security2ArchProtocol`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn get_inner(&self) -> &Security2ArchProtocol {
        &self.0
    }

    /// Get a mutable reference to the inner raw [`Security2ArchProtocol`].
    pub const fn get_inner_mut(&mut self) -> &mut Security2ArchProtocol {
        &mut self.0
    }
}

/// The raw Shim Image Loader protocol. Only its presence matters.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct ShimImageLoaderProtocol {
    /// `LoadImage` replacement.
    load_image: Unused,
    /// `StartImage` replacement.
    start_image: Unused,
    /// `Exit` replacement.
    exit: Unused,
    /// `UnloadImage` replacement.
    unload_image: Unused,
}

impl ShimImageLoaderProtocol {
    /// The GUID of the protocol.
    const GUID: uefi::Guid = guid!("1f492041-fadb-4e59-9e57-7cafe73a55ab");
}

/// Shim Image Loader protocol.
///
/// Published by Shim v16+, which hooks `LoadImage` itself.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
#[unsafe_protocol(ShimImageLoaderProtocol::GUID)]
pub struct ShimImageLoader(ShimImageLoaderProtocol);

/// The size of one packed `BBS_TABLE` entry.
pub const BBS_TABLE_ENTRY_LEN: usize = 69;

/// One packed `BBS_TABLE` entry, as the compatibility support module lays it out.
pub type BbsTableEntry = [u8; BBS_TABLE_ENTRY_LEN];

/// The raw Legacy BIOS protocol function table.
///
/// Only `LegacyBoot` and `GetBbsInfo` are called, the other entries before them are kept for layout.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct LegacyBiosProtocol {
    /// `Int86`.
    int86: Unused,
    /// `FarCall86`.
    far_call86: Unused,
    /// `CheckPciRom`.
    check_pci_rom: Unused,
    /// `InstallPciRom`.
    install_pci_rom: Unused,
    /// Boots a BIOS boot specification device path through the compatibility support module.
    legacy_boot: unsafe extern "efiapi" fn(
        this: *mut Self,
        boot_option: *const FfiDevicePath,
        load_options_size: u32,
        load_options: *const c_void,
    ) -> Status,
    /// `UpdateKeyboardLedStatus`.
    update_keyboard_led_status: Unused,
    /// Returns the hard disk information and BBS tables of the compatibility support module.
    get_bbs_info: unsafe extern "efiapi" fn(
        this: *mut Self,
        hdd_count: *mut u16,
        hdd_info: *mut *mut c_void,
        bbs_count: *mut u16,
        bbs_table: *mut *mut BbsTableEntry,
    ) -> Status,
}

impl LegacyBiosProtocol {
    /// The GUID of the protocol.
    const GUID: uefi::Guid = guid!("db9a1e3d-45cb-4abb-853b-e5387fdb2e2d");
}

/// Legacy BIOS protocol.
///
/// Present on firmware with a compatibility support module.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
#[unsafe_protocol(LegacyBiosProtocol::GUID)]
pub struct LegacyBios(LegacyBiosProtocol);

impl LegacyBios {
    /// Boots a legacy target. Only returns if the boot failed.
    ///
    /// # Safety
    ///
    /// `boot_option` must point to a valid, end-terminated device path whose first node is a BBS node, and
    /// `load_options` must be valid for `load_options.len()` bytes.
    pub unsafe fn legacy_boot(&mut self, boot_option: *const FfiDevicePath, load_options: &[u8]) -> Status {
        let size = u32::try_from(load_options.len()).unwrap_or(u32::MAX);
        // SAFETY: the caller guarantees the device path is valid, and the options slice is valid for its length.
        unsafe {
            (self.0.legacy_boot)(
                &raw mut self.0,
                boot_option,
                size,
                load_options.as_ptr().cast::<c_void>(),
            )
        }
    }

    /// Returns the BBS table, one entry per device the compatibility support module knows about.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the compatibility support module has no BBS table.
    pub fn bbs_table(&mut self) -> uefi::Result<&[BbsTableEntry]> {
        let mut hdd_count = 0;
        let mut hdd_info = core::ptr::null_mut();
        let mut bbs_count = 0;
        let mut bbs_table = core::ptr::null_mut();
        // SAFETY: every out pointer is valid for a write of its type
        unsafe {
            (self.0.get_bbs_info)(
                &raw mut self.0,
                &raw mut hdd_count,
                &raw mut hdd_info,
                &raw mut bbs_count,
                &raw mut bbs_table,
            )
        }
        .to_result()?;

        if bbs_table.is_null() {
            return Err(Status::NOT_FOUND.into());
        }
        // SAFETY: the table is owned by the compatibility support module, which keeps it for as long as the
        // protocol is installed, and holds `bbs_count` packed entries
        Ok(unsafe { core::slice::from_raw_parts(bbs_table.cast_const(), usize::from(bbs_count)) })
    }
}

/// The raw Apple "set OS" protocol.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct AppleSetOsProtocol {
    /// The protocol version. Vendor reporting needs version 2.
    version: u64,
    /// Reports the OS version string.
    set_os_version: unsafe extern "efiapi" fn(version: *const u8) -> Status,
    /// Reports the OS vendor string.
    set_os_vendor: unsafe extern "efiapi" fn(vendor: *const u8) -> Status,
}

impl AppleSetOsProtocol {
    /// The GUID of the protocol.
    const GUID: uefi::Guid = guid!("c5c5da95-7d5c-45e6-b2f1-3fd52bb10077");
}

/// Apple set OS protocol.
///
/// Some Apple firmware only enables secondary GPUs when told that a recent macOS is booting.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
#[unsafe_protocol(AppleSetOsProtocol::GUID)]
pub struct AppleSetOs(AppleSetOsProtocol);

impl AppleSetOs {
    /// The version of the protocol.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn version(&self) -> u64 {
        self.0.version
    }

    /// Reports an OS version to the firmware.
    pub fn set_os_version(&mut self, version: &CStr8) -> Status {
        // SAFETY: the string is nul terminated and outlives the call.
        unsafe { (self.0.set_os_version)(version.as_ptr().cast::<u8>()) }
    }

    /// Reports an OS vendor to the firmware.
    pub fn set_os_vendor(&mut self, vendor: &CStr8) -> Status {
        // SAFETY: the string is nul terminated and outlives the call.
        unsafe { (self.0.set_os_vendor)(vendor.as_ptr().cast::<u8>()) }
    }
}

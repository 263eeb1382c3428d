//! Values that depend on the CPU architecture the boot manager was built for.

use alloc::{format, string::String};

/// The PE machine type of loaders that can run here, if it is checked at all.
#[cfg(target_arch = "x86_64")]
pub const PE_MACHINE: Option<u16> = Some(0x8664);
/// The PE machine type of loaders that can run here, if it is checked at all.
#[cfg(target_arch = "x86")]
pub const PE_MACHINE: Option<u16> = Some(0x014c);
/// The PE machine type of loaders that can run here, if it is checked at all.
#[cfg(target_arch = "aarch64")]
pub const PE_MACHINE: Option<u16> = Some(0xaa64);
/// The PE machine type of loaders that can run here, if it is checked at all.
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
pub const PE_MACHINE: Option<u16> = None;

/// The suffix firmware uses for this architecture in file names.
#[cfg(target_arch = "x86_64")]
pub const ARCH_SUFFIX: &str = "x64";
/// The suffix firmware uses for this architecture in file names.
#[cfg(target_arch = "x86")]
pub const ARCH_SUFFIX: &str = "ia32";
/// The suffix firmware uses for this architecture in file names.
#[cfg(target_arch = "aarch64")]
pub const ARCH_SUFFIX: &str = "aa64";
/// The suffix firmware uses for this architecture in file names.
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
pub const ARCH_SUFFIX: &str = "";

/// The platform description on the about screen.
#[cfg(target_arch = "x86_64")]
pub const PLATFORM_NAME: &str = "x86_64 (64 bit)";
/// The platform description on the about screen.
#[cfg(target_arch = "x86")]
pub const PLATFORM_NAME: &str = "x86 (32 bit)";
/// The platform description on the about screen.
#[cfg(target_arch = "aarch64")]
pub const PLATFORM_NAME: &str = "ARM64 (64 bit)";
/// The platform description on the about screen.
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
pub const PLATFORM_NAME: &str = "unknown";

/// If the Mac OS X submenu offers 64-bit and 32-bit kernel choices.
pub const HAS_KERNEL_ARCH_CHOICE: bool = cfg!(target_arch = "x86_64");

/// The directory of the platform fallback loader.
pub const FALLBACK_DIR: &str = "\\EFI\\BOOT";

/// The file name of the platform fallback loader.
#[must_use = "Has no effect if the result is unused"]
pub fn fallback_basename() -> String {
    format!("boot{ARCH_SUFFIX}.efi")
}

/// The full path of the platform fallback loader.
#[must_use = "Has no effect if the result is unused"]
pub fn fallback_path() -> String {
    format!("{FALLBACK_DIR}\\{}", fallback_basename())
}

/// Driver directories below the boot manager's own directory.
#[must_use = "Has no effect if the result is unused"]
pub fn driver_dirs() -> [String; 2] {
    ["drivers".into(), format!("drivers_{ARCH_SUFFIX}")]
}

/// Where the EFI shell may be found on the boot manager's volume.
#[must_use = "Has no effect if the result is unused"]
pub fn shell_paths() -> [String; 4] {
    [
        "\\EFI\\tools\\shell.efi".into(),
        format!("\\EFI\\tools\\shell{ARCH_SUFFIX}.efi"),
        "\\shell.efi".into(),
        format!("\\shell{ARCH_SUFFIX}.efi"),
    ]
}

/// Where gptsync may be found on the boot manager's volume.
#[must_use = "Has no effect if the result is unused"]
pub fn gptsync_paths() -> [String; 2] {
    [
        "\\EFI\\tools\\gptsync.efi".into(),
        format!("\\EFI\\tools\\gptsync_{ARCH_SUFFIX}.efi"),
    ]
}

/// Where gdisk may be found on the boot manager's volume.
#[must_use = "Has no effect if the result is unused"]
pub fn gdisk_paths() -> [String; 2] {
    [
        "\\EFI\\tools\\gdisk.efi".into(),
        format!("\\EFI\\tools\\gdisk_{ARCH_SUFFIX}.efi"),
    ]
}

/// File names of the memory tester.
#[must_use = "Has no effect if the result is unused"]
pub fn memtest_names() -> [String; 4] {
    [
        "memtest86.efi".into(),
        format!("memtest86_{ARCH_SUFFIX}.efi"),
        format!("memtest86{ARCH_SUFFIX}.efi"),
        fallback_basename(),
    ]
}

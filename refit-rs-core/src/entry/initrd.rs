//! Finds the initial ramdisk that belongs to a Linux kernel.
//!
//! The ramdisk must sit in the kernel's directory, be named `init*`, and carry exactly the same version number as
//! the kernel. `initramfs-5.10.0.img` belongs to `vmlinuz-5.10.0`, while `initramfs-5.10.0-rc1.img` and
//! `initramfs-15.10.0.img` do not. A kernel without a version number only pairs with a ramdisk without one.

use alloc::string::String;

use crate::{
    path::{eq_ci, find_numbers, find_path, join_path, matches_pattern},
    system::fs::FileAccess,
};

/// The name pattern of initial ramdisks.
const INITRD_PATTERN: &str = "init*";

/// Finds the initial ramdisk for the kernel at `loader_path`.
///
/// The first match in directory order wins. The returned path is absolute.
pub fn find_initrd(fs: &mut dyn FileAccess, loader_path: &str) -> Option<String> {
    let kernel_version = find_numbers(loader_path);
    let dir = find_path(loader_path);
    let listing = fs.read_dir(if dir.is_empty() { "\\" } else { dir }).ok()?;

    listing
        .entries
        .iter()
        .filter(|x| !x.is_dir && matches_pattern(&x.name, INITRD_PATTERN))
        .find(|x| match (kernel_version, find_numbers(&x.name)) {
            (Some(kernel), Some(initrd)) => eq_ci(kernel, initrd),
            (None, None) => true,
            _ => false,
        })
        .map(|x| join_path(dir, &x.name))
}

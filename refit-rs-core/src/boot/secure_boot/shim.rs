// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Shim integration into Secure Boot.
//!
//! Shim exposes [`ShimLock`], which verifies a buffer against both the firmware database and the machine owner
//! keys. [`shim_validate`] is the validator the policy installs. Images arrive either as a buffer, when firmware
//! already read them, or only as a device path, in which case the file is read here first.

use core::ptr::NonNull;

use uefi::{
    Identify, boot, cstr16,
    proto::{device_path::DevicePath, media::fs::SimpleFileSystem, shim::ShimLock},
    runtime::VariableVendor,
};

use crate::{
    BootResult,
    boot::secure_boot::SecureBootError,
    system::{
        devpath::DevicePathBuf,
        fs::{FileAccess, FsError, UefiFileSystem},
        helper::locate_protocol,
        protos::ShimImageLoader,
        variable::{get_variable, set_variable},
    },
};

/// Reads the file a [`DevicePath`] points to, then verifies it with [`ShimLock`].
///
/// # Errors
///
/// May return an `Error` if the device path does not lead to a filesystem, has no file path, or the file cannot be
/// read. Shim's own rejection is also an `Error`.
fn validate_from_device_path(mut device_path: &DevicePath, shim: &ShimLock) -> BootResult<()> {
    let full = DevicePathBuf::from_device_path(device_path);
    let handle = boot::locate_device_path::<SimpleFileSystem>(&mut device_path)?;
    let path = DevicePathBuf::from_device_path(device_path)
        .file_path()
        .or_else(|| full.file_path())
        .ok_or(FsError::InvalidPath)?;

    let mut fs = UefiFileSystem::from_handle(handle)?;
    let buffer = fs.read(&path)?;
    Ok(shim.verify(&buffer)?)
}

/// Checks for the presence of [`ShimLock`].
pub(super) fn shim_loaded() -> bool {
    boot::get_handle_for_protocol::<ShimLock>().is_ok()
}

/// Checks if Shim hooks `LoadImage` on its own.
///
/// Only Shim v16 and later publish [`ShimImageLoader`].
pub(super) fn shim_is_recent() -> bool {
    boot::get_handle_for_protocol::<ShimImageLoader>().is_ok()
}

/// The Shim validator, with the [`super::Validator`] signature.
pub(super) fn shim_validate(
    _ctx: Option<NonNull<u8>>,
    device_path: Option<&DevicePath>,
    file_buffer: Option<&mut [u8]>,
    _file_size: usize,
) -> BootResult<()> {
    let shim = locate_protocol::<ShimLock>()?;

    if let Some(file_buffer) = file_buffer {
        return Ok(shim.verify(file_buffer)?);
    }

    if let Some(device_path) = device_path {
        return validate_from_device_path(device_path, &shim);
    }

    Err(SecureBootError::NoDevicePathOrFile.into())
}

/// Asks Shim to keep [`ShimLock`] installed after the boot manager started, so it stays usable for every image
/// launched later.
pub(super) fn shim_retain_protocol() -> BootResult<()> {
    let vendor = VariableVendor(ShimLock::GUID);
    if !matches!(
        get_variable::<bool>(cstr16!("ShimRetainProtocol"), Some(vendor)),
        Ok(true)
    ) {
        set_variable::<bool>(cstr16!("ShimRetainProtocol"), Some(vendor), None, Some(true))?;
    }
    Ok(())
}

// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`BootError`], which encapsulates other errors

use thiserror::Error;

/// An `Error` resulting from the program.
#[derive(Error, Debug)]
pub enum BootError {
    /// An error with UEFI, or a service from the [`uefi`] crate.
    #[error("UEFI Error: {0}")]
    Uefi(#[from] uefi::Error),

    /// A `String` could not be converted into a `CString16`
    #[error("String Conversion Error")]
    StrError(#[from] crate::system::helper::StrError),

    /// An error occurred while performing filesystem operations.
    #[error("Filesystem Error: {0}")]
    FsError(#[from] crate::system::fs::FsError),

    /// A device path could not be built or decoded.
    #[error("DevicePath Error: {0}")]
    DevicePathError(#[from] crate::system::devpath::DevicePathError),

    /// An error occurred while installing or removing the Secure Boot policy.
    #[error("Secure Boot Error: {0}")]
    SecureBootError(#[from] crate::boot::secure_boot::SecureBootError),

    /// An image could not be launched.
    #[error("Launch Error: {0}")]
    LaunchError(#[from] crate::boot::launch::LaunchError),

    /// A partition could not be made active.
    #[error("MBR Error: {0}")]
    MbrError(#[from] crate::legacy::mbr::MbrError),

    /// A legacy boot option could not be decoded or booted.
    #[error("Legacy Boot Error: {0}")]
    LegacyError(#[from] crate::legacy::LegacyError),

    /// An error occurred while loading a driver.
    #[error("Load Driver Error: {0}")]
    DriverError(#[from] crate::system::drivers::DriverError),
}

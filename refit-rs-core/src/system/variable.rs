// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! UEFI variable storage helpers.
//!
//! Integers and booleans go through [`UefiVariable`]. Strings are stored as nul terminated UCS-2, which is how the
//! previously booted entry is remembered across runs, and `u16` lists are used for reading `BootOrder`.

use alloc::{boxed::Box, string::String, vec, vec::Vec};
use uefi::{
    CStr16, Status, guid,
    runtime::{self, VariableAttributes, VariableVendor},
};

use crate::{
    BootResult,
    error::BootError,
    system::helper::{cstr_to_bytes_with_nul, str_to_cstr, ucs2_bytes_to_string},
};

/// The custom variable namespace for the boot manager.
pub const REFIT_GUID: uefi::Guid = guid!("23600d08-561e-4e68-a024-1d7d6e04ee4e");

/// A value that can be stored in a UEFI variable.
///
/// This is essentially a type that can be converted into and from a vector of bytes, with a fixed size.
pub trait UefiVariable: Sized {
    /// Convert `Self` to a vector of bytes.
    fn to_bytes(self) -> Vec<u8>;

    /// Convert a slice of bytes to `Self`. Missing bytes are treated as zero.
    fn from_bytes(bytes: &[u8]) -> Self;

    /// Return 0, or an equivalent value.
    fn default() -> Self;
}

/// Implements [`UefiVariable`] for little-endian integers.
macro_rules! impl_uefi_variable_int {
    ($($ty:ty),*) => {
        $(
            impl UefiVariable for $ty {
                fn to_bytes(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
                fn from_bytes(bytes: &[u8]) -> Self {
                    let mut array = [0; size_of::<Self>()];
                    let len = bytes.len().min(array.len());
                    array[..len].copy_from_slice(&bytes[..len]);
                    Self::from_le_bytes(array)
                }
                fn default() -> Self {
                    0
                }
            }
        )*
    };
}

impl_uefi_variable_int!(u8, u16, u32, u64, usize);

impl UefiVariable for bool {
    fn to_bytes(self) -> Vec<u8> {
        vec![u8::from(self)]
    }
    fn from_bytes(bytes: &[u8]) -> Self {
        bytes.first().is_some_and(|&x| x > 0)
    }
    fn default() -> Self {
        false
    }
}

/// Resolves the vendor, falling back to the boot manager's own namespace.
fn vendor_or_default(vendor: Option<VariableVendor>) -> VariableVendor {
    vendor.unwrap_or(VariableVendor(REFIT_GUID))
}

/// Reads the raw bytes of a variable. A missing variable reads as [`None`].
///
/// # Errors
///
/// May return an `Error` for many reasons, see [`runtime::get_variable_boxed`]
pub fn get_variable_bytes(name: &CStr16, vendor: Option<VariableVendor>) -> BootResult<Option<Box<[u8]>>> {
    let vendor = vendor_or_default(vendor);
    match runtime::get_variable_boxed(name, &vendor) {
        Ok((var, _)) => Ok(Some(var)),
        Err(e) if e.status() == Status::NOT_FOUND => Ok(None),
        Err(e) => Err(BootError::Uefi(e.to_err_without_payload())),
    }
}

/// Writes raw bytes to a variable. An empty slice deletes it.
///
/// Without explicit attributes the variable is non-volatile and visible to boot and runtime services.
///
/// # Errors
///
/// May return an `Error` for many reasons, see [`runtime::set_variable`]
pub fn set_variable_bytes(
    name: &CStr16,
    vendor: Option<VariableVendor>,
    attrs: Option<VariableAttributes>,
    bytes: &[u8],
) -> BootResult<()> {
    let vendor = vendor_or_default(vendor);
    let attrs = attrs.unwrap_or(
        VariableAttributes::NON_VOLATILE
            | VariableAttributes::BOOTSERVICE_ACCESS
            | VariableAttributes::RUNTIME_ACCESS,
    );
    Ok(runtime::set_variable(name, &vendor, attrs, bytes)?)
}

/// Sets a UEFI variable to a [`UefiVariable`] given the name.
///
/// If None is specified for the vendor, then the variable is stored in the custom namespace at GUID
/// `23600d08-561e-4e68-a024-1d7d6e04ee4e`, not the global variables vendor space.
///
/// Passing None for num will result in the variable being deleted.
///
/// # Errors
///
/// May return an `Error` for many reasons, see [`runtime::set_variable`]
pub fn set_variable<T: UefiVariable + 'static>(
    name: &CStr16,
    vendor: Option<VariableVendor>,
    attrs: Option<VariableAttributes>,
    num: Option<T>,
) -> BootResult<()> {
    let num = num.map_or_else(Vec::new, UefiVariable::to_bytes);
    set_variable_bytes(name, vendor, attrs, &num)
}

/// Gets a UEFI variable of a [`UefiVariable`] given the name.
///
/// If the variable was not found, the default value is returned.
///
/// # Errors
///
/// May return an `Error` for many reasons, see [`runtime::get_variable_boxed`]
pub fn get_variable<T: UefiVariable + 'static>(
    name: &CStr16,
    vendor: Option<VariableVendor>,
) -> BootResult<T> {
    Ok(get_variable_bytes(name, vendor)?.map_or_else(T::default, |x| T::from_bytes(&x)))
}

/// Reads a variable as a list of little-endian `u16`s, like `BootOrder`.
///
/// # Errors
///
/// May return an `Error` for many reasons, see [`runtime::get_variable_boxed`]
pub fn get_variable_u16_vec(name: &CStr16, vendor: Option<VariableVendor>) -> BootResult<Vec<u16>> {
    Ok(get_variable_bytes(name, vendor)?.map_or_else(Vec::new, |x| {
        x.chunks_exact(2)
            .map(|x| u16::from_le_bytes([x[0], x[1]]))
            .collect()
    }))
}

/// Reads a variable as a nul terminated UCS-2 string.
///
/// # Errors
///
/// May return an `Error` for many reasons, see [`runtime::get_variable_boxed`]
pub fn get_variable_str(name: &CStr16, vendor: Option<VariableVendor>) -> BootResult<Option<String>> {
    Ok(get_variable_bytes(name, vendor)?.map(|x| ucs2_bytes_to_string(&x)))
}

/// Stores a string as a nul terminated UCS-2 variable.
///
/// # Errors
///
/// May return an `Error` if the string has characters that cannot be encoded, or for many reasons, see
/// [`runtime::set_variable`]
pub fn set_variable_str(
    name: &CStr16,
    vendor: Option<VariableVendor>,
    attrs: Option<VariableAttributes>,
    value: &str,
) -> BootResult<()> {
    let value = str_to_cstr(value)?;
    set_variable_bytes(name, vendor, attrs, &cstr_to_bytes_with_nul(&value))
}

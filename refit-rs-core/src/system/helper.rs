//! Various helper functions for other modules.

use alloc::{string::String, vec::Vec};

use thiserror::Error;
use uefi::{
    CStr16, CString16, Handle, Identify, boot,
    boot::{OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol},
    proto::ProtocolPointer,
};

/// An `Error` that may result from converting a [`String`] to another format.
#[derive(Error, Debug)]
pub enum StrError {
    /// A [`String`] could not be converted into a [`CString16`]
    #[error("Could not convert String to CString16")]
    CstrFromStr(#[from] uefi::data_types::FromStrError),

    /// A UCS-2 buffer could not be converted into a [`CString16`], due to an invalid
    /// character or a missing nul character.
    #[error("Could not convert a UCS-2 slice to a CString16")]
    FromSliceWithNul(#[from] uefi::data_types::FromSliceWithNulError),
}

/// Gets a [`CString16`] from an [`&str`].
///
/// # Errors
///
/// May return an `Error` if the string could not be converted into a [`CString16`], either due to unsupported
/// characters or an invalid nul character.
pub fn str_to_cstr(str: &str) -> Result<CString16, StrError> {
    Ok(CString16::try_from(str)?)
}

/// Decodes a little-endian UCS-2 byte buffer up to its first nul.
///
/// Unpaired surrogates are dropped.
#[must_use = "Has no effect if the result is unused"]
pub fn ucs2_bytes_to_string(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|x| u16::from_le_bytes([x[0], x[1]]))
        .take_while(|&x| x != 0);
    char::decode_utf16(units).filter_map(Result::ok).collect()
}

/// Encodes a [`CStr16`] into little-endian bytes including its nul terminator.
#[must_use = "Has no effect if the result is unused"]
pub fn cstr_to_bytes_with_nul(cstr: &CStr16) -> Vec<u8> {
    cstr.to_u16_slice_with_nul()
        .iter()
        .flat_map(|x| x.to_le_bytes())
        .collect()
}

/// Opens the first instance of a protocol found on the system.
///
/// # Errors
///
/// May return an `Error` if no handle supports the protocol, or it is already opened exclusively.
pub fn locate_protocol<P: ProtocolPointer + Identify + ?Sized>() -> uefi::Result<ScopedProtocol<P>> {
    let handle = boot::get_handle_for_protocol::<P>()?;
    boot::open_protocol_exclusive::<P>(handle)
}

/// Opens a protocol on a handle without taking exclusive ownership of it.
///
/// Used for protocols that drivers are bound to, like `BlockIO`, where an exclusive open would disconnect them.
///
/// # Errors
///
/// May return an `Error` if the handle does not support the protocol.
pub fn open_protocol_shared<P: ProtocolPointer + ?Sized>(handle: Handle) -> uefi::Result<ScopedProtocol<P>> {
    // SAFETY: the protocol is only used while its handle stays valid, and the boot manager never uninstalls
    // protocols that it did not install itself.
    unsafe {
        boot::open_protocol::<P>(
            OpenProtocolParams {
                handle,
                agent: boot::image_handle(),
                controller: None,
            },
            OpenProtocolAttributes::GetProtocol,
        )
    }
}

/// Checks if any handle on the system supports a protocol.
#[must_use = "Has no effect if the result is unused"]
pub fn protocol_exists<P: ProtocolPointer + Identify + ?Sized>() -> bool {
    boot::get_handle_for_protocol::<P>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uefi::cstr16;

    #[test]
    fn test_str_to_cstr() -> Result<(), StrError> {
        let cstr = str_to_cstr("Boot Linux")?;
        assert_eq!(String::from(&cstr), "Boot Linux");
        Ok(())
    }

    #[test]
    fn test_ucs2_round_trip() {
        let bytes = cstr_to_bytes_with_nul(cstr16!("Windows Boot Manager"));
        assert_eq!(bytes.len(), 42);
        assert_eq!(ucs2_bytes_to_string(&bytes), "Windows Boot Manager");
        assert_eq!(ucs2_bytes_to_string(&[0x41, 0x00, 0x42]), "A");
    }
}

//! Hooks that replace the authentication methods of the security protocols.
//!
//! Each hook turns the raw pointers firmware passes into safer equivalents, hands them to the installed validator,
//! and returns success if it accepts the image. If it rejects the image, the original method gives the final
//! verdict, so images the firmware itself trusts keep working.
//!
//! # Safety
//!
//! Unsafe is used to call the original methods and to build slices and device paths from the raw pointers. All of
//! them rely on firmware passing valid pointers and an accurate size, which `LoadImage` does. If it did not, Secure
//! Boot would not work at all on that firmware.

use core::ffi::c_void;

use log::warn;
use uefi::{
    Status, boot,
    proto::device_path::{DevicePath, FfiDevicePath},
};

use crate::{
    boot::secure_boot::{SECURITY_POLICY, policy::PolicyState},
    system::protos::{Security2Arch, Security2ArchProtocol, SecurityArch, SecurityArchProtocol},
};

impl PolicyState {
    /// Installs the hook for [`SecurityArch`], if the firmware publishes it.
    pub(super) fn install_security1_hook(&mut self) {
        if let Ok(handle) = boot::get_handle_for_protocol::<SecurityArch>()
            && let Ok(mut security) = boot::open_protocol_exclusive::<SecurityArch>(handle)
        {
            self.original_hook = Some(security.get_inner().auth_state);
            security.get_inner_mut().auth_state = auth_state_hook;
            self.security = Some(handle);
        }
    }

    /// Installs the hook for [`Security2Arch`], if the firmware publishes it.
    pub(super) fn install_security2_hook(&mut self) {
        if let Ok(handle) = boot::get_handle_for_protocol::<Security2Arch>()
            && let Ok(mut security) = boot::open_protocol_exclusive::<Security2Arch>(handle)
        {
            self.original_hook2 = Some(security.get_inner().authentication);
            security.get_inner_mut().authentication = authentication_hook;
            self.security2 = Some(handle);
        }
    }

    /// Restores the original [`SecurityArch`] method.
    ///
    /// Returns `false` only if a hook was installed and could not be removed.
    pub(super) fn uninstall_security1_hook(&self) -> bool {
        let (Some(original_hook), Some(handle)) = (self.original_hook, self.security) else {
            return true;
        };
        match boot::open_protocol_exclusive::<SecurityArch>(handle) {
            Ok(mut security) => {
                security.get_inner_mut().auth_state = original_hook;
                true
            }
            Err(e) => {
                warn!("Could not reopen SecurityArch: {e}");
                false
            }
        }
    }

    /// Restores the original [`Security2Arch`] method.
    ///
    /// Returns `false` only if a hook was installed and could not be removed.
    pub(super) fn uninstall_security2_hook(&self) -> bool {
        let (Some(original_hook2), Some(handle)) = (self.original_hook2, self.security2) else {
            return true;
        };
        match boot::open_protocol_exclusive::<Security2Arch>(handle) {
            Ok(mut security) => {
                security.get_inner_mut().authentication = original_hook2;
                true
            }
            Err(e) => {
                warn!("Could not reopen Security2Arch: {e}");
                false
            }
        }
    }
}

/// The replacement for [`SecurityArchProtocol`] `auth_state`.
///
/// # Safety
///
/// The pointers must be valid. Firmware calls this from `LoadImage` with the pointers it was given.
unsafe extern "efiapi" fn auth_state_hook(
    this: *const SecurityArchProtocol,
    auth_status: u32,
    file: *const FfiDevicePath,
) -> Status {
    let Some(state) = SECURITY_POLICY.get() else {
        return Status::SECURITY_VIOLATION;
    };

    match state.call_validator(ffi_ptr_to_device_path(file), None) {
        Ok(()) => Status::SUCCESS,
        Err(e) => {
            warn!("{e}");
            // SAFETY: these are the arguments firmware passed to the hook
            unsafe { state.call_original_hook(this, auth_status, file) }
        }
    }
}

/// The replacement for [`Security2ArchProtocol`] `authentication`.
///
/// # Safety
///
/// The pointers must be valid, and `file_size` must be the size of `file_buffer`. Firmware calls this from
/// `LoadImage` with the buffer it read the image into.
unsafe extern "efiapi" fn authentication_hook(
    this: *const Security2ArchProtocol,
    device_path: *const FfiDevicePath,
    file_buffer: *mut c_void,
    file_size: usize,
    boot_policy: u8,
) -> Status {
    let Some(state) = SECURITY_POLICY.get() else {
        return Status::SECURITY_VIOLATION;
    };

    // SAFETY: firmware passes the buffer together with its size
    let slice = unsafe { mut_ptr_to_u8_slice(file_buffer, file_size) };

    match state.call_validator(ffi_ptr_to_device_path(device_path), slice) {
        Ok(()) => Status::SUCCESS,
        Err(e) => {
            warn!("{e}");
            // SAFETY: these are the arguments firmware passed to the hook
            unsafe { state.call_original_hook2(this, device_path, file_buffer, file_size, boot_policy) }
        }
    }
}

/// Converts a raw buffer to a mutable byte slice.
///
/// Returns [`None`] for a null or empty buffer.
///
/// # Safety
///
/// `ptr` must point to at least `size` bytes that nothing else accesses for `'a`.
unsafe fn mut_ptr_to_u8_slice<'a>(ptr: *mut c_void, size: usize) -> Option<&'a mut [u8]> {
    (!ptr.is_null() && size > 0).then(|| {
        // SAFETY: the pointer is not null, and the caller guarantees the size
        unsafe { core::slice::from_raw_parts_mut(ptr.cast::<u8>(), size) }
    })
}

/// Converts an [`FfiDevicePath`] pointer to a [`DevicePath`].
///
/// Returns [`None`] for a null or misaligned pointer.
fn ffi_ptr_to_device_path<'a>(ptr: *const FfiDevicePath) -> Option<&'a DevicePath> {
    // SAFETY: the pointer is checked first, and firmware only passes complete device paths
    (!ptr.is_null() && ptr.is_aligned()).then(|| unsafe { DevicePath::from_ffi_ptr(ptr) })
}

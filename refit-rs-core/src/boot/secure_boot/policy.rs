//! Provides [`PolicyState`], the record of what the policy replaced.
//!
//! This follows the same approach as systemd-boot's security override. The `FileAuthenticationState` and
//! `FileAuthentication` methods are taken from whichever handle publishes them and replaced with the hooks in
//! [`super::hooks`]. The originals are kept so that rejected images still get the firmware's verdict, and so that
//! they can be put back on exit.

use core::{cell::Cell, ffi::c_void, ptr::NonNull};

use uefi::{
    Handle, Status,
    proto::device_path::{DevicePath, FfiDevicePath},
};

use crate::{
    BootResult,
    boot::secure_boot::{SecureBootError, Validator},
    system::protos::{Security2ArchProtocol, SecurityArchProtocol},
};

/// The type of the [`SecurityArchProtocol`] `auth_state` method.
pub(super) type AuthState = unsafe extern "efiapi" fn(
    this: *const SecurityArchProtocol,
    auth_status: u32,
    file: *const FfiDevicePath,
) -> Status;

/// The type of the [`Security2ArchProtocol`] `authentication` method.
pub(super) type Authentication = unsafe extern "efiapi" fn(
    this: *const Security2ArchProtocol,
    device_path: *const FfiDevicePath,
    file_buffer: *mut c_void,
    file_size: usize,
    boot_policy: u8,
) -> Status;

/// The installed validator and the methods it replaced.
#[derive(Default)]
pub struct PolicyState {
    /// The [`Handle`] that supports [`SecurityArchProtocol`].
    pub(super) security: Option<Handle>,

    /// The [`Handle`] that supports [`Security2ArchProtocol`].
    pub(super) security2: Option<Handle>,

    /// The `auth_state` method before the hook was installed.
    pub(super) original_hook: Option<AuthState>,

    /// The `authentication` method before the hook was installed.
    pub(super) original_hook2: Option<Authentication>,

    /// The installed validator.
    validator: Option<Validator>,

    /// The context of the validator.
    validator_ctx: Option<NonNull<u8>>,

    /// If the hooks are in place.
    active: Cell<bool>,
}

impl PolicyState {
    /// Hooks `validator` into both security protocols, where the firmware has them.
    pub(super) fn install(&mut self, validator: Validator, validator_ctx: Option<NonNull<u8>>) {
        self.validator = Some(validator);
        self.validator_ctx = validator_ctx;

        self.install_security1_hook();
        self.install_security2_hook();
        self.active
            .set(self.original_hook.is_some() || self.original_hook2.is_some());
    }

    /// Puts the original methods back.
    ///
    /// # Errors
    ///
    /// May return an `Error` if a protocol that was hooked can no longer be opened.
    pub(super) fn uninstall(&self) -> Result<(), SecureBootError> {
        let restored = self.uninstall_security1_hook() & self.uninstall_security2_hook();
        if restored {
            self.active.set(false);
            Ok(())
        } else {
            Err(SecureBootError::RestoreFailed)
        }
    }

    /// Checks if the hooks are in place.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Calls the installed validator.
    ///
    /// # Errors
    ///
    /// May return an `Error` if there is no validator, or the validator rejects the image.
    pub fn call_validator(&self, device_path: Option<&DevicePath>, file_buffer: Option<&mut [u8]>) -> BootResult<()> {
        let validator = self.validator.ok_or(SecureBootError::NoValidator)?;
        let file_size = file_buffer.as_ref().map_or(0, |x| x.len());
        validator(self.validator_ctx, device_path, file_buffer, file_size)
    }

    /// Calls the original `auth_state` method.
    ///
    /// # Safety
    ///
    /// The pointers must be the ones firmware passed to the hook.
    pub(super) unsafe fn call_original_hook(
        &self,
        this: *const SecurityArchProtocol,
        auth_status: u32,
        file: *const FfiDevicePath,
    ) -> Status {
        match self.original_hook {
            // SAFETY: the caller passes the pointers firmware gave to the hook
            Some(original_hook) => unsafe { original_hook(this, auth_status, file) },
            None => Status::SUCCESS,
        }
    }

    /// Calls the original `authentication` method.
    ///
    /// # Safety
    ///
    /// The pointers and size must be the ones firmware passed to the hook.
    pub(super) unsafe fn call_original_hook2(
        &self,
        this: *const Security2ArchProtocol,
        device_path: *const FfiDevicePath,
        file_buffer: *mut c_void,
        file_size: usize,
        boot_policy: u8,
    ) -> Status {
        match self.original_hook2 {
            // SAFETY: the caller passes the pointers firmware gave to the hook
            Some(original_hook2) => unsafe { original_hook2(this, device_path, file_buffer, file_size, boot_policy) },
            None => Status::SUCCESS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject(
        _ctx: Option<NonNull<u8>>,
        _device_path: Option<&DevicePath>,
        _file_buffer: Option<&mut [u8]>,
        file_size: usize,
    ) -> BootResult<()> {
        if file_size == 4 {
            Ok(())
        } else {
            Err(SecureBootError::NoDevicePathOrFile.into())
        }
    }

    #[test]
    fn test_validator_called_with_size() {
        let state = PolicyState {
            validator: Some(reject),
            ..PolicyState::default()
        };
        let mut buffer = [0u8; 4];
        assert!(state.call_validator(None, Some(&mut buffer)).is_ok());
        assert!(state.call_validator(None, None).is_err());
        assert!(!state.is_active());
    }

    #[test]
    fn test_no_validator() {
        let state = PolicyState::default();
        assert!(state.call_validator(None, None).is_err());
        // nothing hooked, nothing to restore
        assert!(state.uninstall().is_ok());
    }
}

//! Secure Boot policy support.
//!
//! When Secure Boot is active, `LoadImage` asks the `SecurityArch` and `Security2Arch` protocols whether a file
//! may run. Firmware only trusts keys in its own database, so loaders signed with a machine owner key (MOK) would be
//! rejected even though Shim, which started the boot manager, trusts them.
//!
//! Installing the policy replaces the authentication methods of both protocols with hooks that first ask Shim to
//! verify the image, and only fall back to the firmware's original methods if Shim rejects it. The policy is
//! installed once at startup and stays installed until the boot manager exits, at which point the original methods
//! must be put back.
//!
//! Shim v16 and later hook `LoadImage` themselves, and publish the Shim Image Loader protocol to say so. With those,
//! nothing is installed.

use core::{cell::OnceCell, ptr::NonNull};

use log::{info, warn};
use thiserror::Error;
use uefi::{cstr16, proto::device_path::DevicePath, runtime::VariableVendor};

use crate::{
    BootResult,
    boot::secure_boot::policy::PolicyState,
    system::variable::get_variable,
};

pub mod hooks;
pub mod policy;
pub mod shim;

/// An `Error` that may result from installing, using or removing the Secure Boot policy.
#[derive(Error, Debug)]
pub enum SecureBootError {
    /// Neither a device path nor a file buffer were passed to the validator.
    #[error("DevicePath and file buffer were both None")]
    NoDevicePathOrFile,

    /// The hooks were called without a validator.
    #[error("Validator was not installed")]
    NoValidator,

    /// The policy was already installed once.
    #[error("Secure Boot policy already installed")]
    AlreadyInstalled,

    /// The original authentication methods could not be put back.
    #[error("Could not restore the firmware's Secure Boot validators")]
    RestoreFailed,
}

/// The function signature of a validator.
pub type Validator = fn(
    ctx: Option<NonNull<u8>>,
    device_path: Option<&DevicePath>,
    file_buffer: Option<&mut [u8]>,
    file_size: usize,
) -> BootResult<()>;

/// The installed policy.
///
/// The hooks are called by firmware with a fixed signature, so the validator and the original methods can only
/// be reached through a static. It can be set only once per run.
static SECURITY_POLICY: SecurityPolicy = SecurityPolicy {
    inner: OnceCell::new(),
};

/// Holder of the installed [`PolicyState`].
struct SecurityPolicy {
    /// The state, set when the policy is installed.
    inner: OnceCell<PolicyState>,
}

impl SecurityPolicy {
    /// Returns the installed state, if any.
    fn get(&self) -> Option<&PolicyState> {
        self.inner.get()
    }
}

// SAFETY: uefi is a single threaded environment there is no notion of thread safety
unsafe impl Sync for SecurityPolicy {}

/// Tests if Secure Boot is enabled through a UEFI variable.
#[must_use = "Has no effect if the result is unused"]
pub fn secure_boot_enabled() -> bool {
    matches!(
        get_variable::<u8>(cstr16!("SecureBoot"), Some(VariableVendor::GLOBAL_VARIABLE)),
        Ok(1)
    )
}

/// Checks if the policy hooks are currently installed.
#[must_use = "Has no effect if the result is unused"]
pub fn policy_installed() -> bool {
    SECURITY_POLICY.get().is_some_and(PolicyState::is_active)
}

/// Installs `validator` in front of the firmware's own validators.
///
/// # Errors
///
/// May return an `Error` if a policy was already installed during this run.
pub fn install_validator(validator: Validator, validator_ctx: Option<NonNull<u8>>) -> Result<(), SecureBootError> {
    if SECURITY_POLICY.get().is_some() {
        return Err(SecureBootError::AlreadyInstalled);
    }
    let mut state = PolicyState::default();
    state.install(validator, validator_ctx);
    SECURITY_POLICY
        .inner
        .set(state)
        .map_err(|_| SecureBootError::AlreadyInstalled)
}

/// Installs the Shim policy when Secure Boot is active and an older Shim is loaded.
///
/// Returns `true` if the hooks were installed.
///
/// # Errors
///
/// May return an `Error` if the policy was already installed, or Shim could not be asked to keep its protocol.
pub fn install_policy() -> BootResult<bool> {
    if !secure_boot_enabled() || !shim::shim_loaded() {
        return Ok(false);
    }
    if shim::shim_is_recent() {
        info!("Shim validates images itself, no Secure Boot policy needed");
        return Ok(false);
    }

    shim::shim_retain_protocol()?;
    install_validator(shim::shim_validate, None)?;
    info!("Installed the Shim Secure Boot policy");
    Ok(policy_installed())
}

/// Puts the firmware's own validators back.
///
/// Does nothing if no policy was installed.
///
/// # Errors
///
/// May return an `Error` if a validator could not be restored. The firmware is then left calling into an image
/// that is about to exit, so the only safe way out is a reset.
pub fn uninstall_policy() -> Result<(), SecureBootError> {
    match SECURITY_POLICY.get() {
        Some(state) if state.is_active() => state.uninstall().inspect_err(|e| warn!("{e}")),
        _ => Ok(()),
    }
}

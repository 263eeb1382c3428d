//! Reports a recent Mac OS X to Apple firmware.
//!
//! On hybrid graphics MacBook Pros the firmware disables the integrated GPU unless the booting OS identifies itself
//! through the "set OS" protocol. Claiming to be Mac OS X 10.9 keeps both GPUs available to whatever is booted.

use log::{debug, warn};
use uefi::{Status, cstr8};

use crate::system::{helper::locate_protocol, protos::AppleSetOs};

/// The version string reported to the firmware.
pub const REPORTED_OS: &str = "Mac OS X 10.9";

/// The first protocol version with `SetOsVendor`.
const VENDOR_VERSION: u64 = 2;

/// Tells Apple firmware that Mac OS X 10.9 is booting.
///
/// Does nothing on firmware without the protocol.
///
/// # Errors
///
/// May return an `Error` if the firmware rejected the version or vendor string.
pub fn apple_set_os() -> Result<(), Status> {
    let Ok(mut set_os) = locate_protocol::<AppleSetOs>() else {
        debug!("No apple_set_os protocol, not a Mac with hybrid graphics");
        return Ok(());
    };

    let version = cstr8!("Mac OS X 10.9");
    let status = set_os.set_os_version(version);
    if status.is_error() {
        warn!("Unable to set the OS version: {status}");
        return Err(status);
    }

    if set_os.version() >= VENDOR_VERSION {
        let status = set_os.set_os_vendor(version);
        if status.is_error() {
            warn!("Unable to set the OS vendor: {status}");
            return Err(status);
        }
    }
    debug!("Reported {REPORTED_OS} to the firmware");
    Ok(())
}

//! Power actions of the main menu.
//!
//! Resets never return. The firmware setup reboot can fail before the reset, in which case the error is shown
//! and control goes back to the menu.

use uefi::{
    Status,
    runtime::{self, ResetType},
};

pub mod firmware;
pub mod shutdown;

/// Restarts the system with a cold reset.
pub fn reboot() -> ! {
    runtime::reset(ResetType::COLD, Status::SUCCESS, None)
}

//! Provides [`shutdown`] which powers off the system.

use uefi::{
    Status,
    runtime::{self, ResetType},
};

/// Shuts down the system.
///
/// On firmware that cannot power off, [`runtime::reset`] falls back to a reset.
pub fn shutdown() -> ! {
    runtime::reset(ResetType::SHUTDOWN, Status::SUCCESS, None)
}

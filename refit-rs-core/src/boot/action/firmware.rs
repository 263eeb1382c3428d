//! Reboots into the firmware setup utility through the `OsIndications` variable.

use alloc::format;

use log::error;
use uefi::{
    Status, cstr16,
    runtime::{self, ResetType, VariableAttributes, VariableVendor},
};

use crate::{
    BootResult,
    system::{
        console::Console,
        variable::{get_variable, set_variable},
    },
};

/// The bit of `OsIndications` that asks firmware to show its setup utility on the next boot.
pub const EFI_OS_INDICATIONS_BOOT_TO_FW_UI: u64 = 1;

/// Checks if the firmware can boot into its setup utility on request.
#[must_use = "Has no effect if the result is unused"]
pub fn firmware_ui_supported() -> bool {
    get_variable::<u64>(cstr16!("OsIndicationsSupported"), Some(VariableVendor::GLOBAL_VARIABLE))
        .is_ok_and(|x| x & EFI_OS_INDICATIONS_BOOT_TO_FW_UI != 0)
}

/// Adds the boot-to-setup bit to whatever `OsIndications` already holds.
#[must_use = "Has no effect if the result is unused"]
pub const fn with_firmware_ui(indications: u64) -> u64 {
    indications | EFI_OS_INDICATIONS_BOOT_TO_FW_UI
}

/// Sets the [`EFI_OS_INDICATIONS_BOOT_TO_FW_UI`] bit.
fn set_reboot_to_firmware_flag() -> BootResult<()> {
    // a missing variable reads as 0
    let indications = get_variable::<u64>(cstr16!("OsIndications"), Some(VariableVendor::GLOBAL_VARIABLE))?;
    set_variable::<u64>(
        cstr16!("OsIndications"),
        Some(VariableVendor::GLOBAL_VARIABLE),
        Some(
            VariableAttributes::NON_VOLATILE
                | VariableAttributes::BOOTSERVICE_ACCESS
                | VariableAttributes::RUNTIME_ACCESS,
        ),
        Some(with_firmware_ui(indications)),
    )
}

/// Reboots into the firmware setup utility.
///
/// Only returns if `OsIndications` could not be set, after the user acknowledged the error.
pub fn reboot_to_firmware(console: &mut dyn Console) {
    match set_reboot_to_firmware_flag() {
        Ok(()) => runtime::reset(ResetType::COLD, Status::SUCCESS, None),
        Err(e) => {
            error!("Failed to set OsIndications: {e}");
            console.report_error("Reboot to Firmware", &[&format!("Error calling ResetSystem: {e}")]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_added() {
        assert_eq!(with_firmware_ui(0), 1);
        assert_eq!(with_firmware_ui(0b110), 0b111);
        assert_eq!(with_firmware_ui(1), 1);
    }
}

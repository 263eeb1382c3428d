//! Loads EFI drivers from the boot manager's own volume.
//!
//! Drivers typically provide extra filesystems, so they are loaded before volumes are enumerated. Only images whose
//! code type is boot-services or runtime-services code are started, anything else is rejected as not being a
//! driver. Once at least one driver has been started every controller is reconnected so the drivers can bind.

use alloc::{string::String, vec::Vec};
use log::{info, warn};
use thiserror::Error;
use uefi::{
    boot,
    proto::{BootPolicy, device_path::DevicePath, loaded_image::LoadedImage},
};

use crate::{
    BootResult,
    path::{eq_ci, find_extension, join_path},
    system::{
        devpath::DevicePathBuf,
        fs::{FileAccess, UefiFileSystem},
    },
};

/// An `Error` that may result from loading drivers.
#[derive(Error, Debug)]
pub enum DriverError {
    /// An EFI file is not a supported driver type
    #[error("Unsupported EFI file: {0}")]
    Unsupported(String),

    /// The boot manager was not loaded from a device.
    #[error("The boot manager image has no device handle")]
    NoDevice,
}

/// Loads a driver at `path` on the boot manager's own device, then starts it.
///
/// # Errors
///
/// May return an `Error` if the image cannot be loaded or started, or is not a driver.
fn load_driver(device: &DevicePathBuf, path: &str) -> BootResult<()> {
    let full = device.with_file_path(path)?;
    let src = boot::LoadImageSource::FromDevicePath {
        device_path: full.as_device_path()?,
        boot_policy: BootPolicy::ExactMatch,
    };
    let handle = boot::load_image(boot::image_handle(), src)?;

    let code_type = boot::open_protocol_exclusive::<LoadedImage>(handle)?.code_type();
    if code_type != boot::MemoryType::BOOT_SERVICES_CODE
        && code_type != boot::MemoryType::RUNTIME_SERVICES_CODE
    {
        let _ = boot::unload_image(handle);
        return Err(DriverError::Unsupported(path.into()).into());
    }

    Ok(boot::start_image(handle)?)
}

/// Returns the device path of the volume the boot manager was loaded from.
///
/// # Errors
///
/// May return an `Error` if the loaded image has no device, or the device has no device path.
pub fn image_device_path() -> BootResult<DevicePathBuf> {
    let device = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())?
        .device()
        .ok_or(DriverError::NoDevice)?;
    let device_path = boot::open_protocol_exclusive::<DevicePath>(device)?;
    Ok(DevicePathBuf::from_device_path(&device_path))
}

/// Loads every driver found in `dirs` on the boot manager's own volume.
///
/// A driver that fails to load is logged and skipped. Returns `true` if any driver was started.
///
/// # Errors
///
/// May return an `Error` if the boot manager's own volume cannot be opened.
pub fn load_drivers<S: AsRef<str>>(dirs: &[S]) -> BootResult<bool> {
    let device = image_device_path()?;

    // the listing is collected first so the filesystem is closed while images load
    let mut paths = Vec::new();
    {
        let device_handle = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())?
            .device()
            .ok_or(DriverError::NoDevice)?;
        let mut fs = UefiFileSystem::from_handle(device_handle)?;
        for dir in dirs {
            let Ok(listing) = fs.read_dir(dir.as_ref()) else {
                continue;
            };
            if let Some(e) = listing.error {
                warn!("Listing the driver directory {} stopped early: {e}", dir.as_ref());
            }
            // entries are in firmware order, which is usually alphabetical. dependent drivers should be named to sort later
            paths.extend(
                listing
                    .entries
                    .into_iter()
                    .filter(|x| !x.is_dir && x.size > 0 && eq_ci(find_extension(&x.name), ".efi"))
                    .map(|x| join_path(dir.as_ref(), &x.name)),
            );
        }
    }

    let mut driver_loaded = false;
    for path in &paths {
        match load_driver(&device, path) {
            Ok(()) => {
                info!("Loaded driver {path}");
                driver_loaded = true;
            }
            Err(e) => warn!("Failed to load driver {path}: {e}"),
        }
    }

    if driver_loaded {
        connect_all_controllers()?; // only reconnect when a driver was loaded
    }
    Ok(driver_loaded)
}

/// Connects every handle recursively so that drivers can take effect.
///
/// # Errors
///
/// May return an `Error` if the handle list cannot be retrieved.
pub fn connect_all_controllers() -> BootResult<()> {
    let handles = boot::locate_handle_buffer(boot::SearchType::AllHandles)?;
    for handle in handles.iter() {
        let _ = boot::connect_controller(*handle, None, None, true);
    }
    Ok(())
}

//! The [`Platform`] of real UEFI firmware.
//!
//! Most methods forward to the modules that already wrap a firmware service. What is left here is image loading,
//! the previous selection variable and the Legacy BIOS calls.

use alloc::{boxed::Box, format, string::String, vec::Vec};

use log::warn;
use uefi::{
    CString16, Handle, Status,
    boot::{self, LoadImageSource, SearchType},
    cstr16,
    proto::{BootPolicy, device_path::DevicePath, loaded_image::LoadedImage},
    runtime::{self, ResetType},
    system,
};

use crate::{
    BootResult,
    app::{FirmwareInfo, Platform, SelfLocation},
    boot::{
        action::firmware,
        apple::apple_set_os,
        launch::{ImageServices, SelectionStore},
        secure_boot::{self, SecureBootError},
    },
    legacy::{
        LegacyServices, LegacyStrategy,
        bbs::{self, BootOption, FirmwareBootOptions},
        mbr::{MbrError, activate_mbr_partition},
    },
    path::{clean_path_slashes, contains_ci},
    system::{
        block::UefiBlockIo,
        console::Console,
        devpath::DevicePathBuf,
        drivers::{self, DriverError},
        fs::{FileAccess, UefiFileSystem},
        helper::{locate_protocol, open_protocol_shared, protocol_exists, str_to_cstr, ucs2_bytes_to_string},
        protos::LegacyBios,
        variable::{get_variable_str, set_variable_str},
    },
    volume::{
        Volume,
        probe::{enumerate_volumes, reacquire_volumes, release_volumes},
    },
};

/// The watchdog code passed when disabling the timer. Codes up to `0xffff` belong to the firmware.
const WATCHDOG_CODE: u64 = 0x1_0000;

/// Firmware services of the machine the boot manager runs on.
#[derive(Default)]
pub struct UefiPlatform {
    /// The load options of the image being started, kept alive until the next launch.
    load_options: Option<CString16>,
}

impl UefiPlatform {
    /// Creates a new [`UefiPlatform`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new() -> Self {
        Self { load_options: None }
    }

    /// The device the boot manager was loaded from.
    fn self_device() -> BootResult<Handle> {
        Ok(boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())?
            .device()
            .ok_or(DriverError::NoDevice)?)
    }
}

impl ImageServices for UefiPlatform {
    type Image = Handle;

    fn load_image(&mut self, device_path: &DevicePathBuf) -> Result<Handle, Status> {
        let device_path = device_path
            .as_device_path()
            .map_err(|_| Status::INVALID_PARAMETER)?;
        let src = LoadImageSource::FromDevicePath {
            device_path,
            boot_policy: BootPolicy::ExactMatch,
        };
        boot::load_image(boot::image_handle(), src).map_err(|e| e.status())
    }

    fn set_load_options(&mut self, image: &Handle, options: &str) -> Result<(), Status> {
        let options = str_to_cstr(options).map_err(|_| Status::INVALID_PARAMETER)?;
        let mut loaded = boot::open_protocol_exclusive::<LoadedImage>(*image).map_err(|e| e.status())?;
        let size = u32::try_from(options.num_bytes()).unwrap_or(u32::MAX);

        // SAFETY: the buffer is stored in self below and lives until the next launch replaces it
        unsafe {
            loaded.set_load_options(options.as_ptr().cast::<u8>(), size);
        }
        self.load_options = Some(options);
        Ok(())
    }

    fn start_image(&mut self, image: &Handle) -> Result<(), Status> {
        boot::start_image(*image).map_err(|e| e.status())
    }

    fn unload_image(&mut self, image: Handle) {
        if let Err(e) = boot::unload_image(image) {
            warn!("Could not unload an image: {e}");
        }
    }

    fn release_volumes(&mut self, volumes: &mut [Volume]) {
        release_volumes(volumes);
    }

    fn reacquire_volumes(&mut self, volumes: &mut [Volume]) {
        reacquire_volumes(volumes);
    }

    fn secure_boot_active(&self) -> bool {
        secure_boot::secure_boot_enabled()
    }
}

impl SelectionStore for UefiPlatform {
    fn load_selection(&mut self) -> Option<String> {
        get_variable_str(cstr16!("PreviousBoot"), None)
            .inspect_err(|e| warn!("Could not read PreviousBoot: {e}"))
            .ok()
            .flatten()
    }

    fn save_selection(&mut self, name: &str) {
        if let Err(e) = set_variable_str(cstr16!("PreviousBoot"), None, None, name) {
            warn!("Could not write PreviousBoot: {e}");
        }
    }
}

impl LegacyServices for UefiPlatform {
    fn activate_partition(&mut self, volume: &Volume) -> Result<(), MbrError> {
        let disk = volume.whole_disk.ok_or(MbrError::Read(0))?;
        let mut io = UefiBlockIo::from_handle(disk).map_err(|_| MbrError::Read(0))?;
        activate_mbr_partition(&mut io, volume.mbr_partition_index)
    }

    fn loaded_image_device_paths(&mut self) -> Vec<DevicePathBuf> {
        let Ok(handles) = boot::locate_handle_buffer(SearchType::from_proto::<LoadedImage>()) else {
            return Vec::new();
        };
        handles
            .iter()
            .filter_map(|&handle| {
                let device = open_protocol_shared::<LoadedImage>(handle).ok()?.device()?;
                let device_path = open_protocol_shared::<DevicePath>(device).ok()?;
                Some(DevicePathBuf::from_device_path(&device_path))
            })
            .collect()
    }

    fn connect_device_path(&mut self, device_path: &DevicePathBuf) {
        let Ok(mut remaining) = device_path.as_device_path() else {
            return;
        };
        if let Ok(handle) = boot::locate_device_path::<DevicePath>(&mut remaining)
            && let Err(e) = boot::connect_controller(handle, None, Some(remaining), true)
        {
            warn!("Could not connect the controllers of a legacy boot device: {e}");
        }
    }

    fn legacy_boot(&mut self, option: &BootOption) -> Status {
        let Ok(mut bios) = locate_protocol::<LegacyBios>() else {
            return Status::UNSUPPORTED;
        };
        let Ok(device_path) = option.device_path.as_device_path() else {
            return Status::INVALID_PARAMETER;
        };
        // SAFETY: the device path was validated when the option was decoded, and starts with a BBS node
        unsafe { bios.legacy_boot(device_path.as_ffi_ptr(), &option.optional_data) }
    }
}

impl Platform for UefiPlatform {
    fn disable_watchdog(&mut self) {
        if let Err(e) = boot::set_watchdog_timer(0, WATCHDOG_CODE, None) {
            warn!("Could not disable the watchdog timer: {e}");
        }
    }

    fn image_load_options(&mut self) -> Option<String> {
        let image = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle()).ok()?;
        image.load_options_as_bytes().map(ucs2_bytes_to_string)
    }

    fn self_location(&mut self) -> BootResult<SelfLocation> {
        let image = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())?;
        let path = image
            .file_path()
            .map(DevicePathBuf::from_device_path)
            .and_then(|x| x.file_path())
            .map(|x| clean_path_slashes(&x))
            .unwrap_or_default();
        let device_path = image
            .device()
            .and_then(|x| open_protocol_shared::<DevicePath>(x).ok())
            .map(|x| DevicePathBuf::from_device_path(&x));
        Ok(SelfLocation { device_path, path })
    }

    fn open_self_fs(&mut self) -> BootResult<Box<dyn FileAccess>> {
        Ok(Box::new(UefiFileSystem::from_handle(Self::self_device()?)?))
    }

    fn install_secure_boot_policy(&mut self) -> BootResult<bool> {
        secure_boot::install_policy()
    }

    fn uninstall_secure_boot_policy(&mut self) -> Result<(), SecureBootError> {
        secure_boot::uninstall_policy()
    }

    fn load_drivers(&mut self, dirs: &[String]) -> BootResult<bool> {
        drivers::load_drivers(dirs)
    }

    fn connect_all_controllers(&mut self) {
        if let Err(e) = drivers::connect_all_controllers() {
            warn!("Could not connect controllers: {e}");
        }
    }

    fn legacy_strategy(&mut self) -> Option<LegacyStrategy> {
        // Apple firmware may carry the protocol too, but only boots legacy targets its own way
        if contains_ci(&format!("{}", system::firmware_vendor()), "Apple") {
            Some(LegacyStrategy::Mac)
        } else {
            protocol_exists::<LegacyBios>().then_some(LegacyStrategy::Firmware)
        }
    }

    fn boot_options(&mut self, refresh: bool) -> Vec<BootOption> {
        let mut store = FirmwareBootOptions;
        if refresh {
            bbs::refresh_legacy_boot_options(&mut store);
        }
        bbs::read_boot_options(&mut store)
    }

    fn enumerate_volumes(&mut self) -> BootResult<Vec<Volume>> {
        enumerate_volumes()
    }

    fn stall(&mut self, microseconds: usize) {
        boot::stall(microseconds);
    }

    fn apple_set_os(&mut self) {
        if let Err(e) = apple_set_os() {
            warn!("Could not announce macOS to the firmware: {e}");
        }
    }

    fn firmware_ui_supported(&mut self) -> bool {
        firmware::firmware_ui_supported()
    }

    fn firmware_info(&self) -> FirmwareInfo {
        let revision = system::uefi_revision();
        FirmwareInfo {
            uefi_major: revision.major(),
            uefi_minor: revision.minor(),
            vendor: format!("{}", system::firmware_vendor()),
            revision: system::firmware_revision(),
        }
    }

    fn reset(&mut self, kind: ResetType) {
        runtime::reset(kind, Status::SUCCESS, None);
    }

    fn reboot_to_firmware(&mut self, console: &mut dyn Console) {
        firmware::reboot_to_firmware(console);
    }
}

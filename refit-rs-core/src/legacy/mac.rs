//! Legacy boot on Apple firmware.
//!
//! Apple firmware boots BIOS operating systems with a legacy loader image stored in the firmware volume. Its
//! location differs between hardware generations, and there is no documented way to find it. It is searched for
//! next to every firmware volume an image was loaded from, then at a table of locations known from earlier
//! machines.
//!
//! The load options of the loader name the kind of media to boot (`HD`, `USB` or `CD`).

use log::{debug, warn};
use tinyvec::ArrayVec;
use uefi::Status;

use crate::{
    boot::launch::{
        ImageKind, ImageServices, LaunchError, LaunchRequest, SelectionStore, finish_external_screen,
        start_image_list, store_selection,
    },
    legacy::{LegacyEntry, LegacyServices},
    system::{
        console::Console,
        devpath::{DevicePathBuf, HARDWARE_DEVICE_PATH, HW_MEMMAP_DP, MEDIA_DEVICE_PATH, MEDIA_PIWG_FW_FILE_DP},
    },
    volume::Volume,
};

/// The title of the screen shown while booting.
pub const MAC_SCREEN_TITLE: &str = "Booting Legacy OS (Mac mode)";

/// The most device paths that are tried.
pub const MAX_DISCOVERED_PATHS: usize = 16;

/// The title used in launch messages.
const LOADER_TITLE: &str = "legacy loader";

/// The firmware file GUID of Apple's legacy loader, in its on-disk byte order.
const LEGACY_LOADER_GUID: [u8; 16] = [
    0xeb, 0x85, 0x05, 0x2b, 0xb8, 0xd8, 0xa9, 0x49, 0x8b, 0x8c, 0xe2, 0x1b, 0x01, 0xae, 0xf2, 0xb7,
];

/// Known locations of the legacy loader: a memory mapped firmware volume, then the loader's firmware file.
const LEGACY_LOADER_PATHS: [[u8; 48]; 5] = [
    [
        0x01, 0x03, 0x18, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe0, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
        0xf9, 0xff, 0x00, 0x00, 0x00, 0x00, 0x04, 0x06, 0x14, 0x00, 0xeb, 0x85, 0x05, 0x2b, 0xb8, 0xd8, 0xa9, 0x49,
        0x8b, 0x8c, 0xe2, 0x1b, 0x01, 0xae, 0xf2, 0xb7, 0x7f, 0xff, 0x04, 0x00,
    ],
    [
        0x01, 0x03, 0x18, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe0, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
        0xf7, 0xff, 0x00, 0x00, 0x00, 0x00, 0x04, 0x06, 0x14, 0x00, 0xeb, 0x85, 0x05, 0x2b, 0xb8, 0xd8, 0xa9, 0x49,
        0x8b, 0x8c, 0xe2, 0x1b, 0x01, 0xae, 0xf2, 0xb7, 0x7f, 0xff, 0x04, 0x00,
    ],
    [
        0x01, 0x03, 0x18, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe0, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
        0xf8, 0xff, 0x00, 0x00, 0x00, 0x00, 0x04, 0x06, 0x14, 0x00, 0xeb, 0x85, 0x05, 0x2b, 0xb8, 0xd8, 0xa9, 0x49,
        0x8b, 0x8c, 0xe2, 0x1b, 0x01, 0xae, 0xf2, 0xb7, 0x7f, 0xff, 0x04, 0x00,
    ],
    [
        0x01, 0x03, 0x18, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
        0xf8, 0xff, 0x00, 0x00, 0x00, 0x00, 0x04, 0x06, 0x14, 0x00, 0xeb, 0x85, 0x05, 0x2b, 0xb8, 0xd8, 0xa9, 0x49,
        0x8b, 0x8c, 0xe2, 0x1b, 0x01, 0xae, 0xf2, 0xb7, 0x7f, 0xff, 0x04, 0x00,
    ],
    [
        0x01, 0x03, 0x18, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x00, 0x40, 0xcb, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xbf,
        0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x04, 0x06, 0x14, 0x00, 0xeb, 0x85, 0x05, 0x2b, 0xb8, 0xd8, 0xa9, 0x49,
        0x8b, 0x8c, 0xe2, 0x1b, 0x01, 0xae, 0xf2, 0xb7, 0x7f, 0xff, 0x04, 0x00,
    ],
];

/// Builds the device paths the legacy loader is searched at.
///
/// `image_paths` are the device paths of the devices images were loaded from. Those on a memory mapped firmware
/// volume come first, with the loader's firmware file appended, then the fixed locations follow.
#[must_use = "Has no effect if the result is unused"]
pub fn discover_legacy_paths(image_paths: &[DevicePathBuf]) -> ArrayVec<[DevicePathBuf; MAX_DISCOVERED_PATHS]> {
    let mut paths = ArrayVec::new();

    for image_path in image_paths {
        if paths.len() >= MAX_DISCOVERED_PATHS {
            return paths;
        }
        if !image_path
            .first_node()
            .is_some_and(|x| x.is(HARDWARE_DEVICE_PATH, HW_MEMMAP_DP))
        {
            continue;
        }
        let mut path = image_path.clone();
        if path.push(MEDIA_DEVICE_PATH, MEDIA_PIWG_FW_FILE_DP, &LEGACY_LOADER_GUID).is_err() {
            continue;
        }
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    for bytes in &LEGACY_LOADER_PATHS {
        if paths.len() >= MAX_DISCOVERED_PATHS {
            break;
        }
        match DevicePathBuf::from_bytes(bytes) {
            Ok(path) if !paths.contains(&path) => paths.push(path),
            Ok(_) => (),
            Err(e) => warn!("Skipping a malformed legacy loader path: {e}"),
        }
    }

    paths
}

/// Prints the remediation text for a legacy loader that was not found.
fn explain_not_found(console: &mut dyn Console, e: &LaunchError) {
    if e.status() != Status::NOT_FOUND {
        return;
    }
    match e.step() {
        Some(1) => console.print_line("Please make sure that you have the latest firmware update installed."),
        Some(3) => {
            console.print_line("The firmware refused to boot from the selected volume. Note that external");
            console.print_line("hard drives are not well-supported by Apple's firmware for legacy OS booting.");
        }
        _ => (),
    }
}

/// Boots the legacy boot code of a volume through Apple's legacy loader.
///
/// An MBR partition is made the active partition of its disk first. If that fails, nothing is booted.
///
/// # Errors
///
/// May return an `Error` if the partition could not be activated, or the legacy loader could not be started. The
/// user has already acknowledged it.
pub fn start_legacy<S: ImageServices + LegacyServices + SelectionStore + ?Sized>(
    services: &mut S,
    console: &mut dyn Console,
    volumes: &mut [Volume],
    entry: &LegacyEntry,
    selection: Option<&str>,
) -> crate::BootResult<()> {
    console.begin_text_screen(MAC_SCREEN_TITLE);

    if let Some(volume) = volumes.get(entry.volume)
        && volume.is_mbr_partition
        && let Err(e) = services.activate_partition(volume)
    {
        warn!("Could not activate MBR partition {}: {e}", volume.mbr_partition_index);
        console.print_error(&alloc::format!("Error: {e} while activating the partition"));
        console.pause_for_key();
        return Err(e.into());
    }

    let image_paths = services.loaded_image_device_paths();
    let paths = discover_legacy_paths(&image_paths);
    debug!("Trying {} legacy loader locations", paths.len());

    if let Some(name) = selection {
        store_selection(services, name);
    }

    let request = LaunchRequest {
        device_paths: &paths,
        load_options: Some(entry.load_options),
        kind: ImageKind::Legacy,
        title: LOADER_TITLE,
        os_type: None,
        verbose: true,
        is_driver: false,
    };
    let result = start_image_list(services, console, volumes, &request);
    if let Err(e) = &result {
        explain_not_found(console, e);
    }
    finish_external_screen(console, &result);
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boot::launch::mock::MockImages,
        error::BootError,
        legacy::{bbs::BootOption, mbr::MbrError},
        system::console::RecordingConsole,
    };
    use alloc::{string::String, vec, vec::Vec};

    fn memmap(start: u64, end: u64) -> DevicePathBuf {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0bu32.to_le_bytes());
        data.extend_from_slice(&start.to_le_bytes());
        data.extend_from_slice(&end.to_le_bytes());
        let mut path = DevicePathBuf::new();
        path.push(HARDWARE_DEVICE_PATH, HW_MEMMAP_DP, &data).expect("node fits");
        path
    }

    #[test]
    fn test_fixed_paths() {
        let paths = discover_legacy_paths(&[]);
        assert_eq!(paths.len(), LEGACY_LOADER_PATHS.len());
        assert_eq!(paths[0].as_bytes(), LEGACY_LOADER_PATHS[0]);

        let first = paths[0].nodes().collect::<Vec<_>>();
        assert_eq!(first.len(), 2);
        assert!(first[0].is(HARDWARE_DEVICE_PATH, HW_MEMMAP_DP));
        assert!(first[1].is(MEDIA_DEVICE_PATH, MEDIA_PIWG_FW_FILE_DP));
        assert_eq!(first[1].data, LEGACY_LOADER_GUID);
    }

    #[test]
    fn test_loaded_images_first() {
        let mut not_memmap = DevicePathBuf::new();
        not_memmap
            .push(MEDIA_DEVICE_PATH, MEDIA_PIWG_FW_FILE_DP, &[0; 16])
            .expect("node fits");
        let images = [
            memmap(0xffe0_0000, 0xffff_ffff),
            not_memmap,
            memmap(0xffe0_0000, 0xffff_ffff),
            // the same as the second fixed path
            memmap(0xffe0_0000, 0xfff7_ffff),
        ];
        let paths = discover_legacy_paths(&images);

        assert_eq!(paths.len(), 2 + LEGACY_LOADER_PATHS.len() - 1);
        assert!(paths[0].first_node().expect("node").data.starts_with(&[0x0b, 0, 0, 0, 0, 0, 0xe0, 0xff]));
        assert_eq!(paths[1].as_bytes(), LEGACY_LOADER_PATHS[1]);
        assert_eq!(paths[2].as_bytes(), LEGACY_LOADER_PATHS[0]);
    }

    #[test]
    fn test_path_limit() {
        let images: Vec<DevicePathBuf> = (0..20).map(|x| memmap(x * 0x1000, x * 0x1000 + 0xfff)).collect();
        let paths = discover_legacy_paths(&images);
        assert_eq!(paths.len(), MAX_DISCOVERED_PATHS);
        assert!(!paths.iter().any(|x| x.as_bytes() == LEGACY_LOADER_PATHS[0]));
    }

    #[derive(Default)]
    struct MacFirmware {
        images: MockImages,
        activation: Option<MbrError>,
        activated: Vec<usize>,
    }

    impl ImageServices for MacFirmware {
        type Image = usize;

        fn load_image(&mut self, device_path: &DevicePathBuf) -> Result<usize, Status> {
            self.images.load_image(device_path)
        }

        fn set_load_options(&mut self, image: &usize, options: &str) -> Result<(), Status> {
            self.images.set_load_options(image, options)
        }

        fn start_image(&mut self, image: &usize) -> Result<(), Status> {
            self.images.start_image(image)
        }

        fn unload_image(&mut self, image: usize) {
            self.images.unload_image(image);
        }

        fn release_volumes(&mut self, volumes: &mut [Volume]) {
            self.images.release_volumes(volumes);
        }

        fn reacquire_volumes(&mut self, volumes: &mut [Volume]) {
            self.images.reacquire_volumes(volumes);
        }

        fn secure_boot_active(&self) -> bool {
            false
        }
    }

    impl LegacyServices for MacFirmware {
        fn activate_partition(&mut self, volume: &Volume) -> Result<(), MbrError> {
            self.activated.push(volume.mbr_partition_index);
            self.activation.map_or(Ok(()), Err)
        }

        fn loaded_image_device_paths(&mut self) -> Vec<DevicePathBuf> {
            Vec::new()
        }

        fn connect_device_path(&mut self, _device_path: &DevicePathBuf) {}

        fn legacy_boot(&mut self, _option: &BootOption) -> Status {
            Status::UNSUPPORTED
        }
    }

    impl SelectionStore for MacFirmware {
        fn load_selection(&mut self) -> Option<String> {
            self.images.load_selection()
        }

        fn save_selection(&mut self, name: &str) {
            self.images.save_selection(name);
        }
    }

    fn mbr_volume() -> Volume {
        Volume {
            is_mbr_partition: true,
            mbr_partition_index: 5,
            ..Volume::default()
        }
    }

    #[test]
    fn test_boot_mbr_partition() -> crate::BootResult<()> {
        let mut firmware = MacFirmware {
            images: MockImages {
                loads: [Err(Status::NOT_FOUND), Ok(())].into(),
                ..MockImages::default()
            },
            ..MacFirmware::default()
        };
        let mut console = RecordingConsole::default();
        let mut volumes = vec![mbr_volume()];
        let entry = LegacyEntry {
            volume: 0,
            load_options: "HD",
        };

        start_legacy(&mut firmware, &mut console, &mut volumes, &entry, Some("Boot Windows from XP"))?;
        assert_eq!(firmware.activated, [5]);
        assert_eq!(firmware.images.options, ["HD"]);
        assert_eq!(firmware.images.stored.as_deref(), Some("Boot Windows from XP"));
        assert_eq!(console.screens, [MAC_SCREEN_TITLE]);
        assert_eq!(console.lines, ["Starting legacy loader", "Using load options 'HD'"]);
        Ok(())
    }

    #[test]
    fn test_failed_activation_aborts() {
        let mut firmware = MacFirmware {
            activation: Some(MbrError::BadSignature(0)),
            ..MacFirmware::default()
        };
        let mut console = RecordingConsole::default();
        let mut volumes = vec![mbr_volume()];
        let entry = LegacyEntry {
            volume: 0,
            load_options: "HD",
        };

        let result = start_legacy(&mut firmware, &mut console, &mut volumes, &entry, Some("Boot"));
        assert!(matches!(result, Err(BootError::MbrError(MbrError::BadSignature(0)))));
        assert!(firmware.images.calls.is_empty());
        assert_eq!(firmware.images.stored, None);
        assert_eq!(console.pauses, 1);
    }

    #[test]
    fn test_loader_not_found() {
        let mut firmware = MacFirmware::default();
        let mut console = RecordingConsole::default();
        let mut volumes = vec![Volume::default()];
        let entry = LegacyEntry {
            volume: 0,
            load_options: "CD",
        };

        let result = start_legacy(&mut firmware, &mut console, &mut volumes, &entry, None);
        assert!(matches!(
            &result,
            Err(BootError::LaunchError(e @ LaunchError::Load { .. })) if e.status() == Status::NOT_FOUND
        ));
        assert!(firmware.activated.is_empty());
        assert_eq!(firmware.images.calls.len(), LEGACY_LOADER_PATHS.len());
        assert_eq!(
            console.lines.last().map(String::as_str),
            Some("Please make sure that you have the latest firmware update installed.")
        );
        assert_eq!(console.pauses, 1);
    }

    #[test]
    fn test_loader_refused_volume() {
        let mut firmware = MacFirmware {
            images: MockImages {
                loads: [Ok(())].into(),
                start_result: Some(Status::NOT_FOUND),
                ..MockImages::default()
            },
            ..MacFirmware::default()
        };
        let mut console = RecordingConsole::default();
        let mut volumes = vec![Volume::default()];
        let entry = LegacyEntry {
            volume: 0,
            load_options: "USB",
        };

        let result = start_legacy(&mut firmware, &mut console, &mut volumes, &entry, None);
        assert!(result.is_err());
        assert!(console.lines.iter().any(|x| x.starts_with("The firmware refused to boot")));
    }
}

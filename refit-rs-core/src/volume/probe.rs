//! Enumerates the volumes the firmware exposes.
//!
//! Every handle with `BlockIO` becomes a [`Volume`]. Partitions are tied to their whole disk by device path prefix,
//! the first sector of each volume is checked for legacy boot code, and volumes with a filesystem are opened for
//! scanning.

use alloc::{boxed::Box, string::String, vec, vec::Vec};

use gpt_disk_io::{BlockIo, Disk};
use gpt_disk_types::Lba;
use log::{debug, warn};
use uefi::{
    Handle, boot,
    proto::{device_path::DevicePath, media::block::BlockIO, media::fs::SimpleFileSystem},
};

use crate::{
    BootResult,
    system::{
        block::UefiBlockIo,
        devpath::{
            DevicePathBuf, MEDIA_CDROM_DP, MEDIA_DEVICE_PATH, MESSAGING_DEVICE_PATH, MSG_USB_DP,
        },
        fs::UefiFileSystem,
        helper::open_protocol_shared,
    },
    volume::{DiskKind, Volume, detect_boot_code},
};

/// The largest block size that the first sector is read with.
const MAX_BLOCK_SIZE: usize = 4096;

/// What is known about a `BlockIO` handle before it becomes a [`Volume`].
struct BlockHandle {
    /// The handle.
    handle: Handle,
    /// Its device path.
    device_path: DevicePathBuf,
    /// If the handle is a partition rather than a whole disk.
    is_partition: bool,
    /// If the media is removable.
    removable: bool,
}

/// Enumerates every volume with present media.
///
/// Volumes that cannot be inspected are logged and skipped.
///
/// # Errors
///
/// May return an `Error` if the firmware cannot list `BlockIO` handles.
pub fn enumerate_volumes() -> BootResult<Vec<Volume>> {
    let handles = boot::locate_handle_buffer(boot::SearchType::from_proto::<BlockIO>())?;

    let mut blocks = Vec::new();
    for &handle in handles.iter() {
        let Ok(block) = open_protocol_shared::<BlockIO>(handle) else {
            continue;
        };
        let media = block.media();
        if !media.is_media_present() {
            continue;
        }
        let Ok(device_path) = open_protocol_shared::<DevicePath>(handle) else {
            continue;
        };
        blocks.push(BlockHandle {
            handle,
            device_path: DevicePathBuf::from_device_path(&device_path),
            is_partition: media.is_logical_partition(),
            removable: media.is_removable_media(),
        });
    }

    let disks: Vec<(usize, &BlockHandle)> = blocks
        .iter()
        .filter(|x| !x.is_partition)
        .enumerate()
        .collect();

    let mut volumes = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let disk = if block.is_partition {
            disks
                .iter()
                .find(|(_, disk)| disk.device_path.is_prefix_of(&block.device_path))
                .copied()
        } else {
            disks
                .iter()
                .find(|(_, disk)| disk.handle == block.handle)
                .copied()
        };

        let volume = probe_volume(block, disk);
        debug!("Found volume {volume:?}");
        volumes.push(volume);
    }

    Ok(volumes)
}

/// Builds a [`Volume`] for one `BlockIO` handle.
fn probe_volume(block: &BlockHandle, disk: Option<(usize, &BlockHandle)>) -> Volume {
    let mut volume = Volume {
        handle: Some(block.handle),
        device_path: Some(block.device_path.clone()),
        disk_kind: disk_kind(&block.device_path, block.removable),
        is_whole_disk: !block.is_partition,
        disk_id: disk.map(|(id, _)| id),
        whole_disk: disk.map(|(_, x)| x.handle),
        ..Volume::default()
    };

    if let Ok(mut io) = UefiBlockIo::from_handle(block.handle) {
        let mut sector = vec![0; usize::try_from(io.block_size().to_u64()).unwrap_or(512).min(MAX_BLOCK_SIZE)];
        if io.read_blocks(Lba(0), &mut sector).is_ok() {
            volume.boot_code = detect_boot_code(&sector);
        }
    }

    let hard_drive = block.device_path.nodes().find_map(|x| x.hard_drive());
    if let Some((number, is_mbr)) = hard_drive {
        if is_mbr {
            volume.is_mbr_partition = true;
            volume.mbr_partition_index = number.saturating_sub(1) as usize;
        } else if let Some((_, disk)) = disk {
            volume.part_name = gpt_partition_name(disk.handle, number);
        }
    }

    if boot::test_protocol::<SimpleFileSystem>(boot::OpenProtocolParams {
        handle: block.handle,
        agent: boot::image_handle(),
        controller: None,
    })
    .unwrap_or(false)
    {
        match open_volume(block.handle) {
            Ok((fs, name)) => {
                volume.name = name;
                volume.fs = Some(fs);
            }
            Err(e) => warn!("Could not open filesystem: {e}"),
        }
    }

    volume
}

/// Opens the filesystem on a handle and reads its label.
fn open_volume(handle: Handle) -> BootResult<(Box<UefiFileSystem>, Option<String>)> {
    let mut fs = UefiFileSystem::from_handle(handle)?;
    let name = fs.volume_label().ok().filter(|x| !x.is_empty());
    Ok((Box::new(fs), name))
}

/// Classifies the disk from its device path.
fn disk_kind(device_path: &DevicePathBuf, removable: bool) -> DiskKind {
    if device_path
        .nodes()
        .any(|x| x.is(MEDIA_DEVICE_PATH, MEDIA_CDROM_DP))
    {
        DiskKind::Optical
    } else if removable
        || device_path
            .nodes()
            .any(|x| x.is(MESSAGING_DEVICE_PATH, MSG_USB_DP))
    {
        DiskKind::External
    } else {
        DiskKind::Internal
    }
}

/// Reads the name of GPT partition `number` (counting from 1) from a whole disk.
fn gpt_partition_name(disk: Handle, number: u32) -> Option<String> {
    let io = UefiBlockIo::from_handle(disk).ok()?;
    let mut buf = vec![0; usize::try_from(io.block_size().to_u64()).ok()?];
    let mut disk = Disk::new(io).ok()?;

    let header = disk.read_primary_gpt_header(&mut buf).ok()?;
    let layout = header.get_partition_entry_array_layout().ok()?;
    let mut entries = disk.gpt_partition_entry_array_iter(layout, &mut buf).ok()?;
    let entry = entries.nth(number.checked_sub(1)? as usize)?.ok()?;

    let name = alloc::format!("{}", entry.name);
    (!name.is_empty()).then_some(name)
}

/// Drops the filesystem handles of every volume, so a started image can open them.
pub fn release_volumes(volumes: &mut [Volume]) {
    for volume in volumes {
        volume.fs = None;
    }
}

/// Reopens the filesystem handles dropped by [`release_volumes`].
pub fn reacquire_volumes(volumes: &mut [Volume]) {
    for volume in volumes.iter_mut().filter(|x| x.fs.is_none()) {
        let Some(handle) = volume.handle else {
            continue;
        };
        if let Ok(fs) = UefiFileSystem::from_handle(handle) {
            volume.fs = Some(Box::new(fs));
        }
    }
}

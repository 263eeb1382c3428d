// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Marks one MBR partition as the active (bootable) one.
//!
//! BIOS boot code loads the first sector of whichever partition carries the `0x80` status flag, so before a legacy
//! OS on an MBR partition can be booted its entry has to be flagged and every other entry cleared. Logical
//! partitions live in a chain of extended boot records (EBRs). To boot one, the extended partition holding the
//! chain is flagged in the MBR, every link leading to the target is flagged, and the target itself is flagged in
//! its EBR.
//!
//! Every sector is checked for the boot signature and sane status flags before anything is written. A failure
//! part way through a chain leaves the sectors written so far as they are.

use alloc::vec;

use bytemuck::{Pod, Zeroable};
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use log::{info, warn};
use thiserror::Error;

/// The smallest sector that holds a partition table.
const SECTOR_SIZE: usize = 512;

/// The part of the MBR holding boot code.
const BOOT_CODE_SIZE: usize = 440;

/// Where the partition table starts.
const TABLE_OFFSET: usize = 446;

/// The number of entries in any partition table.
const TABLE_ENTRIES: usize = 4;

/// Where the boot signature is.
const SIGNATURE_OFFSET: usize = 510;

/// The boot signature.
const SIGNATURE: [u8; 2] = [0x55, 0xaa];

/// The status flag of an active partition.
const ACTIVE: u8 = 0x80;

/// Partition types that point to an extended partition.
const EXTENDED_TYPES: [u8; 3] = [0x05, 0x0f, 0x85];

/// The longest EBR chain that is followed.
const MAX_CHAIN_LEN: usize = 128;

/// Boot code installed into an MBR that has none.
///
/// It relocates itself to `0x0600`, finds the active primary partition, reads its first sector to `0x7c00` with
/// the extended disk read service and jumps to it with `DL` still holding the boot drive and `DS:SI` pointing at
/// the partition entry. It falls back to `int 0x18` when there is no active partition, the read fails or the
/// loaded sector has no boot signature.
const BOOT_STUB: [u8; 93] = [
    0xfa, 0x31, 0xc0, 0x8e, 0xd0, 0xbc, 0x00, 0x7c, 0x8e, 0xd8, 0x8e, 0xc0, 0xfb, 0xbe, 0x00, 0x7c, //
    0xbf, 0x00, 0x06, 0xb9, 0x00, 0x01, 0xfc, 0xf3, 0xa5, 0xea, 0x1e, 0x06, 0x00, 0x00, 0xbe, 0xbe, //
    0x07, 0xb1, 0x04, 0x80, 0x3c, 0x80, 0x74, 0x07, 0x83, 0xc6, 0x10, 0xe2, 0xf6, 0xcd, 0x18, 0x6a, //
    0x00, 0x6a, 0x00, 0xff, 0x74, 0x0a, 0xff, 0x74, 0x08, 0x6a, 0x00, 0x68, 0x00, 0x7c, 0x6a, 0x01, //
    0x6a, 0x10, 0x89, 0xf5, 0x89, 0xe6, 0xb4, 0x42, 0xcd, 0x13, 0x89, 0xee, 0x72, 0x0d, 0x81, 0x3e, //
    0xfe, 0x7d, 0x55, 0xaa, 0x75, 0x05, 0xea, 0x00, 0x7c, 0x00, 0x00, 0xcd, 0x18,
];

/// An `Error` that may result from activating a partition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbrError {
    /// A sector could not be read.
    #[error("Could not read sector {0}")]
    Read(u64),

    /// A sector could not be written.
    #[error("Could not write sector {0}")]
    Write(u64),

    /// A sector did not end with the boot signature.
    #[error("Sector {0} has no boot signature")]
    BadSignature(u64),

    /// A partition table had a status flag other than inactive or active.
    #[error("Partition table in sector {0} has invalid status flags")]
    BadFlags(u64),

    /// A logical partition was requested on a disk without an extended partition.
    #[error("The disk has no extended partition")]
    NoExtendedPartition,

    /// The requested partition is not in the partition table or the EBR chain.
    #[error("Partition {0} was not found")]
    NotFound(usize),

    /// The EBR chain is longer than any real disk would have, or loops.
    #[error("The extended partition chain is too long")]
    ChainTooLong,
}

/// One entry of an MBR or EBR partition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct PartitionEntry {
    /// `0x80` if active, `0x00` otherwise.
    flags: u8,
    /// CHS address of the first sector.
    start_chs: [u8; 3],
    /// The partition type.
    kind: u8,
    /// CHS address of the last sector.
    end_chs: [u8; 3],
    /// Little-endian first sector.
    start_lba: [u8; 4],
    /// Little-endian sector count.
    size: [u8; 4],
}

impl PartitionEntry {
    /// The first sector.
    fn start_lba(&self) -> u32 {
        u32::from_le_bytes(self.start_lba)
    }

    /// The sector count.
    fn size(&self) -> u32 {
        u32::from_le_bytes(self.size)
    }

    /// Checks if the entry points to an extended partition or the next EBR.
    fn is_extended(&self) -> bool {
        EXTENDED_TYPES.contains(&self.kind)
    }

    /// An unused slot, which also ends a table.
    fn is_unused(&self) -> bool {
        self.start_lba() == 0 || self.size() == 0
    }
}

/// The partition table of a sector.
fn table_mut(sector: &mut [u8]) -> &mut [PartitionEntry] {
    bytemuck::cast_slice_mut(&mut sector[TABLE_OFFSET..TABLE_OFFSET + TABLE_ENTRIES * size_of::<PartitionEntry>()])
}

/// Reads a sector and checks its signature and status flags.
fn read_table<B: BlockIo>(io: &mut B, lba: u64, sector: &mut [u8]) -> Result<(), MbrError> {
    io.read_blocks(Lba(lba), sector).map_err(|e| {
        warn!("Could not read sector {lba}: {e}");
        MbrError::Read(lba)
    })?;

    if sector[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2] != SIGNATURE {
        return Err(MbrError::BadSignature(lba));
    }
    if table_mut(sector)
        .iter()
        .any(|x| x.flags != 0 && x.flags != ACTIVE)
    {
        return Err(MbrError::BadFlags(lba));
    }
    Ok(())
}

/// Writes a sector back.
fn write_table<B: BlockIo>(io: &mut B, lba: u64, sector: &[u8]) -> Result<(), MbrError> {
    io.write_blocks(Lba(lba), sector).map_err(|e| {
        warn!("Could not write sector {lba}: {e}");
        MbrError::Write(lba)
    })
}

/// Marks the MBR partition `index` as the only active one.
///
/// Indices 0 to 3 are primary partitions. Index 4 and up are logical partitions, counted along the EBR chain of
/// the first extended partition. When the MBR carries no boot code at all, a small boot stub is installed so the
/// firmware has something to run.
///
/// Activating the same index twice leaves the disk exactly as the first run did.
///
/// # Errors
///
/// May return an `Error` if a sector cannot be read or written, a table is damaged, or the logical partition does
/// not exist.
pub fn activate_mbr_partition<B: BlockIo>(io: &mut B, index: usize) -> Result<(), MbrError> {
    let block_size = io
        .block_size()
        .to_usize()
        .unwrap_or(SECTOR_SIZE)
        .max(SECTOR_SIZE);
    let mut sector = vec![0; block_size];
    read_table(io, 0, &mut sector)?;

    if sector[..BOOT_CODE_SIZE].iter().all(|&x| x == 0) {
        info!("MBR has no boot code, installing boot stub");
        sector[..BOOT_STUB.len()].copy_from_slice(&BOOT_STUB);
    }

    let logical = index >= TABLE_ENTRIES;
    if !logical && table_mut(&mut sector)[index].is_unused() {
        return Err(MbrError::NotFound(index));
    }

    let mut ext_base = None;
    for (i, entry) in table_mut(&mut sector).iter_mut().enumerate() {
        if i == index {
            entry.flags = ACTIVE;
        } else if logical && ext_base.is_none() && entry.is_extended() {
            entry.flags = ACTIVE;
            ext_base = Some(u64::from(entry.start_lba()));
        } else {
            entry.flags = 0;
        }
    }

    if logical && ext_base.is_none() {
        return Err(MbrError::NoExtendedPartition);
    }
    write_table(io, 0, &sector)?;

    if let Some(base) = ext_base {
        activate_logical(io, index, base, &mut sector)?;
    }

    io.flush().map_err(|e| {
        warn!("Could not flush disk: {e}");
        MbrError::Write(0)
    })
}

/// Walks the whole EBR chain starting at `base`, flagging the links that lead to logical partition `index` and the
/// partition itself, and clearing everything else.
///
/// The walk does not stop at `index`: the flags of every logical partition after it, and of the links leading to
/// them, are cleared as well. This leaves exactly one flagged logical partition even when an earlier activation
/// flagged one further down the chain.
fn activate_logical<B: BlockIo>(io: &mut B, index: usize, base: u64, sector: &mut [u8]) -> Result<(), MbrError> {
    let mut current = base;
    let mut counter = TABLE_ENTRIES;

    for _ in 0..MAX_CHAIN_LEN {
        read_table(io, current, sector)?;

        let mut next = None;
        for entry in table_mut(sector) {
            if entry.is_unused() {
                break;
            }
            if entry.is_extended() {
                // link offsets are relative to the start of the extended partition
                next = Some(base + u64::from(entry.start_lba()));
                entry.flags = if index >= counter { ACTIVE } else { 0 };
                break;
            }
            entry.flags = if index == counter { ACTIVE } else { 0 };
            counter += 1;
        }

        write_table(io, current, sector)?;

        match next {
            Some(lba) => current = lba,
            None if index < counter => return Ok(()),
            None => return Err(MbrError::NotFound(index)),
        }
    }

    Err(MbrError::ChainTooLong)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpt_disk_io::BlockIoAdapter as MutSliceBlockIo;
    use gpt_disk_types::BlockSize;
    use proptest::prelude::*;

    /// The number of sectors in a test disk.
    const DISK_SECTORS: usize = 64;

    fn set_entry(disk: &mut [u8], lba: usize, slot: usize, flags: u8, kind: u8, start: u32, size: u32) {
        let offset = lba * SECTOR_SIZE + TABLE_OFFSET + slot * 16;
        disk[offset] = flags;
        disk[offset + 4] = kind;
        disk[offset + 8..offset + 12].copy_from_slice(&start.to_le_bytes());
        disk[offset + 12..offset + 16].copy_from_slice(&size.to_le_bytes());
    }

    fn sign(disk: &mut [u8], lba: usize) {
        let offset = lba * SECTOR_SIZE + SIGNATURE_OFFSET;
        disk[offset..offset + 2].copy_from_slice(&SIGNATURE);
    }

    fn flags(disk: &[u8], lba: usize) -> [u8; 4] {
        core::array::from_fn(|slot| disk[lba * SECTOR_SIZE + TABLE_OFFSET + slot * 16])
    }

    /// A disk with two primaries and an extended partition at sector 10 holding three logical partitions in EBRs
    /// at sectors 10, 20 and 30.
    fn test_disk() -> Vec<u8> {
        let mut disk = vec![0; DISK_SECTORS * SECTOR_SIZE];
        disk[0] = 0xeb;
        set_entry(&mut disk, 0, 0, ACTIVE, 0x07, 2, 4);
        set_entry(&mut disk, 0, 1, 0, 0x83, 6, 4);
        set_entry(&mut disk, 0, 2, 0, 0x0f, 10, 40);
        sign(&mut disk, 0);

        set_entry(&mut disk, 10, 0, 0, 0x83, 1, 5);
        set_entry(&mut disk, 10, 1, 0, 0x05, 10, 10);
        sign(&mut disk, 10);
        set_entry(&mut disk, 20, 0, 0, 0x83, 1, 5);
        set_entry(&mut disk, 20, 1, 0, 0x05, 20, 10);
        sign(&mut disk, 20);
        set_entry(&mut disk, 30, 0, 0, 0x83, 1, 5);
        sign(&mut disk, 30);
        disk
    }

    fn activate(disk: &mut [u8], index: usize) -> Result<(), MbrError> {
        let mut io = MutSliceBlockIo::new(disk, BlockSize::BS_512);
        activate_mbr_partition(&mut io, index)
    }

    #[test]
    fn test_primary() -> Result<(), MbrError> {
        let mut disk = test_disk();
        activate(&mut disk, 1)?;
        assert_eq!(flags(&disk, 0), [0, ACTIVE, 0, 0]);
        assert_eq!(disk[0], 0xeb);
        assert_eq!(flags(&disk, 10), [0; 4]);
        Ok(())
    }

    #[test]
    fn test_logical() -> Result<(), MbrError> {
        let mut disk = test_disk();
        activate(&mut disk, 6)?;
        assert_eq!(flags(&disk, 0), [0, 0, ACTIVE, 0]);
        assert_eq!(flags(&disk, 10), [0, ACTIVE, 0, 0]);
        assert_eq!(flags(&disk, 20), [0, ACTIVE, 0, 0]);
        assert_eq!(flags(&disk, 30), [ACTIVE, 0, 0, 0]);

        activate(&mut disk, 4)?;
        assert_eq!(flags(&disk, 10), [ACTIVE, 0, 0, 0]);
        assert_eq!(flags(&disk, 20), [0; 4]);
        assert_eq!(flags(&disk, 30), [0; 4]);
        Ok(())
    }

    #[test]
    fn test_boot_stub() -> Result<(), MbrError> {
        let mut disk = test_disk();
        disk[0] = 0;
        activate(&mut disk, 0)?;
        assert_eq!(disk[..BOOT_STUB.len()], BOOT_STUB);
        assert!(disk[BOOT_STUB.len()..BOOT_CODE_SIZE].iter().all(|&x| x == 0));
        Ok(())
    }

    #[test]
    fn test_damaged_tables() {
        let mut disk = test_disk();
        disk[SIGNATURE_OFFSET] = 0;
        assert_eq!(activate(&mut disk, 0), Err(MbrError::BadSignature(0)));

        let mut disk = test_disk();
        set_entry(&mut disk, 0, 3, 0x12, 0x83, 50, 4);
        let before = disk.clone();
        assert_eq!(activate(&mut disk, 0), Err(MbrError::BadFlags(0)));
        assert_eq!(disk, before);

        let mut disk = test_disk();
        disk[20 * SECTOR_SIZE + SIGNATURE_OFFSET] = 0;
        assert_eq!(activate(&mut disk, 6), Err(MbrError::BadSignature(20)));
    }

    #[test]
    fn test_missing_logical() {
        let mut disk = test_disk();
        assert_eq!(activate(&mut disk, 9), Err(MbrError::NotFound(9)));

        let mut disk = test_disk();
        set_entry(&mut disk, 0, 2, 0, 0x83, 10, 40);
        let before = disk.clone();
        assert_eq!(activate(&mut disk, 4), Err(MbrError::NoExtendedPartition));
        assert_eq!(disk, before);
    }

    #[test]
    fn test_looping_chain() {
        let mut disk = test_disk();
        // the last EBR links back to itself
        set_entry(&mut disk, 30, 1, 0, 0x05, 20, 10);
        assert_eq!(activate(&mut disk, 6), Err(MbrError::ChainTooLong));
    }

    proptest! {
        #[test]
        fn at_most_one_active(index in 0usize..8, initial in prop::array::uniform4(prop::bool::ANY)) {
            let mut disk = test_disk();
            for (slot, active) in initial.into_iter().enumerate() {
                disk[TABLE_OFFSET + slot * 16] = if active { ACTIVE } else { 0 };
            }
            let result = activate(&mut disk, index);
            prop_assert_eq!(result.is_ok(), index != 3 && index < 7);

            if result.is_ok() {
                let partitions = [flags(&disk, 10)[0], flags(&disk, 20)[0], flags(&disk, 30)[0]];
                let primaries = flags(&disk, 0);
                let active_primaries = primaries.iter().filter(|&&x| x == ACTIVE).count();
                prop_assert_eq!(active_primaries, 1);
                if index >= 4 {
                    prop_assert_eq!(partitions.iter().filter(|&&x| x == ACTIVE).count(), 1);
                    prop_assert_eq!(partitions[index - 4], ACTIVE);
                }
            }
        }

        #[test]
        fn activation_is_idempotent(index in 0usize..7) {
            let mut disk = test_disk();
            let first = activate(&mut disk, index).is_ok();
            let after_first = disk.clone();
            let second = activate(&mut disk, index).is_ok();
            prop_assert_eq!(first, second);
            prop_assert_eq!(disk, after_first);
        }

        #[test]
        fn arbitrary_sectors_never_panic(data in prop::collection::vec(any::<u8>(), SECTOR_SIZE * 4), index in 0usize..16) {
            let mut data = data;
            let _ = activate(&mut data, index);
        }
    }
}

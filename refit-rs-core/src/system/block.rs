//! Raw sector access for whole disks.
//!
//! This adapts the firmware [`BlockIO`] protocol to the [`gpt_disk_io::BlockIo`] trait, so that the partition table
//! editing in [`crate::legacy::mbr`] can run against either a real disk or an in-memory image.

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use thiserror::Error;
use uefi::{
    Handle, Status,
    boot::ScopedProtocol,
    proto::media::block::BlockIO,
};

use crate::system::helper::open_protocol_shared;

/// An `Error` that may result from reading or writing sectors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Block I/O failed with status {0}")]
pub struct BlockError(pub Status);

/// A whole disk accessed through the firmware [`BlockIO`] protocol.
pub struct UefiBlockIo {
    /// The opened protocol.
    proto: ScopedProtocol<BlockIO>,

    /// The block size reported by the media.
    block_size: BlockSize,
}

impl UefiBlockIo {
    /// Opens the [`BlockIO`] protocol on a disk handle.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the handle does not support [`BlockIO`].
    pub fn from_handle(handle: Handle) -> uefi::Result<Self> {
        let proto = open_protocol_shared::<BlockIO>(handle)?;
        let block_size = BlockSize::new(proto.media().block_size()).unwrap_or(BlockSize::BS_512);
        Ok(Self { proto, block_size })
    }
}

impl BlockIo for UefiBlockIo {
    type Error = BlockError;

    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok(self.proto.media().last_block() + 1)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let media_id = self.proto.media().media_id();
        self.proto
            .read_blocks(media_id, start_lba.0, dst)
            .map_err(|e| BlockError(e.status()))
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let media_id = self.proto.media().media_id();
        self.proto
            .write_blocks(media_id, start_lba.0, src)
            .map_err(|e| BlockError(e.status()))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.proto
            .flush_blocks()
            .map_err(|e| BlockError(e.status()))
    }
}

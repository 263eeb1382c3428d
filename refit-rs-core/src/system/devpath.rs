// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! An owned, byte level device path.
//!
//! Device paths are kept as their raw node encoding (type, subtype, little-endian length, data) so they can be
//! compared, prefixed and extended without firmware involvement. They are converted to a [`DevicePath`] only
//! right before being handed to the firmware.

use alloc::{string::String, vec::Vec};

use thiserror::Error;
use uefi::proto::device_path::DevicePath;

/// The size of the header at the start of every device path node.
const NODE_HEADER_LEN: usize = 4;

/// Hardware device path type.
pub const HARDWARE_DEVICE_PATH: u8 = 0x01;

/// Memory mapped hardware subtype.
pub const HW_MEMMAP_DP: u8 = 0x03;

/// Messaging device path type.
pub const MESSAGING_DEVICE_PATH: u8 = 0x03;

/// USB messaging subtype.
pub const MSG_USB_DP: u8 = 0x05;

/// Media device path type.
pub const MEDIA_DEVICE_PATH: u8 = 0x04;

/// Hard drive partition media subtype.
pub const MEDIA_HARDDRIVE_DP: u8 = 0x01;

/// CD-ROM (El Torito) media subtype.
pub const MEDIA_CDROM_DP: u8 = 0x02;

/// File path media subtype.
pub const MEDIA_FILEPATH_DP: u8 = 0x04;

/// Firmware volume file media subtype.
pub const MEDIA_PIWG_FW_FILE_DP: u8 = 0x06;

/// BIOS boot specification device path type.
pub const BBS_DEVICE_PATH: u8 = 0x05;

/// BIOS boot specification 1.01 subtype.
pub const BBS_BBS_DP: u8 = 0x01;

/// End of device path type.
pub const END_DEVICE_PATH_TYPE: u8 = 0x7f;

/// End of entire device path subtype.
pub const END_ENTIRE_DEVICE_PATH_SUBTYPE: u8 = 0xff;

/// The terminating node of every device path.
const END_NODE: [u8; NODE_HEADER_LEN] = [END_DEVICE_PATH_TYPE, END_ENTIRE_DEVICE_PATH_SUBTYPE, 4, 0];

/// An `Error` that may result from building or decoding a device path.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DevicePathError {
    /// A node declared a length that is shorter than its header or runs past the buffer.
    #[error("Malformed device path node at offset {0}")]
    Malformed(usize),

    /// A node is too large to be encoded.
    #[error("Device path node is too large")]
    TooLarge,

    /// The firmware rejected the device path bytes.
    #[error("Could not convert bytes into a DevicePath")]
    Conversion,
}

/// A single device path node borrowed from a [`DevicePathBuf`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node<'a> {
    /// The node type.
    pub device_type: u8,

    /// The node subtype.
    pub sub_type: u8,

    /// The node payload after the header.
    pub data: &'a [u8],
}

impl Node<'_> {
    /// Checks if the node is of the given type and subtype.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is(&self, device_type: u8, sub_type: u8) -> bool {
        self.device_type == device_type && self.sub_type == sub_type
    }

    /// The full encoded length of the node.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn len(&self) -> usize {
        self.data.len() + NODE_HEADER_LEN
    }

    /// Checks if the node has no payload.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the partition number and MBR flag of a hard drive media node.
    ///
    /// Returns the partition number and whether the partition table is an MBR.
    #[must_use = "Has no effect if the result is unused"]
    pub fn hard_drive(&self) -> Option<(u32, bool)> {
        if !self.is(MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE_DP) || self.data.len() < 38 {
            return None;
        }
        let number = u32::from_le_bytes(self.data[0..4].try_into().ok()?);
        Some((number, self.data[36] == 0x01))
    }

    /// Decodes the UCS-2 text of a file path media node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn file_path(&self) -> Option<String> {
        if !self.is(MEDIA_DEVICE_PATH, MEDIA_FILEPATH_DP) {
            return None;
        }
        let units = self
            .data
            .chunks_exact(2)
            .map(|x| u16::from_le_bytes([x[0], x[1]]))
            .take_while(|&x| x != 0);
        Some(char::decode_utf16(units).filter_map(Result::ok).collect())
    }
}

/// An owned device path, always terminated by an end node.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DevicePathBuf(Vec<u8>);

impl DevicePathBuf {
    /// Creates a device path that only contains the end node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new() -> Self {
        Self(END_NODE.to_vec())
    }

    /// Validates raw device path bytes, stopping at the first end-of-entire-path node.
    ///
    /// # Errors
    ///
    /// May return an `Error` if any node has an impossible length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DevicePathError> {
        let mut offset = 0;
        while offset + NODE_HEADER_LEN <= bytes.len() {
            let len = usize::from(u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]));
            if len < NODE_HEADER_LEN || offset + len > bytes.len() {
                return Err(DevicePathError::Malformed(offset));
            }
            if bytes[offset] == END_DEVICE_PATH_TYPE
                && bytes[offset + 1] == END_ENTIRE_DEVICE_PATH_SUBTYPE
            {
                let mut path = bytes[..offset].to_vec();
                path.extend_from_slice(&END_NODE);
                return Ok(Self(path));
            }
            offset += len;
        }
        Err(DevicePathError::Malformed(offset))
    }

    /// Copies a firmware [`DevicePath`] node by node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn from_device_path(device_path: &DevicePath) -> Self {
        let mut path = Self::new();
        for node in device_path.node_iter() {
            let _ = path.push(node.device_type().0, node.sub_type().0, node.data());
        }
        path
    }

    /// Returns the raw bytes of the device path, including the end node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reinterprets the bytes as a firmware [`DevicePath`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware type rejects the encoding.
    pub fn as_device_path(&self) -> Result<&DevicePath, DevicePathError> {
        <&DevicePath>::try_from(self.0.as_slice()).map_err(|_| DevicePathError::Conversion)
    }

    /// Iterates over every node except the terminating end node.
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> {
        let mut rest = self.body();
        core::iter::from_fn(move || {
            if rest.len() < NODE_HEADER_LEN {
                return None;
            }
            let len = usize::from(u16::from_le_bytes([rest[2], rest[3]]));
            if len < NODE_HEADER_LEN || len > rest.len() {
                return None;
            }
            let node = Node {
                device_type: rest[0],
                sub_type: rest[1],
                data: &rest[NODE_HEADER_LEN..len],
            };
            rest = &rest[len..];
            Some(node)
        })
    }

    /// Returns the first node of the path.
    #[must_use = "Has no effect if the result is unused"]
    pub fn first_node(&self) -> Option<Node<'_>> {
        self.nodes().next()
    }

    /// Checks if the path contains no nodes besides the end node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_empty(&self) -> bool {
        self.body().is_empty()
    }

    /// Appends a node before the end node.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the node does not fit in a 16-bit length.
    pub fn push(&mut self, device_type: u8, sub_type: u8, data: &[u8]) -> Result<(), DevicePathError> {
        let len = u16::try_from(data.len() + NODE_HEADER_LEN).map_err(|_| DevicePathError::TooLarge)?;
        let end = self.0.len().saturating_sub(NODE_HEADER_LEN);
        self.0.truncate(end);
        self.0.extend_from_slice(&[device_type, sub_type]);
        self.0.extend_from_slice(&len.to_le_bytes());
        self.0.extend_from_slice(data);
        self.0.extend_from_slice(&END_NODE);
        Ok(())
    }

    /// Appends every node of another path to this one.
    ///
    /// # Errors
    ///
    /// May return an `Error` if any node does not fit in a 16-bit length.
    pub fn append(&mut self, other: &Self) -> Result<(), DevicePathError> {
        for node in other.nodes() {
            self.push(node.device_type, node.sub_type, node.data)?;
        }
        Ok(())
    }

    /// Returns a new path with a file path node for `path` appended.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the path is too long for a single node.
    pub fn with_file_path(&self, path: &str) -> Result<Self, DevicePathError> {
        let mut data: Vec<u8> = path
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        data.extend_from_slice(&[0, 0]);
        let mut joined = self.clone();
        joined.push(MEDIA_DEVICE_PATH, MEDIA_FILEPATH_DP, &data)?;
        Ok(joined)
    }

    /// Checks if every node of `self` appears, in order, at the start of `other`.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        !self.is_empty() && other.body().starts_with(self.body())
    }

    /// Returns what is left of `other` after removing `self` as a prefix.
    #[must_use = "Has no effect if the result is unused"]
    pub fn strip_prefix_of(&self, other: &Self) -> Option<Self> {
        self.is_prefix_of(other).then(|| {
            let mut rest = other.body()[self.body().len()..].to_vec();
            rest.extend_from_slice(&END_NODE);
            Self(rest)
        })
    }

    /// Joins the text of every file path node, the way firmware resolves a multi-node path.
    #[must_use = "Has no effect if the result is unused"]
    pub fn file_path(&self) -> Option<String> {
        let mut joined: Option<String> = None;
        for part in self.nodes().filter_map(|node| node.file_path()) {
            let joined = joined.get_or_insert_with(String::new);
            if !joined.is_empty() && !joined.ends_with('\\') && !part.starts_with('\\') {
                joined.push('\\');
            }
            joined.push_str(&part);
        }
        joined
    }

    /// The bytes of every node, without the end node.
    fn body(&self) -> &[u8] {
        &self.0[..self.0.len().saturating_sub(NODE_HEADER_LEN)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk() -> DevicePathBuf {
        let mut path = DevicePathBuf::new();
        path.push(0x02, 0x01, &[0xd0, 0x41, 0x03, 0x0a, 0, 0, 0, 0])
            .expect("node fits");
        path
    }

    #[test]
    fn test_file_path_round_trip() -> Result<(), DevicePathError> {
        let path = disk().with_file_path("\\EFI\\BOOT\\bootx64.efi")?;
        assert_eq!(path.file_path().as_deref(), Some("\\EFI\\BOOT\\bootx64.efi"));
        assert_eq!(path.nodes().count(), 2);
        let reparsed = DevicePathBuf::from_bytes(path.as_bytes())?;
        assert_eq!(reparsed, path);
        Ok(())
    }

    #[test]
    fn test_prefix() -> Result<(), DevicePathError> {
        let volume = disk();
        let file = volume.with_file_path("\\vmlinuz")?;
        assert!(volume.is_prefix_of(&file));
        assert!(!file.is_prefix_of(&volume));
        let rest = volume.strip_prefix_of(&file).expect("is a prefix");
        assert_eq!(rest.file_path().as_deref(), Some("\\vmlinuz"));
        assert!(!DevicePathBuf::new().is_prefix_of(&file));
        Ok(())
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            DevicePathBuf::from_bytes(&[0x01, 0x03, 0x02, 0x00]),
            Err(DevicePathError::Malformed(0))
        );
        assert!(DevicePathBuf::from_bytes(&[0x01, 0x03, 0xff, 0x00]).is_err());
        assert!(DevicePathBuf::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_hard_drive_node() {
        let mut data = [0u8; 38];
        data[0] = 5;
        data[36] = 0x01;
        let node = Node {
            device_type: MEDIA_DEVICE_PATH,
            sub_type: MEDIA_HARDDRIVE_DP,
            data: &data,
        };
        assert_eq!(node.hard_drive(), Some((5, true)));
    }
}

//! Checks that a file is a loader this machine can run.
//!
//! Only the start of the file is read. A loader is accepted if it is a PE image built for the architecture the boot
//! manager itself runs on, or if it is an Apple "fat" binary that carries several architectures at once.

use object::{
    LittleEndian as LE,
    pe::{IMAGE_NT_SIGNATURE, ImageDosHeader, ImageFileHeader},
    read::ReadRef,
};

use crate::{boot::arch::PE_MACHINE, system::fs::FileAccess};

/// How many bytes of a loader are inspected.
pub const HEADER_SIZE: usize = 512;

/// The first little-endian `u32` of an Apple multi-architecture binary.
pub const FAT_BINARY_MAGIC: u32 = 0x0ef1_fab9;

/// The PE header must start before this offset to be found in the inspected bytes.
const MAX_NT_HEADERS_OFFSET: u32 = 0x180;

/// Checks if `header`, the first bytes of a file, belongs to a loader for `machine`.
#[must_use = "Has no effect if the result is unused"]
pub fn is_valid_header(header: &[u8], machine: u16) -> bool {
    if header.len() < HEADER_SIZE {
        return false;
    }
    if header
        .get(..4)
        .and_then(|x| x.try_into().ok())
        .is_some_and(|x| u32::from_le_bytes(x) == FAT_BINARY_MAGIC)
    {
        return true;
    }

    let Ok(dos) = ImageDosHeader::parse(header) else {
        return false;
    };
    let offset = dos.nt_headers_offset();
    if offset >= MAX_NT_HEADERS_OFFSET {
        return false;
    }

    let offset = u64::from(offset);
    let Ok(signature) = header.read_at::<object::U32Bytes<LE>>(offset) else {
        return false;
    };
    let Ok(file_header) = header.read_at::<ImageFileHeader>(offset + 4) else {
        return false;
    };

    signature.get(LE) == IMAGE_NT_SIGNATURE && file_header.machine.get(LE) == machine
}

/// Checks if the file at `path` is a loader for this machine.
///
/// Without a readable volume nothing can be checked, and the file is accepted. A file that cannot be read is
/// rejected.
pub fn is_valid_loader(fs: Option<&mut dyn FileAccess>, path: &str) -> bool {
    let (Some(fs), Some(machine)) = (fs, PE_MACHINE) else {
        return true;
    };
    fs.read_head(path, HEADER_SIZE)
        .is_ok_and(|header| is_valid_header(&header, machine))
}

/// Builds the first sector of a PE image for `machine`.
#[cfg(test)]
pub(crate) fn pe_header(machine: u16) -> [u8; HEADER_SIZE] {
    let mut header = [0; HEADER_SIZE];
    header[..2].copy_from_slice(b"MZ");
    header[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
    header[0x80..0x84].copy_from_slice(b"PE\0\0");
    header[0x84..0x86].copy_from_slice(&machine.to_le_bytes());
    header
}

/// Builds the first sector of a loader that runs on this machine.
#[cfg(test)]
pub(crate) fn test_loader() -> [u8; HEADER_SIZE] {
    pe_header(PE_MACHINE.unwrap_or(0x8664))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fs::mem::MemFs;
    use proptest::prelude::*;

    #[test]
    fn test_machine_types() {
        assert!(is_valid_header(&pe_header(0x8664), 0x8664));
        assert!(!is_valid_header(&pe_header(0xaa64), 0x8664));
        assert!(!is_valid_header(&pe_header(0x8664)[..100], 0x8664));
    }

    #[test]
    fn test_fat_binary() {
        let mut header = [0; HEADER_SIZE];
        header[..4].copy_from_slice(&FAT_BINARY_MAGIC.to_le_bytes());
        assert!(is_valid_header(&header, 0x014c));
    }

    #[test]
    fn test_bad_offsets() {
        let mut header = pe_header(0x8664);
        header[0x3c..0x40].copy_from_slice(&0x1f0u32.to_le_bytes());
        assert!(!is_valid_header(&header, 0x8664));

        let mut header = pe_header(0x8664);
        header[0x81] = b'X';
        assert!(!is_valid_header(&header, 0x8664));
    }

    #[test]
    fn test_loader_on_volume() {
        let Some(machine) = PE_MACHINE else {
            return;
        };
        let mut fs = MemFs::new()
            .with_file("\\good.efi", &pe_header(machine))
            .with_file("\\bad.efi", &pe_header(machine ^ 0xffff))
            .with_file("\\tiny.efi", b"MZ");
        assert!(is_valid_loader(Some(&mut fs), "\\good.efi"));
        assert!(!is_valid_loader(Some(&mut fs), "\\bad.efi"));
        assert!(!is_valid_loader(Some(&mut fs), "\\tiny.efi"));
        assert!(!is_valid_loader(Some(&mut fs), "\\missing.efi"));
        assert!(is_valid_loader(None, "\\missing.efi"));
    }

    proptest! {
        #[test]
        fn doesnt_panic(header in proptest::collection::vec(any::<u8>(), 0..1024), machine: u16) {
            let _ = is_valid_header(&header, machine);
        }
    }
}

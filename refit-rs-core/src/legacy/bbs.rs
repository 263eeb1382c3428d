//! Legacy targets from the firmware's boot option table.
//!
//! Firmware with a compatibility support module lists its BIOS boot devices as ordinary `Boot####` options whose
//! device path is a single BIOS Boot Specification (BBS) node. The node names the device class, but USB flash
//! drives are reported as hard disks by most firmware. They are told apart by the media-present bits of the
//! node's status flags, which fixed disks leave clear.
//!
//! On request the option table is brought in line with the BBS table before it is read: options whose BBS device is
//! gone are deleted, and devices without an option get a new one appended to `BootOrder`. Options are recognized by
//! the copy of their BBS table entry and its index, which the compatibility support module stores as optional data.

use alloc::{boxed::Box, format, string::String, vec::Vec};

use log::{debug, info, warn};
use uefi::{cstr16, runtime::VariableVendor};

use crate::{
    BootResult,
    boot::launch::{SelectionStore, store_selection},
    legacy::{LegacyError, LegacyFirmwareEntry, LegacyServices},
    system::{
        console::Console,
        devpath::{BBS_BBS_DP, BBS_DEVICE_PATH, DevicePathBuf},
        helper::{locate_protocol, str_to_cstr, ucs2_bytes_to_string},
        protos::{BBS_TABLE_ENTRY_LEN, BbsTableEntry, LegacyBios},
        variable::{get_variable_bytes, get_variable_u16_vec, set_variable_bytes},
    },
    volume::DiskKind,
};

/// BBS device type of floppy drives.
pub const BBS_FLOPPY: u16 = 0x01;

/// BBS device type of hard disks, and most USB drives.
pub const BBS_HARDDISK: u16 = 0x02;

/// BBS device type of CD and DVD drives.
pub const BBS_CDROM: u16 = 0x03;

/// BBS device type of PCMCIA cards.
pub const BBS_PCMCIA: u16 = 0x04;

/// BBS device type of USB devices.
pub const BBS_USB: u16 = 0x05;

/// BBS device type of network boot.
pub const BBS_EMBED_NETWORK: u16 = 0x06;

/// BBS device type of boot entry vectors installed by option ROMs.
pub const BBS_BEV_DEVICE: u16 = 0x80;

/// Boot priority of BBS table entries that are not in use.
pub const BBS_IGNORE_ENTRY: u16 = 0xFFFF;

/// Boot priority of BBS table entries that must not be booted.
pub const BBS_DO_NOT_BOOT_FROM: u16 = 0xFFFC;

/// Status flag set when media is present.
pub const BBS_MEDIA_PRESENT: u16 = 0x0800;

/// Status flag set when media may be present.
pub const BBS_MEDIA_MAYBE_PRESENT: u16 = 0x0400;

/// The title of the screen shown while booting.
pub const FIRMWARE_SCREEN_TITLE: &str = "Booting Legacy OS (UEFI mode)";

/// The size of the fixed `EFI_LOAD_OPTION` header.
const HEADER_LEN: usize = 6;

/// `LOAD_OPTION_ACTIVE`, set on every option that is created.
const LOAD_OPTION_ACTIVE: u32 = 0x1;

/// The longest description read from a BBS table entry.
const BBS_DESCRIPTION_MAX: usize = 32;

/// The BBS node at the start of a legacy boot option's device path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BbsNode {
    /// The device class, one of the `BBS_*` device types.
    pub device_type: u16,

    /// Status flags, including the media-present bits.
    pub status_flag: u16,
}

/// A decoded `Boot####` variable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootOption {
    /// The number of the option, the `####` of its variable name.
    pub number: u16,

    /// The `LOAD_OPTION_*` attributes.
    pub attributes: u32,

    /// The description shown by the firmware's boot menu.
    pub description: String,

    /// The first device path of the option.
    pub device_path: DevicePathBuf,

    /// Data passed to the boot target.
    pub optional_data: Vec<u8>,
}

impl BootOption {
    /// Decodes the contents of a `Boot####` variable.
    ///
    /// The layout is a `u32` attribute field, a `u16` device path list length, a nul terminated UCS-2 description,
    /// the device path list and finally optional data, which runs to the end of the variable.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable is too short for the lengths it declares, or the device path is
    /// malformed.
    pub fn parse(number: u16, bytes: &[u8]) -> Result<Self, LegacyError> {
        let truncated = || LegacyError::Truncated(number);
        let header = bytes.get(..HEADER_LEN).ok_or_else(truncated)?;
        let attributes = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let path_len = usize::from(u16::from_le_bytes([header[4], header[5]]));

        let rest = &bytes[HEADER_LEN..];
        let description_units = rest
            .chunks_exact(2)
            .position(|x| x == [0, 0])
            .ok_or_else(truncated)?;
        let description = ucs2_bytes_to_string(&rest[..description_units * 2]);

        let path_start = (description_units + 1) * 2;
        let path_end = path_start + path_len;
        let path = rest.get(path_start..path_end).ok_or_else(truncated)?;
        let device_path =
            DevicePathBuf::from_bytes(path).map_err(|_| LegacyError::MalformedDevicePath(number))?;

        Ok(Self {
            number,
            attributes,
            description,
            device_path,
            optional_data: rest[path_end..].to_vec(),
        })
    }

    /// Encodes the option the way firmware stores it, the inverse of [`BootOption::parse`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the device path is too long for the length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LegacyError> {
        let path = self.device_path.as_bytes();
        let path_len = u16::try_from(path.len()).map_err(|_| LegacyError::TooLarge(self.number))?;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.attributes.to_le_bytes());
        bytes.extend_from_slice(&path_len.to_le_bytes());
        for unit in self.description.encode_utf16().chain([0]) {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(path);
        bytes.extend_from_slice(&self.optional_data);
        Ok(bytes)
    }

    /// The BBS table index recorded in the optional data, after the copy of the table entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn bbs_index(&self) -> Option<u16> {
        let index = self
            .optional_data
            .get(BBS_TABLE_ENTRY_LEN..BBS_TABLE_ENTRY_LEN + 2)?;
        Some(u16::from_le_bytes([index[0], index[1]]))
    }

    /// The name of the variable holding the option.
    #[must_use = "Has no effect if the result is unused"]
    pub fn variable_name(number: u16) -> String {
        format!("Boot{number:04X}")
    }

    /// Decodes the BBS node that starts a legacy option's device path.
    #[must_use = "Has no effect if the result is unused"]
    pub fn bbs_node(&self) -> Option<BbsNode> {
        let node = self.device_path.first_node()?;
        if !node.is(BBS_DEVICE_PATH, BBS_BBS_DP) || node.data.len() < 4 {
            return None;
        }
        Some(BbsNode {
            device_type: u16::from_le_bytes([node.data[0], node.data[1]]),
            status_flag: u16::from_le_bytes([node.data[2], node.data[3]]),
        })
    }
}

/// Checks if a boot option boots a legacy target of the given disk kind.
///
/// Internal disks are hard disks without media-present bits, external disks are hard disks with them, and optical
/// discs are CD-ROM drives.
#[must_use = "Has no effect if the result is unused"]
pub fn is_legacy_target(option: &BootOption, kind: DiskKind) -> bool {
    let Some(node) = option.bbs_node() else {
        return false;
    };
    let removable = node.status_flag & (BBS_MEDIA_PRESENT | BBS_MEDIA_MAYBE_PRESENT) != 0;
    match kind {
        DiskKind::Internal => node.device_type == BBS_HARDDISK && !removable,
        DiskKind::External => node.device_type == BBS_HARDDISK && removable,
        DiskKind::Optical => node.device_type == BBS_CDROM,
    }
}

/// An entry of the firmware's BBS table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BbsDevice {
    /// The position of the entry in the table.
    pub index: u16,

    /// The name shown for the device.
    pub description: String,

    /// The packed table entry.
    raw: BbsTableEntry,
}

impl BbsDevice {
    /// Creates a [`BbsDevice`] from a packed table entry.
    ///
    /// Without a description string in the entry, the device is named after its type and index.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(index: u16, raw: BbsTableEntry, description: Option<String>) -> Self {
        let device_type = u16::from_le_bytes([raw[20], raw[21]]);
        let description = description
            .filter(|x| !x.is_empty())
            .unwrap_or_else(|| format!("{} #{index:02x}", device_type_name(device_type)));
        Self {
            index,
            description,
            raw,
        }
    }

    /// The boot priority assigned by the compatibility support module.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn priority(&self) -> u16 {
        u16::from_le_bytes([self.raw[0], self.raw[1]])
    }

    /// The device class, one of the `BBS_*` device types.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn device_type(&self) -> u16 {
        u16::from_le_bytes([self.raw[20], self.raw[21]])
    }

    /// Status flags, including the media-present bits.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn status_flag(&self) -> u16 {
        u16::from_le_bytes([self.raw[22], self.raw[23]])
    }

    /// The real-mode address of the description string, or [`None`] if the entry has none.
    #[must_use = "Has no effect if the result is unused"]
    pub fn description_address(raw: &BbsTableEntry) -> Option<usize> {
        let offset = usize::from(u16::from_le_bytes([raw[28], raw[29]]));
        let segment = usize::from(u16::from_le_bytes([raw[30], raw[31]]));
        (offset != 0 || segment != 0).then_some((segment << 4) + offset)
    }

    /// Checks if the device can be booted and should have a boot option.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_bootable(&self) -> bool {
        let priority = self.priority();
        priority != BBS_IGNORE_ENTRY
            && priority != BBS_DO_NOT_BOOT_FROM
            && matches!(self.device_type(), BBS_FLOPPY..=BBS_EMBED_NETWORK | BBS_BEV_DEVICE)
    }

    /// Checks if a legacy option with this BBS node boots this device.
    fn is_booted_by(&self, option: &BootOption, node: BbsNode) -> bool {
        match option.bbs_index() {
            Some(index) => index == self.index && node.device_type == self.device_type(),
            None => node.device_type == self.device_type() && option.description == self.description,
        }
    }

    /// Builds the boot option for the device.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the description does not fit a device path node.
    fn to_boot_option(&self, number: u16) -> Result<BootOption, LegacyError> {
        let mut data = Vec::new();
        data.extend_from_slice(&self.device_type().to_le_bytes());
        data.extend_from_slice(&self.status_flag().to_le_bytes());
        data.extend(
            self.description
                .chars()
                .map(|x| u8::try_from(x).ok().filter(u8::is_ascii).unwrap_or(b'?')),
        );
        data.push(0);

        let mut device_path = DevicePathBuf::new();
        device_path
            .push(BBS_DEVICE_PATH, BBS_BBS_DP, &data)
            .map_err(|_| LegacyError::TooLarge(number))?;

        let mut optional_data = self.raw.to_vec();
        optional_data.extend_from_slice(&self.index.to_le_bytes());
        Ok(BootOption {
            number,
            attributes: LOAD_OPTION_ACTIVE,
            description: self.description.clone(),
            device_path,
            optional_data,
        })
    }
}

/// A generic name for devices whose table entry carries no description.
const fn device_type_name(device_type: u16) -> &'static str {
    match device_type {
        BBS_FLOPPY => "Floppy Drive",
        BBS_HARDDISK => "Hard Drive",
        BBS_CDROM => "CD-ROM Drive",
        BBS_PCMCIA => "PCMCIA Device",
        BBS_USB => "USB Device",
        BBS_EMBED_NETWORK => "Network",
        BBS_BEV_DEVICE => "BEV Device",
        _ => "Unknown Device",
    }
}

/// The firmware's boot option variables and BBS table.
pub trait BootOptionStore {
    /// Reads the BBS table, or [`None`] if there is no compatibility support module.
    fn bbs_table(&mut self) -> Option<Vec<BbsDevice>>;

    /// Reads `BootOrder`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable cannot be read.
    fn boot_order(&mut self) -> BootResult<Vec<u16>>;

    /// Writes `BootOrder`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable cannot be written.
    fn set_boot_order(&mut self, order: &[u16]) -> BootResult<()>;

    /// Reads a `Boot####` variable, or [`None`] if it does not exist.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable exists but cannot be read.
    fn boot_option_bytes(&mut self, number: u16) -> BootResult<Option<Box<[u8]>>>;

    /// Writes a `Boot####` variable. Empty bytes delete it.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable cannot be written.
    fn set_boot_option_bytes(&mut self, number: u16, bytes: &[u8]) -> BootResult<()>;
}

/// The [`BootOptionStore`] of the running firmware.
pub struct FirmwareBootOptions;

/// Reads a nul terminated ASCII string from real-mode memory.
fn read_real_mode_string(address: usize) -> String {
    let mut string = String::new();
    for offset in 0..BBS_DESCRIPTION_MAX {
        // SAFETY: the compatibility support module keeps its strings in the legacy region below 1 MiB, which the
        // firmware identity maps
        let byte = unsafe { core::ptr::with_exposed_provenance::<u8>(address + offset).read_volatile() };
        if byte == 0 {
            break;
        }
        if byte.is_ascii_graphic() || byte == b' ' {
            string.push(char::from(byte));
        }
    }
    String::from(string.trim())
}

impl BootOptionStore for FirmwareBootOptions {
    fn bbs_table(&mut self) -> Option<Vec<BbsDevice>> {
        let mut bios = locate_protocol::<LegacyBios>().ok()?;
        let table = bios
            .bbs_table()
            .inspect_err(|e| warn!("Could not read the BBS table: {e}"))
            .ok()?;
        Some(
            table
                .iter()
                .zip(0..=u16::MAX)
                .map(|(raw, index)| {
                    let description = BbsDevice::description_address(raw).map(read_real_mode_string);
                    BbsDevice::new(index, *raw, description)
                })
                .collect(),
        )
    }

    fn boot_order(&mut self) -> BootResult<Vec<u16>> {
        get_variable_u16_vec(cstr16!("BootOrder"), Some(VariableVendor::GLOBAL_VARIABLE))
    }

    fn set_boot_order(&mut self, order: &[u16]) -> BootResult<()> {
        let bytes: Vec<u8> = order.iter().flat_map(|x| x.to_le_bytes()).collect();
        set_variable_bytes(cstr16!("BootOrder"), Some(VariableVendor::GLOBAL_VARIABLE), None, &bytes)
    }

    fn boot_option_bytes(&mut self, number: u16) -> BootResult<Option<Box<[u8]>>> {
        let name = str_to_cstr(&BootOption::variable_name(number))?;
        get_variable_bytes(&name, Some(VariableVendor::GLOBAL_VARIABLE))
    }

    fn set_boot_option_bytes(&mut self, number: u16, bytes: &[u8]) -> BootResult<()> {
        let name = str_to_cstr(&BootOption::variable_name(number))?;
        set_variable_bytes(&name, Some(VariableVendor::GLOBAL_VARIABLE), None, bytes)
    }
}

/// Reads one `Boot####` variable.
fn read_boot_option<S: BootOptionStore + ?Sized>(store: &mut S, number: u16) -> Option<BootOption> {
    match store.boot_option_bytes(number) {
        Ok(Some(bytes)) => BootOption::parse(number, &bytes)
            .inspect_err(|e| warn!("{e}"))
            .ok(),
        Ok(None) => {
            debug!("Boot{number:04X} is listed in BootOrder but does not exist");
            None
        }
        Err(e) => {
            warn!("Could not read Boot{number:04X}: {e}");
            None
        }
    }
}

/// Reads every boot option listed in `BootOrder`, in order.
///
/// Options that are missing or cannot be decoded are skipped.
#[must_use = "Has no effect if the result is unused"]
pub fn read_boot_options<S: BootOptionStore + ?Sized>(store: &mut S) -> Vec<BootOption> {
    let order = match store.boot_order() {
        Ok(order) => order,
        Err(e) => {
            warn!("Could not read BootOrder: {e}");
            return Vec::new();
        }
    };
    order
        .into_iter()
        .filter_map(|x| read_boot_option(store, x))
        .collect()
}

/// Finds the lowest option number that is neither in `order` nor taken by an existing variable.
fn free_option_number<S: BootOptionStore + ?Sized>(store: &mut S, order: &[u16]) -> Option<u16> {
    (0..=u16::MAX).find(|x| !order.contains(x) && matches!(store.boot_option_bytes(*x), Ok(None)))
}

/// Brings the legacy options of the boot option table in line with the BBS table.
///
/// A legacy option whose BBS device no longer exists, is not bootable or changed its type is deleted. Every bootable
/// device left without an option gets a new one, appended to `BootOrder`. Legacy options without a recorded BBS
/// index are kept, and cover the device of the same type and description. Options that are not legacy options are
/// never touched.
pub fn refresh_legacy_boot_options<S: BootOptionStore + ?Sized>(store: &mut S) {
    let Some(table) = store.bbs_table() else {
        debug!("No BBS table, leaving the legacy boot options as they are");
        return;
    };
    let order = match store.boot_order() {
        Ok(order) => order,
        Err(e) => {
            warn!("Could not read BootOrder: {e}");
            return;
        }
    };

    let mut changed = false;
    let mut kept = Vec::with_capacity(order.len());
    let mut legacy = Vec::new();
    for number in order {
        let Some((option, node)) = read_boot_option(store, number).and_then(|x| x.bbs_node().map(|node| (x, node)))
        else {
            kept.push(number);
            continue;
        };

        let valid = option.bbs_index().is_none()
            || table
                .iter()
                .any(|x| x.is_bootable() && x.is_booted_by(&option, node));
        if valid {
            kept.push(number);
            legacy.push((option, node));
            continue;
        }

        match store.set_boot_option_bytes(number, &[]) {
            Ok(()) => {
                info!("Removed legacy boot option \"{}\", its device is gone", option.description);
                changed = true;
            }
            Err(e) => {
                warn!("Could not remove Boot{number:04X}: {e}");
                kept.push(number);
            }
        }
    }

    for device in table.iter().filter(|x| x.is_bootable()) {
        if legacy
            .iter()
            .any(|(option, node)| device.is_booted_by(option, *node))
        {
            continue;
        }
        let Some(number) = free_option_number(store, &kept) else {
            warn!("No free boot option number for \"{}\"", device.description);
            break;
        };

        let bytes = match device.to_boot_option(number).and_then(|x| x.to_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        match store.set_boot_option_bytes(number, &bytes) {
            Ok(()) => {
                info!("Added legacy boot option \"{}\" as Boot{number:04X}", device.description);
                kept.push(number);
                changed = true;
            }
            Err(e) => warn!("Could not write Boot{number:04X}: {e}"),
        }
    }

    if changed && let Err(e) = store.set_boot_order(&kept) {
        warn!("Could not write BootOrder: {e}");
    }
}

/// Boots a legacy target from the firmware's boot option table.
///
/// The device is connected first, then handed to the Legacy BIOS protocol. That only returns if the boot failed,
/// in which case the failure is shown and acknowledged before returning.
///
/// # Errors
///
/// Always returns an `Error`, because a successful boot never returns.
pub fn start_legacy_firmware<S: LegacyServices + SelectionStore + ?Sized>(
    services: &mut S,
    console: &mut dyn Console,
    entry: &LegacyFirmwareEntry,
    selection: Option<&str>,
) -> Result<(), LegacyError> {
    console.begin_text_screen(FIRMWARE_SCREEN_TITLE);
    if let Some(name) = selection {
        store_selection(services, name);
    }

    services.connect_device_path(&entry.option.device_path);
    let status = services.legacy_boot(&entry.option);

    console.print_error("Failure booting legacy (BIOS) OS.");
    console.pause_for_key();
    Err(LegacyError::BootFailed(entry.option.description.clone(), status))
}

/// Builds a legacy boot option with a single BBS node.
#[cfg(test)]
pub(crate) fn test_option(number: u16, description: &str, device_type: u16, status_flag: u16) -> BootOption {
    let mut device_path = DevicePathBuf::new();
    let mut data = Vec::new();
    data.extend_from_slice(&device_type.to_le_bytes());
    data.extend_from_slice(&status_flag.to_le_bytes());
    data.push(0);
    device_path
        .push(BBS_DEVICE_PATH, BBS_BBS_DP, &data)
        .expect("node fits");
    BootOption {
        number,
        attributes: 1,
        description: description.into(),
        device_path,
        optional_data: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{console::RecordingConsole, devpath::MEDIA_DEVICE_PATH};
    use alloc::{borrow::ToOwned, collections::BTreeMap, vec};
    use proptest::prelude::*;
    use uefi::Status;

    #[test]
    fn test_parse() -> Result<(), LegacyError> {
        let mut option = test_option(0x0a, "SATA: WDC WD5000", BBS_HARDDISK, BBS_MEDIA_PRESENT);
        option.optional_data = vec![0xde, 0xad];
        let parsed = BootOption::parse(0x0a, &option.to_bytes()?)?;
        assert_eq!(parsed, option);
        assert_eq!(
            parsed.bbs_node(),
            Some(BbsNode {
                device_type: BBS_HARDDISK,
                status_flag: BBS_MEDIA_PRESENT
            })
        );
        assert_eq!(BootOption::variable_name(0x0a), "Boot000A");
        Ok(())
    }

    #[test]
    fn test_truncated() {
        let bytes = test_option(1, "CD", BBS_CDROM, 0)
            .to_bytes()
            .expect("short path");
        assert_eq!(BootOption::parse(1, &bytes[..4]), Err(LegacyError::Truncated(1)));
        assert_eq!(BootOption::parse(1, &bytes[..bytes.len() - 3]), Err(LegacyError::Truncated(1)));
        let mut bad = bytes;
        // the node length now runs past the device path
        bad[HEADER_LEN + 6 + 2] = 0x40;
        assert_eq!(BootOption::parse(1, &bad), Err(LegacyError::MalformedDevicePath(1)));
    }

    #[test]
    fn test_target_kinds() {
        let fixed = test_option(1, "HDD", BBS_HARDDISK, 0);
        let usb = test_option(2, "USB", BBS_HARDDISK, BBS_MEDIA_MAYBE_PRESENT);
        let cd = test_option(3, "CD", BBS_CDROM, BBS_MEDIA_PRESENT);
        let net = test_option(4, "PXE", BBS_EMBED_NETWORK, 0);

        assert!(is_legacy_target(&fixed, DiskKind::Internal));
        assert!(!is_legacy_target(&fixed, DiskKind::External));
        assert!(is_legacy_target(&usb, DiskKind::External));
        assert!(!is_legacy_target(&usb, DiskKind::Internal));
        assert!(is_legacy_target(&cd, DiskKind::Optical));
        assert!(!is_legacy_target(&net, DiskKind::Internal));
        assert!(!is_legacy_target(&net, DiskKind::Optical));
    }

    #[test]
    fn test_efi_option_is_not_legacy() {
        let mut device_path = DevicePathBuf::new();
        device_path
            .push(MEDIA_DEVICE_PATH, BBS_BBS_DP, &[2, 0, 0, 0])
            .expect("node fits");
        let option = BootOption {
            device_path,
            ..BootOption::default()
        };
        assert_eq!(option.bbs_node(), None);
        assert!(!is_legacy_target(&option, DiskKind::Internal));
    }

    #[derive(Default)]
    struct Firmware {
        connected: Vec<DevicePathBuf>,
        booted: Vec<u16>,
        stored: Option<String>,
        writes: usize,
    }

    impl LegacyServices for Firmware {
        fn activate_partition(&mut self, _volume: &crate::volume::Volume) -> Result<(), crate::legacy::mbr::MbrError> {
            Ok(())
        }

        fn loaded_image_device_paths(&mut self) -> Vec<DevicePathBuf> {
            Vec::new()
        }

        fn connect_device_path(&mut self, device_path: &DevicePathBuf) {
            self.connected.push(device_path.clone());
        }

        fn legacy_boot(&mut self, option: &BootOption) -> Status {
            self.booted.push(option.number);
            Status::NOT_FOUND
        }
    }

    impl SelectionStore for Firmware {
        fn load_selection(&mut self) -> Option<String> {
            self.stored.clone()
        }

        fn save_selection(&mut self, name: &str) {
            self.writes += 1;
            self.stored = Some(name.to_owned());
        }
    }

    #[test]
    fn test_failed_boot() {
        let entry = LegacyFirmwareEntry {
            option: test_option(7, "SATA: disk", BBS_HARDDISK, 0),
            load_options: "HD",
        };
        let mut firmware = Firmware::default();
        let mut console = RecordingConsole::default();

        let result = start_legacy_firmware(&mut firmware, &mut console, &entry, Some("SATA: disk"));
        assert_eq!(
            result,
            Err(LegacyError::BootFailed("SATA: disk".into(), Status::NOT_FOUND))
        );
        assert_eq!(firmware.connected, [entry.option.device_path.clone()]);
        assert_eq!(firmware.booted, [7]);
        assert_eq!(firmware.stored.as_deref(), Some("SATA: disk"));
        assert_eq!(console.screens, [FIRMWARE_SCREEN_TITLE]);
        assert_eq!(console.lines, ["Failure booting legacy (BIOS) OS."]);
        assert_eq!(console.pauses, 1);
    }

    /// Boot option variables and a BBS table held in memory.
    #[derive(Default)]
    struct Nvram {
        table: Option<Vec<BbsDevice>>,
        order: Vec<u16>,
        options: BTreeMap<u16, Vec<u8>>,
        order_writes: usize,
    }

    impl Nvram {
        fn with_option(mut self, option: &BootOption) -> Result<Self, LegacyError> {
            self.options.insert(option.number, option.to_bytes()?);
            self.order.push(option.number);
            Ok(self)
        }

        fn descriptions(&mut self) -> Vec<String> {
            read_boot_options(self).into_iter().map(|x| x.description).collect()
        }
    }

    impl BootOptionStore for Nvram {
        fn bbs_table(&mut self) -> Option<Vec<BbsDevice>> {
            self.table.clone()
        }

        fn boot_order(&mut self) -> BootResult<Vec<u16>> {
            Ok(self.order.clone())
        }

        fn set_boot_order(&mut self, order: &[u16]) -> BootResult<()> {
            self.order_writes += 1;
            self.order = order.to_vec();
            Ok(())
        }

        fn boot_option_bytes(&mut self, number: u16) -> BootResult<Option<Box<[u8]>>> {
            Ok(self.options.get(&number).map(|x| x.clone().into_boxed_slice()))
        }

        fn set_boot_option_bytes(&mut self, number: u16, bytes: &[u8]) -> BootResult<()> {
            if bytes.is_empty() {
                self.options.remove(&number);
            } else {
                self.options.insert(number, bytes.to_vec());
            }
            Ok(())
        }
    }

    fn bbs_entry(priority: u16, device_type: u16, status_flag: u16) -> BbsTableEntry {
        let mut raw = [0; BBS_TABLE_ENTRY_LEN];
        raw[0..2].copy_from_slice(&priority.to_le_bytes());
        raw[20..22].copy_from_slice(&device_type.to_le_bytes());
        raw[22..24].copy_from_slice(&status_flag.to_le_bytes());
        raw
    }

    fn efi_option(number: u16) -> BootOption {
        let mut device_path = DevicePathBuf::new();
        device_path
            .push(MEDIA_DEVICE_PATH, 4, b"\\EFI\\BOOT\\BOOTX64.EFI")
            .expect("node fits");
        BootOption {
            number,
            attributes: 1,
            description: "UEFI OS".into(),
            device_path,
            optional_data: Vec::new(),
        }
    }

    #[test]
    fn test_bbs_device() {
        let mut raw = bbs_entry(0, BBS_HARDDISK, BBS_MEDIA_PRESENT);
        assert_eq!(BbsDevice::description_address(&raw), None);
        raw[28..30].copy_from_slice(&0x1234u16.to_le_bytes());
        raw[30..32].copy_from_slice(&0xf000u16.to_le_bytes());
        assert_eq!(BbsDevice::description_address(&raw), Some(0xf1234));

        let device = BbsDevice::new(3, raw, None);
        assert_eq!(device.description, "Hard Drive #03");
        assert_eq!(device.device_type(), BBS_HARDDISK);
        assert_eq!(device.status_flag(), BBS_MEDIA_PRESENT);
        assert!(device.is_bootable());
        assert_eq!(BbsDevice::new(3, raw, Some(String::new())).description, "Hard Drive #03");
        assert_eq!(BbsDevice::new(3, raw, Some("SATA: WDC".into())).description, "SATA: WDC");

        assert!(!BbsDevice::new(0, bbs_entry(BBS_IGNORE_ENTRY, BBS_FLOPPY, 0), None).is_bootable());
        assert!(!BbsDevice::new(0, bbs_entry(BBS_DO_NOT_BOOT_FROM, BBS_CDROM, 0), None).is_bootable());
        assert!(!BbsDevice::new(0, bbs_entry(0, 0, 0), None).is_bootable());
        assert!(BbsDevice::new(0, bbs_entry(0, BBS_BEV_DEVICE, 0), None).is_bootable());
    }

    #[test]
    fn test_created_option() -> Result<(), LegacyError> {
        let device = BbsDevice::new(2, bbs_entry(1, BBS_CDROM, BBS_MEDIA_PRESENT), Some("ATAPI CD".into()));
        let option = device.to_boot_option(0x10)?;
        let parsed = BootOption::parse(0x10, &option.to_bytes()?)?;
        assert_eq!(parsed.description, "ATAPI CD");
        assert_eq!(parsed.attributes, LOAD_OPTION_ACTIVE);
        assert_eq!(parsed.bbs_index(), Some(2));
        assert_eq!(
            parsed.bbs_node(),
            Some(BbsNode {
                device_type: BBS_CDROM,
                status_flag: BBS_MEDIA_PRESENT
            })
        );
        assert!(is_legacy_target(&parsed, DiskKind::Optical));
        Ok(())
    }

    #[test]
    fn test_refresh_removes_and_adds() -> Result<(), LegacyError> {
        let disk = BbsDevice::new(1, bbs_entry(0, BBS_HARDDISK, 0), Some("SATA: WDC".into()));
        let cd = BbsDevice::new(2, bbs_entry(1, BBS_CDROM, BBS_MEDIA_PRESENT), Some("ATAPI CD".into()));
        let gone = BbsDevice::new(5, bbs_entry(2, BBS_HARDDISK, 0), Some("USB: stick".into()));
        let mut nvram = Nvram {
            table: Some(vec![
                BbsDevice::new(0, bbs_entry(BBS_IGNORE_ENTRY, BBS_FLOPPY, 0), None),
                disk.clone(),
                cd,
            ]),
            ..Nvram::default()
        }
        .with_option(&efi_option(0))?
        .with_option(&disk.to_boot_option(1)?)?
        .with_option(&gone.to_boot_option(2)?)?;

        refresh_legacy_boot_options(&mut nvram);

        assert_eq!(nvram.order, [0, 1, 2]);
        assert_eq!(nvram.order_writes, 1);
        assert_eq!(nvram.descriptions(), ["UEFI OS", "SATA: WDC", "ATAPI CD"]);
        let added = read_boot_option(&mut nvram, 2).expect("added option");
        assert_eq!(added.bbs_index(), Some(2));

        // a second pass finds nothing to do
        refresh_legacy_boot_options(&mut nvram);
        assert_eq!(nvram.order_writes, 1);
        Ok(())
    }

    #[test]
    fn test_refresh_changed_type() -> Result<(), LegacyError> {
        let disk = BbsDevice::new(1, bbs_entry(0, BBS_HARDDISK, 0), Some("Slot 1".into()));
        let cd = BbsDevice::new(1, bbs_entry(0, BBS_CDROM, 0), Some("Slot 1".into()));
        let mut nvram = Nvram {
            table: Some(vec![cd]),
            ..Nvram::default()
        }
        .with_option(&disk.to_boot_option(7)?)?;

        refresh_legacy_boot_options(&mut nvram);

        assert_eq!(nvram.order, [0]);
        let option = read_boot_option(&mut nvram, 0).expect("replacement option");
        assert_eq!(option.bbs_node().map(|x| x.device_type), Some(BBS_CDROM));
        assert!(!nvram.options.contains_key(&7));
        Ok(())
    }

    #[test]
    fn test_refresh_keeps_options_without_index() -> Result<(), LegacyError> {
        let mut nvram = Nvram {
            table: Some(vec![BbsDevice::new(1, bbs_entry(0, BBS_HARDDISK, 0), None)]),
            ..Nvram::default()
        }
        .with_option(&test_option(4, "Hard Drive #01", BBS_HARDDISK, 0))?
        .with_option(&test_option(5, "Network boot", BBS_EMBED_NETWORK, 0))?;

        refresh_legacy_boot_options(&mut nvram);

        assert_eq!(nvram.order, [4, 5]);
        assert_eq!(nvram.order_writes, 0);
        assert_eq!(nvram.options.len(), 2);
        Ok(())
    }

    #[test]
    fn test_refresh_without_bbs_table() -> Result<(), LegacyError> {
        let gone = BbsDevice::new(5, bbs_entry(0, BBS_HARDDISK, 0), Some("Gone".into()));
        let mut nvram = Nvram::default().with_option(&gone.to_boot_option(4)?)?;

        refresh_legacy_boot_options(&mut nvram);

        assert_eq!(nvram.order, [4]);
        assert_eq!(nvram.descriptions(), ["Gone"]);
        Ok(())
    }

    proptest! {
        #[test]
        fn parse_doesnt_panic(bytes in prop::collection::vec(any::<u8>(), 0..256), number: u16) {
            let _ = BootOption::parse(number, &bytes);
        }
    }
}

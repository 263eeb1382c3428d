// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The main loop of the boot manager.
//!
//! [`App`] owns everything a run of the boot manager accumulates: the configuration, the volumes, the main menu
//! and the name of the last selection. It is driven as a small state machine:
//!
//! - [`AppState::Scanning`] runs the startup sequence and the first scan
//! - [`AppState::MenuIdle`] shows the main menu until the user picks an entry or presses Escape
//! - [`AppState::Launching`] runs the picked entry, which usually returns to the menu
//! - [`AppState::Rescanning`] throws the menu away and scans everything again
//! - [`AppState::Terminating`] ends the loop
//!
//! Firmware is reached through [`Platform`], and the user through [`Frontend`]. The UEFI implementation of
//! [`Platform`] lives in [`firmware`]. Frontends live in their own crates.

use alloc::{borrow::ToOwned, boxed::Box, format, string::String, vec::Vec};

use log::{debug, error, info, warn};
use uefi::runtime::ResetType;

use crate::{
    BootResult,
    boot::{
        arch::{self, PLATFORM_NAME},
        launch::{ImageServices, SelectionStore, start_loader, start_tool},
        secure_boot::SecureBootError,
    },
    config::{CONFIG_FILE_NAME, GlobalConfig},
    entry::{Action, EntryKind, Menu, MenuEntry, MenuScreen},
    legacy::{LegacyServices, LegacyStrategy, bbs, bbs::BootOption, mac},
    path::{find_path, join_path, limit_string_length},
    scan::{ScanContext, SelfImage, scan_for_bootloaders, tools::scan_for_tools},
    system::{console::Console, devpath::DevicePathBuf, fs::FileAccess},
    volume::Volume,
};

pub mod firmware;

/// The version line of the about screen.
const VERSION_LINE: &str = concat!("refit-rs Version ", env!("CARGO_PKG_VERSION"));

/// The title of the about screen.
const ABOUT_SCREEN_TITLE: &str = "About refit-rs";

/// The longest firmware vendor shown on the about screen.
const MAX_VENDOR_LEN: usize = 65;

/// One second, in microseconds.
const ONE_SECOND: usize = 1_000_000;

/// Where the boot manager's own image was loaded from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelfLocation {
    /// The device path of the volume holding the image.
    pub device_path: Option<DevicePathBuf>,

    /// The path of the image on that volume.
    pub path: String,
}

/// Firmware identification shown on the about screen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// The major UEFI revision.
    pub uefi_major: u16,

    /// The minor UEFI revision.
    pub uefi_minor: u16,

    /// The firmware vendor.
    pub vendor: String,

    /// The vendor's firmware revision, major in the upper 16 bits.
    pub revision: u32,
}

/// Firmware services that the main loop needs besides launching images.
pub trait Platform: ImageServices + LegacyServices + SelectionStore {
    /// Stops the firmware watchdog, so the menu may wait indefinitely.
    fn disable_watchdog(&mut self);

    /// Returns the command line the boot manager was started with.
    fn image_load_options(&mut self) -> Option<String>;

    /// Returns where the boot manager was loaded from.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the loaded image protocol of the boot manager is unavailable.
    fn self_location(&mut self) -> BootResult<SelfLocation>;

    /// Opens the filesystem the boot manager was loaded from.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume has no usable filesystem.
    fn open_self_fs(&mut self) -> BootResult<Box<dyn FileAccess>>;

    /// Installs the Secure Boot policy. Returns `true` if it was installed.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the policy could not be installed.
    fn install_secure_boot_policy(&mut self) -> BootResult<bool>;

    /// Removes the Secure Boot policy.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware's own validators could not be restored.
    fn uninstall_secure_boot_policy(&mut self) -> Result<(), SecureBootError>;

    /// Loads every driver in `dirs` on the boot manager's volume. Returns `true` if any was started.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the boot manager's volume cannot be read.
    fn load_drivers(&mut self, dirs: &[String]) -> BootResult<bool>;

    /// Connects every driver to every controller.
    fn connect_all_controllers(&mut self);

    /// Detects how legacy targets can be booted on this firmware.
    fn legacy_strategy(&mut self) -> Option<LegacyStrategy>;

    /// Reads the firmware's boot option table.
    ///
    /// With `refresh` set, the legacy options are first brought in line with the devices the firmware can boot.
    fn boot_options(&mut self, refresh: bool) -> Vec<BootOption>;

    /// Finds every volume.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware cannot list block devices.
    fn enumerate_volumes(&mut self) -> BootResult<Vec<Volume>>;

    /// Waits for a number of microseconds.
    fn stall(&mut self, microseconds: usize);

    /// Reports a recent Mac OS X to Apple firmware.
    fn apple_set_os(&mut self);

    /// Checks if the firmware can reboot into its setup utility.
    fn firmware_ui_supported(&mut self) -> bool;

    /// Identifies the firmware.
    fn firmware_info(&self) -> FirmwareInfo;

    /// Resets or powers off the machine. Returns only if the firmware failed to do so.
    fn reset(&mut self, kind: ResetType);

    /// Reboots into the firmware setup utility. Returns only after a failure the user has acknowledged.
    fn reboot_to_firmware(&mut self, console: &mut dyn Console);
}

/// What the user did with the main menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuChoice {
    /// Escape was pressed, which asks for a rescan.
    Escape,

    /// An entry of the main menu or one of its submenus was chosen.
    Chosen {
        /// The chosen entry.
        entry: MenuEntry,
        /// The title of the main menu entry it belongs to, remembered as the next default.
        selection: String,
    },
}

/// The user interface.
///
/// A frontend draws the menus and owns the screen, which is why it is also the [`Console`] launch messages are
/// written to.
pub trait Frontend: Console {
    /// Shows the main menu until the user chooses something.
    ///
    /// `timeout` is in seconds, and `0` waits forever. When it expires, the `default` entry is chosen.
    fn run_main_menu(&mut self, menu: &Menu, timeout: u32, default: Option<usize>) -> MenuChoice;

    /// Shows a screen of information until the user leaves it.
    fn show_screen(&mut self, screen: &MenuScreen);
}

/// How the main loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The user chose to return to the firmware.
    Exit,

    /// A reset was requested but the firmware came back. The caller should reset and idle.
    Fallback,
}

/// The states of the main loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppState {
    /// Running the startup sequence and the first scan.
    Scanning,

    /// Waiting for the user.
    MenuIdle,

    /// Running a chosen entry.
    Launching(Box<MenuEntry>),

    /// Scanning everything again.
    Rescanning,

    /// Leaving the loop.
    Terminating(Termination),
}

/// The boot manager.
pub struct App<P: Platform, F: Frontend> {
    /// Firmware access.
    platform: P,

    /// The user interface.
    frontend: F,

    /// The configuration.
    config: GlobalConfig,

    /// The path of the configuration file on the boot manager's volume.
    config_path: String,

    /// Where the boot manager itself lives.
    self_image: SelfImage,

    /// The device path of the boot manager's volume.
    self_device_path: Option<DevicePathBuf>,

    /// Every scanned volume.
    volumes: Vec<Volume>,

    /// The main menu.
    menu: Menu,

    /// How legacy targets are booted, if they can be.
    legacy: Option<LegacyStrategy>,

    /// The firmware's boot option table.
    boot_options: Vec<BootOption>,

    /// If the Secure Boot policy was installed at startup.
    policy_installed: bool,

    /// The title of the entry to preselect.
    selection: Option<String>,

    /// If the menu timeout already had its chance.
    timeout_used: bool,

    /// The current state.
    state: AppState,
}

impl<P: Platform, F: Frontend> App<P, F> {
    /// Creates a boot manager that has not scanned anything yet.
    pub fn new(platform: P, frontend: F) -> Self {
        Self {
            platform,
            frontend,
            config: GlobalConfig::default(),
            config_path: CONFIG_FILE_NAME.to_owned(),
            self_image: SelfImage::default(),
            self_device_path: None,
            volumes: Vec::new(),
            menu: Menu::new(),
            legacy: None,
            boot_options: Vec::new(),
            policy_installed: false,
            selection: None,
            timeout_used: false,
            state: AppState::Scanning,
        }
    }

    /// The main menu as last scanned.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn menu(&self) -> &Menu {
        &self.menu
    }

    /// The current state.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Runs the boot manager until it terminates.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the boot manager cannot find its own image or volume at startup.
    pub fn run(&mut self) -> BootResult<Termination> {
        loop {
            if let AppState::Terminating(termination) = self.state {
                return Ok(termination);
            }
            self.step()?;
        }
    }

    /// Advances the state machine by one transition.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the startup sequence fails.
    pub fn step(&mut self) -> BootResult<()> {
        let state = core::mem::replace(&mut self.state, AppState::MenuIdle);
        self.state = match state {
            AppState::Scanning => {
                self.startup()?;
                AppState::MenuIdle
            }
            AppState::MenuIdle => self.show_menu(),
            AppState::Launching(entry) => self.launch(*entry),
            AppState::Rescanning => {
                self.rescan(true);
                AppState::MenuIdle
            }
            AppState::Terminating(termination) => AppState::Terminating(termination),
        };
        Ok(())
    }

    /// Everything that happens before the menu first shows up.
    fn startup(&mut self) -> BootResult<()> {
        let location = self.platform.self_location()?;
        self.self_image = SelfImage {
            volume: None,
            dir: find_path(&location.path).to_owned(),
            path: location.path,
        };
        self.self_device_path = location.device_path;

        self.legacy = self.platform.legacy_strategy();
        self.choose_config_file()?;
        self.read_config()?;
        self.warn_if_legacy_problems();

        self.platform.disable_watchdog();

        match self.platform.install_secure_boot_policy() {
            Ok(installed) => self.policy_installed = installed,
            Err(e) => {
                warn!("{e}");
                self.frontend.print_error("Failed to install MOK Secure Boot extensions");
            }
        }

        self.load_drivers();
        self.scan_volumes();
        self.scan_all();

        if self.config.scan_delay > 0 {
            let show_message = self.config.scan_delay > 1;
            if show_message {
                self.frontend.print_line("Pausing before disk scan; please wait....");
            }
            for _ in 0..self.config.scan_delay {
                self.platform.stall(ONE_SECOND);
            }
            self.rescan(show_message);
        }

        self.platform.apple_set_os();

        self.selection = self
            .config
            .default_selection
            .clone()
            .or_else(|| self.platform.load_selection());
        info!("Startup finished with {} menu entries", self.menu.len());
        Ok(())
    }

    /// Uses the file named by `-c` as the configuration file, if it exists.
    fn choose_config_file(&mut self) -> BootResult<()> {
        let Some(options) = self.platform.image_load_options() else {
            return Ok(());
        };
        let Some(name) = config_file_option(&options) else {
            return Ok(());
        };

        let path = join_path(&self.self_image.dir, name);
        if self.platform.open_self_fs()?.exists(&path) {
            self.config_path = path;
        } else {
            self.frontend
                .print_line(&format!("Specified configuration file ({name}) doesn't exist; using"));
            self.frontend.print_line(&format!("'{CONFIG_FILE_NAME}' default"));
        }
        Ok(())
    }

    /// Reads the configuration file, or falls back to the defaults.
    fn read_config(&mut self) -> BootResult<()> {
        let path = if self.config_path.starts_with('\\') {
            self.config_path.clone()
        } else {
            join_path(&self.self_image.dir, &self.config_path)
        };
        let mut fs = self.platform.open_self_fs()?;
        self.config = GlobalConfig::load(&mut *fs, &path).unwrap_or_default();
        Ok(())
    }

    /// Tells the user that legacy scanning was asked for on firmware that cannot boot legacy targets.
    fn warn_if_legacy_problems(&mut self) {
        if self.legacy.is_some() || !self.config.scan_order(false).iter().any(|x| x.is_legacy()) {
            return;
        }
        self.frontend.print_line(&format!(
            "NOTE: {CONFIG_FILE_NAME}'s 'scanfor' line specifies scanning for one or more legacy"
        ));
        self.frontend
            .print_line("(BIOS) boot options; however, this is not possible because your computer lacks");
        self.frontend
            .print_line("the necessary Compatibility Support Module (CSM) support or that support is");
        self.frontend.print_line("disabled in your firmware.");
        self.frontend.pause_for_key();
    }

    /// Loads drivers from the boot manager's driver directories and any configured ones.
    fn load_drivers(&mut self) {
        let mut dirs: Vec<String> = arch::driver_dirs()
            .iter()
            .map(|x| join_path(&self.self_image.dir, x))
            .collect();
        dirs.extend(self.config.driver_dirs.iter().cloned());

        match self.platform.load_drivers(&dirs) {
            Ok(true) => info!("Drivers loaded"),
            Ok(false) => debug!("No drivers loaded"),
            Err(e) => warn!("Could not load drivers: {e}"),
        }
    }

    /// Finds every volume, and which of them holds the boot manager.
    fn scan_volumes(&mut self) {
        self.volumes = self.platform.enumerate_volumes().unwrap_or_else(|e| {
            error!("Could not enumerate volumes: {e}");
            Vec::new()
        });
        self.self_image.volume = self.self_device_path.as_ref().and_then(|path| {
            self.volumes
                .iter()
                .position(|x| x.device_path.as_ref() == Some(path))
        });
        if self.legacy == Some(LegacyStrategy::Firmware) {
            let refresh = self.config.deep_legacy_scan
                && self
                    .config
                    .scan_order(false)
                    .iter()
                    .any(|x| x.is_legacy());
            self.boot_options = self.platform.boot_options(refresh);
        }
        debug!("Found {} volumes", self.volumes.len());
    }

    /// Scans for loaders and legacy targets, then adds the tools row.
    fn scan_all(&mut self) {
        let firmware_ui = self.platform.firmware_ui_supported();
        let ctx = ScanContext {
            config: &self.config,
            self_image: &self.self_image,
            legacy: self.legacy,
            boot_options: &self.boot_options,
        };
        scan_for_bootloaders(&ctx, &mut self.volumes, &mut self.menu);
        scan_for_tools(&ctx, &mut self.volumes, &mut self.menu, firmware_ui);
    }

    /// Throws the menu away and builds it again from scratch.
    fn rescan(&mut self, show_message: bool) {
        if show_message {
            self.frontend
                .print_line("Scanning for new boot loaders; please wait....");
        }
        self.menu.clear();
        if let Err(e) = self.read_config() {
            warn!("Could not reread the configuration: {e}");
        }
        self.platform.connect_all_controllers();
        self.scan_volumes();
        self.scan_all();
    }

    /// Shows the main menu and turns the choice into the next state.
    fn show_menu(&mut self) -> AppState {
        let timeout = if self.timeout_used { 0 } else { self.config.timeout };
        self.timeout_used = true;

        let default = self
            .selection
            .as_deref()
            .and_then(|x| self.menu.find_by_name(x));
        match self.frontend.run_main_menu(&self.menu, timeout, default) {
            MenuChoice::Escape => AppState::Rescanning,
            MenuChoice::Chosen { entry, selection } => {
                self.selection = Some(selection);
                AppState::Launching(Box::new(entry))
            }
        }
    }

    /// Runs a chosen entry.
    fn launch(&mut self, entry: MenuEntry) -> AppState {
        let selection = self.selection.as_deref();
        match &entry.kind {
            EntryKind::Action(Action::Reboot) => {
                self.platform.reset(ResetType::COLD);
                return AppState::Terminating(Termination::Fallback);
            }
            EntryKind::Action(Action::Shutdown) => {
                self.platform.reset(ResetType::SHUTDOWN);
                return AppState::Terminating(Termination::Fallback);
            }
            EntryKind::Action(Action::Exit) => return self.exit(),
            EntryKind::Action(Action::About) => {
                let screen = self.about_screen();
                self.frontend.show_screen(&screen);
            }
            EntryKind::Action(Action::Firmware) => self.platform.reboot_to_firmware(&mut self.frontend),
            EntryKind::Action(Action::Return) => (),
            EntryKind::Loader(loader) => {
                if let Err(e) = start_loader(
                    &mut self.platform,
                    &mut self.frontend,
                    &mut self.volumes,
                    loader,
                    selection,
                ) {
                    warn!("{e}");
                }
            }
            EntryKind::Tool(tool) => {
                if let Err(e) = start_tool(
                    &mut self.platform,
                    &mut self.frontend,
                    &mut self.volumes,
                    tool,
                    &entry.title,
                ) {
                    warn!("{e}");
                }
            }
            EntryKind::Legacy(legacy) => {
                if let Err(e) = mac::start_legacy(
                    &mut self.platform,
                    &mut self.frontend,
                    &mut self.volumes,
                    legacy,
                    selection,
                ) {
                    warn!("{e}");
                }
            }
            EntryKind::LegacyFirmware(legacy) => {
                if let Err(e) =
                    bbs::start_legacy_firmware(&mut self.platform, &mut self.frontend, legacy, selection)
                {
                    warn!("{e}");
                }
            }
        }
        AppState::MenuIdle
    }

    /// Leaves the boot manager, taking the Secure Boot policy down first.
    fn exit(&mut self) -> AppState {
        if self.policy_installed
            && let Err(e) = self.platform.uninstall_secure_boot_policy()
        {
            error!("{e}");
            self.frontend.begin_text_screen("Secure Boot Policy Failure");
            self.frontend
                .print_error("Failed to uninstall MOK Secure Boot extensions; forcing a reboot.");
            self.frontend.pause_for_key();
            self.platform.reset(ResetType::COLD);
            return AppState::Terminating(Termination::Fallback);
        }
        self.frontend.begin_text_screen(" ");
        AppState::Terminating(Termination::Exit)
    }

    /// Builds the about screen.
    fn about_screen(&self) -> MenuScreen {
        let info = self.platform.firmware_info();
        let secure_boot = if self.platform.secure_boot_active() {
            "active"
        } else {
            "inactive"
        };

        let mut screen = MenuScreen::new(ABOUT_SCREEN_TITLE);
        screen.add_info_line(VERSION_LINE);
        screen.add_info_line("");
        screen.add_info_line("Running on:");
        screen.add_info_line(format!(" EFI Revision {}.{:02}", info.uefi_major, info.uefi_minor));
        screen.add_info_line(format!(" Platform: {PLATFORM_NAME}; Secure Boot {secure_boot}"));
        screen.add_info_line(format!(
            " Firmware: {} {}.{:02}",
            limit_string_length(&info.vendor, MAX_VENDOR_LEN),
            info.revision >> 16,
            info.revision & 0xffff
        ));
        screen.finish();
        screen
    }
}

/// Extracts the file name given with ` -c ` from the boot manager's command line.
#[must_use = "Has no effect if the result is unused"]
pub fn config_file_option(options: &str) -> Option<&str> {
    let (_, rest) = options.split_once(" -c ")?;
    let name = rest.split(' ').next().unwrap_or_default();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boot::{launch::mock::MockImages, validate::test_loader},
        legacy::mbr::MbrError,
        system::{
            devpath::{MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE_DP},
            fs::mem::MemFs,
        },
    };
    use alloc::{collections::VecDeque, string::ToString, vec, vec::Vec};
    use uefi::Status;

    const SELF_PATH: &str = "\\EFI\\refit\\refit.efi";

    fn esp_path() -> DevicePathBuf {
        let mut path = DevicePathBuf::new();
        path.push(MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE_DP, &[1; 38])
            .expect("node fits");
        path
    }

    /// Firmware that answers from fields and records what it was asked to do.
    #[derive(Default)]
    struct MockPlatform {
        images: MockImages,
        esp: MemFs,
        load_options: Option<String>,
        policy: Option<Result<bool, ()>>,
        uninstall_fails: bool,
        legacy: Option<LegacyStrategy>,
        resets: Vec<ResetType>,
        events: Vec<String>,
        enumerations: usize,
        stalls: usize,
        refreshes: Vec<bool>,
    }

    impl ImageServices for MockPlatform {
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
            self.images.secure_boot_active()
        }
    }

    impl SelectionStore for MockPlatform {
        fn load_selection(&mut self) -> Option<String> {
            self.images.load_selection()
        }

        fn save_selection(&mut self, name: &str) {
            self.images.save_selection(name);
        }
    }

    impl LegacyServices for MockPlatform {
        fn activate_partition(&mut self, _volume: &Volume) -> Result<(), MbrError> {
            Ok(())
        }

        fn loaded_image_device_paths(&mut self) -> Vec<DevicePathBuf> {
            Vec::new()
        }

        fn connect_device_path(&mut self, _device_path: &DevicePathBuf) {}

        fn legacy_boot(&mut self, _option: &BootOption) -> Status {
            Status::UNSUPPORTED
        }
    }

    impl Platform for MockPlatform {
        fn disable_watchdog(&mut self) {
            self.events.push("watchdog".into());
        }

        fn image_load_options(&mut self) -> Option<String> {
            self.load_options.clone()
        }

        fn self_location(&mut self) -> BootResult<SelfLocation> {
            Ok(SelfLocation {
                device_path: Some(esp_path()),
                path: SELF_PATH.into(),
            })
        }

        fn open_self_fs(&mut self) -> BootResult<Box<dyn FileAccess>> {
            Ok(Box::new(self.esp.clone()))
        }

        fn install_secure_boot_policy(&mut self) -> BootResult<bool> {
            match self.policy {
                Some(Ok(installed)) => Ok(installed),
                Some(Err(())) => Err(SecureBootError::AlreadyInstalled.into()),
                None => Ok(false),
            }
        }

        fn uninstall_secure_boot_policy(&mut self) -> Result<(), SecureBootError> {
            self.events.push("uninstall".into());
            if self.uninstall_fails {
                Err(SecureBootError::RestoreFailed)
            } else {
                Ok(())
            }
        }

        fn load_drivers(&mut self, dirs: &[String]) -> BootResult<bool> {
            self.events.push(format!("drivers {}", dirs.join(",")));
            Ok(false)
        }

        fn connect_all_controllers(&mut self) {
            self.events.push("connect".into());
        }

        fn legacy_strategy(&mut self) -> Option<LegacyStrategy> {
            self.legacy
        }

        fn boot_options(&mut self, refresh: bool) -> Vec<BootOption> {
            self.refreshes.push(refresh);
            Vec::new()
        }

        fn enumerate_volumes(&mut self) -> BootResult<Vec<Volume>> {
            self.enumerations += 1;
            Ok(vec![Volume {
                name: Some("ESP".into()),
                device_path: Some(esp_path()),
                fs: Some(Box::new(self.esp.clone())),
                ..Volume::default()
            }])
        }

        fn stall(&mut self, _microseconds: usize) {
            self.stalls += 1;
        }

        fn apple_set_os(&mut self) {
            self.events.push("set os".into());
        }

        fn firmware_ui_supported(&mut self) -> bool {
            true
        }

        fn firmware_info(&self) -> FirmwareInfo {
            FirmwareInfo {
                uefi_major: 2,
                uefi_minor: 70,
                vendor: "EDK II".into(),
                revision: 0x0001_0000,
            }
        }

        fn reset(&mut self, kind: ResetType) {
            self.resets.push(kind);
        }

        fn reboot_to_firmware(&mut self, console: &mut dyn Console) {
            self.events.push("firmware".into());
            console.print_line("Error calling ResetSystem");
        }
    }

    /// A frontend that picks entries by title from a script.
    #[derive(Default)]
    struct MockFrontend {
        script: VecDeque<Option<&'static str>>,
        lines: Vec<String>,
        screens: Vec<String>,
        pauses: usize,
        menus: Vec<(Vec<String>, u32, Option<usize>)>,
        shown: Vec<MenuScreen>,
    }

    impl MockFrontend {
        fn picking(script: &[Option<&'static str>]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Console for MockFrontend {
        fn begin_text_screen(&mut self, title: &str) {
            self.screens.push(title.into());
        }

        fn print_line(&mut self, text: &str) {
            self.lines.push(text.into());
        }

        fn pause_for_key(&mut self) {
            self.pauses += 1;
        }
    }

    impl Frontend for MockFrontend {
        fn run_main_menu(&mut self, menu: &Menu, timeout: u32, default: Option<usize>) -> MenuChoice {
            let titles = menu.entries.iter().map(|x| x.title.clone()).collect();
            self.menus.push((titles, timeout, default));

            // an exhausted script exits, so a test never loops forever
            let Some(pick) = self.script.pop_front().unwrap_or(Some("Exit")) else {
                return MenuChoice::Escape;
            };
            let index = menu.find_by_name(pick).expect("scripted entry exists");
            MenuChoice::Chosen {
                entry: menu.entries[index].clone(),
                selection: menu.entries[index].title.clone(),
            }
        }

        fn show_screen(&mut self, screen: &MenuScreen) {
            self.shown.push(screen.clone());
        }
    }

    fn esp(config: &str) -> MemFs {
        MemFs::new()
            .with_file("\\EFI\\refit\\refit.efi", &test_loader())
            .with_file("\\EFI\\refit\\refit-rs.conf", config.as_bytes())
            .with_file("\\EFI\\ubuntu\\grubx64.efi", &test_loader())
    }

    fn platform(config: &str) -> MockPlatform {
        MockPlatform {
            esp: esp(config),
            ..MockPlatform::default()
        }
    }

    const TOOLS: &str = "showtools about,reboot,shutdown,firmware,exit\n";

    #[test]
    fn test_startup_scans_and_exits() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[]));
        assert_eq!(app.run()?, Termination::Exit);

        let titles: Vec<&str> = app.menu().entries.iter().map(|x| x.title.as_str()).collect();
        assert!(titles[0].contains("grubx64.efi"));
        assert!(!titles.iter().any(|x| x.contains("refit.efi")));
        assert_eq!(app.self_image.volume, Some(0));
        assert_eq!(app.self_image.dir, "\\EFI\\refit");

        let drivers = format!(
            "drivers \\EFI\\refit\\drivers,\\EFI\\refit\\drivers_{}",
            arch::ARCH_SUFFIX
        );
        assert_eq!(
            app.platform.events,
            ["watchdog".to_string(), drivers, "set os".to_string()]
        );
        assert_eq!(app.frontend.screens, [" "]);
        Ok(())
    }

    #[test]
    fn test_timeout_only_once() -> BootResult<()> {
        let mut app = App::new(
            platform(&format!("{TOOLS}timeout 7\n")),
            MockFrontend::picking(&[None]),
        );
        app.run()?;
        let timeouts: Vec<u32> = app.frontend.menus.iter().map(|x| x.1).collect();
        assert_eq!(timeouts, [7, 0]);
        Ok(())
    }

    #[test]
    fn test_escape_rescans() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[None]));
        app.run()?;
        assert_eq!(app.platform.enumerations, 2);
        assert!(app.platform.events.contains(&"connect".to_string()));
        assert!(app
            .frontend
            .lines
            .contains(&"Scanning for new boot loaders; please wait....".to_string()));

        // the same entries come back, not twice as many
        assert_eq!(app.frontend.menus[0].0, app.frontend.menus[1].0);
        Ok(())
    }

    #[test]
    fn test_reboot_falls_through() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[Some("Reboot")]));
        assert_eq!(app.run()?, Termination::Fallback);
        assert_eq!(app.platform.resets, [ResetType::COLD]);
        Ok(())
    }

    #[test]
    fn test_shutdown() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[Some("Shut Down")]));
        assert_eq!(app.run()?, Termination::Fallback);
        assert_eq!(app.platform.resets, [ResetType::SHUTDOWN]);
        Ok(())
    }

    #[test]
    fn test_exit_uninstalls_policy() -> BootResult<()> {
        let mut platform = platform(TOOLS);
        platform.policy = Some(Ok(true));
        let mut app = App::new(platform, MockFrontend::picking(&[]));
        assert_eq!(app.run()?, Termination::Exit);
        assert!(app.platform.events.contains(&"uninstall".to_string()));
        assert!(app.platform.resets.is_empty());
        Ok(())
    }

    #[test]
    fn test_exit_without_policy_skips_uninstall() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[]));
        app.run()?;
        assert!(!app.platform.events.contains(&"uninstall".to_string()));
        Ok(())
    }

    #[test]
    fn test_failed_uninstall_resets() -> BootResult<()> {
        let mut platform = platform(TOOLS);
        platform.policy = Some(Ok(true));
        platform.uninstall_fails = true;
        let mut app = App::new(platform, MockFrontend::picking(&[]));

        assert_eq!(app.run()?, Termination::Fallback);
        assert_eq!(app.frontend.screens, ["Secure Boot Policy Failure"]);
        assert_eq!(app.frontend.pauses, 1);
        assert_eq!(app.platform.resets, [ResetType::COLD]);
        Ok(())
    }

    #[test]
    fn test_failed_policy_install_is_reported() -> BootResult<()> {
        let mut platform = platform(TOOLS);
        platform.policy = Some(Err(()));
        let mut app = App::new(platform, MockFrontend::picking(&[]));
        assert_eq!(app.run()?, Termination::Exit);
        assert!(app
            .frontend
            .lines
            .contains(&"Failed to install MOK Secure Boot extensions".to_string()));
        Ok(())
    }

    #[test]
    fn test_about_screen() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[Some("About")]));
        app.run()?;

        let screen = &app.frontend.shown[0];
        assert_eq!(screen.info_lines[0], VERSION_LINE);
        assert!(screen.info_lines.contains(&"Running on:".to_string()));
        assert!(screen.info_lines.contains(&" EFI Revision 2.70".to_string()));
        assert!(screen.info_lines.contains(&" Firmware: EDK II 1.00".to_string()));
        assert!(screen.is_finished());
        Ok(())
    }

    #[test]
    fn test_firmware_failure_returns_to_menu() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[Some("Computer Setup")]));
        assert_eq!(app.run()?, Termination::Exit);
        assert!(app.platform.events.contains(&"firmware".to_string()));
        assert_eq!(app.frontend.menus.len(), 2);
        Ok(())
    }

    #[test]
    fn test_launch_and_remember() -> BootResult<()> {
        let mut platform = platform(TOOLS);
        platform.images.loads.push_back(Ok(()));
        let mut app = App::new(platform, MockFrontend::picking(&[Some("grubx64")]));
        app.run()?;

        assert!(app.platform.images.calls.contains(&"start".to_string()));
        let stored = app.platform.images.stored.clone().expect("selection stored");
        assert!(stored.contains("grubx64.efi"));

        // the menu comes back with the launched entry preselected
        assert_eq!(app.frontend.menus[1].2, Some(0));
        Ok(())
    }

    #[test]
    fn test_previous_boot_is_default() -> BootResult<()> {
        let mut platform = platform(TOOLS);
        platform.images.stored = Some("GRUBX64".into());
        let mut app = App::new(platform, MockFrontend::picking(&[]));
        app.run()?;
        assert_eq!(app.frontend.menus[0].2, Some(0));
        Ok(())
    }

    #[test]
    fn test_default_selection_wins() -> BootResult<()> {
        let mut platform = platform(&format!("{TOOLS}default_selection Reboot\n"));
        platform.images.stored = Some("grubx64".into());
        let mut app = App::new(platform, MockFrontend::picking(&[]));
        app.run()?;
        let default = app.frontend.menus[0].2.expect("default found");
        assert_eq!(app.frontend.menus[0].0[default], "Reboot");
        Ok(())
    }

    #[test]
    fn test_scan_delay() -> BootResult<()> {
        let mut app = App::new(
            platform(&format!("{TOOLS}scan_delay 2\n")),
            MockFrontend::picking(&[]),
        );
        app.run()?;
        assert_eq!(app.platform.stalls, 2);
        assert_eq!(app.platform.enumerations, 2);
        assert_eq!(
            app.frontend.lines[..2],
            [
                "Pausing before disk scan; please wait....".to_string(),
                "Scanning for new boot loaders; please wait....".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_legacy_warning() -> BootResult<()> {
        let mut app = App::new(
            platform(&format!("{TOOLS}scanfor internal,hdbios\n")),
            MockFrontend::picking(&[]),
        );
        app.run()?;
        assert_eq!(app.frontend.lines.len(), 4);
        assert!(app.frontend.lines[0].starts_with("NOTE: "));
        assert_eq!(app.frontend.pauses, 1);
        Ok(())
    }

    #[test]
    fn test_no_legacy_warning_with_support() -> BootResult<()> {
        let mut platform = platform(&format!("{TOOLS}scanfor internal,hdbios\n"));
        platform.legacy = Some(LegacyStrategy::Firmware);
        let mut app = App::new(platform, MockFrontend::picking(&[]));
        app.run()?;
        assert!(app.frontend.lines.is_empty());
        Ok(())
    }

    #[test]
    fn test_deep_legacy_scan_refreshes_boot_options() -> BootResult<()> {
        let refreshes = |config: &str, legacy: Option<LegacyStrategy>| -> BootResult<Vec<bool>> {
            let mut platform = platform(&format!("{TOOLS}{config}"));
            platform.legacy = legacy;
            let mut app = App::new(platform, MockFrontend::picking(&[]));
            app.run()?;
            Ok(app.platform.refreshes)
        };
        let firmware = Some(LegacyStrategy::Firmware);

        assert_eq!(refreshes("scanfor internal,hdbios\ndeep_legacy_scan\n", firmware)?, [true]);
        assert_eq!(refreshes("scanfor internal,hdbios\n", firmware)?, [false]);
        assert_eq!(refreshes("scanfor internal,external\ndeep_legacy_scan\n", firmware)?, [false]);
        assert!(refreshes("scanfor internal,hdbios\ndeep_legacy_scan\n", Some(LegacyStrategy::Mac))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_config_from_command_line() -> BootResult<()> {
        let mut platform = platform("");
        platform.esp = platform
            .esp
            .with_file("\\EFI\\refit\\other.conf", b"showtools reboot\n");
        platform.load_options = Some("refit.efi -c other.conf".into());
        let mut app = App::new(platform, MockFrontend::picking(&[Some("Reboot")]));
        app.run()?;
        assert_eq!(app.config_path, "\\EFI\\refit\\other.conf");
        assert!(!app.menu().entries.iter().any(|x| x.title.contains("About")));
        Ok(())
    }

    #[test]
    fn test_missing_config_from_command_line() -> BootResult<()> {
        let mut platform = platform(TOOLS);
        platform.load_options = Some("refit.efi -c missing.conf".into());
        let mut app = App::new(platform, MockFrontend::picking(&[]));
        app.run()?;
        assert_eq!(app.config_path, CONFIG_FILE_NAME);
        assert_eq!(
            app.frontend.lines[0],
            "Specified configuration file (missing.conf) doesn't exist; using"
        );
        Ok(())
    }

    #[test]
    fn test_config_file_option() {
        assert_eq!(config_file_option("refit.efi -c my.conf"), Some("my.conf"));
        assert_eq!(config_file_option("refit.efi -c my.conf -v"), Some("my.conf"));
        assert_eq!(config_file_option("refit.efi -c "), None);
        assert_eq!(config_file_option("refit.efi"), None);
        assert_eq!(config_file_option("-c my.conf"), None);
    }

    #[test]
    fn test_step_by_step() -> BootResult<()> {
        let mut app = App::new(platform(TOOLS), MockFrontend::picking(&[Some("About")]));
        assert_eq!(app.state(), &AppState::Scanning);
        app.step()?;
        assert_eq!(app.state(), &AppState::MenuIdle);
        app.step()?;
        assert!(matches!(app.state(), AppState::Launching(_)));
        app.step()?;
        assert_eq!(app.state(), &AppState::MenuIdle);
        Ok(())
    }
}

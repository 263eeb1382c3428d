//! Provides [`MenuEntry`], a single bootable or actionable item of the menu.
//!
//! Every entry carries the same display fields (title, row, shortcuts, icon and badge) and an optional options
//! submenu. What happens when the entry is chosen is decided by its [`EntryKind`], which is matched exhaustively
//! by the dispatch loop.
//!
//! Loader entries are built with [`builder::LoaderEntryBuilder`], classified by [`classify::loader_defaults`] and
//! given their submenu by [`submenu::generate_submenu`]. Other scanners (manual entries, tools) reuse these same
//! building blocks so that every loader entry is built the same way.

use alloc::{boxed::Box, string::String, vec::Vec};

use crate::{
    legacy::{LegacyEntry, LegacyFirmwareEntry},
    path::{basename, contains_ci},
    system::devpath::DevicePathBuf,
    volume::DiskKind,
};

pub mod builder;
pub mod classify;
pub mod initrd;
pub mod submenu;

/// The longest title an entry may have.
pub const MAX_TITLE_LEN: usize = 255;

/// How many primary entries receive a digit shortcut.
pub const MAX_DIGIT_SHORTCUTS: usize = 9;

/// The title of the entry that closes a submenu.
pub const RETURN_TITLE: &str = "Return to Main Menu";

/// The icon name used when no hint resolves.
pub const UNKNOWN_ICON: &str = "unknown";

/// Cuts a title down to [`MAX_TITLE_LEN`] characters.
#[must_use = "Has no effect if the result is unused"]
pub fn cap_title(title: String) -> String {
    if title.chars().count() <= MAX_TITLE_LEN {
        title
    } else {
        title.chars().take(MAX_TITLE_LEN).collect()
    }
}

/// The OS family a loader was classified as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OsType {
    /// Mac OS X's `boot.efi`.
    Mac,

    /// A Linux kernel with an EFI stub loader.
    Linux,

    /// The ELILO boot loader.
    Elilo,

    /// The GRUB boot loader.
    Grub,

    /// The Windows Boot Manager.
    Windows,

    /// Windows XP on Mac (`xom.efi`).
    Xom,

    /// Another copy of a rEFIt style boot manager.
    Refit,
}

impl OsType {
    /// The single character code of the family.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn code(self) -> char {
        match self {
            Self::Mac => 'M',
            Self::Linux => 'L',
            Self::Elilo => 'E',
            Self::Grub => 'G',
            Self::Windows => 'W',
            Self::Xom => 'X',
            Self::Refit => 'R',
        }
    }
}

/// The row of the main menu an entry is shown in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Row {
    /// Boot targets.
    #[default]
    Primary,

    /// Tools and actions.
    Tools,
}

/// The icon of an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Icon {
    /// An icon file found next to the loader.
    File(String),

    /// The volume's own icon.
    Volume,

    /// Comma separated icon names, tried in order.
    Hints(String),
}

impl Default for Icon {
    fn default() -> Self {
        Self::Hints(String::new())
    }
}

impl Icon {
    /// Builds hints from a list of names.
    #[must_use = "Has no effect if the result is unused"]
    pub fn from_hints<S: AsRef<str>>(hints: &[S]) -> Self {
        let mut joined = String::new();
        for hint in hints.iter().map(AsRef::as_ref).filter(|x| !x.is_empty()) {
            if !joined.is_empty() {
                joined.push(',');
            }
            joined.push_str(hint);
        }
        Self::Hints(joined)
    }

    /// Picks the icon to draw.
    ///
    /// Files and volume icons are returned as-is. Hints are tried in order against `available`, falling back to
    /// [`UNKNOWN_ICON`] when none of them exists.
    pub fn resolve(&self, mut available: impl FnMut(&str) -> bool) -> &str {
        match self {
            Self::File(path) => path,
            Self::Volume => "volume",
            Self::Hints(hints) => hints
                .split(',')
                .map(str::trim)
                .find(|x| !x.is_empty() && available(x))
                .unwrap_or(UNKNOWN_ICON),
        }
    }
}

/// A simple action that needs no further data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Show information about the boot manager and firmware.
    About,

    /// Restart the system.
    Reboot,

    /// Power the system off.
    Shutdown,

    /// Leave the boot manager and return to firmware.
    Exit,

    /// Restart into the firmware setup utility.
    Firmware,

    /// Leave a submenu.
    Return,
}

/// An EFI image that can be started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoaderEntry {
    /// The loader's own title, used in submenu titles.
    pub title: String,

    /// The name of the volume the loader lives on.
    pub volume_name: Option<String>,

    /// The normalized path of the loader on its volume.
    pub loader_path: String,

    /// The full firmware device path of the loader.
    pub device_path: Option<DevicePathBuf>,

    /// The command line passed to the loader.
    pub load_options: Option<String>,

    /// The OS family the loader was classified as.
    pub os_type: Option<OsType>,

    /// If the loader should be started with the screen in graphics mode.
    pub use_graphics: bool,

    /// An initial ramdisk added to the options of the default submenu entry.
    pub initrd_path: Option<String>,
}

impl LoaderEntry {
    /// Starts a new loader entry that shares this one's target.
    ///
    /// Path, volume, device path, graphics mode, options and initrd carry over. Title and OS type do not.
    #[must_use = "Has no effect if the result is unused"]
    pub fn inherit(&self) -> Self {
        Self {
            title: String::new(),
            volume_name: self.volume_name.clone(),
            loader_path: self.loader_path.clone(),
            device_path: self.device_path.clone(),
            load_options: self.load_options.clone(),
            os_type: None,
            use_graphics: self.use_graphics,
            initrd_path: self.initrd_path.clone(),
        }
    }

    /// The title, or the loader's file name when there is none.
    #[must_use = "Has no effect if the result is unused"]
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            basename(&self.loader_path)
        } else {
            &self.title
        }
    }
}

/// What happens when an entry is chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Start a discovered OS loader.
    Loader(LoaderEntry),

    /// Boot legacy boot code on a volume.
    Legacy(LegacyEntry),

    /// Boot a legacy target from the firmware's boot option table.
    LegacyFirmware(LegacyFirmwareEntry),

    /// Start a tool.
    Tool(LoaderEntry),

    /// Run a simple action.
    Action(Action),
}

/// An item of the main menu or of a submenu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuEntry {
    /// The title shown in the menu.
    pub title: String,

    /// The row the entry is shown in.
    pub row: Row,

    /// The letter that selects the entry.
    pub shortcut: Option<char>,

    /// The digit that selects the entry.
    pub shortcut_digit: Option<char>,

    /// The main icon.
    pub icon: Icon,

    /// A small icon naming the kind of disk the target lives on.
    pub badge: Option<DiskKind>,

    /// Alternate ways of running the entry.
    pub submenu: Option<Box<MenuScreen>>,

    /// What the entry does.
    pub kind: EntryKind,
}

impl MenuEntry {
    /// Creates an entry with no shortcuts, icon hints, badge or submenu.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(title: impl Into<String>, row: Row, kind: EntryKind) -> Self {
        Self {
            title: title.into(),
            row,
            shortcut: None,
            shortcut_digit: None,
            icon: Icon::default(),
            badge: None,
            submenu: None,
            kind,
        }
    }

    /// Creates an action entry in the tools row.
    #[must_use = "Has no effect if the result is unused"]
    pub fn action(title: impl Into<String>, action: Action, shortcut: Option<char>, icon: &str) -> Self {
        Self {
            shortcut,
            icon: Icon::Hints(icon.into()),
            ..Self::new(title, Row::Tools, EntryKind::Action(action))
        }
    }

    /// The entry that closes a submenu.
    #[must_use = "Has no effect if the result is unused"]
    pub fn return_entry() -> Self {
        Self::new(RETURN_TITLE, Row::Primary, EntryKind::Action(Action::Return))
    }

    /// The loader data of loader and tool entries.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn loader(&self) -> Option<&LoaderEntry> {
        match &self.kind {
            EntryKind::Loader(loader) | EntryKind::Tool(loader) => Some(loader),
            _ => None,
        }
    }

    /// The mutable loader data of loader and tool entries.
    pub const fn loader_mut(&mut self) -> Option<&mut LoaderEntry> {
        match &mut self.kind {
            EntryKind::Loader(loader) | EntryKind::Tool(loader) => Some(loader),
            _ => None,
        }
    }
}

/// A screen of entries, used for submenus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MenuScreen {
    /// The title of the screen.
    pub title: String,

    /// Informational lines shown above the entries.
    pub info_lines: Vec<String>,

    /// The entries.
    pub entries: Vec<MenuEntry>,

    /// Key hints shown below the entries.
    pub hints: Vec<&'static str>,
}

impl MenuScreen {
    /// Creates an empty screen.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Adds an entry.
    pub fn add_entry(&mut self, entry: MenuEntry) {
        self.entries.push(entry);
    }

    /// Adds an informational line.
    pub fn add_info_line(&mut self, line: impl Into<String>) {
        self.info_lines.push(line.into());
    }

    /// Ends the screen with the entry that returns to the main menu, unless it already ends with it.
    pub fn finish(&mut self) {
        if !self.is_finished() {
            self.entries.push(MenuEntry::return_entry());
        }
    }

    /// Checks if the last entry returns to the main menu.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_finished(&self) -> bool {
        self.entries
            .last()
            .is_some_and(|x| x.kind == EntryKind::Action(Action::Return))
    }
}

/// The main menu.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Menu {
    /// Every entry, in display order. Primary entries come before tools.
    pub entries: Vec<MenuEntry>,
}

impl Menu {
    /// Creates an empty menu.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a fully prepared entry.
    pub fn add_entry(&mut self, entry: MenuEntry) {
        self.entries.push(entry);
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The number of entries.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the menu has no entries.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gives the leading primary entries the digits `1` to `9`.
    ///
    /// Assignment stops at the first entry that is not in the primary row.
    pub fn assign_digit_shortcuts(&mut self) {
        let digits = ('1'..='9').take(MAX_DIGIT_SHORTCUTS);
        for (entry, digit) in self
            .entries
            .iter_mut()
            .take_while(|x| x.row == Row::Primary)
            .zip(digits)
        {
            entry.shortcut_digit = Some(digit);
        }
    }

    /// Finds the first entry whose title contains `name`, ignoring case.
    #[must_use = "Has no effect if the result is unused"]
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.entries.iter().position(|x| contains_ci(&x.title, name))
    }

    /// Finds the entry that owns a shortcut key.
    #[must_use = "Has no effect if the result is unused"]
    pub fn find_by_shortcut(&self, key: char) -> Option<usize> {
        let key = key.to_ascii_uppercase();
        self.entries
            .iter()
            .position(|x| x.shortcut_digit == Some(key) || x.shortcut == Some(key))
    }
}

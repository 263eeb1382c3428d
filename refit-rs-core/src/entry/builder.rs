//! Loader entry builder.

use alloc::string::String;

use crate::{
    entry::{EntryKind, Icon, LoaderEntry, MenuEntry, OsType, Row},
    path::clean_path_slashes,
    volume::{DiskKind, Volume},
};

/// A builder to configure a loader or tool [`MenuEntry`].
///
/// # Example
///
/// ```
/// use refit_rs_core::entry::{builder::LoaderEntryBuilder, Row};
///
/// let entry = LoaderEntryBuilder::new("/EFI/tools/shell.efi")
///     .title("Start EFI Shell")
///     .shortcut('S')
///     .row(Row::Tools)
///     .build_tool();
///
/// assert_eq!(entry.loader().map(|x| x.loader_path.as_str()), Some("\\EFI\\tools\\shell.efi"));
/// ```
#[must_use = "Has no effect if the result is unused"]
pub struct LoaderEntryBuilder {
    /// The loader data being built.
    loader: LoaderEntry,

    /// The menu title.
    title: String,

    /// The menu row.
    row: Row,

    /// The shortcut letter.
    shortcut: Option<char>,

    /// The icon.
    icon: Icon,

    /// The disk badge.
    badge: Option<DiskKind>,
}

impl LoaderEntryBuilder {
    /// Starts building an entry for the loader at `loader_path`.
    ///
    /// The path is normalized to backslashes and made absolute.
    pub fn new(loader_path: &str) -> Self {
        let mut path = clean_path_slashes(loader_path);
        if !path.starts_with('\\') {
            path.insert(0, '\\');
        }
        Self {
            loader: LoaderEntry {
                loader_path: path,
                ..LoaderEntry::default()
            },
            title: String::new(),
            row: Row::Primary,
            shortcut: None,
            icon: Icon::default(),
            badge: None,
        }
    }

    /// Starts from an existing loader, as for a submenu entry.
    pub fn inherit(parent: &LoaderEntry) -> Self {
        Self {
            loader: parent.inherit(),
            title: String::new(),
            row: Row::Primary,
            shortcut: None,
            icon: Icon::default(),
            badge: None,
        }
    }

    /// Sets the menu title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the loader's own title, shown in its submenu.
    pub fn loader_title(mut self, title: impl Into<String>) -> Self {
        self.loader.title = title.into();
        self
    }

    /// Ties the loader to a volume, which supplies its name, device path and badge.
    pub fn volume(mut self, volume: &Volume) -> Self {
        self.loader.volume_name = volume.display_name().map(Into::into);
        self.loader.device_path = volume.file_device_path(&self.loader.loader_path);
        self.badge = Some(volume.disk_kind);
        self
    }

    /// Replaces the loader path, keeping the volume name.
    pub fn loader_path(mut self, path: &str, volume: &Volume) -> Self {
        self.loader.loader_path = clean_path_slashes(path);
        self.loader.device_path = volume.file_device_path(&self.loader.loader_path);
        self
    }

    /// Sets the command line.
    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.loader.load_options = Some(options.into());
        self
    }

    /// Sets the command line, or clears it.
    pub fn maybe_options(mut self, options: Option<String>) -> Self {
        self.loader.load_options = options;
        self
    }

    /// Sets the OS family.
    pub fn os_type(mut self, os_type: OsType) -> Self {
        self.loader.os_type = Some(os_type);
        self
    }

    /// Sets if the loader starts in graphics mode.
    pub fn graphics(mut self, use_graphics: bool) -> Self {
        self.loader.use_graphics = use_graphics;
        self
    }

    /// Sets the initial ramdisk.
    pub fn initrd(mut self, initrd: impl Into<String>) -> Self {
        self.loader.initrd_path = Some(initrd.into());
        self
    }

    /// Sets the menu row.
    pub fn row(mut self, row: Row) -> Self {
        self.row = row;
        self
    }

    /// Sets the shortcut letter, upper-casing it.
    pub fn shortcut(mut self, shortcut: char) -> Self {
        self.shortcut = Some(shortcut.to_ascii_uppercase());
        self
    }

    /// Sets the icon.
    pub fn icon(mut self, icon: Icon) -> Self {
        self.icon = icon;
        self
    }

    /// Builds an entry that starts an OS loader.
    pub fn build(self) -> MenuEntry {
        self.finish(EntryKind::Loader)
    }

    /// Builds an entry that starts a tool.
    pub fn build_tool(self) -> MenuEntry {
        self.finish(EntryKind::Tool)
    }

    /// Wraps the loader data into an entry of the given kind.
    fn finish(self, kind: fn(LoaderEntry) -> EntryKind) -> MenuEntry {
        MenuEntry {
            title: self.title,
            row: self.row,
            shortcut: self.shortcut,
            shortcut_digit: None,
            icon: self.icon,
            badge: self.badge,
            submenu: None,
            kind: kind(self.loader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let volume = Volume {
            name: Some("ESP".into()),
            ..Volume::default()
        };
        let entry = LoaderEntryBuilder::new("EFI//ubuntu/grubx64.efi/")
            .title("Boot ubuntu from ESP ")
            .volume(&volume)
            .options("quiet")
            .os_type(OsType::Grub)
            .shortcut('g')
            .build();

        assert_eq!(entry.shortcut, Some('G'));
        assert_eq!(entry.badge, Some(volume.disk_kind));
        let loader = entry.loader().expect("loader entry");
        assert_eq!(loader.loader_path, "\\EFI\\ubuntu\\grubx64.efi");
        assert_eq!(loader.volume_name.as_deref(), Some("ESP"));
        assert_eq!(loader.load_options.as_deref(), Some("quiet"));
        assert!(matches!(entry.kind, EntryKind::Loader(_)));
    }
}

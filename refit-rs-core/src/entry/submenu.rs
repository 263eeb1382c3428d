//! Generates the options submenu of a loader entry.
//!
//! Every submenu starts with an entry that boots with the default options and ends with an entry that returns to
//! the main menu. What comes in between depends on the OS family:
//!
//! - Mac OS X gets kernel architecture choices, verbose, single user and safe modes, and the Apple Hardware Test
//!   when it is installed.
//! - Linux kernels get one entry per extra line of their options file.
//! - ELILO and XOM get their usual command line choices.

use alloc::{boxed::Box, format, string::String};

use crate::{
    boot::arch::HAS_KERNEL_ARCH_CHOICE,
    config::{
        GlobalConfig, GraphicsFor, HideUi,
        linux::{OptionsFile, add_initrd_to_options},
    },
    entry::{EntryKind, LoaderEntry, MenuEntry, MenuScreen, OsType, builder::LoaderEntryBuilder, initrd::find_initrd},
    volume::Volume,
};

/// The first key hint of every submenu.
pub const HINT_KEYS: &str = "Use arrow keys to move cursor; Enter to boot;";

/// The second key hint when the options editor is available.
pub const HINT_EDITOR: &str = "Insert or F2 to edit options; Esc to return to main menu";

/// The second key hint when the options editor is hidden.
pub const HINT_NO_EDITOR: &str = "Esc to return to main menu";

/// The title of the entry that boots with the default options.
pub const DEFAULT_OPTIONS_TITLE: &str = "Boot using default options";

/// The Apple Hardware Test.
const APPLE_DIAGS_PATH: &str = "\\System\\Library\\CoreServices\\.diagnostics\\diags.efi";

/// The title used for options file lines without one.
const LINUX_FALLBACK_TITLE: &str = "Boot Linux";

/// Starts the submenu of a loader.
///
/// The screen is titled after the loader and its volume, and holds the entry that boots with the default options.
/// An initial ramdisk recorded on the loader is added to those options unless they already name one.
#[must_use = "Has no effect if the result is unused"]
pub fn initialize_submenu(loader: &LoaderEntry, config: &GlobalConfig) -> MenuScreen {
    let mut screen = MenuScreen::new(format!(
        "Boot Options for {} on {}",
        loader.display_title(),
        loader.volume_name.as_deref().unwrap_or_default()
    ));

    let mut default = LoaderEntryBuilder::inherit(loader)
        .title(DEFAULT_OPTIONS_TITLE)
        .build();
    if let Some(sub) = default.loader_mut()
        && sub.initrd_path.as_deref().is_some_and(|x| !x.is_empty())
    {
        sub.load_options = add_initrd_to_options(
            Some(sub.load_options.as_deref().unwrap_or_default()),
            sub.initrd_path.as_deref(),
        );
    }
    screen.add_entry(default);

    screen.hints = alloc::vec![
        HINT_KEYS,
        if config.hide_ui.contains(HideUi::EDITOR) {
            HINT_NO_EDITOR
        } else {
            HINT_EDITOR
        },
    ];
    screen
}

/// Builds a submenu entry that shares the target of `loader`.
fn sub_entry(loader: &LoaderEntry, title: &str, options: &str, use_graphics: bool) -> MenuEntry {
    LoaderEntryBuilder::inherit(loader)
        .title(title)
        .options(options)
        .graphics(use_graphics)
        .build()
}

/// Generates the submenu of a loader entry.
///
/// Entries that already have a submenu keep it unchanged.
pub fn generate_submenu(entry: &mut MenuEntry, volume: &mut Volume, config: &GlobalConfig) {
    if entry.submenu.is_some() {
        return;
    }
    let EntryKind::Loader(loader) = &mut entry.kind else {
        return;
    };

    let mut screen = initialize_submenu(loader, config);
    match loader.os_type {
        Some(OsType::Mac) => add_mac_entries(&mut screen, loader, volume, config),
        Some(OsType::Linux) => add_linux_entries(&mut screen, loader, volume, config),
        Some(OsType::Elilo) => add_elilo_entries(&mut screen, loader, config),
        Some(OsType::Xom) => {
            loader.load_options = Some("-s -h".into());
            add_xom_entries(&mut screen, loader, config);
        }
        _ => (),
    }
    screen.finish();
    entry.submenu = Some(Box::new(screen));
}

/// Mac OS X boot modes.
fn add_mac_entries(screen: &mut MenuScreen, loader: &LoaderEntry, volume: &mut Volume, config: &GlobalConfig) {
    let graphics = config.graphics_for.contains(GraphicsFor::OSX);

    if HAS_KERNEL_ARCH_CHOICE {
        screen.add_entry(sub_entry(loader, "Boot Mac OS X with a 64-bit kernel", "arch=x86_64", graphics));
        screen.add_entry(sub_entry(loader, "Boot Mac OS X with a 32-bit kernel", "arch=i386", graphics));
    }

    if !config.hide_ui.contains(HideUi::SINGLEUSER) {
        screen.add_entry(sub_entry(loader, "Boot Mac OS X in verbose mode", "-v", false));
        if HAS_KERNEL_ARCH_CHOICE {
            screen.add_entry(sub_entry(
                loader,
                "Boot Mac OS X in verbose mode (64-bit)",
                "-v arch=x86_64",
                false,
            ));
            screen.add_entry(sub_entry(
                loader,
                "Boot Mac OS X in verbose mode (32-bit)",
                "-v arch=i386",
                false,
            ));
        }
        screen.add_entry(sub_entry(loader, "Boot Mac OS X in single user mode", "-v -s", false));
    }

    if !config.hide_ui.contains(HideUi::SAFEMODE) {
        screen.add_entry(sub_entry(loader, "Boot Mac OS X in safe mode", "-v -x", false));
    }

    if !config.hide_ui.contains(HideUi::HWTEST) && volume.fs().is_some_and(|fs| fs.exists(APPLE_DIAGS_PATH)) {
        screen.add_entry(
            LoaderEntryBuilder::inherit(loader)
                .title("Run Apple Hardware Test")
                .loader_path(APPLE_DIAGS_PATH, volume)
                .maybe_options(None)
                .graphics(graphics)
                .build(),
        );
    }
}

/// One entry per extra line of the options file, each with the kernel's initial ramdisk.
///
/// The first line of the file titles the default entry, whose options were set up by classification.
fn add_linux_entries(screen: &mut MenuScreen, loader: &LoaderEntry, volume: &mut Volume, config: &GlobalConfig) {
    let Some(fs) = volume.fs() else {
        return;
    };
    let Some(file) = OptionsFile::find(fs, &loader.loader_path) else {
        return;
    };
    let initrd = find_initrd(fs, &loader.loader_path);

    if let Some(first) = screen.entries.first_mut() {
        first.title = String::from(file.first_title().unwrap_or(LINUX_FALLBACK_TITLE));
    }

    let graphics = config.graphics_for.contains(GraphicsFor::LINUX);
    for (title, options) in file.extra_entries() {
        let title = if title.is_empty() { LINUX_FALLBACK_TITLE } else { title };
        screen.add_entry(
            LoaderEntryBuilder::inherit(loader)
                .title(title)
                .maybe_options(add_initrd_to_options(Some(options), initrd.as_deref()))
                .graphics(graphics)
                .build(),
        );
    }
}

/// ELILO's interactive mode and example Mac model choices.
fn add_elilo_entries(screen: &mut MenuScreen, loader: &LoaderEntry, config: &GlobalConfig) {
    let graphics = config.graphics_for.contains(GraphicsFor::ELILO);
    screen.add_entry(sub_entry(loader, "Run ELILO in interactive mode", "-p", graphics));
    screen.add_entry(sub_entry(
        loader,
        "Boot Linux for a 17\" iMac or a 15\" MacBook Pro (*)",
        "-d 0 i17",
        graphics,
    ));
    screen.add_entry(sub_entry(loader, "Boot Linux for a 20\" iMac (*)", "-d 0 i20", graphics));
    screen.add_entry(sub_entry(loader, "Boot Linux for a Mac Mini (*)", "-d 0 mini", graphics));
    screen.add_info_line("NOTE: This is an example. Entries");
    screen.add_info_line("marked with (*) may not work.");
}

/// Windows XP on Mac boot media choices.
fn add_xom_entries(screen: &mut MenuScreen, loader: &LoaderEntry, config: &GlobalConfig) {
    let graphics = config.graphics_for.contains(GraphicsFor::WINDOWS);
    screen.add_entry(sub_entry(loader, "Boot Windows from Hard Disk", "-s -h", graphics));
    screen.add_entry(sub_entry(loader, "Boot Windows from CD-ROM", "-s -c", graphics));
    screen.add_entry(sub_entry(loader, "Run XOM in text mode", "-v", graphics));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entry::classify::set_loader_defaults, system::fs::mem::MemFs};

    fn loader_entry(path: &str, volume: &mut Volume, config: &GlobalConfig) -> MenuEntry {
        let mut entry = LoaderEntryBuilder::new(path)
            .loader_title(path)
            .volume(volume)
            .build();
        set_loader_defaults(&mut entry, volume, config);
        generate_submenu(&mut entry, volume, config);
        entry
    }

    fn titles(screen: &MenuScreen) -> alloc::vec::Vec<&str> {
        screen.entries.iter().map(|x| x.title.as_str()).collect()
    }

    #[test]
    fn test_linux_options_file() {
        let mut volume = Volume {
            name: Some("ESP".into()),
            fs: Some(Box::new(
                MemFs::new()
                    .with_file("\\EFI\\linux\\bzImage-5.10.efi", b"")
                    .with_file("\\EFI\\linux\\initramfs-5.10.img", b"")
                    .with_file(
                        "\\EFI\\linux\\refit_linux.conf",
                        b"\"Boot Linux\" \"root=/dev/sda1\"\n\"Boot Linux safe\" \"root=/dev/sda1 single\"\n",
                    ),
            )),
            ..Volume::default()
        };
        let config = GlobalConfig::default();
        let entry = loader_entry("\\EFI\\linux\\bzImage-5.10.efi", &mut volume, &config);
        let screen = entry.submenu.as_deref().expect("submenu");

        assert_eq!(titles(screen), ["Boot Linux", "Boot Linux safe", "Return to Main Menu"]);
        let options: alloc::vec::Vec<_> = screen
            .entries
            .iter()
            .filter_map(|x| x.loader()?.load_options.as_deref())
            .collect();
        assert_eq!(
            options,
            [
                "root=/dev/sda1 initrd=\\EFI\\linux\\initramfs-5.10.img",
                "root=/dev/sda1 single initrd=\\EFI\\linux\\initramfs-5.10.img"
            ]
        );
        assert_eq!(screen.title, "Boot Options for \\EFI\\linux\\bzImage-5.10.efi on ESP");
        assert_eq!(screen.hints, [HINT_KEYS, HINT_EDITOR]);
    }

    #[test]
    fn test_mac_hidden_modes() {
        let mut volume = Volume {
            name: Some("Macintosh HD".into()),
            fs: Some(Box::new(
                MemFs::new()
                    .with_file(crate::entry::classify::MAC_LOADER_PATH, b"")
                    .with_file(APPLE_DIAGS_PATH, b""),
            )),
            ..Volume::default()
        };
        let config = GlobalConfig {
            hide_ui: HideUi::SINGLEUSER | HideUi::EDITOR,
            ..GlobalConfig::default()
        };
        let entry = loader_entry(crate::entry::classify::MAC_LOADER_PATH, &mut volume, &config);
        let screen = entry.submenu.as_deref().expect("submenu");
        let titles = titles(screen);

        assert!(titles.contains(&"Boot Mac OS X in safe mode"));
        assert!(titles.contains(&"Run Apple Hardware Test"));
        assert!(!titles.iter().any(|x| x.contains("single user") || x.contains("verbose")));
        assert_eq!(titles.first(), Some(&DEFAULT_OPTIONS_TITLE));
        assert_eq!(titles.last(), Some(&"Return to Main Menu"));
        assert_eq!(screen.hints, [HINT_KEYS, HINT_NO_EDITOR]);

        let diags = screen
            .entries
            .iter()
            .find(|x| x.title == "Run Apple Hardware Test")
            .and_then(MenuEntry::loader)
            .expect("hardware test");
        assert_eq!(diags.loader_path, APPLE_DIAGS_PATH);
    }

    #[test]
    fn test_xom_and_elilo() {
        let mut volume = Volume {
            name: Some("ESP".into()),
            fs: Some(Box::new(MemFs::new())),
            ..Volume::default()
        };
        let config = GlobalConfig::default();

        let xom = loader_entry("\\xom.efi", &mut volume, &config);
        assert_eq!(xom.loader().and_then(|x| x.load_options.as_deref()), Some("-s -h"));
        assert_eq!(xom.submenu.as_ref().map(|x| x.entries.len()), Some(5));

        let elilo = loader_entry("\\EFI\\elilo\\elilo.efi", &mut volume, &config);
        let screen = elilo.submenu.as_deref().expect("submenu");
        assert_eq!(screen.info_lines.len(), 2);
        assert_eq!(screen.entries.len(), 6);
    }

    #[test]
    fn test_xom_graphics() {
        let mut volume = Volume {
            name: Some("ESP".into()),
            fs: Some(Box::new(MemFs::new())),
            ..Volume::default()
        };
        let graphics = |entry: &MenuEntry| -> alloc::vec::Vec<bool> {
            let screen = entry.submenu.as_deref().expect("submenu");
            screen.entries.iter().filter_map(MenuEntry::loader).map(|x| x.use_graphics).collect()
        };

        let config = GlobalConfig {
            graphics_for: GraphicsFor::WINDOWS,
            ..GlobalConfig::default()
        };
        let xom = loader_entry("\\xom.efi", &mut volume, &config);
        let screen = xom.submenu.as_deref().expect("submenu");
        assert!(titles(screen).contains(&"Run XOM in text mode"));
        assert!(graphics(&xom).iter().skip(1).all(|x| *x));

        let xom = loader_entry("\\xom.efi", &mut volume, &GlobalConfig::default());
        assert!(graphics(&xom).iter().skip(1).all(|x| !*x));
    }

    #[test]
    fn test_submenu_reused() {
        let mut volume = Volume::default();
        let config = GlobalConfig::default();
        let mut entry = loader_entry("\\EFI\\arch\\loader.efi", &mut volume, &config);
        let first = entry.submenu.clone();
        generate_submenu(&mut entry, &mut volume, &config);
        assert_eq!(entry.submenu, first);
        assert!(entry.submenu.as_deref().is_some_and(MenuScreen::is_finished));
    }

    #[test]
    fn test_default_entry_initrd() {
        let loader = LoaderEntry {
            loader_path: "\\vmlinuz".into(),
            load_options: Some("ro".into()),
            initrd_path: Some("\\initrd.img".into()),
            ..LoaderEntry::default()
        };
        let screen = initialize_submenu(&loader, &GlobalConfig::default());
        assert_eq!(
            screen.entries[0].loader().and_then(|x| x.load_options.as_deref()),
            Some("ro initrd=\\initrd.img")
        );
        assert_eq!(screen.title, "Boot Options for vmlinuz on ");
    }
}

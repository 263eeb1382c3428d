// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Builds the second row of the menu, holding tools and actions.
//!
//! Entries are added in the order of `showtools`. Tools are EFI images like any loader, found either on the boot
//! manager's own volume or by searching every volume for a set of known locations and names. Actions need no file.

use alloc::{format, string::String, vec::Vec};

use log::debug;

use crate::{
    boot::arch,
    config::ToolKind,
    entry::{Action, Icon, Menu, MenuEntry, Row, builder::LoaderEntryBuilder, cap_title},
    path::{join_path, split_volume_and_filename},
    scan::{ScanContext, filter::names_volume},
    volume::Volume,
};

/// The loader of the Apple recovery partition.
pub const APPLE_RECOVERY_PATH: &str = "\\com.apple.recovery.boot\\boot.efi";

/// The title of the about action.
pub const ABOUT_TITLE: &str = "About refit-rs";

/// The title of the shutdown action.
pub const SHUTDOWN_TITLE: &str = "Shut Down";

/// The title of the reboot action.
pub const REBOOT_TITLE: &str = "Reboot";

/// The title of the exit action.
pub const EXIT_TITLE: &str = "Exit refit-rs";

/// The title of the firmware setup action.
pub const FIRMWARE_TITLE: &str = "Reboot to Computer Setup Utility";

/// Directories searched for machine owner key utilities, besides the boot manager's own.
const MOK_LOCATIONS: [&str; 8] = [
    "\\",
    "\\EFI\\tools",
    "\\EFI\\fedora",
    "\\EFI\\redhat",
    "\\EFI\\ubuntu",
    "\\EFI\\suse",
    "\\EFI\\opensuse",
    "\\EFI\\altlinux",
];

/// File names of machine owner key utilities.
const MOK_NAMES: [&str; 5] = [
    "MokManager.efi",
    "HashTool.efi",
    "HashTool-signed.efi",
    "KeyTool.efi",
    "KeyTool-signed.efi",
];

/// Directories searched for a memory tester.
const MEMTEST_LOCATIONS: [&str; 5] = [
    "\\EFI\\tools",
    "\\EFI\\tools\\memtest86",
    "\\EFI\\tools\\memtest",
    "\\EFI\\memtest86",
    "\\EFI\\memtest",
];

/// Builds the entry of a tool at `path` on `volume`.
fn tool_entry(
    volume: &Volume,
    path: &str,
    name: &str,
    icon: &str,
    shortcut: Option<char>,
    use_graphics: bool,
) -> MenuEntry {
    let mut builder = LoaderEntryBuilder::new(path)
        .title(cap_title(format!("Start {name}")))
        .loader_title(name)
        .volume(volume)
        .row(Row::Tools)
        .graphics(use_graphics)
        .icon(Icon::Hints(icon.into()));
    if let Some(shortcut) = shortcut {
        builder = builder.shortcut(shortcut);
    }
    builder.build_tool()
}

/// Adds a tool for every path in `paths` that exists on the boot manager's own volume.
fn add_self_tools(
    ctx: &ScanContext<'_>,
    volumes: &mut [Volume],
    paths: &[String],
    name: &str,
    icon: &str,
    shortcut: char,
    menu: &mut Menu,
) {
    let Some(volume) = ctx.self_image.volume.and_then(|x| volumes.get_mut(x)) else {
        debug!("The boot manager's volume is unknown, not looking for {name}");
        return;
    };
    for path in paths {
        if volume.fs().is_some_and(|fs| fs.exists(path)) {
            menu.add_entry(tool_entry(volume, path, name, icon, Some(shortcut), false));
        }
    }
}

/// Searches every readable volume for a tool in any of `locations` under any of `names`.
///
/// Every copy found gets its own entry, titled after its path and volume.
fn find_tool<L: AsRef<str>, N: AsRef<str>>(
    volumes: &mut [Volume],
    locations: &[L],
    names: &[N],
    description: &str,
    icon: &str,
    menu: &mut Menu,
) {
    for location in locations {
        for name in names {
            let path = join_path(location.as_ref(), name.as_ref());
            for volume in volumes.iter_mut() {
                if !volume.fs().is_some_and(|fs| fs.exists(&path)) {
                    continue;
                }
                let full = format!(
                    "{description} at {path} on {}",
                    volume.display_name().unwrap_or_default()
                );
                menu.add_entry(tool_entry(volume, &path, &full, icon, Some('S'), false));
            }
        }
    }
}

/// Adds a recovery tool at `path` for every volume that has it.
///
/// With a qualifier, only volumes it names are looked at.
fn add_recovery_tools(
    volumes: &mut [Volume],
    qualifier: Option<&str>,
    path: &str,
    vendor: &str,
    icon: &str,
    menu: &mut Menu,
) {
    for (index, volume) in volumes.iter_mut().enumerate() {
        if qualifier.is_some_and(|x| !names_volume(x, volume, index)) {
            continue;
        }
        if volume.fs().is_some_and(|fs| fs.exists(path)) {
            let name = format!("{vendor} Recovery on {}", volume.display_name().unwrap_or_default());
            menu.add_entry(tool_entry(volume, path, &name, icon, Some('R'), true));
        }
    }
}

/// Adds the tools and actions listed in `showtools` to the second row.
///
/// The firmware setup action is only added when the firmware supports booting into its setup utility.
pub fn scan_for_tools(ctx: &ScanContext<'_>, volumes: &mut [Volume], menu: &mut Menu, firmware_ui_supported: bool) {
    for tool in &ctx.config.show_tools {
        match tool {
            ToolKind::Shell => {
                add_self_tools(ctx, volumes, &arch::shell_paths(), "EFI Shell", "tool_shell", 'S', menu);
            }
            ToolKind::Gptsync => {
                add_self_tools(ctx, volumes, &arch::gptsync_paths(), "Hybrid MBR tool", "tool_part", 'P', menu);
            }
            ToolKind::Gdisk => add_self_tools(
                ctx,
                volumes,
                &arch::gdisk_paths(),
                "disk partitioning tool",
                "tool_part",
                'G',
                menu,
            ),
            ToolKind::Memtest => find_tool(
                volumes,
                &MEMTEST_LOCATIONS,
                &arch::memtest_names(),
                "Memory test utility",
                "tool_memtest",
                menu,
            ),
            ToolKind::MokTool => {
                let mut locations: Vec<&str> = MOK_LOCATIONS.to_vec();
                if !ctx.self_image.dir.is_empty() {
                    locations.push(&ctx.self_image.dir);
                }
                find_tool(volumes, &locations, &MOK_NAMES, "MOK utility", "tool_mok_tool", menu);
            }
            ToolKind::AppleRecovery => {
                add_recovery_tools(volumes, None, APPLE_RECOVERY_PATH, "Apple", "tool_apple_rescue", menu);
            }
            ToolKind::WindowsRecovery => {
                for file in &ctx.config.windows_recovery_files {
                    let (qualifier, path) = split_volume_and_filename(file);
                    let path = join_path("\\", path);
                    add_recovery_tools(volumes, qualifier, &path, "Microsoft", "tool_windows_rescue", menu);
                }
            }
            ToolKind::About => menu.add_entry(MenuEntry::action(ABOUT_TITLE, Action::About, Some('A'), "func_about")),
            ToolKind::Shutdown => menu.add_entry(MenuEntry::action(
                SHUTDOWN_TITLE,
                Action::Shutdown,
                Some('U'),
                "func_shutdown",
            )),
            ToolKind::Reboot => {
                menu.add_entry(MenuEntry::action(REBOOT_TITLE, Action::Reboot, Some('R'), "func_reset"));
            }
            ToolKind::Exit => menu.add_entry(MenuEntry::action(EXIT_TITLE, Action::Exit, None, "func_exit")),
            ToolKind::Firmware => {
                if firmware_ui_supported {
                    menu.add_entry(MenuEntry::action(FIRMWARE_TITLE, Action::Firmware, None, "func_firmware"));
                } else {
                    debug!("The firmware cannot boot into its setup utility");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::GlobalConfig, entry::EntryKind, scan::SelfImage, system::fs::mem::MemFs};
    use alloc::{boxed::Box, vec};

    fn volume(name: &str, fs: MemFs) -> Volume {
        Volume {
            name: Some(name.into()),
            fs: Some(Box::new(fs)),
            ..Volume::default()
        }
    }

    fn self_image() -> SelfImage {
        SelfImage {
            volume: Some(0),
            dir: "\\EFI\\refit".into(),
            path: "\\EFI\\refit\\refit.efi".into(),
        }
    }

    fn scan(tools: &[ToolKind], volumes: &mut [Volume], firmware_ui_supported: bool) -> Menu {
        let config = GlobalConfig {
            show_tools: tools.to_vec(),
            ..GlobalConfig::default()
        };
        let self_image = self_image();
        let ctx = ScanContext::new(&config, &self_image);
        let mut menu = Menu::new();
        scan_for_tools(&ctx, volumes, &mut menu, firmware_ui_supported);
        menu
    }

    fn titles(menu: &Menu) -> Vec<&str> {
        menu.entries.iter().map(|x| x.title.as_str()).collect()
    }

    #[test]
    fn test_self_volume_tools() {
        let mut volumes = vec![
            volume(
                "ESP",
                MemFs::new()
                    .with_file("\\EFI\\tools\\shell.efi", b"")
                    .with_file("\\EFI\\tools\\gdisk.efi", b""),
            ),
            volume("Other", MemFs::new().with_file("\\shell.efi", b"")),
        ];
        let menu = scan(&[ToolKind::Gdisk, ToolKind::Shell], &mut volumes, false);

        assert_eq!(titles(&menu), ["Start disk partitioning tool", "Start EFI Shell"]);
        assert!(menu.entries.iter().all(|x| x.row == Row::Tools));
        assert_eq!(menu.entries[1].shortcut, Some('S'));
        assert!(matches!(&menu.entries[1].kind, EntryKind::Tool(x) if x.loader_path == "\\EFI\\tools\\shell.efi"));
    }

    #[test]
    fn test_recovery_tools() {
        let mut volumes = vec![
            volume("ESP", MemFs::new().with_file("\\EFI\\Microsoft\\Boot\\LrsBootmgr.efi", b"")),
            volume("Recovery HD", MemFs::new().with_file(APPLE_RECOVERY_PATH, b"")),
            volume("Backup", MemFs::new().with_file("\\EFI\\Microsoft\\Boot\\LrsBootmgr.efi", b"")),
        ];
        let menu = scan(&[ToolKind::AppleRecovery, ToolKind::WindowsRecovery], &mut volumes, false);

        assert_eq!(
            titles(&menu),
            [
                "Start Apple Recovery on Recovery HD",
                "Start Microsoft Recovery on ESP",
                "Start Microsoft Recovery on Backup",
            ]
        );
        assert!(menu.entries.iter().all(|x| x.shortcut == Some('R')));
        assert!(menu.entries.iter().all(|x| x.loader().is_some_and(|x| x.use_graphics)));

        let config = GlobalConfig {
            show_tools: vec![ToolKind::WindowsRecovery],
            windows_recovery_files: vec!["Backup:EFI/Microsoft/Boot/LrsBootmgr.efi".into()],
            ..GlobalConfig::default()
        };
        let self_image = self_image();
        let mut menu = Menu::new();
        scan_for_tools(&ScanContext::new(&config, &self_image), &mut volumes, &mut menu, false);
        assert_eq!(titles(&menu), ["Start Microsoft Recovery on Backup"]);
    }

    #[test]
    fn test_searched_tools() {
        let mut volumes = vec![
            volume("ESP", MemFs::new().with_file("\\EFI\\refit\\HashTool.efi", b"")),
            volume(
                "Data",
                MemFs::new()
                    .with_file("\\EFI\\ubuntu\\MokManager.efi", b"")
                    .with_file("\\EFI\\memtest\\memtest86.efi", b""),
            ),
        ];
        let menu = scan(&[ToolKind::MokTool, ToolKind::Memtest], &mut volumes, false);

        assert_eq!(
            titles(&menu),
            [
                "Start MOK utility at \\EFI\\ubuntu\\MokManager.efi on Data",
                "Start MOK utility at \\EFI\\refit\\HashTool.efi on ESP",
                "Start Memory test utility at \\EFI\\memtest\\memtest86.efi on Data",
            ]
        );
        assert!(menu.entries.iter().all(|x| x.shortcut == Some('S')));
    }

    #[test]
    fn test_actions() {
        let all = [
            ToolKind::About,
            ToolKind::Shutdown,
            ToolKind::Reboot,
            ToolKind::Exit,
            ToolKind::Firmware,
        ];
        let menu = scan(&all, &mut [], true);
        assert_eq!(
            titles(&menu),
            [ABOUT_TITLE, SHUTDOWN_TITLE, REBOOT_TITLE, EXIT_TITLE, FIRMWARE_TITLE]
        );
        let shortcuts: Vec<Option<char>> = menu.entries.iter().map(|x| x.shortcut).collect();
        assert_eq!(shortcuts, [Some('A'), Some('U'), Some('R'), None, None]);

        let menu = scan(&all, &mut [], false);
        assert_eq!(menu.len(), 4);
        assert!(!menu.entries.iter().any(|x| x.kind == EntryKind::Action(Action::Firmware)));
    }
}

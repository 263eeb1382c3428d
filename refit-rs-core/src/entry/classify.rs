//! Classifies a loader by its path and works out its defaults.
//!
//! Rules are tried in a fixed order and the first one that matches decides the OS family, so more specific rules
//! come before more generic ones:
//!
//! | Match                                               | Family  | Hints         | Shortcut |
//! |-----------------------------------------------------|---------|---------------|----------|
//! | file name contains `bzImage` or `vmlinuz`           | Linux   | distro, linux | `L`      |
//! | path contains `refit` or `refind`                   | rEFIt   | refit/refind  | `R`      |
//! | path is `System\Library\CoreServices\boot.efi`      | Mac     | mac           | `M`      |
//! | file name is `diags.efi`                            |         | hwtest        |          |
//! | file name is `e.efi` or contains `elilo`            | ELILO   | elilo, linux  | `L`      |
//! | file name contains `grub`                           | GRUB    | grub, linux   | `G`      |
//! | file name is a Windows boot manager                 | Windows | win           | `W`      |
//! | file name is `xom.efi`                              | XOM     | xom, win      | `W`      |
//!
//! The directory that holds the loader and the words of the volume name come before the family hints. The
//! directory's first letter is the shortcut when the family does not force one.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    config::{
        GlobalConfig, GraphicsFor,
        linux::{OptionsFile, add_initrd_to_options, guess_distribution},
    },
    entry::{Icon, MenuEntry, OsType, initrd::find_initrd},
    path::{basename, contains_ci, eq_ci, find_last_dir_name, find_path, is_in, join_path, strip_extension},
    volume::Volume,
};

/// The path of the Mac OS X loader.
pub const MAC_LOADER_PATH: &str = "\\System\\Library\\CoreServices\\boot.efi";

/// File names of the Windows boot manager.
const WINDOWS_LOADER_NAMES: [&str; 4] = ["cdboot.efi", "bootmgr.efi", "bootmgfw.efi", "bkpbootmgfw.efi"];

/// Icon file extensions looked for next to a loader.
const ICON_EXTENSIONS: [&str; 2] = ["png", "icns"];

/// What classification decided about a loader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoaderDefaults {
    /// The OS family, if the loader was recognized.
    pub os_type: Option<OsType>,

    /// The upper case shortcut letter.
    pub shortcut: Option<char>,

    /// The icon.
    pub icon: Icon,

    /// The command line, for Linux kernels.
    pub load_options: Option<String>,

    /// If the loader starts in graphics mode.
    pub use_graphics: bool,
}

/// Works out the defaults of the loader at `loader_path` on `volume`.
pub fn loader_defaults(loader_path: &str, volume: &mut Volume, config: &GlobalConfig) -> LoaderDefaults {
    let name = basename(loader_path);
    let mut defaults = LoaderDefaults::default();
    let mut hints: Vec<String> = Vec::new();

    if let Some(icon) = volume.fs().and_then(|fs| {
        let dir = find_path(loader_path);
        let stem = strip_extension(name);
        ICON_EXTENSIONS
            .iter()
            .map(|ext| join_path(dir, &alloc::format!("{stem}.{ext}")))
            .find(|x| fs.exists(x))
    }) {
        defaults.icon = Icon::File(icon);
    } else if volume.has_icon {
        defaults.icon = Icon::Volume;
    }

    if let Some(dir) = find_last_dir_name(loader_path) {
        defaults.shortcut = dir.chars().next();
        hints.push(dir.to_string());
    }

    if let Some(volume_name) = volume.display_name() {
        hints.extend(
            volume_name
                .split([' ', '_', '-'])
                .filter(|x| !x.is_empty())
                .map(ToString::to_string),
        );
    }

    let family_hints: &[&str] = if contains_ci(name, "bzImage") || contains_ci(name, "vmlinuz") {
        if let Some(fs) = volume.fs() {
            hints.extend(guess_distribution(fs, loader_path));
            let options = OptionsFile::find(fs, loader_path);
            let initrd = find_initrd(fs, loader_path);
            defaults.load_options = add_initrd_to_options(
                options.as_ref().and_then(OptionsFile::first_options),
                initrd.as_deref(),
            );
        }
        defaults.os_type = Some(OsType::Linux);
        defaults.shortcut = defaults.shortcut.or(Some('L'));
        defaults.use_graphics = config.graphics_for.contains(GraphicsFor::LINUX);
        &["linux"]
    } else if contains_ci(loader_path, "refit") {
        defaults.os_type = Some(OsType::Refit);
        defaults.shortcut = Some('R');
        &["refit"]
    } else if contains_ci(loader_path, "refind") {
        defaults.os_type = Some(OsType::Refit);
        defaults.shortcut = Some('R');
        &["refind"]
    } else if eq_ci(loader_path, MAC_LOADER_PATH) {
        defaults.os_type = Some(OsType::Mac);
        defaults.shortcut = Some('M');
        defaults.use_graphics = config.graphics_for.contains(GraphicsFor::OSX);
        &["mac"]
    } else if eq_ci(name, "diags.efi") {
        &["hwtest"]
    } else if eq_ci(name, "e.efi") || contains_ci(name, "elilo") {
        defaults.os_type = Some(OsType::Elilo);
        defaults.shortcut = defaults.shortcut.or(Some('L'));
        defaults.use_graphics = config.graphics_for.contains(GraphicsFor::ELILO);
        &["elilo", "linux"]
    } else if contains_ci(name, "grub") {
        defaults.os_type = Some(OsType::Grub);
        defaults.shortcut = Some('G');
        defaults.use_graphics = config.graphics_for.contains(GraphicsFor::GRUB);
        &["grub", "linux"]
    } else if is_in(name, &WINDOWS_LOADER_NAMES) {
        defaults.os_type = Some(OsType::Windows);
        defaults.shortcut = Some('W');
        defaults.use_graphics = config.graphics_for.contains(GraphicsFor::WINDOWS);
        &["win"]
    } else if eq_ci(name, "xom.efi") {
        defaults.os_type = Some(OsType::Xom);
        defaults.shortcut = Some('W');
        defaults.use_graphics = config.graphics_for.contains(GraphicsFor::WINDOWS);
        &["xom", "win"]
    } else {
        &[]
    };
    hints.extend(family_hints.iter().map(ToString::to_string));

    defaults.shortcut = defaults.shortcut.map(|x| x.to_ascii_uppercase());
    if defaults.icon == Icon::default() {
        defaults.icon = Icon::from_hints(&hints);
    }
    defaults
}

/// Classifies the loader of `entry` and stores the result in it.
///
/// An icon file the entry already has is kept, as are its options unless classification found better ones.
pub fn set_loader_defaults(entry: &mut MenuEntry, volume: &mut Volume, config: &GlobalConfig) {
    let Some(loader_path) = entry.loader().map(|x| x.loader_path.clone()) else {
        return;
    };
    let defaults = loader_defaults(&loader_path, volume, config);

    entry.shortcut = defaults.shortcut;
    if !matches!(entry.icon, Icon::File(_)) {
        entry.icon = defaults.icon;
    }
    if let Some(loader) = entry.loader_mut() {
        loader.os_type = defaults.os_type;
        loader.use_graphics = defaults.use_graphics;
        if defaults.load_options.is_some() {
            loader.load_options = defaults.load_options;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fs::mem::MemFs;
    use alloc::boxed::Box;

    fn volume(name: &str, fs: MemFs) -> Volume {
        Volume {
            name: Some(name.into()),
            fs: Some(Box::new(fs)),
            ..Volume::default()
        }
    }

    #[test]
    fn test_linux_kernel() {
        let mut volume = volume(
            "Fedora-Root",
            MemFs::new()
                .with_file("\\boot\\vmlinuz-6.5.6-300.fc39.x86_64", b"")
                .with_file("\\boot\\initramfs-6.5.6-300.fc39.x86_64.img", b"")
                .with_file("\\boot\\refind_linux.conf", b"\"Boot\" \"ro root=UUID=1\""),
        );
        let config = GlobalConfig {
            graphics_for: GraphicsFor::LINUX,
            ..GlobalConfig::default()
        };
        let defaults = loader_defaults("\\boot\\vmlinuz-6.5.6-300.fc39.x86_64", &mut volume, &config);

        assert_eq!(defaults.os_type, Some(OsType::Linux));
        assert_eq!(defaults.shortcut, Some('B'));
        assert!(defaults.use_graphics);
        assert_eq!(
            defaults.load_options.as_deref(),
            Some("ro root=UUID=1 initrd=\\boot\\initramfs-6.5.6-300.fc39.x86_64.img")
        );
        assert_eq!(defaults.icon, Icon::Hints("boot,Fedora,Root,fedora,linux".into()));
    }

    #[test]
    fn test_first_match_wins() {
        let mut volume = volume("ESP", MemFs::new());
        let config = GlobalConfig::default();

        let refind = loader_defaults("\\EFI\\refind\\grubx64.efi", &mut volume, &config);
        assert_eq!(refind.os_type, Some(OsType::Refit));

        let grub = loader_defaults("\\EFI\\ubuntu\\grubx64.efi", &mut volume, &config);
        assert_eq!(grub.os_type, Some(OsType::Grub));
        assert_eq!(grub.shortcut, Some('G'));
        assert_eq!(grub.icon, Icon::Hints("ubuntu,ESP,grub,linux".into()));

        let windows = loader_defaults("\\EFI\\Microsoft\\Boot\\bootmgfw.efi", &mut volume, &config);
        assert_eq!(windows.os_type, Some(OsType::Windows));
        assert_eq!(windows.shortcut, Some('W'));

        let mac = loader_defaults(MAC_LOADER_PATH, &mut volume, &config);
        assert_eq!(mac.os_type, Some(OsType::Mac));
        assert!(mac.use_graphics);

        let elilo = loader_defaults("\\EFI\\debian\\elilo.efi", &mut volume, &config);
        assert_eq!(elilo.os_type, Some(OsType::Elilo));
        assert_eq!(elilo.shortcut, Some('D'));

        let xom = loader_defaults("\\xom.efi", &mut volume, &config);
        assert_eq!(xom.os_type, Some(OsType::Xom));
        assert_eq!(xom.icon, Icon::Hints("ESP,xom,win".into()));

        let other = loader_defaults("\\EFI\\arch\\loader.efi", &mut volume, &config);
        assert_eq!(other.os_type, None);
        assert_eq!(other.shortcut, Some('A'));
    }

    #[test]
    fn test_icon_precedence() {
        let mut custom = volume(
            "ESP",
            MemFs::new()
                .with_file("\\EFI\\arch\\loader.efi", b"")
                .with_file("\\EFI\\arch\\loader.icns", b""),
        );
        let defaults = loader_defaults("\\EFI\\arch\\loader.efi", &mut custom, &GlobalConfig::default());
        assert_eq!(defaults.icon, Icon::File("\\EFI\\arch\\loader.icns".into()));

        let mut with_volume_icon = Volume {
            has_icon: true,
            ..volume("ESP", MemFs::new())
        };
        let defaults = loader_defaults("\\EFI\\arch\\loader.efi", &mut with_volume_icon, &GlobalConfig::default());
        assert_eq!(defaults.icon, Icon::Volume);
    }
}

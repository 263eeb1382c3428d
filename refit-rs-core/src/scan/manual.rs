//! Adds the entries written by hand as `menuentry` lines in the configuration file.
//!
//! A manual entry is classified like any scanned loader, so it gets the same icon, shortcut and graphics mode.
//! Options from the configuration always win over the ones classification found. Manual entries get no submenu.

use alloc::format;

use log::{debug, warn};

use crate::{
    boot::validate::is_valid_loader,
    config::ManualEntry,
    entry::{Menu, MenuEntry, builder::LoaderEntryBuilder, cap_title, classify::set_loader_defaults},
    path::clean_path_slashes,
    scan::{ScanContext, filter::names_volume},
    volume::Volume,
};

/// Finds the volume a manual entry lives on.
///
/// Entries without a volume live on the boot manager's own volume.
fn find_volume(ctx: &ScanContext<'_>, volumes: &[Volume], manual: &ManualEntry) -> Option<usize> {
    match manual.volume.as_deref() {
        None => ctx.self_image.volume,
        Some(name) => volumes
            .iter()
            .enumerate()
            .position(|(index, volume)| names_volume(name, volume, index)),
    }
}

/// Builds the entry of one manual entry, if its loader exists.
fn manual_entry(ctx: &ScanContext<'_>, volume: &mut Volume, manual: &ManualEntry) -> Option<MenuEntry> {
    let path = clean_path_slashes(&manual.loader);
    let fs = volume.fs()?;
    if !fs.exists(&path) {
        warn!("Skipping manual entry \"{}\", {path} does not exist", manual.title);
        return None;
    }
    if !is_valid_loader(Some(&mut *fs), &path) {
        warn!("Skipping manual entry \"{}\", {path} is not a loader for this machine", manual.title);
        return None;
    }

    let title = cap_title(format!(
        "Boot {} from {}",
        manual.title,
        volume.display_name().unwrap_or_default()
    ));
    let mut entry = LoaderEntryBuilder::new(&path)
        .title(title)
        .loader_title(&*manual.title)
        .volume(volume)
        .build();

    set_loader_defaults(&mut entry, volume, ctx.config);
    if let Some(loader) = entry.loader_mut()
        && manual.options.is_some()
    {
        loader.load_options.clone_from(&manual.options);
    }
    Some(entry)
}

/// Adds an entry for every `menuentry` line whose volume and loader can be found.
pub fn scan_manual_entries(ctx: &ScanContext<'_>, volumes: &mut [Volume], menu: &mut Menu) {
    for manual in &ctx.config.manual_entries {
        let Some(volume) = find_volume(ctx, volumes, manual).and_then(|x| volumes.get_mut(x)) else {
            warn!("Skipping manual entry \"{}\", its volume was not found", manual.title);
            continue;
        };
        if let Some(entry) = manual_entry(ctx, volume, manual) {
            debug!("Adding manual entry \"{}\"", entry.title);
            menu.add_entry(entry);
        }
    }
}

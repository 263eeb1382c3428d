// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Loads and starts EFI images.
//!
//! Every image the boot manager starts, whether an OS loader, a tool or Apple's legacy loader, goes through
//! [`start_image_list`]. It tries a list of device paths in order until one of them is found, sets the load
//! options, releases the boot manager's own file handles and starts the image.
//!
//! Failures are tagged with the step they happened in, so that callers can print remediation text that fits:
//!
//! 1. the image could not be loaded
//! 2. the loaded image interface could not be used to set the load options
//! 3. the image returned an error
//!
//! Secure Boot rejections get their own explanation, since they are by far the most common cause of a failed load
//! on a modern machine.

use alloc::{borrow::ToOwned, format, string::{String, ToString}};

use log::{debug, warn};
use thiserror::Error;
use uefi::Status;

use crate::{
    boot::validate::is_valid_loader,
    entry::{LoaderEntry, OsType},
    path::basename,
    system::{console::Console, devpath::DevicePathBuf},
    volume::Volume,
};

/// The title of the screen shown while an OS loader starts.
pub const LOADER_SCREEN_TITLE: &str = "Booting OS";

/// The prefix of every tool entry's title.
pub const TOOL_TITLE_PREFIX: &str = "Start ";

/// An `Error` that may result from launching an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// Secure Boot rejected the image.
    #[error("Secure Boot validation failure loading {0}!")]
    SecurityViolation(String),

    /// The image could not be loaded. This is step 1.
    #[error("Error: {status} while loading {title}")]
    Load {
        /// The title of the image.
        title: String,
        /// The status of the last attempt.
        status: Status,
    },

    /// The load options could not be set. This is step 2.
    #[error("Error: {0} while getting a LoadedImageProtocol handle")]
    Interface(Status),

    /// The image was started, but returned an error. This is step 3.
    #[error("Error: {status} returned from {title}")]
    Returned {
        /// The title of the image.
        title: String,
        /// The status the image exited with.
        status: Status,
    },
}

impl LaunchError {
    /// The step the launch failed in, if the failure was not a Secure Boot rejection.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn step(&self) -> Option<u8> {
        match self {
            Self::SecurityViolation(_) => None,
            Self::Load { .. } => Some(1),
            Self::Interface(_) => Some(2),
            Self::Returned { .. } => Some(3),
        }
    }

    /// The firmware status behind the failure.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn status(&self) -> Status {
        match self {
            Self::SecurityViolation(_) => Status::SECURITY_VIOLATION,
            Self::Load { status, .. } | Self::Returned { status, .. } => *status,
            Self::Interface(status) => *status,
        }
    }
}

/// How the images of a [`LaunchRequest`] are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageKind {
    /// An EFI application. Its path is validated and passed as the first load option.
    #[default]
    Efi,

    /// Apple's legacy loader, started from a firmware volume. Nothing is validated or prefixed.
    Legacy,
}

/// Everything [`start_image_list`] needs to know about one launch.
#[derive(Clone, Copy, Debug, Default)]
pub struct LaunchRequest<'a> {
    /// Device paths to try, in order.
    pub device_paths: &'a [DevicePathBuf],

    /// The command line of the image.
    pub load_options: Option<&'a str>,

    /// How the image is treated.
    pub kind: ImageKind,

    /// The title used in messages.
    pub title: &'a str,

    /// The OS family of the image, if it was classified.
    pub os_type: Option<OsType>,

    /// If progress and remediation text is printed.
    pub verbose: bool,

    /// If the image is a driver that stays loaded after it returns.
    pub is_driver: bool,
}

/// Firmware image services, and the handles the boot manager holds on to.
pub trait ImageServices {
    /// A loaded image.
    type Image;

    /// Loads the image at a device path.
    ///
    /// # Errors
    ///
    /// Returns the firmware status if the image could not be loaded.
    fn load_image(&mut self, device_path: &DevicePathBuf) -> Result<Self::Image, Status>;

    /// Sets the command line of a loaded image.
    ///
    /// # Errors
    ///
    /// Returns the firmware status if the loaded image interface could not be opened.
    fn set_load_options(&mut self, image: &Self::Image, options: &str) -> Result<(), Status>;

    /// Starts a loaded image, returning once it exits.
    ///
    /// # Errors
    ///
    /// Returns the exit status of the image if it was not successful.
    fn start_image(&mut self, image: &Self::Image) -> Result<(), Status>;

    /// Unloads an image.
    fn unload_image(&mut self, image: Self::Image);

    /// Closes the file handles held on every volume.
    fn release_volumes(&mut self, volumes: &mut [Volume]);

    /// Reopens the file handles closed by [`ImageServices::release_volumes`].
    fn reacquire_volumes(&mut self, volumes: &mut [Volume]);

    /// Checks if Secure Boot is active.
    fn secure_boot_active(&self) -> bool;
}

/// Storage for the name of the last booted entry.
pub trait SelectionStore {
    /// Reads the stored name, if there is one.
    fn load_selection(&mut self) -> Option<String>;

    /// Replaces the stored name.
    fn save_selection(&mut self, name: &str);
}

/// Stores the name of the entry that is about to boot, unless it is already stored.
///
/// Firmware variables live in flash, so an unchanged name is not rewritten.
pub fn store_selection<S: SelectionStore + ?Sized>(store: &mut S, name: &str) {
    if store.load_selection().as_deref() != Some(name) {
        store.save_selection(name);
    }
}

/// Tells the user that Secure Boot rejected `name`, and what can be done about it.
pub fn warn_secure_boot_error(console: &mut dyn Console, name: &str, verbose: bool, secure_boot: bool) {
    console.begin_text_screen("Secure Boot Validation Failure");
    console.print_error(&format!("Secure Boot validation failure loading {name}!"));
    if verbose && secure_boot {
        console.print_line("This computer is configured with Secure Boot active, but");
        console.print_line(&format!("{name} has failed validation."));
        console.print_line("");
        console.print_line("You can:");
        console.print_line(" * Launch another boot loader");
        console.print_line(" * Disable Secure Boot in your firmware");
        console.print_line(&format!(" * Sign {name} with a machine owner key (MOK)"));
        console.print_line(" * Use a MOK utility (often present on the second row) to add a MOK with which");
        console.print_line(&format!("   {name} has already been signed."));
        console.print_line(&format!(" * Use a MOK utility to register {name} (\"enroll its hash\") without"));
        console.print_line("   signing it.");
    }
    console.pause_for_key();
}

/// Finds the volume a device path points into, and the path of the file on it.
fn find_volume_and_filename<'v>(
    volumes: &'v mut [Volume],
    device_path: &DevicePathBuf,
) -> (Option<&'v mut Volume>, Option<String>) {
    let found = volumes.iter().position(|volume| {
        volume
            .device_path
            .as_ref()
            .is_some_and(|x| x.is_prefix_of(device_path))
    });
    match found {
        Some(index) => {
            let volume = &mut volumes[index];
            let filename = volume
                .device_path
                .as_ref()
                .and_then(|x| x.strip_prefix_of(device_path))
                .and_then(|x| x.file_path());
            (Some(volume), filename)
        }
        None => (None, device_path.file_path()),
    }
}

/// Builds the command line of one candidate.
///
/// EFI images get their own path as the first word, which is where most loaders expect `argv[0]`.
fn candidate_options(kind: ImageKind, filename: Option<&str>, options: Option<&str>) -> Option<String> {
    match (kind, filename) {
        (ImageKind::Efi, Some(filename)) => {
            let separator = if filename.starts_with('\\') { "" } else { "\\" };
            Some(format!("{separator}{filename} {}", options.unwrap_or_default()))
        }
        _ => options.map(ToOwned::to_owned),
    }
}

/// Loads the first image of `request.device_paths` that exists, then starts it.
///
/// Candidates that are not found are skipped, as are EFI images that are not loaders for this machine. The first
/// candidate that fails for any other reason ends the search.
///
/// # Errors
///
/// May return an `Error` if no candidate could be loaded, Secure Boot rejected the image, the load options could
/// not be set, or the image returned an error. Messages have already been printed, but not acknowledged, except for
/// Secure Boot rejections.
pub fn start_image_list<S: ImageServices + ?Sized>(
    services: &mut S,
    console: &mut dyn Console,
    volumes: &mut [Volume],
    request: &LaunchRequest<'_>,
) -> Result<(), LaunchError> {
    let mut base_options = request.load_options.map(ToOwned::to_owned);
    if request.kind == ImageKind::Efi
        && request.os_type == Some(OsType::Mac)
        && let Some(options) = &mut base_options
    {
        // boot.efi ignores its final argument unless it is followed by a space
        options.push(' ');
    }

    if request.verbose {
        console.print_line(&format!("Starting {}", request.title));
        if let Some(options) = &base_options {
            console.print_line(&format!("Using load options '{options}'"));
        }
    }

    let mut status = Status::NOT_FOUND;
    let mut loaded = None;
    for device_path in request.device_paths {
        let (volume, filename) = find_volume_and_filename(volumes, device_path);
        let valid = request.kind == ImageKind::Legacy
            || volume.is_none_or(|volume| {
                match (volume.fs(), filename.as_deref()) {
                    (Some(fs), Some(filename)) => is_valid_loader(Some(&mut *fs), filename),
                    _ => true,
                }
            });
        if !valid {
            console.print_error("Invalid loader file!");
            status = Status::LOAD_ERROR;
            continue;
        }

        let options = candidate_options(request.kind, filename.as_deref(), base_options.as_deref());
        match services.load_image(device_path) {
            Ok(image) => {
                loaded = Some((image, options));
                break;
            }
            Err(e) if e == Status::NOT_FOUND => {
                debug!("{} was not found at this device path", request.title);
                status = e;
            }
            Err(e) => {
                status = e;
                break;
            }
        }
    }

    let Some((image, options)) = loaded else {
        if status == Status::ACCESS_DENIED || status == Status::SECURITY_VIOLATION {
            warn_secure_boot_error(console, request.title, request.verbose, services.secure_boot_active());
            return Err(LaunchError::SecurityViolation(request.title.into()));
        }
        let e = LaunchError::Load {
            title: request.title.into(),
            status,
        };
        console.print_error(&e.to_string());
        return Err(e);
    };

    if let Some(options) = &options
        && let Err(status) = services.set_load_options(&image, options)
    {
        services.unload_image(image);
        let e = LaunchError::Interface(status);
        console.print_error(&e.to_string());
        return Err(e);
    }

    services.release_volumes(volumes);
    let result = services.start_image(&image);
    services.reacquire_volumes(volumes);

    if !request.is_driver {
        services.unload_image(image);
    }

    result.map_err(|status| {
        let e = LaunchError::Returned {
            title: request.title.into(),
            status,
        };
        warn!("{e}");
        console.print_error(&e.to_string());
        e
    })
}

/// Waits for acknowledgement of a failed launch whose message has not been acknowledged yet.
pub fn finish_external_screen(console: &mut dyn Console, result: &Result<(), LaunchError>) {
    if let Err(e) = result
        && !matches!(e, LaunchError::SecurityViolation(_))
    {
        console.pause_for_key();
    }
}

/// Starts an OS loader entry.
///
/// # Errors
///
/// May return an `Error` if the launch failed. The user has already acknowledged it.
pub fn start_loader<S: ImageServices + SelectionStore + ?Sized>(
    services: &mut S,
    console: &mut dyn Console,
    volumes: &mut [Volume],
    entry: &LoaderEntry,
    selection: Option<&str>,
) -> Result<(), LaunchError> {
    if !entry.use_graphics {
        console.begin_text_screen(LOADER_SCREEN_TITLE);
    }
    if let Some(name) = selection {
        store_selection(services, name);
    }

    let request = LaunchRequest {
        device_paths: entry.device_path.as_slice(),
        load_options: entry.load_options.as_deref(),
        kind: ImageKind::Efi,
        title: basename(&entry.loader_path),
        os_type: entry.os_type,
        verbose: !entry.use_graphics,
        is_driver: false,
    };
    let result = start_image_list(services, console, volumes, &request);
    finish_external_screen(console, &result);
    result
}

/// Starts a tool entry.
///
/// The title of the entry, without its `Start ` prefix, is both the screen title and the stored selection.
///
/// # Errors
///
/// May return an `Error` if the launch failed. The user has already acknowledged it.
pub fn start_tool<S: ImageServices + SelectionStore + ?Sized>(
    services: &mut S,
    console: &mut dyn Console,
    volumes: &mut [Volume],
    entry: &LoaderEntry,
    title: &str,
) -> Result<(), LaunchError> {
    let name = title.strip_prefix(TOOL_TITLE_PREFIX).unwrap_or(title);
    if !entry.use_graphics {
        console.begin_text_screen(name);
    }
    store_selection(services, name);

    let request = LaunchRequest {
        device_paths: entry.device_path.as_slice(),
        load_options: entry.load_options.as_deref(),
        kind: ImageKind::Efi,
        title: basename(&entry.loader_path),
        os_type: entry.os_type,
        verbose: true,
        is_driver: false,
    };
    let result = start_image_list(services, console, volumes, &request);
    finish_external_screen(console, &result);
    result
}

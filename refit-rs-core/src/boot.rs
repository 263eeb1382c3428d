//! Launching boot targets.
//!
//! - [`launch`] loads and starts EFI images, and stores the last selection
//! - [`validate`] checks that an image was built for this machine
//! - [`secure_boot`] lets Shim validate images when Secure Boot is active
//! - [`action`] holds the power actions of the main menu
//! - [`apple`] unlocks hardware on Apple firmware before an OS boots

pub mod action;
pub mod apple;
pub mod arch;
pub mod launch;
pub mod secure_boot;
pub mod validate;

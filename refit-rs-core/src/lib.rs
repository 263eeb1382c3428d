// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The `refit-rs` library crate.
//!
//! This is the boot target discovery, classification and launch engine of the `refit-rs` boot manager. It scans
//! every volume the firmware exposes for EFI boot loaders and legacy (BIOS) boot records, turns them into menu
//! entries with OS-specific options and submenus, and launches whatever the user picks.
//!
//! Everything that talks to firmware sits behind a small number of traits ([`system::fs::FileAccess`],
//! [`boot::launch::ImageServices`], [`app::Platform`] and [`app::Frontend`]). The real implementations use the
//! [`uefi`] crate, while the unit tests swap in in-memory doubles so the scanning and classification rules can run
//! on the host.
//!
//! A text-mode frontend built on this crate can be found in `refit-rs-text`.
//!
//! ## MSRV
//!
//! The minimum supported rust version is 1.88.0.

#![cfg_attr(not(any(fuzzing, test, doctest)), no_std)]

/// The primary result type that wraps around [`crate::error::BootError`].
pub type BootResult<T> = Result<T, crate::error::BootError>;

pub mod app;
pub mod boot;
pub mod config;
pub mod entry;
pub mod error;
pub mod legacy;
pub mod path;
pub mod scan;
pub mod system;
pub mod volume;

extern crate alloc;

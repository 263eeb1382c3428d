//! Installs the UEFI pool allocator as the global allocator.
//!
//! Only enabled with the `global_allocator` feature, so host tests and fuzzing keep the system allocator.

#![cfg(feature = "global_allocator")]
use uefi::allocator::Allocator;

/// The UEFI global allocator.
#[global_allocator]
static ALLOCATOR: Allocator = Allocator;

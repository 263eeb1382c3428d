// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The `refit-rs` application.
//!
//! This wires the text console frontend to the boot manager of `refit-rs-core` and runs it. Launched images
//! return to the menu, so the only ways out are the power actions, Exit, or a fatal error at startup.

#![no_main]
#![no_std]

extern crate alloc;

use alloc::boxed::Box;

use log::error;
use refit_rs_core::{
    app::{App, Termination, firmware::UefiPlatform},
    boot::action::reboot,
    system::log_backend::UefiLogger,
};
use thiserror::Error;
use uefi::{boot, prelude::*};

use crate::frontend::TextFrontend;

mod frontend;

/// The global logging instance.
static LOGGER: UefiLogger = UefiLogger::new(log::Level::Info);

/// How long a fatal error stays on screen before the reset, in microseconds.
const FATAL_DELAY: usize = 10_000_000;

/// An error that may occur when running the application.
#[derive(Error, Debug)]
pub enum MainError {
    /// An error occurred with the boot manager.
    #[error("Boot Error: {0}")]
    BootError(#[from] refit_rs_core::error::BootError),

    /// The frontend could not be set up.
    #[error("Frontend Error: {0}")]
    FrontendError(#[from] crate::frontend::FrontendError),
}

/// The actual main function of the program.
///
/// # Errors
///
/// May return an `Error` if there is no console input, or the boot manager cannot find its own volume.
fn main_func() -> Result<Termination, Box<dyn core::error::Error>> {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Warn)); // if the logger was already set, then ignore it

    let frontend = TextFrontend::new().map_err(MainError::from)?;
    let mut app = App::new(UefiPlatform::new(), frontend);
    Ok(app.run().map_err(MainError::from)?)
}

/// The main function of the program.
#[entry]
fn main() -> Status {
    match main_func() {
        Ok(Termination::Exit) => Status::SUCCESS,
        Ok(Termination::Fallback) => reboot(),
        Err(e) => {
            error!("Fatal error occurred: {e}");
            error!("Automatically restarting in 10 seconds");

            boot::stall(FATAL_DELAY);
            reboot();
        }
    }
}

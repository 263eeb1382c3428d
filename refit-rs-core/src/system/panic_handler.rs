//! Panic handler for firmware builds.
//!
//! Prints the panic, waits for a key (or 10 seconds when no key event is available), then shuts down. Only enabled
//! with the `panic_handler` feature.

#![cfg(feature = "panic_handler")]
use core::fmt::Write;

/// How long to wait when the console cannot deliver a key event, in microseconds.
const PANIC_STALL: usize = 10_000_000;

/// The panic handler.
#[panic_handler]
fn panic_handler(info: &core::panic::PanicInfo) -> ! {
    uefi::system::with_stdout(|stdout| {
        let _ = writeln!(stdout, "[PANIC]: {info}");
        let _ = writeln!(stdout, "refit-rs cannot continue. Press a key to shut down");
    });
    let waited = uefi::system::with_stdin(|stdin| {
        stdin
            .wait_for_key_event()
            .is_some_and(|event| uefi::boot::wait_for_event(&mut [event]).is_ok())
    });
    if !waited {
        uefi::boot::stall(PANIC_STALL);
    }
    uefi::runtime::reset(
        uefi::runtime::ResetType::SHUTDOWN,
        uefi::Status::ABORTED,
        None,
    );
}

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = refit_rs_core::boot::validate::is_valid_header(data, 0x8664);
});

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let options = refit_rs_core::config::linux::OptionsFile::parse(data);
    let _ = options.first_title();
    let _ = options.extra_entries().count();
});

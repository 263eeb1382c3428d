#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(option) = refit_rs_core::legacy::bbs::BootOption::parse(0, data) {
        let _ = option.bbs_node();
    }
});

#![no_main]

use gpt_disk_io::MutSliceBlockIo;
use gpt_disk_types::BlockSize;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&index, disk)) = data.split_first() else {
        return;
    };
    let mut disk = disk.to_vec();
    disk.resize(disk.len().next_multiple_of(512), 0);
    let mut io = MutSliceBlockIo::new(&mut disk, BlockSize::BS_512);
    let _ = refit_rs_core::legacy::mbr::activate_mbr_partition(&mut io, usize::from(index));
});

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Decode frames until the stream ends or a frame is rejected
    let mut cursor = Cursor::new(data);
    while let Ok(Some(_)) = picsift::wire::frame::read_frame(&mut cursor) {}
});

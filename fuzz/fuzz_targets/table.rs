#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = libgilded::parser::parse(input);
        let _ = libgilded::parser::parse_value(input);
    }
});

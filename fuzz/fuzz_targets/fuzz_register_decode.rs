#![no_main]
use bandsaw_core::register_map::{decode, encode_block};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let words: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    if let Ok(snap) = decode(&words) {
        // Re-encoding a decoded block reproduces the decoded fields.
        let again = decode(&encode_block(&snap)).unwrap();
        assert_eq!(again.state_code, snap.state_code);
        assert_eq!(again.descent_speed, snap.descent_speed);
    }
});

#![no_main]

use libfuzzer_sys::fuzz_target;
use socketio_legacy_client::handshake::parse_handshake;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = std::str::from_utf8(data) {
        let _ = parse_handshake(body);
    }
});

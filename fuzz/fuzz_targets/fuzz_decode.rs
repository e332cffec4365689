#![no_main]

use libfuzzer_sys::fuzz_target;
use socketio_legacy_client::protocol::{decode, encode, Message};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding arbitrary frames must never panic.
    let Ok(message) = decode(frame) else {
        return;
    };

    // Frames the client also sends must survive a re-encode.
    if matches!(message, Message::Heartbeat | Message::Ack { .. }) {
        let encoded = encode(&message).unwrap_or_default();
        assert_eq!(decode(&encoded).ok(), Some(message));
    }
});

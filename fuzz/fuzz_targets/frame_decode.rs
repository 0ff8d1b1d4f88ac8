//! Arbitrary bytes must decode or fail cleanly, and anything that decodes
//! must survive a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ringnet_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode_bytes(data) else {
        return;
    };

    let text = frame.encode();
    let again = Frame::decode(&text).expect("encoded frame decodes");
    assert_eq!(again.encode(), text);
});

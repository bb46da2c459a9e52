#![no_main]

//! Reply frames come from the network. Reading arbitrary bytes must never
//! panic, a decoded frame must never claim more bytes than it was given, and
//! the socket reader must agree with the buffer decoder.

use bridgebase::gateway::handshake::{HandshakeReply, decode_reply, encode_reply, read_reply};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(rt) => rt,
        Err(_) => return,
    };

    let mut reader = data;
    let read = runtime.block_on(read_reply(&mut reader));

    match (decode_reply(data), read) {
        (Ok(Some((decoded, consumed))), Ok(reply)) => {
            assert!(consumed <= data.len());
            assert_eq!(decoded, reply);
            assert_eq!(reader.len(), data.len() - consumed);
            check_reencode(&reply, &data[..consumed]);
        }
        // Short input: the reader hits EOF where the decoder asks for more
        (Ok(None), Err(_)) => {}
        (Err(_), Err(_)) => {}
        (decoded, read) => panic!("decode {:?} disagrees with read {:?}", decoded, read),
    }
});

/// A decoded reply encodes back to the exact bytes it was read from.
fn check_reencode(reply: &HandshakeReply, frame: &[u8]) {
    assert_eq!(&encode_reply(reply)[..], frame);
}

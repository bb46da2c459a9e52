#![no_main]

//! The gateway side reads hello frames from untrusted peers. Arbitrary input
//! must be rejected or accepted without panicking or over-allocating.

use arbitrary::Arbitrary;
use bridgebase::gateway::handshake::{MAX_TOKEN_SIZE, encode_hello, read_hello};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    /// Raw bytes straight into the frame reader.
    Raw(Vec<u8>),
    /// A token framed by the client encoder.
    Token(Vec<u8>),
}

fuzz_target!(|input: Input| {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(rt) => rt,
        Err(_) => return,
    };

    runtime.block_on(async {
        match input {
            Input::Raw(bytes) => {
                let mut reader = &bytes[..];
                if let Ok(token) = read_hello(&mut reader).await {
                    assert!(!token.is_empty());
                    assert!(token.len() <= MAX_TOKEN_SIZE);
                }
            }
            Input::Token(token) => match encode_hello(&token) {
                Ok(frame) => {
                    let mut reader = &frame[..];
                    let decoded = read_hello(&mut reader).await.expect("own frame must decode");
                    assert_eq!(decoded, token);
                }
                Err(_) => assert!(token.is_empty() || token.len() > MAX_TOKEN_SIZE),
            },
        }
    });
});

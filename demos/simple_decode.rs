//! Basic decoding, one-shot and streaming, into a `String`.

use std::borrow::Cow;
use utf8_stream::{Utf8Stream, decode_lossy};

fn main() {
    // One shot: identical to `String::from_utf8_lossy`.
    let decoded: Cow<str> = decode_lossy(b"caf\xC3\xA9 \xFF!");
    assert_eq!(decoded, "café \u{FFFD}!");
    println!("One-shot: {}", decoded);

    // Streaming: the euro sign arrives in two pieces.
    let mut decoder = Utf8Stream::new();
    let mut text = String::new();
    for chunk in [&b"price: 5 \xE2\x82"[..], &b"\xAC"[..]] {
        if let Some(piece) = decoder.write(chunk) {
            println!("emitted {:?}", piece);
            text.push_str(&piece);
        }
    }
    decoder.finish().expect("stream ended cleanly");

    assert_eq!(text, "price: 5 €");
    println!("Streamed: {}", text);
}

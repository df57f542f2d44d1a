//! Decodes a JSON document that arrives in small network-sized chunks, then parses it.
//!
//! The chunk size is chosen so that several multi-byte characters are split.

use serde::Deserialize;
use utf8_stream::{TailPolicy, Utf8Stream};

#[derive(Deserialize, Debug)]
#[allow(dead_code)]
struct Greeting {
    lang: String,
    text: String,
}

fn main() {
    let body = r#"[
        {"lang": "de", "text": "Grüße"},
        {"lang": "ja", "text": "こんにちは"},
        {"lang": "emoji", "text": "👋🌍"}
    ]"#;

    let mut decoder = Utf8Stream::new();
    let mut text = String::new();

    // Pretend every read returns 7 bytes.
    for chunk in body.as_bytes().chunks(7) {
        decoder.write_to(chunk, |piece| text.push_str(piece));
    }

    // Surface a truncated document instead of silently losing its last character.
    if let Some(tail) = decoder.finish_with(TailPolicy::Error).expect("complete document") {
        text.push_str(&tail);
    }

    let greetings: Vec<Greeting> = serde_json::from_str(&text).unwrap();
    for greeting in &greetings {
        println!("{:>6}: {}", greeting.lang, greeting.text);
    }
}

//! Demonstrates streaming decode from a file using `Utf8Stream::decode_from_source`.

use std::fs::File;
use std::io;
use utf8_stream::stream::{ReadChunkSource, Utf8Stream};

fn main() -> io::Result<()> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/data/sample.txt");
    let file = File::open(path)?;
    let mut result = String::new();
    let buf = [0u8; 3]; // streaming buffer

    // Source: pulls chunks from the file
    let src = ReadChunkSource::new(file, buf);

    // Destination: receives decoded text
    let mut dst = |text: &str| -> io::Result<()> {
        result.push_str(text);
        Ok(())
    };

    // Drive stream: src → decode → dst
    Utf8Stream::new()
        .decode_from_source(src, &mut dst)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    println!("Driver stream decoded:\n{}", result);
    Ok(())
}

//! Demonstrates streaming a file through `Utf8Stream` with a deliberately tiny buffer.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use utf8_stream::{stream::Utf8Stream, token::Utf8Token};

fn main() -> io::Result<()> {
    let file_path = get_file_path();

    let mut file = File::open(file_path)
        .expect("Failed to open demos/data/sample.txt. Make sure the file exists.");

    let mut decoder = Utf8Stream::new();
    let mut result = String::new();

    // Fixed-size buffer, small enough that most multi-byte characters get split.
    let mut buf = [0u8; 5];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break; // EOF
        }

        let (boundary, tokens) = decoder.try_decode_next(&buf[..n]).unwrap();

        if let Some(c) = boundary {
            result.push(c);
        }

        for token in tokens {
            match token {
                Utf8Token::Text(text) => result.push_str(text),
                Utf8Token::Invalid(bytes) => panic!("invalid utf-8 in sample: {bytes:02X?}"),
            }
        }
    }

    // Finalize stream: ensures no sequence was cut off by EOF
    decoder.finish().unwrap();

    println!("Decoded file content:\n{}", result);
    Ok(())
}

fn get_file_path() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let mut file_path = PathBuf::from(manifest_dir);
    file_path.push("demos/data/sample.txt");
    file_path
}

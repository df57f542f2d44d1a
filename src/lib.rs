//! # Streaming UTF-8 Decoding
//!
//! A small, `no_std` compatible library for turning a byte stream that arrives in
//! arbitrary pieces (socket reads, pipe reads, file reads into a fixed buffer) into
//! text, without ever splitting a multi-byte code point at a chunk boundary. ⚡
//!
//! The library has three layers:
//! - **[`decode`]**: a zero-copy token iterator over one *complete* byte slice. It
//!   yields borrowed [`Utf8Token::Text`] runs and [`Utf8Token::Invalid`] byte runs.
//! - **[`Utf8Stream`]**: the incremental decoder. It keeps at most four bytes of
//!   state (the prefix of a code point cut off by the end of a chunk) and stitches
//!   that prefix to the start of the next chunk.
//! - **Drivers** on [`Utf8Stream`] that connect any [`ChunkSource`](stream::ChunkSource)
//!   (an [`std::io::Read`], a closure) to a `&str` sink.
//!
//! ## Key Features
//! - **Chunk Invariance**: the concatenated output never depends on where the
//!   transport cut the stream. Lossy output is always identical to
//!   [`String::from_utf8_lossy`] of the whole stream, valid or not.
//! - **Zero-Copy Slicing**: text runs borrow directly from the caller's chunk.
//! - **Explicit End Of Stream**: a truncated trailing sequence is never silently
//!   lost unless you ask for it. See [`Utf8Stream::finish`] and [`TailPolicy`].
//! - **Allocation Control** (with `alloc` feature): [`Utf8Stream::write`] returns one
//!   owned `String` per chunk for callers that simply want text.
//!
//! ## Quick Start: Decoding a Complete Slice
//!
//! ```
//! use utf8_stream::{decode, Utf8Token};
//!
//! let mut tokens = decode(b"caf\xC3\xA9 \xFF!");
//!
//! assert_eq!(tokens.next(), Some(Utf8Token::Text("café ")));
//! assert_eq!(tokens.next(), Some(Utf8Token::Invalid(b"\xFF")));
//! assert_eq!(tokens.next(), Some(Utf8Token::Text("!")));
//! assert_eq!(tokens.next(), None);
//! ```
//!
//! ## Quick Start: Decoding a Stream
//!
//! ```
//! use utf8_stream::Utf8Stream;
//!
//! // "€" is E2 82 AC; the transport split it after the second byte.
//! let mut decoder = Utf8Stream::new();
//!
//! assert_eq!(decoder.write(b"price: \xE2\x82"), Some("price: ".to_string()));
//! assert_eq!(decoder.write(b"\xAC 5"), Some("€ 5".to_string()));
//! assert!(decoder.finish().is_ok());
//! ```
#![no_std]
#![deny(missing_docs)]
#![cfg_attr(feature = "simd", feature(portable_simd))]

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::{borrow::Cow, string::String};

use core::{
    char,
    fmt::{self, Write as _},
};

// Compiled out entirely unless the `tracing` feature is on.
#[cfg(feature = "tracing")]
macro_rules! trace {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

pub mod stream;
pub mod token;

pub use stream::{TailPolicy, Utf8Stream};
pub use token::{Utf8Token, Utf8Tokens};

// =============================================================================
// One-shot decoding
// =============================================================================

/// Creates a token iterator over a complete byte slice.
///
/// The slice is treated as the *entire* input: an incomplete sequence at its end is
/// reported as [`Utf8Token::Invalid`]. Use [`Utf8Stream`] when more bytes may follow.
///
/// # Examples
///
/// ```
/// use utf8_stream::decode;
///
/// let text = decode("Grüße, 世界".as_bytes()).decode_utf8().unwrap();
/// assert_eq!(text, "Grüße, 世界");
/// ```
#[inline]
pub fn decode<I: AsRef<[u8]> + ?Sized>(input: &I) -> Utf8Tokens<'_> {
    Utf8Tokens::new(input.as_ref())
}

/// Decodes a complete byte slice, replacing every invalid sequence with `U+FFFD`.
///
/// The result is identical to [`String::from_utf8_lossy`] and borrows the input
/// whenever it is valid UTF-8.
///
/// **Requires the `alloc` feature.**
#[cfg(feature = "alloc")]
#[inline]
pub fn decode_lossy<I: AsRef<[u8]> + ?Sized>(input: &I) -> Cow<'_, str> {
    decode(input).decode_utf8_lossy()
}

// =============================================================================
// Error Types
// =============================================================================

/// An error describing bytes that could not be decoded.
///
/// The offending bytes are stored inline (a UTF-8 sequence is never longer than
/// four bytes), so the error stays `Copy` and outlives the chunk it came from.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
pub struct DecodeError {
    pub(crate) kind: DecodeErrorKind,
    pub(crate) bytes: [u8; 4],
    pub(crate) len: u8,
}

impl DecodeError {
    #[inline]
    pub(crate) fn invalid(bytes: &[u8]) -> Self {
        Self::new(DecodeErrorKind::InvalidSequence, bytes)
    }

    #[inline]
    pub(crate) fn truncated(bytes: &[u8], expected: u8) -> Self {
        Self::new(
            DecodeErrorKind::Truncated(TruncatedError { expected }),
            bytes,
        )
    }

    fn new(kind: DecodeErrorKind, bytes: &[u8]) -> Self {
        debug_assert!(!bytes.is_empty() && bytes.len() <= 4, "{bytes:?}");
        let len = bytes.len().min(4);
        let mut buf = [0; 4];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            kind,
            bytes: buf,
            len: len as u8,
        }
    }

    /// Returns the specific kind of error that occurred.
    ///
    /// ### Example
    ///
    /// ```
    /// # use utf8_stream::{DecodeErrorKind, TruncatedError, Utf8Stream};
    /// let mut decoder = Utf8Stream::new();
    /// decoder.write(b"\xF0\x9F");
    ///
    /// let err = decoder.finish().unwrap_err();
    /// match err.kind() {
    ///     DecodeErrorKind::Truncated(TruncatedError { expected, .. }) => assert_eq!(expected, 4),
    ///     _ => panic!("Expected a Truncated error"),
    /// }
    /// ```
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Returns the bytes that could not be decoded.
    ///
    /// For [`DecodeErrorKind::InvalidSequence`] this is exactly the run that a lossy
    /// decoder replaces with `U+FFFD` (or, for a sequence stitched across a chunk
    /// boundary, the whole stitched sequence). For [`DecodeErrorKind::Truncated`] it is
    /// the prefix that was buffered when the stream ended.
    pub fn invalid_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// The specific kind of error that can occur while decoding.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// The bytes are not a well-formed UTF-8 sequence.
    InvalidSequence,
    /// The stream ended before a multi-byte sequence was complete.
    Truncated(TruncatedError),
}

/// Details of a sequence cut off by the end of the stream.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct TruncatedError {
    /// The sequence length announced by the lead byte.
    pub expected: u8,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::InvalidSequence => {
                write!(f, "invalid utf-8 sequence: {:02X?}", self.invalid_bytes())
            }
            DecodeErrorKind::Truncated(e) => write!(
                f,
                "stream ended inside a {}-byte utf-8 sequence after {} byte(s): {:02X?}",
                e.expected,
                self.len,
                self.invalid_bytes()
            ),
        }
    }
}

impl core::error::Error for DecodeError {}

// =============================================================================
// Utilities
// =============================================================================

// Sequence length announced by each byte, judged by its high bits only.
// 0 = continuation byte or a byte that never starts a sequence.
const SEQUENCE_LEN_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = if b < 0x80 {
            1
        } else if b & 0xE0 == 0xC0 {
            2
        } else if b & 0xF0 == 0xE0 {
            3
        } else if b & 0xF8 == 0xF0 {
            4
        } else {
            0
        };
        i += 1;
    }
    table
};

#[inline(always)]
pub(crate) fn sequence_len(byte: u8) -> u8 {
    SEQUENCE_LEN_TABLE[byte as usize]
}

#[inline(always)]
pub(crate) fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

// This is the SIMD version, compiled only when the "simd" feature is enabled.
#[cfg(feature = "simd")]
#[inline]
pub(crate) fn ascii_prefix_len(bytes: &[u8]) -> usize {
    use core::simd::{Simd, prelude::SimdPartialOrd};

    const LANES: usize = 16;
    let high = Simd::<u8, LANES>::splat(0x80);
    let mut i = 0;

    while i + LANES <= bytes.len() {
        let chunk = Simd::<u8, LANES>::from_slice(&bytes[i..i + LANES]);
        let mask = chunk.simd_ge(high);
        if mask.any() {
            return i + mask.to_bitmask().trailing_zeros() as usize;
        }
        i += LANES;
    }

    i + scalar_ascii_prefix_len(&bytes[i..])
}

#[cfg(all(not(feature = "simd"), target_arch = "x86_64"))]
#[inline]
pub(crate) fn ascii_prefix_len(bytes: &[u8]) -> usize {
    use core::arch::x86_64::{__m128i, _mm_loadu_si128, _mm_movemask_epi8};

    // SSE2 works on 128-bit registers, which is 16 bytes.
    const LANES: usize = 16;
    let mut i = 0;

    while i + LANES <= bytes.len() {
        // SAFETY: `i + LANES <= bytes.len()` keeps the unaligned load in bounds, and
        // SSE2 is part of the x86_64 baseline.
        let mask = unsafe {
            let chunk = _mm_loadu_si128(bytes.as_ptr().add(i) as *const __m128i);
            // One bit per lane, taken from the lane's high bit: set for non-ASCII.
            _mm_movemask_epi8(chunk)
        };
        if mask != 0 {
            return i + mask.trailing_zeros() as usize;
        }
        i += LANES;
    }

    i + scalar_ascii_prefix_len(&bytes[i..])
}

#[cfg(all(not(feature = "simd"), not(target_arch = "x86_64")))]
#[inline]
pub(crate) fn ascii_prefix_len(bytes: &[u8]) -> usize {
    scalar_ascii_prefix_len(bytes)
}

#[inline]
fn scalar_ascii_prefix_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .position(|b| !b.is_ascii())
        .unwrap_or(bytes.len())
}

/// Appends `bytes` to `out` the way [`String::from_utf8_lossy`] would render them.
#[cfg(feature = "alloc")]
#[inline]
pub(crate) fn push_lossy(out: &mut String, bytes: &[u8]) {
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
        if !chunk.invalid().is_empty() {
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }
}

#[inline]
fn display_bytes_utf8(bytes: &[u8], f: &mut fmt::Formatter<'_>, lossy: bool) -> fmt::Result {
    for chunk in bytes.utf8_chunks() {
        f.write_str(chunk.valid())?;

        if !chunk.invalid().is_empty() {
            if lossy {
                f.write_char(char::REPLACEMENT_CHARACTER)?
            } else {
                return Err(fmt::Error);
            }
        }
    }

    Ok(())
}

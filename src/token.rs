//! Provides low-level, token-based UTF-8 decoding of a complete byte slice.
//!
//! The [`Utf8Tokens`] iterator walks a byte slice and yields [`Utf8Token`]s,
//! separating maximal runs of valid text (borrowed straight from the input) from
//! the invalid byte runs between them. Each invalid run is exactly one "maximal
//! subpart" in the Unicode sense, i.e. the unit that [`String::from_utf8_lossy`]
//! replaces with a single `U+FFFD`. All preceding valid text has always been
//! yielded before an invalid run is reported.
//!
//! [`String::from_utf8_lossy`]: https://doc.rust-lang.org/std/string/struct.String.html#method.from_utf8_lossy

use crate::{DecodeError, ascii_prefix_len, display_bytes_utf8};
use core::{fmt, iter::FusedIterator, str};

#[cfg(feature = "alloc")]
use alloc::{borrow::Cow, string::String};

/// A token representing a piece of a decoded byte slice.
///
/// This enum is the item yielded by the [`Utf8Tokens`] iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Token<'a> {
    /// A maximal run of valid UTF-8, borrowed from the input.
    Text(&'a str),
    /// A run of bytes that does not form valid UTF-8 (one to three bytes).
    Invalid(&'a [u8]),
}

impl<'a> Utf8Token<'a> {
    /// Converts the token into a `Result`, turning an invalid run into a [`DecodeError`].
    #[inline]
    pub fn into_result(self) -> Result<&'a str, DecodeError> {
        match self {
            Utf8Token::Text(s) => Ok(s),
            Utf8Token::Invalid(bytes) => Err(DecodeError::invalid(bytes)),
        }
    }

    /// Returns the text of the token, or `"\u{FFFD}"` for an invalid run.
    #[inline]
    pub fn as_lossy_str(&self) -> &'a str {
        match self {
            Utf8Token::Text(s) => s,
            Utf8Token::Invalid(_) => "\u{FFFD}",
        }
    }
}

impl fmt::Display for Utf8Token<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_lossy_str())
    }
}

/// An iterator over a byte slice that yields [`Utf8Token`]s.
///
/// This struct is created by [`decode`](crate::decode) or [`Utf8Tokens::new`]. The
/// slice is assumed to be the whole input; a sequence cut off by its end is
/// yielded as [`Utf8Token::Invalid`].
#[derive(Clone, Debug)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Utf8Tokens<'a> {
    pub(crate) bytes: &'a [u8],
}

impl<'a> Utf8Tokens<'a> {
    /// Creates a new token iterator for the given byte slice.
    #[inline]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Returns the bytes that have not been tokenized yet.
    #[inline]
    pub fn remnant(&self) -> &'a [u8] {
        self.bytes
    }

    /// Decodes the remaining bytes into a string, failing on the first invalid run.
    ///
    /// Borrows from the input whenever possible.
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn decode_utf8(mut self) -> Result<Cow<'a, str>, DecodeError> {
        // Valid input always comes out as a single `Text` token.
        match self.next() {
            None => Ok(Cow::Borrowed("")),
            Some(Utf8Token::Text(s)) => match self.next() {
                None => Ok(Cow::Borrowed(s)),
                Some(token) => token.into_result().map(Cow::Borrowed),
            },
            Some(Utf8Token::Invalid(bytes)) => Err(DecodeError::invalid(bytes)),
        }
    }

    /// Decodes the remaining bytes into a string, replacing each invalid run with
    /// `U+FFFD`.
    ///
    /// The result is identical to [`String::from_utf8_lossy`] on the same bytes.
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn decode_utf8_lossy(mut self) -> Cow<'a, str> {
        let first = match self.next() {
            None => return Cow::Borrowed(""),
            Some(Utf8Token::Text(s)) if self.bytes.is_empty() => return Cow::Borrowed(s),
            Some(token) => token,
        };

        let mut buf = String::with_capacity(first.as_lossy_str().len() + self.bytes.len());
        buf.push_str(first.as_lossy_str());
        for token in self {
            buf.push_str(token.as_lossy_str());
        }
        Cow::Owned(buf)
    }

    /// Returns a wrapper that implements [`fmt::Display`].
    ///
    /// Formatting fails with [`fmt::Error`] at the first invalid run.
    #[inline]
    pub fn display_utf8(self) -> DisplayUtf8<'a> {
        DisplayUtf8 { bytes: self.bytes }
    }

    /// Returns a wrapper that implements [`fmt::Display`], replacing each invalid run
    /// with `U+FFFD`.
    #[inline]
    pub fn display_utf8_lossy(self) -> DisplayUtf8Lossy<'a> {
        DisplayUtf8Lossy { bytes: self.bytes }
    }
}

impl<'a> Iterator for Utf8Tokens<'a> {
    type Item = Utf8Token<'a>;

    fn next(&mut self) -> Option<Utf8Token<'a>> {
        if self.bytes.is_empty() {
            return None;
        }

        let ascii = ascii_prefix_len(self.bytes);
        let valid_up_to = if ascii == self.bytes.len() {
            ascii
        } else {
            match str::from_utf8(&self.bytes[ascii..]) {
                Ok(_) => self.bytes.len(),
                Err(e) if ascii + e.valid_up_to() > 0 => ascii + e.valid_up_to(),
                Err(e) => {
                    // The slice starts with an invalid run. `error_len` is `None`
                    // only for a truncated sequence at the very end of the input.
                    let len = e.error_len().unwrap_or(self.bytes.len());
                    let (invalid, rest) = self.bytes.split_at(len);
                    self.bytes = rest;
                    return Some(Utf8Token::Invalid(invalid));
                }
            }
        };

        let (text, rest) = self.bytes.split_at(valid_up_to);
        self.bytes = rest;
        // SAFETY: `text` is either all ASCII or the prefix `from_utf8` validated.
        Some(Utf8Token::Text(unsafe { str::from_utf8_unchecked(text) }))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        // Text and invalid runs alternate, and every token holds at least one byte.
        (
            usize::from(!self.bytes.is_empty()),
            Some(self.bytes.len()),
        )
    }
}

impl FusedIterator for Utf8Tokens<'_> {}

/// A wrapper for a [`Utf8Tokens`] iterator that implements [`fmt::Display`].
///
/// This struct is created by [`Utf8Tokens::display_utf8`]. It writes without any
/// heap allocation and fails with [`fmt::Error`] on invalid input.
pub struct DisplayUtf8<'a> {
    bytes: &'a [u8],
}

impl fmt::Display for DisplayUtf8<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_bytes_utf8(self.bytes, f, false)
    }
}

/// A wrapper for a [`Utf8Tokens`] iterator that implements [`fmt::Display`] lossily.
///
/// This struct is created by [`Utf8Tokens::display_utf8_lossy`].
pub struct DisplayUtf8Lossy<'a> {
    bytes: &'a [u8],
}

impl fmt::Display for DisplayUtf8Lossy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_bytes_utf8(self.bytes, f, true)
    }
}

//! An incremental, allocation-free UTF-8 decoder for chunked byte streams.
//!
//! Data sources such as sockets, pipes and file readers hand out bytes in pieces whose
//! boundaries have nothing to do with character boundaries. A code point encoded in
//! two to four bytes can therefore arrive split across two (or more) reads. The
//! [`Utf8Stream`] in this module decodes each piece as it arrives and carries the cut-off
//! prefix of such a code point over to the next piece.
//!
//! # Key Features
//!
//! - **Chunk Invariance**: feeding `c1, c2, ..., cn` produces exactly the text that
//!   decoding `c1 ++ c2 ++ ... ++ cn` in one pass would. This also holds for invalid
//!   input: lossy output always matches [`String::from_utf8_lossy`] of the whole stream.
//! - **Four Bytes Of State**: the decoder never holds on to previous chunks, only to the
//!   (at most three, during a 4-byte sequence) bytes of the code point in flight.
//! - **Data-Source Agnostic**: the API uses a "push" model. You provide byte slices as
//!   you receive them, and can reuse your input buffers immediately.
//! - **Explicit End Of Stream**: [`finish`](Utf8Stream::finish) reports a sequence that
//!   the stream cut short, [`finish_with`](Utf8Stream::finish_with) lets you choose
//!   what happens to it instead.
//!
//! # How It Works
//!
//! Each call to [`decode_next`](Utf8Stream::decode_next) does two things:
//!
//! 1.  If the previous chunk ended inside a multi-byte sequence, the leading continuation
//!     bytes of the new chunk are appended to the buffered prefix. Once the sequence is
//!     complete it is returned as the "boundary" `Option<Result<char, DecodeError>>`.
//! 2.  The last (up to three) bytes of what remains are inspected. If they are the start
//!     of a sequence that needs more bytes than the chunk has left, they are moved into
//!     the internal buffer. Everything before them is returned as a [`DecodeNext`]
//!     iterator of [`Utf8Token`]s borrowing from the chunk.
//!
//! For callers that just want text, [`write`](Utf8Stream::write) does both steps and
//! returns at most one `String` per chunk.
//!
//! # Example
//!
//! ```rust
//! use utf8_stream::{stream::Utf8Stream, token::Utf8Token};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // "héllo 😀" with both multi-byte characters split across reads.
//!     let parts = vec![
//!         b"h\xC3".as_slice(),
//!         b"\xA9llo \xF0\x9F".as_slice(),
//!         b"\x98\x80".as_slice(),
//!     ];
//!
//!     let mut decoder = Utf8Stream::new();
//!     let mut text = String::new();
//!
//!     for part in parts {
//!         let (boundary_char, rest_of_part) = decoder.try_decode_next(part)?;
//!
//!         // 1. Handle the character that spanned the boundary.
//!         if let Some(ch) = boundary_char {
//!             text.push(ch);
//!         }
//!
//!         // 2. Handle the rest of the current part.
//!         for token in rest_of_part {
//!             text.push_str(token.into_result()?);
//!         }
//!     }
//!
//!     // IMPORTANT: call finish() to detect a sequence cut off by the end of the stream.
//!     decoder.finish()?;
//!
//!     assert_eq!(text, "héllo 😀");
//!
//!     Ok(())
//! }
//! ```

use core::{convert::Infallible, str};

#[cfg(feature = "alloc")]
use alloc::string::String;
#[cfg(feature = "std")]
use std::vec::Vec;

use crate::{
    DecodeError, is_continuation, sequence_len,
    token::{Utf8Token, Utf8Tokens},
};

#[cfg(feature = "alloc")]
use crate::{ascii_prefix_len, push_lossy};

/// What to do with a sequence that is still incomplete when the stream ends.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TailPolicy {
    /// Report it as a [`DecodeErrorKind::Truncated`](crate::DecodeErrorKind::Truncated) error.
    #[default]
    Error,
    /// Emit `U+FFFD` for it, exactly as [`String::from_utf8_lossy`] would.
    Replace,
    /// Drop it without a trace.
    Discard,
}

/// A streaming UTF-8 decoder that operates over byte slices.
///
/// One instance decodes one logical byte stream (for example, one socket). It is
/// plain owned state mutated through `&mut self`; share it across threads only
/// behind your own lock.
///
/// See the [module-level documentation](self) for examples and more details.
#[derive(Debug, Clone)]
#[must_use = "Utf8Stream does nothing unless fed"]
pub struct Utf8Stream {
    /// The buffered prefix of an incomplete sequence. The longest UTF-8 sequence is 4 bytes.
    pending_buf: [u8; 4],
    /// The number of valid bytes in `pending_buf`.
    pending_len: u8,
    /// The length announced by the buffered lead byte, or 0 when nothing is buffered.
    pending_need: u8,
}

impl Default for Utf8Stream {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Stream {
    /// Creates a new, empty `Utf8Stream`.
    #[inline]
    pub fn new() -> Self {
        Self {
            pending_buf: [0; 4],
            pending_len: 0,
            pending_need: 0,
        }
    }

    /// Returns the bytes of the incomplete sequence carried over from earlier chunks.
    #[inline]
    pub fn pending(&self) -> &[u8] {
        &self.pending_buf[..self.pending_len as usize]
    }

    /// Returns the total length of the sequence being buffered, or 0 if none is.
    #[inline]
    pub fn pending_sequence_len(&self) -> usize {
        self.pending_need as usize
    }

    /// Returns `true` if the stream currently ends inside a multi-byte sequence.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending_need > 0
    }

    /// Processes the next byte slice, returning a fallible result.
    ///
    /// This is a convenience wrapper around [`Utf8Stream::decode_next`]. Instead of
    /// returning an `Option<Result<...>>`, it "hoists" a potential boundary error into
    /// the main `Result`, so both the boundary and the tokens can be handled with `?`.
    ///
    /// # Returns
    ///
    /// - `Ok((Option<char>, DecodeNext))` on success. The `Option<char>` contains the
    ///   character completed by the start of this slice.
    /// - `Err(DecodeError)` if the bytes stitched across the boundary are not valid
    ///   UTF-8. The decoder has already dropped them (and saved any incomplete tail of
    ///   this slice), but the rest of the slice is not returned. Use
    ///   [`decode_next`](Self::decode_next) to keep decoding past such an error.
    #[inline]
    pub fn try_decode_next<'b, I: AsRef<[u8]> + ?Sized>(
        &mut self,
        next_part: &'b I,
    ) -> Result<(Option<char>, DecodeNext<'b>), DecodeError> {
        let (boundary_result, next) = self.decode_next(next_part);
        let boundary_char = boundary_result.transpose()?;

        Ok((boundary_char, next))
    }

    /// Processes the next byte slice in the stream.
    ///
    /// This is the primary method for feeding data to the decoder. It returns a tuple:
    ///
    /// 1.  An `Option<Result<char, DecodeError>>` for a sequence that spanned the
    ///     boundary from the *previous* slice. `None` if the previous slice ended
    ///     cleanly, or if this slice still did not complete the sequence.
    /// 2.  A [`DecodeNext`] iterator over the remainder of the *current* slice.
    ///
    /// If the current slice ends with an incomplete sequence, those bytes are saved
    /// internally before this method returns. They are completed by a later call or
    /// reported by [`finish`](Self::finish).
    ///
    /// Only continuation bytes (`10xxxxxx`) are ever appended to a buffered prefix. If
    /// the slice starts with anything else, the prefix is returned as an
    /// [`InvalidSequence`](crate::DecodeErrorKind::InvalidSequence) error and the slice
    /// is decoded from its first byte.
    pub fn decode_next<'b, I: AsRef<[u8]> + ?Sized>(
        &mut self,
        next_part: &'b I,
    ) -> (Option<Result<char, DecodeError>>, DecodeNext<'b>) {
        let mut next_part_slice = next_part.as_ref();

        let boundary_char = if self.pending_need > 0 {
            self.resume(&mut next_part_slice)
        } else {
            None
        };

        // Still waiting means the whole slice went into the buffer.
        if self.pending_need == 0 {
            next_part_slice = self.stash_tail(next_part_slice);
        }

        let iterator = DecodeNext {
            inner: Utf8Tokens::new(next_part_slice),
        };

        (boundary_char, iterator)
    }

    // Feeds the start of `next_part` into the buffered prefix and advances past what
    // was consumed.
    fn resume(&mut self, next_part: &mut &[u8]) -> Option<Result<char, DecodeError>> {
        let bytes = *next_part;
        let have = self.pending_len as usize;
        let need = self.pending_need as usize;

        let to_copy = bytes
            .iter()
            .take(need - have)
            .take_while(|&&b| is_continuation(b))
            .count();

        self.pending_buf[have..have + to_copy].copy_from_slice(&bytes[..to_copy]);
        self.pending_len += to_copy as u8;
        *next_part = &bytes[to_copy..];

        if (self.pending_len as usize) < need {
            if to_copy == bytes.len() {
                // Still not enough data. Wait for the next chunk.
                trace!(
                    pending = self.pending_len,
                    need = self.pending_need,
                    "sequence still incomplete"
                );
                return None;
            }

            // Something other than a continuation byte cut the sequence short.
            let err = DecodeError::invalid(self.pending());
            trace!(bytes = ?self.pending(), "abandoned incomplete sequence");
            self.clear();
            return Some(Err(err));
        }

        let sequence = &self.pending_buf[..need];
        let result = str::from_utf8(sequence)
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| DecodeError::invalid(sequence));

        trace!(bytes = ?sequence, valid = result.is_ok(), "completed boundary sequence");
        self.clear();
        Some(result)
    }

    // Moves an incomplete sequence at the end of `bytes` into the buffer and returns
    // the part before it.
    fn stash_tail<'b>(&mut self, bytes: &'b [u8]) -> &'b [u8] {
        let len = bytes.len();

        // A sequence is at most 4 bytes, so an incomplete one starts in the last 3.
        for back in 1..=len.min(3) {
            let byte = bytes[len - back];
            if is_continuation(byte) {
                continue;
            }

            let need = sequence_len(byte);
            if need as usize > back {
                self.pending_buf[..back].copy_from_slice(&bytes[len - back..]);
                self.pending_len = back as u8;
                self.pending_need = need;
                trace!(bytes = ?self.pending(), need, "stashed incomplete tail");
                return &bytes[..len - back];
            }
            break;
        }

        bytes
    }

    /// Decodes the next chunk and returns everything it completes as one string.
    ///
    /// Invalid bytes are replaced with `U+FFFD`. Returns `None` when the chunk produced
    /// no text at all: it was empty, or it only extended a pending sequence.
    ///
    /// # Examples
    ///
    /// ```
    /// use utf8_stream::Utf8Stream;
    ///
    /// let mut decoder = Utf8Stream::new();
    /// assert_eq!(decoder.write(b"\xC3"), None);
    /// assert_eq!(decoder.write(b"\xA9"), Some("é".to_string()));
    /// ```
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn write<I: AsRef<[u8]> + ?Sized>(&mut self, chunk: &I) -> Option<String> {
        let mut out = String::new();
        self.write_into(chunk, &mut out).then_some(out)
    }

    /// Like [`write`](Self::write), but appends to an existing string.
    ///
    /// Returns `true` if anything was appended.
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn write_into<I: AsRef<[u8]> + ?Sized>(&mut self, chunk: &I, out: &mut String) -> bool {
        let start = out.len();
        let chunk = chunk.as_ref();

        if self.pending_need == 0 && ascii_prefix_len(chunk) == chunk.len() {
            // SAFETY: every byte is ASCII.
            out.push_str(unsafe { str::from_utf8_unchecked(chunk) });
            return out.len() > start;
        }

        let (boundary, rest) = self.decode_next(chunk);
        match boundary {
            Some(Ok(ch)) => out.push(ch),
            Some(Err(err)) => push_lossy(out, err.invalid_bytes()),
            None => {}
        }
        for token in rest {
            out.push_str(token.as_lossy_str());
        }

        out.len() > start
    }

    /// Decodes the next chunk and hands the resulting text to `on_string`.
    ///
    /// `on_string` is called at most once, never with an empty string. When the text
    /// is a contiguous run of the chunk (the common case) it is passed without copying.
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn write_to<I, F>(&mut self, chunk: &I, on_string: F)
    where
        I: AsRef<[u8]> + ?Sized,
        F: FnOnce(&str),
    {
        let (boundary, rest) = self.decode_next(chunk);

        if boundary.is_none() {
            let mut peek = rest.clone();
            match (peek.next(), peek.next()) {
                (None, _) => return,
                (Some(Utf8Token::Text(text)), None) => return on_string(text),
                _ => {}
            }
        }

        let mut out = String::new();
        match boundary {
            Some(Ok(ch)) => out.push(ch),
            Some(Err(err)) => push_lossy(&mut out, err.invalid_bytes()),
            None => {}
        }
        for token in rest {
            out.push_str(token.as_lossy_str());
        }
        if !out.is_empty() {
            on_string(&out);
        }
    }

    /// Finalizes decoding, checking for a sequence cut off by the end of the stream.
    ///
    /// This method should be called after the last slice has been processed. If the
    /// stream ended inside a multi-byte sequence, an error of kind
    /// [`Truncated`](crate::DecodeErrorKind::Truncated) carrying the buffered bytes is
    /// returned.
    ///
    /// This method consumes the `Utf8Stream`, preventing further use.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pending_need > 0 {
            trace!(bytes = ?self.pending(), "stream ended inside a sequence");
            return Err(DecodeError::truncated(self.pending(), self.pending_need));
        }
        Ok(())
    }

    /// Finalizes decoding, rendering a truncated trailing sequence as `U+FFFD`.
    ///
    /// Returns `None` if the stream ended cleanly. Appending the returned string to the
    /// output of [`write`](Self::write) gives exactly [`String::from_utf8_lossy`] of the
    /// whole stream.
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn finish_lossy(self) -> Option<String> {
        if self.pending_need == 0 {
            return None;
        }
        let mut out = String::new();
        push_lossy(&mut out, self.pending());
        Some(out)
    }

    /// Finalizes decoding, disposing of a truncated trailing sequence per `policy`.
    ///
    /// - [`TailPolicy::Error`]: same as [`finish`](Self::finish).
    /// - [`TailPolicy::Replace`]: same as [`finish_lossy`](Self::finish_lossy).
    /// - [`TailPolicy::Discard`]: always `Ok(None)`.
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn finish_with(self, policy: TailPolicy) -> Result<Option<String>, DecodeError> {
        match policy {
            TailPolicy::Error => self.finish().map(|()| None),
            TailPolicy::Replace => Ok(self.finish_lossy()),
            TailPolicy::Discard => {
                trace!(bytes = ?self.pending(), "discarding trailing bytes");
                Ok(None)
            }
        }
    }

    /// Clears any partial sequence from the internal buffer.
    ///
    /// This is the "silent drop" end-of-stream policy, and also resets a decoder that
    /// is reused for a new stream.
    ///
    /// **Warning**: after `clear()`, [`finish`](Self::finish) returns `Ok(())` even if
    /// the stream had ended mid-sequence.
    #[inline]
    pub fn clear(&mut self) {
        self.pending_len = 0;
        self.pending_need = 0;
    }

    /// Decodes a stream of byte chunks from a source function to a destination function.
    ///
    /// This function acts as a driver for the [`Utf8Stream`]. It repeatedly calls a
    /// source function (`src`) to get the next chunk of data, decodes it, and calls a
    /// destination function (`dst`) for each resulting piece of text.
    ///
    /// # Parameters
    ///
    /// - `self`: The `Utf8Stream` instance, which will be consumed.
    /// - `src`: A closure that returns the next chunk as `Option<Result<B, SrcError>>`:
    ///   `Some(Ok(chunk))` for data, `Some(Err(e))` for a source error, and `None` at
    ///   the end of the stream.
    /// - `dst`: A closure that receives a `&str`. It returns `Ok(())` on success or
    ///   `Err(DstError)` on failure.
    ///
    /// # Errors
    ///
    /// - [`DecodeFnError::Src`] if `src` returns an error.
    /// - [`DecodeFnError::Decode`] on the first invalid sequence, or if the stream ends
    ///   inside a sequence.
    /// - [`DecodeFnError::Dst`] if `dst` returns an error.
    pub fn decode_from_fn<Src, Dst, SrcError, DstError, B>(
        self,
        src: Src,
        dst: Dst,
    ) -> Result<(), DecodeFnError<SrcError, DstError>>
    where
        Src: FnMut() -> Option<Result<B, SrcError>>,
        Dst: FnMut(&str) -> Result<(), DstError>,
        B: AsRef<[u8]>,
    {
        self.decode_from_source(FnMutChunkSource::new(src), dst)
    }

    /// Like [`decode_from_fn`](Self::decode_from_fn), but replaces invalid sequences
    /// (including a truncated one at the end) with `U+FFFD` instead of failing.
    pub fn decode_from_fn_lossy<Src, Dst, SrcError, DstError, B>(
        self,
        src: Src,
        dst: Dst,
    ) -> Result<(), DecodeFnError<SrcError, DstError>>
    where
        Src: FnMut() -> Option<Result<B, SrcError>>,
        Dst: FnMut(&str) -> Result<(), DstError>,
        B: AsRef<[u8]>,
    {
        self.decode_from_source_lossy(FnMutChunkSource::new(src), dst)
    }

    /// Processes a stream of byte chunks from a source and decodes them to a destination.
    ///
    /// # Parameters
    /// - `src`: A [`ChunkSource`] that provides the raw byte chunks.
    /// - `dst`: A closure that receives each piece of decoded text.
    ///
    /// # Errors
    /// - `DecodeFnError::Src`: An error from the source (`src`).
    /// - `DecodeFnError::Decode`: The bytes are not valid UTF-8, or end mid-sequence.
    /// - `DecodeFnError::Dst`: An error from the destination (`dst`).
    pub fn decode_from_source<Src, Dst, SrcError, DstError>(
        mut self,
        mut src: Src,
        mut dst: Dst,
    ) -> Result<(), DecodeFnError<SrcError, DstError>>
    where
        Src: ChunkSource<Error = SrcError>,
        Dst: FnMut(&str) -> Result<(), DstError>,
    {
        while let Some(next) = src.next_chunk() {
            let next = next.map_err(DecodeFnError::Src)?;
            let (boundary, next) = self
                .try_decode_next(next.as_ref())
                .map_err(DecodeFnError::Decode)?;

            if let Some(ch) = boundary {
                dst(&*ch.encode_utf8(&mut [0; 4])).map_err(DecodeFnError::Dst)?;
            }

            for token in next {
                let text = token.into_result().map_err(DecodeFnError::Decode)?;
                dst(text).map_err(DecodeFnError::Dst)?;
            }
        }

        self.finish().map_err(DecodeFnError::Decode)
    }

    /// Like [`decode_from_source`](Self::decode_from_source), but replaces invalid
    /// sequences (including a truncated one at the end) with `U+FFFD` instead of
    /// failing. Never returns [`DecodeFnError::Decode`].
    pub fn decode_from_source_lossy<Src, Dst, SrcError, DstError>(
        mut self,
        mut src: Src,
        mut dst: Dst,
    ) -> Result<(), DecodeFnError<SrcError, DstError>>
    where
        Src: ChunkSource<Error = SrcError>,
        Dst: FnMut(&str) -> Result<(), DstError>,
    {
        while let Some(next) = src.next_chunk() {
            let next = next.map_err(DecodeFnError::Src)?;
            let (boundary, next) = self.decode_next(next.as_ref());

            match boundary {
                Some(Ok(ch)) => dst(&*ch.encode_utf8(&mut [0; 4])).map_err(DecodeFnError::Dst)?,
                Some(Err(err)) => {
                    emit_lossy(err.invalid_bytes(), &mut dst).map_err(DecodeFnError::Dst)?
                }
                None => {}
            }

            for token in next {
                dst(token.as_lossy_str()).map_err(DecodeFnError::Dst)?;
            }
        }

        emit_lossy(self.pending(), &mut dst).map_err(DecodeFnError::Dst)
    }
}

// Hands `bytes` to `dst` the way `String::from_utf8_lossy` would render them.
fn emit_lossy<Dst, DstError>(bytes: &[u8], dst: &mut Dst) -> Result<(), DstError>
where
    Dst: FnMut(&str) -> Result<(), DstError>,
{
    for token in Utf8Tokens::new(bytes) {
        dst(token.as_lossy_str())?;
    }
    Ok(())
}

/// An error that can occur during the `decode_from_source` operation.
///
/// This enum consolidates errors from the three potential points of failure:
/// 1. Reading from the source (`Src`).
/// 2. The UTF-8 decoding itself (`Decode`).
/// 3. Writing to the destination (`Dst`).
#[derive(Clone, Debug)]
pub enum DecodeFnError<Src, Dst> {
    /// The bytes were not valid UTF-8.
    Decode(DecodeError),
    /// An error occurred while reading from the source.
    Src(Src),
    /// An error occurred while writing to the destination.
    Dst(Dst),
}

impl<Src, Dst: core::fmt::Display> core::fmt::Display for DecodeFnError<Src, Dst>
where
    Src: core::fmt::Display,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeFnError::Decode(e) => write!(f, "decode error: {e}"),
            DecodeFnError::Src(e) => write!(f, "source error: {e}"),
            DecodeFnError::Dst(e) => write!(f, "destination error: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl<Src, Dst> std::error::Error for DecodeFnError<Src, Dst>
where
    Src: std::error::Error + 'static,
    Dst: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeFnError::Decode(e) => Some(e),
            DecodeFnError::Src(e) => Some(e),
            DecodeFnError::Dst(e) => Some(e),
        }
    }
}

impl From<DecodeFnError<Infallible, Infallible>> for DecodeError {
    fn from(value: DecodeFnError<Infallible, Infallible>) -> Self {
        match value {
            DecodeFnError::Decode(decode_error) => decode_error,
            DecodeFnError::Src(i) => match i {},
            DecodeFnError::Dst(i) => match i {},
        }
    }
}

/// An iterator over the decoded parts of a single byte slice.
///
/// This struct is created by [`Utf8Stream::decode_next`]. Any incomplete sequence at
/// the end of the slice has already been moved into the stream, so every
/// [`Utf8Token::Invalid`] it yields is a genuinely malformed run.
#[must_use = "iterators are lazy and do nothing unless consumed"]
#[derive(Debug, Clone)]
pub struct DecodeNext<'b> {
    inner: Utf8Tokens<'b>,
}

impl<'b> DecodeNext<'b> {
    /// Returns the bytes of this slice that have not been yielded yet.
    #[inline]
    pub fn remnant(&self) -> &'b [u8] {
        self.inner.remnant()
    }
}

impl<'b> Iterator for DecodeNext<'b> {
    type Item = Utf8Token<'b>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl core::iter::FusedIterator for DecodeNext<'_> {}

// =============================================================================
// Traits
// =============================================================================

/// A source of byte chunks for the [`Utf8Stream`] drivers.
///
/// This trait is designed to handle byte streams efficiently, especially when the
/// source needs to lend out an internal buffer between calls. A simple closure
/// (`FnMut() -> Option<Result<B, E>>`) cannot express that lifetime relationship,
/// as the returned slice would need to outlive the closure call itself. This trait
/// solves that by making the source a mutable object that you call repeatedly.
pub trait ChunkSource {
    /// The type of error that can occur when reading a chunk.
    type Error;

    /// The type of chunk returned, which must implement `AsRef<[u8]>`.
    type Chunk<'a>: AsRef<[u8]> + 'a
    where
        Self: 'a;

    /// Get the next chunk of bytes.
    ///
    /// Returns `None` when the source is exhausted, `Some(Ok(bytes))` for a successful
    /// chunk, or `Some(Err(e))` if an error occurred.
    ///
    /// The returned chunk is valid until the next call to `next_chunk` or until the
    /// source is dropped.
    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>>;
}

impl<T> ChunkSource for &mut T
where
    T: ChunkSource,
{
    type Error = T::Error;

    type Chunk<'a>
        = T::Chunk<'a>
    where
        Self: 'a;

    #[inline]
    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>> {
        (*self).next_chunk()
    }
}

/// A `ChunkSource` that reads from any `std::io::Read` type.
///
/// Each chunk is one successful `read` into the internal buffer, so the buffer's
/// length decides the largest chunk size. Reads interrupted by a signal
/// ([`std::io::ErrorKind::Interrupted`]) are retried.
#[cfg(feature = "std")]
pub struct ReadChunkSource<R, B> {
    reader: R,
    buffer: B,
}

#[cfg(feature = "std")]
impl<R, B> ReadChunkSource<R, B> {
    /// Creates a new `ReadChunkSource` with the given reader and buffer.
    ///
    /// The whole of `buffer` is offered to every `read`.
    pub fn new(reader: R, buffer: B) -> Self {
        Self { reader, buffer }
    }

    /// Creates a new `ReadChunkSource` with a zeroed `Vec<u8>` buffer of `capacity` bytes.
    ///
    /// A `capacity` of 0 is rounded up to 1; an empty buffer would make every read
    /// look like end of stream.
    pub fn with_capacity(reader: R, capacity: usize) -> ReadChunkSource<R, Vec<u8>> {
        ReadChunkSource::new(reader, std::vec![0; capacity.max(1)])
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(feature = "std")]
impl<R, B> ChunkSource for ReadChunkSource<R, B>
where
    R: std::io::Read,
    B: AsMut<[u8]>,
{
    type Error = std::io::Error;
    type Chunk<'a>
        = &'a [u8]
    where
        Self: 'a;

    #[inline]
    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>> {
        let buffer = self.buffer.as_mut();
        loop {
            match self.reader.read(buffer) {
                Ok(0) => return None, // EOF
                Ok(n) => return Some(Ok(&buffer[..n])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// A `ChunkSource` implementation that wraps a mutable closure (`FnMut`).
///
/// The lifetime `'s` ties the chunks the closure returns to the source, so borrowed
/// chunks remain valid for as long as the driver needs them.
pub struct FnMutChunkSource<'s, F, B, E>
where
    F: FnMut() -> Option<Result<B, E>>,
    B: AsRef<[u8]> + 's,
{
    closure: F,
    _phantom: core::marker::PhantomData<&'s ()>,
}

impl<'s, F, B, E> FnMutChunkSource<'s, F, B, E>
where
    F: FnMut() -> Option<Result<B, E>>,
    B: AsRef<[u8]> + 's,
{
    /// Creates a new `FnMutChunkSource` from a closure producing chunks.
    pub fn new(closure: F) -> Self {
        FnMutChunkSource {
            closure,
            _phantom: core::marker::PhantomData,
        }
    }
}

impl<'s, F, B, E> ChunkSource for FnMutChunkSource<'s, F, B, E>
where
    F: FnMut() -> Option<Result<B, E>>,
    B: AsRef<[u8]> + 's,
{
    type Error = E;
    type Chunk<'a>
        = B
    where
        Self: 'a;

    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>> {
        (self.closure)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecodeErrorKind;
    use std::{borrow::ToOwned as _, io, string::String, string::ToString as _, vec, vec::Vec};

    // A mix of 1, 2, 3 and 4 byte sequences, plus malformed input of every flavour:
    // stray continuation bytes, never-valid bytes, truncated sequences followed by
    // ASCII, overlongs, surrogates and out-of-range code points.
    const SAMPLES: [&[u8]; 10] = [
        b"",
        b"plain ascii only",
        "é".as_bytes(),
        "a€b".as_bytes(),
        "x😀y".as_bytes(),
        "Grüße, 世界! 😀🎉 ok".as_bytes(),
        b"\x80\xBFa\xFF\xFEb",
        b"\xE2\x82A\xF0\x9F\x98B\xC3C",
        b"\xE0\x80\x80\xC0\x80\xED\xA0\x80\xF4\x90\x80\x80",
        b"\xF0\x9F\x98\x80\x80\x80\xC3\xA9\xE2",
    ];

    /// Feeds `parts` through `write` and `finish_lossy`, collecting all output.
    fn run_stream_test<I, S>(parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut decoder = Utf8Stream::new();
        let mut output = String::new();

        for part in parts {
            if let Some(text) = decoder.write(part.as_ref()) {
                assert!(!text.is_empty(), "write must not emit empty strings");
                output.push_str(&text);
            }
        }
        if let Some(tail) = decoder.finish_lossy() {
            output.push_str(&tail);
        }

        output
    }

    /// Runs the strict driver and collects the output into a string.
    fn run_strict_driver<I, S>(parts: I) -> Result<String, DecodeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut parts = parts.into_iter();
        let mut output = String::new();

        Utf8Stream::new().decode_from_fn::<_, _, Infallible, Infallible, _>(
            || parts.next().map(Ok),
            |text| {
                output.push_str(text);
                Ok(())
            },
        )?;

        Ok(output)
    }

    fn expected(input: &[u8]) -> String {
        String::from_utf8_lossy(input).into_owned()
    }

    #[test]
    fn test_single_chunk() {
        for input in SAMPLES {
            assert_eq!(run_stream_test([input]), expected(input), "{input:02X?}");
        }
    }

    #[test]
    fn test_every_two_way_and_three_way_split() {
        for input in SAMPLES {
            let want = expected(input);
            for i in 0..=input.len() {
                for j in i..=input.len() {
                    let parts = [&input[..i], &input[i..j], &input[j..]];
                    assert_eq!(
                        run_stream_test(parts),
                        want,
                        "input {input:02X?} split at {i}, {j}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_chunk_size() {
        for input in SAMPLES {
            let want = expected(input);
            for size in 1..=input.len().max(1) {
                assert_eq!(
                    run_stream_test(input.chunks(size)),
                    want,
                    "input {input:02X?} chunk size {size}"
                );
            }
        }
    }

    #[test]
    fn test_strict_driver_agrees_on_valid_input() {
        for input in SAMPLES {
            let Ok(want) = core::str::from_utf8(input) else {
                continue;
            };
            for size in 1..=input.len().max(1) {
                assert_eq!(run_strict_driver(input.chunks(size)).unwrap(), want);
            }
        }
    }

    #[test]
    fn test_split_two_byte_sequence() {
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"\xC3"), None);
        assert!(decoder.is_pending());
        assert_eq!(decoder.pending(), b"\xC3");
        assert_eq!(decoder.pending_sequence_len(), 2);

        assert_eq!(decoder.write(b"\xA9"), Some("é".to_owned()));
        assert!(!decoder.is_pending());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_split_three_byte_sequence_at_second_byte() {
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"\xE2\x82"), None);
        assert_eq!(decoder.pending(), b"\xE2\x82");
        assert_eq!(decoder.pending_sequence_len(), 3);
        assert_eq!(decoder.write(b"\xAC"), Some("€".to_owned()));
    }

    #[test]
    fn test_split_four_byte_sequence_one_byte_at_a_time() {
        let mut decoder = Utf8Stream::new();
        let bytes = "😀".as_bytes();
        assert_eq!(decoder.write(&bytes[0..1]), None);
        assert_eq!(decoder.write(&bytes[1..2]), None);
        assert_eq!(decoder.write(&bytes[2..3]), None);
        assert_eq!(decoder.pending(), &bytes[..3]);
        assert_eq!(decoder.write(&bytes[3..4]), Some("😀".to_owned()));
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_mixed_content_around_split() {
        let euro = "€".as_bytes();
        let mut decoder = Utf8Stream::new();

        let mut first = b"ab".to_vec();
        first.push(euro[0]);
        assert_eq!(decoder.write(&first), Some("ab".to_owned()));
        assert_eq!(decoder.pending(), &euro[..1]);

        let mut second = euro[1..].to_vec();
        second.extend_from_slice(b"cd");
        assert_eq!(decoder.write(&second), Some("€cd".to_owned()));
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_empty_chunk_changes_nothing() {
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b""), None);
        assert!(!decoder.is_pending());

        decoder.write(b"\xF0\x9F");
        let before = decoder.clone();
        assert_eq!(decoder.write(b""), None);
        assert_eq!(decoder.pending(), before.pending());
        assert_eq!(decoder.pending_sequence_len(), before.pending_sequence_len());
    }

    #[test]
    fn test_all_ascii_fast_path() {
        let input: Vec<u8> = (0..1000).map(|i| b' ' + (i % 95) as u8).collect();
        let mut decoder = Utf8Stream::new();
        let text = decoder.write(&input).unwrap();
        assert_eq!(text.as_bytes(), &input[..]);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_complete_chunk_leaves_no_state() {
        let mut decoder = Utf8Stream::new();
        assert_eq!(
            decoder.write("ends cleanly: 世".as_bytes()),
            Some("ends cleanly: 世".to_owned())
        );
        assert!(!decoder.is_pending());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_complete_sequence_at_end_is_not_stashed() {
        // A 2-byte lead one byte from the end and a 3-byte lead two bytes from the end
        // both start complete sequences.
        let mut decoder = Utf8Stream::new();
        let (boundary, rest) = decoder.decode_next("a€".as_bytes());
        assert!(boundary.is_none());
        assert_eq!(rest.collect::<Vec<_>>(), vec![Utf8Token::Text("a€")]);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_decode_next_boundary_char() {
        let mut decoder = Utf8Stream::new();
        let (boundary, rest) = decoder.decode_next(b"x\xE4\xB8");
        assert!(boundary.is_none());
        assert_eq!(rest.collect::<Vec<_>>(), vec![Utf8Token::Text("x")]);

        let (boundary, rest) = decoder.decode_next(b"\x96y");
        assert_eq!(boundary, Some(Ok('世')));
        assert_eq!(rest.remnant(), b"y");
        assert_eq!(rest.collect::<Vec<_>>(), vec![Utf8Token::Text("y")]);
    }

    #[test]
    fn test_boundary_consumes_whole_chunk() {
        let mut decoder = Utf8Stream::new();
        decoder.write(b"\xF0\x9F");
        let (boundary, mut rest) = decoder.decode_next(b"\x98\x80");
        assert_eq!(boundary, Some(Ok('😀')));
        assert!(rest.next().is_none());
    }

    #[test]
    fn test_non_continuation_interrupts_pending_sequence() {
        let mut decoder = Utf8Stream::new();
        decoder.write(b"\xE2\x82");

        let (boundary, rest) = decoder.decode_next(b"A");
        let err = boundary.unwrap().unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidSequence);
        assert_eq!(err.invalid_bytes(), b"\xE2\x82");
        // The interrupting byte is decoded normally.
        assert_eq!(rest.collect::<Vec<_>>(), vec![Utf8Token::Text("A")]);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_completed_but_invalid_sequence() {
        // Right shape, but an encoded surrogate.
        let mut decoder = Utf8Stream::new();
        decoder.write(b"\xED");
        let err = decoder.try_decode_next(b"\xA0\x80").unwrap_err();
        assert_eq!(err.invalid_bytes(), b"\xED\xA0\x80");
        assert!(!decoder.is_pending());

        let mut decoder = Utf8Stream::new();
        decoder.write(b"\xED");
        assert_eq!(
            decoder.write(b"\xA0\x80"),
            Some("\u{FFFD}\u{FFFD}\u{FFFD}".to_owned())
        );
    }

    #[test]
    fn test_tail_with_non_continuation_is_not_stashed() {
        // Lead shape alone is not enough: "E2 41" cannot become a valid sequence.
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"\xE2A"), Some("\u{FFFD}A".to_owned()));
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_never_valid_bytes_are_not_stashed() {
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"\xFF"), Some("\u{FFFD}".to_owned()));
        assert_eq!(decoder.write(b"\x80"), Some("\u{FFFD}".to_owned()));
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_finish_error_on_truncated_tail() {
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"ok \xF0\x9F\x98"), Some("ok ".to_owned()));

        let err = decoder.finish().unwrap_err();
        assert_eq!(
            err.kind(),
            DecodeErrorKind::Truncated(crate::TruncatedError { expected: 4 })
        );
        assert_eq!(err.invalid_bytes(), b"\xF0\x9F\x98");
    }

    #[test]
    fn test_finish_policies() {
        let truncated = || {
            let mut decoder = Utf8Stream::new();
            decoder.write(b"\xE2\x82");
            decoder
        };

        assert!(truncated().finish_with(TailPolicy::Error).is_err());
        assert_eq!(
            truncated().finish_with(TailPolicy::Replace),
            Ok(Some("\u{FFFD}".to_owned()))
        );
        assert_eq!(truncated().finish_with(TailPolicy::Discard), Ok(None));
        assert_eq!(TailPolicy::default(), TailPolicy::Error);

        // A clean stream is clean under every policy.
        for policy in [TailPolicy::Error, TailPolicy::Replace, TailPolicy::Discard] {
            assert_eq!(Utf8Stream::new().finish_with(policy), Ok(None));
        }
    }

    #[test]
    fn test_finish_lossy_matches_std_for_invalid_prefix() {
        // "E0 80" is stashed by shape but is not a valid prefix: two replacements.
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"\xE0\x80"), None);
        assert_eq!(
            decoder.finish_lossy(),
            Some("\u{FFFD}\u{FFFD}".to_owned())
        );
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut decoder = Utf8Stream::new();
        decoder.write(b"abc\xC3");
        assert!(decoder.clone().finish().is_err());

        decoder.clear();
        assert!(decoder.clone().finish().is_ok());

        // And the decoder can be reused from a fresh state.
        assert_eq!(decoder.write(b"\xA9"), Some("\u{FFFD}".to_owned()));
        assert_eq!(decoder.write(b"good data"), Some("good data".to_owned()));
    }

    #[test]
    fn test_write_into_appends() {
        let mut decoder = Utf8Stream::new();
        let mut out = String::from(">");
        assert!(decoder.write_into(b"a\xC3", &mut out));
        assert!(!decoder.write_into(b"", &mut out));
        assert!(decoder.write_into(b"\xA9", &mut out));
        assert_eq!(out, ">aé");
    }

    #[test]
    fn test_write_to_calls_at_most_once() {
        let parts: [&[u8]; 5] = [b"h\xC3", b"\xA9", b"", b"\xE2\x82", b"\xACllo"];
        let mut decoder = Utf8Stream::new();
        let mut emitted: Vec<String> = Vec::new();

        for part in parts {
            let mut calls = 0;
            decoder.write_to(part, |text| {
                calls += 1;
                assert!(!text.is_empty());
                emitted.push(text.to_owned());
            });
            assert!(calls <= 1);
        }

        assert_eq!(emitted, vec!["h", "é", "€llo"]);
    }

    #[test]
    fn test_error_after_successful_boundary() {
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"\xC3"), None);

        // Completes the boundary character, then hits a stray continuation byte.
        let (boundary, mut rest) = decoder.decode_next(b"\xA9ok\x80");
        assert_eq!(boundary, Some(Ok('é')));
        assert_eq!(rest.next(), Some(Utf8Token::Text("ok")));
        assert_eq!(rest.next(), Some(Utf8Token::Invalid(b"\x80")));
        assert_eq!(rest.next(), None);

        // The error was contained in the chunk, nothing is pending.
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_strict_driver_errors() {
        let err = run_strict_driver([&b"ok"[..], &b"\xFF"[..]]).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidSequence);

        let err = run_strict_driver([&b"ok \xE2"[..], &b"\x82"[..]]).unwrap_err();
        assert_eq!(
            err.kind(),
            DecodeErrorKind::Truncated(crate::TruncatedError { expected: 3 })
        );
        assert_eq!(err.invalid_bytes(), b"\xE2\x82");
    }

    #[test]
    fn test_lossy_driver_matches_std() {
        for input in SAMPLES {
            for size in 1..=input.len().max(1) {
                let mut parts = input.chunks(size);
                let mut output = String::new();
                Utf8Stream::new()
                    .decode_from_fn_lossy::<_, _, Infallible, Infallible, _>(
                        || parts.next().map(Ok),
                        |text| {
                            output.push_str(text);
                            Ok(())
                        },
                    )
                    .unwrap();
                assert_eq!(output, expected(input), "chunk size {size}");
            }
        }
    }

    #[test]
    fn test_decode_from_source_src_error() {
        let decoder = Utf8Stream::new();
        let mut parts = vec![Ok(b"hello".as_slice()), Err("read error")].into_iter();
        let result =
            decoder.decode_from_fn(|| parts.next(), |_| -> Result<(), Infallible> { Ok(()) });
        match result {
            Err(DecodeFnError::Src("read error")) => (), // pass
            _ => panic!("Expected a source error"),
        }
    }

    #[test]
    fn test_decode_from_source_dst_error() {
        let decoder = Utf8Stream::new();
        let mut parts = vec![Result::<_, ()>::Ok("hello")].into_iter();
        let result = decoder.decode_from_fn(
            || parts.next(),
            |_| -> Result<(), &str> { Err("write error") },
        );
        match result {
            Err(DecodeFnError::Dst("write error")) => (), // pass
            _ => panic!("Expected a destination error"),
        }
    }

    #[test]
    fn test_infallible_error_converts() {
        let mut parts = vec![&b"\xC3"[..]].into_iter();
        let err: DecodeError = Utf8Stream::new()
            .decode_from_fn::<_, _, Infallible, Infallible, _>(
                || parts.next().map(Ok),
                |_| Ok(()),
            )
            .unwrap_err()
            .into();
        assert_eq!(err.invalid_bytes(), b"\xC3");
    }

    /// A reader that hands out at most `step` bytes per call and fails once with
    /// `Interrupted` before every successful read.
    struct FlakyReader<'a> {
        data: &'a [u8],
        step: usize,
        interrupt: bool,
    }

    impl io::Read for FlakyReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::ErrorKind::Interrupted.into());
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_read_chunk_source_retries_interrupted() {
        let input = "Grüße, 世界! 😀".as_bytes();
        let reader = FlakyReader {
            data: input,
            step: 3,
            interrupt: false,
        };
        let source = ReadChunkSource::<_, Vec<u8>>::with_capacity(reader, 5);

        let mut output = String::new();
        Utf8Stream::new()
            .decode_from_source(source, |text| -> Result<(), Infallible> {
                output.push_str(text);
                Ok(())
            })
            .unwrap();
        assert_eq!(output, "Grüße, 世界! 😀");
    }

    #[test]
    fn test_read_chunk_source_small_buffer() {
        let input = "a€😀b".as_bytes();
        let mut source = ReadChunkSource::new(io::Cursor::new(input), [0u8; 1]);

        let mut output = String::new();
        Utf8Stream::new()
            .decode_from_source(&mut source, |text| -> Result<(), Infallible> {
                output.push_str(text);
                Ok(())
            })
            .unwrap();
        assert_eq!(output, "a€😀b");
        assert_eq!(source.into_inner().position(), input.len() as u64);
    }

    #[test]
    fn test_read_chunk_source_io_error() {
        struct Broken;
        impl io::Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let source = ReadChunkSource::<_, Vec<u8>>::with_capacity(Broken, 8);
        let result = Utf8Stream::new()
            .decode_from_source(source, |_| -> Result<(), Infallible> { Ok(()) });
        match result {
            Err(DecodeFnError::Src(e)) => assert_eq!(e.to_string(), "disk on fire"),
            _ => panic!("Expected a source error"),
        }
    }

    #[test]
    fn test_read_chunk_source_zero_capacity() {
        let input = "a€😀b".as_bytes();
        let source = ReadChunkSource::<_, Vec<u8>>::with_capacity(io::Cursor::new(input), 0);

        let mut output = String::new();
        Utf8Stream::new()
            .decode_from_source(source, |text| -> Result<(), Infallible> {
                output.push_str(text);
                Ok(())
            })
            .unwrap();
        assert_eq!(output, "a€😀b");
    }

    // Walks every path that emits a trace event, so the events are compiled and run
    // with the feature on.
    #[cfg(feature = "tracing")]
    #[test]
    fn test_trace_events_fire() {
        // Incomplete, then completed, then abandoned boundary sequences.
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"a\xF0\x9F"), Some("a".to_owned()));
        assert_eq!(decoder.write(b"\x98"), None);
        assert_eq!(decoder.write(b"\x80"), Some("😀".to_owned()));
        assert_eq!(decoder.write(b"\xE2\x82"), None);
        assert_eq!(decoder.write(b"x"), Some("\u{FFFD}x".to_owned()));

        // Truncated tail at the end of the stream, under each policy.
        let mut decoder = Utf8Stream::new();
        assert_eq!(decoder.write(b"\xC3"), None);
        assert!(decoder.clone().finish().is_err());
        assert_eq!(decoder.clone().finish_with(TailPolicy::Discard), Ok(None));
        assert_eq!(
            decoder.finish_with(TailPolicy::Replace),
            Ok(Some("\u{FFFD}".to_owned()))
        );
    }
}

//! Lazy, seekable zlib stream reader with compressed-byte accounting.
//!
//! Pack entries and loose objects alike are zlib streams with no recorded
//! length; the only way to know where one ends is to decompress it to
//! completion and ask the decoder how many compressed bytes it consumed.
//! This reader tracks that explicitly so callers that need to advance past
//! an object without caring about its content (sequential pack iteration)
//! can do so without re-opening anything.

use std::io::{self, Read};

use flate2::bufread::ZlibDecoder;

/// Lifecycle of a [`ZlibStreamReader`].
///
/// `Fresh` until the first byte is requested, `Streaming` once decompression
/// is underway, `Drained` once the decoder has reached the end of the zlib
/// stream (including its trailing Adler-32), `Scrubbing` while discarding
/// unread output to force that end to be reached, `Closed` once the caller
/// is done and the reader will not be touched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZlibState {
    Fresh,
    Streaming,
    Scrubbing,
    Drained,
    Closed,
}

/// A bounded, seekable-by-reopen zlib reader over an in-memory compressed
/// buffer, with running compressed/uncompressed byte counters.
pub struct ZlibStreamReader<'a> {
    decoder: ZlibDecoder<&'a [u8]>,
    state: ZlibState,
    bound: Option<u64>,
}

impl<'a> ZlibStreamReader<'a> {
    /// Wrap a compressed buffer with no declared uncompressed-size bound.
    pub fn new(compressed: &'a [u8]) -> Self {
        Self {
            decoder: ZlibDecoder::new(compressed),
            state: ZlibState::Fresh,
            bound: None,
        }
    }

    /// Wrap a compressed buffer, refusing to yield more than
    /// `expected_uncompressed` bytes of content even if the stream has more.
    pub fn bounded(compressed: &'a [u8], expected_uncompressed: u64) -> Self {
        Self {
            decoder: ZlibDecoder::new(compressed),
            state: ZlibState::Fresh,
            bound: Some(expected_uncompressed),
        }
    }

    pub fn state(&self) -> ZlibState {
        self.state
    }

    /// Compressed bytes consumed from the input so far. Authoritative only
    /// once the stream has reached `Drained` — mid-stream it reflects
    /// however far the last `read` call advanced the decoder.
    pub fn compressed_bytes_consumed(&self) -> u64 {
        self.decoder.total_in()
    }

    /// Uncompressed bytes produced so far.
    pub fn uncompressed_bytes_produced(&self) -> u64 {
        self.decoder.total_out()
    }

    /// Read the remaining content into a fresh `Vec`, honoring the bound if
    /// one was set.
    pub fn read_to_end_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Discard any unread output so the decoder reaches the end of the zlib
    /// stream, then report the total compressed bytes the stream occupied.
    ///
    /// Used by sequential pack iteration: the caller may only want an
    /// object's header, but still needs to know where the next object
    /// starts.
    pub fn finish(&mut self) -> io::Result<u64> {
        if self.state != ZlibState::Drained && self.state != ZlibState::Closed {
            self.state = ZlibState::Scrubbing;
            let mut sink = [0u8; 4096];
            loop {
                let n = Read::read(self, &mut sink)?;
                if n == 0 {
                    break;
                }
            }
            self.state = ZlibState::Drained;
        }
        Ok(self.compressed_bytes_consumed())
    }

    pub fn close(&mut self) {
        self.state = ZlibState::Closed;
    }
}

impl<'a> Read for ZlibStreamReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state == ZlibState::Closed {
            return Ok(0);
        }
        if self.state == ZlibState::Fresh {
            self.state = ZlibState::Streaming;
        }

        let max = match self.bound {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.decoder.total_out());
                if remaining == 0 {
                    self.state = ZlibState::Drained;
                    return Ok(0);
                }
                (remaining as usize).min(buf.len())
            }
            None => buf.len(),
        };

        let n = self.decoder.read(&mut buf[..max])?;
        if n == 0 {
            self.state = ZlibState::Drained;
        }
        Ok(n)
    }
}

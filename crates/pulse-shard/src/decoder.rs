//! Compressed frame reassembly
//!
//! The transport delivers one continuous zlib stream split across binary
//! WebSocket frames. A message boundary is signaled by the 4-byte flush
//! marker `00 00 FF FF` at the end of the accumulated buffer; only then can
//! the buffer be run through the shared decompressor.

use crate::error::{ShardError, ShardResult};
use flate2::{Decompress, FlushDecompress};

/// Zlib stream flush marker terminating each complete message
const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Initial capacity for the decompressed output of one frame
const OUTPUT_CHUNK: usize = 16 * 1024;

/// Accumulates fragmented compressed frames into complete JSON messages
///
/// Owned exclusively by one connection attempt; a decompression or UTF-8
/// failure poisons the stream state, so the caller must reconnect with a
/// fresh decoder rather than reuse this one.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    inflater: Decompress,
}

impl FrameDecoder {
    /// Create a decoder with fresh stream state
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            inflater: Decompress::new(true),
        }
    }

    /// Feed one binary chunk from the transport
    ///
    /// Returns the decoded message text once the accumulated buffer ends in
    /// the flush marker, `None` while the message is still incomplete. The
    /// marker check is against the buffer, not the chunk, so a trailer split
    /// across frames still completes.
    pub fn feed(&mut self, chunk: &[u8]) -> ShardResult<Option<String>> {
        self.buffer.extend_from_slice(chunk);

        if !self.buffer.ends_with(&ZLIB_SUFFIX) {
            return Ok(None);
        }

        let decompressed = self.decompress_buffer()?;
        self.buffer.clear();

        let text = String::from_utf8(decompressed).map_err(ShardError::from)?;
        Ok(Some(text))
    }

    /// Bytes currently awaiting a complete frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Run the whole accumulated buffer through the streaming decompressor.
    /// Stream state carries across frames; this is one continuous zlib
    /// stream, not per-message compression.
    fn decompress_buffer(&mut self) -> ShardResult<Vec<u8>> {
        let mut output = Vec::with_capacity(OUTPUT_CHUNK);
        let mut consumed = 0usize;

        loop {
            let in_before = self.inflater.total_in();
            self.inflater
                .decompress_vec(&self.buffer[consumed..], &mut output, FlushDecompress::Sync)?;
            consumed += usize::try_from(self.inflater.total_in() - in_before).unwrap_or(usize::MAX);

            if consumed >= self.buffer.len() && output.len() < output.capacity() {
                break;
            }

            // Output buffer filled up mid-frame; grow and keep draining
            if output.len() == output.capacity() {
                output.reserve(OUTPUT_CHUNK);
            }
        }

        Ok(output)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compress, Compression, FlushCompress};

    /// Streaming zlib compressor mirroring the server side of the transport
    struct StreamCompressor {
        deflater: Compress,
    }

    impl StreamCompressor {
        fn new() -> Self {
            Self {
                deflater: Compress::new(Compression::default(), true),
            }
        }

        /// Compress one message, ending in the sync flush marker
        fn frame(&mut self, text: &str) -> Vec<u8> {
            let mut out = Vec::with_capacity(text.len() + 64);
            self.deflater
                .compress_vec(text.as_bytes(), &mut out, FlushCompress::Sync)
                .unwrap();
            assert!(out.ends_with(&ZLIB_SUFFIX));
            out
        }
    }

    #[test]
    fn test_single_complete_frame() {
        let mut compressor = StreamCompressor::new();
        let mut decoder = FrameDecoder::new();

        let frame = compressor.frame(r#"{"op":10}"#);
        let decoded = decoder.feed(&frame).unwrap();
        assert_eq!(decoded.as_deref(), Some(r#"{"op":10}"#));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_fragmented_frame() {
        let mut compressor = StreamCompressor::new();
        let mut decoder = FrameDecoder::new();

        let frame = compressor.frame(r#"{"op":11,"d":null}"#);
        let (head, tail) = frame.split_at(frame.len() / 2);

        assert_eq!(decoder.feed(head).unwrap(), None);
        assert!(decoder.pending() > 0);
        let decoded = decoder.feed(tail).unwrap();
        assert_eq!(decoded.as_deref(), Some(r#"{"op":11,"d":null}"#));
    }

    #[test]
    fn test_trailer_split_across_chunks() {
        let mut compressor = StreamCompressor::new();
        let mut decoder = FrameDecoder::new();

        // Deliver everything except the final trailer byte, then the byte
        // alone: completion must trigger on the buffer, not the chunk
        let frame = compressor.frame(r#"{"op":1,"d":42}"#);
        let (head, tail) = frame.split_at(frame.len() - 1);
        assert_eq!(tail.len(), 1);

        assert_eq!(decoder.feed(head).unwrap(), None);
        let decoded = decoder.feed(tail).unwrap();
        assert_eq!(decoded.as_deref(), Some(r#"{"op":1,"d":42}"#));
    }

    #[test]
    fn test_stream_state_carries_across_messages() {
        let mut compressor = StreamCompressor::new();
        let mut decoder = FrameDecoder::new();

        // Later frames reference the shared dictionary built by earlier
        // ones; decoding out of a fresh decompressor would fail
        let messages = [
            r#"{"op":0,"t":"MESSAGE_CREATE","s":1,"d":{"content":"hello"}}"#,
            r#"{"op":0,"t":"MESSAGE_CREATE","s":2,"d":{"content":"hello again"}}"#,
            r#"{"op":0,"t":"MESSAGE_CREATE","s":3,"d":{"content":"hello once more"}}"#,
        ];

        for message in messages {
            let frame = compressor.frame(message);
            let decoded = decoder.feed(&frame).unwrap();
            assert_eq!(decoded.as_deref(), Some(message));
        }
    }

    #[test]
    fn test_arbitrary_chunk_boundaries() {
        let mut compressor = StreamCompressor::new();
        let mut decoder = FrameDecoder::new();

        let messages = [r#"{"op":10,"d":{"heartbeat_interval":41250}}"#, r#"{"op":11}"#];
        let stream: Vec<u8> = messages
            .iter()
            .flat_map(|m| compressor.frame(m))
            .collect();

        // One byte at a time: exactly one decoded message per frame, in order
        let mut decoded = Vec::new();
        for byte in stream {
            if let Some(text) = decoder.feed(&[byte]).unwrap() {
                decoded.push(text);
            }
        }
        assert_eq!(decoded, messages);
    }

    #[test]
    fn test_large_frame_grows_output() {
        let mut compressor = StreamCompressor::new();
        let mut decoder = FrameDecoder::new();

        // Highly compressible payload far larger than the initial output
        // capacity
        let big = format!(r#"{{"op":0,"d":"{}"}}"#, "x".repeat(OUTPUT_CHUNK * 4));
        let frame = compressor.frame(&big);
        let decoded = decoder.feed(&frame).unwrap().unwrap();
        assert_eq!(decoded, big);
    }

    #[test]
    fn test_corrupt_stream_is_fatal() {
        let mut decoder = FrameDecoder::new();

        // Garbage that happens to end in the flush marker
        let mut garbage = vec![0xDE, 0xAD, 0xBE, 0xEF];
        garbage.extend_from_slice(&ZLIB_SUFFIX);

        assert!(decoder.feed(&garbage).is_err());
    }
}

//! Binary data frame reader
//!
//! Every frame in a binary .DAT file has the same length:
//!
//! ```text
//! u32 sample number | u32 timestamp | i16 x Na analog | u16 x Nw status words
//! ```
//!
//! all little-endian. The reader keeps a single frame buffer and hands out
//! one [`RawFrame`] at a time.

use crate::types::{ComtradeError, RawFrame, RecordSchema, Result, FRAME_HEADER_LEN};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{ErrorKind, Read};
use tracing::trace;

// ============================================================================
// Frame Layout
// ============================================================================

/// Shape of one binary frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub analog: usize,
    pub status_words: usize,
}

impl FrameLayout {
    pub fn from_schema(schema: &RecordSchema) -> Self {
        Self {
            analog: schema.analog_count(),
            status_words: schema.status_words(),
        }
    }

    /// Frame length in bytes
    #[inline]
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + 2 * self.analog + 2 * self.status_words
    }

    /// Decode one complete frame. `bytes` must be exactly `frame_len()` long.
    pub fn decode(&self, mut bytes: &[u8]) -> Result<RawFrame> {
        let sample = bytes.read_u32::<LittleEndian>()?;
        let timestamp = bytes.read_u32::<LittleEndian>()?;

        let mut analog = vec![0i16; self.analog];
        bytes.read_i16_into::<LittleEndian>(&mut analog)?;

        let mut status = vec![0u16; self.status_words];
        bytes.read_u16_into::<LittleEndian>(&mut status)?;

        Ok(RawFrame {
            sample,
            timestamp,
            analog,
            status,
        })
    }
}

// ============================================================================
// Frame Reader
// ============================================================================

/// Lazy reader producing exactly `sample_count` frames from a byte stream.
///
/// A short stream ends the sequence with [`ComtradeError::TruncatedFrame`];
/// the reader yields nothing after an error. Bytes following the last
/// declared frame are never read.
pub struct FrameDecoder<R> {
    reader: R,
    layout: FrameLayout,
    sample_count: usize,
    produced: usize,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: Read> FrameDecoder<R> {
    pub fn new(reader: R, schema: &RecordSchema) -> Self {
        Self::with_layout(reader, FrameLayout::from_schema(schema), schema.sample_count())
    }

    pub fn with_layout(reader: R, layout: FrameLayout, sample_count: usize) -> Self {
        Self {
            reader,
            layout,
            sample_count,
            produced: 0,
            buf: vec![0u8; layout.frame_len()],
            finished: sample_count == 0,
        }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Number of frames produced so far
    #[inline]
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Read the next frame, `Ok(None)` once all declared frames are read
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let received = match fill_buf(&mut self.reader, &mut self.buf) {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Err(e.into());
            }
        };
        if received < self.buf.len() {
            self.finished = true;
            return Err(ComtradeError::TruncatedFrame {
                frame: self.produced,
                expected: self.buf.len(),
                received,
            });
        }

        let frame = self.layout.decode(&self.buf)?;
        trace!(
            frame = self.produced,
            sample = frame.sample,
            timestamp = frame.timestamp,
            "Frame read"
        );

        self.produced += 1;
        if self.produced == self.sample_count {
            self.finished = true;
        }
        Ok(Some(frame))
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn fill_buf<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ============================================================================
// Iterator Implementation
// ============================================================================

impl<R: Read> Iterator for FrameDecoder<R> {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.sample_count - self.produced))
        }
    }
}

impl<R: Read> std::iter::FusedIterator for FrameDecoder<R> {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: FrameLayout = FrameLayout {
        analog: 2,
        status_words: 1,
    };

    fn frame_bytes(sample: u32, ts: u32, analog: &[i16], status: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&sample.to_le_bytes());
        out.extend_from_slice(&ts.to_le_bytes());
        for v in analog {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for w in status {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(LAYOUT.frame_len(), 14);
        let empty = FrameLayout {
            analog: 0,
            status_words: 0,
        };
        assert_eq!(empty.frame_len(), 8);
    }

    #[test]
    fn test_decode_little_endian() {
        let bytes = frame_bytes(7, 1250, &[-2, 300], &[0x8001]);
        let frame = LAYOUT.decode(&bytes).unwrap();
        assert_eq!(frame.sample, 7);
        assert_eq!(frame.timestamp, 1250);
        assert_eq!(frame.analog, vec![-2, 300]);
        assert_eq!(frame.status, vec![0x8001]);
    }

    #[test]
    fn test_reads_declared_frames_only() {
        let mut data = Vec::new();
        for i in 0..3u32 {
            data.extend(frame_bytes(i + 1, i * 100, &[i as i16, -(i as i16)], &[0]));
        }
        // Trailing garbage is ignored
        data.extend_from_slice(&[0xAA; 5]);

        let reader = FrameDecoder::with_layout(data.as_slice(), LAYOUT, 3);
        let frames: Vec<_> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.windows(2).all(|w| w[0].sample < w[1].sample));
        assert_eq!(frames[2].analog, vec![2, -2]);
    }

    #[test]
    fn test_truncated_stream() {
        let mut data = frame_bytes(1, 0, &[1, 2], &[0]);
        data.extend_from_slice(&frame_bytes(2, 0, &[1, 2], &[0])[..9]);

        let mut reader = FrameDecoder::with_layout(data.as_slice(), LAYOUT, 2);
        assert!(reader.next().unwrap().is_ok());
        match reader.next() {
            Some(Err(ComtradeError::TruncatedFrame {
                frame,
                expected,
                received,
            })) => {
                assert_eq!(frame, 1);
                assert_eq!(expected, 14);
                assert_eq!(received, 9);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_empty_stream_with_frames_declared() {
        let mut reader = FrameDecoder::with_layout(std::io::empty(), LAYOUT, 1);
        assert!(matches!(
            reader.next(),
            Some(Err(ComtradeError::TruncatedFrame { received: 0, .. }))
        ));
    }

    #[test]
    fn test_zero_samples() {
        let mut reader = FrameDecoder::with_layout(std::io::empty(), LAYOUT, 0);
        assert!(reader.next().is_none());
    }

    /// Reader returning one byte per call
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn test_short_reads_are_accumulated() {
        let data = frame_bytes(1, 42, &[5, 6], &[3]);
        let mut reader = FrameDecoder::with_layout(Trickle(&data), LAYOUT, 1);
        let frame = reader.next().unwrap().unwrap();
        assert_eq!(frame.timestamp, 42);
        assert_eq!(frame.analog, vec![5, 6]);
    }
}

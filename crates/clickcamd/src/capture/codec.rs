//! MJPEG stream framing.
//!
//! The capture program writes back-to-back JPEG images to stdout with no
//! container. Each image starts with the SOI marker `FF D8` and ends with
//! the EOI marker `FF D9`; anything between an EOI and the next SOI is
//! discarded.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use clickcam_core::FrameBuffer;

use super::CaptureError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Splits a raw MJPEG byte stream into complete JPEG frames.
#[derive(Debug)]
pub struct MjpegFrameCodec {
    max_frame_bytes: usize,
    /// Offset into the buffer where the EOI search resumes.
    scan_from: usize,
    in_frame: bool,
}

impl MjpegFrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            scan_from: 0,
            in_frame: false,
        }
    }

    fn reset(&mut self) {
        self.scan_from = 0;
        self.in_frame = false;
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

impl Decoder for MjpegFrameCodec {
    type Item = FrameBuffer;
    type Error = CaptureError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FrameBuffer>, CaptureError> {
        loop {
            if !self.in_frame {
                match find_marker(&src[..], SOI) {
                    Some(start) => {
                        src.advance(start);
                        self.in_frame = true;
                        self.scan_from = SOI.len();
                    }
                    None => {
                        // Keep a trailing 0xFF, it may be the first half of an SOI
                        let keep = usize::from(src.last() == Some(&0xFF));
                        src.advance(src.len() - keep);
                        return Ok(None);
                    }
                }
            }

            let tail = src.get(self.scan_from..).unwrap_or_default();
            if let Some(pos) = find_marker(tail, EOI) {
                let end = self.scan_from + pos + EOI.len();
                self.reset();
                return Ok(Some(FrameBuffer::new(src.split_to(end).freeze())));
            }

            if src.len() > self.max_frame_bytes {
                warn!(
                    buffered = src.len(),
                    max = self.max_frame_bytes,
                    "Discarding oversized frame"
                );
                // Skip past this SOI and hunt for the next one
                src.advance(SOI.len());
                self.reset();
                continue;
            }

            // The last byte may be the 0xFF of a split EOI
            self.scan_from = src.len().saturating_sub(1).max(SOI.len());
            return Ok(None);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<FrameBuffer>, CaptureError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // A partial frame at end of stream is unusable
                src.clear();
                self.reset();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut frame = SOI.to_vec();
        frame.extend_from_slice(body);
        frame.extend_from_slice(&EOI);
        frame
    }

    #[test]
    fn test_decode_single_frame() {
        let mut codec = MjpegFrameCodec::new(1024);
        let mut buf = BytesMut::from(&jpeg(b"abc")[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &jpeg(b"abc")[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_skips_garbage_between_frames() {
        let mut codec = MjpegFrameCodec::new(1024);
        let mut data = b"junk".to_vec();
        data.extend(jpeg(b"one"));
        data.extend_from_slice(b"\x00\x01");
        data.extend(jpeg(b"two"));
        let mut buf = BytesMut::from(&data[..]);

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.as_bytes(), &jpeg(b"one")[..]);
        assert_eq!(second.as_bytes(), &jpeg(b"two")[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_frame_split_across_reads() {
        let mut codec = MjpegFrameCodec::new(1024);
        let data = jpeg(b"hello");
        let (head, rest) = data.split_at(4);
        // Split the EOI marker itself
        let (middle, tail) = rest.split_at(rest.len() - 1);

        let mut buf = BytesMut::from(head);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(middle);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(tail);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &data[..]);
    }

    #[test]
    fn test_decode_split_soi_marker() {
        let mut codec = MjpegFrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"xx\xFF"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], &[0xFF]);

        buf.extend_from_slice(&jpeg(b"z")[1..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &jpeg(b"z")[..]);
    }

    #[test]
    fn test_oversized_frame_discarded() {
        let mut codec = MjpegFrameCodec::new(16);
        let mut data = SOI.to_vec();
        data.extend(std::iter::repeat(0x11).take(32));
        let mut buf = BytesMut::from(&data[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend(jpeg(b"ok"));
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &jpeg(b"ok")[..]);
    }

    #[test]
    fn test_decode_eof_drops_partial_frame() {
        let mut codec = MjpegFrameCodec::new(1024);
        let mut buf = BytesMut::from(&jpeg(b"cut")[..5]);

        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}

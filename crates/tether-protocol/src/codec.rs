//! Tokio codec for newline-delimited protocol lines

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Maximum length of a single line, including the terminating newline.
///
/// Shell output relayed through a pair can be large, but a single line past
/// this cap indicates a broken or hostile peer.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Codec for encoding/decoding newline-delimited UTF-8 lines.
///
/// Decoded items have the trailing `\n` (and `\r`, if present) stripped.
/// Encoding appends a single `\n`.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Offset scanned so far while waiting for a newline
    scanned: usize,
}

impl LineCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self { scanned: 0 }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(pos) = src[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + pos;
            let mut line = src.split_to(end + 1);
            self.scanned = 0;

            // Drop the delimiter, tolerating CRLF
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            let text = String::from_utf8(line.to_vec())?;
            return Ok(Some(text));
        }

        if src.len() > MAX_LINE_LENGTH {
            return Err(ProtocolError::LineTooLong {
                len: src.len(),
                max: MAX_LINE_LENGTH,
            });
        }

        // Resume scanning where we left off
        self.scanned = src.len();
        Ok(None)
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if line.len() + 1 > MAX_LINE_LENGTH {
            return Err(ProtocolError::LineTooLong {
                len: line.len() + 1,
                max: MAX_LINE_LENGTH,
            });
        }

        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("reg bob@host1".to_string(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, "reg bob@host1");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"ping"[..]);

        // No newline yet
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\npo");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "ping");

        // Second line still incomplete
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"ng\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "pong");
    }

    #[test]
    fn test_codec_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"exit\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "exit");
    }

    #[test]
    fn test_codec_multiple_lines_one_buffer() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"ls\nuse 0\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "ls");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "use 0");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_line_too_long() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_LENGTH + 1].as_slice());

        match codec.decode(&mut buf) {
            Err(ProtocolError::LineTooLong { max, .. }) => {
                assert_eq!(max, MAX_LINE_LENGTH);
            }
            other => panic!("Expected LineTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_codec_empty_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "");
    }
}

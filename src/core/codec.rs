//! Tokio codec for the length-prefixed wire format.
//!
//! ```text
//! b"5\0hello"   -> frame "hello"
//! b"0\0"        -> empty frame, read by the connection as "no frame"
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{constants, ProtocolError};

/// Byte separating the decimal length from the payload
pub const FRAME_DELIMITER: u8 = 0x00;

/// Longest accepted length prefix (`u64::MAX` has 20 digits)
pub const MAX_PREFIX_DIGITS: usize = 20;

/// Frame codec for `[length ASCII][NUL][payload]`.
///
/// The decoder remembers a parsed length across calls so a payload may arrive
/// in any number of short reads.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    pending: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_PAYLOAD_SIZE,
            pending: None,
        }
    }

    /// Create a codec with a custom max frame size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn parse_prefix(&self, digits: &[u8]) -> Result<usize, ProtocolError> {
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(ProtocolError::InvalidHeader(
                constants::ERR_INVALID_LENGTH_PREFIX.into(),
            ));
        }

        // At most 20 ASCII digits, so this only fails on overflow.
        let len = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(ProtocolError::OversizedPacket(usize::MAX))?;

        let len = usize::try_from(len).map_err(|_| ProtocolError::OversizedPacket(usize::MAX))?;
        if len > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(len));
        }
        Ok(len)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                let window = src.len().min(MAX_PREFIX_DIGITS + 1);
                let Some(pos) = src[..window].iter().position(|b| *b == FRAME_DELIMITER) else {
                    if src.len() > MAX_PREFIX_DIGITS || !src.iter().all(u8::is_ascii_digit) {
                        return Err(ProtocolError::InvalidHeader(
                            constants::ERR_INVALID_LENGTH_PREFIX.into(),
                        ));
                    }
                    return Ok(None);
                };

                let len = self.parse_prefix(&src[..pos])?;
                src.advance(pos + 1);
                self.pending = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        self.pending = None;
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if self.pending.is_some() {
            return Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                constants::ERR_TRUNCATED_FRAME,
            )));
        }

        // A partial length prefix at EOF is an orderly close, not a frame.
        src.clear();
        Ok(None)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(item.len()));
        }

        let prefix = item.len().to_string();
        dst.reserve(prefix.len() + 1 + item.len());
        dst.put_slice(prefix.as_bytes());
        dst.put_u8(FRAME_DELIMITER);
        dst.put(item);
        Ok(())
    }
}

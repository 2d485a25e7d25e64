//! Frame header codec shared by both ends of every connection.

use thiserror::Error;

use crate::messages::{payload_size_for_type, MessageType, MAX_PAYLOAD_SIZE};

/// `type:u8` + `size:u16` big-endian.
pub const FRAME_HEADER_SIZE: usize = 3;
pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_PAYLOAD_SIZE;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("payload size {got} disagrees with declared size {expected} for type {message_type:?}")]
    SizeMismatch { message_type: MessageType, got: u16, expected: u16 },
    #[error("payload size {0} exceeds MAX_PAYLOAD_SIZE")]
    Oversize(u16),
}

#[inline]
fn read_u16_be(src: &[u8]) -> u16 {
    u16::from_be_bytes([src[0], src[1]])
}

/// Append one complete frame to `out`.
pub fn encode_frame(out: &mut Vec<u8>, message_type: MessageType, payload: &[u8]) {
    debug_assert_eq!(payload.len(), payload_size_for_type(message_type));
    out.push(message_type.to_wire());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Try to split one frame off the front of `buf`.
///
/// Returns `Ok(None)` when the buffer holds only a partial frame, otherwise
/// the parsed type, a borrow of the payload bytes, and the total number of
/// bytes consumed. Errors are protocol violations: the caller is expected to
/// drop the connection.
pub fn split_frame(buf: &[u8]) -> Result<Option<(MessageType, &[u8], usize)>, FrameError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let type_byte = buf[0];
    let payload_size = read_u16_be(&buf[1..3]);

    if payload_size as usize > MAX_PAYLOAD_SIZE {
        return Err(FrameError::Oversize(payload_size));
    }
    let message_type =
        MessageType::from_wire(type_byte).ok_or(FrameError::UnknownType(type_byte))?;
    let expected = payload_size_for_type(message_type) as u16;
    if payload_size != expected {
        return Err(FrameError::SizeMismatch { message_type, got: payload_size, expected });
    }

    let frame_size = FRAME_HEADER_SIZE + payload_size as usize;
    if buf.len() < frame_size {
        return Ok(None);
    }
    Ok(Some((message_type, &buf[FRAME_HEADER_SIZE..frame_size], frame_size)))
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Length-prefixed CBOR framing.
//!
//! Frame layout: `LENGTH(4, big-endian) || CBOR body`. One message per
//! frame; a malformed frame poisons the stream and the reader drops the
//! connection rather than resynchronize.

use std::io::Read;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Upper bound on a frame body. Scene creations carry whole subtrees with
/// raw vertex buffers, so the cap is generous.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Codec and transport errors.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// CBOR serialization failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// CBOR deserialization failed.
    #[error("decode error: {0}")]
    Decode(String),
    /// Frame length exceeds [`MAX_FRAME_LEN`].
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    /// Underlying stream failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a message into a full frame (length prefix + CBOR body).
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtoError> {
    let mut body = Vec::new();
    ciborium::ser::into_writer(msg, &mut body).map_err(|e| ProtoError::Encode(e.to_string()))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge(body.len()));
    }
    let len = u32::try_from(body.len()).map_err(|_| ProtoError::FrameTooLarge(body.len()))?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a frame body (the bytes after the length prefix).
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtoError> {
    ciborium::de::from_reader(body).map_err(|e| ProtoError::Decode(e.to_string()))
}

/// Read one framed message from a blocking stream.
///
/// Returns `Ok(None)` on clean EOF before any prefix byte; a stream that
/// dies mid-frame is an error.
pub fn read_message<T: DeserializeOwned, R: Read>(r: &mut R) -> Result<Option<T>, ProtoError> {
    let mut prefix = [0u8; 4];
    let mut read = 0usize;
    while read < prefix.len() {
        let n = r.read(&mut prefix[read..])?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(ProtoError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated frame prefix",
            )));
        }
        read += n;
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    decode_body(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientMessage, InvocationRequest};
    use std::io::Cursor;

    #[test]
    fn read_message_roundtrip_and_clean_eof() {
        let msg = ClientMessage::Invoke(InvocationRequest {
            channel: 1,
            target: 0,
            ..InvocationRequest::default()
        });
        let frame = encode(&msg).expect("encode");
        let mut cursor = Cursor::new(frame);
        let back: Option<ClientMessage> = read_message(&mut cursor).expect("read");
        assert_eq!(back, Some(msg));
        let eof: Option<ClientMessage> = read_message(&mut cursor).expect("eof");
        assert!(eof.is_none());
    }

    #[test]
    fn oversize_prefix_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&u32::MAX.to_be_bytes());
        frame.extend_from_slice(&[0u8; 8]);
        let mut cursor = Cursor::new(frame);
        let err = read_message::<ClientMessage, _>(&mut cursor).expect_err("too large");
        assert!(matches!(err, ProtoError::FrameTooLarge(_)));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let msg = ClientMessage::Invoke(InvocationRequest::default());
        let mut frame = encode(&msg).expect("encode");
        frame.truncate(frame.len() - 1);
        let mut cursor = Cursor::new(frame);
        let err = read_message::<ClientMessage, _>(&mut cursor).expect_err("truncated");
        assert!(matches!(err, ProtoError::Io(_)));
    }
}

//! Server-side WebSocket framing (RFC 6455) and the upgrade accept
//! key.

use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Fixed GUID appended to the client key when computing the accept
/// value (RFC 6455 §4.2.2).
const ACCEPT_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Control-frame payloads are capped at 125 bytes by the RFC.
const MAX_CONTROL_PAYLOAD: usize = 125;

pub fn accept_key(client_key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(client_key.as_bytes());
    sha1.update(ACCEPT_GUID);
    base64::engine::general_purpose::STANDARD.encode(sha1.finalize())
}

/// Builds the `101 Switching Protocols` response for an upgrade.
pub fn upgrade_response(client_key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(client_key)
    )
    .into_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xa => Some(Self::Pong),
            _ => None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xa,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("client frame is not masked")]
    Unmasked,
    #[error("reserved opcode {0}")]
    ReservedOpcode(u8),
    #[error("fragmented control frame")]
    FragmentedControl,
    #[error("oversized control frame")]
    OversizedControl,
    #[error("frame too large")]
    TooLarge,
}

/// Maximum accepted payload for a single frame.
pub const MAX_FRAME_PAYLOAD: usize = 10 * 1024 * 1024;

/// Decodes one client frame from `data`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame
/// and the number of bytes consumed. Client frames must be masked.
pub fn decode_frame(data: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    if data.len() < 2 {
        return Ok(None);
    }
    let fin = data[0] & 0x80 != 0;
    let opcode_bits = data[0] & 0x0f;
    let opcode = Opcode::from_bits(opcode_bits).ok_or(FrameError::ReservedOpcode(opcode_bits))?;
    let masked = data[1] & 0x80 != 0;
    if !masked {
        return Err(FrameError::Unmasked);
    }
    let length_bits = (data[1] & 0x7f) as usize;

    let mut offset = 2;
    let payload_length = match length_bits {
        126 => {
            if data.len() < offset + 2 {
                return Ok(None);
            }
            let length = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
            offset += 2;
            length
        }
        127 => {
            if data.len() < offset + 8 {
                return Ok(None);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[offset..offset + 8]);
            offset += 8;
            usize::try_from(u64::from_be_bytes(bytes)).map_err(|_| FrameError::TooLarge)?
        }
        length => length,
    };

    if opcode.is_control() {
        if !fin {
            return Err(FrameError::FragmentedControl);
        }
        if payload_length > MAX_CONTROL_PAYLOAD {
            return Err(FrameError::OversizedControl);
        }
    }
    if payload_length > MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLarge);
    }

    if data.len() < offset + 4 + payload_length {
        return Ok(None);
    }
    let mask: [u8; 4] = data[offset..offset + 4].try_into().expect("4 mask bytes");
    offset += 4;

    let payload = data[offset..offset + payload_length]
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ mask[i % 4])
        .collect();
    Ok(Some((
        Frame {
            fin,
            opcode,
            payload,
        },
        offset + payload_length,
    )))
}

/// Encodes a server frame (unmasked, fin set).
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(0x80 | opcode.bits());
    if payload.len() < 126 {
        out.push(payload.len() as u8);
    } else if payload.len() <= usize::from(u16::MAX) {
        out.push(126);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

/// Encodes a text frame.
pub fn text_frame(text: &str) -> Vec<u8> {
    encode_frame(Opcode::Text, text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masked_frame(first: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        let mut out = vec![first];
        assert!(payload.len() < 126);
        out.push(0x80 | payload.len() as u8);
        out.extend_from_slice(&mask);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        out
    }

    #[test]
    fn accept_key_matches_known_vector() {
        assert_eq!(
            accept_key("dbKbsCX3CxFBmQo09ah1OQ=="),
            "Z5uTZwvwYNDm9w4HFGk26ijp/p0="
        );
    }

    #[test]
    fn rfc_sample_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn upgrade_response_has_required_headers() {
        let text = String::from_utf8(upgrade_response("dbKbsCX3CxFBmQo09ah1OQ==")).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: Z5uTZwvwYNDm9w4HFGk26ijp/p0=\r\n"));
    }

    #[test]
    fn masked_text_frame_round_trips() {
        let bytes = masked_frame(0x81, b"hello", [1, 2, 3, 4]);
        let (frame, consumed) = decode_frame(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"hello");
    }

    #[test]
    fn unmasked_client_frame_is_rejected() {
        let bytes = [0x81u8, 0x05, b'h', b'e', b'l', b'l', b'o'];
        assert_eq!(decode_frame(&bytes), Err(FrameError::Unmasked));
    }

    #[test]
    fn fragmented_control_frame_is_rejected() {
        // ping without fin
        let bytes = masked_frame(0x09, b"x", [0, 0, 0, 0]);
        assert_eq!(decode_frame(&bytes), Err(FrameError::FragmentedControl));
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let bytes = masked_frame(0x81, b"hello", [9, 9, 9, 9]);
        assert_eq!(decode_frame(&bytes[..3]).unwrap(), None);
        assert_eq!(decode_frame(&bytes[..bytes.len() - 1]).unwrap(), None);
    }

    #[test]
    fn extended_16_bit_length_decodes() {
        let payload = vec![0x42u8; 300];
        let mask = [5, 6, 7, 8];
        let mut bytes = vec![0x82u8, 0x80 | 126, 0x01, 0x2c];
        bytes.extend_from_slice(&mask);
        bytes.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        let (frame, consumed) = decode_frame(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.opcode, Opcode::Binary);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn encode_produces_unmasked_server_frames() {
        let bytes = text_frame("ok");
        assert_eq!(bytes, vec![0x81, 0x02, b'o', b'k']);
        let long = encode_frame(Opcode::Binary, &vec![0u8; 200]);
        assert_eq!(long[0], 0x82);
        assert_eq!(long[1], 126);
        assert_eq!(u16::from_be_bytes([long[2], long[3]]), 200);
    }

    #[test]
    fn reserved_opcode_is_rejected() {
        let bytes = masked_frame(0x83, b"", [0, 0, 0, 0]);
        assert_eq!(decode_frame(&bytes), Err(FrameError::ReservedOpcode(3)));
    }
}

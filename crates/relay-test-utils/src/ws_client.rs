//! Minimal WebSocket client: upgrade handshake, masked frame encode,
//! server frame decode.

use std::net::SocketAddr;

use base64::Engine;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const ACCEPT_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub struct WsClient {
    stream: TcpStream,
    buffer: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ServerFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Vec<u8>),
}

impl WsClient {
    /// Connects and performs the upgrade handshake on `path`,
    /// verifying the accept key.
    pub async fn connect(addr: SocketAddr, path: &str, extra_headers: &[(&str, &str)]) -> Self {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let mut key_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);

        let mut request = format!(
            "GET {path} HTTP/1.1\r\nHost: test\r\nUpgrade: websocket\r\n\
             Connection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {key}\r\n"
        );
        for (name, value) in extra_headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");
        stream.write_all(request.as_bytes()).await.expect("send upgrade");

        // read the 101 response head
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            let n = stream.read(&mut chunk).await.expect("read upgrade response");
            assert!(n > 0, "connection closed during upgrade");
            data.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
        assert!(
            head.starts_with("HTTP/1.1 101"),
            "upgrade refused: {head}"
        );
        let mut sha1 = Sha1::new();
        sha1.update(key.as_bytes());
        sha1.update(ACCEPT_GUID);
        let expected = base64::engine::general_purpose::STANDARD.encode(sha1.finalize());
        assert!(
            head.contains(&format!("Sec-WebSocket-Accept: {expected}")),
            "bad accept key in: {head}"
        );

        let buffer = data[head_end + 4..].to_vec();
        Self { stream, buffer }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send_frame(0x1, text.as_bytes()).await;
    }

    pub async fn send_ping(&mut self, payload: &[u8]) {
        self.send_frame(0x9, payload).await;
    }

    pub async fn send_close(&mut self) {
        self.send_frame(0x8, &[]).await;
    }

    /// Sends a raw (possibly invalid) pre-built frame.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("send raw");
    }

    async fn send_frame(&mut self, opcode: u8, payload: &[u8]) {
        let mut frame = vec![0x80 | opcode];
        if payload.len() < 126 {
            frame.push(0x80 | payload.len() as u8);
        } else {
            assert!(payload.len() <= usize::from(u16::MAX));
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        let mut mask = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut mask);
        frame.extend_from_slice(&mask);
        frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        self.stream.write_all(&frame).await.expect("send frame");
    }

    /// Receives the next server frame.
    pub async fn recv_frame(&mut self) -> ServerFrame {
        loop {
            if let Some((frame, consumed)) = Self::try_decode(&self.buffer) {
                self.buffer.drain(..consumed);
                return frame;
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.expect("read frame");
            assert!(n > 0, "connection closed while waiting for a frame");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Receives the next text frame, skipping control frames.
    pub async fn recv_text(&mut self) -> String {
        loop {
            match self.recv_frame().await {
                ServerFrame::Text(text) => return text,
                ServerFrame::Close(_) => panic!("server closed while waiting for text"),
                _ => {}
            }
        }
    }

    /// Receives the next text frame and parses it as JSON.
    pub async fn recv_json(&mut self) -> serde_json::Value {
        serde_json::from_str(&self.recv_text().await).expect("valid JSON frame")
    }

    fn try_decode(data: &[u8]) -> Option<(ServerFrame, usize)> {
        if data.len() < 2 {
            return None;
        }
        let opcode = data[0] & 0x0f;
        assert_eq!(data[1] & 0x80, 0, "server frames must be unmasked");
        let mut offset = 2;
        let length = match (data[1] & 0x7f) as usize {
            126 => {
                if data.len() < 4 {
                    return None;
                }
                offset = 4;
                u16::from_be_bytes([data[2], data[3]]) as usize
            }
            127 => {
                if data.len() < 10 {
                    return None;
                }
                offset = 10;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&data[2..10]);
                usize::try_from(u64::from_be_bytes(bytes)).ok()?
            }
            length => length,
        };
        if data.len() < offset + length {
            return None;
        }
        let payload = data[offset..offset + length].to_vec();
        let frame = match opcode {
            0x1 => ServerFrame::Text(String::from_utf8_lossy(&payload).into_owned()),
            0x2 => ServerFrame::Binary(payload),
            0x8 => ServerFrame::Close(payload),
            0x9 => ServerFrame::Ping(payload),
            0xa => ServerFrame::Pong(payload),
            other => panic!("unexpected server opcode {other}"),
        };
        Some((frame, offset + length))
    }
}

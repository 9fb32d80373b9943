//! Per-connection state machine and I/O loop.
//!
//! One task owns the read half and runs the protocol; a writer task
//! drains the send queue so slow peers never block the reader. Every
//! status transition emits `client_state_changed` on the host bus.

use std::collections::HashSet;
use std::time::Instant;

use relay_protocol::ColorMode;
use relay_text::DynBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relay_core::{Signal, SignalData};

use crate::api;
use crate::http::{HttpRequest, ParseOutcome, MAX_REQUEST_SIZE};
use crate::state::ServerState;
use crate::websocket::{self, Frame, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connecting,
    Authenticating,
    Connected,
    AuthFailed,
    Disconnected,
}

impl ClientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::AuthFailed => "auth_failed",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn has_ended(self) -> bool {
        matches!(self, Self::AuthFailed | Self::Disconnected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsStatus {
    NotUsed,
    Ready,
}

/// Everything one connection carries between messages.
pub struct ClientSession {
    pub id: i64,
    pub state: ServerState,
    pub desc: String,
    pub status: ClientStatus,
    pub websocket: WsStatus,
    pub sync_enabled: bool,
    pub sync_nicks: bool,
    pub sync_input: bool,
    pub sync_colors: ColorMode,
    /// Buffers between `buffer_closing` and `buffer_closed`, so the id
    /// can still be reported once the buffer is gone.
    pub closing_buffers: HashSet<i64>,
    /// Request currently being answered (WebSocket envelopes echo it).
    pub current_request: Option<HttpRequest>,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
    pub last_activity: Instant,
    /// Close the connection once queued bytes are flushed.
    pub close_after_flush: bool,
}

impl ClientSession {
    fn new(
        id: i64,
        state: ServerState,
        desc: String,
        outbox: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            state,
            desc,
            status: ClientStatus::Connecting,
            websocket: WsStatus::NotUsed,
            sync_enabled: false,
            sync_nicks: true,
            sync_input: true,
            sync_colors: ColorMode::Ansi,
            closing_buffers: HashSet::new(),
            current_request: None,
            outbox,
            bytes_recv: 0,
            bytes_sent: 0,
            last_activity: Instant::now(),
            close_after_flush: false,
        }
    }

    /// Queues bytes on the send queue; the writer flushes them as the
    /// socket allows.
    pub fn queue(&mut self, bytes: Vec<u8>) {
        self.bytes_sent += bytes.len() as u64;
        let _ = self.outbox.send(bytes);
    }

    pub fn set_status(&mut self, status: ClientStatus) {
        self.status = status;
        debug!(client = %self.desc, status = status.as_str(), "client status");
        self.state.record_client_status(self.id, status.as_str());
        self.state.host.signal_send(Signal {
            name: "client_state_changed".to_owned(),
            data: SignalData::Client {
                client_id: self.id,
                status: status.as_str().to_owned(),
            },
        });
    }
}

enum InputError {
    Protocol,
}

/// Runs one client connection to completion.
pub async fn handle_client<S>(stream: S, state: ServerState, desc: String)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    // writer: drains the send queue, then shuts the socket down. Runs
    // until the session drops its sender, so queued bytes still flush
    // on close.
    let writer = tokio::spawn(async move {
        while let Some(chunk) = outbox_rx.recv().await {
            if write_half.write_all(&chunk).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let client_id = state.host.next_id();
    let mut session = ClientSession::new(client_id, state.clone(), desc, outbox);
    info!(client = %session.desc, id = client_id, "client connected");
    session.set_status(ClientStatus::Connecting);
    // transport is ready as soon as the stream reaches us (TLS, when
    // used, was completed by the acceptor)
    session.set_status(ClientStatus::Authenticating);

    let mut signal_rx = state.host.signals().subscribe();
    let mut input = DynBuf::new();
    let mut fragment: Option<(Opcode, Vec<u8>)> = None;
    let mut read_buffer = vec![0u8; 8192];

    loop {
        tokio::select! {
            read = read_half.read(&mut read_buffer) => {
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        session.bytes_recv += n as u64;
                        session.last_activity = Instant::now();
                        input.push_bytes(&read_buffer[..n]);
                        if input.len() > MAX_REQUEST_SIZE {
                            warn!(client = %session.desc, "input overflow");
                            break;
                        }
                        if process_input(&mut session, &mut input, &mut fragment).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(client = %session.desc, error = %e, "read error");
                        break;
                    }
                }
            }
            signal = signal_rx.recv() => {
                match signal {
                    Ok(signal) => crate::events::handle_signal(&mut session, &signal),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(client = %session.desc, missed, "event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        if session.close_after_flush {
            break;
        }
    }

    if !session.status.has_ended() {
        session.set_status(ClientStatus::Disconnected);
    }
    info!(client = %session.desc, "client disconnected");
    state.remove_client(client_id);
    // dropping the session (and its sender) lets the writer drain the
    // remaining queue and close the socket
    drop(session);
    let _ = writer.await;
}

/// Advances framing over the accumulated input, dispatching every
/// complete message.
fn process_input(
    session: &mut ClientSession,
    input: &mut DynBuf,
    fragment: &mut Option<(Opcode, Vec<u8>)>,
) -> Result<(), InputError> {
    loop {
        if session.close_after_flush {
            return Ok(());
        }
        if session.websocket == WsStatus::Ready {
            match websocket::decode_frame(input.as_bytes()) {
                Ok(None) => return Ok(()),
                Ok(Some((frame, consumed))) => {
                    input.consume(consumed);
                    handle_frame(session, frame, fragment)?;
                }
                Err(e) => {
                    debug!(client = %session.desc, error = %e, "websocket protocol error");
                    return Err(InputError::Protocol);
                }
            }
        } else {
            match HttpRequest::parse_head(input.as_bytes()) {
                (ParseOutcome::Incomplete, _) => return Ok(()),
                (ParseOutcome::Invalid, _) => {
                    session.queue(crate::http::http_response(400, None, None));
                    return Err(InputError::Protocol);
                }
                (ParseOutcome::Parsed { consumed }, Some(mut request)) => {
                    if request.content_length > MAX_REQUEST_SIZE {
                        session.queue(crate::http::http_response(400, None, None));
                        return Err(InputError::Protocol);
                    }
                    if input.len() < consumed + request.content_length {
                        // body incomplete: wait without consuming the head
                        return Ok(());
                    }
                    let body =
                        input.as_bytes()[consumed..consumed + request.content_length].to_vec();
                    input.consume(consumed + request.content_length);
                    request.body = body;
                    handle_http_request(session, request);
                }
                (ParseOutcome::Parsed { .. }, None) => return Err(InputError::Protocol),
            }
        }
    }
}

fn handle_http_request(session: &mut ClientSession, request: HttpRequest) {
    if request.is_websocket_upgrade() {
        // credentials on the upgrade request authenticate the whole
        // websocket session; absent credentials leave the client in
        // authenticating state (each request is then gated)
        if session.status != ClientStatus::Connected && request.header("authorization").is_some() {
            match crate::auth::check_auth(&session.state.host, &request) {
                Ok(()) => session.set_status(ClientStatus::Connected),
                Err(e) => {
                    warn!(client = %session.desc, error = %e, "authentication failed at upgrade");
                    session.queue(crate::http::http_response(
                        401,
                        None,
                        Some(&format!("{{\"error\":\"{e}\"}}")),
                    ));
                    session.set_status(ClientStatus::AuthFailed);
                    session.close_after_flush = true;
                    return;
                }
            }
        }
        let key = request
            .header("sec-websocket-key")
            .unwrap_or_default()
            .to_owned();
        session.queue(websocket::upgrade_response(&key));
        session.websocket = WsStatus::Ready;
        debug!(client = %session.desc, "websocket established");
        return;
    }
    api::dispatch(session, &request);
}

fn handle_frame(
    session: &mut ClientSession,
    frame: Frame,
    fragment: &mut Option<(Opcode, Vec<u8>)>,
) -> Result<(), InputError> {
    match frame.opcode {
        Opcode::Ping => {
            session.queue(websocket::encode_frame(Opcode::Pong, &frame.payload));
            Ok(())
        }
        Opcode::Pong => Ok(()),
        Opcode::Close => {
            session.queue(websocket::encode_frame(Opcode::Close, &frame.payload));
            session.close_after_flush = true;
            Ok(())
        }
        Opcode::Text | Opcode::Binary => {
            if frame.fin {
                api::handle_json(session, &frame.payload);
            } else {
                *fragment = Some((frame.opcode, frame.payload));
            }
            Ok(())
        }
        Opcode::Continuation => {
            let Some((opcode, mut payload)) = fragment.take() else {
                return Err(InputError::Protocol);
            };
            payload.extend_from_slice(&frame.payload);
            if frame.fin {
                api::handle_json(session, &payload);
            } else {
                *fragment = Some((opcode, payload));
            }
            Ok(())
        }
    }
}

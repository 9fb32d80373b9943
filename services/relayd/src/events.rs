//! Host signal to client event fan-out.
//!
//! Each client task receives every host signal and filters by its own
//! sync flags; the broadcast channel preserves host order per
//! receiver, so clients observe events in the order the host emitted
//! them.

use relay_core::{Signal, SignalData};
use serde_json::Value;

use crate::client::{ClientSession, WsStatus};
use crate::msg;

pub fn handle_signal(session: &mut ClientSession, signal: &Signal) {
    // events only flow to synchronized websocket clients
    if session.websocket != WsStatus::Ready || !session.sync_enabled {
        return;
    }

    let name = signal.name.as_str();
    match name {
        "buffer_opened" => {
            if let SignalData::Buffer { buffer_id } = signal.data {
                let body = buffer_body(session, buffer_id, i64::MAX, i64::MAX, true);
                msg::send_event(session, name, buffer_id, Some("buffer"), body);
            }
        }
        "buffer_closing" => {
            // not emitted: remember the id for buffer_closed
            if let SignalData::Buffer { buffer_id } = signal.data {
                session.closing_buffers.insert(buffer_id);
            }
        }
        "buffer_closed" => {
            if let SignalData::Buffer { buffer_id } = signal.data {
                let known = session.closing_buffers.remove(&buffer_id);
                let reported = if known { buffer_id } else { -1 };
                msg::send_event(session, name, reported, None, None);
            }
        }
        "buffer_type_changed" | "buffer_moved" | "buffer_merged" | "buffer_unmerged"
        | "buffer_hidden" | "buffer_unhidden" | "buffer_renamed" | "buffer_title_changed"
        | "buffer_modes_changed" | "buffer_cleared" => {
            if let SignalData::Buffer { buffer_id } = signal.data {
                let body = buffer_body(session, buffer_id, 0, 0, false);
                msg::send_event(session, name, buffer_id, Some("buffer"), body);
            }
        }
        _ if name.starts_with("buffer_localvar_") => {
            if let SignalData::Buffer { buffer_id } = signal.data {
                let body = buffer_body(session, buffer_id, 0, 0, false);
                msg::send_event(session, name, buffer_id, Some("buffer"), body);
            }
        }
        "buffer_line_added" => {
            if let SignalData::Line { buffer_id, line_id } = signal.data {
                let colors = session.sync_colors;
                let body = session.state.host.with_buffer(buffer_id, |b| {
                    b.lines
                        .iter()
                        .find(|line| line.id == line_id)
                        .map(|line| line.to_wire(colors))
                });
                if let Some(Some(line)) = body {
                    msg::send_event(
                        session,
                        name,
                        buffer_id,
                        Some("line"),
                        serde_json::to_value(line).ok(),
                    );
                }
            }
        }
        "input_text_changed" => {
            if !session.sync_input {
                return;
            }
            if let SignalData::Buffer { buffer_id } = signal.data {
                let body = buffer_body(session, buffer_id, 0, 0, false);
                msg::send_event(session, name, buffer_id, Some("buffer"), body);
            }
        }
        "nicklist_group_added" | "nicklist_group_changed" | "nicklist_group_removing" => {
            if !session.sync_nicks {
                return;
            }
            if let SignalData::NickGroup {
                buffer_id,
                group_id,
            } = signal.data
            {
                let colors = session.sync_colors;
                let body = session
                    .state
                    .host
                    .with_buffer(buffer_id, |b| b.nick_group_to_wire(group_id, colors))
                    .flatten();
                if let Some(group) = body {
                    msg::send_event(
                        session,
                        name,
                        buffer_id,
                        Some("nick_group"),
                        serde_json::to_value(group).ok(),
                    );
                }
            }
        }
        "nicklist_nick_added" | "nicklist_nick_changed" | "nicklist_nick_removing" => {
            if !session.sync_nicks {
                return;
            }
            if let SignalData::Nick { buffer_id, nick_id } = signal.data {
                let colors = session.sync_colors;
                let body = session
                    .state
                    .host
                    .with_buffer(buffer_id, |b| {
                        b.nick_by_id(nick_id).map(|n| n.to_wire(colors))
                    })
                    .flatten();
                if let Some(nick) = body {
                    msg::send_event(
                        session,
                        name,
                        buffer_id,
                        Some("nick"),
                        serde_json::to_value(nick).ok(),
                    );
                }
            }
        }
        "upgrade" | "upgrade_ended" => {
            msg::send_event(session, name, -1, None, None);
        }
        // internal signals (client_state_changed, config_changed) are
        // not part of the event surface
        _ => {}
    }
}

fn buffer_body(
    session: &ClientSession,
    buffer_id: i64,
    lines: i64,
    lines_free: i64,
    nicks: bool,
) -> Option<Value> {
    let colors = session.sync_colors;
    session
        .state
        .host
        .with_buffer(buffer_id, |b| b.to_wire(lines, lines_free, nicks, colors))
        .and_then(|b| serde_json::to_value(b).ok())
}

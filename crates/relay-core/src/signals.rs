//! Signal bus: host-side changes fan out to subscribers (relay
//! clients, loggers) over a broadcast channel.

use tokio::sync::broadcast;

/// Extra payload carried by a signal, always by id — receivers look up
/// live data through the host, never through references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalData {
    None,
    Buffer { buffer_id: i64 },
    Line { buffer_id: i64, line_id: i64 },
    NickGroup { buffer_id: i64, group_id: i64 },
    Nick { buffer_id: i64, nick_id: i64 },
    Client { client_id: i64, status: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Signal name, e.g. `buffer_opened`, `buffer_line_added`,
    /// `nicklist_nick_added`, `input_text_changed`, `upgrade`.
    pub name: String,
    pub data: SignalData,
}

impl Signal {
    pub fn buffer(name: &str, buffer_id: i64) -> Self {
        Self {
            name: name.to_owned(),
            data: SignalData::Buffer { buffer_id },
        }
    }

    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            data: SignalData::None,
        }
    }

    /// Buffer id carried by the signal, if any.
    pub fn buffer_id(&self) -> Option<i64> {
        match &self.data {
            SignalData::Buffer { buffer_id }
            | SignalData::Line { buffer_id, .. }
            | SignalData::NickGroup { buffer_id, .. }
            | SignalData::Nick { buffer_id, .. } => Some(*buffer_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }

    /// Sends a signal; lagging or absent receivers are not an error.
    pub fn send(&self, signal: Signal) {
        let _ = self.tx.send(signal);
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_signals_in_send_order() {
        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        bus.send(Signal::buffer("buffer_opened", 1));
        bus.send(Signal::buffer("buffer_renamed", 1));
        bus.send(Signal::bare("upgrade"));
        assert_eq!(rx.recv().await.unwrap().name, "buffer_opened");
        assert_eq!(rx.recv().await.unwrap().name, "buffer_renamed");
        assert_eq!(rx.recv().await.unwrap().name, "upgrade");
    }

    #[test]
    fn send_without_subscribers_is_not_an_error() {
        let bus = SignalBus::default();
        bus.send(Signal::bare("upgrade"));
    }

    #[test]
    fn buffer_id_extraction() {
        assert_eq!(Signal::buffer("buffer_opened", 7).buffer_id(), Some(7));
        assert_eq!(Signal::bare("upgrade").buffer_id(), None);
    }
}

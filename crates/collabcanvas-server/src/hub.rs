//! The dispatch hub.
//!
//! One task owns the [`SessionState`] and processes commands one at a time,
//! so the sequence counter, the history and the redo stack only ever have a
//! single writer. Connection tasks talk to it through a [`HubHandle`] and
//! drain their own bounded [`OutboxReceiver`]; a connection that falls
//! behind loses frames instead of growing its queue.

use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use collabcanvas_core::broadcast::Outbound;
use collabcanvas_core::presence::PeerId;
use collabcanvas_core::session::SessionState;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Commands processed by the hub, in arrival order.
#[derive(Debug)]
pub enum HubCommand {
    /// A WebSocket handshake completed.
    Connect { peer: PeerId, outbox: OutboxSender },
    /// A text frame arrived.
    Message { peer: PeerId, text: Utf8Bytes },
    /// The transport closed.
    Disconnect { peer: PeerId },
}

/// Sending half of a connection's outbox, held by the hub.
#[derive(Debug)]
pub struct OutboxSender {
    tx: mpsc::Sender<Utf8Bytes>,
    /// Frames lost since the last one that fit.
    dropped: u64,
}

/// Receiving half of a connection's outbox.
#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::Receiver<Utf8Bytes>,
}

/// Create a connection outbox holding at most `capacity` frames.
pub fn outbox(capacity: usize) -> (OutboxSender, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (OutboxSender { tx, dropped: 0 }, OutboxReceiver { rx })
}

/// Result of queueing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Queued,
    /// Queued after `dropped` frames were lost.
    Resumed { dropped: u64 },
    /// The reader is behind; the frame was dropped.
    Full,
    /// The connection is gone.
    Closed,
}

impl OutboxSender {
    /// Queue a frame without waiting. Delivery is at most once: a full
    /// outbox drops the frame rather than growing.
    fn send(&mut self, frame: Utf8Bytes) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) if self.dropped > 0 => Delivery::Resumed {
                dropped: std::mem::take(&mut self.dropped),
            },
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Frames queued and not yet taken by the connection.
    pub fn backlog(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl OutboxReceiver {
    /// Wait for the next frame. `None` once the hub dropped the sender.
    pub async fn recv(&mut self) -> Option<Utf8Bytes> {
        self.rx.recv().await
    }

    /// Take a frame if one is queued.
    pub fn try_recv(&mut self) -> Option<Utf8Bytes> {
        self.rx.try_recv().ok()
    }
}

/// Owner of the session state.
pub struct Hub {
    session: SessionState,
    outboxes: HashMap<PeerId, OutboxSender>,
    outbox_cap: usize,
}

impl Hub {
    pub fn new(outbox_cap: usize) -> Self {
        Self {
            session: SessionState::new(),
            outboxes: HashMap::new(),
            outbox_cap,
        }
    }

    /// Start the hub on the current runtime.
    pub fn spawn(self) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbox_cap = self.outbox_cap;
        tokio::spawn(self.run(rx));
        HubHandle { tx, outbox_cap }
    }

    /// Process commands until every handle is dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        debug!("Hub stopped");
    }

    /// Process a single command to completion.
    pub fn handle(&mut self, cmd: HubCommand) {
        let outbound = match cmd {
            HubCommand::Connect { peer, outbox } => {
                self.outboxes.insert(peer, outbox);
                self.session.connect(peer)
            }
            HubCommand::Message { peer, text } => self.session.handle_text(peer, text.as_str()),
            HubCommand::Disconnect { peer } => {
                self.outboxes.remove(&peer);
                self.session.disconnect(peer)
            }
        };
        self.deliver(outbound);
    }

    /// Serialize each message once and queue it on every matching outbox.
    fn deliver(&mut self, outbound: Vec<Outbound>) {
        for out in outbound {
            let frame: Utf8Bytes = match out.message.to_json() {
                Ok(json) => json.into(),
                Err(e) => {
                    warn!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            for (peer, outbox) in self.outboxes.iter_mut() {
                if !out.recipients.includes(*peer) {
                    continue;
                }
                match outbox.send(frame.clone()) {
                    Delivery::Queued => {}
                    Delivery::Resumed { dropped } => {
                        info!(%peer, dropped, "Outbox drained, delivery resumed");
                    }
                    Delivery::Full if outbox.dropped == 1 => {
                        warn!(%peer, capacity = self.outbox_cap, "Slow connection, outbox full; dropping frames");
                    }
                    Delivery::Full => {}
                    Delivery::Closed => debug!(%peer, "Outbox closed, dropping frame"),
                }
            }
        }
    }

    /// Queued frames for a connection.
    pub fn backlog(&self, peer: PeerId) -> Option<usize> {
        self.outboxes.get(&peer).map(OutboxSender::backlog)
    }

    /// Read access to the session, for inspection.
    pub fn session(&self) -> &SessionState {
        &self.session
    }
}

/// Cheap handle to a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
    outbox_cap: usize,
}

impl HubHandle {
    /// Register a connection and return its outbox.
    pub fn connect(&self, peer: PeerId) -> OutboxReceiver {
        let (sender, receiver) = outbox(self.outbox_cap);
        self.send(HubCommand::Connect {
            peer,
            outbox: sender,
        });
        receiver
    }

    /// Forward a text frame.
    pub fn message(&self, peer: PeerId, text: Utf8Bytes) {
        self.send(HubCommand::Message { peer, text });
    }

    /// Unregister a connection.
    pub fn disconnect(&self, peer: PeerId) {
        self.send(HubCommand::Disconnect { peer });
    }

    fn send(&self, cmd: HubCommand) {
        if self.tx.send(cmd).is_err() {
            warn!("Hub is not running");
        }
    }
}

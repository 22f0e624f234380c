//! Fan-out decisions.
//!
//! The session engine never touches sockets. Each handler returns a list of
//! [`Outbound`] messages, each addressed to a [`Recipients`] set, and the
//! transport delivers them fire-and-forget.

use crate::event::SequencedEvent;
use crate::presence::PeerId;
use crate::protocol::{Notice, RelayedEvent, RemoteCursor, ServerMessage};
use crate::stroke::StrokeStore;

/// Who a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    /// Every connected participant.
    All,
    /// Everyone but the originator.
    AllExcept(PeerId),
    /// A single connection.
    Only(PeerId),
}

impl Recipients {
    /// Whether `peer` should receive the message.
    pub fn includes(&self, peer: PeerId) -> bool {
        match *self {
            Recipients::All => true,
            Recipients::AllExcept(excluded) => peer != excluded,
            Recipients::Only(target) => peer == target,
        }
    }
}

/// A message and its audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipients: Recipients,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn new(recipients: Recipients, message: ServerMessage) -> Self {
        Self {
            recipients,
            message,
        }
    }
}

/// Builds relay and replay messages.
pub struct ReplicationBroadcaster;

impl ReplicationBroadcaster {
    /// Forward a sequenced event to everyone but its sender.
    pub fn relay(from: PeerId, event: SequencedEvent) -> Outbound {
        Outbound::new(
            Recipients::AllExcept(from),
            ServerMessage::Relay(RelayedEvent { id: from, event }),
        )
    }

    /// Forward a cursor position to everyone but its owner.
    pub fn cursor(cursor: RemoteCursor) -> Outbound {
        let from = cursor.id;
        Outbound::new(
            Recipients::AllExcept(from),
            ServerMessage::Notice(Notice::Cursor(cursor)),
        )
    }

    /// Push the whole flattened history to `recipients`.
    pub fn replay(recipients: Recipients, store: &StrokeStore) -> Outbound {
        Outbound::new(recipients, ServerMessage::init_canvas(store.snapshot()))
    }
}

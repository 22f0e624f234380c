//! Wire messages exchanged over a connection.
//!
//! Every frame is a JSON object with a `"type"` field. Drawing events travel
//! in both directions; on the way out the server adds the sender `id` and
//! the assigned `seq`:
//! ```json
//! { "type": "start", "strokeId": "s1", "tool": "brush", "color": "#000", "stroke": 2, "xNorm": 0.1, "yNorm": 0.1 }
//! { "type": "undo" }
//! { "type": "draw", "id": "<peer>", "seq": 1, "strokeId": "s1", "xNorm": 0.2, "yNorm": 0.2 }
//! { "type": "initCanvas", "events": [ ... ] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncResult;
use crate::event::{Event, SequencedEvent};
use crate::presence::{PeerId, PresenceEntry};

/// Normalized pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub x_norm: f64,
    pub y_norm: f64,
}

/// Non-drawing requests from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Best-effort pointer position; never stored.
    Cursor(CursorPosition),
    Undo,
    Redo,
    Clear,
    /// Ask for a full history replay (e.g. after a resize).
    RequestInit,
}

/// Any frame a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Event(Event),
    Control(ControlMessage),
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Event> for ClientMessage {
    fn from(event: Event) -> Self {
        ClientMessage::Event(event)
    }
}

impl From<ControlMessage> for ClientMessage {
    fn from(control: ControlMessage) -> Self {
        ClientMessage::Control(control)
    }
}

/// A drawing event forwarded to the other participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedEvent {
    /// The participant who sent it.
    pub id: PeerId,
    #[serde(flatten)]
    pub event: SequencedEvent,
}

/// Another participant's pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCursor {
    pub id: PeerId,
    pub color: String,
    pub x_norm: f64,
    pub y_norm: f64,
}

/// Server frames other than relayed drawing events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notice {
    /// Full flattened history; replaces the recipient's canvas.
    InitCanvas { events: Vec<SequencedEvent> },
    /// Everyone currently connected.
    UserList {
        users: BTreeMap<PeerId, PresenceEntry>,
    },
    UserDisconnected { id: PeerId },
    Cursor(RemoteCursor),
}

/// Any frame the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Relay(RelayedEvent),
    Notice(Notice),
}

impl ServerMessage {
    pub fn init_canvas(events: Vec<SequencedEvent>) -> Self {
        ServerMessage::Notice(Notice::InitCanvas { events })
    }

    pub fn from_json(text: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

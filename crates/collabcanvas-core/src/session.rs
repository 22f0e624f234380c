//! Process-wide drawing session.
//!
//! [`SessionState`] bundles the sequencer, the stroke history and the
//! presence map. It is owned by a single dispatch loop and each handler runs
//! to completion before the next frame is processed, so every append, undo,
//! redo and clear is atomic without any locking.

use uuid::Uuid;

use crate::broadcast::{Outbound, Recipients, ReplicationBroadcaster};
use crate::error::{SyncError, SyncResult};
use crate::event::Event;
use crate::presence::{PeerId, Presence};
use crate::protocol::{ClientMessage, ControlMessage, CursorPosition, Notice, RemoteCursor, ServerMessage};
use crate::sequencer::EventSequencer;
use crate::stroke::{AppendOutcome, StrokeStore};

/// Shared state of the canvas. Lives in memory only.
#[derive(Debug, Default)]
pub struct SessionState {
    sequencer: EventSequencer,
    store: StrokeStore,
    presence: Presence,
}

impl SessionState {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport handshake completed.
    ///
    /// Everyone gets the new user list; the newcomer gets the full history.
    pub fn connect(&mut self, peer: PeerId) -> Vec<Outbound> {
        self.presence.join(peer);
        log::info!("peer {peer} connected ({} present)", self.presence.len());
        vec![
            self.user_list(),
            ReplicationBroadcaster::replay(Recipients::Only(peer), &self.store),
        ]
    }

    /// A transport closed. Strokes the peer left half-drawn stay as they are.
    pub fn disconnect(&mut self, peer: PeerId) -> Vec<Outbound> {
        if self.presence.leave(peer).is_none() {
            return Vec::new();
        }
        log::info!("peer {peer} disconnected ({} present)", self.presence.len());
        vec![
            self.user_list(),
            Outbound::new(
                Recipients::All,
                ServerMessage::Notice(Notice::UserDisconnected { id: peer }),
            ),
        ]
    }

    /// Handle a raw text frame.
    ///
    /// Errors stop here: they are logged and the frame is dropped without
    /// telling the sender.
    pub fn handle_text(&mut self, peer: PeerId, text: &str) -> Vec<Outbound> {
        let result = ClientMessage::from_json(text).and_then(|msg| self.handle(peer, msg));
        match result {
            Ok(outbound) => outbound,
            Err(e) => {
                log::warn!("dropping frame from {peer}: {e}");
                Vec::new()
            }
        }
    }

    /// Handle a parsed frame.
    pub fn handle(&mut self, peer: PeerId, msg: ClientMessage) -> SyncResult<Vec<Outbound>> {
        if !self.presence.contains(peer) {
            return Err(SyncError::UnknownPeer(peer));
        }
        match msg {
            ClientMessage::Event(event) => Ok(vec![self.handle_event(peer, event)?]),
            ClientMessage::Control(control) => self.handle_control(peer, control),
        }
    }

    fn handle_event(&mut self, peer: PeerId, mut event: Event) -> SyncResult<Outbound> {
        event.validate()?;
        if let Event::Start(point) = &mut event {
            if point.stroke_id.as_deref().is_none_or(str::is_empty) {
                point.stroke_id = Some(Uuid::new_v4().to_string());
            }
        }
        if self.presence.mark_active(peer) {
            log::debug!("peer {peer} is now active");
        }

        let stamped = self.sequencer.stamp(event);
        match self.store.append(stamped.clone()) {
            AppendOutcome::Started { id } => {
                log::debug!("{} {id} started at seq {:?}", stamped.kind(), stamped.seq)
            }
            AppendOutcome::Recovered { id } => {
                log::warn!("peer {peer} drew on unknown stroke {id}")
            }
            AppendOutcome::Extended { .. } | AppendOutcome::Rejected => {}
        }
        Ok(ReplicationBroadcaster::relay(peer, stamped))
    }

    fn handle_control(&mut self, peer: PeerId, control: ControlMessage) -> SyncResult<Vec<Outbound>> {
        let outbound = match control {
            ControlMessage::Cursor(position) => return self.handle_cursor(peer, position),
            ControlMessage::Undo => {
                let undone = self.store.undo();
                log::debug!("undo from {peer}: {undone}");
                ReplicationBroadcaster::replay(Recipients::All, &self.store)
            }
            ControlMessage::Redo => {
                let redone = self.store.redo();
                log::debug!("redo from {peer}: {redone}");
                ReplicationBroadcaster::replay(Recipients::All, &self.store)
            }
            ControlMessage::Clear => {
                self.store.clear();
                self.sequencer.forget_strokes();
                log::info!("canvas cleared by {peer}");
                ReplicationBroadcaster::replay(Recipients::All, &self.store)
            }
            ControlMessage::RequestInit => {
                ReplicationBroadcaster::replay(Recipients::Only(peer), &self.store)
            }
        };
        Ok(vec![outbound])
    }

    fn handle_cursor(&mut self, peer: PeerId, position: CursorPosition) -> SyncResult<Vec<Outbound>> {
        if !(position.x_norm.is_finite() && position.y_norm.is_finite()) {
            return Err(SyncError::Malformed("cursor position is not finite".into()));
        }
        let color = self
            .presence
            .color(peer)
            .ok_or(SyncError::UnknownPeer(peer))?
            .to_string();
        Ok(vec![ReplicationBroadcaster::cursor(RemoteCursor {
            id: peer,
            color,
            x_norm: position.x_norm,
            y_norm: position.y_norm,
        })])
    }

    fn user_list(&self) -> Outbound {
        Outbound::new(
            Recipients::All,
            ServerMessage::Notice(Notice::UserList {
                users: self.presence.users().clone(),
            }),
        )
    }

    pub fn store(&self) -> &StrokeStore {
        &self.store
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn sequencer(&self) -> &EventSequencer {
        &self.sequencer
    }
}

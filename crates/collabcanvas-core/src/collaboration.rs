//! Client-side collaboration state.
//!
//! [`CollaborationManager`] sits between the UI and the transport. Local
//! actions are rendered immediately through the replay engine and queued as
//! outgoing frames; incoming frames are applied to the same engine, either
//! incrementally (relays) or as a full replay (`initCanvas`).

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::SyncResult;
use crate::event::{
    Event, EventKind, ImageEvent, ShapeEvent, ShapeGeometry, StrokePoint, TextEvent, Tool, DEFAULT_COLOR,
    DEFAULT_STROKE_WIDTH,
};
use crate::presence::{PeerId, PresenceEntry};
use crate::protocol::{ClientMessage, ControlMessage, CursorPosition, Notice, RemoteCursor, ServerMessage};
use crate::replay::{ClientReplayEngine, Surface};

/// Minimum spacing between emitted `draw` frames.
pub const DRAW_THROTTLE: Duration = Duration::from_millis(25);
/// Minimum spacing between emitted `cursor` frames.
pub const CURSOR_THROTTLE: Duration = Duration::from_millis(50);

/// Rate limiter for outgoing frames.
#[derive(Debug, Clone)]
struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true and arms the throttle if enough time has passed.
    fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// A freehand stroke the local user is drawing.
#[derive(Debug)]
struct ActiveStroke {
    id: String,
    /// Latest sample held back by the draw throttle.
    pending: Option<StrokePoint>,
}

/// What an incoming frame changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The canvas was rebuilt from the full history.
    Replayed { events: usize },
    /// A remote drawing event was rendered.
    Applied { from: PeerId, kind: EventKind },
    /// The participant list changed.
    UsersChanged { count: usize },
    /// A remote pointer moved.
    CursorMoved { id: PeerId },
    /// A participant left; its cursor was removed.
    UserLeft { id: PeerId },
}

/// Client-side session: local drawing, outgoing queue and remote state.
pub struct CollaborationManager<S: Surface> {
    engine: ClientReplayEngine<S>,
    tool: Tool,
    color: String,
    width: f64,
    active: Option<ActiveStroke>,
    draw_throttle: Throttle,
    cursor_throttle: Throttle,
    users: BTreeMap<PeerId, PresenceEntry>,
    cursors: HashMap<PeerId, RemoteCursor>,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
}

impl<S: Surface> CollaborationManager<S> {
    pub fn new(surface: S) -> Self {
        Self {
            engine: ClientReplayEngine::new(surface),
            tool: Tool::Brush,
            color: DEFAULT_COLOR.to_string(),
            width: DEFAULT_STROKE_WIDTH,
            active: None,
            draw_throttle: Throttle::new(DRAW_THROTTLE),
            cursor_throttle: Throttle::new(CURSOR_THROTTLE),
            users: BTreeMap::new(),
            cursors: HashMap::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn engine(&self) -> &ClientReplayEngine<S> {
        &self.engine
    }

    pub fn surface_mut(&mut self) -> &mut S {
        self.engine.surface_mut()
    }

    // --- Style ---

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width;
    }

    // --- Local drawing ---

    /// Begin a freehand stroke at a normalized position. Returns its id.
    pub fn begin_stroke(&mut self, x_norm: f64, y_norm: f64) -> String {
        if self.active.is_some() {
            self.end_stroke();
        }
        let id = Uuid::new_v4().to_string();
        let point = self.point(&id, x_norm, y_norm);
        self.local(Event::Start(point));
        self.active = Some(ActiveStroke {
            id: id.clone(),
            pending: None,
        });
        id
    }

    /// Extend the current stroke. Renders every sample locally but emits at
    /// most one `draw` per [`DRAW_THROTTLE`]. Ignored when no stroke is active.
    pub fn extend_stroke(&mut self, x_norm: f64, y_norm: f64, now: Instant) {
        let Some(id) = self.active.as_ref().map(|a| a.id.clone()) else {
            return;
        };
        let point = self.point(&id, x_norm, y_norm);
        let event = Event::Draw(point.clone());
        self.engine.apply_event(&event);

        let emit = self.draw_throttle.ready(now);
        if emit {
            self.queue(event.into());
        }
        if let Some(active) = self.active.as_mut() {
            active.pending = if emit { None } else { Some(point) };
        }
    }

    /// Finish the current stroke, emitting the last held-back sample.
    pub fn end_stroke(&mut self) {
        if let Some(active) = self.active.take() {
            if let Some(point) = active.pending {
                self.queue(Event::Draw(point).into());
            }
        }
    }

    pub fn place_shape(&mut self, geometry: ShapeGeometry) {
        self.local(Event::Shape(ShapeEvent {
            geometry,
            color: self.color.clone(),
            width: self.width,
        }));
    }

    pub fn place_text(&mut self, text: impl Into<String>, x_norm: f64, y_norm: f64, font_size: f64) {
        self.local(Event::Text(TextEvent {
            text: text.into(),
            x_norm,
            y_norm,
            color: self.color.clone(),
            font_size,
        }));
    }

    pub fn place_image(&mut self, data_url: impl Into<String>, x_norm: f64, y_norm: f64, w_norm: f64, h_norm: f64) {
        self.local(Event::Image(ImageEvent {
            data_url: data_url.into(),
            x_norm,
            y_norm,
            w_norm,
            h_norm,
        }));
    }

    fn point(&self, id: &str, x_norm: f64, y_norm: f64) -> StrokePoint {
        StrokePoint {
            stroke_id: Some(id.to_string()),
            tool: self.tool,
            color: self.color.clone(),
            width: self.width,
            x_norm,
            y_norm,
        }
    }

    /// Render an action locally and queue it for the server.
    fn local(&mut self, event: Event) {
        if let Err(e) = event.validate() {
            log::warn!("not sending invalid {}: {e}", event.kind());
            return;
        }
        self.engine.apply_event(&event);
        self.queue(event.into());
    }

    // --- Controls ---

    /// Report the pointer position, at most once per [`CURSOR_THROTTLE`].
    pub fn move_cursor(&mut self, x_norm: f64, y_norm: f64, now: Instant) {
        if self.cursor_throttle.ready(now) {
            self.queue(ControlMessage::Cursor(CursorPosition { x_norm, y_norm }).into());
        }
    }

    pub fn undo(&mut self) {
        self.queue(ControlMessage::Undo.into());
    }

    pub fn redo(&mut self) {
        self.queue(ControlMessage::Redo.into());
    }

    pub fn clear(&mut self) {
        self.queue(ControlMessage::Clear.into());
    }

    /// Ask for a full replay.
    pub fn request_init(&mut self) {
        self.queue(ControlMessage::RequestInit.into());
    }

    /// Call after the surface changed size: the canvas is rebuilt at the new
    /// resolution once the server answers.
    pub fn resized(&mut self) {
        self.request_init();
    }

    fn queue(&mut self, msg: ClientMessage) {
        match msg.to_json() {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("failed to encode outgoing frame: {e}"),
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Incoming ---

    /// Handle an incoming text frame.
    pub fn handle_message(&mut self, json: &str) -> SyncResult<ClientEvent> {
        let msg = ServerMessage::from_json(json)?;
        Ok(self.handle_server_message(msg))
    }

    /// Apply a parsed server frame.
    pub fn handle_server_message(&mut self, msg: ServerMessage) -> ClientEvent {
        match msg {
            ServerMessage::Relay(relayed) => {
                self.engine.apply(&relayed.event);
                ClientEvent::Applied {
                    from: relayed.id,
                    kind: relayed.event.kind(),
                }
            }
            ServerMessage::Notice(Notice::InitCanvas { events }) => {
                self.engine.replay(&events);
                ClientEvent::Replayed {
                    events: events.len(),
                }
            }
            ServerMessage::Notice(Notice::UserList { users }) => {
                self.cursors.retain(|id, _| users.contains_key(id));
                self.users = users;
                ClientEvent::UsersChanged {
                    count: self.users.len(),
                }
            }
            ServerMessage::Notice(Notice::UserDisconnected { id }) => {
                self.cursors.remove(&id);
                ClientEvent::UserLeft { id }
            }
            ServerMessage::Notice(Notice::Cursor(cursor)) => {
                let id = cursor.id;
                self.cursors.insert(id, cursor);
                ClientEvent::CursorMoved { id }
            }
        }
    }

    /// Participants as last reported by the server.
    pub fn users(&self) -> &BTreeMap<PeerId, PresenceEntry> {
        &self.users
    }

    /// Remote pointers by owner.
    pub fn cursors(&self) -> &HashMap<PeerId, RemoteCursor> {
        &self.cursors
    }
}

//! CollabCanvas Core Library
//!
//! Transport-agnostic session engine and client replay logic for the
//! CollabCanvas shared whiteboard.

pub mod broadcast;
pub mod collaboration;
pub mod error;
pub mod event;
pub mod presence;
pub mod protocol;
pub mod replay;
pub mod sequencer;
pub mod session;
pub mod stroke;
pub mod sync;
pub mod undo;

pub use broadcast::{Outbound, Recipients, ReplicationBroadcaster};
pub use collaboration::{ClientEvent, CollaborationManager};
pub use error::{SyncError, SyncResult};
pub use event::{Event, EventKind, SequencedEvent, ShapeGeometry, StrokePoint, Tool};
pub use presence::{PeerId, Presence, PresenceEntry};
pub use protocol::{ClientMessage, ControlMessage, Notice, ServerMessage};
pub use replay::{ClientReplayEngine, DrawCommand, RecordingSurface, Surface, css_color};
pub use sequencer::EventSequencer;
pub use session::SessionState;
pub use stroke::{AppendOutcome, Stroke, StrokeStore};
#[cfg(not(target_arch = "wasm32"))]
pub use sync::NativeWebSocket;
pub use sync::{ConnectionState, SyncEvent};
pub use undo::UndoRedoStack;

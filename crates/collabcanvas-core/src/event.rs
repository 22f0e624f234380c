//! Drawing events.
//!
//! An [`Event`] is one tagged case per drawing kind, each carrying only the
//! fields that kind needs. Positions and sizes are normalized to the canvas
//! (fractions of width/height) so every client can replay them at its own
//! resolution. Events are checked once with [`Event::validate`] when they
//! enter the system and are immutable after sequencing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SyncError, SyncResult};

/// Stroke color used when a frame omits one.
pub const DEFAULT_COLOR: &str = "#000000";
/// Stroke width used when a frame omits one.
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;
/// Font size used when a text frame omits one.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_width() -> f64 {
    DEFAULT_STROKE_WIDTH
}

fn default_font_size() -> f64 {
    DEFAULT_FONT_SIZE
}

/// Freehand tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
}

/// One sample of a freehand stroke (`start` or `draw`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokePoint {
    /// Stroke this sample belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_id: Option<String>,
    #[serde(default)]
    pub tool: Tool,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(rename = "stroke", default = "default_width")]
    pub width: f64,
    pub x_norm: f64,
    pub y_norm: f64,
}

impl StrokePoint {
    /// Create a brush sample with default style.
    pub fn new(stroke_id: impl Into<String>, x_norm: f64, y_norm: f64) -> Self {
        Self {
            stroke_id: Some(stroke_id.into()),
            tool: Tool::Brush,
            color: default_color(),
            width: DEFAULT_STROKE_WIDTH,
            x_norm,
            y_norm,
        }
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_style(mut self, color: impl Into<String>, width: f64) -> Self {
        self.color = color.into();
        self.width = width;
        self
    }
}

/// Geometry of an atomic shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ShapeGeometry {
    /// Axis-aligned rectangle by its top-left corner and size.
    #[serde(rename_all = "camelCase")]
    Rect {
        x_norm: f64,
        y_norm: f64,
        w_norm: f64,
        h_norm: f64,
    },
    /// Circle by center and radius (radius is a fraction of canvas width).
    #[serde(rename_all = "camelCase")]
    Circle { cx_norm: f64, cy_norm: f64, r_norm: f64 },
}

/// A rectangle or circle outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeEvent {
    #[serde(flatten)]
    pub geometry: ShapeGeometry,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(rename = "stroke", default = "default_width")]
    pub width: f64,
}

impl ShapeEvent {
    pub fn new(geometry: ShapeGeometry) -> Self {
        Self {
            geometry,
            color: default_color(),
            width: DEFAULT_STROKE_WIDTH,
        }
    }
}

/// A line of text anchored at its baseline origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEvent {
    pub text: String,
    pub x_norm: f64,
    pub y_norm: f64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

/// A placed image. A zero width or height means "natural size".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEvent {
    /// Encoded image, typically a `data:` URL.
    pub data_url: String,
    pub x_norm: f64,
    pub y_norm: f64,
    #[serde(default)]
    pub w_norm: f64,
    #[serde(default)]
    pub h_norm: f64,
}

/// Kind discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Draw,
    Shape,
    Text,
    Image,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Start => "start",
            EventKind::Draw => "draw",
            EventKind::Shape => "shape",
            EventKind::Text => "text",
            EventKind::Image => "image",
        };
        f.write_str(name)
    }
}

/// A drawing event as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    /// Begins a freehand stroke.
    Start(StrokePoint),
    /// Continues a freehand stroke.
    Draw(StrokePoint),
    Shape(ShapeEvent),
    Text(TextEvent),
    Image(ImageEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Start(_) => EventKind::Start,
            Event::Draw(_) => EventKind::Draw,
            Event::Shape(_) => EventKind::Shape,
            Event::Text(_) => EventKind::Text,
            Event::Image(_) => EventKind::Image,
        }
    }

    /// Stroke id for `start`/`draw`; `None` for atomic kinds.
    pub fn stroke_id(&self) -> Option<&str> {
        match self {
            Event::Start(p) | Event::Draw(p) => p.stroke_id.as_deref(),
            _ => None,
        }
    }

    /// Whether this event opens a new history entry and so invalidates redo.
    pub fn begins_stroke(&self) -> bool {
        !matches!(self, Event::Draw(_))
    }

    /// Color of the event, if the kind has one.
    pub fn color(&self) -> Option<&str> {
        match self {
            Event::Start(p) | Event::Draw(p) => Some(&p.color),
            Event::Shape(s) => Some(&s.color),
            Event::Text(t) => Some(&t.color),
            Event::Image(_) => None,
        }
    }

    /// Line width of the event, if the kind has one.
    pub fn width(&self) -> Option<f64> {
        match self {
            Event::Start(p) | Event::Draw(p) => Some(p.width),
            Event::Shape(s) => Some(s.width),
            Event::Text(_) | Event::Image(_) => None,
        }
    }

    /// Check the payload once at the boundary.
    pub fn validate(&self) -> SyncResult<()> {
        match self {
            Event::Start(p) => validate_point(p),
            Event::Draw(p) => {
                match p.stroke_id.as_deref() {
                    Some(id) if !id.is_empty() => {}
                    _ => return Err(SyncError::Malformed("draw without strokeId".into())),
                }
                validate_point(p)
            }
            Event::Shape(s) => {
                non_negative("stroke", s.width)?;
                match s.geometry {
                    ShapeGeometry::Rect {
                        x_norm,
                        y_norm,
                        w_norm,
                        h_norm,
                    } => {
                        finite("xNorm", x_norm)?;
                        finite("yNorm", y_norm)?;
                        non_negative("wNorm", w_norm)?;
                        non_negative("hNorm", h_norm)
                    }
                    ShapeGeometry::Circle {
                        cx_norm,
                        cy_norm,
                        r_norm,
                    } => {
                        finite("cxNorm", cx_norm)?;
                        finite("cyNorm", cy_norm)?;
                        non_negative("rNorm", r_norm)
                    }
                }
            }
            Event::Text(t) => {
                if t.text.is_empty() {
                    return Err(SyncError::Malformed("empty text".into()));
                }
                finite("xNorm", t.x_norm)?;
                finite("yNorm", t.y_norm)?;
                if !(t.font_size.is_finite() && t.font_size > 0.0) {
                    return Err(SyncError::Malformed(format!(
                        "fontSize must be positive, got {}",
                        t.font_size
                    )));
                }
                Ok(())
            }
            Event::Image(i) => {
                if i.data_url.is_empty() {
                    return Err(SyncError::Malformed("image without dataUrl".into()));
                }
                finite("xNorm", i.x_norm)?;
                finite("yNorm", i.y_norm)?;
                non_negative("wNorm", i.w_norm)?;
                non_negative("hNorm", i.h_norm)
            }
        }
    }
}

fn validate_point(p: &StrokePoint) -> SyncResult<()> {
    finite("xNorm", p.x_norm)?;
    finite("yNorm", p.y_norm)?;
    non_negative("stroke", p.width)
}

fn finite(field: &str, value: f64) -> SyncResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SyncError::Malformed(format!("{field} is not finite")))
    }
}

fn non_negative(field: &str, value: f64) -> SyncResult<()> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(SyncError::Malformed(format!("{field} is negative")));
    }
    Ok(())
}

/// An event with its server-assigned sequence number.
///
/// `draw` events carry the sequence of their stroke's `start`; a `draw` for an
/// unknown stroke carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl SequencedEvent {
    pub fn new(event: Event, seq: Option<u64>) -> Self {
        Self { event, seq }
    }

    /// Wrap an event that has not been through the server (local echo).
    pub fn unsequenced(event: Event) -> Self {
        Self { event, seq: None }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn stroke_id(&self) -> Option<&str> {
        self.event.stroke_id()
    }
}

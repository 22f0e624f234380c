//! Client-side reconstruction of the canvas from events.
//!
//! [`ClientReplayEngine`] turns normalized events into drawing calls on a
//! [`Surface`]. The same code path handles live relays, local echoes and
//! full `initCanvas` batches, so applying a history one event at a time and
//! replaying it in one go produce the same picture. A replay always starts
//! from a cleared surface, which makes replaying the same history twice
//! idempotent.

use kurbo::{Circle, Line, Point, Rect, Size, Vec2};
use peniko::Color;
use peniko::color::{Srgb, parse_color};
use std::collections::HashMap;

use crate::event::{Event, ImageEvent, SequencedEvent, ShapeEvent, ShapeGeometry, StrokePoint, TextEvent, Tool};

/// Offset of the degenerate segment drawn for a `draw` with no known start.
const DEGENERATE_OFFSET: f64 = 0.1;

/// Parse a CSS color string as carried on the wire.
///
/// Anything a browser canvas accepts (`#rgb`, named colors, `rgb()`,
/// `hsl()`, ...) is understood; unreadable strings paint black.
pub fn css_color(css: &str) -> Color {
    match parse_color(css.trim()) {
        Ok(color) => color.to_alpha_color::<Srgb>(),
        Err(e) => {
            log::debug!("unreadable color {css:?} ({e}), using black");
            Color::BLACK
        }
    }
}

/// How new pixels combine with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Composite {
    /// Paint over.
    #[default]
    SourceOver,
    /// Erase where painted.
    DestinationOut,
}

/// Outline style for lines and shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f64,
    pub composite: Composite,
}

/// Drawing target for replay. Coordinates are in surface pixels.
pub trait Surface {
    /// Current size in pixels; used to denormalize event coordinates.
    fn size(&self) -> Size;

    /// Erase everything.
    fn clear(&mut self);

    fn stroke_line(&mut self, line: Line, style: &StrokeStyle);

    fn stroke_rect(&mut self, rect: Rect, style: &StrokeStyle);

    fn stroke_circle(&mut self, circle: Circle, style: &StrokeStyle);

    /// Draw text with its baseline starting at `origin`.
    fn fill_text(&mut self, text: &str, origin: Point, font_size: f64, color: Color);

    /// Draw an image. A zero-sized `bounds` means the image's natural size
    /// at `bounds.origin()`.
    fn draw_image(&mut self, source: &str, bounds: Rect);
}

/// Rebuilds visible state from events.
pub struct ClientReplayEngine<S: Surface> {
    surface: S,
    /// Last rendered position of each stroke, in surface pixels.
    last_positions: HashMap<String, Point>,
}

impl<S: Surface> ClientReplayEngine<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            last_positions: HashMap::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Clear the surface and forget every stroke position.
    pub fn reset(&mut self) {
        self.surface.clear();
        self.last_positions.clear();
    }

    /// Rebuild the canvas from a flattened history.
    pub fn replay<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a SequencedEvent>,
    {
        self.reset();
        let mut count = 0usize;
        for event in events {
            self.apply(event);
            count += 1;
        }
        log::debug!("replayed {count} events");
    }

    /// Apply one live or local event on top of the current state.
    pub fn apply(&mut self, event: &SequencedEvent) {
        self.apply_event(&event.event);
    }

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::Start(point) => self.start(point),
            Event::Draw(point) => self.draw(point),
            Event::Shape(shape) => self.shape(shape),
            Event::Text(text) => self.text(text),
            Event::Image(image) => self.image(image),
        }
    }

    /// Last rendered position of a stroke, in surface pixels.
    pub fn last_position(&self, stroke_id: &str) -> Option<Point> {
        self.last_positions.get(stroke_id).copied()
    }

    fn to_surface(&self, x_norm: f64, y_norm: f64) -> Point {
        let size = self.surface.size();
        Point::new(x_norm * size.width, y_norm * size.height)
    }

    fn start(&mut self, point: &StrokePoint) {
        let at = self.to_surface(point.x_norm, point.y_norm);
        if let Some(id) = &point.stroke_id {
            self.last_positions.insert(id.clone(), at);
        }
    }

    /// Draw a segment from the stroke's last position.
    ///
    /// A `draw` whose stroke has no last position (its `start` was never
    /// seen) renders a 0.1px segment at its own point. That point then
    /// becomes the stroke's last position, so further samples of the same
    /// orphaned stroke join up into a polyline instead of scattered dots.
    fn draw(&mut self, point: &StrokePoint) {
        let to = self.to_surface(point.x_norm, point.y_norm);
        let style = StrokeStyle {
            color: css_color(&point.color),
            width: point.width,
            composite: match point.tool {
                Tool::Brush => Composite::SourceOver,
                Tool::Eraser => Composite::DestinationOut,
            },
        };
        let from = point
            .stroke_id
            .as_deref()
            .and_then(|id| self.last_positions.get(id).copied());
        let line = match from {
            Some(from) => Line::new(from, to),
            None => Line::new(to, to + Vec2::new(DEGENERATE_OFFSET, DEGENERATE_OFFSET)),
        };
        self.surface.stroke_line(line, &style);
        if let Some(id) = &point.stroke_id {
            self.last_positions.insert(id.clone(), to);
        }
    }

    fn shape(&mut self, shape: &ShapeEvent) {
        let style = StrokeStyle {
            color: css_color(&shape.color),
            width: shape.width,
            composite: Composite::SourceOver,
        };
        let size = self.surface.size();
        match shape.geometry {
            ShapeGeometry::Rect {
                x_norm,
                y_norm,
                w_norm,
                h_norm,
            } => {
                let origin = self.to_surface(x_norm, y_norm);
                let rect = Rect::from_origin_size(
                    origin,
                    Size::new(w_norm * size.width, h_norm * size.height),
                );
                self.surface.stroke_rect(rect, &style);
            }
            ShapeGeometry::Circle {
                cx_norm,
                cy_norm,
                r_norm,
            } => {
                let center = self.to_surface(cx_norm, cy_norm);
                self.surface
                    .stroke_circle(Circle::new(center, r_norm * size.width), &style);
            }
        }
    }

    fn text(&mut self, text: &TextEvent) {
        let origin = self.to_surface(text.x_norm, text.y_norm);
        let color = css_color(&text.color);
        self.surface
            .fill_text(&text.text, origin, text.font_size, color);
    }

    fn image(&mut self, image: &ImageEvent) {
        let size = self.surface.size();
        let origin = self.to_surface(image.x_norm, image.y_norm);
        let bounds = Rect::from_origin_size(
            origin,
            Size::new(image.w_norm * size.width, image.h_norm * size.height),
        );
        self.surface.draw_image(&image.data_url, bounds);
    }
}

/// A recorded drawing call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line { line: Line, style: StrokeStyle },
    Rect { rect: Rect, style: StrokeStyle },
    Circle { circle: Circle, style: StrokeStyle },
    Text {
        text: String,
        origin: Point,
        font_size: f64,
        color: Color,
    },
    Image { source: String, bounds: Rect },
}

/// A headless surface that keeps the drawing calls made since the last
/// clear. Two recordings are equal exactly when the same picture would be
/// painted by a deterministic renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSurface {
    size: Size,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
        }
    }

    /// Change the pixel size. Existing commands keep their old coordinates
    /// until the next replay.
    pub fn resize(&mut self, size: Size) {
        self.size = size;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn clear(&mut self) {
        self.commands.clear();
    }

    fn stroke_line(&mut self, line: Line, style: &StrokeStyle) {
        self.commands.push(DrawCommand::Line { line, style: *style });
    }

    fn stroke_rect(&mut self, rect: Rect, style: &StrokeStyle) {
        self.commands.push(DrawCommand::Rect { rect, style: *style });
    }

    fn stroke_circle(&mut self, circle: Circle, style: &StrokeStyle) {
        self.commands.push(DrawCommand::Circle {
            circle,
            style: *style,
        });
    }

    fn fill_text(&mut self, text: &str, origin: Point, font_size: f64, color: Color) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            origin,
            font_size,
            color,
        });
    }

    fn draw_image(&mut self, source: &str, bounds: Rect) {
        self.commands.push(DrawCommand::Image {
            source: source.to_string(),
            bounds,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::EventSequencer;
    use crate::stroke::StrokeStore;

    fn engine() -> ClientReplayEngine<RecordingSurface> {
        ClientReplayEngine::new(RecordingSurface::new(Size::new(1000.0, 500.0)))
    }

    fn sample_history() -> StrokeStore {
        let mut sequencer = EventSequencer::new();
        let mut store = StrokeStore::new();
        let events = vec![
            Event::Start(StrokePoint::new("a", 0.1, 0.1)),
            Event::Start(StrokePoint::new("b", 0.5, 0.5).with_tool(Tool::Eraser)),
            Event::Draw(StrokePoint::new("a", 0.2, 0.2)),
            Event::Shape(ShapeEvent::new(ShapeGeometry::Rect {
                x_norm: 0.1,
                y_norm: 0.2,
                w_norm: 0.3,
                h_norm: 0.4,
            })),
            Event::Draw(StrokePoint::new("b", 0.6, 0.6).with_tool(Tool::Eraser)),
            Event::Draw(StrokePoint::new("a", 0.3, 0.3)),
            Event::Text(TextEvent {
                text: "hi".into(),
                x_norm: 0.5,
                y_norm: 0.5,
                color: "#ff0000".into(),
                font_size: 20.0,
            }),
            Event::Draw(StrokePoint::new("ghost", 0.9, 0.9)),
        ];
        for event in events {
            store.append(sequencer.stamp(event));
        }
        store
    }

    fn rgba(color: Color) -> (u8, u8, u8, u8) {
        let c = color.to_rgba8();
        (c.r, c.g, c.b, c.a)
    }

    #[test]
    fn test_css_colors() {
        assert_eq!(rgba(css_color("#ff0080")), (255, 0, 128, 255));
        assert_eq!(rgba(css_color("#f00")), (255, 0, 0, 255));
        assert_eq!(rgba(css_color("red")), (255, 0, 0, 255));
        assert_eq!(rgba(css_color("rgb(0, 0, 255)")), (0, 0, 255, 255));
        assert_eq!(rgba(css_color("hsl(120, 100%, 50%)")), (0, 255, 0, 255));
        assert_eq!(rgba(css_color(" chartreuse ")), (127, 255, 0, 255));
        assert_eq!(rgba(css_color("#12")), (0, 0, 0, 255));
        assert_eq!(rgba(css_color("nope")), (0, 0, 0, 255));
    }

    #[test]
    fn test_presence_colors_parse() {
        let color = crate::presence::presence_color(crate::presence::PeerId::new());
        assert_ne!(css_color(&color), Color::BLACK);
    }

    #[test]
    fn test_named_color_reaches_surface() {
        let mut engine = engine();
        engine.apply_event(&Event::Start(StrokePoint::new("s", 0.1, 0.1).with_style("blue", 3.0)));
        engine.apply_event(&Event::Draw(StrokePoint::new("s", 0.2, 0.1).with_style("blue", 3.0)));
        match &engine.surface().commands()[0] {
            DrawCommand::Line { style, .. } => {
                assert_eq!(rgba(style.color), (0, 0, 255, 255));
                assert_eq!(style.width, 3.0);
            }
            other => panic!("Expected a line, got {:?}", other),
        }
    }

    #[test]
    fn test_start_then_draw_renders_segment() {
        let mut engine = engine();
        engine.apply_event(&Event::Start(StrokePoint::new("s1", 0.1, 0.1)));
        engine.apply_event(&Event::Draw(StrokePoint::new("s1", 0.2, 0.2)));

        let commands = engine.surface().commands();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            DrawCommand::Line { line, style } => {
                assert_eq!(line.p0, Point::new(100.0, 50.0));
                assert_eq!(line.p1, Point::new(200.0, 100.0));
                assert_eq!(style.composite, Composite::SourceOver);
            }
            other => panic!("Expected a line, got {:?}", other),
        }
        assert_eq!(engine.last_position("s1"), Some(Point::new(200.0, 100.0)));
    }

    #[test]
    fn test_eraser_uses_destination_out() {
        let mut engine = engine();
        engine.apply_event(&Event::Start(StrokePoint::new("e", 0.1, 0.1).with_tool(Tool::Eraser)));
        engine.apply_event(&Event::Draw(StrokePoint::new("e", 0.2, 0.1).with_tool(Tool::Eraser)));
        match &engine.surface().commands()[0] {
            DrawCommand::Line { style, .. } => assert_eq!(style.composite, Composite::DestinationOut),
            other => panic!("Expected a line, got {:?}", other),
        }
    }

    #[test]
    fn test_draw_without_start_is_degenerate_segment() {
        let mut engine = engine();
        engine.apply_event(&Event::Draw(StrokePoint::new("ghost", 0.5, 0.5)));
        match &engine.surface().commands()[0] {
            DrawCommand::Line { line, .. } => {
                assert_eq!(line.p0, Point::new(500.0, 250.0));
                assert_eq!(line.p1, Point::new(500.1, 250.1));
            }
            other => panic!("Expected a line, got {:?}", other),
        }
        // The next sample connects to it.
        engine.apply_event(&Event::Draw(StrokePoint::new("ghost", 0.6, 0.5)));
        match &engine.surface().commands()[1] {
            DrawCommand::Line { line, .. } => assert_eq!(line.p0, Point::new(500.0, 250.0)),
            other => panic!("Expected a line, got {:?}", other),
        }
    }

    #[test]
    fn test_atomic_events_denormalize() {
        let mut engine = engine();
        engine.apply_event(&Event::Shape(ShapeEvent::new(ShapeGeometry::Circle {
            cx_norm: 0.5,
            cy_norm: 0.5,
            r_norm: 0.1,
        })));
        engine.apply_event(&Event::Image(ImageEvent {
            data_url: "data:image/png;base64,AAAA".into(),
            x_norm: 0.1,
            y_norm: 0.2,
            w_norm: 0.0,
            h_norm: 0.0,
        }));
        let commands = engine.surface().commands();
        match &commands[0] {
            DrawCommand::Circle { circle, .. } => {
                assert_eq!(circle.center, Point::new(500.0, 250.0));
                // Radius scales with width only.
                assert_eq!(circle.radius, 100.0);
            }
            other => panic!("Expected a circle, got {:?}", other),
        }
        match &commands[1] {
            DrawCommand::Image { bounds, .. } => {
                assert_eq!(bounds.origin(), Point::new(100.0, 100.0));
                assert_eq!(bounds.area(), 0.0);
            }
            other => panic!("Expected an image, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_is_idempotent() {
        let store = sample_history();
        let mut engine = engine();
        engine.replay(store.flatten());
        let first = engine.surface().clone();
        engine.replay(store.flatten());
        assert_eq!(engine.surface(), &first);
        assert!(!first.commands().is_empty());
    }

    #[test]
    fn test_live_and_batch_agree() {
        let store = sample_history();

        let mut live = engine();
        for event in store.flatten() {
            live.apply(event);
        }

        let mut batch = engine();
        // Dirty state that replay must discard.
        batch.apply_event(&Event::Start(StrokePoint::new("a", 0.9, 0.9)));
        batch.apply_event(&Event::Draw(StrokePoint::new("a", 0.8, 0.8)));
        batch.replay(store.flatten());

        assert_eq!(live.surface().commands(), batch.surface().commands());
    }

    #[test]
    fn test_replay_respects_history_order() {
        let store = sample_history();
        let mut engine = engine();
        engine.replay(store.flatten());
        let kinds: Vec<&str> = engine
            .surface()
            .commands()
            .iter()
            .map(|c| match c {
                DrawCommand::Line { .. } => "line",
                DrawCommand::Rect { .. } => "rect",
                DrawCommand::Circle { .. } => "circle",
                DrawCommand::Text { .. } => "text",
                DrawCommand::Image { .. } => "image",
            })
            .collect();
        // a: two segments, b: one segment, then rect, text, ghost.
        assert_eq!(kinds, vec!["line", "line", "line", "rect", "text", "line"]);
    }

    #[test]
    fn test_replay_after_resize_rescales() {
        let store = sample_history();
        let mut engine = engine();
        engine.replay(store.flatten());
        engine.surface_mut().resize(Size::new(2000.0, 1000.0));
        engine.replay(store.flatten());
        match &engine.surface().commands()[0] {
            DrawCommand::Line { line, .. } => assert_eq!(line.p0, Point::new(200.0, 100.0)),
            other => panic!("Expected a line, got {:?}", other),
        }
    }
}

//! Detection overlay rendering.
//!
//! `draw_detection_overlay` is a pure function of the areas and the canvas
//! size: it clears the canvas and draws one box and label per area.

pub mod svg;

use crate::analysis::model::{AreaKind, DetectionArea};

pub use self::svg::SvgCanvas;

/// Height of the label strip drawn above each box.
pub const LABEL_HEIGHT: f64 = 20.0;
/// Width of the label strip.
pub const LABEL_WIDTH: f64 = 120.0;
pub const LABEL_FONT_PX: f64 = 12.0;
pub const BOX_LINE_WIDTH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// CSS `rgba()` notation.
    pub fn css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

pub const RED: Rgba = Rgba::new(255, 0, 0, 1.0);
pub const ORANGE: Rgba = Rgba::new(255, 165, 0, 1.0);
pub const YELLOW: Rgba = Rgba::new(255, 255, 0, 1.0);
pub const LABEL_BACKGROUND: Rgba = Rgba::new(0, 0, 0, 0.7);
pub const LABEL_TEXT: Rgba = Rgba::new(255, 255, 255, 1.0);

/// Minimal 2D drawing surface.
pub trait Canvas {
    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba);
    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba, line_width: f64);
    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Rgba, font_px: f64);
}

/// Stroke and fill colours for a kind of area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaStyle {
    pub stroke: Rgba,
    pub fill: Rgba,
}

impl AreaStyle {
    pub fn for_kind(kind: AreaKind) -> Self {
        let base = match kind {
            AreaKind::FacialInconsistency => RED,
            AreaKind::TextureArtifact => ORANGE,
            _ => YELLOW,
        };
        Self {
            stroke: base.with_alpha(0.8),
            fill: base.with_alpha(0.2),
        }
    }
}

/// Label text for an area, e.g. `facial_inconsistency (87%)`.
pub fn area_label(area: &DetectionArea) -> String {
    format!("{} ({}%)", area.kind, (area.confidence * 100.0).round() as i64)
}

/// Clear the canvas and draw every area scaled to `width` x `height`.
pub fn draw_detection_overlay<C: Canvas + ?Sized>(
    canvas: &mut C,
    areas: &[DetectionArea],
    width: f64,
    height: f64,
) {
    canvas.clear_rect(0.0, 0.0, width, height);

    for area in areas {
        let x = area.x * width;
        let y = area.y * height;
        let w = area.width * width;
        let h = area.height * height;
        let style = AreaStyle::for_kind(area.kind);

        canvas.stroke_rect(x, y, w, h, style.stroke, BOX_LINE_WIDTH);
        canvas.fill_rect(x, y, w, h, style.fill);

        canvas.fill_rect(x, y - LABEL_HEIGHT, LABEL_WIDTH, LABEL_HEIGHT, LABEL_BACKGROUND);
        canvas.fill_text(&area_label(area), x + 5.0, y - 5.0, LABEL_TEXT, LABEL_FONT_PX);
    }
}

/// Render the areas as a standalone SVG document.
pub fn render_svg(areas: &[DetectionArea], width: u32, height: u32) -> String {
    let mut canvas = SvgCanvas::new(width, height);
    draw_detection_overlay(&mut canvas, areas, width as f64, height as f64);
    canvas.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Clear(f64, f64, f64, f64),
        Fill(f64, f64, f64, f64, Rgba),
        Stroke(f64, f64, f64, f64, Rgba),
        Text(String, f64, f64),
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
    }

    impl Canvas for Recorder {
        fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
            self.ops.push(Op::Clear(x, y, w, h));
        }
        fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgba) {
            self.ops.push(Op::Fill(x, y, w, h, color));
        }
        fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgba, _line_width: f64) {
            self.ops.push(Op::Stroke(x, y, w, h, color));
        }
        fn fill_text(&mut self, text: &str, x: f64, y: f64, _color: Rgba, _font_px: f64) {
            self.ops.push(Op::Text(text.to_string(), x, y));
        }
    }

    fn area(kind: AreaKind, confidence: f64) -> DetectionArea {
        DetectionArea {
            x: 0.5,
            y: 0.25,
            width: 0.1,
            height: 0.2,
            kind,
            confidence,
            frame: None,
        }
    }

    #[test]
    fn test_empty_areas_only_clear() {
        let mut canvas = Recorder::default();
        draw_detection_overlay(&mut canvas, &[], 640.0, 480.0);
        assert_eq!(canvas.ops, vec![Op::Clear(0.0, 0.0, 640.0, 480.0)]);
    }

    #[test]
    fn test_area_is_scaled_and_labelled() {
        let mut canvas = Recorder::default();
        draw_detection_overlay(&mut canvas, &[area(AreaKind::FacialInconsistency, 0.874)], 200.0, 100.0);

        let stroke = RED.with_alpha(0.8);
        let fill = RED.with_alpha(0.2);
        assert_eq!(
            canvas.ops,
            vec![
                Op::Clear(0.0, 0.0, 200.0, 100.0),
                Op::Stroke(100.0, 25.0, 20.0, 20.0, stroke),
                Op::Fill(100.0, 25.0, 20.0, 20.0, fill),
                Op::Fill(100.0, 5.0, LABEL_WIDTH, LABEL_HEIGHT, LABEL_BACKGROUND),
                Op::Text("facial_inconsistency (87%)".to_string(), 105.0, 20.0),
            ]
        );
    }

    #[test]
    fn test_colours_by_kind() {
        assert_eq!(AreaStyle::for_kind(AreaKind::FacialInconsistency).stroke, RED.with_alpha(0.8));
        assert_eq!(AreaStyle::for_kind(AreaKind::TextureArtifact).stroke, ORANGE.with_alpha(0.8));
        for kind in [AreaKind::MetadataMismatch, AreaKind::LipSyncMismatch, AreaKind::Other] {
            assert_eq!(AreaStyle::for_kind(kind).fill, YELLOW.with_alpha(0.2));
        }
    }

    #[test]
    fn test_label_rounds_confidence() {
        assert_eq!(area_label(&area(AreaKind::TextureArtifact, 0.705)), "texture_artifact (71%)");
        assert_eq!(area_label(&area(AreaKind::Other, 0.7)), "other (70%)");
    }
}

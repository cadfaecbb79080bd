//! SVG canvas: records drawing calls as SVG elements.

use std::fmt::Write as _;

use super::{Canvas, Rgba};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Bounds {
    fn within(&self, other: &Bounds) -> bool {
        self.x >= other.x
            && self.y >= other.y
            && self.x + self.width <= other.x + other.width
            && self.y + self.height <= other.y + other.height
    }
}

#[derive(Debug, Clone)]
pub struct SvgCanvas {
    width: u32,
    height: u32,
    elements: Vec<(Bounds, String)>,
}

impl SvgCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            elements: Vec::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        for (_, element) in &self.elements {
            out.push_str(element);
        }
        out.push_str("</svg>");
        out
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

impl Canvas for SvgCanvas {
    /// SVG has no erase; elements lying entirely inside the region are
    /// dropped instead.
    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let region = Bounds { x, y, width, height };
        let canvas = Bounds {
            x: 0.0,
            y: 0.0,
            width: self.width as f64,
            height: self.height as f64,
        };
        if canvas.within(&region) {
            self.elements.clear();
            return;
        }
        self.elements.retain(|(bounds, _)| !bounds.within(&region));
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba) {
        self.elements.push((
            Bounds { x, y, width, height },
            format!(
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
                x,
                y,
                width,
                height,
                color.css()
            ),
        ));
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba, line_width: f64) {
        let half = line_width / 2.0;
        self.elements.push((
            Bounds {
                x: x - half,
                y: y - half,
                width: width + line_width,
                height: height + line_width,
            },
            format!(
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="{}" stroke-width="{}"/>"#,
                x,
                y,
                width,
                height,
                color.css(),
                line_width
            ),
        ));
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Rgba, font_px: f64) {
        // Rough extent: glyphs are about 0.6em wide and sit above the baseline.
        let width = text.chars().count() as f64 * font_px * 0.6;
        self.elements.push((
            Bounds {
                x,
                y: y - font_px,
                width,
                height: font_px,
            },
            format!(
                r#"<text x="{:.1}" y="{:.1}" fill="{}" font-family="Arial, sans-serif" font-size="{}px">{}</text>"#,
                x,
                y,
                color.css(),
                font_px,
                escape(text)
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::{AreaKind, DetectionArea};
    use crate::overlay::{draw_detection_overlay, render_svg};

    #[test]
    fn test_empty_overlay_renders_bare_svg() {
        let svg = render_svg(&[], 640, 480);
        assert_eq!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="640" height="480" viewBox="0 0 640 480"></svg>"#
        );
    }

    #[test]
    fn test_redraw_clears_previous_boxes() {
        let area = DetectionArea {
            x: 0.4,
            y: 0.4,
            width: 0.1,
            height: 0.1,
            kind: AreaKind::TextureArtifact,
            confidence: 0.9,
            frame: None,
        };
        let mut canvas = SvgCanvas::new(640, 480);
        draw_detection_overlay(&mut canvas, &[area], 640.0, 480.0);
        assert!(!canvas.is_blank());
        let svg = canvas.render();
        assert_eq!(svg.matches("<rect").count(), 3);
        assert!(svg.contains("texture_artifact (90%)"));
        assert!(svg.contains("rgba(255, 165, 0, 0.8)"));

        draw_detection_overlay(&mut canvas, &[], 640.0, 480.0);
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_text_is_escaped() {
        let mut canvas = SvgCanvas::new(10, 10);
        canvas.fill_text("<a&b>", 20.0, 20.0, Rgba::new(0, 0, 0, 1.0), 12.0);
        assert!(canvas.render().contains("&lt;a&amp;b&gt;"));
    }
}

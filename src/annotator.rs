// Annotation module: draws face boxes and emotion readouts onto frames

use crate::error::{EmotionOverlayError, Result};
use crate::models::{AnalysisResult, Color};
use opencv::core::{Mat, Point};
use opencv::imgproc;

/// Box color for labels missing from the table
pub const DEFAULT_COLOR: Color = Color::bgr(0, 255, 0);

/// Dominant emotion -> box color
const EMOTION_COLORS: [(&str, Color); 6] = [
    ("sad", Color::bgr(255, 0, 0)),
    ("angry", Color::bgr(0, 0, 255)),
    ("happy", Color::bgr(0, 255, 255)),
    ("surprise", Color::bgr(255, 255, 0)),
    ("fear", Color::bgr(128, 0, 128)),
    ("disgust", Color::bgr(0, 128, 128)),
];

const BOX_THICKNESS: i32 = 2;
const LABEL_LIFT: i32 = 10;
const LABEL_STYLE: TextStyle = TextStyle::new(0.7, 2);
const LABEL_BACKGROUND: Color = Color::bgr(0, 0, 0);

const TOP_EMOTIONS: usize = 3;
const PROBABILITY_STYLE: TextStyle = TextStyle::new(0.5, 1);
const PROBABILITY_TEXT: Color = Color::bgr(255, 255, 255);
const PROBABILITY_BACKGROUND: Color = Color::bgr(50, 50, 50);
const LINE_SPACING: i32 = 20;

/// Font parameters for a line of text
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub font_scale: f64,
    pub thickness: i32,
}

impl TextStyle {
    pub const fn new(font_scale: f64, thickness: i32) -> Self {
        Self {
            font_scale,
            thickness,
        }
    }
}

/// Rendered size of a line of text
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextExtent {
    pub width: i32,
    pub height: i32,
    pub baseline: i32,
}

/// Drawing surface the annotator renders onto.
///
/// Implemented for OpenCV `Mat`; tests use a recording fake.
pub trait Canvas {
    fn draw_rectangle(
        &mut self,
        top_left: Point,
        bottom_right: Point,
        color: Color,
        thickness: i32,
    ) -> Result<()>;

    fn fill_rectangle(&mut self, top_left: Point, bottom_right: Point, color: Color) -> Result<()>;

    fn text_extent(&self, text: &str, style: TextStyle) -> Result<TextExtent>;

    /// Draws text with its baseline-left corner at `origin`
    fn draw_text(&mut self, text: &str, origin: Point, style: TextStyle, color: Color)
        -> Result<()>;
}

/// Looks up the box color for a dominant emotion label
pub fn color_for_emotion(label: &str) -> Color {
    EMOTION_COLORS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

/// Text shown above the face box
pub fn label_text(result: &AnalysisResult) -> String {
    format!("Emotion: {}", result.dominant_emotion)
}

/// The three most likely emotions, formatted one per line
pub fn probability_lines(result: &AnalysisResult) -> Vec<String> {
    result
        .ranked_emotions()
        .into_iter()
        .take(TOP_EMOTIONS)
        .map(|(label, prob)| format!("{label}: {prob:.1}%"))
        .collect()
}

/// Draws the box, label and probability list for one face
pub fn annotate_face<C: Canvas + ?Sized>(canvas: &mut C, result: &AnalysisResult) -> Result<()> {
    let region = result.region;
    let color = color_for_emotion(&result.dominant_emotion);

    canvas.draw_rectangle(
        Point::new(region.x, region.y),
        Point::new(region.right(), region.bottom()),
        color,
        BOX_THICKNESS,
    )?;

    draw_text_with_background(
        canvas,
        &label_text(result),
        Point::new(region.x, region.y - LABEL_LIFT),
        LABEL_STYLE,
        color,
        LABEL_BACKGROUND,
    )?;

    let mut y_offset = region.bottom() + LINE_SPACING;
    for line in probability_lines(result) {
        draw_text_with_background(
            canvas,
            &line,
            Point::new(region.x, y_offset),
            PROBABILITY_STYLE,
            PROBABILITY_TEXT,
            PROBABILITY_BACKGROUND,
        )?;
        y_offset += LINE_SPACING;
    }

    Ok(())
}

/// Draws every result onto the canvas, stopping at the first failure
pub fn annotate_frame<C: Canvas + ?Sized>(canvas: &mut C, results: &[AnalysisResult]) -> Result<()> {
    for result in results {
        annotate_face(canvas, result)?;
    }
    Ok(())
}

fn draw_text_with_background<C: Canvas + ?Sized>(
    canvas: &mut C,
    text: &str,
    origin: Point,
    style: TextStyle,
    text_color: Color,
    background: Color,
) -> Result<()> {
    let extent = canvas.text_extent(text, style)?;
    canvas.fill_rectangle(
        Point::new(origin.x, origin.y - extent.height - extent.baseline),
        Point::new(origin.x + extent.width, origin.y + extent.baseline),
        background,
    )?;
    canvas.draw_text(text, origin, style, text_color)
}

impl Canvas for Mat {
    fn draw_rectangle(
        &mut self,
        top_left: Point,
        bottom_right: Point,
        color: Color,
        thickness: i32,
    ) -> Result<()> {
        imgproc::rectangle_points(
            self,
            top_left,
            bottom_right,
            color.to_scalar(),
            thickness,
            imgproc::LINE_8,
            0,
        )
        .map_err(|e| EmotionOverlayError::Drawing(format!("Failed to draw rectangle: {e}")))
    }

    fn fill_rectangle(&mut self, top_left: Point, bottom_right: Point, color: Color) -> Result<()> {
        imgproc::rectangle_points(
            self,
            top_left,
            bottom_right,
            color.to_scalar(),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .map_err(|e| EmotionOverlayError::Drawing(format!("Failed to fill rectangle: {e}")))
    }

    fn text_extent(&self, text: &str, style: TextStyle) -> Result<TextExtent> {
        let mut baseline = 0;
        let size = imgproc::get_text_size(
            text,
            imgproc::FONT_HERSHEY_SIMPLEX,
            style.font_scale,
            style.thickness,
            &mut baseline,
        )
        .map_err(|e| EmotionOverlayError::Drawing(format!("Failed to measure text: {e}")))?;

        Ok(TextExtent {
            width: size.width,
            height: size.height,
            baseline,
        })
    }

    fn draw_text(
        &mut self,
        text: &str,
        origin: Point,
        style: TextStyle,
        color: Color,
    ) -> Result<()> {
        imgproc::put_text(
            self,
            text,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            style.font_scale,
            color.to_scalar(),
            style.thickness,
            imgproc::LINE_AA,
            false,
        )
        .map_err(|e| EmotionOverlayError::Drawing(format!("Failed to draw text: {e}")))
    }
}

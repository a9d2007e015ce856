// Core data models for the emotion overlay

use std::collections::BTreeMap;

/// Represents a single decoded camera frame with RGB data
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
}

/// Pixel rectangle locating a face within a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }
}

impl From<opencv::core::Rect> for Region {
    fn from(rect: opencv::core::Rect) -> Self {
        Self::new(rect.x, rect.y, rect.width, rect.height)
    }
}

/// A display color in OpenCV's BGR channel order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl Color {
    pub const fn bgr(b: u8, g: u8, r: u8) -> Self {
        Self { b, g, r }
    }

    pub fn to_scalar(self) -> opencv::core::Scalar {
        opencv::core::Scalar::new(self.b as f64, self.g as f64, self.r as f64, 0.0)
    }
}

/// Analysis of one detected face
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisResult {
    /// Where the face sits in the frame
    pub region: Region,
    /// Label with the highest probability
    pub dominant_emotion: String,
    /// Probability percentage per emotion label (sums to ~100)
    pub emotion: BTreeMap<String, f32>,
}

impl AnalysisResult {
    /// Builds a result from label/probability pairs, picking the dominant
    /// label as the highest probability.
    pub fn from_scores<I, S>(region: Region, scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let emotion: BTreeMap<String, f32> = scores
            .into_iter()
            .map(|(label, prob)| (label.into(), prob))
            .collect();

        let dominant_emotion = emotion
            .iter()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| label.clone())
            .unwrap_or_default();

        Self {
            region,
            dominant_emotion,
            emotion,
        }
    }

    /// Emotion/probability pairs sorted from most to least likely
    pub fn ranked_emotions(&self) -> Vec<(&str, f32)> {
        let mut ranked: Vec<(&str, f32)> = self
            .emotion
            .iter()
            .map(|(label, prob)| (label.as_str(), *prob))
            .collect();
        ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

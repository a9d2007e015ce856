// Emotion analysis: face detection plus ONNX emotion classification

use crate::config::AppConfig;
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, Region};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{info, warn};

/// Side length of the square classifier input
const INPUT_SIZE: usize = 260;

/// Classifier output order: 0=angry, 1=disgust, 2=fear, 3=happy, 4=sad,
/// 5=surprise, 6=neutral, 7=contempt
const EMOTION_LABELS: [&str; 8] = [
    "angry", "disgust", "fear", "happy", "sad", "surprise", "neutral", "contempt",
];

/// Bounded wrapper around an emotion recognizer.
///
/// `Ok` with an empty list means no face was found in the frame.
pub trait Analyzer<F> {
    fn analyze(&mut self, frame: &F) -> Result<Vec<AnalysisResult>, AnalysisError>;
}

/// A detected face: its location and the grayscale crop
pub struct FaceCrop {
    pub region: Region,
    pub pixels: Vec<u8>,
    pub height: u32,
}

/// Face detector using OpenCV Haar Cascade
pub struct FaceDetector {
    classifier: CascadeClassifier,
}

impl FaceDetector {
    /// Creates a new FaceDetector by loading the Haar Cascade classifier
    pub fn new(cascade_path: &str) -> Result<Self, AnalysisError> {
        if !Path::new(cascade_path).exists() {
            return Err(AnalysisError::ModelUnavailable(format!(
                "Haar Cascade not found at {cascade_path}"
            )));
        }

        let classifier = CascadeClassifier::new(cascade_path).map_err(|e| {
            AnalysisError::ModelUnavailable(format!("Haar Cascade load failed: {e}"))
        })?;

        if classifier.empty()? {
            return Err(AnalysisError::ModelUnavailable(
                "Haar Cascade classifier is empty".to_string(),
            ));
        }

        Ok(Self { classifier })
    }

    /// Detects faces in a BGR frame and returns their grayscale crops
    pub fn detect_faces(&mut self, frame: &Mat) -> Result<Vec<FaceCrop>, AnalysisError> {
        let mut gray = Mat::default();
        imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY).map_err(|e| {
            AnalysisError::FaceDetection(format!("Failed to convert to grayscale: {e}"))
        })?;

        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                1.1,               // scale factor
                5,                 // min neighbors
                0,                 // flags
                Size::new(40, 40), // min size
                Size::new(0, 0),   // no max size
            )
            .map_err(|e| AnalysisError::FaceDetection(format!("Face detection failed: {e}")))?;

        let mut crops = Vec::with_capacity(faces.len());
        for face_rect in faces.iter() {
            match extract_face_region(&gray, face_rect) {
                Ok(crop) => crops.push(crop),
                Err(e) => {
                    warn!("Failed to extract face region: {}", e);
                    continue;
                }
            }
        }

        Ok(crops)
    }
}

/// Crops a face region out of the grayscale image
fn extract_face_region(gray: &Mat, rect: Rect) -> Result<FaceCrop, AnalysisError> {
    let face_roi = Mat::roi(gray, rect).map_err(|e| {
        AnalysisError::FaceDetection(format!("Failed to crop face region: {e}"))
    })?;

    // ROI views are not continuous; clone before reading bytes
    let face_continuous = face_roi.try_clone().map_err(|e| {
        AnalysisError::FaceDetection(format!("Failed to clone face ROI: {e}"))
    })?;

    let pixels = face_continuous
        .data_bytes()
        .map_err(|e| AnalysisError::FaceDetection(format!("Failed to get face data: {e}")))?;

    Ok(FaceCrop {
        region: Region::from(rect),
        pixels: pixels.to_vec(),
        height: rect.height as u32,
    })
}

/// Turns a grayscale face crop into a normalized HWC RGB input
fn preprocess_face(face: &FaceCrop) -> Result<Vec<f32>, AnalysisError> {
    let face_mat = Mat::from_slice(&face.pixels).map_err(|e| {
        AnalysisError::Preprocessing(format!("Failed to create face Mat: {e}"))
    })?;

    let face_mat = face_mat.reshape(1, face.height as i32).map_err(|e| {
        AnalysisError::Preprocessing(format!("Failed to reshape face Mat: {e}"))
    })?;

    let mut rgb_mat = Mat::default();
    imgproc::cvt_color_def(&face_mat, &mut rgb_mat, imgproc::COLOR_GRAY2RGB)
        .map_err(|e| AnalysisError::Preprocessing(format!("Failed to convert to RGB: {e}")))?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb_mat,
        &mut resized,
        Size::new(INPUT_SIZE as i32, INPUT_SIZE as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )
    .map_err(|e| AnalysisError::Preprocessing(format!("Failed to resize face: {e}")))?;

    let data = resized.data_bytes().map_err(|e| {
        AnalysisError::Preprocessing(format!("Failed to get resized data: {e}"))
    })?;

    Ok(data.iter().map(|&pixel| pixel as f32 / 255.0).collect())
}

/// Reorders interleaved HWC pixels into planar CHW
fn hwc_to_chw(hwc: &[f32], height: usize, width: usize, channels: usize) -> Vec<f32> {
    let mut chw = vec![0.0f32; channels * height * width];
    for h in 0..height {
        for w in 0..width {
            for c in 0..channels {
                let hwc_idx = (h * width + w) * channels + c;
                let chw_idx = c * (height * width) + h * width + w;
                chw[chw_idx] = hwc[hwc_idx];
            }
        }
    }
    chw
}

/// Softmax over raw logits, scaled to percentages
fn softmax_percent(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let exp_sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / exp_sum * 100.0).collect()
}

/// First model output, or `Inference` when the model produced none
fn first_output<I: Iterator>(mut outputs: I) -> Result<I::Item, AnalysisError> {
    outputs
        .next()
        .ok_or_else(|| AnalysisError::Inference("No output from model".to_string()))
}

/// Loads into `slot` unless it already holds a value. A failed load
/// leaves the slot empty so the next call retries.
fn load_once<T>(
    slot: &mut Option<T>,
    load: impl FnOnce() -> Result<T, AnalysisError>,
) -> Result<&mut T, AnalysisError> {
    if slot.is_none() {
        *slot = Some(load()?);
    }
    slot.as_mut()
        .ok_or_else(|| AnalysisError::ModelUnavailable("model not loaded".to_string()))
}

/// Pairs classifier probabilities with their labels. Outputs beyond the
/// known labels are ignored.
fn label_scores(probabilities: &[f32]) -> Vec<(&'static str, f32)> {
    EMOTION_LABELS
        .iter()
        .zip(probabilities.iter())
        .map(|(label, prob)| (*label, *prob))
        .collect()
}

/// Emotion classifier using ONNX Runtime
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
    /// Creates a new EmotionClassifier by loading the ONNX model
    pub fn new(model_path: &str) -> Result<Self, AnalysisError> {
        if !Path::new(model_path).exists() {
            return Err(AnalysisError::ModelUnavailable(format!(
                "ONNX model not found at {model_path}"
            )));
        }

        let session = Session::builder()
            .map_err(|e| {
                AnalysisError::ModelUnavailable(format!("Failed to create session builder: {e}"))
            })?
            .commit_from_file(model_path)
            .map_err(|e| AnalysisError::ModelUnavailable(format!("ONNX model load failed: {e}")))?;

        Ok(Self { session })
    }

    /// Returns the probability percentage for each class
    pub fn classify(&mut self, preprocessed_face: &[f32]) -> Result<Vec<f32>, AnalysisError> {
        // model expects [1, 3, 260, 260] CHW
        let chw_data = hwc_to_chw(preprocessed_face, INPUT_SIZE, INPUT_SIZE, 3);

        let input_array = ndarray::Array4::from_shape_vec((1, 3, INPUT_SIZE, INPUT_SIZE), chw_data)
            .map_err(|e| AnalysisError::Inference(format!("Failed to create input array: {e}")))?;

        let input_tensor = Tensor::from_array(input_array)
            .map_err(|e| AnalysisError::Inference(format!("Failed to create input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| AnalysisError::Inference(format!("Inference failed: {e}")))?;

        let (_, output_value) = first_output(outputs.iter())?;

        let (_, logits) = output_value.try_extract_tensor::<f32>().map_err(|e| {
            AnalysisError::Inference(format!("Failed to extract output tensor: {e}"))
        })?;

        if logits.is_empty() {
            return Err(AnalysisError::Inference(
                "No probabilities in output".to_string(),
            ));
        }

        Ok(softmax_percent(logits))
    }
}

/// Haar cascade + ONNX emotion analyzer.
///
/// Models are loaded on the first frame. Each model is kept once it loads;
/// while one is missing every call fails with `ModelUnavailable` and only
/// the missing model is retried on the next frame.
pub struct EmotionAnalyzer {
    cascade_path: String,
    model_path: String,
    face_detector: Option<FaceDetector>,
    classifier: Option<EmotionClassifier>,
    warned_unavailable: bool,
}

impl EmotionAnalyzer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            cascade_path: config.cascade_path.clone(),
            model_path: config.model_path.clone(),
            face_detector: None,
            classifier: None,
            warned_unavailable: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.face_detector.is_some() && self.classifier.is_some()
    }

    fn ensure_loaded(
        &mut self,
    ) -> Result<(&mut FaceDetector, &mut EmotionClassifier), AnalysisError> {
        let was_loaded = self.is_loaded();

        let cascade_path = &self.cascade_path;
        let model_path = &self.model_path;
        let loaded = load_once(&mut self.face_detector, || FaceDetector::new(cascade_path))
            .and_then(|detector| {
                load_once(&mut self.classifier, || EmotionClassifier::new(model_path))
                    .map(|classifier| (detector, classifier))
            });

        match loaded {
            Ok(models) => {
                if !was_loaded {
                    info!("Emotion models loaded");
                }
                Ok(models)
            }
            Err(e) => {
                if !self.warned_unavailable {
                    warn!("Emotion models not ready, showing unannotated feed: {}", e);
                    self.warned_unavailable = true;
                }
                Err(e)
            }
        }
    }
}

impl Analyzer<Mat> for EmotionAnalyzer {
    fn analyze(&mut self, frame: &Mat) -> Result<Vec<AnalysisResult>, AnalysisError> {
        let (face_detector, classifier) = self.ensure_loaded()?;

        let faces = face_detector.detect_faces(frame)?;

        let mut results = Vec::with_capacity(faces.len());
        for face in &faces {
            let preprocessed = preprocess_face(face)?;
            let probabilities = classifier.classify(&preprocessed)?;
            results.push(AnalysisResult::from_scores(
                face.region,
                label_scores(&probabilities),
            ));
        }

        Ok(results)
    }
}

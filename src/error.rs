// Error types for the emotion overlay

use thiserror::Error;

/// Main error type for the capture/display side of the application
#[derive(Debug, Error)]
pub enum EmotionOverlayError {
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Frame capture failed: {0}")]
    FrameRead(String),

    #[error("Frame decoding failed: {0}")]
    FrameDecode(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Drawing failed: {0}")]
    Drawing(String),

    #[error("OpenCV error: {0}")]
    OpenCV(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for emotion overlay operations
pub type Result<T> = std::result::Result<T, EmotionOverlayError>;

/// Failures raised while analyzing a single frame.
///
/// "No face in frame" is not an error: analyzers report it as an empty
/// result list.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("ONNX Runtime error: {0}")]
    Inference(String),
}

// Conversion from nokhwa errors
impl From<nokhwa::NokhwaError> for EmotionOverlayError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                EmotionOverlayError::DeviceUnavailable(format!("Device {device}: {error}"))
            }
            nokhwa::NokhwaError::OpenStreamError(error) => {
                EmotionOverlayError::DeviceUnavailable(format!("Stream: {error}"))
            }
            nokhwa::NokhwaError::ReadFrameError(error) => EmotionOverlayError::FrameRead(error),
            _ => EmotionOverlayError::DeviceUnavailable(err.to_string()),
        }
    }
}

// Conversion from OpenCV errors
impl From<opencv::Error> for EmotionOverlayError {
    fn from(err: opencv::Error) -> Self {
        EmotionOverlayError::OpenCV(err.to_string())
    }
}

impl From<opencv::Error> for AnalysisError {
    fn from(err: opencv::Error) -> Self {
        AnalysisError::FaceDetection(err.to_string())
    }
}

// Conversion from ONNX Runtime errors
impl From<ort::Error> for AnalysisError {
    fn from(err: ort::Error) -> Self {
        AnalysisError::Inference(err.to_string())
    }
}

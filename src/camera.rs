// Camera module for webcam capture

use crate::config::AppConfig;
use crate::error::{EmotionOverlayError, Result};
use crate::models::Frame;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use tracing::{debug, error, info};

/// Source of frames for the display loop
pub trait FrameSource {
    type Frame;

    /// Blocks until the next frame is available. `FrameDecode` means this
    /// one frame was unusable; any other error means the device is gone.
    fn read_frame(&mut self) -> Result<Self::Frame>;

    /// Stops the device. Called once when the loop shuts down.
    fn release(&mut self);
}

/// Owns the webcam and hands out BGR frames
pub struct CameraManager {
    camera: Camera,
    is_streaming: bool,
}

impl CameraManager {
    /// Opens the configured camera and starts streaming
    pub fn open(config: &AppConfig) -> Result<Self> {
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(config.capture_width, config.capture_height),
                FrameFormat::YUYV,
                config.capture_fps,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(config.camera_index), requested_format)
            .map_err(|e| {
                error!("Failed to open camera {}: {}", config.camera_index, e);
                EmotionOverlayError::from(e)
            })?;

        camera.open_stream().map_err(|e| {
            error!("Failed to open camera stream: {}", e);
            EmotionOverlayError::DeviceUnavailable(e.to_string())
        })?;

        info!(
            "Opened camera '{}' at {}x{}",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );

        Ok(Self {
            camera,
            is_streaming: true,
        })
    }

    /// Captures and decodes one RGB frame (blocking)
    pub fn get_current_frame(&mut self) -> Result<Frame> {
        let frame_data = self.camera.frame().map_err(|e| {
            EmotionOverlayError::FrameRead(format!("Failed to capture frame: {e}"))
        })?;

        let buffer = frame_data.decode_image::<RgbFormat>().map_err(|e| {
            EmotionOverlayError::FrameDecode(format!("Failed to decode frame: {e}"))
        })?;

        let (width, height) = (buffer.width(), buffer.height());
        let data = buffer.into_raw();

        Ok(Frame::new(data, width, height))
    }

    /// Stops the camera stream
    pub fn stop_capture(&mut self) {
        if !self.is_streaming {
            return;
        }

        self.is_streaming = false;

        if let Err(e) = self.camera.stop_stream() {
            error!("Error stopping camera stream: {}", e);
        }
    }
}

/// Converts an RGB frame into an owned BGR `Mat` for OpenCV drawing
pub fn frame_to_bgr_mat(frame: &Frame) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)
        .map_err(|e| EmotionOverlayError::FrameDecode(format!("Failed to create Mat: {e}")))?;

    let mat = mat
        .reshape(3, frame.height as i32)
        .map_err(|e| EmotionOverlayError::FrameDecode(format!("Failed to reshape Mat: {e}")))?;

    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&mat, &mut bgr, imgproc::COLOR_RGB2BGR).map_err(|e| {
        EmotionOverlayError::FrameDecode(format!("Failed to convert to BGR: {e}"))
    })?;

    Ok(bgr)
}

impl FrameSource for CameraManager {
    type Frame = Mat;

    fn read_frame(&mut self) -> Result<Mat> {
        let frame = self.get_current_frame()?;
        frame_to_bgr_mat(&frame)
    }

    fn release(&mut self) {
        debug!("Releasing camera");
        self.stop_capture();
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Vec3b;

    #[test]
    fn rgb_frame_converts_to_bgr() {
        let frame = Frame::new(vec![10, 20, 30, 40, 50, 60], 2, 1);
        let bgr = frame_to_bgr_mat(&frame).unwrap();

        assert_eq!(bgr.rows(), 1);
        assert_eq!(bgr.cols(), 2);
        let first = bgr.at_2d::<Vec3b>(0, 0).unwrap();
        assert_eq!((first[0], first[1], first[2]), (30, 20, 10));
    }

    #[test]
    fn truncated_frame_is_a_decode_error_not_a_disconnect() {
        // 5 bytes cannot hold whole RGB pixels
        let frame = Frame::new(vec![1, 2, 3, 4, 5], 2, 1);
        assert!(matches!(
            frame_to_bgr_mat(&frame),
            Err(EmotionOverlayError::FrameDecode(_))
        ));
    }
}

// Application settings. Values are fixed at startup; nothing is read from
// the environment or the command line.

/// Runtime settings for the overlay
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Camera device index
    pub camera_index: u32,
    /// Requested capture resolution (closest supported is used)
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_fps: u32,
    /// Title of the display window
    pub window_title: String,
    /// Delay passed to the key poll, in milliseconds
    pub key_poll_ms: i32,
    /// Haar cascade used to locate faces
    pub cascade_path: String,
    /// ONNX emotion classifier
    pub model_path: String,
    /// Optional diagnostic log file; console only when `None`
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            capture_width: 640,
            capture_height: 480,
            capture_fps: 30,
            window_title: "Facial Expression Detection - Press Q or ESC to Exit".to_string(),
            key_poll_ms: 1,
            cascade_path: "assets/models/haarcascade_frontalface_default.xml".to_string(),
            model_path: "assets/models/emotion.onnx".to_string(),
            log_file: None,
        }
    }
}

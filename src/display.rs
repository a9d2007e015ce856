// Display module: the OpenCV window the annotated feed is shown in

use crate::config::AppConfig;
use crate::error::{EmotionOverlayError, Result};
use opencv::core::Mat;
use opencv::highgui;
use tracing::{debug, warn};

/// Escape key code as reported by the key poll
pub const KEY_ESCAPE: u8 = 27;

/// Surface that shows frames and reports key presses
pub trait Display<F> {
    fn show(&mut self, frame: &F) -> Result<()>;

    /// Waits briefly for a key press. Returns the low byte of the key
    /// code, or `None` when nothing was pressed.
    fn poll_key(&mut self) -> Result<Option<u8>>;

    /// Tears the surface down. Called once when the loop shuts down.
    fn close(&mut self);
}

/// Returns true for the keys that end the session ('q' and Escape)
pub fn is_quit_key(key: u8) -> bool {
    key == b'q' || key == KEY_ESCAPE
}

/// Maps a raw `wait_key` code to its low byte; negative means no key
fn key_from_code(code: i32) -> Option<u8> {
    if code < 0 {
        None
    } else {
        Some((code & 0xFF) as u8)
    }
}

/// A single highgui window
pub struct Window {
    title: String,
    key_poll_ms: i32,
    is_open: bool,
}

impl Window {
    /// Creates the window sized to the frames it will show
    pub fn open(config: &AppConfig) -> Result<Self> {
        highgui::named_window(&config.window_title, highgui::WINDOW_AUTOSIZE).map_err(|e| {
            EmotionOverlayError::Display(format!("Failed to create window: {e}"))
        })?;

        Ok(Self {
            title: config.window_title.clone(),
            key_poll_ms: config.key_poll_ms,
            is_open: true,
        })
    }
}

impl Display<Mat> for Window {
    fn show(&mut self, frame: &Mat) -> Result<()> {
        highgui::imshow(&self.title, frame)
            .map_err(|e| EmotionOverlayError::Display(format!("Failed to show frame: {e}")))
    }

    fn poll_key(&mut self) -> Result<Option<u8>> {
        let code = highgui::wait_key(self.key_poll_ms)
            .map_err(|e| EmotionOverlayError::Display(format!("Failed to poll keys: {e}")))?;
        Ok(key_from_code(code))
    }

    fn close(&mut self) {
        if !self.is_open {
            return;
        }
        self.is_open = false;

        debug!("Closing window '{}'", self.title);
        if let Err(e) = highgui::destroy_all_windows() {
            warn!("Error closing window: {}", e);
        }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.close();
    }
}

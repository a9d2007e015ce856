use emotion_overlay::camera::CameraManager;
use emotion_overlay::config::AppConfig;
use emotion_overlay::display::Window;
use emotion_overlay::emotion::EmotionAnalyzer;
use emotion_overlay::error::Result;
use emotion_overlay::logging::init_logging;
use emotion_overlay::session::{Session, StopReason};
use std::process::ExitCode;
use tracing::{error, info};

fn run(config: &AppConfig) -> Result<StopReason> {
    info!("Starting facial expression detection...");

    let camera = CameraManager::open(config).inspect_err(|_| {
        error!("Error: could not open the webcam.");
        error!("Make sure the camera is not in use by another application and its driver is installed.");
        error!("On a laptop, make sure your terminal has been granted camera permission.");
    })?;

    info!("Webcam opened. Detecting facial expressions in real time...");
    info!("Press 'q' or 'ESC' to quit.");

    let window = Window::open(config)?;
    let analyzer = EmotionAnalyzer::new(config);

    info!("Emotion models are loaded on the first frame; expect a short pause at startup.");

    let mut session = Session::new(camera, analyzer, window);
    session.run()
}

fn main() -> ExitCode {
    let config = AppConfig::default();

    init_logging(&config);

    match run(&config) {
        Ok(reason) => {
            info!("Facial expression detection finished ({:?}).", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// Capture/display loop: read, analyze, annotate, show, poll keys

use crate::annotator::{annotate_frame, Canvas};
use crate::camera::FrameSource;
use crate::display::{is_quit_key, Display};
use crate::emotion::Analyzer;
use crate::error::{EmotionOverlayError, Result};
use tracing::{debug, info, warn};

/// Undecodable frames in a row after which the camera is treated as gone
const MAX_CONSECUTIVE_DECODE_FAILURES: u32 = 30;

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Running,
    Terminating,
    Closed,
}

/// Why the loop ended normally
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    QuitRequested,
    SourceDisconnected,
}

/// Frame counters reported at shutdown
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_shown: u64,
    pub frames_annotated: u64,
    pub frames_skipped: u64,
}

/// Owns the camera, analyzer and window for the lifetime of the loop.
///
/// The source is released and the display closed exactly once, either at
/// the end of `run` or when the session is dropped.
pub struct Session<S, A, D>
where
    S: FrameSource,
    S::Frame: Canvas,
    A: Analyzer<S::Frame>,
    D: Display<S::Frame>,
{
    source: S,
    analyzer: A,
    display: D,
    state: SessionState,
    stats: SessionStats,
    decode_failures: u32,
}

impl<S, A, D> Session<S, A, D>
where
    S: FrameSource,
    S::Frame: Canvas,
    A: Analyzer<S::Frame>,
    D: Display<S::Frame>,
{
    pub fn new(source: S, analyzer: A, display: D) -> Self {
        Self {
            source,
            analyzer,
            display,
            state: SessionState::Init,
            stats: SessionStats::default(),
            decode_failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Runs until a quit key, a capture failure or a display error.
    /// Shutdown happens on every path before this returns.
    pub fn run(&mut self) -> Result<StopReason> {
        self.state = SessionState::Running;

        let outcome = loop {
            match self.step() {
                Ok(Some(reason)) => break Ok(reason),
                Ok(None) => continue,
                Err(e) => break Err(e),
            }
        };

        self.shutdown();
        outcome
    }

    /// One iteration of the loop. Returns a stop reason when the loop
    /// should end.
    fn step(&mut self) -> Result<Option<StopReason>> {
        let mut frame = match self.source.read_frame() {
            Ok(frame) => {
                self.decode_failures = 0;
                frame
            }
            Err(EmotionOverlayError::FrameDecode(e)) => {
                self.stats.frames_skipped += 1;
                self.decode_failures += 1;
                if self.decode_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                    warn!(
                        "{} frames in a row could not be decoded, stopping: {}",
                        self.decode_failures, e
                    );
                    return Ok(Some(StopReason::SourceDisconnected));
                }
                debug!("Skipping undecodable frame: {}", e);
                return Ok(None);
            }
            Err(e) => {
                info!("Failed to grab a frame from the camera, stopping: {}", e);
                return Ok(Some(StopReason::SourceDisconnected));
            }
        };

        // Annotation is best effort: a failed analysis or drawing call
        // leaves the frame as it is.
        match self.analyzer.analyze(&frame) {
            Ok(results) if results.is_empty() => {}
            Ok(results) => match annotate_frame(&mut frame, &results) {
                Ok(()) => self.stats.frames_annotated += 1,
                Err(e) => debug!("Annotation failed: {}", e),
            },
            Err(e) => debug!("Analysis failed: {}", e),
        }

        self.display.show(&frame)?;
        self.stats.frames_shown += 1;

        if let Some(key) = self.display.poll_key()? {
            if is_quit_key(key) {
                info!("Quit key pressed");
                return Ok(Some(StopReason::QuitRequested));
            }
        }

        Ok(None)
    }

    fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Terminating;

        self.source.release();
        self.display.close();

        self.state = SessionState::Closed;
        info!(
            "Session closed after {} frames ({} annotated, {} skipped)",
            self.stats.frames_shown, self.stats.frames_annotated, self.stats.frames_skipped
        );
    }
}

impl<S, A, D> Drop for Session<S, A, D>
where
    S: FrameSource,
    S::Frame: Canvas,
    A: Analyzer<S::Frame>,
    D: Display<S::Frame>,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::tests::RecordingCanvas;
    use crate::display::KEY_ESCAPE;
    use crate::error::{AnalysisError, EmotionOverlayError};
    use crate::models::{AnalysisResult, Region};
    use rstest::rstest;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Shared record of what the fakes saw
    #[derive(Debug, Default)]
    struct Log {
        releases: usize,
        closes: usize,
        /// Draw op count of each frame that reached the display
        shown: Vec<usize>,
        analyzed: usize,
    }

    type SharedLog = Rc<RefCell<Log>>;

    #[derive(Clone, Copy)]
    enum Read {
        Frame,
        Corrupt,
    }

    /// Plays back its reads, then reports a disconnect
    struct FakeSource {
        reads: VecDeque<Read>,
        log: SharedLog,
    }

    impl FrameSource for FakeSource {
        type Frame = RecordingCanvas;

        fn read_frame(&mut self) -> Result<RecordingCanvas> {
            match self.reads.pop_front() {
                Some(Read::Frame) => Ok(RecordingCanvas::default()),
                Some(Read::Corrupt) => {
                    Err(EmotionOverlayError::FrameDecode("bad mjpeg".to_string()))
                }
                None => Err(EmotionOverlayError::FrameRead("disconnected".to_string())),
            }
        }

        fn release(&mut self) {
            self.log.borrow_mut().releases += 1;
        }
    }

    enum Outcome {
        Faces(usize),
        Fail,
    }

    struct FakeAnalyzer {
        script: VecDeque<Outcome>,
        log: SharedLog,
    }

    impl Analyzer<RecordingCanvas> for FakeAnalyzer {
        fn analyze(
            &mut self,
            _frame: &RecordingCanvas,
        ) -> std::result::Result<Vec<AnalysisResult>, AnalysisError> {
            self.log.borrow_mut().analyzed += 1;
            match self.script.pop_front().unwrap_or(Outcome::Faces(0)) {
                Outcome::Faces(n) => Ok((0..n)
                    .map(|i| {
                        AnalysisResult::from_scores(
                            Region::new(i as i32 * 100, 10, 50, 50),
                            [("happy", 80.2), ("sad", 10.1), ("angry", 9.7)],
                        )
                    })
                    .collect()),
                Outcome::Fail => Err(AnalysisError::ModelUnavailable("not ready".to_string())),
            }
        }
    }

    struct FakeDisplay {
        keys: VecDeque<Option<u8>>,
        fail_show: bool,
        log: SharedLog,
    }

    impl Display<RecordingCanvas> for FakeDisplay {
        fn show(&mut self, frame: &RecordingCanvas) -> Result<()> {
            if self.fail_show {
                return Err(EmotionOverlayError::Display("window gone".to_string()));
            }
            self.log.borrow_mut().shown.push(frame.ops.len());
            Ok(())
        }

        fn poll_key(&mut self) -> Result<Option<u8>> {
            Ok(self.keys.pop_front().flatten())
        }

        fn close(&mut self) {
            self.log.borrow_mut().closes += 1;
        }
    }

    fn session(
        frames: usize,
        script: Vec<Outcome>,
        keys: Vec<Option<u8>>,
    ) -> (Session<FakeSource, FakeAnalyzer, FakeDisplay>, SharedLog) {
        session_with_reads(vec![Read::Frame; frames], script, keys)
    }

    fn session_with_reads(
        reads: Vec<Read>,
        script: Vec<Outcome>,
        keys: Vec<Option<u8>>,
    ) -> (Session<FakeSource, FakeAnalyzer, FakeDisplay>, SharedLog) {
        let log = SharedLog::default();
        let session = Session::new(
            FakeSource {
                reads: reads.into(),
                log: log.clone(),
            },
            FakeAnalyzer {
                script: script.into(),
                log: log.clone(),
            },
            FakeDisplay {
                keys: keys.into(),
                fail_show: false,
                log: log.clone(),
            },
        );
        (session, log)
    }

    #[test]
    fn read_failure_ends_loop_and_releases_once() {
        let (mut session, log) = session(3, vec![], vec![]);

        assert_eq!(session.state(), SessionState::Init);
        assert_eq!(session.run().unwrap(), StopReason::SourceDisconnected);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.stats().frames_shown, 3);

        drop(session);
        let log = log.borrow();
        assert_eq!(log.releases, 1);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn analysis_failure_shows_frame_unannotated_and_continues() {
        let (mut session, log) = session(3, vec![Outcome::Faces(1), Outcome::Fail, Outcome::Faces(1)], vec![]);

        session.run().unwrap();

        let log = log.borrow();
        assert_eq!(log.analyzed, 3);
        assert_eq!(log.shown.len(), 3);
        assert!(log.shown[0] > 0);
        assert_eq!(log.shown[1], 0);
        assert!(log.shown[2] > 0);
        assert_eq!(session.stats().frames_annotated, 2);
    }

    #[test]
    fn no_face_is_shown_without_annotations() {
        let (mut session, log) = session(2, vec![Outcome::Faces(0), Outcome::Faces(2)], vec![]);

        session.run().unwrap();

        let log = log.borrow();
        assert_eq!(log.shown[0], 0);
        // two faces: box + label plate/text + 3 plates/texts each
        assert_eq!(log.shown[1], 2 * (1 + 2 + 3 * 2));
        assert_eq!(session.stats().frames_annotated, 1);
    }

    #[rstest]
    #[case(b'q')]
    #[case(KEY_ESCAPE)]
    fn quit_keys_end_loop_and_release_once(#[case] key: u8) {
        let (mut session, log) = session(10, vec![], vec![None, Some(b'a'), Some(key)]);

        assert_eq!(session.run().unwrap(), StopReason::QuitRequested);
        assert_eq!(session.stats().frames_shown, 3);

        drop(session);
        let log = log.borrow();
        assert_eq!(log.releases, 1);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn other_keys_do_not_end_loop() {
        let keys = vec![Some(b'Q'), Some(b'x'), Some(b' '), Some(13), Some(b'w')];
        let (mut session, _log) = session(5, vec![], keys);

        // every frame is consumed; the loop only ends on disconnect
        assert_eq!(session.run().unwrap(), StopReason::SourceDisconnected);
        assert_eq!(session.stats().frames_shown, 5);
    }

    #[test]
    fn display_error_still_releases_devices() {
        let (mut session, log) = session(5, vec![], vec![]);
        session.display.fail_show = true;

        assert!(matches!(session.run(), Err(EmotionOverlayError::Display(_))));
        assert_eq!(session.state(), SessionState::Closed);

        drop(session);
        let log = log.borrow();
        assert_eq!(log.releases, 1);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn dropping_an_unrun_session_still_releases() {
        let (session, log) = session(1, vec![], vec![]);
        drop(session);

        let log = log.borrow();
        assert_eq!(log.releases, 1);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn undecodable_frame_is_skipped_not_treated_as_disconnect() {
        let reads = vec![Read::Frame, Read::Corrupt, Read::Frame, Read::Corrupt, Read::Frame];
        let (mut session, log) = session_with_reads(reads, vec![], vec![]);

        assert_eq!(session.run().unwrap(), StopReason::SourceDisconnected);
        assert_eq!(session.stats().frames_shown, 3);
        assert_eq!(session.stats().frames_skipped, 2);

        drop(session);
        let log = log.borrow();
        assert_eq!(log.analyzed, 3);
        assert_eq!(log.releases, 1);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn long_run_of_undecodable_frames_ends_session() {
        let mut reads = vec![Read::Corrupt; MAX_CONSECUTIVE_DECODE_FAILURES as usize];
        // never reached
        reads.push(Read::Frame);
        let (mut session, log) = session_with_reads(reads, vec![], vec![]);

        assert_eq!(session.run().unwrap(), StopReason::SourceDisconnected);
        assert_eq!(session.stats().frames_shown, 0);
        assert_eq!(
            session.stats().frames_skipped,
            MAX_CONSECUTIVE_DECODE_FAILURES as u64
        );
        assert_eq!(log.borrow().releases, 1);
    }

    #[test]
    fn good_frame_resets_the_decode_failure_run() {
        let limit = MAX_CONSECUTIVE_DECODE_FAILURES as usize;
        let mut reads = vec![Read::Corrupt; limit - 1];
        reads.push(Read::Frame);
        reads.extend(vec![Read::Corrupt; limit - 1]);
        reads.push(Read::Frame);
        let (mut session, _log) = session_with_reads(reads, vec![], vec![]);

        session.run().unwrap();
        assert_eq!(session.stats().frames_shown, 2);
        assert_eq!(session.stats().frames_skipped, 2 * (limit as u64 - 1));
    }
}

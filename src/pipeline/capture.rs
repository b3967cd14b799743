use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::{
    camera::{CameraSource, SourceOpener, VideoSource},
    landmarks::LandmarkProvider,
    skeleton,
};
use crate::{
    classifier::{classify_hand_gesture, classify_pose},
    config::CaptureSettings,
    types::{AnnotatedFrame, Frame, PoseLabel},
};

/// Display end of the capture loop.
pub trait FrameSink: Send + Sync + 'static {
    /// Called by the controller before it spawns a run, ahead of the source
    /// open. Clears any quit left over from the previous run.
    fn arm(&self) {}

    /// Called once before the first frame of a run.
    fn begin(&self) {}

    fn publish(&self, frame: AnnotatedFrame);

    /// Polled after every frame; `true` ends the run.
    fn quit_requested(&self) -> bool;

    /// Called once after the run ended, whatever the reason.
    fn end(&self) {}
}

/// Sink that forwards frames to the UI thread, dropping them while the UI is
/// still busy with the previous one.
pub struct ChannelSink {
    frame_tx: Sender<AnnotatedFrame>,
    quit: AtomicBool,
}

impl ChannelSink {
    pub fn new(frame_tx: Sender<AnnotatedFrame>) -> Self {
        Self {
            frame_tx,
            quit: AtomicBool::new(false),
        }
    }

    /// Asks the running capture loop to stop after the current frame.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }
}

impl FrameSink for ChannelSink {
    fn arm(&self) {
        self.quit.store(false, Ordering::SeqCst);
    }

    fn publish(&self, frame: AnnotatedFrame) {
        let _ = self.frame_tx.try_send(frame);
    }

    fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

/// Why a capture run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    SourceEnded,
    QuitRequested,
}

/// Paces the loop to at most one accepted frame per interval.
///
/// The wait blocks on the cancellation channel, so a stop request ends it
/// immediately instead of after the interval.
pub struct FrameGate {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl FrameGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    /// Waits for the next slot. Returns `false` if cancellation arrived first.
    pub fn wait(&mut self, cancel: &Receiver<()>) -> bool {
        let remaining = self
            .last_accepted
            .map(|last| self.interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO);

        let cancelled = if remaining.is_zero() {
            !matches!(cancel.try_recv(), Err(TryRecvError::Empty))
        } else {
            !matches!(cancel.recv_timeout(remaining), Err(RecvTimeoutError::Timeout))
        };
        if cancelled {
            return false;
        }

        self.last_accepted = Some(Instant::now());
        true
    }
}

/// Detects, classifies and draws one frame. Every frame is handled on its
/// own; nothing is carried over from earlier frames.
pub fn annotate_frame(
    mut frame: Frame,
    provider: &mut dyn LandmarkProvider,
    draw_landmarks: bool,
) -> AnnotatedFrame {
    let pose = provider.detect_pose(&frame).unwrap_or_else(|err| {
        log::warn!("pose detection failed: {err:?}");
        None
    });
    let hands = provider.detect_hands(&frame).unwrap_or_else(|err| {
        log::warn!("hand detection failed: {err:?}");
        Vec::new()
    });

    let pose_label = pose.as_ref().map_or(PoseLabel::Unknown, classify_pose);
    let gestures = hands.iter().map(classify_hand_gesture).collect();

    if draw_landmarks {
        if let Some(pose) = &pose {
            skeleton::draw_pose(&mut frame, pose);
        }
        for hand in &hands {
            skeleton::draw_hand(&mut frame, hand);
        }
    }

    AnnotatedFrame {
        frame,
        pose: pose_label,
        gestures,
    }
}

pub fn run_capture_loop(
    source: &mut dyn VideoSource,
    provider: &mut dyn LandmarkProvider,
    sink: &dyn FrameSink,
    settings: &CaptureSettings,
    cancel: &Receiver<()>,
) -> LoopExit {
    let mut gate = FrameGate::new(settings.min_frame_interval());
    let mut frames: u64 = 0;

    let exit = loop {
        if !gate.wait(cancel) {
            break LoopExit::Cancelled;
        }

        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => {
                log::warn!("video source failed after {frames} frames: {err:?}");
                break LoopExit::SourceEnded;
            }
        };

        sink.publish(annotate_frame(frame, provider, settings.draw_landmarks));
        frames += 1;

        if sink.quit_requested() {
            break LoopExit::QuitRequested;
        }
    };

    log::info!("capture loop ended after {frames} frames: {exit:?}");
    exit
}

/// Opens `source` and runs the capture loop until it ends. The video handle is
/// released before returning.
pub fn run_session(
    opener: &dyn SourceOpener,
    source: &CameraSource,
    provider: &Mutex<Box<dyn LandmarkProvider>>,
    sink: &dyn FrameSink,
    settings: &CaptureSettings,
    cancel: &Receiver<()>,
) -> Result<LoopExit> {
    let mut video = opener.open(source, settings)?;
    log::info!("capturing from {source}");

    // A stop or a quit may have arrived while the source was opening.
    if !matches!(cancel.try_recv(), Err(TryRecvError::Empty)) {
        return Ok(LoopExit::Cancelled);
    }
    if sink.quit_requested() {
        return Ok(LoopExit::QuitRequested);
    }

    let mut provider = provider
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    sink.begin();
    let exit = run_capture_loop(video.as_mut(), provider.as_mut(), sink, settings, cancel);
    drop(video);
    sink.end();
    Ok(exit)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, atomic::AtomicUsize},
    };

    use anyhow::anyhow;
    use crossbeam_channel::{bounded, unbounded};

    use super::*;
    use crate::types::{
        GestureLabel, HAND_LANDMARK_COUNT, HandLandmarks, LandmarkPoint, PoseJoint, PoseLandmarks,
    };

    pub(crate) fn t_pose() -> PoseLandmarks {
        let mut pose = PoseLandmarks::default();
        pose.set_joint(PoseJoint::LeftShoulder, LandmarkPoint::new(0.3, 0.5));
        pose.set_joint(PoseJoint::RightShoulder, LandmarkPoint::new(0.7, 0.5));
        pose.set_joint(PoseJoint::LeftWrist, LandmarkPoint::new(0.1, 0.55));
        pose.set_joint(PoseJoint::RightWrist, LandmarkPoint::new(0.9, 0.52));
        pose
    }

    pub(crate) fn thumb_up() -> HandLandmarks {
        let mut points = [LandmarkPoint::new(0.5, 0.5); HAND_LANDMARK_COUNT];
        points[4] = LandmarkPoint::new(0.5, 0.2);
        for tip in [8, 12, 16, 20] {
            points[tip] = LandmarkPoint::new(0.5, 0.8);
        }
        HandLandmarks::new(points, 0.9)
    }

    pub(crate) fn frame() -> Frame {
        Frame::new(vec![0; 4 * 4 * 4], 4, 4)
    }

    /// Scripted source: yields the queued results, then fails.
    pub(crate) struct ScriptedSource {
        pub reads: VecDeque<Result<Option<Frame>>>,
    }

    impl ScriptedSource {
        pub(crate) fn frames(count: usize) -> Self {
            Self {
                reads: (0..count).map(|_| Ok(Some(frame()))).collect(),
            }
        }
    }

    impl VideoSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            self.reads
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("end of script")))
        }
    }

    /// Source that produces frames forever.
    pub(crate) struct EndlessSource;

    impl VideoSource for EndlessSource {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            Ok(Some(frame()))
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct FixedProvider {
        pub pose: Option<PoseLandmarks>,
        pub hands: Vec<HandLandmarks>,
        pub fail: bool,
    }

    impl LandmarkProvider for FixedProvider {
        fn detect_pose(&mut self, _frame: &Frame) -> Result<Option<PoseLandmarks>> {
            if self.fail {
                return Err(anyhow!("pose model exploded"));
            }
            Ok(self.pose.clone())
        }

        fn detect_hands(&mut self, _frame: &Frame) -> Result<Vec<HandLandmarks>> {
            if self.fail {
                return Err(anyhow!("hand model exploded"));
            }
            Ok(self.hands.clone())
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub frames: Mutex<Vec<AnnotatedFrame>>,
        pub quit_after: Option<usize>,
        pub begins: AtomicUsize,
        pub ends: AtomicUsize,
    }

    impl FrameSink for RecordingSink {
        fn begin(&self) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }

        fn publish(&self, frame: AnnotatedFrame) {
            self.frames.lock().unwrap().push(frame);
        }

        fn quit_requested(&self) -> bool {
            self.quit_after
                .is_some_and(|n| self.frames.lock().unwrap().len() >= n)
        }

        fn end(&self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_settings() -> CaptureSettings {
        CaptureSettings {
            fps_limit: 1000,
            ..CaptureSettings::default()
        }
    }

    #[test]
    fn missing_detections_give_unknown_pose_and_no_hands() {
        let mut provider = FixedProvider::default();
        let annotated = annotate_frame(frame(), &mut provider, true);
        assert_eq!(annotated.pose, PoseLabel::Unknown);
        assert!(annotated.gestures.is_empty());
        assert_eq!(annotated.overlay_lines(), vec!["Pose: Unknown".to_string()]);
    }

    #[test]
    fn detections_are_classified_per_hand_in_order() {
        let mut provider = FixedProvider {
            pose: Some(t_pose()),
            hands: vec![thumb_up(), HandLandmarks::new([LandmarkPoint::default(); 21], 0.8)],
            fail: false,
        };
        let annotated = annotate_frame(frame(), &mut provider, false);
        assert_eq!(annotated.pose, PoseLabel::TPose);
        assert_eq!(
            annotated.gestures,
            vec![GestureLabel::ThumbUp, GestureLabel::Unknown]
        );
    }

    #[test]
    fn provider_errors_degrade_to_nothing_detected() {
        let mut provider = FixedProvider {
            pose: Some(t_pose()),
            hands: vec![thumb_up()],
            fail: true,
        };
        let annotated = annotate_frame(frame(), &mut provider, true);
        assert_eq!(annotated.pose, PoseLabel::Unknown);
        assert!(annotated.gestures.is_empty());
    }

    #[test]
    fn source_failure_ends_the_loop() {
        let mut source = ScriptedSource::frames(3);
        let sink = RecordingSink::default();
        let (_cancel_tx, cancel_rx) = bounded(1);

        let exit = run_capture_loop(
            &mut source,
            &mut FixedProvider::default(),
            &sink,
            &fast_settings(),
            &cancel_rx,
        );

        assert_eq!(exit, LoopExit::SourceEnded);
        assert_eq!(sink.frames.lock().unwrap().len(), 3);
    }

    #[test]
    fn undecodable_frames_are_skipped() {
        let mut source = ScriptedSource {
            reads: VecDeque::from(vec![Ok(Some(frame())), Ok(None), Ok(Some(frame()))]),
        };
        let sink = RecordingSink::default();
        let (_cancel_tx, cancel_rx) = bounded(1);

        run_capture_loop(
            &mut source,
            &mut FixedProvider::default(),
            &sink,
            &fast_settings(),
            &cancel_rx,
        );

        assert_eq!(sink.frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn quit_signal_ends_the_loop() {
        let sink = RecordingSink {
            quit_after: Some(2),
            ..RecordingSink::default()
        };
        let (_cancel_tx, cancel_rx) = bounded(1);

        let exit = run_capture_loop(
            &mut EndlessSource,
            &mut FixedProvider::default(),
            &sink,
            &fast_settings(),
            &cancel_rx,
        );

        assert_eq!(exit, LoopExit::QuitRequested);
        assert_eq!(sink.frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn pending_cancellation_stops_before_any_frame() {
        let sink = RecordingSink::default();
        let (cancel_tx, cancel_rx) = bounded(1);
        cancel_tx.send(()).unwrap();

        let exit = run_capture_loop(
            &mut EndlessSource,
            &mut FixedProvider::default(),
            &sink,
            &fast_settings(),
            &cancel_rx,
        );

        assert_eq!(exit, LoopExit::Cancelled);
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn gate_spaces_accepted_frames_by_the_interval() {
        let interval = Duration::from_millis(20);
        let mut gate = FrameGate::new(interval);
        let (_cancel_tx, cancel_rx) = unbounded::<()>();

        let start = Instant::now();
        assert!(gate.wait(&cancel_rx));
        assert!(gate.wait(&cancel_rx));
        assert!(start.elapsed() >= interval);
    }

    #[test]
    fn gate_wakes_immediately_on_cancel() {
        let mut gate = FrameGate::new(Duration::from_secs(30));
        let (cancel_tx, cancel_rx) = unbounded();

        assert!(gate.wait(&cancel_rx));
        let waiter = std::thread::spawn(move || {
            let started = Instant::now();
            let accepted = gate.wait(&cancel_rx);
            (accepted, started.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        cancel_tx.send(()).unwrap();

        let (accepted, waited) = waiter.join().unwrap();
        assert!(!accepted);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn dropped_cancel_sender_counts_as_cancel() {
        let mut gate = FrameGate::new(Duration::from_millis(1));
        let (cancel_tx, cancel_rx) = unbounded::<()>();
        drop(cancel_tx);
        assert!(!gate.wait(&cancel_rx));
    }

    struct ScriptedOpener {
        opens: Arc<AtomicUsize>,
    }

    impl SourceOpener for ScriptedOpener {
        fn open(
            &self,
            _source: &CameraSource,
            _capture: &CaptureSettings,
        ) -> Result<Box<dyn VideoSource>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSource::frames(1)))
        }
    }

    #[test]
    fn session_brackets_the_run_with_begin_and_end() {
        let opener = ScriptedOpener {
            opens: Arc::new(AtomicUsize::new(0)),
        };
        let provider: Mutex<Box<dyn LandmarkProvider>> =
            Mutex::new(Box::new(FixedProvider::default()));
        let sink = RecordingSink::default();
        let (_cancel_tx, cancel_rx) = bounded(1);

        let exit = run_session(
            &opener,
            &CameraSource::default(),
            &provider,
            &sink,
            &fast_settings(),
            &cancel_rx,
        )
        .unwrap();

        assert_eq!(exit, LoopExit::SourceEnded);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(sink.begins.load(Ordering::SeqCst), 1);
        assert_eq!(sink.ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_sink_drops_frames_while_ui_is_behind() {
        let (tx, rx) = bounded(1);
        let sink = ChannelSink::new(tx);
        let mut provider = FixedProvider::default();
        sink.publish(annotate_frame(frame(), &mut provider, false));
        sink.publish(annotate_frame(frame(), &mut provider, false));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn channel_sink_quit_survives_begin_until_rearmed() {
        let (tx, _rx) = bounded(1);
        let sink = ChannelSink::new(tx);

        sink.request_quit();
        sink.begin();
        assert!(sink.quit_requested());
        sink.arm();
        assert!(!sink.quit_requested());
    }

    #[test]
    fn quit_during_open_ends_the_session_before_capture() {
        let opener = ScriptedOpener {
            opens: Arc::new(AtomicUsize::new(0)),
        };
        let provider: Mutex<Box<dyn LandmarkProvider>> =
            Mutex::new(Box::new(FixedProvider::default()));
        let (tx, rx) = bounded(1);
        let sink = ChannelSink::new(tx);
        sink.request_quit();
        let (_cancel_tx, cancel_rx) = bounded(1);

        let exit = run_session(
            &opener,
            &CameraSource::default(),
            &provider,
            &sink,
            &fast_settings(),
            &cancel_rx,
        )
        .unwrap();

        assert_eq!(exit, LoopExit::QuitRequested);
        assert!(rx.is_empty());
    }
}

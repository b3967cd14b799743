use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Sender, bounded};

use crate::{
    config::{CaptureSettings, StreamSettings},
    error::SessionError,
    pipeline::{CameraSource, FrameSink, LandmarkProvider, SourceOpener, run_session},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Stop was requested; the worker has not released the source yet.
    Stopping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    StillStopping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

struct SessionState {
    run: RunState,
    source: CameraSource,
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

type SharedProvider = Arc<Mutex<Box<dyn LandmarkProvider>>>;

/// Owns the run state and the camera source, and drives at most one capture
/// worker at a time.
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    opener: Arc<dyn SourceOpener>,
    provider: SharedProvider,
    sink: Arc<dyn FrameSink>,
    capture: CaptureSettings,
    stream: StreamSettings,
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionController {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        provider: Box<dyn LandmarkProvider>,
        sink: Arc<dyn FrameSink>,
        capture: CaptureSettings,
        stream: StreamSettings,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                run: RunState::Idle,
                source: CameraSource::default(),
                cancel: None,
                worker: None,
            })),
            opener,
            provider: Arc::new(Mutex::new(provider)),
            sink,
            capture,
            stream,
        }
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.state).run
    }

    pub fn camera_source(&self) -> CameraSource {
        lock(&self.state).source.clone()
    }

    pub fn start(&self) -> Result<StartOutcome, SessionError> {
        let mut state = lock(&self.state);
        match state.run {
            RunState::Running => return Ok(StartOutcome::AlreadyRunning),
            RunState::Stopping => return Ok(StartOutcome::StillStopping),
            RunState::Idle => {}
        }

        self.sink.arm();
        let (cancel_tx, cancel_rx) = bounded(1);
        let source = state.source.clone();
        let shared = Arc::clone(&self.state);
        let opener = Arc::clone(&self.opener);
        let provider = Arc::clone(&self.provider);
        let sink = Arc::clone(&self.sink);
        let capture = self.capture.clone();

        let worker = thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || {
                match run_session(
                    opener.as_ref(),
                    &source,
                    &provider,
                    sink.as_ref(),
                    &capture,
                    &cancel_rx,
                ) {
                    Ok(exit) => log::info!("capture from {source} finished: {exit:?}"),
                    Err(err) => log::error!("failed to capture from {source}: {err:?}"),
                }
                let mut state = lock(&shared);
                state.run = RunState::Idle;
                state.cancel = None;
            })?;

        // A worker that ended on its own has already marked the state idle and
        // is about to return.
        let finished = state.worker.replace(worker);
        state.cancel = Some(cancel_tx);
        state.run = RunState::Running;
        drop(state);

        if let Some(handle) = finished {
            let _ = handle.join();
        }

        log::info!("capture started");
        Ok(StartOutcome::Started)
    }

    pub fn stop(&self) -> StopOutcome {
        let mut state = lock(&self.state);
        if state.run != RunState::Running {
            return StopOutcome::NotRunning;
        }

        state.run = RunState::Stopping;
        if let Some(cancel) = state.cancel.take() {
            let _ = cancel.try_send(());
        }
        log::info!("capture stop requested");
        StopOutcome::Stopped
    }

    /// Accepts either a full stream URL or the last two octets of a LAN
    /// address. Takes effect on the next start.
    pub fn set_camera_source(&self, descriptor: &str) -> Result<CameraSource, SessionError> {
        let source = CameraSource::parse(descriptor, &self.stream)?;
        lock(&self.state).source = source.clone();
        log::info!("camera source set to {source}");
        Ok(source)
    }

    pub fn select_device(&self, index: u32) {
        lock(&self.state).source = CameraSource::Device(index);
        log::info!("camera source set to device #{index}");
    }

    pub fn reset_to_default_source(&self) {
        let source = CameraSource::default();
        log::info!("camera source reset to {source}");
        lock(&self.state).source = source;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let worker = {
            let mut state = lock(&self.state);
            if state.run == RunState::Running {
                state.run = RunState::Stopping;
            }
            // Dropping the sender disconnects the channel, which also cancels.
            state.cancel.take();
            state.worker.take()
        };
        if let Some(handle) = worker {
            let _ = handle.join();
        }
    }
}

use super::{AppView, Context, KeyDownEvent, StatusMessage, Window};
use crate::session::{RunState, StartOutcome, StopOutcome};

impl AppView {
    pub(super) fn start_capture(&mut self, cx: &mut Context<'_, Self>) {
        let Some(session) = &self.session else {
            return;
        };

        let status = match session.start() {
            Ok(StartOutcome::Started) => {
                StatusMessage::info(format!("Capturing from {}", session.camera_source()))
            }
            Ok(StartOutcome::AlreadyRunning) => StatusMessage::info("Capture is already running"),
            Ok(StartOutcome::StillStopping) => {
                StatusMessage::info("Previous capture is still shutting down")
            }
            Err(err) => {
                log::error!("failed to start capture: {err:?}");
                StatusMessage::error(format!("Failed to start capture: {err}"))
            }
        };
        self.status = Some(status);
        cx.notify();
    }

    pub(super) fn stop_capture(&mut self, cx: &mut Context<'_, Self>) {
        let Some(session) = &self.session else {
            return;
        };

        self.status = Some(match session.stop() {
            StopOutcome::Stopped => StatusMessage::info("Stopping capture..."),
            StopOutcome::NotRunning => StatusMessage::info("Capture is not running"),
        });
        cx.notify();
    }

    pub(super) fn apply_source_input(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let Some(session) = &self.session else {
            return;
        };

        let descriptor = self.source_input.read(cx).value().to_string();
        match session.set_camera_source(&descriptor) {
            Ok(source) => {
                self.status = Some(StatusMessage::info(format!(
                    "Camera source set to {source}, used on next start"
                )));
                self.source_input
                    .update(cx, |input, cx| input.set_value("", window, cx));
            }
            Err(err) => {
                log::warn!("rejected camera source {descriptor:?}: {err}");
                self.status = Some(StatusMessage::error(err.to_string()));
            }
        }
        cx.notify();
    }

    pub(super) fn reset_source(&mut self, cx: &mut Context<'_, Self>) {
        if let Some(session) = &self.session {
            session.reset_to_default_source();
            self.status = Some(StatusMessage::info(format!(
                "Camera source reset to {}",
                session.camera_source()
            )));
            cx.notify();
        }
    }

    pub(super) fn select_device(&mut self, index: u32, cx: &mut Context<'_, Self>) {
        if let Some(session) = &self.session {
            session.select_device(index);
            self.status = Some(StatusMessage::info(format!(
                "Camera source set to device #{index}, used on next start"
            )));
            cx.notify();
        }
    }

    /// Quit key handler for the preview. Ignored while the text input has
    /// focus.
    pub(super) fn on_key_down(
        &mut self,
        event: &KeyDownEvent,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if !self.focus_handle.is_focused(window) {
            return;
        }
        if !event
            .keystroke
            .key
            .eq_ignore_ascii_case(&self.config.capture.quit_key)
        {
            return;
        }
        if self.run_state() != RunState::Running {
            return;
        }

        if let Some(sink) = &self.sink {
            sink.request_quit();
            self.status = Some(StatusMessage::info("Quit key pressed, ending capture"));
            cx.notify();
        }
    }
}

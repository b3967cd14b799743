use std::{mem, sync::Arc, thread, time::Duration};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, Entity, FocusHandle, Hsla, InteractiveElement,
    IntoElement, KeyDownEvent, MouseButton, ObjectFit, ParentElement, Render, RenderImage,
    SharedString, Styled, StyledImage, Subscription, TitlebarOptions, Window, WindowControlArea,
    WindowDecorations, WindowOptions, div, img, px,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    input::{Input, InputEvent, InputState},
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::Config,
    model_download::{ModelDownloadEvent, ModelKind, ensure_models_ready},
    pipeline::{
        CameraDevice, CameraSource, ChannelSink, DefaultSourceOpener, OrtLandmarkProvider,
        available_cameras,
    },
    session::{RunState, SessionController},
    types::AnnotatedFrame,
};

mod controls;
mod download;
mod main_view;
mod render_util;
mod titlebar;

const PREVIEW_MIN_SIZE: (f32, f32) = (320.0, 240.0);
const PREVIEW_MAX_WIDTH: f32 = 960.0;
const DEFAULT_PREVIEW_RATIO: f32 = 4.0 / 3.0;
const CONTROL_PANEL_WIDTH: f32 = 320.0;

pub fn launch_ui(app: &mut App, config: Config) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Pose & Gesture Studio".into()),
            appears_transparent: true,
            traffic_light_position: None,
        }),
        window_decorations: Some(WindowDecorations::Client),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|cx| AppView::new(config, window, cx));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    config: Config,
    focus_handle: FocusHandle,
    source_input: Entity<InputState>,
    _input_subscription: Subscription,
    frame_tx: Sender<AnnotatedFrame>,
    frame_rx: Receiver<AnnotatedFrame>,
    session: Option<SessionController>,
    sink: Option<Arc<ChannelSink>>,
    available_cameras: Vec<CameraDevice>,
    latest_size: Option<(u32, u32)>,
    latest_latency: Option<Duration>,
    overlay_lines: Vec<String>,
    latest_image: Option<Arc<RenderImage>>,
    status: Option<StatusMessage>,
    download_rx: Receiver<DownloadMessage>,
    _download_handle: Option<thread::JoinHandle<()>>,
}

enum Screen {
    Download(DownloadState),
    Main,
}

struct DownloadState {
    current: Option<ModelKind>,
    ready: usize,
    downloaded: u64,
    total: Option<u64>,
    message: String,
    error: Option<String>,
    provider: Option<Box<OrtLandmarkProvider>>,
}

impl DownloadState {
    fn new() -> Self {
        Self {
            current: None,
            ready: 0,
            downloaded: 0,
            total: None,
            message: "Checking landmark models...".to_string(),
            error: None,
            provider: None,
        }
    }
}

enum DownloadMessage {
    Event(ModelDownloadEvent),
    Loaded(Box<OrtLandmarkProvider>),
    Error(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StatusKind {
    Info,
    Error,
}

struct StatusMessage {
    kind: StatusKind,
    text: String,
}

impl StatusMessage {
    fn info(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }
}

impl AppView {
    fn new(config: Config, window: &mut Window, cx: &mut Context<'_, Self>) -> Self {
        let (download_tx, download_rx) = unbounded();
        let mut download_state = DownloadState::new();
        let download_handle = match download::spawn_model_setup(config.clone(), download_tx) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("failed to start model setup thread: {err}");
                download_state.error = Some(err.to_string());
                None
            }
        };
        let (frame_tx, frame_rx) = bounded(1);

        let source_input = cx.new(|cx| {
            InputState::new(window, cx).placeholder("0.212 or http://host:port/video")
        });
        let input_subscription = cx.subscribe_in(
            &source_input,
            window,
            |this: &mut Self, _, event: &InputEvent, window, cx| {
                if let InputEvent::PressEnter { .. } = event {
                    this.apply_source_input(window, cx);
                }
            },
        );

        let focus_handle = cx.focus_handle();
        window.focus(&focus_handle);

        let available_cameras = available_cameras().unwrap_or_else(|err| {
            log::warn!("failed to enumerate cameras: {err:?}");
            Vec::new()
        });

        Self {
            screen: Screen::Download(download_state),
            config,
            focus_handle,
            source_input,
            _input_subscription: input_subscription,
            frame_tx,
            frame_rx,
            session: None,
            sink: None,
            available_cameras,
            latest_size: None,
            latest_latency: None,
            overlay_lines: Vec::new(),
            latest_image: None,
            status: None,
            download_rx,
            _download_handle: download_handle,
        }
    }

    fn build_session(&mut self, provider: Box<OrtLandmarkProvider>) {
        if self.session.is_some() {
            return;
        }

        let sink = Arc::new(ChannelSink::new(self.frame_tx.clone()));
        let opener = Arc::new(DefaultSourceOpener::new(self.config.stream.clone()));
        self.session = Some(SessionController::new(
            opener,
            provider,
            sink.clone(),
            self.config.capture.clone(),
            self.config.stream.clone(),
        ));
        self.sink = Some(sink);
        log::info!("session ready");
    }

    fn run_state(&self) -> RunState {
        self.session
            .as_ref()
            .map_or(RunState::Idle, SessionController::run_state)
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let screen = mem::replace(&mut self.screen, Screen::Main);
        let (screen, view) = match screen {
            Screen::Download(mut state) => {
                self.poll_download_events(&mut state);
                match state.provider.take() {
                    Some(provider) => {
                        self.build_session(provider);
                        (Screen::Main, self.render_main(window, cx))
                    }
                    None => {
                        let view = self.render_download_view(&state, window, cx);
                        (Screen::Download(state), view)
                    }
                }
            }
            Screen::Main => (Screen::Main, self.render_main(window, cx)),
        };
        self.screen = screen;
        view
    }
}

use super::{
    ActiveTheme, AnyElement, AppView, Config, Context, DownloadMessage, DownloadState, IntoElement,
    ModelDownloadEvent, ModelKind, OrtLandmarkProvider, ParentElement, Sender, Styled, StyledExt,
    Tag, Window, div, ensure_models_ready, h_flex, thread, v_flex,
};

impl AppView {
    pub(super) fn poll_download_events(&mut self, state: &mut DownloadState) {
        while let Ok(msg) = self.download_rx.try_recv() {
            match msg {
                DownloadMessage::Event(ModelDownloadEvent::AlreadyPresent { model }) => {
                    state.current = Some(model);
                    state.message = format!("{} model found on disk", model.label());
                }
                DownloadMessage::Event(ModelDownloadEvent::Started { model, total }) => {
                    state.current = Some(model);
                    state.downloaded = 0;
                    state.total = total;
                    state.message = format!("Downloading {} model...", model.label());
                }
                DownloadMessage::Event(ModelDownloadEvent::Progress {
                    downloaded, total, ..
                }) => {
                    state.downloaded = downloaded;
                    state.total = total;
                }
                DownloadMessage::Event(ModelDownloadEvent::Finished { model }) => {
                    state.ready += 1;
                    state.message = format!("{} model ready", model.label());
                }
                DownloadMessage::Loaded(provider) => {
                    state.message = "Models loaded, starting...".to_string();
                    state.provider = Some(provider);
                }
                DownloadMessage::Error(err) => {
                    state.error = Some(err);
                    state.message = "Model setup failed".to_string();
                }
            }
        }
    }

    pub(super) fn render_download_view(
        &self,
        state: &DownloadState,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let titlebar = self.render_titlebar(window, cx);
        let theme = cx.theme();

        let total_models = ModelKind::ALL.len();
        let (status_icon, status_text, status_color) = if state.error.is_some() {
            ("✗", "Model setup failed", theme.accent)
        } else if state.ready >= total_models {
            ("⟳", "Loading models", theme.foreground)
        } else {
            ("⟳", "Preparing models", theme.foreground)
        };

        let current = state
            .current
            .map(|model| format!("{} ({}/{total_models})", model.label(), state.ready))
            .unwrap_or_else(|| format!("0/{total_models}"));

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_color(status_color)
                            .font_semibold()
                            .child(format!("{status_icon} {status_text}")),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child(current),
                    ),
            )
            .child(
                div()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.muted)
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(progress_bar_string(state.downloaded, state.total)),
            )
            .child(
                div()
                    .text_color(theme.foreground)
                    .child(state.message.clone()),
            );

        if let Some(err) = &state.error {
            container = container.child(Tag::danger().rounded_full().child(format!("Error: {err}")));
        }

        v_flex()
            .size_full()
            .bg(theme.background)
            .child(titlebar)
            .child(
                v_flex()
                    .flex_1()
                    .items_center()
                    .justify_center()
                    .child(container),
            )
            .into_any_element()
    }
}

/// Downloads any missing model and loads all of them on a background thread.
pub(super) fn spawn_model_setup(
    config: Config,
    tx: Sender<DownloadMessage>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("model-setup".into())
        .spawn(move || {
            let forward = |event| {
                let _ = tx.send(DownloadMessage::Event(event));
            };
            let message = match ensure_models_ready(&config.models, forward)
                .and_then(|()| OrtLandmarkProvider::new(&config.models, config.detection.clone()))
            {
                Ok(provider) => DownloadMessage::Loaded(Box::new(provider)),
                Err(err) => {
                    log::error!("failed to prepare landmark models: {err:?}");
                    DownloadMessage::Error(format!("{err:#}"))
                }
            };
            let _ = tx.send(message);
        })
}

const PROGRESS_CELLS: usize = 30;

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    let Some(total) = total.filter(|&total| total > 0) else {
        return if downloaded == 0 {
            format!("[{}]", " ".repeat(PROGRESS_CELLS))
        } else {
            format!("[{:-<PROGRESS_CELLS$}] {} KB", ">", downloaded / 1024)
        };
    };

    let fraction = (downloaded as f64 / total as f64).min(1.0);
    let cells = ((fraction * PROGRESS_CELLS as f64).round() as usize).min(PROGRESS_CELLS);
    let bar: String = (0..PROGRESS_CELLS)
        .map(|cell| if cell < cells { '=' } else { ' ' })
        .collect();
    format!("[{bar}] {:>5.1}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::progress_bar_string;

    #[test]
    fn known_size_shows_percentage() {
        let bar = progress_bar_string(50, Some(100));
        assert!(bar.starts_with(&format!("[{}{}]", "=".repeat(15), " ".repeat(15))));
        assert!(bar.ends_with(" 50.0%"));
    }

    #[test]
    fn overshoot_is_clamped() {
        assert!(progress_bar_string(200, Some(100)).ends_with("100.0%"));
    }

    #[test]
    fn unknown_size_reports_bytes() {
        assert!(progress_bar_string(4096, None).ends_with(" 4 KB"));
    }
}

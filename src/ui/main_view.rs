use super::render_util::frame_to_image;
use super::{
    ActiveTheme, AnyElement, AppView, Arc, Button, ButtonVariants, CONTROL_PANEL_WIDTH,
    CameraSource, Context, DEFAULT_PREVIEW_RATIO, Hsla, Input, InteractiveElement, IntoElement,
    MouseButton, ObjectFit, PREVIEW_MAX_WIDTH, PREVIEW_MIN_SIZE, ParentElement, RenderImage,
    RunState, SharedString, StatusKind, Styled, StyledExt, StyledImage, Window, div, h_flex, img,
    px, v_flex,
};

const ABOUT_TEXT: &str = env!("CARGO_PKG_DESCRIPTION");
const PROJECT_URL: &str = env!("CARGO_PKG_HOMEPAGE");

#[derive(Clone, Copy)]
struct Palette {
    foreground: Hsla,
    muted: Hsla,
    border: Hsla,
    panel: Hsla,
    success: Hsla,
}

impl AppView {
    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        self.poll_frames(window, cx);

        let run_state = self.run_state();
        if run_state == RunState::Idle {
            self.clear_preview(window, cx);
        }

        let palette = {
            let theme = cx.theme();
            Palette {
                foreground: theme.foreground,
                muted: theme.muted_foreground,
                border: theme.border,
                panel: theme.group_box,
                success: theme.success,
            }
        };

        let viewport_width = f32::from(window.viewport_size().width);
        let preview_width = (viewport_width - CONTROL_PANEL_WIDTH - 48.0)
            .clamp(PREVIEW_MIN_SIZE.0, PREVIEW_MAX_WIDTH);
        let preview_height = (preview_width / self.preview_aspect_ratio()).max(PREVIEW_MIN_SIZE.1);

        let preview = self.render_preview(run_state, preview_width, preview_height, palette, cx);
        let controls = self.render_controls(run_state, palette, cx);
        let titlebar = self.render_titlebar(window, cx);

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .track_focus(&self.focus_handle)
            .on_key_down(cx.listener(Self::on_key_down))
            .child(titlebar)
            .child(
                h_flex()
                    .flex_1()
                    .gap_4()
                    .p_4()
                    .items_start()
                    .child(preview)
                    .child(controls),
            )
            .into_any_element()
    }

    fn poll_frames(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let mut latest = None;
        while let Ok(annotated) = self.frame_rx.try_recv() {
            latest = Some(annotated);
        }
        let Some(annotated) = latest else {
            return;
        };

        if let Some(image) = frame_to_image(&annotated.frame) {
            self.replace_latest_image(Some(image), window, cx);
            self.latest_size = Some((annotated.frame.width, annotated.frame.height));
            self.latest_latency = Some(annotated.frame.timestamp.elapsed());
            self.overlay_lines = annotated.overlay_lines();
        }
    }

    fn clear_preview(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        if self.latest_image.is_some() {
            self.replace_latest_image(None, window, cx);
            self.overlay_lines.clear();
            self.latest_latency = None;
        }
    }

    fn frame_status(&self, run_state: RunState) -> String {
        let state = super::render_util::run_state_badge(run_state).1;
        let quit_key = &self.config.capture.quit_key;
        match (self.latest_size, self.latest_latency) {
            (Some((width, height)), Some(latency)) => format!(
                "{state} {width}x{height}, {} ms behind · '{quit_key}' on the preview quits",
                latency.as_millis()
            ),
            _ => format!("{state} · '{quit_key}' on the preview quits"),
        }
    }

    fn preview_aspect_ratio(&self) -> f32 {
        match self.latest_size {
            Some((width, height)) if height > 0 => width as f32 / height as f32,
            _ => DEFAULT_PREVIEW_RATIO,
        }
    }

    fn render_preview(
        &self,
        run_state: RunState,
        width: f32,
        height: f32,
        palette: Palette,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let content: AnyElement = match &self.latest_image {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            None => {
                let hint = match run_state {
                    RunState::Idle => "Press Start to begin capture",
                    RunState::Running => "Waiting for camera...",
                    RunState::Stopping => "Releasing camera...",
                };
                div()
                    .size_full()
                    .flex()
                    .items_center()
                    .justify_center()
                    .text_sm()
                    .text_color(palette.muted)
                    .child(hint)
                    .into_any_element()
            }
        };

        let overlay = v_flex().absolute().top(px(12.0)).left(px(12.0)).gap_1().children(
            self.overlay_lines.iter().map(|line| {
                div()
                    .px_2()
                    .rounded_md()
                    .bg(gpui::rgba(0x00000088))
                    .text_color(palette.success)
                    .font_semibold()
                    .child(line.clone())
            }),
        );

        div()
            .relative()
            .w(px(width))
            .h(px(height))
            .overflow_hidden()
            .rounded_lg()
            .bg(gpui::rgb(0x000000))
            .on_mouse_down(
                MouseButton::Left,
                cx.listener(|this, _, window, _| window.focus(&this.focus_handle)),
            )
            .child(content)
            .child(overlay)
            .into_any_element()
    }

    fn render_controls(
        &self,
        run_state: RunState,
        palette: Palette,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let current_source = self
            .session
            .as_ref()
            .map(|session| session.camera_source())
            .unwrap_or_default();

        let capture = section("Capture", palette)
            .child(
                h_flex()
                    .gap_2()
                    .child(
                        Button::new(SharedString::from("capture-start"))
                            .primary()
                            .label("Start")
                            .on_click(cx.listener(|this, _, _, cx| this.start_capture(cx))),
                    )
                    .child(
                        Button::new(SharedString::from("capture-stop"))
                            .outline()
                            .label("Stop")
                            .on_click(cx.listener(|this, _, _, cx| this.stop_capture(cx))),
                    ),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(palette.muted)
                    .child(self.frame_status(run_state)),
            );

        let source = section("Camera source", palette)
            .child(
                div()
                    .text_sm()
                    .text_color(palette.foreground)
                    .overflow_hidden()
                    .text_ellipsis()
                    .whitespace_nowrap()
                    .child(current_source.to_string()),
            )
            .child(Input::new(&self.source_input))
            .child(
                h_flex()
                    .gap_2()
                    .child(
                        Button::new(SharedString::from("source-apply"))
                            .primary()
                            .label("Set source")
                            .on_click(cx.listener(|this, _, window, cx| {
                                this.apply_source_input(window, cx)
                            })),
                    )
                    .child(
                        Button::new(SharedString::from("source-reset"))
                            .outline()
                            .label("Device camera")
                            .on_click(cx.listener(|this, _, _, cx| this.reset_source(cx))),
                    ),
            );

        let mut devices = section("Devices", palette);
        if self.available_cameras.is_empty() {
            devices = devices.child(
                div()
                    .text_xs()
                    .text_color(palette.muted)
                    .child("No local cameras found"),
            );
        }
        for device in &self.available_cameras {
            let index = device.index;
            let selected = current_source == CameraSource::Device(index);
            devices = devices.child(
                h_flex()
                    .w_full()
                    .gap_2()
                    .p_2()
                    .rounded_md()
                    .cursor_pointer()
                    .border_1()
                    .border_color(if selected {
                        gpui::rgba(0x64748bff)
                    } else {
                        gpui::rgba(0x33415500)
                    })
                    .hover(|this| this.bg(gpui::rgba(0x2d374844)))
                    .on_mouse_down(
                        MouseButton::Left,
                        cx.listener(move |this, _, _, cx| this.select_device(index, cx)),
                    )
                    .child(
                        div()
                            .text_color(if selected { palette.success } else { palette.muted })
                            .child(if selected { "●" } else { "○" }),
                    )
                    .child(
                        div()
                            .flex_1()
                            .text_sm()
                            .text_color(palette.foreground)
                            .overflow_hidden()
                            .text_ellipsis()
                            .whitespace_nowrap()
                            .child(format!("#{index} {}", device.label)),
                    ),
            );
        }

        let about = section("About", palette)
            .child(
                div()
                    .text_xs()
                    .text_color(palette.muted)
                    .child(format!("{ABOUT_TEXT}. Version {}.", env!("CARGO_PKG_VERSION"))),
            )
            .child(
                Button::new(SharedString::from("about-project"))
                    .outline()
                    .label("Project page")
                    .on_click(cx.listener(|_, _, _, cx| cx.open_url(PROJECT_URL))),
            );

        let mut panel = v_flex()
            .w(px(CONTROL_PANEL_WIDTH))
            .gap_3()
            .child(capture)
            .child(source)
            .child(devices)
            .child(about);

        if let Some(status) = &self.status {
            let (icon, color) = match status.kind {
                StatusKind::Info => ("ℹ", palette.muted),
                StatusKind::Error => ("⚠", gpui::rgb(0xfca5a5).into()),
            };
            panel = panel.child(
                h_flex()
                    .gap_2()
                    .items_start()
                    .p_3()
                    .rounded_lg()
                    .border_1()
                    .border_color(palette.border)
                    .child(div().text_sm().text_color(color).child(icon))
                    .child(
                        div()
                            .flex_1()
                            .text_xs()
                            .text_color(color)
                            .child(status.text.clone()),
                    ),
            );
        }

        panel.into_any_element()
    }

    fn replace_latest_image(
        &mut self,
        new_image: Option<Arc<RenderImage>>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        let old_image = match new_image {
            Some(image) => self.latest_image.replace(image),
            None => self.latest_image.take(),
        };
        if let Some(old_image) = old_image {
            // The sprite atlas keeps every uploaded frame until it is dropped.
            cx.drop_image(old_image, Some(window));
        }
    }
}

fn section(title: &'static str, palette: Palette) -> gpui::Div {
    v_flex()
        .gap_2()
        .p_3()
        .rounded_lg()
        .border_1()
        .border_color(palette.border)
        .bg(palette.panel)
        .child(
            div()
                .text_sm()
                .font_semibold()
                .text_color(palette.foreground)
                .child(title),
        )
}

#[cfg(test)]
mod tests {
    use super::{ABOUT_TEXT, PROJECT_URL};

    #[test]
    fn about_section_has_text_and_a_web_link() {
        assert!(!ABOUT_TEXT.is_empty());
        assert!(PROJECT_URL.starts_with("https://"));
    }
}

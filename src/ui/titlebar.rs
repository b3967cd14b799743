use super::{
    AnyElement, AppView, Context, Hsla, InteractiveElement, IntoElement, ParentElement, Styled,
    Window, WindowControlArea, div, h_flex, px, render_util::run_state_badge,
};
#[cfg(not(target_os = "macos"))]
use gpui::Rgba;

impl AppView {
    pub(super) fn render_titlebar(
        &self,
        window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let (state_icon, state_text) = run_state_badge(self.run_state());
        let state_color: Hsla = if self.session.is_some() {
            gpui::rgb(0x4ade80).into()
        } else {
            gpui::rgb(0x8b95a5).into()
        };
        let source_text = self
            .session
            .as_ref()
            .map(|session| session.camera_source().to_string())
            .unwrap_or_else(|| "loading models".to_string());

        h_flex()
            .window_control_area(WindowControlArea::Drag)
            .h(px(32.0))
            .w_full()
            .items_center()
            .justify_between()
            .bg(gpui::rgb(0x1a2332))
            .child(
                h_flex()
                    .gap_3()
                    .pl(px(80.0))
                    .pr_3()
                    .h_full()
                    .items_center()
                    .child(badge(format!("{state_icon} {state_text}"), state_color))
                    .child(badge(
                        format!("◉ {source_text}"),
                        gpui::rgb(0xa5b4fc).into(),
                    )),
            )
            .child(window_controls(window))
            .into_any_element()
    }
}

fn badge(text: String, color: Hsla) -> impl IntoElement {
    div()
        .px_2()
        .py_0p5()
        .rounded_md()
        .bg(gpui::rgba(0x00000033))
        .text_xs()
        .text_color(color)
        .child(text)
}

#[cfg(not(target_os = "macos"))]
fn control_button(
    id: &'static str,
    area: WindowControlArea,
    hover_bg: Rgba,
    icon: impl IntoElement,
) -> impl IntoElement {
    div()
        .id(id)
        .size(px(28.0))
        .flex()
        .items_center()
        .justify_center()
        .rounded_md()
        .cursor_pointer()
        .occlude()
        .window_control_area(area)
        .hover(move |s| s.bg(hover_bg))
        .child(icon)
}

#[cfg(not(target_os = "macos"))]
fn icon(path: &'static str) -> impl IntoElement {
    gpui::svg()
        .size(px(16.0))
        .path(path)
        .text_color(gpui::rgb(0xc9d1d9))
}

#[cfg(target_os = "macos")]
fn window_controls(_window: &mut Window) -> AnyElement {
    // Traffic lights are drawn by the system.
    div().into_any_element()
}

#[cfg(not(target_os = "macos"))]
fn window_controls(window: &mut Window) -> AnyElement {
    let hover_bg = gpui::rgb(0x2d3640);
    let maximize_path = if window.is_maximized() {
        "M 5,3 H 13 V 11 M 3,5 H 11 V 13 H 3 Z"
    } else {
        "M 4,4 H 12 V 12 H 4 Z"
    };

    h_flex()
        .gap_1()
        .px_2()
        .child(control_button(
            "window-minimize",
            WindowControlArea::Min,
            hover_bg,
            icon("M 4,8 H 12"),
        ))
        .child(control_button(
            "window-maximize",
            WindowControlArea::Max,
            hover_bg,
            icon(maximize_path),
        ))
        .child(control_button(
            "window-close",
            WindowControlArea::Close,
            gpui::rgb(0xe81123),
            icon("M 4,4 L 12,12 M 12,4 L 4,12"),
        ))
        .into_any_element()
}

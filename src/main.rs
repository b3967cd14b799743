#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod classifier;
mod config;
mod error;
mod model_download;
mod pipeline;
mod session;
mod types;
mod ui;

use anyhow::Result;
use gpui::Application;

use crate::config::Config;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    log::info!(
        "capture profile {:?} at up to {} fps",
        config.capture.profile,
        config.capture.fps_limit
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config.clone()) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}

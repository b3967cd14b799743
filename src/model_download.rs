use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

use crate::config::ModelSettings;

const MODEL_ZOO_BASE_URL: &str = "https://github.com/opencv/opencv_zoo/raw/main/models";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    PalmDetector,
    HandLandmarks,
    PoseLandmarks,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::PalmDetector,
        ModelKind::HandLandmarks,
        ModelKind::PoseLandmarks,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm detector",
            ModelKind::HandLandmarks => "hand landmark",
            ModelKind::PoseLandmarks => "pose landmark",
        }
    }

    fn zoo_dir(&self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm_detection_mediapipe",
            ModelKind::HandLandmarks => "handpose_estimation_mediapipe",
            ModelKind::PoseLandmarks => "pose_estimation_mediapipe",
        }
    }

    pub fn path(&self, models: &ModelSettings) -> PathBuf {
        match self {
            ModelKind::PalmDetector => models.palm_detector_path(),
            ModelKind::HandLandmarks => models.hand_landmarks_path(),
            ModelKind::PoseLandmarks => models.pose_landmarks_path(),
        }
    }

    /// Download location for the configured file name.
    pub fn url(&self, models: &ModelSettings) -> String {
        let file_name = match self {
            ModelKind::PalmDetector => &models.palm_detector,
            ModelKind::HandLandmarks => &models.hand_landmarks,
            ModelKind::PoseLandmarks => &models.pose_landmarks,
        };
        format!("{MODEL_ZOO_BASE_URL}/{}/{file_name}", self.zoo_dir())
    }
}

#[derive(Clone, Debug)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

/// Makes sure every model exists on disk, downloading the missing ones in
/// order.
pub fn ensure_models_ready<F>(models: &ModelSettings, mut on_event: F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    for kind in ModelKind::ALL {
        ensure_model_ready(kind, &kind.path(models), &kind.url(models), &mut on_event)?;
    }
    Ok(())
}

pub fn ensure_model_ready<F>(
    model: ModelKind,
    model_path: &Path,
    url: &str,
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if model_path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent { model });
        on_event(ModelDownloadEvent::Finished { model });
        return Ok(());
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut console = ConsoleProgress::default();
    download_to_path(model, url, model_path, &mut |event| {
        console.update(&event);
        on_event(event);
    })
    .with_context(|| {
        format!(
            "failed to download {} model to {}",
            model.label(),
            model_path.display()
        )
    })
}

/// Mirrors download events onto a terminal progress bar.
#[derive(Default)]
struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    fn update(&mut self, event: &ModelDownloadEvent) {
        match event {
            ModelDownloadEvent::Started { total, .. } => self.bar = Some(progress_bar(*total)),
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished { model } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_with_message(format!("{} model ready", model.label()));
                }
            }
            ModelDownloadEvent::AlreadyPresent { .. } => {}
        }
    }
}

/// Partial download next to the target. Removed on drop unless persisted.
struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    fn for_target(dest: &Path) -> Self {
        Self {
            path: dest.with_extension("download"),
            persisted: false,
        }
    }

    fn persist(mut self, dest: &Path) -> anyhow::Result<()> {
        fs::rename(&self.path, dest).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                self.path.display(),
                dest.display()
            )
        })?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn download_to_path<F>(
    model: ModelKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let mut response = Client::new()
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("model request to {url} failed"))?;

    let total = response.content_length();
    on_event(ModelDownloadEvent::Started { model, total });

    let partial = PartialFile::for_target(dest);
    let mut file = fs::File::create(&partial.path)
        .with_context(|| format!("failed to create {}", partial.path.display()))?;

    let mut downloaded = 0u64;
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let read = response
            .read(&mut chunk)
            .context("model download interrupted")?;
        if read == 0 {
            break;
        }
        file.write_all(&chunk[..read])
            .context("failed to write model file")?;
        downloaded += read as u64;
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total,
        });
    }

    if let Some(expected) = total {
        anyhow::ensure!(
            downloaded == expected,
            "model download truncated: got {downloaded} of {expected} bytes"
        );
    }

    file.sync_all().context("failed to flush model file")?;
    drop(file);
    partial.persist(dest)?;

    on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    let (bar, template) = match total {
        Some(total) if total > 0 => (
            ProgressBar::new(total),
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ),
        _ => {
            let bar = ProgressBar::new_spinner();
            bar.enable_steady_tick(Duration::from_millis(100));
            (bar, "{spinner:.green} {bytes} downloaded")
        }
    };

    match ProgressStyle::with_template(template) {
        Ok(style) => bar.set_style(style.progress_chars("=>-")),
        Err(err) => log::warn!("invalid progress template: {err}"),
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_point_at_the_model_zoo_layout() {
        let models = ModelSettings::default();
        assert_eq!(
            ModelKind::PoseLandmarks.url(&models),
            "https://github.com/opencv/opencv_zoo/raw/main/models/pose_estimation_mediapipe/pose_estimation_mediapipe_2023mar.onnx"
        );
        assert!(
            ModelKind::PalmDetector
                .url(&models)
                .ends_with("/palm_detection_mediapipe/palm_detection_mediapipe_2023feb.onnx")
        );
    }

    #[test]
    fn present_model_is_not_downloaded() {
        let dir = std::env::temp_dir().join(format!("pose-gesture-models-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hand.onnx");
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_model_ready(
            ModelKind::HandLandmarks,
            &path,
            "http://unreachable.invalid/hand.onnx",
            |event| events.push(event),
        )
        .unwrap();

        assert!(matches!(
            events.as_slice(),
            [
                ModelDownloadEvent::AlreadyPresent {
                    model: ModelKind::HandLandmarks
                },
                ModelDownloadEvent::Finished {
                    model: ModelKind::HandLandmarks
                }
            ]
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unpersisted_partial_file_is_removed() {
        let dir = std::env::temp_dir().join(format!("pose-gesture-partial-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let target = dir.join("pose.onnx");

        let partial = PartialFile::for_target(&target);
        fs::write(&partial.path, b"half").unwrap();
        let partial_path = partial.path.clone();
        drop(partial);

        assert!(!partial_path.exists());
        assert!(!target.exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}

use std::fmt;

use anyhow::Result;
#[cfg(feature = "camera-nokhwa")]
use anyhow::anyhow;
#[cfg(feature = "camera-nokhwa")]
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
};

use super::stream::MjpegStream;
use crate::{
    config::{CaptureSettings, StreamSettings},
    error::SourceError,
    types::Frame,
};
#[cfg(feature = "camera-nokhwa")]
use super::rgba_converter;

/// Where the capture loop pulls frames from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSource {
    Device(u32),
    Stream(String),
}

impl Default for CameraSource {
    fn default() -> Self {
        CameraSource::Device(0)
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSource::Device(index) => write!(f, "device #{index}"),
            CameraSource::Stream(url) => f.write_str(url),
        }
    }
}

impl CameraSource {
    /// Parses user input into a source.
    ///
    /// Anything with a scheme (`://`) is taken as a stream URL verbatim. Any
    /// other input must be the last two octets of a LAN address (`0.212`),
    /// which expand to `http://<prefix>.<a>.<b>:<port><path>`.
    pub fn parse(descriptor: &str, stream: &StreamSettings) -> Result<Self, SourceError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(SourceError::Empty);
        }
        if descriptor.contains("://") {
            return Ok(CameraSource::Stream(descriptor.to_string()));
        }

        let (a, b) = parse_octet_pair(descriptor)
            .ok_or_else(|| SourceError::InvalidOctets(descriptor.to_string()))?;
        Ok(CameraSource::Stream(format!(
            "http://{}.{a}.{b}:{}{}",
            stream.network_prefix, stream.port, stream.path
        )))
    }
}

fn parse_octet_pair(input: &str) -> Option<(u8, u8)> {
    let mut parts = input.split('.');
    let a = parse_octet(parts.next()?)?;
    let b = parse_octet(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b))
}

fn parse_octet(part: &str) -> Option<u8> {
    // `u8::from_str` accepts a leading '+', which is not a decimal octet.
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// A live video handle. Dropping it releases the underlying device or
/// connection.
pub trait VideoSource {
    /// Pulls the next frame. `Ok(None)` means the frame could not be decoded
    /// and should be skipped; an error means the source is gone.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens video handles. Called on the capture thread, so implementations may
/// block.
pub trait SourceOpener: Send + Sync + 'static {
    fn open(&self, source: &CameraSource, capture: &CaptureSettings)
    -> Result<Box<dyn VideoSource>>;
}

pub struct DefaultSourceOpener {
    stream: StreamSettings,
}

impl DefaultSourceOpener {
    pub fn new(stream: StreamSettings) -> Self {
        Self { stream }
    }
}

impl SourceOpener for DefaultSourceOpener {
    fn open(
        &self,
        source: &CameraSource,
        capture: &CaptureSettings,
    ) -> Result<Box<dyn VideoSource>> {
        match source {
            CameraSource::Device(index) => open_device(*index, capture),
            CameraSource::Stream(url) => Ok(Box::new(MjpegStream::connect(
                url,
                self.stream.connect_timeout(),
                self.stream.read_timeout(),
            )?)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

#[cfg(feature = "camera-nokhwa")]
pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .filter_map(|info| match info.index() {
            CameraIndex::Index(index) => Some(CameraDevice {
                index: *index,
                label: info.human_name(),
            }),
            CameraIndex::String(_) => None,
        })
        .collect())
}

#[cfg(not(feature = "camera-nokhwa"))]
pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    Ok(Vec::new())
}

#[cfg(feature = "camera-nokhwa")]
fn open_device(index: u32, capture: &CaptureSettings) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(DeviceCamera::open(index, capture)?))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_device(index: u32, _capture: &CaptureSettings) -> Result<Box<dyn VideoSource>> {
    anyhow::bail!("local camera #{index} requested but built without the camera-nokhwa feature")
}

// Formats nokhwa can hand to the converter; MJPEG first because most webcams
// only reach 720p at 30 FPS in compressed mode.
#[cfg(feature = "camera-nokhwa")]
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::MJPEG,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
];

#[cfg(feature = "camera-nokhwa")]
fn requested_formats(capture: &CaptureSettings) -> [RequestedFormat<'static>; 3] {
    let (width, height) = capture.profile.resolution();
    let wanted = CameraFormat::new(
        Resolution::new(width, height),
        FrameFormat::MJPEG,
        capture.fps_limit,
    );
    [
        RequestedFormat::with_formats(RequestedFormatType::Closest(wanted), PREFERRED_PIXEL_FORMATS),
        RequestedFormat::with_formats(
            RequestedFormatType::HighestResolution(Resolution::new(width, height)),
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[cfg(feature = "camera-nokhwa")]
pub struct DeviceCamera {
    camera: Camera,
}

#[cfg(feature = "camera-nokhwa")]
impl DeviceCamera {
    pub fn open(index: u32, capture: &CaptureSettings) -> Result<Self> {
        let mut last_err = None;

        for requested in requested_formats(capture) {
            match Camera::new(CameraIndex::Index(index), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => {
                        let format = camera.camera_format();
                        log::info!(
                            "opened camera #{index} at {}x{} {:?} @ {} fps",
                            format.width(),
                            format.height(),
                            format.format(),
                            format.frame_rate()
                        );
                        return Ok(Self { camera });
                    }
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera #{index} with any format")))
    }
}

#[cfg(feature = "camera-nokhwa")]
impl VideoSource for DeviceCamera {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let buffer = self.camera.frame()?;
        match rgba_converter::convert_camera_frame(&buffer) {
            Ok(converted) => Ok(Some(converted.into())),
            Err(err) => {
                log::warn!("failed to decode camera frame: {err:?}");
                Ok(None)
            }
        }
    }
}

#[cfg(feature = "camera-nokhwa")]
impl Drop for DeviceCamera {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    }
}

pub mod camera;
pub mod capture;
pub mod landmarks;
pub mod rgba_converter;
pub mod skeleton;
pub mod stream;

// Re-exports for convenience
pub use camera::{
    CameraDevice, CameraSource, DefaultSourceOpener, SourceOpener, VideoSource, available_cameras,
};
pub use capture::{ChannelSink, FrameSink, LoopExit, run_session};
pub use landmarks::{LandmarkProvider, OrtLandmarkProvider};

use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba, RunState};
use crate::types::Frame;

pub(super) fn frame_to_image(frame: &Frame) -> Option<Arc<RenderImage>> {
    let bgra = rgba_to_bgra(&frame.rgba);
    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, bgra)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

// GPUI uploads render images as BGRA.
fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    let mut bgra = rgba.to_vec();
    for px in bgra.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    bgra
}

pub(super) fn run_state_badge(state: RunState) -> (&'static str, &'static str) {
    match state {
        RunState::Idle => ("○", "Idle"),
        RunState::Running => ("●", "Capturing"),
        RunState::Stopping => ("◐", "Stopping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_and_blue_channels_are_swapped() {
        assert_eq!(rgba_to_bgra(&[1, 2, 3, 4, 5, 6, 7, 8]), vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn mismatched_buffer_yields_no_image() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(frame_to_image(&frame).is_none());
    }
}

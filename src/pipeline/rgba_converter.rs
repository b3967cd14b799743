use anyhow::{Result, anyhow, ensure};
#[cfg(feature = "camera-nokhwa")]
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
#[cfg(feature = "camera-nokhwa")]
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

#[derive(Debug)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl From<RgbaFrame> for Frame {
    fn from(converted: RgbaFrame) -> Self {
        Frame::new(converted.rgba, converted.width, converted.height)
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn check_len(format: &str, data: &[u8], expected: usize) -> Result<()> {
    ensure!(
        data.len() >= expected,
        "{format} buffer too small: got {} bytes, need {expected}",
        data.len()
    );
    Ok(())
}

/// Converts whatever pixel format the device delivered into RGBA, the layout
/// both the landmark models and the preview consume.
#[cfg(feature = "camera-nokhwa")]
pub fn convert_camera_frame(buffer: &Buffer) -> Result<RgbaFrame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = buffer.buffer();

    let rgba = match buffer.source_frame_format() {
        FrameFormat::MJPEG => return decode_jpeg(data),
        FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
        FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
        FrameFormat::RAWRGB => rgb_like_to_rgba(data, width, height, false)?,
        FrameFormat::RAWBGR => rgb_like_to_rgba(data, width, height, true)?,
        FrameFormat::GRAY => expand_pixels(data, width, height, 1, |src, dst| {
            dst[..3].fill(src[0]);
        })?,
    };

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

// Camera YUV is full range; BT.709 matches what UVC webcams report for HD modes.
#[cfg(feature = "camera-nokhwa")]
fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let luma_len = pixel_count(width, height);
    let chroma_len = luma_len / 2;
    check_len("NV12", data, luma_len + chroma_len)?;

    let (y_plane, rest) = data.split_at(luma_len);
    let planes = YuvBiPlanarImage {
        y_plane,
        y_stride: width,
        uv_plane: &rest[..chroma_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgba = vec![0u8; luma_len * 4];
    yuv_nv12_to_rgba(
        &planes,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 conversion failed: {err:?}"))?;
    Ok(rgba)
}

#[cfg(feature = "camera-nokhwa")]
fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    check_len("YUYV", data, pixel_count(width, height) * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV conversion failed: {err:?}"))?;
    Ok(rgba)
}

/// Decodes one JPEG (an MJPEG camera frame or a stream part) straight to RGBA.
pub fn decode_jpeg(data: &[u8]) -> Result<RgbaFrame> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("invalid JPEG: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("JPEG header missing after decode"))?;
    let (width, height) = (u32::from(info.width), u32::from(info.height));
    check_len("decoded JPEG", &rgba, pixel_count(width, height) * 4)?;

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

/// Expands packed 3-byte pixels to RGBA, swapping red and blue for BGR input.
pub fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    expand_pixels(data, width, height, 3, |src, dst| {
        dst[..3].copy_from_slice(src);
        if swap_rb {
            dst.swap(0, 2);
        }
    })
}

/// Runs `write` for every source pixel of `channels` bytes into an opaque
/// RGBA destination pixel.
fn expand_pixels<F>(data: &[u8], width: u32, height: u32, channels: usize, write: F) -> Result<Vec<u8>>
where
    F: Fn(&[u8], &mut [u8]) + Sync,
{
    let pixels = pixel_count(width, height);
    check_len(&format!("{channels}-channel"), data, pixels * channels)?;

    let mut rgba = vec![255u8; pixels * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data.par_chunks_exact(channels))
        .for_each(|(dst, src)| write(src, dst));
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_pixels_are_swapped_into_rgba() {
        let bgr = [10, 20, 30, 40, 50, 60];
        let rgba = rgb_like_to_rgba(&bgr, 2, 1, true).unwrap();
        assert_eq!(rgba, vec![30, 20, 10, 255, 60, 50, 40, 255]);
    }

    #[test]
    fn rgb_pixels_keep_their_order() {
        let rgba = rgb_like_to_rgba(&[1, 2, 3], 1, 1, false).unwrap();
        assert_eq!(rgba, vec![1, 2, 3, 255]);
    }

    #[test]
    fn gray_is_replicated_across_channels() {
        let rgba = expand_pixels(&[7, 9], 2, 1, 1, |src, dst| dst[..3].fill(src[0])).unwrap();
        assert_eq!(rgba, vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let err = rgb_like_to_rgba(&[1, 2], 1, 1, false).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn garbage_is_not_a_jpeg() {
        assert!(decode_jpeg(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]).is_err());
    }
}

use anyhow::{Context, Result, ensure};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, LandmarkPoint};

/// Uniform scale plus padding applied when a frame was letterboxed into a
/// square model input.
#[derive(Clone, Debug)]
pub struct Letterbox {
    pub scale: f32,
    pub offset: (f32, f32),
    /// Width and height of the frame before resizing.
    pub source: (u32, u32),
}

impl Letterbox {
    /// Model-input pixel → frame pixel.
    pub fn unproject(&self, x: f32, y: f32) -> (f32, f32) {
        let (ox, oy) = self.offset;
        ((x - ox) / self.scale, (y - oy) / self.scale)
    }
}

/// A square window of the frame, `side` pixels wide and turned by `angle`
/// radians around `center`, sampled into `size` × `size` model pixels.
#[derive(Clone, Debug)]
pub struct RotatedCrop {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub size: u32,
}

impl RotatedCrop {
    /// Crop pixel → frame pixel.
    pub fn unproject(&self, x: f32, y: f32) -> (f32, f32) {
        let pixels_per_sample = self.side / self.size as f32;
        let mid = self.size as f32 * 0.5;
        let (u, v) = ((x - mid) * pixels_per_sample, (y - mid) * pixels_per_sample);
        let (sin, cos) = self.angle.sin_cos();
        let (cx, cy) = self.center;
        (cx + u * cos - v * sin, cy + u * sin + v * cos)
    }
}

fn ensure_rgba(frame: &Frame) -> Result<()> {
    let pixels = frame.width as usize * frame.height as usize;
    ensure!(pixels > 0, "empty frame {}x{}", frame.width, frame.height);
    ensure!(
        frame.rgba.len() == pixels * 4,
        "frame holds {} bytes, {}x{} RGBA needs {}",
        frame.rgba.len(),
        frame.width,
        frame.height,
        pixels * 4
    );
    Ok(())
}

fn to_unit(channel: u8) -> f32 {
    f32::from(channel) / 255.0
}

fn nhwc(size: usize, data: Vec<f32>) -> Result<Array4<f32>> {
    Array4::from_shape_vec((1, size, size, 3), data).context("tensor shape does not match data")
}

/// Scales the frame to fit a `size` square without distortion, centres it on
/// black and returns the NHWC tensor with channels in `[0, 1]`.
pub fn letterbox(frame: &Frame, size: u32) -> Result<(Array4<f32>, Letterbox)> {
    ensure_rgba(frame)?;

    let scale = size as f32 / frame.width.max(frame.height) as f32;
    let fit = |extent: u32| ((extent as f32 * scale).round() as u32).clamp(1, size);
    let (fit_w, fit_h) = (fit(frame.width), fit(frame.height));

    let source = Image::from_vec_u8(frame.width, frame.height, frame.rgba.clone(), PixelType::U8x4)?;
    let mut scaled = Image::new(fit_w, fit_h, PixelType::U8x4);
    Resizer::new()
        .resize(
            &source,
            &mut scaled,
            Some(&ResizeOptions::new().resize_alg(ResizeAlg::Interpolation(FilterType::Bilinear))),
        )
        .context("letterbox resize failed")?;
    let scaled = scaled.into_vec();

    let side = size as usize;
    let left = (side - fit_w as usize) / 2;
    let top = (side - fit_h as usize) / 2;
    let scaled_stride = fit_w as usize * 4;

    let mut data = vec![0.0f32; side * side * 3];
    data.par_chunks_mut(side * 3)
        .skip(top)
        .take(fit_h as usize)
        .zip(scaled.par_chunks(scaled_stride))
        .for_each(|(out_row, in_row)| {
            let out = out_row[left * 3..].chunks_exact_mut(3);
            for (out_px, in_px) in out.zip(in_row.chunks_exact(4)) {
                out_px.iter_mut().zip(in_px).for_each(|(o, &c)| *o = to_unit(c));
            }
        });

    let mapping = Letterbox {
        scale,
        offset: (left as f32, top as f32),
        source: (frame.width, frame.height),
    };
    Ok((nhwc(side, data)?, mapping))
}

/// Samples `crop` out of the frame with bilinear filtering into an NHWC
/// tensor. Samples falling outside the frame are black.
pub fn rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    size: u32,
) -> Result<(Array4<f32>, RotatedCrop)> {
    ensure_rgba(frame)?;

    let crop = RotatedCrop {
        center,
        side,
        angle,
        size,
    };
    let edge = size as usize;
    let mut data = vec![0.0f32; edge * edge * 3];
    data.par_chunks_mut(edge * 3)
        .enumerate()
        .for_each(|(row, out_row)| {
            for (col, out_px) in out_row.chunks_exact_mut(3).enumerate() {
                let (sx, sy) = crop.unproject(col as f32 + 0.5, row as f32 + 0.5);
                out_px.copy_from_slice(&bilinear(frame, sx, sy));
            }
        });

    Ok((nhwc(edge, data)?, crop))
}

fn texel(frame: &Frame, x: i64, y: i64) -> [f32; 3] {
    if x < 0 || y < 0 || x >= i64::from(frame.width) || y >= i64::from(frame.height) {
        return [0.0; 3];
    }
    let at = (y as usize * frame.width as usize + x as usize) * 4;
    let px = &frame.rgba[at..at + 3];
    [to_unit(px[0]), to_unit(px[1]), to_unit(px[2])]
}

fn bilinear(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !(x.is_finite() && y.is_finite()) {
        return [0.0; 3];
    }
    let (left, top) = (x.floor(), y.floor());
    let (wx, wy) = (x - left, y - top);
    let (ix, iy) = (left as i64, top as i64);

    let taps = [
        (texel(frame, ix, iy), (1.0 - wx) * (1.0 - wy)),
        (texel(frame, ix + 1, iy), wx * (1.0 - wy)),
        (texel(frame, ix, iy + 1), (1.0 - wx) * wy),
        (texel(frame, ix + 1, iy + 1), wx * wy),
    ];
    let mut out = [0.0f32; 3];
    for (rgb, weight) in taps {
        for (acc, value) in out.iter_mut().zip(rgb) {
            *acc += value * weight;
        }
    }
    out
}

/// Converts frame pixels into a normalised landmark, clamped to the frame.
pub fn normalized_point(frame: &Frame, (x, y): (f32, f32)) -> LandmarkPoint {
    LandmarkPoint::new(
        (x / frame.width as f32).clamp(0.0, 1.0),
        (y / frame.height as f32).clamp(0.0, 1.0),
    )
}

pub fn sigmoid(logit: f32) -> f32 {
    (1.0 + (-logit).exp()).recip()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let rgba = [rgb[0], rgb[1], rgb[2], 255].repeat((width * height) as usize);
        Frame::new(rgba, width, height)
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = solid_frame(64, 32, [255, 0, 0]);
        let (input, mapping) = letterbox(&frame, 32).unwrap();

        assert_eq!(input.shape(), &[1, 32, 32, 3]);
        assert_eq!(mapping.scale, 0.5);
        assert_eq!(mapping.offset, (0.0, 8.0));
        assert_eq!(mapping.source, (64, 32));
        // Padding rows stay black, content rows carry the frame colour.
        assert_eq!(input[[0, 0, 10, 0]], 0.0);
        assert!((input[[0, 16, 10, 0]] - 1.0).abs() < 1e-3);
        assert_eq!(input[[0, 28, 10, 0]], 0.0);
    }

    #[test]
    fn letterbox_maps_back_to_frame_pixels() {
        let frame = solid_frame(64, 32, [0, 0, 0]);
        let (_, mapping) = letterbox(&frame, 32).unwrap();
        assert_eq!(mapping.unproject(16.0, 16.0), (32.0, 16.0));
    }

    #[test]
    fn unrotated_crop_maps_center_to_center() {
        let crop = RotatedCrop {
            center: (100.0, 50.0),
            side: 40.0,
            angle: 0.0,
            size: 20,
        };
        assert_eq!(crop.unproject(10.0, 10.0), (100.0, 50.0));
        assert_eq!(crop.unproject(0.0, 0.0), (80.0, 30.0));
    }

    #[test]
    fn crop_outside_the_frame_is_black() {
        let frame = solid_frame(8, 8, [255, 255, 255]);
        let (input, _) = rotated_crop(&frame, (100.0, 100.0), 4.0, 0.0, 4).unwrap();
        assert!(input.iter().all(|&value| value == 0.0));
    }

    #[test]
    fn crop_inside_a_solid_frame_keeps_its_colour() {
        let frame = solid_frame(16, 16, [0, 255, 0]);
        let (input, _) = rotated_crop(&frame, (8.0, 8.0), 4.0, 0.3, 4).unwrap();
        assert!((input[[0, 2, 2, 1]] - 1.0).abs() < 1e-4);
        assert_eq!(input[[0, 2, 2, 0]], 0.0);
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let frame = Frame::new(vec![0; 3], 1, 1);
        assert!(letterbox(&frame, 16).is_err());
    }

    #[test]
    fn normalized_points_are_clamped() {
        let frame = solid_frame(10, 20, [0, 0, 0]);
        let point = normalized_point(&frame, (5.0, 25.0));
        assert_eq!((point.x, point.y), (0.5, 1.0));
    }
}

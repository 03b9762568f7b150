//! Random affine and brightness augmentation for training samples.
//!
//! Parameters are drawn up front (see [`AugmentParams::sample`]) so the random
//! stream stays sequential even when images are decoded in parallel.

use image::{Rgb, RgbImage};
use rand::Rng;

/// Ranges for the random transform.
#[derive(Clone, Debug)]
pub struct AugmentationConfig {
    /// Rotation is uniform in `±rotation_degrees`
    pub rotation_degrees: f32,
    /// Shift is uniform in `±shift_fraction * size` on each axis
    pub shift_fraction: f32,
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Brightness factor is uniform in this closed range
    pub brightness_range: (f32, f32),
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 10.0,
            shift_fraction: 0.1,
            horizontal_flip_prob: 0.5,
            brightness_range: (0.9, 1.1),
        }
    }
}

/// One concrete draw of the random transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AugmentParams {
    pub angle_degrees: f32,
    pub shift_x: f32,
    pub shift_y: f32,
    pub flip: bool,
    pub brightness: f32,
}

impl AugmentParams {
    pub const IDENTITY: AugmentParams = AugmentParams {
        angle_degrees: 0.0,
        shift_x: 0.0,
        shift_y: 0.0,
        flip: false,
        brightness: 1.0,
    };

    /// Draw parameters for an image of `width` x `height`.
    pub fn sample<R: Rng>(config: &AugmentationConfig, width: u32, height: u32, rng: &mut R) -> Self {
        let angle_degrees = symmetric(rng, config.rotation_degrees);
        let shift_x = symmetric(rng, config.shift_fraction) * width as f32;
        let shift_y = symmetric(rng, config.shift_fraction) * height as f32;
        let flip = rng.gen::<f32>() < config.horizontal_flip_prob;
        let (lo, hi) = config.brightness_range;
        let brightness = if hi > lo { rng.gen_range(lo..=hi) } else { lo };

        Self {
            angle_degrees,
            shift_x,
            shift_y,
            flip,
            brightness,
        }
    }

    /// Rotate about the center, shift, flip, then scale brightness.
    /// Pixels mapped from outside the source are filled with black.
    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        let mut out = if self.angle_degrees == 0.0 && self.shift_x == 0.0 && self.shift_y == 0.0 {
            img.clone()
        } else {
            warp(img, self.angle_degrees, self.shift_x, self.shift_y)
        };

        if self.flip {
            image::imageops::flip_horizontal_in_place(&mut out);
        }

        if self.brightness != 1.0 {
            for pixel in out.pixels_mut() {
                for c in pixel.0.iter_mut() {
                    *c = (*c as f32 * self.brightness).round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        out
    }
}

fn symmetric<R: Rng>(rng: &mut R, range: f32) -> f32 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}

fn warp(img: &RgbImage, angle_degrees: f32, shift_x: f32, shift_y: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();

    RgbImage::from_fn(width, height, |x, y| {
        // Inverse map: undo the shift, then the rotation.
        let dx = x as f32 - shift_x - cx;
        let dy = y as f32 - shift_y - cy;
        let src_x = cx + dx * cos_a + dy * sin_a;
        let src_y = cy - dx * sin_a + dy * cos_a;
        bilinear_sample(img, src_x, src_y)
    })
}

fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(result)
}

use std::path::Path;

use image::{imageops, imageops::FilterType, ImageError, ImageReader, RgbImage};

use crate::error::{CovidNetError, Result};

/// Side length of the square network input.
pub const IMAGE_SIZE: u32 = 224;

/// Number of values in one channel-last input image.
pub const IMAGE_LEN: usize = (IMAGE_SIZE * IMAGE_SIZE * 3) as usize;

fn image_error(path: &Path, source: ImageError) -> CovidNetError {
    CovidNetError::Image {
        path: path.to_path_buf(),
        source,
    }
}

/// Decode an image from disk as 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| image_error(path, ImageError::IoError(e)))?;

    let img = reader.decode().map_err(|e| image_error(path, e))?;
    Ok(img.to_rgb8())
}

/// Drop the top sixth of the image, where scanner headers usually sit.
pub fn crop_header(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let top = height / 6;
    imageops::crop_imm(img, 0, top, width, height - top).to_image()
}

pub fn resize_square(img: &RgbImage) -> RgbImage {
    imageops::resize(img, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle)
}

/// Flatten to channel-last `f32` values in [0, 1].
pub fn normalize(img: &RgbImage) -> Vec<f32> {
    img.pixels()
        .flat_map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .map(|v| v / 255.0)
        .collect()
}

/// Decode, crop and resize. Augmentation, when used, is applied to the result.
pub fn load_cropped(path: &Path) -> Result<RgbImage> {
    let img = load_rgb(path)?;
    Ok(resize_square(&crop_header(&img)))
}

/// The evaluation transform: decode, crop, resize and normalize.
pub fn preprocess(path: &Path) -> Result<Vec<f32>> {
    Ok(normalize(&load_cropped(path)?))
}

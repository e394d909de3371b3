//! Loading and saving photos.

use image::codecs::gif::GifDecoder;
use image::{imageops, AnimationDecoder, DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("input file not found: {0}")]
    NotFound(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("animation has no frames: {0}")]
    EmptyAnimation(String),
}

/// Open a photo as 8-bit RGB.
///
/// The format is sniffed from the file contents. Animated GIFs yield their
/// first frame. Any alpha channel is dropped.
pub fn open_image(path: impl AsRef<Path>) -> Result<RgbImage, MediaError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MediaError::NotFound(path.display().to_string()));
    }

    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let image = if format == Some(ImageFormat::Gif) {
        first_gif_frame(path)?
    } else {
        reader.decode()?
    };

    tracing::info!(
        path = %path.display(),
        ?format,
        width = image.width(),
        height = image.height(),
        "loaded image"
    );
    Ok(image.to_rgb8())
}

fn first_gif_frame(path: &Path) -> Result<DynamicImage, MediaError> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
    let frames = decoder.into_frames().collect_frames()?;
    tracing::info!(path = %path.display(), frames = frames.len(), "decoded GIF, using first frame");

    let first = frames
        .into_iter()
        .next()
        .ok_or_else(|| MediaError::EmptyAnimation(path.display().to_string()))?;
    Ok(DynamicImage::ImageRgba8(first.into_buffer()))
}

/// Save `image` to `path`, format chosen by extension.
pub fn save_image(image: &RgbImage, path: impl AsRef<Path>, greyscale: bool) -> Result<(), MediaError> {
    let path = path.as_ref();
    if greyscale {
        imageops::grayscale(image).save(path)?;
    } else {
        image.save(path)?;
    }
    tracing::info!(path = %path.display(), greyscale, "saved image");
    Ok(())
}

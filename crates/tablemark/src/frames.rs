//! Image-file I/O for frames (feature `image`).

use crate::core::{FramePreprocessor, GrayImage, GrayImageView};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    InvalidGrayBuffer { expected: usize, got: usize },
    #[error("invalid grayscale image dimensions (width={width}, height={height})")]
    InvalidGrayDimensions { width: usize, height: usize },
    #[error(transparent)]
    Image(#[from] ::image::ImageError),
    #[error(transparent)]
    Undistort(#[from] crate::core::UndistortError),
}

/// Borrow an `image::GrayImage` as a frame view.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

pub fn to_frame(img: &::image::GrayImage) -> GrayImage {
    GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw().clone(),
    }
}

pub fn to_image(frame: &GrayImage) -> Result<::image::GrayImage, FrameError> {
    let dims = u32::try_from(frame.width)
        .ok()
        .zip(u32::try_from(frame.height).ok());
    let Some((w, h)) = dims else {
        return Err(FrameError::InvalidGrayDimensions {
            width: frame.width,
            height: frame.height,
        });
    };
    let expected = frame.width * frame.height;
    if frame.data.len() != expected {
        return Err(FrameError::InvalidGrayBuffer {
            expected,
            got: frame.data.len(),
        });
    }
    ::image::GrayImage::from_raw(w, h, frame.data.clone()).ok_or(
        FrameError::InvalidGrayDimensions {
            width: frame.width,
            height: frame.height,
        },
    )
}

/// Load any supported image file as a grayscale frame.
pub fn load_frame(path: impl AsRef<Path>) -> Result<GrayImage, FrameError> {
    let img = ::image::open(path)?.to_luma8();
    Ok(to_frame(&img))
}

pub fn save_frame(frame: &GrayImage, path: impl AsRef<Path>) -> Result<(), FrameError> {
    to_image(frame)?.save(path)?;
    Ok(())
}

/// Apply `preprocessor` to an image file and write the result.
pub fn preprocess_file(
    preprocessor: &FramePreprocessor,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<(), FrameError> {
    let frame = load_frame(input)?;
    let processed = preprocessor.process(&frame)?;
    save_frame(&processed, output)
}

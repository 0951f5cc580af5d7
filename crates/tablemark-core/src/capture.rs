//! Capability traits for the external camera and marker detector.

use crate::{Detection, GrayImage, GrayImageView};

/// Failure to acquire the capture device.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("failed to open camera: {0}")]
    Open(String),
}

/// Exclusive frame source. Use through [`CameraSession`] so the device is
/// always released.
pub trait Camera {
    fn open(&mut self) -> Result<(), CameraError>;

    /// Next frame, or `None` once the device stops delivering frames.
    fn read(&mut self) -> Option<GrayImage>;

    fn release(&mut self);
}

impl<C: Camera + ?Sized> Camera for &mut C {
    fn open(&mut self) -> Result<(), CameraError> {
        (**self).open()
    }

    fn read(&mut self) -> Option<GrayImage> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Scoped device handle: opened on creation, released on drop.
pub struct CameraSession<'a, C: Camera + ?Sized> {
    camera: &'a mut C,
}

impl<'a, C: Camera + ?Sized> CameraSession<'a, C> {
    pub fn open(camera: &'a mut C) -> Result<Self, CameraError> {
        camera.open()?;
        Ok(Self { camera })
    }

    #[inline]
    pub fn read(&mut self) -> Option<GrayImage> {
        self.camera.read()
    }
}

impl<C: Camera + ?Sized> Drop for CameraSession<'_, C> {
    fn drop(&mut self) {
        self.camera.release();
    }
}

/// Fiducial detector: `None` when no marker is visible.
pub trait MarkerDetector {
    fn detect(&mut self, frame: &GrayImageView<'_>) -> Option<Detection>;
}

impl<D: MarkerDetector + ?Sized> MarkerDetector for &mut D {
    fn detect(&mut self, frame: &GrayImageView<'_>) -> Option<Detection> {
        (**self).detect(frame)
    }
}

impl<D: MarkerDetector + ?Sized> MarkerDetector for Box<D> {
    fn detect(&mut self, frame: &GrayImageView<'_>) -> Option<Detection> {
        (**self).detect(frame)
    }
}

use anyhow::Result;

use crate::frame::Frame;

use super::result::DetectionResult;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Boxes with class and confidence.
    ObjectDetection,
    /// A rendered image with the boxes drawn in.
    AnnotatedImage,
}

/// An object detector fed with camera frames.
pub trait DetectorBackend: Send {
    fn name(&self) -> &'static str;

    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on one frame. Boxes come back in the frame's own pixel
    /// coordinates.
    fn detect(&mut self, frame: &Frame, capability: DetectionCapability) -> Result<DetectionResult>;

    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Offline backend for tests and demos.
///
/// Reports the configured boxes for every frame; by default one box
/// covering the middle quarter of the frame.
#[derive(Debug, Default)]
pub struct StubBackend {
    fixed: Option<Vec<Detection>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            fixed: Some(detections),
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, frame: &Frame, _capability: DetectionCapability) -> Result<DetectionResult> {
        self.calls += 1;
        let detections = match &self.fixed {
            Some(fixed) => fixed.clone(),
            None => vec![Detection {
                class: "object".to_string(),
                x: frame.width as f32 / 2.0,
                y: frame.height as f32 / 2.0,
                width: frame.width as f32 / 2.0,
                height: frame.height as f32 / 2.0,
                confidence: 0.9,
            }],
        };
        Ok(DetectionResult {
            detections,
            annotated_image: None,
        })
    }
}

/// Output of one detection call.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Boxes in frame pixel coordinates.
    pub detections: Vec<Detection>,
    /// Rendered image (JPEG) when the backend was asked for one.
    pub annotated_image: Option<Vec<u8>>,
}

impl DetectionResult {
    pub fn best(&self) -> Option<&Detection> {
        self.detections
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

/// One detected object. `x`/`y` are the box center.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl Detection {
    /// Integer box corners `(x1, y1, x2, y2)` for drawing.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        (
            (self.x - half_w) as i32,
            (self.y - half_h) as i32,
            (self.x + half_w) as i32,
            (self.y + half_h) as i32,
        )
    }

    /// Same box in a frame `factor` times larger.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            class: self.class.clone(),
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
        }
    }

    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apple(x: f32, confidence: f32) -> Detection {
        Detection {
            class: "apple".into(),
            x,
            y: 50.0,
            width: 20.0,
            height: 10.0,
            confidence,
        }
    }

    #[test]
    fn corners_are_center_minus_half_extent() {
        assert_eq!(apple(100.0, 0.5).corners(), (90, 45, 110, 55));
    }

    #[test]
    fn best_picks_highest_confidence() {
        let result = DetectionResult {
            detections: vec![apple(10.0, 0.4), apple(20.0, 0.9), apple(30.0, 0.7)],
            annotated_image: None,
        };
        assert_eq!(result.best().map(|d| d.x), Some(20.0));
    }
}

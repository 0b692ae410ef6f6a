//! Hosted object detection over REST (Roboflow-style inference API).
//!
//! Each frame is resized so its longer side equals the model input size,
//! JPEG encoded, base64 encoded and POSTed as a form body. The service
//! answers with JSON predictions (box centers in the resized image) or an
//! annotated JPEG.

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use serde::Deserialize;
use url::Url;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

const JPEG_QUALITY: u8 = 90;
const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub endpoint: String,
    /// `project/version`.
    pub model: String,
    pub api_key: String,
    /// Longer side of the image sent to the model.
    pub input_size: u32,
    /// Percent.
    pub confidence: u32,
    /// Percent.
    pub overlap: u32,
    /// Box line width in annotated images.
    pub stroke: u32,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://detect.roboflow.com".to_string(),
            model: "simplefruits/1".to_string(),
            api_key: String::new(),
            input_size: 416,
            confidence: 40,
            overlap: 30,
            stroke: 5,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct RemoteBackend {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!("remote detector needs an api key"));
        }
        // Fail early on a malformed endpoint.
        request_url(&config, DetectionCapability::ObjectDetection)?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self { config, agent })
    }

    fn post(&self, url: &Url, body: String) -> Result<ureq::Response> {
        self.agent
            .post(url.as_str())
            .set("Content-Type", "application/x-www-form-urlencoded")
            .send_string(&body)
            .with_context(|| format!("POST {}{}", url.origin().ascii_serialization(), url.path()))
    }
}

/// Inference URL for `capability`. The api key travels in the query string.
pub fn request_url(config: &RemoteConfig, capability: DetectionCapability) -> Result<Url> {
    let base = format!(
        "{}/{}",
        config.endpoint.trim_end_matches('/'),
        config.model.trim_matches('/')
    );
    let mut url = Url::parse(&base).with_context(|| format!("invalid detector endpoint '{base}'"))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("api_key", &config.api_key)
            .append_pair("confidence", &config.confidence.to_string())
            .append_pair("overlap", &config.overlap.to_string());
        match capability {
            DetectionCapability::AnnotatedImage => {
                query
                    .append_pair("format", "image")
                    .append_pair("stroke", &config.stroke.to_string());
            }
            _ => {
                query.append_pair("format", "json");
            }
        }
    }
    Ok(url)
}

/// Scale factor that brings the longer side of a `width`x`height` frame to
/// `input_size`.
pub fn resize_scale(width: u32, height: u32, input_size: u32) -> f64 {
    let longest = width.max(height).max(1);
    input_size as f64 / longest as f64
}

/// Resize and JPEG encode a frame for upload.
pub fn encode_for_upload(frame: &Frame, input_size: u32) -> Result<Vec<u8>> {
    let rgb = frame.clone().into_rgb();
    let (width, height) = (rgb.width, rgb.height);
    let image = RgbImage::from_raw(width, height, rgb.into_data())
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))?;

    let scale = resize_scale(width, height, input_size);
    let target_w = ((width as f64 * scale).round() as u32).max(1);
    let target_h = ((height as f64 * scale).round() as u32).max(1);
    let resized = image::imageops::resize(&image, target_w, target_h, FilterType::Triangle);

    let mut jpeg = Vec::new();
    resized
        .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY))
        .context("encode jpeg")?;
    Ok(jpeg)
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    class: String,
    confidence: f32,
}

/// Parse a JSON response; boxes are mapped from the resized image back to
/// the frame by dividing by `scale`.
pub fn parse_predictions(body: &str, scale: f64) -> Result<Vec<Detection>> {
    let response: PredictionResponse =
        serde_json::from_str(body).context("invalid detector response")?;
    if scale <= 0.0 {
        return Err(anyhow!("invalid resize scale {scale}"));
    }
    let back = (1.0 / scale) as f32;
    Ok(response
        .predictions
        .into_iter()
        .map(|p| {
            Detection {
                class: p.class,
                x: p.x,
                y: p.y,
                width: p.width,
                height: p.height,
                confidence: p.confidence,
            }
            .scaled(back)
        })
        .collect())
}

impl DetectorBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::ObjectDetection | DetectionCapability::AnnotatedImage
        )
    }

    fn detect(&mut self, frame: &Frame, capability: DetectionCapability) -> Result<DetectionResult> {
        let url = request_url(&self.config, capability)?;
        let jpeg = encode_for_upload(frame, self.config.input_size)?;
        let response = self.post(&url, STANDARD.encode(jpeg))?;

        match capability {
            DetectionCapability::AnnotatedImage => {
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .take(MAX_IMAGE_BYTES)
                    .read_to_end(&mut bytes)
                    .context("read annotated image")?;
                if bytes.is_empty() {
                    return Err(anyhow!("empty annotated image"));
                }
                Ok(DetectionResult {
                    detections: Vec::new(),
                    annotated_image: Some(bytes),
                })
            }
            _ => {
                let body = response.into_string().context("read detector response")?;
                let scale = resize_scale(frame.width, frame.height, self.config.input_size);
                let detections = parse_predictions(&body, scale)?;
                log::debug!("remote detector: {} objects", detections.len());
                Ok(DetectionResult {
                    detections,
                    annotated_image: None,
                })
            }
        }
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::frame::Frame;

use super::backend::{DetectionCapability, DetectorBackend};
use super::result::DetectionResult;

type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Named detector backends with a default.
///
/// `detect` takes `&mut self`, so each backend sits behind a `Mutex`.
pub struct BackendRegistry {
    backends: BTreeMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
            default_name: None,
        }
    }

    /// The first backend registered becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        log::debug!("detector backend '{name}' registered");
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("detector backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// A backend supporting `capability`, the default one if it does.
    pub fn backend_for_capability(&self, capability: DetectionCapability) -> Result<SharedBackend> {
        let supports = |backend: &SharedBackend| -> Result<bool> {
            let guard = backend
                .lock()
                .map_err(|_| anyhow!("detector backend lock poisoned"))?;
            Ok(guard.supports(capability))
        };

        if let Some(default_backend) = self.default_backend() {
            if supports(&default_backend)? {
                return Ok(default_backend);
            }
        }
        for backend in self.backends.values() {
            if supports(backend)? {
                return Ok(backend.clone());
            }
        }
        Err(anyhow!(
            "no registered detector backend supports {:?}",
            capability
        ))
    }

    pub fn detect(&self, capability: DetectionCapability, frame: &Frame) -> Result<DetectionResult> {
        let backend = self.backend_for_capability(capability)?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))?;
        guard.detect(frame, capability)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::frame::ChannelOrder;

    #[test]
    fn first_backend_is_default_and_serves_boxes() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::default());
        assert_eq!(registry.list(), vec!["stub".to_string()]);

        let frame = Frame::new(8, 4, ChannelOrder::Bgr, vec![0; 8 * 4 * 3]).unwrap();
        let result = registry
            .detect(DetectionCapability::ObjectDetection, &frame)
            .unwrap();
        assert_eq!(result.detections.len(), 1);
    }

    #[test]
    fn unsupported_capability_is_an_error() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::default());
        assert!(registry
            .backend_for_capability(DetectionCapability::AnnotatedImage)
            .is_err());
        assert!(registry.set_default("remote").is_err());
    }
}

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Flat-field coefficients as produced by the SDK or read from a device.
///
/// The layout is opaque to this crate; files hold the bytes verbatim.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CoefficientBuffer {
    data: Vec<u8>,
}

impl CoefficientBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.data)?;
        log::info!("saved {} coefficient bytes to {}", self.data.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        log::info!("loaded {} coefficient bytes from {}", data.len(), path.display());
        Ok(Self { data })
    }
}

impl fmt::Debug for CoefficientBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoefficientBuffer({} bytes)", self.data.len())
    }
}

//! Converted 8-bit color frames.
//!
//! - `Frame`: packed 3-channel image in either RGB or BGR order.
//!
//! Raw sensor buffers stay in `device::RawImage`; a `Frame` only exists
//! after the SDK's image processor has converted one.

use crate::error::{CameraError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Packed 8-bit, 3-channel image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(CameraError::Device(format!(
                "frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at `(x, y)` in the frame's own channel order.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        let px = &self.data[offset..offset + 3];
        Some([px[0], px[1], px[2]])
    }

    /// Reorder channels in place.
    pub fn into_order(mut self, order: ChannelOrder) -> Self {
        if self.order != order {
            for px in self.data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            self.order = order;
        }
        self
    }

    pub fn into_bgr(self) -> Self {
        self.into_order(ChannelOrder::Bgr)
    }

    pub fn into_rgb(self) -> Self {
        self.into_order(ChannelOrder::Rgb)
    }

    /// Mean over all channels, 0.0 for an empty frame.
    pub fn mean_intensity(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&b| b as u64).sum();
        sum as f64 / self.data.len() as f64
    }
}

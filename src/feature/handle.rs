use std::fmt;

use crate::device::FeatureControl;
use crate::error::{CameraError, Result};

use super::kind::{coerce, FeatureDescriptor, FeatureKind, FeatureRange, FeatureValue, SetValue, WriteValue};

/// A device control resolved by name.
///
/// Resolution never fails: a control the device does not implement (or
/// implements with a different kind) comes back as `Feature::Unavailable`,
/// which answers every operation with `CameraError::FeatureUnavailable`.
/// Call [`Feature::require`] to turn absence into an error up front.
#[derive(Clone, Debug)]
pub enum Feature<'dev> {
    Available(FeatureHandle<'dev>),
    Unavailable(UnavailableFeature),
}

/// A control known to exist on the device with its declared kind.
///
/// Borrows the device's node map, so it cannot outlive the session it was
/// resolved from.
#[derive(Clone)]
pub struct FeatureHandle<'dev> {
    descriptor: FeatureDescriptor,
    control: &'dev dyn FeatureControl,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnavailableFeature {
    descriptor: FeatureDescriptor,
}

impl UnavailableFeature {
    pub fn descriptor(&self) -> &FeatureDescriptor {
        &self.descriptor
    }

    fn error(&self) -> CameraError {
        CameraError::unavailable(self.descriptor.name(), self.descriptor.kind())
    }
}

impl<'dev> Feature<'dev> {
    pub fn resolve(control: &'dev dyn FeatureControl, descriptor: FeatureDescriptor) -> Self {
        let name = descriptor.name();
        if !control.is_implemented(name) {
            log::debug!("feature {name} not implemented");
            return Feature::Unavailable(UnavailableFeature { descriptor });
        }
        match control.kind_of(name) {
            Some(kind) if kind == descriptor.kind() => {
                Feature::Available(FeatureHandle { descriptor, control })
            }
            other => {
                log::warn!(
                    "feature {name} declared as {} but device reports {:?}",
                    descriptor.kind(),
                    other
                );
                Feature::Unavailable(UnavailableFeature { descriptor })
            }
        }
    }

    pub fn descriptor(&self) -> &FeatureDescriptor {
        match self {
            Feature::Available(handle) => &handle.descriptor,
            Feature::Unavailable(absent) => &absent.descriptor,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor().name()
    }

    pub fn kind(&self) -> FeatureKind {
        self.descriptor().kind()
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Feature::Available(_))
    }

    pub fn require(self) -> Result<FeatureHandle<'dev>> {
        match self {
            Feature::Available(handle) => Ok(handle),
            Feature::Unavailable(absent) => Err(absent.error()),
        }
    }

    fn handle(&self) -> Result<&FeatureHandle<'dev>> {
        match self {
            Feature::Available(handle) => Ok(handle),
            Feature::Unavailable(absent) => Err(absent.error()),
        }
    }

    /// False when unavailable.
    pub fn is_readable(&self) -> bool {
        self.handle().map(|h| h.is_readable()).unwrap_or(false)
    }

    /// False when unavailable.
    pub fn is_writable(&self) -> bool {
        self.handle().map(|h| h.is_writable()).unwrap_or(false)
    }

    pub fn get(&self) -> Result<FeatureValue> {
        self.handle()?.get()
    }

    pub fn get_i64(&self) -> Result<i64> {
        self.handle()?.get_i64()
    }

    pub fn get_f64(&self) -> Result<f64> {
        self.handle()?.get_f64()
    }

    pub fn get_bool(&self) -> Result<bool> {
        self.handle()?.get_bool()
    }

    pub fn get_string(&self) -> Result<String> {
        self.handle()?.get_string()
    }

    pub fn set(&self, value: impl Into<SetValue>) -> Result<()> {
        self.handle()?.set(value)
    }

    pub fn range(&self) -> Result<Option<FeatureRange>> {
        self.handle()?.range()
    }

    pub fn send_command(&self) -> Result<()> {
        self.handle()?.send_command()
    }

    pub fn string_max_length(&self) -> Result<usize> {
        self.handle()?.string_max_length()
    }

    pub fn buffer_length(&self) -> Result<usize> {
        self.handle()?.buffer_length()
    }

    pub fn get_buffer(&self) -> Result<Vec<u8>> {
        self.handle()?.get_buffer()
    }

    pub fn set_buffer(&self, data: &[u8]) -> Result<()> {
        self.handle()?.set_buffer(data)
    }
}

impl<'dev> FeatureHandle<'dev> {
    pub fn descriptor(&self) -> &FeatureDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn kind(&self) -> FeatureKind {
        self.descriptor.kind()
    }

    pub fn is_readable(&self) -> bool {
        self.control.is_readable(self.name())
    }

    pub fn is_writable(&self) -> bool {
        self.control.is_writable(self.name())
    }

    fn require_kind(&self, expected: FeatureKind) -> Result<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(CameraError::InvalidKind {
                name: self.name().to_string(),
                expected,
                actual: self.kind(),
            })
        }
    }

    pub fn get(&self) -> Result<FeatureValue> {
        if self.kind() == FeatureKind::Command {
            return Err(CameraError::InvalidKind {
                name: self.name().to_string(),
                expected: FeatureKind::Integer,
                actual: FeatureKind::Command,
            });
        }
        if !self.is_readable() {
            return Err(CameraError::NotReadable(self.name().to_string()));
        }
        let value = self.control.read(self.name())?;
        if value.kind() != self.kind() {
            return Err(CameraError::Device(format!(
                "feature {} returned a {} value, declared {}",
                self.name(),
                value.kind(),
                self.kind()
            )));
        }
        Ok(value)
    }

    pub fn get_i64(&self) -> Result<i64> {
        self.require_kind(FeatureKind::Integer)?;
        self.get()?
            .as_i64()
            .ok_or_else(|| CameraError::Device(format!("feature {} is not integral", self.name())))
    }

    pub fn get_f64(&self) -> Result<f64> {
        self.require_kind(FeatureKind::Float)?;
        self.get()?
            .as_f64()
            .ok_or_else(|| CameraError::Device(format!("feature {} is not numeric", self.name())))
    }

    pub fn get_bool(&self) -> Result<bool> {
        self.require_kind(FeatureKind::Bool)?;
        self.get()?
            .as_bool()
            .ok_or_else(|| CameraError::Device(format!("feature {} is not boolean", self.name())))
    }

    /// String value, or the current symbolic of an enumeration.
    pub fn get_string(&self) -> Result<String> {
        match self.kind() {
            FeatureKind::String | FeatureKind::Enum => {}
            actual => {
                return Err(CameraError::InvalidKind {
                    name: self.name().to_string(),
                    expected: FeatureKind::String,
                    actual,
                })
            }
        }
        match self.get()? {
            FeatureValue::String(s) => Ok(s),
            FeatureValue::Enum(entry) => Ok(entry.symbolic),
            other => Err(CameraError::Device(format!(
                "feature {} returned {other:?}",
                self.name()
            ))),
        }
    }

    /// Coerce `value` to the declared kind and write it.
    ///
    /// A control that is not writable is left untouched.
    pub fn set(&self, value: impl Into<SetValue>) -> Result<()> {
        if self.kind() == FeatureKind::Command {
            return Err(CameraError::InvalidKind {
                name: self.name().to_string(),
                expected: FeatureKind::Integer,
                actual: FeatureKind::Command,
            });
        }
        if !self.is_writable() {
            return Err(CameraError::NotWritable(self.name().to_string()));
        }
        let value = coerce(self.name(), self.kind(), value.into())?;
        log::debug!("set {} = {:?}", self.name(), value);
        self.control.write(self.name(), value)
    }

    /// Valid values for Integer, Float and Enum controls; `None` otherwise.
    pub fn range(&self) -> Result<Option<FeatureRange>> {
        match self.kind() {
            FeatureKind::Integer | FeatureKind::Float | FeatureKind::Enum => {
                self.control.range(self.name())
            }
            FeatureKind::String | FeatureKind::Bool | FeatureKind::Command | FeatureKind::Buffer => {
                Ok(None)
            }
        }
    }

    pub fn send_command(&self) -> Result<()> {
        self.require_kind(FeatureKind::Command)?;
        if !self.is_writable() {
            return Err(CameraError::NotWritable(self.name().to_string()));
        }
        log::debug!("execute {}", self.name());
        self.control.execute(self.name())
    }

    pub fn string_max_length(&self) -> Result<usize> {
        self.require_kind(FeatureKind::String)?;
        self.control.string_max_length(self.name())
    }

    pub fn buffer_length(&self) -> Result<usize> {
        self.require_kind(FeatureKind::Buffer)?;
        if !self.is_readable() {
            return Err(CameraError::NotReadable(self.name().to_string()));
        }
        self.control.buffer_length(self.name())
    }

    pub fn get_buffer(&self) -> Result<Vec<u8>> {
        self.require_kind(FeatureKind::Buffer)?;
        match self.get()? {
            FeatureValue::Buffer(data) => Ok(data),
            other => Err(CameraError::Device(format!(
                "feature {} returned {other:?}",
                self.name()
            ))),
        }
    }

    pub fn set_buffer(&self, data: &[u8]) -> Result<()> {
        self.require_kind(FeatureKind::Buffer)?;
        if !self.is_writable() {
            return Err(CameraError::NotWritable(self.name().to_string()));
        }
        self.control
            .write(self.name(), WriteValue::Buffer(data.to_vec()))
    }
}

impl fmt::Debug for FeatureHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceManager, SimCamera, SimDeviceManager};

    fn open() -> Box<dyn Device> {
        let manager = SimDeviceManager::new(vec![SimCamera::new("SIM-0001")]);
        manager.open_by_index(1).unwrap()
    }

    #[test]
    fn unavailable_feature_reports_every_operation() {
        let device = open();
        let feature = Feature::resolve(
            device.features(),
            FeatureDescriptor::new("NoSuchNode", FeatureKind::Integer),
        );
        assert!(!feature.is_available());
        assert!(!feature.is_readable());
        assert!(!feature.is_writable());
        for result in [
            feature.get().map(|_| ()),
            feature.set(1i64),
            feature.range().map(|_| ()),
            feature.send_command(),
            feature.buffer_length().map(|_| ()),
        ] {
            assert!(matches!(result, Err(CameraError::FeatureUnavailable { .. })));
        }
        assert!(feature.require().is_err());
    }

    #[test]
    fn kind_mismatch_resolves_unavailable() {
        let device = open();
        let feature = Feature::resolve(
            device.features(),
            FeatureDescriptor::new("ExposureTime", FeatureKind::Integer),
        );
        assert!(!feature.is_available());
    }

    #[test]
    fn integer_range_is_reported() {
        let device = open();
        let binning = Feature::resolve(
            device.features(),
            FeatureDescriptor::new("BinningHorizontal", FeatureKind::Integer),
        );
        let range = binning.range().unwrap().expect("integer range");
        assert!(matches!(range, FeatureRange::Integer { min: 1, .. }));
    }

    #[test]
    fn command_requires_command_kind() {
        let device = open();
        let gain = Feature::resolve(
            device.features(),
            FeatureDescriptor::new("Gain", FeatureKind::Float),
        );
        assert!(matches!(
            gain.send_command(),
            Err(CameraError::InvalidKind {
                expected: FeatureKind::Command,
                ..
            })
        ));
        assert_eq!(gain.range().unwrap().and_then(|r| r.bounds()).map(|b| b.0), Some(0.0));
    }
}

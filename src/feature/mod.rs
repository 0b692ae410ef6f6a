//! Uniform access to named device controls.

pub mod catalog;
mod handle;
mod kind;

pub use handle::{Feature, FeatureHandle, UnavailableFeature};
pub use kind::{
    coerce, EnumEntry, EnumSelection, FeatureDescriptor, FeatureKind, FeatureRange, FeatureValue,
    SetValue, WriteValue,
};

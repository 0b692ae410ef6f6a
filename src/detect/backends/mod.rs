pub mod stub;

#[cfg(feature = "detect-remote")]
pub mod remote;

pub use stub::StubBackend;

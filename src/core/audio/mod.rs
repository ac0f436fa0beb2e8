//! Host audio device backends.
//!
//! Enabled with the `device-audio` feature. Without it the crate only talks to
//! audio through the [`AudioBackend`](crate::core::capture::AudioBackend) and
//! [`OutputClock`](crate::core::playback::OutputClock) traits.

#[cfg(feature = "device-audio")]
mod device;

#[cfg(feature = "device-audio")]
pub use device::{CpalBackend, CpalMicrophone, CpalOutput};

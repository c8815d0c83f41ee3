//! # exciteometer-cpal
//!
//! Microphone backend for exciteometer built on cpal.
//!
//! Provides:
//! - `CpalMicDevice`: `CaptureDevice` over the default (or a named) input device
//! - `list_input_devices`: input endpoint enumeration
//! - `PcmConverter`: downmix, linear resample and i16 quantization of device buffers
//!
//! ## Usage
//! ```ignore
//! use exciteometer_core::{CaptureConfiguration, CaptureSession, SessionRegistry};
//! use exciteometer_cpal::CpalMicDevice;
//!
//! let registry = SessionRegistry::shared();
//! let mut session = CaptureSession::new(CpalMicDevice::default(), CaptureConfiguration::default(), registry)?;
//! session.start("Entry 1")?;
//! ```

pub mod convert;
pub mod device_enumerator;
pub mod microphone;

pub use convert::PcmConverter;
pub use device_enumerator::{list_input_devices, InputDeviceInfo};
pub use microphone::{CpalCaptureHandle, CpalMicDevice};

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Default capture rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Only 16-bit samples are captured and serialized.
pub const PCM_BITS_PER_SAMPLE: u16 = 16;

/// Sample encoding of the captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    LinearPcm,
}

/// Immutable description of the captured stream.
///
/// The channel count is the single source of truth for capture, byte-rate,
/// block-align and the serialized header. Derived quantities are computed on
/// demand and cannot be set independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormatSpec {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    encoding: SampleEncoding,
}

impl AudioFormatSpec {
    /// 16-bit linear PCM at the given rate and channel count.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: PCM_BITS_PER_SAMPLE,
            encoding: SampleEncoding::LinearPcm,
        }
    }

    /// Builds a format with an explicit sample width. Used when decoding headers.
    pub fn with_bits_per_sample(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            encoding: SampleEncoding::LinearPcm,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    /// Bytes per second: `bits_per_sample * sample_rate * channels / 8`.
    pub fn byte_rate(&self) -> u32 {
        self.try_byte_rate().unwrap_or(u32::MAX)
    }

    /// Bytes per sample frame across all channels.
    pub fn block_align(&self) -> u16 {
        (u32::from(self.channels) * u32::from(self.bits_per_sample) / 8) as u16
    }

    /// Frame length for one device read: at least the device minimum and
    /// always a whole number of sample frames.
    pub fn frame_size(&self, device_minimum: usize) -> usize {
        let align = usize::from(self.block_align()).max(1);
        let wanted = device_minimum.max(align);
        wanted.div_ceil(align) * align
    }

    /// Checks that the format can be represented in a canonical PCM header.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 {
            return Err(CaptureError::InvalidFormat("sample rate must be positive".into()));
        }
        if self.channels == 0 {
            return Err(CaptureError::InvalidFormat("channel count must be positive".into()));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(CaptureError::InvalidFormat(format!(
                "bits per sample must be a positive multiple of 8, got {}",
                self.bits_per_sample
            )));
        }
        if u32::from(self.channels) * u32::from(self.bits_per_sample) / 8 > u32::from(u16::MAX) {
            return Err(CaptureError::InvalidFormat("block align overflows".into()));
        }
        self.try_byte_rate()
            .ok_or_else(|| CaptureError::InvalidFormat("byte rate overflows".into()))?;
        Ok(())
    }

    fn try_byte_rate(&self) -> Option<u32> {
        let rate = u64::from(self.bits_per_sample) * u64::from(self.sample_rate) * u64::from(self.channels) / 8;
        u32::try_from(rate).ok()
    }
}

impl Default for AudioFormatSpec {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_8khz_mono_16bit() {
        let format = AudioFormatSpec::default();
        assert_eq!(format.sample_rate(), 8000);
        assert_eq!(format.channels(), 1);
        assert_eq!(format.bits_per_sample(), 16);
        assert_eq!(format.encoding(), SampleEncoding::LinearPcm);
    }

    #[test]
    fn derived_fields_follow_channel_count() {
        let mono = AudioFormatSpec::new(8000, 1);
        assert_eq!(mono.byte_rate(), 16000);
        assert_eq!(mono.block_align(), 2);

        let stereo = AudioFormatSpec::new(8000, 2);
        assert_eq!(stereo.byte_rate(), 32000);
        assert_eq!(stereo.block_align(), 4);
    }

    #[test]
    fn frame_size_rounds_to_block_align() {
        let stereo = AudioFormatSpec::new(8000, 2);
        assert_eq!(stereo.frame_size(0), 4);
        assert_eq!(stereo.frame_size(639), 640);
        assert_eq!(stereo.frame_size(640), 640);
    }

    #[test]
    fn validate_rejects_bad_specs() {
        assert!(AudioFormatSpec::new(0, 1).validate().is_err());
        assert!(AudioFormatSpec::new(8000, 0).validate().is_err());
        assert!(AudioFormatSpec::with_bits_per_sample(8000, 1, 12).validate().is_err());
        assert!(AudioFormatSpec::new(u32::MAX, 2).validate().is_err());
        assert!(AudioFormatSpec::new(44100, 2).validate().is_ok());
    }
}

//! Canonical 44-byte RIFF/WAVE header codec.
//!
//! Builds the header for a known data length and parses it back. Pure: no
//! I/O, every failure is `CaptureError::InvalidFormat`.

use crate::models::error::CaptureError;
use crate::models::format::AudioFormatSpec;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Bytes of the RIFF chunk that follow the size field, excluding audio data.
const RIFF_OVERHEAD: u32 = 36;

const PCM_FMT_CHUNK_SIZE: u32 = 16;
const PCM_FORMAT_TAG: u16 = 1;

/// Stream parameters recovered from a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    pub data_length: u32,
    pub format: AudioFormatSpec,
}

/// Generate a 44-byte WAV RIFF header for `data_length` bytes of PCM.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_length
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bits_per_sample / 8
/// [32-33]  block_align = channels * bits_per_sample / 8
/// [34-35]  bits_per_sample
/// [36-39]  "data"
/// [40-43]  data_length
/// ```
pub fn build_header(data_length: u64, format: &AudioFormatSpec) -> Result<[u8; WAV_HEADER_SIZE], CaptureError> {
    format.validate()?;

    let data_size = u32::try_from(data_length)
        .ok()
        .filter(|size| size.checked_add(RIFF_OVERHEAD).is_some())
        .ok_or_else(|| {
            CaptureError::InvalidFormat(format!("audio data length {} does not fit a RIFF chunk", data_length))
        })?;
    let chunk_size = RIFF_OVERHEAD + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&PCM_FMT_CHUNK_SIZE.to_le_bytes());
    header[20..22].copy_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels().to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate().to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample().to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    Ok(header)
}

/// Parse a canonical header produced by [`build_header`].
///
/// Rejects anything that is not plain PCM with a 16-byte fmt chunk, or whose
/// stored byte rate / block align disagree with the recomputed values.
pub fn parse_header(bytes: &[u8]) -> Result<ParsedHeader, CaptureError> {
    if bytes.len() < WAV_HEADER_SIZE {
        return Err(CaptureError::InvalidFormat(format!(
            "header needs {} bytes, got {}",
            WAV_HEADER_SIZE,
            bytes.len()
        )));
    }

    expect_tag(bytes, 0, b"RIFF")?;
    expect_tag(bytes, 8, b"WAVE")?;
    expect_tag(bytes, 12, b"fmt ")?;
    expect_tag(bytes, 36, b"data")?;

    if read_u32(bytes, 16) != PCM_FMT_CHUNK_SIZE {
        return Err(CaptureError::InvalidFormat("fmt chunk is not 16 bytes".into()));
    }
    if read_u16(bytes, 20) != PCM_FORMAT_TAG {
        return Err(CaptureError::InvalidFormat("format tag is not PCM".into()));
    }

    let format = AudioFormatSpec::with_bits_per_sample(read_u32(bytes, 24), read_u16(bytes, 22), read_u16(bytes, 34));
    format.validate()?;

    if read_u32(bytes, 28) != format.byte_rate() {
        return Err(CaptureError::InvalidFormat("byte rate does not match format".into()));
    }
    if read_u16(bytes, 32) != format.block_align() {
        return Err(CaptureError::InvalidFormat("block align does not match format".into()));
    }

    let data_length = read_u32(bytes, 40);
    if read_u32(bytes, 4) != data_length.wrapping_add(RIFF_OVERHEAD) {
        return Err(CaptureError::InvalidFormat("RIFF chunk size does not match data length".into()));
    }

    Ok(ParsedHeader { data_length, format })
}

fn expect_tag(bytes: &[u8], offset: usize, tag: &[u8; 4]) -> Result<(), CaptureError> {
    if &bytes[offset..offset + 4] != tag {
        return Err(CaptureError::InvalidFormat(format!(
            "expected {:?} at offset {}",
            String::from_utf8_lossy(tag),
            offset
        )));
    }
    Ok(())
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

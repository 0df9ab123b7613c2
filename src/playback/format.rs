//! Chunk wire format
//!
//! Each chunk is base64-encoded interleaved signed 16-bit little-endian PCM.
//! Duration is never transmitted; it is derived from the byte length.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::PlaybackConfig;
use crate::error::{OstinatoError, Result};

/// Bytes per sample for signed 16-bit PCM
pub const BYTES_PER_SAMPLE: usize = 2;

/// Fixed PCM layout of the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.sample_rate, config.channels)
    }

    /// Bytes in one interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Duration in milliseconds of `byte_len` bytes of PCM
    ///
    /// `samples = byte_len / (channels * bytes_per_sample)`,
    /// `duration_ms = samples / sample_rate * 1000`.
    pub fn duration_ms(&self, byte_len: usize) -> f64 {
        let samples = byte_len as f64 / self.frame_bytes() as f64;
        samples / self.sample_rate as f64 * 1000.0
    }

    pub fn duration(&self, byte_len: usize) -> Duration {
        Duration::from_secs_f64(self.duration_ms(byte_len) / 1000.0)
    }

    /// Bytes needed for `duration_ms` of audio
    pub fn bytes_for_ms(&self, duration_ms: u64) -> usize {
        let frames = self.sample_rate as u64 * duration_ms / 1000;
        frames as usize * self.frame_bytes()
    }
}

/// One encoded chunk as delivered by the backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireChunk(String);

impl fmt::Debug for WireChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireChunk({} chars)", self.0.len())
    }
}

impl From<String> for WireChunk {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl WireChunk {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode raw little-endian PCM bytes
    pub fn from_pcm_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    /// Encode interleaved samples
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::from_pcm_bytes(&bytes)
    }

    /// Decode into PCM with a derived duration
    ///
    /// # Errors
    /// * `ChunkDecode` - payload is not valid base64
    /// * `EmptyChunk` - payload decodes to zero bytes
    /// * `MisalignedChunk` - byte length is not a whole number of frames
    pub fn decode(&self, format: PcmFormat) -> Result<PcmChunk> {
        let bytes = STANDARD
            .decode(self.0.trim())
            .map_err(|e| OstinatoError::decode("invalid base64 payload", e))?;

        if bytes.is_empty() {
            return Err(OstinatoError::EmptyChunk);
        }
        if bytes.len() % format.frame_bytes() != 0 {
            return Err(OstinatoError::MisalignedChunk {
                len: bytes.len(),
                frame_bytes: format.frame_bytes(),
            });
        }

        Ok(PcmChunk {
            duration_ms: format.duration_ms(bytes.len()),
            duration: format.duration(bytes.len()),
            format,
            bytes,
        })
    }
}

/// Decoded chunk ready to hand to an output
#[derive(Debug, Clone)]
pub struct PcmChunk {
    pub format: PcmFormat,
    pub bytes: Vec<u8>,
    pub duration: Duration,
    pub duration_ms: f64,
}

impl PcmChunk {
    pub fn frames(&self) -> usize {
        self.bytes.len() / self.format.frame_bytes()
    }

    /// Interleaved samples
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
    }
}

/// Generate an interleaved sine tone, identical on every channel
///
/// Used by the mock backend to produce audible synthetic chunks.
pub fn synth_tone(format: PcmFormat, frequency: f32, duration_ms: u64, amplitude: f32) -> Vec<i16> {
    let frames = (format.sample_rate as u64 * duration_ms / 1000) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / format.sample_rate as f32;
    let scale = amplitude.clamp(0.0, 1.0) * i16::MAX as f32;

    let mut samples = Vec::with_capacity(frames * format.channels as usize);
    for i in 0..frames {
        let value = ((angular_freq * i as f32).sin() * scale) as i16;
        for _ in 0..format.channels {
            samples.push(value);
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    #[test]
    fn test_one_second_chunk_duration() {
        let format = PcmFormat::default();
        assert_relative_eq!(format.duration_ms(192_000), 1000.0);
        assert_eq!(format.duration(192_000), Duration::from_secs(1));
    }

    #[test_case(48_000, 2, 96_000, 500.0 ; "half second stereo")]
    #[test_case(48_000, 1, 96_000, 1000.0 ; "one second mono")]
    #[test_case(44_100, 2, 176_400, 1000.0 ; "cd rate")]
    fn test_duration_derivation(rate: u32, channels: u16, bytes: usize, expected_ms: f64) {
        let format = PcmFormat::new(rate, channels);
        assert_relative_eq!(format.duration_ms(bytes), expected_ms, epsilon = 1e-9);
    }

    #[test]
    fn test_decode_derives_duration() {
        let format = PcmFormat::default();
        let chunk = WireChunk::from_pcm_bytes(&vec![0u8; 192_000]);
        let pcm = chunk.decode(format).unwrap();
        assert_relative_eq!(pcm.duration_ms, 1000.0);
        assert_eq!(pcm.frames(), 48_000);
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = WireChunk::new("not base64 !!").decode(PcmFormat::default()).unwrap_err();
        assert_eq!(err.error_code(), "CHUNK_DECODE");
    }

    #[test]
    fn test_decode_rejects_empty() {
        let err = WireChunk::new("").decode(PcmFormat::default()).unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_CHUNK");
    }

    #[test]
    fn test_decode_rejects_partial_frame() {
        let err = WireChunk::from_pcm_bytes(&[0u8; 6])
            .decode(PcmFormat::default())
            .unwrap_err();
        assert!(matches!(
            err,
            OstinatoError::MisalignedChunk {
                len: 6,
                frame_bytes: 4
            }
        ));
    }

    #[test]
    fn test_samples_survive_encoding() {
        let chunk = WireChunk::from_samples(&[1, -1, i16::MAX, i16::MIN]);
        let pcm = chunk.decode(PcmFormat::default()).unwrap();
        let samples: Vec<i16> = pcm.samples().collect();
        assert_eq!(samples, vec![1, -1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_synth_tone_length() {
        let format = PcmFormat::default();
        let samples = synth_tone(format, 440.0, 250, 0.5);
        assert_eq!(samples.len(), 12_000 * 2);
        assert_eq!(samples.len() * BYTES_PER_SAMPLE, format.bytes_for_ms(250));
    }
}

//! PCM16 codec used between local audio hardware and the streaming endpoint.
//!
//! Both directions scale by a fixed full-scale divisor of 32768. No dithering
//! or resampling is done here; frames captured at a rate other than
//! [`CAPTURE_SAMPLE_RATE`] are sent as-is.

use crate::error::TutorError;
use base64::Engine;
use bytes::Bytes;

/// Sample rate the streaming endpoint expects for microphone input.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of synthesized speech returned by the streaming endpoint.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;
pub const PCM16_FULL_SCALE: f32 = 32768.0;
/// Samples per outbound chunk.
pub const OUTBOUND_CHUNK_SAMPLES: usize = 4096;

/// Quantizes f32 samples to little-endian signed 16-bit PCM.
pub fn encode_f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let v = (sample * PCM16_FULL_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Encodes f32 samples as base64 PCM16, the envelope used on JSON transports.
pub fn encode_f32_to_base64_i16(samples: &[f32]) -> String {
    encode_pcm16_to_base64(&encode_f32_to_pcm16(samples))
}

pub fn encode_pcm16_to_base64(pcm16: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm16)
}

/// Interprets little-endian PCM16 bytes as f32 samples in `[-1.0, 1.0)`.
pub fn decode_pcm16_to_f32(pcm16: &[u8]) -> Result<Vec<f32>, TutorError> {
    if pcm16.is_empty() {
        return Err(TutorError::DecodeFailure("empty audio chunk".to_string()));
    }
    if pcm16.len() % 2 != 0 {
        return Err(TutorError::DecodeFailure(format!(
            "odd PCM16 byte length {}",
            pcm16.len()
        )));
    }
    Ok(pcm16
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / PCM16_FULL_SCALE)
        .collect())
}

/// Decodes a base64 PCM16 fragment received from the streaming endpoint.
pub fn decode_base64_i16_to_f32(fragment: &str) -> Result<Vec<f32>, TutorError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(fragment)
        .map_err(|e| TutorError::DecodeFailure(format!("invalid base64: {e}")))?;
    decode_pcm16_to_f32(&bytes)
}

/// Interprets raw little-endian f32 frames, as produced by a browser capture node.
pub fn decode_f32_le_frames(raw: &[u8]) -> Result<Vec<f32>, TutorError> {
    if raw.len() % 4 != 0 {
        return Err(TutorError::DecodeFailure(format!(
            "f32 frame length {} is not a multiple of 4",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Regroups arbitrarily sized capture frames into fixed-size PCM16 chunks.
#[derive(Debug)]
pub struct OutboundChunker {
    chunk_samples: usize,
    pending: Vec<f32>,
}

impl OutboundChunker {
    pub fn new(chunk_samples: usize) -> Self {
        let chunk_samples = chunk_samples.max(1);
        Self {
            chunk_samples,
            pending: Vec::with_capacity(chunk_samples),
        }
    }

    /// Buffers `frame` and returns every chunk that is now complete, in order.
    pub fn push(&mut self, frame: &[f32]) -> Vec<Bytes> {
        self.pending.extend_from_slice(frame);
        let complete = self.pending.len() / self.chunk_samples * self.chunk_samples;
        if complete == 0 {
            return Vec::new();
        }
        let ready: Vec<f32> = self.pending.drain(..complete).collect();
        ready
            .chunks(self.chunk_samples)
            .map(|chunk| Bytes::from(encode_f32_to_pcm16(chunk)))
            .collect()
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}

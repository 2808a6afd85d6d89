//! Decoded sample data (§3) and the binary sample container codec (§6).
//!
//! Grounded on the teacher's `nodes::sampler::SampleData`, but shared via
//! `Arc` rather than `Rc<RefCell<_>>`: samples are immutable once decoded
//! and are read concurrently by every voice that triggers them, including
//! from the audio thread.

use std::sync::Arc;

use hound::WavReader;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

const MAGIC: &[u8; 4] = b"TSMP";
const VERSION: u8 = 1;

/// How a sampler oscillator plays back a `SampleData` buffer between
/// `start_point` and `end_point`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopType {
    Oneshot,
    Forward,
    Pingpong,
}

impl Default for LoopType {
    fn default() -> Self {
        LoopType::Oneshot
    }
}

/// Decoded PCM frames, channel-major: `channels[c][frame]`.
#[derive(Debug)]
pub struct SampleData {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl SampleData {
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Linearly interpolated sample at a fractional frame position on one
    /// channel, zero outside the buffer.
    #[inline]
    pub fn sample_at(&self, channel: usize, position: f32) -> f32 {
        let buf = match self.channels.get(channel) {
            Some(b) => b,
            None => return 0.0,
        };
        if buf.is_empty() {
            return 0.0;
        }
        let i0 = position.floor() as isize;
        let frac = position - i0 as f32;
        let n = buf.len() as isize;
        let s0 = if i0 >= 0 && i0 < n { buf[i0 as usize] } else { 0.0 };
        let i1 = i0 + 1;
        let s1 = if i1 >= 0 && i1 < n { buf[i1 as usize] } else { 0.0 };
        s0 + (s1 - s0) * frac
    }

    /// Decodes a WAV file's bytes into channel-major `f32` frames.
    pub fn decode_wav(bytes: &[u8]) -> EngineResult<Arc<SampleData>> {
        let cursor = std::io::Cursor::new(bytes);
        let mut reader =
            WavReader::new(cursor).map_err(|e| EngineError::DecodeError(e.to_string()))?;
        let spec = reader.spec();
        let channel_count = spec.channels as usize;
        let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count.max(1)];

        match spec.sample_format {
            hound::SampleFormat::Float => {
                for (i, sample) in reader.samples::<f32>().enumerate() {
                    let sample = sample.map_err(|e| EngineError::DecodeError(e.to_string()))?;
                    channels[i % channel_count].push(sample);
                }
            }
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                for (i, sample) in reader.samples::<i32>().enumerate() {
                    let sample = sample.map_err(|e| EngineError::DecodeError(e.to_string()))?;
                    channels[i % channel_count].push(sample as f32 / max);
                }
            }
        }

        Ok(Arc::new(SampleData {
            channels,
            sample_rate: spec.sample_rate,
        }))
    }

    /// Encodes this buffer into the `TSMP` binary container (§6).
    pub fn encode_container(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 1 + 1 + 4 + 4 + self.total_samples() * 4);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(self.channel_count() as u8);
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&(self.frame_count() as u32).to_le_bytes());
        for channel in &self.channels {
            for sample in channel {
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
        out
    }

    /// Decodes the `TSMP` binary container (§6) back into a `SampleData`.
    pub fn decode_container(bytes: &[u8]) -> EngineResult<Arc<SampleData>> {
        if bytes.len() < 14 || &bytes[0..4] != MAGIC {
            return Err(EngineError::DecodeError("bad TSMP magic".into()));
        }
        let version = bytes[4];
        if version != VERSION {
            return Err(EngineError::DecodeError(format!(
                "unsupported TSMP version {version}"
            )));
        }
        let channel_count = bytes[5] as usize;
        let sample_rate = u32::from_le_bytes(bytes[6..10].try_into().unwrap());
        let frame_count = u32::from_le_bytes(bytes[10..14].try_into().unwrap()) as usize;

        let expected_len = 14 + channel_count * frame_count * 4;
        if bytes.len() < expected_len {
            return Err(EngineError::DecodeError("truncated TSMP payload".into()));
        }

        let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
        let mut offset = 14;
        for channel in channels.iter_mut() {
            for _ in 0..frame_count {
                let value = f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
                channel.push(value);
                offset += 4;
            }
        }

        Ok(Arc::new(SampleData {
            channels,
            sample_rate,
        }))
    }

    fn total_samples(&self) -> usize {
        self.channel_count() * self.frame_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffer() -> SampleData {
        SampleData {
            channels: vec![vec![0.0, 0.25, -0.5, 1.0], vec![0.0, -0.25, 0.5, -1.0]],
            sample_rate: 44_100,
        }
    }

    #[test]
    fn container_round_trips() {
        let original = sample_buffer();
        let bytes = original.encode_container();
        let decoded = SampleData::decode_container(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, original.sample_rate);
        assert_eq!(decoded.channel_count(), original.channel_count());
        for (a, b) in decoded.channels.iter().zip(original.channels.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"NOPE0000000000".to_vec();
        assert!(SampleData::decode_container(&bytes).is_err());
    }

    #[test]
    fn sample_at_interpolates_linearly() {
        let data = sample_buffer();
        let v = data.sample_at(0, 0.5);
        assert!((v - 0.125).abs() < 1e-6);
    }
}

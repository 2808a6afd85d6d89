//! Oscillator configuration (§3): the voice's sound source.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::sample::{LoopType, SampleData};

/// Sampler-specific playback parameters. Not serialized directly: `sample`
/// is looked up by instrument id from the engine's sample store and
/// attached after project load (§4.5), since the project JSON carries
/// sample bytes separately from the instrument tree (§6).
#[derive(Debug, Clone)]
pub struct SamplerParams {
    pub sample: Arc<SampleData>,
    pub start_point: f32,
    pub end_point: f32,
    pub gain: f32,
    pub loop_type: LoopType,
}

/// `detune` is common to every variant, in cents (typically ±1200).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OscillatorKind {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
    /// Sampler parameters are carried out-of-band (see [`SamplerParams`]);
    /// the JSON variant only records the playback window and loop mode.
    Sampler {
        #[serde(rename = "startPoint", default = "default_start_point")]
        start_point: f32,
        #[serde(rename = "endPoint", default = "default_end_point")]
        end_point: f32,
        #[serde(default = "default_gain")]
        gain: f32,
        #[serde(rename = "loopType", default)]
        loop_type: LoopType,
    },
}

fn default_start_point() -> f32 {
    0.0
}
fn default_end_point() -> f32 {
    1.0
}
fn default_gain() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OscillatorConfig {
    #[serde(flatten)]
    pub kind: OscillatorKind,
    #[serde(default)]
    pub detune: f32,
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self {
            kind: OscillatorKind::Sine,
            detune: 0.0,
        }
    }
}

impl OscillatorConfig {
    pub fn normalize(&mut self) {
        self.detune = self.detune.clamp(-1200.0, 1200.0);
        if let OscillatorKind::Sampler {
            start_point,
            end_point,
            gain,
            ..
        } = &mut self.kind
        {
            *start_point = start_point.clamp(0.0, 1.0);
            *end_point = end_point.clamp(*start_point, 1.0);
            *gain = gain.clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_detune() {
        let mut osc = OscillatorConfig {
            kind: OscillatorKind::Sawtooth,
            detune: 5000.0,
        };
        osc.normalize();
        assert_eq!(osc.detune, 1200.0);
    }

    #[test]
    fn normalize_orders_sampler_window() {
        let mut osc = OscillatorConfig {
            kind: OscillatorKind::Sampler {
                start_point: 0.8,
                end_point: 0.2,
                gain: 2.0,
                loop_type: LoopType::Forward,
            },
            detune: 0.0,
        };
        osc.normalize();
        if let OscillatorKind::Sampler {
            start_point,
            end_point,
            gain,
            ..
        } = osc.kind
        {
            assert_eq!(start_point, 0.8);
            assert_eq!(end_point, 0.8);
            assert_eq!(gain, 1.0);
        } else {
            panic!("expected sampler variant");
        }
    }
}

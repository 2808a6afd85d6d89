//! Instrument configuration (§3): the per-instrument voice pool's recipe.

use serde::{Deserialize, Serialize};

use crate::model::envelope::EnvelopeConfig;
use crate::model::filter::FilterConfig;
use crate::model::lfo::{BaseTarget, Lfo2Target, LfoConfig};
use crate::model::oscillator::OscillatorConfig;

fn default_volume() -> f32 {
    1.0
}
fn default_max_voices() -> u8 {
    16
}

/// `id` is a 2-hex-digit string (`"00"`..`"FE"`); `maxVoices` is 1..32.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: String,
    pub name: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub pan: f32,
    #[serde(default = "default_max_voices")]
    pub max_voices: u8,
    pub oscillator: OscillatorConfig,
    pub filter: FilterConfig,
    pub envelope: EnvelopeConfig,
    #[serde(default)]
    pub lfo1: LfoConfig<BaseTarget>,
    #[serde(default)]
    pub lfo2: LfoConfig<Lfo2Target>,
}

impl Instrument {
    /// Clamps every sub-structure to its declared range (§3), matching the
    /// forward-compatible defaulting the project loader (§4.5) relies on.
    pub fn normalize(&mut self) {
        self.volume = self.volume.clamp(0.0, 1.0);
        self.pan = self.pan.clamp(-1.0, 1.0);
        self.max_voices = self.max_voices.clamp(1, 32);
        self.oscillator.normalize();
        self.filter.normalize();
        self.envelope.normalize();
        self.lfo1.normalize();
        self.lfo2.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::oscillator::OscillatorKind;

    fn sample_instrument() -> Instrument {
        Instrument {
            id: "00".into(),
            name: "Lead".into(),
            volume: 1.0,
            pan: 0.0,
            max_voices: 16,
            oscillator: OscillatorConfig {
                kind: OscillatorKind::Sine,
                detune: 0.0,
            },
            filter: FilterConfig::default(),
            envelope: EnvelopeConfig::default(),
            lfo1: LfoConfig::default(),
            lfo2: LfoConfig::default(),
        }
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{
            "id": "01",
            "name": "Bass",
            "oscillator": {"type": "sawtooth", "detune": 0.0},
            "filter": {"type": "lowpass", "frequency": 1000.0, "resonance": 0.7, "envelopeAmount": 0.0, "envelope": {"attack": 0.01, "decay": 0.1, "sustain": 0.5, "release": 0.2}},
            "envelope": {"attack": 0.01, "decay": 0.1, "sustain": 0.8, "release": 0.3}
        }"#;
        let instrument: Instrument = serde_json::from_str(json).unwrap();
        assert_eq!(instrument.volume, 1.0);
        assert_eq!(instrument.pan, 0.0);
        assert_eq!(instrument.max_voices, 16);
    }

    #[test]
    fn normalize_clamps_max_voices() {
        let mut instrument = sample_instrument();
        instrument.max_voices = 200;
        instrument.normalize();
        assert_eq!(instrument.max_voices, 32);
    }
}

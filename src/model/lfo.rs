//! LFO configuration (§3) and the modulation-target tables (§4.3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoWaveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Targets reachable by LFO1: the base parameter set, shared with LFO2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseTarget {
    OscillatorDetune,
    FilterFrequency,
    FilterResonance,
    Volume,
    Pan,
}

/// Targets reachable by LFO2: the base set plus cross-modulation onto LFO1.
/// LFO1 can never target an LFO (§3 invariant): cross-modulation is a
/// one-way edge from LFO2 into LFO1, so cycles are impossible by
/// construction rather than by a runtime check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lfo2Target {
    Base(BaseTarget),
    Lfo1Frequency,
    Lfo1Depth,
}

impl Serialize for Lfo2Target {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Lfo2Target::Base(b) => b.serialize(serializer),
            Lfo2Target::Lfo1Frequency => serializer.serialize_str("lfo1_frequency"),
            Lfo2Target::Lfo1Depth => serializer.serialize_str("lfo1_depth"),
        }
    }
}

impl<'de> Deserialize<'de> for Lfo2Target {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "lfo1_frequency" => Lfo2Target::Lfo1Frequency,
            "lfo1_depth" => Lfo2Target::Lfo1Depth,
            "oscillator_detune" => Lfo2Target::Base(BaseTarget::OscillatorDetune),
            "filter_frequency" => Lfo2Target::Base(BaseTarget::FilterFrequency),
            "filter_resonance" => Lfo2Target::Base(BaseTarget::FilterResonance),
            "volume" => Lfo2Target::Base(BaseTarget::Volume),
            "pan" => Lfo2Target::Base(BaseTarget::Pan),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unknown LFO2 target {other:?}"
                )))
            }
        })
    }
}

/// `waveform`, `frequency` (0.1..20 Hz), `depth` (0..1), and `target`,
/// generic over the target set (LFO1 uses [`BaseTarget`], LFO2 uses
/// [`Lfo2Target`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LfoConfig<T> {
    pub waveform: LfoWaveform,
    pub frequency: f32,
    pub depth: f32,
    pub target: T,
}

impl<T> LfoConfig<T> {
    pub fn normalize(&mut self) {
        self.frequency = self.frequency.clamp(0.1, 20.0);
        self.depth = self.depth.clamp(0.0, 1.0);
    }
}

impl Default for LfoConfig<BaseTarget> {
    fn default() -> Self {
        Self {
            waveform: LfoWaveform::Sine,
            frequency: 1.0,
            depth: 0.0,
            target: BaseTarget::FilterFrequency,
        }
    }
}

impl Default for LfoConfig<Lfo2Target> {
    fn default() -> Self {
        Self {
            waveform: LfoWaveform::Sine,
            frequency: 1.0,
            depth: 0.0,
            target: Lfo2Target::Base(BaseTarget::FilterFrequency),
        }
    }
}

/// Modulation range for a base target (§4.3): the depth-gain multiplier
/// applied on top of `depth` when routing an LFO onto this parameter.
pub fn modulation_range(target: BaseTarget) -> f32 {
    match target {
        BaseTarget::OscillatorDetune => 1200.0,
        BaseTarget::FilterFrequency => 10_000.0,
        BaseTarget::FilterResonance => 10.0,
        BaseTarget::Volume => 1.0,
        BaseTarget::Pan => 1.0,
    }
}

/// Modulation range for an LFO2 cross-modulation target (§4.3).
pub fn cross_modulation_range(target: Lfo2Target) -> f32 {
    match target {
        Lfo2Target::Base(b) => modulation_range(b),
        Lfo2Target::Lfo1Frequency => 20.0,
        Lfo2Target::Lfo1Depth => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulation_ranges_match_table() {
        assert_eq!(modulation_range(BaseTarget::OscillatorDetune), 1200.0);
        assert_eq!(modulation_range(BaseTarget::FilterFrequency), 10_000.0);
        assert_eq!(modulation_range(BaseTarget::FilterResonance), 10.0);
        assert_eq!(modulation_range(BaseTarget::Volume), 1.0);
        assert_eq!(modulation_range(BaseTarget::Pan), 1.0);
        assert_eq!(cross_modulation_range(Lfo2Target::Lfo1Frequency), 20.0);
        assert_eq!(cross_modulation_range(Lfo2Target::Lfo1Depth), 1.0);
    }

    #[test]
    fn lfo2_target_round_trips_through_json() {
        let target = Lfo2Target::Lfo1Depth;
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, "\"lfo1_depth\"");
        let back: Lfo2Target = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);
    }
}

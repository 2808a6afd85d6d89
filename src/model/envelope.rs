//! Envelope configuration (§3): a discriminated variant over AD/AR/ADSR.

use serde::{Deserialize, Serialize};

/// Which stages an envelope runs. AD skips sustain/release (decays straight
/// to zero); AR skips decay/sustain (holds at 1.0 until note-off, then
/// releases); ADSR runs all four stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Ad,
    Ar,
    Adsr,
}

/// `attack`/`decay`/`sustain`/`release`, all in seconds except `sustain`
/// (a 0..1 unit level). Fields not used by `kind` are retained but ignored
/// by the DSP engine, so round-tripping a project through the editor never
/// loses a value the user might switch back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeConfig {
    #[serde(default = "default_kind")]
    pub kind: EnvelopeKind,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

fn default_kind() -> EnvelopeKind {
    EnvelopeKind::Adsr
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            kind: EnvelopeKind::Adsr,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.5,
            release: 0.3,
        }
    }
}

impl EnvelopeConfig {
    /// Clamps all time fields to be non-negative and sustain to 0..1.
    pub fn normalize(&mut self) {
        self.attack = self.attack.max(0.0);
        self.decay = self.decay.max(0.0);
        self.sustain = self.sustain.clamp(0.0, 1.0);
        self.release = self.release.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_negative_times() {
        let mut e = EnvelopeConfig {
            kind: EnvelopeKind::Ad,
            attack: -1.0,
            decay: -2.0,
            sustain: 2.0,
            release: -3.0,
        };
        e.normalize();
        assert_eq!(e.attack, 0.0);
        assert_eq!(e.decay, 0.0);
        assert_eq!(e.sustain, 1.0);
        assert_eq!(e.release, 0.0);
    }
}

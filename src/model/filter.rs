//! Voice filter configuration (§3).

use serde::{Deserialize, Serialize};

use crate::model::envelope::EnvelopeConfig;

/// The two filter responses the voice's biquad supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// `type`, `frequency` (20..20000 Hz), `resonance` (Q, 0.1..20),
/// `envelopeAmount` (-1..1), nested amplitude-style `envelope` driving
/// cutoff modulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub frequency: f32,
    pub resonance: f32,
    pub envelope_amount: f32,
    pub envelope: EnvelopeConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            frequency: 2000.0,
            resonance: 0.7,
            envelope_amount: 0.0,
            envelope: EnvelopeConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Clamps fields to the ranges declared in §3.
    pub fn normalize(&mut self) {
        self.frequency = self.frequency.clamp(20.0, 20_000.0);
        self.resonance = self.resonance.clamp(0.1, 20.0);
        self.envelope_amount = self.envelope_amount.clamp(-1.0, 1.0);
        self.envelope.normalize();
    }

    /// Cutoff modulation range in Hz for filter-envelope modulation (§4.2).
    pub fn envelope_mod_range_hz(&self) -> f32 {
        self.envelope_amount * 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_out_of_range_fields() {
        let mut f = FilterConfig {
            kind: FilterKind::Highpass,
            frequency: 99_999.0,
            resonance: 0.0,
            envelope_amount: 5.0,
            envelope: EnvelopeConfig::default(),
        };
        f.normalize();
        assert_eq!(f.frequency, 20_000.0);
        assert_eq!(f.resonance, 0.1);
        assert_eq!(f.envelope_amount, 1.0);
    }
}

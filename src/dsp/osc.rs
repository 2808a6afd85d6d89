//! Band-limited oscillator and noise source (§4.2 "Source", §4.3 "Noise
//! source"), grounded on the teacher's phase-accumulator oscillators
//! (`nodes::analog_oscillator`) but simplified to PolyBLEP-corrected
//! sine/square/saw/triangle, since the voice graph needs one band-limited
//! tonal source rather than a wavetable bank per waveform.

use rand::Rng;

use crate::model::oscillator::OscillatorKind;

/// PolyBLEP residual subtracted at a discontinuity to band-limit the
/// naive waveform; `t` is the phase distance from the discontinuity in
/// cycles, `dt` is the phase increment per sample.
fn poly_blep(t: f32, dt: f32) -> f32 {
    if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

/// A tonal phase-accumulator oscillator with PolyBLEP-corrected
/// square/sawtooth/triangle output.
#[derive(Debug, Clone, Copy)]
pub struct TonalOscillator {
    phase: f32,
    sample_rate: f32,
}

impl TonalOscillator {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
    }

    /// Advances the oscillator by one sample at `frequency` Hz and returns
    /// the waveform sample in roughly -1..1.
    pub fn next_sample(&mut self, kind: &OscillatorKind, frequency: f32) -> f32 {
        let dt = (frequency / self.sample_rate).clamp(0.0, 0.5);
        let phase = self.phase;

        let value = match kind {
            OscillatorKind::Sine => (2.0 * std::f32::consts::PI * phase).sin(),
            OscillatorKind::Square => {
                let naive = if phase < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(phase, dt) - poly_blep((phase + 0.5).fract(), dt)
            }
            OscillatorKind::Sawtooth => {
                let naive = 2.0 * phase - 1.0;
                naive - poly_blep(phase, dt)
            }
            OscillatorKind::Triangle => {
                // Leaky-integrated PolyBLEP square, the standard trick for
                // a band-limited triangle from a band-limited square.
                let naive = if phase < 0.5 { 1.0 } else { -1.0 };
                let square = naive + poly_blep(phase, dt) - poly_blep((phase + 0.5).fract(), dt);
                4.0 * dt * square + (1.0 - 4.0 * dt) * (2.0 * (2.0 * phase - 1.0).abs() - 1.0)
            }
            OscillatorKind::Noise | OscillatorKind::Sampler { .. } => 0.0,
        };

        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }
}

/// A 2-second looping buffer of uniformly-distributed noise in [-1, 1]
/// (§4.3): generated once and read with a free-running index so every
/// noise voice shares the same statistics without per-sample RNG cost.
#[derive(Debug, Clone)]
pub struct NoiseBuffer {
    samples: Vec<f32>,
}

impl NoiseBuffer {
    pub fn new(sample_rate: f32) -> Self {
        let len = (sample_rate * 2.0) as usize;
        let mut rng = rand::rng();
        let samples = (0..len.max(1)).map(|_| rng.random_range(-1.0..=1.0)).collect();
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn at(&self, index: usize) -> f32 {
        self.samples[index % self.samples.len()]
    }
}

/// Free-running index into a [`NoiseBuffer`], advanced one sample per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseCursor {
    index: usize,
}

impl NoiseCursor {
    pub fn next_sample(&mut self, buffer: &NoiseBuffer) -> f32 {
        if buffer.is_empty() {
            return 0.0;
        }
        let value = buffer.at(self.index);
        self.index += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_stays_in_unit_range() {
        let mut osc = TonalOscillator::new(44_100.0);
        for _ in 0..4410 {
            let v = osc.next_sample(&OscillatorKind::Sine, 440.0);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn square_blep_stays_bounded() {
        let mut osc = TonalOscillator::new(44_100.0);
        for _ in 0..4410 {
            let v = osc.next_sample(&OscillatorKind::Square, 440.0);
            assert!(v.abs() < 1.2);
        }
    }

    #[test]
    fn noise_buffer_is_two_seconds_long() {
        let buffer = NoiseBuffer::new(44_100.0);
        assert_eq!(buffer.len(), 88_200);
        for &s in &buffer.samples {
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn noise_cursor_wraps_around() {
        let buffer = NoiseBuffer::new(100.0);
        let mut cursor = NoiseCursor::default();
        let mut last = 0.0;
        for _ in 0..buffer.len() {
            last = cursor.next_sample(&buffer);
        }
        let wrapped = cursor.next_sample(&buffer);
        assert_eq!(wrapped, buffer.at(0));
        let _ = last;
    }
}

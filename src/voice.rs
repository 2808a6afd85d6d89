//! A single voice: the smallest independently-controllable unit of
//! polyphony (§4.2). Fixed audio graph: source → filter → filter-envelope
//! modulation → amplitude gain → pan.

use crate::dsp::biquad::Biquad;
use crate::dsp::envelope::{Envelope, EnvelopePhase};
use crate::dsp::osc::{NoiseBuffer, NoiseCursor, TonalOscillator};
use crate::model::envelope::EnvelopeConfig;
use crate::model::filter::FilterConfig;
use crate::model::instrument::Instrument;
use crate::model::oscillator::{OscillatorKind, SamplerParams};
use crate::note::midi_to_hz;

/// Which oscillator *category* a voice's source belongs to, used by
/// `update_instrument` (§4.3) to decide whether an oscillator category
/// change requires tearing down the voice pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCategory {
    Tonal,
    Noise,
    Sampler,
}

impl SourceCategory {
    pub fn of(kind: &OscillatorKind) -> Self {
        match kind {
            OscillatorKind::Noise => SourceCategory::Noise,
            OscillatorKind::Sampler { .. } => SourceCategory::Sampler,
            _ => SourceCategory::Tonal,
        }
    }
}

/// Sampler playhead position and direction, advanced per block (§4.3).
#[derive(Debug, Clone, Copy)]
struct SamplerPlayhead {
    position: f32,
    forward: bool,
}

/// The source half of a voice's graph: oscillator state plus whichever
/// extra state its category needs.
#[derive(Debug, Clone)]
enum Source {
    Tonal(TonalOscillator),
    Noise(NoiseCursor),
    Sampler(SamplerPlayhead),
}

/// One voice in an instrument's pool. `generation` is bumped every time
/// the voice is retriggered or stolen; a cleanup step scheduled against a
/// stale generation is a no-op rather than disturbing a newer note
/// (§9 "generation counter", replacing a cleanup-handle design).
#[derive(Debug, Clone)]
pub struct Voice {
    pub midi_note: Option<u8>,
    pub start_time: f64,
    pub generation: u64,
    pub category: SourceCategory,

    source: Source,
    filter: Biquad,
    filter_env: Envelope,
    amp_env: Envelope,
    pan: f32,
    velocity: f32,
    detune_mod: f32,
    freq_override: Option<f32>,
    sample_rate: f32,
}

impl Voice {
    pub fn new(sample_rate: f32, instrument: &Instrument) -> Self {
        let category = SourceCategory::of(&instrument.oscillator.kind);
        let source = match category {
            SourceCategory::Tonal => Source::Tonal(TonalOscillator::new(sample_rate)),
            SourceCategory::Noise => Source::Noise(NoiseCursor::default()),
            SourceCategory::Sampler => Source::Sampler(SamplerPlayhead {
                position: 0.0,
                forward: true,
            }),
        };

        Voice {
            midi_note: None,
            start_time: 0.0,
            generation: 0,
            category,
            source,
            filter: Biquad::new(
                instrument.filter.kind,
                sample_rate,
                instrument.filter.frequency,
                instrument.filter.resonance,
            ),
            filter_env: Envelope::new(sample_rate, instrument.filter.envelope.clone()),
            amp_env: Envelope::new(sample_rate, instrument.envelope.clone()),
            pan: instrument.pan,
            velocity: 0.0,
            detune_mod: 0.0,
            freq_override: None,
            sample_rate,
        }
    }

    pub fn is_active(&self) -> bool {
        self.midi_note.is_some()
    }

    /// True while the amplitude envelope is still in its attack phase
    /// (§4.2 voice-stealing policy).
    pub fn is_in_attack(&self) -> bool {
        self.amp_env.phase() == EnvelopePhase::Attack
    }

    pub fn note_on(
        &mut self,
        midi_note: u8,
        velocity: f32,
        time: f64,
        instrument: &Instrument,
        generation: u64,
    ) {
        self.midi_note = Some(midi_note);
        self.start_time = time;
        self.generation = generation;
        self.velocity = velocity;
        self.pan = instrument.pan;

        match &mut self.source {
            Source::Tonal(osc) => osc.reset_phase(),
            Source::Noise(cursor) => *cursor = NoiseCursor::default(),
            Source::Sampler(playhead) => {
                *playhead = SamplerPlayhead {
                    position: 0.0,
                    forward: true,
                };
            }
        }

        self.filter_env.reset();
        self.filter_env.trigger_on();
        self.amp_env.reset();
        self.amp_env.trigger_on();
    }

    pub fn note_off(&mut self) {
        self.filter_env.trigger_off();
        self.amp_env.trigger_off();
    }

    /// Immediately silences the voice without a release ramp (voice
    /// stealing, §4.2).
    pub fn steal(&mut self) {
        self.midi_note = None;
        self.filter_env.reset();
        self.amp_env.reset();
    }

    pub fn has_finished_release(&self) -> bool {
        self.midi_note.is_some() && self.amp_env.is_idle()
    }

    pub fn retire_if_released(&mut self) {
        if self.has_finished_release() {
            self.midi_note = None;
        }
    }

    /// Applies this sample's LFO-routed modulation (§4.3 step 4) before
    /// the source/filter are advanced. `frequency_hz`/`q` are absolute
    /// overrides (base value already folded in by the caller); `pan`
    /// overrides the instrument's static pan for this sample only.
    ///
    /// The frequency override is only recorded here, not applied to the
    /// filter directly: `next_sample` still has to layer the filter
    /// envelope's own cutoff offset on top of whichever base frequency
    /// wins this sample, so the actual `set_frequency` call happens there.
    pub fn apply_lfo_modulation(
        &mut self,
        detune_cents: f32,
        frequency_hz: Option<f32>,
        q: Option<f32>,
        pan: Option<f32>,
    ) {
        self.detune_mod = detune_cents;
        self.freq_override = frequency_hz;
        if let Some(q) = q {
            self.filter.set_q(q);
        }
        if let Some(pan) = pan {
            self.pan = pan;
        }
    }

    pub fn update_filter_static(&mut self, filter: &FilterConfig) {
        self.filter.set_kind(filter.kind);
        self.filter.set_frequency(filter.frequency);
        self.filter.set_q(filter.resonance);
        self.filter_env.update_config(filter.envelope.clone());
    }

    pub fn update_amp_envelope(&mut self, envelope: &EnvelopeConfig) {
        self.amp_env.update_config(envelope.clone());
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan;
    }

    /// Renders one sample: returns (left, right).
    #[allow(clippy::too_many_arguments)]
    pub fn next_sample(
        &mut self,
        oscillator: &OscillatorKind,
        detune: f32,
        base_frequency: f32,
        filter: &FilterConfig,
        instrument_volume: f32,
        noise_buffer: &NoiseBuffer,
        sampler: Option<&SamplerParams>,
    ) -> (f32, f32) {
        let Some(midi_note) = self.midi_note else {
            return (0.0, 0.0);
        };

        let total_detune = detune + self.detune_mod;
        let frequency = base_frequency * 2f32.powf(total_detune / 1200.0);

        let raw = match (&mut self.source, oscillator) {
            (Source::Tonal(osc), kind) => osc.next_sample(kind, frequency),
            (Source::Noise(cursor), _) => cursor.next_sample(noise_buffer),
            (Source::Sampler(playhead), _) => {
                render_sampler(playhead, sampler, midi_note, self.sample_rate)
            }
        };

        let filter_env_value = self.filter_env.next_sample();
        let base_cutoff = self.freq_override.unwrap_or(filter.frequency);
        let cutoff = base_cutoff + filter_env_value * filter.envelope_mod_range_hz();
        self.filter.set_frequency(cutoff);

        let filtered = self.filter.process(raw);

        let amp = self.amp_env.next_sample() * self.velocity * instrument_volume;
        let mono = filtered * amp;

        let pan = self.pan.clamp(-1.0, 1.0);
        let left_gain = (1.0 - pan).min(1.0);
        let right_gain = (1.0 + pan).min(1.0);
        (mono * left_gain, mono * right_gain)
    }
}

/// Plays back a sample buffer at `midiToHz(note) / 440` rate (§4.3),
/// looping within `[startPoint, endPoint]` per `loopType`.
fn render_sampler(
    playhead: &mut SamplerPlayhead,
    sampler: Option<&SamplerParams>,
    midi_note: u8,
    sample_rate: f32,
) -> f32 {
    let Some(sampler) = sampler else {
        // §7 MissingSample: no buffer has been loaded into this sampler
        // instrument yet. Fall back to a sine tone at the requested pitch
        // instead of silence; `position` doubles as a [0, 1) phase here.
        let freq = midi_to_hz(midi_note as f32);
        playhead.position += freq / sample_rate;
        playhead.position -= playhead.position.floor();
        return (std::f32::consts::TAU * playhead.position).sin();
    };
    let data = &sampler.sample;
    let frame_count = data.frame_count();
    if frame_count == 0 {
        return 0.0;
    }

    let start = sampler.start_point * frame_count as f32;
    let end = (sampler.end_point * frame_count as f32).max(start + 1.0);
    let rate = midi_to_hz(midi_note as f32) / 440.0;

    let value = (0..data.channel_count())
        .map(|c| data.sample_at(c, playhead.position))
        .sum::<f32>()
        / data.channel_count().max(1) as f32
        * sampler.gain;

    use crate::sample::LoopType;
    match sampler.loop_type {
        LoopType::Oneshot => {
            playhead.position += rate;
            if playhead.position >= end {
                playhead.position = end;
            }
        }
        LoopType::Forward => {
            playhead.position += rate;
            if playhead.position >= end {
                playhead.position = start + (playhead.position - end);
            }
        }
        LoopType::Pingpong => {
            if playhead.forward {
                playhead.position += rate;
                if playhead.position >= end {
                    playhead.position = end;
                    playhead.forward = false;
                }
            } else {
                playhead.position -= rate;
                if playhead.position <= start {
                    playhead.position = start;
                    playhead.forward = true;
                }
            }
        }
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::envelope::EnvelopeConfig;
    use crate::model::filter::FilterConfig;
    use crate::model::instrument::Instrument;
    use crate::model::lfo::{BaseTarget, Lfo2Target, LfoConfig};
    use crate::model::oscillator::OscillatorConfig;

    fn instrument() -> Instrument {
        Instrument {
            id: "00".into(),
            name: "Test".into(),
            volume: 1.0,
            pan: 0.0,
            max_voices: 8,
            oscillator: OscillatorConfig {
                kind: OscillatorKind::Sine,
                detune: 0.0,
            },
            filter: FilterConfig::default(),
            envelope: EnvelopeConfig {
                attack: 0.001,
                decay: 0.01,
                sustain: 0.8,
                release: 0.01,
                kind: crate::model::envelope::EnvelopeKind::Adsr,
            },
            lfo1: LfoConfig::<BaseTarget>::default(),
            lfo2: LfoConfig::<Lfo2Target>::default(),
        }
    }

    #[test]
    fn inactive_voice_renders_silence() {
        let instrument = instrument();
        let mut voice = Voice::new(44_100.0, &instrument);
        let noise = NoiseBuffer::new(44_100.0);
        let (l, r) = voice.next_sample(
            &instrument.oscillator.kind,
            0.0,
            440.0,
            &instrument.filter,
            1.0,
            &noise,
            None,
        );
        assert_eq!((l, r), (0.0, 0.0));
    }

    #[test]
    fn note_on_then_steal_silences_immediately() {
        let instrument = instrument();
        let mut voice = Voice::new(44_100.0, &instrument);
        voice.note_on(60, 1.0, 0.0, &instrument, 1);
        assert!(voice.is_active());
        voice.steal();
        assert!(!voice.is_active());
    }

    #[test]
    fn voice_produces_audible_output_during_attack() {
        let instrument = instrument();
        let mut voice = Voice::new(44_100.0, &instrument);
        voice.note_on(69, 1.0, 0.0, &instrument, 1);
        let noise = NoiseBuffer::new(44_100.0);
        let mut peak = 0.0f32;
        for _ in 0..256 {
            let (l, _r) = voice.next_sample(
                &instrument.oscillator.kind,
                0.0,
                440.0,
                &instrument.filter,
                1.0,
                &noise,
                None,
            );
            peak = peak.max(l.abs());
        }
        assert!(peak > 0.0);
    }

    #[test]
    fn lfo_frequency_override_reaches_the_filter() {
        // Regression: apply_lfo_modulation used to set the biquad's cutoff
        // directly, only for next_sample to immediately stomp it with
        // filter.frequency (the static config value) plus the envelope
        // offset. With envelope_amount at its default of 0, the override
        // should be the filter's actual cutoff after one sample.
        let instrument = instrument();
        let mut voice = Voice::new(44_100.0, &instrument);
        voice.note_on(69, 1.0, 0.0, &instrument, 1);
        let noise = NoiseBuffer::new(44_100.0);

        voice.apply_lfo_modulation(0.0, Some(500.0), None, None);
        voice.next_sample(
            &instrument.oscillator.kind,
            0.0,
            440.0,
            &instrument.filter,
            1.0,
            &noise,
            None,
        );

        assert!((voice.filter.frequency() - 500.0).abs() < 1.0);
    }
}

//! One instrument's voice pool, LFO routing, and parameter update policy
//! (§4.3).

use tracing::{debug, warn};

use crate::dsp::lfo::Lfo;
use crate::dsp::osc::NoiseBuffer;
use crate::error::{EngineError, EngineResult};
use crate::model::instrument::Instrument;
use crate::model::lfo::{modulation_range, BaseTarget};
use crate::model::oscillator::SamplerParams;
use crate::note::midi_to_hz;
use crate::voice::{SourceCategory, Voice};

/// A note command queued by the scheduler against a future sample time,
/// applied by `render_block` only once playback reaches that time (§4.4
/// "lookahead scheduler" — dispatch ahead of time must not mean audible
/// ahead of time).
#[derive(Debug, Clone, Copy)]
enum PendingCommand {
    NoteOn {
        midi_note: u8,
        velocity: f32,
        time: f64,
    },
    NoteOff {
        midi_note: u8,
        time: f64,
    },
}

impl PendingCommand {
    fn time(&self) -> f64 {
        match self {
            PendingCommand::NoteOn { time, .. } => *time,
            PendingCommand::NoteOff { time, .. } => *time,
        }
    }
}

/// Owns one instrument's voice pool and both LFOs. Public operations
/// mirror §4.3: `note_on`, `note_off`, `release_all`, `update_instrument`.
pub struct InstrumentNode {
    sample_rate: f32,
    instrument: Instrument,
    voices: Vec<Voice>,
    next_generation: u64,
    lfo1: Lfo,
    lfo2: Lfo,
    noise: NoiseBuffer,
    sample: Option<SamplerParams>,
    pending: Vec<PendingCommand>,
}

impl InstrumentNode {
    pub fn new(sample_rate: f32, instrument: Instrument) -> Self {
        let voices = (0..instrument.max_voices as usize)
            .map(|_| Voice::new(sample_rate, &instrument))
            .collect();
        let lfo1 = Lfo::new(sample_rate, instrument.lfo1.waveform, instrument.lfo1.frequency);
        let lfo2 = Lfo::new(sample_rate, instrument.lfo2.waveform, instrument.lfo2.frequency);
        Self {
            sample_rate,
            instrument,
            voices,
            next_generation: 1,
            lfo1,
            lfo2,
            noise: NoiseBuffer::new(sample_rate),
            sample: None,
            pending: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn set_sample_buffer(&mut self, sample: Option<SamplerParams>) {
        self.sample = sample;
    }

    pub fn sample_buffer(&self) -> Option<&SamplerParams> {
        self.sample.as_ref()
    }

    /// Allocation policy (§4.2): reuse a voice already playing this note,
    /// else an inactive voice, else steal the oldest voice past attack
    /// (or the globally oldest if every voice is still attacking).
    fn allocate(&mut self, midi_note: u8) -> usize {
        if let Some(i) = self
            .voices
            .iter()
            .position(|v| v.midi_note == Some(midi_note))
        {
            return i;
        }
        if let Some(i) = self.voices.iter().position(|v| !v.is_active()) {
            return i;
        }

        let stealable = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_in_attack())
            .min_by(|(_, a), (_, b)| a.start_time.total_cmp(&b.start_time));

        let (index, _) = stealable.unwrap_or_else(|| {
            self.voices
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.start_time.total_cmp(&b.start_time))
                .expect("voice pool is never empty")
        });
        debug!(voice = index, note = midi_note, "stealing voice");
        self.voices[index].steal();
        index
    }

    /// Queues a note-on against `time`; it only takes effect once
    /// `render_block` reaches that sample (§4.4), never at the moment the
    /// scheduler dispatches it.
    pub fn note_on(&mut self, midi_note: u8, velocity: f32, time: f64) {
        self.pending.push(PendingCommand::NoteOn {
            midi_note,
            velocity,
            time,
        });
    }

    /// Queues a note-off against `time`, same timing contract as `note_on`.
    pub fn note_off(&mut self, midi_note: u8, time: f64) {
        self.pending.push(PendingCommand::NoteOff { midi_note, time });
    }

    pub fn release_all(&mut self) {
        self.pending.clear();
        for voice in &mut self.voices {
            if voice.is_active() {
                voice.note_off();
            }
        }
    }

    fn apply_note_on(&mut self, midi_note: u8, velocity: f32, time: f64) {
        if self.sample.is_none() && matches!(self.instrument.oscillator.kind, crate::model::oscillator::OscillatorKind::Sampler { .. })
        {
            let err = EngineError::MissingSample(self.instrument.id.clone());
            warn!(%err, "falling back to a sine tone");
        }
        // §4.2 retrigger epsilon: a voice already sounding this note must
        // restart strictly after its previous stop, not at the same time.
        let is_retrigger = self.voices.iter().any(|v| v.midi_note == Some(midi_note));
        let start_time = if is_retrigger { time + 0.001 } else { time };

        let index = self.allocate(midi_note);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.voices[index].note_on(midi_note, velocity, start_time, &self.instrument, generation);
    }

    fn apply_note_off(&mut self, midi_note: u8) {
        if let Some(voice) = self
            .voices
            .iter_mut()
            .find(|v| v.midi_note == Some(midi_note))
        {
            voice.note_off();
        }
    }

    /// Applies every queued command whose scheduled time has arrived by
    /// `frame_time`, in the order they were queued (preserving the
    /// note-on-before-note-off pass ordering from the row dispatch, §4.4).
    fn apply_due_commands(&mut self, frame_time: f64) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].time() <= frame_time {
                match self.pending.remove(i) {
                    PendingCommand::NoteOn {
                        midi_note,
                        velocity,
                        time,
                    } => self.apply_note_on(midi_note, velocity, time),
                    PendingCommand::NoteOff { midi_note, .. } => self.apply_note_off(midi_note),
                }
            } else {
                i += 1;
            }
        }
    }

    /// Renders one block of `frames` stereo samples starting at absolute
    /// time `block_start_time` (seconds), advancing the voice pool and
    /// both LFOs. Queued note commands are applied at the exact frame
    /// their scheduled time falls in, not before.
    pub fn render_block(
        &mut self,
        out_left: &mut [f32],
        out_right: &mut [f32],
        block_start_time: f64,
        sample_rate: f64,
    ) {
        use crate::model::lfo::Lfo2Target;

        let frames = out_left.len();
        debug_assert_eq!(frames, out_right.len());

        for frame in 0..frames {
            let frame_time = block_start_time + frame as f64 / sample_rate;
            self.apply_due_commands(frame_time);

            // LFO2 runs first so a cross-modulation target lands in the
            // same sample as LFO1's own output (§4.3 "LFO routing").
            let lfo2_raw = self.lfo2.next_sample();

            if let Lfo2Target::Lfo1Frequency = self.instrument.lfo2.target {
                let range = crate::model::lfo::cross_modulation_range(self.instrument.lfo2.target);
                let delta = lfo2_raw * self.instrument.lfo2.depth * range;
                self.lfo1
                    .set_frequency(self.instrument.lfo1.frequency + delta);
            }

            let lfo1_raw = self.lfo1.next_sample();
            let lfo1_depth = if let Lfo2Target::Lfo1Depth = self.instrument.lfo2.target {
                let range = crate::model::lfo::cross_modulation_range(self.instrument.lfo2.target);
                self.instrument.lfo1.depth + lfo2_raw * self.instrument.lfo2.depth * range
            } else {
                self.instrument.lfo1.depth
            };
            let lfo1_value = lfo1_raw * lfo1_depth * modulation_range(self.instrument.lfo1.target);

            let lfo2_value = match self.instrument.lfo2.target {
                Lfo2Target::Base(b) => lfo2_raw * self.instrument.lfo2.depth * modulation_range(b),
                _ => 0.0,
            };

            let mut detune = 0.0f32;
            let mut freq_delta = 0.0f32;
            let mut q_delta = 0.0f32;
            let mut volume_delta = 0.0f32;
            let mut pan_delta = 0.0f32;
            let mut pan_modulated = false;

            accumulate_target(
                self.instrument.lfo1.target,
                lfo1_value,
                &mut detune,
                &mut freq_delta,
                &mut q_delta,
                &mut volume_delta,
                &mut pan_delta,
                &mut pan_modulated,
            );
            if let Lfo2Target::Base(b) = self.instrument.lfo2.target {
                accumulate_target(
                    b,
                    lfo2_value,
                    &mut detune,
                    &mut freq_delta,
                    &mut q_delta,
                    &mut volume_delta,
                    &mut pan_delta,
                    &mut pan_modulated,
                );
            }

            let freq_override = if freq_delta != 0.0 {
                Some(self.instrument.filter.frequency + freq_delta)
            } else {
                None
            };
            let q_override = if q_delta != 0.0 {
                Some(self.instrument.filter.resonance + q_delta)
            } else {
                None
            };
            let pan_override = if pan_modulated {
                Some(self.instrument.pan + pan_delta)
            } else {
                None
            };
            let volume = self.instrument.volume + volume_delta;

            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for voice in &mut self.voices {
                if !voice.is_active() {
                    continue;
                }
                voice.apply_lfo_modulation(detune, freq_override, q_override, pan_override);

                let base_freq = voice
                    .midi_note
                    .map(|n| midi_to_hz(n as f32))
                    .unwrap_or(440.0);

                let (l, r) = voice.next_sample(
                    &self.instrument.oscillator.kind,
                    self.instrument.oscillator.detune,
                    base_freq,
                    &self.instrument.filter,
                    volume,
                    &self.noise,
                    self.sample.as_ref(),
                );
                left += l;
                right += r;
                voice.retire_if_released();
            }

            out_left[frame] = left;
            out_right[frame] = right;
        }
    }

    /// §4.3 `update_instrument`: replaces stored instrument state without
    /// an audible discontinuity, re-creating the voice pool only when
    /// `maxVoices` or the oscillator category changed.
    pub fn update_instrument(&mut self, new: Instrument) {
        let old_category = SourceCategory::of(&self.instrument.oscillator.kind);
        let new_category = SourceCategory::of(&new.oscillator.kind);

        if new.max_voices != self.instrument.max_voices || old_category != new_category {
            self.voices = (0..new.max_voices as usize)
                .map(|_| Voice::new(self.sample_rate, &new))
                .collect();
        } else {
            let volume_ratio = if self.instrument.volume.abs() > f32::EPSILON {
                new.volume / self.instrument.volume
            } else {
                1.0
            };
            for voice in &mut self.voices {
                voice.update_filter_static(&new.filter);
                voice.set_pan(new.pan);
                voice.update_amp_envelope(&new.envelope);
                let _ = volume_ratio; // scaling happens via instrument.volume read each block
            }
        }

        if new.lfo1.waveform != self.instrument.lfo1.waveform
            || (new.lfo1.frequency - self.instrument.lfo1.frequency).abs() > f32::EPSILON
        {
            self.lfo1.set_waveform(new.lfo1.waveform);
            self.lfo1.set_frequency(new.lfo1.frequency);
        }
        if new.lfo2.waveform != self.instrument.lfo2.waveform
            || (new.lfo2.frequency - self.instrument.lfo2.frequency).abs() > f32::EPSILON
        {
            self.lfo2.set_waveform(new.lfo2.waveform);
            self.lfo2.set_frequency(new.lfo2.frequency);
        }

        self.instrument = new;
    }
}

/// Routes one LFO's modulation value onto the voice-graph parameter its
/// base target names (§4.3 step 4), accumulating into the per-sample
/// totals so LFO1 and LFO2 can both target the same parameter.
#[allow(clippy::too_many_arguments)]
fn accumulate_target(
    target: BaseTarget,
    value: f32,
    detune: &mut f32,
    freq_delta: &mut f32,
    q_delta: &mut f32,
    volume_delta: &mut f32,
    pan_delta: &mut f32,
    pan_modulated: &mut bool,
) {
    match target {
        BaseTarget::OscillatorDetune => *detune += value,
        BaseTarget::FilterFrequency => *freq_delta += value,
        BaseTarget::FilterResonance => *q_delta += value,
        BaseTarget::Volume => *volume_delta += value,
        BaseTarget::Pan => {
            *pan_delta += value;
            *pan_modulated = true;
        }
    }
}

/// A registry mapping instrument ids to their nodes, with the
/// unknown-instrument diagnostic policy from §7.
#[derive(Default)]
pub struct InstrumentRegistry {
    nodes: std::collections::HashMap<String, InstrumentNode>,
}

impl InstrumentRegistry {
    pub fn get(&self, id: &str) -> EngineResult<&InstrumentNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| EngineError::UnknownInstrument(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut InstrumentNode> {
        self.nodes.get_mut(id)
    }

    pub fn dispatch_note_on(&mut self, id: &str, midi_note: u8, velocity: f32, time: f64) {
        match self.nodes.get_mut(id) {
            Some(node) => node.note_on(midi_note, velocity, time),
            None => warn!(instrument = id, "note_on for unknown instrument"),
        }
    }

    pub fn dispatch_note_off(&mut self, id: &str, midi_note: u8, time: f64) {
        match self.nodes.get_mut(id) {
            Some(node) => node.note_off(midi_note, time),
            None => warn!(instrument = id, "note_off for unknown instrument"),
        }
    }

    pub fn update_instrument(&mut self, sample_rate: f32, instrument: Instrument) {
        match self.nodes.get_mut(&instrument.id) {
            Some(node) => node.update_instrument(instrument),
            None => {
                let id = instrument.id.clone();
                self.nodes
                    .insert(id, InstrumentNode::new(sample_rate, instrument));
            }
        }
    }

    pub fn release_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.release_all();
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InstrumentNode> {
        self.nodes.values_mut()
    }
}

//! The playback scheduler (§4.4): a lookahead timer that walks pattern
//! rows at the current tempo and dispatches notes in two passes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::events::{Event, EventBus};
use crate::instrument_node::InstrumentRegistry;
use crate::model::instrument::Instrument;
use crate::model::pattern::Pattern;
use crate::model::song::Song;
use crate::note::{self, EFFECT_PARAM_AUTOMATION, NOTE_OFF};
use crate::param::ParameterId;

/// Lookahead constants (§4.4).
pub const SCHEDULE_AHEAD_SECONDS: f64 = 0.100;
pub const LOOKAHEAD_SECONDS: f64 = 0.025;

/// What the scheduler is currently walking: a single pattern, or a song's
/// sequence of layered pattern groups. Mutually exclusive (§3 "Song").
enum PlaySource {
    Pattern(Pattern),
    Song { song: Song, patterns: HashMap<String, Pattern> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastNote {
    instrument: String,
    tone: u8,
}

/// Drives pattern/song playback against an [`InstrumentRegistry`] (§4.4).
pub struct PlaybackScheduler {
    clock: Arc<dyn Clock>,
    source: Option<PlaySource>,
    current_row: u16,
    current_sequence: usize,
    next_note_time: f64,
    tempo: f32,
    is_playing: bool,
    last_note_per_track: HashMap<u8, LastNote>,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            source: None,
            current_row: 0,
            current_sequence: 0,
            next_note_time: 0.0,
            tempo: 120.0,
            is_playing: false,
            last_note_per_track: HashMap::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// The clock's current reading, used by the render path to timestamp
    /// the block it's about to produce (§4.4).
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn current_row(&self) -> u16 {
        self.current_row
    }

    fn row_duration(&self) -> f64 {
        60.0 / self.tempo as f64 / 4.0
    }

    /// `setPattern` (§4.4): preserves `currentRow`/`nextNoteTime` if
    /// already playing (mid-pattern edits don't jump).
    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.tempo = pattern.tempo;
        if !self.is_playing {
            self.current_row = 0;
            self.next_note_time = self.clock.now();
        }
        self.source = Some(PlaySource::Pattern(pattern));
    }

    /// `updatePattern` (§4.4, §9 open question): replaces notes/tempo from
    /// the next scheduled row forward; rows already dispatched inside the
    /// lookahead window are not retracted.
    pub fn update_pattern(&mut self, pattern: Pattern) {
        if let Some(PlaySource::Pattern(existing)) = &mut self.source {
            if existing.id == pattern.id {
                self.tempo = pattern.tempo;
                *existing = pattern;
                return;
            }
        }
        if let Some(PlaySource::Song { patterns, .. }) = &mut self.source {
            patterns.insert(pattern.id.clone(), pattern);
        }
    }

    pub fn set_song(&mut self, song: Song, patterns: Vec<Pattern>) {
        let patterns = patterns.into_iter().map(|p| (p.id.clone(), p)).collect();
        if !self.is_playing {
            self.current_row = 0;
            self.current_sequence = 0;
            self.next_note_time = self.clock.now();
        }
        self.source = Some(PlaySource::Song { song, patterns });
        self.sync_tempo_to_sequence();
    }

    fn sync_tempo_to_sequence(&mut self) {
        if let Some(PlaySource::Song { song, patterns }) = &self.source {
            if let Some(first_id) = song.sequence(self.current_sequence).and_then(|s| s.first()) {
                if let Some(pattern) = patterns.get(first_id) {
                    self.tempo = pattern.tempo;
                }
            }
        }
    }

    pub fn seek(&mut self, row: u16) {
        self.current_row = row;
    }

    pub fn play(&mut self, bus: &mut EventBus) {
        self.is_playing = true;
        self.next_note_time = self.clock.now();
        bus.emit(Event::PlayStart);
    }

    /// §4.4 "Stop": cancels the wake-up timer conceptually (there is none
    /// to cancel explicitly in a poll-driven tick loop), releases every
    /// instrument's voices, clears `lastNotePerTrack`, emits `playStop`.
    pub fn stop(&mut self, registry: &mut InstrumentRegistry, bus: &mut EventBus) {
        self.is_playing = false;
        registry.release_all();
        self.last_note_per_track.clear();
        bus.emit(Event::PlayStop);
    }

    /// §4.4 tick loop: while playing and `nextNoteTime < now +
    /// scheduleAheadTime`, dispatch a row and advance.
    pub fn tick(&mut self, registry: &mut InstrumentRegistry, bus: &mut EventBus) {
        if !self.is_playing {
            return;
        }
        let horizon = self.clock.now() + SCHEDULE_AHEAD_SECONDS;
        while self.next_note_time < horizon {
            self.dispatch_current_row(registry, bus);
            self.advance_row();
        }
    }

    /// Clones rather than borrows so callers can mutate other fields of
    /// `self` (e.g. `lastNotePerTrack`) while still holding these patterns.
    fn current_sequence_patterns(&self) -> Vec<Pattern> {
        match &self.source {
            Some(PlaySource::Song { song, patterns }) => song
                .sequence(self.current_sequence)
                .map(|seq| seq.iter().filter_map(|id| patterns.get(id).cloned()).collect())
                .unwrap_or_default(),
            Some(PlaySource::Pattern(p)) => vec![p.clone()],
            None => vec![],
        }
    }

    fn dispatch_current_row(&mut self, registry: &mut InstrumentRegistry, bus: &mut EventBus) {
        let row = self.current_row;
        let time = self.next_note_time;

        let patterns = self.current_sequence_patterns();
        if patterns.is_empty() {
            bus.emit(Event::RowChange { row });
            return;
        }

        // Pass 1: note-ons.
        let mut note_ons: Vec<(u8, crate::note::NoteFields)> = Vec::new();
        for pattern in &patterns {
            for track in 0..pattern.tracks {
                if let Some(note) = pattern.note_at(row, track) {
                    if note.tone != NOTE_OFF && note.effect != EFFECT_PARAM_AUTOMATION {
                        note_ons.push((track, *note));
                    }
                }
            }
        }
        for (track, note) in &note_ons {
            if note.velocity > 0 {
                let instrument_id = format!("{:02X}", note.instrument);
                registry.dispatch_note_on(&instrument_id, note.tone, note.velocity as f32 / 255.0, time);
                self.last_note_per_track.insert(
                    *track,
                    LastNote {
                        instrument: instrument_id,
                        tone: note.tone,
                    },
                );
            }
        }

        // Pass 2: note-offs and parameter automation.
        for pattern in &patterns {
            for track in 0..pattern.tracks {
                let Some(note) = pattern.note_at(row, track) else {
                    continue;
                };
                let instrument_id = format!("{:02X}", note.instrument);

                if note.tone == NOTE_OFF {
                    match self.last_note_per_track.get(&track) {
                        Some(last) if last.instrument == instrument_id => {
                            // §4.4 S2: note-off lands one millisecond after
                            // the row's own time, strictly after any note-on
                            // dispatched in this same row's pass 1.
                            registry.dispatch_note_off(&instrument_id, last.tone, time + 0.001);
                            self.last_note_per_track.remove(&track);
                        }
                        _ => {
                            debug!(track, "note-off with no matching last note; ignored");
                        }
                    }
                } else if note.effect == EFFECT_PARAM_AUTOMATION {
                    self.apply_parameter_automation(registry, &instrument_id, note.effect_value);
                }
            }
        }

        bus.emit(Event::RowChange { row });
    }

    fn apply_parameter_automation(
        &self,
        registry: &mut InstrumentRegistry,
        instrument_id: &str,
        effect_value: u16,
    ) {
        let param_byte = ((effect_value >> 8) & 0xFF) as u8;
        let raw = (effect_value & 0xFF) as u8;
        let Some(param_id) = ParameterId::from_byte(param_byte) else {
            debug!(param_byte, "unknown parameter automation id; ignored");
            return;
        };

        let Some(node) = registry.get_mut(instrument_id) else {
            return;
        };
        let mut instrument = node.instrument().clone();
        apply_parameter(&mut instrument, param_id, raw);
        let sample_rate = 44_100.0; // instrument node already exists; rate is only used on (re)creation.
        registry.update_instrument(sample_rate, instrument);
    }

    fn advance_row(&mut self) {
        let duration = self.row_duration();
        self.next_note_time += duration;

        match &self.source {
            Some(PlaySource::Pattern(p)) => {
                self.current_row = (self.current_row + 1) % p.rows.max(1);
            }
            Some(PlaySource::Song { .. }) => {
                let max_rows = self
                    .current_sequence_patterns()
                    .iter()
                    .map(|p| p.rows)
                    .max()
                    .unwrap_or(16);
                self.current_row += 1;
                if self.current_row >= max_rows {
                    self.current_row = 0;
                    if let Some(PlaySource::Song { song, .. }) = &self.source {
                        self.current_sequence = (self.current_sequence + 1) % song.len().max(1);
                    }
                    self.sync_tempo_to_sequence();
                }
            }
            None => {}
        }
    }
}

/// Mutates a copy of the instrument per the parameter table (§6), applied
/// by [`PlaybackScheduler::apply_parameter_automation`].
fn apply_parameter(instrument: &mut Instrument, param_id: ParameterId, raw: u8) {
    use crate::model::lfo::{BaseTarget, Lfo2Target};
    use crate::param::{exponential_frequency, index, lfo_frequency, linear};
    use ParameterId::*;

    match param_id {
        OscillatorType => {
            // index selects {sine, square, saw, triangle, noise, sampler};
            // detune is a sibling field and untouched here. Switching into
            // Sampler keeps an existing sampler window if one's already set,
            // otherwise starts from the default playback window.
            instrument.oscillator.kind =
                oscillator_kind_from_index(index(raw, 6), &instrument.oscillator.kind);
        }
        OscillatorDetune => instrument.oscillator.detune = linear(raw, -1200.0, 1200.0),
        FilterType => {
            instrument.filter.kind = if raw == 0 {
                crate::model::filter::FilterKind::Lowpass
            } else {
                crate::model::filter::FilterKind::Highpass
            };
        }
        FilterFrequency => instrument.filter.frequency = exponential_frequency(raw),
        FilterResonance => instrument.filter.resonance = linear(raw, 0.1, 20.0),
        FilterEnvelopeAmount => instrument.filter.envelope_amount = linear(raw, 0.0, 1.0),
        FilterEnvelopeType => {
            instrument.filter.envelope.kind = kind_from_index(index(raw, 3));
        }
        FilterEnvelopeAttack => instrument.filter.envelope.attack = linear(raw, 0.0, 10.0),
        FilterEnvelopeDecay => instrument.filter.envelope.decay = linear(raw, 0.0, 10.0),
        FilterEnvelopeSustain => instrument.filter.envelope.sustain = linear(raw, 0.0, 1.0),
        FilterEnvelopeRelease => instrument.filter.envelope.release = linear(raw, 0.0, 10.0),
        EnvelopeType => instrument.envelope.kind = kind_from_index(index(raw, 3)),
        EnvelopeAttack => instrument.envelope.attack = linear(raw, 0.0, 10.0),
        EnvelopeDecay => instrument.envelope.decay = linear(raw, 0.0, 10.0),
        EnvelopeSustain => instrument.envelope.sustain = linear(raw, 0.0, 1.0),
        EnvelopeRelease => instrument.envelope.release = linear(raw, 0.0, 10.0),
        Volume => instrument.volume = linear(raw, 0.0, 1.0),
        Pan => instrument.pan = linear(raw, -1.0, 1.0),
        MaxVoices => instrument.max_voices = linear(raw, 1.0, 32.0).floor() as u8,
        Lfo1Waveform => instrument.lfo1.waveform = waveform_from_index(index(raw, 4)),
        Lfo1Frequency => instrument.lfo1.frequency = lfo_frequency(raw),
        Lfo1Depth => instrument.lfo1.depth = raw as f32 / 255.0,
        Lfo1Target => {
            instrument.lfo1.target = base_target_from_index(index(raw, 5));
        }
        Lfo2Waveform => instrument.lfo2.waveform = waveform_from_index(index(raw, 4)),
        Lfo2Frequency => instrument.lfo2.frequency = lfo_frequency(raw),
        Lfo2Depth => instrument.lfo2.depth = raw as f32 / 255.0,
        Lfo2Target => {
            instrument.lfo2.target = match index(raw, 7) {
                5 => Lfo2Target::Lfo1Frequency,
                6 => Lfo2Target::Lfo1Depth,
                i => Lfo2Target::Base(base_target_from_index(i)),
            };
        }
    }
}

fn kind_from_index(i: usize) -> crate::model::envelope::EnvelopeKind {
    use crate::model::envelope::EnvelopeKind::*;
    match i {
        0 => Ad,
        1 => Ar,
        _ => Adsr,
    }
}

fn waveform_from_index(i: usize) -> crate::model::lfo::LfoWaveform {
    use crate::model::lfo::LfoWaveform::*;
    match i {
        0 => Sine,
        1 => Square,
        2 => Sawtooth,
        _ => Triangle,
    }
}

fn base_target_from_index(i: usize) -> crate::model::lfo::BaseTarget {
    use crate::model::lfo::BaseTarget::*;
    match i {
        0 => OscillatorDetune,
        1 => FilterFrequency,
        2 => FilterResonance,
        3 => Volume,
        _ => Pan,
    }
}

fn oscillator_kind_from_index(
    i: usize,
    current: &crate::model::oscillator::OscillatorKind,
) -> crate::model::oscillator::OscillatorKind {
    use crate::model::oscillator::OscillatorKind::*;
    match i {
        0 => Sine,
        1 => Square,
        2 => Sawtooth,
        3 => Triangle,
        4 => Noise,
        _ => {
            if let Sampler { start_point, end_point, gain, loop_type } = current {
                Sampler {
                    start_point: *start_point,
                    end_point: *end_point,
                    gain: *gain,
                    loop_type: *loop_type,
                }
            } else {
                Sampler {
                    start_point: 0.0,
                    end_point: 1.0,
                    gain: 1.0,
                    loop_type: crate::sample::LoopType::default(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::envelope::{EnvelopeConfig, EnvelopeKind};
    use crate::model::filter::FilterConfig;
    use crate::model::instrument::Instrument;
    use crate::model::lfo::{BaseTarget, Lfo2Target, LfoConfig};
    use crate::model::oscillator::{OscillatorConfig, OscillatorKind};
    use std::collections::HashMap as Map;

    fn instrument(id: &str) -> Instrument {
        Instrument {
            id: id.to_string(),
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
                kind: EnvelopeKind::Adsr,
                attack: 0.01,
                decay: 0.1,
                sustain: 0.5,
                release: 0.1,
            },
            lfo1: LfoConfig::<BaseTarget>::default(),
            lfo2: LfoConfig::<Lfo2Target>::default(),
        }
    }

    fn pattern_with_notes(notes: Vec<(u16, u8, &str)>) -> Pattern {
        let mut map = Map::new();
        for (row, track, raw) in notes {
            let parsed = crate::note::parse_note(raw).unwrap();
            map.insert(crate::model::pattern::CellPosition { row, track }, parsed);
        }
        Pattern {
            id: "p0".into(),
            name: "Test".into(),
            tempo: 120.0,
            tracks: 2,
            rows: 4,
            notes: map,
        }
    }

    #[test]
    fn s2_note_off_sentinel_dispatches_expected_pair() {
        let clock = Arc::new(crate::clock::VirtualClock::new());
        let mut scheduler = PlaybackScheduler::new(clock.clone());
        let mut registry = InstrumentRegistry::default();
        registry.update_instrument(44_100.0, instrument("00"));
        let mut bus = EventBus::default();

        let pattern = pattern_with_notes(vec![
            (0, 0, "00FFC4000000"),
            (2, 0, "00FF=00000000"),
        ]);
        scheduler.set_pattern(pattern);
        scheduler.play(&mut bus);

        // Drive the tick loop far enough to dispatch all 4 rows.
        for _ in 0..4 {
            scheduler.tick(&mut registry, &mut bus);
            clock.advance(SCHEDULE_AHEAD_SECONDS);
        }

        // Flush the queued commands through a render pass long enough to
        // cover every dispatched row and let the release ramp finish.
        let node = registry.get_mut("00").unwrap();
        let mut left = vec![0.0; 44_100];
        let mut right = vec![0.0; 44_100];
        node.render_block(&mut left, &mut right, 0.0, 44_100.0);

        // The note-on retriggered then released; no stray voices remain.
        assert_eq!(node.active_voice_count(), 0);
    }

    #[test]
    fn s4_parameter_automation_updates_pan() {
        let clock = Arc::new(crate::clock::VirtualClock::new());
        let mut scheduler = PlaybackScheduler::new(clock.clone());
        let mut registry = InstrumentRegistry::default();
        registry.update_instrument(44_100.0, instrument("00"));
        let mut bus = EventBus::default();

        let pattern = pattern_with_notes(vec![(0, 0, "00FFC4FF4180")]);
        scheduler.set_pattern(pattern);
        scheduler.play(&mut bus);
        scheduler.tick(&mut registry, &mut bus);

        let node = registry.get("00").unwrap();
        let expected = (128.0 / 255.0) * 2.0 - 1.0;
        assert!((node.instrument().pan - expected).abs() < 1e-3);
    }

    #[test]
    fn stop_clears_last_note_per_track_and_releases_voices() {
        let clock = Arc::new(crate::clock::VirtualClock::new());
        let mut scheduler = PlaybackScheduler::new(clock.clone());
        let mut registry = InstrumentRegistry::default();
        registry.update_instrument(44_100.0, instrument("00"));
        let mut bus = EventBus::default();

        let pattern = pattern_with_notes(vec![(0, 0, "00FFC4000000")]);
        scheduler.set_pattern(pattern);
        scheduler.play(&mut bus);
        scheduler.tick(&mut registry, &mut bus);
        scheduler.stop(&mut registry, &mut bus);

        assert!(scheduler.last_note_per_track.is_empty());
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn row_duration_matches_sixteenth_note_grid() {
        let clock = Arc::new(crate::clock::VirtualClock::new());
        let scheduler = PlaybackScheduler {
            tempo: 120.0,
            ..PlaybackScheduler::new(clock)
        };
        assert!((scheduler.row_duration() - 0.125).abs() < 1e-9);
    }
}

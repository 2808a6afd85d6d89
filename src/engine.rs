//! The audio engine facade (§4.5): the single entry point an editor or
//! native host drives. Owns the instrument registry, the sample store, the
//! scheduler, and the event bus, and lazily gates graph mutations behind
//! `init_audio` the way a browser's `AudioContext` requires a user gesture.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{project_loaded, Event, EventBus, SubscriptionId, Topic};
use crate::instrument_node::InstrumentRegistry;
use crate::model::instrument::Instrument;
use crate::model::oscillator::{OscillatorKind, SamplerParams};
use crate::model::pattern::Pattern;
use crate::model::project::Project;
use crate::model::song::Song;
use crate::sample::SampleData;
use crate::scheduler::PlaybackScheduler;

/// Owns every mutable piece of engine state and forwards playback
/// operations to the [`PlaybackScheduler`] (§4.5).
pub struct AudioEngine {
    config: EngineConfig,
    initialized: bool,
    master_gain: f32,
    registry: InstrumentRegistry,
    samples: HashMap<String, Arc<SampleData>>,
    scheduler: PlaybackScheduler,
    bus: EventBus,
}

impl AudioEngine {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            initialized: false,
            master_gain: 0.75,
            registry: InstrumentRegistry::default(),
            samples: HashMap::new(),
            scheduler: PlaybackScheduler::new(clock),
            bus: EventBus::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Lazily opens the graph. No audible effect on its own; gates every
    /// other mutating operation (§4.5, §7 `AudioContextNotInitialized`).
    pub fn init_audio(&mut self) {
        self.initialized = true;
    }

    fn require_initialized(&self) -> EngineResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(EngineError::AudioContextNotInitialized)
        }
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_volume(&mut self, volume: f32) -> EngineResult<()> {
        self.require_initialized()?;
        self.master_gain = volume.clamp(0.0, 1.0);
        Ok(())
    }

    /// `on(topic, cb)` (§4.5): the event bus surfaced through the facade.
    pub fn on(
        &mut self,
        topic: Topic,
        handler: impl FnMut(&Event) + Send + 'static,
    ) -> SubscriptionId {
        self.bus.on(topic, handler)
    }

    /// `off(topic, cb)` (§4.5): detaches a handler previously returned by `on`.
    pub fn off(&mut self, topic: Topic, id: SubscriptionId) {
        self.bus.off(topic, id);
    }

    /// `update_instrument` (§4.5): create the node if absent, else forward
    /// to the existing one. Never interrupts playback.
    pub fn update_instrument(&mut self, instrument: Instrument) -> EngineResult<()> {
        self.require_initialized()?;
        self.registry
            .update_instrument(self.config.sample_rate, instrument);
        Ok(())
    }

    pub fn play(&mut self) -> EngineResult<()> {
        self.require_initialized()?;
        self.scheduler.play(&mut self.bus);
        Ok(())
    }

    pub fn stop(&mut self) -> EngineResult<()> {
        self.require_initialized()?;
        self.scheduler.stop(&mut self.registry, &mut self.bus);
        Ok(())
    }

    pub fn set_pattern(&mut self, pattern: Pattern) -> EngineResult<()> {
        self.require_initialized()?;
        self.scheduler.set_pattern(pattern);
        Ok(())
    }

    pub fn update_pattern(&mut self, pattern: Pattern) -> EngineResult<()> {
        self.require_initialized()?;
        self.scheduler.update_pattern(pattern);
        Ok(())
    }

    pub fn set_song(&mut self, song: Song, patterns: Vec<Pattern>) -> EngineResult<()> {
        self.require_initialized()?;
        self.scheduler.set_song(song, patterns);
        Ok(())
    }

    pub fn seek(&mut self, row: u16) -> EngineResult<()> {
        self.require_initialized()?;
        self.scheduler.seek(row);
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    /// `load_project` (§4.5): stops playback, clears the sample store,
    /// decodes every embedded sample, rebuilds the instrument registry from
    /// scratch, and restarts playback if it was running before the call.
    pub fn load_project(&mut self, project: Project) -> EngineResult<()> {
        self.require_initialized()?;

        let was_playing = self.scheduler.is_playing();
        if was_playing {
            self.scheduler.stop(&mut self.registry, &mut self.bus);
        }

        self.samples.clear();
        for (id, encoded) in &project.sample_data {
            match decode_embedded_sample(encoded) {
                Ok(sample) => {
                    self.samples.insert(id.clone(), sample);
                }
                Err(err) => warn!(instrument = id, error = %err, "skipping undecodable embedded sample"),
            }
        }

        self.registry = InstrumentRegistry::default();
        for instrument in &project.instruments {
            self.registry
                .update_instrument(self.config.sample_rate, instrument.clone());
            self.attach_sample_if_needed(instrument);
        }

        self.bus.emit(project_loaded(&project));

        if was_playing {
            self.scheduler.play(&mut self.bus);
        }

        Ok(())
    }

    /// `load_sample` (§4.5): decodes a WAV file's bytes, stores the result
    /// keyed by instrument id, assigns it to that instrument's node if one
    /// exists, and emits `sampleLoaded`.
    pub fn load_sample(&mut self, instrument_id: &str, file_bytes: &[u8]) -> EngineResult<()> {
        self.require_initialized()?;
        let sample = SampleData::decode_wav(file_bytes)?;
        self.samples.insert(instrument_id.to_string(), sample);

        if let Some(instrument) = self.registry.get(instrument_id).ok().map(|n| n.instrument().clone()) {
            self.attach_sample_if_needed(&instrument);
        }

        self.bus.emit(Event::SampleLoaded {
            instrument_id: instrument_id.to_string(),
        });
        Ok(())
    }

    fn attach_sample_if_needed(&mut self, instrument: &Instrument) {
        let OscillatorKind::Sampler {
            start_point,
            end_point,
            gain,
            loop_type,
        } = &instrument.oscillator.kind
        else {
            return;
        };
        let (start_point, end_point, gain, loop_type) = (*start_point, *end_point, *gain, *loop_type);
        let Some(sample) = self.samples.get(&instrument.id).cloned() else {
            debug!(instrument = %instrument.id, "sampler instrument has no loaded sample yet");
            return;
        };
        if let Some(node) = self.registry.get_mut(&instrument.id) {
            node.set_sample_buffer(Some(SamplerParams {
                sample,
                start_point,
                end_point,
                gain,
                loop_type,
            }));
        }
    }

    /// Advances the scheduler and renders one block of interleaved-free
    /// stereo audio (§4.6: the native host's per-callback entry point).
    /// A no-op producing silence before `init_audio`.
    pub fn render(&mut self, out_left: &mut [f32], out_right: &mut [f32]) {
        out_left.fill(0.0);
        out_right.fill(0.0);
        if !self.initialized {
            return;
        }

        let block_start_time = self.scheduler.now();
        self.scheduler.tick(&mut self.registry, &mut self.bus);

        let frames = out_left.len();
        let sample_rate = self.config.sample_rate as f64;
        let mut scratch_left = vec![0.0f32; frames];
        let mut scratch_right = vec![0.0f32; frames];
        for node in self.registry.iter_mut() {
            node.render_block(&mut scratch_left, &mut scratch_right, block_start_time, sample_rate);
            for i in 0..frames {
                out_left[i] += scratch_left[i] * self.master_gain;
                out_right[i] += scratch_right[i] * self.master_gain;
            }
        }
    }
}

fn decode_embedded_sample(encoded: &str) -> EngineResult<Arc<SampleData>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| EngineError::DecodeError(e.to_string()))?;
    SampleData::decode_container(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::model::envelope::EnvelopeConfig;
    use crate::model::filter::FilterConfig;
    use crate::model::lfo::{BaseTarget, Lfo2Target, LfoConfig};
    use crate::model::oscillator::OscillatorConfig;

    fn engine() -> AudioEngine {
        AudioEngine::new(EngineConfig::default(), Arc::new(VirtualClock::new()))
    }

    fn instrument(id: &str) -> Instrument {
        Instrument {
            id: id.to_string(),
            name: "Test".into(),
            volume: 1.0,
            pan: 0.0,
            max_voices: 4,
            oscillator: OscillatorConfig {
                kind: OscillatorKind::Sine,
                detune: 0.0,
            },
            filter: FilterConfig::default(),
            envelope: EnvelopeConfig::default(),
            lfo1: LfoConfig::<BaseTarget>::default(),
            lfo2: LfoConfig::<Lfo2Target>::default(),
        }
    }

    #[test]
    fn mutations_are_ignored_before_init_audio() {
        let mut engine = engine();
        assert!(engine.play().is_err());
        assert!(engine.update_instrument(instrument("00")).is_err());
    }

    #[test]
    fn master_gain_defaults_to_three_quarters() {
        let engine = engine();
        assert_eq!(engine.master_gain(), 0.75);
    }

    #[test]
    fn load_project_creates_nodes_and_emits_event() {
        let mut engine = engine();
        engine.init_audio();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        engine.on(Topic::ProjectLoaded, move |event| {
            if let Event::ProjectLoaded { project_name } = event {
                seen_clone.lock().unwrap().push(project_name.clone());
            }
        });

        let project = Project {
            name: "demo".into(),
            instruments: vec![instrument("00")],
            patterns: vec![],
            song: Song::default(),
            sample_data: HashMap::new(),
        };
        engine.load_project(project).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["demo".to_string()]);
        assert!(engine.registry.get("00").is_ok());
    }

    #[test]
    fn render_before_init_is_silent() {
        let mut engine = engine();
        let mut left = vec![1.0; 16];
        let mut right = vec![1.0; 16];
        engine.render(&mut left, &mut right);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }
}

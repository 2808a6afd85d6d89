//! Per-sample envelope state machine (§4.2), grounded on the teacher's
//! `nodes::envelope::Envelope` phase machine, generalized to skip stages
//! the configured [`EnvelopeKind`] doesn't use.

use crate::model::envelope::{EnvelopeConfig, EnvelopeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// A running instance of an [`EnvelopeConfig`], advanced one sample at a
/// time. AD envelopes decay straight to zero and never enter `Sustain`;
/// AR envelopes skip `Decay` and hold at 1.0 until release.
#[derive(Debug, Clone)]
pub struct Envelope {
    phase: EnvelopePhase,
    value: f32,
    release_level: f32,
    position: f32,
    sample_rate: f32,
    config: EnvelopeConfig,
}

impl Envelope {
    pub fn new(sample_rate: f32, config: EnvelopeConfig) -> Self {
        Self {
            phase: EnvelopePhase::Idle,
            value: 0.0,
            release_level: 0.0,
            position: 0.0,
            sample_rate,
            config,
        }
    }

    pub fn update_config(&mut self, config: EnvelopeConfig) {
        self.config = config;
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, EnvelopePhase::Idle)
    }

    /// Seconds elapsed since this envelope entered its current phase.
    /// Used by the voice allocator's attack-phase check (§4.2).
    pub fn time_in_phase(&self) -> f32 {
        let scale = match self.phase {
            EnvelopePhase::Attack => self.config.attack,
            EnvelopePhase::Decay => self.config.decay,
            EnvelopePhase::Release => self.config.release,
            _ => return 0.0,
        };
        self.position * scale.max(0.0001)
    }

    pub fn trigger_on(&mut self) {
        self.phase = EnvelopePhase::Attack;
        self.position = 0.0;
    }

    pub fn trigger_off(&mut self) {
        if !matches!(self.phase, EnvelopePhase::Idle) {
            self.release_level = self.value;
            self.phase = EnvelopePhase::Release;
            self.position = 0.0;
        }
    }

    /// Immediately silences the envelope (voice stealing, §4.2).
    pub fn reset(&mut self) {
        self.phase = EnvelopePhase::Idle;
        self.value = 0.0;
        self.release_level = 0.0;
        self.position = 0.0;
    }

    /// Advances one sample and returns the new envelope value in 0..1.
    pub fn next_sample(&mut self) -> f32 {
        let increment = 1.0 / self.sample_rate;

        match self.phase {
            EnvelopePhase::Idle => self.value = 0.0,
            EnvelopePhase::Attack => {
                let attack = self.config.attack.max(0.0001);
                self.position += increment / attack;
                if self.position >= 1.0 {
                    self.position = 0.0;
                    self.value = 1.0;
                    self.phase = match self.config.kind {
                        EnvelopeKind::Ar => EnvelopePhase::Sustain,
                        _ => EnvelopePhase::Decay,
                    };
                } else {
                    self.value = self.position;
                }
            }
            EnvelopePhase::Decay => {
                let decay = self.config.decay.max(0.0001);
                self.position += increment / decay;
                let target = match self.config.kind {
                    EnvelopeKind::Ad => 0.0,
                    _ => self.config.sustain,
                };
                if self.position >= 1.0 {
                    self.position = 0.0;
                    self.value = target;
                    self.phase = match self.config.kind {
                        EnvelopeKind::Ad => EnvelopePhase::Idle,
                        _ => EnvelopePhase::Sustain,
                    };
                } else {
                    self.value = 1.0 - self.position * (1.0 - target);
                }
            }
            EnvelopePhase::Sustain => {
                self.value = match self.config.kind {
                    EnvelopeKind::Ar => 1.0,
                    _ => self.config.sustain,
                };
            }
            EnvelopePhase::Release => {
                let release = self.config.release.max(0.0001);
                self.position += increment / release;
                if self.position >= 1.0 {
                    self.position = 0.0;
                    self.value = 0.0;
                    self.phase = EnvelopePhase::Idle;
                } else {
                    self.value = self.release_level * (1.0 - self.position);
                }
            }
        }

        self.value
    }
}

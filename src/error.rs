//! Engine error types.
//!
//! Grounded on `speccade-backend-audio`'s `AudioError`: one `thiserror`-derived
//! enum covering every recoverable and surfaced error kind the engine defines.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A tracker note string was malformed.
    #[error("malformed note string {0:?}")]
    ParseError(String),

    /// The scheduler dispatched a note addressed to an instrument id that
    /// isn't registered. Recoverable: the note is skipped.
    #[error("unknown instrument id {0:?}")]
    UnknownInstrument(String),

    /// A sampler instrument was triggered with no sample buffer loaded.
    /// Recoverable: the voice falls back to a sine tone.
    #[error("instrument {0:?} has no sample buffer loaded")]
    MissingSample(String),

    /// A mutation that requires the audio graph was attempted before
    /// `init_audio` succeeded.
    #[error("audio context not initialized")]
    AudioContextNotInitialized,

    /// Sample decoding failed; propagated to the caller of `load_sample`.
    #[error("failed to decode sample: {0}")]
    DecodeError(String),

    /// Native audio device/stream construction failed.
    #[error("audio host error: {0}")]
    Host(String),
}

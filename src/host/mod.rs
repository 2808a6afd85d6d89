//! The native audio host (§4.6): an optional adapter that opens a `cpal`
//! output stream and drives the [`AudioEngine`](crate::engine::AudioEngine)
//! once per device callback. Not part of the distilled spec, but required
//! for the crate to be a runnable engine rather than a library of
//! disconnected parts.

pub mod cpal_host;

pub use cpal_host::{AudioHost, AudioHostOptions, HostInfo};

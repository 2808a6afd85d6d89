//! Tuning knobs for the engine and the native host (§10 ambient stack),
//! grounded on the teacher's `AudioHostConfig`/`AudioHostOptions` split
//! between "what the engine renders at" and "what device we opened".

use std::env;

use crate::scheduler::{LOOKAHEAD_SECONDS, SCHEDULE_AHEAD_SECONDS};

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parameters the audio engine itself renders at, independent of any
/// particular output device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub block_size: usize,
    pub lfo_table_size: usize,
    pub schedule_ahead_seconds: f64,
    pub lookahead_seconds: f64,
}

impl Default for EngineConfig {
    /// `TRACKER_SAMPLE_RATE` and `TRACKER_BUFFER_SIZE` override the sample
    /// rate and block size the way the pack's small native-audio CLIs read
    /// their tuning knobs from the environment.
    fn default() -> Self {
        Self {
            sample_rate: env_f64("TRACKER_SAMPLE_RATE", 48_000.0) as f32,
            block_size: env_usize("TRACKER_BUFFER_SIZE", 128),
            lfo_table_size: 1024,
            schedule_ahead_seconds: SCHEDULE_AHEAD_SECONDS,
            lookahead_seconds: LOOKAHEAD_SECONDS,
        }
    }
}

/// Device-selection preferences for the native host (§4.6).
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub preferred_host_name: Option<String>,
    pub preferred_device_name: Option<String>,
    pub preferred_sample_rate: u32,
    pub buffer_size: Option<usize>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            preferred_host_name: None,
            preferred_device_name: None,
            preferred_sample_rate: 48_000,
            buffer_size: env::var("TRACKER_BUFFER_SIZE").ok().and_then(|v| v.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults_to_48khz() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48_000.0);
        assert_eq!(config.block_size, 128);
    }

    #[test]
    fn host_config_defaults_have_no_device_preference() {
        let config = HostConfig::default();
        assert!(config.preferred_host_name.is_none());
        assert!(config.preferred_device_name.is_none());
    }
}

//! CPAL-based audio host for native playback.
//!
//! Grounded on the teacher's `bin/cpal_host.rs`/`bin/native_demo.rs`: device
//! enumeration, sample-rate/buffer-size negotiation, and the per-callback
//! sample-format conversion are carried over near-verbatim. The renderer
//! driven per callback is this crate's [`AudioEngine`] instead of the
//! teacher's `Composition`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, HostId, Sample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize,
};
use dasp_sample::FromSample;
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::engine::AudioEngine;
use crate::error::{EngineError, EngineResult};

const JACK_HOST_BUFFER: usize = 128;
const ALSA_HOST_BUFFER: usize = 256;
const DEFAULT_HOST_BUFFER: usize = 256;
const TARGET_CHANNELS: u16 = 2;
const PREFERRED_SAMPLE_RATE: u32 = 48_000;

/// One host CPAL reports (e.g. "ALSA", "JACK", "CoreAudio").
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub id: HostId,
    pub name: String,
    pub has_default_device: bool,
}

/// The negotiated stream parameters, surfaced for logging/diagnostics.
#[derive(Debug, Clone)]
pub struct AudioHostConfig {
    pub sample_rate: f32,
    pub channels: u16,
    pub buffer_size: usize,
    pub device_name: String,
    pub host_name: String,
}

/// Device-selection preferences for [`AudioHost::with_options`].
pub type AudioHostOptions = HostConfig;

/// An open output stream driving an [`AudioEngine`] once per callback.
/// Dropping this stops playback and closes the device.
pub struct AudioHost {
    _stream: cpal::Stream,
    config: AudioHostConfig,
}

impl AudioHost {
    /// Lists every audio host CPAL knows how to talk to on this platform,
    /// regardless of whether a default device is actually present.
    pub fn list_hosts() -> Vec<HostInfo> {
        cpal::available_hosts()
            .into_iter()
            .filter_map(|host_id| {
                let host = cpal::host_from_id(host_id).ok()?;
                Some(HostInfo {
                    id: host_id,
                    name: host_id.name().to_string(),
                    has_default_device: host.default_output_device().is_some(),
                })
            })
            .collect()
    }

    /// Opens the preferred output device and starts driving `engine` once
    /// per callback. `engine` should already have had `init_audio` called,
    /// a project loaded, and `play()` invoked if the caller wants sound
    /// from the first callback.
    pub fn with_options(mut engine: AudioEngine, options: AudioHostOptions) -> EngineResult<Self> {
        let (device, config, sample_format, host_name, buffer_range, block_size_hint) =
            select_output_device(options.preferred_host_name.as_deref(), options.buffer_size)?;

        let configured_frames = match config.buffer_size {
            BufferSize::Fixed(actual) => actual as usize,
            BufferSize::Default => block_size_hint,
        };
        if let Some((min, max)) = buffer_range {
            info!(min, max, requested = configured_frames, "device buffer size range");
        }

        let sample_rate = config.sample_rate.0 as f32;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        let channels = config.channels;

        info!(
            sample_rate,
            channels, host = %host_name, device = %device_name, "opening output stream"
        );

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, engine)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, engine)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, engine)?,
            other => return Err(EngineError::Host(format!("unsupported sample format: {other:?}"))),
        };

        stream
            .play()
            .map_err(|e| EngineError::Host(format!("failed to start stream: {e}")))?;

        let host_config = AudioHostConfig {
            sample_rate,
            channels,
            buffer_size: configured_frames,
            device_name,
            host_name,
        };

        Ok(Self {
            _stream: stream,
            config: host_config,
        })
    }

    pub fn config(&self) -> &AudioHostConfig {
        &self.config
    }
}

fn select_output_device(
    preferred_host: Option<&str>,
    custom_buffer_size: Option<usize>,
) -> EngineResult<(
    cpal::Device,
    StreamConfig,
    SampleFormat,
    String,
    Option<(u32, u32)>,
    usize,
)> {
    let available_hosts = cpal::available_hosts();
    let mut host_priority = Vec::new();
    if let Some(preferred) = preferred_host {
        if let Some(&host_id) = available_hosts.iter().find(|h| h.name() == preferred) {
            host_priority.push(host_id);
        }
    }
    for host_id in available_hosts {
        if !host_priority.contains(&host_id) {
            host_priority.push(host_id);
        }
    }

    let mut last_error = None;
    for host_id in host_priority {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        };
        let host_name = host_id.name().to_string();

        let Some(device) = host.default_output_device() else {
            last_error = Some(format!("host {host_name} has no default output device"));
            continue;
        };

        let supported_configs = match device.supported_output_configs() {
            Ok(configs) => configs.collect::<Vec<_>>(),
            Err(e) => {
                last_error = Some(format!("failed to enumerate configs for {host_name}: {e}"));
                Vec::new()
            }
        };

        for supported in &supported_configs {
            if supported.channels() != TARGET_CHANNELS {
                continue;
            }
            if let Some(result) =
                try_preferred_rate(&device, supported, &host_name, custom_buffer_size)
            {
                return Ok(result);
            }
        }
        for supported in &supported_configs {
            if let Some(result) =
                try_preferred_rate(&device, supported, &host_name, custom_buffer_size)
            {
                return Ok(result);
            }
        }

        match device.default_output_config() {
            Ok(supported) => {
                let sample_format = supported.sample_format();
                let (buffer_size, range, block_size) =
                    choose_buffer_size(supported.buffer_size().clone(), &host_name, custom_buffer_size);
                let mut config = supported.config();
                config.buffer_size = buffer_size;
                warn!(
                    host = %host_name,
                    rate = config.sample_rate.0,
                    "preferred sample rate unavailable; using device default"
                );
                return Ok((device, config, sample_format, host_name, range, block_size));
            }
            Err(e) => {
                last_error = Some(format!("failed to query default config for {host_name}: {e}"));
            }
        }
    }

    Err(EngineError::Host(
        last_error.unwrap_or_else(|| "no usable output device found".to_string()),
    ))
}

/// Builds a concrete `StreamConfig` at [`PREFERRED_SAMPLE_RATE`] from one
/// supported range, or `None` if this range doesn't cover that rate or
/// uses a sample format we don't convert.
fn try_preferred_rate(
    device: &cpal::Device,
    supported: &cpal::SupportedStreamConfigRange,
    host_name: &str,
    custom_buffer_size: Option<usize>,
) -> Option<(cpal::Device, StreamConfig, SampleFormat, String, Option<(u32, u32)>, usize)> {
    let sample_format = supported.sample_format();
    if !matches!(
        sample_format,
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
    ) {
        return None;
    }
    if supported.min_sample_rate().0 > PREFERRED_SAMPLE_RATE
        || supported.max_sample_rate().0 < PREFERRED_SAMPLE_RATE
    {
        return None;
    }

    let supported_config = supported
        .clone()
        .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE));
    let (buffer_size, range, block_size) = choose_buffer_size(
        supported_config.buffer_size().clone(),
        host_name,
        custom_buffer_size,
    );
    let mut config = supported_config.config();
    config.buffer_size = buffer_size;
    config.channels = config.channels.min(TARGET_CHANNELS).max(1);

    Some((
        device.clone(),
        config,
        sample_format,
        host_name.to_string(),
        range,
        block_size,
    ))
}

fn choose_buffer_size(
    supported: SupportedBufferSize,
    host_name: &str,
    custom_buffer_size: Option<usize>,
) -> (BufferSize, Option<(u32, u32)>, usize) {
    let preferred_buffer_size = custom_buffer_size.unwrap_or(match host_name {
        "JACK" => JACK_HOST_BUFFER,
        "ALSA" => ALSA_HOST_BUFFER,
        _ => DEFAULT_HOST_BUFFER,
    });

    match supported {
        SupportedBufferSize::Range { min, max } => {
            if host_name == "JACK" && custom_buffer_size.is_none() {
                return (BufferSize::Default, Some((min, max)), preferred_buffer_size);
            }
            let desired = preferred_buffer_size as u32;
            let clamped = desired.clamp(min, max);
            (BufferSize::Fixed(clamped), Some((min, max)), clamped as usize)
        }
        SupportedBufferSize::Unknown => (
            BufferSize::Fixed(preferred_buffer_size as u32),
            None,
            preferred_buffer_size,
        ),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: AudioEngine,
) -> EngineResult<cpal::Stream>
where
    T: Sample + SizedSample + FromSample<f32>,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut error_logged = false;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                if channels == 0 || data.len() % channels != 0 {
                    if !error_logged {
                        warn!(channels, "output buffer length not divisible by channel count");
                        error_logged = true;
                    }
                    return;
                }
                let frames = data.len() / channels;
                left.resize(frames, 0.0);
                right.resize(frames, 0.0);
                engine.render(&mut left, &mut right);

                for frame in 0..frames {
                    for ch in 0..channels {
                        let value = match ch {
                            0 => left[frame],
                            1 => right[frame],
                            _ => 0.0,
                        };
                        data[frame * channels + ch] = T::from_sample::<f32>(value);
                    }
                }
            },
            move |err| {
                warn!(error = %err, "cpal stream error");
            },
            None,
        )
        .map_err(|e| EngineError::Host(format!("failed to build output stream: {e}")))?;

    Ok(stream)
}

//! Built-in demo: opens the default output device and plays a short
//! built-in pattern through the full facade → scheduler → instrument →
//! voice → host path end to end.
//!
//! Grounded on the teacher's `bin/native_demo.rs`: a `--list-hosts` flag,
//! `--host`/`--buffer-size` overrides, then an open-ended playback loop.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use trackerforge_engine::clock::SystemClock;
use trackerforge_engine::config::{EngineConfig, HostConfig};
use trackerforge_engine::engine::AudioEngine;
use trackerforge_engine::events::Topic;
use trackerforge_engine::host::AudioHost;
use trackerforge_engine::model::envelope::{EnvelopeConfig, EnvelopeKind};
use trackerforge_engine::model::filter::FilterConfig;
use trackerforge_engine::model::instrument::Instrument;
use trackerforge_engine::model::lfo::{BaseTarget, Lfo2Target, LfoConfig};
use trackerforge_engine::model::oscillator::{OscillatorConfig, OscillatorKind};
use trackerforge_engine::model::pattern::{CellPosition, Pattern};
use trackerforge_engine::model::project::Project;
use trackerforge_engine::note::parse_note;

fn demo_project() -> Project {
    let bass = Instrument {
        id: "00".into(),
        name: "Bass".into(),
        volume: 0.9,
        pan: 0.0,
        max_voices: 4,
        oscillator: OscillatorConfig {
            kind: OscillatorKind::Sawtooth,
            detune: 0.0,
        },
        filter: FilterConfig {
            frequency: 800.0,
            resonance: 0.8,
            envelope_amount: 0.4,
            ..FilterConfig::default()
        },
        envelope: EnvelopeConfig {
            kind: EnvelopeKind::Adsr,
            attack: 0.005,
            decay: 0.08,
            sustain: 0.6,
            release: 0.1,
        },
        lfo1: LfoConfig::<BaseTarget>::default(),
        lfo2: LfoConfig::<Lfo2Target>::default(),
    };

    let lead = Instrument {
        id: "01".into(),
        name: "Lead".into(),
        volume: 0.7,
        pan: 0.0,
        max_voices: 6,
        oscillator: OscillatorConfig {
            kind: OscillatorKind::Square,
            detune: 0.0,
        },
        filter: FilterConfig::default(),
        envelope: EnvelopeConfig {
            kind: EnvelopeKind::Adsr,
            attack: 0.01,
            decay: 0.15,
            sustain: 0.4,
            release: 0.25,
        },
        lfo1: LfoConfig {
            waveform: trackerforge_engine::model::lfo::LfoWaveform::Sine,
            frequency: 5.0,
            depth: 0.3,
            target: BaseTarget::FilterFrequency,
        },
        lfo2: LfoConfig::<Lfo2Target>::default(),
    };

    let mut notes = HashMap::new();
    let rows: &[(u16, u8, &str)] = &[
        (0, 0, "00FFC3000000"),
        (4, 0, "00FF=00000000"),
        (4, 0, "00FFC3000000"),
        (0, 1, "01FFC4000000"),
        (2, 1, "01FFD4000000"),
        (4, 1, "01FF=00000000"),
        (4, 1, "01FFC4000000"),
    ];
    for (row, track, raw) in rows {
        notes.insert(
            CellPosition {
                row: *row,
                track: *track,
            },
            parse_note(raw).expect("built-in demo notes are well-formed"),
        );
    }

    let pattern = Pattern {
        id: "p0".into(),
        name: "Demo".into(),
        tempo: 120.0,
        tracks: 2,
        rows: 8,
        notes,
    };

    Project {
        name: "tracker-demo".into(),
        instruments: vec![bass, lead],
        patterns: vec![pattern],
        song: Default::default(),
        sample_data: HashMap::new(),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--list-hosts") {
        for host in AudioHost::list_hosts() {
            println!(
                "  - {} ({}, id: {:?})",
                host.name,
                if host.has_default_device { "has default device" } else { "no default device" },
                host.id
            );
        }
        return Ok(());
    }

    let mut host_config = HostConfig::default();
    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--host" if index + 1 < args.len() => {
                host_config.preferred_host_name = Some(args[index + 1].clone());
                index += 2;
            }
            "--buffer-size" if index + 1 < args.len() => {
                host_config.buffer_size = args[index + 1].parse().ok();
                index += 2;
            }
            _ => index += 1,
        }
    }

    let mut engine = AudioEngine::new(EngineConfig::default(), Arc::new(SystemClock::new()));
    engine.init_audio();
    for topic in [
        Topic::PlayStart,
        Topic::PlayStop,
        Topic::RowChange,
        Topic::ProjectLoaded,
        Topic::SampleLoaded,
    ] {
        engine.on(topic, |event| println!("event: {event:?}"));
    }

    let project = demo_project();
    engine.load_project(project)?;
    engine.play()?;

    let host = AudioHost::with_options(engine, host_config)?;
    println!(
        "playing: {} Hz, {} channels, {}-frame buffer on {} ({})",
        host.config().sample_rate,
        host.config().channels,
        host.config().buffer_size,
        host.config().host_name,
        host.config().device_name,
    );
    println!("Ctrl+C to stop");

    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

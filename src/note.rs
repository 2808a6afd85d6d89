//! Tracker note string codec (§4.1): a 12-ASCII-character fingerprint
//! `II VV NO EE VVVV` — instrument, velocity, note name, effect, effect value.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tone value reserved to mean "release the last note on this track/instrument".
pub const NOTE_OFF: u8 = 0x3D;

/// Effect byte reserved to mean "this is a parameter-automation note" (§6).
pub const EFFECT_PARAM_AUTOMATION: u8 = 0xFF;

const NOTE_NAMES: [&str; 12] = ["C", "c", "D", "d", "E", "F", "f", "G", "g", "A", "a", "B"];

/// A decoded tracker note, independent of its (row, track) position in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    pub instrument: u8,
    pub velocity: u8,
    pub tone: u8,
    pub effect: u8,
    pub effect_value: u16,
}

/// MIDI note number → frequency in Hz: `440 * 2^((midi - 69) / 12)`.
pub fn midi_to_hz(midi: f32) -> f32 {
    440.0 * 2f32.powf((midi - 69.0) / 12.0)
}

/// Frequency in Hz → MIDI note number (inverse of [`midi_to_hz`]).
pub fn hz_to_midi(hz: f32) -> f32 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// Hex digit reserved for octave -1 (MIDI 0..11, below any octave the
/// `floor(midi/12) - 1` digit can otherwise reach): never produced by the
/// `octave` formula for octave 0..9, so it's free to use as a sentinel
/// rather than colliding with real octave 0 the way plain saturation would.
const OCTAVE_MINUS_ONE_DIGIT: u32 = 0xA;

/// Encodes a MIDI note number as a 2-character note name, or `"=0"` for the
/// note-off sentinel.
///
/// The octave is `floor(midi / 12) - 1` (MIDI 60 is "C4", middle C), written
/// as a single hex digit: a decimal digit cannot distinguish the octaves
/// spanned by MIDI 0..127, so, like the instrument/velocity/effect fields,
/// the octave nibble is hex. Octave -1 (MIDI 0..11) has no non-negative
/// digit of its own, so it's written as [`OCTAVE_MINUS_ONE_DIGIT`] instead
/// of saturating to "0" and colliding with real octave 0 (MIDI 12..23).
fn format_note_name(tone: u8) -> String {
    if tone == NOTE_OFF {
        return "=0".to_string();
    }
    let letter = NOTE_NAMES[(tone % 12) as usize];
    let raw_octave = tone / 12; // floor(midi / 12); 0 means octave -1.
    let octave_digit = match raw_octave {
        0 => OCTAVE_MINUS_ONE_DIGIT,
        n => (n - 1) as u32,
    };
    format!("{letter}{octave_digit:X}")
}

/// Decodes a 2-character note name to a MIDI note number, or [`NOTE_OFF`]
/// for `"=0"`/`"=*"`.
fn parse_note_name(name: &str) -> EngineResult<u8> {
    let mut chars = name.chars();
    let letter = chars
        .next()
        .ok_or_else(|| EngineError::ParseError(name.to_string()))?;
    let octave_char = chars
        .next()
        .ok_or_else(|| EngineError::ParseError(name.to_string()))?;

    if letter == '=' {
        return Ok(NOTE_OFF);
    }

    let letter_str = letter.to_string();
    let index = NOTE_NAMES
        .iter()
        .position(|n| *n == letter_str)
        .ok_or_else(|| EngineError::ParseError(name.to_string()))?;
    let octave_digit = octave_char
        .to_digit(16)
        .ok_or_else(|| EngineError::ParseError(name.to_string()))?;

    let midi = if octave_digit == OCTAVE_MINUS_ONE_DIGIT {
        index as u32
    } else if octave_digit < OCTAVE_MINUS_ONE_DIGIT {
        (octave_digit + 1) * 12 + index as u32
    } else {
        return Err(EngineError::ParseError(name.to_string()));
    };
    if midi > 127 {
        return Err(EngineError::ParseError(name.to_string()));
    }
    Ok(midi as u8)
}

/// Formats a decoded note back into its 12-character wire representation.
pub fn format_note(note: &NoteFields) -> String {
    format!(
        "{:02X}{:02X}{}{:02X}{:04X}",
        note.instrument,
        note.velocity,
        format_note_name(note.tone),
        note.effect,
        note.effect_value
    )
}

/// Parses a 12-character tracker note string into its fields.
///
/// Trims surrounding whitespace, rejects strings shorter than 6 characters
/// before field parsing (the codec is deliberately forgiving of a short
/// trailing `effectValue`, matching the distilled source's leniency), and
/// maps the note name through [`parse_note_name`].
pub fn parse_note(input: &str) -> EngineResult<NoteFields> {
    let s = input.trim();
    if s.len() < 6 {
        return Err(EngineError::ParseError(input.to_string()));
    }

    let instrument = u8::from_str_radix(&s[0..2], 16)
        .map_err(|_| EngineError::ParseError(input.to_string()))?;
    let velocity = u8::from_str_radix(&s[2..4], 16)
        .map_err(|_| EngineError::ParseError(input.to_string()))?;
    let tone = parse_note_name(&s[4..6])?;
    let effect = if s.len() >= 8 {
        u8::from_str_radix(&s[6..8], 16).map_err(|_| EngineError::ParseError(input.to_string()))?
    } else {
        0
    };
    let effect_value = if s.len() >= 12 {
        u16::from_str_radix(&s[8..12], 16)
            .map_err(|_| EngineError::ParseError(input.to_string()))?
    } else {
        0
    };

    Ok(NoteFields {
        instrument,
        velocity,
        tone,
        effect,
        effect_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_round_trip() {
        let parsed = parse_note("00FFC4000000").unwrap();
        assert_eq!(
            parsed,
            NoteFields {
                instrument: 0x00,
                velocity: 0xFF,
                tone: 60,
                effect: 0,
                effect_value: 0,
            }
        );
        assert_eq!(format_note(&parsed), "00FFC4000000");
    }

    #[test]
    fn note_off_sentinel_round_trips() {
        let parsed = parse_note("00FF=00000000").unwrap();
        assert_eq!(parsed.tone, NOTE_OFF);
        assert_eq!(format_note(&parsed), "00FF=00000000");
    }

    #[test]
    fn rejects_short_strings() {
        assert!(parse_note("00FF").is_err());
    }

    #[test]
    fn midi_hz_invariants() {
        assert_eq!(midi_to_hz(69.0), 440.0);
        for n in 0..128 {
            let back = hz_to_midi(midi_to_hz(n as f32));
            assert!((back - n as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn property_format_parse_identity() {
        // I-1: parse(format(n)) == n for every syntactically valid field combination
        // sampled across the space (exhaustive midi, sampled velocity/effect/effectValue).
        for tone in (0u8..=127).chain(std::iter::once(NOTE_OFF)) {
            for &velocity in &[0u8, 1, 127, 255] {
                for &effect in &[0u8, 1, 0xFE, 0xFF] {
                    for &effect_value in &[0u16, 1, 0x1234, 0xFFFF] {
                        let note = NoteFields {
                            instrument: 0x2A,
                            velocity,
                            tone,
                            effect,
                            effect_value,
                        };
                        let encoded = format_note(&note);
                        let decoded = parse_note(&encoded).unwrap();
                        assert_eq!(decoded, note, "round trip failed for {encoded}");
                    }
                }
            }
        }
    }
}

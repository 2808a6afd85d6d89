//! Pattern configuration (§3): a grid of tracker notes played at a tempo.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::note::NoteFields;

/// Position of a note inside a pattern's (row, track) grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row: u16,
    pub track: u8,
}

/// `tempo` (40..300 BPM), `tracks` (1..16), `rows` (8..128 typical). At
/// most one note per (row, track) — enforced by storing notes in a map
/// rather than a nested vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub tempo: f32,
    pub tracks: u8,
    pub rows: u16,
    #[serde(default, with = "notes_as_pairs")]
    pub notes: HashMap<CellPosition, NoteFields>,
}

/// `CellPosition` isn't a string, so it can't serialize as a JSON object
/// key; notes round-trip instead as a JSON array of `[position, note]`
/// pairs.
mod notes_as_pairs {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::CellPosition;
    use crate::note::NoteFields;

    pub fn serialize<S>(
        map: &HashMap<CellPosition, NoteFields>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        map.iter().collect::<Vec<_>>().serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<CellPosition, NoteFields>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(CellPosition, NoteFields)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

impl Pattern {
    pub fn normalize(&mut self) {
        self.tempo = self.tempo.clamp(40.0, 300.0);
        self.tracks = self.tracks.clamp(1, 16);
        self.rows = self.rows.max(1);
    }

    pub fn note_at(&self, row: u16, track: u8) -> Option<&NoteFields> {
        self.notes.get(&CellPosition { row, track })
    }

    pub fn set_note(&mut self, row: u16, track: u8, note: NoteFields) {
        self.notes.insert(CellPosition { row, track }, note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::NoteFields;

    fn note(instrument: u8) -> NoteFields {
        NoteFields {
            instrument,
            velocity: 0xFF,
            tone: 60,
            effect: 0,
            effect_value: 0,
        }
    }

    #[test]
    fn at_most_one_note_per_cell() {
        let mut pattern = Pattern {
            id: "p0".into(),
            name: "Intro".into(),
            tempo: 120.0,
            tracks: 4,
            rows: 16,
            notes: HashMap::new(),
        };
        pattern.set_note(0, 0, note(0x00));
        pattern.set_note(0, 0, note(0x01));
        assert_eq!(pattern.notes.len(), 1);
        assert_eq!(pattern.note_at(0, 0).unwrap().instrument, 0x01);
    }

    #[test]
    fn normalize_clamps_tempo_and_tracks() {
        let mut pattern = Pattern {
            id: "p0".into(),
            name: "Intro".into(),
            tempo: 1000.0,
            tracks: 99,
            rows: 0,
            notes: HashMap::new(),
        };
        pattern.normalize();
        assert_eq!(pattern.tempo, 300.0);
        assert_eq!(pattern.tracks, 16);
        assert_eq!(pattern.rows, 1);
    }
}

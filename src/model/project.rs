//! Project configuration (§3, §6): the JSON envelope the editor loads and
//! saves, with a separate map of instrument id → encoded sample bytes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::instrument::Instrument;
use crate::model::pattern::Pattern;
use crate::model::song::Song;

/// Importers must tolerate missing LFO fields, `maxVoices`, `volume`, and
/// `pan` (§6): every optional field on [`Instrument`] carries
/// `#[serde(default)]`, so an older project JSON deserializes cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub instruments: Vec<Instrument>,
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub song: Song,
    /// Instrument id → base64-encoded `TSMP` sample bytes (§6). Kept
    /// separate from the instrument tree so sampler instruments don't
    /// duplicate their sample payload across every reference.
    #[serde(default)]
    pub sample_data: HashMap<String, String>,
}

impl Project {
    pub fn normalize(&mut self) {
        for instrument in &mut self.instruments {
            instrument.normalize();
        }
        for pattern in &mut self.patterns {
            pattern.normalize();
        }
    }

    pub fn instrument(&self, id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == id)
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_song_and_sample_data_default() {
        let json = r#"{
            "name": "demo",
            "instruments": [],
            "patterns": []
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert!(project.song.is_empty());
        assert!(project.sample_data.is_empty());
    }
}

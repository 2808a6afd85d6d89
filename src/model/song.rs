//! Song configuration (§3): an ordered sequence of layered pattern groups.

use serde::{Deserialize, Serialize};

/// An ordered list of pattern ids played simultaneously (layered) for the
/// duration of the longest constituent pattern.
pub type Sequence = Vec<String>;

/// An ordered list of [`Sequence`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Song {
    pub sequences: Vec<Sequence>,
}

impl Song {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequence(&self, index: usize) -> Option<&Sequence> {
        self.sequences.get(index)
    }
}

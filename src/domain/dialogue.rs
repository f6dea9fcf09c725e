// ============================================================
// Layer 3 — Dialogue Domain Types
// ============================================================
// A dialogue is an ordered list of turns. Each turn carries the
// speaker, what they said, and the annotated emotion. These are
// the raw labelled records the data layer turns into samples.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::error::{ErcError, ErcResult};

/// One speaker's contribution to a dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker:   String,
    pub utterance: String,
    pub emotion:   String,
}

#[cfg(test)]
impl Turn {
    pub fn new(
        speaker:   impl Into<String>,
        utterance: impl Into<String>,
        emotion:   impl Into<String>,
    ) -> Self {
        Self {
            speaker:   speaker.into(),
            utterance: utterance.into(),
            emotion:   emotion.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialogue {
    pub dialogue_id: u64,
    pub turns:       Vec<Turn>,
}

#[cfg(test)]
impl Dialogue {
    pub fn new(dialogue_id: u64, turns: Vec<Turn>) -> Self {
        Self { dialogue_id, turns }
    }
}

/// The three partitions a run reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub fn file_stem(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev   => "dev",
            Split::Test  => "test",
        }
    }
}

// ─── LabelSet ─────────────────────────────────────────────────────────────────
/// Fixed mapping between emotion names and class indices.
///
/// Built from the training partition and sorted, so the same
/// corpus always yields the same index for the same emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    pub fn from_dialogues(dialogues: &[Dialogue]) -> Self {
        let names: BTreeSet<String> = dialogues
            .iter()
            .flat_map(|d| d.turns.iter().map(|t| t.emotion.trim().to_lowercase()))
            .collect();
        Self { names: names.into_iter().collect() }
    }

    #[cfg(test)]
    pub fn from_names<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        let names: BTreeSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .collect();
        Self { names: names.into_iter().collect() }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, emotion: &str) -> ErcResult<usize> {
        let key = emotion.trim().to_lowercase();
        self.names
            .binary_search(&key)
            .map_err(|_| ErcError::Dataset(format!("unknown emotion label '{emotion}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogue(emotions: &[&str]) -> Dialogue {
        let turns = emotions
            .iter()
            .map(|e| Turn::new("Ross", "hi", *e))
            .collect();
        Dialogue::new(0, turns)
    }

    #[test]
    fn test_label_set_is_sorted_and_deduplicated() {
        let labels = LabelSet::from_dialogues(&[
            dialogue(&["neutral", "joy"]),
            dialogue(&["Anger", "joy "]),
        ]);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.names()[0], "anger");
        assert_eq!(labels.index_of("JOY").unwrap(), 1);
        assert_eq!(labels.index_of("neutral").unwrap(), 2);
    }

    #[test]
    fn test_unknown_label_is_a_dataset_error() {
        let labels = LabelSet::from_dialogues(&[dialogue(&["joy"])]);
        assert!(matches!(labels.index_of("fear"), Err(ErcError::Dataset(_))));
    }
}

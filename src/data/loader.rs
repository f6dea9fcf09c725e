// ============================================================
// Layer 4 — Dialogue Loader
// ============================================================
// Reads one JSON file per partition from a data directory:
//
//   data/
//     train.json
//     dev.json
//     test.json
//
// Each file holds an array of dialogues:
//
//   [
//     { "dialogue_id": 0,
//       "turns": [
//         { "speaker": "Chandler", "utterance": "Hey.", "emotion": "neutral" },
//         ...
//       ] },
//     ...
//   ]
//
// Reference: serde_json documentation

use std::{fs, path::PathBuf};

use crate::domain::dialogue::{Dialogue, Split};
use crate::domain::error::{ErcError, ErcResult};
use crate::domain::traits::DialogueSource;

pub struct JsonDialogueLoader {
    dir: PathBuf,
}

impl JsonDialogueLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, split: Split) -> PathBuf {
        self.dir.join(format!("{}.json", split.file_stem()))
    }
}

impl DialogueSource for JsonDialogueLoader {
    fn load(&self, split: Split) -> ErcResult<Vec<Dialogue>> {
        let path = self.path_for(split);

        // Every partition is required.
        let raw = fs::read_to_string(&path).map_err(|e| {
            ErcError::Dataset(format!("cannot read '{}': {e}", path.display()))
        })?;

        let dialogues: Vec<Dialogue> = serde_json::from_str(&raw).map_err(|e| {
            ErcError::Dataset(format!("malformed dialogue file '{}': {e}", path.display()))
        })?;

        let turns: usize = dialogues.iter().map(|d| d.turns.len()).sum();
        tracing::info!(
            "Loaded {} dialogues ({} turns) from '{}'",
            dialogues.len(),
            turns,
            path.display()
        );
        Ok(dialogues)
    }
}

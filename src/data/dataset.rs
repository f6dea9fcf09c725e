// ============================================================
// Layer 4 — Utterance Samples
// ============================================================
// Every turn of every dialogue becomes one classification
// sample with two views of the conversation:
//
//   context        [CLS] t0 [SEP] t1 [SEP] ... t_i [SEP]
//                  all turns up to and including the target,
//                  left-truncated so the target turn survives
//
//   speaker memory [u_a, u_b, ...]
//                  the same speaker's earlier utterances in this
//                  dialogue, oldest first, one token list each

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::preprocessor::Preprocessor;
use crate::domain::dialogue::{Dialogue, LabelSet};
use crate::domain::error::{ErcError, ErcResult};
use crate::infra::tokenizer_store::SpecialTokens;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErcSample {
    pub token_ids:      Vec<u32>,
    pub speaker_memory: Vec<Vec<u32>>,
    pub label:          usize,
}

/// Shapes every sample built from one corpus
#[derive(Debug, Clone, Copy)]
pub struct SampleLimits {
    pub max_seq_len:      usize,
    pub max_memory_turns: usize,
}

pub struct SampleBuilder<'a> {
    tokenizer:    &'a Tokenizer,
    specials:     SpecialTokens,
    labels:       &'a LabelSet,
    limits:       SampleLimits,
    preprocessor: Preprocessor,
}

impl<'a> SampleBuilder<'a> {
    pub fn new(
        tokenizer: &'a Tokenizer,
        specials:  SpecialTokens,
        labels:    &'a LabelSet,
        limits:    SampleLimits,
    ) -> Self {
        Self { tokenizer, specials, labels, limits, preprocessor: Preprocessor::new() }
    }

    pub fn build(&self, dialogues: &[Dialogue]) -> ErcResult<Vec<ErcSample>> {
        let mut samples = Vec::new();

        for dialogue in dialogues {
            let encoded: Vec<Vec<u32>> = dialogue
                .turns
                .iter()
                .map(|t| self.encode(&t.utterance))
                .collect::<ErcResult<_>>()?;

            for (i, turn) in dialogue.turns.iter().enumerate() {
                let label = self.labels.index_of(&turn.emotion)?;

                let token_ids = self.context_ids(&encoded[..=i]);

                let mut speaker_memory: Vec<Vec<u32>> = dialogue.turns[..i]
                    .iter()
                    .zip(&encoded)
                    .filter(|(prev, ids)| prev.speaker == turn.speaker && !ids.is_empty())
                    .map(|(_, ids)| {
                        let mut ids = ids.clone();
                        ids.truncate(self.limits.max_seq_len);
                        ids
                    })
                    .collect();
                let excess = speaker_memory.len().saturating_sub(self.limits.max_memory_turns);
                speaker_memory.drain(..excess);

                samples.push(ErcSample { token_ids, speaker_memory, label });
            }
        }

        Ok(samples)
    }

    fn encode(&self, utterance: &str) -> ErcResult<Vec<u32>> {
        let text = self.preprocessor.clean(utterance);
        self.tokenizer
            .encode(text.as_str(), false)
            .map(|enc| enc.get_ids().to_vec())
            .map_err(|e| ErcError::Dataset(format!("cannot tokenise '{text}': {e}")))
    }

    /// [CLS] + each turn followed by [SEP], keeping the most recent
    /// tokens when the whole history does not fit.
    fn context_ids(&self, turns: &[Vec<u32>]) -> Vec<u32> {
        let mut body: Vec<u32> = Vec::new();
        for ids in turns {
            body.extend_from_slice(ids);
            body.push(self.specials.sep);
        }

        let budget = self.limits.max_seq_len.saturating_sub(1);
        let start  = body.len().saturating_sub(budget);

        let mut out = Vec::with_capacity(budget + 1);
        out.push(self.specials.cls);
        out.extend_from_slice(&body[start..]);
        out
    }
}

pub struct ErcDataset {
    samples: Vec<ErcSample>,
}

impl ErcDataset {
    pub fn new(samples: Vec<ErcSample>) -> Self {
        Self { samples }
    }
}

impl Dataset<ErcSample> for ErcDataset {
    fn get(&self, index: usize) -> Option<ErcSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dialogue::Turn;
    use crate::infra::tokenizer_store::TokenizerStore;

    fn fixture() -> (tempfile::TempDir, Tokenizer, Vec<Dialogue>, LabelSet) {
        let dialogues = vec![Dialogue::new(
            1,
            vec![
                Turn::new("Joey", "pizza", "joy"),
                Turn::new("Ross", "no pizza", "anger"),
                Turn::new("Joey", "more pizza", "joy"),
            ],
        )];
        let texts: Vec<String> = dialogues[0].turns.iter().map(|t| t.utterance.clone()).collect();
        let dir       = tempfile::tempdir().unwrap();
        let tokenizer = TokenizerStore::new(dir.path()).load_or_build(&texts, 50).unwrap();
        let labels    = LabelSet::from_dialogues(&dialogues);
        (dir, tokenizer, dialogues, labels)
    }

    fn limits(max_seq_len: usize) -> SampleLimits {
        SampleLimits { max_seq_len, max_memory_turns: 8 }
    }

    #[test]
    fn test_one_sample_per_turn_with_labels() {
        let (_dir, tok, dialogues, labels) = fixture();
        let specials = SpecialTokens::resolve(&tok).unwrap();
        let samples  = SampleBuilder::new(&tok, specials, &labels, limits(64))
            .build(&dialogues)
            .unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].label, labels.index_of("joy").unwrap());
        assert_eq!(samples[1].label, labels.index_of("anger").unwrap());
        // context = [CLS] pizza [SEP]
        assert_eq!(samples[0].token_ids.len(), 3);
        assert_eq!(samples[0].token_ids[0], specials.cls);
    }

    #[test]
    fn test_speaker_memory_only_holds_same_speaker() {
        let (_dir, tok, dialogues, labels) = fixture();
        let specials = SpecialTokens::resolve(&tok).unwrap();
        let samples  = SampleBuilder::new(&tok, specials, &labels, limits(64))
            .build(&dialogues)
            .unwrap();

        assert!(samples[0].speaker_memory.is_empty());
        assert!(samples[1].speaker_memory.is_empty());
        // Joey's second turn remembers only "pizza"
        assert_eq!(samples[2].speaker_memory.len(), 1);
        assert_eq!(samples[2].speaker_memory[0].len(), 1);
    }

    #[test]
    fn test_context_is_left_truncated() {
        let (_dir, tok, dialogues, labels) = fixture();
        let specials = SpecialTokens::resolve(&tok).unwrap();
        let samples  = SampleBuilder::new(&tok, specials, &labels, limits(4))
            .build(&dialogues)
            .unwrap();

        let last = &samples[2].token_ids;
        assert_eq!(last.len(), 4);
        assert_eq!(last[0], specials.cls);
        // the target turn's closing [SEP] is kept
        assert_eq!(*last.last().unwrap(), specials.sep);
    }

    #[test]
    fn test_unknown_emotion_fails() {
        let (_dir, tok, mut dialogues, labels) = fixture();
        dialogues[0].turns[0].emotion = "fear".to_string();
        let specials = SpecialTokens::resolve(&tok).unwrap();
        let result   = SampleBuilder::new(&tok, specials, &labels, limits(64)).build(&dialogues);
        assert!(matches!(result, Err(ErcError::Dataset(_))));
    }

    #[test]
    fn test_dataset_trait() {
        let ds = ErcDataset::new(vec![ErcSample {
            token_ids:      vec![2, 5, 3],
            speaker_memory: vec![],
            label:          0,
        }]);
        assert_eq!(ds.len(), 1);
        assert!(ds.get(1).is_none());
    }
}

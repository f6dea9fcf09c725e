// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Training and evaluation must share one vocabulary. The store
// keeps `tokenizer.json` next to the checkpoint:
//
//   - if the file exists (a pretrained tokenizer dropped in by
//     the user, or one built by an earlier run) it is loaded;
//   - otherwise a word-level vocabulary is counted from the
//     training utterances and written in HuggingFace format.
//
// Both BERT-style ([CLS]/[SEP]/[PAD]) and RoBERTa-style
// (<s>/</s>/<pad>) special tokens are recognised.

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::PathBuf};
use tokenizers::{
    normalizers::BertNormalizer, pre_tokenizers::whitespace::Whitespace, Normalizer,
    OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer,
};

const PAD: &str = "[PAD]";
const UNK: &str = "[UNK]";
const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";

/// Ids of the special tokens the sample builder needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: u32,
    pub cls: u32,
    pub sep: u32,
}

impl SpecialTokens {
    pub fn resolve(tokenizer: &Tokenizer) -> Result<Self> {
        let find = |candidates: &[&str]| -> Result<u32> {
            candidates
                .iter()
                .find_map(|t| tokenizer.token_to_id(t))
                .with_context(|| format!("tokenizer has none of the tokens {candidates:?}"))
        };
        Ok(Self {
            pad: find(&[PAD, "<pad>"])?,
            cls: find(&[CLS, "<s>"])?,
            sep: find(&[SEP, "</s>"])?,
        })
    }
}

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    pub fn load_or_build(&self, texts: &[String], max_vocab: usize) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Reusing tokenizer at '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building word-level tokenizer (max_vocab={})", max_vocab);
            self.build_and_save(texts, max_vocab)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("cannot load tokenizer '{}': {e}", path.display()))
    }

    fn build_and_save(&self, texts: &[String], max_vocab: usize) -> Result<Tokenizer> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create '{}'", self.dir.display()))?;

        // Count with the same normalizer and pre-tokenizer the saved
        // tokenizer will run, so every counted word can be encoded back.
        let normalizer    = normalizer();
        let pre_tokenizer = Whitespace::default();

        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for piece in vocabulary_pieces(text, &normalizer, &pre_tokenizer)? {
                *freq.entry(piece).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties broken alphabetically so the same
        // corpus always produces the same ids.
        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let specials = [PAD, UNK, CLS, SEP];
        words.truncate(max_vocab.saturating_sub(specials.len()));

        let mut vocab = serde_json::Map::new();
        for (id, tok) in specials.iter().enumerate() {
            vocab.insert(tok.to_string(), serde_json::json!(id));
        }
        for (word, _) in &words {
            let id = vocab.len();
            vocab.entry(word.clone()).or_insert(serde_json::json!(id));
        }

        let added_tokens: Vec<serde_json::Value> = specials
            .iter()
            .enumerate()
            .map(|(id, tok)| {
                serde_json::json!({
                    "id": id, "content": tok, "single_word": false,
                    "lstrip": false, "rstrip": false,
                    "normalized": false, "special": true
                })
            })
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": serde_json::to_value(normalizer)?,
            "pre_tokenizer": serde_json::to_value(&pre_tokenizer)?,
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK
            }
        });

        let path = self.path();
        fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("cannot write tokenizer '{}'", path.display()))?;
        tracing::info!("Tokenizer with {} entries saved to '{}'", vocab.len(), path.display());

        self.load()
    }
}

/// Lowercased, accent-stripped BERT normalisation
fn normalizer() -> BertNormalizer {
    BertNormalizer::new(true, true, None, true)
}

/// The pieces `text` becomes after normalisation and pre-tokenisation.
fn vocabulary_pieces(
    text:          &str,
    normalizer:    &BertNormalizer,
    pre_tokenizer: &Whitespace,
) -> Result<Vec<String>> {
    let mut pre = PreTokenizedString::from(text);
    pre.normalize(|s| normalizer.normalize(s))
        .map_err(|e| anyhow::anyhow!("cannot normalise '{text}': {e}"))?;
    pre_tokenizer
        .pre_tokenize(&mut pre)
        .map_err(|e| anyhow::anyhow!("cannot pre-tokenise '{text}': {e}"))?;
    Ok(pre
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(piece, _, _)| piece.to_string())
        .collect())
}

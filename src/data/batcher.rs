// ============================================================
// Layer 4 — Dialogue Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<ErcSample> into
// tensors on the compute device the batcher was given.
//
// Context sequences have different lengths, so padding happens
// here, to the longest sequence in the batch:
//
//   Input:  N samples, lengths L1..LN
//   Output: token_ids / attention_mask of shape [N, max(Li)]
//
// Speaker memory cannot be stacked (each sample remembers a
// different number of turns of different lengths), so it stays
// a Vec<Vec<1-D tensor>> aligned with the batch rows.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::ErcSample;
use crate::domain::error::{ErcError, ErcResult};

#[derive(Debug, Clone)]
pub struct ErcBatch<B: Backend> {
    /// [batch_size, seq_len]
    pub token_ids: Tensor<B, 2, Int>,

    /// [batch_size, seq_len], 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    /// One entry per row: the speaker's earlier utterances, oldest first
    pub speaker_memory: Vec<Vec<Tensor<B, 1, Int>>>,

    /// [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ErcBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    /// Check that every field describes the same number of examples.
    pub fn validate(&self) -> ErcResult<usize> {
        let [tok_rows, tok_cols]   = self.token_ids.dims();
        let [mask_rows, mask_cols] = self.attention_mask.dims();
        let memory_rows            = self.speaker_memory.len();
        let label_rows             = self.len();

        if tok_rows != mask_rows
            || tok_rows != memory_rows
            || tok_rows != label_rows
            || tok_cols != mask_cols
        {
            return Err(ErcError::DataShape(format!(
                "tokens [{tok_rows}, {tok_cols}], mask [{mask_rows}, {mask_cols}], \
                 memory [{memory_rows}], labels [{label_rows}]"
            )));
        }
        Ok(label_rows)
    }
}

#[derive(Clone, Debug)]
pub struct ErcBatcher<B: Backend> {
    device: B::Device,
    pad_id: u32,
}

impl<B: Backend> ErcBatcher<B> {
    pub fn new(device: B::Device, pad_id: u32) -> Self {
        Self { device, pad_id }
    }
}

impl<B: Backend> Batcher<ErcSample, ErcBatch<B>> for ErcBatcher<B> {
    fn batch(&self, items: Vec<ErcSample>) -> ErcBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.iter().map(|s| s.token_ids.len()).max().unwrap_or(0);

        let mut ids_flat  = Vec::with_capacity(batch_size * seq_len);
        let mut mask_flat = Vec::with_capacity(batch_size * seq_len);
        for sample in &items {
            let pad = seq_len - sample.token_ids.len();
            ids_flat.extend(sample.token_ids.iter().map(|&x| x as i32));
            ids_flat.extend(std::iter::repeat(self.pad_id as i32).take(pad));
            mask_flat.extend(std::iter::repeat(1i32).take(sample.token_ids.len()));
            mask_flat.extend(std::iter::repeat(0i32).take(pad));
        }

        let token_ids = Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        let speaker_memory = items
            .iter()
            .map(|s| {
                s.speaker_memory
                    .iter()
                    .map(|ids| {
                        let ids: Vec<i32> = ids.iter().map(|&x| x as i32).collect();
                        Tensor::<B, 1, Int>::from_ints(ids.as_slice(), &self.device)
                    })
                    .collect()
            })
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ErcBatch { token_ids, attention_mask, speaker_memory, labels }
    }
}

// ============================================================
// Layer 5 — Emotion Classifier
// ============================================================
// Two views of the conversation are fused into one prediction:
//
//   context encoder   [CLS] t0 [SEP] ... t_i [SEP]
//                     token + position embeddings → N encoder
//                     blocks → final norm → the [CLS] vector
//
//   speaker memory    each earlier utterance of the speaker is
//                     mean-pooled over its token embeddings and
//                     folded oldest→newest into a tanh recurrent
//                     state  h = tanh(W_u·u + W_h·h)
//
//   logits = Linear(dropout(cls + h))   → [batch, num_classes]
//
// Dropout only fires on an autodiff backend, so the training /
// evaluation mode switch is `model.valid()`.

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::data::batcher::ErcBatch;

/// Anything that maps a batch to per-example class scores.
///
/// The evaluation runner only needs this, which keeps it usable
/// with stub classifiers in tests.
pub trait EmotionClassifier<B: Backend> {
    /// [batch, num_classes]
    fn class_scores(&self, batch: &ErcBatch<B>) -> Tensor<B, 2>;
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ErcModelConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub num_classes: usize,
    #[config(default = 256)]
    pub d_model:     usize,
    #[config(default = 4)]
    pub num_heads:   usize,
    #[config(default = 2)]
    pub num_layers:  usize,
    #[config(default = 1024)]
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl ErcModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ErcModel<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        ErcModel {
            token_embedding,
            position_embedding,
            layers,
            final_norm:    LayerNormConfig::new(self.d_model).init(device),
            memory_input:  LinearConfig::new(self.d_model, self.d_model).init(device),
            memory_hidden: LinearConfig::new(self.d_model, self.d_model).init(device),
            classifier:    LinearConfig::new(self.d_model, self.num_classes).init(device),
            dropout:       DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            self_attn: MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
            norm1:       LayerNormConfig::new(self.d_model).init(device),
            norm2:       LayerNormConfig::new(self.d_model).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `pad_mask` is true where the position is padding
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn));
        let ffn = self.ffn_linear2.forward(burn::tensor::activation::gelu(
            self.ffn_linear1.forward(x.clone()),
        ));
        self.norm2.forward(x + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct ErcModel<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub memory_input:       Linear<B>,
    pub memory_hidden:      Linear<B>,
    pub classifier:         Linear<B>,
    pub dropout:            Dropout,
}

impl<B: Backend> ErcModel<B> {
    /// token_ids, attention_mask: [batch, seq_len] → logits [batch, num_classes]
    pub fn forward(
        &self,
        token_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        speaker_memory: &[Vec<Tensor<B, 1, Int>>],
    ) -> Tensor<B, 2> {
        let [batch_size, seq_len] = token_ids.dims();
        let device = token_ids.device();

        let tok_emb   = self.token_embedding.forward(token_ids);
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb   = self.position_embedding.forward(positions);
        let pad_mask  = attention_mask.equal_elem(0);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        let x = self.final_norm.forward(x);
        let [_, _, d_model] = x.dims();

        let cls = x
            .slice([0..batch_size, 0..1, 0..d_model])
            .reshape([batch_size, d_model]);
        let memory = self.track_memory(speaker_memory, d_model, &device);

        self.classifier.forward(self.dropout.forward(cls + memory))
    }

    fn track_memory(
        &self,
        speaker_memory: &[Vec<Tensor<B, 1, Int>>],
        d_model:        usize,
        device:         &B::Device,
    ) -> Tensor<B, 2> {
        let rows: Vec<Tensor<B, 2>> = speaker_memory
            .iter()
            .map(|turns| {
                let mut state = Tensor::<B, 2>::zeros([1, d_model], device);
                for ids in turns {
                    let pooled = self
                        .token_embedding
                        .forward(ids.clone().unsqueeze::<2>())
                        .mean_dim(1)
                        .reshape([1, d_model]);
                    state = (self.memory_input.forward(pooled)
                        + self.memory_hidden.forward(state))
                    .tanh();
                }
                state
            })
            .collect();
        Tensor::cat(rows, 0)
    }

    /// Unweighted cross-entropy against the integer labels
    pub fn forward_loss(&self, batch: &ErcBatch<B>) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.class_scores(batch);
        let loss   = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.labels.clone());
        (loss, logits)
    }
}

impl<B: Backend> EmotionClassifier<B> for ErcModel<B> {
    fn class_scores(&self, batch: &ErcBatch<B>) -> Tensor<B, 2> {
        self.forward(
            batch.token_ids.clone(),
            batch.attention_mask.clone(),
            &batch.speaker_memory,
        )
    }
}

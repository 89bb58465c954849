//! Transformer encoder, label projection and CRF assembled into one tagger.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Dropout, Init, Linear, Module, ModuleT, VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;

use crate::batch::Batch;
use crate::crf::Crf;
use crate::crf::transitions::TransitionInit;
use crate::crf::viterbi::{ConfidenceKind, DecodedPath};
use crate::error::{CrfError, Result};
use crate::labels::LabelAlphabet;

/// Dropout applied to the encoder output before the label projection.
pub const HIDDEN_DROPOUT: f32 = 0.2;

/// Name of the transition matrix inside the head [`VarMap`].
pub const TRANSITIONS_VAR: &str = "transitions";

/// Produces contextual hidden states for a padded batch.
pub trait Encoder {
    fn hidden_size(&self) -> usize;

    /// `(B, T)` ids and masks in, `(B, T, H)` hidden states out. `train`
    /// enables dropout.
    fn encode(
        &self,
        input_ids: &Tensor,
        segment_ids: &Tensor,
        input_mask: &Tensor,
        train: bool,
    ) -> Result<Tensor>;
}

#[derive(Deserialize)]
struct EncoderDims {
    hidden_size: usize,
}

/// BERT encoder with dropout on its last hidden layer.
pub struct BertEncoder {
    bert: BertModel,
    dropout: Dropout,
    hidden_size: usize,
}

impl BertEncoder {
    /// Build from the `config.json` of a BERT checkpoint directory.
    pub fn from_config_file<P: AsRef<Path>>(path: P, vb: VarBuilder) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CrfError::io(path, e))?;
        let config: BertConfig = serde_json::from_str(&text)?;
        let dims: EncoderDims = serde_json::from_str(&text)?;
        Self::new(&config, dims.hidden_size, vb)
    }

    pub fn new(config: &BertConfig, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            bert: BertModel::load(vb, config)?,
            dropout: Dropout::new(HIDDEN_DROPOUT),
            hidden_size,
        })
    }
}

impl Encoder for BertEncoder {
    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn encode(
        &self,
        input_ids: &Tensor,
        segment_ids: &Tensor,
        input_mask: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let hidden = self.bert.forward(input_ids, segment_ids, Some(input_mask))?;
        Ok(self.dropout.forward_t(&hidden, train)?)
    }
}

/// Linear layer with Xavier-uniform weight and zero bias.
fn xavier_linear(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let bound = (6.0 / (in_dim + out_dim) as f64).sqrt();
    let weight = vb.get_with_hints(
        (out_dim, in_dim),
        "weight",
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.))?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Encoder, label projection and CRF.
///
/// The projection and the transition matrix live in the `head` [`VarMap`]
/// so they can be optimized and checkpointed apart from the encoder.
pub struct CrfTagger<E> {
    encoder: E,
    hidden2label: Linear,
    crf: Crf,
}

impl<E: Encoder> CrfTagger<E> {
    pub fn new(
        encoder: E,
        head: &VarMap,
        alphabet: &LabelAlphabet,
        confidence: ConfidenceKind,
        device: &Device,
    ) -> Result<Self> {
        let vb = VarBuilder::from_varmap(head, DType::F32, device);
        let hidden2label =
            xavier_linear(encoder.hidden_size(), alphabet.len(), vb.pp("hidden2label"))?;
        let crf = Crf::new(alphabet, TransitionInit::default(), confidence, device)?;
        crf.transitions().register(head, TRANSITIONS_VAR)?;
        Ok(Self {
            encoder,
            hidden2label,
            crf,
        })
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn crf(&self) -> &Crf {
        &self.crf
    }

    /// Emission scores `(B, T, L)`.
    pub fn emissions(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let hidden = self.encoder.encode(
            &batch.input_ids,
            &batch.segment_ids,
            &batch.input_mask,
            train,
        )?;
        Ok(self.hidden2label.forward(&hidden)?)
    }

    /// Training loss of a batch, dropout enabled.
    pub fn neg_log_likelihood(&self, batch: &Batch) -> Result<Tensor> {
        let emissions = self.emissions(batch, true)?;
        self.crf.neg_log_likelihood(&emissions, &batch.label_ids)
    }

    /// Best path per batch row, dropout disabled.
    pub fn decode(&self, batch: &Batch) -> Result<Vec<DecodedPath>> {
        let emissions = self.emissions(batch, false)?;
        self.crf.decode(&emissions)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use candle_nn::{Embedding, embedding};

    use super::*;

    /// Embedding lookup standing in for a transformer.
    pub struct LookupEncoder {
        embedding: Embedding,
        hidden_size: usize,
    }

    impl LookupEncoder {
        pub fn new(vocab: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
            Ok(Self {
                embedding: embedding(vocab, hidden_size, vb.pp("embeddings"))?,
                hidden_size,
            })
        }
    }

    impl Encoder for LookupEncoder {
        fn hidden_size(&self) -> usize {
            self.hidden_size
        }

        fn encode(&self, input_ids: &Tensor, _: &Tensor, _: &Tensor, _: bool) -> Result<Tensor> {
            Ok(self.embedding.forward(input_ids)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::LookupEncoder;
    use super::*;
    use crate::features::InputFeatures;
    use candle_nn::{Optimizer, SGD};

    fn tiny_batch(alphabet: &LabelAlphabet) -> Batch {
        let start = alphabet.start_id() as u32;
        let stop = alphabet.stop_id() as u32;
        let o = alphabet.id_of("O").unwrap() as u32;
        let b_loc = alphabet.id_of("B-loc").unwrap() as u32;
        let features = [
            InputFeatures {
                input_ids: vec![1, 5, 6, 2],
                predict_mask: vec![false, true, true, false],
                label_ids: vec![start, b_loc, o, stop],
            },
            InputFeatures {
                input_ids: vec![1, 7, 2],
                predict_mask: vec![false, true, false],
                label_ids: vec![start, o, stop],
            },
        ];
        Batch::collate(&features, alphabet.filler_id() as u32, &Device::Cpu).unwrap()
    }

    fn tagger(head: &VarMap, encoder_vars: &VarMap) -> CrfTagger<LookupEncoder> {
        let vb = VarBuilder::from_varmap(encoder_vars, DType::F32, &Device::Cpu);
        let encoder = LookupEncoder::new(10, 8, vb).unwrap();
        CrfTagger::new(
            encoder,
            head,
            &LabelAlphabet::ner(),
            ConfidenceKind::Margin,
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn test_head_variables_are_registered() {
        let head = VarMap::new();
        let _tagger = tagger(&head, &VarMap::new());
        let data = head.data().lock().unwrap();
        assert!(data.contains_key(TRANSITIONS_VAR));
        assert!(data.contains_key("hidden2label.weight"));
        assert!(data.contains_key("hidden2label.bias"));
        assert_eq!(data["hidden2label.weight"].dims(), &[16, 8]);
    }

    #[test]
    fn test_emissions_shape_and_decode() {
        let alphabet = LabelAlphabet::ner();
        let model = tagger(&VarMap::new(), &VarMap::new());
        let batch = tiny_batch(&alphabet);

        let emissions = model.emissions(&batch, false).unwrap();
        assert_eq!(emissions.dims(), &[2, 4, 16]);

        let decoded = model.decode(&batch).unwrap();
        assert_eq!(decoded.len(), 2);
        for path in &decoded {
            assert_eq!(path.labels.len(), 4);
            assert_eq!(path.labels[0], alphabet.start_id());
        }
    }

    #[test]
    fn test_training_steps_lower_the_loss() {
        let alphabet = LabelAlphabet::ner();
        let head = VarMap::new();
        let encoder_vars = VarMap::new();
        let model = tagger(&head, &encoder_vars);
        let batch = tiny_batch(&alphabet);

        let mut vars = head.all_vars();
        vars.extend(encoder_vars.all_vars());
        let mut sgd = SGD::new(vars, 0.05).unwrap();

        let first: f32 = model.neg_log_likelihood(&batch).unwrap().to_scalar().unwrap();
        for _ in 0..20 {
            let loss = model.neg_log_likelihood(&batch).unwrap();
            sgd.backward_step(&loss).unwrap();
        }
        let last: f32 = model.neg_log_likelihood(&batch).unwrap().to_scalar().unwrap();
        assert!(first > 0.0);
        assert!(last < first, "{last} !< {first}");
    }
}

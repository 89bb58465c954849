//! Padding a group of [`InputFeatures`] into encoder tensors.

use candle_core::{Device, Tensor};

use crate::error::{CrfError, Result};
use crate::features::InputFeatures;

/// One padded mini-batch. Every tensor is `(B, T)` of `u32`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub input_ids: Tensor,
    pub segment_ids: Tensor,
    pub input_mask: Tensor,
    pub label_ids: Tensor,
    /// Unpadded gold label ids, kept on the host for evaluation.
    pub labels: Vec<Vec<u32>>,
    /// Unpadded predict masks.
    pub predict_mask: Vec<Vec<bool>>,
}

impl Batch {
    /// Pad to the longest member. Token ids pad with 0, labels with
    /// `pad_label`.
    pub fn collate(features: &[InputFeatures], pad_label: u32, device: &Device) -> Result<Self> {
        let seq_len = features
            .iter()
            .map(InputFeatures::len)
            .max()
            .ok_or_else(|| CrfError::ShapeMismatch("cannot collate an empty batch".into()))?;
        let batch = features.len();

        let mut input_ids = Vec::with_capacity(batch * seq_len);
        let mut input_mask = Vec::with_capacity(batch * seq_len);
        let mut label_ids = Vec::with_capacity(batch * seq_len);
        for f in features {
            let pad = seq_len - f.len();
            input_ids.extend_from_slice(&f.input_ids);
            input_ids.extend(std::iter::repeat_n(0u32, pad));
            input_mask.extend(std::iter::repeat_n(1u32, f.len()));
            input_mask.extend(std::iter::repeat_n(0u32, pad));
            label_ids.extend_from_slice(&f.label_ids);
            label_ids.extend(std::iter::repeat_n(pad_label, pad));
        }

        let shape = (batch, seq_len);
        Ok(Self {
            input_ids: Tensor::from_vec(input_ids, shape, device)?,
            segment_ids: Tensor::zeros(shape, candle_core::DType::U32, device)?,
            input_mask: Tensor::from_vec(input_mask, shape, device)?,
            label_ids: Tensor::from_vec(label_ids, shape, device)?,
            labels: features.iter().map(|f| f.label_ids.clone()).collect(),
            predict_mask: features.iter().map(|f| f.predict_mask.clone()).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Padded sequence length.
    pub fn seq_len(&self) -> usize {
        self.labels.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(ids: &[u32], labels: &[u32]) -> InputFeatures {
        InputFeatures {
            input_ids: ids.to_vec(),
            predict_mask: ids.iter().map(|_| true).collect(),
            label_ids: labels.to_vec(),
        }
    }

    #[test]
    fn test_collate_pads_to_longest() {
        let batch = Batch::collate(
            &[features(&[2, 7, 3], &[1, 4, 2]), features(&[2, 3], &[1, 2])],
            0,
            &Device::Cpu,
        )
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.seq_len(), 3);
        assert_eq!(batch.input_ids.dims(), &[2, 3]);
        assert_eq!(
            batch.input_ids.to_vec2::<u32>().unwrap(),
            vec![vec![2, 7, 3], vec![2, 3, 0]]
        );
        assert_eq!(
            batch.input_mask.to_vec2::<u32>().unwrap(),
            vec![vec![1, 1, 1], vec![1, 1, 0]]
        );
        assert_eq!(
            batch.label_ids.to_vec2::<u32>().unwrap(),
            vec![vec![1, 4, 2], vec![1, 2, 0]]
        );
        assert_eq!(batch.labels[1], vec![1, 2]);
    }

    #[test]
    fn test_collate_rejects_empty_batch() {
        assert!(Batch::collate(&[], 0, &Device::Cpu).is_err());
    }
}

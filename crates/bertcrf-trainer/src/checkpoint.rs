//! Persisted training state.
//!
//! A checkpoint is three files in the output directory: `checkpoint.json`
//! with the epoch counters and best validation scores, and one safetensors
//! file per parameter group.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use candle_core::Device;
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const STATE_FILE: &str = "checkpoint.json";
pub const ENCODER_FILE: &str = "encoder.safetensors";
pub const HEAD_FILE: &str = "head.safetensors";

/// Prefix used by token-classification checkpoints for encoder weights.
const ENCODER_PREFIX: &str = "bert.";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Last completed epoch.
    pub epoch: usize,
    pub valid_acc: f64,
    pub valid_f1: f64,
}

/// Read `checkpoint.json`; `None` when there is none.
pub fn load_state(dir: &Path) -> Result<Option<TrainingState>> {
    let path = dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let state = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(state))
}

/// Write the state file and both parameter groups.
pub fn save(dir: &Path, state: &TrainingState, encoder: &VarMap, head: &VarMap) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    encoder
        .save(dir.join(ENCODER_FILE))
        .context("saving encoder parameters")?;
    head.save(dir.join(HEAD_FILE))
        .context("saving head parameters")?;
    let path = dir.join(STATE_FILE);
    fs::write(&path, serde_json::to_string_pretty(state)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(
        dir = %dir.display(),
        epoch = state.epoch,
        valid_acc = state.valid_acc,
        valid_f1 = state.valid_f1,
        "saved checkpoint"
    );
    Ok(())
}

/// Load a checkpoint into the given parameter groups.
///
/// A missing checkpoint is a cold start and returns `None`.
pub fn restore(
    dir: &Path,
    encoder: &mut VarMap,
    head: &mut VarMap,
) -> Result<Option<TrainingState>> {
    let Some(state) = load_state(dir)? else {
        info!(dir = %dir.display(), "no checkpoint found, starting from scratch");
        return Ok(None);
    };
    encoder
        .load(dir.join(ENCODER_FILE))
        .context("loading encoder parameters")?;
    head.load(dir.join(HEAD_FILE))
        .context("loading head parameters")?;
    info!(
        epoch = state.epoch,
        valid_acc = state.valid_acc,
        valid_f1 = state.valid_f1,
        "loaded checkpoint"
    );
    Ok(Some(state))
}

/// Copy every tensor of `weights` whose name and shape match a variable of
/// `varmap`. Names are tried as-is and with a `bert.` prefix. Returns the
/// number of variables set.
pub fn load_matching(varmap: &VarMap, weights: &Path, device: &Device) -> Result<usize> {
    let tensors = candle_core::safetensors::load(weights, device)
        .with_context(|| format!("reading {}", weights.display()))?;
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("parameter map lock poisoned"))?;

    let mut loaded = 0usize;
    for (name, var) in data.iter() {
        let found = tensors
            .get(name)
            .or_else(|| tensors.get(&format!("{ENCODER_PREFIX}{name}")));
        match found {
            Some(tensor) if tensor.dims() == var.dims() => {
                var.set(&tensor.to_dtype(var.dtype())?)?;
                loaded += 1;
            }
            Some(tensor) => warn!(
                name = %name,
                expected = ?var.dims(),
                found = ?tensor.dims(),
                "pretrained tensor has the wrong shape, keeping initial value"
            ),
            None => debug!(name = %name, "no pretrained tensor"),
        }
    }
    if loaded < data.len() {
        warn!(
            loaded,
            total = data.len(),
            "some encoder variables were not found in the pretrained weights"
        );
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Tensor};
    use candle_nn::{Init, VarBuilder};
    use std::collections::HashMap;

    fn varmap_with(name: &str, value: f32) -> VarMap {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        vb.get_with_hints((2, 2), name, Init::Const(value as f64)).unwrap();
        varmap
    }

    fn value(varmap: &VarMap, name: &str) -> Vec<Vec<f32>> {
        varmap.data().lock().unwrap()[name].to_vec2().unwrap()
    }

    #[test]
    fn test_missing_checkpoint_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = VarMap::new();
        let mut head = VarMap::new();
        assert!(restore(dir.path(), &mut encoder, &mut head).unwrap().is_none());
    }

    #[test]
    fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let state = TrainingState {
            epoch: 3,
            valid_acc: 0.91,
            valid_f1: 0.74,
        };
        save(dir.path(), &state, &varmap_with("w", 1.5), &varmap_with("t", -2.0)).unwrap();

        let mut encoder = varmap_with("w", 0.0);
        let mut head = varmap_with("t", 0.0);
        let restored = restore(dir.path(), &mut encoder, &mut head).unwrap();
        assert_eq!(restored, Some(state));
        assert_eq!(value(&encoder, "w"), vec![vec![1.5, 1.5], vec![1.5, 1.5]]);
        assert_eq!(value(&head, "t"), vec![vec![-2.0, -2.0], vec![-2.0, -2.0]]);
    }

    #[test]
    fn test_load_matching_accepts_prefixed_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let mut tensors = HashMap::new();
        tensors.insert(
            "bert.embeddings.weight".to_string(),
            Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap(),
        );
        tensors.insert(
            "classifier.weight".to_string(),
            Tensor::ones((3, 2), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let varmap = varmap_with("embeddings.weight", 0.0);
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        vb.get_with_hints((2, 5), "pooler.weight", Init::Const(0.)).unwrap();

        let loaded = load_matching(&varmap, &path, &Device::Cpu).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(value(&varmap, "embeddings.weight"), vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
    }
}

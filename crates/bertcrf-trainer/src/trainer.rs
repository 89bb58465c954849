//! Training loop and the evaluation cycle that re-splits the corpus.

use std::fs;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use bertcrf_core::corpus::{TRAIN_FILE, VALID_FILE, write_splits};
use bertcrf_core::{
    BertEncoder, ConfidenceRankedCorpus, CrfTagger, Encoder, EvaluationReport, FeatureBuilder,
    HfSubwordTokenizer, LabelAlphabet, MetricsAccumulator, Sentence,
};
use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use oorandom::Rand64;
use tracing::{debug, info, warn};

use crate::checkpoint::{self, TrainingState};
use crate::config::TrainConfig;
use crate::data::NerDataset;
use crate::schedule::WarmupSchedule;

/// Evaluation summary written next to the checkpoint.
pub const REPORT_FILE: &str = "evaluation.json";

/// One optimizer with its own base learning rate.
pub struct ParamGroup {
    name: &'static str,
    base_lr: f64,
    optimizer: AdamW,
}

impl ParamGroup {
    pub fn new(name: &'static str, vars: Vec<Var>, lr: f64, weight_decay: f64) -> Result<Self> {
        let params = ParamsAdamW {
            lr,
            weight_decay,
            ..Default::default()
        };
        let optimizer =
            AdamW::new(vars, params).with_context(|| format!("creating {name} optimizer"))?;
        Ok(Self {
            name,
            base_lr: lr,
            optimizer,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn step(&mut self, grads: &GradStore, factor: f64) -> Result<()> {
        self.optimizer.set_learning_rate(self.base_lr * factor);
        self.optimizer.step(grads)?;
        Ok(())
    }
}

/// Variables of one [`VarMap`], sorted by name and split by whether weight
/// decay applies.
struct DecaySplit {
    decay: Vec<(String, Var)>,
    no_decay: Vec<(String, Var)>,
}

impl DecaySplit {
    fn new(vars: &VarMap) -> Result<Self> {
        let data = vars
            .data()
            .lock()
            .map_err(|_| anyhow!("parameter map lock poisoned"))?;
        let mut named: Vec<(String, Var)> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        let (no_decay, decay) = named.into_iter().partition(|(name, _)| is_no_decay(name));
        Ok(Self { decay, no_decay })
    }

    fn vars(named: Vec<(String, Var)>) -> Vec<Var> {
        named.into_iter().map(|(_, var)| var).collect()
    }
}

/// Biases and LayerNorm parameters are exempt from weight decay.
fn is_no_decay(name: &str) -> bool {
    name.ends_with("bias") || name.contains("LayerNorm")
}

/// Decoder output over an evaluation split.
pub struct Evaluation<'a> {
    pub report: EvaluationReport,
    pub ranked: ConfidenceRankedCorpus<&'a Sentence>,
}

/// Owns the model, its parameter groups and the run configuration.
pub struct Trainer<E> {
    config: TrainConfig,
    device: Device,
    alphabet: LabelAlphabet,
    encoder_vars: VarMap,
    head_vars: VarMap,
    model: CrfTagger<E>,
}

impl Trainer<BertEncoder> {
    /// Build a BERT tagger and copy in the pretrained encoder weights.
    pub fn from_pretrained(
        config: TrainConfig,
        device: Device,
        alphabet: LabelAlphabet,
    ) -> Result<Self> {
        let encoder_vars = VarMap::new();
        let vb = VarBuilder::from_varmap(&encoder_vars, DType::F32, &device);
        let encoder = BertEncoder::from_config_file(config.bert_config(), vb)
            .context("building the BERT encoder")?;

        let weights = config.bert_weights();
        if weights.exists() {
            let loaded = checkpoint::load_matching(&encoder_vars, &weights, &device)?;
            info!(loaded, path = %weights.display(), "loaded pretrained encoder weights");
        } else {
            warn!(path = %weights.display(), "no pretrained weights, encoder starts untrained");
        }

        let head_vars = VarMap::new();
        let model = CrfTagger::new(
            encoder,
            &head_vars,
            &alphabet,
            config.confidence.into(),
            &device,
        )?;
        Ok(Self::new(config, device, alphabet, encoder_vars, head_vars, model))
    }
}

impl<E: Encoder> Trainer<E> {
    pub fn new(
        config: TrainConfig,
        device: Device,
        alphabet: LabelAlphabet,
        encoder_vars: VarMap,
        head_vars: VarMap,
        model: CrfTagger<E>,
    ) -> Self {
        Self {
            config,
            device,
            alphabet,
            encoder_vars,
            head_vars,
            model,
        }
    }

    pub fn model(&self) -> &CrfTagger<E> {
        &self.model
    }

    /// Load the checkpoint in the output directory, if any.
    pub fn restore(&mut self) -> Result<Option<TrainingState>> {
        checkpoint::restore(
            &self.config.output_dir,
            &mut self.encoder_vars,
            &mut self.head_vars,
        )
    }

    fn param_groups(&self) -> Result<Vec<ParamGroup>> {
        let encoder = DecaySplit::new(&self.encoder_vars)?;
        let head = DecaySplit::new(&self.head_vars)?;
        let (lr, crf_lr) = (self.config.learning_rate, self.config.crf_learning_rate);
        Ok(vec![
            ParamGroup::new(
                "encoder",
                DecaySplit::vars(encoder.decay),
                lr,
                self.config.weight_decay,
            )?,
            ParamGroup::new("encoder-no-decay", DecaySplit::vars(encoder.no_decay), lr, 0.0)?,
            ParamGroup::new(
                "crf",
                DecaySplit::vars(head.decay),
                crf_lr,
                self.config.crf_weight_decay,
            )?,
            ParamGroup::new("crf-no-decay", DecaySplit::vars(head.no_decay), crf_lr, 0.0)?,
        ])
    }

    fn pad_label(&self) -> u32 {
        self.alphabet.filler_id() as u32
    }

    /// Train from the epoch after `resume` up to the configured epoch count.
    /// Returns the last completed epoch, or `None` if nothing was left to do.
    pub fn fit(
        &mut self,
        train: &NerDataset,
        resume: Option<TrainingState>,
    ) -> Result<Option<usize>> {
        let start_epoch = resume.map_or(0, |state| state.epoch + 1);
        if start_epoch >= self.config.epochs {
            info!(start_epoch, epochs = self.config.epochs, "no epochs left to train");
            return Ok(None);
        }
        anyhow::ensure!(!train.is_empty(), "training corpus is empty");

        let batches_per_epoch = train.num_batches(self.config.batch_size);
        let total_steps = batches_per_epoch * self.config.epochs;
        let mut schedule = WarmupSchedule::new(total_steps, self.config.warmup)
            .starting_at(batches_per_epoch * start_epoch);
        let mut groups = self.param_groups()?;
        let mut rng = Rand64::new(self.config.seed as u128);

        info!(
            examples = train.len(),
            batch_size = self.config.batch_size,
            steps = total_steps,
            start_epoch,
            "starting training"
        );
        if self.config.hard_transitions {
            info!("re-applying START/STOP transition constraints after every step");
        }

        for epoch in start_epoch..self.config.epochs {
            let started = Instant::now();
            let order = train.shuffled_order(&mut rng);
            let mut total_loss = 0f64;

            let batches =
                train.batches(&order, self.config.batch_size, self.pad_label(), &self.device);
            for batch in batches {
                let batch = batch?;
                let loss = self.model.neg_log_likelihood(&batch)?;
                let grads = loss.backward()?;
                let factor = schedule.factor();
                for group in &mut groups {
                    group
                        .step(&grads, factor)
                        .with_context(|| format!("stepping {} parameters", group.name()))?;
                }
                if self.config.hard_transitions {
                    self.model.crf().transitions().enforce_constraints()?;
                }

                let loss: f32 = loss.to_scalar()?;
                total_loss += loss as f64;
                debug!(step = schedule.step(), loss, lr_factor = factor, "optimizer step");
                schedule.advance();
            }

            info!(
                epoch,
                loss = total_loss,
                minutes = started.elapsed().as_secs_f64() / 60.0,
                "epoch completed"
            );
        }
        Ok(Some(self.config.epochs - 1))
    }

    /// Decode `dataset` in file order; collect metrics and confidences.
    pub fn evaluate<'a>(&self, dataset: &'a NerDataset) -> Result<Evaluation<'a>> {
        let started = Instant::now();
        let order = dataset.sequential_order();
        let mut metrics = MetricsAccumulator::new(&self.alphabet);
        let mut ranked = ConfidenceRankedCorpus::new();
        let mut sentences = dataset.sentences().iter();

        let batches =
            dataset.batches(&order, self.config.batch_size, self.pad_label(), &self.device);
        for batch in batches {
            let batch = batch?;
            let decoded = self.model.decode(&batch)?;
            let rows = batch.labels.iter().zip(&batch.predict_mask);
            for ((gold, mask), path) in rows.zip(&decoded) {
                metrics.add(gold, mask, path);
                if let Some(sentence) = sentences.next() {
                    ranked.push(path.confidence, sentence);
                }
            }
        }

        let report = metrics.report();
        info!(
            accuracy = report.accuracy,
            precision = report.precision,
            recall = report.recall,
            f1 = report.f1,
            tokens = report.tokens,
            minutes = started.elapsed().as_secs_f64() / 60.0,
            "evaluation"
        );
        Ok(Evaluation { report, ranked })
    }

    /// Rewrite the corpus splits: the least confident evaluation examples
    /// become the new `valid.txt`, the rest are appended to `train.txt`.
    pub fn resplit(
        &self,
        train: &NerDataset,
        ranked: ConfidenceRankedCorpus<&Sentence>,
    ) -> Result<()> {
        let split = ranked.partition(self.config.holdout);
        let mut merged: Vec<&Sentence> = train.sentences().iter().collect();
        merged.extend(split.promoted.iter().copied());

        write_splits(
            &self.config.data_dir,
            &merged,
            &split.held_out,
            self.config.boundary.into(),
        )
        .with_context(|| format!("rewriting splits in {}", self.config.data_dir.display()))?;
        info!(
            train = merged.len(),
            valid = split.held_out.len(),
            promoted = split.promoted.len(),
            "re-split corpus by confidence"
        );
        Ok(())
    }

    /// Save a checkpoint when the evaluation beats the restored one, and
    /// always write the evaluation report.
    pub fn record(
        &self,
        epoch: usize,
        previous: Option<TrainingState>,
        report: &EvaluationReport,
    ) -> Result<()> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(REPORT_FILE);
        fs::write(&path, serde_json::to_string_pretty(report)?)
            .with_context(|| format!("writing {}", path.display()))?;

        let improved = previous.is_none_or(|best| report.f1 > best.valid_f1);
        if !improved {
            info!(f1 = report.f1, "validation F1 did not improve, keeping previous checkpoint");
            return Ok(());
        }
        let state = TrainingState {
            epoch,
            valid_acc: report.accuracy,
            valid_f1: report.f1,
        };
        checkpoint::save(dir, &state, &self.encoder_vars, &self.head_vars)
    }
}

fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        return Ok(Device::Cpu);
    }
    let device = Device::cuda_if_available(0)?;
    info!(device = ?device, "selected device");
    Ok(device)
}

/// Train, evaluate and re-split as configured.
pub fn run_training(config: TrainConfig) -> Result<()> {
    config.validate()?;
    let device = select_device(config.cpu)?;

    let mut alphabet = LabelAlphabet::ner();
    if config.ignore_outside {
        alphabet = alphabet.with_ignored(&["O"])?;
    }

    let tokenizer = HfSubwordTokenizer::from_file(config.bert_tokenizer())
        .with_context(|| format!("loading {}", config.bert_tokenizer().display()))?;
    let builder = FeatureBuilder::new(&tokenizer, &alphabet, config.max_seq_length)?;
    let train = NerDataset::load(config.data_dir.join(TRAIN_FILE), &builder)?;
    let valid = NerDataset::load(config.data_dir.join(VALID_FILE), &builder)?;
    info!(train = train.len(), valid = valid.len(), "loaded corpus");

    let mut trainer = Trainer::from_pretrained(config, device, alphabet.clone())?;
    let resume = trainer.restore()?;
    let last_epoch = trainer.fit(&train, resume)?;

    let evaluation = trainer.evaluate(&valid)?;
    let epoch = last_epoch.or(resume.map(|state| state.epoch)).unwrap_or(0);
    trainer.record(epoch, resume, &evaluation.report)?;
    trainer.resplit(&train, evaluation.ranked)?;
    Ok(())
}

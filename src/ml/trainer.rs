// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One epoch = a training phase followed by a validation phase.
//
//   train phase:  DataLoader (shuffled, seed + epoch) → (tower-averaged) step → meters
//   valid phase:  model.valid() → DataLoader (in order) → loss / accuracy / probabilities
//
// Whenever validation accuracy beats the best seen so far the
// predictions and class probabilities are written to CSV and the
// weights are saved as model_best. After every epoch the counters,
// the best record (and model_last) are persisted so an interrupted
// run resumes.
//
// Towers: a batch is split into `towers` shards, the loss of each
// shard is scaled by 1/towers and its gradients accumulated, so the
// single optimizer step applies the average gradient of all towers.

use anyhow::{anyhow, Result};
use burn::{
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{
        decay::WeightDecayConfig, momentum::MomentumConfig, AdamConfig, GradientsAccumulator,
        GradientsParams, Optimizer, SgdConfig,
    },
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{image_loader, ImageBatch, ImageBatcher},
    dataset::ImageDataset,
    patches::PatchSampler,
};
use crate::domain::options::OptimizerKind;
use crate::infra::{
    checkpoint::{CheckpointKind, CheckpointManager, TrainingState},
    metrics::{AverageMeter, EpochMetrics, MetricsLogger},
    predictions::{timestamp, PredictionWriter},
    progress::ProgressLog,
    summary::{self, SummaryWriter},
};
use crate::ml::{
    loss::{argmax_rows, correct_predictions, mil_loss, LossWeights},
    mil::MilPooling,
    model::ResNet,
    schedule::LrSchedule,
};

/// Training and validation images of one run.
pub struct TrainingData {
    pub train: ImageDataset,
    pub val:   ImageDataset,
}

/// The epoch with the highest validation accuracy.
#[derive(Debug, Clone, Default)]
pub struct BestRecord {
    pub epoch:        Option<usize>,
    pub val_accuracy: f64,
    pub val_loss:     f64,
    pub predictions:  Vec<usize>,
}

impl BestRecord {
    pub fn is_improvement(&self, accuracy: f64) -> bool {
        accuracy > self.val_accuracy
    }
}

/// Mean loss and accuracy of one phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseResult {
    pub loss:     f64,
    pub accuracy: f64,
}

/// Everything a validation pass produces, one entry per image in dataset order.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub loss:          f64,
    pub accuracy:      f64,
    pub predictions:   Vec<usize>,
    pub labels:        Vec<usize>,
    /// Row-major `[images, num_classes]`
    pub probabilities: Vec<f32>,
    pub num_classes:   usize,
}

/// How `evaluate` batches and scores a dataset.
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    pub patches:     Option<PatchSampler>,
    pub pooling:     MilPooling,
    pub weights:     LossWeights,
    pub batch_size:  usize,
    pub num_workers: usize,
    /// Fixes patch placement, so repeated evaluations agree
    pub seed:        u64,
}

impl EvalOptions {
    pub fn new(cfg: &TrainConfig, weights: LossWeights) -> Self {
        Self {
            patches:     cfg.patch_sampler(),
            pooling:     MilPooling::new(cfg.pooling, cfg.lse_r),
            weights,
            batch_size:  cfg.batch_size,
            num_workers: cfg.num_workers,
            seed:        cfg.seed,
        }
    }
}

/// Gradients and statistics of one tower-averaged step.
pub struct TowerStep {
    pub grads:   GradientsParams,
    /// Mean loss over the shards
    pub loss:    f64,
    /// Correctly classified bags over all shards
    pub correct: usize,
}

/// Build the optimizer named in `cfg` and run every remaining epoch.
pub fn run_training<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    data:   TrainingData,
    ckpt:   CheckpointManager,
    device: B::Device,
) -> Result<BestRecord> {
    let model_cfg  = cfg.resnet_config();
    let complexity = model_cfg.complexity(cfg.input_size());
    tracing::info!(
        "Model {:?}: {} blocks, {} weights, {} FLOPs per instance",
        cfg.model,
        model_cfg.stage_depths.iter().sum::<usize>(),
        complexity.weights,
        complexity.flops,
    );
    let model = model_cfg.init::<B>(&device);
    for (i, block) in model.blocks.iter().enumerate() {
        tracing::debug!("Block {}: {:?} shortcut", i, block.shortcut_kind());
    }

    let weight_decay = (cfg.weight_decay > 0.0).then(|| WeightDecayConfig::new(cfg.weight_decay as f32));

    match cfg.optimizer {
        OptimizerKind::Adam => {
            let optim = AdamConfig::new().with_weight_decay(weight_decay).init();
            Trainer::new(cfg, model, optim, data, ckpt, device)?.train()
        }
        OptimizerKind::Sgd => {
            let momentum = (cfg.momentum > 0.0).then(|| {
                MomentumConfig::new()
                    .with_momentum(cfg.momentum)
                    .with_dampening(0.0)
            });
            let optim = SgdConfig::new()
                .with_momentum(momentum)
                .with_weight_decay(weight_decay)
                .init();
            Trainer::new(cfg, model, optim, data, ckpt, device)?.train()
        }
    }
}

/// Gradients of the mean loss over `shards`.
///
/// Each shard's loss is scaled by 1/shards before its backward pass and
/// the gradients are summed, which equals the mean of the per-shard
/// gradients.
pub fn tower_gradients<B: AutodiffBackend>(
    model:   &ResNet<B>,
    shards:  Vec<ImageBatch<B>>,
    pooling: MilPooling,
    weights: LossWeights,
) -> TowerStep {
    let towers = shards.len().max(1) as f64;

    let mut accumulator = GradientsAccumulator::new();
    let mut loss_sum    = 0.0f64;
    let mut correct     = 0usize;

    for shard in shards {
        let logits = model.forward(shard.instances);
        let output = pooling.forward(logits, shard.instances_per_bag);
        correct += correct_predictions(output.bag_logits.clone(), shard.bag_labels.clone());

        let loss = mil_loss(&output, shard.instance_labels, shard.bag_labels, weights) / towers;
        loss_sum += loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), model);
        accumulator.accumulate(model, grads);
    }

    TowerStep { grads: accumulator.grads(), loss: loss_sum, correct }
}

struct Trainer<'a, B: AutodiffBackend, O: Optimizer<ResNet<B>, B>> {
    cfg:      &'a TrainConfig,
    model:    ResNet<B>,
    optim:    O,
    device:   B::Device,
    data:     TrainingData,
    pooling:  MilPooling,
    schedule: LrSchedule,
    ckpt:     CheckpointManager,
    metrics:  MetricsLogger,
    summary:  SummaryWriter,
    outputs:  PredictionWriter,
    state:    TrainingState,
    best:     BestRecord,
}

impl<'a, B: AutodiffBackend, O: Optimizer<ResNet<B>, B>> Trainer<'a, B, O> {
    fn new(
        cfg:    &'a TrainConfig,
        model:  ResNet<B>,
        optim:  O,
        data:   TrainingData,
        ckpt:   CheckpointManager,
        device: B::Device,
    ) -> Result<Self> {
        let mut model = model;
        let mut state = TrainingState::default();

        // ── Resume from the latest checkpoint, if any ─────────────────────────
        if cfg.resume {
            if let Some(saved) = ckpt.load_state()? {
                if ckpt.has_model(CheckpointKind::Last) {
                    model = ckpt.load_model(model, CheckpointKind::Last, &device)?;
                    tracing::info!(
                        "Resuming after epoch {} (global step {})",
                        saved.epoch,
                        saved.global_step
                    );
                    state = saved;
                } else {
                    tracing::warn!("Found training state but no model_last checkpoint; starting fresh");
                }
            }
        }

        let best = BestRecord {
            epoch:        state.best_epoch,
            val_accuracy: state.best_val_accuracy,
            val_loss:     state.best_val_loss,
            predictions:  state.best_predictions.clone(),
        };

        let metrics = MetricsLogger::new(ckpt.dir().clone())?;
        let summary = SummaryWriter::new(&cfg.summary_dir)?;
        tracing::info!("Epoch metrics go to '{}'", metrics.csv_path().display());
        tracing::info!("Summaries go to '{}'", summary.path().display());

        Ok(Self {
            cfg,
            model,
            optim,
            device,
            data,
            pooling:  MilPooling::new(cfg.pooling, cfg.lse_r),
            schedule: cfg.lr_schedule(),
            outputs:  PredictionWriter::new(&cfg.output_dir)?,
            metrics,
            summary,
            ckpt,
            state,
            best,
        })
    }

    fn train(mut self) -> Result<BestRecord> {
        let first = self.state.epoch + 1;
        if first > self.cfg.epochs {
            tracing::info!("All {} epochs already completed", self.cfg.epochs);
        }

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in first..=self.cfg.epochs {
            let weights = LossWeights::for_epoch(self.cfg.mode, self.cfg.beta, self.cfg.beta_decay, epoch);

            let train = self.train_epoch(epoch, weights)?;
            self.state.epoch = epoch;
            let val = self.validate(epoch, weights)?;

            self.metrics.log(&EpochMetrics {
                epoch,
                train_loss: train.loss,
                train_acc:  train.accuracy,
                val_loss:   val.loss,
                val_acc:    val.accuracy,
                lr:         self.schedule.lr_at(self.state.global_step),
                si_weight:  weights.si,
            })?;
            self.persist()?;
        }

        tracing::info!("Top Validation Accuracy achieved:");
        tracing::info!("Val Epoch: {:?}", self.best.epoch);
        tracing::info!("Min Val Loss: {:.6}", self.best.val_loss);
        tracing::info!("Best Val Accuracy: {:.6}", self.best.val_accuracy);
        tracing::info!("Predictions: {:?}", self.best.predictions);

        if !self.best.predictions.is_empty() {
            let path = self.outputs.write_predictions(&timestamp(), &self.best.predictions)?;
            tracing::info!("Best predictions written to '{}'", path.display());
        }

        Ok(self.best)
    }

    fn train_epoch(&mut self, epoch: usize, weights: LossWeights) -> Result<PhaseResult> {
        // a fresh order and fresh patches every epoch, reproducible across resumes
        let seed   = self.cfg.seed.wrapping_add(epoch as u64);
        let loader = image_loader::<B>(
            ImageBatcher::new(self.cfg.patch_sampler(), seed),
            self.data.train.clone(),
            self.cfg.batch_size,
            Some(seed),
            self.cfg.num_workers,
            &self.device,
        );
        let mut progress = ProgressLog::new(format!("epoch-{epoch}-"), self.data.train.len());

        let mut loss_per_epoch = AverageMeter::new();
        let mut acc_per_epoch  = AverageMeter::new();

        for batch in loader.iter() {
            let batch = batch?;
            let bags  = batch.bags;
            let lr    = self.schedule.lr_at(self.state.global_step);
            let step  = self.train_step(batch, weights, lr);
            self.state.global_step += 1;

            loss_per_epoch.update(step.loss);
            acc_per_epoch.update(step.accuracy);
            tracing::debug!(
                "epoch-{}- batch {}: loss={:.4} acc={:.4}",
                epoch, loss_per_epoch.count(), step.loss, step.accuracy
            );
            progress.advance(bags);
        }

        let lr = self.schedule.lr_at(self.state.global_step);
        let result = PhaseResult {
            loss:     loss_per_epoch.average(),
            accuracy: acc_per_epoch.average(),
        };

        tracing::info!("Learning rate: {:.6}", lr);
        tracing::info!("Training Epoch: {} ({} batches)", epoch, loss_per_epoch.count());
        tracing::info!("Training Loss Per Epoch: {:.6}", result.loss);
        tracing::info!("Accuracy Per Epoch: {:.6}", result.accuracy);
        tracing::info!("Current_si_weight: {:.6}", weights.si);
        tracing::info!("Current_mi_weight: {:.6}", weights.mi);

        self.summary.summarize(self.state.global_step, &[
            (summary::TRAIN_LOSS,    result.loss),
            (summary::TRAIN_ACC,     result.accuracy),
            (summary::LEARNING_RATE, lr),
            (summary::SI_WEIGHT,     weights.si),
            (summary::MI_WEIGHT,     weights.mi),
        ])?;

        println!("Epoch-{epoch}  loss:{:.4} -- acc:{:.4}", result.loss, result.accuracy);
        Ok(result)
    }

    /// One optimizer step on `batch`, averaging gradients over its tower shards.
    fn train_step(&mut self, batch: ImageBatch<B>, weights: LossWeights, lr: f64) -> PhaseResult {
        let bags = batch.bags;
        let step = tower_gradients(&self.model, batch.shard(self.cfg.towers), self.pooling, weights);
        self.model = self.optim.step(lr, self.model.clone(), step.grads);

        PhaseResult {
            loss:     step.loss,
            accuracy: step.correct as f64 / bags.max(1) as f64,
        }
    }

    fn validate(&mut self, epoch: usize, weights: LossWeights) -> Result<PhaseResult> {
        // inference model: batch-norm uses running statistics, no autodiff graph
        let model = self.model.valid();
        let eval  = evaluate(
            &model,
            &self.data.val,
            &EvalOptions::new(self.cfg, weights),
            &format!("Val-{epoch}-"),
            &self.device,
        )?;

        if !eval.predictions.is_empty() && self.best.is_improvement(eval.accuracy) {
            self.best = BestRecord {
                epoch:        Some(epoch),
                val_accuracy: eval.accuracy,
                val_loss:     eval.loss,
                predictions:  eval.predictions.clone(),
            };
            self.state.best_epoch        = Some(epoch);
            self.state.best_val_accuracy = eval.accuracy;
            self.state.best_val_loss     = eval.loss;
            self.state.best_predictions  = eval.predictions.clone();

            tracing::info!("Saving Predictions to '{}'.", self.cfg.output_dir);
            tracing::info!("Saving class probabilities to '{}'.", self.cfg.output_dir);
            let stamp = timestamp();
            self.outputs.write_predictions(&stamp, &eval.predictions)?;
            self.outputs.write_probabilities(&stamp, &eval.probabilities, eval.num_classes)?;

            if self.cfg.save_models {
                self.ckpt.save_model(&model, CheckpointKind::Best)?;
            }

            tracing::info!("************ NEW Validation Accuracy achieved ************!");
            tracing::info!("Val Epoch: {}", epoch);
            tracing::info!("Min Val Loss Per Epoch: {:.6}", eval.loss);
            tracing::info!("Best Val Accuracy Per Epoch: {:.6}", eval.accuracy);
        }

        tracing::info!("Val Epoch: {}", epoch);
        tracing::info!("Val Loss Per Epoch: {:.6}", eval.loss);
        tracing::info!("Val Accuracy Per Epoch: {:.6}", eval.accuracy);

        self.summary.summarize(self.state.global_step, &[
            (summary::TEST_LOSS, eval.loss),
            (summary::TEST_ACC,  eval.accuracy),
        ])?;

        println!("Val-{epoch}  loss:{:.4} -- acc:{:.4}", eval.loss, eval.accuracy);
        Ok(PhaseResult { loss: eval.loss, accuracy: eval.accuracy })
    }

    /// Write counters, the best record (and model_last) so the run can be resumed.
    fn persist(&self) -> Result<()> {
        if !self.cfg.save_models {
            return Ok(());
        }
        self.ckpt.save_model(&self.model, CheckpointKind::Last)?;
        self.ckpt.save_state(&self.state)?;
        tracing::debug!("Checkpoint saved for epoch {}", self.state.epoch);
        Ok(())
    }
}

/// Run `model` over every image of `dataset`.
///
/// Batches may come back from the loader workers in any order; the
/// results are put back in dataset order before they are returned.
/// An image that cannot be decoded fails the whole evaluation.
pub fn evaluate<B: Backend>(
    model:   &ResNet<B>,
    dataset: &ImageDataset,
    opts:    &EvalOptions,
    label:   &str,
    device:  &B::Device,
) -> Result<Evaluation> {
    let loader = image_loader::<B>(
        ImageBatcher::new(opts.patches, opts.seed),
        dataset.clone(),
        opts.batch_size,
        None,
        opts.num_workers,
        device,
    );
    let mut progress       = ProgressLog::new(label, dataset.len());
    let mut loss_per_epoch = AverageMeter::new();
    let mut acc_per_epoch  = AverageMeter::new();

    // (dataset index, label, class probabilities)
    let mut rows: Vec<(usize, usize, Vec<f32>)> = Vec::with_capacity(dataset.len());
    let mut num_classes = 0;

    for batch in loader.iter() {
        let batch  = batch?;
        let bags   = batch.bags;
        let labels = batch
            .bag_labels
            .clone()
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow!("Cannot read labels: {e:?}"))?;
        let output = opts.pooling.forward(model.forward(batch.instances), batch.instances_per_bag);

        let correct = correct_predictions(output.bag_logits.clone(), batch.bag_labels.clone());
        let loss    = mil_loss(&output, batch.instance_labels, batch.bag_labels, opts.weights)
            .into_scalar()
            .elem::<f64>();

        let [_, classes] = output.bag_logits.dims();
        let probabilities = softmax(output.bag_logits, 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read class probabilities: {e:?}"))?;

        num_classes = classes;
        for ((index, label), row) in batch.indices.iter().zip(labels).zip(probabilities.chunks(classes)) {
            rows.push((*index, label as usize, row.to_vec()));
        }

        loss_per_epoch.update(loss);
        acc_per_epoch.update(correct as f64 / bags as f64);
        progress.advance(bags);
    }

    rows.sort_by_key(|(index, ..)| *index);

    let mut eval = Evaluation {
        loss:     loss_per_epoch.average(),
        accuracy: acc_per_epoch.average(),
        num_classes,
        ..Evaluation::default()
    };
    for (_, label, row) in rows {
        eval.labels.push(label);
        eval.probabilities.extend(row);
    }
    eval.predictions = argmax_rows(&eval.probabilities, num_classes);
    Ok(eval)
}

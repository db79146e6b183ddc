//! Epoch loop with best-loss checkpointing.
//!
//! The loop only sees two seams: a [`BatchSource`] that yields a fresh pass of
//! batches per epoch, and a [`TrainSession`] that runs one optimizer step and
//! can persist itself. The network lives behind the session.

use std::path::{Path, PathBuf};

/// Starting value of the best-loss tracker for every run.
pub const BEST_LOSS_SENTINEL: f32 = 1e4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInputs {
    pub keep_prob: f64,
    pub learning_rate: f64,
}

pub trait BatchSource {
    type Batch;

    /// Start a new pass. Each call may reshuffle.
    fn batches(
        &self,
        batch_size: usize,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Self::Batch>> + '_>>;
}

pub trait TrainSession {
    type Batch;

    /// Forward, backward, one optimizer step. Returns the batch loss.
    fn run_step(&mut self, batch: Self::Batch, inputs: StepInputs) -> anyhow::Result<f32>;

    fn save(&mut self, path: &Path, epoch: usize, loss: f32) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainerState {
    Idle,
    Running { epoch: usize },
    EpochComplete { epoch: usize, loss: f32 },
    Done,
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub keep_prob: f64,
    pub learning_rate: f64,
    /// Checkpoint target; `None` disables saving.
    pub save_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub last_batch_loss: f32,
    pub batches: usize,
    pub saved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub epochs: Vec<EpochReport>,
    pub best_loss: f32,
    pub steps: usize,
}

impl TrainReport {
    pub fn saves(&self) -> usize {
        self.epochs.iter().filter(|e| e.saved).count()
    }
}

pub struct Trainer {
    cfg: TrainerConfig,
    state: TrainerState,
    best_loss: f32,
}

impl Trainer {
    pub fn new(cfg: TrainerConfig) -> Self {
        Self {
            cfg,
            state: TrainerState::Idle,
            best_loss: BEST_LOSS_SENTINEL,
        }
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn best_loss(&self) -> f32 {
        self.best_loss
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    /// Run `epochs` passes. After each pass the loss of its last batch is
    /// compared with the best so far; a strictly lower value triggers a save.
    pub fn train<D, S>(&mut self, source: &D, session: &mut S) -> anyhow::Result<TrainReport>
    where
        D: BatchSource,
        S: TrainSession<Batch = D::Batch>,
    {
        let inputs = StepInputs {
            keep_prob: self.cfg.keep_prob,
            learning_rate: self.cfg.learning_rate,
        };
        let mut report = TrainReport {
            epochs: Vec::with_capacity(self.cfg.epochs),
            best_loss: self.best_loss,
            steps: 0,
        };
        if self.cfg.epochs > 0 {
            tracing::info!("Training the model");
        }

        for epoch in 0..self.cfg.epochs {
            self.state = TrainerState::Running { epoch };
            let mut loss = BEST_LOSS_SENTINEL;
            let mut batches = 0;
            for batch in source.batches(self.cfg.batch_size)? {
                loss = session.run_step(batch?, inputs)?;
                batches += 1;
            }
            report.steps += batches;
            tracing::info!("Epoch {epoch} loss = {loss:.3}");

            let mut saved = false;
            if let Some(path) = &self.cfg.save_path {
                if loss < self.best_loss {
                    tracing::info!("Saving better model...");
                    session.save(path, epoch, loss)?;
                    self.best_loss = loss;
                    saved = true;
                }
            }
            report.epochs.push(EpochReport {
                epoch,
                last_batch_loss: loss,
                batches,
                saved,
            });
            self.state = TrainerState::EpochComplete { epoch, loss };
        }

        self.state = TrainerState::Done;
        report.best_loss = self.best_loss;
        Ok(report)
    }
}

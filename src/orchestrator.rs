use std::{fmt, io, sync::Arc};

use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    GazeError, Result,
    collector::Sample,
    features::InputSchema,
    model::{GazeModel, TrainingReport},
    store::{RoundRecord, RoundStore},
};

/// The lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Training,
    Ready,
    /// Training failed, collection must be restarted explicitly.
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Collecting => "collecting",
            Phase::Training => "training",
            Phase::Ready => "ready",
            Phase::Aborted => "aborted",
        };

        write!(f, "{s}")
    }
}

/// The samples of every required round, concatenated in round order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    pub train: Vec<Sample>,
    pub val: Vec<Sample>,
}

/// Decides when enough rounds were collected and drives the training of the model.
pub struct TrainingOrchestrator {
    store: RoundStore,
    input: InputSchema,
    rounds: u64,
    round_ms: u64,
    phase: watch::Sender<Phase>,
}

impl TrainingOrchestrator {
    /// Creates a new `TrainingOrchestrator` in the `Collecting` phase.
    ///
    /// # Arguments
    /// * `store` - Where closed rounds are read from.
    /// * `input` - The input schema every stored sample must follow.
    /// * `rounds` - The amount of rounds to train on, starting at round `0`.
    /// * `round_ms` - The duration of a round.
    pub fn new(store: RoundStore, input: InputSchema, rounds: u64, round_ms: u64) -> Self {
        let (phase, _) = watch::channel(Phase::Collecting);

        Self {
            store,
            input,
            rounds,
            round_ms: round_ms.max(1),
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Whether every required round was closed at `elapsed_ms`.
    pub fn collection_complete(&self, elapsed_ms: u64) -> bool {
        elapsed_ms / self.round_ms >= self.rounds
    }

    /// Loads and concatenates the required rounds.
    ///
    /// # Returns
    /// The training set, or `None` while any round is still missing from the store.
    pub async fn gather(&self) -> Result<Option<TrainingSet>> {
        let mut set = TrainingSet::default();

        for index in 0..self.rounds {
            let round = match self.store.require(index).await {
                Ok(round) => round,
                Err(e) if e.is_recoverable() => return Ok(None),
                Err(e) => return Err(e),
            };

            set.train.extend(self.samples(round.train)?);
            set.val.extend(self.samples(round.val)?);
        }

        Ok(Some(set))
    }

    /// Moves to `Training` if collection is complete and every round is available.
    ///
    /// # Returns
    /// The training set to fit, `None` if the orchestrator keeps collecting.
    ///
    /// # Errors
    /// `TrainingAborted` if the stored rounds can't be used.
    pub async fn begin_training(&self, elapsed_ms: u64) -> Result<Option<TrainingSet>> {
        if self.phase() != Phase::Collecting || !self.collection_complete(elapsed_ms) {
            return Ok(None);
        }

        let set = match self.gather().await {
            Ok(Some(set)) => set,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.set_phase(Phase::Aborted);
                return Err(GazeError::TrainingAborted(Box::new(e)));
            }
        };

        info!(
            "collected {} rounds: {} train, {} validation samples",
            self.rounds,
            set.train.len(),
            set.val.len()
        );
        self.set_phase(Phase::Training);
        Ok(Some(set))
    }

    /// Fits `model` on a blocking thread and moves to `Ready`, or to `Aborted` on failure.
    pub async fn train(
        &self,
        model: Arc<Mutex<GazeModel>>,
        set: TrainingSet,
    ) -> Result<TrainingReport> {
        let task = tokio::task::spawn_blocking(move || model.lock().fit(&set.train, &set.val));

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(GazeError::TrainingAborted(Box::new(GazeError::Io(
                io::Error::other(e),
            )))),
        };

        match &result {
            Ok(_) => self.set_phase(Phase::Ready),
            Err(e) => {
                warn!("{e}");
                self.set_phase(Phase::Aborted);
            }
        }

        result
    }

    /// Runs one orchestration check: gathers and trains once collection is complete.
    ///
    /// # Returns
    /// The phase after the check.
    pub async fn advance(&self, elapsed_ms: u64, model: &Arc<Mutex<GazeModel>>) -> Result<Phase> {
        if let Some(set) = self.begin_training(elapsed_ms).await? {
            self.train(model.clone(), set).await?;
        }

        Ok(self.phase())
    }

    /// Goes back to `Collecting`.
    pub fn reset(&self) {
        self.set_phase(Phase::Collecting);
    }

    fn set_phase(&self, phase: Phase) {
        let prev = self.phase.send_replace(phase);
        if prev != phase {
            info!("phase {prev} -> {phase}");
        }
    }

    fn samples(&self, record: RoundRecord) -> Result<Vec<Sample>> {
        if record.schema != self.input {
            return Err(GazeError::SchemaMismatch {
                expected: self.input.len(),
                got: record.schema.len(),
            });
        }

        record.into_samples()
    }
}

use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    Result,
    collector::{ClosedRound, SampleCollector, ScreenPoint, Viewport},
    config::SessionConfig,
    features::{InputCapture, InputSchema, Snapshot},
    landmarks::{FaceSelector, FrameSource, LandmarkSource},
    model::GazeModel,
    orchestrator::{Phase, TrainingOrchestrator},
    store::RoundStore,
};

/// Supplies the stimulus position the subject is looking at.
pub trait TargetProvider: Send + Sync {
    /// The current target, `None` while no stimulus is shown.
    fn target(&self) -> Option<ScreenPoint>;

    fn viewport(&self) -> Viewport;
}

/// A `TargetProvider` the presentation layer writes into.
#[derive(Debug)]
pub struct SharedTarget {
    inner: RwLock<(Option<ScreenPoint>, Viewport)>,
}

impl SharedTarget {
    /// Creates a new `SharedTarget` without a target.
    ///
    /// # Errors
    /// `InvalidConfig` if the viewport has an empty or non finite dimension.
    pub fn new(viewport: Viewport) -> Result<Self> {
        viewport.validate()?;

        Ok(Self {
            inner: RwLock::new((None, viewport)),
        })
    }

    pub fn set_target(&self, target: Option<ScreenPoint>) {
        self.inner.write().0 = target;
    }

    pub fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        viewport.validate()?;
        self.inner.write().1 = viewport;
        Ok(())
    }
}

impl TargetProvider for SharedTarget {
    fn target(&self) -> Option<ScreenPoint> {
        self.inner.read().0
    }

    fn viewport(&self) -> Viewport {
        self.inner.read().1
    }
}

/// The external collaborators a session runs against.
pub struct Sources {
    pub frames: Box<dyn FrameSource>,
    pub landmarks: Arc<dyn LandmarkSource>,
    pub target: Arc<dyn TargetProvider>,
}

/// A gaze estimate published by the prediction task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub frame_index: u64,
    pub normalized: [f32; 2],
    pub point: ScreenPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: Phase,
    pub elapsed_ms: u64,
    pub round: u64,
    pub buffered_train: usize,
    pub buffered_val: usize,
}

#[derive(Debug)]
struct RoundEvent {
    round: ClosedRound,
    elapsed_ms: u64,
}

/// A running gaze session.
///
/// Four tasks run in the background: detection publishes the latest face into a single slot
/// mailbox, sampling records a sample every tick while collecting, coordination persists closed
/// rounds and trains the model, and prediction publishes gaze estimates once the model is ready.
pub struct Session {
    cancel: CancellationToken,
    source_done: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    phase: watch::Receiver<Phase>,
    predictions: watch::Receiver<Option<Prediction>>,
    collector: Arc<Mutex<SampleCollector>>,
    retry: mpsc::Sender<()>,
}

impl Session {
    /// Validates `config` and spawns the session tasks on the current runtime.
    pub fn start(config: SessionConfig, sources: Sources) -> Result<Self> {
        config.validate()?;

        let Sources {
            frames,
            landmarks,
            target,
        } = sources;

        let cancel = CancellationToken::new();
        let source_done = CancellationToken::new();
        let (mailbox_tx, mailbox_rx) = watch::channel(None);
        let (predictions_tx, predictions_rx) = watch::channel(None);
        let (rounds_tx, rounds_rx) = mpsc::channel(8);
        let (retry_tx, retry_rx) = mpsc::channel(1);

        let collector = Arc::new(Mutex::new(SampleCollector::new(
            config.sample_interval_ms,
            config.round_ms,
            config.train_ratio,
            config.seed,
        )));

        let model = GazeModel::new(config.input, config.training, config.seed);
        let interrupt = model.interrupt_handle();
        let model = Arc::new(Mutex::new(model));

        let store = RoundStore::new(config.store.open(), config.key_prefix.clone());
        let orchestrator =
            TrainingOrchestrator::new(store.clone(), config.input, config.rounds, config.round_ms);
        let phase = orchestrator.subscribe();
        let capture = InputCapture::new(config.input);

        let detection = Detection {
            frames,
            landmarks,
            selector: FaceSelector::default(),
            mailbox: mailbox_tx,
            cancel: cancel.clone(),
            done: source_done.clone(),
        };

        let sampler = Sampler {
            interval: Duration::from_millis(config.sample_interval_ms),
            capture,
            mailbox: mailbox_rx.clone(),
            target: target.clone(),
            phase: phase.clone(),
            collector: collector.clone(),
            rounds: rounds_tx,
            cancel: cancel.clone(),
        };

        let coordinator = Coordinator {
            store,
            input: config.input,
            orchestrator,
            model: model.clone(),
            interrupt,
            collector: collector.clone(),
            rounds: rounds_rx,
            retry: retry_rx,
            cancel: cancel.clone(),
        };

        let predictor = Predictor {
            interval: Duration::from_millis(config.predict_interval_ms),
            capture,
            mailbox: mailbox_rx,
            target,
            phase: phase.clone(),
            model,
            predictions: predictions_tx,
            cancel: cancel.clone(),
        };

        let tasks = vec![
            tokio::spawn(detection.run()),
            tokio::spawn(sampler.run()),
            tokio::spawn(coordinator.run()),
            tokio::spawn(predictor.run()),
        ];

        info!(
            "session started: input={:?} rounds={} round_ms={}",
            config.input, config.rounds, config.round_ms
        );

        Ok(Self {
            cancel,
            source_done,
            tasks,
            phase,
            predictions: predictions_rx,
            collector,
            retry: retry_tx,
        })
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Returns a receiver notified on every phase change.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Returns a receiver holding the latest prediction.
    pub fn predictions(&self) -> watch::Receiver<Option<Prediction>> {
        self.predictions.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let collector = self.collector.lock();
        let (buffered_train, buffered_val) = collector.buffered();

        SessionStatus {
            phase: self.phase(),
            elapsed_ms: collector.elapsed_ms(),
            round: collector.current_round(),
            buffered_train,
            buffered_val,
        }
    }

    /// Restarts data collection from round `0` after an aborted training.
    ///
    /// # Returns
    /// Whether the request was queued, it's ignored unless the session is `Aborted`.
    pub fn retry(&self) -> bool {
        if self.phase() != Phase::Aborted {
            debug!("ignoring retry in phase {}", self.phase());
            return false;
        }

        self.retry.try_send(()).is_ok()
    }

    /// Waits until the frame source is exhausted or fails.
    pub async fn source_finished(&self) {
        self.source_done.cancelled().await
    }

    /// Stops every task, waiting for pending round flushes. A training in flight is interrupted
    /// before its next epoch.
    pub async fn stop(mut self) {
        self.cancel.cancel();

        for res in join_all(mem::take(&mut self.tasks)).await {
            if let Err(e) = res {
                warn!("session task failed: {e}");
            }
        }

        let (train, val) = self.collector.lock().buffered();
        if train + val > 0 {
            warn!("discarding {} samples of the open round", train + val);
        }

        info!("session stopped in phase {}", self.phase());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Detection {
    frames: Box<dyn FrameSource>,
    landmarks: Arc<dyn LandmarkSource>,
    selector: FaceSelector,
    mailbox: watch::Sender<Option<Snapshot>>,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl Detection {
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = self.frames.next_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("frame source exhausted");
                    break;
                }
                Err(e) => {
                    warn!("frame source failed: {e}");
                    break;
                }
            };

            let faces = match self.landmarks.detect(&frame).await {
                Ok(faces) => faces,
                Err(e) => {
                    debug!("landmark detection failed on frame {}: {e}", frame.index);
                    Vec::new()
                }
            };

            let snapshot = self.selector.select(faces).map(|face| Snapshot { frame, face });
            self.mailbox.send_replace(snapshot);
            tokio::task::yield_now().await;
        }

        // Releases the camera before anyone waiting on the source is woken up.
        drop(self.frames);
        self.mailbox.send_replace(None);
        self.done.cancel();
    }
}

/// Captures the model input and normalized target of the latest snapshot.
fn capture_sample(
    capture: &InputCapture,
    mailbox: &watch::Receiver<Option<Snapshot>>,
    target: &dyn TargetProvider,
) -> Option<(Vec<f32>, [f32; 2])> {
    let snapshot = mailbox.borrow().clone()?;
    let point = target.target()?;

    match capture.capture(&snapshot) {
        Ok(input) => Some((input, target.viewport().normalize(point))),
        Err(e) => {
            debug!("skipping tick: {e}");
            None
        }
    }
}

fn ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

struct Sampler {
    interval: Duration,
    capture: InputCapture,
    mailbox: watch::Receiver<Option<Snapshot>>,
    target: Arc<dyn TargetProvider>,
    phase: watch::Receiver<Phase>,
    collector: Arc<Mutex<SampleCollector>>,
    rounds: mpsc::Sender<RoundEvent>,
    cancel: CancellationToken,
}

impl Sampler {
    async fn run(self) {
        let mut ticker = ticker(self.interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if *self.phase.borrow() != Phase::Collecting {
                continue;
            }

            let capture = capture_sample(&self.capture, &self.mailbox, self.target.as_ref());
            let (closed, elapsed_ms) = {
                let mut collector = self.collector.lock();
                let closed = collector.tick(capture);
                (closed, collector.elapsed_ms())
            };

            let Some(round) = closed else {
                continue;
            };

            let event = RoundEvent { round, elapsed_ms };
            if let Err(e) = self.rounds.send(event).await {
                warn!("dropping round {}: the coordinator is gone", e.0.round.index);
                break;
            }
        }
    }
}

struct Coordinator {
    store: RoundStore,
    input: InputSchema,
    orchestrator: TrainingOrchestrator,
    model: Arc<Mutex<GazeModel>>,
    interrupt: Arc<AtomicBool>,
    collector: Arc<Mutex<SampleCollector>>,
    rounds: mpsc::Receiver<RoundEvent>,
    retry: mpsc::Receiver<()>,
    cancel: CancellationToken,
}

impl Coordinator {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(()) = self.retry.recv() => self.restart(),
                event = self.rounds.recv() => {
                    let Some(event) = event else { break };
                    self.persist(&event.round).await;

                    let advance = self.orchestrator.advance(event.elapsed_ms, &self.model);
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            warn!("session stopped during training, interrupting it");
                            self.interrupt.store(true, Ordering::Relaxed);
                            break;
                        }
                        res = advance => {
                            if let Err(e) = res {
                                warn!("{e}");
                            }
                        }
                    }
                }
            }
        }

        // Rounds closed before the sampler stopped are still written, the channel ends once the
        // sampler is gone.
        while let Some(event) = self.rounds.recv().await {
            self.persist(&event.round).await;
        }
    }

    async fn persist(&self, round: &ClosedRound) {
        let ClosedRound { index, train, val } = round;

        if let Err(e) = self.store.flush(*index, self.input, train, val).await {
            warn!("dropping round {index}: {e}");
        }
    }

    fn restart(&mut self) {
        if self.orchestrator.phase() != Phase::Aborted {
            return;
        }

        let dropped = self.collector.lock().reset();
        self.model.lock().reset();
        self.orchestrator.reset();
        info!("restarting collection from round 0, {dropped} buffered samples dropped");
    }
}

struct Predictor {
    interval: Duration,
    capture: InputCapture,
    mailbox: watch::Receiver<Option<Snapshot>>,
    target: Arc<dyn TargetProvider>,
    phase: watch::Receiver<Phase>,
    model: Arc<Mutex<GazeModel>>,
    predictions: watch::Sender<Option<Prediction>>,
    cancel: CancellationToken,
}

impl Predictor {
    async fn run(self) {
        let mut ticker = ticker(self.interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if *self.phase.borrow() != Phase::Ready {
                continue;
            }

            let Some(snapshot) = self.mailbox.borrow().clone() else {
                continue;
            };

            let normalized = match self
                .capture
                .capture(&snapshot)
                .and_then(|input| self.model.lock().predict(&input))
            {
                Ok(normalized) => normalized,
                Err(e) => {
                    debug!("skipping prediction: {e}");
                    continue;
                }
            };

            let prediction = Prediction {
                frame_index: snapshot.frame.index,
                normalized,
                point: self.target.viewport().denormalize(normalized),
            };

            debug!("prediction at {:?}", prediction.point);
            self.predictions.send_replace(Some(prediction));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_targets_reject_empty_viewports() {
        let viewport = Viewport {
            width: 0.,
            height: 600.,
        };
        assert!(SharedTarget::new(viewport).is_err());

        let target = SharedTarget::new(Viewport {
            width: 800.,
            height: 600.,
        })
        .unwrap();
        assert!(target.set_viewport(viewport).is_err());
        assert_eq!(target.viewport().width, 800.);

        target.set_target(Some(ScreenPoint { x: 1., y: 2. }));
        assert_eq!(target.target(), Some(ScreenPoint { x: 1., y: 2. }));
    }
}

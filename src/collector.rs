use std::mem;

use log::debug;
use ndarray::Array4;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{GazeError, Result};

/// Maps a pixel coordinate to `[-1, 1]`.
pub fn normalize(pixel: f32, dim: f32) -> f32 {
    (pixel / dim) * 2. - 1.
}

/// Maps a `[-1, 1]` coordinate back to pixels.
pub fn denormalize(value: f32, dim: f32) -> f32 {
    ((value + 1.) / 2.) * dim
}

/// Normalizes raw channel-last pixels to `(pixel / 127) - 1` and prefixes a batch axis.
pub fn normalize_pixels(
    pixels: &[u8],
    height: usize,
    width: usize,
    channels: usize,
) -> Result<Array4<f32>> {
    let expected = height * width * channels;
    if pixels.len() != expected {
        return Err(GazeError::InvalidFrame(format!(
            "got {} pixel values, expected {expected}",
            pixels.len()
        )));
    }

    let values = pixels.iter().map(|&p| p as f32 / 127. - 1.).collect();
    Array4::from_shape_vec((1, height, width, channels), values)
        .map_err(|e| GazeError::InvalidFrame(e.to_string()))
}

/// The size of the screen the stimulus is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// A position on screen, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl Viewport {
    /// Creates a new `Viewport`, rejecting empty or non finite dimensions.
    pub fn new(width: f32, height: f32) -> Result<Self> {
        let viewport = Self { width, height };
        viewport.validate()?;
        Ok(viewport)
    }

    pub fn validate(&self) -> Result<()> {
        let valid = |d: f32| d.is_finite() && d > 0.;
        if !valid(self.width) || !valid(self.height) {
            return Err(GazeError::InvalidConfig(format!(
                "invalid {}x{} viewport",
                self.width, self.height
            )));
        }

        Ok(())
    }

    pub fn normalize(&self, p: ScreenPoint) -> [f32; 2] {
        [normalize(p.x, self.width), normalize(p.y, self.height)]
    }

    pub fn denormalize(&self, v: [f32; 2]) -> ScreenPoint {
        ScreenPoint {
            x: denormalize(v[0], self.width),
            y: denormalize(v[1], self.height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Validation,
}

/// A model input paired with the normalized on-screen target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub input: Vec<f32>,
    pub target: [f32; 2],
}

/// The samples of a round that was just closed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClosedRound {
    pub index: u64,
    pub train: Vec<Sample>,
    pub val: Vec<Sample>,
}

/// Detects round boundaries from the elapsed time.
///
/// A boundary `k` fires the first time `elapsed / round_ms` reaches `k` and never again.
#[derive(Debug, Clone)]
pub struct RoundClock {
    round_ms: u64,
    last: Option<u64>,
}

impl RoundClock {
    pub fn new(round_ms: u64) -> Self {
        Self {
            round_ms: round_ms.max(1),
            last: None,
        }
    }

    /// A clock that already saw boundary `0`.
    pub fn started(round_ms: u64) -> Self {
        let mut clock = Self::new(round_ms);
        clock.check(0);
        clock
    }

    /// Returns the index of the boundary crossed at `elapsed_ms`, if it wasn't seen before.
    pub fn check(&mut self, elapsed_ms: u64) -> Option<u64> {
        let k = elapsed_ms / self.round_ms;
        if self.last.is_some_and(|last| k <= last) {
            return None;
        }

        self.last = Some(k);
        Some(k)
    }

    pub fn round_of(&self, elapsed_ms: u64) -> u64 {
        elapsed_ms / self.round_ms
    }
}

/// Accumulates samples on a fixed tick and cuts them into rounds.
///
/// Each sample is assigned to a partition when it's recorded. A sample recorded at `elapsed`
/// belongs to round `elapsed / round_ms`, and round `k - 1` closes on the tick that brings the
/// elapsed time to `k * round_ms`.
#[derive(Debug)]
pub struct SampleCollector {
    interval_ms: u64,
    train_ratio: f64,
    rng: StdRng,
    elapsed_ms: u64,
    clock: RoundClock,
    train: Vec<Sample>,
    val: Vec<Sample>,
}

impl SampleCollector {
    /// Creates a new `SampleCollector`.
    ///
    /// # Arguments
    /// * `interval_ms` - The tick duration the elapsed time advances by.
    /// * `round_ms` - The duration of a round.
    /// * `train_ratio` - The probability of a sample landing in the train partition.
    /// * `seed` - Seeds the partition draws, `None` uses the OS entropy.
    pub fn new(interval_ms: u64, round_ms: u64, train_ratio: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            interval_ms,
            train_ratio: train_ratio.clamp(0., 1.),
            rng,
            elapsed_ms: 0,
            clock: RoundClock::started(round_ms),
            train: Vec::new(),
            val: Vec::new(),
        }
    }

    /// Records one tick.
    ///
    /// If `capture` is `None` the tick is skipped entirely: nothing is recorded and the elapsed
    /// time doesn't advance.
    ///
    /// # Arguments
    /// * `capture` - The current model input and normalized target.
    ///
    /// # Returns
    /// The round closed by the boundary this tick reached, if any.
    pub fn tick(&mut self, capture: Option<(Vec<f32>, [f32; 2])>) -> Option<ClosedRound> {
        let (input, target) = capture?;

        let partition = self.draw_partition();
        let sample = Sample { input, target };

        match partition {
            Partition::Train => self.train.push(sample),
            Partition::Validation => self.val.push(sample),
        }

        self.elapsed_ms += self.interval_ms;
        self.check_boundary()
    }

    /// Runs the boundary check at the current elapsed time, flushing the buffers when a new
    /// boundary is crossed. Boundary `0` only clears.
    pub fn check_boundary(&mut self) -> Option<ClosedRound> {
        let k = self.clock.check(self.elapsed_ms)?;
        let train = mem::take(&mut self.train);
        let val = mem::take(&mut self.val);

        if k == 0 {
            return None;
        }

        debug!(
            "closing round {} with {} train and {} validation samples",
            k - 1,
            train.len(),
            val.len()
        );

        Some(ClosedRound {
            index: k - 1,
            train,
            val,
        })
    }

    /// Draws a partition with `P(train) = train_ratio`.
    pub fn draw_partition(&mut self) -> Partition {
        if self.rng.random_bool(self.train_ratio) {
            Partition::Train
        } else {
            Partition::Validation
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// The round the next sample will be recorded in.
    pub fn current_round(&self) -> u64 {
        self.clock.round_of(self.elapsed_ms)
    }

    /// Returns the amount of buffered train and validation samples.
    pub fn buffered(&self) -> (usize, usize) {
        (self.train.len(), self.val.len())
    }

    /// Drops every buffered sample and restarts the elapsed time.
    ///
    /// # Returns
    /// The amount of samples dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.train.len() + self.val.len();
        self.train.clear();
        self.val.clear();
        self.elapsed_ms = 0;
        self.clock = RoundClock::started(self.clock.round_ms);
        dropped
    }
}

//! Eye gaze estimation: landmark features, timed sample collection, round storage and a
//! regression model trained once enough rounds were recorded.

pub mod collector;
pub mod config;
pub mod error;
pub mod features;
pub mod landmarks;
pub mod model;
pub mod orchestrator;
pub mod replay;
pub mod session;
pub mod store;

pub use error::{GazeError, Result};

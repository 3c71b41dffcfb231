mod builder;
mod model_trainer;
mod trainer;

pub use builder::TrainerBuilder;
pub use model_trainer::ModelTrainer;
pub use trainer::{EpochStats, Trainer};

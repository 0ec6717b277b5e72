/// Training state bootstrap and checkpointing

pub mod checkpoint;
pub mod checkpointer;
pub mod ema;
pub mod optimizer;
pub mod schedule;
pub mod state;

pub use checkpoint::{BestMode, CheckpointManager, CheckpointManagerOptions, Metrics};
pub use checkpointer::{load_model_config, Checkpointer, CONFIG_FILE_NAME};
pub use ema::EmaConfig;
pub use optimizer::{AdamConfig, ClipByGlobalNorm, Optimizer, OptimizerState};
pub use schedule::LearningRateSchedule;
pub use state::{create_train_state, Model, StateSnapshot, TrainState};

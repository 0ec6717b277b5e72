//! Training-state bootstrap and checkpointing for diffusion transformer runs
//!
//! Two entry points cover the lifetime of a run:
//! - [`create_train_state`]: initialize parameters, their EMA shadow copy and
//!   the optimizer (learning-rate schedule, optional global-norm clipping).
//! - [`Checkpointer`]: persist the state keyed by epoch, keep the best-N
//!   checkpoints by validation loss and restore the best one.
//!
//! # Example
//!
//! ```ignore
//! use dit_train::{create_train_state, Checkpointer, CheckpointConfig, OptimizerConfig};
//!
//! let mut state = create_train_state(42, model, &batch, &OptimizerConfig::default())?;
//! let mut checkpointer = Checkpointer::new("runs/mnist", &CheckpointConfig::default(), &model_config)?;
//!
//! for epoch in 1..=num_epochs {
//!     // ... state.apply_gradients(&grads)?; state.update_ema(0.999)?;
//!     checkpointer.save(epoch, &state, &metrics)?;
//! }
//! let best = checkpointer.restore()?;
//! ```

pub mod config;
pub mod rng;
pub mod training;
pub mod tree;

use std::path::PathBuf;

// Re-export commonly used items
pub use config::{CheckpointConfig, OptimizerConfig, OptimizerParams};
pub use rng::{InitRngs, PrngKey};
pub use training::{
    create_train_state, CheckpointManager, Checkpointer, LearningRateSchedule, Model,
    StateSnapshot, TrainState,
};
pub use tree::ParamTree;

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("No checkpoint has been saved in {}", .0.display())]
    NoCheckpoint(PathBuf),

    #[error("Parameter tree mismatch: {0}")]
    StructureMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
}

pub type Result<T> = std::result::Result<T, TrainError>;

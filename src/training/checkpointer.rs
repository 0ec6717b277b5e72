/// Run-level checkpointing: best-N by validation loss plus the model config
///
/// The output directory holds the model configuration next to the step
/// directories managed by [`CheckpointManager`]:
///
/// ```text
/// {output_dir}/config.pkl      bincode dump of the model configuration
/// {output_dir}/{epoch}/...     one checkpoint per saved epoch
/// ```
use std::path::{Path, PathBuf};

use candle_core::Device;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CheckpointConfig;
use crate::TrainError;

use super::checkpoint::{BestMode, CheckpointManager, CheckpointManagerOptions, Metrics};
use super::state::{Model, StateSnapshot, TrainState};

/// File the model configuration is written to
pub const CONFIG_FILE_NAME: &str = "config.pkl";

/// Metric that ranks checkpoints (lower is better)
pub const BEST_METRIC: &str = "val_loss";

/// Checkpointing for one training run
pub struct Checkpointer {
    manager: CheckpointManager,
    device: Device,
}

impl Checkpointer {
    /// Create the output directory, write the model config and open the
    /// checkpoint manager
    ///
    /// # Arguments
    /// * `output_dir` - Run directory, created if absent
    /// * `config` - Retention and save-interval settings
    /// * `model_config` - Written to `config.pkl` so the model can be rebuilt
    ///   for inference
    pub fn new<P, C>(output_dir: P, config: &CheckpointConfig, model_config: &C) -> crate::Result<Self>
    where
        P: AsRef<Path>,
        C: Serialize + ?Sized,
    {
        config.validate()?;
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let config_path = output_dir.join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, bincode::serialize(model_config)?)?;
        log::debug!("Wrote model config to {}", config_path.display());

        let options = CheckpointManagerOptions {
            max_to_keep: config.max_to_keep,
            save_interval_steps: config.save_interval_steps,
            create: true,
            best_metric: Some(BEST_METRIC.to_string()),
            best_mode: BestMode::Min,
        };
        let manager = CheckpointManager::new(output_dir, options)?;

        Ok(Self {
            manager,
            device: Device::Cpu,
        })
    }

    /// Device restored tensors are placed on (CPU by default)
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn manager(&self) -> &CheckpointManager {
        &self.manager
    }

    /// Save `state` for `epoch`
    ///
    /// Skipped silently when the epoch is off the save interval; may delete
    /// older checkpoints beyond `max_to_keep`.
    pub fn save<M: Model>(&mut self, epoch: usize, state: &TrainState<M>, metrics: &Metrics) -> crate::Result<()> {
        self.save_snapshot(epoch, &state.snapshot(), metrics)
    }

    pub fn save_snapshot(&mut self, epoch: usize, snapshot: &StateSnapshot, metrics: &Metrics) -> crate::Result<()> {
        self.manager.save(epoch, snapshot, metrics)?;
        Ok(())
    }

    /// Load the checkpoint with the lowest validation loss
    pub fn restore(&self) -> crate::Result<StateSnapshot> {
        self.manager.restore_best(&self.device)
    }

    /// Restore the best checkpoint into a live state
    pub fn restore_into<M: Model>(&self, state: &mut TrainState<M>) -> crate::Result<()> {
        state.restore(self.restore()?)
    }

    /// Directory of the best checkpoint, without loading it
    pub fn path_to_best(&self) -> crate::Result<PathBuf> {
        let step = self
            .manager
            .best_step()
            .ok_or_else(|| TrainError::NoCheckpoint(self.manager.directory().to_path_buf()))?;
        Ok(self.manager.step_directory(step))
    }
}

/// Read back the model configuration written by [`Checkpointer::new`]
pub fn load_model_config<C: DeserializeOwned, P: AsRef<Path>>(output_dir: P) -> crate::Result<C> {
    let data = std::fs::read(output_dir.as_ref().join(CONFIG_FILE_NAME))?;
    Ok(bincode::deserialize(&data)?)
}

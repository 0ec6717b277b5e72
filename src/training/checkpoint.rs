/// Step-keyed checkpoint manager with best-N retention
///
/// Layout under the manager directory:
///
/// ```text
/// {dir}/{step}/state.safetensors   params, ema_params, opt_state.mu, opt_state.nu
/// {dir}/{step}/metadata.json       step counters and metrics
/// ```
///
/// A checkpoint is written to `{dir}/{step}.tmp` and renamed into place once
/// complete, so a step directory either holds a full checkpoint or does not
/// exist. Leftover `.tmp` directories from an interrupted save are removed
/// when a manager is opened.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Device;

use crate::tree::ParamTree;
use crate::TrainError;

use super::optimizer::OptimizerState;
use super::state::StateSnapshot;

/// Metrics recorded with a checkpoint, e.g. `{"val_loss": 0.42}`
pub type Metrics = BTreeMap<String, f64>;

const STATE_FILE: &str = "state.safetensors";
const METADATA_FILE: &str = "metadata.json";
const TMP_SUFFIX: &str = ".tmp";
const FORMAT_KEY: &str = "format";
const FORMAT_VALUE: &str = "dit-train-state-v1";

/// Whether a lower or a higher metric is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BestMode {
    Min,
    Max,
}

/// Checkpoint manager configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointManagerOptions {
    /// Number of checkpoints to retain. `None` keeps all of them.
    pub max_to_keep: Option<usize>,
    /// Save only steps that are a multiple of this (the first save always
    /// goes through)
    pub save_interval_steps: usize,
    /// Create the directory if it does not exist
    pub create: bool,
    /// Metric that ranks checkpoints. Without one, retention keeps the
    /// newest checkpoints.
    pub best_metric: Option<String>,
    pub best_mode: BestMode,
}

impl Default for CheckpointManagerOptions {
    fn default() -> Self {
        Self {
            max_to_keep: None,
            save_interval_steps: 1,
            create: true,
            best_metric: None,
            best_mode: BestMode::Min,
        }
    }
}

/// On-disk metadata. Non-finite metrics are stored as `null`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CheckpointMetadata {
    step: usize,
    train_step: usize,
    optimizer_count: usize,
    metrics: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone)]
struct CheckpointInfo {
    step: usize,
    metrics: Metrics,
}

/// Saves, restores and garbage-collects checkpoints in one directory
pub struct CheckpointManager {
    directory: PathBuf,
    options: CheckpointManagerOptions,
    /// Retained checkpoints, ascending by step
    checkpoints: Vec<CheckpointInfo>,
}

impl CheckpointManager {
    /// Open a manager over `directory`, picking up checkpoints already there
    pub fn new<P: AsRef<Path>>(directory: P, options: CheckpointManagerOptions) -> crate::Result<Self> {
        if options.save_interval_steps == 0 {
            return Err(TrainError::Config(
                "save_interval_steps must be > 0".to_string(),
            ));
        }
        if options.max_to_keep == Some(0) {
            return Err(TrainError::Config("max_to_keep must be > 0".to_string()));
        }

        let directory = directory.as_ref().to_path_buf();
        if !directory.exists() {
            if !options.create {
                return Err(TrainError::Checkpoint(format!(
                    "checkpoint directory {} does not exist",
                    directory.display()
                )));
            }
            fs::create_dir_all(&directory)?;
        }

        let checkpoints = scan_directory(&directory)?;
        if !checkpoints.is_empty() {
            log::info!(
                "Found {} existing checkpoints in {} (latest step {})",
                checkpoints.len(),
                directory.display(),
                checkpoints[checkpoints.len() - 1].step
            );
        }

        let mut manager = Self {
            directory,
            options,
            checkpoints,
        };
        manager.remove_old_checkpoints()?;
        Ok(manager)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn options(&self) -> &CheckpointManagerOptions {
        &self.options
    }

    /// Directory a checkpoint for `step` lives in
    pub fn step_directory(&self, step: usize) -> PathBuf {
        self.directory.join(step.to_string())
    }

    /// Retained steps, ascending
    pub fn all_steps(&self) -> Vec<usize> {
        self.checkpoints.iter().map(|c| c.step).collect()
    }

    pub fn latest_step(&self) -> Option<usize> {
        self.checkpoints.last().map(|c| c.step)
    }

    /// Metrics saved with `step`, if it is retained
    pub fn metrics(&self, step: usize) -> Option<&Metrics> {
        self.checkpoints
            .iter()
            .find(|c| c.step == step)
            .map(|c| &c.metrics)
    }

    /// Whether a save at `step` would be written
    pub fn should_save(&self, step: usize) -> bool {
        match self.latest_step() {
            Some(latest) if step <= latest => false,
            None => true,
            Some(_) => step % self.options.save_interval_steps == 0,
        }
    }

    /// Step of the best retained checkpoint
    ///
    /// Checkpoints whose metric is missing or not finite never win. Falls
    /// back to the latest step when nothing is ranked. Ties go to the
    /// earlier step.
    pub fn best_step(&self) -> Option<usize> {
        if self.options.best_metric.is_none() {
            return self.latest_step();
        }

        let mut best: Option<(usize, f64)> = None;
        for checkpoint in &self.checkpoints {
            if let Some(value) = self.metric_value(checkpoint) {
                match best {
                    Some((_, best_value)) if !self.is_better(value, best_value) => {}
                    _ => best = Some((checkpoint.step, value)),
                }
            }
        }

        best.map(|(step, _)| step).or_else(|| self.latest_step())
    }

    /// Save a checkpoint for `step`
    ///
    /// # Returns
    /// `true` if the checkpoint was written, `false` if the save interval or
    /// an existing newer checkpoint skipped it
    pub fn save(&mut self, step: usize, snapshot: &StateSnapshot, metrics: &Metrics) -> crate::Result<bool> {
        if !self.should_save(step) {
            log::debug!("Skipping checkpoint for step {}", step);
            return Ok(false);
        }
        snapshot.validate()?;

        if let Some(name) = &self.options.best_metric {
            match metrics.get(name) {
                Some(value) if value.is_finite() => {}
                Some(value) => log::warn!("Metric '{}' at step {} is {}; it will not rank", name, step, value),
                None => log::warn!("Metric '{}' missing at step {}; it will not rank", name, step),
            }
        }

        let final_dir = self.step_directory(step);
        let tmp_dir = self.directory.join(format!("{}{}", step, TMP_SUFFIX));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        write_state(&tmp_dir.join(STATE_FILE), step, snapshot)?;

        let metadata = CheckpointMetadata {
            step,
            train_step: snapshot.step,
            optimizer_count: snapshot.opt_state.count,
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.clone(), v.is_finite().then_some(*v)))
                .collect(),
        };
        fs::write(
            tmp_dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        if final_dir.exists() {
            // Untracked leftover, e.g. a directory without metadata
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tmp_dir, &final_dir)?;

        log::info!("Saved checkpoint for step {} to {}", step, final_dir.display());

        self.checkpoints.push(CheckpointInfo {
            step,
            metrics: metrics.clone(),
        });
        self.remove_old_checkpoints()?;

        Ok(true)
    }

    /// Load the checkpoint saved at `step`
    pub fn restore(&self, step: usize, device: &Device) -> crate::Result<StateSnapshot> {
        if !self.checkpoints.iter().any(|c| c.step == step) {
            return Err(TrainError::Checkpoint(format!(
                "no checkpoint for step {} in {}",
                step,
                self.directory.display()
            )));
        }

        let dir = self.step_directory(step);
        let metadata = read_metadata(&dir)?;
        let tensors = read_state(&dir.join(STATE_FILE), device)?;

        let snapshot = StateSnapshot {
            step: metadata.train_step,
            params: ParamTree::from_prefixed(tensors.iter(), "params"),
            ema_params: ParamTree::from_prefixed(tensors.iter(), "ema_params"),
            opt_state: OptimizerState {
                count: metadata.optimizer_count,
                mu: ParamTree::from_prefixed(tensors.iter(), "opt_state.mu"),
                nu: ParamTree::from_prefixed(tensors.iter(), "opt_state.nu"),
            },
        };
        snapshot.validate()?;

        log::info!("Restored checkpoint for step {} from {}", step, dir.display());
        Ok(snapshot)
    }

    /// Load the best checkpoint
    pub fn restore_best(&self, device: &Device) -> crate::Result<StateSnapshot> {
        let step = self
            .best_step()
            .ok_or_else(|| TrainError::NoCheckpoint(self.directory.clone()))?;
        self.restore(step, device)
    }

    fn metric_value(&self, checkpoint: &CheckpointInfo) -> Option<f64> {
        let name = self.options.best_metric.as_ref()?;
        checkpoint
            .metrics
            .get(name)
            .copied()
            .filter(|v| v.is_finite())
    }

    fn is_better(&self, a: f64, b: f64) -> bool {
        match self.options.best_mode {
            BestMode::Min => a < b,
            BestMode::Max => a > b,
        }
    }

    /// Index of the checkpoint retention drops next
    fn least_valuable(&self) -> Option<usize> {
        if self.options.best_metric.is_none() {
            return (!self.checkpoints.is_empty()).then_some(0);
        }

        // Unranked checkpoints go first, oldest first
        if let Some(index) = self
            .checkpoints
            .iter()
            .position(|c| self.metric_value(c).is_none())
        {
            return Some(index);
        }

        // Then the worst metric; among equals the newest goes
        let mut worst: Option<(usize, f64)> = None;
        for (index, checkpoint) in self.checkpoints.iter().enumerate() {
            if let Some(value) = self.metric_value(checkpoint) {
                match worst {
                    Some((_, worst_value)) if self.is_better(value, worst_value) => {}
                    _ => worst = Some((index, value)),
                }
            }
        }
        worst.map(|(index, _)| index)
    }

    fn remove_old_checkpoints(&mut self) -> crate::Result<()> {
        let Some(max_to_keep) = self.options.max_to_keep else {
            return Ok(());
        };

        while self.checkpoints.len() > max_to_keep {
            let Some(index) = self.least_valuable() else {
                break;
            };
            let removed = self.checkpoints.remove(index);
            let dir = self.step_directory(removed.step);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            log::info!("Removed checkpoint for step {}", removed.step);
        }

        Ok(())
    }
}

fn scan_directory(directory: &Path) -> crate::Result<Vec<CheckpointInfo>> {
    let mut checkpoints = Vec::new();

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();

        if let Some(stem) = name.strip_suffix(TMP_SUFFIX) {
            // Only directories in the exact shape `save` writes
            if parse_step_name(stem).is_some() {
                log::warn!("Removing incomplete checkpoint {}", entry.path().display());
                fs::remove_dir_all(entry.path())?;
            }
            continue;
        }

        let Some(step) = parse_step_name(&name) else {
            continue;
        };

        let path = entry.path();
        if !path.join(METADATA_FILE).exists() || !path.join(STATE_FILE).exists() {
            log::warn!("Ignoring incomplete checkpoint directory {}", path.display());
            continue;
        }

        let metadata = read_metadata(&path)?;
        if metadata.step != step {
            log::warn!(
                "Ignoring checkpoint directory {}: metadata is for step {}",
                path.display(),
                metadata.step
            );
            continue;
        }
        checkpoints.push(CheckpointInfo {
            step,
            metrics: metadata
                .metrics
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or(f64::NAN)))
                .collect(),
        });
    }

    checkpoints.sort_by_key(|c| c.step);
    Ok(checkpoints)
}

/// Step number for a directory name in canonical form (`"12"`, not `"012"`)
fn parse_step_name(name: &str) -> Option<usize> {
    let step = name.parse::<usize>().ok()?;
    (step.to_string() == name).then_some(step)
}

fn read_metadata(dir: &Path) -> crate::Result<CheckpointMetadata> {
    let data = fs::read(dir.join(METADATA_FILE))?;
    Ok(serde_json::from_slice(&data)?)
}

fn write_state(path: &Path, step: usize, snapshot: &StateSnapshot) -> crate::Result<()> {
    let tensors: Vec<_> = snapshot
        .params
        .prefixed("params")
        .chain(snapshot.ema_params.prefixed("ema_params"))
        .chain(snapshot.opt_state.mu.prefixed("opt_state.mu"))
        .chain(snapshot.opt_state.nu.prefixed("opt_state.nu"))
        .collect();

    let mut info = HashMap::new();
    info.insert(FORMAT_KEY.to_string(), FORMAT_VALUE.to_string());
    info.insert("step".to_string(), step.to_string());

    safetensors::serialize_to_file(tensors, &Some(info), path)?;
    Ok(())
}

fn read_state(path: &Path, device: &Device) -> crate::Result<HashMap<String, candle_core::Tensor>> {
    let data = fs::read(path)?;

    let (_, header) = safetensors::SafeTensors::read_metadata(&data)?;
    let format = header
        .metadata()
        .as_ref()
        .and_then(|info| info.get(FORMAT_KEY))
        .map(String::as_str);
    if format != Some(FORMAT_VALUE) {
        return Err(TrainError::Checkpoint(format!(
            "{} is not a training-state file (format {:?})",
            path.display(),
            format
        )));
    }

    Ok(candle_core::safetensors::load_buffer(&data, device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Tensor};

    fn snapshot(value: f32, device: &Device) -> crate::Result<StateSnapshot> {
        let mut params = ParamTree::new();
        params.insert("dense.weight", Tensor::full(value, (3, 2), device)?);
        params.insert("dense.bias", Tensor::full(-value, 3, device)?);
        Ok(StateSnapshot {
            step: 10,
            ema_params: params.map(|_, t| t * 0.5)?,
            opt_state: OptimizerState {
                count: 10,
                mu: params.zeros_like()?,
                nu: params.map(|_, t| t.ones_like())?,
            },
            params,
        })
    }

    fn val_loss(value: f64) -> Metrics {
        Metrics::from([("val_loss".to_string(), value)])
    }

    fn best_n(max_to_keep: usize) -> CheckpointManagerOptions {
        CheckpointManagerOptions {
            max_to_keep: Some(max_to_keep),
            best_metric: Some("val_loss".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_restore_round_trip() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let mut manager = CheckpointManager::new(dir.path(), best_n(3))?;

        let saved = snapshot(1.5, &device)?;
        assert!(manager.save(1, &saved, &val_loss(0.5))?);

        let restored = manager.restore(1, &device)?;
        assert_eq!(restored.step, 10);
        assert_eq!(restored.opt_state.count, 10);
        assert_eq!(restored.params.max_abs_diff(&saved.params)?, 0.0);
        assert_eq!(restored.ema_params.max_abs_diff(&saved.ema_params)?, 0.0);
        assert_eq!(restored.opt_state.nu.max_abs_diff(&saved.opt_state.nu)?, 0.0);
        assert_eq!(restored.params.leaf("dense.weight")?.dtype(), DType::F32);

        assert!(manager.step_directory(1).join(STATE_FILE).exists());
        assert_eq!(manager.metrics(1), Some(&val_loss(0.5)));

        Ok(())
    }

    #[test]
    fn test_keeps_best_n_by_min_metric() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let mut manager = CheckpointManager::new(dir.path(), best_n(2))?;
        let state = snapshot(1.0, &device)?;

        for (step, loss) in [(1, 0.9), (2, 0.3), (3, 0.7), (4, 0.1), (5, 0.8)] {
            manager.save(step, &state, &val_loss(loss))?;
        }

        assert_eq!(manager.all_steps(), vec![2, 4]);
        assert_eq!(manager.best_step(), Some(4));
        for step in [1, 3, 5] {
            assert!(!manager.step_directory(step).exists());
        }

        Ok(())
    }

    #[test]
    fn test_max_mode() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let options = CheckpointManagerOptions {
            max_to_keep: Some(1),
            best_metric: Some("accuracy".to_string()),
            best_mode: BestMode::Max,
            ..Default::default()
        };
        let mut manager = CheckpointManager::new(dir.path(), options)?;
        let state = snapshot(1.0, &device)?;

        for (step, acc) in [(1, 0.5), (2, 0.9), (3, 0.7)] {
            manager.save(step, &state, &Metrics::from([("accuracy".to_string(), acc)]))?;
        }
        assert_eq!(manager.all_steps(), vec![2]);

        Ok(())
    }

    #[test]
    fn test_save_interval() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let options = CheckpointManagerOptions {
            save_interval_steps: 3,
            ..Default::default()
        };
        let mut manager = CheckpointManager::new(dir.path(), options)?;
        let state = snapshot(1.0, &device)?;

        let written: Vec<bool> = (1..=7)
            .map(|step| manager.save(step, &state, &Metrics::new()))
            .collect::<crate::Result<_>>()?;

        // First save always goes through, then multiples of 3
        assert_eq!(written, vec![true, false, true, false, false, true, false]);
        assert_eq!(manager.all_steps(), vec![1, 3, 6]);

        // Never overwrite or go backwards
        assert!(!manager.save(6, &state, &Metrics::new())?);
        assert!(!manager.save(3, &state, &Metrics::new())?);

        Ok(())
    }

    #[test]
    fn test_unusable_metrics_never_win_and_go_first() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let mut manager = CheckpointManager::new(dir.path(), best_n(2))?;
        let state = snapshot(1.0, &device)?;

        manager.save(1, &state, &val_loss(f64::NAN))?;
        // Nothing ranked yet: fall back to the latest
        assert_eq!(manager.best_step(), Some(1));

        manager.save(2, &state, &val_loss(0.4))?;
        assert_eq!(manager.best_step(), Some(2));

        manager.save(3, &state, &Metrics::new())?;
        manager.save(4, &state, &val_loss(0.6))?;

        // Both unranked checkpoints were dropped before any ranked one
        assert_eq!(manager.all_steps(), vec![2, 4]);
        Ok(())
    }

    #[test]
    fn test_ties_prefer_earlier_step() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let mut manager = CheckpointManager::new(dir.path(), best_n(2))?;
        let state = snapshot(1.0, &device)?;

        for step in 1..=3 {
            manager.save(step, &state, &val_loss(0.5))?;
        }
        assert_eq!(manager.all_steps(), vec![1, 2]);
        assert_eq!(manager.best_step(), Some(1));

        Ok(())
    }

    #[test]
    fn test_keep_newest_without_metric() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let options = CheckpointManagerOptions {
            max_to_keep: Some(2),
            ..Default::default()
        };
        let mut manager = CheckpointManager::new(dir.path(), options)?;
        let state = snapshot(1.0, &device)?;

        for step in 1..=4 {
            manager.save(step, &state, &val_loss(1.0 / step as f64))?;
        }
        assert_eq!(manager.all_steps(), vec![3, 4]);
        assert_eq!(manager.best_step(), Some(4));

        Ok(())
    }

    #[test]
    fn test_reopen_resumes_and_cleans_up() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let state = snapshot(2.0, &device)?;

        {
            let mut manager = CheckpointManager::new(dir.path(), best_n(3))?;
            manager.save(1, &state, &val_loss(0.8))?;
            manager.save(2, &state, &val_loss(f64::NAN))?;
            manager.save(3, &state, &val_loss(0.2))?;
        }

        // Interrupted save and an unrelated directory
        fs::create_dir_all(dir.path().join("4.tmp"))?;
        fs::create_dir_all(dir.path().join("5"))?;

        let mut manager = CheckpointManager::new(dir.path(), best_n(3))?;
        assert_eq!(manager.all_steps(), vec![1, 2, 3]);
        assert_eq!(manager.best_step(), Some(3));
        assert!(manager.metrics(2).and_then(|m| m.get("val_loss")).is_some_and(|v| v.is_nan()));
        assert!(!dir.path().join("4.tmp").exists());

        // Step 5 was never tracked, so saving it replaces the leftover
        assert!(manager.save(5, &state, &val_loss(0.1))?);
        assert_eq!(manager.all_steps(), vec![1, 3, 5]);
        let restored = manager.restore(5, &device)?;
        assert_eq!(restored.params.max_abs_diff(&state.params)?, 0.0);

        Ok(())
    }

    #[test]
    fn test_reopen_keeps_foreign_tmp_directories() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let foreign = dir.path().join("wandb.tmp");
        fs::create_dir_all(&foreign)?;
        fs::write(foreign.join("run.log"), b"step 1")?;
        fs::create_dir_all(dir.path().join("07.tmp"))?;
        fs::create_dir_all(dir.path().join("7.tmp"))?;

        CheckpointManager::new(dir.path(), CheckpointManagerOptions::default())?;

        assert!(foreign.join("run.log").is_file());
        assert!(dir.path().join("07.tmp").exists());
        assert!(!dir.path().join("7.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_non_canonical_step_directories_are_ignored() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let state = snapshot(1.0, &device)?;

        {
            let mut manager = CheckpointManager::new(dir.path(), best_n(3))?;
            manager.save(3, &state, &val_loss(0.3))?;
            manager.save(4, &state, &val_loss(0.4))?;
        }
        fs::rename(dir.path().join("3"), dir.path().join("03"))?;
        // Directory name and metadata disagree
        fs::rename(dir.path().join("4"), dir.path().join("8"))?;

        let manager = CheckpointManager::new(dir.path(), best_n(3))?;
        assert!(manager.all_steps().is_empty());
        assert!(matches!(
            manager.restore_best(&device),
            Err(TrainError::NoCheckpoint(_))
        ));
        assert!(dir.path().join("03").exists());
        Ok(())
    }

    #[test]
    fn test_parse_step_name() {
        assert_eq!(parse_step_name("12"), Some(12));
        assert_eq!(parse_step_name("0"), Some(0));
        assert_eq!(parse_step_name("012"), None);
        assert_eq!(parse_step_name("+3"), None);
        assert_eq!(parse_step_name("wandb"), None);
    }

    #[test]
    fn test_reopen_with_smaller_max_to_keep_prunes() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let state = snapshot(1.0, &device)?;

        {
            let mut manager = CheckpointManager::new(dir.path(), best_n(4))?;
            for (step, loss) in [(1, 0.4), (2, 0.1), (3, 0.3), (4, 0.2)] {
                manager.save(step, &state, &val_loss(loss))?;
            }
        }

        let manager = CheckpointManager::new(dir.path(), best_n(2))?;
        assert_eq!(manager.all_steps(), vec![2, 4]);
        Ok(())
    }

    #[test]
    fn test_restore_errors() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let manager = CheckpointManager::new(dir.path(), best_n(2))?;

        assert!(manager.best_step().is_none());
        assert!(matches!(
            manager.restore_best(&device),
            Err(TrainError::NoCheckpoint(_))
        ));
        assert!(matches!(
            manager.restore(7, &device),
            Err(TrainError::Checkpoint(_))
        ));

        Ok(())
    }

    #[test]
    fn test_missing_directory_without_create() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let options = CheckpointManagerOptions {
            create: false,
            ..Default::default()
        };
        let result = CheckpointManager::new(dir.path().join("absent"), options);
        assert!(matches!(result, Err(TrainError::Checkpoint(_))));
        Ok(())
    }

    #[test]
    fn test_foreign_safetensors_file_is_rejected() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let mut manager = CheckpointManager::new(dir.path(), best_n(2))?;
        manager.save(1, &snapshot(1.0, &device)?, &val_loss(0.5))?;

        let weights = HashMap::from([("w".to_string(), Tensor::ones(2, DType::F32, &device)?)]);
        candle_core::safetensors::save(&weights, manager.step_directory(1).join(STATE_FILE))?;

        assert!(matches!(
            manager.restore(1, &device),
            Err(TrainError::Checkpoint(_))
        ));
        Ok(())
    }
}

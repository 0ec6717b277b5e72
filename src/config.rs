/// Configuration for the optimizer and the checkpoint manager
///
/// Both structs are read-only inputs: they are deserialized once (or built in
/// code), validated, and never mutated by the crate.
use std::path::Path;

/// Optimizer configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OptimizerConfig {
    /// Optimizer variant: "adamw" selects decoupled weight decay, anything
    /// else selects plain Adam
    pub name: String,

    /// Learning-rate schedule, clipping and moment hyperparameters
    #[serde(default)]
    pub params: OptimizerParams,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            name: "adamw".to_string(),
            params: OptimizerParams::default(),
        }
    }
}

/// Hyperparameters shared by both optimizer variants
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OptimizerParams {
    /// Target (peak) learning rate
    pub learning_rate: f64,

    /// Ramp the learning rate linearly from 0 over `warmup_steps`
    pub do_warmup: bool,
    pub warmup_steps: usize,

    /// Cosine-decay the learning rate to `end_learning_rate`
    pub do_decay: bool,
    /// Length of the decay schedule. With warmup enabled this counts the
    /// warmup steps too.
    pub decay_steps: usize,
    pub end_learning_rate: f64,

    /// Decoupled weight decay coefficient (only used by "adamw")
    pub weight_decay: f64,

    /// Clip gradients by global norm before the optimizer update
    pub do_gradient_clipping: bool,
    pub gradient_clipping: f64,

    /// Exponential decay rate of the first moment
    pub b1: f64,
    /// Exponential decay rate of the second moment
    pub b2: f64,
    /// Term added to the denominator for numerical stability
    pub eps: f64,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            do_warmup: false,
            warmup_steps: 0,
            do_decay: false,
            decay_steps: 0,
            end_learning_rate: 0.0,
            weight_decay: 1e-4,
            do_gradient_clipping: false,
            gradient_clipping: 1.0,
            b1: 0.9,
            b2: 0.999,
            eps: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether the decoupled weight decay variant is selected
    pub fn is_adamw(&self) -> bool {
        self.name == "adamw"
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        let p = &self.params;

        for (name, value) in [
            ("learning_rate", p.learning_rate),
            ("end_learning_rate", p.end_learning_rate),
            ("weight_decay", p.weight_decay),
            ("eps", p.eps),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(crate::TrainError::Config(format!(
                    "{} must be finite and >= 0, got {}",
                    name, value
                )));
            }
        }

        if !(0.0..1.0).contains(&p.b1) || !(0.0..1.0).contains(&p.b2) {
            return Err(crate::TrainError::Config(format!(
                "b1 and b2 must be in [0, 1), got {} and {}",
                p.b1, p.b2
            )));
        }

        if p.do_decay {
            // Decay-only derives its floor as end_learning_rate / learning_rate
            if !p.do_warmup && p.learning_rate <= 0.0 {
                return Err(crate::TrainError::Config(
                    "learning_rate must be > 0 when decaying without warmup".to_string(),
                ));
            }
            if p.decay_steps == 0 {
                return Err(crate::TrainError::Config(
                    "decay_steps must be > 0 when do_decay is set".to_string(),
                ));
            }
            if p.do_warmup && p.decay_steps < p.warmup_steps {
                return Err(crate::TrainError::Config(format!(
                    "decay_steps ({}) includes the warmup and must be >= warmup_steps ({})",
                    p.decay_steps, p.warmup_steps
                )));
            }
        }

        if p.do_gradient_clipping && !(p.gradient_clipping.is_finite() && p.gradient_clipping > 0.0) {
            return Err(crate::TrainError::Config(format!(
                "gradient_clipping must be finite and > 0, got {}",
                p.gradient_clipping
            )));
        }

        Ok(())
    }
}

/// Checkpoint retention configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Number of checkpoints to retain, best first. `None` keeps all.
    pub max_to_keep: Option<usize>,

    /// Only epochs that are a multiple of this are saved (the first save
    /// always goes through)
    pub save_interval_steps: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            max_to_keep: Some(5),
            save_interval_steps: 1,
        }
    }
}

impl CheckpointConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.save_interval_steps == 0 {
            return Err(crate::TrainError::Config(
                "save_interval_steps must be > 0".to_string(),
            ));
        }

        if self.max_to_keep == Some(0) {
            return Err(crate::TrainError::Config(
                "max_to_keep must be > 0 (use null to keep every checkpoint)".to_string(),
            ));
        }

        Ok(())
    }
}

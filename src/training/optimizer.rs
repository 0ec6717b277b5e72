/// Adam optimizer with optional decoupled weight decay and global-norm clipping
///
/// The optimizer is stateless itself; everything that changes between steps
/// lives in [`OptimizerState`], so it can be checkpointed next to the
/// parameters. An update runs the pipeline: clip by global norm (if enabled),
/// Adam moments and bias correction, optional weight decay, scale by the
/// scheduled learning rate.
use crate::config::OptimizerConfig;
use crate::tree::ParamTree;

use super::schedule::LearningRateSchedule;

/// Adam hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct AdamConfig {
    /// Coefficient for computing running averages of gradient (beta1)
    pub b1: f64,
    /// Coefficient for computing running averages of squared gradient (beta2)
    pub b2: f64,
    /// Term added to denominator for numerical stability
    pub eps: f64,
    /// Decoupled weight decay coefficient. `None` is plain Adam.
    pub weight_decay: Option<f64>,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            b1: 0.9,
            b2: 0.999,
            eps: 1e-8,
            weight_decay: None,
        }
    }
}

/// Rescale gradients so their global L2 norm does not exceed `max_norm`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipByGlobalNorm {
    pub max_norm: f64,
}

impl ClipByGlobalNorm {
    pub fn new(max_norm: f64) -> Self {
        Self { max_norm }
    }

    /// Clipped gradients. Trees below the threshold come back unchanged.
    pub fn apply(&self, grads: &ParamTree) -> crate::Result<ParamTree> {
        let norm = grads.global_norm()?;
        if norm < self.max_norm {
            return Ok(grads.clone());
        }
        let scale = self.max_norm / norm;
        log::debug!("Clipping gradients: norm {:.4} -> {:.4}", norm, self.max_norm);
        grads.map(|_, g| g * scale)
    }
}

/// Mutable optimizer state
#[derive(Debug, Clone)]
pub struct OptimizerState {
    /// Number of updates applied so far
    pub count: usize,
    /// First moment estimate (exponential moving average of gradients)
    pub mu: ParamTree,
    /// Second moment estimate (exponential moving average of squared gradients)
    pub nu: ParamTree,
}

/// Gradient transformation pipeline: optional clipping, then Adam(W)
#[derive(Debug, Clone)]
pub struct Optimizer {
    schedule: LearningRateSchedule,
    adam: AdamConfig,
    clip: Option<ClipByGlobalNorm>,
}

impl Optimizer {
    /// Create new optimizer
    pub fn new(
        schedule: LearningRateSchedule,
        adam: AdamConfig,
        clip: Option<ClipByGlobalNorm>,
    ) -> Self {
        Self {
            schedule,
            adam,
            clip,
        }
    }

    /// Build the optimizer described by `config`
    ///
    /// `"adamw"` selects decoupled weight decay, any other name plain Adam.
    pub fn from_config(config: &OptimizerConfig) -> crate::Result<Self> {
        config.validate()?;
        let params = &config.params;

        let adam = AdamConfig {
            b1: params.b1,
            b2: params.b2,
            eps: params.eps,
            weight_decay: config.is_adamw().then_some(params.weight_decay),
        };
        let clip = params
            .do_gradient_clipping
            .then(|| ClipByGlobalNorm::new(params.gradient_clipping));

        log::debug!(
            "Optimizer '{}': weight_decay={:?}, clip={:?}",
            config.name,
            adam.weight_decay,
            clip.map(|c| c.max_norm)
        );

        Ok(Self::new(LearningRateSchedule::from_params(params), adam, clip))
    }

    pub fn schedule(&self) -> &LearningRateSchedule {
        &self.schedule
    }

    pub fn adam_config(&self) -> &AdamConfig {
        &self.adam
    }

    pub fn clipping(&self) -> Option<ClipByGlobalNorm> {
        self.clip
    }

    /// Fresh state for parameters shaped like `params`
    pub fn init(&self, params: &ParamTree) -> crate::Result<OptimizerState> {
        Ok(OptimizerState {
            count: 0,
            mu: params.zeros_like()?,
            nu: params.zeros_like()?,
        })
    }

    /// Learning rate the next update will use
    pub fn learning_rate(&self, state: &OptimizerState) -> f64 {
        self.schedule.value_at(state.count)
    }

    /// Perform a single optimization step
    ///
    /// # Arguments
    /// * `grads` - Gradients, same structure as `params`
    /// * `state` - Optimizer state, advanced in place
    /// * `params` - Current parameters
    ///
    /// # Returns
    /// Updated parameters
    pub fn update(
        &self,
        grads: &ParamTree,
        state: &mut OptimizerState,
        params: &ParamTree,
    ) -> crate::Result<ParamTree> {
        params.check_same_structure(grads)?;
        params.check_same_structure(&state.mu)?;
        params.check_same_structure(&state.nu)?;

        let grads = match &self.clip {
            Some(clip) => clip.apply(grads)?,
            None => grads.clone(),
        };

        let lr = self.schedule.value_at(state.count);
        let (b1, b2, eps) = (self.adam.b1, self.adam.b2, self.adam.eps);
        let (bias1, bias2) = bias_corrections(b1, b2, state.count + 1);

        // m = b1 * m + (1 - b1) * g
        let mu = state
            .mu
            .zip_map(&grads, |_, m, g| (m * b1)? + (g * (1.0 - b1))?)?;
        // v = b2 * v + (1 - b2) * g^2
        let nu = state
            .nu
            .zip_map(&grads, |_, v, g| (v * b2)? + (g.sqr()? * (1.0 - b2))?)?;

        let mut new_params = ParamTree::new();
        for (path, param) in params.iter() {
            let m_hat = (mu.leaf(path)? / bias1)?;
            let v_hat = (nu.leaf(path)? / bias2)?;
            let mut update = (m_hat / (v_hat.sqrt()? + eps)?)?;

            if let Some(weight_decay) = self.adam.weight_decay {
                if weight_decay > 0.0 {
                    update = (update + (param * weight_decay)?)?;
                }
            }

            new_params.insert(path.clone(), (param - (update * lr)?)?);
        }

        state.mu = mu;
        state.nu = nu;
        state.count += 1;

        Ok(new_params)
    }
}

/// `(1 - b1^t, 1 - b2^t)` for update number `t`
fn bias_corrections(b1: f64, b2: f64, t: usize) -> (f64, f64) {
    let t = t as f64;
    (1.0 - b1.powf(t), 1.0 - b2.powf(t))
}

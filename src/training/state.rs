/// Training state and its factory
use candle_core::Tensor;

use crate::config::OptimizerConfig;
use crate::rng::InitRngs;
use crate::tree::ParamTree;

use super::ema::EmaConfig;
use super::optimizer::{Optimizer, OptimizerState};

/// What the training state needs from a model
///
/// `init` builds the parameter tree, usually by running a dry forward pass
/// on a sample batch; `rngs.sample` feeds any stochastic part of that pass
/// (noise levels, dropout masks). `apply` is the forward pass for a given
/// parameter tree.
pub trait Model {
    fn init(&self, rngs: &InitRngs, inputs: &Tensor, is_training: bool) -> crate::Result<ParamTree>;

    fn apply(&self, params: &ParamTree, inputs: &Tensor, is_training: bool) -> crate::Result<Tensor>;
}

impl<M: Model + ?Sized> Model for &M {
    fn init(&self, rngs: &InitRngs, inputs: &Tensor, is_training: bool) -> crate::Result<ParamTree> {
        (**self).init(rngs, inputs, is_training)
    }

    fn apply(&self, params: &ParamTree, inputs: &Tensor, is_training: bool) -> crate::Result<Tensor> {
        (**self).apply(params, inputs, is_training)
    }
}

impl<M: Model + ?Sized> Model for std::sync::Arc<M> {
    fn init(&self, rngs: &InitRngs, inputs: &Tensor, is_training: bool) -> crate::Result<ParamTree> {
        (**self).init(rngs, inputs, is_training)
    }

    fn apply(&self, params: &ParamTree, inputs: &Tensor, is_training: bool) -> crate::Result<Tensor> {
        (**self).apply(params, inputs, is_training)
    }
}

/// Persistent part of a [`TrainState`]: what a checkpoint holds
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Number of gradient updates applied
    pub step: usize,
    pub params: ParamTree,
    pub ema_params: ParamTree,
    pub opt_state: OptimizerState,
}

impl StateSnapshot {
    /// Check the internal invariants: params, EMA params and both optimizer
    /// moments share one structure
    pub fn validate(&self) -> crate::Result<()> {
        self.params.check_same_structure(&self.ema_params)?;
        self.params.check_same_structure(&self.opt_state.mu)?;
        self.params.check_same_structure(&self.opt_state.nu)
    }

    /// Check that `other` can replace this snapshot
    pub fn check_compatible(&self, other: &StateSnapshot) -> crate::Result<()> {
        self.params.check_same_structure(&other.params)?;
        other.validate()
    }
}

/// Parameters, EMA shadow parameters, optimizer and model bundled together
pub struct TrainState<M> {
    model: M,
    tx: Optimizer,
    state: StateSnapshot,
}

impl<M: Model> TrainState<M> {
    /// Assemble a state from parts; `ema_params` must mirror `params`
    pub fn new(
        model: M,
        params: ParamTree,
        ema_params: ParamTree,
        tx: Optimizer,
    ) -> crate::Result<Self> {
        params.check_same_structure(&ema_params)?;
        let opt_state = tx.init(&params)?;
        Ok(Self {
            model,
            tx,
            state: StateSnapshot {
                step: 0,
                params,
                ema_params,
                opt_state,
            },
        })
    }

    /// Forward pass with the live parameters
    pub fn apply(&self, inputs: &Tensor, is_training: bool) -> crate::Result<Tensor> {
        self.model.apply(&self.state.params, inputs, is_training)
    }

    /// Forward pass with the EMA parameters (evaluation)
    pub fn apply_ema(&self, inputs: &Tensor) -> crate::Result<Tensor> {
        self.model.apply(&self.state.ema_params, inputs, false)
    }

    /// One optimizer update from `grads`
    pub fn apply_gradients(&mut self, grads: &ParamTree) -> crate::Result<()> {
        let params = self
            .tx
            .update(grads, &mut self.state.opt_state, &self.state.params)?;
        self.state.params = params;
        self.state.step += 1;
        Ok(())
    }

    /// Move the EMA parameters towards the live parameters
    pub fn update_ema(&mut self, decay: f64) -> crate::Result<()> {
        let ema = EmaConfig::new(decay)?;
        self.state.ema_params = ema.update(&self.state.ema_params, &self.state.params)?;
        Ok(())
    }

    /// Learning rate the next update will use
    pub fn learning_rate(&self) -> f64 {
        self.tx.learning_rate(&self.state.opt_state)
    }

    pub fn step(&self) -> usize {
        self.state.step
    }

    pub fn params(&self) -> &ParamTree {
        &self.state.params
    }

    pub fn ema_params(&self) -> &ParamTree {
        &self.state.ema_params
    }

    pub fn opt_state(&self) -> &OptimizerState {
        &self.state.opt_state
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.tx
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Persistent fields, cheap to take (tensors are reference counted)
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.clone()
    }

    /// Replace the persistent fields, e.g. with a restored checkpoint
    pub fn restore(&mut self, snapshot: StateSnapshot) -> crate::Result<()> {
        self.state.check_compatible(&snapshot)?;
        self.state = snapshot;
        Ok(())
    }
}

/// Create a fresh training state
///
/// The seed is split into a parameter-init key and a sampling key, the model
/// is initialized on `sample_batch` in inference mode, and the EMA shadow
/// starts as a copy of the initial parameters.
///
/// # Arguments
/// * `seed` - Run seed
/// * `model` - Model to initialize
/// * `sample_batch` - Batch used for the dry-run forward pass
/// * `config` - Optimizer configuration
pub fn create_train_state<M: Model>(
    seed: u64,
    model: M,
    sample_batch: &Tensor,
    config: &OptimizerConfig,
) -> crate::Result<TrainState<M>> {
    let rngs = InitRngs::from_seed(seed);
    let params = model.init(&rngs, sample_batch, false)?;
    let ema_params = params.deep_copy()?;

    let tx = Optimizer::from_config(config)?;
    let state = TrainState::new(model, params, ema_params, tx)?;

    log::info!(
        "Created training state: {} tensors, {} parameters, optimizer '{}', lr(0)={:.3e}",
        state.params().len(),
        state.params().num_parameters(),
        config.name,
        state.learning_rate()
    );

    Ok(state)
}

/// Learning-rate schedules
///
/// A schedule maps the optimizer's update count to a learning rate. The
/// variant is picked once from the optimizer config:
/// - warmup and decay: linear 0 -> peak, then cosine peak -> end
/// - warmup only: linear 0 -> lr, constant afterwards
/// - decay only: cosine lr -> end
/// - neither: constant lr
use std::f64::consts::PI;

use crate::config::OptimizerParams;

#[derive(Debug, Clone, PartialEq)]
pub enum LearningRateSchedule {
    /// Fixed learning rate
    Constant(f64),

    /// Linear interpolation from `init` to `end` over `transition_steps`,
    /// then constant at `end`
    Linear {
        init: f64,
        end: f64,
        transition_steps: usize,
    },

    /// `init * ((1 - alpha) * 0.5 * (1 + cos(pi * t / decay_steps)) + alpha)`
    /// for `t <= decay_steps`, then constant at `init * alpha`
    CosineDecay {
        init: f64,
        decay_steps: usize,
        alpha: f64,
    },

    /// Linear warmup `init -> peak` over `warmup_steps`, then cosine decay
    /// `peak -> end`. `decay_steps` is the length of the whole schedule,
    /// warmup included.
    WarmupCosineDecay {
        init: f64,
        peak: f64,
        warmup_steps: usize,
        decay_steps: usize,
        end: f64,
    },
}

impl LearningRateSchedule {
    /// Pick the schedule described by the optimizer parameters
    pub fn from_params(params: &OptimizerParams) -> Self {
        let lr = params.learning_rate;
        let schedule = match (params.do_warmup, params.do_decay) {
            (true, true) => Self::WarmupCosineDecay {
                init: 0.0,
                peak: lr,
                warmup_steps: params.warmup_steps,
                decay_steps: params.decay_steps,
                end: params.end_learning_rate,
            },
            (true, false) => Self::Linear {
                init: 0.0,
                end: lr,
                transition_steps: params.warmup_steps,
            },
            (false, true) => Self::CosineDecay {
                init: lr,
                decay_steps: params.decay_steps,
                alpha: params.end_learning_rate / lr,
            },
            (false, false) => Self::Constant(lr),
        };
        log::debug!("Learning-rate schedule: {:?}", schedule);
        schedule
    }

    /// Learning rate after `step` optimizer updates
    pub fn value_at(&self, step: usize) -> f64 {
        match *self {
            Self::Constant(lr) => lr,
            Self::Linear {
                init,
                end,
                transition_steps,
            } => linear(init, end, transition_steps, step),
            Self::CosineDecay {
                init,
                decay_steps,
                alpha,
            } => cosine_decay(init, decay_steps, alpha, step),
            Self::WarmupCosineDecay {
                init,
                peak,
                warmup_steps,
                decay_steps,
                end,
            } => {
                if step < warmup_steps {
                    linear(init, peak, warmup_steps, step)
                } else {
                    let alpha = if peak == 0.0 { 0.0 } else { end / peak };
                    cosine_decay(
                        peak,
                        decay_steps.saturating_sub(warmup_steps),
                        alpha,
                        step - warmup_steps,
                    )
                }
            }
        }
    }

    /// Step at which the schedule reaches its final value
    pub fn final_step(&self) -> usize {
        match *self {
            Self::Constant(_) => 0,
            Self::Linear {
                transition_steps, ..
            } => transition_steps,
            Self::CosineDecay { decay_steps, .. } => decay_steps,
            Self::WarmupCosineDecay {
                warmup_steps,
                decay_steps,
                ..
            } => decay_steps.max(warmup_steps),
        }
    }
}

fn linear(init: f64, end: f64, transition_steps: usize, step: usize) -> f64 {
    if transition_steps == 0 {
        return init;
    }
    let progress = step.min(transition_steps) as f64 / transition_steps as f64;
    init + (end - init) * progress
}

fn cosine_decay(init: f64, decay_steps: usize, alpha: f64, step: usize) -> f64 {
    if decay_steps == 0 {
        return init * alpha;
    }
    let progress = step.min(decay_steps) as f64 / decay_steps as f64;
    let cosine_factor = 0.5 * (1.0 + (PI * progress).cos());
    init * ((1.0 - alpha) * cosine_factor + alpha)
}

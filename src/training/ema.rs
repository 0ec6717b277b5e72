/// Exponential moving average of model parameters
///
/// The shadow parameters trail the live parameters and are typically the
/// ones used for sampling and evaluation.
use crate::tree::ParamTree;

/// EMA configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaConfig {
    /// Decay rate for exponential moving average
    /// ema = decay * ema + (1 - decay) * param
    pub decay: f64,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self { decay: 0.9999 }
    }
}

impl EmaConfig {
    pub fn new(decay: f64) -> crate::Result<Self> {
        if !(0.0..=1.0).contains(&decay) {
            return Err(crate::TrainError::Config(format!(
                "EMA decay must be in [0, 1], got {}",
                decay
            )));
        }
        Ok(Self { decay })
    }

    /// Shadow parameters after one more step towards `params`
    ///
    /// Both trees must have the same structure.
    pub fn update(&self, ema_params: &ParamTree, params: &ParamTree) -> crate::Result<ParamTree> {
        let decay = self.decay;
        ema_params.zip_map(params, |_, shadow, param| {
            (shadow * decay)? + (param * (1.0 - decay))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};

    fn tree(value: f32, device: &Device) -> crate::Result<ParamTree> {
        let mut tree = ParamTree::new();
        tree.insert("w", Tensor::full(value, (5, 5), device)?);
        Ok(tree)
    }

    #[test]
    fn test_ema_smoothing() -> crate::Result<()> {
        let device = Device::Cpu;
        let ema = EmaConfig::new(0.9)?;

        // Shadow at ones, live params at zeros
        let shadow = ema.update(&tree(1.0, &device)?, &tree(0.0, &device)?)?;
        let mean = shadow.leaf("w")?.mean_all()?.to_scalar::<f32>()?;

        // decay * 1 + (1 - decay) * 0
        assert!((mean - 0.9).abs() < 1e-6);

        Ok(())
    }

    #[test]
    fn test_identical_trees_are_a_fixed_point() -> crate::Result<()> {
        let device = Device::Cpu;
        let params = tree(2.0, &device)?;
        let shadow = EmaConfig::default().update(&params, &params)?;
        assert!(shadow.max_abs_diff(&params)? < 1e-6);
        Ok(())
    }

    #[test]
    fn test_structure_mismatch() -> crate::Result<()> {
        let device = Device::Cpu;
        let mut other = ParamTree::new();
        other.insert("w", Tensor::zeros((5, 4), DType::F32, &device)?);

        let result = EmaConfig::default().update(&tree(1.0, &device)?, &other);
        assert!(matches!(result, Err(crate::TrainError::StructureMismatch(_))));
        Ok(())
    }

    #[test]
    fn test_decay_range() {
        assert!(EmaConfig::new(1.5).is_err());
        assert!(EmaConfig::new(-0.1).is_err());
        assert!(EmaConfig::new(0.999).is_ok());
    }
}

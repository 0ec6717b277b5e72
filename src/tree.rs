/// Parameter trees
///
/// Nested parameter mappings are stored flattened: each leaf tensor is keyed
/// by its dotted path, e.g. `"blocks.0.attn.qkv.weight"`, the same naming
/// candle's `VarMap` uses. A `BTreeMap` keeps iteration order stable so that
/// two trees with the same keys always line up leaf for leaf.
use std::collections::BTreeMap;

use candle_core::Tensor;

use crate::TrainError;

/// Flattened tree of named tensors
#[derive(Debug, Clone, Default)]
pub struct ParamTree {
    leaves: BTreeMap<String, Tensor>,
}

impl ParamTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.leaves.insert(path.into(), tensor)
    }

    pub fn get(&self, path: &str) -> Option<&Tensor> {
        self.leaves.get(path)
    }

    /// Leaf at `path`, or a structure error naming the missing path
    pub fn leaf(&self, path: &str) -> crate::Result<&Tensor> {
        self.leaves
            .get(path)
            .ok_or_else(|| TrainError::StructureMismatch(format!("missing parameter '{}'", path)))
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.leaves.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.leaves.iter()
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.leaves.values().map(|t| t.elem_count()).sum()
    }

    /// Check that `other` has the same paths with the same shapes and dtypes
    pub fn check_same_structure(&self, other: &ParamTree) -> crate::Result<()> {
        if self.leaves.len() != other.leaves.len() {
            return Err(TrainError::StructureMismatch(format!(
                "expected {} leaves, got {}",
                self.leaves.len(),
                other.leaves.len()
            )));
        }

        for ((path, a), (other_path, b)) in self.leaves.iter().zip(other.leaves.iter()) {
            if path != other_path {
                return Err(TrainError::StructureMismatch(format!(
                    "expected parameter '{}', got '{}'",
                    path, other_path
                )));
            }
            if a.dims() != b.dims() || a.dtype() != b.dtype() {
                return Err(TrainError::StructureMismatch(format!(
                    "'{}': expected {:?} {:?}, got {:?} {:?}",
                    path,
                    a.dims(),
                    a.dtype(),
                    b.dims(),
                    b.dtype()
                )));
            }
        }

        Ok(())
    }

    /// Copy every leaf into fresh storage
    pub fn deep_copy(&self) -> crate::Result<ParamTree> {
        self.map(|_, t| t.copy())
    }

    /// Zero tensor for every leaf
    pub fn zeros_like(&self) -> crate::Result<ParamTree> {
        self.map(|_, t| t.zeros_like())
    }

    /// Apply `f` to every leaf
    pub fn map<F>(&self, mut f: F) -> crate::Result<ParamTree>
    where
        F: FnMut(&str, &Tensor) -> candle_core::Result<Tensor>,
    {
        let mut leaves = BTreeMap::new();
        for (path, tensor) in &self.leaves {
            leaves.insert(path.clone(), f(path, tensor)?);
        }
        Ok(ParamTree { leaves })
    }

    /// Apply `f` leaf-wise to two trees of identical structure
    pub fn zip_map<F>(&self, other: &ParamTree, mut f: F) -> crate::Result<ParamTree>
    where
        F: FnMut(&str, &Tensor, &Tensor) -> candle_core::Result<Tensor>,
    {
        self.check_same_structure(other)?;
        let mut leaves = BTreeMap::new();
        for ((path, a), b) in self.leaves.iter().zip(other.leaves.values()) {
            leaves.insert(path.clone(), f(path, a, b)?);
        }
        Ok(ParamTree { leaves })
    }

    /// L2 norm over all leaves taken together
    pub fn global_norm(&self) -> crate::Result<f64> {
        let mut total = 0.0f64;
        for tensor in self.leaves.values() {
            total += tensor
                .to_dtype(candle_core::DType::F64)?
                .sqr()?
                .sum_all()?
                .to_scalar::<f64>()?;
        }
        Ok(total.sqrt())
    }

    /// Largest absolute leaf-wise difference to another tree
    pub fn max_abs_diff(&self, other: &ParamTree) -> crate::Result<f64> {
        self.check_same_structure(other)?;
        let mut max = 0.0f64;
        for (a, b) in self.leaves.values().zip(other.leaves.values()) {
            let diff = (a - b)?
                .abs()?
                .to_dtype(candle_core::DType::F64)?
                .flatten_all()?
                .max(0)?
                .to_scalar::<f64>()?;
            max = max.max(diff);
        }
        Ok(max)
    }

    /// Leaves keyed `"{prefix}.{path}"`, for flattening several trees into
    /// one tensor file
    pub fn prefixed(&self, prefix: &str) -> impl Iterator<Item = (String, &Tensor)> + '_ {
        let prefix = prefix.to_string();
        self.leaves
            .iter()
            .map(move |(path, tensor)| (format!("{}.{}", prefix, path), tensor))
    }

    /// Collect the leaves under `"{prefix}."`, with the prefix stripped
    pub fn from_prefixed<'a, I>(entries: I, prefix: &str) -> ParamTree
    where
        I: IntoIterator<Item = (&'a String, &'a Tensor)>,
    {
        let prefix = format!("{}.", prefix);
        entries
            .into_iter()
            .filter_map(|(name, tensor)| {
                name.strip_prefix(&prefix)
                    .map(|path| (path.to_string(), tensor.clone()))
            })
            .collect()
    }
}

impl FromIterator<(String, Tensor)> for ParamTree {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            leaves: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, Tensor>> for ParamTree {
    fn from(leaves: BTreeMap<String, Tensor>) -> Self {
        Self { leaves }
    }
}

impl From<std::collections::HashMap<String, Tensor>> for ParamTree {
    fn from(leaves: std::collections::HashMap<String, Tensor>) -> Self {
        leaves.into_iter().collect()
    }
}

/// Splittable pseudo-random keys
///
/// A key is an immutable seed. Splitting derives independent child keys
/// deterministically, so the same run seed always produces the same
/// parameter initialization and the same sampling noise.
use candle_core::{Device, Result, Shape, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};

/// Deterministic random key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PrngKey(u64);

impl PrngKey {
    /// Create a key from a run seed
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Raw seed value
    pub fn seed(&self) -> u64 {
        self.0
    }

    /// Split into two independent keys
    pub fn split(&self) -> (PrngKey, PrngKey) {
        let mut rng = self.rng();
        (PrngKey(rng.gen()), PrngKey(rng.gen()))
    }

    /// Split into `n` independent keys
    pub fn split_n(&self, n: usize) -> Vec<PrngKey> {
        let mut rng = self.rng();
        (0..n).map(|_| PrngKey(rng.gen())).collect()
    }

    /// Derive a key bound to a name, e.g. a parameter path
    pub fn fold_in(&self, name: &str) -> PrngKey {
        // FNV-1a, stable across platforms and compiler versions
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in name.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        let mut rng = StdRng::seed_from_u64(self.0 ^ hash);
        PrngKey(rng.gen())
    }

    /// Generator seeded from this key
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }

    /// Tensor of samples from N(0, std^2)
    pub fn normal<S: Into<Shape>>(&self, shape: S, std: f64, device: &Device) -> Result<Tensor> {
        let shape = shape.into();
        let normal = Normal::new(0.0f32, std as f32)
            .map_err(|e| candle_core::Error::Msg(format!("Invalid normal std {}: {}", std, e)))?;
        let mut rng = self.rng();
        let data: Vec<f32> = (0..shape.elem_count()).map(|_| normal.sample(&mut rng)).collect();
        Tensor::from_vec(data, shape, device)
    }

    /// Tensor of samples from U(low, high)
    pub fn uniform<S: Into<Shape>>(
        &self,
        shape: S,
        low: f64,
        high: f64,
        device: &Device,
    ) -> Result<Tensor> {
        let (low32, high32) = (low as f32, high as f32);
        if !(low32 < high32) {
            candle_core::bail!("Invalid uniform range [{}, {})", low, high);
        }
        let shape = shape.into();
        let uniform = Uniform::new(low32, high32);
        let mut rng = self.rng();
        let data: Vec<f32> = (0..shape.elem_count()).map(|_| uniform.sample(&mut rng)).collect();
        Tensor::from_vec(data, shape, device)
    }
}

/// Named keys handed to [`crate::Model::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitRngs {
    /// Parameter initialization
    pub params: PrngKey,
    /// Stochastic sampling path of the dry-run forward pass
    pub sample: PrngKey,
}

impl InitRngs {
    /// Split a run seed into the parameter and sampling keys
    pub fn from_seed(seed: u64) -> Self {
        let (params, sample) = PrngKey::new(seed).split();
        Self { params, sample }
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::dtype::DType;
use crate::storage::CpuStorage;

/// Source of pseudo-random values for tensor fills.
///
/// Tensor constructors take `&mut impl RandomSource` instead of reaching for a
/// thread-local generator, so test data is reproducible from a seed.
pub trait RandomSource {
    /// One sample from N(0, 1).
    fn sample_normal(&mut self) -> f64;

    /// `n` standard-normal samples rounded to `dtype`.
    fn normal_storage(&mut self, n: usize, dtype: DType) -> CpuStorage {
        let data: Vec<f64> = (0..n).map(|_| self.sample_normal()).collect();
        CpuStorage::from_f64_slice(&data, dtype)
    }
}

/// `StdRng`-backed source seeded from a u64.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
    seed: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        SeededRandom {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn sample_normal(&mut self) -> f64 {
        self.rng.sample::<f64, _>(StandardNormal)
    }

    fn normal_storage(&mut self, n: usize, dtype: DType) -> CpuStorage {
        // Sample directly in the storage width; skips the f64 staging buffer.
        match dtype {
            DType::F32 => CpuStorage::F32(
                (0..n)
                    .map(|_| self.rng.sample::<f32, _>(StandardNormal))
                    .collect(),
            ),
            DType::F16 => CpuStorage::F16(
                (0..n)
                    .map(|_| half::f16::from_f32(self.rng.sample::<f32, _>(StandardNormal)))
                    .collect(),
            ),
            DType::BF16 => CpuStorage::BF16(
                (0..n)
                    .map(|_| half::bf16::from_f32(self.rng.sample::<f32, _>(StandardNormal)))
                    .collect(),
            ),
        }
    }
}

// Weight Generation Strategies
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::engine::crossbar::WeightMatrix;

/// Produces a full crossbar matrix whose cells lie in `[0, max_value]`.
pub trait WeightSource {
    fn generate(&mut self, rows: usize, columns: usize, max_value: u32) -> WeightMatrix;
}

/// Uniformly distributed cell values from a seeded generator.
#[derive(Debug, Clone)]
pub struct UniformWeights {
    rng: ChaCha8Rng,
}

impl UniformWeights {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl WeightSource for UniformWeights {
    fn generate(&mut self, rows: usize, columns: usize, max_value: u32) -> WeightMatrix {
        Array2::from_shape_fn((rows, columns), |_| self.rng.gen_range(0..=max_value))
    }
}

/// Cell value computed from its `(row, column)` position.
pub struct PatternWeights<F> {
    pattern: F,
}

impl<F: FnMut(usize, usize) -> u32> PatternWeights<F> {
    pub fn new(pattern: F) -> Self {
        Self { pattern }
    }
}

impl<F: FnMut(usize, usize) -> u32> WeightSource for PatternWeights<F> {
    /// Values are taken as-is; programming rejects any above `max_value`.
    fn generate(&mut self, rows: usize, columns: usize, _max_value: u32) -> WeightMatrix {
        Array2::from_shape_fn((rows, columns), |(row, col)| (self.pattern)(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_weights_stay_in_range() {
        let mut source = UniformWeights::seeded(42);
        let matrix = source.generate(8, 8, 7);
        assert_eq!(matrix.dim(), (8, 8));
        assert!(matrix.iter().all(|&w| w <= 7));
    }

    #[test]
    fn uniform_weights_are_reproducible() {
        let a = UniformWeights::seeded(7).generate(4, 6, 15);
        let b = UniformWeights::seeded(7).generate(4, 6, 15);
        assert_eq!(a, b);
    }

    #[test]
    fn pattern_weights_follow_position() {
        let mut source = PatternWeights::new(|row, col| (row * 10 + col) as u32);
        let matrix = source.generate(2, 3, 255);
        assert_eq!(matrix[[1, 2]], 12);
        assert_eq!(matrix[[0, 0]], 0);
    }
}

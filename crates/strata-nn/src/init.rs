// init — Parameter initialization
//
// Hosts normally supply edge weights and biases with their current values.
// These helpers create them when a host has none yet.
//
//   uniform(shape, low, high, rng)     — U(low, high)
//   xavier_uniform(rows, cols, gain, rng)
//                                      — U(-a, a), a = gain·√(6 / (rows + cols))
//   constant(shape, value)             — all elements = value
//   zeros(shape)                       — all zeros
//
// Randomized initializers take any `rand::Rng`; pass a seeded
// `StdRng` for reproducible weights, or use the `*_seeded` wrappers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_core::error::{Error, Result};
use strata_core::shape::Shape;
use strata_core::tensor::Tensor;

/// A tensor drawn from U(low, high).
pub fn uniform<R: Rng + ?Sized>(
    shape: impl Into<Shape>,
    low: f64,
    high: f64,
    rng: &mut R,
) -> Result<Tensor> {
    let shape = shape.into();
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(Error::msg(format!(
            "uniform: invalid range [{low}, {high})"
        )));
    }
    let data = (0..shape.elem_count())
        .map(|_| rng.gen_range(low..high))
        .collect();
    Tensor::from_vec(data, shape)
}

/// Glorot/Xavier uniform for an edge weight `[rows x cols]`.
pub fn xavier_uniform<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    gain: f64,
    rng: &mut R,
) -> Result<Tensor> {
    let fan_sum = (rows + cols).max(1) as f64;
    let a = gain * (6.0 / fan_sum).sqrt();
    uniform((rows, cols), -a, a, rng)
}

/// `uniform` with a fixed seed.
pub fn uniform_seeded(shape: impl Into<Shape>, low: f64, high: f64, seed: u64) -> Result<Tensor> {
    uniform(shape, low, high, &mut StdRng::seed_from_u64(seed))
}

/// `xavier_uniform` with a fixed seed.
pub fn xavier_uniform_seeded(rows: usize, cols: usize, gain: f64, seed: u64) -> Result<Tensor> {
    xavier_uniform(rows, cols, gain, &mut StdRng::seed_from_u64(seed))
}

pub fn constant(shape: impl Into<Shape>, value: f64) -> Tensor {
    Tensor::full(shape, value)
}

pub fn zeros(shape: impl Into<Shape>) -> Tensor {
    Tensor::zeros(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_range() {
        let t = uniform_seeded((4, 5), -0.5, 0.5, 7).unwrap();
        assert_eq!(t.dims(), &[4, 5]);
        assert!(t.to_vec().unwrap().iter().all(|&v| (-0.5..0.5).contains(&v)));
    }

    #[test]
    fn test_uniform_rejects_empty_range() {
        assert!(uniform_seeded(3, 1.0, 1.0, 0).is_err());
        assert!(uniform_seeded(3, 1.0, f64::INFINITY, 0).is_err());
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = xavier_uniform_seeded(3, 2, 1.0, 42).unwrap();
        let b = xavier_uniform_seeded(3, 2, 1.0, 42).unwrap();
        assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
    }

    #[test]
    fn test_xavier_bound() {
        let t = xavier_uniform_seeded(10, 20, 1.0, 1).unwrap();
        let bound = (6.0f64 / 30.0).sqrt();
        assert!(t.to_vec().unwrap().iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn test_constant_and_zeros() {
        assert_eq!(constant(3, 0.5).to_vec().unwrap(), vec![0.5; 3]);
        assert_eq!(zeros((2, 2)).to_vec().unwrap(), vec![0.0; 4]);
    }
}

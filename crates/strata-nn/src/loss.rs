// Loss kernels
//
// Each loss compares one output node's value `a` with its target `y` and
// provides both the scalar loss and dL/da, written into a caller buffer.
//
//   Mse              L = (1/n) Σ (a - y)²           dL/da = (2/n)(a - y)
//   SumSquaredError  L = ½ Σ (a - y)²               dL/da = a - y
//   CrossEntropy     L = -Σ [y ln a + (1-y) ln(1-a)]
//                                                   dL/da = (a - y) / (a (1 - a))
//
// Cross-entropy expects outputs in (0, 1) (e.g. Logistic nodes); `a` is
// clamped away from 0 and 1 so neither the loss nor its derivative blow up.
//
// The per-sample loss of a graph is the sum over its output nodes.

const PROB_EPS: f64 = 1e-12;

/// Loss kinds with both a value and a derivative kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loss {
    /// Mean squared error over the node's elements.
    #[default]
    Mse,
    /// Half the summed squared error.
    SumSquaredError,
    /// Binary cross-entropy.
    CrossEntropy,
}

type LossFn = fn(&[f64], &[f64], usize) -> f64;
type LossDerivativeFn = fn(&[f64], &[f64], usize, &mut [f64]);

/// A resolved loss: value and derivative function pointers.
#[derive(Debug, Clone, Copy)]
pub struct LossKernel {
    loss: Loss,
    value: LossFn,
    derivative: LossDerivativeFn,
}

impl LossKernel {
    pub fn resolve(loss: Loss) -> Self {
        match loss {
            Loss::Mse => Self {
                loss,
                value: mse,
                derivative: mse_derivative,
            },
            Loss::SumSquaredError => Self {
                loss,
                value: sse,
                derivative: sse_derivative,
            },
            Loss::CrossEntropy => Self {
                loss,
                value: cross_entropy,
                derivative: cross_entropy_derivative,
            },
        }
    }

    pub fn kind(&self) -> Loss {
        self.loss
    }

    /// Scalar loss of `output` against `target`.
    pub fn value(&self, output: &[f64], target: &[f64], dim: usize) -> f64 {
        (self.value)(output, target, dim)
    }

    /// `out = dL/d(output)`
    pub fn derivative(&self, output: &[f64], target: &[f64], dim: usize, out: &mut [f64]) {
        (self.derivative)(output, target, dim, out)
    }
}

fn mse(a: &[f64], y: &[f64], dim: usize) -> f64 {
    if dim == 0 {
        return 0.0;
    }
    sum_sq(a, y, dim) / dim as f64
}

fn mse_derivative(a: &[f64], y: &[f64], dim: usize, out: &mut [f64]) {
    let scale = 2.0 / dim.max(1) as f64;
    for i in 0..dim {
        out[i] = scale * (a[i] - y[i]);
    }
}

fn sse(a: &[f64], y: &[f64], dim: usize) -> f64 {
    0.5 * sum_sq(a, y, dim)
}

fn sse_derivative(a: &[f64], y: &[f64], dim: usize, out: &mut [f64]) {
    for i in 0..dim {
        out[i] = a[i] - y[i];
    }
}

fn cross_entropy(a: &[f64], y: &[f64], dim: usize) -> f64 {
    let mut total = 0.0;
    for i in 0..dim {
        let p = a[i].clamp(PROB_EPS, 1.0 - PROB_EPS);
        total -= y[i] * p.ln() + (1.0 - y[i]) * (1.0 - p).ln();
    }
    total
}

fn cross_entropy_derivative(a: &[f64], y: &[f64], dim: usize, out: &mut [f64]) {
    for i in 0..dim {
        let p = a[i].clamp(PROB_EPS, 1.0 - PROB_EPS);
        out[i] = (p - y[i]) / (p * (1.0 - p));
    }
}

fn sum_sq(a: &[f64], y: &[f64], dim: usize) -> f64 {
    (0..dim).map(|i| (a[i] - y[i]) * (a[i] - y[i])).sum()
}

// Activation kernels — Activation enum → concrete functions
//
// A node's `Activation` is a closed enum. The compilers call
// `ActivationKernel::resolve` once per node; the result carries plain `fn`
// pointers and a small parameter array, so the compiled tape never matches
// on the enum again.
//
//   Linear    f(x) = slope·x + intercept                f'(x) = slope
//   Logistic  f(x) = 1 / (1 + e^(-gain·(x - bias) + offset))
//                                                       f'(x) = gain·f(x)·(1 - f(x))
//   ReLU      f(x) = gain·max(x - bias, 0) + leak·min(x - bias, 0)
//                                                       f'(x) = gain if x > bias else leak
//   SoftMax   f(x)_i = e^(gain·x_i) / Σ_j e^(gain·x_j)  (no derivative kernel)
//
// Derivatives are evaluated at the pre-activation value z.

use strata_core::graph::Activation;
use strata_core::kernels::{self, ElementFn};

/// A whole-vector transform: `(params, x, dim, out)`.
pub type VectorFn = fn(&[f64], &[f64], usize, &mut [f64]);

/// How an activation's forward pass is evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    /// Applied independently to every element.
    Elementwise(ElementFn),
    /// Needs the whole vector (e.g. SoftMax).
    Vector(VectorFn),
}

/// A resolved activation: forward transform plus optional derivative.
#[derive(Debug, Clone, Copy)]
pub struct ActivationKernel {
    name: &'static str,
    params: [f64; 3],
    forward: Transform,
    derivative: Option<ElementFn>,
}

/// A resolved activation derivative, evaluated at pre-activation values.
#[derive(Debug, Clone, Copy)]
pub struct DerivativeKernel {
    params: [f64; 3],
    f: ElementFn,
}

impl ActivationKernel {
    /// Select the kernels for `activation`.
    pub fn resolve(activation: &Activation) -> Self {
        match *activation {
            Activation::Linear { slope, intercept } => Self {
                name: activation.name(),
                params: [slope, intercept, 0.0],
                forward: Transform::Elementwise(linear),
                derivative: Some(linear_derivative),
            },
            Activation::Logistic { gain, bias, offset } => Self {
                name: activation.name(),
                params: [gain, bias, offset],
                forward: Transform::Elementwise(logistic),
                derivative: Some(logistic_derivative),
            },
            Activation::ReLU { gain, bias, leak } => Self {
                name: activation.name(),
                params: [gain, bias, leak],
                forward: Transform::Elementwise(relu),
                derivative: Some(relu_derivative),
            },
            Activation::SoftMax { gain } => Self {
                name: activation.name(),
                params: [gain, 0.0, 0.0],
                forward: Transform::Vector(softmax),
                derivative: None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `out = f(z)`
    pub fn apply(&self, z: &[f64], dim: usize, out: &mut [f64]) {
        match self.forward {
            Transform::Elementwise(f) => kernels::vec_map(f, &self.params, z, dim, out),
            Transform::Vector(f) => f(&self.params, z, dim, out),
        }
    }

    /// The derivative kernel, if this activation has one.
    pub fn derivative(&self) -> Option<DerivativeKernel> {
        self.derivative.map(|f| DerivativeKernel {
            params: self.params,
            f,
        })
    }
}

impl DerivativeKernel {
    /// `out = f'(z)`
    pub fn apply(&self, z: &[f64], dim: usize, out: &mut [f64]) {
        kernels::vec_map(self.f, &self.params, z, dim, out);
    }

    /// `err ⊙= f'(z)`
    pub fn scale(&self, z: &[f64], dim: usize, err: &mut [f64]) {
        for i in 0..dim {
            err[i] *= (self.f)(z[i], &self.params);
        }
    }
}

fn linear(x: f64, p: &[f64]) -> f64 {
    p[0] * x + p[1]
}

fn linear_derivative(_x: f64, p: &[f64]) -> f64 {
    p[0]
}

fn logistic(x: f64, p: &[f64]) -> f64 {
    let (gain, bias, offset) = (p[0], p[1], p[2]);
    1.0 / (1.0 + (-gain * (x - bias) + offset).exp())
}

fn logistic_derivative(x: f64, p: &[f64]) -> f64 {
    let f = logistic(x, p);
    p[0] * f * (1.0 - f)
}

fn relu(x: f64, p: &[f64]) -> f64 {
    let (gain, bias, leak) = (p[0], p[1], p[2]);
    let shifted = x - bias;
    gain * shifted.max(0.0) + leak * shifted.min(0.0)
}

fn relu_derivative(x: f64, p: &[f64]) -> f64 {
    if x > p[1] {
        p[0]
    } else {
        p[2]
    }
}

fn softmax(p: &[f64], x: &[f64], dim: usize, out: &mut [f64]) {
    let gain = p[0];
    let max = x[..dim]
        .iter()
        .map(|&v| gain * v)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for i in 0..dim {
        out[i] = (gain * x[i] - max).exp();
        sum += out[i];
    }
    for v in &mut out[..dim] {
        *v /= sum;
    }
}

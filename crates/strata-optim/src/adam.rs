// Adam — adaptive moment estimation
//
// Per parameter element, with a single step counter t shared by all
// parameters of one compiled graph:
//
//   t  += 1
//   m   = β1·m + (1 - β1)·g
//   v   = β2·v + (1 - β2)·g²
//   m̂   = m / (1 - β1^t)
//   v̂   = v / (1 - β2^t)
//   w  -= lr · m̂ / (√v̂ + ε)
//
// m lives in aux plane 0, v in aux plane 1.

use strata_core::error::{Error, Result};
use strata_core::layout::{ParamSlot, ParamsMut};

use crate::optimizer::{check_lr, Optimizer};

/// Adam hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl AdamConfig {
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_lr(self.lr)?;
        for (name, value) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&value) {
                return Err(Error::InvalidHyperparameter {
                    name,
                    value,
                    reason: "must be in [0, 1)",
                });
            }
        }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(Error::InvalidHyperparameter {
                name: "eps",
                value: self.eps,
                reason: "must be finite and positive",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    t: u64,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Adam { config, t: 0 }
    }

    /// Steps taken so far.
    pub fn t(&self) -> u64 {
        self.t
    }
}

/// `1 - beta^t`. Past `i32::MAX` steps the power is already 0 for any
/// beta in [0, 1), so the exponent saturates there.
fn bias_correction(beta: f64, t: u64) -> f64 {
    1.0 - beta.powi(i32::try_from(t).unwrap_or(i32::MAX))
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn aux_per_param(&self) -> usize {
        2
    }

    fn step(
        &mut self,
        slots: &[ParamSlot],
        params: &mut ParamsMut<'_>,
        grads: &[f64],
        aux: &mut [f64],
    ) {
        let AdamConfig {
            lr,
            beta1,
            beta2,
            eps,
        } = self.config;
        self.t += 1;
        let bias_correction1 = bias_correction(beta1, self.t);
        let bias_correction2 = bias_correction(beta2, self.t);

        let param_len = grads.len();
        let (m, v) = aux.split_at_mut(param_len);

        for slot in slots {
            let w = params.get_mut(slot);
            for (i, w) in w.iter_mut().enumerate() {
                let k = slot.flat + i;
                let g = grads[k];
                m[k] = beta1 * m[k] + (1.0 - beta1) * g;
                v[k] = beta2 * v[k] + (1.0 - beta2) * g * g;
                let m_hat = m[k] / bias_correction1;
                let v_hat = v[k] / bias_correction2;
                *w -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        }
    }
}

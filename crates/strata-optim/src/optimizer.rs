// Optimizer — configuration, state, and the in-place update trait
//
// Lifecycle of one training kernel's optimizer:
//
//   OptimizerConfig        hyperparameters, validated          (created)
//     │ build(param_len)
//     ▼
//   OptimizerState         aux region allocated and zeroed     (initialized)
//     │ step(slots, params, grads)   — once per batch
//     ▼
//   dropped with the compiled graph                            (disposed)
//
// Optimizers never see nodes or edges. They walk the parameter slots of the
// memory layout: live values through `ParamsMut`, gradients and aux state
// through each slot's `flat` offset. Aux state is laid out in planes of
// `param_len` elements: plane k of parameter element i is at
// `aux[k * param_len + i]`.

use tracing::debug;

use strata_core::error::{Error, Result};
use strata_core::layout::{ParamSlot, ParamsMut};

use crate::adam::{Adam, AdamConfig};
use crate::sgd::Sgd;

/// An in-place update rule over a flat parameter layout.
pub trait Optimizer: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Aux planes needed per parameter element (SGD 0, Adam 2).
    fn aux_per_param(&self) -> usize;

    /// Update every parameter in `slots` from the accumulated `grads`.
    ///
    /// `grads` has one element per parameter element; `aux` has
    /// `aux_per_param() * grads.len()` elements.
    fn step(
        &mut self,
        slots: &[ParamSlot],
        params: &mut ParamsMut<'_>,
        grads: &[f64],
        aux: &mut [f64],
    );
}

/// Which update rule to use, with its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerConfig {
    /// Plain gradient descent: `w -= lr * g`.
    Sgd { lr: f64 },
    Adam(AdamConfig),
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Sgd { lr: 0.01 }
    }
}

impl OptimizerConfig {
    pub fn sgd(lr: f64) -> Self {
        OptimizerConfig::Sgd { lr }
    }

    /// Adam with the usual defaults and the given learning rate.
    pub fn adam(lr: f64) -> Self {
        OptimizerConfig::Adam(AdamConfig::default().with_lr(lr))
    }

    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "SGD",
            OptimizerConfig::Adam(_) => "Adam",
        }
    }

    pub fn lr(&self) -> f64 {
        match self {
            OptimizerConfig::Sgd { lr } => *lr,
            OptimizerConfig::Adam(c) => c.lr,
        }
    }

    pub fn aux_per_param(&self) -> usize {
        match self {
            OptimizerConfig::Sgd { .. } => 0,
            OptimizerConfig::Adam(_) => 2,
        }
    }

    /// Check every hyperparameter against its valid range.
    pub fn validate(&self) -> Result<()> {
        match self {
            OptimizerConfig::Sgd { lr } => check_lr(*lr),
            OptimizerConfig::Adam(c) => c.validate(),
        }
    }

    /// Validate and allocate the optimizer state for `param_len` elements.
    pub fn build(&self, param_len: usize) -> Result<OptimizerState> {
        self.validate()?;
        let optimizer: Box<dyn Optimizer> = match *self {
            OptimizerConfig::Sgd { lr } => Box::new(Sgd::new(lr)),
            OptimizerConfig::Adam(config) => Box::new(Adam::new(config)),
        };
        let aux = vec![0.0; optimizer.aux_per_param() * param_len];
        debug!(
            optimizer = optimizer.name(),
            param_len,
            aux_len = aux.len(),
            "optimizer state initialized"
        );
        Ok(OptimizerState {
            optimizer,
            aux,
            param_len,
            steps: 0,
        })
    }
}

pub(crate) fn check_lr(lr: f64) -> Result<()> {
    if !lr.is_finite() || lr <= 0.0 {
        return Err(Error::InvalidHyperparameter {
            name: "lr",
            value: lr,
            reason: "must be finite and positive",
        });
    }
    Ok(())
}

/// An initialized optimizer: the update rule plus its aux region.
#[derive(Debug)]
pub struct OptimizerState {
    optimizer: Box<dyn Optimizer>,
    aux: Vec<f64>,
    param_len: usize,
    steps: u64,
}

impl OptimizerState {
    /// Apply one update from the accumulated gradients.
    pub fn step(&mut self, slots: &[ParamSlot], params: &mut ParamsMut<'_>, grads: &[f64]) {
        debug_assert_eq!(grads.len(), self.param_len);
        self.optimizer.step(slots, params, grads, &mut self.aux);
        self.steps += 1;
    }

    pub fn name(&self) -> &'static str {
        self.optimizer.name()
    }

    /// The optimizer region.
    pub fn aux(&self) -> &[f64] {
        &self.aux
    }

    pub fn param_len(&self) -> usize {
        self.param_len
    }

    /// Number of steps applied so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_lr_validation() {
        assert!(OptimizerConfig::sgd(0.1).validate().is_ok());
        for lr in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = OptimizerConfig::sgd(lr).validate().unwrap_err();
            assert!(matches!(err, Error::InvalidHyperparameter { name: "lr", .. }));
        }
    }

    #[test]
    fn test_build_sizes_aux() {
        let sgd = OptimizerConfig::sgd(0.1).build(10).unwrap();
        assert_eq!(sgd.aux().len(), 0);
        assert_eq!(sgd.name(), "SGD");

        let adam = OptimizerConfig::adam(0.1).build(10).unwrap();
        assert_eq!(adam.aux().len(), 20);
        assert!(adam.aux().iter().all(|&v| v == 0.0));
        assert_eq!(adam.steps(), 0);
    }

    #[test]
    fn test_build_rejects_invalid() {
        assert!(OptimizerConfig::sgd(-0.5).build(3).is_err());
    }
}

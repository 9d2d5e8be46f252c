use strata_core::layout::{ParamSlot, ParamsMut};

use crate::optimizer::Optimizer;

/// Stochastic gradient descent: `w -= lr * g`. Stateless.
#[derive(Debug, Clone, Copy)]
pub struct Sgd {
    lr: f64,
}

impl Sgd {
    pub fn new(lr: f64) -> Self {
        Sgd { lr }
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        "SGD"
    }

    fn aux_per_param(&self) -> usize {
        0
    }

    fn step(
        &mut self,
        slots: &[ParamSlot],
        params: &mut ParamsMut<'_>,
        grads: &[f64],
        _aux: &mut [f64],
    ) {
        for slot in slots {
            let g = &grads[slot.flat..slot.flat + slot.len];
            for (w, g) in params.get_mut(slot).iter_mut().zip(g) {
                *w -= self.lr * g;
            }
        }
    }
}

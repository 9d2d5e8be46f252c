//! # strata-optim
//!
//! In-place optimizers for compiled Strata graphs.
//!
//! Optimizers update parameters through the flat parameter layout of a
//! compiled graph: one gradient element and `aux_per_param` state elements
//! per parameter element, addressed by each `ParamSlot`'s flat offset.
//!
//! - [`Sgd`] — `w -= lr * g`
//! - [`Adam`] — Adam with a global step counter
//!
//! Build one with [`OptimizerConfig::build`], which validates the
//! hyperparameters and allocates the zeroed state.

pub mod adam;
pub mod optimizer;
pub mod sgd;

pub use adam::{Adam, AdamConfig};
pub use optimizer::{Optimizer, OptimizerConfig, OptimizerState};
pub use sgd::Sgd;

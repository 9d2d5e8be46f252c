//! # strata-nn
//!
//! Element and vector kernels that compiled graphs plug into their tapes:
//!
//! - [`activation`] — `Activation` → forward/derivative function pointers
//! - [`loss`] — loss kinds with value and derivative kernels
//! - [`init`] — weight and bias initializers

pub mod activation;
pub mod init;
pub mod loss;

pub use activation::{ActivationKernel, DerivativeKernel, Transform};
pub use loss::{Loss, LossKernel};

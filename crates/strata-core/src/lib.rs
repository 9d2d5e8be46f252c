//! # strata-core
//!
//! Graph model, scheduling, memory layout and primitive kernels for Strata.
//!
//! This crate provides:
//! - [`Graph`] / [`GraphBuilder`] — layered node/edge graphs with activations
//! - [`Tensor`] — host-side parameter storage, shareable with compiled code
//! - [`Schedule`] — topological execution sets
//! - [`MemoryLayout`] — flat offset maps and the two parameter ownership modes
//! - [`kernels`] — vector/matrix primitives used by every compiled kernel
//! - [`Error`] / [`Result`] — the error type shared by all Strata crates

pub mod error;
pub mod graph;
pub mod kernels;
pub mod layout;
pub mod schedule;
pub mod shape;
pub mod tensor;

pub use error::{Error, Result};
pub use graph::{Activation, Edge, EdgeId, Graph, GraphBuilder, Node, NodeId, NodeSpec};
pub use layout::{
    compile_layout, placement_for, CopyPlacement, EdgeSlot, MemoryLayout, NodeSlot, ParamOwner,
    ParamPlacement, ParamSlot, ParamStore, ParamView, ParamsMut, ParamsRef, ReferencePlacement,
    WeightOwnership,
};
pub use schedule::{ExecutionSet, Schedule};
pub use shape::Shape;
pub use tensor::{Tensor, TensorWriteGuard};

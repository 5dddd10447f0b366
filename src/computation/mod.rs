// src/computation/mod.rs

//! Computations and their arguments.
//!
//! - [`argument`] holds the typed argument model and buffer identity.
//! - [`array`] provides device arrays and views.
//! - [`kernel`] parses kernel signatures and validates calls.
//! - [`element`] defines the unit of work the DAG orders.
//! - [`dependency`] contains the pluggable conflict rules.

pub mod argument;
pub mod array;
pub mod dependency;
pub mod element;
pub mod kernel;

pub use argument::{Argument, ArgumentType, ArgumentValue, BufferId, BufferIdentity};
pub use array::{ArrayView, DeviceArray};
pub use dependency::{ConservativeDependency, DependencyPolicy, WithConstDependency};
pub use element::{ComputationKind, ComputationalElement, ElementState, FailureCause};
pub use kernel::{CallValue, Kernel, KernelId, LaunchConfig, Parameter};

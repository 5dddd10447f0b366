// src/config/mod.rs

//! Workload files for the `streamdag` replay tool.
//!
//! - `model.rs` holds the TOML data model and its validated form.
//! - `loader.rs` reads workload files from disk.
//! - `validate.rs` implements the raw → validated conversion.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    ArrayConfig, ArraySpec, KernelConfig, KernelSpec, LaunchEntry, RawWorkload, Workload,
    WorkloadArg, WorkloadSection, WorkloadStep,
};

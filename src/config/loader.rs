// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{RawWorkload, Workload};
use crate::errors::Result;

/// Read and deserialize a workload file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkload> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "read workload file");
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawWorkload> {
    Ok(toml::from_str(contents)?)
}

/// Read, deserialize and validate a workload file.
///
/// Validation checks that every referenced array and kernel exists, that
/// signatures parse and that every launch matches its kernel's signature.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Workload> {
    let raw = load_from_path(&path)?;
    Workload::try_from(raw)
}

// src/types.rs

use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

/// Which dependency policy an execution context is built with.
///
/// - `WithConst`: read-read access to the same buffer never orders two
///   computations (default behaviour).
/// - `Conservative`: any shared buffer orders two computations, regardless of
///   const-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyPolicyKind {
    WithConst,
    Conservative,
}

impl Default for DependencyPolicyKind {
    fn default() -> Self {
        DependencyPolicyKind::WithConst
    }
}

impl FromStr for DependencyPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "with-const" | "with_const" => Ok(DependencyPolicyKind::WithConst),
            "conservative" => Ok(DependencyPolicyKind::Conservative),
            other => Err(format!(
                "invalid dependency_policy: {other} (expected \"with-const\" or \"conservative\")"
            )),
        }
    }
}

/// When registered computations are handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IssuePolicyKind {
    /// Issue as soon as the stream has been assigned.
    Eager,
    /// Batch issues until `batch_size` computations are pending or a flush is
    /// forced.
    Deferred,
}

impl Default for IssuePolicyKind {
    fn default() -> Self {
        IssuePolicyKind::Eager
    }
}

impl FromStr for IssuePolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eager" => Ok(IssuePolicyKind::Eager),
            "deferred" => Ok(IssuePolicyKind::Deferred),
            other => Err(format!(
                "invalid issue_policy: {other} (expected \"eager\" or \"deferred\")"
            )),
        }
    }
}

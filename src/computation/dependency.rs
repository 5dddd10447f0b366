// src/computation/dependency.rs

//! Pluggable dependency policies.
//!
//! A policy answers two questions about an argument of an earlier
//! computation and an argument of a later one:
//!
//! - do they conflict, i.e. must the later computation wait for the earlier?
//! - if so, does the later access *supersede* the earlier one, so that future
//!   computations only need to order against the later access?
//!
//! The answers must be deterministic and depend only on buffer identity and
//! access mode; sub-ranges of the same buffer are a full conflict.

use std::fmt;

use crate::computation::argument::Argument;
use crate::types::DependencyPolicyKind;

pub trait DependencyPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// `later` must be ordered after `earlier`.
    fn conflicts(&self, earlier: &Argument, later: &Argument) -> bool;

    /// Once `later` conflicted with `earlier`, `earlier` can no longer be the
    /// source of a dependency for future computations.
    fn supersedes(&self, earlier: &Argument, later: &Argument) -> bool;
}

/// Read-after-read is free; every other access pair on a shared buffer is a
/// conflict. A later read does not supersede an earlier write, since the
/// next writer must still wait for that earlier write as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithConstDependency;

impl DependencyPolicy for WithConstDependency {
    fn name(&self) -> &'static str {
        "with-const"
    }

    fn conflicts(&self, earlier: &Argument, later: &Argument) -> bool {
        earlier.aliases(later) && !(earlier.is_const() && later.is_const())
    }

    fn supersedes(&self, _earlier: &Argument, later: &Argument) -> bool {
        !later.is_const()
    }
}

/// Ignores const-ness: any shared buffer is a conflict and the later access
/// always takes over.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConservativeDependency;

impl DependencyPolicy for ConservativeDependency {
    fn name(&self) -> &'static str {
        "conservative"
    }

    fn conflicts(&self, earlier: &Argument, later: &Argument) -> bool {
        earlier.aliases(later)
    }

    fn supersedes(&self, _earlier: &Argument, _later: &Argument) -> bool {
        true
    }
}

/// Build the policy selected by configuration.
pub fn policy_for(kind: DependencyPolicyKind) -> Box<dyn DependencyPolicy> {
    match kind {
        DependencyPolicyKind::WithConst => Box::new(WithConstDependency),
        DependencyPolicyKind::Conservative => Box::new(ConservativeDependency),
    }
}

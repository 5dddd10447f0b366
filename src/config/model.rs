// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::computation::{ArgumentType, LaunchConfig, Parameter};
use crate::context::ContextOptions;
use crate::types::{DependencyPolicyKind, IssuePolicyKind};

/// Workload file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// dependency_policy = "with-const"
/// issue_policy = "deferred"
/// batch_size = 4
///
/// [array.x]
/// type = "float"
/// len = 1024
///
/// [kernel.square]
/// signature = "pointer float, sint32"
///
/// [[launch]]
/// kernel = "square"
/// args = ["x", 1024]
///
/// [[launch]]
/// access = "x"
/// ```
///
/// Every section except `[[launch]]` is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawWorkload {
    #[serde(default)]
    pub config: WorkloadSection,

    /// `[array.<name>]` sections.
    #[serde(default)]
    pub array: BTreeMap<String, ArrayConfig>,

    /// `[kernel.<name>]` sections.
    #[serde(default)]
    pub kernel: BTreeMap<String, KernelConfig>,

    /// `[[launch]]` entries, in submission order.
    #[serde(default)]
    pub launch: Vec<LaunchEntry>,
}

/// `[config]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WorkloadSection {
    #[serde(default)]
    pub dependency_policy: DependencyPolicyKind,

    #[serde(default)]
    pub issue_policy: IssuePolicyKind,

    /// Number of vertices deferred issue collects before issuing them.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on the number of streams; unbounded if absent.
    #[serde(default)]
    pub max_streams: Option<usize>,
}

fn default_batch_size() -> usize {
    8
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            dependency_policy: DependencyPolicyKind::default(),
            issue_policy: IssuePolicyKind::default(),
            batch_size: default_batch_size(),
            max_streams: None,
        }
    }
}

/// `[array.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ArrayConfig {
    /// Element type, e.g. `"float"` or `"sint32"`.
    #[serde(rename = "type")]
    pub element_type: String,

    pub len: usize,
}

/// `[kernel.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelConfig {
    /// Comma separated parameter list, e.g. `"const pointer float, sint32"`.
    pub signature: String,
}

/// One `[[launch]]` entry: either a kernel launch (`kernel` + `args`) or a
/// host access to an array (`access`, optionally `write = true`).
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchEntry {
    #[serde(default)]
    pub kernel: Option<String>,

    /// Array names (strings) and scalars, in parameter order.
    #[serde(default)]
    pub args: Vec<toml::Value>,

    #[serde(default = "default_dim")]
    pub grid: u32,

    #[serde(default = "default_dim")]
    pub block: u32,

    #[serde(default)]
    pub access: Option<String>,

    #[serde(default)]
    pub write: bool,
}

fn default_dim() -> u32 {
    1
}

/// A validated array declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySpec {
    pub element_type: ArgumentType,
    pub len: usize,
}

/// A validated kernel declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpec {
    pub signature: String,
    pub parameters: Vec<Parameter>,
}

/// A launch argument after name resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadArg {
    Array(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// One validated `[[launch]]` entry.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadStep {
    Launch {
        kernel: String,
        args: Vec<WorkloadArg>,
        config: LaunchConfig,
    },
    Access {
        array: String,
        write: bool,
    },
}

impl WorkloadStep {
    pub fn describe(&self) -> String {
        match self {
            WorkloadStep::Launch { kernel, args, .. } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        WorkloadArg::Array(name) => name.clone(),
                        WorkloadArg::Int(v) => v.to_string(),
                        WorkloadArg::Float(v) => v.to_string(),
                        WorkloadArg::Bool(v) => v.to_string(),
                    })
                    .collect();
                format!("{kernel}({})", args.join(", "))
            }
            WorkloadStep::Access { array, write: true } => format!("write {array}"),
            WorkloadStep::Access { array, write: false } => format!("read {array}"),
        }
    }
}

/// A workload that passed validation.
///
/// Build it with `Workload::try_from(raw)` or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone)]
pub struct Workload {
    pub config: WorkloadSection,
    pub arrays: BTreeMap<String, ArraySpec>,
    pub kernels: BTreeMap<String, KernelSpec>,
    pub steps: Vec<WorkloadStep>,
}

impl Workload {
    pub(crate) fn new_unchecked(
        config: WorkloadSection,
        arrays: BTreeMap<String, ArraySpec>,
        kernels: BTreeMap<String, KernelSpec>,
        steps: Vec<WorkloadStep>,
    ) -> Self {
        Self {
            config,
            arrays,
            kernels,
            steps,
        }
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            dependency_policy: self.config.dependency_policy,
            issue_policy: self.config.issue_policy,
            batch_size: self.config.batch_size,
            max_streams: self.config.max_streams,
        }
    }
}

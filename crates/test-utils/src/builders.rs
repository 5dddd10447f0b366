#![allow(dead_code)]

use streamdag::computation::{
    Argument, ArgumentType, BufferId, ComputationKind, ComputationalElement,
};
use streamdag::config::{ArrayConfig, KernelConfig, LaunchEntry, RawWorkload, Workload};

/// Builder for raw elements that only touch buffers, for DAG-level tests.
///
/// Buffers are plain ids; no device memory is involved, so these elements
/// go straight into an `ExecutionDag`.
pub struct ElementBuilder {
    label: String,
    arguments: Vec<Argument>,
}

impl ElementBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            arguments: Vec::new(),
        }
    }

    /// Argument that writes buffer `id`.
    pub fn writes(mut self, id: u64) -> Self {
        self.arguments
            .push(Argument::array(ArgumentType::Float, &BufferId(id), false));
        self
    }

    /// Argument that only reads buffer `id`.
    pub fn reads(mut self, id: u64) -> Self {
        self.arguments
            .push(Argument::array(ArgumentType::Float, &BufferId(id), true));
        self
    }

    pub fn build(self) -> ComputationalElement {
        ComputationalElement::new(
            ComputationKind::KernelLaunch {
                kernel: streamdag::computation::KernelId(0),
                name: self.label,
                config: Default::default(),
            },
            self.arguments,
        )
    }
}

/// Element writing every buffer in `ids`.
pub fn writer(ids: &[u64]) -> ComputationalElement {
    ids.iter()
        .fold(ElementBuilder::new("write"), |b, &id| b.writes(id))
        .build()
}

/// Element reading every buffer in `ids`.
pub fn reader(ids: &[u64]) -> ComputationalElement {
    ids.iter()
        .fold(ElementBuilder::new("read"), |b, &id| b.reads(id))
        .build()
}

/// Builder for `Workload` to simplify config-level tests.
pub struct WorkloadBuilder {
    raw: RawWorkload,
}

impl WorkloadBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawWorkload::default(),
        }
    }

    pub fn with_array(mut self, name: &str, element_type: &str, len: usize) -> Self {
        self.raw.array.insert(
            name.to_string(),
            ArrayConfig {
                element_type: element_type.to_string(),
                len,
            },
        );
        self
    }

    pub fn with_kernel(mut self, name: &str, signature: &str) -> Self {
        self.raw.kernel.insert(
            name.to_string(),
            KernelConfig {
                signature: signature.to_string(),
            },
        );
        self
    }

    /// Launch `kernel` with array names and integer scalars.
    pub fn launch(mut self, kernel: &str, args: &[&str]) -> Self {
        let args = args
            .iter()
            .map(|a| match a.parse::<i64>() {
                Ok(v) => toml::Value::Integer(v),
                Err(_) => toml::Value::String(a.to_string()),
            })
            .collect();
        self.raw.launch.push(LaunchEntry {
            kernel: Some(kernel.to_string()),
            args,
            grid: 1,
            block: 1,
            access: None,
            write: false,
        });
        self
    }

    pub fn access(mut self, array: &str, write: bool) -> Self {
        self.raw.launch.push(LaunchEntry {
            kernel: None,
            args: Vec::new(),
            grid: 1,
            block: 1,
            access: Some(array.to_string()),
            write,
        });
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.raw.config.batch_size = batch_size;
        self
    }

    pub fn raw(self) -> RawWorkload {
        self.raw
    }

    pub fn build(self) -> Workload {
        Workload::try_from(self.raw).expect("Failed to build valid workload from builder")
    }
}

impl Default for WorkloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// src/config/validate.rs

use std::collections::BTreeMap;

use crate::computation::kernel::parse_signature;
use crate::computation::{ArgumentType, BufferId, CallValue, Kernel, LaunchConfig};
use crate::config::model::{
    ArraySpec, KernelSpec, LaunchEntry, RawWorkload, Workload, WorkloadArg, WorkloadSection,
    WorkloadStep,
};
use crate::errors::{Result, SchedError};

impl TryFrom<RawWorkload> for Workload {
    type Error = SchedError;

    fn try_from(raw: RawWorkload) -> std::result::Result<Self, Self::Error> {
        ensure_has_launches(&raw)?;
        validate_section(&raw.config)?;
        let arrays = validate_arrays(&raw)?;
        let kernels = validate_kernels(&raw)?;
        let steps = raw
            .launch
            .iter()
            .enumerate()
            .map(|(index, entry)| validate_step(index, entry, &arrays, &kernels))
            .collect::<Result<Vec<_>>>()?;
        Ok(Workload::new_unchecked(raw.config, arrays, kernels, steps))
    }
}

fn config_error(msg: impl Into<String>) -> SchedError {
    SchedError::ConfigError(msg.into())
}

fn ensure_has_launches(raw: &RawWorkload) -> Result<()> {
    if raw.launch.is_empty() {
        return Err(config_error(
            "workload must contain at least one [[launch]] entry",
        ));
    }
    Ok(())
}

fn validate_section(section: &WorkloadSection) -> Result<()> {
    if section.batch_size == 0 {
        return Err(config_error("[config].batch_size must be >= 1 (got 0)"));
    }
    if section.max_streams == Some(0) {
        return Err(config_error("[config].max_streams must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_arrays(raw: &RawWorkload) -> Result<BTreeMap<String, ArraySpec>> {
    raw.array
        .iter()
        .map(|(name, array)| {
            let element_type: ArgumentType = array.element_type.parse().map_err(|e| {
                config_error(format!("array '{name}': {e}"))
            })?;
            if element_type == ArgumentType::Void {
                return Err(config_error(format!(
                    "array '{name}' needs a concrete element type, not void"
                )));
            }
            if element_type.size_bytes().checked_mul(array.len).is_none() {
                return Err(config_error(format!(
                    "array '{name}': {} x {element_type} is too large",
                    array.len
                )));
            }
            Ok((
                name.clone(),
                ArraySpec {
                    element_type,
                    len: array.len,
                },
            ))
        })
        .collect()
}

fn validate_kernels(raw: &RawWorkload) -> Result<BTreeMap<String, KernelSpec>> {
    raw.kernel
        .iter()
        .map(|(name, kernel)| {
            let parameters = parse_signature(&kernel.signature)?;
            Ok((
                name.clone(),
                KernelSpec {
                    signature: kernel.signature.clone(),
                    parameters,
                },
            ))
        })
        .collect()
}

fn validate_step(
    index: usize,
    entry: &LaunchEntry,
    arrays: &BTreeMap<String, ArraySpec>,
    kernels: &BTreeMap<String, KernelSpec>,
) -> Result<WorkloadStep> {
    match (&entry.kernel, &entry.access) {
        (Some(kernel), None) => validate_launch(index, kernel, entry, arrays, kernels),
        (None, Some(array)) => {
            if !entry.args.is_empty() {
                return Err(config_error(format!(
                    "launch #{index}: host access to '{array}' takes no args"
                )));
            }
            if !arrays.contains_key(array) {
                return Err(config_error(format!(
                    "launch #{index}: unknown array '{array}'"
                )));
            }
            Ok(WorkloadStep::Access {
                array: array.clone(),
                write: entry.write,
            })
        }
        (Some(_), Some(_)) => Err(config_error(format!(
            "launch #{index}: set either `kernel` or `access`, not both"
        ))),
        (None, None) => Err(config_error(format!(
            "launch #{index}: missing `kernel` (or `access`)"
        ))),
    }
}

fn validate_launch(
    index: usize,
    kernel: &str,
    entry: &LaunchEntry,
    arrays: &BTreeMap<String, ArraySpec>,
    kernels: &BTreeMap<String, KernelSpec>,
) -> Result<WorkloadStep> {
    let spec = kernels
        .get(kernel)
        .ok_or_else(|| SchedError::UnknownKernel(kernel.to_string()))?;
    if entry.grid == 0 || entry.block == 0 {
        return Err(config_error(format!(
            "launch #{index}: grid and block must be >= 1"
        )));
    }

    let args = entry
        .args
        .iter()
        .map(|value| workload_arg(index, value, arrays))
        .collect::<Result<Vec<_>>>()?;

    // Stand-in buffers are enough to check arity and types.
    let values: Vec<CallValue> = args
        .iter()
        .enumerate()
        .map(|(slot, arg)| match arg {
            WorkloadArg::Array(name) => CallValue::Array {
                buffer: BufferId(slot as u64),
                element_type: arrays[name].element_type,
            },
            WorkloadArg::Int(v) => CallValue::Int(*v),
            WorkloadArg::Float(v) => CallValue::Float(*v),
            WorkloadArg::Bool(v) => CallValue::Bool(*v),
        })
        .collect();
    Kernel::new(kernel, &spec.signature)?.bind(&values)?;

    Ok(WorkloadStep::Launch {
        kernel: kernel.to_string(),
        args,
        config: LaunchConfig::new(entry.grid, entry.block),
    })
}

fn workload_arg(
    index: usize,
    value: &toml::Value,
    arrays: &BTreeMap<String, ArraySpec>,
) -> Result<WorkloadArg> {
    match value {
        toml::Value::String(name) if arrays.contains_key(name) => {
            Ok(WorkloadArg::Array(name.clone()))
        }
        toml::Value::String(name) => Err(config_error(format!(
            "launch #{index}: unknown array '{name}'"
        ))),
        toml::Value::Integer(v) => Ok(WorkloadArg::Int(*v)),
        toml::Value::Float(v) => Ok(WorkloadArg::Float(*v)),
        toml::Value::Boolean(v) => Ok(WorkloadArg::Bool(*v)),
        other => Err(config_error(format!(
            "launch #{index}: unsupported argument {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Workload> {
        let raw: RawWorkload = toml::from_str(text)?;
        Workload::try_from(raw)
    }

    #[test]
    fn minimal_workload() {
        let w = parse(
            r#"
            [array.x]
            type = "float"
            len = 4

            [kernel.k]
            signature = "pointer float, sint32"

            [[launch]]
            kernel = "k"
            args = ["x", 4]
            "#,
        )
        .unwrap();

        assert_eq!(w.steps.len(), 1);
        assert_eq!(w.steps[0].describe(), "k(x, 4)");
        assert_eq!(w.context_options().batch_size, 8);
    }

    #[test]
    fn empty_workload_is_rejected() {
        let err = parse("[config]\nbatch_size = 2\n").unwrap_err();
        assert!(matches!(err, SchedError::ConfigError(_)));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = parse(
            r#"
            [config]
            batch_size = 0

            [array.x]
            type = "float"
            len = 1

            [[launch]]
            access = "x"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn arity_and_type_errors_surface() {
        let base = r#"
            [array.x]
            type = "sint32"
            len = 4

            [kernel.k]
            signature = "pointer float"
            "#;

        let err = parse(&format!("{base}\n[[launch]]\nkernel = \"k\"\nargs = []\n")).unwrap_err();
        assert!(matches!(err, SchedError::Arity { expected: 1, got: 0, .. }));

        let err = parse(&format!("{base}\n[[launch]]\nkernel = \"k\"\nargs = [\"x\"]\n")).unwrap_err();
        assert!(matches!(err, SchedError::ArgumentType { index: 0, .. }));
    }

    #[test]
    fn oversized_array_is_rejected() {
        let err = parse(
            r#"
            [array.huge]
            type = "double"
            len = 9223372036854775807

            [[launch]]
            access = "huge"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SchedError::ConfigError(msg) if msg.contains("too large")));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let err = parse("[[launch]]\nkernel = \"nope\"\n").unwrap_err();
        assert!(matches!(err, SchedError::UnknownKernel(name) if name == "nope"));

        let err = parse("[[launch]]\naccess = \"y\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown array 'y'"));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let err = parse(
            r#"
            [kernel.k]
            signature = "pointer banana"

            [[launch]]
            kernel = "k"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SchedError::InvalidSignature { .. }));
    }
}

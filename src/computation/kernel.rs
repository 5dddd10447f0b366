// src/computation/kernel.rs

//! Kernel handles and their parameter signatures.
//!
//! A signature is a comma separated list of parameters, e.g.
//! `"const pointer float, pointer float, sint32"`. Pointer parameters become
//! array arguments; `const` or `in` marks them read-only, `out` / `inout` are
//! accepted for symmetry and mean read-write. Everything else is a scalar
//! passed by value.

use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

use crate::computation::argument::{
    Argument, ArgumentType, ArgumentValue, BufferId, BufferIdentity,
};
use crate::computation::array::{ArrayView, DeviceArray};
use crate::errors::{Result, SchedError};

static NEXT_KERNEL_ID: AtomicU64 = AtomicU64::new(0);

static POINTER_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(const|in|out|inout)\s+)?pointer(?:\s+(\w+))?$")
        .expect("pointer parameter regex is valid")
});

static SCALAR_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)$").expect("scalar parameter regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u64);

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel{}", self.0)
    }
}

/// One declared kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub ty: ArgumentType,
    pub is_array: bool,
    pub is_const: bool,
}

/// A value supplied by the caller for one kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallValue {
    Array {
        buffer: BufferId,
        element_type: ArgumentType,
    },
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CallValue {
    fn describe(&self) -> String {
        match self {
            CallValue::Array { element_type, .. } => format!("array of {element_type}"),
            CallValue::Int(_) => "integer".to_string(),
            CallValue::Float(_) => "floating point".to_string(),
            CallValue::Bool(_) => "bool".to_string(),
        }
    }
}

impl From<&DeviceArray> for CallValue {
    fn from(array: &DeviceArray) -> Self {
        CallValue::Array {
            buffer: array.buffer_id(),
            element_type: array.element_type(),
        }
    }
}

impl From<&ArrayView> for CallValue {
    fn from(view: &ArrayView) -> Self {
        CallValue::Array {
            buffer: view.buffer_id(),
            element_type: view.element_type(),
        }
    }
}

impl From<i64> for CallValue {
    fn from(v: i64) -> Self {
        CallValue::Int(v)
    }
}

impl From<i32> for CallValue {
    fn from(v: i32) -> Self {
        CallValue::Int(v.into())
    }
}

impl From<f64> for CallValue {
    fn from(v: f64) -> Self {
        CallValue::Float(v)
    }
}

impl From<bool> for CallValue {
    fn from(v: bool) -> Self {
        CallValue::Bool(v)
    }
}

/// Grid/block configuration of a kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: u32,
    pub block: u32,
    pub shared_mem_bytes: u32,
}

impl LaunchConfig {
    pub fn new(grid: u32, block: u32) -> Self {
        Self {
            grid,
            block,
            shared_mem_bytes: 0,
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// A loaded kernel: name plus parsed signature.
///
/// Compiling and loading the actual device code is the runtime's business;
/// the scheduler only needs the signature to validate calls and to learn
/// which arguments are arrays and which of them are read-only.
#[derive(Debug, Clone)]
pub struct Kernel {
    id: KernelId,
    name: String,
    signature: String,
    parameters: Vec<Parameter>,
    launch_count: u64,
}

impl Kernel {
    pub fn new(name: impl Into<String>, signature: &str) -> Result<Self> {
        let parameters = parse_signature(signature)?;
        Ok(Self {
            id: KernelId(NEXT_KERNEL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            signature: signature.to_string(),
            parameters,
            launch_count: 0,
        })
    }

    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// How many launches have been built from this kernel.
    pub fn launch_count(&self) -> u64 {
        self.launch_count
    }

    pub(crate) fn increment_launch_count(&mut self) {
        self.launch_count += 1;
    }

    /// Check `values` against the signature and turn them into arguments.
    ///
    /// Fails with [`SchedError::Arity`] or [`SchedError::ArgumentType`]; no
    /// partial result is ever produced.
    pub fn bind(&self, values: &[CallValue]) -> Result<Vec<Argument>> {
        if values.len() != self.parameters.len() {
            return Err(SchedError::Arity {
                kernel: self.name.clone(),
                expected: self.parameters.len(),
                got: values.len(),
            });
        }

        self.parameters
            .iter()
            .zip(values)
            .enumerate()
            .map(|(index, (param, value))| self.bind_one(index, param, value))
            .collect()
    }

    fn bind_one(&self, index: usize, param: &Parameter, value: &CallValue) -> Result<Argument> {
        let mismatch = || SchedError::ArgumentType {
            kernel: self.name.clone(),
            index,
            expected: param.ty,
            got: value.describe(),
        };

        if param.is_array {
            return match *value {
                CallValue::Array {
                    buffer,
                    element_type,
                } if param.ty == ArgumentType::Void || param.ty == element_type => {
                    Ok(Argument::array(element_type, &buffer, param.is_const))
                }
                _ => Err(mismatch()),
            };
        }

        let bound = match *value {
            CallValue::Int(v) if param.ty.is_integer() => ArgumentValue::Int(v),
            // Integers widen into floating point parameters, never the other way.
            CallValue::Int(v) if param.ty.is_floating() => ArgumentValue::Float(v as f64),
            CallValue::Float(v) if param.ty.is_floating() => ArgumentValue::Float(v),
            CallValue::Bool(v) if param.ty == ArgumentType::Bool => ArgumentValue::Bool(v),
            _ => return Err(mismatch()),
        };
        Ok(Argument::scalar(param.ty, bound))
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.signature)
    }
}

/// Parse a comma separated parameter list.
pub fn parse_signature(signature: &str) -> Result<Vec<Parameter>> {
    let invalid = |reason: String| SchedError::InvalidSignature {
        signature: signature.to_string(),
        reason,
    };

    if signature.trim().is_empty() {
        return Ok(Vec::new());
    }

    signature
        .split(',')
        .map(|raw| {
            let param = raw.split_whitespace().collect::<Vec<_>>().join(" ");

            if let Some(caps) = POINTER_PARAM.captures(&param) {
                let is_const = matches!(caps.get(1).map(|m| m.as_str()), Some("const" | "in"));
                let ty = match caps.get(2) {
                    Some(ty) => ty.as_str().parse::<ArgumentType>().map_err(invalid)?,
                    None => ArgumentType::Void,
                };
                return Ok(Parameter {
                    ty,
                    is_array: true,
                    is_const,
                });
            }

            if let Some(caps) = SCALAR_PARAM.captures(&param) {
                let ty = caps[1].parse::<ArgumentType>().map_err(invalid)?;
                if ty == ArgumentType::Void {
                    return Err(invalid("void is only valid behind a pointer".to_string()));
                }
                return Ok(Parameter {
                    ty,
                    is_array: false,
                    is_const: true,
                });
            }

            Err(invalid(format!("cannot parse parameter '{param}'")))
        })
        .collect()
}

// src/computation/argument.rs

//! Argument model shared by every computational element.
//!
//! An [`Argument`] is the typed, immutable description of one parameter of a
//! computation: its element type, whether it refers to a device array, whether
//! the computation only reads it, and the bound value. For array arguments the
//! bound value is a [`BufferId`], which is the only thing dependency policies
//! compare.

use std::fmt;
use std::str::FromStr;

/// Opaque identity of an allocated device buffer.
///
/// Two arguments alias iff they carry the same `BufferId`. Views and offsets
/// layered on top of a buffer report the id of the underlying allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// Anything that can hand out the identity of the buffer it refers to.
pub trait BufferIdentity {
    fn buffer_id(&self) -> BufferId;
}

impl BufferIdentity for BufferId {
    fn buffer_id(&self) -> BufferId {
        *self
    }
}

/// Semantic element type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentType {
    Bool,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Float,
    Double,
    /// Untyped memory, only valid behind a pointer.
    Void,
}

impl ArgumentType {
    /// Size of one element in bytes (`Void` counts as a byte).
    pub fn size_bytes(self) -> usize {
        match self {
            ArgumentType::Bool | ArgumentType::Sint8 | ArgumentType::Void => 1,
            ArgumentType::Sint16 => 2,
            ArgumentType::Sint32 | ArgumentType::Float => 4,
            ArgumentType::Sint64 | ArgumentType::Double => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ArgumentType::Sint8 | ArgumentType::Sint16 | ArgumentType::Sint32 | ArgumentType::Sint64
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, ArgumentType::Float | ArgumentType::Double)
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgumentType::Bool => "bool",
            ArgumentType::Sint8 => "sint8",
            ArgumentType::Sint16 => "sint16",
            ArgumentType::Sint32 => "sint32",
            ArgumentType::Sint64 => "sint64",
            ArgumentType::Float => "float",
            ArgumentType::Double => "double",
            ArgumentType::Void => "void",
        };
        f.write_str(s)
    }
}

impl FromStr for ArgumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bool" => Ok(ArgumentType::Bool),
            "char" | "sint8" => Ok(ArgumentType::Sint8),
            "short" | "sint16" => Ok(ArgumentType::Sint16),
            "int" | "sint32" => Ok(ArgumentType::Sint32),
            "long" | "sint64" => Ok(ArgumentType::Sint64),
            "float" => Ok(ArgumentType::Float),
            "double" => Ok(ArgumentType::Double),
            "void" => Ok(ArgumentType::Void),
            other => Err(format!("unknown argument type '{other}'")),
        }
    }
}

/// Value bound to an argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgumentValue {
    Buffer(BufferId),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// A single typed argument of a computation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    ty: ArgumentType,
    is_array: bool,
    is_const: bool,
    value: ArgumentValue,
}

impl Argument {
    /// Array argument referring to `buffer`. `is_const` marks read-only access.
    pub fn array(ty: ArgumentType, buffer: &impl BufferIdentity, is_const: bool) -> Self {
        Self {
            ty,
            is_array: true,
            is_const,
            value: ArgumentValue::Buffer(buffer.buffer_id()),
        }
    }

    /// Scalar argument. Scalars are passed by value and are always const.
    pub fn scalar(ty: ArgumentType, value: ArgumentValue) -> Self {
        Self {
            ty,
            is_array: false,
            is_const: true,
            value,
        }
    }

    pub fn ty(&self) -> ArgumentType {
        self.ty
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn is_const(&self) -> bool {
        self.is_const
    }

    pub fn value(&self) -> ArgumentValue {
        self.value
    }

    /// Identity of the referenced buffer, for array arguments only.
    pub fn buffer_id(&self) -> Option<BufferId> {
        match (self.is_array, self.value) {
            (true, ArgumentValue::Buffer(id)) => Some(id),
            _ => None,
        }
    }

    /// Whole-buffer aliasing: both arguments are arrays over the same buffer.
    pub fn aliases(&self, other: &Argument) -> bool {
        match (self.buffer_id(), other.buffer_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn with_const(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = if self.is_const { "const " } else { "" };
        match self.value {
            ArgumentValue::Buffer(id) => write!(f, "{access}{}* {id}", self.ty),
            ArgumentValue::Int(v) => write!(f, "{} {v}", self.ty),
            ArgumentValue::Float(v) => write!(f, "{} {v}", self.ty),
            ArgumentValue::Bool(v) => write!(f, "{} {v}", self.ty),
        }
    }
}

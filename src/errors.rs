// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::computation::ArgumentType;
use crate::dag::VertexId;
use crate::runtime::StreamId;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("kernel '{kernel}' expects {expected} arguments, got {got}")]
    Arity {
        kernel: String,
        expected: usize,
        got: usize,
    },

    #[error("kernel '{kernel}' argument {index}: expected {expected}, got {got}")]
    ArgumentType {
        kernel: String,
        index: usize,
        expected: ArgumentType,
        got: String,
    },

    #[error("invalid kernel signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("unknown stream {0}")]
    UnknownStream(StreamId),

    #[error("unknown kernel '{0}'")]
    UnknownKernel(String),

    #[error("vertex {0} has no stream")]
    UnboundVertex(VertexId),

    #[error("view [{offset}, +{len}) is out of bounds for an array of {array_len}")]
    InvalidView {
        offset: usize,
        len: usize,
        array_len: usize,
    },

    #[error("invalid buffer {0}")]
    InvalidBuffer(u64),

    #[error("launch of vertex {vertex} failed: {reason}")]
    LaunchFailed { vertex: VertexId, reason: String },

    #[error("vertex {vertex} depends on failed vertex {parent}")]
    ParentFailed { vertex: VertexId, parent: VertexId },

    #[error("vertex {vertex} waits on vertex {parent}, which has no completion event")]
    MissingParentEvent { vertex: VertexId, parent: VertexId },

    #[error("device error: {0}")]
    Device(String),

    #[error("session is closed")]
    SessionClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedError>;

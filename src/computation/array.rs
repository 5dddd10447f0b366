// src/computation/array.rs

//! Device arrays and views over them.
//!
//! Memory itself belongs to the [`DeviceRuntime`](crate::runtime::DeviceRuntime);
//! these types only carry the identity and shape the scheduler needs.

use crate::computation::argument::{ArgumentType, BufferId, BufferIdentity};
use crate::errors::{Result, SchedError};
use crate::runtime::DeviceRuntime;

/// A typed, fixed-length allocation on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceArray {
    id: BufferId,
    element_type: ArgumentType,
    len: usize,
}

impl DeviceArray {
    /// Allocate `len` elements of `element_type` through the runtime.
    pub fn allocate(
        runtime: &dyn DeviceRuntime,
        element_type: ArgumentType,
        len: usize,
    ) -> Result<Self> {
        if element_type == ArgumentType::Void {
            return Err(SchedError::ConfigError(
                "device arrays need a concrete element type".to_string(),
            ));
        }
        let bytes = element_type.size_bytes().checked_mul(len).ok_or_else(|| {
            SchedError::ConfigError(format!(
                "array of {len} x {element_type} does not fit in the address space"
            ))
        })?;
        let id = runtime.allocate(bytes)?;
        Ok(Self {
            id,
            element_type,
            len,
        })
    }

    pub fn element_type(&self) -> ArgumentType {
        self.element_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.element_type.size_bytes() * self.len
    }

    /// A view of `len` elements starting at `offset`.
    pub fn view(&self, offset: usize, len: usize) -> Result<ArrayView> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(ArrayView {
                base: self.id,
                element_type: self.element_type,
                offset,
                len,
            }),
            _ => Err(SchedError::InvalidView {
                offset,
                len,
                array_len: self.len,
            }),
        }
    }
}

impl BufferIdentity for DeviceArray {
    fn buffer_id(&self) -> BufferId {
        self.id
    }
}

/// Sub-range of a [`DeviceArray`].
///
/// Aliasing is tracked per allocation: a view is indistinguishable from its
/// base array (and from any other view of it), even when ranges are disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayView {
    base: BufferId,
    element_type: ArgumentType,
    offset: usize,
    len: usize,
}

impl ArrayView {
    pub fn element_type(&self) -> ArgumentType {
        self.element_type
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl BufferIdentity for ArrayView {
    fn buffer_id(&self) -> BufferId {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SimulatedRuntime;

    #[test]
    fn views_report_the_base_buffer() {
        let rt = SimulatedRuntime::new();
        let array = DeviceArray::allocate(&rt, ArgumentType::Float, 100).unwrap();
        let left = array.view(0, 50).unwrap();
        let right = array.view(50, 50).unwrap();

        assert_eq!(left.buffer_id(), array.buffer_id());
        assert_eq!(right.buffer_id(), array.buffer_id());
        assert_eq!(array.size_bytes(), 400);
    }

    #[test]
    fn void_arrays_are_rejected() {
        let rt = SimulatedRuntime::new();
        assert!(DeviceArray::allocate(&rt, ArgumentType::Void, 4).is_err());
    }

    #[test]
    fn oversized_arrays_are_rejected_before_allocation() {
        let rt = SimulatedRuntime::new();
        let err = DeviceArray::allocate(&rt, ArgumentType::Float, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, SchedError::ConfigError(_)));
        assert_eq!(rt.live_buffers().unwrap(), 0);
    }

    #[test]
    fn views_must_stay_inside_the_array() {
        let rt = SimulatedRuntime::new();
        let array = DeviceArray::allocate(&rt, ArgumentType::Float, 10).unwrap();

        assert!(array.view(10, 0).is_ok());
        assert!(matches!(
            array.view(5, 6),
            Err(SchedError::InvalidView { offset: 5, len: 6, array_len: 10 })
        ));
        assert!(matches!(
            array.view(usize::MAX, 2),
            Err(SchedError::InvalidView { .. })
        ));
    }
}

//! DataView implementation
//!
//! DataView provides a low-level interface for reading and writing multiple
//! number types in an ArrayBuffer, with control over byte order (endianness).
//!
//! A view never caches buffer state. Every access goes back through the heap
//! to the buffer and re-reads its detached flag and current byte length, so a
//! buffer detached after construction makes accesses fail while the view
//! itself stays intact.

use kestrel_gc::{Gc, GcId, GcTraceable, Heap};

use crate::array_buffer::JsArrayBuffer;
use crate::convert::Numeric;
use crate::error::{VmError, VmResult};
use crate::object::JsObject;
use crate::typed_array::TypedArrayKind;
use crate::value::Value;

/// A JavaScript DataView
#[derive(Debug)]
pub struct JsDataView {
    /// Base object (prototype, properties)
    pub object: Gc<JsObject>,
    /// The underlying ArrayBuffer
    buffer: Gc<JsArrayBuffer>,
    /// Byte offset into the buffer
    byte_offset: usize,
    /// Length of the view in bytes
    byte_length: usize,
}

impl GcTraceable for JsDataView {
    const CLASS_NAME: &'static str = "DataView";

    fn trace(&self, tracer: &mut dyn FnMut(GcId)) {
        tracer(self.object.id());
        tracer(self.buffer.id());
    }
}

impl JsDataView {
    /// Create a view. Only the construction algorithm calls this, after it
    /// has validated the window against the buffer.
    pub(crate) fn new(
        object: Gc<JsObject>,
        buffer: Gc<JsArrayBuffer>,
        byte_offset: usize,
        byte_length: usize,
    ) -> Self {
        Self {
            object,
            buffer,
            byte_offset,
            byte_length,
        }
    }

    /// Get the underlying ArrayBuffer
    pub fn buffer(&self) -> Gc<JsArrayBuffer> {
        self.buffer
    }

    /// Byte offset fixed at construction
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Byte length fixed at construction
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Check if the underlying buffer is detached
    pub fn is_detached(&self, heap: &Heap) -> bool {
        heap.get(self.buffer).is_detached()
    }

    /// Whether the window no longer fits the buffer (detached or shrunk).
    pub fn is_out_of_bounds(&self, heap: &Heap) -> bool {
        let buffer = heap.get(self.buffer);
        buffer.is_detached() || self.byte_offset + self.byte_length > buffer.byte_length()
    }

    /// Validate access to `size` bytes at `index` against current state.
    fn check_access(&self, heap: &Heap, index: usize, size: usize) -> VmResult<usize> {
        if self.is_detached(heap) {
            return Err(VmError::detached_buffer("DataView's buffer is detached"));
        }
        if self.is_out_of_bounds(heap) {
            return Err(VmError::type_error("DataView is out of bounds"));
        }
        match index.checked_add(size) {
            Some(end) if end <= self.byte_length => Ok(self.byte_offset + index),
            _ => Err(VmError::range_error(
                "Offset is outside the bounds of the DataView",
            )),
        }
    }

    /// Read one element of `kind` at byte `index` of the view.
    pub fn get_value(
        &self,
        heap: &Heap,
        kind: TypedArrayKind,
        index: usize,
        little_endian: bool,
    ) -> VmResult<Value> {
        let size = kind.element_size();
        let offset = self.check_access(heap, index, size)?;
        let mut bytes = [0u8; 8];
        if !heap.get(self.buffer).read_bytes(offset, &mut bytes[..size]) {
            return Err(VmError::detached_buffer("DataView's buffer is detached"));
        }
        Ok(kind.decode(&bytes, little_endian))
    }

    /// Write one element of `kind` at byte `index` of the view.
    pub fn set_value(
        &self,
        heap: &Heap,
        kind: TypedArrayKind,
        index: usize,
        value: &Numeric,
        little_endian: bool,
    ) -> VmResult<()> {
        let size = kind.element_size();
        let offset = self.check_access(heap, index, size)?;
        let mut bytes = [0u8; 8];
        kind.encode(value, little_endian, &mut bytes);
        if !heap.get(self.buffer).write_bytes(offset, &bytes[..size]) {
            return Err(VmError::detached_buffer("DataView's buffer is detached"));
        }
        Ok(())
    }
}

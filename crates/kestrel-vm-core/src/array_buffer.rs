//! ArrayBuffer implementation
//!
//! An ArrayBuffer owns a contiguous byte region plus a detached flag. The
//! flag is the absence of the region: once the bytes are taken the buffer is
//! detached for good and reports a byte length of zero.
//!
//! Views are not owned by the buffer. The buffer keeps weak back-references
//! to the views built over it so diagnostics can count them without keeping
//! any of them alive.

use std::cell::RefCell;

use kestrel_gc::{Gc, GcId, GcTraceable, Heap, WeakGc};

use crate::data_view::JsDataView;
use crate::error::{VmError, VmResult};
use crate::object::JsObject;
use crate::typed_array::JsTypedArray;

/// Weak back-reference from a buffer to a view over it
#[derive(Debug, Clone, Copy)]
pub enum WeakView {
    /// A DataView
    DataView(WeakGc<JsDataView>),
    /// A typed array
    TypedArray(WeakGc<JsTypedArray>),
}

impl WeakView {
    /// Whether the view has not been reclaimed
    pub fn is_live(self, heap: &Heap) -> bool {
        match self {
            WeakView::DataView(weak) => weak.resolve(heap).is_some(),
            WeakView::TypedArray(weak) => weak.resolve(heap).is_some(),
        }
    }
}

/// A JavaScript ArrayBuffer
#[derive(Debug)]
pub struct JsArrayBuffer {
    /// Base object (prototype, properties)
    pub object: Gc<JsObject>,
    /// The underlying bytes. None once detached.
    data: RefCell<Option<Vec<u8>>>,
    /// Maximum byte length for resizable buffers
    max_byte_length: Option<usize>,
    views: RefCell<Vec<WeakView>>,
}

impl GcTraceable for JsArrayBuffer {
    const CLASS_NAME: &'static str = "ArrayBuffer";

    fn trace(&self, tracer: &mut dyn FnMut(GcId)) {
        // Views are weak; only the base object is a strong edge.
        tracer(self.object.id());
    }

    /// Charged by byte length. Detaching or resizing changes it, so the
    /// owner re-charges the heap through [`Heap::set_extra_bytes`].
    fn extra_bytes(&self) -> usize {
        self.byte_length()
    }
}

/// Allocate a zeroed byte region, reporting failure instead of aborting.
fn allocate_bytes(len: usize) -> VmResult<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| VmError::range_error("Array buffer allocation failed"))?;
    data.resize(len, 0);
    Ok(data)
}

impl JsArrayBuffer {
    /// Create a zero-filled buffer.
    ///
    /// Fails with a RangeError when the host cannot provide the bytes.
    pub fn new(
        object: Gc<JsObject>,
        byte_length: usize,
        max_byte_length: Option<usize>,
    ) -> VmResult<Self> {
        Ok(Self::from_bytes(
            object,
            allocate_bytes(byte_length)?,
            max_byte_length,
        ))
    }

    /// Wrap an existing byte region.
    pub fn from_bytes(object: Gc<JsObject>, data: Vec<u8>, max_byte_length: Option<usize>) -> Self {
        Self {
            object,
            data: RefCell::new(Some(data)),
            max_byte_length,
            views: RefCell::new(Vec::new()),
        }
    }

    /// Check if the buffer is detached
    pub fn is_detached(&self) -> bool {
        self.data.borrow().is_none()
    }

    /// Current byte length (0 if detached)
    pub fn byte_length(&self) -> usize {
        self.data.borrow().as_ref().map_or(0, Vec::len)
    }

    /// Maximum byte length: the declared maximum for resizable buffers,
    /// otherwise the current byte length.
    pub fn max_byte_length(&self) -> usize {
        if self.is_detached() {
            return 0;
        }
        self.max_byte_length.unwrap_or_else(|| self.byte_length())
    }

    /// Check if this is a resizable buffer
    pub fn is_resizable(&self) -> bool {
        self.max_byte_length.is_some()
    }

    /// Declared maximum of a resizable buffer
    pub fn declared_max_byte_length(&self) -> Option<usize> {
        self.max_byte_length
    }

    /// Check that `resize(new_length)` is permitted, without touching the bytes.
    pub fn validate_resize(&self, new_length: usize) -> VmResult<()> {
        let max = self
            .max_byte_length
            .ok_or_else(|| VmError::type_error("ArrayBuffer is not resizable"))?;
        if self.is_detached() {
            return Err(VmError::detached_buffer("ArrayBuffer is detached"));
        }
        if new_length > max {
            return Err(VmError::range_error(
                "new length exceeds the buffer's maxByteLength",
            ));
        }
        Ok(())
    }

    /// Resize in place. New bytes are zeroed.
    ///
    /// The heap charge is not updated here; see
    /// [`VmContext::resize_array_buffer`](crate::VmContext::resize_array_buffer).
    pub fn resize(&self, new_length: usize) -> VmResult<()> {
        self.validate_resize(new_length)?;
        let mut guard = self.data.borrow_mut();
        let Some(data) = guard.as_mut() else {
            return Err(VmError::detached_buffer("ArrayBuffer is detached"));
        };
        if new_length > data.len() {
            data.try_reserve_exact(new_length - data.len())
                .map_err(|_| VmError::range_error("Array buffer allocation failed"))?;
        }
        data.resize(new_length, 0);
        data.shrink_to(new_length);
        Ok(())
    }

    /// Take the bytes out, detaching the buffer.
    ///
    /// Detaching twice is not an error; the second call returns `None`.
    /// The heap charge is not updated here; see
    /// [`VmContext::take_array_buffer_data`](crate::VmContext::take_array_buffer_data).
    pub fn take_data(&self) -> Option<Vec<u8>> {
        self.data.borrow_mut().take()
    }

    /// Copy `[start, end)` into a fresh region, clamped to the current length.
    pub fn copy_range(&self, start: usize, end: usize) -> Option<Vec<u8>> {
        let guard = self.data.borrow();
        let data = guard.as_ref()?;
        let start = start.min(data.len());
        let end = end.min(data.len()).max(start);
        Some(data[start..end].to_vec())
    }

    /// Read bytes at `offset` into `dest`. False if detached or out of range.
    pub fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> bool {
        let guard = self.data.borrow();
        let Some(data) = guard.as_ref() else {
            return false;
        };
        match offset.checked_add(dest.len()) {
            Some(end) if end <= data.len() => {
                dest.copy_from_slice(&data[offset..end]);
                true
            }
            _ => false,
        }
    }

    /// Write `src` at `offset`. False if detached or out of range.
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> bool {
        let mut guard = self.data.borrow_mut();
        let Some(data) = guard.as_mut() else {
            return false;
        };
        match offset.checked_add(src.len()) {
            Some(end) if end <= data.len() => {
                data[offset..end].copy_from_slice(src);
                true
            }
            _ => false,
        }
    }

    /// Run `f` over the bytes, if attached
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.data.borrow().as_deref().map(f)
    }

    /// Record a view built over this buffer, pruning reclaimed ones.
    pub fn register_view(&self, heap: &Heap, view: WeakView) {
        let mut views = self.views.borrow_mut();
        views.retain(|v| v.is_live(heap));
        views.push(view);
    }

    /// Number of views over this buffer that have not been reclaimed
    pub fn live_view_count(&self, heap: &Heap) -> usize {
        self.views.borrow().iter().filter(|v| v.is_live(heap)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(heap: &mut Heap, len: usize, max: Option<usize>) -> JsArrayBuffer {
        let object = heap.allocate(JsObject::new(None)).unwrap();
        JsArrayBuffer::new(object, len, max).unwrap()
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut heap = Heap::new();
        let buf = buffer(&mut heap, 16, None);
        assert_eq!(buf.byte_length(), 16);
        assert!(buf.take_data().is_some());
        assert!(buf.is_detached());
        assert!(buf.take_data().is_none());
        assert!(buf.is_detached());
        assert_eq!(buf.byte_length(), 0);
        assert_eq!(buf.max_byte_length(), 0);
    }

    #[test]
    fn test_read_write_bounds() {
        let mut heap = Heap::new();
        let buf = buffer(&mut heap, 4, None);
        assert!(buf.write_bytes(1, &[7, 8]));
        let mut out = [0u8; 3];
        assert!(buf.read_bytes(1, &mut out));
        assert_eq!(out, [7, 8, 0]);
        assert!(!buf.write_bytes(3, &[1, 2]));
        assert!(!buf.read_bytes(usize::MAX, &mut out));
        buf.take_data();
        assert!(!buf.read_bytes(0, &mut out[..1]));
    }

    #[test]
    fn test_resize() {
        let mut heap = Heap::new();
        let buf = buffer(&mut heap, 4, Some(8));
        assert!(buf.is_resizable());
        buf.resize(8).unwrap();
        assert_eq!(buf.byte_length(), 8);
        assert!(matches!(buf.resize(9), Err(VmError::RangeError(_))));
        buf.resize(2).unwrap();
        assert_eq!(buf.byte_length(), 2);
        assert_eq!(buf.max_byte_length(), 8);

        let fixed = buffer(&mut heap, 4, None);
        assert!(matches!(fixed.resize(2), Err(VmError::TypeError(_))));

        buf.take_data();
        assert!(matches!(buf.validate_resize(4), Err(VmError::DetachedBuffer(_))));
    }

    #[test]
    fn test_copy_range_clamps() {
        let mut heap = Heap::new();
        let buf = buffer(&mut heap, 4, None);
        buf.write_bytes(0, &[1, 2, 3, 4]);
        assert_eq!(buf.copy_range(1, 3), Some(vec![2, 3]));
        assert_eq!(buf.copy_range(3, 1), Some(vec![]));
        assert_eq!(buf.copy_range(2, 100), Some(vec![3, 4]));
    }
}

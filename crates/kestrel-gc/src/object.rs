//! GC object layout

use crate::handle::GcId;

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

/// Per-slot GC header
#[derive(Debug, Clone, Copy)]
pub struct GcHeader {
    /// Mark bits for tri-color marking
    mark: MarkColor,
    /// Class name of the payload, for stats and diagnostics
    class_name: &'static str,
}

impl GcHeader {
    /// Create new header
    pub const fn new(class_name: &'static str) -> Self {
        Self {
            mark: MarkColor::White,
            class_name,
        }
    }

    /// Get mark color
    pub fn mark(&self) -> MarkColor {
        self.mark
    }

    /// Set mark color
    pub fn set_mark(&mut self, color: MarkColor) {
        self.mark = color;
    }

    /// Class name of the object this header belongs to
    pub fn class_name(&self) -> &'static str {
        self.class_name
    }
}

/// Trait for GC-managed payloads.
///
/// `trace` must report every strong edge (`Gc<T>`) the payload holds. Weak
/// edges (`WeakGc<T>`) are never reported.
pub trait GcTraceable {
    /// Whether this type holds strong edges at all. Leaf types skip tracing.
    const NEEDS_TRACE: bool = true;

    /// Name used in stats and diagnostics.
    const CLASS_NAME: &'static str;

    /// Report strong edges to the tracer.
    fn trace(&self, tracer: &mut dyn FnMut(GcId));

    /// Out-of-line bytes owned by this payload (e.g. a byte region).
    fn extra_bytes(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_marking() {
        let mut header = GcHeader::new("Object");
        assert_eq!(header.mark(), MarkColor::White);

        header.set_mark(MarkColor::Gray);
        assert_eq!(header.mark(), MarkColor::Gray);

        header.set_mark(MarkColor::Black);
        assert_eq!(header.mark(), MarkColor::Black);
        assert_eq!(header.class_name(), "Object");
    }
}

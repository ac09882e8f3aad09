//! Strong and weak handles into the heap.
//!
//! Handles are plain indices tagged with the slot generation they were issued
//! for. A handle whose generation no longer matches its slot refers to a
//! reclaimed object and never resolves.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::heap::Heap;

/// Untyped identity of a heap object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl GcId {
    /// Slot index of this object.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for GcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcId({}#{})", self.index, self.generation)
    }
}

/// Typed strong handle.
///
/// Storing a `Gc<T>` inside another heap object (and reporting it from
/// `GcTraceable::trace`) keeps the referent alive. A `Gc<T>` held in a Rust
/// local is transient: it does not root the object, see [`crate::Root`].
pub struct Gc<T> {
    id: GcId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Gc<T> {
    pub(crate) fn from_id(id: GcId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Identity of the referent.
    pub fn id(self) -> GcId {
        self.id
    }

    /// Create a weak handle to the same object.
    pub fn downgrade(self) -> WeakGc<T> {
        WeakGc {
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Gc<T> {}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Gc<T> {}

impl<T> Hash for Gc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gc({}#{})", self.id.index, self.id.generation)
    }
}

/// Weak handle: records a relation without keeping the referent alive.
///
/// A weak handle is never cached as a `Gc<T>` across a step that can run
/// arbitrary code; call [`WeakGc::resolve`] again after every such step.
pub struct WeakGc<T> {
    id: GcId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> WeakGc<T> {
    /// Resolve to a strong handle if the referent has not been reclaimed.
    pub fn resolve(&self, heap: &Heap) -> Option<Gc<T>> {
        heap.downcast::<T>(self.id)
    }
}

impl<T> WeakGc<T> {
    /// Identity of the (possibly reclaimed) referent.
    pub fn id(&self) -> GcId {
        self.id
    }
}

impl<T> Clone for WeakGc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WeakGc<T> {}

impl<T> PartialEq for WeakGc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for WeakGc<T> {}

impl<T> fmt::Debug for WeakGc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakGc({}#{})", self.id.index, self.id.generation)
    }
}

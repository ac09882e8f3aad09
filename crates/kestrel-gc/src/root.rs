//! Root tracking.
//!
//! A `Root<T>` is the only way a handle held outside the heap extends its
//! referent's lifetime. The root set is reference counted per object, so the
//! same object may be rooted from several places at once.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::handle::{Gc, GcId};

/// Marker type for roots created from an untyped `GcId`.
pub enum Erased {}

/// Shared, reference-counted set of rooted objects.
#[derive(Clone, Default)]
pub(crate) struct RootSet {
    counts: Rc<RefCell<FxHashMap<GcId, usize>>>,
}

impl RootSet {
    pub(crate) fn add(&self, id: GcId) {
        *self.counts.borrow_mut().entry(id).or_insert(0) += 1;
    }

    pub(crate) fn remove(&self, id: GcId) {
        let mut counts = self.counts.borrow_mut();
        if let Some(count) = counts.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&id);
            }
        }
    }

    pub(crate) fn contains(&self, id: GcId) -> bool {
        self.counts.borrow().contains_key(&id)
    }

    pub(crate) fn ids(&self) -> Vec<GcId> {
        self.counts.borrow().keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.counts.borrow().len()
    }
}

/// RAII root guard. The referent stays alive until every guard is dropped.
pub struct Root<T> {
    id: GcId,
    set: RootSet,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Root<T> {
    pub(crate) fn new(id: GcId, set: RootSet) -> Self {
        set.add(id);
        Self {
            id,
            set,
            _marker: PhantomData,
        }
    }

    /// Identity of the rooted object.
    pub fn id(&self) -> GcId {
        self.id
    }
}

impl<T: 'static> Root<T> {
    /// Strong handle to the rooted object.
    ///
    /// The returned handle is transient; keep the guard alive for as long as
    /// the object must survive collections.
    pub fn gc(&self) -> Gc<T> {
        Gc::from_id(self.id)
    }
}

impl<T> Clone for Root<T> {
    fn clone(&self) -> Self {
        Root::new(self.id, self.set.clone())
    }
}

impl<T> Drop for Root<T> {
    fn drop(&mut self) {
        self.set.remove(self.id);
    }
}

impl<T> fmt::Debug for Root<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Root").field(&self.id).finish()
    }
}

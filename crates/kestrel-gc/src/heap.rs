//! GC heap: slot arena, allocation accounting and mark/sweep collection.

use std::any::Any;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::handle::{Gc, GcId};
use crate::object::{GcHeader, GcTraceable, MarkColor};
use crate::root::{Erased, Root, RootSet};

/// Type-erased trace function stored per slot.
type TraceFn = fn(&dyn Any, &mut dyn FnMut(GcId));

/// GC configuration
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Hard limit on accounted heap bytes (default: 256MB)
    pub heap_limit: usize,
    /// Bytes allocated since the last cycle before a safepoint collects (default: 1MB)
    pub gc_threshold: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            heap_limit: 256 * 1024 * 1024,
            gc_threshold: 1024 * 1024,
        }
    }
}

impl GcConfig {
    /// Set the hard heap limit.
    pub fn heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit = bytes;
        self
    }

    /// Set the implicit collection threshold.
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = bytes;
        self
    }
}

/// Host-level allocation failure. Never surfaced to script as a completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The heap limit would be exceeded.
    #[error("out of memory: requested {requested} bytes with {allocated} of {limit} in use")]
    OutOfMemory {
        /// Bytes the failed allocation needed
        requested: usize,
        /// Bytes already accounted
        allocated: usize,
        /// Configured heap limit
        limit: usize,
    },
}

/// GC statistics
#[derive(Debug, Default, Clone)]
pub struct GcStats {
    /// Number of collections
    pub collections: u64,
    /// Total time spent in GC
    pub total_pause: Duration,
    /// Pause of the last collection
    pub last_pause: Duration,
    /// Bytes reclaimed in last collection
    pub last_reclaimed: usize,
    /// Objects marked in last collection
    pub last_marked: usize,
    /// Bytes currently accounted
    pub total_bytes: usize,
    /// Objects currently live (allocated and not reclaimed)
    pub live_objects: usize,
}

struct Slot {
    header: GcHeader,
    generation: u32,
    cell: Option<Box<dyn Any>>,
    trace_fn: Option<TraceFn>,
    /// Accounted bytes: payload size plus `extra`
    size: usize,
    /// Out-of-line bytes charged for the payload
    extra: usize,
}

impl Slot {
    fn is_live_for(&self, generation: u32) -> bool {
        self.cell.is_some() && self.generation == generation
    }
}

fn trace_erased<T: GcTraceable + 'static>(cell: &dyn Any, tracer: &mut dyn FnMut(GcId)) {
    if let Some(value) = cell.downcast_ref::<T>() {
        value.trace(tracer);
    }
}

/// The allocation arena.
///
/// Owns every heap-managed object. Allocation never collects; collection only
/// happens through [`Heap::collect`], which callers invoke at safepoints where
/// every handle they still need is either rooted or passed as an extra root.
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: RootSet,
    config: GcConfig,
    total_bytes: usize,
    bytes_since_gc: usize,
    live_objects: usize,
    stats: GcStats,
}

impl Heap {
    /// Create new heap with default config
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    /// Create new heap with custom config
    pub fn with_config(config: GcConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            roots: RootSet::default(),
            config,
            total_bytes: 0,
            bytes_since_gc: 0,
            live_objects: 0,
            stats: GcStats::default(),
        }
    }

    /// Get config
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Allocate a new object and return a strong handle to it.
    ///
    /// The handle is not rooted.
    pub fn allocate<T: GcTraceable + 'static>(&mut self, value: T) -> Result<Gc<T>, AllocError> {
        let extra = value.extra_bytes();
        let size = std::mem::size_of::<T>() + extra;
        if self.total_bytes.saturating_add(size) > self.config.heap_limit {
            return Err(AllocError::OutOfMemory {
                requested: size,
                allocated: self.total_bytes,
                limit: self.config.heap_limit,
            });
        }

        let trace_fn: Option<TraceFn> = if T::NEEDS_TRACE {
            Some(trace_erased::<T>)
        } else {
            None
        };
        let header = GcHeader::new(T::CLASS_NAME);
        let cell: Box<dyn Any> = Box::new(value);

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.header = header;
                slot.cell = Some(cell);
                slot.trace_fn = trace_fn;
                slot.size = size;
                slot.extra = extra;
                GcId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| AllocError::OutOfMemory {
                    requested: size,
                    allocated: self.total_bytes,
                    limit: self.config.heap_limit,
                })?;
                self.slots.push(Slot {
                    header,
                    generation: 0,
                    cell: Some(cell),
                    trace_fn,
                    size,
                    extra,
                });
                GcId {
                    index,
                    generation: 0,
                }
            }
        };

        self.total_bytes += size;
        self.bytes_since_gc += size;
        self.live_objects += 1;
        Ok(Gc::from_id(id))
    }

    /// Borrow the payload behind a handle.
    ///
    /// # Panics
    /// Panics if the object has been reclaimed. Dereferencing a dead handle is
    /// a programming error: the caller failed to root something it still uses.
    pub fn get<T: 'static>(&self, gc: Gc<T>) -> &T {
        match self.try_get(gc) {
            Some(value) => value,
            None => panic!(
                "dereferenced reclaimed {} handle {:?}",
                std::any::type_name::<T>(),
                gc.id()
            ),
        }
    }

    /// Borrow the payload behind a handle, if it is still alive.
    pub fn try_get<T: 'static>(&self, gc: Gc<T>) -> Option<&T> {
        let id = gc.id();
        let slot = self.slots.get(id.index as usize)?;
        if !slot.is_live_for(id.generation) {
            return None;
        }
        slot.cell.as_ref()?.downcast_ref::<T>()
    }

    /// Recover a typed handle from an untyped identity, checking the payload type.
    pub fn downcast<T: 'static>(&self, id: GcId) -> Option<Gc<T>> {
        let slot = self.slots.get(id.index as usize)?;
        if !slot.is_live_for(id.generation) {
            return None;
        }
        if slot.cell.as_ref()?.is::<T>() {
            Some(Gc::from_id(id))
        } else {
            None
        }
    }

    /// Whether `id` refers to an object that has not been reclaimed.
    pub fn is_alive(&self, id: GcId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.is_live_for(id.generation))
    }

    /// Class name of a live object.
    pub fn class_name(&self, id: GcId) -> Option<&'static str> {
        let slot = self.slots.get(id.index as usize)?;
        slot.is_live_for(id.generation)
            .then(|| slot.header.class_name())
    }

    /// Root a typed handle for the lifetime of the returned guard.
    pub fn root<T>(&self, gc: Gc<T>) -> Root<T> {
        Root::new(gc.id(), self.roots.clone())
    }

    /// Root an untyped identity for the lifetime of the returned guard.
    pub fn root_id(&self, id: GcId) -> Root<Erased> {
        Root::new(id, self.roots.clone())
    }

    /// Whether `id` is currently held by a root guard.
    pub fn is_rooted(&self, id: GcId) -> bool {
        self.roots.contains(id)
    }

    /// Immediately free an object that was never published.
    ///
    /// Returns false (and frees nothing) if the object is already dead or is
    /// rooted. The caller guarantees no other live object references it.
    pub fn discard(&mut self, id: GcId) -> bool {
        if !self.is_alive(id) || self.roots.contains(id) {
            return false;
        }
        self.free_slot(id.index);
        true
    }

    /// Re-charge the out-of-line bytes of a live object whose payload grew
    /// or shrank after allocation.
    ///
    /// Growth that would pass the heap limit fails and leaves the charge
    /// unchanged. Shrinking never fails. Dead handles are ignored.
    pub fn set_extra_bytes(&mut self, id: GcId, extra: usize) -> Result<(), AllocError> {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.is_live_for(id.generation))
        else {
            return Ok(());
        };

        if extra > slot.extra {
            let growth = extra - slot.extra;
            if self.total_bytes.saturating_add(growth) > self.config.heap_limit {
                return Err(AllocError::OutOfMemory {
                    requested: growth,
                    allocated: self.total_bytes,
                    limit: self.config.heap_limit,
                });
            }
            self.total_bytes += growth;
            self.bytes_since_gc += growth;
        } else {
            self.total_bytes -= slot.extra - extra;
        }
        slot.size = slot.size - slot.extra + extra;
        slot.extra = extra;
        Ok(())
    }

    /// Fail unless `bytes` more can be accounted without passing the limit.
    pub fn ensure_headroom(&self, bytes: usize) -> Result<(), AllocError> {
        if self.total_bytes.saturating_add(bytes) > self.config.heap_limit {
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                allocated: self.total_bytes,
                limit: self.config.heap_limit,
            });
        }
        Ok(())
    }

    /// Whether enough has been allocated since the last cycle to collect.
    pub fn should_collect(&self) -> bool {
        self.bytes_since_gc >= self.config.gc_threshold
    }

    /// Perform a full mark/sweep collection.
    ///
    /// Roots are `extra_roots` plus every object held by a [`Root`] guard.
    /// Returns the number of bytes reclaimed.
    pub fn collect(&mut self, extra_roots: &[GcId]) -> usize {
        let start = Instant::now();

        #[cfg(feature = "gc_logging")]
        let initial_objects = self.live_objects;

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "kestrel::gc",
            roots = extra_roots.len() + self.roots.len(),
            heap_bytes = self.total_bytes,
            objects = self.live_objects,
            "GC cycle starting"
        );

        // Phase 1: Reset all marks to white
        for slot in &mut self.slots {
            slot.header.set_mark(MarkColor::White);
        }

        // Phase 2: Mark from roots
        let mut roots = self.roots.ids();
        roots.extend_from_slice(extra_roots);
        let marked = self.mark(&roots);

        // Phase 3: Sweep unmarked objects
        let reclaimed = self.sweep();

        let elapsed = start.elapsed();
        self.bytes_since_gc = 0;
        self.stats.collections += 1;
        self.stats.last_pause = elapsed;
        self.stats.total_pause += elapsed;
        self.stats.last_reclaimed = reclaimed;
        self.stats.last_marked = marked;

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "kestrel::gc",
            collection = self.stats.collections,
            reclaimed_bytes = reclaimed,
            pause_us = elapsed.as_micros() as u64,
            live_bytes = self.total_bytes,
            live_objects = self.live_objects,
            freed_objects = initial_objects.saturating_sub(self.live_objects),
            "GC cycle complete"
        );

        reclaimed
    }

    fn mark(&mut self, roots: &[GcId]) -> usize {
        let mut worklist: VecDeque<GcId> = VecDeque::new();
        let mut marked = 0;

        for &root in roots {
            if self.shade(root) {
                worklist.push_back(root);
            }
        }

        let mut edges = Vec::new();
        while let Some(id) = worklist.pop_front() {
            let slot = &self.slots[id.index as usize];
            if let (Some(cell), Some(trace)) = (slot.cell.as_ref(), slot.trace_fn) {
                trace(cell.as_ref(), &mut |edge| edges.push(edge));
            }
            self.slots[id.index as usize]
                .header
                .set_mark(MarkColor::Black);
            marked += 1;

            for edge in edges.drain(..) {
                if self.shade(edge) {
                    worklist.push_back(edge);
                }
            }
        }

        marked
    }

    /// Gray a white live object. Returns true if it must be scanned.
    fn shade(&mut self, id: GcId) -> bool {
        match self.slots.get_mut(id.index as usize) {
            Some(slot)
                if slot.is_live_for(id.generation) && slot.header.mark() == MarkColor::White =>
            {
                slot.header.set_mark(MarkColor::Gray);
                true
            }
            _ => false,
        }
    }

    fn sweep(&mut self) -> usize {
        let mut reclaimed = 0;
        for index in 0..self.slots.len() {
            let slot = &self.slots[index];
            if slot.cell.is_some() && slot.header.mark() == MarkColor::White {
                reclaimed += slot.size;
                self.free_slot(index as u32);
            }
        }
        reclaimed
    }

    fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        // Dropping the payload releases any out-of-line storage it owns.
        slot.cell = None;
        slot.trace_fn = None;
        self.total_bytes -= slot.size;
        self.live_objects -= 1;
        slot.size = 0;
        slot.extra = 0;
        // A slot whose generation is exhausted is retired, so no stale
        // handle can ever match a later occupant.
        slot.generation = slot.generation.saturating_add(1);
        if slot.generation != u32::MAX {
            self.free.push(index);
        }
    }

    /// Bytes currently accounted
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of live objects
    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    /// Number of live objects whose payload is a `T`.
    pub fn live_count_of<T: 'static>(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.cell.as_ref().is_some_and(|cell| cell.is::<T>()))
            .count()
    }

    /// Get statistics
    pub fn stats(&self) -> GcStats {
        GcStats {
            total_bytes: self.total_bytes,
            live_objects: self.live_objects,
            ..self.stats.clone()
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

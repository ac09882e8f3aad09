//! # Kestrel Garbage Collector
//!
//! Single-threaded tracing collector backing the Kestrel engine core.
//!
//! ## Design
//!
//! - **Index arena**: every object lives in a slot addressed by `GcId`
//!   (index + generation); objects never move while referenced
//! - **Typed handles**: `Gc<T>` is a strong edge, `WeakGc<T>` never keeps
//!   its referent alive and must be re-resolved before every use
//! - **Explicit roots**: `Root<T>` guards register long-lived handles; transient
//!   `Gc<T>` locals do not extend lifetimes
//! - **Tri-color mark/sweep**: cycles are reclaimed, reclaimed slots get a new
//!   generation so stale handles can never alias a newer object

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod handle;
pub mod heap;
pub mod object;
pub mod root;

pub use handle::{Gc, GcId, WeakGc};
pub use heap::{AllocError, GcConfig, GcStats, Heap};
pub use object::{GcHeader, GcTraceable, MarkColor};
pub use root::{Erased, Root};

//! # Kestrel VM Core
//!
//! Object model, completion protocol and binary-data constructors for the
//! Kestrel JavaScript engine.
//!
//! ## Design Principles
//!
//! - **Explicit completions**: every operation that can run user code returns
//!   `Completion<T>`, so abrupt completions propagate with `?`
//! - **Re-validate after reentrancy**: buffer state is re-read after any
//!   coercion or prototype lookup, never carried across one
//! - **Handle-based heap**: objects live in a `kestrel_gc::Heap` and are
//!   reached through `Gc<T>` handles; native code roots what it holds across
//!   calls back into user code

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod array_buffer;
pub mod config;
pub mod context;
pub mod convert;
pub mod data_view;
pub mod error;
pub mod function;
pub mod intrinsics;
pub mod intrinsics_impl;
pub mod object;
pub mod realm;
pub mod symbol;
pub mod typed_array;
pub mod value;

pub use array_buffer::JsArrayBuffer;
pub use config::RuntimeConfig;
pub use context::VmContext;
pub use convert::{Numeric, PreferredType};
pub use data_view::JsDataView;
pub use error::{Completion, ErrorKind, VmError, VmResult};
pub use function::JsFunction;
pub use intrinsics_impl::error::JsError;
pub use object::{JsObject, Property, PropertyKey};
pub use symbol::JsSymbol;
pub use typed_array::{JsTypedArray, TypedArrayKind};
pub use value::{JsString, ObjectRef, Value};

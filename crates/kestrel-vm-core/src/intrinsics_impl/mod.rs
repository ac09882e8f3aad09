//! Intrinsics implementation modules
//!
//! Each module implements the constructor and prototype methods of one
//! built-in, as plain functions over `VmContext`:
//! - `object` - Object.prototype toString/valueOf (the object-to-primitive fallbacks)
//! - `error` - error objects and Error.prototype.toString
//! - `array_buffer` - ArrayBuffer constructor and prototype methods
//! - `data_view` - DataView construction, accessors and element get/set
//! - `typed_array` - construction of the 11 typed array kinds and their accessors

pub mod array_buffer;
pub mod data_view;
pub mod error;
pub mod object;
pub mod typed_array;

//! JavaScript values
//!
//! `Value` is an immutable tagged datum. Primitive payloads are stored inline
//! (strings and big integers behind `Rc`); object-typed values carry an
//! [`ObjectRef`], a strong handle into the heap tagged with the object kind.
//! Object values compare by referent identity, never structurally.

use std::rc::Rc;

use kestrel_gc::{Gc, GcId, Heap};
use num_bigint::BigInt;

use crate::array_buffer::JsArrayBuffer;
use crate::data_view::JsDataView;
use crate::function::JsFunction;
use crate::intrinsics_impl::error::JsError;
use crate::object::JsObject;
use crate::symbol::JsSymbol;
use crate::typed_array::JsTypedArray;

/// Immutable string payload
pub type JsString = Rc<str>;

/// Reference to a heap object, tagged with its kind.
///
/// Every kind owns a base [`JsObject`] holding its prototype and properties;
/// the base is an implementation detail and never escapes as a `Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    /// Ordinary object
    Ordinary(Gc<JsObject>),
    /// Native function object
    Function(Gc<JsFunction>),
    /// ArrayBuffer
    ArrayBuffer(Gc<JsArrayBuffer>),
    /// DataView
    DataView(Gc<JsDataView>),
    /// Integer-indexed typed array
    TypedArray(Gc<JsTypedArray>),
    /// Error instance
    Error(Gc<JsError>),
}

impl ObjectRef {
    /// Identity of the referent
    pub fn id(self) -> GcId {
        match self {
            ObjectRef::Ordinary(gc) => gc.id(),
            ObjectRef::Function(gc) => gc.id(),
            ObjectRef::ArrayBuffer(gc) => gc.id(),
            ObjectRef::DataView(gc) => gc.id(),
            ObjectRef::TypedArray(gc) => gc.id(),
            ObjectRef::Error(gc) => gc.id(),
        }
    }

    /// The base object holding prototype and properties.
    pub fn base(self, heap: &Heap) -> Gc<JsObject> {
        match self {
            ObjectRef::Ordinary(gc) => gc,
            ObjectRef::Function(gc) => heap.get(gc).object,
            ObjectRef::ArrayBuffer(gc) => heap.get(gc).object,
            ObjectRef::DataView(gc) => heap.get(gc).object,
            ObjectRef::TypedArray(gc) => heap.get(gc).object,
            ObjectRef::Error(gc) => heap.get(gc).object,
        }
    }

    /// Recover a tagged reference from an untyped identity.
    pub fn from_id(heap: &Heap, id: GcId) -> Option<Self> {
        if let Some(gc) = heap.downcast::<JsObject>(id) {
            return Some(ObjectRef::Ordinary(gc));
        }
        if let Some(gc) = heap.downcast::<JsFunction>(id) {
            return Some(ObjectRef::Function(gc));
        }
        if let Some(gc) = heap.downcast::<JsArrayBuffer>(id) {
            return Some(ObjectRef::ArrayBuffer(gc));
        }
        if let Some(gc) = heap.downcast::<JsDataView>(id) {
            return Some(ObjectRef::DataView(gc));
        }
        if let Some(gc) = heap.downcast::<JsTypedArray>(id) {
            return Some(ObjectRef::TypedArray(gc));
        }
        heap.downcast::<JsError>(id).map(ObjectRef::Error)
    }

    /// Class name used by `[object X]` renderings.
    pub fn class_name(self, heap: &Heap) -> &'static str {
        match self {
            ObjectRef::Ordinary(_) => "Object",
            ObjectRef::Function(_) => "Function",
            ObjectRef::ArrayBuffer(_) => "ArrayBuffer",
            ObjectRef::DataView(_) => "DataView",
            ObjectRef::TypedArray(gc) => heap.get(gc).kind().name(),
            ObjectRef::Error(gc) => heap.get(gc).kind().name(),
        }
    }
}

/// A JavaScript value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE-754 double
    Number(f64),
    /// String
    String(JsString),
    /// Symbol (heap-managed identity)
    Symbol(Gc<JsSymbol>),
    /// Arbitrary-precision integer
    BigInt(Rc<BigInt>),
    /// Object reference
    Object(ObjectRef),
}

impl Value {
    /// Create undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Value::Undefined
    }

    /// Create null value
    #[inline]
    pub const fn null() -> Self {
        Value::Null
    }

    /// Create boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    /// Create number value
    #[inline]
    pub const fn number(n: f64) -> Self {
        Value::Number(n)
    }

    /// Create string value
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    /// Create BigInt value
    pub fn bigint(n: BigInt) -> Self {
        Value::BigInt(Rc::new(n))
    }

    /// Create object value
    #[inline]
    pub const fn object(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }

    /// Check if undefined
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if undefined or null
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if object
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Get as function
    pub fn as_function(&self) -> Option<Gc<JsFunction>> {
        match self {
            Value::Object(ObjectRef::Function(f)) => Some(*f),
            _ => None,
        }
    }

    /// Get as ArrayBuffer
    pub fn as_array_buffer(&self) -> Option<Gc<JsArrayBuffer>> {
        match self {
            Value::Object(ObjectRef::ArrayBuffer(b)) => Some(*b),
            _ => None,
        }
    }

    /// Get as DataView
    pub fn as_data_view(&self) -> Option<Gc<JsDataView>> {
        match self {
            Value::Object(ObjectRef::DataView(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get as typed array
    pub fn as_typed_array(&self) -> Option<Gc<JsTypedArray>> {
        match self {
            Value::Object(ObjectRef::TypedArray(t)) => Some(*t),
            _ => None,
        }
    }

    /// Get as error object
    pub fn as_error(&self) -> Option<Gc<JsError>> {
        match self {
            Value::Object(ObjectRef::Error(e)) => Some(*e),
            _ => None,
        }
    }

    /// Heap identity of a symbol or object payload, for tracing.
    pub fn gc_id(&self) -> Option<GcId> {
        match self {
            Value::Symbol(sym) => Some(sym.id()),
            Value::Object(obj) => Some(obj.id()),
            _ => None,
        }
    }

    /// The `typeof` result
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::BigInt(_) => "bigint",
            Value::Object(ObjectRef::Function(_)) => "function",
            Value::Object(_) => "object",
        }
    }

    /// SameValue: NaN equals NaN, +0 and -0 differ, objects by identity.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a.to_bits() == b.to_bits()
                }
            }
            _ => self.same_non_number(other),
        }
    }

    /// IsStrictlyEqual: NaN differs from itself, +0 equals -0.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.same_non_number(other),
        }
    }

    fn same_non_number(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

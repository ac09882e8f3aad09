//! TypedArray implementation
//!
//! TypedArrays are fixed-length views over an ArrayBuffer. All 11 element
//! kinds share one implementation via `TypedArrayKind`, which also provides
//! the element codec used by DataView.

use kestrel_gc::{Gc, GcId, GcTraceable, Heap};
use num_bigint::{BigInt, Sign};

use crate::array_buffer::JsArrayBuffer;
use crate::convert::Numeric;
use crate::object::JsObject;
use crate::value::Value;

/// The kind of TypedArray - determines element size and interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedArrayKind {
    /// Int8Array - 8-bit signed integers
    Int8,
    /// Uint8Array - 8-bit unsigned integers
    Uint8,
    /// Uint8ClampedArray - 8-bit unsigned integers (clamped)
    Uint8Clamped,
    /// Int16Array - 16-bit signed integers
    Int16,
    /// Uint16Array - 16-bit unsigned integers
    Uint16,
    /// Int32Array - 32-bit signed integers
    Int32,
    /// Uint32Array - 32-bit unsigned integers
    Uint32,
    /// Float32Array - 32-bit floating point
    Float32,
    /// Float64Array - 64-bit floating point
    Float64,
    /// BigInt64Array - 64-bit signed integers (BigInt)
    BigInt64,
    /// BigUint64Array - 64-bit unsigned integers (BigInt)
    BigUint64,
}

impl TypedArrayKind {
    /// Every kind, in constructor order
    pub const ALL: [TypedArrayKind; 11] = [
        TypedArrayKind::Int8,
        TypedArrayKind::Uint8,
        TypedArrayKind::Uint8Clamped,
        TypedArrayKind::Int16,
        TypedArrayKind::Uint16,
        TypedArrayKind::Int32,
        TypedArrayKind::Uint32,
        TypedArrayKind::Float32,
        TypedArrayKind::Float64,
        TypedArrayKind::BigInt64,
        TypedArrayKind::BigUint64,
    ];

    /// Get the byte size of each element
    pub fn element_size(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 | TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => 8,
        }
    }

    /// Get the name of this TypedArray type
    pub fn name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
            TypedArrayKind::BigInt64 => "BigInt64Array",
            TypedArrayKind::BigUint64 => "BigUint64Array",
        }
    }

    /// Element type name as used by DataView accessors (`getInt8`, ...)
    pub fn view_type_name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8",
            TypedArrayKind::Uint8 => "Uint8",
            TypedArrayKind::Uint8Clamped => "Uint8Clamped",
            TypedArrayKind::Int16 => "Int16",
            TypedArrayKind::Uint16 => "Uint16",
            TypedArrayKind::Int32 => "Int32",
            TypedArrayKind::Uint32 => "Uint32",
            TypedArrayKind::Float32 => "Float32",
            TypedArrayKind::Float64 => "Float64",
            TypedArrayKind::BigInt64 => "BigInt64",
            TypedArrayKind::BigUint64 => "BigUint64",
        }
    }

    /// Check if this is a BigInt typed array
    pub fn is_bigint(self) -> bool {
        matches!(self, TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64)
    }

    /// Encode an already-coerced numeric into `out` (`element_size` bytes).
    ///
    /// A Number passed to a BigInt kind (or the reverse) encodes as zero;
    /// callers coerce with the matching conversion first.
    pub fn encode(self, value: &Numeric, little_endian: bool, out: &mut [u8]) {
        let size = self.element_size();
        let bits: u64 = match (self, value) {
            (TypedArrayKind::Float32, Numeric::Number(n)) => u64::from((*n as f32).to_bits()),
            (TypedArrayKind::Float64, Numeric::Number(n)) => n.to_bits(),
            (TypedArrayKind::Uint8Clamped, Numeric::Number(n)) => u64::from(clamp_u8(*n)),
            (TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64, Numeric::BigInt(n)) => {
                bigint_low_bits(n)
            }
            (kind, Numeric::Number(n)) if !kind.is_bigint() => modular_bits(*n),
            _ => 0,
        };
        let bytes = bits.to_le_bytes();
        out[..size].copy_from_slice(&bytes[..size]);
        if !little_endian {
            out[..size].reverse();
        }
    }

    /// Decode `element_size` bytes into a Value.
    pub fn decode(self, bytes: &[u8], little_endian: bool) -> Value {
        let size = self.element_size();
        let mut raw = [0u8; 8];
        raw[..size].copy_from_slice(&bytes[..size]);
        if !little_endian {
            raw[..size].reverse();
        }
        let bits = u64::from_le_bytes(raw);
        match self {
            TypedArrayKind::Int8 => Value::number(f64::from(bits as u8 as i8)),
            TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => {
                Value::number(f64::from(bits as u8))
            }
            TypedArrayKind::Int16 => Value::number(f64::from(bits as u16 as i16)),
            TypedArrayKind::Uint16 => Value::number(f64::from(bits as u16)),
            TypedArrayKind::Int32 => Value::number(f64::from(bits as u32 as i32)),
            TypedArrayKind::Uint32 => Value::number(f64::from(bits as u32)),
            TypedArrayKind::Float32 => Value::number(f64::from(f32::from_bits(bits as u32))),
            TypedArrayKind::Float64 => Value::number(f64::from_bits(bits)),
            TypedArrayKind::BigInt64 => Value::bigint(BigInt::from(bits as i64)),
            TypedArrayKind::BigUint64 => Value::bigint(BigInt::from(bits)),
        }
    }
}

/// ToInt32-style modular reduction; the low bits serve every integer width.
fn modular_bits(n: f64) -> u64 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u64
}

/// ToUint8Clamp: round half to even, NaN to zero.
fn clamp_u8(n: f64) -> u8 {
    if n.is_nan() {
        return 0;
    }
    n.clamp(0.0, 255.0).round_ties_even() as u8
}

/// Two's-complement low 64 bits of an arbitrary BigInt.
fn bigint_low_bits(n: &BigInt) -> u64 {
    let (sign, digits) = n.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    if sign == Sign::Minus {
        low.wrapping_neg()
    } else {
        low
    }
}

/// A JavaScript TypedArray
#[derive(Debug)]
pub struct JsTypedArray {
    /// Base object (prototype, properties)
    pub object: Gc<JsObject>,
    /// The underlying ArrayBuffer
    buffer: Gc<JsArrayBuffer>,
    /// The kind of typed array
    kind: TypedArrayKind,
    /// Byte offset into the buffer
    byte_offset: usize,
    /// Number of elements (not bytes)
    length: usize,
}

impl GcTraceable for JsTypedArray {
    const CLASS_NAME: &'static str = "TypedArray";

    fn trace(&self, tracer: &mut dyn FnMut(GcId)) {
        tracer(self.object.id());
        tracer(self.buffer.id());
    }
}

impl JsTypedArray {
    /// Create a view. Bounds were validated by the construction algorithm.
    pub fn new(
        object: Gc<JsObject>,
        buffer: Gc<JsArrayBuffer>,
        kind: TypedArrayKind,
        byte_offset: usize,
        length: usize,
    ) -> Self {
        Self {
            object,
            buffer,
            kind,
            byte_offset,
            length,
        }
    }

    /// Element kind
    pub fn kind(&self) -> TypedArrayKind {
        self.kind
    }

    /// The viewed buffer
    pub fn buffer(&self) -> Gc<JsArrayBuffer> {
        self.buffer
    }

    /// Byte offset into the buffer
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Element count fixed at construction
    pub fn length(&self) -> usize {
        self.length
    }

    /// Window size in bytes
    pub fn byte_length(&self) -> usize {
        self.length * self.kind.element_size()
    }

    /// Whether the window no longer fits the buffer (detached or shrunk).
    ///
    /// Reads the buffer's current state every time.
    pub fn is_out_of_bounds(&self, heap: &Heap) -> bool {
        let buffer = heap.get(self.buffer);
        buffer.is_detached() || self.byte_offset + self.byte_length() > buffer.byte_length()
    }

    /// Read element `index`. None when out of range or out of bounds.
    pub fn get(&self, heap: &Heap, index: usize) -> Option<Value> {
        if index >= self.length || self.is_out_of_bounds(heap) {
            return None;
        }
        let size = self.kind.element_size();
        let mut bytes = [0u8; 8];
        heap.get(self.buffer)
            .read_bytes(self.byte_offset + index * size, &mut bytes[..size])
            .then(|| self.kind.decode(&bytes, true))
    }

    /// Write element `index`. False when out of range or out of bounds.
    pub fn set(&self, heap: &Heap, index: usize, value: &Numeric) -> bool {
        if index >= self.length || self.is_out_of_bounds(heap) {
            return false;
        }
        let size = self.kind.element_size();
        let mut bytes = [0u8; 8];
        self.kind.encode(value, true, &mut bytes);
        heap.get(self.buffer)
            .write_bytes(self.byte_offset + index * size, &bytes[..size])
    }
}

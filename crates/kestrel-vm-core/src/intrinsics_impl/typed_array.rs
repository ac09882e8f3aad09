//! TypedArray construction and %TypedArray%.prototype accessors
//!
//! Implements the constructors of all 11 typed array kinds:
//! - Int8Array, Uint8Array, Uint8ClampedArray
//! - Int16Array, Uint16Array
//! - Int32Array, Uint32Array
//! - Float32Array, Float64Array
//! - BigInt64Array, BigUint64Array
//!
//! ## Prototype Chain
//!
//! ```text
//! instance → Int8Array.prototype → %TypedArray%.prototype → Object.prototype → null
//! ```

use kestrel_gc::Gc;

use crate::array_buffer::{JsArrayBuffer, WeakView};
use crate::context::VmContext;
use crate::convert::{Numeric, to_big_int, to_index, to_number};
use crate::error::{Completion, VmError, VmResult};
use crate::function::JsFunction;
use crate::intrinsics::arg;
use crate::intrinsics_impl::array_buffer::allocate_array_buffer;
use crate::typed_array::{JsTypedArray, TypedArrayKind};
use crate::value::{ObjectRef, Value};

/// `new <Kind>Array(...)`
pub fn typed_array_constructor(
    ctx: &mut VmContext,
    args: &[Value],
    new_target: Gc<JsFunction>,
    kind: TypedArrayKind,
) -> VmResult<Value> {
    let first = arg(args, 0);
    let array = if first.as_array_buffer().is_some() {
        construct_typed_array(ctx, kind, first, arg(args, 1), arg(args, 2), new_target)?
    } else if first.is_object() {
        return Err(VmError::type_error(format!(
            "{} can only be constructed from a length or an ArrayBuffer",
            kind.name()
        )));
    } else {
        construct_typed_array_with_length(ctx, kind, first, new_target)?
    };
    Ok(Value::object(ObjectRef::TypedArray(array)))
}

/// Allocate the view object. Nothing after this point may run user code.
fn allocate_view(
    ctx: &mut VmContext,
    proto: ObjectRef,
    buffer: Gc<JsArrayBuffer>,
    kind: TypedArrayKind,
    byte_offset: usize,
    length: usize,
) -> VmResult<Gc<JsTypedArray>> {
    let object = ctx.create_object(Some(proto))?;
    let array = ctx.alloc(JsTypedArray::new(object, buffer, kind, byte_offset, length))?;
    let heap = ctx.heap();
    heap.get(buffer)
        .register_view(heap, WeakView::TypedArray(array.downgrade()));
    Ok(array)
}

/// InitializeTypedArrayFromArrayBuffer, with the prototype resolved first.
pub fn construct_typed_array(
    ctx: &mut VmContext,
    kind: TypedArrayKind,
    buffer: &Value,
    byte_offset: &Value,
    length: &Value,
    new_target: Gc<JsFunction>,
) -> Completion<Gc<JsTypedArray>> {
    let Some(buffer) = buffer.as_array_buffer() else {
        return Err(VmError::type_error(format!(
            "First argument to {} constructor must be an ArrayBuffer",
            kind.name()
        )));
    };
    let _buffer_root = ctx.root(buffer);
    let _new_target_root = ctx.root(new_target);
    let element_size = kind.element_size();

    // May run user code; the result is held across the coercions below.
    let proto = ctx.get_prototype_from_constructor(new_target, move |i| {
        i.typed_array_prototype_for(kind)
    })?;
    let _proto_root = ctx.heap().root_id(proto.id());

    let offset = to_index(ctx, byte_offset)?;
    if offset % element_size != 0 {
        return Err(VmError::range_error(format!(
            "start offset of {} should be a multiple of {element_size}",
            kind.name()
        )));
    }

    let new_length = if length.is_undefined() {
        None
    } else {
        Some(to_index(ctx, length)?)
    };

    // Every coercion is behind us; read the buffer's state now.
    let source = ctx.heap().get(buffer);
    if source.is_detached() {
        tracing::debug!(
            target: "kestrel::vm",
            kind = kind.name(),
            "buffer detached during typed array argument coercion"
        );
        return Err(VmError::detached_buffer(format!(
            "Cannot construct {} on a detached ArrayBuffer",
            kind.name()
        )));
    }
    let buffer_byte_length = source.byte_length();

    let element_length = match new_length {
        None => {
            if buffer_byte_length % element_size != 0 {
                return Err(VmError::range_error(format!(
                    "byte length of {} should be a multiple of {element_size}",
                    kind.name()
                )));
            }
            if offset > buffer_byte_length {
                return Err(VmError::range_error(format!(
                    "Start offset {offset} is outside the bounds of the buffer"
                )));
            }
            (buffer_byte_length - offset) / element_size
        }
        Some(new_length) => {
            let end = new_length
                .checked_mul(element_size)
                .and_then(|bytes| bytes.checked_add(offset));
            match end {
                Some(end) if end <= buffer_byte_length => new_length,
                _ => {
                    return Err(VmError::range_error(format!(
                        "Invalid typed array length: {new_length}"
                    )));
                }
            }
        }
    };

    allocate_view(ctx, proto, buffer, kind, offset, element_length)
}

/// `new <Kind>Array(length)`: a fresh zeroed buffer.
pub fn construct_typed_array_with_length(
    ctx: &mut VmContext,
    kind: TypedArrayKind,
    length: &Value,
    new_target: Gc<JsFunction>,
) -> Completion<Gc<JsTypedArray>> {
    let _new_target_root = ctx.root(new_target);
    let proto = ctx.get_prototype_from_constructor(new_target, move |i| {
        i.typed_array_prototype_for(kind)
    })?;
    let _proto_root = ctx.heap().root_id(proto.id());

    let element_length = to_index(ctx, length)?;
    let byte_length = element_length
        .checked_mul(kind.element_size())
        .ok_or_else(|| VmError::range_error(format!("Invalid typed array length: {element_length}")))?;
    let ctor = ctx.intrinsics().array_buffer_constructor;
    let buffer = allocate_array_buffer(ctx, ctor, byte_length, None)?;
    allocate_view(ctx, proto, buffer, kind, 0, element_length)
}

// ============================================================================
// Element access
// ============================================================================

fn this_typed_array(this: &Value, method: &str) -> VmResult<Gc<JsTypedArray>> {
    this.as_typed_array().ok_or_else(|| {
        VmError::type_error(format!(
            "Method %TypedArray%.prototype.{method} called on incompatible receiver"
        ))
    })
}

fn element_target(array: &Value) -> VmResult<Gc<JsTypedArray>> {
    array
        .as_typed_array()
        .ok_or_else(|| VmError::type_error("Element access target is not a TypedArray"))
}

fn out_of_bounds_error(ctx: &VmContext, array: Gc<JsTypedArray>) -> VmError {
    let heap = ctx.heap();
    if heap.get(heap.get(array).buffer()).is_detached() {
        VmError::detached_buffer("Cannot perform this operation on a detached ArrayBuffer")
    } else {
        VmError::type_error("TypedArray is out of bounds")
    }
}

/// Read element `index`. `undefined` past the end; an error when the
/// buffer is detached or the view is out of bounds.
pub fn get_element(ctx: &mut VmContext, array: &Value, index: usize) -> Completion<Value> {
    let array = element_target(array)?;
    let heap = ctx.heap();
    let view = heap.get(array);
    if view.is_out_of_bounds(heap) {
        return Err(out_of_bounds_error(ctx, array));
    }
    Ok(view.get(heap, index).unwrap_or_default())
}

/// Write element `index` after coercing `value`; writes past the end are
/// ignored. The bounds are checked after the coercion.
pub fn set_element(
    ctx: &mut VmContext,
    array: &Value,
    index: usize,
    value: &Value,
) -> Completion<()> {
    let array = element_target(array)?;
    let _array_root = ctx.root(array);
    let numeric = if ctx.heap().get(array).kind().is_bigint() {
        Numeric::BigInt(to_big_int(ctx, value)?)
    } else {
        Numeric::Number(to_number(ctx, value)?)
    };
    let heap = ctx.heap();
    let view = heap.get(array);
    if view.is_out_of_bounds(heap) {
        return Err(out_of_bounds_error(ctx, array));
    }
    view.set(heap, index, &numeric);
    Ok(())
}

// ============================================================================
// %TypedArray%.prototype accessors
// ============================================================================

/// `get %TypedArray%.prototype.buffer`
pub fn get_buffer(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let array = this_typed_array(this, "buffer")?;
    Ok(Value::object(ObjectRef::ArrayBuffer(
        ctx.heap().get(array).buffer(),
    )))
}

/// `get %TypedArray%.prototype.byteLength` (0 when out of bounds)
pub fn get_byte_length(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let array = this_typed_array(this, "byteLength")?;
    let heap = ctx.heap();
    let view = heap.get(array);
    let len = if view.is_out_of_bounds(heap) { 0 } else { view.byte_length() };
    Ok(Value::number(len as f64))
}

/// `get %TypedArray%.prototype.byteOffset` (0 when out of bounds)
pub fn get_byte_offset(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let array = this_typed_array(this, "byteOffset")?;
    let heap = ctx.heap();
    let view = heap.get(array);
    let offset = if view.is_out_of_bounds(heap) { 0 } else { view.byte_offset() };
    Ok(Value::number(offset as f64))
}

/// `get %TypedArray%.prototype.length` (0 when out of bounds)
pub fn get_length(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let array = this_typed_array(this, "length")?;
    let heap = ctx.heap();
    let view = heap.get(array);
    let len = if view.is_out_of_bounds(heap) { 0 } else { view.length() };
    Ok(Value::number(len as f64))
}

//! ArrayBuffer constructor and prototype methods
//!
//! Every method that coerces an argument re-reads the buffer afterwards:
//! the coercion may have detached or resized it.

use kestrel_gc::Gc;

use crate::array_buffer::JsArrayBuffer;
use crate::context::VmContext;
use crate::convert::{to_index, to_integer_or_infinity};
use crate::error::{Completion, VmError, VmResult};
use crate::function::JsFunction;
use crate::intrinsics::arg;
use crate::object::PropertyKey;
use crate::value::{ObjectRef, Value};

fn this_array_buffer(this: &Value, method: &str) -> VmResult<Gc<JsArrayBuffer>> {
    this.as_array_buffer().ok_or_else(|| {
        VmError::type_error(format!(
            "Method ArrayBuffer.prototype.{method} called on incompatible receiver"
        ))
    })
}

fn allocation_failed() -> VmError {
    VmError::range_error("Array buffer allocation failed")
}

// ============================================================================
// Construction
// ============================================================================

/// `new ArrayBuffer(length, options)`
pub fn array_buffer_constructor(
    ctx: &mut VmContext,
    args: &[Value],
    new_target: Gc<JsFunction>,
) -> VmResult<Value> {
    let buffer = construct_array_buffer(ctx, arg(args, 0), arg(args, 1), new_target)?;
    Ok(Value::object(ObjectRef::ArrayBuffer(buffer)))
}

/// ArrayBuffer construction: `ToIndex(length)`, the optional
/// `maxByteLength` option, then allocation with the new target's prototype.
pub fn construct_array_buffer(
    ctx: &mut VmContext,
    length: &Value,
    options: &Value,
    new_target: Gc<JsFunction>,
) -> Completion<Gc<JsArrayBuffer>> {
    let _new_target_root = ctx.root(new_target);
    let byte_length = to_index(ctx, length)?;
    let max_byte_length = max_byte_length_option(ctx, options)?;
    allocate_array_buffer(ctx, new_target, byte_length, max_byte_length)
}

fn max_byte_length_option(ctx: &mut VmContext, options: &Value) -> Completion<Option<usize>> {
    if !options.is_object() {
        return Ok(None);
    }
    let max = ctx.get(options, &PropertyKey::string("maxByteLength"))?;
    if max.is_undefined() {
        return Ok(None);
    }
    Ok(Some(to_index(ctx, &max)?))
}

/// AllocateArrayBuffer
pub fn allocate_array_buffer(
    ctx: &mut VmContext,
    new_target: Gc<JsFunction>,
    byte_length: usize,
    max_byte_length: Option<usize>,
) -> Completion<Gc<JsArrayBuffer>> {
    if max_byte_length.is_some_and(|max| byte_length > max) {
        return Err(VmError::range_error(
            "Invalid array buffer length: exceeds maxByteLength",
        ));
    }
    let proto = ctx.get_prototype_from_constructor(new_target, |i| i.array_buffer_prototype)?;
    let limit = ctx.config().max_array_buffer_length;
    if byte_length > limit || max_byte_length.is_some_and(|max| max > limit) {
        tracing::debug!(
            target: "kestrel::vm",
            byte_length,
            limit,
            "array buffer length over configured maximum"
        );
        return Err(allocation_failed());
    }
    let object = ctx.create_object(Some(proto))?;
    let buffer = JsArrayBuffer::new(object, byte_length, max_byte_length)?;
    ctx.alloc(buffer)
}

/// `ArrayBuffer.isView(arg)`
pub fn is_view(_ctx: &mut VmContext, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let view = arg(args, 0);
    Ok(Value::boolean(
        view.as_data_view().is_some() || view.as_typed_array().is_some(),
    ))
}

// ============================================================================
// Accessors
// ============================================================================

/// `get ArrayBuffer.prototype.byteLength`
pub fn get_byte_length(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let buffer = this_array_buffer(this, "byteLength")?;
    Ok(Value::number(ctx.heap().get(buffer).byte_length() as f64))
}

/// `get ArrayBuffer.prototype.maxByteLength`
pub fn get_max_byte_length(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let buffer = this_array_buffer(this, "maxByteLength")?;
    Ok(Value::number(ctx.heap().get(buffer).max_byte_length() as f64))
}

/// `get ArrayBuffer.prototype.resizable`
pub fn get_resizable(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let buffer = this_array_buffer(this, "resizable")?;
    Ok(Value::boolean(ctx.heap().get(buffer).is_resizable()))
}

/// `get ArrayBuffer.prototype.detached`
pub fn get_detached(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let buffer = this_array_buffer(this, "detached")?;
    Ok(Value::boolean(ctx.heap().get(buffer).is_detached()))
}

// ============================================================================
// Methods
// ============================================================================

/// Resolve a relative index argument against `len`.
fn relative_index(ctx: &mut VmContext, value: &Value, len: usize) -> Completion<usize> {
    let relative = to_integer_or_infinity(ctx, value)?;
    let len = len as f64;
    let index = if relative < 0.0 {
        (len + relative).max(0.0)
    } else {
        relative.min(len)
    };
    Ok(index as usize)
}

/// `ArrayBuffer.prototype.slice(start, end)`
pub fn slice(ctx: &mut VmContext, this: &Value, args: &[Value]) -> VmResult<Value> {
    let buffer = this_array_buffer(this, "slice")?;
    let _buffer_root = ctx.root(buffer);
    if ctx.heap().get(buffer).is_detached() {
        return Err(VmError::detached_buffer(
            "Cannot perform ArrayBuffer.prototype.slice on a detached ArrayBuffer",
        ));
    }
    let len = ctx.heap().get(buffer).byte_length();

    let first = relative_index(ctx, arg(args, 0), len)?;
    let end = if arg(args, 1).is_undefined() {
        len
    } else {
        relative_index(ctx, arg(args, 1), len)?
    };
    let new_len = end.saturating_sub(first);

    let ctor = ctx.intrinsics().array_buffer_constructor;
    let new_buffer = allocate_array_buffer(ctx, ctor, new_len, None)?;

    // The coercions above may have detached or shrunk the source.
    let source = ctx.heap().get(buffer);
    if source.is_detached() {
        return Err(VmError::detached_buffer(
            "Cannot perform ArrayBuffer.prototype.slice on a detached ArrayBuffer",
        ));
    }
    if let Some(bytes) = source.copy_range(first, first + new_len) {
        ctx.heap().get(new_buffer).write_bytes(0, &bytes);
    }
    Ok(Value::object(ObjectRef::ArrayBuffer(new_buffer)))
}

/// `ArrayBuffer.prototype.resize(newLength)`
pub fn resize(ctx: &mut VmContext, this: &Value, args: &[Value]) -> VmResult<Value> {
    let buffer = this_array_buffer(this, "resize")?;
    if !ctx.heap().get(buffer).is_resizable() {
        return Err(VmError::type_error(
            "Method ArrayBuffer.prototype.resize called on incompatible receiver",
        ));
    }
    let _buffer_root = ctx.root(buffer);
    let new_length = to_index(ctx, arg(args, 0))?;
    ctx.resize_array_buffer(buffer, new_length)?;
    Ok(Value::undefined())
}

/// `ArrayBuffer.prototype.transfer(newLength)`
pub fn transfer(ctx: &mut VmContext, this: &Value, args: &[Value]) -> VmResult<Value> {
    copy_and_detach(ctx, this, arg(args, 0), true, "transfer")
}

/// `ArrayBuffer.prototype.transferToFixedLength(newLength)`
pub fn transfer_to_fixed_length(
    ctx: &mut VmContext,
    this: &Value,
    args: &[Value],
) -> VmResult<Value> {
    copy_and_detach(ctx, this, arg(args, 0), false, "transferToFixedLength")
}

/// ArrayBufferCopyAndDetach
fn copy_and_detach(
    ctx: &mut VmContext,
    this: &Value,
    new_length: &Value,
    preserve_resizability: bool,
    method: &str,
) -> VmResult<Value> {
    let buffer = this_array_buffer(this, method)?;
    let _buffer_root = ctx.root(buffer);
    let new_length = if new_length.is_undefined() {
        ctx.heap().get(buffer).byte_length()
    } else {
        to_index(ctx, new_length)?
    };

    let source = ctx.heap().get(buffer);
    if source.is_detached() {
        return Err(VmError::detached_buffer(format!(
            "Cannot perform ArrayBuffer.prototype.{method} on a detached ArrayBuffer"
        )));
    }
    let max_byte_length = if preserve_resizability {
        source.declared_max_byte_length()
    } else {
        None
    };
    if max_byte_length.is_some_and(|max| new_length > max) {
        return Err(VmError::range_error(
            "new length exceeds the buffer's maxByteLength",
        ));
    }
    if new_length > ctx.config().max_array_buffer_length {
        return Err(allocation_failed());
    }

    // Everything that can fail happens before the source is detached.
    let proto = ctx.intrinsics().array_buffer_prototype;
    let object = ctx.create_object(Some(ObjectRef::Ordinary(proto)))?;
    let current = ctx.heap().get(buffer).byte_length();
    // The source's charge is released when its bytes move.
    let needed = (std::mem::size_of::<JsArrayBuffer>() + new_length).saturating_sub(current);
    ctx.heap().ensure_headroom(needed)?;
    let mut grown = Vec::new();
    if new_length > current {
        grown
            .try_reserve_exact(new_length)
            .map_err(|_| allocation_failed())?;
    }

    let mut moved = ctx.take_array_buffer_data(buffer).unwrap_or_default();
    let data = if new_length > current {
        grown.extend_from_slice(&moved);
        grown.resize(new_length, 0);
        grown
    } else {
        moved.truncate(new_length);
        moved.shrink_to_fit();
        moved
    };

    let new_buffer = ctx.alloc(JsArrayBuffer::from_bytes(object, data, max_byte_length))?;
    Ok(Value::object(ObjectRef::ArrayBuffer(new_buffer)))
}

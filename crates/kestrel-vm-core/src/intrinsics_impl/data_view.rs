//! DataView constructor, accessors and element access
//!
//! ## Construction
//!
//! `construct_data_view` validates the window in a fixed order. Both index
//! coercions and prototype resolution may run user code, and user code may
//! detach (or shrink) the buffer, so every buffer-dependent fact is read
//! again after each of those points instead of being carried across them:
//!
//! ```text
//! type check → ToIndex(offset) → detached? → read length → offset in range?
//!   → ToIndex(length) → offset + length checked → resolve prototype, allocate
//!   → detached? (discard the new view on failure) → return
//! ```

use kestrel_gc::{Gc, Heap};

use crate::array_buffer::WeakView;
use crate::context::VmContext;
use crate::convert::{Numeric, to_big_int, to_boolean, to_index, to_number};
use crate::data_view::JsDataView;
use crate::error::{Completion, VmError, VmResult};
use crate::function::JsFunction;
use crate::intrinsics::arg;
use crate::typed_array::TypedArrayKind;
use crate::value::{ObjectRef, Value};

/// End of a view window, or `None` if `offset + length` overflows.
pub fn view_end(offset: usize, length: usize) -> Option<usize> {
    offset.checked_add(length)
}

fn detached_error() -> VmError {
    VmError::detached_buffer("Cannot construct a DataView on a detached ArrayBuffer")
}

/// Free a view that failed its final re-check. It was never published, so
/// nothing else refers to it or its base object.
fn discard_view(heap: &mut Heap, view: Gc<JsDataView>) {
    let base = heap.get(view).object;
    let freed_view = heap.discard(view.id());
    let freed_base = heap.discard(base.id());
    tracing::debug!(
        target: "kestrel::vm",
        freed_view,
        freed_base,
        "discarded DataView after late buffer invalidation"
    );
}

/// `new DataView(buffer, byteOffset, byteLength)`
pub fn data_view_constructor(
    ctx: &mut VmContext,
    args: &[Value],
    new_target: Gc<JsFunction>,
) -> VmResult<Value> {
    let view = construct_data_view(ctx, arg(args, 0), arg(args, 1), arg(args, 2), new_target)?;
    Ok(Value::object(ObjectRef::DataView(view)))
}

/// DataView construction.
///
/// An `undefined` `byte_length` means "to the end of the buffer". On any
/// failure no view object survives the call.
pub fn construct_data_view(
    ctx: &mut VmContext,
    buffer: &Value,
    byte_offset: &Value,
    byte_length: &Value,
    new_target: Gc<JsFunction>,
) -> Completion<Gc<JsDataView>> {
    // 1. The buffer argument must be an ArrayBuffer.
    let Some(buffer) = buffer.as_array_buffer() else {
        tracing::debug!(target: "kestrel::vm", step = 1, "DataView buffer is not an ArrayBuffer");
        return Err(VmError::type_error(
            "First argument to DataView constructor must be an ArrayBuffer",
        ));
    };
    let _buffer_root = ctx.root(buffer);
    let _new_target_root = ctx.root(new_target);

    // 2. May run user code.
    let offset = to_index(ctx, byte_offset)?;

    // 3.
    if ctx.heap().get(buffer).is_detached() {
        tracing::debug!(target: "kestrel::vm", step = 3, "buffer detached during offset coercion");
        return Err(detached_error());
    }

    // 4.
    let buffer_byte_length = ctx.heap().get(buffer).byte_length();

    // 5.
    if offset > buffer_byte_length {
        tracing::debug!(
            target: "kestrel::vm",
            step = 5,
            offset,
            buffer_byte_length,
            "DataView offset out of range"
        );
        return Err(VmError::range_error(format!(
            "Start offset {offset} is outside the bounds of the buffer"
        )));
    }

    // 6-7. Length coercion may run user code; the sum is checked, never wrapped.
    let view_byte_length = if byte_length.is_undefined() {
        buffer_byte_length - offset
    } else {
        let length = to_index(ctx, byte_length)?;
        match view_end(offset, length) {
            Some(end) if end <= buffer_byte_length => length,
            _ => {
                tracing::debug!(
                    target: "kestrel::vm",
                    step = 7,
                    offset,
                    length,
                    buffer_byte_length,
                    "DataView length out of range"
                );
                return Err(VmError::range_error(format!(
                    "Invalid DataView length {length}"
                )));
            }
        }
    };

    // 8. Prototype resolution may run user code.
    let object = ctx.ordinary_create_from_constructor(new_target, |i| i.data_view_prototype)?;
    let view = ctx.alloc(JsDataView::new(object, buffer, offset, view_byte_length))?;

    // 9. The view is not returned if the buffer went away meanwhile.
    let current = ctx.heap().get(buffer);
    if current.is_detached() {
        discard_view(ctx.heap_mut(), view);
        return Err(detached_error());
    }
    if offset + view_byte_length > current.byte_length() {
        discard_view(ctx.heap_mut(), view);
        return Err(VmError::range_error(format!(
            "Invalid DataView length {view_byte_length}"
        )));
    }

    // 10.
    let heap = ctx.heap();
    heap.get(buffer)
        .register_view(heap, WeakView::DataView(view.downgrade()));
    Ok(view)
}

// ============================================================================
// Accessors
// ============================================================================

fn this_data_view(this: &Value, method: &str) -> VmResult<Gc<JsDataView>> {
    this.as_data_view().ok_or_else(|| {
        VmError::type_error(format!(
            "Method DataView.prototype.{method} called on incompatible receiver"
        ))
    })
}

fn ensure_in_bounds(ctx: &VmContext, view: Gc<JsDataView>) -> VmResult<()> {
    let heap = ctx.heap();
    let view = heap.get(view);
    if view.is_detached(heap) {
        return Err(VmError::detached_buffer("DataView's buffer is detached"));
    }
    if view.is_out_of_bounds(heap) {
        return Err(VmError::type_error("DataView is out of bounds"));
    }
    Ok(())
}

/// `get DataView.prototype.buffer`
pub fn get_buffer(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let view = this_data_view(this, "buffer")?;
    Ok(Value::object(ObjectRef::ArrayBuffer(
        ctx.heap().get(view).buffer(),
    )))
}

/// `get DataView.prototype.byteLength`
pub fn get_byte_length(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let view = this_data_view(this, "byteLength")?;
    ensure_in_bounds(ctx, view)?;
    Ok(Value::number(ctx.heap().get(view).byte_length() as f64))
}

/// `get DataView.prototype.byteOffset`
pub fn get_byte_offset(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let view = this_data_view(this, "byteOffset")?;
    ensure_in_bounds(ctx, view)?;
    Ok(Value::number(ctx.heap().get(view).byte_offset() as f64))
}

// ============================================================================
// Element access
// ============================================================================

/// GetViewValue: `ToIndex(requestIndex)`, `ToBoolean(littleEndian)`, then
/// the bounds check against the buffer's current state.
pub fn get_view_value(
    ctx: &mut VmContext,
    view: &Value,
    request_index: &Value,
    little_endian: &Value,
    kind: TypedArrayKind,
) -> Completion<Value> {
    let method = format!("get{}", kind.view_type_name());
    let view = this_data_view(view, &method)?;
    let _view_root = ctx.root(view);
    let index = to_index(ctx, request_index)?;
    let little_endian = to_boolean(little_endian);
    let heap = ctx.heap();
    heap.get(view).get_value(heap, kind, index, little_endian)
}

/// SetViewValue: `ToIndex(requestIndex)`, value coercion (`ToNumber` or
/// `ToBigInt`), `ToBoolean(littleEndian)`, then the bounds check.
pub fn set_view_value(
    ctx: &mut VmContext,
    view: &Value,
    request_index: &Value,
    value: &Value,
    little_endian: &Value,
    kind: TypedArrayKind,
) -> Completion<()> {
    let method = format!("set{}", kind.view_type_name());
    let view = this_data_view(view, &method)?;
    let _view_root = ctx.root(view);
    let index = to_index(ctx, request_index)?;
    let numeric = if kind.is_bigint() {
        Numeric::BigInt(to_big_int(ctx, value)?)
    } else {
        Numeric::Number(to_number(ctx, value)?)
    };
    let little_endian = to_boolean(little_endian);
    let heap = ctx.heap();
    heap.get(view)
        .set_value(heap, kind, index, &numeric, little_endian)
}

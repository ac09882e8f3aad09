//! ArrayBuffer, DataView element access and TypedArray tests

use kestrel_gc::{Gc, GcConfig};
use kestrel_vm_core::intrinsics_impl::typed_array::{get_element, set_element};
use kestrel_vm_core::{
    Completion, JsArrayBuffer, JsTypedArray, ObjectRef, PropertyKey, RuntimeConfig,
    TypedArrayKind, Value, VmContext, VmError,
};
use num_bigint::BigInt;

fn context() -> VmContext {
    VmContext::new(RuntimeConfig::new()).expect("realm allocation")
}

/// A context whose heap limit leaves `headroom` bytes above the realm.
/// Implicit collection is disabled so accounting is exact.
fn context_with_headroom(headroom: usize) -> VmContext {
    let realm_bytes = context().heap().total_bytes();
    let gc = GcConfig::default()
        .heap_limit(realm_bytes + headroom)
        .gc_threshold(usize::MAX);
    VmContext::new(RuntimeConfig::new().gc(gc)).expect("realm allocation")
}

fn construct(ctx: &mut VmContext, ctor: Value, args: &[Value]) -> Completion<Value> {
    ctx.construct(&ctor, args, None)
}

fn array_buffer_ctor(ctx: &VmContext) -> Value {
    Value::object(ObjectRef::Function(ctx.intrinsics().array_buffer_constructor))
}

fn new_buffer(ctx: &mut VmContext, len: usize) -> Gc<JsArrayBuffer> {
    let ctor = array_buffer_ctor(ctx);
    construct(ctx, ctor, &[Value::number(len as f64)])
        .unwrap()
        .as_array_buffer()
        .unwrap()
}

fn new_resizable_buffer(ctx: &mut VmContext, len: usize, max: usize) -> Value {
    let options = ctx.create_plain_object().unwrap();
    ctx.define_property(
        ObjectRef::Ordinary(options),
        PropertyKey::string("maxByteLength"),
        Value::number(max as f64),
    );
    let ctor = array_buffer_ctor(ctx);
    construct(
        ctx,
        ctor,
        &[Value::number(len as f64), Value::object(ObjectRef::Ordinary(options))],
    )
    .unwrap()
}

fn new_typed_array(
    ctx: &mut VmContext,
    kind: TypedArrayKind,
    args: &[Value],
) -> Completion<Gc<JsTypedArray>> {
    let ctor = Value::object(ObjectRef::Function(
        ctx.intrinsics().typed_array_constructor_for(kind),
    ));
    Ok(construct(ctx, ctor, args)?.as_typed_array().unwrap())
}

fn property(ctx: &mut VmContext, target: &Value, name: &str) -> Completion<Value> {
    ctx.get(target, &PropertyKey::string(name))
}

fn invoke(ctx: &mut VmContext, target: &Value, name: &str, args: &[Value]) -> Completion<Value> {
    let method = property(ctx, target, name)?;
    ctx.call(&method, target, args)
}

fn bytes_of(ctx: &VmContext, buffer: Gc<JsArrayBuffer>) -> Vec<u8> {
    ctx.heap()
        .get(buffer)
        .with_data(|bytes| bytes.to_vec())
        .unwrap_or_default()
}

// ============================================================================
// ArrayBuffer
// ============================================================================

#[test]
fn test_array_buffer_zero_filled() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    assert_eq!(bytes_of(&ctx, buffer), vec![0; 8]);

    let value = Value::object(ObjectRef::ArrayBuffer(buffer));
    assert_eq!(property(&mut ctx, &value, "byteLength").unwrap(), Value::number(8.0));
    assert_eq!(property(&mut ctx, &value, "resizable").unwrap(), Value::boolean(false));
    assert_eq!(property(&mut ctx, &value, "maxByteLength").unwrap(), Value::number(8.0));
}

#[test]
fn test_array_buffer_length_over_limit_is_range_error() {
    let mut ctx = VmContext::new(RuntimeConfig::new().max_array_buffer_length(1024)).unwrap();
    let ctor = array_buffer_ctor(&ctx);
    let err = construct(&mut ctx, ctor, &[Value::number(2048.0)]).unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
}

#[test]
fn test_array_buffer_length_above_max_is_range_error() {
    let mut ctx = context();
    let options = ctx.create_plain_object().unwrap();
    ctx.define_property(
        ObjectRef::Ordinary(options),
        PropertyKey::string("maxByteLength"),
        Value::number(4.0),
    );
    let ctor = array_buffer_ctor(&ctx);
    let err = construct(
        &mut ctx,
        ctor,
        &[Value::number(8.0), Value::object(ObjectRef::Ordinary(options))],
    )
    .unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
}

#[test]
fn test_slice_copies_range() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    assert!(ctx.heap().get(buffer).write_bytes(0, &[1, 2, 3, 4, 5, 6, 7, 8]));
    let value = Value::object(ObjectRef::ArrayBuffer(buffer));

    let sliced = invoke(&mut ctx, &value, "slice", &[Value::number(2.0), Value::number(-2.0)])
        .unwrap()
        .as_array_buffer()
        .unwrap();
    assert_eq!(bytes_of(&ctx, sliced), vec![3, 4, 5, 6]);

    let tail = invoke(&mut ctx, &value, "slice", &[Value::number(6.0)])
        .unwrap()
        .as_array_buffer()
        .unwrap();
    assert_eq!(bytes_of(&ctx, tail), vec![7, 8]);
}

#[test]
fn test_slice_on_detached_buffer_is_type_error() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    ctx.detach_array_buffer(buffer);
    let value = Value::object(ObjectRef::ArrayBuffer(buffer));
    let err = invoke(&mut ctx, &value, "slice", &[]).unwrap_err();
    assert!(matches!(err, VmError::DetachedBuffer(_)), "got {err:?}");
}

#[test]
fn test_resize_within_max() {
    let mut ctx = context();
    let value = new_resizable_buffer(&mut ctx, 4, 16);

    invoke(&mut ctx, &value, "resize", &[Value::number(12.0)]).unwrap();
    assert_eq!(property(&mut ctx, &value, "byteLength").unwrap(), Value::number(12.0));
    assert_eq!(property(&mut ctx, &value, "maxByteLength").unwrap(), Value::number(16.0));

    let err = invoke(&mut ctx, &value, "resize", &[Value::number(17.0)]).unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
}

#[test]
fn test_resize_fixed_length_is_type_error() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 4);
    let value = Value::object(ObjectRef::ArrayBuffer(buffer));
    let err = invoke(&mut ctx, &value, "resize", &[Value::number(2.0)]).unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
}

#[test]
fn test_transfer_detaches_source() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 4);
    assert!(ctx.heap().get(buffer).write_bytes(0, &[9, 8, 7, 6]));
    let value = Value::object(ObjectRef::ArrayBuffer(buffer));

    let moved = invoke(&mut ctx, &value, "transfer", &[Value::number(6.0)])
        .unwrap()
        .as_array_buffer()
        .unwrap();
    assert_eq!(bytes_of(&ctx, moved), vec![9, 8, 7, 6, 0, 0]);
    assert_eq!(property(&mut ctx, &value, "detached").unwrap(), Value::boolean(true));
    assert_eq!(property(&mut ctx, &value, "byteLength").unwrap(), Value::number(0.0));

    let err = invoke(&mut ctx, &value, "transfer", &[]).unwrap_err();
    assert!(matches!(err, VmError::DetachedBuffer(_)), "got {err:?}");
}

#[test]
fn test_transfer_to_fixed_length_drops_resizability() {
    let mut ctx = context();
    let value = new_resizable_buffer(&mut ctx, 4, 16);

    let kept = invoke(&mut ctx, &value, "transfer", &[]).unwrap();
    assert_eq!(property(&mut ctx, &kept, "resizable").unwrap(), Value::boolean(true));

    let fixed = invoke(&mut ctx, &kept, "transferToFixedLength", &[Value::number(32.0)]).unwrap();
    assert_eq!(property(&mut ctx, &fixed, "resizable").unwrap(), Value::boolean(false));
    assert_eq!(property(&mut ctx, &fixed, "byteLength").unwrap(), Value::number(32.0));
    assert_eq!(property(&mut ctx, &kept, "detached").unwrap(), Value::boolean(true));
}

#[test]
fn test_detach_is_idempotent() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 4);
    assert!(ctx.detach_array_buffer(buffer));
    assert!(!ctx.detach_array_buffer(buffer));
    let heap = ctx.heap();
    assert!(heap.get(buffer).is_detached());
    assert_eq!(heap.get(buffer).byte_length(), 0);
}

#[test]
fn test_is_view() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    let array = new_typed_array(
        &mut ctx,
        TypedArrayKind::Uint8,
        &[Value::object(ObjectRef::ArrayBuffer(buffer))],
    )
    .unwrap();
    let ctor = array_buffer_ctor(&ctx);

    let result = invoke(
        &mut ctx,
        &ctor,
        "isView",
        &[Value::object(ObjectRef::TypedArray(array))],
    )
    .unwrap();
    assert_eq!(result, Value::boolean(true));
    let result = invoke(
        &mut ctx,
        &ctor,
        "isView",
        &[Value::object(ObjectRef::ArrayBuffer(buffer))],
    )
    .unwrap();
    assert_eq!(result, Value::boolean(false));
}

// ============================================================================
// Heap accounting of byte regions
// ============================================================================

#[test]
fn test_transfer_near_heap_limit_moves_bytes() {
    let mut ctx = context_with_headroom(1_500_000);
    let buffer = new_buffer(&mut ctx, 1_000_000);
    assert!(ctx.heap().get(buffer).write_bytes(0, &[1, 2, 3]));
    let value = Value::object(ObjectRef::ArrayBuffer(buffer));
    let before = ctx.heap().total_bytes();

    let moved = invoke(&mut ctx, &value, "transfer", &[])
        .unwrap()
        .as_array_buffer()
        .unwrap();
    assert!(ctx.heap().get(buffer).is_detached());
    assert_eq!(ctx.heap().get(moved).byte_length(), 1_000_000);
    assert_eq!(&bytes_of(&ctx, moved)[..3], &[1, 2, 3]);
    // Only the new buffer's headers are added; the bytes changed owner.
    assert!(ctx.heap().total_bytes() < before + 1024);
}

#[test]
fn test_transfer_over_heap_limit_leaves_source_intact() {
    let mut ctx = context_with_headroom(1_500_000);
    let buffer = new_buffer(&mut ctx, 1_000_000);
    assert!(ctx.heap().get(buffer).write_bytes(0, &[7]));
    let value = Value::object(ObjectRef::ArrayBuffer(buffer));

    let err = invoke(&mut ctx, &value, "transfer", &[Value::number(1_600_000.0)]).unwrap_err();
    assert!(matches!(err, VmError::OutOfMemory(_)), "got {err:?}");
    assert!(!ctx.heap().get(buffer).is_detached());
    assert_eq!(ctx.heap().get(buffer).byte_length(), 1_000_000);
    assert_eq!(bytes_of(&ctx, buffer)[0], 7);
}

#[test]
fn test_resize_and_detach_recharge_heap() {
    let mut ctx = context_with_headroom(128 << 20);
    let value = new_resizable_buffer(&mut ctx, 16, 64_000_000);
    let buffer = value.as_array_buffer().unwrap();
    let before = ctx.heap().total_bytes();

    invoke(&mut ctx, &value, "resize", &[Value::number(64_000_000.0)]).unwrap();
    assert_eq!(ctx.heap().total_bytes(), before + 64_000_000 - 16);
    assert_eq!(ctx.gc_stats().total_bytes, before + 64_000_000 - 16);

    invoke(&mut ctx, &value, "resize", &[Value::number(8.0)]).unwrap();
    assert_eq!(ctx.heap().total_bytes(), before - 8);

    assert!(ctx.detach_array_buffer(buffer));
    assert_eq!(ctx.heap().total_bytes(), before - 16);
    assert!(!ctx.detach_array_buffer(buffer));
    assert_eq!(ctx.heap().total_bytes(), before - 16);
}

#[test]
fn test_resize_past_heap_limit_is_fatal_and_keeps_length() {
    let mut ctx = context_with_headroom(1_000_000);
    let value = new_resizable_buffer(&mut ctx, 16, 4_000_000);

    let err = invoke(&mut ctx, &value, "resize", &[Value::number(2_000_000.0)]).unwrap_err();
    assert!(matches!(err, VmError::OutOfMemory(_)), "got {err:?}");
    assert!(!err.is_catchable());
    assert_eq!(property(&mut ctx, &value, "byteLength").unwrap(), Value::number(16.0));

    invoke(&mut ctx, &value, "resize", &[Value::number(500_000.0)]).unwrap();
    assert_eq!(property(&mut ctx, &value, "byteLength").unwrap(), Value::number(500_000.0));
}

// ============================================================================
// DataView element access
// ============================================================================

fn new_view(ctx: &mut VmContext, buffer: Gc<JsArrayBuffer>) -> Value {
    let ctor = Value::object(ObjectRef::Function(ctx.intrinsics().data_view_constructor));
    construct(ctx, ctor, &[Value::object(ObjectRef::ArrayBuffer(buffer))]).unwrap()
}

#[test]
fn test_data_view_endianness() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 4);
    let view = new_view(&mut ctx, buffer);

    invoke(
        &mut ctx,
        &view,
        "setUint16",
        &[Value::number(0.0), Value::number(258.0)],
    )
    .unwrap();
    invoke(
        &mut ctx,
        &view,
        "setUint16",
        &[Value::number(2.0), Value::number(258.0), Value::boolean(true)],
    )
    .unwrap();
    assert_eq!(bytes_of(&ctx, buffer), vec![1, 2, 2, 1]);

    let big = invoke(&mut ctx, &view, "getUint16", &[Value::number(0.0)]).unwrap();
    let little = invoke(
        &mut ctx,
        &view,
        "getUint16",
        &[Value::number(0.0), Value::boolean(true)],
    )
    .unwrap();
    assert_eq!(big, Value::number(258.0));
    assert_eq!(little, Value::number(513.0));
}

#[test]
fn test_data_view_float_and_signed() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    let view = new_view(&mut ctx, buffer);

    invoke(&mut ctx, &view, "setFloat64", &[Value::number(0.0), Value::number(1.5)]).unwrap();
    let value = invoke(&mut ctx, &view, "getFloat64", &[Value::number(0.0)]).unwrap();
    assert_eq!(value, Value::number(1.5));

    invoke(&mut ctx, &view, "setInt8", &[Value::number(7.0), Value::number(255.0)]).unwrap();
    let value = invoke(&mut ctx, &view, "getInt8", &[Value::number(7.0)]).unwrap();
    assert_eq!(value, Value::number(-1.0));
}

#[test]
fn test_data_view_bigint_access() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    let view = new_view(&mut ctx, buffer);

    invoke(
        &mut ctx,
        &view,
        "setBigInt64",
        &[Value::number(0.0), Value::bigint(BigInt::from(-2))],
    )
    .unwrap();
    let signed = invoke(&mut ctx, &view, "getBigInt64", &[Value::number(0.0)]).unwrap();
    let unsigned = invoke(&mut ctx, &view, "getBigUint64", &[Value::number(0.0)]).unwrap();
    assert_eq!(signed, Value::bigint(BigInt::from(-2)));
    assert_eq!(unsigned, Value::bigint(BigInt::from(u64::MAX - 1)));

    let err = invoke(
        &mut ctx,
        &view,
        "setBigInt64",
        &[Value::number(0.0), Value::number(1.0)],
    )
    .unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
}

#[test]
fn test_data_view_access_past_end_is_range_error() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 4);
    let view = new_view(&mut ctx, buffer);
    let err = invoke(&mut ctx, &view, "getInt32", &[Value::number(1.0)]).unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
}

#[test]
fn test_data_view_has_no_clamped_accessors() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 4);
    let view = new_view(&mut ctx, buffer);
    let method = property(&mut ctx, &view, "getUint8Clamped").unwrap();
    assert!(method.is_undefined());
}

#[test]
fn test_data_view_shrunk_buffer_is_out_of_bounds() {
    let mut ctx = context();
    let options = ctx.create_plain_object().unwrap();
    ctx.define_property(
        ObjectRef::Ordinary(options),
        PropertyKey::string("maxByteLength"),
        Value::number(16.0),
    );
    let ctor = array_buffer_ctor(&ctx);
    let buffer = construct(
        &mut ctx,
        ctor,
        &[Value::number(8.0), Value::object(ObjectRef::Ordinary(options))],
    )
    .unwrap()
    .as_array_buffer()
    .unwrap();
    let view = new_view(&mut ctx, buffer);

    ctx.heap().get(buffer).resize(4).unwrap();
    let err = property(&mut ctx, &view, "byteLength").unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
    let err = invoke(&mut ctx, &view, "getUint8", &[Value::number(0.0)]).unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
}

// ============================================================================
// TypedArray
// ============================================================================

#[test]
fn test_typed_array_over_buffer() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 16);
    let array = new_typed_array(
        &mut ctx,
        TypedArrayKind::Int32,
        &[
            Value::object(ObjectRef::ArrayBuffer(buffer)),
            Value::number(4.0),
            Value::number(2.0),
        ],
    )
    .unwrap();
    let value = Value::object(ObjectRef::TypedArray(array));

    assert_eq!(property(&mut ctx, &value, "length").unwrap(), Value::number(2.0));
    assert_eq!(property(&mut ctx, &value, "byteOffset").unwrap(), Value::number(4.0));
    assert_eq!(property(&mut ctx, &value, "byteLength").unwrap(), Value::number(8.0));
    assert_eq!(
        property(&mut ctx, &value, "BYTES_PER_ELEMENT").unwrap(),
        Value::number(4.0)
    );

    set_element(&mut ctx, &value, 1, &Value::number(-2.0)).unwrap();
    assert_eq!(get_element(&mut ctx, &value, 1).unwrap(), Value::number(-2.0));
    assert_eq!(get_element(&mut ctx, &value, 2).unwrap(), Value::undefined());
    assert_eq!(bytes_of(&ctx, buffer)[8..12].to_vec(), vec![0xfe, 0xff, 0xff, 0xff]);
}

#[test]
fn test_typed_array_from_length() {
    let mut ctx = context();
    let array = new_typed_array(&mut ctx, TypedArrayKind::Float64, &[Value::number(3.0)]).unwrap();
    let value = Value::object(ObjectRef::TypedArray(array));
    assert_eq!(property(&mut ctx, &value, "byteLength").unwrap(), Value::number(24.0));
    assert_eq!(get_element(&mut ctx, &value, 0).unwrap(), Value::number(0.0));
}

#[test]
fn test_typed_array_misaligned_offset_is_range_error() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 16);
    let err = new_typed_array(
        &mut ctx,
        TypedArrayKind::Uint16,
        &[Value::object(ObjectRef::ArrayBuffer(buffer)), Value::number(1.0)],
    )
    .unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
}

#[test]
fn test_typed_array_uneven_buffer_is_range_error() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 6);
    let err = new_typed_array(
        &mut ctx,
        TypedArrayKind::Float32,
        &[Value::object(ObjectRef::ArrayBuffer(buffer))],
    )
    .unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
}

#[test]
fn test_typed_array_length_overflow_is_range_error() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 16);
    let err = new_typed_array(
        &mut ctx,
        TypedArrayKind::Float64,
        &[
            Value::object(ObjectRef::ArrayBuffer(buffer)),
            Value::number(8.0),
            Value::number(9_007_199_254_740_991.0),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
    assert_eq!(ctx.heap().live_count_of::<JsTypedArray>(), 0);
}

#[test]
fn test_typed_array_on_detached_buffer() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    ctx.detach_array_buffer(buffer);
    let err = new_typed_array(
        &mut ctx,
        TypedArrayKind::Uint8,
        &[Value::object(ObjectRef::ArrayBuffer(buffer))],
    )
    .unwrap_err();
    assert!(matches!(err, VmError::DetachedBuffer(_)), "got {err:?}");
}

#[test]
fn test_typed_array_element_access_after_detach() {
    let mut ctx = context();
    let buffer = new_buffer(&mut ctx, 8);
    let array = new_typed_array(
        &mut ctx,
        TypedArrayKind::Uint8,
        &[Value::object(ObjectRef::ArrayBuffer(buffer))],
    )
    .unwrap();
    let value = Value::object(ObjectRef::TypedArray(array));
    ctx.detach_array_buffer(buffer);

    let err = get_element(&mut ctx, &value, 0).unwrap_err();
    assert!(matches!(err, VmError::DetachedBuffer(_)), "got {err:?}");
    let err = set_element(&mut ctx, &value, 0, &Value::number(1.0)).unwrap_err();
    assert!(matches!(err, VmError::DetachedBuffer(_)), "got {err:?}");
    assert_eq!(property(&mut ctx, &value, "length").unwrap(), Value::number(0.0));
    assert_eq!(ctx.heap().get(array).length(), 8);
}

#[test]
fn test_clamped_array_rounds() {
    let mut ctx = context();
    let array = new_typed_array(&mut ctx, TypedArrayKind::Uint8Clamped, &[Value::number(3.0)])
        .unwrap();
    let value = Value::object(ObjectRef::TypedArray(array));
    set_element(&mut ctx, &value, 0, &Value::number(300.0)).unwrap();
    set_element(&mut ctx, &value, 1, &Value::number(2.5)).unwrap();
    set_element(&mut ctx, &value, 2, &Value::number(-4.0)).unwrap();
    assert_eq!(get_element(&mut ctx, &value, 0).unwrap(), Value::number(255.0));
    assert_eq!(get_element(&mut ctx, &value, 1).unwrap(), Value::number(2.0));
    assert_eq!(get_element(&mut ctx, &value, 2).unwrap(), Value::number(0.0));
}

#[test]
fn test_typed_array_from_plain_object_is_type_error() {
    let mut ctx = context();
    let obj = ctx.create_plain_object().unwrap();
    let err = new_typed_array(
        &mut ctx,
        TypedArrayKind::Int8,
        &[Value::object(ObjectRef::Ordinary(obj))],
    )
    .unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
}

#[test]
fn test_typed_array_to_string_tag() {
    let mut ctx = context();
    let array = new_typed_array(&mut ctx, TypedArrayKind::BigUint64, &[Value::number(1.0)]).unwrap();
    let value = Value::object(ObjectRef::TypedArray(array));
    let rendered = invoke(&mut ctx, &value, "toString", &[]).unwrap();
    assert_eq!(rendered, Value::string("[object BigUint64Array]"));
}

//! Completion protocol, abstract operations and GC rooting through `VmContext`

use kestrel_gc::GcConfig;
use kestrel_vm_core::convert::{
    to_big_int, to_index, to_number, to_numeric, to_property_key, to_string,
};
use kestrel_vm_core::{
    ErrorKind, JsDataView, JsObject, Numeric, ObjectRef, PropertyKey, RuntimeConfig, Value,
    VmContext, VmError,
};
use num_bigint::BigInt;

fn context() -> VmContext {
    VmContext::new(RuntimeConfig::new()).expect("realm allocation")
}

fn object_with_method<F>(ctx: &mut VmContext, key: PropertyKey, f: F) -> Value
where
    F: Fn(&mut VmContext, &Value, &[Value]) -> kestrel_vm_core::VmResult<Value> + 'static,
{
    let func = ctx.create_native_function("method", f).unwrap();
    let obj = ctx.create_plain_object().unwrap();
    ctx.define_property(
        ObjectRef::Ordinary(obj),
        key,
        Value::object(ObjectRef::Function(func)),
    );
    Value::object(ObjectRef::Ordinary(obj))
}

// ============================================================================
// Object-to-primitive
// ============================================================================

#[test]
fn test_to_primitive_symbol_receives_hint() {
    let mut ctx = context();
    let key = PropertyKey::Symbol(ctx.realm().symbols.to_primitive);
    let obj = object_with_method(&mut ctx, key, |_ctx, _this, args| {
        Ok(match args.first() {
            Some(Value::String(hint)) if &**hint == "number" => Value::number(42.0),
            Some(Value::String(hint)) => Value::String(hint.clone()),
            _ => Value::undefined(),
        })
    });

    assert_eq!(to_number(&mut ctx, &obj).unwrap(), 42.0);
    assert_eq!(&*to_string(&mut ctx, &obj).unwrap(), "string");
}

#[test]
fn test_to_primitive_object_result_is_type_error() {
    let mut ctx = context();
    let key = PropertyKey::Symbol(ctx.realm().symbols.to_primitive);
    let obj = object_with_method(&mut ctx, key, |ctx, _this, _args| {
        Ok(Value::object(ObjectRef::Ordinary(ctx.create_plain_object()?)))
    });
    let err = to_number(&mut ctx, &obj).unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
}

#[test]
fn test_ordinary_to_primitive_order() {
    let mut ctx = context();
    let obj = object_with_method(&mut ctx, PropertyKey::string("toString"), |_ctx, _this, _args| {
        Ok(Value::string("7"))
    });
    let value_of = ctx
        .create_native_function("valueOf", |_ctx, _this, _args| Ok(Value::number(3.0)))
        .unwrap();
    ctx.define_property(
        obj.as_object().unwrap(),
        PropertyKey::string("valueOf"),
        Value::object(ObjectRef::Function(value_of)),
    );

    assert_eq!(to_number(&mut ctx, &obj).unwrap(), 3.0);
    assert_eq!(&*to_string(&mut ctx, &obj).unwrap(), "7");
}

#[test]
fn test_plain_object_to_string() {
    let mut ctx = context();
    let obj = Value::object(ObjectRef::Ordinary(ctx.create_plain_object().unwrap()));
    assert_eq!(&*to_string(&mut ctx, &obj).unwrap(), "[object Object]");
    assert!(to_number(&mut ctx, &obj).unwrap().is_nan());
}

#[test]
fn test_to_index_domain() {
    let mut ctx = context();
    assert_eq!(to_index(&mut ctx, &Value::undefined()).unwrap(), 0);
    assert_eq!(to_index(&mut ctx, &Value::number(-0.5)).unwrap(), 0);
    assert_eq!(to_index(&mut ctx, &Value::number(f64::NAN)).unwrap(), 0);
    assert_eq!(to_index(&mut ctx, &Value::string(" 12 ")).unwrap(), 12);
    assert_eq!(to_index(&mut ctx, &Value::number(7.9)).unwrap(), 7);

    for bad in [
        Value::number(-1.0),
        Value::number(9_007_199_254_740_992.0),
        Value::number(f64::INFINITY),
    ] {
        let err = to_index(&mut ctx, &bad).unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)), "got {err:?}");
    }
}

#[test]
fn test_to_big_int_conversions() {
    let mut ctx = context();
    assert_eq!(
        *to_big_int(&mut ctx, &Value::string("0x10")).unwrap(),
        BigInt::from(16)
    );
    assert_eq!(
        *to_big_int(&mut ctx, &Value::boolean(true)).unwrap(),
        BigInt::from(1)
    );
    let err = to_big_int(&mut ctx, &Value::string("1.5")).unwrap_err();
    assert!(matches!(err, VmError::SyntaxError(_)), "got {err:?}");
    let err = to_big_int(&mut ctx, &Value::number(1.0)).unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
}

// ============================================================================
// Completions
// ============================================================================

#[test]
fn test_catch_error_materializes_error_object() {
    let mut ctx = context();
    let caught = ctx
        .catch_error(VmError::type_error("bad receiver"))
        .unwrap();
    let error = caught.as_error().expect("error object");
    assert_eq!(ctx.heap().get(error).kind(), ErrorKind::TypeError);

    let to_string_fn = ctx.get(&caught, &PropertyKey::string("toString")).unwrap();
    let rendered = ctx.call(&to_string_fn, &caught, &[]).unwrap();
    assert_eq!(rendered, Value::string("TypeError: bad receiver"));
}

#[test]
fn test_catch_error_kinds() {
    let mut ctx = context();
    let detached = ctx
        .catch_error(VmError::detached_buffer("gone"))
        .unwrap()
        .as_error()
        .unwrap();
    assert_eq!(ctx.heap().get(detached).kind(), ErrorKind::TypeError);

    let overflow = ctx
        .catch_error(VmError::StackOverflow)
        .unwrap()
        .as_error()
        .unwrap();
    assert_eq!(ctx.heap().get(overflow).kind(), ErrorKind::RangeError);
}

#[test]
fn test_catch_error_returns_thrown_value() {
    let mut ctx = context();
    let thrown = Value::string("plain");
    let err = ctx.throw_value(thrown.clone());
    assert_eq!(ctx.catch_error(err).unwrap(), thrown);
}

#[test]
fn test_out_of_memory_is_not_catchable() {
    let config = RuntimeConfig::new().gc(GcConfig::default().heap_limit(512 * 1024));
    let mut ctx = VmContext::new(config).unwrap();
    let ctor = Value::object(ObjectRef::Function(ctx.intrinsics().array_buffer_constructor));

    let err = ctx
        .construct(&ctor, &[Value::number(1024.0 * 1024.0)], None)
        .unwrap_err();
    assert!(matches!(err, VmError::OutOfMemory(_)), "got {err:?}");
    assert!(!err.is_catchable());
    assert!(matches!(ctx.catch_error(err), Err(VmError::OutOfMemory(_))));
}

#[test]
fn test_runaway_reentrancy_is_stack_overflow() {
    let mut ctx = VmContext::new(RuntimeConfig::new().max_call_depth(32)).unwrap();
    let recurse = ctx
        .create_native_function("recurse", |ctx, this, _args| ctx.call(this, this, &[]))
        .unwrap();
    let recurse = Value::object(ObjectRef::Function(recurse));

    let err = ctx.call(&recurse, &recurse, &[]).unwrap_err();
    assert!(matches!(err, VmError::StackOverflow), "got {err:?}");
    assert_eq!(err.error_kind(), Some(ErrorKind::RangeError));
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn test_calling_non_callable_is_type_error() {
    let mut ctx = context();
    let err = ctx
        .call(&Value::number(1.0), &Value::undefined(), &[])
        .unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)), "got {err:?}");
}

// ============================================================================
// Rooting
// ============================================================================

#[test]
fn test_unrooted_objects_are_reclaimed() {
    let mut ctx = context();
    let kept = ctx.create_plain_object().unwrap();
    let dropped = ctx.create_plain_object().unwrap();
    let _root = ctx.root(kept);

    ctx.collect_garbage();

    assert!(ctx.heap().try_get(kept).is_some());
    assert!(ctx.heap().try_get(dropped).is_none());
}

#[test]
fn test_unreachable_cycle_is_reclaimed() {
    let mut ctx = context();
    ctx.collect_garbage();
    let a = ctx.create_plain_object().unwrap();
    let b = ctx.create_plain_object().unwrap();
    ctx.define_property(
        ObjectRef::Ordinary(a),
        PropertyKey::string("peer"),
        Value::object(ObjectRef::Ordinary(b)),
    );
    ctx.define_property(
        ObjectRef::Ordinary(b),
        PropertyKey::string("peer"),
        Value::object(ObjectRef::Ordinary(a)),
    );
    let before = ctx.heap().live_count_of::<JsObject>();

    ctx.collect_garbage();

    assert_eq!(ctx.heap().live_count_of::<JsObject>(), before - 2);
}

#[test]
fn test_arguments_survive_collection_during_call() {
    let mut ctx = context();
    let inspect = ctx
        .create_native_function("inspect", |ctx, _this, args| {
            ctx.collect_garbage();
            let alive = args
                .first()
                .and_then(Value::gc_id)
                .is_some_and(|id| ctx.heap().is_alive(id));
            Ok(Value::boolean(alive))
        })
        .unwrap();
    let arg = ctx.create_plain_object().unwrap();

    let result = ctx
        .call(
            &Value::object(ObjectRef::Function(inspect)),
            &Value::undefined(),
            &[Value::object(ObjectRef::Ordinary(arg))],
        )
        .unwrap();
    assert_eq!(result, Value::boolean(true));

    ctx.collect_garbage();
    assert!(!ctx.heap().is_alive(arg.id()));
}

#[test]
fn test_views_keep_buffer_alive_but_not_the_reverse() {
    let mut ctx = context();
    let ab_ctor = Value::object(ObjectRef::Function(ctx.intrinsics().array_buffer_constructor));
    let buffer = ctx
        .construct(&ab_ctor, &[Value::number(8.0)], None)
        .unwrap()
        .as_array_buffer()
        .unwrap();
    let dv_ctor = Value::object(ObjectRef::Function(ctx.intrinsics().data_view_constructor));
    let view = ctx
        .construct(&dv_ctor, &[Value::object(ObjectRef::ArrayBuffer(buffer))], None)
        .unwrap()
        .as_data_view()
        .unwrap();

    {
        let _view_root = ctx.root(view);
        ctx.collect_garbage();
        assert!(ctx.heap().try_get(buffer).is_some());
    }

    let _buffer_root = ctx.root(buffer);
    ctx.collect_garbage();
    let heap = ctx.heap();
    assert!(heap.try_get(view).is_none());
    assert_eq!(heap.live_count_of::<JsDataView>(), 0);
    assert_eq!(heap.get(buffer).live_view_count(heap), 0);
}

#[test]
fn test_construction_survives_implicit_collections() {
    let config = RuntimeConfig::new().gc(GcConfig::default().gc_threshold(1));
    let mut ctx = VmContext::new(config).unwrap();
    let ab_ctor = Value::object(ObjectRef::Function(ctx.intrinsics().array_buffer_constructor));
    let buffer = ctx
        .construct(&ab_ctor, &[Value::number(16.0)], None)
        .unwrap();
    let offset = object_with_method(&mut ctx, PropertyKey::string("valueOf"), |ctx, _this, _args| {
        ctx.create_plain_object()?;
        Ok(Value::number(4.0))
    });
    let collections_before = ctx.gc_stats().collections;

    let dv_ctor = Value::object(ObjectRef::Function(ctx.intrinsics().data_view_constructor));
    let view = ctx
        .construct(&dv_ctor, &[buffer.clone(), offset], None)
        .unwrap()
        .as_data_view()
        .unwrap();

    assert!(ctx.gc_stats().collections > collections_before);
    let heap = ctx.heap();
    assert_eq!(heap.get(view).byte_offset(), 4);
    assert_eq!(heap.get(view).byte_length(), 12);
    assert_eq!(Some(heap.get(view).buffer()), buffer.as_array_buffer());
}

#[test]
fn test_captured_values_live_as_long_as_the_function() {
    let mut ctx = context();
    let target = ctx.create_plain_object().unwrap();
    ctx.define_property(
        ObjectRef::Ordinary(target),
        PropertyKey::string("n"),
        Value::number(5.0),
    );
    let held = Value::object(ObjectRef::Ordinary(target));
    let func = ctx
        .create_native_function_capturing("read", vec![held.clone()], move |ctx, _this, _args| {
            ctx.get(&held, &PropertyKey::string("n"))
        })
        .unwrap();
    let func_root = ctx.root(func);

    ctx.collect_garbage();
    assert!(ctx.heap().try_get(target).is_some());
    let callee = Value::object(ObjectRef::Function(func));
    assert_eq!(
        ctx.call(&callee, &Value::undefined(), &[]).unwrap(),
        Value::number(5.0)
    );

    drop(func_root);
    ctx.collect_garbage();
    assert!(ctx.heap().try_get(func).is_none());
    assert!(ctx.heap().try_get(target).is_none());
}

#[test]
fn test_registered_symbols_survive_collection() {
    let mut ctx = context();
    let sym = ctx.symbol_for("app.key").unwrap();
    ctx.collect_garbage();
    assert!(ctx.heap().is_alive(sym.id()));
    assert_eq!(ctx.symbol_for("app.key").unwrap(), sym);
    assert!(ctx.heap().get(sym).is_global());
}

// ============================================================================
// Objects and keys
// ============================================================================

#[test]
fn test_symbol_keys_and_property_key_conversion() {
    let mut ctx = context();
    let sym = ctx.create_symbol(Some("tag")).unwrap();
    let obj = Value::object(ObjectRef::Ordinary(ctx.create_plain_object().unwrap()));

    let key = to_property_key(&mut ctx, &Value::Symbol(sym)).unwrap();
    ctx.set(&obj, key.clone(), Value::number(1.0)).unwrap();
    assert_eq!(ctx.get(&obj, &key).unwrap(), Value::number(1.0));

    let key = to_property_key(&mut ctx, &Value::number(2.0)).unwrap();
    assert_eq!(key, PropertyKey::string("2"));
    assert!(ctx.get(&obj, &key).unwrap().is_undefined());
    assert_eq!(ctx.heap().get(sym).descriptive_string(), "Symbol(tag)");
}

#[test]
fn test_inherited_setter_runs_on_receiver() {
    let mut ctx = context();
    let proto = ctx.create_plain_object().unwrap();
    let setter = ctx
        .create_native_function("set value", |ctx, this, args| {
            let doubled = to_number(ctx, &args[0])? * 2.0;
            let target = this.as_object().expect("object receiver");
            ctx.define_property(target, PropertyKey::string("stored"), Value::number(doubled));
            Ok(Value::undefined())
        })
        .unwrap();
    ctx.define_accessor(
        ObjectRef::Ordinary(proto),
        PropertyKey::string("value"),
        None,
        Some(setter),
    );
    let child = ctx.create_plain_object().unwrap();
    ctx.heap()
        .get(child)
        .set_prototype(Some(ObjectRef::Ordinary(proto)));
    let child = Value::object(ObjectRef::Ordinary(child));

    ctx.set(&child, PropertyKey::string("value"), Value::number(4.0))
        .unwrap();
    assert_eq!(
        ctx.get(&child, &PropertyKey::string("stored")).unwrap(),
        Value::number(8.0)
    );
    assert!(ctx.get(&child, &PropertyKey::string("value")).unwrap().is_undefined());
}

#[test]
fn test_type_of() {
    let mut ctx = context();
    let ctor = Value::object(ObjectRef::Function(ctx.intrinsics().data_view_constructor));
    let obj = Value::object(ObjectRef::Ordinary(ctx.create_plain_object().unwrap()));
    let sym = Value::Symbol(ctx.create_symbol(None).unwrap());

    assert_eq!(Value::undefined().type_of(), "undefined");
    assert_eq!(Value::Null.type_of(), "object");
    assert_eq!(Value::bigint(BigInt::from(1)).type_of(), "bigint");
    assert_eq!(ctor.type_of(), "function");
    assert_eq!(obj.type_of(), "object");
    assert_eq!(sym.type_of(), "symbol");
}

#[test]
fn test_to_numeric_keeps_big_ints() {
    let mut ctx = context();
    assert_eq!(
        to_numeric(&mut ctx, &Value::bigint(BigInt::from(7))).unwrap(),
        Numeric::BigInt(std::rc::Rc::new(BigInt::from(7)))
    );
    assert_eq!(
        to_numeric(&mut ctx, &Value::string(" 0x10 ")).unwrap(),
        Numeric::Number(16.0)
    );
    assert_eq!(
        to_numeric(&mut ctx, &Value::boolean(true)).unwrap(),
        Numeric::Number(1.0)
    );
}

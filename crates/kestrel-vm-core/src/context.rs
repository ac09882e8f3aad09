//! VM execution context
//!
//! The context owns the heap, the realm and the value stack. Every native
//! call pushes its callee, receiver and arguments onto the value stack, which
//! is part of the root set, so values handed to a native function stay alive
//! for the duration of the call. Anything else a native function holds across
//! a call back into user code must be rooted explicitly.
//!
//! Collection only happens at safepoints, which sit at call entry. Plain
//! allocation never collects.

use kestrel_gc::{Erased, Gc, GcStats, GcTraceable, Heap, Root};
use rustc_hash::FxHashMap;

use crate::array_buffer::JsArrayBuffer;
use crate::config::RuntimeConfig;
use crate::convert::display_without_side_effects;
use crate::error::{Completion, ErrorKind, VmError, VmResult};
use crate::function::{JsFunction, NativeConstructor, NativeFn};
use crate::intrinsics::Intrinsics;
use crate::intrinsics_impl::error::create_error;
use crate::object::{JsObject, Property, PropertyKey};
use crate::realm::{Realm, RealmId};
use crate::symbol::JsSymbol;
use crate::value::{JsString, ObjectRef, Value};

/// VM execution context
pub struct VmContext {
    heap: Heap,
    realm: Realm,
    /// Rooted values of the active native frames
    stack: Vec<Value>,
    /// Current native call depth
    depth: usize,
    config: RuntimeConfig,
    /// `Symbol.for` registry
    symbol_registry: FxHashMap<JsString, Gc<JsSymbol>>,
}

impl VmContext {
    /// Create a context with a fresh heap and realm.
    pub fn new(config: RuntimeConfig) -> VmResult<Self> {
        let mut heap = Heap::with_config(config.gc.clone());
        let realm = Realm::new(&mut heap, RealmId(0))?;
        tracing::debug!(
            target: "kestrel::vm",
            objects = heap.live_objects(),
            bytes = heap.total_bytes(),
            "realm initialized"
        );
        Ok(Self {
            heap,
            realm,
            stack: Vec::new(),
            depth: 0,
            config,
            symbol_registry: FxHashMap::default(),
        })
    }

    /// Get the heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Get the heap mutably
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Get the realm
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Get the intrinsics
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.realm.intrinsics
    }

    /// Get the configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current native call depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    // ========================================================================
    // Allocation and rooting
    // ========================================================================

    /// Allocate on the heap. Never collects.
    pub fn alloc<T: GcTraceable + 'static>(&mut self, value: T) -> VmResult<Gc<T>> {
        Ok(self.heap.allocate(value)?)
    }

    /// Root a handle for the lifetime of the guard.
    pub fn root<T>(&self, gc: Gc<T>) -> Root<T> {
        self.heap.root(gc)
    }

    /// Root the heap referent of a value, if it has one.
    pub fn root_value(&self, value: &Value) -> Option<Root<Erased>> {
        value.gc_id().map(|id| self.heap.root_id(id))
    }

    /// Create an object with the given prototype
    pub fn create_object(&mut self, prototype: Option<ObjectRef>) -> VmResult<Gc<JsObject>> {
        self.alloc(JsObject::new(prototype))
    }

    /// Create an object inheriting from `Object.prototype`
    pub fn create_plain_object(&mut self) -> VmResult<Gc<JsObject>> {
        let proto = self.intrinsics().object_prototype;
        self.create_object(Some(ObjectRef::Ordinary(proto)))
    }

    fn create_function(
        &mut self,
        name: &str,
        call: Option<NativeFn>,
        construct: Option<NativeConstructor>,
        captures: Vec<Value>,
    ) -> VmResult<Gc<JsFunction>> {
        let proto = self.intrinsics().function_prototype;
        let object = self.create_object(Some(ObjectRef::Ordinary(proto)))?;
        self.alloc(JsFunction::new(object, name, call, construct).with_captures(captures))
    }

    /// Create a callable native function.
    ///
    /// The collector cannot see into `f`. A closure that holds heap values
    /// must use [`create_native_function_capturing`](Self::create_native_function_capturing)
    /// or keep them rooted for as long as the function can be called.
    pub fn create_native_function<F>(&mut self, name: &str, f: F) -> VmResult<Gc<JsFunction>>
    where
        F: Fn(&mut VmContext, &Value, &[Value]) -> VmResult<Value> + 'static,
    {
        self.create_function(name, Some(std::rc::Rc::new(f)), None, Vec::new())
    }

    /// Create a callable native function whose closure holds `captures`.
    /// They stay alive as long as the function does.
    pub fn create_native_function_capturing<F>(
        &mut self,
        name: &str,
        captures: Vec<Value>,
        f: F,
    ) -> VmResult<Gc<JsFunction>>
    where
        F: Fn(&mut VmContext, &Value, &[Value]) -> VmResult<Value> + 'static,
    {
        self.create_function(name, Some(std::rc::Rc::new(f)), None, captures)
    }

    /// Create a constructor with a fresh `prototype` object.
    ///
    /// Calling the returned function without `new` is a TypeError.
    pub fn create_constructor<F>(&mut self, name: &str, construct: F) -> VmResult<Gc<JsFunction>>
    where
        F: Fn(&mut VmContext, &[Value], Gc<JsFunction>) -> VmResult<Value> + 'static,
    {
        let owned = name.to_string();
        let call: NativeFn = std::rc::Rc::new(
            move |_ctx: &mut VmContext, _this: &Value, _args: &[Value]| -> VmResult<Value> {
                Err(VmError::type_error(format!(
                    "Class constructor {owned} cannot be invoked without 'new'"
                )))
            },
        );
        let construct: NativeConstructor = std::rc::Rc::new(construct);
        let ctor = self.create_function(name, Some(call), Some(construct), Vec::new())?;
        let prototype = self.create_plain_object()?;
        let ctor_object = self.heap.get(ctor).object;
        self.heap.get(ctor_object).set_own(
            PropertyKey::string("prototype"),
            Value::object(ObjectRef::Ordinary(prototype)),
        );
        self.heap.get(prototype).set_own(
            PropertyKey::string("constructor"),
            Value::object(ObjectRef::Function(ctor)),
        );
        Ok(ctor)
    }

    /// Create a new unique symbol
    pub fn create_symbol(&mut self, description: Option<&str>) -> VmResult<Gc<JsSymbol>> {
        self.alloc(JsSymbol::new(description.map(Into::into), false))
    }

    /// `Symbol.for(key)`: the registry symbol for `key`, created on first use.
    pub fn symbol_for(&mut self, key: &str) -> VmResult<Gc<JsSymbol>> {
        if let Some(sym) = self.symbol_registry.get(key) {
            return Ok(*sym);
        }
        let key: JsString = key.into();
        let sym = self.alloc(JsSymbol::new(Some(key.clone()), true))?;
        self.symbol_registry.insert(key, sym);
        Ok(sym)
    }

    // ========================================================================
    // Property access
    // ========================================================================

    /// `[[Get]]` with prototype walk. Calls getters, so it may run user code.
    pub fn get(&mut self, target: &Value, key: &PropertyKey) -> Completion<Value> {
        let obj = match target {
            Value::Object(obj) => *obj,
            Value::Undefined | Value::Null => {
                return Err(VmError::type_error(format!(
                    "Cannot read properties of {}",
                    display_without_side_effects(self, target)
                )));
            }
            // Primitive wrapper objects are not modeled.
            _ => return Ok(Value::Undefined),
        };

        let mut current = Some(obj);
        while let Some(o) = current {
            let base = o.base(&self.heap);
            let object = self.heap.get(base);
            match object.get_own(key) {
                Some(Property::Data(value)) => return Ok(value),
                Some(Property::Accessor {
                    get: Some(getter), ..
                }) => {
                    let getter = Value::object(ObjectRef::Function(getter));
                    return self.call(&getter, target, &[]);
                }
                Some(Property::Accessor { get: None, .. }) => return Ok(Value::Undefined),
                None => current = object.prototype(),
            }
        }
        Ok(Value::Undefined)
    }

    /// `[[Set]]`: runs an inherited setter if there is one, otherwise
    /// defines an own data property.
    pub fn set(&mut self, target: &Value, key: PropertyKey, value: Value) -> Completion<()> {
        let Some(obj) = target.as_object() else {
            return Err(VmError::type_error(format!(
                "Cannot set properties of {}",
                display_without_side_effects(self, target)
            )));
        };

        let mut current = Some(obj);
        while let Some(o) = current {
            let base = o.base(&self.heap);
            let object = self.heap.get(base);
            match object.get_own(&key) {
                Some(Property::Accessor {
                    set: Some(setter), ..
                }) => {
                    let setter = Value::object(ObjectRef::Function(setter));
                    self.call(&setter, target, &[value])?;
                    return Ok(());
                }
                Some(Property::Accessor { set: None, .. }) => {
                    return Err(VmError::type_error(
                        "Cannot set property which has only a getter",
                    ));
                }
                Some(Property::Data(_)) => break,
                None => current = object.prototype(),
            }
        }

        let base = obj.base(&self.heap);
        self.heap.get(base).set_own(key, value);
        Ok(())
    }

    /// Define an own data property. Never runs user code.
    pub fn define_property(&mut self, target: ObjectRef, key: PropertyKey, value: Value) {
        let base = target.base(&self.heap);
        self.heap.get(base).set_own(key, value);
    }

    /// Define an own accessor property. Never runs user code.
    pub fn define_accessor(
        &mut self,
        target: ObjectRef,
        key: PropertyKey,
        get: Option<Gc<JsFunction>>,
        set: Option<Gc<JsFunction>>,
    ) {
        let base = target.base(&self.heap);
        self.heap
            .get(base)
            .define(key, Property::Accessor { get, set });
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// IsCallable
    pub fn is_callable(&self, value: &Value) -> bool {
        value
            .as_function()
            .is_some_and(|f| self.heap.get(f).is_callable())
    }

    /// IsConstructor
    pub fn is_constructor(&self, value: &Value) -> bool {
        value
            .as_function()
            .is_some_and(|f| self.heap.get(f).is_constructor())
    }

    fn enter_frame(&mut self, callee: &Value, this: &Value, args: &[Value]) -> VmResult<usize> {
        if self.depth >= self.config.max_call_depth {
            tracing::debug!(
                target: "kestrel::vm",
                depth = self.depth,
                "maximum call depth exceeded"
            );
            return Err(VmError::StackOverflow);
        }
        self.depth += 1;
        let base = self.stack.len();
        self.stack.push(callee.clone());
        self.stack.push(this.clone());
        self.stack.extend_from_slice(args);
        Ok(base)
    }

    fn leave_frame(&mut self, base: usize) {
        self.stack.truncate(base);
        self.depth -= 1;
    }

    /// Call a function. A reentrancy boundary and a safepoint.
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> Completion<Value> {
        let behavior = callee
            .as_function()
            .and_then(|f| self.heap.get(f).call_behavior());
        let Some(behavior) = behavior else {
            return Err(VmError::type_error(format!(
                "{} is not a function",
                display_without_side_effects(self, callee)
            )));
        };

        let base = self.enter_frame(callee, this, args)?;
        self.safepoint();
        let result = behavior(self, this, args);
        self.leave_frame(base);
        result
    }

    /// Construct with `new`. `new_target` defaults to the constructor itself.
    pub fn construct(
        &mut self,
        ctor: &Value,
        args: &[Value],
        new_target: Option<Gc<JsFunction>>,
    ) -> Completion<Value> {
        let target = ctor
            .as_function()
            .and_then(|f| Some((f, self.heap.get(f).construct_behavior()?)));
        let Some((func, behavior)) = target else {
            return Err(VmError::type_error(format!(
                "{} is not a constructor",
                display_without_side_effects(self, ctor)
            )));
        };
        let new_target = new_target.unwrap_or(func);

        // The new target rides in the receiver slot so it stays rooted.
        let receiver = Value::object(ObjectRef::Function(new_target));
        let base = self.enter_frame(ctor, &receiver, args)?;
        self.safepoint();
        let result = behavior(self, args, new_target);
        self.leave_frame(base);
        result
    }

    /// GetPrototypeFromConstructor.
    ///
    /// Reads `new_target.prototype`, which may run a user getter. Falls back
    /// to the realm intrinsic chosen by `default` when it is not an object.
    pub fn get_prototype_from_constructor<F>(
        &mut self,
        new_target: Gc<JsFunction>,
        default: F,
    ) -> Completion<ObjectRef>
    where
        F: FnOnce(&Intrinsics) -> Gc<JsObject>,
    {
        let target = Value::object(ObjectRef::Function(new_target));
        let proto = self.get(&target, &PropertyKey::string("prototype"))?;
        Ok(match proto {
            Value::Object(obj) => obj,
            _ => ObjectRef::Ordinary(default(self.intrinsics())),
        })
    }

    /// OrdinaryCreateFromConstructor: resolve the prototype (may run user
    /// code), then allocate the base object.
    pub fn ordinary_create_from_constructor<F>(
        &mut self,
        new_target: Gc<JsFunction>,
        default: F,
    ) -> Completion<Gc<JsObject>>
    where
        F: FnOnce(&Intrinsics) -> Gc<JsObject>,
    {
        let proto = self.get_prototype_from_constructor(new_target, default)?;
        self.create_object(Some(proto))
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Throw an arbitrary value
    pub fn throw_value(&self, value: Value) -> VmError {
        let message = display_without_side_effects(self, &value);
        VmError::exception(value, message)
    }

    /// Intercept an abrupt completion as a script-level catch would.
    ///
    /// Engine errors become error objects; thrown values come back as they
    /// were thrown. Fatal host failures are not catchable and pass through.
    pub fn catch_error(&mut self, err: VmError) -> VmResult<Value> {
        if !err.is_catchable() {
            return Err(err);
        }
        if let VmError::Exception(thrown) = err {
            return Ok(thrown.value);
        }
        let kind = err.error_kind().unwrap_or(ErrorKind::Error);
        let error = create_error(self, kind, &err.message())?;
        Ok(Value::object(ObjectRef::Error(error)))
    }

    // ========================================================================
    // GC
    // ========================================================================

    /// Collect from the realm, the value stack and the symbol registry.
    pub fn collect_garbage(&mut self) -> usize {
        let mut roots = self.realm.roots();
        roots.extend(self.stack.iter().filter_map(Value::gc_id));
        roots.extend(self.symbol_registry.values().map(|sym| sym.id()));
        let reclaimed = self.heap.collect(&roots);
        tracing::debug!(
            target: "kestrel::vm",
            reclaimed,
            live_objects = self.heap.live_objects(),
            "garbage collected"
        );
        reclaimed
    }

    /// Collect if the allocation threshold has been crossed.
    pub fn safepoint(&mut self) -> bool {
        if !self.heap.should_collect() {
            return false;
        }
        tracing::trace!(
            target: "kestrel::vm",
            depth = self.depth,
            "implicit collection at safepoint"
        );
        self.collect_garbage();
        true
    }

    /// GC statistics
    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// DetachArrayBuffer. Idempotent; returns whether this call detached it.
    pub fn detach_array_buffer(&mut self, buffer: Gc<JsArrayBuffer>) -> bool {
        self.take_array_buffer_data(buffer).is_some()
    }

    /// Detach `buffer` and hand its bytes to the caller. `None` if it was
    /// already detached.
    pub fn take_array_buffer_data(&mut self, buffer: Gc<JsArrayBuffer>) -> Option<Vec<u8>> {
        let data = self.heap.get(buffer).take_data();
        // Shrinking the charge cannot fail.
        let _ = self.heap.set_extra_bytes(buffer.id(), 0);
        tracing::trace!(
            target: "kestrel::vm",
            buffer = ?buffer.id(),
            first = data.is_some(),
            "array buffer detached"
        );
        data
    }

    /// Resize a resizable buffer in place, charging the heap for the new
    /// length. Growth past the heap limit is a fatal `OutOfMemory` and leaves
    /// the buffer unchanged.
    pub fn resize_array_buffer(
        &mut self,
        buffer: Gc<JsArrayBuffer>,
        new_length: usize,
    ) -> VmResult<()> {
        let old_length = self.heap.get(buffer).byte_length();
        self.heap.get(buffer).validate_resize(new_length)?;
        self.heap.set_extra_bytes(buffer.id(), new_length)?;
        if let Err(err) = self.heap.get(buffer).resize(new_length) {
            let _ = self.heap.set_extra_bytes(buffer.id(), old_length);
            return Err(err);
        }
        Ok(())
    }
}

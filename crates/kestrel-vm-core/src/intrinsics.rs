//! Intrinsics registry for the built-in objects this core exposes.
//!
//! Initialization follows a two-stage pattern:
//! 1. **Stage 1**: allocate the core prototypes so everything else has a
//!    `[[Prototype]]` to point at
//! 2. **Stage 2**: build constructors and install prototype methods through
//!    `BuiltinBuilder`
//!
//! Nothing here runs user code, so the heap is never collected while a realm
//! is half-built.

use std::rc::Rc;

use kestrel_gc::{AllocError, Gc, GcId, Heap};

use crate::context::VmContext;
use crate::error::{ErrorKind, VmError, VmResult};
use crate::function::{JsFunction, NativeConstructor, NativeFn};
use crate::intrinsics_impl::{array_buffer, data_view, error, object, typed_array};
use crate::object::{JsObject, Property, PropertyKey};
use crate::realm::WellKnownSymbols;
use crate::typed_array::TypedArrayKind;
use crate::value::{ObjectRef, Value};

/// Signature of a built-in method
type BuiltinFn = fn(&mut VmContext, &Value, &[Value]) -> VmResult<Value>;

/// Signature of a built-in constructor body
type BuiltinCtor = fn(&mut VmContext, &[Value], Gc<JsFunction>) -> VmResult<Value>;

/// Registry of intrinsic objects.
#[derive(Debug, Clone)]
pub struct Intrinsics {
    // ========================================================================
    // Core prototypes
    // ========================================================================
    /// `Object.prototype`, whose `[[Prototype]]` is `null`
    pub object_prototype: Gc<JsObject>,
    /// `Function.prototype`, inheriting from `Object.prototype`
    pub function_prototype: Gc<JsObject>,

    // ========================================================================
    // Binary data
    // ========================================================================
    /// `ArrayBuffer.prototype`
    pub array_buffer_prototype: Gc<JsObject>,
    /// `ArrayBuffer`
    pub array_buffer_constructor: Gc<JsFunction>,
    /// `DataView.prototype`
    pub data_view_prototype: Gc<JsObject>,
    /// `DataView`
    pub data_view_constructor: Gc<JsFunction>,
    /// `%TypedArray%.prototype`
    pub typed_array_prototype: Gc<JsObject>,
    /// Per-kind prototypes, indexed by `TypedArrayKind as usize`
    typed_array_prototypes: Vec<Gc<JsObject>>,
    /// Per-kind constructors, indexed by `TypedArrayKind as usize`
    typed_array_constructors: Vec<Gc<JsFunction>>,

    // ========================================================================
    // Errors
    // ========================================================================
    /// `Error.prototype`
    pub error_prototype: Gc<JsObject>,
    /// `TypeError.prototype`
    pub type_error_prototype: Gc<JsObject>,
    /// `RangeError.prototype`
    pub range_error_prototype: Gc<JsObject>,
    /// `SyntaxError.prototype`
    pub syntax_error_prototype: Gc<JsObject>,
}

/// Allocates built-in functions and wires them onto their home objects.
struct BuiltinBuilder<'a> {
    heap: &'a mut Heap,
    function_prototype: Gc<JsObject>,
    to_string_tag: Gc<crate::symbol::JsSymbol>,
}

impl BuiltinBuilder<'_> {
    fn object(&mut self, prototype: Gc<JsObject>) -> Result<Gc<JsObject>, AllocError> {
        self.heap
            .allocate(JsObject::new(Some(ObjectRef::Ordinary(prototype))))
    }

    fn function(
        &mut self,
        name: &str,
        call: Option<NativeFn>,
        construct: Option<NativeConstructor>,
    ) -> Result<Gc<JsFunction>, AllocError> {
        let object = self.object(self.function_prototype)?;
        self.heap
            .allocate(JsFunction::new(object, name, call, construct))
    }

    fn method(&mut self, target: Gc<JsObject>, name: &str, f: NativeFn) -> Result<(), AllocError> {
        let func = self.function(name, Some(f), None)?;
        self.heap.get(target).set_own(
            PropertyKey::string(name),
            Value::object(ObjectRef::Function(func)),
        );
        Ok(())
    }

    fn getter(&mut self, target: Gc<JsObject>, name: &str, f: BuiltinFn) -> Result<(), AllocError> {
        let func = self.function(&format!("get {name}"), Some(Rc::new(f)), None)?;
        self.heap.get(target).define(
            PropertyKey::string(name),
            Property::Accessor {
                get: Some(func),
                set: None,
            },
        );
        Ok(())
    }

    fn to_string_tag(&mut self, target: Gc<JsObject>, tag: &str) {
        self.heap
            .get(target)
            .set_own(PropertyKey::Symbol(self.to_string_tag), Value::string(tag));
    }

    /// A constructor that throws when called without `new`.
    fn constructor(
        &mut self,
        name: &str,
        prototype: Gc<JsObject>,
        construct: NativeConstructor,
    ) -> Result<Gc<JsFunction>, AllocError> {
        let owned = name.to_string();
        let call: NativeFn = Rc::new(
            move |_ctx: &mut VmContext, _this: &Value, _args: &[Value]| -> VmResult<Value> {
                Err(VmError::type_error(format!(
                    "Constructor {owned} requires 'new'"
                )))
            },
        );
        let ctor = self.function(name, Some(call), Some(construct))?;
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
}

fn native(f: BuiltinFn) -> NativeFn {
    Rc::new(f)
}

fn native_ctor(f: BuiltinCtor) -> NativeConstructor {
    Rc::new(f)
}

impl Intrinsics {
    /// Allocate and initialize every intrinsic.
    pub fn allocate(heap: &mut Heap, symbols: &WellKnownSymbols) -> Result<Self, AllocError> {
        // Stage 1: core prototypes
        let object_prototype = heap.allocate(JsObject::new(None))?;
        let function_prototype =
            heap.allocate(JsObject::new(Some(ObjectRef::Ordinary(object_prototype))))?;

        let mut b = BuiltinBuilder {
            heap,
            function_prototype,
            to_string_tag: symbols.to_string_tag,
        };

        // Stage 2: Object.prototype
        b.method(object_prototype, "toString", native(object::object_to_string))?;
        b.method(object_prototype, "valueOf", native(object::object_value_of))?;

        // ArrayBuffer
        let array_buffer_prototype = b.object(object_prototype)?;
        let array_buffer_constructor = b.constructor(
            "ArrayBuffer",
            array_buffer_prototype,
            native_ctor(array_buffer::array_buffer_constructor),
        )?;
        let ab_ctor_object = b.heap.get(array_buffer_constructor).object;
        b.method(ab_ctor_object, "isView", native(array_buffer::is_view))?;
        b.getter(array_buffer_prototype, "byteLength", array_buffer::get_byte_length)?;
        b.getter(
            array_buffer_prototype,
            "maxByteLength",
            array_buffer::get_max_byte_length,
        )?;
        b.getter(array_buffer_prototype, "resizable", array_buffer::get_resizable)?;
        b.getter(array_buffer_prototype, "detached", array_buffer::get_detached)?;
        b.method(array_buffer_prototype, "slice", native(array_buffer::slice))?;
        b.method(array_buffer_prototype, "resize", native(array_buffer::resize))?;
        b.method(array_buffer_prototype, "transfer", native(array_buffer::transfer))?;
        b.method(
            array_buffer_prototype,
            "transferToFixedLength",
            native(array_buffer::transfer_to_fixed_length),
        )?;
        b.to_string_tag(array_buffer_prototype, "ArrayBuffer");

        // DataView
        let data_view_prototype = b.object(object_prototype)?;
        let data_view_constructor = b.constructor(
            "DataView",
            data_view_prototype,
            native_ctor(data_view::data_view_constructor),
        )?;
        b.getter(data_view_prototype, "buffer", data_view::get_buffer)?;
        b.getter(data_view_prototype, "byteLength", data_view::get_byte_length)?;
        b.getter(data_view_prototype, "byteOffset", data_view::get_byte_offset)?;
        for kind in TypedArrayKind::ALL {
            if kind == TypedArrayKind::Uint8Clamped {
                continue;
            }
            let get: NativeFn = Rc::new(move |ctx: &mut VmContext, this: &Value, args: &[Value]| {
                data_view::get_view_value(ctx, this, arg(args, 0), arg(args, 1), kind)
            });
            let set: NativeFn = Rc::new(move |ctx: &mut VmContext, this: &Value, args: &[Value]| {
                data_view::set_view_value(ctx, this, arg(args, 0), arg(args, 1), arg(args, 2), kind)
                    .map(|()| Value::undefined())
            });
            b.method(
                data_view_prototype,
                &format!("get{}", kind.view_type_name()),
                get,
            )?;
            b.method(
                data_view_prototype,
                &format!("set{}", kind.view_type_name()),
                set,
            )?;
        }
        b.to_string_tag(data_view_prototype, "DataView");

        // %TypedArray% and the concrete kinds
        let typed_array_prototype = b.object(object_prototype)?;
        b.getter(typed_array_prototype, "buffer", typed_array::get_buffer)?;
        b.getter(typed_array_prototype, "byteLength", typed_array::get_byte_length)?;
        b.getter(typed_array_prototype, "byteOffset", typed_array::get_byte_offset)?;
        b.getter(typed_array_prototype, "length", typed_array::get_length)?;

        let mut typed_array_prototypes = Vec::with_capacity(TypedArrayKind::ALL.len());
        let mut typed_array_constructors = Vec::with_capacity(TypedArrayKind::ALL.len());
        for kind in TypedArrayKind::ALL {
            let prototype = b.object(typed_array_prototype)?;
            let construct: NativeConstructor = Rc::new(
                move |ctx: &mut VmContext, args: &[Value], new_target: Gc<JsFunction>| {
                    typed_array::typed_array_constructor(ctx, args, new_target, kind)
                },
            );
            let ctor = b.constructor(kind.name(), prototype, construct)?;
            let bytes = Value::number(kind.element_size() as f64);
            let ctor_object = b.heap.get(ctor).object;
            b.heap
                .get(ctor_object)
                .set_own(PropertyKey::string("BYTES_PER_ELEMENT"), bytes.clone());
            b.heap
                .get(prototype)
                .set_own(PropertyKey::string("BYTES_PER_ELEMENT"), bytes);
            b.to_string_tag(prototype, kind.name());
            typed_array_prototypes.push(prototype);
            typed_array_constructors.push(ctor);
        }

        // Errors
        let error_prototype = b.object(object_prototype)?;
        b.method(error_prototype, "toString", native(error::error_to_string))?;
        let type_error_prototype = b.object(error_prototype)?;
        let range_error_prototype = b.object(error_prototype)?;
        let syntax_error_prototype = b.object(error_prototype)?;
        for (proto, kind) in [
            (error_prototype, ErrorKind::Error),
            (type_error_prototype, ErrorKind::TypeError),
            (range_error_prototype, ErrorKind::RangeError),
            (syntax_error_prototype, ErrorKind::SyntaxError),
        ] {
            let obj = b.heap.get(proto);
            obj.set_own(PropertyKey::string("name"), Value::string(kind.name()));
            obj.set_own(PropertyKey::string("message"), Value::string(""));
        }

        Ok(Self {
            object_prototype,
            function_prototype,
            array_buffer_prototype,
            array_buffer_constructor,
            data_view_prototype,
            data_view_constructor,
            typed_array_prototype,
            typed_array_prototypes,
            typed_array_constructors,
            error_prototype,
            type_error_prototype,
            range_error_prototype,
            syntax_error_prototype,
        })
    }

    /// Prototype of the concrete typed array kind
    pub fn typed_array_prototype_for(&self, kind: TypedArrayKind) -> Gc<JsObject> {
        self.typed_array_prototypes[kind as usize]
    }

    /// Constructor of the concrete typed array kind
    pub fn typed_array_constructor_for(&self, kind: TypedArrayKind) -> Gc<JsFunction> {
        self.typed_array_constructors[kind as usize]
    }

    /// Prototype for error objects of `kind`
    pub fn error_prototype_for(&self, kind: ErrorKind) -> Gc<JsObject> {
        match kind {
            ErrorKind::Error => self.error_prototype,
            ErrorKind::TypeError => self.type_error_prototype,
            ErrorKind::RangeError => self.range_error_prototype,
            ErrorKind::SyntaxError => self.syntax_error_prototype,
        }
    }

    /// Identities of every intrinsic, for the root set
    pub fn roots(&self) -> Vec<GcId> {
        let mut roots = vec![
            self.object_prototype.id(),
            self.function_prototype.id(),
            self.array_buffer_prototype.id(),
            self.array_buffer_constructor.id(),
            self.data_view_prototype.id(),
            self.data_view_constructor.id(),
            self.typed_array_prototype.id(),
            self.error_prototype.id(),
            self.type_error_prototype.id(),
            self.range_error_prototype.id(),
            self.syntax_error_prototype.id(),
        ];
        roots.extend(self.typed_array_prototypes.iter().map(|p| p.id()));
        roots.extend(self.typed_array_constructors.iter().map(|c| c.id()));
        roots
    }
}

/// Argument `index`, or `undefined` when absent.
pub fn arg(args: &[Value], index: usize) -> &Value {
    const UNDEFINED: &Value = &Value::Undefined;
    args.get(index).unwrap_or(UNDEFINED)
}

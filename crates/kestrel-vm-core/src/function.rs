//! Native function objects
//!
//! Functions are Rust closures over the execution context. Calling one is a
//! reentrancy boundary: the closure receives `&mut VmContext` and may run
//! arbitrary further algorithms, including ones that detach buffers or
//! trigger collection.

use std::fmt;
use std::rc::Rc;

use kestrel_gc::{Gc, GcId, GcTraceable};

use crate::context::VmContext;
use crate::error::VmResult;
use crate::object::JsObject;
use crate::value::{JsString, Value};

/// `[[Call]]` behavior: `(ctx, this, args)`
pub type NativeFn = Rc<dyn Fn(&mut VmContext, &Value, &[Value]) -> VmResult<Value>>;

/// `[[Construct]]` behavior: `(ctx, args, new_target)`
pub type NativeConstructor = Rc<dyn Fn(&mut VmContext, &[Value], Gc<JsFunction>) -> VmResult<Value>>;

/// A native function object
pub struct JsFunction {
    /// Base object (prototype chain, `prototype` property, etc.)
    pub object: Gc<JsObject>,
    name: JsString,
    call: Option<NativeFn>,
    construct: Option<NativeConstructor>,
    /// Values the closures hold. Closures are opaque to the collector, so
    /// these are traced on their behalf.
    captures: Vec<Value>,
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsFunction")
            .field("name", &self.name)
            .field("callable", &self.call.is_some())
            .field("constructor", &self.construct.is_some())
            .finish()
    }
}

impl GcTraceable for JsFunction {
    const CLASS_NAME: &'static str = "Function";

    fn trace(&self, tracer: &mut dyn FnMut(GcId)) {
        tracer(self.object.id());
        for id in self.captures.iter().filter_map(Value::gc_id) {
            tracer(id);
        }
    }
}

impl JsFunction {
    /// Create a function object
    pub fn new(
        object: Gc<JsObject>,
        name: &str,
        call: Option<NativeFn>,
        construct: Option<NativeConstructor>,
    ) -> Self {
        Self {
            object,
            name: name.into(),
            call,
            construct,
            captures: Vec::new(),
        }
    }

    /// Trace `captures` as strong edges of this function.
    pub fn with_captures(mut self, captures: Vec<Value>) -> Self {
        self.captures = captures;
        self
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this function has `[[Call]]`
    pub fn is_callable(&self) -> bool {
        self.call.is_some()
    }

    /// Whether this function has `[[Construct]]`
    pub fn is_constructor(&self) -> bool {
        self.construct.is_some()
    }

    /// Cloned `[[Call]]` behavior, detached from the heap borrow.
    pub fn call_behavior(&self) -> Option<NativeFn> {
        self.call.clone()
    }

    /// Cloned `[[Construct]]` behavior, detached from the heap borrow.
    pub fn construct_behavior(&self) -> Option<NativeConstructor> {
        self.construct.clone()
    }
}

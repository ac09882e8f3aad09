//! Error objects
//!
//! Engine errors (`VmError`) stay Rust values while they propagate; they are
//! only turned into heap objects when something catches them.

use kestrel_gc::{Gc, GcId, GcTraceable};

use crate::context::VmContext;
use crate::convert::to_string;
use crate::error::{ErrorKind, VmError, VmResult};
use crate::object::{JsObject, PropertyKey};
use crate::value::{JsString, ObjectRef, Value};

/// A script-visible error object
#[derive(Debug)]
pub struct JsError {
    /// Base object (prototype, `message` property)
    pub object: Gc<JsObject>,
    kind: ErrorKind,
    message: JsString,
}

impl GcTraceable for JsError {
    const CLASS_NAME: &'static str = "Error";

    fn trace(&self, tracer: &mut dyn FnMut(GcId)) {
        tracer(self.object.id());
    }
}

impl JsError {
    /// Error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message at creation time
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Allocate an error object of `kind` with the realm's prototype for it.
pub fn create_error(ctx: &mut VmContext, kind: ErrorKind, message: &str) -> VmResult<Gc<JsError>> {
    let proto = ctx.intrinsics().error_prototype_for(kind);
    let object = ctx.create_object(Some(ObjectRef::Ordinary(proto)))?;
    if !message.is_empty() {
        ctx.heap()
            .get(object)
            .set_own(PropertyKey::string("message"), Value::string(message));
    }
    ctx.alloc(JsError {
        object,
        kind,
        message: message.into(),
    })
}

/// `Error.prototype.toString()`
pub fn error_to_string(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    if !this.is_object() {
        return Err(VmError::type_error(
            "Error.prototype.toString called on non-object",
        ));
    }
    let name = ctx.get(this, &PropertyKey::string("name"))?;
    let name = if name.is_undefined() {
        "Error".into()
    } else {
        to_string(ctx, &name)?
    };
    let message = ctx.get(this, &PropertyKey::string("message"))?;
    let message = if message.is_undefined() {
        "".into()
    } else {
        to_string(ctx, &message)?
    };
    Ok(match (name.is_empty(), message.is_empty()) {
        (_, true) => Value::String(name),
        (true, false) => Value::String(message),
        (false, false) => Value::string(&format!("{name}: {message}")),
    })
}

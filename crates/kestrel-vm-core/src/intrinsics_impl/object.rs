//! Object.prototype methods used by the object-to-primitive protocol.

use crate::context::VmContext;
use crate::error::{VmError, VmResult};
use crate::object::PropertyKey;
use crate::value::Value;

/// `Object.prototype.toString()`
pub fn object_to_string(ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let builtin_tag = match this {
        Value::Undefined => return Ok(Value::string("[object Undefined]")),
        Value::Null => return Ok(Value::string("[object Null]")),
        Value::Boolean(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Symbol(_) => "Symbol",
        Value::BigInt(_) => "BigInt",
        Value::Object(obj) => match obj.class_name(ctx.heap()) {
            "Function" => "Function",
            "Error" | "TypeError" | "RangeError" | "SyntaxError" => "Error",
            _ => "Object",
        },
    };
    let tag_key = PropertyKey::Symbol(ctx.realm().symbols.to_string_tag);
    let tag = ctx.get(this, &tag_key)?;
    let tag = match &tag {
        Value::String(s) => s.as_ref(),
        _ => builtin_tag,
    };
    Ok(Value::string(&format!("[object {tag}]")))
}

/// `Object.prototype.valueOf()`
pub fn object_value_of(_ctx: &mut VmContext, this: &Value, _args: &[Value]) -> VmResult<Value> {
    if this.is_nullish() {
        return Err(VmError::type_error(
            "Cannot convert undefined or null to object",
        ));
    }
    Ok(this.clone())
}

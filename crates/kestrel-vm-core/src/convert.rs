//! Abstract conversion operations
//!
//! Every operation here that accepts an object may run user code through the
//! object-to-primitive protocol (`@@toPrimitive`, `valueOf`, `toString`).
//! Callers must treat any heap state they read before such a call as stale
//! afterwards and read it again.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Num, Zero};

use crate::context::VmContext;
use crate::error::{Completion, VmError};
use crate::object::PropertyKey;
use crate::value::{JsString, ObjectRef, Value};

/// 2^53 - 1
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Hint for `to_primitive`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    /// No preference (`"default"`)
    Default,
    /// `"number"`
    Number,
    /// `"string"`
    String,
}

impl PreferredType {
    fn hint_name(self) -> &'static str {
        match self {
            PreferredType::Default => "default",
            PreferredType::Number => "number",
            PreferredType::String => "string",
        }
    }
}

/// Result of `to_numeric`
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    /// A Number
    Number(f64),
    /// A BigInt
    BigInt(Rc<BigInt>),
}

// ============================================================================
// Object-to-primitive protocol
// ============================================================================

/// GetMethod: `undefined`/`null` mean absent, anything else must be callable.
fn get_method(ctx: &mut VmContext, value: &Value, key: &PropertyKey) -> Completion<Option<Value>> {
    let func = ctx.get(value, key)?;
    if func.is_nullish() {
        return Ok(None);
    }
    if !ctx.is_callable(&func) {
        return Err(VmError::type_error(format!(
            "{} is not a function",
            display_without_side_effects(ctx, &func)
        )));
    }
    Ok(Some(func))
}

/// ToPrimitive
pub fn to_primitive(ctx: &mut VmContext, value: &Value, hint: PreferredType) -> Completion<Value> {
    if !value.is_object() {
        return Ok(value.clone());
    }
    let to_primitive_key = PropertyKey::Symbol(ctx.realm().symbols.to_primitive);
    if let Some(exotic) = get_method(ctx, value, &to_primitive_key)? {
        let result = ctx.call(&exotic, value, &[Value::string(hint.hint_name())])?;
        if result.is_object() {
            return Err(VmError::type_error(
                "Cannot convert object to primitive value",
            ));
        }
        return Ok(result);
    }
    let hint = match hint {
        PreferredType::Default => PreferredType::Number,
        other => other,
    };
    ordinary_to_primitive(ctx, value, hint)
}

/// OrdinaryToPrimitive
pub fn ordinary_to_primitive(
    ctx: &mut VmContext,
    value: &Value,
    hint: PreferredType,
) -> Completion<Value> {
    let order = match hint {
        PreferredType::String => ["toString", "valueOf"],
        _ => ["valueOf", "toString"],
    };
    for name in order {
        let method = ctx.get(value, &PropertyKey::string(name))?;
        if ctx.is_callable(&method) {
            let result = ctx.call(&method, value, &[])?;
            if !result.is_object() {
                return Ok(result);
            }
        }
    }
    Err(VmError::type_error(
        "Cannot convert object to primitive value",
    ))
}

// ============================================================================
// Numeric conversions
// ============================================================================

/// ToNumber
pub fn to_number(ctx: &mut VmContext, value: &Value) -> Completion<f64> {
    match value {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(*n),
        Value::String(s) => Ok(string_to_number(s)),
        Value::Symbol(_) => Err(VmError::type_error(
            "Cannot convert a Symbol value to a number",
        )),
        Value::BigInt(_) => Err(VmError::type_error(
            "Cannot convert a BigInt value to a number",
        )),
        Value::Object(_) => {
            let prim = to_primitive(ctx, value, PreferredType::Number)?;
            to_number(ctx, &prim)
        }
    }
}

/// ToNumeric
pub fn to_numeric(ctx: &mut VmContext, value: &Value) -> Completion<Numeric> {
    let prim = to_primitive(ctx, value, PreferredType::Number)?;
    if let Value::BigInt(n) = prim {
        return Ok(Numeric::BigInt(n));
    }
    Ok(Numeric::Number(to_number(ctx, &prim)?))
}

/// ToIntegerOrInfinity. Never returns -0.
pub fn to_integer_or_infinity(ctx: &mut VmContext, value: &Value) -> Completion<f64> {
    let n = to_number(ctx, value)?;
    Ok(integer_or_infinity(n))
}

fn integer_or_infinity(n: f64) -> f64 {
    if n.is_nan() {
        return 0.0;
    }
    if n.is_infinite() {
        return n;
    }
    let t = n.trunc();
    if t == 0.0 { 0.0 } else { t }
}

/// ToIndex: a non-negative integral index no larger than 2^53 - 1.
///
/// `undefined` is 0. May run user code.
pub fn to_index(ctx: &mut VmContext, value: &Value) -> Completion<usize> {
    if value.is_undefined() {
        return Ok(0);
    }
    let integer = to_integer_or_infinity(ctx, value)?;
    if integer < 0.0 {
        return Err(VmError::range_error(format!(
            "Invalid index: {} is negative",
            number_to_string(integer)
        )));
    }
    if integer > MAX_SAFE_INTEGER || integer > usize::MAX as f64 {
        return Err(VmError::range_error(format!(
            "Invalid index: {} is too large",
            number_to_string(integer)
        )));
    }
    Ok(integer as usize)
}

/// ToBigInt
pub fn to_big_int(ctx: &mut VmContext, value: &Value) -> Completion<Rc<BigInt>> {
    let prim = to_primitive(ctx, value, PreferredType::Number)?;
    match prim {
        Value::BigInt(n) => Ok(n),
        Value::Boolean(b) => Ok(Rc::new(BigInt::from(u8::from(b)))),
        Value::String(s) => string_to_big_int(&s)
            .map(Rc::new)
            .ok_or_else(|| VmError::syntax_error(format!("Cannot convert {s} to a BigInt"))),
        Value::Undefined | Value::Null | Value::Number(_) | Value::Symbol(_) => {
            Err(VmError::type_error(format!(
                "Cannot convert {} to a BigInt",
                display_without_side_effects(ctx, &prim)
            )))
        }
        Value::Object(_) => Err(VmError::type_error(
            "Cannot convert object to primitive value",
        )),
    }
}

/// ToBoolean. Never runs user code.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Number(n) => !(n.is_nan() || *n == 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Symbol(_) | Value::Object(_) => true,
        Value::BigInt(n) => !n.is_zero(),
    }
}

// ============================================================================
// String conversions
// ============================================================================

/// ToString
pub fn to_string(ctx: &mut VmContext, value: &Value) -> Completion<JsString> {
    match value {
        Value::Undefined => Ok("undefined".into()),
        Value::Null => Ok("null".into()),
        Value::Boolean(b) => Ok(if *b { "true" } else { "false" }.into()),
        Value::Number(n) => Ok(number_to_string(*n).into()),
        Value::String(s) => Ok(s.clone()),
        Value::Symbol(_) => Err(VmError::type_error(
            "Cannot convert a Symbol value to a string",
        )),
        Value::BigInt(n) => Ok(n.to_string().into()),
        Value::Object(_) => {
            let prim = to_primitive(ctx, value, PreferredType::String)?;
            to_string(ctx, &prim)
        }
    }
}

/// ToPropertyKey
pub fn to_property_key(ctx: &mut VmContext, value: &Value) -> Completion<PropertyKey> {
    let key = to_primitive(ctx, value, PreferredType::String)?;
    if let Value::Symbol(sym) = key {
        return Ok(PropertyKey::Symbol(sym));
    }
    Ok(PropertyKey::String(to_string(ctx, &key)?))
}

/// Render a value for diagnostics without running any user code.
pub fn display_without_side_effects(ctx: &VmContext, value: &Value) -> String {
    let heap = ctx.heap();
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => format!("\"{s}\""),
        Value::Symbol(sym) => match heap.try_get(*sym) {
            Some(sym) => sym.descriptive_string(),
            None => "Symbol()".to_string(),
        },
        Value::BigInt(n) => format!("{n}n"),
        Value::Object(ObjectRef::Function(f)) => match heap.try_get(*f) {
            Some(f) => format!("function {}() {{ [native code] }}", f.name()),
            None => "[object Function]".to_string(),
        },
        Value::Object(obj) if heap.is_alive(obj.id()) => {
            format!("[object {}]", obj.class_name(heap))
        }
        Value::Object(_) => "[object Object]".to_string(),
    }
}

// ============================================================================
// Number <-> string
// ============================================================================

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// StringToNumber. Malformed input yields NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        return 0.0;
    }

    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &trimmed[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        let mut value = 0.0f64;
        for c in digits.chars() {
            match c.to_digit(radix) {
                Some(d) => value = value * f64::from(radix) + f64::from(d),
                None => return f64::NAN,
            }
        }
        return value;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust accepts "inf" and "nan"; StrDecimalLiteral only allows these.
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// StringToBigInt. `None` when the string is not a valid integer literal.
pub fn string_to_big_int(s: &str) -> Option<BigInt> {
    let trimmed = s.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        return Some(BigInt::zero());
    }
    let (radix, digits) = match trimmed.get(..2) {
        Some("0x" | "0X") => (16, &trimmed[2..]),
        Some("0o" | "0O") => (8, &trimmed[2..]),
        Some("0b" | "0B") => (2, &trimmed[2..]),
        _ => (10, trimmed),
    };
    let unsigned = digits.strip_prefix(['+', '-']).unwrap_or(digits);
    if unsigned.is_empty() || (radix != 10 && unsigned.len() != digits.len()) {
        return None;
    }
    if !unsigned.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    BigInt::from_str_radix(digits, radix).ok()
}

/// Number::toString(10)
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        let mut buf = itoa::Buffer::new();
        return buf.format(n as i64).to_string();
    }

    let mut buf = ryu::Buffer::new();
    let (digits, point) = decimal_digits(buf.format_finite(n.abs()));
    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    let k = digits.len() as i32;
    if k <= point && point <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat_n('0', (point - k) as usize));
    } else if 0 < point && point <= 21 {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    } else if -6 < point && point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', (-point) as usize));
        out.push_str(&digits);
    } else {
        let exponent = point - 1;
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if exponent < 0 { '-' } else { '+' });
        let mut exp_buf = itoa::Buffer::new();
        out.push_str(exp_buf.format(exponent.abs()));
    }
    out
}

/// Split shortest round-trip output into significant digits and the decimal
/// point position `n` such that the value is `0.digits * 10^n`.
fn decimal_digits(repr: &str) -> (String, i32) {
    let (mantissa, exponent) = match repr.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (repr, 0),
    };
    let int_len = mantissa.find('.').unwrap_or(mantissa.len()) as i32;
    let all: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let leading = all.len() - all.trim_start_matches('0').len();
    let digits = all.trim_start_matches('0').trim_end_matches('0').to_string();
    (digits, int_len + exponent - leading as i32)
}

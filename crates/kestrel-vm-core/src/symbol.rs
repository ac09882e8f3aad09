//! Symbol cells
//!
//! A symbol is a heap-managed identity with an optional description. Global
//! symbols are the ones handed out by the `Symbol.for` registry.

use kestrel_gc::{GcId, GcTraceable};

use crate::value::JsString;

/// A JavaScript symbol
#[derive(Debug)]
pub struct JsSymbol {
    description: Option<JsString>,
    is_global: bool,
}

impl GcTraceable for JsSymbol {
    const NEEDS_TRACE: bool = false;
    const CLASS_NAME: &'static str = "Symbol";

    fn trace(&self, _tracer: &mut dyn FnMut(GcId)) {}
}

impl JsSymbol {
    /// Create a new symbol
    pub fn new(description: Option<JsString>, is_global: bool) -> Self {
        Self {
            description,
            is_global,
        }
    }

    /// The description, if any
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether this symbol lives in the global symbol registry
    pub fn is_global(&self) -> bool {
        self.is_global
    }

    /// `Symbol(description)` rendering
    pub fn descriptive_string(&self) -> String {
        format!("Symbol({})", self.description().unwrap_or(""))
    }
}

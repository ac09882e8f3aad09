//! Ordinary objects: prototype link plus a property table.
//!
//! Every object kind embeds one of these as its base. Lookups that can run
//! user code (accessor getters) are driven by `VmContext::get`, which clones
//! the property out of the table before calling anything.

use std::cell::{Cell, RefCell};

use kestrel_gc::{Gc, GcId, GcTraceable};
use rustc_hash::FxHashMap;

use crate::function::JsFunction;
use crate::symbol::JsSymbol;
use crate::value::{JsString, ObjectRef, Value};

/// Property key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key
    String(JsString),
    /// Symbol key
    Symbol(Gc<JsSymbol>),
}

impl PropertyKey {
    /// Create a string key
    pub fn string(s: &str) -> Self {
        PropertyKey::String(s.into())
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::string(s)
    }
}

impl From<Gc<JsSymbol>> for PropertyKey {
    fn from(sym: Gc<JsSymbol>) -> Self {
        PropertyKey::Symbol(sym)
    }
}

/// A stored property
#[derive(Debug, Clone)]
pub enum Property {
    /// Plain data slot
    Data(Value),
    /// Getter/setter pair; calling either may run arbitrary code
    Accessor {
        /// Getter function
        get: Option<Gc<JsFunction>>,
        /// Setter function
        set: Option<Gc<JsFunction>>,
    },
}

/// A JavaScript object
#[derive(Debug, Default)]
pub struct JsObject {
    prototype: Cell<Option<ObjectRef>>,
    properties: RefCell<FxHashMap<PropertyKey, Property>>,
}

impl GcTraceable for JsObject {
    const CLASS_NAME: &'static str = "Object";

    fn trace(&self, tracer: &mut dyn FnMut(GcId)) {
        if let Some(proto) = self.prototype.get() {
            tracer(proto.id());
        }
        for (key, property) in self.properties.borrow().iter() {
            if let PropertyKey::Symbol(sym) = key {
                tracer(sym.id());
            }
            match property {
                Property::Data(value) => {
                    if let Some(id) = value.gc_id() {
                        tracer(id);
                    }
                }
                Property::Accessor { get, set } => {
                    if let Some(get) = get {
                        tracer(get.id());
                    }
                    if let Some(set) = set {
                        tracer(set.id());
                    }
                }
            }
        }
    }
}

impl JsObject {
    /// Create a new object with the given prototype
    pub fn new(prototype: Option<ObjectRef>) -> Self {
        Self {
            prototype: Cell::new(prototype),
            properties: RefCell::new(FxHashMap::default()),
        }
    }

    /// Get the prototype
    pub fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.get()
    }

    /// Set the prototype
    pub fn set_prototype(&self, prototype: Option<ObjectRef>) {
        self.prototype.set(prototype);
    }

    /// Get an own property (cloned out of the table)
    pub fn get_own(&self, key: &PropertyKey) -> Option<Property> {
        self.properties.borrow().get(key).cloned()
    }

    /// Check for an own property
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.properties.borrow().contains_key(key)
    }

    /// Define or overwrite an own property
    pub fn define(&self, key: PropertyKey, property: Property) {
        self.properties.borrow_mut().insert(key, property);
    }

    /// Define or overwrite an own data property
    pub fn set_own(&self, key: PropertyKey, value: Value) {
        self.define(key, Property::Data(value));
    }

    /// Remove an own property
    pub fn remove(&self, key: &PropertyKey) -> bool {
        self.properties.borrow_mut().remove(key).is_some()
    }

    /// Own property keys
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.properties.borrow().keys().cloned().collect()
    }
}

//! Realm: intrinsics plus well-known symbols.
//!
//! A realm is passed explicitly through `VmContext`; constructors consult it
//! for default prototypes when a new target does not supply one.

use kestrel_gc::{AllocError, Gc, GcId, Heap};

use crate::intrinsics::Intrinsics;
use crate::symbol::JsSymbol;

/// Unique identifier for a realm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RealmId(pub u32);

/// Well-known symbols used by the conversion protocol
#[derive(Debug, Clone)]
pub struct WellKnownSymbols {
    /// `Symbol.toPrimitive`
    pub to_primitive: Gc<JsSymbol>,
    /// `Symbol.toStringTag`
    pub to_string_tag: Gc<JsSymbol>,
}

impl WellKnownSymbols {
    fn allocate(heap: &mut Heap) -> Result<Self, AllocError> {
        Ok(Self {
            to_primitive: heap.allocate(JsSymbol::new(Some("Symbol.toPrimitive".into()), false))?,
            to_string_tag: heap.allocate(JsSymbol::new(Some("Symbol.toStringTag".into()), false))?,
        })
    }
}

/// A realm record
#[derive(Debug, Clone)]
pub struct Realm {
    /// Realm identity
    pub id: RealmId,
    /// Intrinsic objects
    pub intrinsics: Intrinsics,
    /// Well-known symbols
    pub symbols: WellKnownSymbols,
}

impl Realm {
    /// Allocate a fresh realm in `heap`.
    pub fn new(heap: &mut Heap, id: RealmId) -> Result<Self, AllocError> {
        let symbols = WellKnownSymbols::allocate(heap)?;
        let intrinsics = Intrinsics::allocate(heap, &symbols)?;
        Ok(Self {
            id,
            intrinsics,
            symbols,
        })
    }

    /// Everything the realm keeps alive
    pub fn roots(&self) -> Vec<GcId> {
        let mut roots = self.intrinsics.roots();
        roots.push(self.symbols.to_primitive.id());
        roots.push(self.symbols.to_string_tag.id());
        roots
    }
}

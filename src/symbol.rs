//! Identifier interning.
//!
//! Every name the front end ever compares — variables, struct tags, labels,
//! typedefs — is interned once into a [`Symbol`], a small `Copy` handle that
//! compares by integer equality instead of by string. The namespaces in
//! [`crate::symtab`] key all of their maps on `Symbol`.
//!
//! String *literal* payloads (the bytes of `"foo"`) are a different concern:
//! those are interned by the external `strlabel` facility the back end owns
//! (see [`crate::token::StringLabel`]), not by this module.

use hashbrown::HashMap;
use std::fmt;

/// An interned identifier. Cheap to copy and compare; the backing bytes live
/// in the [`Interner`] that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Symbol({})", self.0) }
}

impl Symbol {
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }
}

/// Owns the backing storage for every [`Symbol`] handed out. One `Interner`
/// is shared by a whole translation unit (owned by [`crate::parser::Parser`]).
#[derive(Default)]
pub struct Interner {
  strings: Vec<Box<str>>,
  map: HashMap<Box<str>, Symbol>,
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Intern `s`, returning the same [`Symbol`] every time the same bytes are seen.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let sym = Symbol(u32::try_from(self.strings.len()).expect("too many distinct identifiers"));
    self.strings.push(s.into());
    self.map.insert(s.into(), sym);
    sym
  }

  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str { &self.strings[sym.into_usize()] }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_idempotent() {
    let mut i = Interner::new();
    let a = i.intern("foo");
    let b = i.intern("bar");
    let c = i.intern("foo");
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(i.resolve(a), "foo");
    assert_eq!(i.resolve(b), "bar");
  }
}

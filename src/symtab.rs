//! Scoped symbol tables: the three independent C namespaces (identifiers,
//! labels, tags), each a LIFO stack of scopes over a generic entry type,
//! generalized to the file-scope vs. block-scope declaration-merge rules
//! C's linkage model requires.

use hashbrown::HashMap;

use crate::symbol::Symbol;
use crate::types::Ty;

/// How an identifier at file scope came to exist, in the order C's merge
/// rules rank them: a later `Declaration` never downgrades an existing
/// `Definition`, but a `Definition` always upgrades a `Tentative`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SymKind {
  /// `extern int x;` or a function prototype: declared, not yet defined.
  Declaration,
  /// `int x;` at file scope with no initializer: provisionally defined.
  Tentative,
  /// `int x = 1;`, or any function with a body.
  Definition,
  /// `typedef` name, a distinct kind since it never merges with the above.
  Typedef,
  /// An enumerator constant; `enum_value` records its folded value.
  Enum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
  External,
  Internal,
  None,
}

/// One binding in the identifier namespace.
#[derive(Clone, Debug)]
pub struct SymEntry {
  pub name: Symbol,
  pub ty: Ty,
  pub kind: SymKind,
  pub linkage: Linkage,
  /// Scope nesting depth this entry was declared at; 0 is file scope.
  pub depth: u32,
  /// Folded value of an enumerator; meaningful only when `kind == Enum`.
  pub enum_value: i64,
  /// The local slot backing this binding's storage, for anything that has
  /// storage (objects, parameters). `None` for functions, typedefs and
  /// enumerators, none of which occupy a frame slot.
  pub slot: Option<crate::types::mir::VarId>,
}

impl SymEntry {
  #[must_use] pub fn is_file_scope(&self) -> bool { self.depth == 0 }
}

/// A scoped table of `Symbol -> T` bindings, generic over the entry payload
/// so the same push/pop/lookup machinery backs identifiers, labels and tags.
/// Scopes are a plain stack; entering a scope pushes, leaving it pops and
/// discards everything declared inside.
pub struct Namespace<T> {
  scopes: Vec<HashMap<Symbol, T>>,
}

impl<T> Default for Namespace<T> {
  fn default() -> Self { Self { scopes: vec![HashMap::new()] } }
}

impl<T> Namespace<T> {
  #[must_use] pub fn new() -> Self { Self::default() }

  #[must_use] pub fn depth(&self) -> u32 { u32::try_from(self.scopes.len() - 1).expect("scope depth overflow") }

  pub fn push_scope(&mut self) {
    self.scopes.push(HashMap::new());
    log::trace!("pushed scope, now at depth {}", self.depth());
  }

  /// Discards every binding introduced in the innermost scope. Never called
  /// on the outermost (file) scope.
  pub fn pop_scope(&mut self) {
    assert!(self.scopes.len() > 1, "cannot pop file scope");
    let discarded = self.scopes.pop().map_or(0, |s| s.len());
    log::trace!("popped scope, discarding {discarded} binding(s), now at depth {}", self.depth());
  }

  /// Looks up `name`, searching from the innermost scope outward, the way
  /// C's block-nesting shadowing works.
  #[must_use] pub fn lookup(&self, name: Symbol) -> Option<&T> {
    self.scopes.iter().rev().find_map(|s| s.get(&name))
  }

  /// Looks up `name` only in the innermost (current) scope, used to detect
  /// a redeclaration clash within one block.
  #[must_use] pub fn lookup_current(&self, name: Symbol) -> Option<&T> {
    self.scopes.last().expect("namespace always has at least file scope").get(&name)
  }

  pub fn insert(&mut self, name: Symbol, entry: T) {
    self.scopes.last_mut().expect("namespace always has at least file scope").insert(name, entry);
  }

  #[must_use] pub fn is_file_scope(&self) -> bool { self.scopes.len() == 1 }
}

impl Namespace<SymEntry> {
  /// Applies the file-scope/block-scope declaration-merge rules for a new
  /// identifier binding, returning the resolved entry to install or an
  /// [`crate::error::Error`] if the new declaration conflicts with an
  /// existing one.
  ///
  /// File scope: `Declaration` never conflicts with anything; `Tentative`
  /// upgrades a prior `Tentative`/`Declaration`; `Definition` upgrades a
  /// prior `Tentative`/`Declaration` but conflicts with a prior `Definition`.
  /// Block scope: any second binding of the same name at the same depth is a
  /// conflict (C has no tentative-definition merging inside a block).
  pub fn merge(&self, incoming: SymEntry) -> Result<SymEntry, crate::error::Error> {
    let name_str = |s: Symbol| format!("#{}", s.into_usize());
    if incoming.depth == 0 {
      match self.lookup_current(incoming.name) {
        None => Ok(incoming),
        Some(prev) => match (prev.kind, incoming.kind) {
          (SymKind::Typedef, _) | (_, SymKind::Typedef) =>
            Err(crate::error::Error::RedefinitionAtFileScope(name_str(incoming.name))),
          (SymKind::Definition, SymKind::Definition) =>
            Err(crate::error::Error::RedefinitionAtFileScope(name_str(incoming.name))),
          (SymKind::Definition, SymKind::Declaration | SymKind::Tentative) =>
            Ok(SymEntry { kind: SymKind::Definition, ..incoming }),
          (SymKind::Tentative, SymKind::Declaration) =>
            Ok(SymEntry { kind: SymKind::Tentative, ..prev.clone() }),
          _ => Ok(incoming),
        },
      }
    } else {
      match self.lookup_current(incoming.name) {
        None => Ok(incoming),
        Some(_) => Err(crate::error::Error::RedefinitionAtBlockScope(name_str(incoming.name))),
      }
    }
  }

  /// Every file-scope identifier still `Tentative` with `Internal` linkage —
  /// the set the end-of-input finalization pass zero-initializes.
  pub fn file_scope_tentatives(&self) -> impl Iterator<Item = &SymEntry> + '_ {
    self.scopes[0].values().filter(|e| e.kind == SymKind::Tentative && e.linkage == Linkage::Internal)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Quals, TypeRegistry};
  use pretty_assertions::assert_eq;

  fn entry(name: Symbol, ty: Ty, kind: SymKind, depth: u32) -> SymEntry {
    SymEntry { name, ty, kind, linkage: Linkage::External, depth, enum_value: 0, slot: None }
  }

  #[test]
  fn block_scope_shadows_file_scope() {
    let reg = TypeRegistry::new();
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let mut ns = Namespace::<SymEntry>::new();
    ns.insert(x, entry(x, reg.integer(4, Quals::empty()), SymKind::Definition, 0));
    ns.push_scope();
    ns.insert(x, entry(x, reg.integer(1, Quals::empty()), SymKind::Declaration, 1));
    assert_eq!(ns.lookup(x).unwrap().depth, 1);
    ns.pop_scope();
    assert_eq!(ns.lookup(x).unwrap().depth, 0);
  }

  #[test]
  fn tentative_then_definition_merges_to_definition() {
    let reg = TypeRegistry::new();
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let mut ns = Namespace::<SymEntry>::new();
    let tentative = entry(x, reg.integer(4, Quals::empty()), SymKind::Tentative, 0);
    ns.insert(x, ns.merge(tentative).unwrap());
    let def = entry(x, reg.integer(4, Quals::empty()), SymKind::Definition, 0);
    let merged = ns.merge(def).unwrap();
    assert_eq!(merged.kind, SymKind::Definition);
  }

  #[test]
  fn tentative_survives_later_weaker_declaration() {
    let reg = TypeRegistry::new();
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let mut ns = Namespace::<SymEntry>::new();
    let tentative = SymEntry {
      linkage: Linkage::Internal,
      ..entry(x, reg.integer(4, Quals::empty()), SymKind::Tentative, 0)
    };
    ns.insert(x, ns.merge(tentative).unwrap());
    let decl = entry(x, reg.integer(4, Quals::empty()), SymKind::Declaration, 0);
    let merged = ns.merge(decl).unwrap();
    assert_eq!(merged.kind, SymKind::Tentative);
    assert_eq!(merged.linkage, Linkage::Internal);
  }

  #[test]
  fn two_definitions_at_file_scope_conflict() {
    let reg = TypeRegistry::new();
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let mut ns = Namespace::<SymEntry>::new();
    let d1 = entry(x, reg.integer(4, Quals::empty()), SymKind::Definition, 0);
    ns.insert(x, ns.merge(d1).unwrap());
    let d2 = entry(x, reg.integer(4, Quals::empty()), SymKind::Definition, 0);
    assert!(ns.merge(d2).is_err());
  }

  #[test]
  fn redeclaration_at_same_block_depth_conflicts() {
    let reg = TypeRegistry::new();
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let mut ns = Namespace::<SymEntry>::new();
    ns.push_scope();
    let d1 = entry(x, reg.integer(4, Quals::empty()), SymKind::Declaration, 1);
    ns.insert(x, ns.merge(d1).unwrap());
    let d2 = entry(x, reg.integer(4, Quals::empty()), SymKind::Declaration, 1);
    assert!(ns.merge(d2).is_err());
  }
}

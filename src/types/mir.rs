//! The typed control-flow graph of three-address IR this crate lowers
//! expressions and statements into.
//!
//! A flat arena of blocks (`BlockId(u32)` indexing a `Vec<BasicBlock>`), each
//! holding its own statements plus a `Terminator`; `terminate()` asserts it's
//! only ever set once, matching the single-assignment discipline the rest of
//! the type/symbol model holds itself to.

use std::fmt;
use std::ops::{Index, IndexMut};

use bit_set::BitSet;
use smallvec::SmallVec;

use crate::symbol::Symbol;
use crate::types::Ty;

/// Index of a local (temporary or named variable) within a [`Decl`]'s frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

/// Index of a [`BasicBlock`] within a [`Cfg`]'s arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "bb{}", self.0) }
}

/// An operand: a named local, a dereferenced pointer-valued operand, or a
/// constant folded at compile time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Var {
  Direct(VarId),
  Deref(VarId),
  Immediate(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpKind {
  Add, Sub, Mul, Div, Mod,
  And, Or, Xor, Shl, Shr,
  Eq, Ne, Lt, Gt, Le, Ge,
}

/// One three-address operation. `Param`/`Call` are a pair: zero or more
/// `Param` ops push arguments left to right, immediately followed by the
/// `Call` that consumes them — the same "push then call" shape a stack-machine
/// calling convention uses, kept here because the front end doesn't yet know
/// the target's actual argument-passing registers/slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
  Assign { dst: VarId, src: Var },
  BinOp { dst: VarId, op: BinOpKind, lhs: Var, rhs: Var },
  Addr { dst: VarId, of: VarId },
  Deref { dst: VarId, ptr: Var },
  /// `*ptr = src`: the mirror of `Deref`, for assignment through a computed
  /// lvalue (member access, array indexing, explicit `*p = ...`).
  Store { ptr: VarId, src: Var },
  Cast { dst: VarId, ty: Ty, src: Var },
  Param { src: Var },
  Call { dst: Option<VarId>, func: Var, nargs: u32 },
  Return { value: Option<Var> },
}

/// How a block ends. A block with `None` here is unfinished — a dangling
/// edge the lowering pass hasn't closed yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
  Jump(BlockId),
  Branch { cond: Var, then_blk: BlockId, else_blk: BlockId },
  Return,
  Unreachable,
}

#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
  pub ops: Vec<Op>,
  term: Option<Terminator>,
}

impl BasicBlock {
  #[must_use] pub fn terminator(&self) -> Option<&Terminator> { self.term.as_ref() }

  /// The successor edges this block's terminator carries, in `jump[0]`,
  /// `jump[1]` order (a `Branch`'s `else_blk` is `jump[1]`). Empty for
  /// `Return`/`Unreachable`/an unfinished block.
  #[must_use] pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
    match &self.term {
      Some(Terminator::Jump(b)) => SmallVec::from_slice(&[*b]),
      Some(Terminator::Branch { then_blk, else_blk, .. }) => SmallVec::from_slice(&[*then_blk, *else_blk]),
      _ => SmallVec::new(),
    }
  }

  /// Sets this block's terminator. Panics if it was already set — every
  /// block is terminated exactly once, the same invariant the reference
  /// MIR's `terminate()` enforces.
  pub fn terminate(&mut self, term: Terminator) {
    assert!(self.term.replace(term).is_none(), "block terminated twice");
  }
}

/// The arena of blocks making up one function body (or, transiently, one
/// expression's short-circuit/ternary lowering before it's spliced into the
/// enclosing function).
#[derive(Clone, Debug, Default)]
pub struct Cfg {
  blocks: Vec<BasicBlock>,
}

impl Cfg {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn new_block(&mut self) -> BlockId {
    let id = BlockId(u32::try_from(self.blocks.len()).expect("too many blocks"));
    self.blocks.push(BasicBlock::default());
    id
  }

  pub fn push_op(&mut self, block: BlockId, op: Op) { self[block].ops.push(op) }

  #[must_use] pub fn len(&self) -> usize { self.blocks.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

  pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
    (0..self.blocks.len()).map(|i| BlockId(u32::try_from(i).expect("too many blocks")))
  }

  /// Blocks reachable from `entry` by following terminator edges, as a
  /// `bit-set` over block indices. A dangling (unterminated) block ends
  /// traversal on that path rather than panicking: it simply has no
  /// successors yet.
  #[must_use] pub fn reachable_from(&self, entry: BlockId) -> BitSet {
    let mut seen = BitSet::with_capacity(self.blocks.len());
    let mut worklist = vec![entry];
    seen.insert(entry.0 as usize);
    while let Some(b) = worklist.pop() {
      for succ in self[b].successors() {
        if seen.insert(succ.0 as usize) {
          worklist.push(succ);
        }
      }
    }
    seen
  }
}

impl Index<BlockId> for Cfg {
  type Output = BasicBlock;
  fn index(&self, id: BlockId) -> &BasicBlock { &self.blocks[id.0 as usize] }
}

impl IndexMut<BlockId> for Cfg {
  fn index_mut(&mut self, id: BlockId) -> &mut BasicBlock { &mut self.blocks[id.0 as usize] }
}

/// One local slot in a [`Decl`]'s frame: a named source variable or a
/// compiler-generated temporary (short-circuit booleans, ternary merges,
/// call-argument staging).
#[derive(Clone, Debug)]
pub struct Local {
  pub name: Option<Symbol>,
  pub ty: Ty,
}

/// The lowered body of one function, or the flat initializer CFG of a
/// file-scope object — the unit [`crate::parser::Parser::parse_next`]
/// hands back per external declaration.
#[derive(Clone, Debug)]
pub struct Decl {
  pub cfg: Cfg,
  /// Prologue block: static/file-scope initializer IR, emitted here rather
  /// than into `entry` so the back end can place it ahead of the function's
  /// real first block. `__func__` is resolved inline wherever it is
  /// referenced in the body instead, since it carries no storage to
  /// initialize up front.
  pub head: BlockId,
  /// Entry point of the function body. Equal to `head` for a fragment that
  /// carries no function (a pure initializer fragment).
  pub entry: BlockId,
  pub locals: Vec<Local>,
  /// Indices into `locals` that are this function's parameters, in order.
  pub params: Vec<VarId>,
  /// The symbol this fragment defines a body for, if any. `None` for a
  /// fragment that only carries initializer IR (global objects, or the
  /// end-of-input tentative-definition finalization pass).
  pub fun: Option<Symbol>,
}

impl Decl {
  pub fn new_local(&mut self, name: Option<Symbol>, ty: Ty) -> VarId {
    let id = VarId(u32::try_from(self.locals.len()).expect("too many locals"));
    self.locals.push(Local { name, ty });
    id
  }

  /// Blocks reachable from this fragment's entry point.
  #[must_use] pub fn reachable(&self) -> BitSet { self.cfg.reachable_from(self.entry) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Quals, TypeRegistry};

  #[test]
  fn diamond_shape_is_fully_reachable() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_block();
    let then_blk = cfg.new_block();
    let else_blk = cfg.new_block();
    let merge = cfg.new_block();
    cfg[entry].terminate(Terminator::Branch { cond: Var::Immediate(1), then_blk, else_blk });
    cfg[then_blk].terminate(Terminator::Jump(merge));
    cfg[else_blk].terminate(Terminator::Jump(merge));
    cfg[merge].terminate(Terminator::Return);
    let reachable = cfg.reachable_from(entry);
    assert_eq!(reachable.len(), 4);
  }

  #[test]
  fn unreachable_block_excluded() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_block();
    let dead = cfg.new_block();
    cfg[entry].terminate(Terminator::Return);
    cfg[dead].terminate(Terminator::Unreachable);
    let reachable = cfg.reachable_from(entry);
    assert_eq!(reachable.len(), 1);
    assert!(!reachable.contains(dead.0 as usize));
  }

  #[test]
  #[should_panic(expected = "terminated twice")]
  fn double_terminate_panics() {
    let mut cfg = Cfg::new();
    let b = cfg.new_block();
    cfg[b].terminate(Terminator::Return);
    cfg[b].terminate(Terminator::Return);
  }

  #[test]
  fn decl_tracks_locals_and_params() {
    let reg = TypeRegistry::new();
    let mut interner = crate::symbol::Interner::new();
    let name = interner.intern("f");
    let arg = interner.intern("x");
    let mut cfg = Cfg::new();
    let head = cfg.new_block();
    let mut decl = Decl { cfg, head, entry: head, locals: vec![], params: vec![], fun: Some(name) };
    let p = decl.new_local(Some(arg), reg.integer(4, Quals::empty()));
    decl.params.push(p);
    assert_eq!(decl.locals.len(), 1);
    assert_eq!(decl.params[0], p);
  }
}

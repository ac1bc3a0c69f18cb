//! Expression evaluation: the recursive-descent expression grammar plus the
//! semantic actions (usual arithmetic conversions, pointer-arithmetic
//! scaling, constant folding, lvalue checking) that lower it straight into
//! three-address IR as it parses — there is no separate expression-AST pass.

use crate::decl::{parse_type_name, starts_type_name};
use crate::error::{Error, PResult};
use crate::parser::Parser;
use crate::token::{Keyword, Lexer, Punct, TokenKind};
use crate::types::mir::{BinOpKind, BlockId, Op, Terminator, Var, VarId};
use crate::types::{Quals, Ty, TypeKind};

/// How an expression's result can be written back to, if at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Place {
  /// A named local or temporary: write with a plain `Assign`.
  Direct(VarId),
  /// A computed address held in a temp: write with a `Store`.
  Indirect(VarId),
}

/// The result of lowering one (sub)expression: its type, its value as a
/// three-address operand, and — if it's an lvalue — where to write it back.
#[derive(Clone, Debug)]
pub struct Val {
  pub ty: Ty,
  pub var: Var,
  pub place: Option<Place>,
}

impl Val {
  fn rvalue(ty: Ty, var: Var) -> Self { Self { ty, var, place: None } }
}

fn int_ty(p: &Parser<impl Lexer>) -> Ty { p.types.integer(4, Quals::empty()) }

/// Picks the common type of a binary operation's two operands under the
/// usual arithmetic conversions: any `Real` operand wins over `Integer`;
/// among integers, the wider one wins, and at equal width `UNSIGNED` wins.
fn common_type(types: &crate::types::TypeRegistry, a: &Ty, b: &Ty) -> Ty {
  if a.kind == TypeKind::Real || b.kind == TypeKind::Real {
    let size = a.size().max(b.size()).max(4);
    return types.real(size);
  }
  let size = a.size().max(b.size()).max(4);
  let unsigned = (a.size() >= b.size() && a.quals.contains(Quals::UNSIGNED))
    || (b.size() >= a.size() && b.quals.contains(Quals::UNSIGNED));
  types.integer(size, if unsigned { Quals::UNSIGNED } else { Quals::empty() })
}

/// Folds a constant operand, if it already is one. Used only to simplify
/// obviously-constant subexpressions (`Var::Immediate` arithmetic); it is not
/// a general constant-expression evaluator — see [`fold_const_expr`] for the
/// file-scope-initializer requirement.
fn fold_binop(kind: BinOpKind, a: i64, b: i64) -> Option<i64> {
  Some(match kind {
    BinOpKind::Add => a.wrapping_add(b),
    BinOpKind::Sub => a.wrapping_sub(b),
    BinOpKind::Mul => a.wrapping_mul(b),
    BinOpKind::Div => if b == 0 { return None } else { a.wrapping_div(b) },
    BinOpKind::Mod => if b == 0 { return None } else { a.wrapping_rem(b) },
    BinOpKind::And => a & b,
    BinOpKind::Or => a | b,
    BinOpKind::Xor => a ^ b,
    BinOpKind::Shl => a.wrapping_shl(b as u32),
    BinOpKind::Shr => a.wrapping_shr(b as u32),
    BinOpKind::Eq => i64::from(a == b),
    BinOpKind::Ne => i64::from(a != b),
    BinOpKind::Lt => i64::from(a < b),
    BinOpKind::Gt => i64::from(a > b),
    BinOpKind::Le => i64::from(a <= b),
    BinOpKind::Ge => i64::from(a >= b),
  })
}

/// Whether `kind` is one of the six comparison operators, which always
/// produce `int` 0/1 regardless of their operands' type — unlike the
/// arithmetic/bitwise operators, whose result takes the operands' common
/// type under the usual arithmetic conversions.
fn is_comparison(kind: BinOpKind) -> bool {
  matches!(kind, BinOpKind::Eq | BinOpKind::Ne | BinOpKind::Lt | BinOpKind::Gt | BinOpKind::Le | BinOpKind::Ge)
}

/// Emits a binary operation, applying the usual arithmetic conversions and,
/// for `+`/`-` on a pointer operand, scaling the integer side (or, for
/// pointer-minus-pointer, dividing the raw difference) by the pointee size.
/// Folds to an immediate when both operands already are one. A comparison's
/// result is always `int`, never the operands' common type.
fn binop(p: &mut Parser<impl Lexer>, cur: &mut BlockId, kind: BinOpKind, lhs: Val, rhs: Val) -> PResult<Val> {
  if lhs.ty.is_pointer() || rhs.ty.is_pointer() {
    return pointer_arith(p, cur, kind, lhs, rhs);
  }
  if let (Var::Immediate(a), Var::Immediate(b)) = (&lhs.var, &rhs.var) {
    if let Some(folded) = fold_binop(kind, *a, *b) {
      let ty = if is_comparison(kind) { int_ty(p) } else { common_type(&p.types, &lhs.ty, &rhs.ty) };
      return Ok(Val::rvalue(ty, Var::Immediate(folded)));
    }
  }
  let emit_ty = common_type(&p.types, &lhs.ty, &rhs.ty);
  let result_ty = if is_comparison(kind) { int_ty(p) } else { emit_ty };
  let dst = p.new_local(None, result_ty.clone());
  p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst, op: kind, lhs: lhs.var, rhs: rhs.var });
  Ok(Val::rvalue(result_ty, Var::Direct(dst)))
}

/// Pointer arithmetic and pointer comparison: `+`/`-` scale the integer
/// operand (or, for pointer-minus-pointer, divide the raw difference) by the
/// pointee size; the six comparison operators compare the raw pointer values
/// unscaled and, like their arithmetic-operand counterparts, always yield
/// `int` 0/1. Any other operator applied to a pointer operand (`*`, `%`,
/// `&`, ...) is rejected: C has no such operation.
fn pointer_arith(p: &mut Parser<impl Lexer>, cur: &mut BlockId, kind: BinOpKind, lhs: Val, rhs: Val) -> PResult<Val> {
  match kind {
    BinOpKind::Add | BinOpKind::Sub => {
      if lhs.ty.is_pointer() && rhs.ty.is_pointer() {
        // pointer - pointer: raw difference divided by the shared pointee size.
        let elem_size = i64::from(lhs.ty.pointee().size().max(1));
        let dst = p.new_local(None, int_ty(p));
        p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst, op: BinOpKind::Sub, lhs: lhs.var, rhs: rhs.var });
        let scaled = p.new_local(None, int_ty(p));
        p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp {
          dst: scaled, op: BinOpKind::Div, lhs: Var::Direct(dst), rhs: Var::Immediate(elem_size),
        });
        return Ok(Val::rvalue(int_ty(p), Var::Direct(scaled)));
      }
      let (ptr, offset, ptr_ty) = if lhs.ty.is_pointer() { (lhs.var, rhs.var, lhs.ty.clone()) } else { (rhs.var, lhs.var, rhs.ty.clone()) };
      let elem_size = i64::from(ptr_ty.pointee().size().max(1));
      let scaled_offset = p.new_local(None, int_ty(p));
      p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp {
        dst: scaled_offset, op: BinOpKind::Mul, lhs: offset, rhs: Var::Immediate(elem_size),
      });
      let dst = p.new_local(None, ptr_ty.clone());
      p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst, op: kind, lhs: ptr, rhs: Var::Direct(scaled_offset) });
      Ok(Val::rvalue(ptr_ty, Var::Direct(dst)))
    }
    _ if is_comparison(kind) => {
      let dst = p.new_local(None, int_ty(p));
      p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst, op: kind, lhs: lhs.var, rhs: rhs.var });
      Ok(Val::rvalue(int_ty(p), Var::Direct(dst)))
    }
    _ => Err(Error::InvalidPointerOperand),
  }
}

/// Checks `val` is an lvalue and performs the write-back implied by
/// assignment, converting `rhs` to `val`'s type first. Returns the assigned
/// value (C's assignment-expression result), matching `assign()` in the
/// expression-evaluation design.
fn assign(p: &mut Parser<impl Lexer>, cur: &mut BlockId, lhs: Val, rhs: Val) -> PResult<Val> {
  let Some(place) = lhs.place.clone() else { return Err(Error::NotAnLvalue) };
  let converted = cast_to(p, cur, rhs, &lhs.ty)?;
  match place {
    Place::Direct(v) => p.cfg.as_mut().unwrap().push_op(*cur, Op::Assign { dst: v, src: converted.var.clone() }),
    Place::Indirect(v) => p.cfg.as_mut().unwrap().push_op(*cur, Op::Store { ptr: v, src: converted.var.clone() }),
  }
  Ok(Val { ty: lhs.ty, var: converted.var, place: lhs.place })
}

/// Converts `val` to `target`, emitting a `Cast` op unless the types already
/// match or `val` is a foldable immediate (constants fold across casts too).
fn cast_to(p: &mut Parser<impl Lexer>, cur: &mut BlockId, val: Val, target: &Ty) -> PResult<Val> {
  if *val.ty == **target { return Ok(val) }
  if !target.is_scalar() && target.kind != TypeKind::None {
    return Err(Error::BadCastTarget);
  }
  if let Var::Immediate(n) = val.var {
    return Ok(Val::rvalue(target.clone(), Var::Immediate(n)));
  }
  let dst = p.new_local(None, target.clone());
  p.cfg.as_mut().unwrap().push_op(*cur, Op::Cast { dst, ty: target.clone(), src: val.var });
  Ok(Val::rvalue(target.clone(), Var::Direct(dst)))
}

/// Entry point: a full assignment-level expression (the grammar does not
/// implement the comma operator).
pub fn parse_expression(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
  parse_assignment(p, cur)
}

/// Converts an already-evaluated value to `target`, applying the same rules
/// [`assign`] uses for its right-hand side. Exposed for initializer lowering
/// in [`crate::decl`], which assigns into computed member/element addresses
/// rather than through a parsed lvalue expression.
pub fn convert_to(p: &mut Parser<impl Lexer>, cur: &mut BlockId, val: Val, target: &Ty) -> PResult<Val> {
  cast_to(p, cur, val, target)
}

fn assign_op_to_binop(punct: Punct) -> Option<BinOpKind> {
  Some(match punct {
    Punct::PlusAssign => BinOpKind::Add,
    Punct::MinusAssign => BinOpKind::Sub,
    Punct::StarAssign => BinOpKind::Mul,
    Punct::SlashAssign => BinOpKind::Div,
    Punct::PercentAssign => BinOpKind::Mod,
    Punct::AmpAssign => BinOpKind::And,
    Punct::PipeAssign => BinOpKind::Or,
    Punct::CaretAssign => BinOpKind::Xor,
    Punct::ShlAssign => BinOpKind::Shl,
    Punct::ShrAssign => BinOpKind::Shr,
    _ => return None,
  })
}

fn parse_assignment(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
  let lhs = parse_conditional(p, cur)?;
  let Some(punct) = p.peek().punct() else { return Ok(lhs) };
  if punct == Punct::Assign {
    p.bump();
    let rhs = parse_assignment(p, cur)?;
    return assign(p, cur, lhs, rhs);
  }
  if let Some(kind) = assign_op_to_binop(punct) {
    p.bump();
    let rhs = parse_assignment(p, cur)?;
    let read = Val { ty: lhs.ty.clone(), var: lhs.var.clone(), place: None };
    let computed = binop(p, cur, kind, read, rhs)?;
    return assign(p, cur, lhs, computed);
  }
  Ok(lhs)
}

/// Lowers `cond ? then : else` via a three-block shape: the current block
/// branches to a `then` block and an `else` block, each of which computes its
/// side, assigns a shared result temp, and jumps to a merge block that
/// becomes the new current block.
fn parse_conditional(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
  let cond = parse_logical_or(p, cur)?;
  if !p.eat(Punct::Question) { return Ok(cond) }
  let then_blk = p.new_block();
  let else_blk = p.new_block();
  let merge_blk = p.new_block();
  p.cfg.as_mut().unwrap()[*cur].terminate(Terminator::Branch { cond: cond.var, then_blk, else_blk });

  *cur = then_blk;
  let then_val = parse_expression(p, cur)?;
  p.consume(Punct::Colon, "':'")?;
  let then_exit = *cur;

  *cur = else_blk;
  let else_val = parse_conditional(p, cur)?;
  let else_exit = *cur;

  let result_ty = common_type(&p.types, &then_val.ty, &else_val.ty);
  let result = p.new_local(None, result_ty.clone());
  let then_converted = cast_to(p, &mut { then_exit }, then_val, &result_ty)?;
  p.cfg.as_mut().unwrap().push_op(then_exit, Op::Assign { dst: result, src: then_converted.var });
  p.cfg.as_mut().unwrap()[then_exit].terminate(Terminator::Jump(merge_blk));

  let else_converted = cast_to(p, &mut { else_exit }, else_val, &result_ty)?;
  p.cfg.as_mut().unwrap().push_op(else_exit, Op::Assign { dst: result, src: else_converted.var });
  p.cfg.as_mut().unwrap()[else_exit].terminate(Terminator::Jump(merge_blk));

  *cur = merge_blk;
  Ok(Val::rvalue(result_ty, Var::Direct(result)))
}

macro_rules! short_circuit {
  ($name:ident, $next:ident, $punct:path, $short_on_true:expr) => {
    fn $name(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
      let mut lhs = $next(p, cur)?;
      while p.peek().punct() == Some($punct) {
        p.bump();
        let result = p.new_local(None, int_ty(p));
        let short_blk = p.new_block();
        let rhs_blk = p.new_block();
        let merge_blk = p.new_block();
        let (then_blk, else_blk) = if $short_on_true { (short_blk, rhs_blk) } else { (rhs_blk, short_blk) };
        p.cfg.as_mut().unwrap()[*cur].terminate(Terminator::Branch { cond: lhs.var, then_blk, else_blk });

        p.cfg.as_mut().unwrap().push_op(short_blk, Op::Assign { dst: result, src: Var::Immediate(i64::from($short_on_true)) });
        p.cfg.as_mut().unwrap()[short_blk].terminate(Terminator::Jump(merge_blk));

        *cur = rhs_blk;
        let rhs = $next(p, cur)?;
        let normalized = p.new_local(None, int_ty(p));
        p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst: normalized, op: BinOpKind::Ne, lhs: rhs.var, rhs: Var::Immediate(0) });
        p.cfg.as_mut().unwrap().push_op(*cur, Op::Assign { dst: result, src: Var::Direct(normalized) });
        p.cfg.as_mut().unwrap()[*cur].terminate(Terminator::Jump(merge_blk));

        *cur = merge_blk;
        lhs = Val::rvalue(int_ty(p), Var::Direct(result));
      }
      Ok(lhs)
    }
  };
}

short_circuit!(parse_logical_or, parse_logical_and, Punct::OrOr, true);
short_circuit!(parse_logical_and, parse_bitor, Punct::AndAnd, false);

macro_rules! left_assoc {
  ($name:ident, $next:ident, [$(($punct:path, $kind:path)),+ $(,)?]) => {
    fn $name(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
      let mut lhs = $next(p, cur)?;
      loop {
        let kind = match p.peek().punct() {
          $(Some($punct) => $kind,)+
          _ => break,
        };
        p.bump();
        let rhs = $next(p, cur)?;
        lhs = binop(p, cur, kind, lhs, rhs)?;
      }
      Ok(lhs)
    }
  };
}

left_assoc!(parse_bitor, parse_bitxor, [(Punct::Pipe, BinOpKind::Or)]);
left_assoc!(parse_bitxor, parse_bitand, [(Punct::Caret, BinOpKind::Xor)]);
left_assoc!(parse_bitand, parse_equality, [(Punct::Amp, BinOpKind::And)]);
left_assoc!(parse_equality, parse_relational, [(Punct::Eq, BinOpKind::Eq), (Punct::Ne, BinOpKind::Ne)]);
left_assoc!(parse_relational, parse_shift, [
  (Punct::Lt, BinOpKind::Lt), (Punct::Gt, BinOpKind::Gt),
  (Punct::Le, BinOpKind::Le), (Punct::Ge, BinOpKind::Ge),
]);
left_assoc!(parse_shift, parse_additive, [(Punct::Shl, BinOpKind::Shl), (Punct::Shr, BinOpKind::Shr)]);
left_assoc!(parse_additive, parse_multiplicative, [(Punct::Plus, BinOpKind::Add), (Punct::Minus, BinOpKind::Sub)]);
left_assoc!(parse_multiplicative, parse_cast, [
  (Punct::Star, BinOpKind::Mul), (Punct::Slash, BinOpKind::Div), (Punct::Percent, BinOpKind::Mod),
]);

/// Disambiguates `(` starting a cast from `(` starting a parenthesized
/// expression by looking one token past it: a type keyword or typedef name
/// means a cast, anything else a parenthesized expression. This is the one
/// place the grammar needs two tokens of lookahead.
fn parse_cast(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
  if p.peek().punct() == Some(Punct::LParen) {
    let after = p.peekn(2);
    if starts_type_name(p, &after) {
      p.bump();
      let ty = parse_type_name(p)?;
      p.consume(Punct::RParen, "')'")?;
      let val = parse_cast(p, cur)?;
      return cast_to(p, cur, val, &ty);
    }
  }
  parse_unary(p, cur)
}

fn parse_unary(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
  let tok = p.peek();
  if let Some(punct) = tok.punct() {
    match punct {
      Punct::Amp => {
        p.bump();
        let operand = parse_cast(p, cur)?;
        let Some(place) = operand.place else { return Err(Error::NotAnLvalue) };
        let of = match place { Place::Direct(v) | Place::Indirect(v) => v };
        let dst = p.new_local(None, p.types.pointer(operand.ty.clone(), Quals::empty()));
        p.cfg.as_mut().unwrap().push_op(*cur, Op::Addr { dst, of });
        return Ok(Val::rvalue(p.types.pointer(operand.ty, Quals::empty()), Var::Direct(dst)));
      }
      Punct::Star => {
        p.bump();
        let operand = parse_cast(p, cur)?;
        if !operand.ty.is_pointer() { return Err(Error::NotAnObject) }
        let pointee = operand.ty.pointee().clone();
        let ptr_slot = match operand.var {
          Var::Direct(v) => v,
          _ => {
            let tmp = p.new_local(None, operand.ty.clone());
            p.cfg.as_mut().unwrap().push_op(*cur, Op::Assign { dst: tmp, src: operand.var });
            tmp
          }
        };
        return Ok(Val { ty: pointee.clone(), var: Var::Deref(ptr_slot), place: Some(Place::Indirect(ptr_slot)) });
      }
      Punct::Plus => { p.bump(); return parse_cast(p, cur) }
      Punct::Minus => {
        p.bump();
        let operand = parse_cast(p, cur)?;
        if let Var::Immediate(n) = operand.var { return Ok(Val::rvalue(operand.ty, Var::Immediate(-n))) }
        let dst = p.new_local(None, operand.ty.clone());
        p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst, op: BinOpKind::Sub, lhs: Var::Immediate(0), rhs: operand.var });
        return Ok(Val::rvalue(operand.ty, Var::Direct(dst)));
      }
      Punct::Tilde => {
        p.bump();
        let operand = parse_cast(p, cur)?;
        let dst = p.new_local(None, operand.ty.clone());
        p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst, op: BinOpKind::Xor, lhs: operand.var, rhs: Var::Immediate(-1) });
        return Ok(Val::rvalue(operand.ty, Var::Direct(dst)));
      }
      Punct::Not => {
        p.bump();
        let operand = parse_cast(p, cur)?;
        let dst = p.new_local(None, int_ty(p));
        p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp { dst, op: BinOpKind::Eq, lhs: operand.var, rhs: Var::Immediate(0) });
        return Ok(Val::rvalue(int_ty(p), Var::Direct(dst)));
      }
      Punct::PlusPlus | Punct::MinusMinus => {
        let kind = if punct == Punct::PlusPlus { BinOpKind::Add } else { BinOpKind::Sub };
        p.bump();
        let operand = parse_unary(p, cur)?;
        let one = Val::rvalue(int_ty(p), Var::Immediate(1));
        let computed = binop(p, cur, kind, Val { ty: operand.ty.clone(), var: operand.var.clone(), place: None }, one)?;
        return assign(p, cur, operand, computed);
      }
      _ => {}
    }
  }
  if tok.keyword() == Some(Keyword::Sizeof) {
    p.bump();
    if p.peek().punct() == Some(Punct::LParen) && starts_type_name(p, &p.peekn(2)) {
      p.bump();
      let ty = parse_type_name(p)?;
      p.consume(Punct::RParen, "')'")?;
      if ty.is_function() || !ty.is_complete() { return Err(Error::SizeofIncomplete) }
      return Ok(Val::rvalue(int_ty(p), Var::Immediate(i64::from(ty.size()))));
    }
    let operand = parse_unary(p, cur)?;
    if operand.ty.is_function() || !operand.ty.is_complete() { return Err(Error::SizeofIncomplete) }
    return Ok(Val::rvalue(int_ty(p), Var::Immediate(i64::from(operand.ty.size()))));
  }
  parse_postfix(p, cur)
}

fn parse_postfix(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
  let mut val = parse_primary(p, cur)?;
  loop {
    match p.peek().punct() {
      Some(Punct::LBracket) => {
        p.bump();
        let index = parse_expression(p, cur)?;
        p.consume(Punct::RBracket, "']'")?;
        val = index_into(p, cur, val, index)?;
      }
      Some(Punct::LParen) => {
        p.bump();
        val = parse_call(p, cur, val)?;
      }
      Some(Punct::Dot) => {
        p.bump();
        let name = expect_ident(p)?;
        val = member_access(p, cur, val, name, false)?;
      }
      Some(Punct::Arrow) => {
        p.bump();
        let name = expect_ident(p)?;
        val = member_access(p, cur, val, name, true)?;
      }
      Some(p_op @ (Punct::PlusPlus | Punct::MinusMinus)) => {
        p.bump();
        let kind = if p_op == Punct::PlusPlus { BinOpKind::Add } else { BinOpKind::Sub };
        let old = p.new_local(None, val.ty.clone());
        p.cfg.as_mut().unwrap().push_op(*cur, Op::Assign { dst: old, src: val.var.clone() });
        let one = Val::rvalue(int_ty(p), Var::Immediate(1));
        let computed = binop(p, cur, kind, Val { ty: val.ty.clone(), var: val.var.clone(), place: None }, one)?;
        assign(p, cur, val, computed)?;
        val = Val::rvalue(old_ty_workaround(p, old), Var::Direct(old));
      }
      _ => break,
    }
  }
  Ok(val)
}

fn old_ty_workaround(p: &Parser<impl Lexer>, slot: VarId) -> Ty {
  p.locals[slot.0 as usize].ty.clone()
}

fn expect_ident(p: &mut Parser<impl Lexer>) -> PResult<crate::symbol::Symbol> {
  let tok = p.bump();
  tok.ident().ok_or_else(|| Error::UnexpectedToken { expected: "an identifier", found: format!("{:?}", tok.kind) })
}

fn index_into(p: &mut Parser<impl Lexer>, cur: &mut BlockId, base: Val, index: Val) -> PResult<Val> {
  let element_ty = if base.ty.is_pointer() || base.ty.kind == TypeKind::Array {
    base.ty.pointee().clone()
  } else {
    return Err(Error::NotAnObject);
  };
  let ptr_ty = p.types.pointer(element_ty.clone(), Quals::empty());
  let sum = pointer_arith(p, cur, BinOpKind::Add, Val { ty: ptr_ty, var: base.var, place: None }, index)?;
  let addr_slot = match sum.var {
    Var::Direct(v) => v,
    other => {
      let tmp = p.new_local(None, sum.ty.clone());
      p.cfg.as_mut().unwrap().push_op(*cur, Op::Assign { dst: tmp, src: other });
      tmp
    }
  };
  Ok(Val { ty: element_ty, var: Var::Deref(addr_slot), place: Some(Place::Indirect(addr_slot)) })
}

fn member_access(p: &mut Parser<impl Lexer>, cur: &mut BlockId, base: Val, name: crate::symbol::Symbol, via_pointer: bool) -> PResult<Val> {
  let object_ty = if via_pointer {
    if !base.ty.is_pointer() { return Err(Error::NotAnObject) }
    base.ty.pointee().clone()
  } else {
    base.ty.clone()
  };
  if object_ty.kind != TypeKind::Object { return Err(Error::NotAnObject) }
  let (member_ty, offset) = {
    let members = object_ty.members();
    let m = members.iter().find(|m| m.name == name).ok_or(Error::NotAnObject)?;
    (m.ty.clone(), m.offset)
  };
  let base_addr = if via_pointer {
    match base.var {
      Var::Direct(v) => v,
      other => {
        let tmp = p.new_local(None, base.ty.clone());
        p.cfg.as_mut().unwrap().push_op(*cur, Op::Assign { dst: tmp, src: other });
        tmp
      }
    }
  } else {
    let Some(place) = base.place else { return Err(Error::NotAnLvalue) };
    match place {
      Place::Direct(v) => {
        let ptr_ty = p.types.pointer(base.ty.clone(), Quals::empty());
        let addr = p.new_local(None, ptr_ty);
        p.cfg.as_mut().unwrap().push_op(*cur, Op::Addr { dst: addr, of: v });
        addr
      }
      Place::Indirect(v) => v,
    }
  };
  let offset_ptr_ty = p.types.pointer(member_ty.clone(), Quals::empty());
  let field_addr = p.new_local(None, offset_ptr_ty.clone());
  p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp {
    dst: field_addr, op: BinOpKind::Add, lhs: Var::Direct(base_addr), rhs: Var::Immediate(i64::from(offset)),
  });
  Ok(Val { ty: member_ty, var: Var::Deref(field_addr), place: Some(Place::Indirect(field_addr)) })
}

fn parse_call(p: &mut Parser<impl Lexer>, cur: &mut BlockId, callee: Val) -> PResult<Val> {
  if !callee.ty.is_function() { return Err(Error::NotAFunction) }
  let ret_ty = callee.ty.pointee().clone();
  let mut nargs = 0u32;
  if p.peek().punct() != Some(Punct::RParen) {
    loop {
      let arg = parse_assignment(p, cur)?;
      p.cfg.as_mut().unwrap().push_op(*cur, Op::Param { src: arg.var });
      nargs += 1;
      if !p.eat(Punct::Comma) { break }
    }
  }
  p.consume(Punct::RParen, "')'")?;
  let dst = if ret_ty.kind == TypeKind::None { None } else { Some(p.new_local(None, ret_ty.clone())) };
  p.cfg.as_mut().unwrap().push_op(*cur, Op::Call { dst, func: callee.var, nargs });
  Ok(match dst {
    Some(v) => Val::rvalue(ret_ty, Var::Direct(v)),
    None => Val::rvalue(p.types.void(), Var::Immediate(0)),
  })
}

fn parse_primary(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<Val> {
  let tok = p.bump();
  match tok.kind {
    TokenKind::IntConst(n) => Ok(Val::rvalue(int_ty(p), Var::Immediate(n))),
    TokenKind::StringConst(label) => {
      let ty = p.types.pointer(p.types.integer(1, Quals::empty()), Quals::CONST);
      Ok(Val::rvalue(ty, Var::Immediate(i64::from(label.0))))
    }
    TokenKind::Ident(name) if p.interner.resolve(name) == "__func__" => {
      let func = p.cur_func.ok_or_else(|| Error::UndefinedSymbol("__func__".into()))?;
      let mut bytes = p.interner.resolve(func).as_bytes().to_vec();
      bytes.push(0);
      let label = p.lexer.strlabel(&bytes);
      let ty = p.types.pointer(p.types.integer(1, Quals::empty()), Quals::CONST);
      Ok(Val::rvalue(ty, Var::Immediate(i64::from(label.0))))
    }
    TokenKind::Ident(name) => {
      let entry = p.idents.lookup(name).cloned()
        .ok_or_else(|| Error::UndefinedSymbol(format!("#{}", name.into_usize())))?;
      if entry.kind == crate::symtab::SymKind::Enum {
        return Ok(Val::rvalue(entry.ty, Var::Immediate(entry.enum_value)));
      }
      // A block-scope binding's slot lives in the fragment currently being
      // parsed. A file-scope binding (external/internal linkage) was
      // declared in a *different* fragment's locals arena, possibly one
      // already finished and moved into a `Decl` — referencing it here
      // allocates a fresh local in this fragment that aliases it by name;
      // the back end resolves the alias via the symbol table, not the slot.
      let slot = match entry.linkage {
        crate::symtab::Linkage::None =>
          entry.slot.expect("block-scope binding always has a frame slot"),
        _ => p.new_local(Some(name), entry.ty.clone()),
      };
      Ok(Val { ty: entry.ty, var: Var::Direct(slot), place: Some(Place::Direct(slot)) })
    }
    TokenKind::Punct(Punct::LParen) => {
      let inner = parse_expression(p, cur)?;
      p.consume(Punct::RParen, "')'")?;
      Ok(inner)
    }
    _ => Err(Error::UnexpectedToken { expected: "an expression", found: format!("{tok:?}") }),
  }
}

/// Evaluates a constant expression to an `i64`, used for file-scope/`static`
/// initializers and enumerator values, both of which must fold at parse time
/// rather than emit IR. Returns `None` if `val` isn't a literal immediate —
/// this front end does not fold arbitrary constant subexpressions beyond
/// what [`binop`] already constant-folds while parsing.
#[must_use] pub fn fold_const_expr(val: &Val) -> Option<i64> {
  match val.var {
    Var::Immediate(n) => Some(n),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symtab::{Linkage, SymEntry, SymKind};
  use crate::token::{Span, Token, TokenKind, VecLexer};

  fn tok(kind: TokenKind) -> Token { Token { kind, span: Span::default() } }

  #[test]
  fn constant_arithmetic_folds_at_parse_time() {
    let mut lexer = VecLexer::new(vec![
      tok(TokenKind::IntConst(2)),
      tok(TokenKind::Punct(Punct::Plus)),
      tok(TokenKind::IntConst(3)),
    ]);
    let mut p = Parser::new(&mut lexer);
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    let val = parse_expression(&mut p, &mut cur).unwrap();
    assert_eq!(val.var, Var::Immediate(5));
  }

  #[test]
  fn undefined_identifier_is_an_error() {
    let name = crate::symbol::Interner::new().intern("undeclared");
    let mut lexer = VecLexer::new(vec![tok(TokenKind::Ident(name))]);
    let mut p = Parser::new(&mut lexer);
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    assert!(parse_expression(&mut p, &mut cur).is_err());
  }

  #[test]
  fn func_resolves_to_enclosing_function_name_as_a_string() {
    // Simulates being inside `int f(void) { ...__func__... }`: `cur_func` is
    // set the way `parse_function_definition` sets it before lowering the body.
    let mut interner = crate::symbol::Interner::new();
    let f = interner.intern("f");
    let func = interner.intern("__func__");
    let mut lexer = VecLexer::new(vec![tok(TokenKind::Ident(func))]);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    p.cur_func = Some(f);
    let val = parse_expression(&mut p, &mut cur).unwrap();
    assert!(val.ty.is_pointer());
    assert_eq!(val.var, Var::Immediate(0));
  }

  #[test]
  fn func_outside_a_function_body_is_an_error() {
    let mut interner = crate::symbol::Interner::new();
    let func = interner.intern("__func__");
    let mut lexer = VecLexer::new(vec![tok(TokenKind::Ident(func))]);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    assert!(parse_expression(&mut p, &mut cur).is_err());
  }

  #[test]
  fn sizeof_of_a_function_is_an_error() {
    let mut interner = crate::symbol::Interner::new();
    let f = interner.intern("f");
    let mut lexer = VecLexer::new(vec![
      tok(TokenKind::Keyword(Keyword::Sizeof)),
      tok(TokenKind::Ident(f)),
    ]);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    let ret = p.types.integer(4, Quals::empty());
    let fn_ty = p.types.function(ret, false);
    p.idents.insert(f, SymEntry {
      name: f, ty: fn_ty, kind: SymKind::Declaration,
      linkage: Linkage::External, depth: 0, enum_value: 0, slot: None,
    });
    assert!(matches!(parse_expression(&mut p, &mut cur), Err(Error::SizeofIncomplete)));
  }

  #[test]
  fn assignment_to_declared_variable_emits_assign_op() {
    // Intern the name and pre-populate the binding before the tokens that
    // reference it exist, the way a real parse would declare `x` first.
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let mut lexer = VecLexer::new(vec![
      tok(TokenKind::Ident(x)),
      tok(TokenKind::Punct(Punct::Assign)),
      tok(TokenKind::IntConst(7)),
    ]);
    let mut p = Parser::new(&mut lexer);
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    let slot = p.new_local(Some(x), p.types.integer(4, Quals::empty()));
    p.idents.insert(x, SymEntry {
      name: x, ty: p.types.integer(4, Quals::empty()), kind: SymKind::Definition,
      linkage: Linkage::None, depth: 1, enum_value: 0, slot: Some(slot),
    });
    let val = parse_expression(&mut p, &mut cur).unwrap();
    assert_eq!(val.var, Var::Immediate(7));
    assert_eq!(p.cfg.as_ref().unwrap()[cur].ops.len(), 1);
  }

  #[test]
  fn comparison_of_doubles_is_still_int_typed() {
    // 1.0 == 2.0 folds at parse time (fold_binop only handles i64 payloads,
    // but the doubles here are both non-immediate locals, so this exercises
    // the emitted-Op::BinOp branch, not the constant-fold one).
    let mut interner = crate::symbol::Interner::new();
    let a = interner.intern("a");
    let b = interner.intern("b");
    let mut lexer = VecLexer::new(vec![
      tok(TokenKind::Ident(a)),
      tok(TokenKind::Punct(Punct::Eq)),
      tok(TokenKind::Ident(b)),
    ]);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    let double = p.types.real(8);
    let a_slot = p.new_local(Some(a), double.clone());
    let b_slot = p.new_local(Some(b), double.clone());
    p.idents.insert(a, SymEntry { name: a, ty: double.clone(), kind: SymKind::Definition, linkage: Linkage::None, depth: 1, enum_value: 0, slot: Some(a_slot) });
    p.idents.insert(b, SymEntry { name: b, ty: double, kind: SymKind::Definition, linkage: Linkage::None, depth: 1, enum_value: 0, slot: Some(b_slot) });
    let val = parse_expression(&mut p, &mut cur).unwrap();
    assert_eq!(val.ty.kind, TypeKind::Integer);
    assert_eq!(val.ty.size(), 4);
  }

  #[test]
  fn constant_folded_comparison_is_still_int_typed() {
    // 10 > 3 folds at parse time; the result must not inherit whatever wider
    // type `common_type` would have picked for a non-comparison fold.
    let mut lexer = VecLexer::new(vec![
      tok(TokenKind::IntConst(10)),
      tok(TokenKind::Punct(Punct::Gt)),
      tok(TokenKind::IntConst(3)),
    ]);
    let mut p = Parser::new(&mut lexer);
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    let val = parse_expression(&mut p, &mut cur).unwrap();
    assert_eq!(val.var, Var::Immediate(1));
    assert_eq!(val.ty.kind, TypeKind::Integer);
    assert_eq!(val.ty.size(), 4);
  }

  #[test]
  fn pointer_comparison_is_int_typed_not_pointer_typed() {
    // p == q: both operands are pointers, so `binop` routes through
    // `pointer_arith`; the comparison arm there must still yield `int`.
    let mut interner = crate::symbol::Interner::new();
    let p_name = interner.intern("p");
    let q_name = interner.intern("q");
    let mut lexer = VecLexer::new(vec![
      tok(TokenKind::Ident(p_name)),
      tok(TokenKind::Punct(Punct::Eq)),
      tok(TokenKind::Ident(q_name)),
    ]);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    let ptr_ty = p.types.pointer(p.types.integer(4, Quals::empty()), Quals::empty());
    let p_slot = p.new_local(Some(p_name), ptr_ty.clone());
    let q_slot = p.new_local(Some(q_name), ptr_ty.clone());
    p.idents.insert(p_name, SymEntry { name: p_name, ty: ptr_ty.clone(), kind: SymKind::Definition, linkage: Linkage::None, depth: 1, enum_value: 0, slot: Some(p_slot) });
    p.idents.insert(q_name, SymEntry { name: q_name, ty: ptr_ty, kind: SymKind::Definition, linkage: Linkage::None, depth: 1, enum_value: 0, slot: Some(q_slot) });
    let val = parse_expression(&mut p, &mut cur).unwrap();
    assert_eq!(val.ty.kind, TypeKind::Integer);
    assert!(matches!(p.cfg.as_ref().unwrap()[cur].ops.last(), Some(Op::BinOp { op: BinOpKind::Eq, .. })));
  }

  #[test]
  fn multiplying_a_pointer_is_rejected_distinctly_from_a_bad_cast() {
    // p * 2 has no meaning in C; this must not be reported as a bad cast,
    // since no cast is involved.
    let mut interner = crate::symbol::Interner::new();
    let p_name = interner.intern("p");
    let mut lexer = VecLexer::new(vec![
      tok(TokenKind::Ident(p_name)),
      tok(TokenKind::Punct(Punct::Star)),
      tok(TokenKind::IntConst(2)),
    ]);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    p.cfg = Some(crate::types::mir::Cfg::new());
    let mut cur = p.new_block();
    let ptr_ty = p.types.pointer(p.types.integer(4, Quals::empty()), Quals::empty());
    let p_slot = p.new_local(Some(p_name), ptr_ty.clone());
    p.idents.insert(p_name, SymEntry { name: p_name, ty: ptr_ty.clone(), kind: SymKind::Definition, linkage: Linkage::None, depth: 1, enum_value: 0, slot: Some(p_slot) });
    assert!(matches!(parse_expression(&mut p, &mut cur), Err(Error::InvalidPointerOperand)));
  }
}

//! Declaration parsing: specifiers, declarators (via a shape-then-materialize
//! composition that mirrors C's inside-out reading rule), struct/union/enum
//! bodies, and initializers.
//!
//! The overall split between "collect specifiers" and "walk a declarator"
//! is generalized here to the full C declarator grammar.

use if_chain::if_chain;
use itertools::Itertools;

use crate::error::{Error, PResult};
use crate::expr::{convert_to, fold_const_expr, parse_expression, Place};
use crate::parser::Parser;
use crate::symbol::Symbol;
use crate::symtab::{Linkage, SymEntry, SymKind};
use crate::token::{Keyword, Lexer, Punct, Span, Token, TokenKind};
use crate::types::mir::{BinOpKind, BlockId, Op, Var};
use crate::types::{Quals, Ty, TypeKind, TypeRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageClass {
  None,
  Auto,
  Register,
  Static,
  Extern,
  Typedef,
}

/// The specifiers common to every declarator in one declaration: the base
/// type they all start from, and the (at most one) storage class.
#[derive(Clone, Debug)]
pub struct DeclSpec {
  pub ty: Ty,
  pub storage: StorageClass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
  Struct,
  Union,
  Enum,
}

/// A `struct`/`union`/`enum` tag's binding: its own namespace, separate from
/// ordinary identifiers. `body_seen` distinguishes a forward declaration
/// (`struct S;`) from a completed one, so a second `{ ... }` for the same tag
/// is caught as a redefinition rather than silently re-laying it out.
#[derive(Clone, Debug)]
pub struct TagEntry {
  pub name: Symbol,
  pub kind: TagKind,
  pub ty: Ty,
  pub body_seen: bool,
}

/// One parameter in a function declarator: its type and, if given, its name.
/// Prototypes may omit names; a function *definition*'s declarator must
/// supply one for every parameter (checked by the caller in `driver`, which
/// is also where the name is bound to a frame slot).
#[derive(Clone, Debug)]
pub struct Param {
  pub ty: Ty,
  pub name: Option<Symbol>,
}

/// Parses the specifier sequence at the head of a declaration: storage class,
/// type qualifiers, and the base type (a builtin combination, a tag
/// reference/definition, or a typedef name). Returns `Ok(None)` without
/// consuming anything if the next token doesn't start one, so callers can
/// tell "no declaration here" from "malformed declaration".
pub fn declaration_specifiers(p: &mut Parser<impl Lexer>) -> PResult<Option<DeclSpec>> {
  let mut any = false;
  let mut storage: Option<StorageClass> = None;
  let mut quals = Quals::empty();
  let mut seen_void = false;
  let mut seen_char = false;
  let mut seen_short = false;
  let mut seen_int = false;
  let mut seen_long = false;
  let mut seen_float = false;
  let mut seen_double = false;
  let mut seen_signed = false;
  let mut seen_unsigned = false;
  let mut tag_ty: Option<Ty> = None;
  let mut typedef_ty: Option<Ty> = None;

  loop {
    let tok = p.peek();
    match tok.kind {
      TokenKind::Keyword(k @ (Keyword::Auto | Keyword::Register | Keyword::Static | Keyword::Extern | Keyword::Typedef)) => {
        any = true;
        let sc = match k {
          Keyword::Auto => StorageClass::Auto,
          Keyword::Register => StorageClass::Register,
          Keyword::Static => StorageClass::Static,
          Keyword::Extern => StorageClass::Extern,
          Keyword::Typedef => StorageClass::Typedef,
          _ => unreachable!(),
        };
        if storage.is_some() { return Err(Error::ConflictingStorageClass) }
        storage = Some(sc);
        p.bump();
      }
      TokenKind::Keyword(Keyword::Const) => { any = true; quals |= Quals::CONST; p.bump(); }
      TokenKind::Keyword(Keyword::Volatile) => { any = true; quals |= Quals::VOLATILE; p.bump(); }
      TokenKind::Keyword(Keyword::Void) => { any = true; seen_void = true; p.bump(); }
      TokenKind::Keyword(Keyword::Char) => { any = true; seen_char = true; p.bump(); }
      TokenKind::Keyword(Keyword::Short) => { any = true; seen_short = true; p.bump(); }
      TokenKind::Keyword(Keyword::Int) => { any = true; seen_int = true; p.bump(); }
      TokenKind::Keyword(Keyword::Long) => { any = true; seen_long = true; p.bump(); }
      TokenKind::Keyword(Keyword::Float) => { any = true; seen_float = true; p.bump(); }
      TokenKind::Keyword(Keyword::Double) => { any = true; seen_double = true; p.bump(); }
      TokenKind::Keyword(Keyword::Signed) => { any = true; seen_signed = true; p.bump(); }
      TokenKind::Keyword(Keyword::Unsigned) => { any = true; seen_unsigned = true; p.bump(); }
      TokenKind::Keyword(Keyword::Struct | Keyword::Union) => {
        any = true;
        let is_union = tok.kind == TokenKind::Keyword(Keyword::Union);
        p.bump();
        let name = p.peek().ident();
        if name.is_some() { p.bump(); }
        let has_body = p.peek().punct() == Some(Punct::LBrace);
        let kind = if is_union { TagKind::Union } else { TagKind::Struct };
        let ty = resolve_or_declare_tag(p, name, kind, has_body)?;
        if has_body {
          p.bump();
          parse_struct_body(p, &ty)?;
          p.consume(Punct::RBrace, "'}'")?;
          if is_union { p.types.align_union_members(&ty) } else { p.types.align_struct_members(&ty) }
          mark_body_seen(p, name);
        }
        tag_ty = Some(ty);
      }
      TokenKind::Keyword(Keyword::Enum) => {
        any = true;
        p.bump();
        let name = p.peek().ident();
        if name.is_some() { p.bump(); }
        let has_body = p.peek().punct() == Some(Punct::LBrace);
        let ty = resolve_or_declare_tag(p, name, TagKind::Enum, has_body)?;
        if has_body {
          p.bump();
          parse_enum_body(p, &ty)?;
          p.consume(Punct::RBrace, "'}'")?;
          mark_body_seen(p, name);
        }
        tag_ty = Some(ty);
      }
      TokenKind::Ident(name) => {
        if_chain! {
          if tag_ty.is_none();
          if typedef_ty.is_none();
          if !(seen_void || seen_char || seen_short || seen_int || seen_long || seen_float || seen_double || seen_signed || seen_unsigned);
          if let Some(entry) = p.idents.lookup(name);
          if entry.kind == SymKind::Typedef;
          then {
            any = true;
            typedef_ty = Some(entry.ty.clone());
            p.bump();
          } else {
            break;
          }
        }
      }
      _ => break,
    }
  }

  if !any { return Ok(None) }

  let base_ty = if let Some(t) = tag_ty {
    t
  } else if let Some(t) = typedef_ty {
    t
  } else if seen_void {
    p.types.void()
  } else if seen_float {
    p.types.real(4)
  } else if seen_double {
    p.types.real(8)
  } else {
    let size = if seen_char { 1 } else if seen_short { 2 } else if seen_long { 8 } else { 4 };
    let q = if seen_unsigned { quals | Quals::UNSIGNED } else { quals };
    p.types.integer(size, q)
  };

  Ok(Some(DeclSpec { ty: base_ty, storage: storage.unwrap_or(StorageClass::None) }))
}

/// Looks up a tag by name, or declares a fresh (incomplete, for struct/union;
/// `int`-typed, for enum) one. A reference with no body searches enclosing
/// scopes too (it may name an outer tag); a definition only ever looks in —
/// and inserts into — the current scope, so a nested `struct S { ... }`
/// shadows an outer `S` rather than completing it.
fn resolve_or_declare_tag(p: &mut Parser<impl Lexer>, name: Option<Symbol>, kind: TagKind, has_body: bool) -> PResult<Ty> {
  let Some(n) = name else {
    return Ok(match kind { TagKind::Enum => p.types.integer(4, Quals::empty()), _ => p.types.incomplete_object() });
  };
  let existing = if has_body { p.tags.lookup_current(n).cloned() } else { p.tags.lookup(n).cloned() };
  if let Some(entry) = existing {
    if entry.kind != kind { return Err(Error::TagKindMismatch(format!("#{}", n.into_usize()))) }
    if has_body && entry.body_seen { return Err(Error::TagKindMismatch(format!("#{}", n.into_usize()))) }
    return Ok(entry.ty);
  }
  let ty = match kind { TagKind::Enum => p.types.integer(4, Quals::empty()), _ => p.types.incomplete_object() };
  p.tags.insert(n, TagEntry { name: n, kind, ty: ty.clone(), body_seen: false });
  Ok(ty)
}

fn mark_body_seen(p: &mut Parser<impl Lexer>, name: Option<Symbol>) {
  let Some(n) = name else { return };
  if let Some(entry) = p.tags.lookup_current(n).cloned() {
    p.tags.insert(n, TagEntry { body_seen: true, ..entry });
  }
}

fn expect_ident(p: &mut Parser<impl Lexer>) -> PResult<Symbol> {
  let tok = p.bump();
  tok.ident().ok_or_else(|| Error::UnexpectedToken { expected: "an identifier", found: format!("{:?}", tok.kind) })
}

fn parse_struct_body(p: &mut Parser<impl Lexer>, ty: &Ty) -> PResult<()> {
  while p.peek().punct() != Some(Punct::RBrace) {
    let spec = declaration_specifiers(p)?
      .ok_or_else(|| Error::InvalidMemberDeclarator("expected a member type".into()))?;
    loop {
      let (member_ty, name) = declarator(p, spec.ty.clone())?;
      let name = name.ok_or_else(|| Error::InvalidMemberDeclarator("member has no name".into()))?;
      p.types.add_member(ty, name, member_ty);
      if !p.eat(Punct::Comma) { break }
    }
    p.consume(Punct::Semi, "';'")?;
  }
  reject_duplicate_member_names(p, ty)
}

/// Struct/union members share one namespace within the body; a name reused
/// across two members is a fatal declarator error, caught here (rather than
/// as each member is added) so the whole body's declarator list has been
/// read before reporting which name collided.
fn reject_duplicate_member_names(p: &Parser<impl Lexer>, ty: &Ty) -> PResult<()> {
  let members = ty.members();
  if let Some(dup) = members.iter().map(|m| m.name).duplicates().next() {
    return Err(Error::InvalidMemberDeclarator(format!("duplicate member '{}'", p.interner.resolve(dup))));
  }
  Ok(())
}

/// Enumerators default to one more than the previous (zero for the first);
/// an explicit `= expr` overrides, and must fold to a constant — a
/// non-constant override is reported as a recoverable warning and treated
/// as zero, per the "enum values always end up typed `int`" invariant.
fn parse_enum_body(p: &mut Parser<impl Lexer>, ty: &Ty) -> PResult<()> {
  let mut next_value: i64 = 0;
  loop {
    if p.peek().punct() == Some(Punct::RBrace) { break }
    let name = expect_ident(p)?;
    let value = if p.eat(Punct::Assign) {
      let mut scratch = p.new_block();
      let val = parse_expression(p, &mut scratch)?;
      match fold_const_expr(&val) {
        Some(n) => n,
        None => {
          p.warn(Span::default(), Error::NonIntegerEnumInitializer);
          next_value
        }
      }
    } else {
      next_value
    };
    next_value = value + 1;
    let depth = p.idents.depth();
    let entry = SymEntry { name, ty: ty.clone(), kind: SymKind::Enum, linkage: Linkage::None, depth, enum_value: value, slot: None };
    let merged = p.idents.merge(entry)?;
    p.idents.insert(name, merged);
    if !p.eat(Punct::Comma) { break }
  }
  Ok(())
}

/// One step of a declarator, inside-out: the run of `*`s read so far (each
/// with its own qualifiers), the core (a name, or a parenthesized inner
/// declarator), and the array/function suffixes that bind *tighter* than the
/// stars — `*a[3]` is a pointer to an array, `(*a)[3]` is an array of
/// pointers, and the parens are exactly what flips which applies.
struct Shape {
  stars: Vec<Quals>,
  core: Core,
  suffixes: Vec<Suffix>,
}

enum Core {
  Name(Option<Symbol>),
  Nested(Box<Shape>),
}

enum Suffix {
  Array(Option<u32>),
  Function(Vec<Param>, bool),
}

/// Parses a declarator's shape without yet knowing the base type it modifies
/// — the base is only available at the point a complete declaration's
/// specifiers have been read, but a declarator's `*`s/suffixes/nesting can be
/// walked independently of it.
fn parse_declarator_shape(p: &mut Parser<impl Lexer>) -> PResult<Shape> {
  let mut stars = vec![];
  while p.eat(Punct::Star) {
    let mut q = Quals::empty();
    loop {
      match p.peek().kind {
        TokenKind::Keyword(Keyword::Const) => { q |= Quals::CONST; p.bump(); }
        TokenKind::Keyword(Keyword::Volatile) => { q |= Quals::VOLATILE; p.bump(); }
        _ => break,
      }
    }
    stars.push(q);
  }

  // `(` after the stars is ambiguous: `(*f)(int)` nests a declarator, but
  // `int f(int)` and a bare `()` parameter list do not. One more token of
  // lookahead past the `(` resolves it: a type name or `)` means a
  // parameter list, anything else means a nested declarator.
  let nested = p.peek().punct() == Some(Punct::LParen) && {
    let after = p.peekn(2);
    !(after.punct() == Some(Punct::RParen) || starts_type_name(p, &after))
  };
  let core = if nested {
    p.bump();
    let inner = parse_declarator_shape(p)?;
    p.consume(Punct::RParen, "')'")?;
    Core::Nested(Box::new(inner))
  } else if let Some(name) = p.peek().ident() {
    p.bump();
    Core::Name(Some(name))
  } else {
    Core::Name(None)
  };

  let suffixes = parse_suffixes(p)?;
  Ok(Shape { stars, core, suffixes })
}

fn parse_suffixes(p: &mut Parser<impl Lexer>) -> PResult<Vec<Suffix>> {
  let mut out = vec![];
  loop {
    if p.eat(Punct::LBracket) {
      let len = if p.peek().punct() == Some(Punct::RBracket) {
        None
      } else {
        let mut scratch = p.new_block();
        let val = parse_expression(p, &mut scratch)?;
        let n = fold_const_expr(&val).ok_or(Error::NonPositiveArrayDimension)?;
        if n <= 0 { return Err(Error::NonPositiveArrayDimension) }
        Some(u32::try_from(n).map_err(|_| Error::NonPositiveArrayDimension)?)
      };
      p.consume(Punct::RBracket, "']'")?;
      if len.is_none() && !out.is_empty() { return Err(Error::IncompleteArrayElement) }
      out.push(Suffix::Array(len));
    } else if p.eat(Punct::LParen) {
      let (params, vararg) = parse_param_list(p)?;
      p.consume(Punct::RParen, "')'")?;
      out.push(Suffix::Function(params, vararg));
    } else {
      break;
    }
  }
  Ok(out)
}

fn parse_param_list(p: &mut Parser<impl Lexer>) -> PResult<(Vec<Param>, bool)> {
  let mut params = vec![];
  if p.peek().punct() == Some(Punct::RParen) { return Ok((params, false)) }
  if p.peek().kind == TokenKind::Keyword(Keyword::Void) && p.peekn(2).punct() == Some(Punct::RParen) {
    p.bump();
    return Ok((params, false));
  }
  loop {
    if p.eat(Punct::Ellipsis) { return Ok((params, true)) }
    let spec = declaration_specifiers(p)?
      .ok_or_else(|| Error::UnexpectedToken { expected: "a parameter type", found: format!("{:?}", p.peek().kind) })?;
    let (mut ty, name) = declarator(p, spec.ty)?;
    if ty.kind == TypeKind::Array {
      let elem = ty.pointee().clone();
      ty = p.types.pointer(elem, ty.quals);
    } else if ty.kind == TypeKind::Function {
      ty = p.types.pointer(ty, Quals::empty());
    }
    params.push(Param { ty, name });
    if !p.eat(Punct::Comma) { break }
  }
  Ok((params, false))
}

fn apply_stars(base: Ty, stars: &[Quals], types: &TypeRegistry) -> Ty {
  stars.iter().fold(base, |t, &q| types.pointer(t, q))
}

fn apply_suffixes(base: Ty, suffixes: &[Suffix], p: &mut Parser<impl Lexer>) -> PResult<Ty> {
  let mut t = base;
  for s in suffixes.iter().rev() {
    t = match s {
      Suffix::Array(len) => {
        if !t.is_complete() { return Err(Error::IncompleteArrayElement) }
        p.types.array(t, len.unwrap_or(0))
      }
      Suffix::Function(params, vararg) => {
        let f = p.types.function(t, *vararg);
        for param in params {
          let name = param.name.unwrap_or_else(|| p.interner.intern(""));
          p.types.add_member(&f, name, param.ty.clone());
        }
        f
      }
    };
  }
  Ok(t)
}

fn materialize(shape: &Shape, base: Ty, p: &mut Parser<impl Lexer>) -> PResult<(Ty, Option<Symbol>)> {
  let t = apply_stars(base, &shape.stars, &p.types);
  let t = apply_suffixes(t, &shape.suffixes, p)?;
  match &shape.core {
    Core::Name(name) => Ok((t, *name)),
    Core::Nested(inner) => materialize(inner, t, p),
  }
}

/// Walks one declarator, applying it to `base` (the type the declaration
/// specifiers produced) to get the declared type, plus the name it declares
/// if any (absent for an abstract declarator, as in a cast or `sizeof`).
pub fn declarator(p: &mut Parser<impl Lexer>, base: Ty) -> PResult<(Ty, Option<Symbol>)> {
  let shape = parse_declarator_shape(p)?;
  materialize(&shape, base, p)
}

/// Parses a type name with no declared identifier — a cast target or a
/// `sizeof(...)` operand.
pub fn parse_type_name(p: &mut Parser<impl Lexer>) -> PResult<Ty> {
  let spec = declaration_specifiers(p)?
    .ok_or_else(|| Error::UnexpectedToken { expected: "a type name", found: format!("{:?}", p.peek().kind) })?;
  let shape = parse_declarator_shape(p)?;
  let (ty, _) = materialize(&shape, spec.ty, p)?;
  Ok(ty)
}

/// Whether `tok` could begin a `declaration_specifiers` — used by
/// [`crate::expr`] to tell a cast from a parenthesized expression, and by
/// this module's own `(` nested-declarator-vs-parameter-list check.
#[must_use] pub fn starts_type_name(p: &Parser<impl Lexer>, tok: &Token) -> bool {
  match &tok.kind {
    TokenKind::Keyword(k) => matches!(
      k,
      Keyword::Void | Keyword::Char | Keyword::Short | Keyword::Int | Keyword::Long
        | Keyword::Float | Keyword::Double | Keyword::Signed | Keyword::Unsigned
        | Keyword::Struct | Keyword::Union | Keyword::Enum
        | Keyword::Const | Keyword::Volatile
    ),
    TokenKind::Ident(name) => p.idents.lookup(*name).is_some_and(|e| e.kind == SymKind::Typedef),
    _ => false,
  }
}

fn offset_place(p: &mut Parser<impl Lexer>, cur: &mut BlockId, base: &Place, base_ty: &Ty, elem_ty: &Ty, offset: u32) -> Place {
  let base_addr = match *base {
    Place::Indirect(v) => v,
    Place::Direct(v) => {
      let ptr_ty = p.types.pointer(base_ty.clone(), Quals::empty());
      let addr = p.new_local(None, ptr_ty);
      p.cfg.as_mut().unwrap().push_op(*cur, Op::Addr { dst: addr, of: v });
      addr
    }
  };
  let field_ptr_ty = p.types.pointer(elem_ty.clone(), Quals::empty());
  let field_addr = p.new_local(None, field_ptr_ty);
  p.cfg.as_mut().unwrap().push_op(*cur, Op::BinOp {
    dst: field_addr, op: BinOpKind::Add, lhs: Var::Direct(base_addr), rhs: Var::Immediate(i64::from(offset)),
  });
  Place::Indirect(field_addr)
}

fn store(p: &mut Parser<impl Lexer>, cur: &mut BlockId, place: &Place, src: Var) {
  match *place {
    Place::Direct(v) => p.cfg.as_mut().unwrap().push_op(*cur, Op::Assign { dst: v, src }),
    Place::Indirect(v) => p.cfg.as_mut().unwrap().push_op(*cur, Op::Store { ptr: v, src }),
  }
}

/// Parses one initializer — a single assignment-expression for a scalar
/// target, or a recursive `{ ... }` list for an array/struct target — and
/// emits the IR that writes it through `place`. `must_be_const` enforces the
/// file-scope/`static` rule that every initializer value fold to an
/// `Immediate`; violating it is fatal, not a warning, since the back end has
/// nowhere to put a non-constant file-scope store.
fn parse_initializer(p: &mut Parser<impl Lexer>, cur: &mut BlockId, place: Place, ty: &Ty, must_be_const: bool) -> PResult<()> {
  if ty.is_aggregate() && p.peek().punct() == Some(Punct::LBrace) {
    p.bump();
    match ty.kind {
      TypeKind::Array => {
        let elem_ty = ty.pointee().clone();
        let elem_size = elem_ty.size().max(1);
        let declared_len = ty.size() / elem_size;
        let mut count: u32 = 0;
        while p.peek().punct() != Some(Punct::RBrace) {
          let elem_place = offset_place(p, cur, &place, ty, &elem_ty, count * elem_size);
          parse_initializer(p, cur, elem_place, &elem_ty, must_be_const)?;
          count += 1;
          if !p.eat(Punct::Comma) { break }
        }
        p.consume(Punct::RBrace, "'}'")?;
        if ty.size() == 0 {
          p.types.complete_array(ty, count);
        } else if count < declared_len {
          p.warn(Span::default(), Error::UnderspecifiedArrayInitializer);
        }
      }
      TypeKind::Object => {
        let members: Vec<_> = (*ty.members()).clone();
        let mut it = members.into_iter();
        while p.peek().punct() != Some(Punct::RBrace) {
          let Some(m) = it.next() else { break };
          let member_place = offset_place(p, cur, &place, ty, &m.ty, m.offset);
          parse_initializer(p, cur, member_place, &m.ty, must_be_const)?;
          if !p.eat(Punct::Comma) { break }
        }
        p.consume(Punct::RBrace, "'}'")?;
      }
      _ => unreachable!("is_aggregate() only returns true for Array/Object"),
    }
    return Ok(());
  }
  let val = parse_expression(p, cur)?;
  let converted = convert_to(p, cur, val, ty)?;
  if must_be_const && !matches!(converted.var, Var::Immediate(_)) {
    return Err(Error::NonConstantFileScopeInitializer);
  }
  store(p, cur, &place, converted.var);
  Ok(())
}

/// Entry point for a freshly-declared variable's initializer (the `= ...`
/// following a declarator).
pub fn parse_initializer_for(p: &mut Parser<impl Lexer>, cur: &mut BlockId, slot: crate::types::mir::VarId, ty: &Ty, must_be_const: bool) -> PResult<()> {
  parse_initializer(p, cur, Place::Direct(slot), ty, must_be_const)
}

/// Registers one declarator from a non-typedef declaration and, if followed
/// by `=`, parses and emits its initializer. `depth` is the identifier
/// namespace's current scope depth (0 = file scope); `head` is the fragment's
/// prologue block, where file-scope and `static` initializers are emitted
/// regardless of which block `cur` is lexically at.
pub fn declare_one(
  p: &mut Parser<impl Lexer>,
  spec: &DeclSpec,
  ty: Ty,
  name: Option<Symbol>,
  depth: u32,
  cur: &mut BlockId,
  head: BlockId,
) -> PResult<()> {
  let name = name.ok_or_else(|| Error::InvalidMemberDeclarator("declarator has no name".into()))?;
  let has_initializer = p.peek().punct() == Some(Punct::Assign);
  if spec.storage == StorageClass::Extern && has_initializer {
    return Err(Error::ExternWithInitializer(format!("#{}", name.into_usize())));
  }

  let is_block_static = depth != 0 && spec.storage == StorageClass::Static;
  let is_block_extern = depth != 0 && spec.storage == StorageClass::Extern;
  let is_auto = depth != 0 && !is_block_static && !is_block_extern;

  let (linkage, kind) = if depth == 0 {
    let linkage = if spec.storage == StorageClass::Static { Linkage::Internal } else { Linkage::External };
    let kind = if has_initializer {
      SymKind::Definition
    } else if spec.storage == StorageClass::Extern || ty.kind == TypeKind::Function {
      // A bodiless function declarator is a prototype, never a tentative
      // definition — only objects get the "defined if nothing else shows up
      // by end of input" treatment.
      SymKind::Declaration
    } else {
      SymKind::Tentative
    };
    (linkage, kind)
  } else if is_block_extern {
    (Linkage::External, SymKind::Declaration)
  } else if is_block_static {
    (Linkage::Internal, SymKind::Definition)
  } else {
    (Linkage::None, SymKind::Definition)
  };

  let slot = if is_auto { Some(p.new_local(Some(name), ty.clone())) } else { None };
  let entry = SymEntry { name, ty: ty.clone(), kind, linkage, depth, enum_value: 0, slot };
  let merged = p.idents.merge(entry)?;
  p.idents.insert(name, merged);

  if has_initializer {
    p.bump();
    if is_auto {
      parse_initializer_for(p, cur, slot.expect("auto local always has a frame slot"), &ty, false)?;
    } else {
      let write_slot = p.new_local(Some(name), ty.clone());
      let mut h = head;
      parse_initializer_for(p, &mut h, write_slot, &ty, true)?;
    }
  } else if is_block_static {
    let write_slot = p.new_local(Some(name), ty.clone());
    p.cfg.as_mut().unwrap().push_op(head, Op::Assign { dst: write_slot, src: Var::Immediate(0) });
  }

  Ok(())
}

/// Parses the comma-separated declarator list following `declaration_specifiers`
/// through the terminating `;`, for a non-typedef declaration.
pub fn parse_init_declarator_list(
  p: &mut Parser<impl Lexer>,
  spec: &DeclSpec,
  first: (Ty, Option<Symbol>),
  depth: u32,
  cur: &mut BlockId,
  head: BlockId,
) -> PResult<()> {
  let (ty, name) = first;
  declare_one(p, spec, ty, name, depth, cur, head)?;
  while p.eat(Punct::Comma) {
    let next = declarator(p, spec.ty.clone())?;
    declare_one(p, spec, next.0, next.1, depth, cur, head)?;
  }
  p.consume(Punct::Semi, "';'")?;
  Ok(())
}

/// Binds each name in a `typedef` declaration's declarator list as a
/// [`SymKind::Typedef`] — no storage, no initializer, just a type alias.
pub fn parse_typedef_list(p: &mut Parser<impl Lexer>, spec: &DeclSpec, first: (Ty, Option<Symbol>), depth: u32) -> PResult<()> {
  let mut next = first;
  loop {
    let (ty, name) = next;
    let name = name.ok_or_else(|| Error::InvalidMemberDeclarator("typedef has no name".into()))?;
    let entry = SymEntry { name, ty, kind: SymKind::Typedef, linkage: Linkage::None, depth, enum_value: 0, slot: None };
    let merged = p.idents.merge(entry)?;
    p.idents.insert(name, merged);
    if !p.eat(Punct::Comma) { break }
    next = declarator(p, spec.ty.clone())?;
  }
  p.consume(Punct::Semi, "';'")?;
  Ok(())
}

/// Parses one block-scope declaration (specifiers through `;`), if the next
/// tokens start one. Returns `false`, consuming nothing, if they don't — the
/// caller (`crate::stmt`) then falls back to statement parsing. File-scope
/// declarations (which also need function-definition detection) are driven
/// directly by `crate::driver` via the lower-level exports above instead.
pub fn parse_declaration(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<bool> {
  let Some(spec) = declaration_specifiers(p)? else { return Ok(false) };
  let depth = p.idents.depth();
  if spec.storage == StorageClass::Typedef {
    let first = declarator(p, spec.ty.clone())?;
    parse_typedef_list(p, &spec, first, depth)?;
    return Ok(true);
  }
  if p.eat(Punct::Semi) {
    return Ok(true);
  }
  let first = declarator(p, spec.ty.clone())?;
  parse_init_declarator_list(p, &spec, first, depth, cur, head)?;
  Ok(true)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::token::{Span, TokenKind, VecLexer};

  fn kw(k: Keyword) -> Token { Token { kind: TokenKind::Keyword(k), span: Span::default() } }
  fn punct(p: Punct) -> Token { Token { kind: TokenKind::Punct(p), span: Span::default() } }
  fn int(n: i64) -> Token { Token { kind: TokenKind::IntConst(n), span: Span::default() } }

  #[test]
  fn plain_int_declarator_has_no_stars_or_suffixes() {
    // `x` as the declarator following `int`.
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let mut lexer = VecLexer::new(vec![Token { kind: TokenKind::Ident(x), span: Span::default() }]);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    let base = p.types.integer(4, Quals::empty());
    let (ty, name) = declarator(&mut p, base).unwrap();
    assert_eq!(name, Some(x));
    assert_eq!(ty.kind, TypeKind::Integer);
  }

  #[test]
  fn pointer_to_array_vs_array_of_pointer() {
    // `*a[3]`: pointer to array of 3 ints.
    let mut lexer = VecLexer::new(vec![]);
    let mut p = Parser::new(&mut lexer);
    let a = p.intern("a");
    let mut toks = vec![
      punct(Punct::Star),
      Token { kind: TokenKind::Ident(a), span: Span::default() },
      punct(Punct::LBracket),
      int(3),
      punct(Punct::RBracket),
    ];
    let mut lexer = VecLexer::new(std::mem::take(&mut toks));
    let mut p = Parser::new(&mut lexer);
    p.cfg = Some(crate::types::mir::Cfg::new());
    let base = p.types.integer(4, Quals::empty());
    let (ty, name) = declarator(&mut p, base).unwrap();
    assert_eq!(name, Some(a));
    assert!(ty.is_pointer());
    assert_eq!(ty.pointee().kind, TypeKind::Array);
  }

  #[test]
  fn pointer_to_function_returning_int() {
    // `(*f)(int)`.
    let mut lexer = VecLexer::new(vec![]);
    let mut p = Parser::new(&mut lexer);
    let f = p.intern("f");
    let toks = vec![
      punct(Punct::LParen),
      punct(Punct::Star),
      Token { kind: TokenKind::Ident(f), span: Span::default() },
      punct(Punct::RParen),
      punct(Punct::LParen),
      kw(Keyword::Int),
      punct(Punct::RParen),
    ];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.cfg = Some(crate::types::mir::Cfg::new());
    let base = p.types.integer(4, Quals::empty());
    let (ty, name) = declarator(&mut p, base).unwrap();
    assert_eq!(name, Some(f));
    assert!(ty.is_pointer());
    assert!(ty.pointee().is_function());
  }

  #[test]
  fn enum_default_values_start_at_zero_and_increment() {
    let mut lexer = VecLexer::new(vec![]);
    let mut p = Parser::new(&mut lexer);
    let a = p.intern("A");
    let b = p.intern("B");
    let c = p.intern("C");
    let toks = vec![
      kw(Keyword::Enum),
      punct(Punct::LBrace),
      Token { kind: TokenKind::Ident(a), span: Span::default() },
      punct(Punct::Comma),
      Token { kind: TokenKind::Ident(b), span: Span::default() },
      punct(Punct::Assign),
      int(10),
      punct(Punct::Comma),
      Token { kind: TokenKind::Ident(c), span: Span::default() },
      punct(Punct::RBrace),
    ];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.cfg = Some(crate::types::mir::Cfg::new());
    let spec = declaration_specifiers(&mut p).unwrap().expect("enum starts a declaration");
    assert_eq!(spec.ty.kind, TypeKind::Integer);
    assert_eq!(p.idents.lookup(a).unwrap().enum_value, 0);
    assert_eq!(p.idents.lookup(b).unwrap().enum_value, 10);
    assert_eq!(p.idents.lookup(c).unwrap().enum_value, 11);
  }

  #[test]
  fn struct_tag_redeclared_as_union_is_rejected() {
    let mut lexer = VecLexer::new(vec![]);
    let mut p = Parser::new(&mut lexer);
    let s = p.intern("S");
    p.tags.insert(s, TagEntry { name: s, kind: TagKind::Struct, ty: p.types.incomplete_object(), body_seen: true });
    let err = resolve_or_declare_tag(&mut p, Some(s), TagKind::Union, false);
    assert!(matches!(err, Err(Error::TagKindMismatch(_))));
  }

  #[test]
  fn long_is_eight_bytes_and_unsigned_sets_the_qualifier() {
    let toks = vec![kw(Keyword::Unsigned), kw(Keyword::Long)];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    let spec = declaration_specifiers(&mut p).unwrap().unwrap();
    assert_eq!(spec.ty.size(), 8);
    assert!(spec.ty.quals.contains(Quals::UNSIGNED));
  }

  #[test]
  fn struct_with_duplicate_member_name_is_rejected() {
    // struct { int a; int a; }
    let mut interner = crate::symbol::Interner::new();
    let a = interner.intern("a");
    let toks = vec![
      kw(Keyword::Int), Token { kind: TokenKind::Ident(a), span: Span::default() }, punct(Punct::Semi),
      kw(Keyword::Int), Token { kind: TokenKind::Ident(a), span: Span::default() }, punct(Punct::Semi),
    ];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;
    p.cfg = Some(crate::types::mir::Cfg::new());
    let s = p.types.incomplete_object();
    let err = parse_struct_body(&mut p, &s);
    assert!(matches!(err, Err(Error::InvalidMemberDeclarator(_))));
  }
}

//! The top-level driver: turns a token stream into a sequence of typed
//! three-address-IR fragments, one external declaration at a time.
//!
//! [`Parser::parse_next`] is the crate's single entry point for an embedding
//! compiler driver — it never parses more than one top-level construct per
//! call, so a caller streaming tokens from a large translation unit can
//! interleave parsing with whatever it does with each [`Fragment`] (codegen,
//! caching, whatever) without holding the whole program's IR in memory at
//! once. The file-scope/tag/typedef namespaces persist across calls; only
//! `cfg`/`locals` are reset per fragment.

use crate::decl::{
  declaration_specifiers, declarator, parse_init_declarator_list, parse_typedef_list, DeclSpec, StorageClass,
};
use crate::error::{Error, PResult};
use crate::parser::Parser;
use crate::stmt::parse_compound;
use crate::symbol::Symbol;
use crate::symtab::{Linkage, Namespace, SymEntry, SymKind};
use crate::token::{Lexer, Punct};
use crate::types::mir::{Cfg, Decl, Op, Terminator, Var, VarId};
use crate::types::{Member, Ty, TypeKind};

/// One unit of output from [`Parser::parse_next`].
pub enum Fragment {
  /// A function definition's lowered body.
  Function(Decl),
  /// A file-scope object's initializer IR — including the zero-initializers
  /// the end-of-input finalization pass synthesizes for internal-linkage
  /// tentative definitions.
  Global(Decl),
  /// A typedef, a bare tag declaration (`struct S;`), or a declaration with
  /// no initializer and no body: the binding is already recorded in the
  /// parser's namespaces, and there is no IR to hand back for it.
  TypeOnly,
  /// No external declarations remain.
  Eof,
}

impl<'a, L: Lexer> Parser<'a, L> {
  /// Parses and lowers the next external declaration, or — once the token
  /// stream is exhausted — runs the one-time end-of-input finalization pass
  /// and hands back its fragment, then returns [`Fragment::Eof`] on every
  /// call after that.
  pub fn parse_next(&mut self) -> PResult<Fragment> {
    if self.peek().is_eof() {
      if self.finalize_pending {
        self.finalize_pending = false;
        return self.finalize_tentatives();
      }
      return Ok(Fragment::Eof);
    }
    self.parse_external_declaration()
  }

  fn parse_external_declaration(&mut self) -> PResult<Fragment> {
    // Specifiers and declarators can themselves evaluate expressions (an
    // enum initializer, an array-dimension constant) that need somewhere to
    // emit scratch IR into even though no function or global fragment has
    // been decided on yet. Stand up a throwaway `Cfg` for the duration of
    // that parsing; every path below either discards it (bare tag/typedef,
    // no IR to keep) or immediately replaces it with the fragment's real one
    // (`parse_function_definition`/`parse_global_declarator_list` both start
    // with a fresh `Cfg` of their own), so nothing here is ever kept.
    let mut scratch = Cfg::new();
    scratch.new_block();
    self.cfg = Some(scratch);
    self.locals.clear();

    let spec = declaration_specifiers(self)?
      .ok_or_else(|| Error::UnexpectedToken { expected: "a declaration", found: format!("{:?}", self.peek().kind) })?;

    if self.eat(Punct::Semi) {
      // A bare tag declaration/definition (`struct S;`, `enum E { ... };`)
      // with no declarator: the tag binding is already recorded, nothing
      // else to hand back.
      self.cfg = None;
      self.locals.clear();
      return Ok(Fragment::TypeOnly);
    }

    if spec.storage == StorageClass::Typedef {
      let first = declarator(self, spec.ty.clone())?;
      parse_typedef_list(self, &spec, first, 0)?;
      self.cfg = None;
      self.locals.clear();
      return Ok(Fragment::TypeOnly);
    }

    let (ty, name) = declarator(self, spec.ty.clone())?;
    if ty.kind == TypeKind::Function && self.peek().punct() == Some(Punct::LBrace) {
      return self.parse_function_definition(&spec, ty, name);
    }
    self.parse_global_declarator_list(&spec, (ty, name))
  }

  /// The non-function-definition path: a comma-separated declarator list
  /// through `;`, possibly carrying initializers. Produces [`Fragment::Global`]
  /// only if at least one declarator actually emitted initializer IR;
  /// prototypes, `extern` declarations and uninitialized tentative
  /// definitions produce [`Fragment::TypeOnly`] instead (the latter are
  /// picked up later by [`Self::finalize_tentatives`]).
  fn parse_global_declarator_list(&mut self, spec: &DeclSpec, first: (Ty, Option<Symbol>)) -> PResult<Fragment> {
    let mut cfg = Cfg::new();
    let head = cfg.new_block();
    self.cfg = Some(cfg);
    self.locals.clear();

    let mut cur = head;
    let result = parse_init_declarator_list(self, spec, first, 0, &mut cur, head);
    let mut cfg = self.cfg.take().expect("cfg installed above");
    let locals = std::mem::take(&mut self.locals);
    result?;

    if cfg[head].ops.is_empty() {
      return Ok(Fragment::TypeOnly);
    }
    cfg[head].terminate(Terminator::Return);
    Ok(Fragment::Global(Decl { cfg, head, entry: head, locals, params: vec![], fun: None }))
  }

  /// Lowers a function definition's body: binds each parameter into a fresh
  /// scope, parses the compound-statement body, and closes off whatever
  /// block parsing left current with an implicit `return` (covering both a
  /// `void` function falling off the end and a non-`void` one that a real
  /// compiler would warn about but this front end accepts, per the
  /// error-handling design's "no flow-sensitive diagnostics" scope).
  fn parse_function_definition(&mut self, spec: &DeclSpec, ty: Ty, name: Option<Symbol>) -> PResult<Fragment> {
    let name = name.ok_or_else(|| Error::InvalidMemberDeclarator("function definition has no name".into()))?;
    let members: Vec<Member> = (*ty.members()).clone();

    let linkage = if spec.storage == StorageClass::Static { Linkage::Internal } else { Linkage::External };
    let sym = SymEntry { name, ty: ty.clone(), kind: SymKind::Definition, linkage, depth: 0, enum_value: 0, slot: None };
    let merged = self.idents.merge(sym)?;
    self.idents.insert(name, merged);

    let mut cfg = Cfg::new();
    let head = cfg.new_block();
    let entry = cfg.new_block();
    self.cfg = Some(cfg);
    self.locals.clear();
    self.labels = Namespace::new();
    self.loop_stack.clear();

    self.idents.push_scope();
    self.tags.push_scope();
    self.cur_func = Some(name);
    log::debug!("entering function body for '{}'", self.interner.resolve(name));

    let params_result = (|| -> PResult<Vec<VarId>> {
      let mut params = Vec::with_capacity(members.len());
      for m in &members {
        if self.interner.resolve(m.name).is_empty() {
          return Err(Error::MissingParameterName);
        }
        let slot = self.new_local(Some(m.name), m.ty.clone());
        let depth = self.idents.depth();
        let param_entry = SymEntry { name: m.name, ty: m.ty.clone(), kind: SymKind::Definition, linkage: Linkage::None, depth, enum_value: 0, slot: Some(slot) };
        let merged = self.idents.merge(param_entry)?;
        self.idents.insert(m.name, merged);
        params.push(slot);
      }
      Ok(params)
    })();

    let body_result = params_result.and_then(|params| {
      self.cfg.as_mut().expect("cfg installed above")[head].terminate(Terminator::Jump(entry));
      let mut cur = entry;
      parse_compound(self, &mut cur, head)?;
      self.cfg.as_mut().expect("cfg installed above")[cur].terminate(Terminator::Return);
      Ok(params)
    });

    self.tags.pop_scope();
    self.idents.pop_scope();
    self.cur_func = None;

    let params = body_result?;
    let cfg = self.cfg.take().expect("cfg installed above");
    let locals = std::mem::take(&mut self.locals);
    Ok(Fragment::Function(Decl { cfg, head, entry, locals, params, fun: Some(name) }))
  }

  /// The end-of-input pass (§4.G): every file-scope identifier still
  /// `Tentative` with `Internal` linkage gets a synthesized zero
  /// initializer, and its `SymKind` is upgraded to `Definition` — the same
  /// upgrade an explicit initializer would have produced, had one appeared
  /// before the translation unit ran out.
  fn finalize_tentatives(&mut self) -> PResult<Fragment> {
    let pending: Vec<(Symbol, Ty)> =
      self.idents.file_scope_tentatives().map(|e| (e.name, e.ty.clone())).collect();
    log::debug!("finalizing {} tentative file-scope definition(s) at end of input", pending.len());
    if pending.is_empty() {
      return Ok(Fragment::Eof);
    }

    let mut cfg = Cfg::new();
    let head = cfg.new_block();
    self.cfg = Some(cfg);
    self.locals.clear();

    for (name, ty) in &pending {
      let slot = self.new_local(Some(*name), ty.clone());
      self.cfg.as_mut().expect("cfg installed above").push_op(head, Op::Assign { dst: slot, src: Var::Immediate(0) });
      let entry = self.idents.lookup(*name).cloned().expect("just collected from this namespace");
      self.idents.insert(*name, SymEntry { kind: SymKind::Definition, ..entry });
    }

    let mut cfg = self.cfg.take().expect("cfg installed above");
    cfg[head].terminate(Terminator::Return);
    let locals = std::mem::take(&mut self.locals);
    Ok(Fragment::Global(Decl { cfg, head, entry: head, locals, params: vec![], fun: None }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::token::{Span, Token, TokenKind, VecLexer};
  use crate::token::Keyword;

  fn kw(k: Keyword) -> Token { Token { kind: TokenKind::Keyword(k), span: Span::default() } }
  fn punct(p: Punct) -> Token { Token { kind: TokenKind::Punct(p), span: Span::default() } }
  fn ident(s: Symbol) -> Token { Token { kind: TokenKind::Ident(s), span: Span::default() } }

  #[test]
  fn uninitialized_static_is_finalized_at_end_of_input() {
    // static int x;
    let mut interner = crate::symbol::Interner::new();
    let x = interner.intern("x");
    let toks = vec![kw(Keyword::Static), kw(Keyword::Int), ident(x), punct(Punct::Semi)];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;

    match p.parse_next().unwrap() {
      Fragment::TypeOnly => {}
      _ => panic!("an uninitialized declaration should produce no IR yet"),
    }
    assert_eq!(p.idents.lookup(x).unwrap().kind, SymKind::Tentative);

    match p.parse_next().unwrap() {
      Fragment::Global(decl) => {
        assert_eq!(decl.locals.len(), 1);
        assert!(matches!(decl.cfg[decl.head].ops[0], Op::Assign { src: Var::Immediate(0), .. }));
      }
      _ => panic!("end-of-input finalization should zero-initialize the tentative static"),
    }
    assert_eq!(p.idents.lookup(x).unwrap().kind, SymKind::Definition);

    match p.parse_next().unwrap() {
      Fragment::Eof => {}
      _ => panic!("finalization runs exactly once"),
    }
  }

  #[test]
  fn function_definition_binds_its_parameter_and_returns_it() {
    // int f(int a) { return a; }
    let mut interner = crate::symbol::Interner::new();
    let f = interner.intern("f");
    let a = interner.intern("a");
    let toks = vec![
      kw(Keyword::Int), ident(f),
      punct(Punct::LParen), kw(Keyword::Int), ident(a), punct(Punct::RParen),
      punct(Punct::LBrace),
      kw(Keyword::Return), ident(a), punct(Punct::Semi),
      punct(Punct::RBrace),
    ];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;

    match p.parse_next().unwrap() {
      Fragment::Function(decl) => {
        assert_eq!(decl.fun, Some(f));
        assert_eq!(decl.params.len(), 1);
        assert_ne!(decl.head, decl.entry);
        assert_eq!(decl.cfg[decl.head].terminator(), Some(&Terminator::Jump(decl.entry)));
      }
      _ => panic!("a function declarator followed by '{{' is a definition"),
    }

    match p.parse_next().unwrap() {
      Fragment::Eof => {}
      _ => panic!("nothing is left to finalize: f has no tentative file-scope object"),
    }
  }

  #[test]
  fn prototype_with_no_body_produces_no_ir() {
    // int g(int);
    let mut interner = crate::symbol::Interner::new();
    let g = interner.intern("g");
    let toks = vec![
      kw(Keyword::Int), ident(g),
      punct(Punct::LParen), kw(Keyword::Int), punct(Punct::RParen),
      punct(Punct::Semi),
    ];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;

    match p.parse_next().unwrap() {
      Fragment::TypeOnly => {}
      _ => panic!("a bodiless prototype carries no IR"),
    }
    assert_eq!(p.idents.lookup(g).unwrap().kind, SymKind::Declaration);
  }

  #[test]
  fn file_scope_array_dimension_expression_does_not_panic() {
    // int a[3] = {1, 2, 3}; — the `[3]` dimension is a constant expression
    // evaluated while parsing the declarator, before any function/global
    // fragment (and thus any `Cfg`) has been set up for this declaration.
    let mut interner = crate::symbol::Interner::new();
    let a = interner.intern("a");
    let toks = vec![
      kw(Keyword::Int), ident(a),
      punct(Punct::LBracket), Token { kind: TokenKind::IntConst(3), span: Span::default() }, punct(Punct::RBracket),
      punct(Punct::Assign), punct(Punct::LBrace),
      Token { kind: TokenKind::IntConst(1), span: Span::default() }, punct(Punct::Comma),
      Token { kind: TokenKind::IntConst(2), span: Span::default() }, punct(Punct::Comma),
      Token { kind: TokenKind::IntConst(3), span: Span::default() },
      punct(Punct::RBrace), punct(Punct::Semi),
    ];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;

    match p.parse_next().unwrap() {
      Fragment::Global(decl) => assert!(!decl.cfg[decl.head].ops.is_empty()),
      _ => panic!("an initialized file-scope array is a global fragment"),
    }
    assert_eq!(p.idents.lookup(a).unwrap().ty.size(), 12);
  }

  #[test]
  fn file_scope_enum_initializer_expression_does_not_panic() {
    // enum { A = 1 + 2 }; — the enumerator initializer is evaluated while
    // parsing the specifiers, before the bare-tag `;` tells the driver
    // there's no declarator (and thus no fragment) to follow.
    let mut interner = crate::symbol::Interner::new();
    let a = interner.intern("A");
    let toks = vec![
      kw(Keyword::Enum), punct(Punct::LBrace),
      ident(a), punct(Punct::Assign),
      Token { kind: TokenKind::IntConst(1), span: Span::default() },
      punct(Punct::Plus),
      Token { kind: TokenKind::IntConst(2), span: Span::default() },
      punct(Punct::RBrace), punct(Punct::Semi),
    ];
    let mut lexer = VecLexer::new(toks);
    let mut p = Parser::new(&mut lexer);
    p.interner = interner;

    match p.parse_next().unwrap() {
      Fragment::TypeOnly => {}
      _ => panic!("a bare enum tag declaration carries no IR"),
    }
    assert_eq!(p.idents.lookup(a).unwrap().enum_value, 3);
  }
}

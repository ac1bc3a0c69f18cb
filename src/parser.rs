//! The parser's cursor: token consumption, loop target stacks, and the
//! per-declaration lowering state shared by [`crate::decl`], [`crate::expr`]
//! and [`crate::stmt`].

use crate::decl::TagEntry;
use crate::error::{CollectingDiagnostics, Diagnostics, Error, PResult, Severity};
use crate::symbol::{Interner, Symbol};
use crate::symtab::{Namespace, SymEntry};
use crate::token::{Lexer, Punct, Span, Token, TokenKind};
use crate::types::mir::{BlockId, Cfg, Decl, Local, VarId};
use crate::types::{Ty, TypeRegistry};

/// The `break`/`continue` target of one enclosing loop (or `switch`, for
/// `break` only — see the stubbed-`switch` note in [`crate::stmt`]).
#[derive(Clone, Copy, Debug)]
pub struct LoopTargets {
  pub break_target: BlockId,
  pub continue_target: BlockId,
}

/// Parsing state for a single external declaration (§6's "one declaration at
/// a time" contract). Reused across `parse_next` calls; the identifier and
/// tag namespaces persist for the whole translation unit, but `cfg`/`locals`
/// reset per top-level declaration.
pub struct Parser<'a, L: Lexer> {
  pub lexer: &'a mut L,
  pub interner: Interner,
  pub types: TypeRegistry,
  pub idents: Namespace<SymEntry>,
  pub tags: Namespace<TagEntry>,
  pub labels: Namespace<BlockId>,
  /// Function bodies currently being built; `None` between top-level declarations.
  pub cfg: Option<Cfg>,
  pub locals: Vec<Local>,
  pub loop_stack: Vec<LoopTargets>,
  /// The function currently being lowered, if any — consulted by
  /// [`crate::expr`] to resolve `__func__`. `None` outside a function body.
  pub cur_func: Option<Symbol>,
  /// Non-fatal diagnostics sink. Fatal conditions still propagate as `Err`;
  /// this is only for warnings parsing can recover from on its own.
  pub diag: Box<dyn Diagnostics>,
  /// Whether the end-of-input tentative-definition finalization fragment
  /// (§4.G) is still owed to the caller. Starts `true`, flips to `false`
  /// once [`crate::driver`] hands that fragment back, after which
  /// `parse_next` only ever returns the end-of-input sentinel.
  pub finalize_pending: bool,
}

impl<'a, L: Lexer> Parser<'a, L> {
  #[must_use] pub fn new(lexer: &'a mut L) -> Self {
    Self {
      lexer,
      interner: Interner::new(),
      types: TypeRegistry::new(),
      idents: Namespace::new(),
      tags: Namespace::new(),
      labels: Namespace::new(),
      cfg: None,
      locals: vec![],
      loop_stack: vec![],
      cur_func: None,
      diag: Box::new(CollectingDiagnostics::default()),
      finalize_pending: true,
    }
  }

  /// Reports a non-fatal diagnostic through [`Self::diag`].
  pub fn warn(&mut self, span: Span, err: Error) {
    self.diag.report(span, Severity::Warning, &err);
  }

  #[must_use] pub fn peek(&mut self) -> Token { self.lexer.peek() }
  #[must_use] pub fn peekn(&mut self, k: usize) -> Token { self.lexer.peekn(k) }
  pub fn bump(&mut self) -> Token { self.lexer.next() }

  /// Consumes the next token, requiring it to be `p`; otherwise fatally
  /// errors with [`Error::UnexpectedToken`] (or [`Error::UnexpectedEof`] at
  /// end of input), per the "fatal on mismatch" token-consumption contract.
  pub fn consume(&mut self, p: Punct, what: &'static str) -> PResult<Token> {
    let tok = self.bump();
    if tok.is_eof() { return Err(Error::UnexpectedEof { expected: what }) }
    if tok.punct() == Some(p) { return Ok(tok) }
    Err(Error::UnexpectedToken { expected: what, found: format!("{:?}", tok.kind) })
  }

  /// `true` and consumes, without erroring, if the next token is `p`.
  pub fn eat(&mut self, p: Punct) -> bool {
    if self.peek().punct() == Some(p) { self.bump(); true } else { false }
  }

  pub fn intern(&mut self, s: &str) -> Symbol { self.interner.intern(s) }

  /// Allocates a fresh local in the declaration currently being lowered.
  pub fn new_local(&mut self, name: Option<Symbol>, ty: Ty) -> VarId {
    let id = VarId(u32::try_from(self.locals.len()).expect("too many locals"));
    self.locals.push(Local { name, ty });
    id
  }

  pub fn new_block(&mut self) -> BlockId {
    let id = self.cfg.as_mut().expect("new_block outside a function body").new_block();
    log::trace!("allocated block {id}");
    id
  }

  #[must_use] pub fn cur_loop(&self) -> Option<LoopTargets> { self.loop_stack.last().copied() }
}

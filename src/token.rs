//! The external lexer/preprocessor interface.
//!
//! Everything in this module is the boundary the front end is built against,
//! not something it implements: a real embedding supplies its own
//! preprocessor-backed [`Lexer`]. [`VecLexer`] is a minimal reference
//! implementation over a pre-built token vector, useful for tests and for
//! drivers that already have a fully tokenized translation unit in hand.

use crate::symbol::Symbol;

/// A source location, opaque to the front end beyond being attachable to
/// diagnostics and carried through to the back end on `__FILE__`/`__LINE__`-like
/// queries. The preprocessor/lexer owns the actual encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
  pub line: u32,
  pub col: u32,
}

/// A stable handle to an interned byte string, produced by the back end's
/// `strlabel` facility. Opaque to the front end; it is only ever threaded
/// through as the payload of a string-literal `Immediate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StringLabel(pub u32);

/// One lexical token, as produced by the preprocessor/lexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
  Keyword(Keyword),
  Punct(Punct),
  Ident(Symbol),
  IntConst(i64),
  StringConst(StringLabel),
  Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Keyword {
  Auto, Register, Static, Extern, Typedef,
  Const, Volatile,
  Void, Char, Short, Int, Long, Float, Double, Signed, Unsigned,
  Struct, Union, Enum,
  If, Else, While, Do, For, Break, Continue, Return, Goto,
  Switch, Case, Default,
  Sizeof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Punct {
  LParen, RParen, LBrace, RBrace, LBracket, RBracket,
  Semi, Comma, Colon, Question,
  Dot, Arrow, Ellipsis,
  Assign,
  Plus, Minus, Star, Slash, Percent,
  PlusAssign, MinusAssign, StarAssign, SlashAssign, PercentAssign,
  AmpAssign, PipeAssign, CaretAssign, ShlAssign, ShrAssign,
  Amp, Pipe, Caret, Tilde, Not,
  Shl, Shr,
  Eq, Ne, Lt, Gt, Le, Ge,
  AndAnd, OrOr,
  PlusPlus, MinusMinus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
}

/// The external preprocessor/lexer interface. Provides one-token lookahead
/// (and bounded `k`-token lookahead for the cast-vs-parenthesized-expression
/// ambiguity), plus the string-interning facility the back end uses for
/// every byte-string payload a `StringConst` token or a synthesized
/// `__func__` array needs to carry.
pub trait Lexer {
  fn peek(&mut self) -> Token;
  fn peekn(&mut self, k: usize) -> Token;
  fn next(&mut self) -> Token;
  /// Interns `bytes`, returning a stable label the back end can later
  /// resolve back to the same bytes. Called by the parser itself (not just
  /// forwarded from lexed tokens) to synthesize the `__func__` byte string.
  fn strlabel(&mut self, bytes: &[u8]) -> StringLabel;
}

impl Token {
  #[must_use] pub fn is_eof(&self) -> bool { matches!(self.kind, TokenKind::Eof) }
  #[must_use] pub fn punct(&self) -> Option<Punct> {
    if let TokenKind::Punct(p) = self.kind { Some(p) } else { None }
  }
  #[must_use] pub fn keyword(&self) -> Option<Keyword> {
    if let TokenKind::Keyword(k) = self.kind { Some(k) } else { None }
  }
  #[must_use] pub fn ident(&self) -> Option<Symbol> {
    if let TokenKind::Ident(s) = self.kind { Some(s) } else { None }
  }
}

/// A reference [`Lexer`] over a token vector already produced by some other
/// means. `peekn`/`peek`/`next` past the end all yield a steady stream of
/// [`TokenKind::Eof`] tokens, as the real preprocessor does at end of input.
pub struct VecLexer {
  toks: Vec<Token>,
  pos: usize,
  eof_span: Span,
  strings: Vec<Vec<u8>>,
}

impl VecLexer {
  #[must_use] pub fn new(toks: Vec<Token>) -> Self {
    let eof_span = toks.last().map_or(Span::default(), |t| t.span);
    Self { toks, pos: 0, eof_span, strings: vec![] }
  }

  fn at(&self, i: usize) -> Token {
    self.toks.get(i).cloned().unwrap_or(Token { kind: TokenKind::Eof, span: self.eof_span })
  }
}

impl Lexer for VecLexer {
  fn peek(&mut self) -> Token { self.at(self.pos) }
  fn peekn(&mut self, k: usize) -> Token { self.at(self.pos + k.saturating_sub(1)) }
  fn next(&mut self) -> Token {
    let t = self.at(self.pos);
    if self.pos < self.toks.len() { self.pos += 1 }
    t
  }
  fn strlabel(&mut self, bytes: &[u8]) -> StringLabel {
    let label = StringLabel(u32::try_from(self.strings.len()).expect("too many string literals"));
    self.strings.push(bytes.to_vec());
    label
  }
}

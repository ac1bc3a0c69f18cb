//! Diagnostics: the fatal/warned taxonomy from the error-handling design, plus
//! the `error(fmt, ...)` sink interface the parser reports through.
//!
//! The parser itself never calls `exit`; a fatal condition is an `Err(Error)`
//! that propagates with `?` up to whatever called into this crate. Only a
//! freestanding driver embedding this crate need translate that into a
//! process exit, per the propagation policy this mirrors.

use std::{error, fmt};

use crate::token::Span;

/// Severity of a reported diagnostic. `Fatal` aborts the current parse;
/// `Warning` is reported and parsing continues with a best-effort repair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
  Warning,
  Fatal,
}

/// The taxonomy of conditions the front end can report, grouped the way the
/// error-handling design groups them (syntactic, declaration, type,
/// initializer, expression semantics).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
  /// Expected one kind of token, found another.
  UnexpectedToken { expected: &'static str, found: String },
  /// Ran out of tokens mid-construct.
  UnexpectedEof { expected: &'static str },
  /// More than one storage-class specifier on one declaration.
  ConflictingStorageClass,
  /// Same name defined twice at file scope with `Definition` status.
  RedefinitionAtFileScope(String),
  /// Same name declared twice at the same block-scope depth.
  RedefinitionAtBlockScope(String),
  /// `extern` declaration carries an initializer.
  ExternWithInitializer(String),
  /// A tag name was previously declared with a different `struct`/`union`/`enum` kind.
  TagKindMismatch(String),
  /// A struct/union member declarator is missing a name or has an invalid type.
  InvalidMemberDeclarator(String),
  /// A function *definition* (not a prototype) has an unnamed parameter.
  MissingParameterName,
  /// An array element type has size 0 (incomplete).
  IncompleteArrayElement,
  /// `[n]` where `n <= 0`.
  NonPositiveArrayDimension,
  /// `sizeof` applied to a function type or an incomplete type.
  SizeofIncomplete,
  /// An enumerator initializer did not fold to an integer constant. Warned, not fatal.
  NonIntegerEnumInitializer,
  /// A file-scope or `static` initializer did not fold to a compile-time constant.
  NonConstantFileScopeInitializer,
  /// A fixed-size array initializer supplied fewer elements than the array requires.
  UnderspecifiedArrayInitializer,
  /// Use of an identifier with no visible binding.
  UndefinedSymbol(String),
  /// Attempt to `()`-call something that isn't of function type.
  NotAFunction,
  /// `.`/`->` on something that isn't a struct/union.
  NotAnObject,
  /// `(T)e` where `T` is not a valid cast target for `e`'s type.
  BadCastTarget,
  /// A binary operator with no defined meaning for a pointer operand (`*`,
  /// `%`, `&`, ...) — distinct from `BadCastTarget`, which is only about casts.
  InvalidPointerOperand,
  /// `a.lvalue` required but `a` was an rvalue.
  NotAnLvalue,
  /// `break` outside any enclosing loop or `switch`.
  BreakOutsideLoop,
  /// `continue` outside any enclosing loop.
  ContinueOutsideLoop,
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::UnexpectedToken { expected, found } =>
        write!(f, "expected {expected}, found {found}"),
      Self::UnexpectedEof { expected } => write!(f, "expected {expected}, found end of input"),
      Self::ConflictingStorageClass => write!(f, "more than one storage class specified"),
      Self::RedefinitionAtFileScope(n) => write!(f, "redefinition of '{n}' at file scope"),
      Self::RedefinitionAtBlockScope(n) => write!(f, "redeclaration of '{n}' in this scope"),
      Self::ExternWithInitializer(n) => write!(f, "'extern' variable '{n}' has an initializer"),
      Self::TagKindMismatch(n) => write!(f, "'{n}' defined as a different kind of tag"),
      Self::InvalidMemberDeclarator(n) => write!(f, "invalid member declarator for '{n}'"),
      Self::MissingParameterName => write!(f, "parameter name omitted in function definition"),
      Self::IncompleteArrayElement => write!(f, "array element type is incomplete"),
      Self::NonPositiveArrayDimension => write!(f, "array dimension must be positive"),
      Self::SizeofIncomplete => write!(f, "sizeof applied to an incomplete or function type"),
      Self::NonIntegerEnumInitializer => write!(f, "enumerator value is not an integer constant"),
      Self::NonConstantFileScopeInitializer =>
        write!(f, "initializer of a file-scope or static object is not a compile-time constant"),
      Self::UnderspecifiedArrayInitializer =>
        write!(f, "not enough initializers for fixed-size array"),
      Self::UndefinedSymbol(n) => write!(f, "use of undeclared identifier '{n}'"),
      Self::NotAFunction => write!(f, "called object is not a function"),
      Self::NotAnObject => write!(f, "member reference base type is not a struct or union"),
      Self::BadCastTarget => write!(f, "invalid cast target type"),
      Self::InvalidPointerOperand => write!(f, "operator not defined for a pointer operand"),
      Self::NotAnLvalue => write!(f, "expression is not assignable"),
      Self::BreakOutsideLoop => write!(f, "'break' statement not in a loop or switch"),
      Self::ContinueOutsideLoop => write!(f, "'continue' statement not in a loop"),
    }
  }
}

impl error::Error for Error {}

impl Error {
  /// The severity each variant is reported at. Only
  /// [`NonIntegerEnumInitializer`](Error::NonIntegerEnumInitializer) and
  /// [`UnderspecifiedArrayInitializer`](Error::UnderspecifiedArrayInitializer)
  /// are warnings; every other condition is fatal.
  #[must_use] pub fn severity(&self) -> Severity {
    match self {
      Self::NonIntegerEnumInitializer | Self::UnderspecifiedArrayInitializer => Severity::Warning,
      _ => Severity::Fatal,
    }
  }
}

/// Result alias used throughout the parser: `Err` means "this construct is
/// fatally malformed", unwound with `?` to the caller.
pub type PResult<T> = Result<T, Error>;

/// The external diagnostic sink. An embedding driver supplies an
/// implementation; tests can use [`CollectingDiagnostics`].
pub trait Diagnostics {
  fn report(&mut self, span: Span, severity: Severity, err: &Error);
}

/// A `Diagnostics` sink that just remembers what was reported, for tests.
#[derive(Default)]
pub struct CollectingDiagnostics {
  pub reports: Vec<(Span, Severity, Error)>,
}

impl Diagnostics for CollectingDiagnostics {
  fn report(&mut self, span: Span, severity: Severity, err: &Error) {
    match severity {
      Severity::Warning => log::warn!("{span:?}: {err}"),
      Severity::Fatal => log::debug!("{span:?}: {err} (fatal, propagated to caller)"),
    }
    self.reports.push((span, severity, err.clone()));
  }
}

//! A C89/C99 front end: takes a preprocessed token stream in, hands back
//! typed three-address-IR control-flow-graph fragments out, one external
//! declaration at a time. See [`driver::Parser::parse_next`] for the entry
//! point and [`driver::Fragment`] for what comes back.

/// Declaration parsing: specifiers, declarators, struct/union/enum bodies,
/// initializers.
pub mod decl;
/// The top-level driver tying declarations, statements and expressions
/// together into a stream of [`driver::Fragment`]s.
pub mod driver;
/// The diagnostic taxonomy and the sink parsing reports through.
pub mod error;
/// Expression parsing and its lowering into three-address IR.
pub mod expr;
/// The parser's cursor and the state threaded through every other module.
pub mod parser;
/// Statement parsing and control-flow-graph construction.
pub mod stmt;
/// Identifier interning.
pub mod symbol;
/// Scoped symbol tables for identifiers, labels and tags.
pub mod symtab;
/// The external lexer/preprocessor interface.
pub mod token;
/// The type system and the three-address IR types are lowered into.
pub mod types;

pub use crate::driver::Fragment;
pub use crate::error::{Diagnostics, Error, PResult, Severity};
pub use crate::parser::Parser;
pub use crate::token::{Lexer, Token, TokenKind};
pub use crate::types::mir::Decl;

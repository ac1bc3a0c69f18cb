//! Statement parsing and CFG construction: compound statements, the
//! if/while/do/for control-flow shapes, break/continue/return,
//! `goto`/labels, and the stubbed `switch`/`case`/`default`.
//!
//! Every function here follows the same "parent-to-tail" threading
//! convention [`crate::expr`] already uses: `cur` names the block IR should
//! be emitted into when the call starts, and is left pointing at wherever
//! control flow continues once the statement is fully lowered (§9's
//! "everything returns a block" builder pattern, expressed as an in-out
//! parameter rather than a return value). `head` is threaded alongside it
//! purely to pass through to [`crate::decl::parse_declaration`], which needs
//! it for block-scope `static` initializers.

use crate::decl::parse_declaration;
use crate::error::{Error, PResult};
use crate::expr::parse_expression;
use crate::parser::{LoopTargets, Parser};
use crate::symbol::Symbol;
use crate::token::{Keyword, Lexer, Punct, Token, TokenKind};
use crate::types::mir::{BlockId, Op, Terminator, Var};

/// Parses one statement (never a bare declaration — a declaration is only
/// valid as a compound statement's block-item, handled by [`parse_compound`]).
pub fn parse_statement(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  let tok = p.peek();
  match tok.kind {
    TokenKind::Punct(Punct::LBrace) => parse_compound(p, cur, head),
    TokenKind::Punct(Punct::Semi) => { p.bump(); Ok(()) }
    TokenKind::Keyword(Keyword::If) => parse_if(p, cur, head),
    TokenKind::Keyword(Keyword::While) => parse_while(p, cur, head),
    TokenKind::Keyword(Keyword::Do) => parse_do_while(p, cur, head),
    TokenKind::Keyword(Keyword::For) => parse_for(p, cur, head),
    TokenKind::Keyword(Keyword::Break) => parse_break(p, cur),
    TokenKind::Keyword(Keyword::Continue) => parse_continue(p, cur),
    TokenKind::Keyword(Keyword::Return) => parse_return(p, cur),
    TokenKind::Keyword(Keyword::Goto) => parse_goto(p, cur),
    TokenKind::Keyword(Keyword::Switch) => parse_switch(p, cur, head),
    TokenKind::Keyword(Keyword::Case) => parse_case(p, cur, head),
    TokenKind::Keyword(Keyword::Default) => parse_default(p, cur, head),
    TokenKind::Ident(_) if p.peekn(2).punct() == Some(Punct::Colon) => parse_label(p, cur, head),
    _ => parse_expression_statement(p, cur),
  }
}

fn parse_expression_statement(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<()> {
  parse_expression(p, cur)?;
  p.consume(Punct::Semi, "';'")?;
  Ok(())
}

/// `{ decl-or-stmt* }`: a fresh identifier and tag scope, with declarations
/// and statements freely interleaved (C99's "block item" grammar, not C89's
/// declarations-then-statements rule, matching the "freely interleaved"
/// wording in the statement design).
pub fn parse_compound(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.consume(Punct::LBrace, "'{'")?;
  p.idents.push_scope();
  p.tags.push_scope();
  while p.peek().punct() != Some(Punct::RBrace) && !p.peek().is_eof() {
    if !parse_declaration(p, cur, head)? {
      parse_statement(p, cur, head)?;
    }
  }
  let closed = p.consume(Punct::RBrace, "'}'");
  p.tags.pop_scope();
  p.idents.pop_scope();
  closed?;
  Ok(())
}

fn terminate(p: &mut Parser<impl Lexer>, block: BlockId, term: Terminator) {
  p.cfg.as_mut().expect("statement parsed outside a function body")[block].terminate(term);
}

fn push_op(p: &mut Parser<impl Lexer>, block: BlockId, op: Op) {
  p.cfg.as_mut().expect("statement parsed outside a function body").push_op(block, op);
}

/// `if (cond) then [else else_]`: the parent block becomes a conditional
/// branch to freshly allocated `then`/`else` blocks, each of which rejoins at
/// a `merge` block that becomes the new current block. An absent `else` is
/// modeled as an empty `else` block that just falls through to `merge`.
fn parse_if(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.bump(); // 'if'
  p.consume(Punct::LParen, "'('")?;
  let cond = parse_expression(p, cur)?;
  p.consume(Punct::RParen, "')'")?;

  let then_blk = p.new_block();
  let else_blk = p.new_block();
  let merge_blk = p.new_block();
  terminate(p, *cur, Terminator::Branch { cond: cond.var, then_blk, else_blk });

  let mut then_cur = then_blk;
  parse_statement(p, &mut then_cur, head)?;
  terminate(p, then_cur, Terminator::Jump(merge_blk));

  let mut else_cur = else_blk;
  if p.peek().keyword() == Some(Keyword::Else) {
    p.bump();
    parse_statement(p, &mut else_cur, head)?;
  }
  terminate(p, else_cur, Terminator::Jump(merge_blk));

  *cur = merge_blk;
  Ok(())
}

/// `while (cond) body`: `top` re-evaluates `cond` on every iteration
/// (re-entered by the body's tail); a true result enters `body`, false exits.
fn parse_while(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.bump(); // 'while'
  p.consume(Punct::LParen, "'('")?;
  let top = p.new_block();
  terminate(p, *cur, Terminator::Jump(top));
  *cur = top;
  let cond = parse_expression(p, cur)?;
  p.consume(Punct::RParen, "')'")?;

  let body = p.new_block();
  let exit = p.new_block();
  terminate(p, *cur, Terminator::Branch { cond: cond.var, then_blk: body, else_blk: exit });

  p.loop_stack.push(LoopTargets { break_target: exit, continue_target: top });
  let mut body_cur = body;
  let result = parse_statement(p, &mut body_cur, head);
  p.loop_stack.pop();
  result?;
  terminate(p, body_cur, Terminator::Jump(top));

  *cur = exit;
  Ok(())
}

/// `do body while (cond);`: the body runs once unconditionally; its tail
/// evaluates `cond` (in a dedicated block allocated up front, so `continue`
/// inside the body — which must jump to the condition check, not restart the
/// body — has somewhere to target before the body is even parsed).
fn parse_do_while(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.bump(); // 'do'
  let top = p.new_block();
  let cond_blk = p.new_block();
  let exit = p.new_block();
  terminate(p, *cur, Terminator::Jump(top));

  p.loop_stack.push(LoopTargets { break_target: exit, continue_target: cond_blk });
  let mut body_cur = top;
  let result = parse_statement(p, &mut body_cur, head);
  p.loop_stack.pop();
  result?;
  terminate(p, body_cur, Terminator::Jump(cond_blk));

  expect_keyword(p, Keyword::While, "'while'")?;
  p.consume(Punct::LParen, "'('")?;
  let mut cond_cur = cond_blk;
  let cond = parse_expression(p, &mut cond_cur)?;
  p.consume(Punct::RParen, "')'")?;
  p.consume(Punct::Semi, "';'")?;
  terminate(p, cond_cur, Terminator::Branch { cond: cond.var, then_blk: top, else_blk: exit });

  *cur = exit;
  Ok(())
}

/// `for (init; cond; incr) body`: `init` is emitted into the parent block;
/// `top` holds the (optional) condition; `incr` lives in its own block
/// between the body's tail and `top`, parsed here in the same left-to-right
/// token order the grammar already gives it (before the body, even though it
/// runs after it) — no lookahead trick needed.
fn parse_for(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.bump(); // 'for'
  p.consume(Punct::LParen, "'('")?;
  p.idents.push_scope();
  p.tags.push_scope();

  let init_result = (|| -> PResult<()> {
    if p.peek().punct() == Some(Punct::Semi) {
      p.bump();
    } else if !parse_declaration(p, cur, head)? {
      parse_expression(p, cur)?;
      p.consume(Punct::Semi, "';'")?;
    }
    Ok(())
  })();
  if let Err(e) = init_result {
    p.tags.pop_scope();
    p.idents.pop_scope();
    return Err(e);
  }

  let body_result = (|| -> PResult<()> {
    let top = p.new_block();
    terminate(p, *cur, Terminator::Jump(top));

    let mut cond_cur = top;
    let has_cond = p.peek().punct() != Some(Punct::Semi);
    let cond_val = if has_cond { Some(parse_expression(p, &mut cond_cur)?) } else { None };
    p.consume(Punct::Semi, "';'")?;

    let incr_blk = p.new_block();
    let body = p.new_block();
    let exit = p.new_block();
    match cond_val {
      Some(v) => terminate(p, cond_cur, Terminator::Branch { cond: v.var, then_blk: body, else_blk: exit }),
      None => terminate(p, cond_cur, Terminator::Jump(body)),
    }

    let mut incr_cur = incr_blk;
    if p.peek().punct() != Some(Punct::RParen) {
      parse_expression(p, &mut incr_cur)?;
    }
    p.consume(Punct::RParen, "')'")?;
    terminate(p, incr_cur, Terminator::Jump(top));

    p.loop_stack.push(LoopTargets { break_target: exit, continue_target: incr_blk });
    let mut body_cur = body;
    let result = parse_statement(p, &mut body_cur, head);
    p.loop_stack.pop();
    result?;
    terminate(p, body_cur, Terminator::Jump(incr_blk));

    *cur = exit;
    Ok(())
  })();

  p.tags.pop_scope();
  p.idents.pop_scope();
  body_result
}

/// `break;`: jumps to the nearest enclosing loop's (or `switch`'s) exit
/// block, then leaves `cur` at a fresh orphan so any statements that follow
/// (reachable only via a label) still parse uniformly — the same shape
/// [`parse_return`] uses.
fn parse_break(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<()> {
  p.bump(); // 'break'
  p.consume(Punct::Semi, "';'")?;
  let target = p.cur_loop().ok_or(Error::BreakOutsideLoop)?;
  terminate(p, *cur, Terminator::Jump(target.break_target));
  *cur = p.new_block();
  Ok(())
}

/// `continue;`: jumps to the nearest enclosing loop's continuation point
/// (the increment block for `for`, the condition block for `while`/`do`).
fn parse_continue(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<()> {
  p.bump(); // 'continue'
  p.consume(Punct::Semi, "';'")?;
  let target = p.cur_loop().ok_or(Error::ContinueOutsideLoop)?;
  terminate(p, *cur, Terminator::Jump(target.continue_target));
  *cur = p.new_block();
  Ok(())
}

/// `return [expr];`: evaluates the optional expression into `cur`, emits the
/// `Return` op carrying it, and terminates the block. Leaves `cur` at a fresh
/// orphan block, per the statement design's "subsequent statements parsed
/// uniformly" rule.
fn parse_return(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<()> {
  p.bump(); // 'return'
  let value = if p.peek().punct() == Some(Punct::Semi) {
    None
  } else {
    Some(parse_expression(p, cur)?.var)
  };
  p.consume(Punct::Semi, "';'")?;
  push_op(p, *cur, Op::Return { value });
  terminate(p, *cur, Terminator::Return);
  *cur = p.new_block();
  Ok(())
}

/// Looks up (or eagerly allocates) the block a named label resolves to.
/// Labels are function-local and flat (§3), so this never pushes/pops a
/// scope on [`Parser::labels`] — it is simply reset per function by
/// [`crate::driver`].
fn label_block(p: &mut Parser<impl Lexer>, name: Symbol) -> BlockId {
  if let Some(&blk) = p.labels.lookup(name) { return blk }
  let blk = p.new_block();
  p.labels.insert(name, blk);
  blk
}

/// `goto label;`: jumps the current block to the label's block (allocating
/// it eagerly if `label` hasn't been seen yet — it may be defined later in
/// the same function), then continues in a fresh orphan block.
fn parse_goto(p: &mut Parser<impl Lexer>, cur: &mut BlockId) -> PResult<()> {
  p.bump(); // 'goto'
  let tok = p.bump();
  let name = tok.ident().ok_or_else(|| Error::UnexpectedToken { expected: "a label name", found: format!("{:?}", tok.kind) })?;
  p.consume(Punct::Semi, "';'")?;
  let target = label_block(p, name);
  terminate(p, *cur, Terminator::Jump(target));
  *cur = p.new_block();
  Ok(())
}

/// `label: stmt`: the label names a block (reusing one a forward `goto`
/// already allocated, if any); the current block falls through into it
/// unconditionally, and the labelled statement is parsed as its contents.
fn parse_label(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  let tok = p.bump();
  let name = tok.ident().expect("caller matched on Ident before dispatching here");
  p.consume(Punct::Colon, "':'")?;
  let target = label_block(p, name);
  terminate(p, *cur, Terminator::Jump(target));
  *cur = target;
  parse_statement(p, cur, head)
}

/// `switch (expr) body`: the acknowledged C99-subset omission (§1) — `expr`
/// is evaluated for its side effects and then discarded, and `body` is
/// parsed into an orphan block so it still type-checks and its `break`s
/// still resolve, but it is never spliced into the reachable graph: the
/// parent block jumps straight past it to `exit`. A `continue` inside the
/// body still targets whatever loop (if any) lexically encloses the
/// `switch`, per C's scoping of `continue` (it is not caught by `switch`).
fn parse_switch(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.bump(); // 'switch'
  p.consume(Punct::LParen, "'('")?;
  parse_expression(p, cur)?;
  p.consume(Punct::RParen, "')'")?;

  let exit = p.new_block();
  terminate(p, *cur, Terminator::Jump(exit));

  let continue_target = p.cur_loop().map_or(exit, |l| l.continue_target);
  p.loop_stack.push(LoopTargets { break_target: exit, continue_target });
  let mut body_cur = p.new_block();
  let result = parse_statement(p, &mut body_cur, head);
  p.loop_stack.pop();
  result?;
  terminate(p, body_cur, Terminator::Unreachable);

  *cur = exit;
  Ok(())
}

/// `case const-expr: stmt` — stubbed per §1/§9: the constant is parsed (and
/// must still fold, matching the reference's case-label grammar) but no
/// dispatch table is built; the labelled statement is lowered wherever the
/// enclosing `switch` already placed `cur` (always its orphan body block).
fn parse_case(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.bump(); // 'case'
  parse_expression(p, cur)?;
  p.consume(Punct::Colon, "':'")?;
  parse_statement(p, cur, head)
}

/// `default: stmt` — stubbed the same way as [`parse_case`].
fn parse_default(p: &mut Parser<impl Lexer>, cur: &mut BlockId, head: BlockId) -> PResult<()> {
  p.bump(); // 'default'
  p.consume(Punct::Colon, "':'")?;
  parse_statement(p, cur, head)
}

fn expect_keyword(p: &mut Parser<impl Lexer>, kw: Keyword, what: &'static str) -> PResult<Token> {
  let tok = p.bump();
  if tok.keyword() == Some(kw) { return Ok(tok) }
  if tok.is_eof() { return Err(Error::UnexpectedEof { expected: what }) }
  Err(Error::UnexpectedToken { expected: what, found: format!("{:?}", tok.kind) })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::token::{Span, TokenKind, VecLexer};
  use crate::types::mir::{Cfg, Terminator};

  fn kw(k: Keyword) -> Token { Token { kind: TokenKind::Keyword(k), span: Span::default() } }
  fn punct(p: Punct) -> Token { Token { kind: TokenKind::Punct(p), span: Span::default() } }
  fn int(n: i64) -> Token { Token { kind: TokenKind::IntConst(n), span: Span::default() } }

  fn fresh<'a>(lexer: &'a mut VecLexer) -> Parser<'a, VecLexer> {
    let mut p = Parser::new(lexer);
    p.cfg = Some(Cfg::new());
    p
  }

  #[test]
  fn if_without_else_rejoins_at_merge() {
    // if (1) ; — both arms fall to the same merge block.
    let mut toks = vec![kw(Keyword::If), punct(Punct::LParen), int(1), punct(Punct::RParen), punct(Punct::Semi)];
    let mut lexer = VecLexer::new(std::mem::take(&mut toks));
    let mut p = fresh(&mut lexer);
    let mut cur = p.new_block();
    let head = cur;
    parse_statement(&mut p, &mut cur, head).unwrap();
    // then_blk and else_blk (bb1, bb2) both jump to merge (bb3); cur now at bb3.
    let cfg = p.cfg.as_ref().unwrap();
    assert_eq!(cfg[BlockId(1)].terminator(), Some(&Terminator::Jump(BlockId(3))));
    assert_eq!(cfg[BlockId(2)].terminator(), Some(&Terminator::Jump(BlockId(3))));
    assert_eq!(cur, BlockId(3));
  }

  #[test]
  fn break_outside_loop_is_an_error() {
    let mut toks = vec![kw(Keyword::Break), punct(Punct::Semi)];
    let mut lexer = VecLexer::new(std::mem::take(&mut toks));
    let mut p = fresh(&mut lexer);
    let mut cur = p.new_block();
    assert!(matches!(parse_statement(&mut p, &mut cur, cur), Err(Error::BreakOutsideLoop)));
  }

  #[test]
  fn while_loop_body_jumps_back_to_condition() {
    // while (1) ;
    let mut toks = vec![kw(Keyword::While), punct(Punct::LParen), int(1), punct(Punct::RParen), punct(Punct::Semi)];
    let mut lexer = VecLexer::new(std::mem::take(&mut toks));
    let mut p = fresh(&mut lexer);
    let mut cur = p.new_block();
    let head = cur;
    parse_statement(&mut p, &mut cur, head).unwrap();
    let cfg = p.cfg.as_ref().unwrap();
    // top = bb1, body = bb2, exit = bb3; body's tail (still bb2, an empty
    // statement) jumps back to top.
    assert_eq!(cfg[BlockId(2)].terminator(), Some(&Terminator::Jump(BlockId(1))));
    assert_eq!(cur, BlockId(3));
  }

  #[test]
  fn goto_before_label_eagerly_allocates_the_target_block() {
    // goto L; L: ;
    let l = p_intern();
    let mut toks = vec![
      kw(Keyword::Goto), Token { kind: TokenKind::Ident(l), span: Span::default() }, punct(Punct::Semi),
      Token { kind: TokenKind::Ident(l), span: Span::default() }, punct(Punct::Colon), punct(Punct::Semi),
    ];
    let mut lexer = VecLexer::new(std::mem::take(&mut toks));
    let mut p = fresh(&mut lexer);
    let mut cur = p.new_block();
    let head = cur;
    parse_statement(&mut p, &mut cur, head).unwrap();
    parse_statement(&mut p, &mut cur, head).unwrap();
    let cfg = p.cfg.as_ref().unwrap();
    // goto terminates bb0 with a jump to the label's block (bb1); the label
    // statement then jumps its own predecessor (the goto's orphan, bb2) into
    // that same block too.
    assert_eq!(cfg[BlockId(0)].terminator(), Some(&Terminator::Jump(BlockId(1))));
    assert_eq!(cfg[BlockId(2)].terminator(), Some(&Terminator::Jump(BlockId(1))));
  }

  fn p_intern() -> Symbol {
    let mut i = crate::symbol::Interner::new();
    i.intern("L")
  }
}

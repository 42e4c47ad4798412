// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression flattening and evaluation.
//!
//! After the scanner finishes a root, any operand whose head is a value or
//! operator token and that carries a chain of children is rewritten into a
//! single `Expression` token holding the whole chain as a linear child list.
//! Evaluation runs shunting-yard over that list and folds the postfix form
//! with an `i64` value stack. Identifiers are looked up through an
//! [`EvalContext`], which is how labels pick up the origin of the use site
//! and defines are expanded lazily.

use crate::error::AsmError;
use crate::token::{SourcePos, Token, TokenKind};

/// Symbol lookup used during evaluation.
pub trait EvalContext {
    fn lookup_symbol(&self, name: &str, pos: &SourcePos) -> Result<i64, AsmError>;
}

fn flattenable(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number | TokenKind::Char | TokenKind::Identifier | TokenKind::Operator
    )
}

/// Rewrite compound value operands of `root` into `Expression` tokens.
/// Register heads (indexed forms like `[ix + 5]`) are left alone.
pub fn flatten_operands(root: &mut Token) {
    for op in &mut root.children {
        if op.children.is_empty() || !flattenable(op.kind) {
            continue;
        }
        let pos = op.pos.clone();
        let memref = op.memref;
        let tail = std::mem::take(&mut op.children);
        let head = std::mem::replace(op, Token::new(TokenKind::Expression, String::new(), pos));
        op.memref = memref;
        let mut text = head.value.clone();
        for part in &tail {
            text.push(' ');
            text.push_str(&part.value);
        }
        op.value = text;
        op.children.push(head);
        op.children.extend(tail);
    }
}

/// Resolve any numeric-like token to its value: literals read their stamped
/// value, identifiers go through the context, expressions are evaluated.
pub fn resolve(token: &Token, ctx: &dyn EvalContext) -> Result<i64, AsmError> {
    match token.kind {
        TokenKind::Number | TokenKind::Char => Ok(token.numval),
        TokenKind::Identifier => ctx.lookup_symbol(&token.value, &token.pos),
        TokenKind::Expression => eval(token, ctx),
        _ => Err(AsmError::syntax(
            token.pos.clone(),
            &token.value,
            format!("{} operand has no numeric value", token.kind),
        )),
    }
}

/// Evaluate an `Expression` token's child list.
pub fn eval(expr: &Token, ctx: &dyn EvalContext) -> Result<i64, AsmError> {
    let mut output: Vec<&Token> = Vec::with_capacity(expr.children.len());
    let mut ops: Vec<&Token> = Vec::new();

    for tok in &expr.children {
        match tok.kind {
            TokenKind::Number | TokenKind::Char | TokenKind::Identifier => output.push(tok),
            TokenKind::Operator => match tok.value.as_str() {
                "(" => ops.push(tok),
                ")" => loop {
                    match ops.pop() {
                        Some(op) if op.value == "(" => break,
                        Some(op) => output.push(op),
                        // The stray `)` surfaces during folding.
                        None => {
                            output.push(tok);
                            break;
                        }
                    }
                },
                _ => {
                    // Smaller precedence binds tighter; all binary operators
                    // are left-associative, so equal precedence pops too.
                    while let Some(&top) = ops.last() {
                        if top.value != "(" && top.numval <= tok.numval {
                            output.push(top);
                            ops.pop();
                        } else {
                            break;
                        }
                    }
                    ops.push(tok);
                }
            },
            _ => {
                return Err(AsmError::syntax(
                    tok.pos.clone(),
                    &tok.value,
                    format!("{} is not valid in an expression", tok.kind),
                ))
            }
        }
    }
    while let Some(op) = ops.pop() {
        output.push(op);
    }

    let mut stack: Vec<i64> = Vec::new();
    for tok in output {
        match tok.kind {
            TokenKind::Number | TokenKind::Char => stack.push(tok.numval),
            TokenKind::Identifier => stack.push(ctx.lookup_symbol(&tok.value, &tok.pos)?),
            TokenKind::Operator => apply(tok, &mut stack)?,
            _ => {}
        }
    }
    if stack.len() != 1 {
        return Err(AsmError::syntax(
            expr.pos.clone(),
            &expr.value,
            "malformed expression",
        ));
    }
    Ok(stack[0])
}

fn apply(op: &Token, stack: &mut Vec<i64>) -> Result<(), AsmError> {
    let pop = |stack: &mut Vec<i64>| {
        stack.pop().ok_or_else(|| {
            AsmError::syntax(
                op.pos.clone(),
                &op.value,
                format!("missing operand for `{}`", op.value),
            )
        })
    };
    match op.value.as_str() {
        "(" | ")" => {
            return Err(AsmError::syntax(
                op.pos.clone(),
                &op.value,
                "unmatched parentheses in expression",
            ))
        }
        "~" => {
            let v = pop(stack)?;
            stack.push(!v);
        }
        _ => {
            let rhs = pop(stack)?;
            let lhs = pop(stack)?;
            let value = match op.value.as_str() {
                "+" => lhs.wrapping_add(rhs),
                "-" => lhs.wrapping_sub(rhs),
                "*" => lhs.wrapping_mul(rhs),
                "/" | "%" => {
                    if rhs == 0 {
                        return Err(AsmError::symbol(
                            op.pos.clone(),
                            &op.value,
                            "division by zero in expression",
                        ));
                    }
                    if op.value == "/" {
                        lhs.wrapping_div(rhs)
                    } else {
                        lhs.wrapping_rem(rhs)
                    }
                }
                "&" => lhs & rhs,
                "^" => lhs ^ rhs,
                "|" => lhs | rhs,
                other => {
                    return Err(AsmError::syntax(
                        op.pos.clone(),
                        other,
                        "unknown operator in expression",
                    ))
                }
            };
            stack.push(value);
        }
    }
    Ok(())
}

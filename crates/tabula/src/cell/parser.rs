//! The Cell expression parser.
//!
//! Parsing happens at a cell location: relative reference axes are stored
//! as offsets from `(col, row)`, absolute axes as grid indices, so the same
//! tree evaluates and renders correctly wherever the formula is later
//! viewed from.

use std::cell::RefCell;
use std::rc::Rc;

use super::expr::{CellExpr, CellExprKind, column_index};
use super::lexer::CellLexer;
use super::token::{CellLexeme, CellToken};
use crate::io::Logger;
use crate::number::Number;
use crate::scope::{Getter, Scope};
use crate::script::expr::{Expr, ExprKind};
use crate::script::token::{Lexeme, Token};
use crate::value::{CellRef, Value};

struct ParseError(String);

type ParseOutcome<T> = Result<T, ParseError>;

/// The Cell parser; stateless, like its Script sibling.
pub struct CellParser;

impl CellParser {
    /// Parses a complete cell formula at `(col, row)`. Failures are logged
    /// and yield `None`.
    pub fn parse_full_expression(
        lexer: &mut CellLexer,
        globals: &Rc<RefCell<Scope>>,
        logger: &mut dyn Logger,
        col: i64,
        row: i64,
    ) -> Option<Rc<CellExpr>> {
        let outcome = (|| -> ParseOutcome<Rc<CellExpr>> {
            let expr = Self::expression(lexer, globals, logger, col, row)?;
            Self::expect(lexer, CellLexeme::EndOfFile, "End of Input")?;
            Ok(expr)
        })();
        match outcome {
            Ok(expr) => Some(expr),
            Err(ParseError(message)) => {
                logger.log(&message);
                None
            }
        }
    }

    fn expect(lexer: &mut CellLexer, expected: CellLexeme, name: &str) -> ParseOutcome<CellToken> {
        if lexer.peek().lexeme != expected {
            let peeked = lexer.peek();
            return Err(ParseError(format!(
                "Expected >{name}< but found >{}< at {}",
                peeked.text, peeked.location
            )));
        }
        Ok(lexer.next_token())
    }

    fn expression(
        lexer: &mut CellLexer,
        globals: &Rc<RefCell<Scope>>,
        logger: &mut dyn Logger,
        col: i64,
        row: i64,
    ) -> ParseOutcome<Rc<CellExpr>> {
        let lhs = Self::simple(lexer, globals, logger, col, row)?;
        if !matches!(
            lexer.peek().lexeme,
            CellLexeme::Equality
                | CellLexeme::Inequality
                | CellLexeme::GreaterThan
                | CellLexeme::LessThan
                | CellLexeme::GreaterEqual
                | CellLexeme::LessEqual
        ) {
            return Ok(lhs);
        }
        let build_token = lexer.next_token();
        let rhs = Self::simple(lexer, globals, logger, col, row)?;
        Ok(match build_token.lexeme {
            CellLexeme::Equality => CellExpr::new(build_token, CellExprKind::Equals(lhs, rhs)),
            CellLexeme::Inequality => CellExpr::new(build_token, CellExprKind::NotEqual(lhs, rhs)),
            CellLexeme::GreaterThan => CellExpr::new(build_token, CellExprKind::Greater(lhs, rhs)),
            CellLexeme::LessThan => CellExpr::new(build_token, CellExprKind::Less(lhs, rhs)),
            CellLexeme::GreaterEqual => CellExpr::new(build_token, CellExprKind::Geq(lhs, rhs)),
            _ => CellExpr::new(build_token, CellExprKind::Leq(lhs, rhs)),
        })
    }

    fn simple(
        lexer: &mut CellLexer,
        globals: &Rc<RefCell<Scope>>,
        logger: &mut dyn Logger,
        col: i64,
        row: i64,
    ) -> ParseOutcome<Rc<CellExpr>> {
        let mut lhs = Self::term(lexer, globals, logger, col, row)?;
        while matches!(
            lexer.peek().lexeme,
            CellLexeme::Plus | CellLexeme::Minus | CellLexeme::Cat
        ) {
            let build_token = lexer.next_token();
            let rhs = Self::term(lexer, globals, logger, col, row)?;
            lhs = match build_token.lexeme {
                CellLexeme::Plus => CellExpr::new(build_token, CellExprKind::Plus(lhs, rhs)),
                CellLexeme::Minus => CellExpr::new(build_token, CellExprKind::Minus(lhs, rhs)),
                _ => CellExpr::new(build_token, CellExprKind::Cat(lhs, rhs)),
            };
        }
        Ok(lhs)
    }

    fn term(
        lexer: &mut CellLexer,
        globals: &Rc<RefCell<Scope>>,
        logger: &mut dyn Logger,
        col: i64,
        row: i64,
    ) -> ParseOutcome<Rc<CellExpr>> {
        let mut lhs = Self::unary(lexer, globals, logger, col, row)?;
        while matches!(lexer.peek().lexeme, CellLexeme::Multiply | CellLexeme::Divide) {
            let build_token = lexer.next_token();
            let rhs = Self::unary(lexer, globals, logger, col, row)?;
            lhs = match build_token.lexeme {
                CellLexeme::Multiply => {
                    CellExpr::new(build_token, CellExprKind::Multiply(lhs, rhs))
                }
                _ => CellExpr::new(build_token, CellExprKind::Divide(lhs, rhs)),
            };
        }
        Ok(lhs)
    }

    fn unary(
        lexer: &mut CellLexer,
        globals: &Rc<RefCell<Scope>>,
        logger: &mut dyn Logger,
        col: i64,
        row: i64,
    ) -> ParseOutcome<Rc<CellExpr>> {
        if lexer.peek().lexeme == CellLexeme::Minus {
            let build_token = lexer.next_token();
            let arg = Self::unary(lexer, globals, logger, col, row)?;
            return Ok(CellExpr::new(build_token, CellExprKind::Negate(arg)));
        }
        Self::primary(lexer, globals, logger, col, row)
    }

    fn primary(
        lexer: &mut CellLexer,
        globals: &Rc<RefCell<Scope>>,
        logger: &mut dyn Logger,
        col: i64,
        row: i64,
    ) -> ParseOutcome<Rc<CellExpr>> {
        match lexer.peek().lexeme {
            CellLexeme::CellReference => {
                let token = lexer.next_token();
                let mut ret = Self::cellref(&token, col, row);
                if lexer.peek().lexeme == CellLexeme::Range {
                    let build_token = lexer.next_token();
                    let other = lexer.peek().clone();
                    Self::expect(lexer, CellLexeme::CellReference, "cell reference")?;
                    let rhs = Self::cellref(&other, col, row);
                    ret = CellExpr::new(build_token, CellExprKind::MakeRange(ret, rhs));
                }
                if lexer.peek().lexeme == CellLexeme::SheetReference {
                    let build_token = lexer.next_token();
                    let sheet = build_token.text.clone();
                    ret = CellExpr::new(build_token, CellExprKind::MoveReference(ret, sheet));
                }
                Ok(ret)
            }
            CellLexeme::Identifier => {
                let build_token = lexer.next_token();
                let mut args = Vec::new();
                if lexer.peek().lexeme == CellLexeme::OpenParen {
                    lexer.next_token();
                    if lexer.peek().lexeme != CellLexeme::CloseParen {
                        args.push(Self::expression(lexer, globals, logger, col, row)?);
                        while lexer.peek().lexeme == CellLexeme::Semicolon {
                            lexer.next_token();
                            args.push(Self::expression(lexer, globals, logger, col, row)?);
                        }
                    }
                    Self::expect(lexer, CellLexeme::CloseParen, ")")?;
                }
                let slot = globals.borrow().slot_of(&build_token.text);
                let Some(slot) = slot else {
                    return Err(ParseError(format!(
                        "Name >{}< is not a function at {}",
                        build_token.text, build_token.location
                    )));
                };
                let location = Expr::new(
                    Token::new(Lexeme::Identifier, &build_token.text, "cell", 1, build_token.location),
                    ExprKind::Variable(Getter::Global(slot as u32)),
                );
                let name = build_token.text.clone();
                Ok(CellExpr::new(
                    build_token,
                    CellExprKind::FunctionCall {
                        name,
                        location,
                        args,
                    },
                ))
            }
            CellLexeme::Name => {
                let build_token = lexer.next_token();
                let name = build_token.text.clone();
                Ok(CellExpr::new(build_token, CellExprKind::Name(name)))
            }
            CellLexeme::Number => {
                let build_token = lexer.next_token();
                let value = Value::Float(Number::parse(&build_token.text));
                Ok(CellExpr::new(build_token, CellExprKind::Constant(value)))
            }
            CellLexeme::Str => {
                let build_token = lexer.next_token();
                let value = Value::string(&build_token.text);
                Ok(CellExpr::new(build_token, CellExprKind::Constant(value)))
            }
            CellLexeme::OpenParen => {
                lexer.next_token();
                let inner = Self::expression(lexer, globals, logger, col, row)?;
                Self::expect(lexer, CellLexeme::CloseParen, ")")?;
                Ok(inner)
            }
            _ => {
                let peeked = lexer.peek();
                Err(ParseError(format!(
                    "Expected >primary expression< but found >{}< at {}",
                    peeked.text, peeked.location
                )))
            }
        }
    }

    /// Decodes a reference token into a [`CellRef`] with relative axes
    /// stored as offsets from the parse origin.
    fn cellref(token: &CellToken, col: i64, row: i64) -> Rc<CellExpr> {
        let text = &token.text;
        let mut rest = text.as_str();
        let col_absolute = rest.starts_with('$');
        if col_absolute {
            rest = &rest[1..];
        }
        let letters_len = rest
            .bytes()
            .take_while(u8::is_ascii_alphabetic)
            .count();
        let letters = &rest[..letters_len];
        rest = &rest[letters_len..];
        let row_absolute = rest.starts_with('$');
        if row_absolute {
            rest = &rest[1..];
        }
        let column = column_index(letters);
        let line: i64 = rest.parse().unwrap_or(0);

        let cell = CellRef {
            sheet: None,
            col_absolute,
            col: if col_absolute { column } else { column - col },
            row_absolute,
            row: if row_absolute { line } else { line - row },
        };
        CellExpr::new(token.clone(), CellExprKind::Constant(Value::CellRef(cell)))
    }
}

//! The Script parser: recursive descent with error recovery.
//!
//! Public entry points log diagnostics through the [`Logger`] and return
//! `None` when the parse failed; internal productions raise a
//! [`ParseError`] that the statement-sequence loops catch, after which
//! they skip ahead to a statement boundary and keep going, so one broken
//! statement produces one message rather than a cascade.

use std::rc::Rc;

use tracing::debug;

use super::expr::{Expr, ExprKind};
use super::lexer::Lexer;
use super::stmt::{CaseContainer, CaseKind, FlowKind, NO_TARGET, RecAssign, Stmt, StmtKind};
use super::symbol_table::{IdentifierKind, SymbolTable};
use super::token::{Lexeme, Token};
use crate::io::Logger;
use crate::number::Number;
use crate::value::{FunctionValue, Value};

struct ParseError(String);

type ParseOutcome<T> = Result<T, ParseError>;

fn position(token: &Token) -> String {
    format!(
        "\n\tFrom {} on line {} in file {}",
        token.line_location, token.line_number, token.source_name
    )
}

/// The Script parser. All entry points are associated functions; the parser
/// itself holds no state beyond its arguments.
pub struct Parser;

impl Parser {
    /// Parses a single expression, leaving trailing input unconsumed.
    pub fn parse_expression(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Expr>> {
        match Self::expression(lexer, table, logger) {
            Ok(expr) => Some(expr),
            Err(error) => {
                logger.log(&error.0);
                None
            }
        }
    }

    /// Parses an expression that must consume all input.
    pub fn parse_full_expression(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Expr>> {
        let outcome = (|| -> ParseOutcome<Rc<Expr>> {
            let expr = Self::expression(lexer, table, logger)?;
            Self::expect(lexer, Lexeme::EndOfFile, "End of Input")?;
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

    /// Parses a whole program: a statement sequence to end of input.
    pub fn parse(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Stmt>> {
        debug!("parsing program");
        Self::outer_statement_seq(lexer, table, logger)
    }

    /// Parses a single statement.
    pub fn parse_statement(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Stmt>> {
        match Self::statement(lexer, table, false, logger) {
            Ok(statement) => statement,
            Err(ParseError(message)) => {
                logger.log(&message);
                None
            }
        }
    }

    /// Library-loading mode: accepts only `set` statements, with the
    /// global-shadowing warning enabled.
    pub fn parse_functions(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Stmt>> {
        let token = lexer.peek().clone();
        let mut statements = Vec::new();
        let mut bad_wrong = false;
        let outcome = (|| -> ParseOutcome<()> {
            while lexer.peek().lexeme == Lexeme::Set {
                match Self::statement(lexer, table, true, logger)? {
                    Some(statement) => statements.push(statement),
                    None => bad_wrong = true,
                }
            }
            if lexer.peek().lexeme != Lexeme::EndOfFile {
                logger.log(
                    "Something other than a function definition was found while parsing only functions.",
                );
                bad_wrong = true;
            }
            Ok(())
        })();
        if let Err(ParseError(message)) = outcome {
            logger.log(&format!("Could not parse functions: {message}"));
            bad_wrong = true;
        }
        if bad_wrong {
            None
        } else {
            Some(Stmt::new(token, StmtKind::Seq(statements)))
        }
    }

    fn expect(lexer: &mut Lexer, expected: Lexeme, name: &str) -> ParseOutcome<Token> {
        if lexer.peek().lexeme != expected {
            let peeked = lexer.peek();
            return Err(ParseError(format!(
                "Expected >{name}< but found >{}<{}",
                peeked.text,
                position(peeked)
            )));
        }
        Ok(lexer.next_token())
    }

    fn expression(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let condition = Self::predicate(lexer, table, logger)?;
        if lexer.peek().lexeme != Lexeme::Conditional {
            return Ok(condition);
        }
        let build_token = lexer.next_token();
        let then_case = Self::expression(lexer, table, logger)?;
        Self::expect(lexer, Lexeme::Alternative, ":")?;
        let else_case = Self::expression(lexer, table, logger)?;
        Ok(Expr::new(
            build_token,
            ExprKind::Ternary {
                condition,
                then_case,
                else_case,
            },
        ))
    }

    fn predicate(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let mut lhs = Self::relation(lexer, table, logger)?;
        while matches!(lexer.peek().lexeme, Lexeme::ShortAnd | Lexeme::ShortOr) {
            let build_token = lexer.next_token();
            let rhs = Self::relation(lexer, table, logger)?;
            lhs = match build_token.lexeme {
                Lexeme::ShortAnd => Expr::new(build_token, ExprKind::ShortAnd(lhs, rhs)),
                _ => Expr::new(build_token, ExprKind::ShortOr(lhs, rhs)),
            };
        }
        Ok(lhs)
    }

    fn relation(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let lhs = Self::simple(lexer, table, logger)?;
        if !matches!(
            lexer.peek().lexeme,
            Lexeme::Equality
                | Lexeme::Inequality
                | Lexeme::GreaterThan
                | Lexeme::LessThan
                | Lexeme::GreaterEqual
                | Lexeme::LessEqual
        ) {
            return Ok(lhs);
        }
        let build_token = lexer.next_token();
        let rhs = Self::simple(lexer, table, logger)?;
        Ok(match build_token.lexeme {
            Lexeme::Equality => Expr::new(build_token, ExprKind::Equals(lhs, rhs)),
            Lexeme::Inequality => Expr::new(build_token, ExprKind::NotEqual(lhs, rhs)),
            Lexeme::GreaterThan => Expr::new(build_token, ExprKind::Greater(lhs, rhs)),
            Lexeme::LessThan => Expr::new(build_token, ExprKind::Less(lhs, rhs)),
            Lexeme::GreaterEqual => Expr::new(build_token, ExprKind::Geq(lhs, rhs)),
            _ => Expr::new(build_token, ExprKind::Leq(lhs, rhs)),
        })
    }

    fn simple(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let mut lhs = Self::term(lexer, table, logger)?;
        while matches!(lexer.peek().lexeme, Lexeme::Plus | Lexeme::Minus) {
            let build_token = lexer.next_token();
            let rhs = Self::term(lexer, table, logger)?;
            lhs = match build_token.lexeme {
                Lexeme::Plus => Expr::new(build_token, ExprKind::Plus(lhs, rhs)),
                _ => Expr::new(build_token, ExprKind::Minus(lhs, rhs)),
            };
        }
        Ok(lhs)
    }

    fn term(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let mut lhs = Self::unary(lexer, table, logger)?;
        while matches!(lexer.peek().lexeme, Lexeme::Multiply | Lexeme::Divide) {
            let build_token = lexer.next_token();
            let rhs = Self::unary(lexer, table, logger)?;
            lhs = match build_token.lexeme {
                Lexeme::Multiply => Expr::new(build_token, ExprKind::Multiply(lhs, rhs)),
                _ => Expr::new(build_token, ExprKind::Divide(lhs, rhs)),
            };
        }
        Ok(lhs)
    }

    fn unary(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        if matches!(lexer.peek().lexeme, Lexeme::Not | Lexeme::Minus) {
            let build_token = lexer.next_token();
            let arg = Self::unary(lexer, table, logger)?;
            return Ok(match build_token.lexeme {
                Lexeme::Not => Expr::new(build_token, ExprKind::Not(arg)),
                _ => Expr::new(build_token, ExprKind::Negate(arg)),
            });
        }
        Self::referent(lexer, table, logger)
    }

    fn referent(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let mut lhs = Self::builder(lexer, table, logger)?;
        while matches!(lexer.peek().lexeme, Lexeme::OpenBracket | Lexeme::Period) {
            let build_token = lexer.next_token();
            let rhs = if build_token.lexeme == Lexeme::Period {
                let member_token = lexer.peek().clone();
                Self::expect(lexer, Lexeme::Identifier, "Identifier")?;
                Expr::constant(member_token.clone(), Value::string(&member_token.text))
            } else {
                let index = Self::expression(lexer, table, logger)?;
                Self::expect(lexer, Lexeme::CloseBracket, "]")?;
                index
            };
            lhs = Expr::new(build_token, ExprKind::DerefVar(lhs, rhs));
        }
        Ok(lhs)
    }

    /// Collection displays: `{a; b}` desugars to PushBack onto an empty
    /// array, `{k : v; …}` to Insert into an empty dictionary.
    fn builder(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        if lexer.peek().lexeme != Lexeme::OpenBrace {
            return Self::function_call(lexer, table, logger);
        }
        let build_token = lexer.next_token();

        if lexer.peek().lexeme == Lexeme::CloseBrace {
            lexer.next_token();
            return Ok(Expr::constant(build_token, Value::empty_array()));
        }

        let first = Self::expression(lexer, table, logger)?;
        let mut ret;
        if lexer.peek().lexeme == Lexeme::Alternative {
            lexer.next_token();
            let empty = Expr::constant(build_token.clone(), Value::empty_dict());
            let value = Self::expression(lexer, table, logger)?;
            ret = Self::build_insert(table, &build_token, empty, first, value)?;
            while lexer.peek().lexeme == Lexeme::Semicolon {
                lexer.next_token();
                let next_key = Self::expression(lexer, table, logger)?;
                Self::expect(lexer, Lexeme::Alternative, ":")?;
                let next_value = Self::expression(lexer, table, logger)?;
                ret = Self::build_insert(table, &build_token, ret, next_key, next_value)?;
            }
        } else {
            let empty = Expr::constant(build_token.clone(), Value::empty_array());
            ret = Self::build_push_back(table, &build_token, empty, first)?;
            while lexer.peek().lexeme == Lexeme::Semicolon {
                lexer.next_token();
                let next = Self::expression(lexer, table, logger)?;
                ret = Self::build_push_back(table, &build_token, ret, next)?;
            }
        }
        Self::expect(lexer, Lexeme::CloseBrace, "}")?;
        Ok(ret)
    }

    fn build_push_back(
        table: &SymbolTable,
        build_token: &Token,
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    ) -> ParseOutcome<Rc<Expr>> {
        let Some(location) = table.push_back_fn() else {
            return Err(ParseError(
                "Cannot resolve request for PushBack.".to_owned(),
            ));
        };
        Ok(Expr::new(
            build_token.clone(),
            ExprKind::FunctionCall {
                location,
                args: vec![lhs, rhs],
            },
        ))
    }

    fn build_insert(
        table: &SymbolTable,
        build_token: &Token,
        dict: Rc<Expr>,
        key: Rc<Expr>,
        value: Rc<Expr>,
    ) -> ParseOutcome<Rc<Expr>> {
        let Some(location) = table.insert_fn() else {
            return Err(ParseError("Cannot resolve request for Insert.".to_owned()));
        };
        Ok(Expr::new(
            build_token.clone(),
            ExprKind::FunctionCall {
                location,
                args: vec![dict, key, value],
            },
        ))
    }

    fn function_call(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let mut ret = Self::primary(lexer, table, logger)?;
        while lexer.peek().lexeme == Lexeme::OpenParen {
            let build_token = lexer.next_token();
            let mut args = Vec::new();
            if lexer.peek().lexeme != Lexeme::CloseParen {
                args.push(Self::expression(lexer, table, logger)?);
                while lexer.peek().lexeme == Lexeme::Semicolon {
                    lexer.next_token();
                    args.push(Self::expression(lexer, table, logger)?);
                }
            }
            Self::expect(lexer, Lexeme::CloseParen, ")")?;
            ret = Expr::new(
                build_token,
                ExprKind::FunctionCall {
                    location: ret,
                    args,
                },
            );
        }
        Ok(ret)
    }

    fn primary(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        match lexer.peek().lexeme {
            Lexeme::Identifier => match table.lookup(&lexer.peek().text) {
                IdentifierKind::GlobalVariable
                | IdentifierKind::ScopeVariable
                | IdentifierKind::LocalVariable => {
                    let build_token = lexer.next_token();
                    let getter = table.getter(&build_token.text).ok_or_else(|| {
                        ParseError(format!(
                            "Request for non existent variable {}.",
                            build_token.text
                        ))
                    })?;
                    Ok(Expr::new(build_token, ExprKind::Variable(getter)))
                }
                IdentifierKind::Function => Self::active_function_reference(lexer, table, logger),
                IdentifierKind::Undefined => {
                    let peeked = lexer.peek();
                    Err(ParseError(format!(
                        "Undefined identifier >{}< used.{}",
                        peeked.text,
                        position(peeked)
                    )))
                }
            },
            Lexeme::Function => Self::function_literal(lexer, table, logger),
            Lexeme::Number => {
                let build_token = lexer.next_token();
                let value = Value::Float(Number::parse(&build_token.text));
                Ok(Expr::constant(build_token, value))
            }
            Lexeme::Str => {
                let build_token = lexer.next_token();
                let value = Value::string(&build_token.text);
                Ok(Expr::constant(build_token, value))
            }
            Lexeme::OpenParen => {
                lexer.next_token();
                let inner = Self::expression(lexer, table, logger)?;
                Self::expect(lexer, Lexeme::CloseParen, ")")?;
                Ok(inner)
            }
            _ => {
                let peeked = lexer.peek();
                Err(ParseError(format!(
                    "Expected >primary expression< but found >{}<{}",
                    peeked.text,
                    position(peeked)
                )))
            }
        }
    }

    /// A reference to a function still being defined — the recursion case.
    /// Its capture values, if it has captures, must be supplied in `[...]`.
    fn active_function_reference(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let build_token = lexer.next_token();
        let weak = table
            .active_function(&build_token.text)
            .expect("lookup said this is an active function");
        let capture_count = weak
            .upgrade()
            .map_or(0, |def| def.capture_count());

        let mut captures = Vec::new();
        if capture_count != 0 {
            Self::expect(lexer, Lexeme::OpenBracket, "[ function parameters")?;
            captures.push(Self::expression(lexer, table, logger)?);
            while lexer.peek().lexeme == Lexeme::Semicolon {
                lexer.next_token();
                captures.push(Self::expression(lexer, table, logger)?);
            }
            if captures.len() != capture_count {
                let peeked = lexer.peek();
                return Err(ParseError(format!(
                    "Function >{}< called with {} of {} captured values provided.{}",
                    build_token.text,
                    captures.len(),
                    capture_count,
                    position(peeked)
                )));
            }
            Self::expect(lexer, Lexeme::CloseBracket, "]")?;
        }

        if captures.is_empty() {
            Ok(Expr::constant(
                build_token,
                Value::Function(FunctionValue::self_referential(weak, Vec::new())),
            ))
        } else {
            Ok(Expr::new(
                build_token,
                ExprKind::BuildFunction {
                    strong: None,
                    weak: Some(weak),
                    captures,
                },
            ))
        }
    }

    fn function_literal(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Rc<Expr>> {
        let build_token = lexer.next_token();

        // Capture values come first: `function [a; b] name (args) [x; y] is`.
        let mut captures = Vec::new();
        if lexer.peek().lexeme == Lexeme::OpenBracket {
            lexer.next_token();
            captures.push(Self::expression(lexer, table, logger)?);
            while lexer.peek().lexeme == Lexeme::Semicolon {
                lexer.next_token();
                captures.push(Self::expression(lexer, table, logger)?);
            }
            Self::expect(lexer, Lexeme::CloseBracket, "]")?;
        }

        table.push_context();
        let mut registered_name = String::new();
        let outcome = Self::function_literal_tail(
            lexer,
            table,
            logger,
            &build_token,
            captures,
            &mut registered_name,
        );
        table.unregister_active(&registered_name);
        table.pop_context();
        outcome
    }

    fn function_literal_tail(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
        build_token: &Token,
        captures: Vec<Rc<Expr>>,
        registered_name: &mut String,
    ) -> ParseOutcome<Rc<Expr>> {
        let mut bad_wrong = false;
        let context = table.context();

        if lexer.peek().lexeme == Lexeme::Identifier {
            let ident_token = lexer.next_token();
            bad_wrong |= Self::enforce_unique(&ident_token, table, "function name", logger);
            context.set_name(&ident_token.text);
        }

        Self::expect(lexer, Lexeme::OpenParen, "(")?;
        *registered_name = context.display_name();
        table.register_active(registered_name, &context);

        if lexer.peek().lexeme != Lexeme::CloseParen {
            let arg_token = lexer.peek().clone();
            Self::expect(lexer, Lexeme::Identifier, "Argument Identifier")?;
            bad_wrong |= Self::enforce_unique(&arg_token, table, "function argument", logger);
            table.add_argument(&arg_token.text);
            while lexer.peek().lexeme == Lexeme::Semicolon {
                lexer.next_token();
                let next_token = lexer.peek().clone();
                Self::expect(lexer, Lexeme::Identifier, "Argument Identifier")?;
                bad_wrong |= Self::enforce_unique(&next_token, table, "function argument", logger);
                table.add_argument(&next_token.text);
            }
        }

        let header = (|| -> ParseOutcome<()> {
            Self::expect(lexer, Lexeme::CloseParen, ")")?;
            if !captures.is_empty() {
                Self::expect(lexer, Lexeme::OpenBracket, "[ function parameter names")?;
                let capture_token = lexer.peek().clone();
                Self::expect(lexer, Lexeme::Identifier, "Capture Identifier")?;
                bad_wrong |= Self::enforce_unique(&capture_token, table, "function capture", logger);
                table.add_capture(&capture_token.text);
                while lexer.peek().lexeme == Lexeme::Semicolon {
                    lexer.next_token();
                    let next_token = lexer.peek().clone();
                    Self::expect(lexer, Lexeme::Identifier, "Capture Identifier")?;
                    bad_wrong |=
                        Self::enforce_unique(&next_token, table, "function capture", logger);
                    table.add_capture(&next_token.text);
                }
                if captures.len() != table.context().capture_count() {
                    let peeked = lexer.peek();
                    return Err(ParseError(format!(
                        "Function parameterized with {} values but given {} value names.{}",
                        captures.len(),
                        table.context().capture_count(),
                        position(peeked)
                    )));
                }
                Self::expect(lexer, Lexeme::CloseBracket, "]")?;
            }
            Self::expect(lexer, Lexeme::Is, "is")?;
            Ok(())
        })();
        if let Err(ParseError(message)) = header {
            logger.log(&message);
            bad_wrong = true;
            Self::recover_statement(lexer);
        }

        let body = Self::inner_statement_seq(lexer, table, logger);
        Self::expect(lexer, Lexeme::End, "end")?;

        match body {
            Some(body) if !bad_wrong => {
                context.set_body(body);
                table.unregister_active(registered_name);
                registered_name.clear();
                if captures.is_empty() {
                    Ok(Expr::constant(
                        build_token.clone(),
                        Value::Function(FunctionValue::new(context, Vec::new())),
                    ))
                } else {
                    Ok(Expr::new(
                        build_token.clone(),
                        ExprKind::BuildFunction {
                            strong: Some(context),
                            weak: None,
                            captures,
                        },
                    ))
                }
            }
            _ => Err(ParseError(
                "Parse failed. See previous messages.".to_owned(),
            )),
        }
    }

    fn enforce_unique(
        token: &Token,
        table: &SymbolTable,
        used_as: &str,
        logger: &mut dyn Logger,
    ) -> bool {
        if table.lookup(&token.text) == IdentifierKind::Undefined {
            return false;
        }
        logger.log(&format!(
            "Identifier >{}< for {used_as} is already defined.{}",
            token.text,
            position(token)
        ));
        true
    }

    fn recover_expression(lexer: &mut Lexer) {
        loop {
            match lexer.peek().lexeme {
                Lexeme::Function
                | Lexeme::Set
                | Lexeme::Call
                | Lexeme::If
                | Lexeme::While
                | Lexeme::Select
                | Lexeme::Break
                | Lexeme::Continue
                | Lexeme::Return
                | Lexeme::For
                | Lexeme::Else
                | Lexeme::Elseif
                | Lexeme::Case
                | Lexeme::Also
                | Lexeme::End
                | Lexeme::To
                | Lexeme::Then
                | Lexeme::Do
                | Lexeme::From
                | Lexeme::Is
                | Lexeme::Downto
                | Lexeme::Step
                | Lexeme::In
                | Lexeme::EndOfFile => return,
                _ => {
                    lexer.next_token();
                }
            }
        }
    }

    fn recover_statement(lexer: &mut Lexer) {
        loop {
            match lexer.peek().lexeme {
                Lexeme::Function
                | Lexeme::Set
                | Lexeme::Call
                | Lexeme::If
                | Lexeme::While
                | Lexeme::Select
                | Lexeme::Break
                | Lexeme::Continue
                | Lexeme::Return
                | Lexeme::For
                | Lexeme::Else
                | Lexeme::Elseif
                | Lexeme::Case
                | Lexeme::Also
                | Lexeme::End
                | Lexeme::EndOfFile => return,
                _ => {
                    lexer.next_token();
                }
            }
        }
    }

    fn expression_recover(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Expr>> {
        match Self::expression(lexer, table, logger) {
            Ok(expr) => Some(expr),
            Err(ParseError(message)) => {
                logger.log(&message);
                Self::recover_expression(lexer);
                None
            }
        }
    }

    /// Parses one statement. `Ok(None)` means the statement was malformed
    /// but already reported; the caller marks the parse failed and
    /// continues.
    fn statement(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        shadow: bool,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Option<Rc<Stmt>>> {
        match lexer.peek().lexeme {
            Lexeme::Set => Self::set_statement(lexer, table, shadow, logger),
            Lexeme::Call => {
                let build_token = lexer.next_token();
                let expr = Self::expression(lexer, table, logger)?;
                Ok(Some(Stmt::new(build_token, StmtKind::Expr(expr))))
            }
            Lexeme::If => Self::inner_if(lexer, table, logger),
            Lexeme::While => Self::while_statement(lexer, table, logger),
            Lexeme::For => Self::for_statement(lexer, table, logger),
            Lexeme::Break | Lexeme::Continue => {
                let build_token = lexer.next_token();
                let mut id = table.current_loop();
                if id == 0 {
                    return Err(ParseError(format!(
                        "Statement >{}<, but not in loop.{}",
                        build_token.text,
                        position(&build_token)
                    )));
                }
                if lexer.peek().lexeme == Lexeme::Identifier {
                    let name = lexer.next_token();
                    id = table.loop_by_name(&name.text);
                    if id == 0 {
                        return Err(ParseError(format!(
                            "Loop label >{}< has not been defined.{}",
                            name.text,
                            position(&name)
                        )));
                    }
                }
                let kind = if build_token.text == "break" {
                    FlowKind::Break
                } else {
                    FlowKind::Continue
                };
                Ok(Some(Stmt::new(
                    build_token,
                    StmtKind::FlowStmt {
                        kind,
                        target: id,
                        value: None,
                    },
                )))
            }
            Lexeme::Return => {
                let build_token = lexer.next_token();
                let expr = Self::expression(lexer, table, logger)?;
                Ok(Some(Stmt::new(
                    build_token,
                    StmtKind::FlowStmt {
                        kind: FlowKind::Return,
                        target: NO_TARGET,
                        value: Some(expr),
                    },
                )))
            }
            Lexeme::Select => Self::select_statement(lexer, table, logger),
            Lexeme::Else | Lexeme::Elseif | Lexeme::Case | Lexeme::Also | Lexeme::End => {
                // A statement was expected but its follow set showed up: a
                // malformed construct somewhere. Consume the token so the
                // caller's recovery cannot loop on it.
                let peeked = lexer.next_token();
                Err(ParseError(format!(
                    "Expected >Statement< but found >{}<{}",
                    peeked.text,
                    position(&peeked)
                )))
            }
            _ => {
                let peeked = lexer.peek();
                Err(ParseError(format!(
                    "Expected >Statement< but found >{}<{}",
                    peeked.text,
                    position(peeked)
                )))
            }
        }
    }

    fn set_statement(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        shadow: bool,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Option<Rc<Stmt>>> {
        let build_token = lexer.next_token();
        let ident_token = lexer.peek().clone();
        Self::expect(lexer, Lexeme::Identifier, "Identifier")?;

        let mut defined = false;
        match table.lookup(&ident_token.text) {
            IdentifierKind::Function => {
                return Err(ParseError(format!(
                    "Identifier >{}< is not allowed in this context.{}",
                    ident_token.text,
                    position(&ident_token)
                )));
            }
            IdentifierKind::GlobalVariable if shadow => {
                // A functions-only parse shadows globals rather than
                // overwriting them; warn and create the local.
                logger.log(&format!(
                    "Assignment to >{}< will create a local variable that shadows the global variable.{}",
                    ident_token.text,
                    position(&ident_token)
                ));
                table.add_local(&ident_token.text);
                defined = true;
            }
            IdentifierKind::Undefined => {
                // First write creates the binding.
                table.add_local(&ident_token.text);
                defined = true;
            }
            IdentifierKind::GlobalVariable
            | IdentifierKind::ScopeVariable
            | IdentifierKind::LocalVariable => {}
        }

        if defined
            && matches!(lexer.peek().lexeme, Lexeme::OpenBracket | Lexeme::Period)
        {
            return Err(ParseError(format!(
                "Identifier >{}< cannot be a Dictionary or Array in this context.{}",
                ident_token.text,
                position(&ident_token)
            )));
        }

        let mut chain: Option<Rc<RecAssign>> = None;
        let mut links: Vec<(Token, Rc<Expr>)> = Vec::new();
        while matches!(lexer.peek().lexeme, Lexeme::OpenBracket | Lexeme::Period) {
            let open_token = lexer.next_token();
            let index = if open_token.lexeme == Lexeme::Period {
                let member_token = lexer.peek().clone();
                Self::expect(lexer, Lexeme::Identifier, "Identifier")?;
                Expr::constant(member_token.clone(), Value::string(&member_token.text))
            } else {
                let index = Self::expression(lexer, table, logger)?;
                Self::expect(lexer, Lexeme::CloseBracket, "]")?;
                index
            };
            links.push((open_token, index));
        }
        for (open_token, index) in links.into_iter().rev() {
            chain = Some(Rc::new(RecAssign {
                token: open_token,
                index,
                next: chain,
            }));
        }

        Self::expect(lexer, Lexeme::To, "to")?;
        let rhs = Self::expression(lexer, table, logger)?;

        let getter = table.getter(&ident_token.text).ok_or_else(|| {
            ParseError(format!(
                "Request for non existent variable {}.",
                ident_token.text
            ))
        })?;
        let setter = table.setter(&ident_token.text).ok_or_else(|| {
            ParseError(format!(
                "Request for non existent variable {}.",
                ident_token.text
            ))
        })?;

        Ok(Some(Stmt::new(
            build_token,
            StmtKind::Assignment {
                getter,
                setter,
                chain,
                rhs,
            },
        )))
    }

    /// Reads an optional `call LABEL` loop label. Returns false when the
    /// label is a duplicate (already reported).
    fn loop_label(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> bool {
        if lexer.peek().lexeme != Lexeme::Call {
            return true;
        }
        lexer.next_token();
        let name = lexer.next_token();
        if table.loop_by_name(&name.text) != 0 {
            logger.log(&format!(
                "Label >{}< is already defined.{}",
                name.text,
                position(&name)
            ));
            return false;
        }
        table.name_loop(&name.text);
        true
    }

    fn while_statement(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Option<Rc<Stmt>>> {
        let build_token = lexer.next_token();
        let condition = Self::expression_recover(lexer, table, logger);

        let id = table.new_loop();
        let tail = (|| -> ParseOutcome<(bool, Option<Rc<Stmt>>)> {
            let label_ok = Self::loop_label(lexer, table, logger);
            Self::expect(lexer, Lexeme::Do, "do")?;
            let body = Self::inner_statement_seq(lexer, table, logger);
            Self::expect(lexer, Lexeme::End, "end")?;
            Ok((label_ok, body))
        })();
        table.pop_loop();
        let (label_ok, body) = tail?;

        match (condition, body) {
            (Some(condition), Some(body)) if label_ok => Ok(Some(Stmt::new(
                build_token,
                StmtKind::While {
                    condition,
                    body,
                    id,
                },
            ))),
            _ => Ok(None),
        }
    }

    fn for_statement(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Option<Rc<Stmt>>> {
        let build_token = lexer.next_token();

        let ident_token = lexer.peek().clone();
        Self::expect(lexer, Lexeme::Identifier, "Identifier")?;
        if table.lookup(&ident_token.text) == IdentifierKind::Undefined {
            table.add_local(&ident_token.text);
        }
        let setter = table.setter(&ident_token.text).ok_or_else(|| {
            ParseError(format!(
                "Request for non existent variable {}.",
                ident_token.text
            ))
        })?;

        let mut bad_wrong = false;
        let lower;
        let mut ascending = true;
        let mut upper = None;
        let mut step = None;

        if lexer.peek().lexeme == Lexeme::In {
            lexer.next_token();
            lower = Self::expression_recover(lexer, table, logger);
        } else {
            Self::expect(lexer, Lexeme::From, "from")?;
            lower = Self::expression_recover(lexer, table, logger);
            if lexer.peek().lexeme == Lexeme::Downto {
                lexer.next_token();
                ascending = false;
            } else {
                Self::expect(lexer, Lexeme::To, "to")?;
            }
            upper = Self::expression_recover(lexer, table, logger);
            if upper.is_none() {
                bad_wrong = true;
            }
            if lexer.peek().lexeme == Lexeme::Step {
                lexer.next_token();
                step = Self::expression_recover(lexer, table, logger);
                if step.is_none() {
                    bad_wrong = true;
                }
            }
        }
        let id = table.new_loop();
        let tail = (|| -> ParseOutcome<(bool, Option<Rc<Stmt>>)> {
            let label_ok = Self::loop_label(lexer, table, logger);
            Self::expect(lexer, Lexeme::Do, "do")?;
            let body = Self::inner_statement_seq(lexer, table, logger);
            Self::expect(lexer, Lexeme::End, "end")?;
            Ok((label_ok, body))
        })();
        table.pop_loop();
        let (label_ok, body) = tail?;

        match (lower, body) {
            (Some(lower), Some(body)) if label_ok && !bad_wrong => {
                Ok(Some(Stmt::new(
                    build_token,
                    StmtKind::For {
                        setter,
                        lower,
                        ascending,
                        upper,
                        step,
                        body,
                        id,
                    },
                )))
            }
            _ => Ok(None),
        }
    }

    fn select_statement(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Option<Rc<Stmt>>> {
        let build_token = lexer.next_token();
        let control = Self::expression_recover(lexer, table, logger);
        Self::expect(lexer, Lexeme::From, "from")?;

        let mut cases = Vec::new();
        let mut bad_wrong = false;
        let mut else_found = false;
        while !else_found && matches!(lexer.peek().lexeme, Lexeme::Case | Lexeme::Also) {
            let mut breaking = true;
            if lexer.peek().lexeme == Lexeme::Also {
                breaking = false;
                lexer.next_token();
            }
            let case_token = lexer.peek().clone();
            Self::expect(lexer, Lexeme::Case, "case")?;

            if lexer.peek().lexeme == Lexeme::From {
                lexer.next_token();
                let lower = Self::expression_recover(lexer, table, logger);
                Self::expect(lexer, Lexeme::To, "to")?;
                let upper = Self::expression_recover(lexer, table, logger);
                Self::expect(lexer, Lexeme::Is, "is")?;
                let body = Self::inner_statement_seq(lexer, table, logger);
                match (lower, upper, body) {
                    (Some(lower), Some(upper), Some(body)) => cases.push(CaseContainer {
                        token: case_token,
                        breaking,
                        kind: CaseKind::At,
                        condition: Some(upper),
                        lower: Some(lower),
                        body,
                    }),
                    _ => bad_wrong = true,
                }
            } else if lexer.peek().lexeme != Lexeme::Else {
                let mut kind = CaseKind::At;
                if lexer.peek().lexeme == Lexeme::Above {
                    lexer.next_token();
                    kind = CaseKind::Above;
                } else if lexer.peek().lexeme == Lexeme::Below {
                    lexer.next_token();
                    kind = CaseKind::Below;
                }
                let condition = Self::expression_recover(lexer, table, logger);
                Self::expect(lexer, Lexeme::Is, "is")?;
                let body = Self::inner_statement_seq(lexer, table, logger);
                match (condition, body) {
                    (Some(condition), Some(body)) => cases.push(CaseContainer {
                        token: case_token,
                        breaking,
                        kind,
                        condition: Some(condition),
                        lower: None,
                        body,
                    }),
                    _ => bad_wrong = true,
                }
            } else {
                else_found = true;
                lexer.next_token();
                Self::expect(lexer, Lexeme::Is, "is")?;
                let body = Self::inner_statement_seq(lexer, table, logger);
                match body {
                    Some(body) => cases.push(CaseContainer {
                        token: case_token,
                        breaking,
                        kind: CaseKind::At,
                        condition: None,
                        lower: None,
                        body,
                    }),
                    None => bad_wrong = true,
                }
            }
        }
        Self::expect(lexer, Lexeme::End, "end")?;

        match control {
            Some(control) if !bad_wrong => Ok(Some(Stmt::new(
                build_token,
                StmtKind::Select { control, cases },
            ))),
            _ => Ok(None),
        }
    }

    fn inner_if(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> ParseOutcome<Option<Rc<Stmt>>> {
        let build_token = lexer.next_token();
        let condition = Self::expression_recover(lexer, table, logger);
        Self::expect(lexer, Lexeme::Then, "then")?;
        let then_branch = Self::inner_statement_seq(lexer, table, logger);

        let else_branch = if lexer.peek().lexeme == Lexeme::Elseif {
            Self::inner_if(lexer, table, logger)?
        } else {
            let branch = if lexer.peek().lexeme == Lexeme::Else {
                lexer.next_token();
                Self::inner_statement_seq(lexer, table, logger)
            } else {
                Some(Stmt::nop())
            };
            Self::expect(lexer, Lexeme::End, "end")?;
            branch
        };

        match (condition, then_branch, else_branch) {
            (Some(condition), Some(then_branch), Some(else_branch)) => Ok(Some(Stmt::new(
                build_token,
                StmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                },
            ))),
            _ => Ok(None),
        }
    }

    fn collect_seq(token: Token, statements: Vec<Rc<Stmt>>) -> Rc<Stmt> {
        let mut filtered: Vec<Rc<Stmt>> = statements
            .into_iter()
            .filter(|statement| !matches!(statement.kind, StmtKind::Nop))
            .collect();
        if filtered.is_empty() {
            Stmt::nop()
        } else if filtered.len() == 1 {
            filtered.pop().expect("len is one")
        } else {
            Stmt::new(token, StmtKind::Seq(filtered))
        }
    }

    fn outer_statement_seq(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Stmt>> {
        let token = lexer.peek().clone();
        let mut statements = Vec::new();
        let mut bad_wrong = false;
        while lexer.peek().lexeme != Lexeme::EndOfFile {
            match Self::statement(lexer, table, false, logger) {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => bad_wrong = true,
                Err(ParseError(message)) => {
                    logger.log(&message);
                    bad_wrong = true;
                    Self::recover_statement(lexer);
                }
            }
        }
        if bad_wrong {
            None
        } else {
            Some(Self::collect_seq(token, statements))
        }
    }

    fn inner_statement_seq(
        lexer: &mut Lexer,
        table: &mut SymbolTable,
        logger: &mut dyn Logger,
    ) -> Option<Rc<Stmt>> {
        let token = lexer.peek().clone();
        let mut statements = Vec::new();
        let mut bad_wrong = false;
        while !matches!(
            lexer.peek().lexeme,
            Lexeme::Else
                | Lexeme::Elseif
                | Lexeme::End
                | Lexeme::Case
                | Lexeme::Also
                | Lexeme::EndOfFile
        ) {
            match Self::statement(lexer, table, false, logger) {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => bad_wrong = true,
                Err(ParseError(message)) => {
                    logger.log(&message);
                    bad_wrong = true;
                    Self::recover_statement(lexer);
                }
            }
        }
        if bad_wrong {
            None
        } else {
            Some(Self::collect_seq(token, statements))
        }
    }
}

//! Script expression trees and their evaluation.

use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::stmt::FlowKind;
use super::symbol_table::FunctionDef;
use super::token::Token;
use crate::context::CallingContext;
use crate::error::{RunError, RunResult};
use crate::number::Number;
use crate::scope::{Getter, StackFrame};
use crate::value::{FunctionValue, Value};

/// An expression node. Nodes are immutable and shared; the token pins the
/// operator's source position for diagnostics.
#[derive(Debug)]
pub struct Expr {
    pub token: Token,
    pub kind: ExprKind,
}

/// The expression forms of the Script language.
#[derive(Debug)]
pub enum ExprKind {
    Constant(Value),
    Variable(Getter),
    Plus(Rc<Expr>, Rc<Expr>),
    Minus(Rc<Expr>, Rc<Expr>),
    Multiply(Rc<Expr>, Rc<Expr>),
    Divide(Rc<Expr>, Rc<Expr>),
    ShortAnd(Rc<Expr>, Rc<Expr>),
    ShortOr(Rc<Expr>, Rc<Expr>),
    Equals(Rc<Expr>, Rc<Expr>),
    NotEqual(Rc<Expr>, Rc<Expr>),
    Greater(Rc<Expr>, Rc<Expr>),
    Less(Rc<Expr>, Rc<Expr>),
    Geq(Rc<Expr>, Rc<Expr>),
    Leq(Rc<Expr>, Rc<Expr>),
    /// Indexing: `container[index]` or `container.member`.
    DerefVar(Rc<Expr>, Rc<Expr>),
    Not(Rc<Expr>),
    Negate(Rc<Expr>),
    FunctionCall {
        location: Rc<Expr>,
        args: Vec<Rc<Expr>>,
    },
    /// Builds a closure from a prototype and capture expressions. The
    /// prototype reference is weak when the function under construction
    /// names itself, breaking the cycle through the capture list.
    BuildFunction {
        strong: Option<Rc<FunctionDef>>,
        weak: Option<Weak<FunctionDef>>,
        captures: Vec<Rc<Expr>>,
    },
    Ternary {
        condition: Rc<Expr>,
        then_case: Rc<Expr>,
        else_case: Rc<Expr>,
    },
}

impl Expr {
    #[must_use]
    pub fn new(token: Token, kind: ExprKind) -> Rc<Self> {
        Rc::new(Self { token, kind })
    }

    #[must_use]
    pub fn constant(token: Token, value: Value) -> Rc<Self> {
        Self::new(token, ExprKind::Constant(value))
    }

    /// Annotates a typed failure of *this* operator with its position and
    /// lets an attached debugger inspect the live stack first. Errors from
    /// subexpressions arrive already annotated and are not touched.
    fn raise(&self, context: &mut CallingContext, error: RunError) -> RunError {
        let annotated = error.annotated(&self.token);
        context.report(&annotated);
        annotated
    }

    fn truthiness(
        &self,
        context: &mut CallingContext,
        value: &Value,
    ) -> RunResult<bool> {
        value
            .op_logical()
            .map_err(|error| self.raise(context, error))
    }

    pub fn evaluate(&self, context: &mut CallingContext) -> RunResult<Value> {
        match &self.kind {
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Variable(getter) => getter.get(context),
            ExprKind::Plus(lhs, rhs) => {
                let lhs = lhs.evaluate(context)?;
                let rhs = rhs.evaluate(context)?;
                lhs.op_add(&rhs).map_err(|error| self.raise(context, error))
            }
            ExprKind::Minus(lhs, rhs) => {
                let lhs = lhs.evaluate(context)?;
                let rhs = rhs.evaluate(context)?;
                lhs.op_sub(&rhs).map_err(|error| self.raise(context, error))
            }
            ExprKind::Multiply(lhs, rhs) => {
                let lhs = lhs.evaluate(context)?;
                let rhs = rhs.evaluate(context)?;
                lhs.op_mul(&rhs).map_err(|error| self.raise(context, error))
            }
            ExprKind::Divide(lhs, rhs) => {
                let lhs = lhs.evaluate(context)?;
                let rhs = rhs.evaluate(context)?;
                lhs.op_div(&rhs).map_err(|error| self.raise(context, error))
            }
            ExprKind::ShortAnd(lhs, rhs) => {
                let lhs = lhs.evaluate(context)?;
                if !self.truthiness(context, &lhs)? {
                    return Ok(Value::Float(Number::zero()));
                }
                let rhs = rhs.evaluate(context)?;
                Ok(bool_value(self.truthiness(context, &rhs)?))
            }
            ExprKind::ShortOr(lhs, rhs) => {
                let lhs = lhs.evaluate(context)?;
                if self.truthiness(context, &lhs)? {
                    return Ok(Value::Float(Number::one()));
                }
                let rhs = rhs.evaluate(context)?;
                Ok(bool_value(self.truthiness(context, &rhs)?))
            }
            ExprKind::Equals(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_equal),
            ExprKind::NotEqual(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_not_equal),
            ExprKind::Greater(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_greater),
            ExprKind::Less(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_less),
            ExprKind::Geq(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_geq),
            ExprKind::Leq(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_leq),
            ExprKind::DerefVar(lhs, rhs) => {
                let container = lhs.evaluate(context)?;
                let index = rhs.evaluate(context)?;
                container
                    .index(&index)
                    .map_err(|error| self.raise(context, error))
            }
            ExprKind::Not(arg) => {
                let arg = arg.evaluate(context)?;
                // Yes, these are backwards for a reason: this is where the
                // NOT happens.
                Ok(bool_value(!self.truthiness(context, &arg)?))
            }
            ExprKind::Negate(arg) => {
                let arg = arg.evaluate(context)?;
                arg.op_neg().map_err(|error| self.raise(context, error))
            }
            ExprKind::FunctionCall { location, args } => {
                let location = location.evaluate(context)?;
                let Value::Function(function) = location else {
                    let message = format!(
                        "Call to not a Function at {} on line {} in file {}",
                        self.token.line_location, self.token.line_number, self.token.source_name
                    );
                    let error = RunError::fatal(message);
                    context.report(&error);
                    return Err(error);
                };
                let mut arg_values: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(arg.evaluate(context)?);
                }
                call_function(context, &function, arg_values.into_vec(), &self.token)
            }
            ExprKind::BuildFunction {
                strong,
                weak,
                captures,
            } => {
                // Building a closure cannot itself fail; capture expressions
                // raise their own errors.
                let mut captured = Vec::with_capacity(captures.len());
                for capture in captures {
                    captured.push(capture.evaluate(context)?);
                }
                match (strong, weak) {
                    (Some(def), _) => Ok(Value::Function(FunctionValue::new(
                        Rc::clone(def),
                        captured,
                    ))),
                    (None, Some(def)) => Ok(Value::Function(FunctionValue::self_referential(
                        Weak::clone(def),
                        captured,
                    ))),
                    (None, None) => Err(RunError::fatal("Function built from nothing.")),
                }
            }
            ExprKind::Ternary {
                condition,
                then_case,
                else_case,
            } => {
                let condition = condition.evaluate(context)?;
                if self.truthiness(context, &condition)? {
                    then_case.evaluate(context)
                } else {
                    else_case.evaluate(context)
                }
            }
        }
    }

    fn relation(
        &self,
        context: &mut CallingContext,
        lhs: &Rc<Expr>,
        rhs: &Rc<Expr>,
        op: fn(&Value, &Value) -> RunResult<bool>,
    ) -> RunResult<Value> {
        let lhs = lhs.evaluate(context)?;
        let rhs = rhs.evaluate(context)?;
        match op(&lhs, &rhs) {
            Ok(result) => Ok(bool_value(result)),
            Err(error) => Err(self.raise(context, error)),
        }
    }
}

fn bool_value(value: bool) -> Value {
    Value::Float(if value { Number::one() } else { Number::zero() })
}

/// Calls a function value: arity check, frame allocation, body execution.
///
/// The frame is linked only after the arguments are computed (argument
/// evaluation may itself push and pop frames) and unlinked on every exit
/// path. The body must produce a Return; anything else is fatal.
pub fn call_function(
    context: &mut CallingContext,
    function: &FunctionValue,
    args: Vec<Value>,
    call_token: &Token,
) -> RunResult<Value> {
    let definition = function.definition()?;
    if args.len() != definition.arity() {
        let message = format!(
            "Call to function with {} arguments, but function takes {} arguments at {} on line {} in file {}",
            args.len(),
            definition.arity(),
            call_token.line_location,
            call_token.line_number,
            call_token.source_name
        );
        let error = RunError::fatal(message);
        context.report(&error);
        return Err(error);
    }
    let body = definition.body()?;
    let frame = StackFrame::new(
        definition,
        args,
        function.captures.as_ref().clone(),
        context.depth() + 1,
        call_token.clone(),
    );
    context.push_frame(frame);
    match body.execute(context) {
        Err(error) => {
            context.pop_frame();
            if error.is_typed() {
                Err(error.annotated(call_token))
            } else {
                Err(error)
            }
        }
        Ok(None) => {
            context.pop_frame();
            Err(RunError::fatal(format!(
                "Function failed to return a value at {} on line {} in file {}",
                call_token.line_location, call_token.line_number, call_token.source_name
            )))
        }
        Ok(Some(flow)) => {
            if flow.kind == FlowKind::Return {
                context.pop_frame();
                Ok(flow.value.unwrap_or(Value::Nil))
            } else {
                // The escaping frame is still linked while the debugger
                // looks at it.
                let error = RunError::fatal(format!(
                    "Function had a 'break' or 'continue' outside of a loop at {} on line {} in file {}",
                    call_token.line_location, call_token.line_number, call_token.source_name
                ));
                context.report(&error);
                context.pop_frame();
                Err(error)
            }
        }
    }
}

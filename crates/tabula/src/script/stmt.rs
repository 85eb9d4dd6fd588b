//! Script statements and the tree-walking executor.
//!
//! Executing a statement yields `Ok(None)` to keep going, or a
//! [`FlowControl`] token that unwinds to whichever construct it targets:
//! loops intercept their own break/continue, everything else passes the
//! token up until a function call boundary consumes a Return.

use std::rc::Rc;

use super::expr::Expr;
use super::token::Token;
use crate::context::CallingContext;
use crate::error::{RunError, RunResult};
use crate::number::Number;
use crate::scope::{Getter, Setter};
use crate::value::Value;

/// Which flow-control statement produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Return,
    Break,
    Continue,
}

/// Loop-control tokens carry the id of the loop they target; Return carries
/// [`NO_TARGET`].
pub const NO_TARGET: u64 = 0;

/// The token a statement returns to signal return or loop control.
#[derive(Debug)]
pub struct FlowControl {
    pub token: Token,
    pub kind: FlowKind,
    pub target: u64,
    pub value: Option<Value>,
}

/// Outcome of executing a statement.
pub type Flow = Option<FlowControl>;

/// Case predicate shape inside `select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    At,
    Above,
    Below,
}

/// One case of a `select` statement.
///
/// `condition` is absent for `case else`; `lower` is present only for the
/// two-ended `case from A to B`. A non-`breaking` case (spelled `also
/// case`) lets the previous matching body fall through into this one.
#[derive(Debug)]
pub struct CaseContainer {
    pub token: Token,
    pub breaking: bool,
    pub kind: CaseKind,
    pub condition: Option<Rc<Expr>>,
    pub lower: Option<Rc<Expr>>,
    pub body: Rc<Stmt>,
}

impl CaseContainer {
    fn matches(&self, context: &mut CallingContext, control: &Value) -> RunResult<bool> {
        let outcome = (|| -> RunResult<bool> {
            match (&self.condition, &self.lower) {
                (None, _) => Ok(true),
                (Some(condition), None) => {
                    let case_value = condition.evaluate(context)?;
                    match self.kind {
                        CaseKind::At => case_value.op_equal(control),
                        // Inverted: the case value sits on the left.
                        CaseKind::Above => case_value.op_leq(control),
                        CaseKind::Below => case_value.op_geq(control),
                    }
                }
                (Some(upper), Some(lower)) => {
                    let top = upper.evaluate(context)?;
                    let bottom = lower.evaluate(context)?;
                    Ok(bottom.op_leq(control)? && top.op_geq(control)?)
                }
            }
        })();
        outcome.map_err(|error| {
            if error.is_typed() {
                let annotated = error.annotated(&self.token);
                context.report(&annotated);
                annotated
            } else {
                error
            }
        })
    }
}

/// Native-function bodies wrap a Rust function so it looks like a Script
/// function body: read the frame's args, produce a Return.
pub type ConstantFn = fn() -> Value;
pub type ConstantCtxFn = fn(&mut CallingContext) -> RunResult<Value>;
pub type UnaryFn = fn(&Value) -> RunResult<Value>;
pub type UnaryCtxFn = fn(&mut CallingContext, &Value) -> RunResult<Value>;
pub type BinaryFn = fn(&Value, &Value) -> RunResult<Value>;
pub type BinaryCtxFn = fn(&mut CallingContext, &Value, &Value) -> RunResult<Value>;
pub type TernaryFn = fn(&Value, &Value, &Value) -> RunResult<Value>;

/// A statement node.
#[derive(Debug)]
pub struct Stmt {
    pub token: Token,
    pub kind: StmtKind,
}

/// The statement forms of the Script language.
#[derive(Debug)]
pub enum StmtKind {
    Nop,
    Expr(Rc<Expr>),
    Seq(Vec<Rc<Stmt>>),
    Assignment {
        getter: Getter,
        setter: Setter,
        chain: Option<Rc<RecAssign>>,
        rhs: Rc<Expr>,
    },
    If {
        condition: Rc<Expr>,
        then_branch: Rc<Stmt>,
        else_branch: Rc<Stmt>,
    },
    While {
        condition: Rc<Expr>,
        body: Rc<Stmt>,
        id: u64,
    },
    Select {
        control: Rc<Expr>,
        cases: Vec<CaseContainer>,
    },
    /// Both `for` shapes: `upper` present for the counted loop, absent for
    /// collection iteration (then `lower` is the collection).
    For {
        setter: Setter,
        lower: Rc<Expr>,
        ascending: bool,
        upper: Option<Rc<Expr>>,
        step: Option<Rc<Expr>>,
        body: Rc<Stmt>,
        id: u64,
    },
    FlowStmt {
        kind: FlowKind,
        target: u64,
        value: Option<Rc<Expr>>,
    },
    NativeConstant(ConstantFn),
    NativeConstantCtx(ConstantCtxFn),
    NativeUnary(UnaryFn),
    NativeUnaryCtx(UnaryCtxFn),
    NativeBinary(BinaryFn),
    NativeBinaryCtx(BinaryCtxFn),
    NativeTernary(TernaryFn),
}

/// One step of a nested-assignment index chain, e.g. the `[i]` of
/// `set x[i].b to v`.
///
/// Evaluation is recursive and functional: the last step writes the value,
/// inner steps read the child, recurse, and write the rebuilt child back,
/// so the final setter receives a fully rebuilt root container.
#[derive(Debug)]
pub struct RecAssign {
    pub token: Token,
    pub index: Rc<Expr>,
    pub next: Option<Rc<RecAssign>>,
}

impl RecAssign {
    fn raise(&self, context: &mut CallingContext, error: RunError) -> RunError {
        let annotated = error.annotated(&self.token);
        context.report(&annotated);
        annotated
    }

    fn read_child(
        &self,
        context: &mut CallingContext,
        container: &Value,
        index: &Value,
    ) -> RunResult<Value> {
        let result = match container {
            Value::Array(_) | Value::Dict(_) => container.index(index),
            _ => Err(RunError::typed("Error indexing non-Collection.")),
        };
        result.map_err(|error| self.raise(context, error))
    }

    fn write_child(
        &self,
        context: &mut CallingContext,
        container: &Value,
        index: Value,
        value: Value,
    ) -> RunResult<Value> {
        let result = match container {
            Value::Array(_) => container.array_with(&index, value),
            Value::Dict(_) => container.dict_with(index, value),
            _ => Err(RunError::typed("Error indexing non-Collection.")),
        };
        result.map_err(|error| self.raise(context, error))
    }

    pub fn evaluate(
        &self,
        context: &mut CallingContext,
        lhs: &Value,
        rhs: &Rc<Expr>,
    ) -> RunResult<Value> {
        match &self.next {
            None => {
                let index = self.index.evaluate(context)?;
                let value = rhs.evaluate(context)?;
                self.write_child(context, lhs, index, value)
            }
            Some(next) => {
                let index = self.index.evaluate(context)?;
                let child = self.read_child(context, lhs, &index)?;
                let rebuilt = next.evaluate(context, &child, rhs)?;
                self.write_child(context, lhs, index, rebuilt)
            }
        }
    }
}

impl Stmt {
    #[must_use]
    pub fn new(token: Token, kind: StmtKind) -> Rc<Self> {
        Rc::new(Self { token, kind })
    }

    #[must_use]
    pub fn nop() -> Rc<Self> {
        Self::new(Token::synthetic(), StmtKind::Nop)
    }

    fn raise(&self, context: &mut CallingContext, error: RunError) -> RunError {
        if error.is_typed() {
            let annotated = error.annotated(&self.token);
            context.report(&annotated);
            annotated
        } else {
            error
        }
    }

    /// Evaluates and coerces a condition. Unlike operators, statements wrap
    /// typed failures from the whole evaluation with their own token, so a
    /// failure deep in a condition picks up context at each statement it
    /// unwinds through.
    fn condition_value(&self, context: &mut CallingContext, condition: &Rc<Expr>) -> RunResult<bool> {
        let outcome = condition
            .evaluate(context)
            .and_then(|value| value.op_logical());
        outcome.map_err(|error| self.raise(context, error))
    }

    /// Reads the current frame's argument `at`, for native bodies.
    fn frame_arg(context: &CallingContext, at: usize) -> RunResult<Value> {
        let frame = context
            .current_frame()
            .ok_or_else(|| RunError::fatal("Native function called with no frame."))?;
        let frame = frame.borrow();
        frame
            .args
            .get(at)
            .cloned()
            .ok_or_else(|| RunError::fatal("Native function called with too few arguments."))
    }

    fn native_return(&self, value: Value) -> Flow {
        Some(FlowControl {
            token: self.token.clone(),
            kind: FlowKind::Return,
            target: NO_TARGET,
            value: Some(value),
        })
    }

    /// Reports a typed failure of a native body to the debugger, without
    /// annotation: native bodies have no meaningful source position.
    fn native_raise(context: &mut CallingContext, error: RunError) -> RunError {
        if error.is_typed() {
            context.report(&error);
        }
        error
    }

    pub fn execute(&self, context: &mut CallingContext) -> RunResult<Flow> {
        match &self.kind {
            StmtKind::Nop => Ok(None),
            StmtKind::Expr(expr) => {
                expr.evaluate(context)?;
                Ok(None)
            }
            StmtKind::Seq(statements) => {
                for statement in statements {
                    if let Some(flow) = statement.execute(context)? {
                        return Ok(Some(flow));
                    }
                }
                Ok(None)
            }
            StmtKind::Assignment {
                getter,
                setter,
                chain,
                rhs,
            } => {
                match chain {
                    None => {
                        let value = rhs.evaluate(context)?;
                        setter.set(context, value)?;
                    }
                    Some(chain) => {
                        let root = getter.get(context)?;
                        let rebuilt = chain.evaluate(context, &root, rhs)?;
                        setter.set(context, rebuilt)?;
                    }
                }
                Ok(None)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition_value(context, condition)? {
                    then_branch.execute(context)
                } else {
                    else_branch.execute(context)
                }
            }
            StmtKind::While {
                condition,
                body,
                id,
            } => {
                while self.condition_value(context, condition)? {
                    if let Some(flow) = body.execute(context)? {
                        match flow.kind {
                            FlowKind::Return => return Ok(Some(flow)),
                            FlowKind::Break => {
                                if flow.target == *id {
                                    return Ok(None);
                                }
                                return Ok(Some(flow));
                            }
                            FlowKind::Continue => {
                                if flow.target != *id {
                                    return Ok(Some(flow));
                                }
                                // This iteration stops; on to the next.
                            }
                        }
                    }
                }
                Ok(None)
            }
            StmtKind::Select { control, cases } => {
                let control = control.evaluate(context)?;
                let mut position = 0;
                while position < cases.len() {
                    if cases[position].matches(context, &control)? {
                        // Run the matched body, then fall through non-breaking
                        // successors until one breaks or the select ends.
                        loop {
                            if let Some(flow) = cases[position].body.execute(context)? {
                                return Ok(Some(flow));
                            }
                            position += 1;
                            if position >= cases.len() || cases[position].breaking {
                                return Ok(None);
                            }
                        }
                    }
                    position += 1;
                }
                Ok(None)
            }
            StmtKind::For {
                setter,
                lower,
                ascending,
                upper,
                step,
                body,
                id,
            } => {
                let start = lower.evaluate(context)?;
                match upper {
                    Some(upper) => self.counted_loop(
                        context, setter, start, *ascending, upper, step.as_ref(), body, *id,
                    ),
                    None => self.collection_loop(context, setter, &start, body, *id),
                }
            }
            StmtKind::FlowStmt {
                kind,
                target,
                value,
            } => {
                let payload = match value {
                    Some(expr) => Some(
                        expr.evaluate(context)
                            .map_err(|error| self.raise(context, error))?,
                    ),
                    None => None,
                };
                Ok(Some(FlowControl {
                    token: self.token.clone(),
                    kind: *kind,
                    target: *target,
                    value: payload,
                }))
            }
            StmtKind::NativeConstant(function) => Ok(self.native_return(function())),
            StmtKind::NativeConstantCtx(function) => {
                let value = function(context).map_err(|error| Self::native_raise(context, error))?;
                Ok(self.native_return(value))
            }
            StmtKind::NativeUnary(function) => {
                let arg = Self::frame_arg(context, 0)?;
                let value = function(&arg).map_err(|error| Self::native_raise(context, error))?;
                Ok(self.native_return(value))
            }
            StmtKind::NativeUnaryCtx(function) => {
                let arg = Self::frame_arg(context, 0)?;
                let value =
                    function(context, &arg).map_err(|error| Self::native_raise(context, error))?;
                Ok(self.native_return(value))
            }
            StmtKind::NativeBinary(function) => {
                let lhs = Self::frame_arg(context, 0)?;
                let rhs = Self::frame_arg(context, 1)?;
                let value =
                    function(&lhs, &rhs).map_err(|error| Self::native_raise(context, error))?;
                Ok(self.native_return(value))
            }
            StmtKind::NativeBinaryCtx(function) => {
                let lhs = Self::frame_arg(context, 0)?;
                let rhs = Self::frame_arg(context, 1)?;
                let value = function(context, &lhs, &rhs)
                    .map_err(|error| Self::native_raise(context, error))?;
                Ok(self.native_return(value))
            }
            StmtKind::NativeTernary(function) => {
                let first = Self::frame_arg(context, 0)?;
                let second = Self::frame_arg(context, 1)?;
                let third = Self::frame_arg(context, 2)?;
                let value = function(&first, &second, &third)
                    .map_err(|error| Self::native_raise(context, error))?;
                Ok(self.native_return(value))
            }
        }
    }

    /// Handles one flow token inside a loop body. `Ok(None)` continues the
    /// loop, `Ok(Some(..))` unwinds, and a matched break signals done via
    /// the bool.
    fn loop_flow(flow: FlowControl, id: u64) -> (Option<FlowControl>, bool) {
        match flow.kind {
            FlowKind::Return => (Some(flow), false),
            FlowKind::Break => {
                if flow.target == id {
                    (None, true)
                } else {
                    (Some(flow), false)
                }
            }
            FlowKind::Continue => {
                if flow.target == id {
                    (None, false)
                } else {
                    (Some(flow), false)
                }
            }
        }
    }

    #[expect(clippy::too_many_arguments, reason = "the counted loop has this many pieces")]
    fn counted_loop(
        &self,
        context: &mut CallingContext,
        setter: &Setter,
        start: Value,
        ascending: bool,
        upper: &Rc<Expr>,
        step: Option<&Rc<Expr>>,
        body: &Rc<Stmt>,
        id: u64,
    ) -> RunResult<Flow> {
        let limit = upper.evaluate(context)?;
        let delta = match step {
            Some(step) => step.evaluate(context)?,
            None => {
                if ascending {
                    Value::Float(Number::one())
                } else {
                    Value::Float(Number::one().neg())
                }
            }
        };

        let mut current = start;
        loop {
            setter.set(context, current.clone())?;

            let continuing = if ascending {
                current.op_leq(&limit)
            } else {
                current.op_geq(&limit)
            }
            .map_err(|error| self.raise(context, error))?;
            if !continuing {
                return Ok(None);
            }

            if let Some(flow) = body.execute(context)? {
                let (unwound, done) = Self::loop_flow(flow, id);
                if let Some(flow) = unwound {
                    return Ok(Some(flow));
                }
                if done {
                    return Ok(None);
                }
            }

            current = current
                .op_add(&delta)
                .map_err(|error| self.raise(context, error))?;
        }
    }

    fn collection_loop(
        &self,
        context: &mut CallingContext,
        setter: &Setter,
        collection: &Value,
        body: &Rc<Stmt>,
        id: u64,
    ) -> RunResult<Flow> {
        match collection {
            Value::Array(items) => {
                for item in items.iter() {
                    setter.set(context, item.clone())?;
                    if let Some(flow) = body.execute(context)? {
                        let (unwound, done) = Self::loop_flow(flow, id);
                        if let Some(flow) = unwound {
                            return Ok(Some(flow));
                        }
                        if done {
                            return Ok(None);
                        }
                    }
                }
                Ok(None)
            }
            Value::Dict(entries) => {
                for (key, value) in entries.iter() {
                    let pair = Value::Array(Rc::new(vec![key.clone(), value.clone()]));
                    setter.set(context, pair)?;
                    if let Some(flow) = body.execute(context)? {
                        let (unwound, done) = Self::loop_flow(flow, id);
                        if let Some(flow) = unwound {
                            return Ok(Some(flow));
                        }
                        if done {
                            return Ok(None);
                        }
                    }
                }
                Ok(None)
            }
            Value::CellRange(range) => {
                for position in 0..range.size() {
                    let cell = range
                        .cell_at(position)
                        .map(Value::CellRef)
                        .expect("position is in range");
                    setter.set(context, cell)?;
                    if let Some(flow) = body.execute(context)? {
                        let (unwound, done) = Self::loop_flow(flow, id);
                        if let Some(flow) = unwound {
                            return Ok(Some(flow));
                        }
                        if done {
                            return Ok(None);
                        }
                    }
                }
                Ok(None)
            }
            _ => {
                let error = RunError::typed("Error iterating over non-Collection.");
                Err(self.raise(context, error))
            }
        }
    }
}

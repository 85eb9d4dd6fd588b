//! Cell expression trees: evaluation into Script values and rendering back
//! to source.
//!
//! Rendering exists for copy/paste and redisplay: relative references get
//! the target cell's coordinates added, absolute ones do not, and numeric
//! constants render through their source form so special values round-trip.

use std::rc::Rc;

use super::engine;
use super::token::CellToken;
use crate::context::CallingContext;
use crate::error::{RunError, RunResult};
use crate::number::Number;
use crate::script::expr::{Expr, call_function};
use crate::script::token::{Lexeme, Token};
use crate::value::{CellRange, Value};

/// Converts a one-based column index to its letter form (`1` → `A`,
/// `27` → `AA`).
#[must_use]
pub fn column_letters(index: i64) -> String {
    const TWO: i64 = 26;
    const THREE: i64 = 26 + 26 * 26;
    const FOUR: i64 = 26 + 26 * 26 + 26 * 26 * 26;
    let index = index - 1;
    let letter = |value: i64| (b'A' + (value.rem_euclid(26)) as u8) as char;
    if index < TWO {
        letter(index).to_string()
    } else if index < THREE {
        let value = index - TWO;
        format!("{}{}", letter(value / 26), letter(value))
    } else if index < FOUR {
        let value = index - THREE;
        format!("{}{}{}", letter(value / 676), letter(value / 26), letter(value))
    } else {
        let value = index - FOUR;
        format!(
            "{}{}{}{}",
            letter(value / 17576),
            letter(value / 676),
            letter(value / 26),
            letter(value)
        )
    }
}

/// Converts column letters to their one-based index (`A` → `1`,
/// `AA` → `27`).
#[must_use]
pub fn column_index(letters: &str) -> i64 {
    let mut value = 0;
    for byte in letters.bytes() {
        value = value * 26 + i64::from(byte - b'A');
    }
    1 + match letters.len() {
        2 => value + 26,
        3 => value + 26 + 26 * 26,
        4 => value + 26 + 26 * 26 + 26 * 26 * 26,
        _ => value,
    }
}

/// A cell expression node.
#[derive(Debug)]
pub struct CellExpr {
    pub token: CellToken,
    pub kind: CellExprKind,
}

/// The expression forms of the Cell language.
#[derive(Debug)]
pub enum CellExprKind {
    Constant(Value),
    /// A `_name` reference through the process-wide name map.
    Name(String),
    /// A call into a Script-defined function: the cell arguments are
    /// bundled into one Array value.
    FunctionCall {
        name: String,
        location: Rc<Expr>,
        args: Vec<Rc<CellExpr>>,
    },
    Plus(Rc<CellExpr>, Rc<CellExpr>),
    Minus(Rc<CellExpr>, Rc<CellExpr>),
    Multiply(Rc<CellExpr>, Rc<CellExpr>),
    Divide(Rc<CellExpr>, Rc<CellExpr>),
    Cat(Rc<CellExpr>, Rc<CellExpr>),
    Equals(Rc<CellExpr>, Rc<CellExpr>),
    NotEqual(Rc<CellExpr>, Rc<CellExpr>),
    Greater(Rc<CellExpr>, Rc<CellExpr>),
    Less(Rc<CellExpr>, Rc<CellExpr>),
    Geq(Rc<CellExpr>, Rc<CellExpr>),
    Leq(Rc<CellExpr>, Rc<CellExpr>),
    Negate(Rc<CellExpr>),
    MakeRange(Rc<CellExpr>, Rc<CellExpr>),
    /// Reattaches the reference on the left to another sheet.
    MoveReference(Rc<CellExpr>, String),
}

impl CellExpr {
    #[must_use]
    pub fn new(token: CellToken, kind: CellExprKind) -> Rc<Self> {
        Rc::new(Self { token, kind })
    }

    fn raise(&self, context: &mut CallingContext, error: RunError) -> RunError {
        let annotated = match error {
            RunError::Typed(message) => {
                RunError::Typed(format!("{message} at {}", self.token.location))
            }
            fatal @ RunError::Fatal(_) => fatal,
        };
        context.report(&annotated);
        annotated
    }

    /// Evaluates a subexpression and unwraps a cell reference to the value
    /// of the referenced cell. Arithmetic and comparison sites do this;
    /// function arguments do not.
    fn operand(&self, context: &mut CallingContext, expr: &Rc<CellExpr>) -> RunResult<Value> {
        let value = expr.evaluate(context)?;
        match value {
            Value::CellRef(cell) => engine::cell_eval(context, &cell),
            other => Ok(other),
        }
    }

    pub fn evaluate(&self, context: &mut CallingContext) -> RunResult<Value> {
        match &self.kind {
            CellExprKind::Constant(value) => Ok(value.clone()),
            CellExprKind::Name(name) => {
                let bound = engine::lookup_name(context, name)?;
                match bound {
                    Some(cell) => Ok(Value::CellRef(cell)),
                    None => {
                        let error =
                            RunError::typed(format!("Name >{name}< has not been defined"));
                        Err(self.raise(context, error))
                    }
                }
            }
            CellExprKind::FunctionCall {
                name,
                location,
                args,
            } => {
                let function = location.evaluate(context)?;
                let Value::Function(function) = function else {
                    let error = RunError::typed(format!("Name >{name}< is not a function"));
                    return Err(self.raise(context, error));
                };
                let mut bundled = Vec::with_capacity(args.len());
                for arg in args {
                    bundled.push(arg.evaluate(context)?);
                }
                let call_token = Token::new(
                    Lexeme::Identifier,
                    format!("@{name}"),
                    "cell",
                    1,
                    self.token.location,
                );
                call_function(
                    context,
                    &function,
                    vec![Value::Array(Rc::new(bundled))],
                    &call_token,
                )
            }
            CellExprKind::Plus(lhs, rhs) => {
                let lhs = self.operand(context, lhs)?;
                let rhs = self.operand(context, rhs)?;
                lhs.op_add(&rhs).map_err(|error| self.raise(context, error))
            }
            CellExprKind::Minus(lhs, rhs) => {
                let lhs = self.operand(context, lhs)?;
                let rhs = self.operand(context, rhs)?;
                lhs.op_sub(&rhs).map_err(|error| self.raise(context, error))
            }
            CellExprKind::Multiply(lhs, rhs) => {
                let lhs = self.operand(context, lhs)?;
                let rhs = self.operand(context, rhs)?;
                lhs.op_mul(&rhs).map_err(|error| self.raise(context, error))
            }
            CellExprKind::Divide(lhs, rhs) => {
                let lhs = self.operand(context, lhs)?;
                let rhs = self.operand(context, rhs)?;
                lhs.op_div(&rhs).map_err(|error| self.raise(context, error))
            }
            CellExprKind::Cat(lhs, rhs) => {
                let lhs = self.operand(context, lhs)?;
                let rhs = self.operand(context, rhs)?;
                lhs.op_cat(&rhs).map_err(|error| self.raise(context, error))
            }
            CellExprKind::Equals(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_equal),
            CellExprKind::NotEqual(lhs, rhs) => {
                self.relation(context, lhs, rhs, Value::op_not_equal)
            }
            CellExprKind::Greater(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_greater),
            CellExprKind::Less(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_less),
            CellExprKind::Geq(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_geq),
            CellExprKind::Leq(lhs, rhs) => self.relation(context, lhs, rhs, Value::op_leq),
            CellExprKind::Negate(arg) => {
                let arg = self.operand(context, arg)?;
                arg.op_neg().map_err(|error| self.raise(context, error))
            }
            CellExprKind::MakeRange(lhs, rhs) => {
                let lhs = lhs.evaluate(context)?;
                let rhs = rhs.evaluate(context)?;
                let (Value::CellRef(first), Value::CellRef(second)) = (&lhs, &rhs) else {
                    let error = RunError::typed("Error making a range of non-CellRefs.");
                    return Err(self.raise(context, error));
                };
                let (base_col, base_row) = engine::current_cell(context)?;
                let sheet = first.sheet.clone().or_else(|| second.sheet.clone());
                Ok(Value::CellRange(CellRange::new(
                    sheet,
                    first.resolve(base_col, base_row),
                    second.resolve(base_col, base_row),
                )))
            }
            CellExprKind::MoveReference(arg, sheet) => {
                let arg = arg.evaluate(context)?;
                let Value::CellRef(mut cell) = arg else {
                    let error = RunError::typed("Error moving a non-CellRef to another sheet.");
                    return Err(self.raise(context, error));
                };
                cell.sheet = Some(Rc::from(sheet.as_str()));
                Ok(Value::CellRef(cell))
            }
        }
    }

    fn relation(
        &self,
        context: &mut CallingContext,
        lhs: &Rc<CellExpr>,
        rhs: &Rc<CellExpr>,
        op: fn(&Value, &Value) -> RunResult<bool>,
    ) -> RunResult<Value> {
        let lhs = self.operand(context, lhs)?;
        let rhs = self.operand(context, rhs)?;
        match op(&lhs, &rhs) {
            Ok(true) => Ok(Value::Float(Number::one())),
            Ok(false) => Ok(Value::Float(Number::zero())),
            Err(error) => Err(self.raise(context, error)),
        }
    }

    /// Renders back to source as seen from the cell at `(col, row)`:
    /// relative reference axes have the coordinates added.
    #[must_use]
    pub fn render(&self, col: i64, row: i64) -> String {
        self.render_at(col, row, 1)
    }

    /// Precedence levels: 1 relational, 2 additive/concatenation,
    /// 3 multiplicative, 4 unary, 5 primary. A node below the required
    /// level is parenthesized.
    fn render_at(&self, col: i64, row: i64, level: u8) -> String {
        let (text, my_level) = match &self.kind {
            CellExprKind::Constant(value) => (render_constant(value, col, row), 5),
            CellExprKind::Name(name) => (format!("_{name}"), 5),
            CellExprKind::FunctionCall { name, args, .. } => {
                let text = if args.is_empty() {
                    format!("@{name}")
                } else {
                    let rendered: Vec<String> =
                        args.iter().map(|arg| arg.render_at(col, row, 1)).collect();
                    format!("@{name}({})", rendered.join(";"))
                };
                (text, 5)
            }
            CellExprKind::Plus(lhs, rhs) => (
                format!("{}+{}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 3)),
                2,
            ),
            CellExprKind::Minus(lhs, rhs) => (
                format!("{}-{}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 3)),
                2,
            ),
            CellExprKind::Cat(lhs, rhs) => (
                format!("{}&{}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 3)),
                2,
            ),
            CellExprKind::Multiply(lhs, rhs) => (
                format!("{}*{}", lhs.render_at(col, row, 3), rhs.render_at(col, row, 4)),
                3,
            ),
            CellExprKind::Divide(lhs, rhs) => (
                format!("{}/{}", lhs.render_at(col, row, 3), rhs.render_at(col, row, 4)),
                3,
            ),
            CellExprKind::Equals(lhs, rhs) => (
                format!("{}={}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 2)),
                1,
            ),
            CellExprKind::NotEqual(lhs, rhs) => (
                format!("{}<>{}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 2)),
                1,
            ),
            CellExprKind::Greater(lhs, rhs) => (
                format!("{}>{}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 2)),
                1,
            ),
            CellExprKind::Less(lhs, rhs) => (
                format!("{}<{}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 2)),
                1,
            ),
            CellExprKind::Geq(lhs, rhs) => (
                format!("{}>={}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 2)),
                1,
            ),
            CellExprKind::Leq(lhs, rhs) => (
                format!("{}<={}", lhs.render_at(col, row, 2), rhs.render_at(col, row, 2)),
                1,
            ),
            CellExprKind::Negate(arg) => (format!("-{}", arg.render_at(col, row, 4)), 4),
            CellExprKind::MakeRange(lhs, rhs) => (
                format!("{}:{}", lhs.render_at(col, row, 5), rhs.render_at(col, row, 5)),
                5,
            ),
            CellExprKind::MoveReference(arg, sheet) => {
                (format!("{}!{sheet}", arg.render_at(col, row, 5)), 5)
            }
        };
        if my_level < level {
            format!("({text})")
        } else {
            text
        }
    }
}

fn render_constant(value: &Value, col: i64, row: i64) -> String {
    match value {
        Value::Float(number) => number.to_source_string(),
        Value::Str(text) => format!("\"{}\"", text.replace('"', "\"\"")),
        Value::CellRef(cell) => {
            let mut out = String::new();
            if cell.col_absolute {
                out.push('$');
                out.push_str(&column_letters(cell.col));
            } else {
                out.push_str(&column_letters(cell.col + col));
            }
            if cell.row_absolute {
                out.push('$');
                out.push_str(&cell.row.to_string());
            } else {
                out.push_str(&(cell.row + row).to_string());
            }
            out
        }
        other => other.debug_render(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letter_round_trip() {
        for (index, text) in [(1, "A"), (26, "Z"), (27, "AA"), (28, "AB"), (702, "ZZ"), (703, "AAA")] {
            assert_eq!(column_letters(index), text);
            assert_eq!(column_index(text), index);
        }
        assert_eq!(column_index(&column_letters(18278)), 18278);
    }
}

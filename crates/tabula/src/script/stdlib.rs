//! The standard library.
//!
//! Native functions are Rust functions wrapped in the leaf statement forms
//! so they look like Script functions: they live in the global scope as
//! ordinary function values and are called through the same frame
//! machinery. On top of the natives sits a bundled Script-source library
//! (aggregates and the cell-side wrappers), compiled at engine start in
//! functions-only mode.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cell::engine;
use crate::context::CallingContext;
use crate::error::{RunError, RunResult};
use crate::number::{self, Number, RoundMode};
use crate::scope::Scope;
use crate::value::{FunctionValue, Value};

use super::lexer::Lexer;
use super::parser::Parser;
use super::stmt::{Stmt, StmtKind};
use super::symbol_table::{FunctionDef, SymbolTable};
use super::token::Token;

fn bool_value(value: bool) -> Value {
    Value::Float(if value { Number::one() } else { Number::zero() })
}

fn want_float<'a>(value: &'a Value, doing: &str) -> RunResult<&'a Number> {
    match value {
        Value::Float(number) => Ok(number),
        other => Err(RunError::typed(format!(
            "Error {doing} a {}.",
            other.type_name()
        ))),
    }
}

fn want_string<'a>(value: &'a Value, doing: &str) -> RunResult<&'a str> {
    match value {
        Value::Str(text) => Ok(text),
        other => Err(RunError::typed(format!(
            "Error {doing} a {}.",
            other.type_name()
        ))),
    }
}

fn want_index(value: &Value, doing: &str) -> RunResult<usize> {
    let number = want_float(value, doing)?;
    if !number.is_integral() {
        return Err(RunError::typed(format!(
            "Error {doing} a non-integer Float."
        )));
    }
    let raw = number.to_f64();
    if raw < 0.0 {
        return Err(RunError::typed(format!("Error {doing} a negative Float.")));
    }
    Ok(raw as usize)
}

// Zero-argument constructors and configuration reads.

fn nan() -> Value {
    Value::Float(Number::nan())
}

fn new_array() -> Value {
    Value::empty_array()
}

fn new_dictionary() -> Value {
    Value::empty_dict()
}

fn get_round_mode() -> Value {
    Value::Float(Number::from_usize(usize::from(number::round_mode().code())))
}

fn get_default_precision() -> Value {
    Value::Float(Number::from_usize(number::default_precision()))
}

fn enter_debugger(context: &mut CallingContext) -> RunResult<Value> {
    if let Some(debugger) = context.debugger.clone() {
        debugger.enter_debugger("", context);
    }
    Ok(Value::Float(Number::zero()))
}

// Numeric unary functions.

fn sqr(value: &Value) -> RunResult<Value> {
    let number = want_float(value, "squaring")?;
    Ok(Value::Float(number.mul(number)))
}

fn abs(value: &Value) -> RunResult<Value> {
    let number = want_float(value, "taking the absolute value of")?;
    if number.is_signed() {
        Ok(Value::Float(number.neg()))
    } else {
        Ok(value.clone())
    }
}

fn round(value: &Value) -> RunResult<Value> {
    Ok(Value::Float(want_float(value, "rounding")?.round()))
}

fn floor(value: &Value) -> RunResult<Value> {
    Ok(Value::Float(want_float(value, "flooring")?.floor()))
}

fn ceil(value: &Value) -> RunResult<Value> {
    Ok(Value::Float(want_float(value, "taking the ceiling of")?.ceil()))
}

// String functions.

fn to_string(value: &Value) -> RunResult<Value> {
    match value {
        Value::Float(number) => Ok(Value::string(number.to_string())),
        Value::Str(_) => Ok(value.clone()),
        other => Err(RunError::typed(format!(
            "Error converting a {} to a String.",
            other.type_name()
        ))),
    }
}

fn length(value: &Value) -> RunResult<Value> {
    let text = want_string(value, "taking the Length of")?;
    Ok(Value::Float(Number::from_usize(text.chars().count())))
}

fn value_of(value: &Value) -> RunResult<Value> {
    let text = want_string(value, "converting to a Float")?;
    Ok(Value::Float(Number::parse(text)))
}

fn to_character(value: &Value) -> RunResult<Value> {
    let code = want_index(value, "converting to a character")?;
    let code = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| RunError::typed("Error converting a Float outside character range."))?;
    Ok(Value::string(code.to_string()))
}

fn from_character(value: &Value) -> RunResult<Value> {
    let text = want_string(value, "taking the character code of")?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(only), None) => Ok(Value::Float(Number::from_usize(only as usize))),
        _ => Err(RunError::typed(
            "Error taking the character code of a String not one character long.",
        )),
    }
}

// Predicates.

fn is_nan(value: &Value) -> RunResult<Value> {
    Ok(bool_value(want_float(value, "testing")?.is_nan()))
}

fn is_infinity(value: &Value) -> RunResult<Value> {
    Ok(bool_value(want_float(value, "testing")?.is_inf()))
}

fn is_float(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::Float(_))))
}

fn is_string(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::Str(_))))
}

fn is_array(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::Array(_))))
}

fn is_dictionary(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::Dict(_))))
}

fn is_function(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::Function(_))))
}

fn is_nil(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::Nil)))
}

fn is_cell_ref(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::CellRef(_))))
}

fn is_cell_range(value: &Value) -> RunResult<Value> {
    Ok(bool_value(matches!(value, Value::CellRange(_))))
}

// Collection functions.

fn size(value: &Value) -> RunResult<Value> {
    let count = match value {
        Value::Array(items) => items.len(),
        Value::Dict(entries) => entries.len(),
        Value::CellRange(range) => range.size(),
        other => {
            return Err(RunError::typed(format!(
                "Error taking the Size of a {}.",
                other.type_name()
            )));
        }
    };
    Ok(Value::Float(Number::from_usize(count)))
}

fn pop_front(value: &Value) -> RunResult<Value> {
    match value {
        Value::Array(items) if !items.is_empty() => {
            Ok(Value::Array(Rc::new(items[1..].to_vec())))
        }
        Value::Array(_) => Err(RunError::typed("Error removing from an empty Array.")),
        other => Err(RunError::typed(format!(
            "Error removing from a {}.",
            other.type_name()
        ))),
    }
}

fn pop_back(value: &Value) -> RunResult<Value> {
    match value {
        Value::Array(items) if !items.is_empty() => {
            Ok(Value::Array(Rc::new(items[..items.len() - 1].to_vec())))
        }
        Value::Array(_) => Err(RunError::typed("Error removing from an empty Array.")),
        other => Err(RunError::typed(format!(
            "Error removing from a {}.",
            other.type_name()
        ))),
    }
}

fn get_keys(value: &Value) -> RunResult<Value> {
    match value {
        Value::Dict(entries) => Ok(Value::Array(Rc::new(entries.keys().cloned().collect()))),
        other => Err(RunError::typed(format!(
            "Error getting the keys of a {}.",
            other.type_name()
        ))),
    }
}

// Numeric configuration.

fn set_round_mode(value: &Value) -> RunResult<Value> {
    let code = want_index(value, "setting the rounding mode to")?;
    let mode = u8::try_from(code)
        .ok()
        .and_then(RoundMode::from_code)
        .ok_or_else(|| RunError::typed("Error setting the rounding mode to an unknown mode."))?;
    let in_force = number::set_round_mode(mode);
    Ok(Value::Float(Number::from_usize(usize::from(in_force.code()))))
}

fn set_default_precision(value: &Value) -> RunResult<Value> {
    let precision = want_index(value, "setting the default precision to")?;
    number::set_default_precision(precision);
    Ok(Value::Float(Number::from_usize(precision)))
}

fn get_precision(value: &Value) -> RunResult<Value> {
    let number = want_float(value, "taking the precision of")?;
    Ok(Value::Float(Number::from_usize(number.precision())))
}

fn set_precision(value: &Value, precision: &Value) -> RunResult<Value> {
    let number = want_float(value, "setting the precision of")?;
    let precision = want_index(precision, "setting a precision to")?;
    Ok(Value::Float(number.with_precision(precision)))
}

// Logging.

fn log_at_level(
    context: &mut CallingContext,
    value: &Value,
    level: &str,
) -> RunResult<Value> {
    let text = want_string(value, "logging")?;
    context.log(&format!("{level}: {text}"));
    Ok(value.clone())
}

fn error_log(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    log_at_level(context, value, "ERROR")
}

fn warn_log(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    log_at_level(context, value, "WARN")
}

fn info_log(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    log_at_level(context, value, "INFO")
}

fn fatal_log(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    log_at_level(context, value, "FATAL")
}

fn debug_print(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    let rendered = value.debug_render();
    context.log(&rendered);
    Ok(value.clone())
}

// Dynamic evaluation.

/// `Eval`: runs a string as a Script *expression* against the current
/// scope and globals, in a duplicate context with the debugger disabled.
/// A statement sequence is not an expression; it surfaces as a typed
/// error, never a fatal one.
fn eval(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    let text = want_string(value, "evaluating")?.to_owned();
    let mut table = SymbolTable::new(Rc::clone(&context.globals));
    if let Some(scope) = &context.scope {
        table.push_scope(Rc::clone(scope));
    }
    let parsed = {
        let logger = Rc::clone(&context.logger);
        let mut logger = logger.borrow_mut();
        let mut lexer = Lexer::new(&text, "Eval Argument");
        Parser::parse_full_expression(&mut lexer, &mut table, &mut *logger)
    };
    match parsed {
        Some(expr) => {
            let mut duplicate = context.duplicate();
            expr.evaluate(&mut duplicate)
        }
        None => Err(RunError::typed("Error parsing Eval argument.")),
    }
}

/// `EvalCell`: dereferences a cell reference through the generation cache;
/// any other value passes through unchanged.
fn eval_cell(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    match value {
        Value::CellRef(cell) => engine::cell_eval(context, cell),
        other => Ok(other.clone()),
    }
}

/// `CellEval`: parses a string as a Cell expression at the current cell
/// and evaluates it.
fn cell_eval(context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    let text = want_string(value, "evaluating as a cell expression")?.to_owned();
    engine::eval_cell_source(context, &text)
}

fn expand_range(_context: &mut CallingContext, value: &Value) -> RunResult<Value> {
    match value {
        Value::CellRange(range) => {
            let cells: Vec<Value> = (0..range.size())
                .filter_map(|position| range.cell_at(position).map(Value::CellRef))
                .collect();
            Ok(Value::Array(Rc::new(cells)))
        }
        other => Err(RunError::typed(format!(
            "Error expanding a {}.",
            other.type_name()
        ))),
    }
}

/// `Let`: registers a named cell.
fn let_binding(context: &mut CallingContext, name: &Value, target: &Value) -> RunResult<Value> {
    let Value::Str(name_text) = name else {
        return Err(RunError::typed("Error creating name: name not String."));
    };
    let Value::CellRef(cell) = target else {
        return Err(RunError::typed(
            "Error creating name: target not a Cell Reference.",
        ));
    };
    engine::register_name(context, name_text, cell.clone())?;
    Ok(name.clone())
}

// Binary numeric and collection functions.

fn min(lhs: &Value, rhs: &Value) -> RunResult<Value> {
    let left = want_float(lhs, "taking the minimum of")?;
    let right = want_float(rhs, "taking the minimum of")?;
    if left.short_min_max() {
        return Ok(lhs.clone());
    }
    if right.short_min_max() {
        return Ok(rhs.clone());
    }
    if right.less(left) {
        Ok(rhs.clone())
    } else {
        Ok(lhs.clone())
    }
}

fn max(lhs: &Value, rhs: &Value) -> RunResult<Value> {
    let left = want_float(lhs, "taking the maximum of")?;
    let right = want_float(rhs, "taking the maximum of")?;
    if left.short_min_max() {
        return Ok(lhs.clone());
    }
    if right.short_min_max() {
        return Ok(rhs.clone());
    }
    if right.greater(left) {
        Ok(rhs.clone())
    } else {
        Ok(lhs.clone())
    }
}

fn get_index(container: &Value, index: &Value) -> RunResult<Value> {
    match container {
        Value::Array(_) | Value::CellRange(_) => container.index(index),
        other => Err(RunError::typed(format!(
            "Error indexing a {}.",
            other.type_name()
        ))),
    }
}

fn new_array_default(count: &Value, fill: &Value) -> RunResult<Value> {
    let count = want_index(count, "sizing an Array with")?;
    Ok(Value::Array(Rc::new(vec![fill.clone(); count])))
}

fn push_back(array: &Value, value: &Value) -> RunResult<Value> {
    match array {
        Value::Array(items) => {
            let mut rebuilt = items.as_ref().clone();
            rebuilt.push(value.clone());
            Ok(Value::Array(Rc::new(rebuilt)))
        }
        other => Err(RunError::typed(format!(
            "Error adding to a {}.",
            other.type_name()
        ))),
    }
}

fn push_front(array: &Value, value: &Value) -> RunResult<Value> {
    match array {
        Value::Array(items) => {
            let mut rebuilt = Vec::with_capacity(items.len() + 1);
            rebuilt.push(value.clone());
            rebuilt.extend(items.iter().cloned());
            Ok(Value::Array(Rc::new(rebuilt)))
        }
        other => Err(RunError::typed(format!(
            "Error adding to a {}.",
            other.type_name()
        ))),
    }
}

fn contains_key(dict: &Value, key: &Value) -> RunResult<Value> {
    match dict {
        Value::Dict(entries) => Ok(bool_value(entries.contains_key(key))),
        other => Err(RunError::typed(format!(
            "Error looking for a key in a {}.",
            other.type_name()
        ))),
    }
}

fn remove_key(dict: &Value, key: &Value) -> RunResult<Value> {
    match dict {
        Value::Dict(entries) => {
            if !entries.contains_key(key) {
                return Err(RunError::typed(
                    "Error removing a Value not in the Dictionary.",
                ));
            }
            let mut rebuilt = entries.as_ref().clone();
            rebuilt.remove(key);
            Ok(Value::Dict(Rc::new(rebuilt)))
        }
        other => Err(RunError::typed(format!(
            "Error removing a key from a {}.",
            other.type_name()
        ))),
    }
}

fn get_value(dict: &Value, key: &Value) -> RunResult<Value> {
    match dict {
        Value::Dict(_) => dict.index(key),
        other => Err(RunError::typed(format!(
            "Error getting a value from a {}.",
            other.type_name()
        ))),
    }
}

// Ternary functions.

/// `SubString(string; start; length)`, zero-based, in characters.
fn sub_string(string: &Value, start: &Value, length: &Value) -> RunResult<Value> {
    let text = want_string(string, "taking a substring of")?;
    let start = want_index(start, "starting a substring at")?;
    let length = want_index(length, "sizing a substring with")?;
    let chars: Vec<char> = text.chars().collect();
    if start + length > chars.len() {
        return Err(RunError::typed("Error taking a substring out of bounds."));
    }
    Ok(Value::string(
        chars[start..start + length].iter().collect::<String>(),
    ))
}

fn set_index(array: &Value, index: &Value, value: &Value) -> RunResult<Value> {
    match array {
        Value::Array(_) => array.array_with(index, value.clone()),
        other => Err(RunError::typed(format!(
            "Error indexing a {}.",
            other.type_name()
        ))),
    }
}

fn insert(dict: &Value, key: &Value, value: &Value) -> RunResult<Value> {
    match dict {
        Value::Dict(_) => dict.dict_with(key.clone(), value.clone()),
        other => Err(RunError::typed(format!(
            "Error inserting into a {}.",
            other.type_name()
        ))),
    }
}

fn add_function(scope: &mut Scope, name: &str, arity: usize, kind: StmtKind) {
    let body = Stmt {
        token: Token::synthetic(),
        kind,
    };
    let def = FunctionDef::native(name, arity, body);
    scope.define(name, Value::Function(FunctionValue::new(def, Vec::new())));
}

/// Registers every native function into a global scope.
pub fn create_global_scope(scope: &mut Scope) {
    add_function(scope, "NaN", 0, StmtKind::NativeConstant(nan));
    add_function(scope, "NewArray", 0, StmtKind::NativeConstant(new_array));
    add_function(scope, "NewDictionary", 0, StmtKind::NativeConstant(new_dictionary));
    add_function(scope, "GetRoundMode", 0, StmtKind::NativeConstant(get_round_mode));
    add_function(scope, "GetDefaultPrecision", 0, StmtKind::NativeConstant(get_default_precision));

    add_function(scope, "EnterDebugger", 0, StmtKind::NativeConstantCtx(enter_debugger));

    add_function(scope, "Sqr", 1, StmtKind::NativeUnary(sqr));
    add_function(scope, "Abs", 1, StmtKind::NativeUnary(abs));
    add_function(scope, "Round", 1, StmtKind::NativeUnary(round));
    add_function(scope, "Floor", 1, StmtKind::NativeUnary(floor));
    add_function(scope, "Ceil", 1, StmtKind::NativeUnary(ceil));
    add_function(scope, "ToString", 1, StmtKind::NativeUnary(to_string));
    add_function(scope, "Length", 1, StmtKind::NativeUnary(length));
    add_function(scope, "IsNaN", 1, StmtKind::NativeUnary(is_nan));
    add_function(scope, "IsInfinity", 1, StmtKind::NativeUnary(is_infinity));
    add_function(scope, "ValueOf", 1, StmtKind::NativeUnary(value_of));
    add_function(scope, "ToCharacter", 1, StmtKind::NativeUnary(to_character));
    add_function(scope, "FromCharacter", 1, StmtKind::NativeUnary(from_character));
    add_function(scope, "IsFloat", 1, StmtKind::NativeUnary(is_float));
    add_function(scope, "IsString", 1, StmtKind::NativeUnary(is_string));
    add_function(scope, "IsArray", 1, StmtKind::NativeUnary(is_array));
    add_function(scope, "IsDictionary", 1, StmtKind::NativeUnary(is_dictionary));
    add_function(scope, "IsFunction", 1, StmtKind::NativeUnary(is_function));
    add_function(scope, "IsNil", 1, StmtKind::NativeUnary(is_nil));
    add_function(scope, "IsCellRef", 1, StmtKind::NativeUnary(is_cell_ref));
    add_function(scope, "IsCellRange", 1, StmtKind::NativeUnary(is_cell_range));
    add_function(scope, "Size", 1, StmtKind::NativeUnary(size));
    add_function(scope, "PopFront", 1, StmtKind::NativeUnary(pop_front));
    add_function(scope, "PopBack", 1, StmtKind::NativeUnary(pop_back));
    add_function(scope, "GetKeys", 1, StmtKind::NativeUnary(get_keys));
    add_function(scope, "SetRoundMode", 1, StmtKind::NativeUnary(set_round_mode));
    add_function(scope, "SetDefaultPrecision", 1, StmtKind::NativeUnary(set_default_precision));
    add_function(scope, "GetPrecision", 1, StmtKind::NativeUnary(get_precision));

    add_function(scope, "Error", 1, StmtKind::NativeUnaryCtx(error_log));
    add_function(scope, "Warn", 1, StmtKind::NativeUnaryCtx(warn_log));
    add_function(scope, "Info", 1, StmtKind::NativeUnaryCtx(info_log));
    add_function(scope, "Fatal", 1, StmtKind::NativeUnaryCtx(fatal_log));
    add_function(scope, "DebugPrint", 1, StmtKind::NativeUnaryCtx(debug_print));
    add_function(scope, "Eval", 1, StmtKind::NativeUnaryCtx(eval));
    add_function(scope, "EvalCell", 1, StmtKind::NativeUnaryCtx(eval_cell));
    add_function(scope, "CellEval", 1, StmtKind::NativeUnaryCtx(cell_eval));
    add_function(scope, "ExpandRange", 1, StmtKind::NativeUnaryCtx(expand_range));

    add_function(scope, "Min", 2, StmtKind::NativeBinary(min));
    add_function(scope, "Max", 2, StmtKind::NativeBinary(max));
    add_function(scope, "GetIndex", 2, StmtKind::NativeBinary(get_index));
    add_function(scope, "NewArrayDefault", 2, StmtKind::NativeBinary(new_array_default));
    add_function(scope, "PushBack", 2, StmtKind::NativeBinary(push_back));
    add_function(scope, "PushFront", 2, StmtKind::NativeBinary(push_front));
    add_function(scope, "ContainsKey", 2, StmtKind::NativeBinary(contains_key));
    add_function(scope, "RemoveKey", 2, StmtKind::NativeBinary(remove_key));
    add_function(scope, "GetValue", 2, StmtKind::NativeBinary(get_value));
    add_function(scope, "SetPrecision", 2, StmtKind::NativeBinary(set_precision));
    add_function(scope, "Let", 2, StmtKind::NativeBinaryCtx(let_binding));

    add_function(scope, "SubString", 3, StmtKind::NativeTernary(sub_string));
    add_function(scope, "SetIndex", 3, StmtKind::NativeTernary(set_index));
    add_function(scope, "Insert", 3, StmtKind::NativeTernary(insert));
}

/// The bundled Script-source standard library: aggregate functions that
/// iterate values, unwrap cell references and recurse into ranges, plus
/// the uppercase wrappers the cell language calls (their single argument
/// is the array of cell-side argument values).
pub const LIBRARY_SOURCE: &str = concat!(
    "set MAX to function (x) is ",
    "   set result to 'Empty' ",
    "   set found to 0 ",
    "   for item in x do ",
    "      set temp to item ",
    "      if IsCellRef(item) then ",
    "         set temp to EvalCell(item) ",
    "      end ",
    "      if IsFloat(temp) then ",
    "         if found then ",
    "            set result to Max(result; temp) ",
    "         else ",
    "            set result to temp ",
    "            set found to 1 ",
    "         end ",
    "      elseif IsCellRange(temp) then ",
    "         set temp to MAX(temp) ",
    "         if !IsString(temp) then ",
    "            if found then ",
    "               set result to Max(result; temp) ",
    "            else ",
    "               set result to temp ",
    "               set found to 1 ",
    "            end ",
    "         end ",
    "      end ",
    "   end ",
    "   return result ",
    "end ",
    "set MIN to function (x) is ",
    "   set result to 'Empty' ",
    "   set found to 0 ",
    "   for item in x do ",
    "      set temp to item ",
    "      if IsCellRef(item) then ",
    "         set temp to EvalCell(item) ",
    "      end ",
    "      if IsFloat(temp) then ",
    "         if found then ",
    "            set result to Min(result; temp) ",
    "         else ",
    "            set result to temp ",
    "            set found to 1 ",
    "         end ",
    "      elseif IsCellRange(temp) then ",
    "         set temp to MIN(temp) ",
    "         if !IsString(temp) then ",
    "            if found then ",
    "               set result to Min(result; temp) ",
    "            else ",
    "               set result to temp ",
    "               set found to 1 ",
    "            end ",
    "         end ",
    "      end ",
    "   end ",
    "   return result ",
    "end ",
    "set SUM to function (x) is ",
    "   set result to 0 ",
    "   for item in x do ",
    "      set temp to item ",
    "      if IsCellRef(item) then ",
    "         set temp to EvalCell(item) ",
    "      end ",
    "      if IsFloat(temp) then ",
    "         set result to result + temp ",
    "      elseif IsCellRange(temp) then ",
    "         set result to result + SUM(temp) ",
    "      end ",
    "   end ",
    "   return result ",
    "end ",
    "set COUNT to function (x) is ",
    "   set result to 0 ",
    "   for item in x do ",
    "      set temp to item ",
    "      if IsCellRef(item) then ",
    "         set temp to EvalCell(item) ",
    "      end ",
    "      if IsFloat(temp) then ",
    "         set result to result + 1 ",
    "      elseif IsCellRange(temp) then ",
    "         set result to result + COUNT(temp) ",
    "      end ",
    "   end ",
    "   return result ",
    "end ",
    "set AVERAGE to function (x) is ",
    "   return SUM(x) / COUNT(x) ",
    "end ",
    "set NAN to function (x) is ",
    "   return NaN() ",
    "end ",
    "set ABS to function (x) is ",
    "   set temp to EvalCell(x[0]) ",
    "   if !IsNil(temp) then ",
    "      set temp to Abs(temp) ",
    "   end ",
    "   return temp ",
    "end ",
    "set INT to function (x) is ",
    "   set temp to EvalCell(x[0]) ",
    "   if !IsNil(temp) then ",
    "      if temp < 0 then ",
    "         set temp to SetPrecision(Ceil(temp); 0) ",
    "      else ",
    "         set temp to SetPrecision(Floor(temp); 0) ",
    "      end ",
    "   end ",
    "   return temp ",
    "end ",
    "set ROUND to function (x) is ",
    "   set temp to EvalCell(x[0]) ",
    "   if !IsNil(temp) then ",
    "      set temp to SetPrecision(Round(temp); 0) ",
    "   end ",
    "   return temp ",
    "end ",
    "set SETSCALE to function (x) is ",
    "   return SetDefaultPrecision(EvalCell(x[0])) ",
    "end ",
    "set GETSCALE to function (x) is ",
    "   return GetDefaultPrecision() ",
    "end ",
    "set SETROUND to function (x) is ",
    "   return SetRoundMode(EvalCell(x[0])) ",
    "end ",
    "set GETROUND to function (x) is ",
    "   return GetRoundMode() ",
    "end ",
    "set EVAL to function (x) is ",
    "   set temp to EvalCell(x[0]) ",
    "   if !IsNil(temp) then ",
    "      set temp to CellEval(temp) ",
    "   end ",
    "   return temp ",
    "end ",
    "set LET to function (x) is ",
    "   return Let(EvalCell(x[0]); x[1]) ",
    "end ",
);

/// Parses and runs a library source: only `set` statements are accepted,
/// and assignments that shadow globals warn. Used for the bundled library
/// and for user library files.
pub fn load_library(
    context: &mut CallingContext,
    source: &str,
    source_name: &str,
) -> RunResult<()> {
    let mut table = SymbolTable::new(Rc::clone(&context.globals));
    let parsed = {
        let logger = Rc::clone(&context.logger);
        let mut logger = logger.borrow_mut();
        let mut lexer = Lexer::new(source, source_name);
        Parser::parse_functions(&mut lexer, &mut table, &mut *logger)
    };
    let Some(program) = parsed else {
        return Err(RunError::typed(format!(
            "Could not parse library {source_name}."
        )));
    };
    program.execute(context)?;
    Ok(())
}

/// Builds a ready-to-use global scope: natives plus the bundled library.
pub fn standard_globals(logger: Rc<RefCell<dyn crate::io::Logger>>) -> Rc<RefCell<Scope>> {
    let globals = Rc::new(RefCell::new(Scope::new()));
    create_global_scope(&mut globals.borrow_mut());
    let mut context = CallingContext::new(Rc::clone(&globals), logger);
    load_library(&mut context, LIBRARY_SOURCE, "Standard Library")
        .expect("the bundled library always loads");
    globals
}

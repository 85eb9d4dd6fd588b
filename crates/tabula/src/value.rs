//! The shared value model of the Script and Cell languages.
//!
//! A [`Value`] is a tagged union with polymorphic operations. Values are
//! immutable and freely shared (`Rc` payloads); "mutating" a container
//! rebuilds it, so an assignment replaces a slot and never edits data that
//! another binding can see.
//!
//! Two notions of comparison coexist and must not be confused:
//!
//! * the *language* operations (`op_equal`, `op_less`, …), which raise a
//!   typed error on nonsensical operand pairs and follow NaN semantics, and
//! * the *key ordering* (`Ord` on `Value`), a total order over every value,
//!   used to sort dictionary keys and defined so that equal numbers of
//!   different precisions collapse to one key.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::error::{RunError, RunResult};
use crate::number::Number;
use crate::script::symbol_table::FunctionDef;

/// A cell address, each axis independently absolute or relative, with an
/// optional sheet tag.
///
/// Relative axes store an *offset* from the cell the expression lives in;
/// absolute axes store one-based grid indices. Evaluating a reference is
/// value construction only — no cell is consulted until `EvalCell`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub sheet: Option<Rc<str>>,
    pub col_absolute: bool,
    pub col: i64,
    pub row_absolute: bool,
    pub row: i64,
}

impl CellRef {
    /// Resolves to absolute one-based coordinates, relative axes measured
    /// from `(base_col, base_row)`.
    #[must_use]
    pub fn resolve(&self, base_col: i64, base_row: i64) -> (i64, i64) {
        let col = if self.col_absolute {
            self.col
        } else {
            self.col + base_col
        };
        let row = if self.row_absolute {
            self.row
        } else {
            self.row + base_row
        };
        (col, row)
    }

    /// An absolute reference to the given coordinates.
    #[must_use]
    pub fn absolute(sheet: Option<Rc<str>>, col: i64, row: i64) -> Self {
        Self {
            sheet,
            col_absolute: true,
            col,
            row_absolute: true,
            row,
        }
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        let sheet = |r: &Self| r.sheet.as_deref().map(str::to_owned);
        sheet(self)
            .cmp(&sheet(other))
            .then_with(|| self.col_absolute.cmp(&other.col_absolute))
            .then_with(|| self.col.cmp(&other.col))
            .then_with(|| self.row_absolute.cmp(&other.row_absolute))
            .then_with(|| self.row.cmp(&other.row))
    }
}

/// A rectangular region of cells, held in resolved absolute coordinates and
/// iterated in reading order (left to right, then top to bottom).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub sheet: Option<Rc<str>>,
    pub first_col: i64,
    pub first_row: i64,
    pub last_col: i64,
    pub last_row: i64,
}

impl CellRange {
    /// Builds a normalized range from two resolved corners.
    #[must_use]
    pub fn new(sheet: Option<Rc<str>>, a: (i64, i64), b: (i64, i64)) -> Self {
        Self {
            sheet,
            first_col: a.0.min(b.0),
            first_row: a.1.min(b.1),
            last_col: a.0.max(b.0),
            last_row: a.1.max(b.1),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        let width = (self.last_col - self.first_col + 1).max(0) as usize;
        let height = (self.last_row - self.first_row + 1).max(0) as usize;
        width * height
    }

    /// The `index`-th cell of the region as an absolute reference.
    #[must_use]
    pub fn cell_at(&self, index: usize) -> Option<CellRef> {
        if index >= self.size() {
            return None;
        }
        let width = (self.last_col - self.first_col + 1) as usize;
        let col = self.first_col + (index % width) as i64;
        let row = self.first_row + (index / width) as i64;
        Some(CellRef::absolute(self.sheet.clone(), col, row))
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        let sheet = |r: &Self| r.sheet.as_deref().map(str::to_owned);
        sheet(self)
            .cmp(&sheet(other))
            .then_with(|| self.first_col.cmp(&other.first_col))
            .then_with(|| self.first_row.cmp(&other.first_row))
            .then_with(|| self.last_col.cmp(&other.last_col))
            .then_with(|| self.last_row.cmp(&other.last_row))
    }
}

/// Reference from a function value to its definition.
///
/// The recursion case — a call site naming the function being defined —
/// must not create a strong cycle through the capture list, so it holds a
/// weak reference that is promoted on use.
#[derive(Debug, Clone)]
pub enum FunctionRef {
    Strong(Rc<FunctionDef>),
    SelfRef(Weak<FunctionDef>),
}

/// A closure: a function definition plus its captured values.
#[derive(Debug, Clone)]
pub struct FunctionValue {
    def: FunctionRef,
    pub captures: Rc<Vec<Value>>,
}

impl FunctionValue {
    #[must_use]
    pub fn new(def: Rc<FunctionDef>, captures: Vec<Value>) -> Self {
        Self {
            def: FunctionRef::Strong(def),
            captures: Rc::new(captures),
        }
    }

    #[must_use]
    pub fn self_referential(def: Weak<FunctionDef>, captures: Vec<Value>) -> Self {
        Self {
            def: FunctionRef::SelfRef(def),
            captures: Rc::new(captures),
        }
    }

    /// The definition, promoting a weak self-reference.
    pub fn definition(&self) -> RunResult<Rc<FunctionDef>> {
        match &self.def {
            FunctionRef::Strong(def) => Ok(Rc::clone(def)),
            FunctionRef::SelfRef(weak) => weak
                .upgrade()
                .ok_or_else(|| RunError::fatal("Function definition no longer exists.")),
        }
    }

    fn def_ptr(&self) -> usize {
        match &self.def {
            FunctionRef::Strong(def) => Rc::as_ptr(def) as usize,
            FunctionRef::SelfRef(weak) => weak.as_ptr() as usize,
        }
    }
}

/// A runtime value of either language.
#[derive(Debug, Clone)]
pub enum Value {
    Float(Number),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    Dict(Rc<BTreeMap<Value, Value>>),
    Function(FunctionValue),
    CellRef(CellRef),
    CellRange(CellRange),
    /// The value of an empty cell. Produced only by cell evaluation; every
    /// operation except `IsNil` rejects it.
    Nil,
}

impl Value {
    #[must_use]
    pub fn string(text: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(text.as_ref()))
    }

    #[must_use]
    pub fn empty_array() -> Self {
        Self::Array(Rc::new(Vec::new()))
    }

    #[must_use]
    pub fn empty_dict() -> Self {
        Self::Dict(Rc::new(BTreeMap::new()))
    }

    /// The type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::Array(_) => "Array",
            Self::Dict(_) => "Dictionary",
            Self::Function(_) => "Function",
            Self::CellRef(_) => "CellRef",
            Self::CellRange(_) => "CellRange",
            Self::Nil => "Nil",
        }
    }

    /// Unary minus.
    pub fn op_neg(&self) -> RunResult<Self> {
        match self {
            Self::Float(number) => Ok(Self::Float(number.neg())),
            other => Err(RunError::typed(format!(
                "Error negating a {}.",
                other.type_name()
            ))),
        }
    }

    pub fn op_add(&self, other: &Self) -> RunResult<Self> {
        match (self, other) {
            (Self::Float(lhs), Self::Float(rhs)) => Ok(Self::Float(lhs.add(rhs))),
            (lhs, rhs) => Err(RunError::typed(format!(
                "Error adding a {} to a {}.",
                rhs.type_name(),
                lhs.type_name()
            ))),
        }
    }

    pub fn op_sub(&self, other: &Self) -> RunResult<Self> {
        match (self, other) {
            (Self::Float(lhs), Self::Float(rhs)) => Ok(Self::Float(lhs.sub(rhs))),
            (lhs, rhs) => Err(RunError::typed(format!(
                "Error subtracting a {} from a {}.",
                rhs.type_name(),
                lhs.type_name()
            ))),
        }
    }

    pub fn op_mul(&self, other: &Self) -> RunResult<Self> {
        match (self, other) {
            (Self::Float(lhs), Self::Float(rhs)) => Ok(Self::Float(lhs.mul(rhs))),
            (lhs, rhs) => Err(RunError::typed(format!(
                "Error multiplying a {} by a {}.",
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    pub fn op_div(&self, other: &Self) -> RunResult<Self> {
        match (self, other) {
            (Self::Float(lhs), Self::Float(rhs)) => Ok(Self::Float(lhs.div(rhs))),
            (lhs, rhs) => Err(RunError::typed(format!(
                "Error dividing a {} by a {}.",
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    /// Logical coercion: nonzero Float (NaN is falsy), nonempty String or
    /// collection, any Function.
    pub fn op_logical(&self) -> RunResult<bool> {
        match self {
            Self::Float(number) => Ok(!number.is_zero() && !number.is_nan()),
            Self::Str(text) => Ok(!text.is_empty()),
            Self::Array(items) => Ok(!items.is_empty()),
            Self::Dict(entries) => Ok(!entries.is_empty()),
            Self::Function(_) => Ok(true),
            other => Err(RunError::typed(format!(
                "Error converting a {} to a Boolean.",
                other.type_name()
            ))),
        }
    }

    pub fn op_equal(&self, other: &Self) -> RunResult<bool> {
        match (self, other) {
            (Self::Float(lhs), Self::Float(rhs)) => Ok(lhs.equal_to(rhs)),
            (Self::Str(lhs), Self::Str(rhs)) => Ok(lhs == rhs),
            (Self::Array(lhs), Self::Array(rhs)) => {
                if lhs.len() != rhs.len() {
                    return Ok(false);
                }
                for (a, b) in lhs.iter().zip(rhs.iter()) {
                    if !a.op_equal(b)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Self::Dict(lhs), Self::Dict(rhs)) => {
                if lhs.len() != rhs.len() {
                    return Ok(false);
                }
                for ((ka, va), (kb, vb)) in lhs.iter().zip(rhs.iter()) {
                    if ka.cmp(kb) != Ordering::Equal || !va.op_equal(vb)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Self::Function(lhs), Self::Function(rhs)) => {
                Ok(lhs.def_ptr() == rhs.def_ptr()
                    && lhs.captures.len() == rhs.captures.len()
                    && Rc::ptr_eq(&lhs.captures, &rhs.captures))
            }
            (Self::CellRef(lhs), Self::CellRef(rhs)) => Ok(lhs == rhs),
            (Self::CellRange(lhs), Self::CellRange(rhs)) => Ok(lhs == rhs),
            (lhs, rhs) => Err(RunError::typed(format!(
                "Error comparing a {} to a {}.",
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    pub fn op_not_equal(&self, other: &Self) -> RunResult<bool> {
        match (self, other) {
            // NaN satisfies inequality, so this is not just !op_equal.
            (Self::Float(lhs), Self::Float(rhs)) => Ok(lhs.not_equal_to(rhs)),
            _ => Ok(!self.op_equal(other)?),
        }
    }

    fn ordered(&self, other: &Self) -> RunResult<Option<Ordering>> {
        match (self, other) {
            (Self::Float(lhs), Self::Float(rhs)) => Ok(lhs.compare(rhs)),
            (Self::Str(lhs), Self::Str(rhs)) => Ok(Some(lhs.cmp(rhs))),
            (lhs, rhs) => Err(RunError::typed(format!(
                "Error comparing a {} to a {}.",
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    pub fn op_less(&self, other: &Self) -> RunResult<bool> {
        Ok(self.ordered(other)? == Some(Ordering::Less))
    }

    pub fn op_greater(&self, other: &Self) -> RunResult<bool> {
        Ok(self.ordered(other)? == Some(Ordering::Greater))
    }

    pub fn op_leq(&self, other: &Self) -> RunResult<bool> {
        Ok(matches!(
            self.ordered(other)?,
            Some(Ordering::Less | Ordering::Equal)
        ))
    }

    pub fn op_geq(&self, other: &Self) -> RunResult<bool> {
        Ok(matches!(
            self.ordered(other)?,
            Some(Ordering::Greater | Ordering::Equal)
        ))
    }

    /// String concatenation for the Cell `&` operator; Floats render
    /// through their display form.
    pub fn op_cat(&self, other: &Self) -> RunResult<Self> {
        fn piece(value: &Value) -> RunResult<String> {
            match value {
                Value::Float(number) => Ok(number.to_string()),
                Value::Str(text) => Ok(text.to_string()),
                other => Err(RunError::typed(format!(
                    "Error concatenating a {}.",
                    other.type_name()
                ))),
            }
        }
        let mut text = piece(self)?;
        text.push_str(&piece(other)?);
        Ok(Self::string(text))
    }

    /// Validates a container index: a Float with an integral value.
    fn index_of(&self, what: &str) -> RunResult<usize> {
        let Self::Float(number) = self else {
            return Err(RunError::typed(format!(
                "Error indexing {what} with a {}.",
                self.type_name()
            )));
        };
        if !number.is_integral() {
            return Err(RunError::typed(format!(
                "Error indexing {what} with a non-integer Float."
            )));
        }
        let raw = number.to_f64();
        if raw < 0.0 {
            return Err(RunError::typed(format!("Error indexing {what} out of bounds.")));
        }
        Ok(raw as usize)
    }

    /// Container read: array element, dictionary value, or range cell.
    pub fn index(&self, index: &Self) -> RunResult<Self> {
        match self {
            Self::Array(items) => {
                let at = index.index_of("Array")?;
                items
                    .get(at)
                    .cloned()
                    .ok_or_else(|| RunError::typed("Error indexing Array out of bounds."))
            }
            Self::Dict(entries) => entries
                .get(index)
                .cloned()
                .ok_or_else(|| RunError::typed("Error getting a Value not in the Dictionary.")),
            Self::CellRange(range) => {
                let at = index.index_of("CellRange")?;
                range
                    .cell_at(at)
                    .map(Self::CellRef)
                    .ok_or_else(|| RunError::typed("Error indexing CellRange out of bounds."))
            }
            _ => Err(RunError::typed("Error indexing non-Collection.")),
        }
    }

    /// Functional array write: a new array with one slot replaced.
    pub fn array_with(&self, index: &Self, value: Self) -> RunResult<Self> {
        let Self::Array(items) = self else {
            return Err(RunError::typed("Error indexing non-Collection."));
        };
        let at = index.index_of("Array")?;
        if at >= items.len() {
            return Err(RunError::typed("Error indexing Array out of bounds."));
        }
        let mut rebuilt = items.as_ref().clone();
        rebuilt[at] = value;
        Ok(Self::Array(Rc::new(rebuilt)))
    }

    /// Functional dictionary write: a new dictionary with `key` bound.
    pub fn dict_with(&self, key: Self, value: Self) -> RunResult<Self> {
        let Self::Dict(entries) = self else {
            return Err(RunError::typed("Error indexing non-Collection."));
        };
        let mut rebuilt = entries.as_ref().clone();
        rebuilt.insert(key, value);
        Ok(Self::Dict(Rc::new(rebuilt)))
    }

    /// Rendering used by the debugger and `DebugPrint`.
    #[must_use]
    pub fn debug_render(&self) -> String {
        match self {
            Self::Float(number) => number.to_string(),
            Self::Str(text) => format!("\"{text}\""),
            Self::Array(items) => {
                let mut out = String::from("{ ");
                for (position, item) in items.iter().enumerate() {
                    if position > 0 {
                        out.push_str("; ");
                    }
                    out.push_str(&item.debug_render());
                }
                out.push_str(" }");
                out
            }
            Self::Dict(entries) => {
                let mut out = String::from("{ ");
                for (position, (key, value)) in entries.iter().enumerate() {
                    if position > 0 {
                        out.push_str("; ");
                    }
                    out.push_str(&key.debug_render());
                    out.push(':');
                    out.push_str(&value.debug_render());
                }
                out.push_str(" }");
                out
            }
            Self::Function(function) => {
                let name = function
                    .definition()
                    .map_or_else(|_| "<expired>".to_owned(), |def| def.display_name());
                if function.captures.is_empty() {
                    format!("Function : {name}")
                } else {
                    let mut out = format!("Function : {name} [ ");
                    for (position, capture) in function.captures.iter().enumerate() {
                        if position > 0 {
                            out.push_str("; ");
                        }
                        out.push_str(&capture.debug_render());
                    }
                    out.push_str(" ]");
                    out
                }
            }
            Self::CellRef(cell) => {
                let sheet = cell.sheet.as_deref().unwrap_or("");
                format!(
                    "CellRef({}{}; {}{}{})",
                    if cell.col_absolute { "$" } else { "" },
                    cell.col,
                    if cell.row_absolute { "$" } else { "" },
                    cell.row,
                    if sheet.is_empty() {
                        String::new()
                    } else {
                        format!("; !{sheet}")
                    }
                )
            }
            Self::CellRange(range) => format!(
                "CellRange(({}; {}):({}; {}))",
                range.first_col, range.first_row, range.last_col, range.last_row
            ),
            Self::Nil => "Nil".to_owned(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Float(_) => 0,
            Self::Str(_) => 1,
            Self::Array(_) => 2,
            Self::Dict(_) => 3,
            Self::Function(_) => 4,
            Self::CellRef(_) => 5,
            Self::CellRange(_) => 6,
            Self::Nil => 7,
        }
    }
}

/// Total ordering over all values, used for dictionary keys.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Float(lhs), Self::Float(rhs)) => lhs.key_cmp(rhs),
            (Self::Str(lhs), Self::Str(rhs)) => lhs.cmp(rhs),
            (Self::Array(lhs), Self::Array(rhs)) => {
                for (a, b) in lhs.iter().zip(rhs.iter()) {
                    let ordering = a.cmp(b);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                lhs.len().cmp(&rhs.len())
            }
            (Self::Dict(lhs), Self::Dict(rhs)) => {
                for ((ka, va), (kb, vb)) in lhs.iter().zip(rhs.iter()) {
                    let ordering = ka.cmp(kb).then_with(|| va.cmp(vb));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                lhs.len().cmp(&rhs.len())
            }
            (Self::Function(lhs), Self::Function(rhs)) => lhs
                .def_ptr()
                .cmp(&rhs.def_ptr())
                .then_with(|| lhs.captures.as_ref().cmp(rhs.captures.as_ref())),
            (Self::CellRef(lhs), Self::CellRef(rhs)) => lhs.key_cmp(rhs),
            (Self::CellRange(lhs), Self::CellRange(rhs)) => lhs.key_cmp(rhs),
            (Self::Nil, Self::Nil) => Ordering::Equal,
            (lhs, rhs) => lhs.rank().cmp(&rhs.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Self::Float(number) => number.canonical_hash(state),
            Self::Str(text) => text.hash(state),
            Self::Array(items) => {
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Self::Dict(entries) => {
                for (key, value) in entries.iter() {
                    key.hash(state);
                    value.hash(state);
                }
            }
            Self::Function(function) => state.write_usize(function.def_ptr()),
            Self::CellRef(cell) => cell.hash(state),
            Self::CellRange(range) => range.hash(state),
            Self::Nil => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::{DecimalNumber, Number};

    fn float(text: &str) -> Value {
        Value::Float(Number::Decimal(DecimalNumber::parse(text)))
    }

    #[test]
    fn arithmetic_dispatch() {
        let five = float("5");
        let seven = float("7");
        assert!(five.op_add(&seven).unwrap().op_equal(&float("12")).unwrap());
        let err = five.op_add(&Value::string("x")).unwrap_err();
        assert_eq!(err.message(), "Error adding a String to a Float.");
        assert!(err.is_typed());
    }

    #[test]
    fn logical_coercion() {
        assert!(float("2").op_logical().unwrap());
        assert!(!float("0").op_logical().unwrap());
        assert!(!Value::Float(Number::Decimal(DecimalNumber::nan(false))).op_logical().unwrap());
        assert!(!Value::string("").op_logical().unwrap());
        assert!(Value::string("x").op_logical().unwrap());
        assert!(Value::Nil.op_logical().is_err());
    }

    #[test]
    fn equal_precision_floats_are_one_dictionary_key() {
        let dict = Value::empty_dict()
            .dict_with(float("1.5"), float("1"))
            .unwrap()
            .dict_with(float("1.50"), float("2"))
            .unwrap();
        let Value::Dict(entries) = &dict else { panic!() };
        assert_eq!(entries.len(), 1);
        assert!(dict.index(&float("1.500")).unwrap().op_equal(&float("2")).unwrap());
    }

    #[test]
    fn array_updates_are_functional() {
        let base = Value::Array(Rc::new(vec![float("1"), float("2")]));
        let updated = base.array_with(&float("1"), float("9")).unwrap();
        assert!(base.index(&float("1")).unwrap().op_equal(&float("2")).unwrap());
        assert!(updated.index(&float("1")).unwrap().op_equal(&float("9")).unwrap());
    }

    #[test]
    fn index_errors() {
        let arr = Value::Array(Rc::new(vec![float("1")]));
        assert!(arr.index(&float("1")).is_err());
        assert!(arr.index(&float("0.5")).is_err());
        assert!(arr.index(&Value::string("0")).is_err());
        assert!(float("1").index(&float("0")).is_err());
        let dict = Value::empty_dict();
        assert_eq!(
            dict.index(&float("0")).unwrap_err().message(),
            "Error getting a Value not in the Dictionary."
        );
    }

    #[test]
    fn range_indexing_yields_absolute_refs() {
        let range = CellRange::new(None, (2, 1), (3, 2));
        let value = Value::CellRange(range);
        let Value::CellRef(cell) = value.index(&float("1")).unwrap() else {
            panic!()
        };
        assert_eq!((cell.col, cell.row), (3, 1));
        let Value::CellRef(cell) = value.index(&float("2")).unwrap() else {
            panic!()
        };
        assert_eq!((cell.col, cell.row), (2, 2));
    }

    #[test]
    fn nan_inequality_is_true() {
        let nan = Value::Float(Number::Decimal(DecimalNumber::nan(false)));
        assert!(!nan.op_equal(&nan).unwrap());
        assert!(nan.op_not_equal(&nan).unwrap());
        assert!(!nan.op_less(&float("1")).unwrap());
    }
}

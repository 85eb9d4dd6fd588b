//! The cell engine: the spreadsheet surface the evaluator consumes.
//!
//! The host spreadsheet owns storage and display; the core sees a cell as
//! "a thing that can yield an expression, remembers its previously computed
//! value, and knows its generation tag" — the [`SheetStore`] trait. On top
//! of that sit the per-generation evaluation cache, the process-wide
//! name→reference map, and the current-cell coordinates that relative
//! references resolve against.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;
use tracing::debug;

use super::expr::CellExpr;
use super::lexer::CellLexer;
use super::parser::CellParser;
use crate::context::CallingContext;
use crate::error::{RunError, RunResult};
use crate::io::Logger;
use crate::scope::Scope;
use crate::value::{CellRef, Value};

/// Storage interface the cell evaluator reads through.
pub trait SheetStore {
    /// The parsed expression of a cell, or `None` for an empty cell.
    fn expression(&self, sheet: Option<&str>, col: i64, row: i64) -> Option<Rc<CellExpr>>;

    /// The cached value of a cell, if one was stored at `generation`.
    fn cached(&self, sheet: Option<&str>, col: i64, row: i64, generation: u64) -> Option<Value>;

    /// Remembers a computed value for the current generation.
    fn store(&mut self, sheet: Option<&str>, col: i64, row: i64, generation: u64, value: Value);
}

/// An in-memory sheet grid backing tests and the batch CLI.
#[derive(Default)]
pub struct Sheet {
    cells: AHashMap<(Option<String>, i64, i64), SheetCell>,
}

#[derive(Default)]
struct SheetCell {
    expr: Option<Rc<CellExpr>>,
    cached: Option<(u64, Value)>,
}

impl Sheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_expression(
        &mut self,
        sheet: Option<&str>,
        col: i64,
        row: i64,
        expr: Rc<CellExpr>,
    ) {
        let entry = self
            .cells
            .entry((sheet.map(str::to_owned), col, row))
            .or_default();
        entry.expr = Some(expr);
        entry.cached = None;
    }

    pub fn clear(&mut self, sheet: Option<&str>, col: i64, row: i64) {
        self.cells.remove(&(sheet.map(str::to_owned), col, row));
    }
}

impl SheetStore for Sheet {
    fn expression(&self, sheet: Option<&str>, col: i64, row: i64) -> Option<Rc<CellExpr>> {
        self.cells
            .get(&(sheet.map(str::to_owned), col, row))
            .and_then(|cell| cell.expr.clone())
    }

    fn cached(&self, sheet: Option<&str>, col: i64, row: i64, generation: u64) -> Option<Value> {
        let cell = self.cells.get(&(sheet.map(str::to_owned), col, row))?;
        match &cell.cached {
            Some((tag, value)) if *tag == generation => Some(value.clone()),
            _ => None,
        }
    }

    fn store(&mut self, sheet: Option<&str>, col: i64, row: i64, generation: u64, value: Value) {
        let entry = self
            .cells
            .entry((sheet.map(str::to_owned), col, row))
            .or_default();
        entry.cached = Some((generation, value));
    }
}

/// Cell-engine state carried on a [`CallingContext`].
///
/// Name map, store and generation counter are shared between duplicated
/// contexts; the current-cell coordinates are per-context, because a nested
/// cell evaluation relocates them.
#[derive(Clone)]
pub struct CellContext {
    pub names: Rc<RefCell<AHashMap<String, CellRef>>>,
    pub store: Rc<RefCell<dyn SheetStore>>,
    pub generation: Rc<Cell<u64>>,
    pub current_col: i64,
    pub current_row: i64,
}

impl CellContext {
    #[must_use]
    pub fn new(store: Rc<RefCell<dyn SheetStore>>) -> Self {
        Self {
            names: Rc::new(RefCell::new(AHashMap::new())),
            store,
            generation: Rc::new(Cell::new(1)),
            current_col: 1,
            current_row: 1,
        }
    }

    /// Starts a new recomputation pass: cached cell values from earlier
    /// generations become stale.
    pub fn bump_generation(&self) {
        self.generation.set(self.generation.get() + 1);
    }
}

fn cell_state(context: &CallingContext) -> RunResult<CellContext> {
    context
        .cells
        .clone()
        .ok_or_else(|| RunError::fatal("Cell operation in a context with no cell engine."))
}

/// The coordinates of the cell currently being evaluated.
pub fn current_cell(context: &CallingContext) -> RunResult<(i64, i64)> {
    let cells = cell_state(context)?;
    Ok((cells.current_col, cells.current_row))
}

/// Looks up a `_name` binding.
pub fn lookup_name(context: &CallingContext, name: &str) -> RunResult<Option<CellRef>> {
    let cells = cell_state(context)?;
    let bound = cells.names.borrow().get(name).cloned();
    Ok(bound)
}

/// Registers a `_name` binding, replacing any previous one.
pub fn register_name(context: &CallingContext, name: &str, cell: CellRef) -> RunResult<()> {
    let cells = cell_state(context)?;
    cells.names.borrow_mut().insert(name.to_owned(), cell);
    Ok(())
}

/// Evaluates the cell a reference points at, through the per-generation
/// cache.
///
/// The reference is resolved against the current cell; a hit in the cache
/// for the current generation short-circuits, otherwise the cell's
/// expression is evaluated with the context relocated to that cell and the
/// result is remembered. An empty cell yields [`Value::Nil`] and is not
/// cached.
pub fn cell_eval(context: &mut CallingContext, cell: &CellRef) -> RunResult<Value> {
    let cells = cell_state(context)?;
    let (col, row) = cell.resolve(cells.current_col, cells.current_row);
    let sheet = cell.sheet.as_deref().map(str::to_owned);
    let generation = cells.generation.get();

    let hit = cells
        .store
        .borrow()
        .cached(sheet.as_deref(), col, row, generation);
    if let Some(value) = hit {
        return Ok(value);
    }

    let expr = cells.store.borrow().expression(sheet.as_deref(), col, row);
    let Some(expr) = expr else {
        return Ok(Value::Nil);
    };

    debug!(col, row, generation, "evaluating cell");
    let state = context.cells.as_mut().expect("cell state checked above");
    let saved = (state.current_col, state.current_row);
    state.current_col = col;
    state.current_row = row;
    let outcome = expr.evaluate(context);
    let state = context.cells.as_mut().expect("cell state survives evaluation");
    state.current_col = saved.0;
    state.current_row = saved.1;

    let value = outcome?;
    cells
        .store
        .borrow_mut()
        .store(sheet.as_deref(), col, row, generation, value.clone());
    Ok(value)
}

/// Parses a formula at `(col, row)` against the given global scope.
/// Diagnostics go to the logger; `None` means the parse failed.
pub fn parse_cell_source(
    source: &str,
    globals: &Rc<RefCell<Scope>>,
    logger: &mut dyn Logger,
    col: i64,
    row: i64,
) -> Option<Rc<CellExpr>> {
    let mut lexer = CellLexer::new(source);
    CellParser::parse_full_expression(&mut lexer, globals, logger, col, row)
}

/// Parses and evaluates a formula string at the current cell — the dynamic
/// `CellEval` entry point.
pub fn eval_cell_source(context: &mut CallingContext, source: &str) -> RunResult<Value> {
    let (col, row) = current_cell(context)?;
    let globals = Rc::clone(&context.globals);
    let parsed = {
        let logger = Rc::clone(&context.logger);
        let mut logger = logger.borrow_mut();
        parse_cell_source(source, &globals, &mut *logger, col, row)
    };
    match parsed {
        Some(expr) => expr.evaluate(context),
        None => Err(RunError::typed("Could not parse cell expression.")),
    }
}

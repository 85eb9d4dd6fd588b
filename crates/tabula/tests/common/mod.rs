//! Shared fixture: a context with the full standard library, a collecting
//! logger, and an in-memory sheet.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tabula::cell::engine::{self, CellContext, Sheet};
use tabula::script::lexer::Lexer;
use tabula::script::parser::Parser;
use tabula::script::stdlib;
use tabula::script::symbol_table::SymbolTable;
use tabula::{
    CallingContext, CollectingLogger, DebuggerHook, Logger, RunError, RunResult, Scope, Value,
};

pub struct Harness {
    pub logger: Rc<RefCell<CollectingLogger>>,
    pub globals: Rc<RefCell<Scope>>,
    pub store: Rc<RefCell<Sheet>>,
    pub context: CallingContext,
}

impl Harness {
    pub fn new() -> Self {
        tabula::number::reset_number_system();
        let logger = Rc::new(RefCell::new(CollectingLogger::new()));
        let as_logger: Rc<RefCell<dyn Logger>> = logger.clone();
        let globals = stdlib::standard_globals(Rc::clone(&as_logger));
        let store = Rc::new(RefCell::new(Sheet::new()));
        let mut context = CallingContext::new(Rc::clone(&globals), as_logger);
        context.cells = Some(CellContext::new(store.clone()));
        Self {
            logger,
            globals,
            store,
            context,
        }
    }

    /// Parses and runs a Script program; parse failures surface as typed
    /// errors carrying the logged diagnostics.
    pub fn run(&mut self, source: &str) -> RunResult<()> {
        let mut table = SymbolTable::new(Rc::clone(&self.globals));
        let parsed = {
            let mut logger = self.logger.borrow_mut();
            let mut lexer = Lexer::new(source, "Test");
            Parser::parse(&mut lexer, &mut table, &mut *logger)
        };
        let Some(program) = parsed else {
            return Err(RunError::typed(format!(
                "parse failed: {:?}",
                self.logger.borrow().messages()
            )));
        };
        program.execute(&mut self.context).map(|_| ())
    }

    pub fn run_ok(&mut self, source: &str) {
        if let Err(error) = self.run(source) {
            panic!("program failed: {error}");
        }
    }

    /// Parses and evaluates a single Script expression.
    pub fn eval(&mut self, source: &str) -> RunResult<Value> {
        let mut table = SymbolTable::new(Rc::clone(&self.globals));
        let parsed = {
            let mut logger = self.logger.borrow_mut();
            let mut lexer = Lexer::new(source, "Test");
            Parser::parse_full_expression(&mut lexer, &mut table, &mut *logger)
        };
        let Some(expr) = parsed else {
            return Err(RunError::typed(format!(
                "parse failed: {:?}",
                self.logger.borrow().messages()
            )));
        };
        expr.evaluate(&mut self.context)
    }

    /// Installs a formula into the sheet at one-based `(col, row)`.
    pub fn set_cell(&mut self, col: i64, row: i64, formula: &str) {
        let parsed = {
            let mut logger = self.logger.borrow_mut();
            engine::parse_cell_source(formula, &self.globals, &mut *logger, col, row)
        };
        let expr = parsed.unwrap_or_else(|| {
            panic!(
                "formula {formula:?} failed to parse: {:?}",
                self.logger.borrow().messages()
            )
        });
        self.store
            .borrow_mut()
            .set_expression(None, col, row, expr);
    }

    /// Parses and evaluates a formula at `(col, row)`.
    pub fn eval_cell(&mut self, formula: &str, col: i64, row: i64) -> RunResult<Value> {
        let parsed = {
            let mut logger = self.logger.borrow_mut();
            engine::parse_cell_source(formula, &self.globals, &mut *logger, col, row)
        };
        let Some(expr) = parsed else {
            return Err(RunError::typed(format!(
                "parse failed: {:?}",
                self.logger.borrow().messages()
            )));
        };
        let state = self.context.cells.as_mut().expect("harness has a sheet");
        state.current_col = col;
        state.current_row = row;
        expr.evaluate(&mut self.context)
    }

    pub fn logs(&self) -> Vec<String> {
        self.logger.borrow().messages().to_vec()
    }

    pub fn clear_logs(&mut self) {
        self.logger.borrow_mut().clear();
    }
}

/// A debugger hook that only counts how often it was entered.
#[derive(Default)]
pub struct CountingDebugger {
    pub entries: Cell<usize>,
    pub last_message: RefCell<String>,
}

impl DebuggerHook for CountingDebugger {
    fn enter_debugger(&self, message: &str, _context: &mut CallingContext) {
        self.entries.set(self.entries.get() + 1);
        *self.last_message.borrow_mut() = message.to_owned();
    }
}

/// Renders a value through the debugger format, for terse assertions.
pub fn shown(value: &Value) -> String {
    value.debug_render()
}

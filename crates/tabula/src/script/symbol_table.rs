//! Parse-time name resolution and function definitions.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use indexmap::IndexMap;

use super::expr::{Expr, ExprKind};
use super::stmt::Stmt;
use super::token::Token;
use crate::error::{RunError, RunResult};
use crate::scope::{Getter, Scope, Setter};

/// A function definition: body, arity, and the name→slot maps that turn
/// identifiers into index-routed accessors at parse time.
///
/// Definitions are built incrementally while their body is being parsed —
/// a recursive call site inside the body already refers to the definition —
/// so the mutable pieces sit behind `RefCell`s. After parsing, a definition
/// is only ever read.
#[derive(Debug, Default)]
pub struct FunctionDef {
    name: RefCell<String>,
    body: RefCell<Option<Rc<Stmt>>>,
    args: RefCell<IndexMap<String, usize>>,
    locals: RefCell<IndexMap<String, usize>>,
    captures: RefCell<IndexMap<String, usize>>,
}

impl FunctionDef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a native-function body into a callable definition, with the
    /// positional placeholder argument names the debugger shows.
    #[must_use]
    pub fn native(name: &str, arity: usize, body: Stmt) -> Rc<Self> {
        static PLACEHOLDERS: [&str; 4] = [
            "Automatic_Argument_1",
            "Automatic_Argument_2",
            "Automatic_Argument_3",
            "Automatic_Argument_4",
        ];
        let def = Self::new();
        def.set_name(name);
        for placeholder in PLACEHOLDERS.iter().take(arity) {
            def.add_arg(placeholder);
        }
        def.set_body(Rc::new(body));
        Rc::new(def)
    }

    pub fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_owned();
    }

    /// The function's name for diagnostics; anonymous functions are shown
    /// with an empty name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_body(&self, body: Rc<Stmt>) {
        *self.body.borrow_mut() = Some(body);
    }

    /// The statement body. Fails fatally for a definition whose parse never
    /// completed, which a finished program cannot contain.
    pub fn body(&self) -> RunResult<Rc<Stmt>> {
        self.body
            .borrow()
            .clone()
            .ok_or_else(|| RunError::fatal("Call of a function with no body."))
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.borrow().len()
    }

    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.borrow().len()
    }

    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.captures.borrow().len()
    }

    pub fn add_arg(&self, name: &str) -> usize {
        let mut args = self.args.borrow_mut();
        let slot = args.len();
        *args.entry(name.to_owned()).or_insert(slot)
    }

    pub fn add_local(&self, name: &str) -> usize {
        let mut locals = self.locals.borrow_mut();
        let slot = locals.len();
        *locals.entry(name.to_owned()).or_insert(slot)
    }

    pub fn add_capture(&self, name: &str) -> usize {
        let mut captures = self.captures.borrow_mut();
        let slot = captures.len();
        *captures.entry(name.to_owned()).or_insert(slot)
    }

    #[must_use]
    pub fn arg_slot(&self, name: &str) -> Option<usize> {
        self.args.borrow().get(name).copied()
    }

    #[must_use]
    pub fn local_slot(&self, name: &str) -> Option<usize> {
        self.locals.borrow().get(name).copied()
    }

    #[must_use]
    pub fn capture_slot(&self, name: &str) -> Option<usize> {
        self.captures.borrow().get(name).copied()
    }

    #[must_use]
    pub fn arg_names(&self) -> Vec<String> {
        self.args.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn local_names(&self) -> Vec<String> {
        self.locals.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn capture_names(&self) -> Vec<String> {
        self.captures.borrow().keys().cloned().collect()
    }
}

/// What an identifier resolves to at the current parse position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Undefined,
    GlobalVariable,
    ScopeVariable,
    LocalVariable,
    Function,
}

/// The parser's view of the active scope stack.
///
/// Lookup order, innermost first: current frame args → locals → captures →
/// functions still being defined (so a name can recurse into itself) → the
/// pushed scope → globals.
pub struct SymbolTable {
    globals: Rc<RefCell<Scope>>,
    scopes: Vec<Rc<RefCell<Scope>>>,
    frames: Vec<Rc<FunctionDef>>,
    active_functions: AHashMap<String, Weak<FunctionDef>>,
    loop_stack: Vec<String>,
    loop_names: AHashMap<String, u64>,
    /// Cached references to the global `PushBack`/`Insert` functions, used
    /// to desugar `{a; b}` and `{k : v}` displays.
    push_back_fn: Option<Rc<Expr>>,
    insert_fn: Option<Rc<Expr>>,
}

impl SymbolTable {
    #[must_use]
    pub fn new(globals: Rc<RefCell<Scope>>) -> Self {
        let cached = |name: &str| {
            let scope = globals.borrow();
            let slot = scope.slot_of(name)?;
            let value = scope.value(slot)?.clone();
            Some(Rc::new(Expr {
                token: Token::synthetic(),
                kind: ExprKind::Constant(value),
            }))
        };
        let push_back_fn = cached("PushBack");
        let insert_fn = cached("Insert");
        Self {
            globals,
            scopes: Vec::new(),
            frames: Vec::new(),
            active_functions: AHashMap::new(),
            loop_stack: Vec::new(),
            loop_names: AHashMap::new(),
            push_back_fn,
            insert_fn,
        }
    }

    #[must_use]
    pub fn push_back_fn(&self) -> Option<Rc<Expr>> {
        self.push_back_fn.clone()
    }

    #[must_use]
    pub fn insert_fn(&self) -> Option<Rc<Expr>> {
        self.insert_fn.clone()
    }

    pub fn push_scope(&mut self, scope: Rc<RefCell<Scope>>) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Opens a fresh function definition context.
    pub fn push_context(&mut self) {
        self.frames.push(Rc::new(FunctionDef::new()));
    }

    /// Re-enters an existing definition context — the debugger does this to
    /// parse `print` arguments as if inside the selected frame.
    pub fn inject_context(&mut self, context: Rc<FunctionDef>) {
        self.frames.push(context);
    }

    #[must_use]
    pub fn context(&self) -> Rc<FunctionDef> {
        Rc::clone(self.frames.last().expect("no active function context"))
    }

    #[must_use]
    pub fn in_function(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn pop_context(&mut self) {
        self.frames.pop();
    }

    /// Adds a variable to the innermost scope (or globals outside any).
    pub fn add_variable(&mut self, name: &str) {
        match self.scopes.last() {
            Some(scope) => {
                scope.borrow_mut().add(name);
            }
            None => {
                self.globals.borrow_mut().add(name);
            }
        }
    }

    pub fn add_argument(&mut self, name: &str) {
        self.context().add_arg(name);
    }

    /// Adds a frame local, or a scope variable outside any function.
    pub fn add_local(&mut self, name: &str) {
        if self.frames.is_empty() {
            self.add_variable(name);
        } else {
            self.context().add_local(name);
        }
    }

    pub fn add_capture(&mut self, name: &str) {
        self.context().add_capture(name);
    }

    pub fn register_active(&mut self, name: &str, def: &Rc<FunctionDef>) {
        self.active_functions
            .insert(name.to_owned(), Rc::downgrade(def));
    }

    pub fn unregister_active(&mut self, name: &str) {
        self.active_functions.remove(name);
    }

    #[must_use]
    pub fn active_function(&self, name: &str) -> Option<Weak<FunctionDef>> {
        self.active_functions.get(name).cloned()
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> IdentifierKind {
        if let Some(frame) = self.frames.last() {
            if frame.arg_slot(name).is_some()
                || frame.local_slot(name).is_some()
                || frame.capture_slot(name).is_some()
            {
                return IdentifierKind::LocalVariable;
            }
        }
        if self.active_functions.contains_key(name) {
            return IdentifierKind::Function;
        }
        if let Some(scope) = self.scopes.last() {
            if scope.borrow().slot_of(name).is_some() {
                return IdentifierKind::ScopeVariable;
            }
        }
        if self.globals.borrow().slot_of(name).is_some() {
            return IdentifierKind::GlobalVariable;
        }
        IdentifierKind::Undefined
    }

    /// The read handle for a resolvable name.
    #[must_use]
    pub fn getter(&self, name: &str) -> Option<Getter> {
        if let Some(frame) = self.frames.last() {
            if let Some(slot) = frame.arg_slot(name) {
                return Some(Getter::Arg(slot as u32));
            }
            if let Some(slot) = frame.local_slot(name) {
                return Some(Getter::Local(slot as u32));
            }
            if let Some(slot) = frame.capture_slot(name) {
                return Some(Getter::Capture(slot as u32));
            }
        }
        if let Some(scope) = self.scopes.last() {
            if let Some(slot) = scope.borrow().slot_of(name) {
                return Some(Getter::Scope(slot as u32));
            }
        }
        self.globals
            .borrow()
            .slot_of(name)
            .map(|slot| Getter::Global(slot as u32))
    }

    /// The write handle for a resolvable name.
    #[must_use]
    pub fn setter(&self, name: &str) -> Option<Setter> {
        if let Some(frame) = self.frames.last() {
            if let Some(slot) = frame.arg_slot(name) {
                return Some(Setter::Arg(slot as u32));
            }
            if let Some(slot) = frame.local_slot(name) {
                return Some(Setter::Local(slot as u32));
            }
            // I do not feel bad that this does not do what people think it
            // does: the write stays inside the frame.
            if let Some(slot) = frame.capture_slot(name) {
                return Some(Setter::Capture(slot as u32));
            }
        }
        if let Some(scope) = self.scopes.last() {
            if let Some(slot) = scope.borrow().slot_of(name) {
                return Some(Setter::Scope(slot as u32));
            }
        }
        self.globals
            .borrow()
            .slot_of(name)
            .map(|slot| Setter::Global(slot as u32))
    }

    /// Opens a new (innermost) loop and returns its id.
    pub fn new_loop(&mut self) -> u64 {
        self.loop_stack.push(String::new());
        self.loop_stack.len() as u64
    }

    /// The id of the innermost loop; zero outside any loop.
    #[must_use]
    pub fn current_loop(&self) -> u64 {
        self.loop_stack.len() as u64
    }

    /// Labels the innermost loop.
    pub fn name_loop(&mut self, name: &str) {
        let id = self.loop_stack.len() as u64;
        if let Some(top) = self.loop_stack.last_mut() {
            *top = name.to_owned();
        }
        self.loop_names.insert(name.to_owned(), id);
    }

    /// The id of the loop labeled `name`; zero when undefined.
    #[must_use]
    pub fn loop_by_name(&self, name: &str) -> u64 {
        self.loop_names.get(name).copied().unwrap_or(0)
    }

    pub fn pop_loop(&mut self) {
        if let Some(label) = self.loop_stack.pop() {
            if !label.is_empty() {
                self.loop_names.remove(&label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        SymbolTable::new(Rc::new(RefCell::new(Scope::new())))
    }

    #[test]
    fn lookup_order_prefers_frame_slots() {
        let mut table = table();
        table.add_variable("x");
        assert_eq!(table.lookup("x"), IdentifierKind::GlobalVariable);
        table.push_context();
        table.add_argument("x");
        assert_eq!(table.lookup("x"), IdentifierKind::LocalVariable);
        assert_eq!(table.getter("x"), Some(Getter::Arg(0)));
        table.pop_context();
        assert_eq!(table.getter("x"), Some(Getter::Global(0)));
    }

    #[test]
    fn active_function_resolves_inside_own_body() {
        let mut table = table();
        table.push_context();
        let def = table.context();
        def.set_name("fib");
        table.register_active("fib", &def);
        assert_eq!(table.lookup("fib"), IdentifierKind::Function);
        table.unregister_active("fib");
        assert_eq!(table.lookup("fib"), IdentifierKind::Undefined);
    }

    #[test]
    fn loop_labels() {
        let mut table = table();
        assert_eq!(table.current_loop(), 0);
        let outer = table.new_loop();
        table.name_loop("Bob");
        let inner = table.new_loop();
        assert_eq!((outer, inner), (1, 2));
        assert_eq!(table.loop_by_name("Bob"), 1);
        table.pop_loop();
        table.pop_loop();
        assert_eq!(table.loop_by_name("Bob"), 0);
    }
}

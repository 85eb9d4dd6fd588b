//! The calling context: everything an evaluation needs to reach.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cell::engine::CellContext;
use crate::debugger::DebuggerHook;
use crate::error::RunError;
use crate::io::Logger;
use crate::scope::{Scope, StackFrame};

/// Shared evaluation state for both languages.
///
/// Holds the global scope, at most one pushed local scope, the live call
/// stack, the logging channel, an optional debugger hook, and — when a
/// spreadsheet is attached — the cell-engine state. Embedders must
/// serialize all access; the evaluator is single-threaded.
pub struct CallingContext {
    pub globals: Rc<RefCell<Scope>>,
    pub scope: Option<Rc<RefCell<Scope>>>,
    frames: Vec<Rc<RefCell<StackFrame>>>,
    pub logger: Rc<RefCell<dyn Logger>>,
    pub debugger: Option<Rc<dyn DebuggerHook>>,
    pub cells: Option<CellContext>,
}

impl CallingContext {
    #[must_use]
    pub fn new(globals: Rc<RefCell<Scope>>, logger: Rc<RefCell<dyn Logger>>) -> Self {
        Self {
            globals,
            scope: None,
            frames: Vec::new(),
            logger,
            debugger: None,
            cells: None,
        }
    }

    /// Emits a message on the logging channel.
    pub fn log(&self, message: &str) {
        self.logger.borrow_mut().log(message);
    }

    /// Links a new frame on top of the call stack and returns it. The
    /// frame's depth must already be [`Self::depth`] + 1.
    pub fn push_frame(&mut self, frame: StackFrame) -> Rc<RefCell<StackFrame>> {
        let frame = Rc::new(RefCell::new(frame));
        self.frames.push(Rc::clone(&frame));
        frame
    }

    /// Unlinks the top frame. Call on every exit path of a function call.
    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<Rc<RefCell<StackFrame>>> {
        self.frames.last().cloned()
    }

    #[must_use]
    pub fn frame_at(&self, index: usize) -> Option<Rc<RefCell<StackFrame>>> {
        self.frames.get(index).cloned()
    }

    /// Current call depth; the next frame pushed gets `depth() + 1`.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_scope(&mut self, scope: Rc<RefCell<Scope>>) {
        self.scope = Some(scope);
    }

    pub fn pop_scope(&mut self) {
        self.scope = None;
    }

    /// Gives an attached debugger a look at the live stack before an error
    /// propagates. The error is returned unchanged for the caller to raise.
    pub fn report(&mut self, error: &RunError) {
        if let Some(debugger) = self.debugger.clone() {
            debugger.enter_debugger(error.message(), self);
        }
    }

    /// A context for nested evaluation: shares globals, scope, logger and
    /// cell state, but has its debugger disabled so a `print` inside the
    /// debugger cannot re-enter it.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            globals: Rc::clone(&self.globals),
            scope: self.scope.clone(),
            frames: Vec::new(),
            logger: Rc::clone(&self.logger),
            debugger: None,
            cells: self.cells.clone(),
        }
    }

    /// Like [`Self::duplicate`], but keeps the call stack up to and
    /// including `frame_index`, so frame-relative reads resolve against the
    /// selected frame. Used by the debugger's `print`.
    #[must_use]
    pub fn duplicate_at_frame(&self, frame_index: usize) -> Self {
        let mut duplicate = self.duplicate();
        duplicate.frames = self.frames[..=frame_index.min(self.frames.len() - 1)].to_vec();
        duplicate
    }
}

//! Named slot storage: scopes, stack frames, and the index-routed accessor
//! handles the parser binds identifiers to.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::context::CallingContext;
use crate::error::{RunError, RunResult};
use crate::script::symbol_table::FunctionDef;
use crate::script::token::Token;
use crate::value::Value;

/// A growing set of named slots that outlives function calls.
///
/// Two concrete scopes exist at runtime: the global scope and at most one
/// pushed local scope. Name→slot resolution happens at parse time; at
/// runtime only slot indices flow. Scopes grow and never shrink during a
/// run, which is what keeps parse-time indices valid.
#[derive(Debug, Default)]
pub struct Scope {
    names: IndexMap<String, usize>,
    values: Vec<Option<Value>>,
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a slot for `name`, unset. Returns its index. Re-adding an
    /// existing name returns the existing slot.
    pub fn add(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.names.get(name) {
            return slot;
        }
        let slot = self.values.len();
        self.names.insert(name.to_owned(), slot);
        self.values.push(None);
        slot
    }

    /// Adds a slot for `name` bound to `value`. Returns its index.
    pub fn define(&mut self, name: &str, value: Value) -> usize {
        let slot = self.add(name);
        self.values[slot] = Some(value);
        slot
    }

    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    #[must_use]
    pub fn value(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot).and_then(Option::as_ref)
    }

    pub fn set(&mut self, slot: usize, value: Value) {
        self.values[slot] = Some(value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Slot names in insertion order, for debugger introspection.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }
}

/// A runtime activation record.
///
/// Frames live on the context's frame stack; the stack order is the
/// prev/next chain the debugger walks. Depth is one-based.
#[derive(Debug)]
pub struct StackFrame {
    pub function: Rc<FunctionDef>,
    pub args: Vec<Value>,
    pub locals: Vec<Option<Value>>,
    pub captures: Vec<Value>,
    pub depth: usize,
    pub calling_token: Token,
}

impl StackFrame {
    #[must_use]
    pub fn new(
        function: Rc<FunctionDef>,
        args: Vec<Value>,
        captures: Vec<Value>,
        depth: usize,
        calling_token: Token,
    ) -> Self {
        let locals = vec![None; function.local_count()];
        Self {
            function,
            args,
            locals,
            captures,
            depth,
            calling_token,
        }
    }
}

/// A parse-time-bound read handle, routed to the right storage class.
///
/// Handles carry only a slot index; names never survive to runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Getter {
    Global(u32),
    Scope(u32),
    Local(u32),
    Arg(u32),
    Capture(u32),
}

/// The matching write handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setter {
    Global(u32),
    Scope(u32),
    Local(u32),
    Arg(u32),
    Capture(u32),
}

fn current_frame(context: &CallingContext) -> RunResult<Rc<RefCell<StackFrame>>> {
    context
        .current_frame()
        .ok_or_else(|| RunError::fatal("Read of frame variable with no frame."))
}

impl Getter {
    pub fn get(&self, context: &CallingContext) -> RunResult<Value> {
        match *self {
            Self::Global(slot) => context
                .globals
                .borrow()
                .value(slot as usize)
                .cloned()
                .ok_or_else(|| RunError::fatal("Read of value before set.")),
            Self::Scope(slot) => {
                let scope = context
                    .scope
                    .as_ref()
                    .ok_or_else(|| RunError::fatal("Read of local variable with no location."))?;
                let scope = scope.borrow();
                if slot as usize >= scope.len() {
                    return Err(RunError::fatal("Read of local variable with bad location."));
                }
                scope
                    .value(slot as usize)
                    .cloned()
                    .ok_or_else(|| RunError::fatal("Read of value before set."))
            }
            Self::Local(slot) => current_frame(context)?
                .borrow()
                .locals
                .get(slot as usize)
                .cloned()
                .flatten()
                .ok_or_else(|| RunError::fatal("Read of value before set.")),
            Self::Arg(slot) => Ok(current_frame(context)?.borrow().args[slot as usize].clone()),
            Self::Capture(slot) => {
                Ok(current_frame(context)?.borrow().captures[slot as usize].clone())
            }
        }
    }
}

impl Setter {
    pub fn set(&self, context: &CallingContext, value: Value) -> RunResult<()> {
        match *self {
            Self::Global(slot) => {
                context.globals.borrow_mut().set(slot as usize, value);
                Ok(())
            }
            Self::Scope(slot) => {
                let scope = context
                    .scope
                    .as_ref()
                    .ok_or_else(|| RunError::fatal("Write of local variable with no location."))?;
                let mut scope = scope.borrow_mut();
                if slot as usize >= scope.len() {
                    return Err(RunError::fatal("Write of local variable with bad location."));
                }
                scope.set(slot as usize, value);
                Ok(())
            }
            Self::Local(slot) => {
                current_frame(context)?.borrow_mut().locals[slot as usize] = Some(value);
                Ok(())
            }
            Self::Arg(slot) => {
                current_frame(context)?.borrow_mut().args[slot as usize] = value;
                Ok(())
            }
            // Writes land in the frame's capture slot only; the closed-over
            // binding outside the frame is untouched.
            Self::Capture(slot) => {
                current_frame(context)?.borrow_mut().captures[slot as usize] = value;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_slots_are_stable_and_ordered() {
        let mut scope = Scope::new();
        let a = scope.add("alpha");
        let b = scope.add("beta");
        assert_eq!((a, b), (0, 1));
        assert_eq!(scope.add("alpha"), 0);
        let names: Vec<&str> = scope.names().collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[test]
    fn unset_slot_reads_are_none() {
        let mut scope = Scope::new();
        let slot = scope.add("x");
        assert!(scope.value(slot).is_none());
        scope.set(slot, Value::string("set"));
        assert!(scope.value(slot).is_some());
    }
}

#![doc = include_str!("../../../README.md")]

pub mod cell;
mod context;
mod debugger;
mod error;
mod io;
pub mod number;
mod scope;
pub mod script;
mod value;

pub use crate::{
    cell::engine::{CellContext, Sheet, SheetStore},
    context::CallingContext,
    debugger::{DebuggerHook, DefaultDebugger, NullDebugger},
    error::{RunError, RunResult},
    io::{CollectingLogger, ConsoleLogger, Logger, NullLogger},
    number::{Backend, Number, RoundMode},
    scope::{Getter, Scope, Setter, StackFrame},
    value::{CellRange, CellRef, FunctionValue, Value},
};

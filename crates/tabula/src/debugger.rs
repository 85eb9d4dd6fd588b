//! The interactive debugger hook.
//!
//! Components invoke [`DebuggerHook::enter_debugger`] at the point of
//! failure, before the error propagates, so the live stack is still
//! standing. The default implementation drives a small command loop over
//! the logger's input channel; embedders can substitute their own hook (or
//! attach none, which makes every entry a no-op).

use std::rc::Rc;

use crate::context::CallingContext;
use crate::io::Logger;
use crate::scope::StackFrame;
use crate::script::lexer::Lexer;
use crate::script::parser::Parser;
use crate::script::symbol_table::SymbolTable;

/// Hook invoked on runtime errors (and by the `EnterDebugger` stdlib
/// function).
pub trait DebuggerHook {
    fn enter_debugger(&self, message: &str, context: &mut CallingContext);
}

/// A hook that ignores every entry.
#[derive(Debug, Default)]
pub struct NullDebugger;

impl DebuggerHook for NullDebugger {
    fn enter_debugger(&self, _message: &str, _context: &mut CallingContext) {}
}

/// The interactive inspector.
///
/// Commands: `bt` (stack trace), `up`/`down` (walk frames), `show` (names
/// visible here), `print expr` (parse and evaluate in the selected frame),
/// `quit`. An empty line repeats the previous command.
#[derive(Debug, Default)]
pub struct DefaultDebugger;

fn frame_line(frame: &StackFrame) -> String {
    format!(
        "#{}: >{}< from line {} in {}",
        frame.depth,
        frame.function.display_name(),
        frame.calling_token.line_number,
        frame.calling_token.source_name
    )
}

fn read_line(context: &CallingContext) -> String {
    context.logger.borrow_mut().get_line()
}

impl DefaultDebugger {
    fn describe_frame(context: &CallingContext, selected: Option<usize>) -> String {
        match selected.and_then(|index| context.frame_at(index)) {
            Some(frame) => format!("In function {}", frame_line(&frame.borrow())),
            None => "Not in a function frame.".to_owned(),
        }
    }

    fn backtrace(context: &CallingContext, selected: Option<usize>) -> String {
        let Some(selected) = selected else {
            return "Not in a function frame.".to_owned();
        };
        let mut lines = Vec::new();
        for index in (0..=selected).rev() {
            if let Some(frame) = context.frame_at(index) {
                lines.push(frame_line(&frame.borrow()));
            }
        }
        lines.join("\n")
    }

    fn show(context: &CallingContext, selected: Option<usize>) -> String {
        let mut out = String::new();
        if let Some(frame) = selected.and_then(|index| context.frame_at(index)) {
            let frame = frame.borrow();
            let mut names = frame.function.arg_names();
            names.extend(frame.function.local_names());
            names.extend(frame.function.capture_names());
            out.push_str("These variables are in the current stack frame: ");
            out.push_str(&names.join(", "));
        }
        if let Some(scope) = &context.scope {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("These variables are in the current scope: ");
            let scope = scope.borrow();
            let joined: Vec<String> = scope.names().map(str::to_owned).collect();
            out.push_str(&joined.join(", "));
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("These variables are in the global scope: ");
        let globals = context.globals.borrow();
        let joined: Vec<String> = globals.names().map(str::to_owned).collect();
        out.push_str(&joined.join(", "));
        out
    }

    fn print(context: &mut CallingContext, selected: Option<usize>, argument: &str) {
        let mut table = SymbolTable::new(Rc::clone(&context.globals));
        if let Some(scope) = &context.scope {
            table.push_scope(Rc::clone(scope));
        }
        if let Some(frame) = selected.and_then(|index| context.frame_at(index)) {
            table.inject_context(Rc::clone(&frame.borrow().function));
        }
        let parsed = {
            let logger = Rc::clone(&context.logger);
            let mut logger = logger.borrow_mut();
            let mut lexer = Lexer::new(argument, "Print Argument");
            Parser::parse_full_expression(&mut lexer, &mut table, &mut *logger)
        };
        let Some(expr) = parsed else {
            context.log("Didn't understand that.");
            return;
        };
        // Evaluate against a duplicate whose debugger is disabled, so a
        // failing print cannot re-enter this loop.
        let mut duplicate = match selected {
            Some(index) => context.duplicate_at_frame(index),
            None => context.duplicate(),
        };
        match expr.evaluate(&mut duplicate) {
            Ok(value) => context.log(&value.debug_render()),
            Err(error) => context.log(&format!("Error: {}", error.message())),
        }
    }
}

impl DebuggerHook for DefaultDebugger {
    fn enter_debugger(&self, message: &str, context: &mut CallingContext) {
        if !message.is_empty() {
            context.log(&format!("Entered debugger with message: {message}"));
        }

        let mut selected = context.depth().checked_sub(1);
        context.log(&Self::describe_frame(context, selected));

        let mut previous = String::new();
        let mut line = read_line(context);
        while line != "quit" {
            if line.is_empty() {
                line = previous.clone();
            }

            if line == "down" {
                match selected {
                    Some(index) if index > 0 => {
                        selected = Some(index - 1);
                        context.log(&Self::describe_frame(context, selected));
                    }
                    _ => context.log("Already in bottom-most frame."),
                }
            } else if line == "up" {
                match selected {
                    Some(index) if index + 1 < context.depth() => {
                        selected = Some(index + 1);
                        context.log(&Self::describe_frame(context, selected));
                    }
                    _ => context.log("Already in top-most frame."),
                }
            } else if line == "bt" {
                let trace = Self::backtrace(context, selected);
                context.log(&trace);
            } else if line == "show" {
                let listing = Self::show(context, selected);
                context.log(&listing);
            } else if let Some(argument) = line.strip_prefix("print") {
                Self::print(context, selected, argument);
            } else {
                context.log(&format!(
                    "Did not understand >{line}<.\n\
                     Known commands are: \n\
                     \tquit - exit the debugger and continue running\n\
                     \tbt - give a back trace to the current stack frame\n\
                     \tup - go up one calling stack frame\n\
                     \tdown - go down one callee stack frame\n\
                     \tshow - show the variables in this stack frame\n\
                     \tprint variable_name - show the value in the given variable"
                ));
            }

            previous = line;
            line = read_line(context);
        }
    }
}

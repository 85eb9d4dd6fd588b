//! The interactive debugger: command loop, stack walking, frame-scoped
//! `print`.

mod common;

use std::rc::Rc;

use common::Harness;
use tabula::DefaultDebugger;

/// Runs a failing program with scripted debugger input, returning the log.
fn debug_session(commands: &[&str], source: &str) -> Vec<String> {
    let mut harness = Harness::new();
    harness.context.debugger = Some(Rc::new(DefaultDebugger));
    {
        let mut logger = harness.logger.borrow_mut();
        for command in commands {
            logger.push_input(*command);
        }
    }
    let _ = harness.run(source);
    harness.logs()
}

const FAILING_PROGRAM: &str = "set inner to function inner_fn (x) is \
        return x + 'boom' \
     end \
     set outer to function outer_fn (y) is \
        return inner(y) \
     end \
     call outer(3)";

#[test]
fn entry_announces_message_and_frame() {
    let logs = debug_session(&["quit"], FAILING_PROGRAM);
    assert!(
        logs[0].starts_with("Entered debugger with message: Error adding a String to a Float.")
    );
    assert!(logs[1].starts_with("In function #2: >inner_fn<"));
}

#[test]
fn backtrace_walks_the_stack_top_down() {
    let logs = debug_session(&["bt", "quit"], FAILING_PROGRAM);
    let trace = logs
        .iter()
        .find(|line| line.contains("#2: >inner_fn<") && line.contains("#1: >outer_fn<"))
        .expect("backtrace with both frames");
    let inner_at = trace.find("#2: >inner_fn<").unwrap();
    let outer_at = trace.find("#1: >outer_fn<").unwrap();
    assert!(inner_at < outer_at);
}

#[test]
fn up_and_down_navigate_frames() {
    let logs = debug_session(&["up", "down", "down", "down", "quit"], FAILING_PROGRAM);
    assert!(logs.iter().any(|m| m == "Already in top-most frame."));
    assert!(logs.iter().any(|m| m.contains("In function #1: >outer_fn<")));
    assert!(logs.iter().any(|m| m == "Already in bottom-most frame."));
}

#[test]
fn show_lists_frame_and_global_names() {
    let logs = debug_session(&["show", "quit"], FAILING_PROGRAM);
    let listing = logs
        .iter()
        .find(|m| m.contains("These variables are in the current stack frame"))
        .expect("show output");
    assert!(listing.contains("x"));
    assert!(listing.contains("These variables are in the global scope"));
    assert!(listing.contains("inner"));
    assert!(listing.contains("PushBack"));
}

#[test]
fn print_evaluates_in_the_selected_frame() {
    let logs = debug_session(&["print x", "down", "print y * 2", "quit"], FAILING_PROGRAM);
    assert!(logs.iter().any(|m| m == "3"));
    assert!(logs.iter().any(|m| m == "6"));
}

#[test]
fn print_failures_stay_inside_the_debugger() {
    let logs = debug_session(&["print x + 'again'", "print 1 + 1", "quit"], FAILING_PROGRAM);
    // The failing print reports and does not re-enter; the session goes on.
    assert!(logs.iter().any(|m| m.starts_with("Error: Error adding")));
    assert!(logs.iter().any(|m| m == "2"));
    let entries = logs
        .iter()
        .filter(|m| m.starts_with("Entered debugger"))
        .count();
    assert_eq!(entries, 1);
}

#[test]
fn empty_line_repeats_the_previous_command() {
    let logs = debug_session(&["print x", "", "quit"], FAILING_PROGRAM);
    let threes = logs.iter().filter(|m| *m == "3").count();
    assert_eq!(threes, 2);
}

#[test]
fn unknown_commands_get_help() {
    let logs = debug_session(&["wat", "quit"], FAILING_PROGRAM);
    assert!(logs.iter().any(|m| m.contains("Did not understand >wat<")));
    assert!(logs.iter().any(|m| m.contains("Known commands are")));
}

#[test]
fn enter_debugger_stdlib_function_invokes_the_hook() {
    let mut harness = Harness::new();
    harness.context.debugger = Some(Rc::new(DefaultDebugger));
    harness.logger.borrow_mut().push_input("quit");
    harness.run_ok("call EnterDebugger()");
    // An explicit entry carries no message, so the first line names the
    // frame of the native body.
    assert!(harness.logs()[0].contains("In function"));
}

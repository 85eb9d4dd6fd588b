//! The logging channel both languages print through.
//!
//! `Error`/`Warn`/`Info`/`Fatal`/`DebugPrint` in Script, parse diagnostics,
//! and the interactive debugger all talk to a [`Logger`]. The trait also
//! carries the debugger's *input* channel: when the debugger needs a
//! command it asks the logger for a line, which lets embedders route the
//! exchange through whatever UI they have. Implementations here cover the
//! console, capturing output for tests, and discarding everything.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// Output sink and debugger input source.
pub trait Logger {
    /// Emits one message.
    fn log(&mut self, message: &str);

    /// Reads one command line for the debugger. Returning `"quit"` ends the
    /// debugger session.
    fn get_line(&mut self) -> String;
}

/// Logs to stdout and reads debugger commands from stdin.
#[derive(Debug, Default)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&mut self, message: &str) {
        println!("{message}");
        let _ = std::io::stdout().flush();
    }

    fn get_line(&mut self) -> String {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => "quit".to_owned(),
            Ok(_) => line.trim_end_matches(['\r', '\n']).to_owned(),
        }
    }
}

/// Collects messages in memory and replays scripted debugger input.
///
/// The workhorse of the test suite: execution tests assert on the collected
/// lines, debugger tests seed `input` with a command script.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    messages: Vec<String>,
    input: VecDeque<String>,
}

impl CollectingLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a line for the debugger to read.
    pub fn push_input(&mut self, line: impl Into<String>) {
        self.input.push_back(line.into());
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Logger for CollectingLogger {
    fn log(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }

    fn get_line(&mut self) -> String {
        // An exhausted script quits rather than hanging the debugger loop.
        self.input.pop_front().unwrap_or_else(|| "quit".to_owned())
    }
}

/// Discards all output; the debugger quits immediately.
#[derive(Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&mut self, _message: &str) {}

    fn get_line(&mut self) -> String {
        "quit".to_owned()
    }
}

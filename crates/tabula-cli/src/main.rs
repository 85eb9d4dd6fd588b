//! Batch front end: load Script libraries, run a Script file, evaluate
//! cell formulas from the command line.
//!
//! Usage:
//!
//! ```text
//! tabula [--lib FILE]... [--cell FORMULA]... [SCRIPT]
//! ```
//!
//! Libraries are parsed in functions-only mode into the global scope; the
//! optional script runs next; cell formulas are evaluated last, each at
//! A1, and report independently — a failing formula does not stop the
//! batch.

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use std::{env, fs};

use tracing::debug;
use tracing_subscriber::EnvFilter;

use tabula::script::lexer::Lexer;
use tabula::script::parser::Parser;
use tabula::script::stdlib;
use tabula::script::symbol_table::SymbolTable;
use tabula::{
    CallingContext, CellContext, ConsoleLogger, DefaultDebugger, Logger, Sheet,
};

struct Options {
    libraries: Vec<String>,
    formulas: Vec<String>,
    script: Option<String>,
}

fn parse_args() -> Result<Options, String> {
    let mut libraries = Vec::new();
    let mut formulas = Vec::new();
    let mut script = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--lib" => {
                libraries.push(args.next().ok_or("--lib requires a file argument")?);
            }
            "--cell" => {
                formulas.push(args.next().ok_or("--cell requires a formula argument")?);
            }
            "--help" | "-h" => {
                return Err("usage: tabula [--lib FILE]... [--cell FORMULA]... [SCRIPT]".to_owned());
            }
            other if script.is_none() => script = Some(other.to_owned()),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }
    Ok(Options {
        libraries,
        formulas,
        script,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let logger: Rc<RefCell<dyn Logger>> = Rc::new(RefCell::new(ConsoleLogger));
    let globals = stdlib::standard_globals(Rc::clone(&logger));
    let store = Rc::new(RefCell::new(Sheet::new()));

    let mut context = CallingContext::new(Rc::clone(&globals), Rc::clone(&logger));
    context.debugger = Some(Rc::new(DefaultDebugger));
    context.cells = Some(CellContext::new(store));

    for library in &options.libraries {
        let source = match fs::read_to_string(library) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("error reading {library}: {error}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(error) = stdlib::load_library(&mut context, &source, library) {
            eprintln!("error loading {library}:\n{error}");
            return ExitCode::FAILURE;
        }
        debug!(library, "library loaded");
    }

    if let Some(script) = &options.script {
        let source = match fs::read_to_string(script) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("error reading {script}: {error}");
                return ExitCode::FAILURE;
            }
        };
        let mut table = SymbolTable::new(Rc::clone(&globals));
        let parsed = {
            let mut logger = logger.borrow_mut();
            let mut lexer = Lexer::new(&source, script);
            Parser::parse(&mut lexer, &mut table, &mut *logger)
        };
        let Some(program) = parsed else {
            eprintln!("could not parse {script}");
            return ExitCode::FAILURE;
        };
        if let Err(error) = program.execute(&mut context) {
            eprintln!("error running {script}:\n{error}");
            return ExitCode::FAILURE;
        }
    }

    // Batch formulas: report each independently and keep going.
    let mut failures = 0;
    for formula in &options.formulas {
        let parsed = {
            let mut logger = logger.borrow_mut();
            tabula::cell::engine::parse_cell_source(formula, &globals, &mut *logger, 1, 1)
        };
        let Some(expr) = parsed else {
            eprintln!("{formula} => parse error");
            failures += 1;
            continue;
        };
        match expr.evaluate(&mut context) {
            Ok(value) => println!("{formula} => {}", value.debug_render()),
            Err(error) => {
                eprintln!("{formula} => {error}");
                failures += 1;
            }
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

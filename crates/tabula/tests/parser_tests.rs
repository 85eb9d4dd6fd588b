//! Parser diagnostics: recovery, shadow warnings, label and capture
//! checking.

mod common;

use std::rc::Rc;

use common::Harness;
use tabula::script::lexer::Lexer;
use tabula::script::parser::Parser;
use tabula::script::stdlib;
use tabula::script::symbol_table::SymbolTable;

fn parse_fails(harness: &mut Harness, source: &str) -> Vec<String> {
    let mut table = SymbolTable::new(Rc::clone(&harness.globals));
    let parsed = {
        let mut logger = harness.logger.borrow_mut();
        let mut lexer = Lexer::new(source, "Test");
        Parser::parse(&mut lexer, &mut table, &mut *logger)
    };
    assert!(parsed.is_none(), "expected a parse failure for {source:?}");
    harness.logs()
}

#[test]
fn undefined_identifiers_are_rejected() {
    let mut harness = Harness::new();
    let logs = parse_fails(&mut harness, "call nowhere()");
    assert!(logs.iter().any(|m| m.contains("Undefined identifier >nowhere<")));
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let mut harness = Harness::new();
    let logs = parse_fails(&mut harness, "break");
    assert!(logs.iter().any(|m| m.contains("but not in loop")));
}

#[test]
fn unknown_labels_are_rejected() {
    let mut harness = Harness::new();
    let logs = parse_fails(
        &mut harness,
        "for x from 1 to 3 do break Missing end",
    );
    assert!(logs.iter().any(|m| m.contains("Loop label >Missing< has not been defined")));
}

#[test]
fn duplicate_labels_are_rejected() {
    let mut harness = Harness::new();
    let logs = parse_fails(
        &mut harness,
        "for x from 1 to 3 call Bob do \
            for y from 1 to 3 call Bob do \
               call Info('body') \
            end \
         end",
    );
    assert!(logs.iter().any(|m| m.contains("Label >Bob< is already defined")));
}

#[test]
fn set_of_an_active_function_name_is_rejected() {
    let mut harness = Harness::new();
    let logs = parse_fails(
        &mut harness,
        "set f to function g () is set g to 1 return 1 end",
    );
    assert!(logs.iter().any(|m| m.contains("is not allowed in this context")));
}

#[test]
fn fresh_names_cannot_take_an_index_chain() {
    let mut harness = Harness::new();
    let logs = parse_fails(&mut harness, "set brandnew[0] to 1");
    assert!(
        logs.iter()
            .any(|m| m.contains("cannot be a Dictionary or Array in this context"))
    );
}

#[test]
fn capture_count_must_match_names() {
    let mut harness = Harness::new();
    let logs = parse_fails(
        &mut harness,
        "set f to function [1; 2] () [only] is return only end",
    );
    assert!(
        logs.iter()
            .any(|m| m.contains("parameterized with 2 values but given 1 value names"))
    );
}

#[test]
fn recursive_capture_sites_must_supply_all_captures() {
    let mut harness = Harness::new();
    let logs = parse_fails(
        &mut harness,
        "set f to function loop [1] (x) [c] is return loop[] (x) end",
    );
    assert!(!logs.is_empty());
}

#[test]
fn library_mode_warns_when_shadowing_a_global() {
    let mut harness = Harness::new();
    let outcome = stdlib::load_library(
        &mut harness.context,
        "set SUM to function (x) is return 0 end ",
        "User Library",
    );
    assert!(outcome.is_ok());
    assert!(
        harness
            .logs()
            .iter()
            .any(|m| m.contains("will create a local variable that shadows the global variable"))
    );
}

#[test]
fn library_mode_rejects_non_set_statements() {
    let mut harness = Harness::new();
    let outcome = stdlib::load_library(
        &mut harness.context,
        "call Info('not a definition')",
        "User Library",
    );
    assert!(outcome.is_err());
    assert!(
        harness
            .logs()
            .iter()
            .any(|m| m.contains("while parsing only functions"))
    );
}

#[test]
fn recovery_reports_each_broken_statement_once() {
    let mut harness = Harness::new();
    let logs = parse_fails(
        &mut harness,
        "set x to ) set y to 2 set z to )",
    );
    let reports = logs
        .iter()
        .filter(|m| m.contains("Expected >primary expression<"))
        .count();
    assert_eq!(reports, 2);
}

#[test]
fn duplicate_argument_names_warn() {
    let mut harness = Harness::new();
    let mut table = SymbolTable::new(Rc::clone(&harness.globals));
    let parsed = {
        let mut logger = harness.logger.borrow_mut();
        let mut lexer = Lexer::new(
            "set f to function (a; a) is return a end ",
            "Test",
        );
        Parser::parse(&mut lexer, &mut table, &mut *logger)
    };
    assert!(parsed.is_none());
    assert!(
        harness
            .logs()
            .iter()
            .any(|m| m.contains("for function argument is already defined"))
    );
}

#[test]
fn cell_parser_rejects_unknown_functions() {
    let mut harness = Harness::new();
    let parsed = {
        let mut logger = harness.logger.borrow_mut();
        tabula::cell::engine::parse_cell_source(
            "@NOSUCH(1)",
            &harness.globals,
            &mut *logger,
            1,
            1,
        )
    };
    assert!(parsed.is_none());
    assert!(
        harness
            .logs()
            .iter()
            .any(|m| m.contains("Name >NOSUCH< is not a function"))
    );
}

#[test]
fn cell_parser_requires_full_consumption() {
    let mut harness = Harness::new();
    let parsed = {
        let mut logger = harness.logger.borrow_mut();
        tabula::cell::engine::parse_cell_source("1 2", &harness.globals, &mut *logger, 1, 1)
    };
    assert!(parsed.is_none());
}

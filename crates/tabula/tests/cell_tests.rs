//! Cell-language evaluation, rendering, names, ranges, and the generation
//! cache.

mod common;

use common::{Harness, shown};

#[test]
fn arithmetic_with_parentheses() {
    let mut harness = Harness::new();
    let value = harness.eval_cell("(1 + 8) * (5 + 1)", 1, 1).unwrap();
    assert_eq!(shown(&value), "54");
}

#[test]
fn references_resolve_through_the_sheet() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "5");
    harness.set_cell(2, 2, "7");
    let value = harness.eval_cell("A1+B2", 3, 3).unwrap();
    assert_eq!(shown(&value), "12");
}

#[test]
fn relative_references_follow_the_evaluating_cell() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "10");
    harness.set_cell(1, 2, "20");
    // "A1" written in B1 means "one column left, same row".
    harness.set_cell(2, 1, "A1*2");
    harness.set_cell(2, 2, "A2*2");
    assert_eq!(shown(&harness.eval_cell("B1+B2", 5, 5).unwrap()), "60");
}

#[test]
fn empty_cells_are_nil_and_detectable() {
    let mut harness = Harness::new();
    let value = harness.eval_cell("@ABS(Z9)", 1, 1).unwrap();
    assert_eq!(shown(&value), "Nil");
    let error = harness.eval_cell("Z9+1", 1, 1).unwrap_err();
    assert!(error.is_typed());
}

#[test]
fn concatenation_renders_numbers() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "3");
    let value = harness.eval_cell("A1&\" apples\"", 2, 1).unwrap();
    assert_eq!(shown(&value), "\"3 apples\"");
}

#[test]
fn comparisons_yield_floats() {
    let mut harness = Harness::new();
    assert_eq!(shown(&harness.eval_cell("1<2", 1, 1).unwrap()), "1");
    assert_eq!(shown(&harness.eval_cell("1>2", 1, 1).unwrap()), "0");
    assert_eq!(shown(&harness.eval_cell("\"a\"<>\"b\"", 1, 1).unwrap()), "1");
}

#[test]
fn aggregates_walk_ranges() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "1");
    harness.set_cell(1, 2, "2");
    harness.set_cell(2, 1, "3");
    harness.set_cell(2, 2, "4");
    assert_eq!(shown(&harness.eval_cell("@SUM(A1:B2)", 3, 3).unwrap()), "10");
    assert_eq!(shown(&harness.eval_cell("@COUNT(A1:B2)", 3, 3).unwrap()), "4");
    assert_eq!(shown(&harness.eval_cell("@MIN(A1:B2)", 3, 3).unwrap()), "1");
    assert_eq!(shown(&harness.eval_cell("@MAX(A1:B2)", 3, 3).unwrap()), "4");
    assert_eq!(
        shown(&harness.eval_cell("@AVERAGE(A1:B2)", 3, 3).unwrap()),
        "2"
    );
}

#[test]
fn aggregates_skip_strings_and_empties() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "1");
    harness.set_cell(1, 2, "\"label\"");
    harness.set_cell(1, 4, "5");
    assert_eq!(shown(&harness.eval_cell("@SUM(A1:A9)", 3, 3).unwrap()), "6");
    assert_eq!(shown(&harness.eval_cell("@COUNT(A1:A9)", 3, 3).unwrap()), "2");
}

#[test]
fn aggregates_take_extra_scalar_arguments() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "1");
    harness.set_cell(1, 2, "2");
    assert_eq!(
        shown(&harness.eval_cell("@SUM(A1:A2; 39)", 5, 5).unwrap()),
        "42"
    );
}

#[test]
fn named_cells_resolve() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "21");
    assert_eq!(
        shown(&harness.eval_cell("@LET(\"total\"; $A$1)", 2, 2).unwrap()),
        "\"total\""
    );
    assert_eq!(shown(&harness.eval_cell("_total*2", 9, 9).unwrap()), "42");
}

#[test]
fn undefined_names_error() {
    let mut harness = Harness::new();
    let error = harness.eval_cell("_nothing+1", 1, 1).unwrap_err();
    assert!(error.is_typed());
    assert!(error.message().contains("has not been defined"));
}

#[test]
fn cell_wrappers_configure_the_number_system() {
    let mut harness = Harness::new();
    assert_eq!(shown(&harness.eval_cell("@SETSCALE(4)", 1, 1).unwrap()), "4");
    assert_eq!(shown(&harness.eval_cell("1/3", 1, 1).unwrap()), "0.3333");
    assert_eq!(shown(&harness.eval_cell("@GETSCALE()", 1, 1).unwrap()), "4");
    assert_eq!(shown(&harness.eval_cell("@INT(7/2)", 1, 1).unwrap()), "3");
    assert_eq!(shown(&harness.eval_cell("@ROUND(7/2)", 1, 1).unwrap()), "4");
}

#[test]
fn dynamic_cell_eval() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "\"2*21\"");
    assert_eq!(shown(&harness.eval_cell("@EVAL(A1)", 2, 2).unwrap()), "42");
}

#[test]
fn render_round_trips_at_origin_and_relocates() {
    let mut harness = Harness::new();
    let parsed = {
        let mut logger = harness.logger.borrow_mut();
        tabula::cell::engine::parse_cell_source(
            "A1+B2+$A1+A$1+$A$1+A1!A",
            &harness.globals,
            &mut *logger,
            1,
            1,
        )
        .unwrap()
    };
    assert_eq!(parsed.render(1, 1), "A1+B2+$A1+A$1+$A$1+A1!A");
    assert_eq!(parsed.render(2, 2), "B2+C3+$A2+B$1+$A$1+B2!A");
}

#[test]
fn render_handles_ranges_functions_and_precedence() {
    let mut harness = Harness::new();
    let render = |harness: &mut Harness, source: &str| {
        let mut logger = harness.logger.borrow_mut();
        tabula::cell::engine::parse_cell_source(source, &harness.globals, &mut *logger, 1, 1)
            .unwrap_or_else(|| panic!("parse failed for {source}"))
            .render(1, 1)
    };
    assert_eq!(render(&mut harness, "A1:B3"), "A1:B3");
    assert_eq!(render(&mut harness, "@SUM(A1:B3;3)"), "@SUM(A1:B3;3)");
    assert_eq!(render(&mut harness, "(1+8)*(5+1)"), "(1+8)*(5+1)");
    assert_eq!(render(&mut harness, "-A1+B2"), "-A1+B2");
    assert_eq!(render(&mut harness, "1-(2+3)"), "1-(2+3)");
    assert_eq!(render(&mut harness, "@GETSCALE"), "@GETSCALE");
    assert_eq!(render(&mut harness, "\"he said \"\"hi\"\"\""), "\"he said \"\"hi\"\"\"");
}

#[test]
fn range_render_relocates_both_ends() {
    let mut harness = Harness::new();
    let parsed = {
        let mut logger = harness.logger.borrow_mut();
        tabula::cell::engine::parse_cell_source("A1:B3", &harness.globals, &mut *logger, 1, 1)
            .unwrap()
    };
    assert_eq!(parsed.render(2, 2), "B2:C4");
}

#[test]
fn generation_cache_reuses_values_within_a_pass() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set counter to 0 \
         set BUMP to function (x) is \
            set counter to counter + 1 \
            return counter \
         end ",
    );
    harness.set_cell(1, 1, "@BUMP()");
    // Two references to A1 in one generation: one evaluation, cached.
    assert_eq!(shown(&harness.eval_cell("A1+A1", 2, 2).unwrap()), "2");
    assert_eq!(shown(&harness.eval_cell("A1+0", 2, 2).unwrap()), "1");
    // A new generation invalidates the cache.
    harness.context.cells.as_ref().unwrap().bump_generation();
    assert_eq!(shown(&harness.eval_cell("A1+0", 2, 2).unwrap()), "2");
}

#[test]
fn expand_range_unpacks_cells() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "7");
    harness.set_cell(1, 2, "8");
    harness.run_ok(
        "set total to 0 \
         for ref in ExpandRange(CellEval('A1:A2')) do \
            set total to total + EvalCell(ref) \
         end \
         call Info(ToString(total))",
    );
    assert_eq!(harness.logs(), ["INFO: 15"]);
}

#[test]
fn failing_cell_leaves_neighbours_computable() {
    let mut harness = Harness::new();
    harness.set_cell(1, 1, "1+\"x\"");
    harness.set_cell(1, 2, "2");
    assert!(harness.eval_cell("A1", 3, 3).is_err());
    assert_eq!(shown(&harness.eval_cell("A2+1", 3, 3).unwrap()), "3");
}

#[test]
fn sheet_tags_address_other_sheets() {
    let mut harness = Harness::new();
    {
        let parsed = {
            let mut logger = harness.logger.borrow_mut();
            tabula::cell::engine::parse_cell_source("11", &harness.globals, &mut *logger, 1, 1)
                .unwrap()
        };
        harness
            .store
            .borrow_mut()
            .set_expression(Some("DATA"), 1, 1, parsed);
    }
    harness.set_cell(1, 1, "5");
    assert_eq!(shown(&harness.eval_cell("A1!DATA+A1", 2, 2).unwrap()), "16");
}

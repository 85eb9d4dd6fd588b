//! End-to-end Script execution: control flow, functions, closures,
//! assignment, and the logging channel.

mod common;

use std::rc::Rc;

use common::{CountingDebugger, Harness, shown};

#[test]
fn if_branches_choose_correctly() {
    let mut harness = Harness::new();
    harness.run_ok(
        "if 7 < 5 then call Info('True') else call Info('False') end \
         if 5 < 7 then call Info('True') else call Info('False') end ",
    );
    assert_eq!(harness.logs(), ["INFO: False", "INFO: True"]);
}

#[test]
fn recursive_function_literal_called_in_place() {
    let mut harness = Harness::new();
    harness.run_ok(
        "call Info(ToString(function fib (y) is \
            if y > 1 then \
               return fib(y - 1) * y \
            else \
               return 1 \
            end \
         end (5)))",
    );
    assert_eq!(harness.logs(), ["INFO: 120"]);
}

#[test]
fn loops_and_labels_run_the_expected_iterations() {
    let mut harness = Harness::new();
    harness.run_ok(
        "for x from 1 to 10 do \
            call Info('Nope') \
         end \
         for x from 10 downto 1 do \
            call Info('Nope') \
         end \
         for x from 2 to 10 step 2 do \
            call Info('Nope') \
         end \
         for x in {1; 2; 3} do \
            call Info('Nope') \
         end \
         for x in {1 : 1; 2 : 2; 3 : 3} do \
            call Info('Nope') \
         end \
         for x from 1 to 10 call Bob do \
            for y from 1 to 10 do \
               select x from \
                  case 1 is \
                     continue Bob \
                  case 2 is \
                     break Bob \
               end \
            end \
         end \
         for x in {1; 2; 3} call Bob do \
            for y in {1; 2; 3} do \
               select x from \
                  case 1 is \
                     continue Bob \
                  case 2 is \
                     break Bob \
               end \
            end \
         end \
         for x in {1 : 1; 2 : 2; 3 : 3} call Bob do \
            for y in {1 : 1; 2 : 2; 3 : 3} do \
               select x[0] from \
                  case 1 is \
                     continue Bob \
                  case 2 is \
                     break Bob \
               end \
            end \
         end \
         set y to function () is \
            for x from 1 to 10 do \
               return 1 \
            end \
         end \
         call y() \
         set y to function () is \
            for x in { 1; 2; 3} do \
               return 1 \
            end \
         end \
         call y() \
         set y to function () is \
            for x in {1 : 1; 2 : 2; 3 : 3} do \
               return 1 \
            end \
         end \
         call y() ",
    );
    assert_eq!(harness.logs().len(), 31);
    assert!(harness.logs().iter().all(|line| line == "INFO: Nope"));
}

#[test]
fn while_loop_with_label_breaks_out_of_both() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set x to 0 \
         while 1 call Outer do \
            while 1 do \
               set x to x + 1 \
               if x > 3 then \
                  break Outer \
               end \
            end \
         end \
         call Info(ToString(x))",
    );
    assert_eq!(harness.logs(), ["INFO: 4"]);
}

#[test]
fn select_supports_ranges_fallthrough_and_else() {
    let mut harness = Harness::new();
    let program = "set describe to function (n) is \
            select n from \
               case below 0 is \
                  return 'negative' \
               case from 0 to 9 is \
                  return 'small' \
               also case 10 is \
                  return 'ten' \
               case above 100 is \
                  return 'big' \
               case else is \
                  return 'medium' \
            end \
            return 'unreached' \
         end \
         call Info(describe(0 - 5)) \
         call Info(describe(3)) \
         call Info(describe(10)) \
         call Info(describe(50)) \
         call Info(describe(200))";
    harness.run_ok(program);
    assert_eq!(
        harness.logs(),
        [
            "INFO: negative",
            "INFO: small",
            "INFO: ten",
            "INFO: medium",
            "INFO: big"
        ]
    );
}

#[test]
fn select_fall_through_is_opt_in() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set x to 1 \
         select x from \
            case 1 is \
               call Info('one') \
            also case 2 is \
               call Info('two') \
            case 3 is \
               call Info('three') \
         end ",
    );
    // The matched case runs, the non-breaking successor runs, the breaking
    // one stops the scan.
    assert_eq!(harness.logs(), ["INFO: one", "INFO: two"]);
}

#[test]
fn nested_assignment_rebuilds_containers() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set x to {10; 20; 30} \
         set x[1] to 99 \
         call Info(ToString(x[0])) \
         call Info(ToString(x[1])) \
         call Info(ToString(x[2])) \
         set d to NewDictionary() \
         set d to Insert(d; 'inner'; {1; 2}) \
         set d.inner[0] to 7 \
         call Info(ToString(d.inner[0])) \
         call Info(ToString(d.inner[1]))",
    );
    assert_eq!(
        harness.logs(),
        ["INFO: 10", "INFO: 99", "INFO: 30", "INFO: 7", "INFO: 2"]
    );
}

#[test]
fn sibling_positions_survive_nested_writes() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set x to {{1; 2}; {3; 4}} \
         set x[0][1] to 9 \
         call DebugPrint(x)",
    );
    assert_eq!(harness.logs(), ["{ { 1; 9 }; { 3; 4 } }"]);
}

#[test]
fn indexing_a_float_enters_the_debugger_and_raises() {
    let mut harness = Harness::new();
    let debugger = Rc::new(CountingDebugger::default());
    harness.context.debugger = Some(debugger.clone());
    let error = harness
        .run("set x to 3 set x[2] to 5")
        .expect_err("indexing a Float is a typed error");
    assert!(error.is_typed());
    assert!(error.message().contains("Error indexing non-Collection."));
    assert_eq!(debugger.entries.get(), 1);
    assert!(
        debugger
            .last_message
            .borrow()
            .contains("Error indexing non-Collection.")
    );
}

#[test]
fn eval_runs_expressions_and_rejects_statements() {
    let mut harness = Harness::new();
    let value = harness.eval("Eval('2 + 3')").unwrap();
    assert_eq!(shown(&value), "5");
    let error = harness.eval("Eval('2 + 3 end ')").unwrap_err();
    assert!(error.is_typed());
}

#[test]
fn eval_sees_the_current_globals() {
    let mut harness = Harness::new();
    harness.run_ok("set stride to 4 call Info(ToString(Eval('stride * 2')))");
    assert_eq!(harness.logs(), ["INFO: 8"]);
}

#[test]
fn short_circuit_skips_the_poisoned_side() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set boom to function () is return 'text' + 1 end \
         if 0 & boom() then call Info('yes') else call Info('no') end \
         if 1 | boom() then call Info('yes') else call Info('no') end ",
    );
    assert_eq!(harness.logs(), ["INFO: no", "INFO: yes"]);
}

#[test]
fn ternary_evaluates_one_arm() {
    let mut harness = Harness::new();
    harness.run_ok("call Info(5 < 7 ? 'less' : 'more')");
    assert_eq!(harness.logs(), ["INFO: less"]);
}

#[test]
fn capture_writes_stay_inside_the_frame() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set y to 5 \
         set f to function [y] () [c] is \
            set c to c + 1 \
            return c \
         end \
         call Info(ToString(f())) \
         call Info(ToString(f())) \
         call Info(ToString(y))",
    );
    // The capture increments are frame-local and do not accumulate, and the
    // captured binding itself is untouched.
    assert_eq!(harness.logs(), ["INFO: 6", "INFO: 6", "INFO: 5"]);
}

#[test]
fn functions_see_and_assign_globals() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set counter to 0 \
         set bump to function () is \
            set counter to counter + 1 \
            return counter \
         end \
         call bump() \
         call bump() \
         call Info(ToString(counter))",
    );
    assert_eq!(harness.logs(), ["INFO: 2"]);
}

#[test]
fn missing_return_is_fatal() {
    let mut harness = Harness::new();
    let error = harness
        .run("set f to function () is set x to 1 end call f()")
        .expect_err("function body without return");
    assert!(!error.is_typed());
    assert!(error.message().contains("Function failed to return a value"));
}

#[test]
fn arity_mismatch_is_fatal() {
    let mut harness = Harness::new();
    let error = harness
        .run("set f to function (a) is return a end call f(1; 2)")
        .expect_err("wrong arity");
    assert!(!error.is_typed());
    assert!(error.message().contains("takes 1 arguments"));
}

#[test]
fn calling_a_float_is_fatal() {
    let mut harness = Harness::new();
    let error = harness.run("set f to 3 call f()").expect_err("not a function");
    assert!(!error.is_typed());
    assert!(error.message().contains("Call to not a Function"));
}

#[test]
fn frames_unwind_on_error_paths() {
    let mut harness = Harness::new();
    let _ = harness
        .run("set f to function (a) is return a + 'x' end call f(1)")
        .expect_err("typed failure inside the call");
    // The frame pushed for the failing call was unlinked on the way out.
    assert_eq!(harness.context.depth(), 0);
}

#[test]
fn dictionary_iteration_yields_sorted_pairs() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set d to {'b' : 2; 'a' : 1} \
         for pair in d do \
            call Info(pair[0]) \
            call Info(ToString(pair[1])) \
         end ",
    );
    assert_eq!(harness.logs(), ["INFO: a", "INFO: 1", "INFO: b", "INFO: 2"]);
}

#[test]
fn read_before_set_is_fatal() {
    let mut harness = Harness::new();
    let error = harness
        .run(
            "set f to function () is \
                if 0 then \
                   set hidden to 1 \
                end \
                return hidden \
             end \
             call f()",
        )
        .expect_err("local read before first write");
    assert!(!error.is_typed());
    assert!(error.message().contains("Read of value before set."));
}

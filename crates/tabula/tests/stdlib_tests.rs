//! The native standard library, exercised from Script.

mod common;

use common::{Harness, shown};

fn info_logs(harness: &mut Harness, source: &str) -> Vec<String> {
    harness.run_ok(source);
    harness.logs()
}

#[test]
fn numeric_functions() {
    let mut harness = Harness::new();
    let logs = info_logs(
        &mut harness,
        "call Info(ToString(Sqr(12))) \
         call Info(ToString(Abs(0 - 4.5))) \
         call Info(ToString(Round(2.5))) \
         call Info(ToString(Floor(2.9))) \
         call Info(ToString(Ceil(2.1)))",
    );
    // Round is ties-away; floor and ceil keep the carried precision.
    assert_eq!(
        logs,
        ["INFO: 144", "INFO: 4.5", "INFO: 3.0", "INFO: 2.0", "INFO: 3.0"]
    );
}

#[test]
fn string_functions() {
    let mut harness = Harness::new();
    let logs = info_logs(
        &mut harness,
        "call Info(ToString(Length('carpet'))) \
         call Info(SubString('carpet'; 0; 3)) \
         call Info(SubString('carpet'; 3; 3)) \
         call Info(ToCharacter(65)) \
         call Info(ToString(FromCharacter('A'))) \
         call Info(ToString(ValueOf('2.5') + 0.5))",
    );
    assert_eq!(
        logs,
        [
            "INFO: 6",
            "INFO: car",
            "INFO: pet",
            "INFO: A",
            "INFO: 65",
            "INFO: 3.0"
        ]
    );
}

#[test]
fn predicates_cover_every_variant() {
    let mut harness = Harness::new();
    let logs = info_logs(
        &mut harness,
        "call Info(ToString(IsFloat(1))) \
         call Info(ToString(IsString(1))) \
         call Info(ToString(IsString('x'))) \
         call Info(ToString(IsArray({1}))) \
         call Info(ToString(IsDictionary({1 : 2}))) \
         call Info(ToString(IsFunction(Abs))) \
         call Info(ToString(IsNaN(NaN()))) \
         call Info(ToString(IsInfinity(1/0)))",
    );
    assert_eq!(
        logs,
        [
            "INFO: 1", "INFO: 0", "INFO: 1", "INFO: 1", "INFO: 1", "INFO: 1", "INFO: 1",
            "INFO: 1"
        ]
    );
}

#[test]
fn collection_functions() {
    let mut harness = Harness::new();
    let logs = info_logs(
        &mut harness,
        "set a to NewArrayDefault(3; 7) \
         call Info(ToString(Size(a))) \
         set a to PushBack(a; 9) \
         set a to PushFront(a; 5) \
         call Info(ToString(GetIndex(a; 0))) \
         call Info(ToString(GetIndex(a; 4))) \
         set a to PopFront(PopBack(a)) \
         call Info(ToString(Size(a))) \
         set d to Insert(NewDictionary(); 'k'; 1) \
         call Info(ToString(ContainsKey(d; 'k'))) \
         call Info(ToString(GetValue(d; 'k'))) \
         set d to RemoveKey(d; 'k') \
         call Info(ToString(Size(d)))",
    );
    assert_eq!(
        logs,
        [
            "INFO: 3", "INFO: 5", "INFO: 9", "INFO: 3", "INFO: 1", "INFO: 1", "INFO: 0"
        ]
    );
}

#[test]
fn get_keys_comes_back_sorted() {
    let mut harness = Harness::new();
    let logs = info_logs(
        &mut harness,
        "set d to {'b' : 1; 'a' : 2; 'c' : 3} \
         for k in GetKeys(d) do \
            call Info(k) \
         end ",
    );
    assert_eq!(logs, ["INFO: a", "INFO: b", "INFO: c"]);
}

#[test]
fn logging_levels_prefix_messages() {
    let mut harness = Harness::new();
    let logs = info_logs(
        &mut harness,
        "call Error('e') call Warn('w') call Info('i') call Fatal('f')",
    );
    assert_eq!(logs, ["ERROR: e", "WARN: w", "INFO: i", "FATAL: f"]);
}

#[test]
fn debug_print_renders_structures() {
    let mut harness = Harness::new();
    let logs = info_logs(&mut harness, "call DebugPrint({1; 'two'; {3 : 4}})");
    assert_eq!(logs, ["{ 1; \"two\"; { 3:4 } }"]);
}

#[test]
fn bad_arguments_are_typed_errors() {
    let mut harness = Harness::new();
    for source in [
        "Sqr('x')",
        "Length(1)",
        "SubString('abc'; 1; 9)",
        "GetIndex({1}; 'x')",
        "GetValue({1 : 2}; 9)",
        "PopFront(NewArray())",
        "SetRoundMode(99)",
        "FromCharacter('ab')",
    ] {
        let error = harness.eval(source).unwrap_err();
        assert!(error.is_typed(), "{source} should fail typed");
    }
}

#[test]
fn set_index_and_insert_are_functional() {
    let mut harness = Harness::new();
    let value = harness.eval("GetIndex(SetIndex({1; 2}; 1; 9); 1)").unwrap();
    assert_eq!(shown(&value), "9");
    let value = harness.eval("GetValue(Insert({1 : 2}; 3; 4); 3)").unwrap();
    assert_eq!(shown(&value), "4");
}

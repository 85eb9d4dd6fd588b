//! Numeric behavior observed through the languages: precision propagation,
//! rounding configuration, special values.

mod common;

use common::{Harness, shown};

#[test]
fn default_precision_governs_division() {
    let mut harness = Harness::new();
    harness.run_ok(
        "call Info(ToString(1/3)) \
         call SetDefaultPrecision(4) \
         call Info(ToString(1/3)) \
         call Info(ToString(2/3))",
    );
    assert_eq!(harness.logs(), ["INFO: 0", "INFO: 0.3333", "INFO: 0.6667"]);
}

#[test]
fn addition_widens_to_the_wider_operand() {
    let mut harness = Harness::new();
    harness.run_ok("call Info(ToString(1.25 + 3.5)) call Info(ToString(2 + 0.125))");
    assert_eq!(harness.logs(), ["INFO: 4.75", "INFO: 2.125"]);
}

#[test]
fn multiplication_uses_the_bc_scale_rule() {
    let mut harness = Harness::new();
    harness.run_ok(
        "call Info(ToString(1.25 * 2.5)) \
         call SetDefaultPrecision(5) \
         call Info(ToString(1.25 * 2.5))",
    );
    assert_eq!(harness.logs(), ["INFO: 3.12", "INFO: 3.125"]);
}

#[test]
fn precision_is_inspectable_and_settable() {
    let mut harness = Harness::new();
    harness.run_ok(
        "call Info(ToString(GetPrecision(1.250))) \
         call Info(ToString(SetPrecision(1.257; 2))) \
         call Info(ToString(SetPrecision(3; 2)))",
    );
    assert_eq!(harness.logs(), ["INFO: 3", "INFO: 1.26", "INFO: 3.00"]);
}

#[test]
fn rounding_mode_changes_apply() {
    let mut harness = Harness::new();
    harness.run_ok(
        "call Info(ToString(GetRoundMode())) \
         call SetRoundMode(4) \
         call Info(ToString(SetPrecision(1.9; 0))) \
         call SetRoundMode(0) \
         call Info(ToString(SetPrecision(2.5; 0)))",
    );
    // Mode 4 is toward zero, mode 0 ties to even.
    assert_eq!(harness.logs(), ["INFO: 0", "INFO: 1", "INFO: 2"]);
}

#[test]
fn division_by_zero_follows_ieee_totality() {
    let mut harness = Harness::new();
    harness.run_ok(
        "call Info(ToString(1/0)) \
         call Info(ToString(0-1/0)) \
         call Info(ToString(0/0)) \
         call Info(ToString(IsInfinity(1/0))) \
         call Info(ToString(IsNaN(0/0))) \
         call Info(ToString(IsNaN(1/0 - 1/0)))",
    );
    assert_eq!(
        harness.logs(),
        [
            "INFO: Infinity",
            "INFO: -Infinity",
            "INFO: Not a Result",
            "INFO: 1",
            "INFO: 1",
            "INFO: 1"
        ]
    );
}

#[test]
fn nan_breaks_ordering_but_not_inequality() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set n to 0/0 \
         call Info(ToString(n = n)) \
         call Info(ToString(n <> n)) \
         call Info(ToString(n < 1)) \
         call Info(ToString(n >= 1))",
    );
    assert_eq!(harness.logs(), ["INFO: 0", "INFO: 1", "INFO: 0", "INFO: 0"]);
}

#[test]
fn algebraic_identities_hold_for_finite_values() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set a to 12.5 \
         set b to 3.25 \
         call Info(ToString(a * b = b * a)) \
         call Info(ToString(a + b = b + a)) \
         call Info(ToString(a - a)) \
         call Info(ToString(a / a)) \
         call Info(ToString(a + 0 = a)) \
         call Info(ToString(a * 1 = a))",
    );
    assert_eq!(
        harness.logs(),
        ["INFO: 1", "INFO: 1", "INFO: 0.0", "INFO: 1", "INFO: 1", "INFO: 1"]
    );
}

#[test]
fn min_max_short_circuit_on_specials() {
    let mut harness = Harness::new();
    harness.run_ok(
        "call Info(ToString(Min(3; 5))) \
         call Info(ToString(Max(3; 5))) \
         call Info(ToString(Min(3; 1/0))) \
         call Info(ToString(Max(0/0; 5)))",
    );
    // The decimal backend short-circuits min/max on infinities and NaN.
    assert_eq!(
        harness.logs(),
        ["INFO: 3", "INFO: 5", "INFO: Infinity", "INFO: Not a Result"]
    );
}

#[test]
fn double_backend_swaps_in() {
    let mut harness = Harness::new();
    tabula::number::set_backend(tabula::Backend::Double);
    harness.run_ok(
        "call Info(ToString(1/2)) \
         call Info(ToString(4/2)) \
         call Info(ToString(IsNaN(0/0))) \
         call Info(ToString(Min(3; 1/0)))",
    );
    // The double backend does not short-circuit min/max on infinities.
    assert_eq!(harness.logs(), ["INFO: 0.5", "INFO: 2", "INFO: 1", "INFO: 3"]);
    tabula::number::reset_number_system();
}

#[test]
fn mixed_precision_counted_loop_terminates_with_integral_bounds() {
    let mut harness = Harness::new();
    harness.run_ok(
        "set n to 0 \
         for x from 2.0 to 10 step 2 do \
            set n to n + 1 \
         end \
         call Info(ToString(n))",
    );
    assert_eq!(harness.logs(), ["INFO: 5"]);
}

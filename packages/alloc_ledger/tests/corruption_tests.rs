//! Corruption detection is process-fatal by design, so these tests observe
//! it from the outside: the test re-executes its own binary with an
//! environment marker, the child walks into the corruption, and the parent
//! asserts the child died abnormally instead of returning an error.

use std::env;
use std::process::Command;

use alloc_ledger::Ledger;
use new_zealand::nz;

/// Environment variable selecting the corruption scenario the child runs.
const SCENARIO_VARIABLE: &str = "ALLOC_LEDGER_CORRUPTION_SCENARIO";

fn run_child_scenario(scenario: &str, test_name: &str) {
    let exe = env::current_exe().expect("the test binary knows its own path");

    let output = Command::new(exe)
        .args([test_name, "--exact", "--nocapture"])
        .env(SCENARIO_VARIABLE, scenario)
        .output()
        .expect("the test binary can be re-executed");

    assert!(
        !output.status.success(),
        "the child must die abnormally, not return: {output:?}"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("memory corruption"),
        "the child must emit a corruption diagnostic, got: {stderr}"
    );
}

#[test]
fn double_release_aborts_the_process() {
    if env::var(SCENARIO_VARIABLE).as_deref() == Ok("double-release") {
        let ledger = Ledger::new();
        ledger.activate();

        let ptr = ledger.allocate(nz!(100)).expect("host allocator has memory");

        // SAFETY: the first release is legitimate.
        unsafe { ledger.release(ptr) };

        // SAFETY: deliberately violating the contract - this is the double
        // release under test, and the process aborts here.
        unsafe { ledger.release(ptr) };

        unreachable!("the double release above must abort");
    }

    run_child_scenario("double-release", "double_release_aborts_the_process");
}

#[test]
fn foreign_pointer_release_aborts_the_process() {
    if env::var(SCENARIO_VARIABLE).as_deref() == Ok("foreign-pointer") {
        let ledger = Ledger::new();
        ledger.activate();

        let mut local = 0_u8;

        // SAFETY: deliberately violating the contract - the pointer never
        // came from this ledger, and the process aborts here.
        unsafe { ledger.release(std::ptr::NonNull::from(&mut local)) };

        unreachable!("the foreign release above must abort");
    }

    run_child_scenario("foreign-pointer", "foreign_pointer_release_aborts_the_process");
}

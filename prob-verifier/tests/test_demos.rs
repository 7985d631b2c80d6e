// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::path::PathBuf;
use std::process::Command;

fn prob_verifier() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_prob-verifier"));
    cmd.arg("--color=never");
    cmd.current_dir(demos_dir());
    cmd
}

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../demos")
}

/// The `state N = value` lines of a report, in order.
fn state_values(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .filter_map(|line| {
            let (_, value) = line.trim().strip_prefix("state ")?.split_once(" = ")?;
            let value = value.trim_end_matches(" (holds)").trim_end_matches(" (violated)");
            value.parse().ok()
        })
        .collect()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_chain_demo() {
    let out = prob_verifier()
        .args([
            "check",
            "chain.tra",
            "chain.lab",
            "chain.props",
            "--state-rewards",
            "chain.srew",
        ])
        .output()
        .expect("could not run prob-verifier");
    let stdout = String::from_utf8(out.stdout).expect("non-utf8 output");
    assert!(out.status.success(), "checking should succeed:\n{stdout}");

    let values = state_values(&stdout);
    assert_eq!(values.len(), 3);
    assert_close(values[0], 1.0); // reach
    assert_close(values[1], 2.0); // expected steps
    assert_close(values[2], 0.75); // two-step reachability
    assert!(stdout.contains("(holds)"));
}

#[test]
fn test_choice_demo_directions() {
    let out = prob_verifier()
        .args(["check", "choice.tra", "choice.lab", "choice.props"])
        .output()
        .expect("could not run prob-verifier");
    let stdout = String::from_utf8(out.stdout).expect("non-utf8 output");
    assert!(out.status.success(), "checking should succeed:\n{stdout}");

    let values = state_values(&stdout);
    assert_eq!(values.len(), 2);
    assert_close(values[0], 0.5);
    assert_close(values[1], 0.99);
}

#[test]
fn test_choice_demo_schedulers() {
    let out = prob_verifier()
        .args([
            "check",
            "choice.tra",
            "choice.lab",
            "choice.props",
            "--schedulers",
        ])
        .output()
        .expect("could not run prob-verifier");
    let stdout = String::from_utf8(out.stdout).expect("non-utf8 output");
    assert!(out.status.success(), "checking should succeed:\n{stdout}");
    // the minimizing scheduler takes the fair coin at the initial state
    assert!(stdout.contains("scheduler: 0:1"));
}

#[test]
fn test_iteration_budget_diverges() {
    let out = prob_verifier()
        .args([
            "check",
            "choice.tra",
            "choice.lab",
            "choice.props",
            "--minmax:maxiter",
            "5",
            "--minmax:absolute",
        ])
        .output()
        .expect("could not run prob-verifier");
    let stdout = String::from_utf8(out.stdout).expect("non-utf8 output");
    assert!(!out.status.success(), "divergence should fail the run");
    assert!(stdout.contains("no convergence within 5 iterations"));
}

#[test]
fn test_unknown_option_is_collected() {
    let out = prob_verifier()
        .args([
            "check",
            "choice.tra",
            "choice.lab",
            "choice.props",
            "--minmax:stepsize",
            "3",
        ])
        .output()
        .expect("could not run prob-verifier");
    let stderr = String::from_utf8(out.stderr).expect("non-utf8 output");
    assert!(!out.status.success());
    assert!(stderr.contains("unknown option"));
}

#[test]
fn test_symbolic_engine_matches() {
    let out = prob_verifier()
        .args([
            "check",
            "chain.tra",
            "chain.lab",
            "chain.props",
            "--engine",
            "symbolic",
        ])
        .output()
        .expect("could not run prob-verifier");
    let stdout = String::from_utf8(out.stdout).expect("non-utf8 output");
    // rewards and step bounds are outside the symbolic fragment, but the
    // reachability value agrees with the sparse engine
    assert!(!out.status.success());
    let values = state_values(&stdout);
    assert_close(values[0], 1.0);
    assert!(stdout.contains("rejected"));
}

#[test]
fn test_print_command() {
    let out = prob_verifier()
        .args(["print", "chain.tra", "chain.lab", "chain.props"])
        .output()
        .expect("could not run prob-verifier");
    let stdout = String::from_utf8(out.stdout).expect("non-utf8 output");
    assert!(out.status.success());
    assert!(stdout.contains("DTMC with 2 states and 2 choices"));
    assert!(stdout.contains("init"));
    assert!(stdout.contains("minmax:maxiter"));
}

/// Every properties file in demos/ must parse against its model.
#[test]
fn test_all_demos_print() {
    let mut seen = 0;
    for entry in walkdir::WalkDir::new(demos_dir()) {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("props") {
            continue;
        }
        seen += 1;
        let stem = path.file_stem().unwrap().to_str().unwrap();
        let out = prob_verifier()
            .args([
                "print",
                &format!("{stem}.tra"),
                &format!("{stem}.lab"),
                &format!("{stem}.props"),
            ])
            .output()
            .expect("could not run prob-verifier");
        assert!(out.status.success(), "printing {stem} should succeed");
    }
    assert!(seen >= 2, "expected at least the two demo models");
}

#[test]
fn test_parse_error_diagnostic() {
    let out = prob_verifier()
        .args(["check", "chain.tra", "chain.lab", "chain.tra"])
        .output()
        .expect("could not run prob-verifier");
    let stderr = String::from_utf8(out.stderr).expect("non-utf8 output");
    assert!(!out.status.success());
    assert!(stderr.contains("could not parse property"));
}

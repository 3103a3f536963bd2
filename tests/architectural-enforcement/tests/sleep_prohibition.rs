//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep to wait for something. Waiting
//! happens on I/O, timers raced against cancellation, or notifications.
//! **Exceptions**: retry backoff in the transport, test code

use architectural_enforcement::{code_part, nearby, rust_files, SourceFile, PRODUCTION_DIRS};

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<String> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_files(dir))
        .flat_map(|file| sleep_violations(&file))
        .collect();

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nAcceptable: backoff between retry attempts, test code");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

fn sleep_violations(file: &SourceFile) -> Vec<String> {
    let lines = file.as_strs();
    file.production_lines()
        .filter(|(_, line)| {
            let code = code_part(line);
            code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
        })
        .filter(|(idx, _)| !is_backoff_context(&lines, *idx))
        .map(|(idx, _)| file.location(idx))
        .collect()
}

/// A sleep raced against cancellation, right after a backoff is computed
fn is_backoff_context(lines: &[&str], idx: usize) -> bool {
    nearby(lines, idx, 15, 2, &["backoff"])
        && nearby(lines, idx, 15, 2, &["retry", "attempt"])
        && nearby(lines, idx, 3, 0, &["cancelled()"])
}

#[test]
fn test_backoff_detection() {
    let code = [
        "let backoff = self.policy.backoff_for_attempt(attempt - 1);",
        "tracing::warn!(attempt, \"Transport failure, retrying\");",
        "tokio::select! {",
        "    () = cancel.cancelled() => return Err(ProviderError::Cancelled),",
        "    () = tokio::time::sleep(backoff) => {}",
        "}",
    ];
    assert!(is_backoff_context(&code, 4));
}

#[test]
fn test_polling_sleep_is_not_backoff() {
    let code = [
        "loop {",
        "    if ready() { break; }",
        "    tokio::time::sleep(Duration::from_millis(10)).await;",
        "}",
    ];
    assert!(!is_backoff_context(&code, 2));
}

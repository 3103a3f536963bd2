//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions in the library MUST NOT do blocking I/O.
//! **Required**: `reqwest` async APIs and `tokio` primitives, never
//! `std::net`, `std::process` or `reqwest::blocking`.
//! **Acceptable**: synchronous functions (config loading runs before any
//! request), test code. The probe binary is a CLI and is not scanned.

use architectural_enforcement::{
    code_part, enclosing_function, rust_files, Enclosing, SourceFile, LIBRARY_DIR,
};

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    ("std::thread::sleep", "Blocking sleep"),
];

#[test]
fn test_no_blocking_io_in_async_library_code() {
    let violations: Vec<String> = rust_files(LIBRARY_DIR)
        .iter()
        .flat_map(blocking_violations)
        .collect();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async library code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.",
            violations.len()
        );
    }
}

#[test]
fn test_library_never_uses_blocking_http() {
    let hits: Vec<String> = rust_files(LIBRARY_DIR)
        .iter()
        .flat_map(|file| {
            file.production_lines()
                .filter(|(_, line)| code_part(line).contains("reqwest::blocking"))
                .map(|(idx, _)| file.location(idx))
                .collect::<Vec<_>>()
        })
        .collect();

    assert!(hits.is_empty(), "reqwest::blocking in library: {hits:#?}");
}

fn blocking_violations(file: &SourceFile) -> Vec<String> {
    let lines = file.as_strs();
    let mut violations = Vec::new();

    for (idx, line) in file.production_lines() {
        let code = code_part(line);
        for (pattern, label) in FORBIDDEN {
            if code.contains(pattern) && enclosing_function(&lines, idx) != Enclosing::Sync {
                violations.push(format!("{label}: {}", file.location(idx)));
            }
        }
    }
    violations
}

#[test]
fn test_detector_flags_async_and_module_level() {
    let file = SourceFile {
        path: "sample.rs".into(),
        lines: [
            "use std::net::TcpStream;",
            "pub async fn fetch() {",
            "    let body = std::fs::read_to_string(\"x\");",
            "}",
            "pub fn load() {",
            "    let body = std::fs::read_to_string(\"y\");",
            "}",
            "#[cfg(test)]",
            "mod tests {",
            "    async fn helper() { std::fs::write(\"z\", \"\"); }",
            "}",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect(),
    };

    let violations = blocking_violations(&file);
    assert_eq!(violations.len(), 2, "{violations:#?}");
    assert!(violations[0].contains("sample.rs:1"));
    assert!(violations[1].contains("sample.rs:3"));
}

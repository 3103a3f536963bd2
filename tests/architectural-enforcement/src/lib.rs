//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the tests in `tests/`:
//! - No sleep() calls in production code outside retry backoff
//! - No blocking I/O inside async functions of the library
//!
//! The scanners are line based. Everything from the first `#[cfg(test)]`
//! marker to the end of a file is treated as test code.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace-relative directories holding production code
pub const PRODUCTION_DIRS: &[&str] = &["provider/core/src", "provider/probe/src"];

/// Directory holding the library crate
pub const LIBRARY_DIR: &str = "provider/core/src";

/// Absolute path of a workspace-relative directory
pub fn workspace_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

/// One scanned source file, split into lines
pub struct SourceFile {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

impl SourceFile {
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    /// Lines before the test module, with their 0-based index
    pub fn production_lines(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.lines
            .iter()
            .map(String::as_str)
            .take_while(|line| line.trim() != "#[cfg(test)]")
            .enumerate()
    }

    pub fn location(&self, idx: usize) -> String {
        format!("{}:{} - {}", self.path.display(), idx + 1, self.lines[idx].trim())
    }

    pub fn as_strs(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }
}

/// Every `.rs` file under a workspace-relative directory
pub fn rust_files(relative: &str) -> Vec<SourceFile> {
    let root = workspace_path(relative);
    if !root.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|e| SourceFile::read(e.path()))
        .collect()
}

/// The part of a line before any `//` comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enclosing {
    Async,
    Sync,
    /// Module level, or a closure/impl boundary was hit first
    None,
}

/// Whether a trimmed line declares a function, and if so whether it is async
fn fn_declaration(line: &str) -> Option<bool> {
    let line = line
        .trim_start_matches("pub(crate) ")
        .trim_start_matches("pub(super) ")
        .trim_start_matches("pub ");
    if line.starts_with("async fn ") {
        Some(true)
    } else if line.starts_with("fn ") {
        Some(false)
    } else {
        None
    }
}

/// Find the function enclosing line `idx` by scanning backwards
pub fn enclosing_function(lines: &[&str], idx: usize) -> Enclosing {
    for line in lines[..idx].iter().rev() {
        let line = line.trim();
        if let Some(is_async) = fn_declaration(line) {
            return if is_async {
                Enclosing::Async
            } else {
                Enclosing::Sync
            };
        }
        if line.starts_with("mod ") || line.starts_with("impl ") || line.starts_with("impl<") {
            return Enclosing::None;
        }
    }
    Enclosing::None
}

/// Whether any line within `before`/`after` lines of `idx` contains one of `words`
pub fn nearby(lines: &[&str], idx: usize, before: usize, after: usize, words: &[&str]) -> bool {
    let end = (idx + after + 1).min(lines.len());
    lines[idx.saturating_sub(before)..end].iter().any(|line| {
        let line = line.to_lowercase();
        words.iter().any(|w| line.contains(w))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enclosing_function_detection() {
        let code = [
            "impl Client {",
            "    pub async fn list(&self) {",
            "        let x = 1;",
            "    }",
            "    pub(crate) fn url(&self) {",
            "        let y = 2;",
            "    }",
            "}",
        ];

        assert_eq!(enclosing_function(&code, 2), Enclosing::Async);
        assert_eq!(enclosing_function(&code, 5), Enclosing::Sync);
        assert_eq!(enclosing_function(&code, 1), Enclosing::None);
    }

    #[test]
    fn test_code_part_drops_comments() {
        assert_eq!(code_part("let a = 1; // std::fs::read"), "let a = 1; ");
        assert_eq!(code_part("// tokio::time::sleep"), "");
    }

    #[test]
    fn test_nearby_window() {
        let code = ["let backoff = policy.delay();", "a();", "b();", "sleep(backoff);"];
        assert!(nearby(&code, 3, 3, 0, &["backoff"]));
        assert!(!nearby(&code, 3, 1, 0, &["policy"]));
    }

    #[test]
    fn test_workspace_has_library_sources() {
        assert!(!rust_files(LIBRARY_DIR).is_empty());
    }
}

//! Log Hygiene Enforcement
//!
//! Upstream locations are secrets of the server. Production code must never
//! hand them to a logging or printing macro, not even at trace level, because
//! the full trace of every run is written to disk.

use std::fs;
use std::path::{Path, PathBuf};

const LOG_MACROS: &[&str] = &[
    "trace!(", "debug!(", "info!(", "warn!(", "error!(", "println!(", "eprintln!(",
];

const FORBIDDEN: &[&str] = &["upstream_url"];

/// A macro invocation that mentions an upstream location
#[derive(Debug)]
struct LeakViolation {
    file_path: String,
    line_number: usize,
    invocation: String,
}

/// Scanner for upstream leaks in production code
struct LogHygieneChecker {
    violations: Vec<LeakViolation>,
    files_checked: usize,
}

impl LogHygieneChecker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
            files_checked: 0,
        }
    }

    /// Production sources of every crate except this one
    fn find_source_files(&self) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        let mut files = Vec::new();
        for entry in fs::read_dir("..")? {
            let path = entry?.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if name.starts_with("modvault-") && name != "modvault-tests" {
                Self::find_rust_files_recursive(&path.join("src"), &mut files, 0)?;
            }
        }
        Ok(files)
    }

    fn find_rust_files_recursive(
        dir: &Path,
        files: &mut Vec<PathBuf>,
        depth: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if depth > 10 || !dir.is_dir() {
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::find_rust_files_recursive(&path, files, depth + 1)?;
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
        Ok(())
    }

    fn check_file(&mut self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        self.files_checked += 1;
        let file_path = path.to_string_lossy().into_owned();
        self.violations
            .extend(scan_source(&content).into_iter().map(|(line_number, invocation)| {
                LeakViolation {
                    file_path: file_path.clone(),
                    line_number,
                    invocation,
                }
            }));
        Ok(())
    }

    fn check_workspace(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for file in self.find_source_files()? {
            self.check_file(&file)?;
        }
        Ok(())
    }

    /// Report violations and return whether the check passed
    fn report_violations(&self) -> bool {
        if self.violations.is_empty() {
            println!(
                "Log hygiene: {} files checked, no violations found",
                self.files_checked
            );
            return true;
        }

        println!("Log hygiene violations found:");
        println!();
        for violation in &self.violations {
            println!("{}:{}", violation.file_path, violation.line_number);
            println!("  {}", violation.invocation);
            println!();
        }
        println!(
            "Found {} violation(s) in {} file(s) checked",
            self.violations.len(),
            self.files_checked
        );
        println!("Log the download key or filename instead of the upstream location.");

        false
    }
}

/// Returns `(line, invocation)` for every log macro mentioning an upstream.
///
/// Scanning stops at the first `#[cfg(test)]`; test modules sit at the end
/// of each file.
fn scan_source(content: &str) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    let mut current: Option<(usize, String, i32)> = None;

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        if current.is_none() && LOG_MACROS.iter().any(|m| trimmed.contains(m)) {
            current = Some((index + 1, String::new(), 0));
        }

        let Some((line_number, text, depth)) = current.as_mut() else {
            continue;
        };
        text.push_str(trimmed);
        text.push(' ');
        *depth += paren_balance(trimmed);

        if *depth <= 0 {
            if FORBIDDEN.iter().any(|needle| text.contains(needle)) {
                found.push((*line_number, text.trim().to_string()));
            }
            current = None;
        }
    }

    found
}

fn paren_balance(line: &str) -> i32 {
    line.chars().fold(0, |acc, c| match c {
        '(' => acc + 1,
        ')' => acc - 1,
        _ => acc,
    })
}

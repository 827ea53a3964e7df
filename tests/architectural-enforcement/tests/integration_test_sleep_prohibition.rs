//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in courier-core MUST NOT sleep as a substitute
//! for waiting on I/O. A task that needs an event waits on the socket, channel,
//! or watch handle that produces it.
//!
//! **Exceptions**: Reconnect backoff delays, periodic tasks driven by
//! `tokio::time::interval`, and test code.

use std::fs;
use std::path::{Path, PathBuf};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Reconnect backoff (sleeping out a policy-computed delay)");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for events (use async I/O!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    let core_src = workspace_root().join("courier/core/src");
    assert!(
        core_src.is_dir(),
        "production source tree missing: {}",
        core_src.display()
    );

    check_directory(
        &core_src,
        &mut violations,
        &SleepPolicy {
            allow_backoff: true,
            allow_tests: true,
        },
    );

    violations
}

/// Resolve the workspace root from this package's manifest directory
fn workspace_root() -> PathBuf {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    root.canonicalize().unwrap_or(root)
}

struct SleepPolicy {
    allow_backoff: bool,
    allow_tests: bool,
}

fn check_directory(dir: &Path, violations: &mut Vec<String>, policy: &SleepPolicy) {
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            check_file(entry.path(), violations, policy);
        }
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>, policy: &SleepPolicy) {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return,
    };

    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let line_number = idx + 1;

        // Skip comments
        let code_part = line.split("//").next().unwrap_or(line);

        // Check for sleep calls
        if code_part.contains("::sleep(") || code_part.contains(".sleep(") {
            // Check if it's in a test function
            if policy.allow_tests && is_in_test_function(&lines, idx) {
                continue;
            }

            // Check if it's a reconnect backoff delay
            if policy.allow_backoff && is_backoff_context(&lines, idx) {
                continue;
            }

            // Check if it's using tokio::time::interval (acceptable)
            if is_interval_pattern(&lines, idx) {
                continue;
            }

            violations.push(format!(
                "{}:{} - {}",
                path.display(),
                line_number,
                line.trim()
            ));
        }
    }
}

/// Check if line is inside a test function
fn is_in_test_function(lines: &[&str], current_idx: usize) -> bool {
    // Scan backwards to find the enclosing function
    let mut found_fn_idx = None;
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if line.starts_with("//") {
            continue;
        }

        if line.starts_with("fn ") || line.contains(" fn ") {
            found_fn_idx = Some(i);
            break;
        }

        // Stop at module boundaries
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }

    // If we found a function, check if it has a test marker
    if let Some(fn_idx) = found_fn_idx {
        for i in (0..fn_idx).rev() {
            let line = lines[i].trim();

            if line.starts_with("//") {
                continue;
            }

            if line.starts_with("#[test]")
                || line.starts_with("#[tokio::test")
                || line.starts_with("#[cfg(test)]")
            {
                return true;
            }

            // Stop if we hit another function or boundary
            if line.starts_with("fn ")
                || line.contains(" fn ")
                || line.starts_with("mod ")
                || line.starts_with("impl ")
            {
                break;
            }
        }
    }

    false
}

/// Check if sleep is waiting out a reconnect delay (acceptable for retry logic)
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    // Look for a delay source and retry context in nearby lines
    let context_range = current_idx.saturating_sub(15)..std::cmp::min(current_idx + 5, lines.len());

    let mut has_delay_source = false;
    let mut has_retry_context = false;

    for i in context_range {
        let line = lines[i].to_lowercase();

        // Delay produced by a backoff policy, or an inline 2^n calculation
        if line.contains("next_delay")
            || line.contains("backoff")
            || line.contains("<<")
            || line.contains("pow")
            || line.contains("* 2")
        {
            has_delay_source = true;
        }

        // Check for retry/reconnect context
        if line.contains("retry")
            || line.contains("reconnect")
            || line.contains("backoff")
            || line.contains("attempt")
        {
            has_retry_context = true;
        }
    }

    has_delay_source && has_retry_context
}

/// Check if this is tokio::time::interval pattern (acceptable for periodic tasks)
fn is_interval_pattern(lines: &[&str], current_idx: usize) -> bool {
    // Acceptable: let mut tick = tokio::time::interval(...); loop { tick.tick().await; }

    // Look backwards for interval usage
    let context_range = current_idx.saturating_sub(20)..current_idx;

    for i in context_range {
        let line = lines[i];
        if line.contains(".tick()") || line.contains("tokio::time::interval") {
            return true;
        }
    }

    // Also check forward a bit
    let forward_range = current_idx..std::cmp::min(current_idx + 5, lines.len());
    for i in forward_range {
        let line = lines[i];
        if line.contains(".tick()") {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_violation_detection() {
        // This test verifies that the detector itself works
        let test_code = vec![
            "fn bad_function() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ];

        assert!(
            !is_in_test_function(&test_code, 1),
            "Should detect this is not a test"
        );
        assert!(
            !is_backoff_context(&test_code, 1),
            "Bare sleep has no retry context"
        );
    }

    #[test]
    fn test_backoff_detection() {
        let test_code = vec![
            "match policy.next_delay() {",
            "    Some(delay) => {",
            "        status = ConnectionStatus::Reconnecting;",
            "        tokio::time::sleep(delay).await;",
            "    }",
            "}",
        ];

        assert!(
            is_backoff_context(&test_code, 3),
            "Should detect policy-driven reconnect delay"
        );
    }

    #[test]
    fn test_test_function_detection() {
        let test_code = vec![
            "#[tokio::test]",
            "async fn poll_until_ready() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ];

        assert!(
            is_in_test_function(&test_code, 2),
            "Should detect test function"
        );
    }
}

/// Test utilities for conditional test execution
use std::process::Command;

pub fn has_docker() -> bool {
    // Check the daemon answers, not just that the CLI exists
    Command::new("docker")
        .arg("info")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Macro to skip tests when requirements aren't met
#[macro_export]
macro_rules! require_docker {
    () => {
        if !$crate::test_utils::has_docker() {
            eprintln!("Test ignored: Docker not available");
            return;
        }
    };
}

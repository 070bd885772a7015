//! CLI command builders for tests

use assert_cmd::Command;

/// Get a Command for the `depot` binary with clean environment
///
/// - `RUST_LOG=error` keeps INFO/DEBUG logs out of assertions
/// - backend URL overrides from the caller's shell are removed
#[allow(deprecated)]
pub fn depot_command() -> Command {
    command_for("depot")
}

/// Get a Command for a specific binary with clean environment
#[allow(deprecated)]
pub fn command_for(bin_name: &str) -> Command {
    let mut cmd = Command::cargo_bin(bin_name)
        .unwrap_or_else(|_| panic!("Failed to find {} binary", bin_name));
    cmd.env("RUST_LOG", "error");
    cmd.env_remove("DEPOT_REMOTE_URL");
    cmd.env_remove("DEPOT_WS_URL");
    cmd
}

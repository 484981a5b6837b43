//! End-to-end integration tests for the `bundle-mcp` binary.
//!
//! These exercise the process boundary (CLI parsing, stdio framing, clean shutdown) rather than
//! MCP tool semantics, which are covered by unit tests alongside each component.

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn bundle_mcp_cmd() -> Command {
    Command::cargo_bin("bundle-mcp").unwrap()
}

#[test]
fn help_describes_the_support_bundle_surface() {
    bundle_mcp_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("support-bundle"));
}

#[test]
fn exits_cleanly_on_stdin_eof() {
    // The MCP server speaks JSON-RPC over stdio; with stdin closed immediately the framework's
    // request loop should observe EOF, the service should shut down, and the process should exit
    // without panicking.
    bundle_mcp_cmd()
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success();
}

#[test]
fn accepts_bundle_storage_override_even_if_directory_does_not_exist_yet() {
    // Creation is deferred to first use (the Bundle Manager / Registry), not startup.
    bundle_mcp_cmd()
        .arg("--bundle-storage")
        .arg("/tmp/bundle-mcp-test-storage-does-not-exist-yet")
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success();
}

#[test]
fn list_bundles_subcommand_does_not_touch_stdio_protocol() {
    // `list-bundles` is a human-operator debugging path; it must not start the MCP server or
    // block on stdin.
    bundle_mcp_cmd()
        .arg("--bundle-storage")
        .arg("/tmp/bundle-mcp-test-list-bundles-empty-dir")
        .arg("list-bundles")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("no bundles found").or(predicate::str::contains("PATH")));
}

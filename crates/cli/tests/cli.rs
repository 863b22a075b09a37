//! Exit behavior and stdio protocol sessions of the built binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn remcache() -> Command {
    let mut command = Command::cargo_bin("remcache").expect("binary");
    for var in [
        "REMCACHE_ENDPOINT",
        "REMCACHE_BUCKET",
        "REMCACHE_PREFIX",
        "REMCACHE_PATH_STYLE",
        "REMCACHE_AUTH_TOKEN",
        "RUST_LOG",
    ] {
        command.env_remove(var);
    }
    command
}

#[test]
fn missing_configuration_fails_before_any_protocol_output() {
    remcache()
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("endpoint is required"));
}

#[test]
fn missing_bucket_names_the_setting() {
    remcache()
        .args(["--endpoint", "http://127.0.0.1:1"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("bucket is required"));
}

#[test]
fn a_close_only_session_exits_zero_after_the_ack() {
    remcache()
        .args(["--endpoint", "http://127.0.0.1:1", "--bucket", "cache"])
        .write_stdin("{\"ID\":5,\"Command\":\"close\"}\n")
        .assert()
        .success()
        .stdout(
            "{\"ID\":0,\"KnownCommands\":[\"get\",\"put\",\"close\"]}\n\
             {\"ID\":5}\n",
        );
}

#[test]
fn an_unreachable_backend_fails_the_request_not_the_process() {
    remcache()
        .args([
            "--endpoint",
            "http://127.0.0.1:1",
            "--bucket",
            "cache",
            "--path-style",
        ])
        .write_stdin(
            "{\"ID\":1,\"Command\":\"get\",\"ActionID\":\"qg==\"}\n\
             {\"ID\":2,\"Command\":\"close\"}\n",
        )
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"ID\":1")
                .and(predicate::str::contains("\"Err\":"))
                .and(predicate::str::ends_with("{\"ID\":2}\n")),
        );
}

#[test]
fn end_of_stream_without_close_exits_zero() {
    remcache()
        .args(["--endpoint", "http://127.0.0.1:1", "--bucket", "cache"])
        .write_stdin("")
        .assert()
        .success()
        .stdout("{\"ID\":0,\"KnownCommands\":[\"get\",\"put\",\"close\"]}\n");
}

#[test]
fn a_malformed_record_terminates_with_a_diagnostic() {
    remcache()
        .args(["--endpoint", "http://127.0.0.1:1", "--bucket", "cache"])
        .write_stdin("this is not a record\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("protocol error"));
}

//! Unit tests for the external compiler invocation.
//!
//! Uses `sh` as a stand-in toolchain so the builder's contract — artifact
//! on success, diagnostics on failure, no side effects on failure — can be
//! exercised with real subprocesses.

use std::path::Path;

use devloop::build::{BuildRequest, Builder};
use devloop::AppError;

fn request(source_root: &Path, output: &Path, program: &str, flags: &[&str]) -> BuildRequest {
    BuildRequest {
        source_root: source_root.to_path_buf(),
        output_path: output.to_path_buf(),
        program: program.to_owned(),
        flags: flags.iter().map(|&flag| flag.to_owned()).collect(),
    }
}

#[test]
fn output_token_is_substituted_in_every_flag() {
    let request = request(
        Path::new("/tmp"),
        Path::new("/tmp/bin/app"),
        "cc",
        &["-o", "{output}", "--map={output}.map"],
    );
    assert_eq!(
        request.resolved_flags(),
        vec!["-o", "/tmp/bin/app", "--map=/tmp/bin/app.map"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn successful_build_writes_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("app");
    let builder = Builder::new(request(
        dir.path(),
        &output,
        "sh",
        &["-c", "printf built > {output}"],
    ));

    let result = builder.build().await.unwrap();

    assert!(result.succeeded);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "built");
}

#[cfg(unix)]
#[tokio::test]
async fn failed_build_captures_diagnostics_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("app");
    let builder = Builder::new(request(
        dir.path(),
        &output,
        "sh",
        &["-c", "echo missing dependency >&2; exit 1"],
    ));

    let result = builder.build().await.unwrap();

    assert!(!result.succeeded);
    assert!(
        result.diagnostic_output.contains("missing dependency"),
        "got: {}",
        result.diagnostic_output
    );
    assert!(!output.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn stdout_is_appended_to_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("app");
    let builder = Builder::new(request(
        dir.path(),
        &output,
        "sh",
        &["-c", "echo from-stderr >&2; echo from-stdout; exit 1"],
    ));

    let result = builder.build().await.unwrap();

    assert!(result.diagnostic_output.contains("from-stderr"));
    assert!(result.diagnostic_output.contains("from-stdout"));
}

#[tokio::test]
async fn missing_compiler_is_build_error() {
    let dir = tempfile::tempdir().unwrap();
    let builder = Builder::new(request(
        dir.path(),
        &dir.path().join("app"),
        "devloop-no-such-compiler",
        &[],
    ));

    let err = builder.build().await.unwrap_err();
    assert!(matches!(err, AppError::Build(_)), "got: {err}");
}

#[cfg(unix)]
#[tokio::test]
async fn compiler_runs_in_the_source_root() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("app");
    // The script records its working directory into the artifact.
    let builder = Builder::new(request(
        dir.path(),
        &output,
        "sh",
        &["-c", "pwd > {output}"],
    ));

    let result = builder.build().await.unwrap();

    assert!(result.succeeded);
    let recorded = std::fs::read_to_string(&output).unwrap();
    let recorded = Path::new(recorded.trim());
    assert_eq!(
        recorded.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

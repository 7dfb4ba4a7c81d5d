//! External compiler invocation.
//!
//! The orchestrator never compiles anything itself: [`Builder`] runs the
//! configured toolchain as a subprocess, waits for it to exit, and captures
//! its diagnostics. A failed build produces a [`BuildResult`] with
//! `succeeded == false` — it is a normal outcome, not an error; only the
//! inability to run the compiler at all surfaces as `AppError::Build`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Immutable description of one compiler invocation, constructed once from
/// configuration at startup.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Compiler working directory and root of the watched tree.
    pub source_root: PathBuf,
    /// Absolute destination of the built artifact.
    pub output_path: PathBuf,
    /// Compiler toolchain binary.
    pub program: String,
    /// Ordered flags; `{output}` expands to `output_path`.
    pub flags: Vec<String>,
}

impl BuildRequest {
    /// Build a request from validated configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            source_root: config.source_root.clone(),
            output_path: config.output_path.clone(),
            program: config.build.program.clone(),
            flags: config.build.flags.clone(),
        }
    }

    /// Flags with every `{output}` token replaced by the output path.
    #[must_use]
    pub fn resolved_flags(&self) -> Vec<String> {
        let output = self.output_path.to_string_lossy();
        self.flags
            .iter()
            .map(|flag| flag.replace("{output}", &output))
            .collect()
    }
}

/// Outcome of one compiler invocation. Not retained beyond the pipeline run
/// that requested it.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Whether the compiler exited with status zero.
    pub succeeded: bool,
    /// Captured stderr (and stdout, when non-empty) for operator diagnosis.
    pub diagnostic_output: String,
}

/// Invokes the external compiler for a fixed [`BuildRequest`].
#[derive(Debug)]
pub struct Builder {
    request: BuildRequest,
}

impl Builder {
    /// Create a builder for the given request.
    #[must_use]
    pub fn new(request: BuildRequest) -> Self {
        Self { request }
    }

    /// The request this builder was constructed with.
    #[must_use]
    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    /// Run the compiler and wait for it to exit.
    ///
    /// On success the artifact has been written to the request's output
    /// path; on a failed build nothing is written and the previous artifact
    /// (if any) is left in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Build` if the compiler subprocess cannot be
    /// spawned at all (missing toolchain, permission failure). A compiler
    /// that runs and exits non-zero is reported through the returned
    /// [`BuildResult`] instead.
    pub async fn build(&self) -> Result<BuildResult> {
        if let Some(parent) = self.request.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                AppError::Build(format!(
                    "cannot create output directory '{}': {err}",
                    parent.display()
                ))
            })?;
        }

        info!(
            program = %self.request.program,
            source_root = %self.request.source_root.display(),
            "build started"
        );
        let started = Instant::now();

        let output = Command::new(&self.request.program)
            .args(self.request.resolved_flags())
            .current_dir(&self.request.source_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| {
                AppError::Build(format!(
                    "failed to run compiler '{}': {err}",
                    self.request.program
                ))
            })?;

        let mut diagnostic_output = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.stdout.is_empty() {
            if !diagnostic_output.is_empty() {
                diagnostic_output.push('\n');
            }
            diagnostic_output.push_str(&String::from_utf8_lossy(&output.stdout));
        }

        let succeeded = output.status.success();
        if succeeded {
            info!(
                elapsed = ?started.elapsed(),
                output = %self.request.output_path.display(),
                "build succeeded"
            );
        } else {
            debug!(status = %output.status, "compiler exited with failure");
        }

        Ok(BuildResult {
            succeeded,
            diagnostic_output,
        })
    }
}

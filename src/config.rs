//! Configuration parsing, validation, and defaults.
//!
//! All fields carry serde defaults so the orchestrator can run without a
//! config file at all: the built-in defaults mirror a Go server tree built
//! with `go build` and debugged under Delve on `127.0.0.1:4000`. Every
//! default can be overridden from `config.toml` or from the CLI flags in
//! `main.rs`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// External compiler invocation settings.
///
/// The flag list is passed to `program` verbatim, after replacing every
/// occurrence of the literal token `{output}` with the configured (absolute)
/// output path. The defaults disable optimization and inlining so the debug
/// server can set reliable breakpoints in the produced binary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BuildConfig {
    /// Compiler toolchain binary (e.g., `go`).
    #[serde(default = "default_build_program")]
    pub program: String,
    /// Ordered flags passed to the compiler; `{output}` expands to the
    /// output path.
    #[serde(default = "default_build_flags")]
    pub flags: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            flags: default_build_flags(),
        }
    }
}

/// Debug-server launch and supervision settings.
///
/// `process_name` drives the process-table lookup used to stop a previous
/// session, so it must match the name the OS reports for the launched
/// binary. Flags support two tokens: `{listen}` expands to `listen_address`
/// and `{artifact}` to the freshly built executable path.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DebugConfig {
    /// Debug-server binary (e.g., `dlv`).
    #[serde(default = "default_debug_program")]
    pub program: String,
    /// Process name used to discover a running instance in the OS process
    /// table.
    #[serde(default = "default_debug_process_name")]
    pub process_name: String,
    /// `host:port` the debug server listens on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Ordered launch flags; `{listen}` and `{artifact}` are expanded.
    #[serde(default = "default_debug_flags")]
    pub flags: Vec<String>,
    /// How long to wait for a signalled instance to exit before giving up
    /// and attempting the relaunch anyway.
    #[serde(default = "default_stop_wait_ms")]
    pub stop_wait_ms: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            program: default_debug_program(),
            process_name: default_debug_process_name(),
            listen_address: default_listen_address(),
            flags: default_debug_flags(),
            stop_wait_ms: default_stop_wait_ms(),
        }
    }
}

/// Filesystem watching and debounce settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchConfig {
    /// Quiet period after the last change event before a pipeline run is
    /// triggered.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Force the polling backend instead of the platform-native notifier.
    /// Needed on filesystems without native change notifications (network
    /// mounts, some containers).
    #[serde(default)]
    pub polling: bool,
    /// Scan interval for the polling backend. Ignored when `polling` is
    /// false.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            polling: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_source_root() -> PathBuf {
    PathBuf::from("src")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("bin/server")
}

fn default_build_program() -> String {
    "go".into()
}

fn default_build_flags() -> Vec<String> {
    vec![
        "build".into(),
        "-gcflags".into(),
        "all=-N -l".into(),
        "-o".into(),
        "{output}".into(),
        ".".into(),
    ]
}

fn default_debug_program() -> String {
    "dlv".into()
}

fn default_debug_process_name() -> String {
    "dlv".into()
}

fn default_listen_address() -> String {
    "127.0.0.1:4000".into()
}

fn default_debug_flags() -> Vec<String> {
    vec![
        "--listen={listen}".into(),
        "--headless=true".into(),
        "--log=true".into(),
        "--accept-multiclient".into(),
        "--api-version=2".into(),
        "exec".into(),
        "{artifact}".into(),
    ]
}

fn default_stop_wait_ms() -> u64 {
    5000
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory watched recursively and used as the compiler's working
    /// directory.
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    /// Destination of the built artifact. Made absolute during validation
    /// so it stays correct regardless of the compiler's working directory.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// Compiler invocation settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Debug-server settings.
    #[serde(default)]
    pub debug: DebugConfig,
    /// Watcher and debounce settings.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            output_path: default_output_path(),
            build: BuildConfig::default(),
            debug: DebugConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values and normalize paths.
    ///
    /// `source_root` is canonicalized (it must exist — there is nothing to
    /// watch otherwise) and `output_path` is made absolute. Idempotent, so
    /// it is safe to call again after CLI overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on an empty program name, a zero duration,
    /// an unparseable listen address, or a missing source root.
    pub fn validate(&mut self) -> Result<()> {
        if self.build.program.is_empty() {
            return Err(AppError::Config("build.program must not be empty".into()));
        }
        if self.debug.program.is_empty() {
            return Err(AppError::Config("debug.program must not be empty".into()));
        }
        if self.debug.process_name.is_empty() {
            return Err(AppError::Config(
                "debug.process_name must not be empty".into(),
            ));
        }
        if self.watch.debounce_ms == 0 {
            return Err(AppError::Config(
                "watch.debounce_ms must be greater than zero".into(),
            ));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "watch.poll_interval_ms must be greater than zero".into(),
            ));
        }

        self.debug
            .listen_address
            .parse::<SocketAddr>()
            .map_err(|err| {
                AppError::Config(format!(
                    "debug.listen_address '{}' is not a valid host:port: {err}",
                    self.debug.listen_address
                ))
            })?;

        let canonical_root = self
            .source_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("source_root invalid: {err}")))?;
        self.source_root = canonical_root;

        self.output_path = std::path::absolute(&self.output_path)
            .map_err(|err| AppError::Config(format!("output_path invalid: {err}")))?;

        Ok(())
    }

    /// Debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }

    /// Polling-backend scan interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms)
    }

    /// How long `stop()` waits for a signalled debug server to exit.
    #[must_use]
    pub fn stop_wait(&self) -> Duration {
        Duration::from_millis(self.debug.stop_wait_ms)
    }
}

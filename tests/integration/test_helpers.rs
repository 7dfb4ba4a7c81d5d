//! Shared helpers for pipeline-level integration tests.
//!
//! Stands up a disposable environment where `sh` plays the compiler and a
//! uniquely named copy of `sleep` plays the debug server, so the full
//! build → stop → start sequence runs against real subprocesses without
//! touching anything outside a tempdir.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use devloop::build::{BuildRequest, Builder};
use devloop::config::GlobalConfig;
use devloop::orchestrator::pipeline::PipelineCoordinator;
use devloop::orchestrator::supervisor::SessionSupervisor;
use devloop::process::ProcessTable;

static NAME_SEQ: AtomicU32 = AtomicU32::new(0);

/// Copy `sleep` under a unique name short enough to survive the kernel's
/// 15-character `comm` truncation.
fn stage_sleep(dir: &Path) -> (PathBuf, String) {
    let seq = NAME_SEQ.fetch_add(1, Ordering::SeqCst);
    let name = format!("dlpip{}x{seq}", std::process::id() % 100_000);
    let source = ["/bin/sleep", "/usr/bin/sleep"]
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .expect("system sleep binary");
    let dest = dir.join(&name);
    std::fs::copy(source, &dest).unwrap();
    (dest, name)
}

/// Disposable orchestrator environment rooted in a tempdir.
pub struct TestEnv {
    /// Validated configuration pointing at the tempdir.
    pub config: GlobalConfig,
    /// File the build script appends one line to per invocation.
    pub counter: PathBuf,
    /// Process name of the staged fake debug server.
    pub sleep_name: String,
    /// Tempdir root, for tests that need extra control files.
    pub root: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestEnv {
    /// Number of completed build invocations so far.
    pub fn build_count(&self) -> usize {
        std::fs::read_to_string(&self.counter)
            .map(|text| text.lines().count())
            .unwrap_or(0)
    }

    /// Terminate any staged debug-server processes still alive.
    pub fn kill_leftovers(&self) {
        let mut table = ProcessTable::new();
        for pid in table.pids_by_name(&self.sleep_name) {
            let _ = table.terminate(pid);
        }
    }
}

/// Build an environment whose compiler runs `build_script` under `sh -c`.
///
/// The script may use two placeholders: `{counter}` (expanded here to the
/// build counter file) and `{output}` (left intact for the builder's own
/// substitution).
pub fn test_env(build_script: &str) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let source_root = dir.path().join("src");
    std::fs::create_dir_all(&source_root).unwrap();
    let output = dir.path().join("out").join("app");
    let counter = dir.path().join("builds.log");
    let (sleep_path, sleep_name) = stage_sleep(dir.path());

    let script = build_script.replace("{counter}", &counter.to_string_lossy());
    let toml = format!(
        r"
source_root = '{root}'
output_path = '{output}'

[build]
program = 'sh'
flags = ['-c', '{script}']

[debug]
program = '{sleep}'
process_name = '{name}'
listen_address = '127.0.0.1:14901'
flags = ['300']
stop_wait_ms = 3000

[watch]
debounce_ms = 150
",
        root = source_root.display(),
        output = output.display(),
        script = script,
        sleep = sleep_path.display(),
        name = sleep_name,
    );
    let config = GlobalConfig::from_toml_str(&toml).unwrap();

    TestEnv {
        config,
        counter,
        sleep_name,
        root: dir.path().to_path_buf(),
        _dir: dir,
    }
}

/// Assemble a coordinator from the environment's configuration.
pub fn coordinator_for(env: &TestEnv) -> PipelineCoordinator {
    let builder = Builder::new(BuildRequest::from_config(&env.config));
    let supervisor = SessionSupervisor::new(env.config.debug.clone());
    PipelineCoordinator::new(builder, supervisor)
}

/// Poll until `env.build_count()` reaches `expected` or `timeout` elapses.
pub async fn wait_for_builds(env: &TestEnv, expected: usize, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if env.build_count() >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

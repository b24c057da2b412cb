//! Worker units backed by OS processes.
//!
//! One process per job. The job is written to the child's stdin as a single
//! JSON [`WorkerRequest`]; the child answers on stdout with JSON lines (see
//! [`WorkerReply`]). stderr is inherited so worker logs land next to ours.

use async_trait::async_trait;
use desterra_core::config::{IsolationMode, QueueConfig};
use desterra_core::worker::{
    WorkerReply, WorkerRequest, ENV_CATEGORY, ENV_JOB_ID, ENV_SCRATCH_DIR,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::JobError;
use crate::unit::{ExitReport, Signal, Spawner, UnitSpec, WorkerUnit};

/// How long stdout is still read after the worker process has exited.
/// Helpers that inherited stdout can keep the pipe open indefinitely.
const EXIT_DRAIN: Duration = Duration::from_millis(200);

/// Program and arguments for one category's worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a `["program", "arg", ...]` list. `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    /// The bot's own executable running the built-in worker for `category`.
    pub fn builtin(exe: &Path, category: &str) -> Self {
        Self::new(
            exe.to_string_lossy().to_string(),
            vec!["worker".to_string(), category.to_string()],
        )
    }
}

/// [`Spawner`] that starts one isolated process per job.
pub struct ProcessSpawner {
    commands: BTreeMap<String, CommandSpec>,
    isolation: IsolationMode,
}

impl ProcessSpawner {
    pub fn new(isolation: IsolationMode) -> Self {
        Self {
            commands: BTreeMap::new(),
            isolation,
        }
    }

    pub fn with_command(mut self, category: &str, command: CommandSpec) -> Self {
        self.commands.insert(category.to_string(), command);
        self
    }

    /// Commands for every configured category. Categories without a
    /// `command` run `worker_exe worker <category>`.
    pub fn from_config(config: &QueueConfig, worker_exe: &Path) -> Self {
        let mut spawner = Self::new(config.isolation);
        for (name, category) in &config.categories {
            let command = CommandSpec::from_argv(&category.command)
                .unwrap_or_else(|| CommandSpec::builtin(worker_exe, name));
            spawner = spawner.with_command(name, command);
        }
        spawner
    }

    pub fn command_for(&self, category: &str) -> Option<&CommandSpec> {
        self.commands.get(category)
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, spec: UnitSpec) -> Result<Box<dyn WorkerUnit>, JobError> {
        let command = self.commands.get(&spec.category).ok_or_else(|| {
            JobError::Spawn(format!(
                "no worker command for category '{}'",
                spec.category
            ))
        })?;

        let mut cmd =
            desterra_sandbox::isolated_command(&command.program, self.isolation, &spec.scratch_dir);
        cmd.args(&command.args)
            .env(ENV_JOB_ID, spec.job_id.to_string())
            .env(ENV_CATEGORY, &spec.category)
            .env(ENV_SCRATCH_DIR, &spec.scratch_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group, so helpers the worker starts die with it.
        #[cfg(unix)]
        cmd.process_group(0);

        let request = WorkerRequest {
            job_id: spec.job_id,
            category: spec.category,
            payload: spec.payload,
        };
        let mut body = serde_json::to_vec(&request)
            .map_err(|e| JobError::Spawn(format!("failed to encode worker request: {e}")))?;
        body.push(b'\n');

        let mut child = cmd
            .spawn()
            .map_err(|e| JobError::Spawn(format!("failed to run {}: {e}", command.program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobError::Spawn("worker stdout not captured".into()))?;
        let stdin = child.stdin.take();
        let pid = child.id();

        let job_id = spec.job_id;
        // Written from its own task: a worker that never reads stdin must not
        // stall the supervisor.
        let feeder = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&body).await {
                    debug!(%job_id, "worker did not take its request: {e}");
                }
                let _ = stdin.shutdown().await;
            }
        });

        debug!(%job_id, program = %command.program, "worker process started");
        Ok(Box::new(ProcessUnit {
            job_id,
            pid,
            child,
            lines: BufReader::new(stdout).lines(),
            stdout_open: true,
            exited: None,
            feeder,
        }))
    }
}

/// A running worker process.
struct ProcessUnit {
    job_id: Uuid,
    /// Also the process group ID on unix.
    pid: Option<u32>,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stdout_open: bool,
    /// Exit report plus the end of the stdout drain window, once the
    /// process has been reaped.
    exited: Option<(ExitReport, Instant)>,
    feeder: JoinHandle<()>,
}

impl ProcessUnit {
    /// Interpret one read from stdout. `Some` for a terminal reply.
    fn on_line(&mut self, line: std::io::Result<Option<String>>) -> Option<Signal> {
        let job_id = self.job_id;
        match line {
            Ok(Some(line)) => match WorkerReply::parse_line(&line) {
                Some(WorkerReply::Success { value }) => Some(Signal::Success(value)),
                Some(WorkerReply::Error { error }) => Some(Signal::Failure(error)),
                None => {
                    debug!(%job_id, "worker output: {line}");
                    None
                }
            },
            Ok(None) => {
                self.stdout_open = false;
                None
            }
            Err(e) => {
                debug!(%job_id, "worker stdout unreadable: {e}");
                self.stdout_open = false;
                None
            }
        }
    }

    fn on_exit(&mut self, status: std::io::Result<ExitStatus>) {
        let report = match status {
            Ok(status) => ExitReport::from(status),
            Err(e) => ExitReport::lost(format!("failed to wait for worker: {e}")),
        };
        debug!(job_id = %self.job_id, "worker process exited ({report})");
        self.kill_group();
        self.exited = Some((report, Instant::now() + EXIT_DRAIN));
    }

    /// SIGKILL whatever is left of the worker's process group.
    fn kill_group(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
            // ESRCH (group already gone) is the common case.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
}

#[async_trait]
impl WorkerUnit for ProcessUnit {
    async fn next_signal(&mut self) -> Signal {
        // Race stdout against the process itself: the exit must be seen even
        // when a leftover helper keeps stdout open.
        while self.stdout_open && self.exited.is_none() {
            tokio::select! {
                line = self.lines.next_line() => {
                    if let Some(signal) = self.on_line(line) {
                        return signal;
                    }
                }
                status = self.child.wait() => self.on_exit(status),
            }
        }

        // Replies already written before the exit are still honoured, within
        // a bounded window.
        if let Some((_, drain_until)) = self.exited {
            while self.stdout_open {
                match tokio::time::timeout_at(drain_until, self.lines.next_line()).await {
                    Ok(line) => {
                        if let Some(signal) = self.on_line(line) {
                            return signal;
                        }
                    }
                    Err(_) => {
                        debug!(job_id = %self.job_id, "stdout still open after exit, closing");
                        self.stdout_open = false;
                    }
                }
            }
        }

        self.feeder.abort();
        if self.exited.is_none() {
            let status = self.child.wait().await;
            self.on_exit(status);
        }
        match self.exited.take() {
            Some((report, _)) => Signal::Exit(report),
            None => Signal::Exit(ExitReport::lost("worker exit was not recorded")),
        }
    }

    async fn terminate(&mut self) {
        self.feeder.abort();
        if self.exited.is_none() {
            self.kill_group();
        }
        if let Err(e) = self.child.kill().await {
            debug!(job_id = %self.job_id, "failed to kill worker: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_argv() {
        let argv = vec!["python3".to_string(), "meme.py".to_string()];
        let spec = CommandSpec::from_argv(&argv).unwrap();
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["meme.py"]);
        assert!(CommandSpec::from_argv(&[]).is_none());
    }

    #[test]
    fn test_from_config_uses_builtin_for_empty_commands() {
        let mut config = QueueConfig::default();
        config.categories.get_mut("meme").unwrap().command =
            vec!["/opt/workers/meme".to_string()];
        let exe = PathBuf::from("/usr/local/bin/desterra");
        let spawner = ProcessSpawner::from_config(&config, &exe);

        assert_eq!(
            spawner.command_for("sticker"),
            Some(&CommandSpec::new(
                "/usr/local/bin/desterra",
                vec!["worker".into(), "sticker".into()]
            ))
        );
        assert_eq!(
            spawner.command_for("meme"),
            Some(&CommandSpec::new("/opt/workers/meme", vec![]))
        );
        assert!(spawner.command_for("bogus").is_none());
    }

    #[tokio::test]
    async fn test_spawn_unknown_category_fails() {
        let spawner = ProcessSpawner::new(IsolationMode::Open);
        let spec = UnitSpec {
            job_id: Uuid::new_v4(),
            category: "sticker".into(),
            payload: serde_json::Value::Null,
            scratch_dir: std::env::temp_dir(),
        };
        assert!(matches!(spawner.spawn(spec), Err(JobError::Spawn(_))));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use crate::{CategorySettings, Dispatcher};
        use serde_json::json;
        use std::sync::Arc;
        use std::time::Duration;
        use tokio::time::Instant;

        /// Dispatcher with one category running `sh -c <script>`.
        fn shell_dispatcher(
            script: &str,
            settings: CategorySettings,
            scratch: &tempfile::TempDir,
        ) -> Dispatcher {
            let spawner = ProcessSpawner::new(IsolationMode::Open).with_command(
                "job",
                CommandSpec::new("sh", vec!["-c".to_string(), script.to_string()]),
            );
            Dispatcher::start(
                BTreeMap::from([("job".to_string(), settings)]),
                Arc::new(spawner),
                scratch.path().to_path_buf(),
            )
        }

        #[tokio::test]
        async fn test_success_reply() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher(
                r#"read line; echo '{"status":"success","value":{"ok":true}}'"#,
                CategorySettings::new(2),
                &scratch,
            );
            let value = dispatcher.enqueue("job", json!({})).await.unwrap();
            assert_eq!(value, json!({"ok": true}));
        }

        #[tokio::test]
        async fn test_error_reply_without_reading_stdin() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher(
                r#"echo '{"status":"error","error":"unsupported image"}'"#,
                CategorySettings::new(1),
                &scratch,
            );
            let err = dispatcher.enqueue("job", json!({"big": "x".repeat(200_000)})).await;
            assert!(matches!(err, Err(JobError::Worker(ref m)) if m == "unsupported image"));
        }

        #[tokio::test]
        async fn test_silent_exit_rejects_quickly() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher("exit 3", CategorySettings::new(1), &scratch);

            let started = Instant::now();
            let err = dispatcher.enqueue("job", json!({})).await.unwrap_err();
            assert!(started.elapsed() < Duration::from_secs(1));
            match err {
                JobError::AbnormalExit(report) => assert_eq!(report.code, Some(3)),
                other => panic!("expected abnormal exit, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_background_helper_does_not_delay_exit() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher =
                shell_dispatcher("sleep 5 & exit 3", CategorySettings::new(1), &scratch);

            let started = Instant::now();
            let err = dispatcher.enqueue("job", json!({})).await.unwrap_err();
            assert!(
                started.elapsed() < Duration::from_secs(1),
                "settled after {:?}",
                started.elapsed()
            );
            match err {
                JobError::AbnormalExit(report) => assert_eq!(report.code, Some(3)),
                other => panic!("expected abnormal exit, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_slot_freed_when_worker_exits_with_helper_running() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher(
                r#"echo '{"status":"success","value":1}'; sleep 5 & exit 0"#,
                CategorySettings::new(1),
                &scratch,
            );

            let value = dispatcher.enqueue("job", json!({})).await.unwrap();
            assert_eq!(value, json!(1));

            let freed = tokio::time::timeout(Duration::from_secs(1), async {
                loop {
                    let stats = dispatcher.stats().await;
                    if stats.iter().all(|s| s.active == 0) {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            assert!(freed.is_ok(), "slot still held by a finished worker");
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn test_helpers_killed_with_worker() {
            let scratch = tempfile::tempdir().unwrap();
            let pid_file = scratch.path().join("helper.pid");
            let dispatcher = shell_dispatcher(
                r#"sleep 30 & echo $! > "$DESTERRA_SCRATCH_DIR/../helper.pid"; exit 0"#,
                CategorySettings::new(1),
                &scratch,
            );

            let _ = dispatcher.enqueue("job", json!({})).await;
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            let stat_path = format!("/proc/{}/stat", pid.trim());

            // Gone, or a zombie waiting for its new parent to reap it.
            let dead = tokio::time::timeout(Duration::from_secs(2), async {
                loop {
                    match std::fs::read_to_string(&stat_path) {
                        Err(_) => return,
                        Ok(stat) if stat.contains(") Z ") => return,
                        Ok(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                    }
                }
            })
            .await;
            assert!(dead.is_ok(), "helper process outlived its worker");
        }

        #[tokio::test]
        async fn test_failed_exit_after_success_keeps_success() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher(
                r#"echo '{"status":"success","value":42}'; exit 1"#,
                CategorySettings::new(1),
                &scratch,
            );
            assert_eq!(dispatcher.enqueue("job", json!({})).await.unwrap(), json!(42));
        }

        #[tokio::test]
        async fn test_noise_lines_are_ignored() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher(
                r#"echo loading model; echo '{ not json'; echo '{"status":"success","value":"done"}'"#,
                CategorySettings::new(1),
                &scratch,
            );
            assert_eq!(dispatcher.enqueue("job", json!({})).await.unwrap(), json!("done"));
        }

        #[tokio::test]
        async fn test_request_reaches_worker_stdin() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher(
                r#"read line; printf '{"status":"success","value":%s}\n' "$line""#,
                CategorySettings::new(1),
                &scratch,
            );
            let value = dispatcher
                .enqueue("job", json!({"query": "cumbia"}))
                .await
                .unwrap();
            assert_eq!(value["category"], "job");
            assert_eq!(value["payload"], json!({"query": "cumbia"}));
            assert!(Uuid::parse_str(value["job_id"].as_str().unwrap()).is_ok());
        }

        #[tokio::test]
        async fn test_timeout_kills_worker() {
            let scratch = tempfile::tempdir().unwrap();
            let settings = CategorySettings::new(1).with_timeout(Duration::from_millis(200));
            let dispatcher = shell_dispatcher("exec sleep 30", settings, &scratch);

            let started = Instant::now();
            let err = dispatcher.enqueue("job", json!({})).await.unwrap_err();
            assert!(matches!(err, JobError::Timeout(_)));
            assert!(started.elapsed() < Duration::from_secs(5));
            dispatcher.shutdown().await;
        }

        #[tokio::test]
        async fn test_scratch_dir_env_and_cleanup() {
            let scratch = tempfile::tempdir().unwrap();
            let dispatcher = shell_dispatcher(
                r#"cd "$DESTERRA_SCRATCH_DIR" && echo partial > out.tmp && printf '{"status":"success","value":{"dir":"%s","id":"%s","category":"%s"}}\n' "$DESTERRA_SCRATCH_DIR" "$DESTERRA_JOB_ID" "$DESTERRA_CATEGORY""#,
                CategorySettings::new(1),
                &scratch,
            );
            let ticket = dispatcher.submit("job", json!({})).unwrap();
            let job_id = ticket.id();
            let value = ticket.await.unwrap();

            let dir = PathBuf::from(value["dir"].as_str().unwrap());
            assert_eq!(dir, scratch.path().join(job_id.to_string()));
            assert_eq!(value["id"], job_id.to_string());
            assert_eq!(value["category"], "job");

            dispatcher.shutdown().await;
            assert!(!dir.exists(), "scratch dir removed after exit");
        }
    }
}

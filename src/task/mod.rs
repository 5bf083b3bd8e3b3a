//! External process tasks
//!
//! A [`ProcessTask`] drives one download or encode: it asks its
//! [`Launcher`] for a command line, spawns it, parses progress from stderr
//! and reports exactly one result through its [`TaskReporter`].

pub mod progress;
pub mod stream;

pub use progress::{MAX_PROGRESS_HISTORY, ProgressHistory, ProgressPattern, ProgressSample};

use crate::error::{AppError, AppResult};
use crate::queue::{Activator, QueueTask, TaskId, TaskReporter};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stream::LineSegments;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Everything needed to spawn one external process
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// How to read progress from the process's stderr
    pub pattern: ProgressPattern,
    /// Primary file the process produces
    pub output: Option<PathBuf>,
    /// Media length the process works through, in seconds, when known
    pub duration: Option<f64>,
}

/// Builds the command line for a job.
///
/// Runs inside the task, so slow preparation (probing, side downloads)
/// never blocks the queue.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    type Job: Clone + Send + Sync + 'static;

    async fn prepare(&self, job: &Self::Job) -> AppResult<PreparedCommand>;
}

/// A running external process bound to one job
pub struct ProcessTask<J> {
    inner: Arc<TaskInner<J>>,
}

struct TaskInner<J> {
    id: TaskId,
    job: J,
    finished: AtomicBool,
    pid: Mutex<Option<u32>>,
    history: Mutex<ProgressHistory>,
    output: Mutex<Option<PathBuf>>,
    duration: Mutex<Option<f64>>,
    kill_tx: watch::Sender<bool>,
}

impl<J> Clone for ProcessTask<J> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<J> fmt::Debug for ProcessTask<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessTask")
            .field("id", &self.inner.id)
            .field("pid", &self.pid())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<J: Clone + Send + Sync + 'static> ProcessTask<J> {
    /// Spawn the task on the current tokio runtime and return its handle
    pub fn launch<L>(
        id: TaskId,
        job: J,
        launcher: Arc<L>,
        reporter: TaskReporter<ProgressSample>,
    ) -> Self
    where
        L: Launcher<Job = J>,
    {
        let (kill_tx, kill_rx) = watch::channel(false);
        let task = Self {
            inner: Arc::new(TaskInner {
                id,
                job,
                finished: AtomicBool::new(false),
                pid: Mutex::new(None),
                history: Mutex::new(ProgressHistory::default()),
                output: Mutex::new(None),
                duration: Mutex::new(None),
                kill_tx,
            }),
        };

        let running = task.clone();
        tokio::spawn(async move {
            let result = running.execute(launcher.as_ref(), kill_rx, &reporter).await;
            running.inner.finished.store(true, Ordering::SeqCst);

            match result {
                Ok(()) => {
                    info!("Task {} completed", running.inner.id);
                    reporter.finish();
                }
                Err(e) => reporter.fail(e),
            }
        });

        task
    }

    async fn execute<L>(
        &self,
        launcher: &L,
        mut kill_rx: watch::Receiver<bool>,
        reporter: &TaskReporter<ProgressSample>,
    ) -> AppResult<()>
    where
        L: Launcher<Job = J>,
    {
        // Step 1: Build the command line
        let prepared = launcher.prepare(&self.inner.job).await?;
        if *kill_rx.borrow_and_update() {
            return Err(AppError::Cancelled);
        }
        *self.inner.output.lock() = prepared.output.clone();
        *self.inner.duration.lock() = prepared.duration;

        // Step 2: Spawn with stderr captured
        debug!(
            "Task {}: {} {}",
            self.inner.id,
            prepared.program.display(),
            prepared.args.join(" ")
        );
        let mut child = Command::new(&prepared.program)
            .args(&prepared.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        *self.inner.pid.lock() = child.id();

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;
        let mut lines = LineSegments::new(stderr);

        // Step 3: Follow progress until the process closes its stderr
        let mut terminating = false;
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => self.observe(prepared.pattern, &line, reporter),
                    None => break,
                },
                changed = kill_rx.changed(), if !terminating => {
                    if changed.is_ok() && *kill_rx.borrow_and_update() {
                        terminate(&mut child);
                        terminating = true;
                    }
                }
            }
        }

        // Step 4: Exit status decides the result
        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::ProcessExitNonZero(status.code()))
        }
    }

    fn observe(
        &self,
        pattern: ProgressPattern,
        line: &str,
        reporter: &TaskReporter<ProgressSample>,
    ) {
        if let Some(sample) = pattern.parse(line) {
            self.inner.history.lock().push(sample.clone());
            reporter.progress(sample);
        }
    }
}

impl<J> ProcessTask<J> {
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn job(&self) -> &J {
        &self.inner.job
    }

    /// Process id, once spawned
    pub fn pid(&self) -> Option<u32> {
        *self.inner.pid.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Recent progress samples, oldest first
    pub fn history(&self) -> Vec<ProgressSample> {
        self.inner.history.lock().to_vec()
    }

    pub fn latest(&self) -> Option<ProgressSample> {
        self.inner.history.lock().latest().cloned()
    }

    pub fn output(&self) -> Option<PathBuf> {
        self.inner.output.lock().clone()
    }

    /// How far the latest sample is through the media, 0 to 100
    pub fn percent_done(&self) -> Option<f64> {
        let duration = (*self.inner.duration.lock()).filter(|d| *d > 0.0)?;
        let elapsed = self.latest()?.elapsed_secs()?;
        Some((elapsed / duration * 100.0).min(100.0))
    }

    /// Ask the process to stop.
    ///
    /// The task fails once the process has closed. Before the spawn, the
    /// spawn is skipped and the task fails with [`AppError::Cancelled`].
    pub fn kill(&self) {
        if !self.inner.kill_tx.send_replace(true) {
            info!("Killing task {}", self.inner.id);
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill child process: {}", e);
    }
}

impl<J: Clone + Send + Sync + 'static> QueueTask for ProcessTask<J> {
    fn kill(&self) {
        ProcessTask::kill(self);
    }
}

/// Activates jobs as [`ProcessTask`]s prepared by `L`
pub struct ProcessActivator<L> {
    launcher: Arc<L>,
}

impl<L: Launcher> ProcessActivator<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
        }
    }
}

impl<L: Launcher> Activator for ProcessActivator<L> {
    type Job = L::Job;
    type Task = ProcessTask<L::Job>;
    type Progress = ProgressSample;

    fn activate(
        &self,
        id: TaskId,
        job: L::Job,
        reporter: TaskReporter<ProgressSample>,
    ) -> Self::Task {
        ProcessTask::launch(id, job, self.launcher.clone(), reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskSignal;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    /// Runs the job string as a shell script
    #[derive(Default)]
    struct ShLauncher {
        delay: Duration,
        missing: bool,
    }

    #[async_trait]
    impl Launcher for ShLauncher {
        type Job = String;

        async fn prepare(&self, script: &String) -> AppResult<PreparedCommand> {
            tokio::time::sleep(self.delay).await;
            if self.missing {
                return Err(AppError::ExecutableNotFound {
                    tool: "livestreamer".to_string(),
                });
            }
            Ok(PreparedCommand {
                program: PathBuf::from("/bin/sh"),
                args: vec!["-c".to_string(), script.clone()],
                pattern: ProgressPattern::Livestreamer,
                output: Some(PathBuf::from("/tmp/out.flv")),
                duration: Some(4.0),
            })
        }
    }

    type Signals = UnboundedReceiver<TaskSignal<ProgressSample>>;

    fn start(launcher: ShLauncher, script: &str) -> (ProcessTask<String>, Signals) {
        let (reporter, rx) = TaskReporter::detached(1);
        let task = ProcessTask::launch(1, script.to_string(), Arc::new(launcher), reporter);
        (task, rx)
    }

    async fn collect(rx: &mut Signals) -> Vec<TaskSignal<ProgressSample>> {
        let mut signals = Vec::new();
        loop {
            let signal = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("task did not report in time")
                .expect("reporter channel closed");
            let done = signal.is_terminal();
            signals.push(signal);
            if done {
                return signals;
            }
        }
    }

    #[tokio::test]
    async fn test_progress_then_finish() {
        let script = r#"
            printf 'Written 1.0 MB (1s @ 1.0 MB/s)\r' >&2
            echo 'unrelated chatter' >&2
            printf 'Written 2.0 MB (2s @ 1.0 MB/s)\n' >&2
        "#;
        let (task, mut rx) = start(ShLauncher::default(), script);
        let signals = collect(&mut rx).await;

        assert_eq!(signals.len(), 3);
        match &signals[0] {
            TaskSignal::Progress(1, sample) => assert_eq!(sample.progress, "1.0 MB"),
            other => panic!("unexpected signal {:?}", other),
        }
        assert!(matches!(&signals[1], TaskSignal::Progress(1, s) if s.elapsed == "2s"));
        assert!(matches!(signals[2], TaskSignal::Finished(1)));

        assert!(task.is_finished());
        assert!(task.pid().is_some());
        assert_eq!(task.history().len(), 2);
        assert_eq!(task.output(), Some(PathBuf::from("/tmp/out.flv")));
        assert_eq!(task.percent_done(), Some(50.0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_with_code() {
        let (task, mut rx) = start(ShLauncher::default(), "echo oops >&2; exit 3");
        let signals = collect(&mut rx).await;

        assert_eq!(signals.len(), 1);
        match &signals[0] {
            TaskSignal::Failed(_, err) => assert_eq!(err.exit_code(), Some(3)),
            other => panic!("unexpected signal {:?}", other),
        }
        assert!(task.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let script = r#"
            i=0
            while [ $i -lt 31 ]; do
                printf 'Written %d.0 MB (%ds @ 1.0 MB/s)\n' $i $i >&2
                i=$((i+1))
            done
        "#;
        let (task, mut rx) = start(ShLauncher::default(), script);
        let signals = collect(&mut rx).await;

        let progress = signals
            .iter()
            .filter(|s| matches!(s, TaskSignal::Progress(..)))
            .count();
        assert_eq!(progress, 31);

        let history = task.history();
        assert_eq!(history.len(), MAX_PROGRESS_HISTORY);
        assert_eq!(history[0].progress, "1.0 MB");
        assert_eq!(task.latest().map(|s| s.progress), Some("30.0 MB".to_string()));
    }

    #[tokio::test]
    async fn test_kill_running_process() {
        let (task, mut rx) = start(ShLauncher::default(), "exec sleep 30");

        timeout(Duration::from_secs(5), async {
            while task.pid().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("process never spawned");

        task.kill();
        let signals = collect(&mut rx).await;

        assert_eq!(signals.len(), 1);
        match &signals[0] {
            TaskSignal::Failed(_, AppError::ProcessExitNonZero(code)) => assert_eq!(*code, None),
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_kill_before_spawn_cancels() {
        let launcher = ShLauncher {
            delay: Duration::from_millis(100),
            ..Default::default()
        };
        let (task, mut rx) = start(launcher, "exit 0");
        task.kill();

        let signals = collect(&mut rx).await;
        assert!(matches!(signals[0], TaskSignal::Failed(_, AppError::Cancelled)));
        assert!(task.pid().is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_never_spawns() {
        let launcher = ShLauncher {
            missing: true,
            ..Default::default()
        };
        let (task, mut rx) = start(launcher, "exit 0");

        let signals = collect(&mut rx).await;
        assert_eq!(signals.len(), 1);
        assert!(matches!(
            &signals[0],
            TaskSignal::Failed(_, AppError::ExecutableNotFound { tool }) if tool == "livestreamer"
        ));
        assert!(task.pid().is_none());
        assert!(task.output().is_none());
        assert!(task.percent_done().is_none());
    }
}

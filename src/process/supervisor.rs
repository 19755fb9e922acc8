use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{debug, error, warn};

use super::LAUNCHER;
use super::budget::RetryBudget;
use super::io::ProcessIo;
use super::spec::ProcessSpec;
use crate::core::RuntimeHandle;
use crate::error::{ProcessError, TaskError};
use crate::events::{Event, EventKind};

type StartHook = Arc<dyn Fn(ProcessIo) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;
type FailureHook = Arc<dyn Fn() -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;

/// Lifecycle of a supervised child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Not started, or stopped on request.
    Idle,
    /// Launch in progress.
    Starting,
    /// Child is alive.
    Running,
    /// Child exited unexpectedly; recovery is being decided.
    Exited,
    /// Waiting out the backoff before a restart.
    Restarting,
    /// Restart budget spent; no longer supervised.
    Failed,
}

/// # A long-running child kept alive by the runtime.
///
/// Cheap to clone; clones control the same child.
///
/// Every launch bumps a generation counter. The exit watcher, the backoff
/// sleeper and the periodic restart timer of a launch all act only while their
/// generation is current, so a timer armed for an old child never restarts the
/// new one.
#[derive(Clone)]
pub struct SupervisedProcess {
    inner: Arc<Inner>,
}

struct Inner {
    spec: ProcessSpec,
    runtime: RuntimeHandle,
    stopped: AtomicBool,
    hooks: Mutex<Hooks>,
    shared: Mutex<Shared>,
}

#[derive(Default)]
struct Hooks {
    on_start: Option<StartHook>,
    on_failure: Option<FailureHook>,
}

struct Shared {
    state: ProcessState,
    budget: RetryBudget,
    generation: u64,
    pid: Option<u32>,
    control: Option<ChildControl>,
}

/// Link between `stop()` and the exit watcher of the current child.
struct ChildControl {
    kill: oneshot::Sender<()>,
    exited: oneshot::Receiver<()>,
}

impl SupervisedProcess {
    /// Creates an idle supervisor; nothing runs until [`start`](Self::start).
    pub fn new(spec: ProcessSpec, runtime: RuntimeHandle) -> Result<Self, ProcessError> {
        if spec.args().is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        let budget = RetryBudget::new(spec.retries(), spec.retry_threshold());
        Ok(Self {
            inner: Arc::new(Inner {
                spec,
                runtime,
                stopped: AtomicBool::new(false),
                hooks: Mutex::new(Hooks::default()),
                shared: Mutex::new(Shared {
                    state: ProcessState::Idle,
                    budget,
                    generation: 0,
                    pid: None,
                    control: None,
                }),
            }),
        })
    }

    /// Hook run on every launch with the child's piped stdout.
    ///
    /// Without this hook the child's stdout is discarded.
    pub fn on_start<F, Fut>(&self, hook: F) -> &Self
    where
        F: Fn(ProcessIo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.hooks().on_start = Some(Arc::new(move |io| hook(io).boxed()));
        self
    }

    /// Hook run once the restart budget is spent. A fatal error returned here
    /// shuts the runtime down.
    pub fn on_failure<F, Fut>(&self, hook: F) -> &Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.hooks().on_failure = Some(Arc::new(move || hook().boxed()));
        self
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.inner.spec
    }

    pub fn state(&self) -> ProcessState {
        self.shared().state
    }

    /// Pid of the current child, if one is running.
    pub fn pid(&self) -> Option<u32> {
        self.shared().pid
    }

    /// Launches the child and begins supervising it.
    pub async fn start(&self) -> Result<(), ProcessError> {
        self.launch()
    }

    /// Kills the current child and waits for it; no restart follows.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let control = self.shared().control.take();
        let Some(control) = control else {
            return;
        };

        let _ = control.kill.send(());
        let _ = control.exited.await;
        {
            let mut shared = self.shared();
            shared.state = ProcessState::Idle;
            shared.pid = None;
        }

        debug!(program = self.program(), "process stopped");
        self.inner
            .runtime
            .bus()
            .publish(Event::new(EventKind::ProcessStopped).with_source(self.program()));
    }

    /// Stops the child, then launches a fresh one.
    pub async fn restart(&self) -> Result<(), ProcessError> {
        self.stop().await;
        self.launch()
    }

    fn launch(&self) -> Result<(), ProcessError> {
        let spec = &self.inner.spec;
        let on_start = self.hooks().on_start.clone();

        self.set_state(ProcessState::Starting);
        let stdout = if on_start.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = match Command::new(LAUNCHER)
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                self.set_state(ProcessState::Exited);
                return Err(ProcessError::Spawn {
                    program: self.program().to_string(),
                    error,
                });
            }
        };

        let pid = child.id();
        let io = ProcessIo::new(pid, child.stdout.take());
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel();
        let generation = {
            let mut shared = self.shared();
            shared.generation += 1;
            shared.state = ProcessState::Running;
            shared.pid = pid;
            shared.control = Some(ChildControl {
                kill: kill_tx,
                exited: exited_rx,
            });
            shared.generation
        };
        self.inner.stopped.store(false, Ordering::SeqCst);

        let program = self.program();
        debug!(program, pid, "process started");
        let runtime = &self.inner.runtime;
        runtime.bus().publish(
            Event::new(EventKind::ProcessSpawned)
                .with_source(program)
                .with_pid(pid),
        );

        if let Some(hook) = on_start {
            runtime.spawn(format!("{program} on-start"), hook(io));
        }
        if let Some(every) = spec.restart_every() {
            runtime.spawn(
                format!("{program} scheduled restart"),
                self.clone().scheduled_restart(every, generation),
            );
        }
        runtime.spawn(
            format!("{program} exit watcher"),
            self.clone().watch(generation, child, kill_rx, exited_tx),
        );
        Ok(())
    }

    async fn watch(
        self,
        generation: u64,
        mut child: Child,
        mut kill: oneshot::Receiver<()>,
        exited: oneshot::Sender<()>,
    ) -> Result<(), TaskError> {
        let pid = child.id();
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = &mut kill => None,
        };
        let status = match waited {
            Some(status) => status,
            None => {
                let _ = child.start_kill();
                child.wait().await
            }
        };
        let code = status.ok().and_then(|s| s.code());
        let deliberate = self.inner.stopped.load(Ordering::SeqCst) || self.is_superseded(generation);

        self.inner.runtime.bus().publish(
            Event::new(EventKind::ProcessExited)
                .with_source(self.program())
                .with_exit_code(code)
                .with_pid(pid),
        );
        let _ = exited.send(());
        if deliberate {
            return Ok(());
        }
        self.recover(generation).await
    }

    async fn recover(&self, generation: u64) -> Result<(), TaskError> {
        let program = self.program();
        let retries = self.inner.spec.retries();
        loop {
            let attempt = {
                let mut shared = self.shared();
                shared.state = ProcessState::Exited;
                shared.pid = None;
                shared.budget.on_crash(Instant::now())
            };
            let Some(attempt) = attempt else {
                return self.give_up().await;
            };

            let delay = self.inner.spec.backoff().next(attempt - 1);
            warn!(program, attempt, retries, ?delay, "process died unexpectedly, restarting");
            self.set_state(ProcessState::Restarting);
            self.inner.runtime.bus().publish(
                Event::new(EventKind::BackoffScheduled)
                    .with_source(program)
                    .with_attempt(attempt)
                    .with_delay(delay),
            );

            time::sleep(delay).await;
            if self.inner.stopped.load(Ordering::SeqCst) || self.is_superseded(generation) {
                return Ok(());
            }

            self.shared().budget.mark_restarted(Instant::now());
            match self.launch() {
                Ok(()) => return Ok(()),
                Err(e) => warn!(program, label = e.as_label(), error = %e, "relaunch failed"),
            }
        }
    }

    async fn give_up(&self) -> Result<(), TaskError> {
        let program = self.program();
        let retries = self.inner.spec.retries();
        error!(program, retries, "process has reached the restart threshold");
        {
            let mut shared = self.shared();
            shared.state = ProcessState::Failed;
            shared.control = None;
        }
        self.inner.runtime.bus().publish(
            Event::new(EventKind::RestartsExhausted)
                .with_source(program)
                .with_attempt(retries),
        );

        let hook = self.hooks().on_failure.clone();
        match hook {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }

    async fn scheduled_restart(self, every: Duration, generation: u64) -> Result<(), TaskError> {
        time::sleep(every).await;
        if self.inner.stopped.load(Ordering::SeqCst) || self.is_superseded(generation) {
            return Ok(());
        }

        debug!(program = self.program(), "automatically restarting process");
        self.inner.runtime.bus().publish(
            Event::new(EventKind::RestartScheduled)
                .with_source(self.program())
                .with_delay(every),
        );
        self.restart().await.map_err(TaskError::from)
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.shared().generation != generation
    }

    fn set_state(&self, state: ProcessState) {
        self.shared().state = state;
    }

    fn program(&self) -> &str {
        self.inner.spec.program()
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hooks(&self) -> MutexGuard<'_, Hooks> {
        self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("args", &self.inner.spec.args())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{broadcast, mpsc};

    use super::*;
    use crate::policies::{BackoffPolicy, JitterPolicy};

    fn fast(args: &[&str]) -> ProcessSpec {
        ProcessSpec::new(args.iter().copied()).with_backoff(BackoffPolicy {
            first: Duration::from_millis(10),
            max: Duration::from_millis(50),
            factor: 2.0,
            jitter: JitterPolicy::None,
        })
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        time::timeout(Duration::from_secs(5), async {
            loop {
                let ev = rx.recv().await.expect("bus open");
                if ev.kind == kind {
                    return ev;
                }
            }
        })
        .await
        .expect("event in time")
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let err = SupervisedProcess::new(ProcessSpec::new(Vec::<String>::new()), RuntimeHandle::detached())
            .unwrap_err();
        assert_eq!(err.as_label(), "process_empty_command");
    }

    #[tokio::test]
    async fn crashing_child_is_restarted_then_given_up() {
        let runtime = RuntimeHandle::detached();
        let mut rx = runtime.bus().subscribe();
        let proc = SupervisedProcess::new(fast(&["false"]).with_retries(3), runtime).unwrap();

        let (tx, failed) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        proc.on_failure(move || {
            let tx = tx.lock().unwrap().take();
            async move {
                if let Some(tx) = tx {
                    let _ = tx.send(());
                }
                Ok(())
            }
        });

        proc.start().await.unwrap();
        time::timeout(Duration::from_secs(10), failed)
            .await
            .expect("gave up in time")
            .unwrap();
        assert_eq!(proc.state(), ProcessState::Failed);

        let events = drain(&mut rx);
        let spawned = events.iter().filter(|e| e.kind == EventKind::ProcessSpawned).count();
        let delays: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::BackoffScheduled)
            .filter_map(Event::delay)
            .collect();
        assert_eq!(spawned, 4);
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40)
            ]
        );
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::RestartsExhausted));
    }

    #[tokio::test]
    async fn stop_does_not_trigger_recovery() {
        let runtime = RuntimeHandle::detached();
        let mut rx = runtime.bus().subscribe();
        let proc = SupervisedProcess::new(fast(&["sleep", "30"]), runtime).unwrap();

        proc.start().await.unwrap();
        assert_eq!(proc.state(), ProcessState::Running);
        assert!(proc.pid().is_some());

        proc.stop().await;
        assert_eq!(proc.state(), ProcessState::Idle);
        assert_eq!(proc.pid(), None);

        time::sleep(Duration::from_millis(100)).await;
        let kinds: Vec<_> = drain(&mut rx).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ProcessSpawned,
                EventKind::ProcessExited,
                EventKind::ProcessStopped
            ]
        );
    }

    #[tokio::test]
    async fn periodic_restart_replaces_the_child() {
        let runtime = RuntimeHandle::detached();
        let mut rx = runtime.bus().subscribe();
        let spec = fast(&["sleep", "30"]).with_restart_every(Some(Duration::from_millis(150)));
        let proc = SupervisedProcess::new(spec, runtime).unwrap();

        proc.start().await.unwrap();
        let first = next_of(&mut rx, EventKind::ProcessSpawned).await.pid;
        next_of(&mut rx, EventKind::RestartScheduled).await;
        let second = next_of(&mut rx, EventKind::ProcessSpawned).await.pid;
        assert_ne!(first, second);

        proc.stop().await;
    }

    #[tokio::test]
    async fn manual_restart_disarms_the_old_timer() {
        let runtime = RuntimeHandle::detached();
        let mut rx = runtime.bus().subscribe();
        let spec = fast(&["sleep", "30"]).with_restart_every(Some(Duration::from_secs(1)));
        let proc = SupervisedProcess::new(spec, runtime).unwrap();

        proc.start().await.unwrap();
        time::sleep(Duration::from_millis(500)).await;
        proc.restart().await.unwrap();

        // the first timer would have fired at 1s, the second fires at 1.5s
        time::sleep(Duration::from_millis(750)).await;
        let events = drain(&mut rx);
        let spawned = events.iter().filter(|e| e.kind == EventKind::ProcessSpawned).count();
        assert_eq!(spawned, 2);
        assert!(events.iter().all(|e| e.kind != EventKind::RestartScheduled));

        proc.stop().await;
    }

    #[tokio::test]
    async fn on_start_receives_stdout() {
        let proc = SupervisedProcess::new(
            fast(&["echo", "hello"]).with_retries(0),
            RuntimeHandle::detached(),
        )
        .unwrap();

        let (tx, mut lines) = mpsc::unbounded_channel();
        proc.on_start(move |mut io| {
            let tx = tx.clone();
            async move {
                let Some(mut out) = io.stdout_lines() else {
                    return Ok(());
                };
                while let Some(line) = out.next_line().await.map_err(|e| TaskError::fail(e.to_string()))? {
                    let _ = tx.send(line);
                }
                Ok::<(), TaskError>(())
            }
        });

        proc.start().await.unwrap();
        let line = time::timeout(Duration::from_secs(5), lines.recv())
            .await
            .expect("line in time");
        assert_eq!(line.as_deref(), Some("hello"));
    }
}

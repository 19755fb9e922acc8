use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::ChildStdout;

/// Live handle given to the on-start hook of a [`SupervisedProcess`](super::SupervisedProcess).
///
/// Holds the child's piped stdout; stderr is inherited by the daemon.
#[derive(Debug)]
pub struct ProcessIo {
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
}

impl ProcessIo {
    pub(crate) fn new(pid: Option<u32>, stdout: Option<ChildStdout>) -> Self {
        Self { pid, stdout }
    }

    /// OS process id of the child.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Takes the raw stdout pipe.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Takes stdout as a line stream. `None` once taken.
    pub fn stdout_lines(&mut self) -> Option<Lines<BufReader<ChildStdout>>> {
        self.take_stdout().map(|out| BufReader::new(out).lines())
    }
}

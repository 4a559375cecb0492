//! Subprocess handle seam between the adapter and the external tool.
//!
//! The adapter only sees [`Downloader`] and [`DownloadHandle`]: start a run,
//! pull structured events until EOF, ask it to stop, force-kill it, reap it.
//! [`ChildProcess`] is the tokio implementation used by the real downloader.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::parse::parse_line;

/// Errors raised while driving a subprocess. Folded into item outcomes.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to signal process: {0}")]
    Signal(#[source] std::io::Error),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// One invocation of the downloader for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Empty directory the tool writes into.
    pub temp_dir: PathBuf,
}

/// Structured event parsed from the tool's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Progress { percent: f64, eta_secs: Option<u64> },
    /// The file being downloaded.
    Destination(PathBuf),
    /// The converted audio file.
    Extracted(PathBuf),
    /// Any other line.
    Output { line: String, stderr: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// None when terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running download. `next_event` must be cancel safe: the adapter polls
/// it inside `select!` next to the stop token.
#[async_trait]
pub trait DownloadHandle: Send {
    /// Next event, or None once the output streams are closed.
    async fn next_event(&mut self) -> Option<ProcessEvent>;
    /// Cooperative stop (SIGTERM to the process group).
    fn request_stop(&mut self) -> Result<(), PipelineError>;
    /// Forced stop (SIGKILL).
    fn kill(&mut self) -> Result<(), PipelineError>;
    async fn wait(&mut self) -> Result<ProcessExit, PipelineError>;
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn start(&self, req: &DownloadRequest) -> Result<Box<dyn DownloadHandle>, PipelineError>;
}

/// tokio child process in its own process group, with stdout and stderr
/// merged into one line channel.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    lines: mpsc::Receiver<(String, bool)>,
}

impl ChildProcess {
    pub fn spawn(mut cmd: Command) -> Result<Self, PipelineError> {
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|source| PipelineError::Spawn { program, source })?;
        let pid = child.id();
        let (tx, lines) = mpsc::channel(256);
        if let Some(out) = child.stdout.take() {
            tokio::spawn(forward_lines(out, false, tx.clone()));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(forward_lines(err, true, tx));
        }
        Ok(Self { child, pid, lines })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn signal_group(&mut self, signal: libc::c_int) -> Result<(), PipelineError> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        // The child leads its own group (process_group(0)), so this also
        // reaches ffmpeg and any other helper it spawned.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(PipelineError::Signal(err))
    }
}

async fn forward_lines<R>(reader: R, stderr: bool, tx: mpsc::Sender<(String, bool)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send((line, stderr)).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl DownloadHandle for ChildProcess {
    async fn next_event(&mut self) -> Option<ProcessEvent> {
        let (line, stderr) = self.lines.recv().await?;
        Some(parse_line(&line, stderr))
    }

    fn request_stop(&mut self) -> Result<(), PipelineError> {
        #[cfg(unix)]
        {
            self.signal_group(libc::SIGTERM)
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill().map_err(PipelineError::Signal)
        }
    }

    fn kill(&mut self) -> Result<(), PipelineError> {
        #[cfg(unix)]
        self.signal_group(libc::SIGKILL)?;
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(PipelineError::Signal(e)),
        }
    }

    async fn wait(&mut self) -> Result<ProcessExit, PipelineError> {
        let status = self.child.wait().await.map_err(PipelineError::Wait)?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn streams_lines_and_exit_code() {
        let mut proc = ChildProcess::spawn(sh(
            "echo '[download]  50.0% of 3.00MiB at 1.00MiB/s ETA 00:02'; echo oops >&2; exit 3",
        ))
        .unwrap();
        let mut events = Vec::new();
        while let Some(ev) = proc.next_event().await {
            events.push(ev);
        }
        assert!(events.contains(&ProcessEvent::Progress {
            percent: 50.0,
            eta_secs: Some(2)
        }));
        assert!(events.contains(&ProcessEvent::Output {
            line: "oops".into(),
            stderr: true
        }));
        assert_eq!(proc.wait().await.unwrap().code, Some(3));
    }

    #[tokio::test]
    async fn sigterm_reaches_the_group() {
        let mut proc = ChildProcess::spawn(sh("sleep 30 & wait")).unwrap();
        proc.request_stop().unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), proc.wait())
            .await
            .expect("terminated")
            .unwrap();
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn kill_after_ignored_term() {
        let mut proc = ChildProcess::spawn(sh("trap '' TERM; echo ready; sleep 30")).unwrap();
        // Wait until the trap is installed.
        assert!(proc.next_event().await.is_some());
        proc.request_stop().unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(300), proc.wait())
            .await
            .is_err());
        proc.kill().unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), proc.wait())
            .await
            .expect("killed")
            .unwrap();
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = ChildProcess::spawn(Command::new("/nonexistent/yt-dlp")).unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }
}

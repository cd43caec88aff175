//! Child-process plumbing shared by the sandbox and the shell tool.
//!
//! Every child is started as the leader of its own process group so that a
//! deadline kill reaches grandchildren too. Both streams are drained
//! concurrently with the wait to keep a chatty child from blocking on a full
//! pipe.
//!
//! The deadline covers the whole run, draining included: a descendant that
//! left the group but still holds a pipe cannot stretch it. The group is only
//! signalled while its leader is exited but unreaped, which keeps the group
//! id reserved.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Streams and status of a child that exited on its own.
#[derive(Debug)]
pub(crate) struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum RunOutcome {
    Exited(CapturedOutput),
    /// The deadline fired before the child exited and its pipes closed; the
    /// output is discarded.
    TimedOut,
}

/// Spawn `cmd` in a fresh process group and give it `deadline` to exit and
/// close its output streams.
pub(crate) async fn run_with_deadline(mut cmd: Command, deadline: Duration) -> io::Result<RunOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let deadline_at = Instant::now() + deadline;
    let mut child = cmd.spawn()?;
    let pid = child.id();
    let mut stdout = drain(child.stdout.take());
    let mut stderr = drain(child.stderr.take());

    let status = match tokio::time::timeout_at(deadline_at, wait_settled(&mut child)).await {
        Ok(status) => status?,
        Err(_) => {
            // The wait did not complete, so the leader is still unreaped.
            if let Some(pid) = pid {
                kill_group(pid);
            }
            if let Err(e) = child.kill().await {
                debug!(error = %e, "child already gone after deadline");
            }
            stdout.abort();
            stderr.abort();
            return Ok(RunOutcome::TimedOut);
        }
    };

    let streams = tokio::time::timeout_at(deadline_at, async {
        let out = (&mut stdout).await.unwrap_or_default();
        let err = (&mut stderr).await.unwrap_or_default();
        (out, err)
    })
    .await;
    match streams {
        Ok((stdout, stderr)) => Ok(RunOutcome::Exited(CapturedOutput {
            status,
            stdout,
            stderr,
        })),
        Err(_) => {
            debug!(?pid, "output pipes still open at the deadline");
            stdout.abort();
            stderr.abort();
            Ok(RunOutcome::TimedOut)
        }
    }
}

/// Wait for the leader to exit, kill what is left of its group, then reap it.
async fn wait_settled(child: &mut Child) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            match exited_unreaped(pid).await {
                // Stragglers that inherited the pipes would keep the drains open.
                Ok(()) => kill_group(pid),
                Err(e) => debug!(pid, error = %e, "cannot observe exit without reaping"),
            }
        }
    }
    child.wait().await
}

/// Resolve once `pid` has exited, leaving it a zombie.
#[cfg(unix)]
async fn exited_unreaped(pid: u32) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigchld = signal(SignalKind::child())?;
    while !has_exited(pid)? {
        if sigchld.recv().await.is_none() {
            return Err(io::Error::other("SIGCHLD stream closed"));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn has_exited(pid: u32) -> io::Result<bool> {
    let id = libc::id_t::try_from(pid).map_err(io::Error::other)?;
    loop {
        // SAFETY: siginfo_t is plain data and all-zero is a valid value.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid, writable siginfo_t for the call. WNOWAIT
        // leaves the child waitable, so the tokio handle still reaps it.
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                id,
                &mut info,
                libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            // With WNOHANG and no state change the struct is left zeroed.
            return Ok(info.si_signo != 0);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn drain<R>(stream: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.read_to_end(&mut buf).await {
                debug!(error = %e, "stream read failed");
            }
        }
        buf
    })
}

/// SIGKILL the group led by `pid`. Callers must not have reaped `pid` yet.
#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; an empty group
    // yields ESRCH, which is ignored.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == -1 {
        debug!(pgid, error = %io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

//! Helpers for running child processes with bounded output, cancellation,
//! and optional line streaming to an observer channel.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::stream::{CANCEL_POLL_INTERVAL, CancelToken, LineEmitter, StreamEvent, StreamSource};

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

/// Run a command, capturing stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes`
/// bounds the bytes stored in memory per stream (excess is discarded while
/// still draining the pipe). When `observer` is set, every completed output
/// line is also forwarded as a [`StreamEvent::Line`]. `timeout` of `None`
/// waits indefinitely; the cancellation token is polled either way and kills
/// the child when fired.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_streamed(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
    observer: Option<&Sender<StreamEvent>>,
    cancel: &CancelToken,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
        // Dropping the handle closes the pipe so the child sees EOF.
        drop(child_stdin);
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_emitter = observer.map(|tx| LineEmitter::new(StreamSource::Stdout, tx.clone()));
    let stderr_emitter = observer.map(|tx| LineEmitter::new(StreamSource::Stderr, tx.clone()));
    let stdout_handle =
        thread::spawn(move || read_stream_limited(stdout, output_limit_bytes, stdout_emitter));
    let stderr_handle =
        thread::spawn(move || read_stream_limited(stderr, output_limit_bytes, stderr_emitter));

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        if cancel.is_cancelled() {
            warn!("cancellation requested, killing command");
            cancelled = true;
            child.kill().context("kill cancelled command")?;
            break child.wait().context("wait cancelled command")?;
        }
        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    warn!("command timed out, killing");
                    timed_out = true;
                    child.kill().context("kill command")?;
                    break child.wait().context("wait command after kill")?;
                }
                left.min(CANCEL_POLL_INTERVAL)
            }
            None => CANCEL_POLL_INTERVAL,
        };
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            break status;
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        cancelled,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line-by-line with a size limit, optionally forwarding each
/// line to an emitter.
fn read_stream_limited<R: Read>(
    reader: R,
    limit: usize,
    mut emitter: Option<LineEmitter>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        if let Some(em) = emitter.as_mut() {
            let _ = em.write_all(&line);
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    if let Some(em) = emitter {
        em.close();
    }

    Ok((collected, truncated))
}

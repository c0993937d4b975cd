//! Line-oriented streaming bridge between a child process and a consumer.
//!
//! Converts a running process's stdout/stderr into an ordered sequence of
//! [`StreamEvent`]s on a single channel: two reader threads scan their stream
//! for completed lines, a coordinator waits for process exit, drains both
//! readers, and emits the terminal [`StreamEvent::Finished`] before the
//! channel closes. Lines from the same stream arrive in write order; no
//! ordering holds between stdout and stderr.
//!
//! [`LineEmitter`] is the writer-side variant for in-process invocations: a
//! `Write` sink that buffers partial lines and emits one event per completed
//! line, flushing any unterminated remainder on close.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How often the coordinator re-checks the cancellation token while waiting.
pub(crate) const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Which stream a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

/// One completed output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    pub source: StreamSource,
    pub text: String,
}

/// Terminal state of a streamed process. Always the last event on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEnd {
    pub exit_code: Option<i32>,
    pub cancelled: bool,
    pub error: Option<String>,
}

/// Event delivered to the streaming consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Line(LineEvent),
    Finished(StreamEnd),
}

/// Error surfaced when a cancellation token stops an in-flight invocation.
#[derive(Debug, thiserror::Error)]
#[error("agent process cancelled")]
pub struct Cancelled;

/// Shared cancellation flag. Cloning hands out another handle to the same
/// flag; cancelling signals the observed process for termination. Best-effort:
/// the process is killed and reaped, but callers must not assume the kill is
/// synchronous.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Write sink that turns a byte stream into [`StreamEvent::Line`]s.
///
/// Partial lines are buffered until a `\n` arrives; a trailing `\r` is
/// stripped. Send failures are ignored: a dropped receiver means the consumer
/// stopped observing, which must not fail the producer.
pub struct LineEmitter {
    source: StreamSource,
    tx: Sender<StreamEvent>,
    buf: Vec<u8>,
}

impl LineEmitter {
    pub fn new(source: StreamSource, tx: Sender<StreamEvent>) -> Self {
        Self {
            source,
            tx,
            buf: Vec::new(),
        }
    }

    /// Flush a non-empty unterminated remainder as a final line.
    pub fn close(mut self) {
        if !self.buf.is_empty() {
            self.emit_buffered();
        }
    }

    fn emit_buffered(&mut self) {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        let _ = self.tx.send(StreamEvent::Line(LineEvent {
            source: self.source,
            text,
        }));
    }
}

impl Write for LineEmitter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        for &byte in data {
            if byte == b'\n' {
                self.emit_buffered();
            } else {
                self.buf.push(byte);
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Stream a started child's output as events, closing the channel after the
/// terminal event.
///
/// The child must have been spawned with piped stdout and stderr. Cancelling
/// `cancel` kills the process; the readers then drain to EOF and the terminal
/// event fires with `cancelled = true`, so the consumer's receive loop always
/// terminates.
pub fn stream_child(mut child: Child, cancel: CancelToken) -> Result<Receiver<StreamEvent>> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel();
    let stdout_tx = tx.clone();
    let stderr_tx = tx.clone();
    let stdout_reader = thread::spawn(move || forward_lines(stdout, StreamSource::Stdout, stdout_tx));
    let stderr_reader = thread::spawn(move || forward_lines(stderr, StreamSource::Stderr, stderr_tx));

    thread::spawn(move || {
        let mut cancelled = false;
        let exit = loop {
            if cancel.is_cancelled() {
                cancelled = true;
                debug!("cancellation requested, killing streamed process");
                if let Err(err) = child.kill() {
                    warn!(err = %err, "failed to kill streamed process");
                }
                break child.wait();
            }
            match child.wait_timeout(CANCEL_POLL_INTERVAL) {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(err) => break Err(err),
            }
        };

        // Both readers must drain to EOF before the terminal event, so no
        // buffered line can follow Finished.
        let _ = stdout_reader.join();
        let _ = stderr_reader.join();

        let end = match exit {
            Ok(status) => {
                let error = if cancelled {
                    Some(Cancelled.to_string())
                } else if status.success() {
                    None
                } else {
                    Some(format!("process exited with status {:?}", status.code()))
                };
                StreamEnd {
                    exit_code: status.code(),
                    cancelled,
                    error,
                }
            }
            Err(err) => StreamEnd {
                exit_code: None,
                cancelled,
                error: Some(err.to_string()),
            },
        };
        debug!(exit_code = ?end.exit_code, cancelled = end.cancelled, "stream finished");
        let _ = tx.send(StreamEvent::Finished(end));
        // tx drops here; with both reader senders already gone this closes
        // the channel.
    });

    Ok(rx)
}

fn forward_lines<R: Read>(reader: R, source: StreamSource, tx: Sender<StreamEvent>) {
    let mut emitter = LineEmitter::new(source, tx);
    let mut buf_reader = BufReader::new(reader);
    loop {
        let mut line = Vec::new();
        match buf_reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let _ = emitter.write_all(&line);
            }
            Err(err) => {
                warn!(source = source.as_str(), err = %err, "stream reader error");
                break;
            }
        }
    }
    emitter.close();
}

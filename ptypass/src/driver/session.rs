//! The relay loop of one session.
//!
//! A [`Session`] owns the child's pty for its whole lifetime. It forwards the
//! operator's input to the child, filters the child's output before relaying
//! or capturing it, answers recognized prompts through the [`Responder`], and
//! stops early when a failure signature shows up.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Instant;

use bytes::BytesMut;
use log::{debug, info, log_enabled, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::config::ExecOptions;
use super::outcome::{ExitOutcome, SessionResult};
use super::responder::{Reply, Responder};
use crate::channel::{OutputFilter, PtyProcess, RollingBuffer, is_hangup};
use crate::error::{Result, SessionError};

/// Largest single read from either side.
const CHUNK_SIZE: usize = 4096;

/// `log` target for the raw hex trace.
const TRACE_TARGET: &str = "ptypass::trace";

/// Future that resolves when the operator asks to stop.
type Interrupt = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Why the relay loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// The child closed its terminal.
    Closed,

    /// A failure signature was seen.
    AuthenticationFailed,

    /// The operator pressed Ctrl-C.
    Interrupted,
}

/// One running child and everything observed about it.
pub(crate) struct Session<'a, R, W> {
    process: PtyProcess,
    secret: &'a SecretString,
    options: &'a ExecOptions,
    responder: Responder,
    rolling: RollingBuffer,
    filter: OutputFilter,
    captured: BytesMut,
    input: Option<R>,
    output: W,
    interrupt: Interrupt,
}

impl<'a, R, W> Session<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        process: PtyProcess,
        secret: &'a SecretString,
        options: &'a ExecOptions,
        responder: Responder,
        filter: OutputFilter,
        input: Option<R>,
        output: W,
    ) -> Self {
        Self {
            process,
            secret,
            options,
            responder,
            rolling: RollingBuffer::default(),
            filter: filter.with_progress_lines_dropped(options.drop_progress_lines),
            captured: BytesMut::new(),
            input,
            output,
            interrupt: Box::pin(interrupt_signal(options.handle_interrupt)),
        }
    }

    /// Stop on `interrupt` instead of Ctrl-C.
    pub(crate) fn with_interrupt(mut self, interrupt: impl Future<Output = ()> + Send + 'static) -> Self {
        self.interrupt = Box::pin(interrupt);
        self
    }

    /// Relay until the child goes away, then collect its status.
    pub(crate) async fn run(mut self) -> Result<SessionResult> {
        let started = Instant::now();

        let stop = self.relay().await?;
        if stop == Stop::AuthenticationFailed {
            self.drain().await?;
        }

        let tail = self.filter.flush();
        self.emit(&tail).await?;

        let status = self.process.finish().await?;
        let outcome = match stop {
            Stop::Closed => ExitOutcome::from(status),
            Stop::AuthenticationFailed => ExitOutcome::AuthenticationFailed,
            Stop::Interrupted => ExitOutcome::Interrupted,
        };
        info!(
            "Session {} after {:?} ({} secret(s) sent)",
            outcome,
            started.elapsed(),
            self.responder.secrets_sent()
        );

        let output = self
            .options
            .capture_output
            .then(|| String::from_utf8_lossy(&self.captured).into_owned());

        Ok(SessionResult {
            outcome,
            output,
            secrets_sent: self.responder.secrets_sent(),
            host_key_answered: self.responder.host_key_answered(),
            elapsed: started.elapsed(),
        })
    }

    async fn relay(&mut self) -> Result<Stop> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut input_buf = vec![0u8; CHUNK_SIZE];

        loop {
            let idle_flush = self.filter.has_pending() && self.options.is_streaming();

            tokio::select! {
                _ = &mut self.interrupt => {
                    warn!("Interrupted; stopping session for '{}'", self.process.command());
                    return Ok(Stop::Interrupted);
                }

                read = read_input(&mut self.input, &mut input_buf) => match read {
                    Ok(0) => {
                        debug!("Operator input closed");
                        self.input = None;
                    }
                    Ok(n) => self.forward_input(&input_buf[..n]).await?,
                    Err(e) => {
                        warn!("Operator input failed, no longer forwarding: {}", e);
                        self.input = None;
                    }
                },

                read = self.process.read(&mut buf) => match read {
                    Ok(0) => return Ok(Stop::Closed),
                    Ok(n) => {
                        if self.handle_output(&buf[..n]).await? {
                            return Ok(Stop::AuthenticationFailed);
                        }
                    }
                    Err(e) if is_hangup(&e) => return Ok(Stop::Closed),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(SessionError::Read(e).into()),
                },

                _ = tokio::time::sleep(self.options.flush_interval), if idle_flush => {
                    let withheld = self.filter.flush();
                    self.emit(&withheld).await?;
                }
            }
        }
    }

    /// Keep relaying output for the grace period, without answering
    /// anything.
    async fn drain(&mut self) -> Result<()> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let deadline = tokio::time::sleep(self.options.failure_grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return Ok(()),

                read = self.process.read(&mut buf) => match read {
                    Ok(0) => return Ok(()),
                    Ok(n) => {
                        self.trace(&buf[..n]);
                        let relayed = self.filter.push(&buf[..n]);
                        self.emit(&relayed).await?;
                    }
                    Err(e) if is_hangup(&e) => return Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(SessionError::Read(e).into()),
                },
            }
        }
    }

    /// Filter, relay and classify one chunk of child output.
    ///
    /// Returns `true` once a failure signature has been seen.
    async fn handle_output(&mut self, chunk: &[u8]) -> Result<bool> {
        self.trace(chunk);

        let relayed = self.filter.push(chunk);
        self.emit(&relayed).await?;

        self.rolling.extend(chunk);
        let inspection = self.responder.inspect(&self.rolling.lowered());

        if let Some(reply) = inspection.reply {
            self.send_reply(&reply).await?;
            self.rolling.clear();
        }

        if let Some(failure) = inspection.failure {
            warn!(
                "Authentication failure reported by '{}': {}",
                self.process.command(),
                failure
            );
            return Ok(true);
        }

        Ok(false)
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<()> {
        let secret = self.secret;
        let payload: &[u8] = match reply {
            Reply::ConfirmHostKey => b"yes",
            Reply::Secret { .. } => secret.expose_secret().as_bytes(),
        };

        if reply.is_hidden() {
            debug!("Sending: ******** ({:?})", reply);
        } else {
            debug!("Sending: {}", String::from_utf8_lossy(payload));
        }

        self.write_to_child(payload).await?;
        self.write_to_child(b"\n").await
    }

    async fn forward_input(&mut self, data: &[u8]) -> Result<()> {
        self.write_to_child(data).await
    }

    async fn write_to_child(&mut self, data: &[u8]) -> Result<()> {
        match self.process.write_all(data).await {
            Ok(()) => Ok(()),
            // The child is gone; the read side will notice.
            Err(e) if is_hangup(&e) => {
                debug!("Write after hangup ignored");
                Ok(())
            }
            Err(e) => Err(SessionError::Write(e).into()),
        }
    }

    /// Relay filtered output to the operator, or collect it.
    async fn emit(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if self.options.capture_output {
            self.captured.extend_from_slice(data);
        }
        if self.options.is_streaming() {
            self.output
                .write_all(data)
                .await
                .map_err(SessionError::Output)?;
            self.output.flush().await.map_err(SessionError::Output)?;
        }
        Ok(())
    }

    fn trace(&self, chunk: &[u8]) {
        if self.options.verbose && log_enabled!(target: TRACE_TARGET, log::Level::Debug) {
            debug!(target: TRACE_TARGET, "read {} bytes: {}", chunk.len(), hex::encode(chunk));
        }
    }
}

async fn read_input<R: AsyncRead + Unpin>(
    input: &mut Option<R>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match input {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Resolves when the operator presses Ctrl-C; never resolves when disabled.
async fn interrupt_signal(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    use super::*;
    use crate::channel::PatternSet;
    use crate::driver::INTERRUPTED_CODE;

    #[tokio::test]
    async fn test_interrupt_stops_and_reaps_child() {
        let options = ExecOptions::captured().with_handle_interrupt(false);
        let secret = SecretString::from("unused".to_string());
        let patterns = Arc::new(PatternSet::default());

        let process =
            PtyProcess::spawn(&["/bin/sh", "-c", "echo started; sleep 5; echo finished"]).unwrap();
        let pid = Pid::from_raw(process.pid().unwrap());

        let session = Session::new(
            process,
            &secret,
            &options,
            Responder::new(Arc::clone(&patterns), options.max_retries),
            OutputFilter::new(patterns.filter_signatures()),
            None::<tokio::io::Empty>,
            tokio::io::sink(),
        )
        .with_interrupt(tokio::time::sleep(Duration::from_millis(300)));

        let result = session.run().await.unwrap();

        assert_eq!(result.outcome, ExitOutcome::Interrupted);
        assert_eq!(result.code(), INTERRUPTED_CODE);
        assert!(result.contains("started"));
        assert!(!result.contains("finished"));
        assert!(result.elapsed < Duration::from_secs(5));

        // Already waited for, so the pid no longer exists.
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }
}

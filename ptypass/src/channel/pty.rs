//! Child process supervision under a pseudo-terminal.
//!
//! [`PtyProcess`] forks a child whose stdin, stdout and stderr are the slave
//! side of a freshly allocated pty, and keeps the master side for the relay
//! loop. The master is switched to non-blocking mode and registered with the
//! tokio reactor so reads and writes can be awaited.
//!
//! Exec failures are reported through a close-on-exec pipe: the child writes
//! its errno into the pipe before exiting with [`EXEC_FAILURE_CODE`], while a
//! successful exec closes the pipe without writing anything.

#![allow(unsafe_code)]

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;

use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::libc;
use nix::pty::openpty;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, pipe2, setsid};
use tokio::io::unix::AsyncFd;

use crate::error::{SessionError, SpawnError};

/// Exit code of a child that could not exec its program.
pub const EXEC_FAILURE_CODE: i32 = 127;

/// How the child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// Normal exit with the given code.
    Exited(i32),

    /// Terminated by the given signal number.
    Signaled(i32),
}

/// A child process bound to a pseudo-terminal.
///
/// The master handle and the child pid are owned exclusively by this value.
/// [`finish`](Self::finish) releases the master and reaps the child; if the
/// value is dropped without finishing (an error path), `Drop` does the same
/// with a blocking wait. The child is never killed.
pub struct PtyProcess {
    /// Master side of the pty; `None` once released.
    master: Option<AsyncFd<File>>,

    /// Child pid; `None` once reaped.
    child: Option<Pid>,

    /// Printable command line, for diagnostics.
    command: String,
}

impl PtyProcess {
    /// Spawn `argv` under a new pseudo-terminal.
    ///
    /// `argv[0]` is resolved through `PATH`. Must be called from within a
    /// tokio runtime.
    pub fn spawn<S: AsRef<OsStr>>(argv: &[S]) -> Result<Self, SpawnError> {
        let args = to_cstrings(argv)?;
        let exec_args = exec_array(&args);
        let command = display_command(argv);

        let pty = openpty(None, None).map_err(SpawnError::PtyAllocation)?;
        // Keep both ends out of children spawned concurrently by other sessions.
        set_cloexec(&pty.master).map_err(SpawnError::Setup)?;
        set_cloexec(&pty.slave).map_err(SpawnError::Setup)?;
        let (status_rx, status_tx) = pipe2(OFlag::O_CLOEXEC).map_err(SpawnError::StatusPipe)?;

        // SAFETY: the child only performs async-signal-safe calls (close,
        // setsid, ioctl, dup2, execvp, write, _exit) before exec and does
        // not allocate; `exec_args` points into `args`, both built above.
        match unsafe { fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Child => exec_child(pty.master, pty.slave, status_tx, &exec_args),
            ForkResult::Parent { child } => {
                drop(pty.slave);
                drop(status_tx);

                if let Some(source) = read_exec_status(status_rx) {
                    // The child already exited with EXEC_FAILURE_CODE.
                    reap_abandoned(child, &command);
                    return Err(SpawnError::Exec { command, source });
                }

                let master = match register_master(pty.master) {
                    Ok(master) => master,
                    Err(source) => {
                        // The master is closed by now, which hangs up the child.
                        reap_abandoned(child, &command);
                        return Err(SpawnError::Setup(source));
                    }
                };

                debug!("Spawned '{}' under pty (pid {})", command, child);

                Ok(Self {
                    master: Some(master),
                    child: Some(child),
                    command,
                })
            }
        }
    }

    /// The child's process id.
    pub fn pid(&self) -> Option<i32> {
        self.child.map(Pid::as_raw)
    }

    /// The command line this process was started with.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Read whatever output is available from the child.
    ///
    /// Returns `Ok(0)` on end of file. Once the child closes its terminal,
    /// Linux reports `EIO`; see [`is_hangup`].
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let master = self.master()?;
        loop {
            let mut guard = master.readable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write all of `data` to the child's terminal input.
    pub async fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        let master = self.master()?;
        while !data.is_empty() {
            let mut guard = master.writable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.write(data)
            }) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => {}
            }
        }
        Ok(())
    }

    /// Release the master side and wait for the child to terminate.
    ///
    /// Closing the master hangs up the child's terminal; the wait itself
    /// blocks for as long as the child takes to exit.
    pub async fn finish(mut self) -> Result<ChildStatus, SessionError> {
        self.release_master();
        let Some(pid) = self.child.take() else {
            return Err(SessionError::Wait {
                pid: -1,
                source: Errno::ECHILD,
            });
        };

        let status = tokio::task::spawn_blocking(move || wait_for(pid)).await??;
        debug!("Child {} ({}) finished: {:?}", pid, self.command, status);
        Ok(status)
    }

    fn master(&self) -> io::Result<&AsyncFd<File>> {
        self.master
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "pty master released"))
    }

    fn release_master(&mut self) {
        if self.master.take().is_some() {
            trace!("Released pty master for '{}'", self.command);
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.release_master();
        if let Some(pid) = self.child.take() {
            warn!(
                "Session for '{}' ended abnormally; waiting for child {}",
                self.command, pid
            );
            if let Err(e) = wait_for(pid) {
                warn!("{}", e);
            }
        }
    }
}

/// Whether a read error means the child closed its terminal.
pub fn is_hangup(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EIO)
}

fn wait_for(pid: Pid) -> Result<ChildStatus, SessionError> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ChildStatus::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(ChildStatus::Signaled(signal as i32)),
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(source) => {
                return Err(SessionError::Wait {
                    pid: pid.as_raw(),
                    source,
                });
            }
        }
    }
}

fn to_cstrings<S: AsRef<OsStr>>(argv: &[S]) -> Result<Vec<CString>, SpawnError> {
    if argv.is_empty() {
        return Err(SpawnError::EmptyCommand);
    }
    argv.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            CString::new(arg.as_bytes())
                .map_err(|_| SpawnError::InvalidArgument(arg.to_string_lossy().into_owned()))
        })
        .collect()
}

fn display_command<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| arg.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}

/// Wait for a child the caller will not hand out.
fn reap_abandoned(child: Pid, command: &str) {
    match wait_for(child) {
        Ok(status) => debug!("Reaped '{}' (pid {}): {:?}", command, child, status),
        Err(e) => warn!("{}", e),
    }
}

/// Make the master non-blocking and register it with the reactor.
fn register_master(master: OwnedFd) -> io::Result<AsyncFd<File>> {
    let master = File::from(master);
    set_nonblocking(&master)?;
    AsyncFd::new(master)
}

/// NULL-terminated `argv` for `execvp`, pointing into `args`.
fn exec_array(args: &[CString]) -> Vec<*const libc::c_char> {
    args.iter()
        .map(|arg| arg.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    fcntl(
        fd,
        FcntlArg::F_SETFL(OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK),
    )?;
    Ok(())
}

/// Read the errno written by a child whose exec failed.
///
/// A successful exec closes the write end (close-on-exec), which reads as
/// end of file here.
fn read_exec_status(status_rx: OwnedFd) -> Option<io::Error> {
    let mut pipe = File::from(status_rx);
    let mut code = [0u8; 4];
    let mut filled = 0;
    while filled < code.len() {
        match pipe.read(&mut code[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    (filled == code.len()).then(|| io::Error::from_raw_os_error(i32::from_ne_bytes(code)))
}

/// Runs in the forked child; never returns.
fn exec_child(
    master: OwnedFd,
    slave: OwnedFd,
    status_tx: OwnedFd,
    args: &[*const libc::c_char],
) -> ! {
    drop(master);

    let slave_fd = slave.as_raw_fd();

    // SAFETY: plain syscalls on descriptors owned by this process; the child
    // exits through `_exit` on every failure path.
    unsafe {
        if setsid().is_err() {
            report_exec_failure(&status_tx, Errno::last() as i32);
        }

        // Some platforms make the slave the controlling terminal on open;
        // a failure here is not fatal.
        libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0);

        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(slave_fd, target) < 0 {
                report_exec_failure(&status_tx, Errno::last() as i32);
            }
        }
    }

    if slave_fd > libc::STDERR_FILENO {
        drop(slave);
    } else {
        std::mem::forget(slave);
    }

    // SAFETY: `args` is a NULL-terminated array of valid C strings that
    // outlive this call; execvp only returns on failure.
    unsafe {
        libc::execvp(args[0], args.as_ptr());
    }
    report_exec_failure(&status_tx, Errno::last() as i32)
}

fn report_exec_failure(status_tx: &OwnedFd, errno: i32) -> ! {
    let code = errno.to_ne_bytes();
    // SAFETY: writing a stack buffer to an owned pipe, then exiting without
    // running the parent's atexit handlers.
    unsafe {
        libc::write(status_tx.as_raw_fd(), code.as_ptr().cast(), code.len());
        libc::_exit(EXEC_FAILURE_CODE)
    }
}

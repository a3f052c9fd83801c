//! Process helpers shared by the relay supervisor.
//!
//! Child processes are created without a console window on Windows and, on
//! unix, as leaders of their own process group. Either way they are
//! terminated together with anything they spawned (the downloader starts its
//! own ffmpeg when seeking).

use std::ffi::OsStr;
use std::path::PathBuf;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
///
/// On unix the child leads a new process group so [`terminate_tree`] can
/// reach its descendants.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Resolve `program` the way a spawn would: an explicit path must exist and be
/// executable, a bare name is looked up on `PATH`.
pub fn resolve_program(program: impl AsRef<OsStr>) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Request termination of `child` and of every process it spawned.
///
/// This only issues the signal. The exit itself is observed through
/// `Child::wait`, which the caller keeps polling. Killing a child that has
/// already been reaped is not an error.
#[cfg(feature = "tokio")]
pub fn terminate_tree(child: &mut tokio::process::Child) -> std::io::Result<()> {
    #[cfg(windows)]
    if let Some(pid) = child.id() {
        // `/t` takes the whole tree down; the taskkill process itself is not awaited.
        let _ = std_command("taskkill")
            .args(["/pid", &pid.to_string(), "/f", "/t"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_process_group(pid)?;
    }

    match child.start_kill() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e),
    }
}

/// SIGKILL the process group led by `pid`. A group that is already gone is
/// not an error.
#[cfg(unix)]
fn kill_process_group(pid: u32) -> std::io::Result<()> {
    let pgid: libc::pid_t = pid
        .try_into()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: a negative pid addresses the process group, not a single process.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

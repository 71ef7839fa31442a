use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{Error, Result};
use std::os::fd::FromRawFd;
use std::os::unix::ffi::OsStrExt;
use std::ptr;

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

pub fn fork() -> Result<u32> {
    check_err(unsafe { libc::fork() }).map(|pid| pid as u32)
}

fn os_to_cstring(s: &OsStr) -> Result<CString> {
    let bytes = s.as_bytes();
    if bytes.iter().any(|&b| b == 0) {
        return Err(Error::from_raw_os_error(libc::EINVAL));
    }
    Ok(CString::new(bytes)
        // not expected to fail on Unix, as Unix paths *are* C strings
        .expect("converting Unix string to C string"))
}

fn cstring_ptr(s: &CString) -> *const libc::c_char {
    s.as_bytes_with_nul().as_ptr() as _
}

pub fn execvp<S1, S2>(cmd: S1, args: &[S2]) -> Result<()>
where
    S1: AsRef<OsStr>,
    S2: AsRef<OsStr>,
{
    let args_cstring: Vec<CString> = args
        .iter()
        .map(|x| os_to_cstring(x.as_ref()))
        .collect::<Result<_>>()?;
    let mut args_ptr: Vec<*const libc::c_char> = args_cstring.iter().map(cstring_ptr).collect();
    args_ptr.push(ptr::null());

    let cmd_cstring = os_to_cstring(cmd.as_ref())?;
    check_err(unsafe { libc::execvp(cstring_ptr(&cmd_cstring), args_ptr.as_ptr()) })?;

    Ok(())
}

pub fn chdir(path: &OsStr) -> Result<()> {
    let path = os_to_cstring(path)?;
    check_err(unsafe { libc::chdir(cstring_ptr(&path)) })?;
    Ok(())
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

pub fn close(fd: i32) -> Result<()> {
    check_err(unsafe { libc::close(fd) })?;
    Ok(())
}

pub fn dup2(oldfd: i32, newfd: i32) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

pub const WNOHANG: i32 = libc::WNOHANG;

pub fn waitpid(pid: u32, flags: i32) -> Result<(u32, ExitStatus)> {
    let mut status = 0 as libc::c_int;
    let pid = check_err(unsafe {
        libc::waitpid(
            pid as libc::pid_t,
            &mut status as *mut libc::c_int,
            flags as libc::c_int,
        )
    })?;
    Ok((pid as u32, decode_exit_status(status)))
}

fn decode_exit_status(status: i32) -> ExitStatus {
    if libc::WIFEXITED(status) {
        ExitStatus::Exited(libc::WEXITSTATUS(status) as u32)
    } else if libc::WIFSIGNALED(status) {
        ExitStatus::Signaled(libc::WTERMSIG(status) as u8)
    } else {
        ExitStatus::Other(status)
    }
}

/// Exit status of a reaped child process.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ExitStatus {
    /// The child exited normally with the given exit code.
    Exited(u32),
    /// The child was terminated by the given signal.
    Signaled(u8),
    /// Other possibilities - see waitpid(2).
    Other(i32),
}

impl ExitStatus {
    /// True if the child exited normally with a zero exit code.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

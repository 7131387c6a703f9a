//! Scoped redirection of the process stdout/stderr to the null device.
//!
//! Works at the file-descriptor level so output written by native code inside
//! a model fit is silenced too. Descriptors are restored when the guard drops,
//! which covers early returns, `?` propagation and unwinding.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

/// fd 1/2 are process-wide; two overlapping guards would restore each other's
/// saved descriptors in the wrong order, so guards are serialized.
static REDIRECT_LOCK: Mutex<()> = Mutex::new(());

pub struct OutputSilencer {
    #[cfg(unix)]
    saved: [libc::c_int; 2],
    _lock: MutexGuard<'static, ()>,
}

#[cfg(unix)]
const TARGETS: [libc::c_int; 2] = [libc::STDOUT_FILENO, libc::STDERR_FILENO];

impl OutputSilencer {
    #[cfg(unix)]
    pub fn new() -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        let lock = REDIRECT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        flush_std();

        let devnull = std::fs::OpenOptions::new().write(true).open("/dev/null")?;
        let null_fd = devnull.as_raw_fd();

        let mut saved = [-1; 2];
        for (i, &fd) in TARGETS.iter().enumerate() {
            // SAFETY: plain descriptor duplication on descriptors we own or that
            // the process always has open; results are checked below.
            let copy = unsafe { libc::dup(fd) };
            if copy < 0 {
                let err = io::Error::last_os_error();
                restore(&saved);
                return Err(err);
            }
            saved[i] = copy;
            if unsafe { libc::dup2(null_fd, fd) } < 0 {
                let err = io::Error::last_os_error();
                restore(&saved);
                return Err(err);
            }
        }

        Ok(Self { saved, _lock: lock })
    }

    #[cfg(not(unix))]
    pub fn new() -> io::Result<Self> {
        let lock = REDIRECT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Self { _lock: lock })
    }
}

impl Drop for OutputSilencer {
    fn drop(&mut self) {
        // Anything still buffered belongs to the silenced section.
        flush_std();
        #[cfg(unix)]
        restore(&self.saved);
    }
}

fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(unix)]
fn restore(saved: &[libc::c_int; 2]) {
    for (&fd, &copy) in TARGETS.iter().zip(saved) {
        if copy >= 0 {
            // SAFETY: `copy` was returned by dup() and is closed exactly once here.
            unsafe {
                libc::dup2(copy, fd);
                libc::close(copy);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn identity(fd: libc::c_int) -> (u64, u64) {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::fstat(fd, &mut st) }, 0);
        (st.st_dev as u64, st.st_ino as u64)
    }

    fn devnull_identity() -> (u64, u64) {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let path = std::ffi::CString::new("/dev/null").unwrap();
        assert_eq!(unsafe { libc::stat(path.as_ptr(), &mut st) }, 0);
        (st.st_dev as u64, st.st_ino as u64)
    }

    /// Read while no guard can be active anywhere in the process.
    fn settled() -> ((u64, u64), (u64, u64)) {
        let _lock = REDIRECT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        (identity(1), identity(2))
    }

    #[test]
    fn redirects_and_restores_descriptors() {
        let before = settled();
        {
            let _quiet = OutputSilencer::new().unwrap();
            assert_eq!(identity(1), devnull_identity());
            assert_eq!(identity(2), devnull_identity());
        }
        assert_eq!(settled(), before);
    }

    #[test]
    fn restores_when_the_scope_errors() {
        fn failing_fit() -> Result<(), String> {
            let _quiet = OutputSilencer::new().map_err(|e| e.to_string())?;
            Err("fit exploded".to_string())
        }
        let before = settled();
        assert!(failing_fit().is_err());
        assert_eq!(settled(), before);
    }
}

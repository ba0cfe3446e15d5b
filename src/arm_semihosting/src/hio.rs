//! Host I/O
use core::{ffi::CStr, fmt};

use crate::fs::{self, mode, Handle, WriteStatus};

/// A byte stream to the host (e.g., host's stdout or stderr).
#[derive(Clone, Copy)]
pub struct HostStream {
    handle: Handle,
}

impl HostStream {
    /// Gets the handle of the underlying host file.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Attempts to write an entire `buffer` into this sink.
    ///
    /// This issues exactly one `SYS_WRITE`. If the host accepts only a part of
    /// `buffer`, the rest is dropped and `Err(())` is returned.
    pub fn write_all(&mut self, buffer: &[u8]) -> Result<(), ()> {
        match WriteStatus::from_reply(buffer.len(), fs::write(self.handle, buffer)) {
            WriteStatus::Complete => Ok(()),
            WriteStatus::Partial { .. } | WriteStatus::Failed(_) => Err(()),
        }
    }
}

impl fmt::Write for HostStream {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Construct a new handle to the host's standard error.
pub fn hstderr() -> Result<HostStream, ()> {
    // There is actually no stderr access in ARM Semihosting documentation. Use
    // convention used in libgloss.
    // See: libgloss/arm/syscalls.c, line 139.
    // https://sourceware.org/git/gitweb.cgi?p=newlib-cygwin.git;a=blob;f=libgloss/arm/syscalls.c#l139
    open(c":tt", mode::APPEND)
}

/// Construct a new handle to the host's standard output.
pub fn hstdout() -> Result<HostStream, ()> {
    open(c":tt", mode::WDONLY)
}

fn open(name: &CStr, mode: usize) -> Result<HostStream, ()> {
    match fs::open(name, mode) {
        fs::FAILURE => Err(()),
        handle => Ok(HostStream { handle }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nr, sim};
    use core::fmt::Write;

    #[test]
    fn stdout_and_stderr_use_the_console() {
        let stdout = hstdout().unwrap();
        assert_eq!(sim::last_opened_path(), ":tt");
        assert_eq!(sim::last_call().block[1], mode::WDONLY);

        let stderr = hstderr().unwrap();
        assert_eq!(sim::last_opened_path(), ":tt");
        assert_eq!(sim::last_call().block[1], mode::APPEND);

        assert_ne!(stdout.handle(), stderr.handle());
    }

    #[test]
    fn formatted_output() {
        let mut stdout = hstdout().unwrap();
        writeln!(stdout, "Success in opening-file call: {}", 3).unwrap();
        stdout.write_all(b"done\n").unwrap();

        assert_eq!(sim::console(), b"Success in opening-file call: 3\ndone\n");
    }

    #[test]
    fn one_write_per_call() {
        let mut stdout = hstdout().unwrap();
        stdout.write_all(b"!- DEMO WAS SUCCESSFUL -!\n").unwrap();

        let writes = sim::with_host(|host| {
            host.calls.iter().filter(|c| c.nr == nr::WRITE).count()
        });
        assert_eq!(writes, 1);
    }

    #[test]
    fn partial_write_is_an_error() {
        sim::add_file("input.txt", b"");
        let mut stream = open(c"input.txt", mode::RDONLY).unwrap();
        assert_eq!(stream.write_all(b"rejected"), Err(()));
        assert_eq!(stream.write_str("rejected"), Err(fmt::Error));
    }
}

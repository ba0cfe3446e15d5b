//! File operations on the host file system
//!
//! Each function builds the argument block of one semihosting operation on
//! the stack, traps to the host, and returns the host's reply unchanged. The
//! meaning of the reply is operation-specific; [`ReadStatus`] and
//! [`WriteStatus`] decode the replies of [`read`] and [`write`].
//!
//! Nothing is validated locally. Handles are only meaningful to the host, and
//! pairing every [`open`] with a [`close`] is up to the caller.
use core::ffi::CStr;

use crate::nr;

/// An opaque identifier of a file opened on the host.
pub type Handle = isize;

/// The reply of [`open`] and [`close`] indicating a failure.
pub const FAILURE: isize = -1;

/// Open modes accepted by [`open`]
///
/// The values follow the host's mode encoding (an index into the ISO C
/// `fopen` mode strings), not any general file-mode standard.
pub mod mode {
    /// `r`: read only
    pub const RDONLY: usize = 0;
    /// `r+`: read and write
    pub const RDWR: usize = 2;
    /// `w`: create the file or discard its old contents, and write only
    pub const WDONLY: usize = 4;
    /// The same value as [`WDONLY`]
    pub const CREAT: usize = 4;
    /// `a`: append at the end of the file
    pub const APPEND: usize = 8;
}

/// Opens a file on the host.
///
/// Returns a nonzero handle on success, or [`FAILURE`] (`-1`).
pub fn open(path: &CStr, mode: usize) -> Handle {
    // [path, mode, length of `path` excluding the terminator]
    let block: [usize; 3] = [path.as_ptr() as usize, mode, path.to_bytes().len()];
    // Safety: The host reads at most `block[2] + 1` bytes from `block[0]`,
    //         all of which belong to `path`.
    unsafe { crate::syscall(nr::OPEN, &block) as isize }
}

/// Closes a file on the host.
///
/// Returns `0` on success, or [`FAILURE`] (`-1`).
pub fn close(handle: Handle) -> isize {
    // [handle]
    let block: [usize; 1] = [handle as usize];
    // Safety: No memory is referenced by the argument block
    unsafe { crate::syscall(nr::CLOSE, &block) as isize }
}

/// Reads up to `buffer.len()` bytes from a file on the host.
///
/// Returns the number of bytes *not* read; see [`ReadStatus::from_reply`].
pub fn read(handle: Handle, buffer: &mut [u8]) -> isize {
    // [handle, buffer address, requested byte count]
    let block: [usize; 3] = [handle as usize, buffer.as_mut_ptr() as usize, buffer.len()];
    // Safety: The host writes at most `block[2]` bytes to `block[0]`, all of
    //         which belong to `buffer`.
    unsafe { crate::syscall(nr::READ, &block) as isize }
}

/// Writes `buffer` to a file on the host.
///
/// Returns the number of bytes *not* written; see [`WriteStatus::from_reply`].
pub fn write(handle: Handle, buffer: &[u8]) -> isize {
    // [handle, buffer address, byte count]
    let block: [usize; 3] = [handle as usize, buffer.as_ptr() as usize, buffer.len()];
    // Safety: The host reads at most `block[2]` bytes from `block[1]`, all of
    //         which belong to `buffer`.
    unsafe { crate::syscall(nr::WRITE, &block) as isize }
}

/// The outcome of [`read`], decoded from the host's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The buffer was filled.
    Complete,
    /// Only the first `read` bytes of the buffer were filled.
    Short {
        /// The number of bytes transferred
        read: usize,
    },
    /// The end of the file was reached; nothing was transferred.
    EndOfFile,
    /// The reply is outside `0..=count`.
    Failed(isize),
}

impl ReadStatus {
    /// Decode the reply of a [`read`] call that requested `count` bytes.
    ///
    /// A zero-byte request replying `0` is `Complete`.
    pub fn from_reply(count: usize, reply: isize) -> Self {
        match usize::try_from(reply) {
            Ok(0) => Self::Complete,
            Ok(not_read) if not_read == count => Self::EndOfFile,
            Ok(not_read) if not_read < count => Self::Short {
                read: count - not_read,
            },
            _ => Self::Failed(reply),
        }
    }

    /// Get the number of bytes transferred, given the requested `count`.
    pub fn bytes_read(self, count: usize) -> usize {
        match self {
            Self::Complete => count,
            Self::Short { read } => read,
            Self::EndOfFile | Self::Failed(_) => 0,
        }
    }
}

/// The outcome of [`write`], decoded from the host's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The whole buffer was accepted.
    Complete,
    /// The last `not_written` bytes of the buffer were not accepted.
    Partial {
        /// The number of bytes that could not be written
        not_written: usize,
    },
    /// The reply is outside `0..=count`.
    Failed(isize),
}

impl WriteStatus {
    /// Decode the reply of a [`write`] call that tried to write `count` bytes.
    pub fn from_reply(count: usize, reply: isize) -> Self {
        match usize::try_from(reply) {
            Ok(0) => Self::Complete,
            Ok(not_written) if not_written <= count => Self::Partial { not_written },
            _ => Self::Failed(reply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim;

    #[test]
    fn write_only_and_create_are_the_same_mode() {
        assert_eq!(mode::WDONLY, mode::CREAT);
        assert_eq!(
            [mode::RDONLY, mode::RDWR, mode::WDONLY, mode::APPEND],
            [0, 2, 4, 8]
        );
    }

    #[test]
    fn open_then_close() {
        sim::add_file("test.dat", b"hello");

        let handle = open(c"test.dat", mode::RDWR);
        assert_ne!(handle, FAILURE);
        assert_ne!(handle, 0);
        assert_eq!(close(handle), 0);
    }

    #[test]
    fn open_nonexistent_read_only() {
        assert_eq!(open(c"no_such_file", mode::RDONLY), FAILURE);
        assert_eq!(open(c"no_such_file", mode::RDWR), FAILURE);
    }

    #[test]
    fn open_block_layout() {
        for path in [c"", c"a", c"test.dat", c"data/semihost_demo.log"] {
            let handle = open(path, mode::WDONLY);
            assert_ne!(handle, FAILURE);

            let call = sim::last_call();
            assert_eq!(call.nr, nr::OPEN);
            assert_eq!(
                call.block,
                [path.as_ptr() as usize, mode::WDONLY, path.to_bytes().len()]
            );
            assert_eq!(sim::last_opened_path(), path.to_str().unwrap());

            assert_eq!(close(handle), 0);
        }
    }

    #[test]
    fn close_block_layout() {
        sim::add_file("test.dat", b"");
        let handle = open(c"test.dat", mode::RDONLY);
        close(handle);

        let call = sim::last_call();
        assert_eq!(call.nr, nr::CLOSE);
        assert_eq!(call.block, [handle as usize]);
    }

    #[test]
    fn close_twice() {
        sim::add_file("test.dat", b"");
        let handle = open(c"test.dat", mode::RDONLY);
        assert_eq!(close(handle), 0);
        assert_eq!(close(handle), FAILURE);
    }

    #[test]
    fn handles_are_distinct() {
        sim::add_file("a", b"");
        sim::add_file("b", b"");
        let a = open(c"a", mode::RDONLY);
        let b = open(c"b", mode::RDONLY);
        assert_ne!(a, b);
        close(a);
        close(b);
    }

    #[test]
    fn write_then_read_after_reopen() {
        let payload = b"semihosting round trip\n";

        let handle = open(c"out.bin", mode::WDONLY);
        assert_eq!(write(handle, payload), 0);

        let call = sim::last_call();
        assert_eq!(call.nr, nr::WRITE);
        assert_eq!(
            call.block,
            [handle as usize, payload.as_ptr() as usize, payload.len()]
        );
        assert_eq!(close(handle), 0);
        assert_eq!(sim::file_contents("out.bin").unwrap(), payload);

        let handle = open(c"out.bin", mode::RDONLY);
        let mut buffer = [0u8; 23];
        assert_eq!(read(handle, &mut buffer), 0);
        assert_eq!(&buffer, payload);

        let call = sim::last_call();
        assert_eq!(call.nr, nr::READ);
        assert_eq!(
            call.block,
            [handle as usize, buffer.as_ptr() as usize, buffer.len()]
        );

        // Nothing more to read
        assert_eq!(read(handle, &mut buffer), buffer.len() as isize);
        assert_eq!(close(handle), 0);
    }

    #[test]
    fn write_create_truncates() {
        sim::add_file("out.bin", b"old contents");

        let handle = open(c"out.bin", mode::CREAT);
        assert_eq!(write(handle, b"new"), 0);
        close(handle);

        assert_eq!(sim::file_contents("out.bin").unwrap(), b"new");
    }

    #[test]
    fn append() {
        sim::add_file("log.txt", b"one\n");

        let handle = open(c"log.txt", mode::APPEND);
        assert_eq!(write(handle, b"two\n"), 0);
        close(handle);

        assert_eq!(sim::file_contents("log.txt").unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn read_write_mode_overwrites_in_place() {
        sim::add_file("test.dat", b"abcdef");

        let handle = open(c"test.dat", mode::RDWR);
        let mut buffer = [0u8; 2];
        assert_eq!(read(handle, &mut buffer), 0);
        assert_eq!(&buffer, b"ab");
        assert_eq!(write(handle, b"XY"), 0);
        close(handle);

        assert_eq!(sim::file_contents("test.dat").unwrap(), b"abXYef");
    }

    #[test]
    fn short_read_then_end_of_file() {
        sim::add_file("test.dat", b"12345");

        let handle = open(c"test.dat", mode::RDONLY);
        let mut buffer = [0u8; 8];

        let reply = read(handle, &mut buffer);
        assert_eq!(reply, 3);
        assert_eq!(
            ReadStatus::from_reply(buffer.len(), reply),
            ReadStatus::Short { read: 5 }
        );
        assert_eq!(&buffer[..5], b"12345");

        let reply = read(handle, &mut buffer);
        assert_eq!(reply, buffer.len() as isize);
        assert_eq!(
            ReadStatus::from_reply(buffer.len(), reply),
            ReadStatus::EndOfFile
        );
        close(handle);
    }

    #[test]
    fn read_reply_is_within_requested_count() {
        sim::add_file("test.dat", &[0x5a; 37]);

        for count in [0, 1, 10, 36, 37, 38, 100] {
            let handle = open(c"test.dat", mode::RDONLY);
            let mut buffer = vec![0u8; count];
            for _ in 0..3 {
                let reply = read(handle, &mut buffer);
                assert!(
                    (0..=count as isize).contains(&reply),
                    "count = {count}, reply = {reply}"
                );
            }
            close(handle);
        }
    }

    #[test]
    fn write_to_read_only_handle() {
        sim::add_file("test.dat", b"abc");

        let handle = open(c"test.dat", mode::RDONLY);
        let reply = write(handle, b"xyz!");
        assert_eq!(reply, 4);
        assert_eq!(
            WriteStatus::from_reply(4, reply),
            WriteStatus::Partial { not_written: 4 }
        );
        close(handle);

        assert_eq!(sim::file_contents("test.dat").unwrap(), b"abc");
    }

    #[test]
    fn read_status_from_reply() {
        assert_eq!(ReadStatus::from_reply(0, 0), ReadStatus::Complete);
        assert_eq!(ReadStatus::from_reply(4, 0), ReadStatus::Complete);
        assert_eq!(ReadStatus::from_reply(4, 1), ReadStatus::Short { read: 3 });
        assert_eq!(ReadStatus::from_reply(4, 4), ReadStatus::EndOfFile);
        assert_eq!(ReadStatus::from_reply(4, 5), ReadStatus::Failed(5));
        assert_eq!(ReadStatus::from_reply(4, -1), ReadStatus::Failed(-1));

        assert_eq!(ReadStatus::Complete.bytes_read(4), 4);
        assert_eq!(ReadStatus::Short { read: 3 }.bytes_read(4), 3);
        assert_eq!(ReadStatus::EndOfFile.bytes_read(4), 0);
    }

    #[test]
    fn write_status_from_reply() {
        assert_eq!(WriteStatus::from_reply(4, 0), WriteStatus::Complete);
        assert_eq!(
            WriteStatus::from_reply(4, 4),
            WriteStatus::Partial { not_written: 4 }
        );
        assert_eq!(WriteStatus::from_reply(4, 5), WriteStatus::Failed(5));
        assert_eq!(WriteStatus::from_reply(4, -1), WriteStatus::Failed(-1));
    }
}

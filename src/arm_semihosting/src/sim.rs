//! A simulated debug host servicing semihosting calls in unit tests
//!
//! Argument blocks are read from raw addresses, the way a real host reads
//! them out of target memory, and every call is recorded. Each test thread
//! gets its own host.
use std::{cell::RefCell, collections::HashMap};

use crate::nr;

/// The special path naming the host console
const CONSOLE: &str = ":tt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub nr: usize,
    /// The argument block as the host read it. For operations that take an
    /// immediate argument, this holds that one word.
    pub block: Vec<usize>,
}

struct OpenFile {
    path: String,
    pos: usize,
    readable: bool,
    writable: bool,
    append: bool,
}

#[derive(Default)]
pub(crate) struct Host {
    pub files: HashMap<String, Vec<u8>>,
    pub console: Vec<u8>,
    pub calls: Vec<Call>,
    pub opened_paths: Vec<String>,
    pub exit_reason: Option<usize>,
    open_files: HashMap<isize, OpenFile>,
    last_handle: isize,
}

thread_local! {
    static HOST: RefCell<Host> = RefCell::new(Host::default());
}

pub(crate) fn with_host<R>(f: impl FnOnce(&mut Host) -> R) -> R {
    HOST.with(|host| f(&mut host.borrow_mut()))
}

pub(crate) fn add_file(path: &str, contents: &[u8]) {
    with_host(|host| host.files.insert(path.to_owned(), contents.to_vec()));
}

pub(crate) fn file_contents(path: &str) -> Option<Vec<u8>> {
    with_host(|host| host.files.get(path).cloned())
}

pub(crate) fn console() -> Vec<u8> {
    with_host(|host| host.console.clone())
}

pub(crate) fn last_call() -> Call {
    with_host(|host| host.calls.last().cloned()).expect("no calls were made")
}

pub(crate) fn last_opened_path() -> String {
    with_host(|host| host.opened_paths.last().cloned()).expect("no files were opened")
}

/// Service the semihosting operation `nr` with the argument `arg`.
///
/// # Safety
///
/// `arg` must be a valid argument block for `nr`, as the real host would
/// require.
pub(crate) unsafe fn service(nr: usize, arg: usize) -> usize {
    with_host(|host| unsafe { host.service(nr, arg) }) as usize
}

unsafe fn read_block<const N: usize>(address: usize) -> [usize; N] {
    unsafe { (address as *const [usize; N]).read() }
}

impl Host {
    unsafe fn service(&mut self, nr: usize, arg: usize) -> isize {
        match nr {
            nr::OPEN => {
                let block = unsafe { read_block::<3>(arg) };
                self.record(nr, &block);
                let path =
                    unsafe { std::slice::from_raw_parts(block[0] as *const u8, block[2]) };
                // The path must be terminated even though its length is given
                assert_eq!(unsafe { *(block[0] as *const u8).add(block[2]) }, 0);
                self.open(String::from_utf8_lossy(path).into_owned(), block[1])
            }
            nr::CLOSE => {
                let block = unsafe { read_block::<1>(arg) };
                self.record(nr, &block);
                match self.open_files.remove(&(block[0] as isize)) {
                    Some(_) => 0,
                    None => -1,
                }
            }
            nr::WRITE => {
                let block = unsafe { read_block::<3>(arg) };
                self.record(nr, &block);
                let data =
                    unsafe { std::slice::from_raw_parts(block[1] as *const u8, block[2]) };
                self.write(block[0] as isize, data)
            }
            nr::READ => {
                let block = unsafe { read_block::<3>(arg) };
                self.record(nr, &block);
                let buffer =
                    unsafe { std::slice::from_raw_parts_mut(block[1] as *mut u8, block[2]) };
                self.read(block[0] as isize, buffer)
            }
            nr::EXIT => {
                self.record(nr, &[arg]);
                self.exit_reason = Some(arg);
                0
            }
            _ => {
                self.record(nr, &[arg]);
                -1
            }
        }
    }

    fn record(&mut self, nr: usize, block: &[usize]) {
        self.calls.push(Call {
            nr,
            block: block.to_vec(),
        });
    }

    fn open(&mut self, path: String, mode: usize) -> isize {
        self.opened_paths.push(path.clone());

        // The lowest bit selects binary mode, which makes no difference here
        let (readable, writable, create, truncate, append) = match mode & !1 {
            0 => (true, false, false, false, false),
            2 => (true, true, false, false, false),
            4 => (false, true, true, true, false),
            6 => (true, true, true, true, false),
            8 => (false, true, true, false, true),
            10 => (true, true, true, false, true),
            _ => return -1,
        };

        if path != CONSOLE {
            match self.files.get_mut(&path) {
                Some(contents) if truncate => contents.clear(),
                Some(_) => {}
                None if create => {
                    self.files.insert(path.clone(), Vec::new());
                }
                None => return -1,
            }
        }

        self.last_handle += 1;
        self.open_files.insert(
            self.last_handle,
            OpenFile {
                path,
                pos: 0,
                readable,
                writable,
                append,
            },
        );
        self.last_handle
    }

    /// Returns the number of bytes not written.
    fn write(&mut self, handle: isize, data: &[u8]) -> isize {
        let Some(file) = self.open_files.get_mut(&handle).filter(|f| f.writable) else {
            return data.len() as isize;
        };

        if file.path == CONSOLE {
            self.console.extend_from_slice(data);
            return 0;
        }

        let contents = self.files.entry(file.path.clone()).or_default();
        if file.append {
            file.pos = contents.len();
        }
        let end = file.pos + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[file.pos..end].copy_from_slice(data);
        file.pos = end;
        0
    }

    /// Returns the number of bytes not read.
    fn read(&mut self, handle: isize, buffer: &mut [u8]) -> isize {
        let Some(file) = self.open_files.get_mut(&handle).filter(|f| f.readable) else {
            return buffer.len() as isize;
        };

        // The console has no input
        let contents = self.files.get(&file.path).map_or(&[][..], |c| &c[..]);
        let available = contents.get(file.pos..).unwrap_or(&[]);
        let num_read = available.len().min(buffer.len());
        buffer[..num_read].copy_from_slice(&available[..num_read]);
        file.pos += num_read;
        (buffer.len() - num_read) as isize
    }
}

//! Accesses files on the host through semihosting.
//!
//! Run this with `semihost_runner`, which builds it for the selected target,
//! prepares a working directory containing `test.dat`, and starts QEMU with
//! semihosting enabled.
#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod logger_semihosting;
#[cfg(target_os = "none")]
mod panic_semihosting;

#[cfg(target_os = "none")]
mod app {
    use arm_semihosting::{
        debug,
        fs::{self, mode, ReadStatus, WriteStatus},
        hprintln,
    };
    use core::ffi::CStr;

    /// A file supplied by the host
    const TEST_FILE: &CStr = c"test.dat";

    /// A file created by the round trip
    const OUTPUT_FILE: &CStr = c"semihost_demo.out";

    /// A file that must not exist on the host
    const MISSING_FILE: &CStr = c"semihost_demo.missing";

    const PAYLOAD: &[u8] = b"Written by the target through SYS_WRITE.\n";

    #[cortex_m_rt::entry]
    fn main() -> ! {
        crate::logger_semihosting::init();

        open_and_close(TEST_FILE);
        round_trip(OUTPUT_FILE);
        open_missing(MISSING_FILE);

        // The runner will catch this
        let _ = hprintln!("!- DEMO WAS SUCCESSFUL -!");
        debug::exit(debug::EXIT_SUCCESS);

        loop {}
    }

    /// Open `path` for reading and writing and close it again, reporting the
    /// host's replies.
    fn open_and_close(path: &CStr) {
        let handle = fs::open(path, mode::RDWR);
        if handle == fs::FAILURE {
            let _ = hprintln!("Failed in opening-file call");
        } else {
            let _ = hprintln!("Success in opening-file call: {}", handle);
            let result = fs::close(handle);
            let _ = hprintln!("{}", result);
        }
    }

    /// Write [`PAYLOAD`] to `path`, then reopen it and read it back.
    fn round_trip(path: &CStr) {
        let handle = fs::open(path, mode::WDONLY);
        assert_ne!(handle, fs::FAILURE, "could not create {:?}", path);

        let reply = fs::write(handle, PAYLOAD);
        assert_eq!(
            WriteStatus::from_reply(PAYLOAD.len(), reply),
            WriteStatus::Complete,
            "short write to {:?}",
            path
        );
        assert_eq!(fs::close(handle), 0);
        log::info!("Wrote {} bytes to {:?}", PAYLOAD.len(), path);

        let handle = fs::open(path, mode::RDONLY);
        assert_ne!(handle, fs::FAILURE, "could not reopen {:?}", path);

        let mut buffer = [0u8; PAYLOAD.len()];
        let status = ReadStatus::from_reply(buffer.len(), fs::read(handle, &mut buffer));
        assert_eq!(status, ReadStatus::Complete);
        assert_eq!(&buffer[..], PAYLOAD, "{:?} has unexpected contents", path);

        // The file is exhausted
        let status = ReadStatus::from_reply(buffer.len(), fs::read(handle, &mut buffer));
        assert_eq!(status, ReadStatus::EndOfFile);

        assert_eq!(fs::close(handle), 0);
        log::info!("Read {} bytes back from {:?}", PAYLOAD.len(), path);
    }

    fn open_missing(path: &CStr) {
        let handle = fs::open(path, mode::RDONLY);
        log::debug!("Opening {:?} returned {}", path, handle);
        assert_eq!(handle, fs::FAILURE, "{:?} unexpectedly exists", path);
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    panic!("This executable should not be invoked directly");
}

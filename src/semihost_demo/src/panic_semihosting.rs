use arm_semihosting::{debug, debug::EXIT_FAILURE, hio};
use arrayvec::ArrayString;
use core::{arch::asm, fmt::Write, panic::PanicInfo};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // Disable interrupts
    unsafe { asm!("cpsid i") };

    if let Ok(mut hstdout) = hio::hstdout() {
        // The runner stops reading the output when it encounters a stop word
        // (`panicked at`). Actually it continues reading for some time, but
        // semihosting output incurs a huge delay on each call and the
        // `Display` implementation of `PanicInfo` produces a message in small
        // chunks, so the runner would stop reading after the first chunk.
        //
        // To avoid this problem, put the whole message in a buffer and send it
        // with a single semihosting call.
        let mut buffer = ArrayString::<512>::new();
        let _ = writeln!(buffer, "{}", info);

        let _ = hstdout.write_all(buffer.as_bytes());
    }
    debug::exit(EXIT_FAILURE);

    loop {}
}

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        // There is nowhere else to report a failure to
        let _ = arm_semihosting::heprintln!(
            "[{level:5} {target}] {args}",
            level = record.level(),
            target = record.target(),
            args = record.args()
        );
    }

    fn flush(&self) {}
}

pub fn init() {
    // Note: Armv6-M and Armv8-M Baseline don't support CAS atomics. This is
    //       why we need to use `set_logger_racy` here.
    // Safety: There are no other threads calling `set_logger_racy` at the
    //         same time.
    if unsafe { log::set_logger_racy(&Logger) }.is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}

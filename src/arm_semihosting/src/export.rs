//! IMPLEMENTATION DETAILS USED BY MACROS

use core::{
    cell::UnsafeCell,
    fmt::{self, Write},
};

use crate::hio::{self, HostStream};

/// A lazily opened console stream. Only accessed in [`interrupt_free`].
struct StreamCell(UnsafeCell<Option<HostStream>>);

// Safety: Accesses are serialized by `interrupt_free`, and there is only one
//         processor.
unsafe impl Sync for StreamCell {}

static HSTDOUT: StreamCell = StreamCell(UnsafeCell::new(None));
static HSTDERR: StreamCell = StreamCell(UnsafeCell::new(None));

#[cfg(thumb)]
fn interrupt_free<R>(f: impl FnOnce() -> R) -> R {
    use core::arch::asm;
    let primask_old: u32;
    unsafe { asm!("mrs {}, primask", out(reg) primask_old) };
    unsafe { asm!("cpsid i") };

    let ret = f();

    if primask_old & 1 == 0 {
        unsafe { asm!("cpsie i") };
    }

    ret
}

#[cfg(all(arm, not(thumb)))]
fn interrupt_free<R>(f: impl FnOnce() -> R) -> R {
    use core::arch::asm;
    let cpsr_old: u32;
    unsafe { asm!("mrs {}, cpsr", out(reg) cpsr_old) };
    unsafe { asm!("cpsid i") };

    let ret = f();

    if cpsr_old & 0x80 == 0 {
        unsafe { asm!("cpsie i") };
    }

    ret
}

#[cfg(not(arm))]
fn interrupt_free<R>(_: impl FnOnce() -> R) -> R {
    unreachable!();
}

fn with_stream<R>(
    cell: &'static StreamCell,
    open: fn() -> Result<HostStream, ()>,
    f: impl FnOnce(&mut HostStream) -> Result<R, ()>,
) -> Result<R, ()> {
    interrupt_free(|| {
        // Safety: We are in a critical section, so this is the only reference
        let slot = unsafe { &mut *cell.0.get() };

        // Open the console only once; every `SYS_OPEN` costs a round trip
        // to the host
        let mut stream = match *slot {
            Some(stream) => stream,
            None => {
                let stream = open()?;
                *slot = Some(stream);
                stream
            }
        };

        f(&mut stream)
    })
}

pub fn hstdout_str(s: &str) -> Result<(), ()> {
    with_stream(&HSTDOUT, hio::hstdout, |stream| stream.write_str(s).map_err(drop))
}

pub fn hstdout_fmt(args: fmt::Arguments) -> Result<(), ()> {
    with_stream(&HSTDOUT, hio::hstdout, |stream| {
        stream.write_fmt(args).map_err(drop)
    })
}

pub fn hstderr_str(s: &str) -> Result<(), ()> {
    with_stream(&HSTDERR, hio::hstderr, |stream| stream.write_str(s).map_err(drop))
}

pub fn hstderr_fmt(args: fmt::Arguments) -> Result<(), ()> {
    with_stream(&HSTDERR, hio::hstderr, |stream| {
        stream.write_fmt(args).map_err(drop)
    })
}

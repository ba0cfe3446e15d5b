//! Semihosting file access for Arm processors (host I/O parts forked from
//! [`cortex-m-semihosting`])
//!
//! [`cortex-m-semihosting`]: https://github.com/rust-embedded/cortex-m-semihosting
//!
//! # What is semihosting?
//!
//! "Semihosting is a mechanism that enables code running on an ARM target to communicate and use
//! the Input/Output facilities on a host computer that is running a debugger." - ARM
//!
//! # Interface
//!
//! Every semihosting request goes through one trap routine, `__semihost_call`, which is defined
//! in assembly and consists of exactly three instructions:
//!
//! ```text
//! bkpt 0xab      (`svc 0x123456` in the A32 instruction set)
//! nop
//! bx   lr
//! ```
//!
//! The routine has no prologue or epilogue. The operation number arrives in `r0`, the address
//! of the argument block in `r1`, and the host's reply is left in `r0`, which is exactly where
//! the AAPCS puts the two arguments and the return value of an `extern "C"` call. The encoding
//! is exported as [`TRAP_SEQUENCE_THUMB`] and [`TRAP_SEQUENCE_A32`] so that tools can check a
//! linked image against it.
//!
//! [`syscall`] and [`syscall1`] expose this untyped interface directly. The [`fs`] module
//! builds `SYS_OPEN`, `SYS_CLOSE`, `SYS_READ`, and `SYS_WRITE` on top of it, and [`hio`]
//! provides [`core::fmt::Write`] streams bound to the host console, so you can use them with
//! the [`write!` macro](https://doc.rust-lang.org/core/macro.write.html) or with
//! [`hprintln!`] and friends.
//!
//! # Forewarning
//!
//! Semihosting operations are *very* slow. Like, each WRITE operation can take hundreds of
//! milliseconds. The target is halted until the host services the request, and there is no
//! timeout.
//!
//! # Optional features
//!
//! ## `no-semihosting`
//!
//! When this feature is enabled, the trap routine is patched out and every operation returns
//! zero.
//!
//! # Reference
//!
//! For documentation about the semihosting operations, check:
//!
//! 'Chapter 8 - Semihosting' of the ['ARM Compiler toolchain Version 5.0'][pdf]
//! manual.
//!
//! [pdf]: http://infocenter.arm.com/help/topic/com.arm.doc.dui0471e/DUI0471E_developing_for_arm_processors.pdf

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod macros;

pub mod debug;
#[doc(hidden)]
pub mod export;
pub mod fs;
pub mod hio;
pub mod nr;
#[cfg(test)]
mod sim;

/// The name of the trap routine that services every semihosting request.
pub const TRAP_SYMBOL: &str = "__semihost_call";

/// The machine code of the trap routine in the T32 instruction set (M-profile):
/// `bkpt 0xab` (`0xbeab`), `nop` (`0xbf00`), `bx lr` (`0x4770`).
pub const TRAP_SEQUENCE_THUMB: [u8; 6] = [0xab, 0xbe, 0x00, 0xbf, 0x70, 0x47];

/// The machine code of the trap routine in the A32 instruction set:
/// `svc 0x123456` (`0xef123456`), `nop` (`0xe320f000`), `bx lr` (`0xe12fff1e`).
pub const TRAP_SEQUENCE_A32: [u8; 12] = [
    0x56, 0x34, 0x12, 0xef, 0x00, 0xf0, 0x20, 0xe3, 0x1e, 0xff, 0x2f, 0xe1,
];

#[cfg(all(thumb, not(feature = "no-semihosting")))]
core::arch::global_asm!(
    ".pushsection .text.__semihost_call, \"ax\", %progbits",
    ".global __semihost_call",
    ".type __semihost_call, %function",
    ".p2align 1",
    ".thumb",
    ".thumb_func",
    "__semihost_call:",
    "    bkpt 0xab",
    "    nop",
    "    bx lr",
    ".size __semihost_call, . - __semihost_call",
    ".popsection",
);

#[cfg(all(arm, not(thumb), not(feature = "no-semihosting")))]
core::arch::global_asm!(
    ".pushsection .text.__semihost_call, \"ax\", %progbits",
    ".global __semihost_call",
    ".type __semihost_call, %function",
    ".p2align 2",
    ".arm",
    "__semihost_call:",
    "    svc 0x123456",
    "    nop",
    "    bx lr",
    ".size __semihost_call, . - __semihost_call",
    ".popsection",
);

#[cfg(all(arm, not(feature = "no-semihosting")))]
extern "C" {
    fn __semihost_call(nr: usize, arg: usize) -> usize;
}

/// Performs a semihosting operation, takes a pointer to an argument block
#[inline(always)]
pub unsafe fn syscall<T>(nr: usize, arg: &T) -> usize {
    unsafe { syscall1(nr, arg as *const T as usize) }
}

/// Performs a semihosting operation, takes one integer as an argument
#[inline(always)]
pub unsafe fn syscall1(_nr: usize, _arg: usize) -> usize {
    match () {
        #[cfg(all(arm, not(feature = "no-semihosting")))]
        // Safety: `__semihost_call` only traps to the host, which accesses
        // the memory described by the argument block. The caller vouches for
        // the block.
        () => unsafe { __semihost_call(_nr, _arg) },

        #[cfg(all(arm, feature = "no-semihosting"))]
        () => 0,

        #[cfg(all(not(arm), test))]
        () => unsafe { sim::service(_nr, _arg) },

        #[cfg(all(not(arm), not(test)))]
        () => unimplemented!(),
    }
}

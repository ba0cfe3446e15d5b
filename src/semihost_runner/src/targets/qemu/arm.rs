use anyhow::Result;
use std::{future::Future, pin::Pin};

use super::super::{Arch, DebugProbe, Target};
use super::QemuDebugProbe;

/// An Arm MPS2 FPGA image emulated by `qemu-system-arm`. The image is loaded
/// to `flash` and the stack is placed at the end of `ram`.
pub struct QemuMps2 {
    machine: &'static str,
    arch: Arch,
    flash: MemoryRegion,
    ram: MemoryRegion,
}

struct MemoryRegion {
    origin: u32,
    len_kib: u32,
    /// Where the region comes from on the board
    note: &'static str,
}

/// AN385 (Cortex-M3)
pub static MPS2_AN385: QemuMps2 = QemuMps2 {
    machine: "mps2-an385",
    arch: Arch::CORTEX_M3,
    flash: MemoryRegion {
        origin: 0x0000_0000,
        len_kib: 4096,
        note: "assuming zbt_boot_ctrl == 0",
    },
    ram: MemoryRegion {
        origin: 0x2000_0000,
        len_kib: 4096,
        note: "ZBT SRAM",
    },
};

/// AN505 (Cortex-M33 with FPU)
pub static MPS2_AN505: QemuMps2 = QemuMps2 {
    machine: "mps2-an505",
    arch: Arch::CORTEX_M33_FPU,
    flash: MemoryRegion {
        origin: 0x1000_0000,
        len_kib: 4096,
        note: "ZBT SRAM (SSRAM1) Secure alias",
    },
    ram: MemoryRegion {
        origin: 0x3800_0000,
        len_kib: 4096,
        note: "ZBT SRAM (SSRAM2 and SSRAM3) Secure alias",
    },
};

impl Target for QemuMps2 {
    fn target_arch(&self) -> Arch {
        self.arch
    }

    fn memory_layout_script(&self) -> String {
        let Self { flash, ram, .. } = self;
        format!(
            "MEMORY\n\
             {{\n\
             \x20 /* {} */\n\
             \x20 FLASH : ORIGIN = {:#010x}, LENGTH = {}K\n\
             \x20 /* {} */\n\
             \x20 RAM : ORIGIN = {:#010x}, LENGTH = {}K\n\
             }}\n\
             \n\
             _stack_start = ORIGIN(RAM) + LENGTH(RAM);\n",
            flash.note, flash.origin, flash.len_kib, ram.note, ram.origin, ram.len_kib,
        )
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn DebugProbe>>>>> {
        let machine = self.machine;
        Box::pin(async move {
            Ok(Box::new(QemuDebugProbe::new("qemu-system-arm", machine)) as Box<dyn DebugProbe>)
        })
    }
}

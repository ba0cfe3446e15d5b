use anyhow::Result;
use std::{
    future::Future,
    io,
    path::Path,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, ReadBuf},
    process::{Child, ChildStdout},
};

use super::{DebugProbe, DynAsyncRead};
use crate::subprocess;

pub mod arm;

/// Runs an image on `qemu-system-*` with semihosting enabled.
struct QemuDebugProbe {
    qemu_cmd: &'static str,
    /// The value of `-machine`
    machine: &'static str,
}

impl QemuDebugProbe {
    fn new(qemu_cmd: &'static str, machine: &'static str) -> Self {
        Self { qemu_cmd, machine }
    }
}

impl DebugProbe for QemuDebugProbe {
    fn program_and_get_output(
        &mut self,
        exe: &Path,
        workdir: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<DynAsyncRead<'_>>> + '_>> {
        let result = subprocess::CmdBuilder::new(self.qemu_cmd)
            .arg("-kernel")
            .arg(exe)
            .arg("-machine")
            .arg(self.machine)
            .args([
                // `target=native` makes QEMU itself service the requests on
                // the host file system
                "-semihosting",
                "-semihosting-config",
                "enable=on,target=native",
                "-nographic",
                "-d",
                "guest_errors",
                "-audiodev",
                "id=none,driver=none",
            ])
            .current_dir(workdir)
            .spawn_and_get_child()
            .map_err(anyhow::Error::from)
            .and_then(|mut child| {
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| anyhow::anyhow!("QEMU's standard output is not piped"))?;
                Ok(Box::pin(OutputReader {
                    _child: child,
                    stdout,
                }) as DynAsyncRead<'static>)
            });

        Box::pin(std::future::ready(result))
    }
}

/// The standard output of a QEMU process. The process is killed when this is
/// dropped.
struct OutputReader {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for OutputReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

//! Building and running external commands (`cargo`, QEMU)
use std::{
    ffi::{OsStr, OsString},
    fmt,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum SubprocessError {
    #[error("Could not execute command `{cmd}`")]
    Spawn {
        cmd: Cmd,
        #[source]
        error: std::io::Error,
    },

    #[error("Command `{cmd}` returned {status}")]
    FailStatus { cmd: Cmd, status: ExitStatus },
}

#[derive(Debug)]
pub struct Cmd(Vec<OsString>);

pub struct CmdBuilder {
    cmd: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl CmdBuilder {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            cmd: vec![program.as_ref().to_owned()],
            env: vec![],
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.cmd.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cmd
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_owned(), val.as_ref().to_owned()));
        self
    }

    /// Run the command in `dir`. Semihosting hosts resolve the target's
    /// relative paths against their own working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    fn build_command(&self) -> Command {
        log::debug!(
            "Executing command `{}` with environment `{}` in {:?}",
            DisplayCmd(&self.cmd),
            DisplayEnvs(&self.env),
            self.current_dir.as_deref().unwrap_or_else(|| Path::new(".")),
        );

        let mut cmd = Command::new(&self.cmd[0]);
        cmd.args(self.cmd[1..].iter().cloned());
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn_error(self, error: std::io::Error) -> SubprocessError {
        SubprocessError::Spawn {
            cmd: Cmd(self.cmd),
            error,
        }
    }

    fn status_error(self, status: ExitStatus) -> SubprocessError {
        SubprocessError::FailStatus {
            cmd: Cmd(self.cmd),
            status,
        }
    }

    pub async fn spawn_expecting_success(self) -> Result<(), SubprocessError> {
        let status = match self.build_command().status().await {
            Ok(status) => status,
            Err(e) => return Err(self.spawn_error(e)),
        };

        if !status.success() {
            return Err(self.status_error(status));
        }

        Ok(())
    }

    /// Don't reveal the error output unless the command fails.
    pub async fn spawn_expecting_success_quiet(self) -> Result<(), SubprocessError> {
        let mut command = self.build_command();
        command.stdout(Stdio::null());
        command.stderr(Stdio::piped());

        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => return Err(self.spawn_error(e)),
        };

        if !output.status.success() {
            // Reveal the error output
            use std::io::Write;
            let _ = std::io::stderr().write_all(&output.stderr);

            return Err(self.status_error(output.status));
        }

        Ok(())
    }

    pub async fn spawn_capturing_stdout(self) -> Result<Vec<u8>, SubprocessError> {
        let mut command = self.build_command();
        command.stdout(Stdio::piped());

        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => return Err(self.spawn_error(e)),
        };

        if !output.status.success() {
            return Err(self.status_error(output.status));
        }

        Ok(output.stdout)
    }

    /// Spawn the command with its standard output piped. The standard error
    /// is passed through.
    pub fn spawn_and_get_child(self) -> Result<Child, SubprocessError> {
        let mut command = self.build_command();
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());

        command.spawn().map_err(|e| self.spawn_error(e))
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DisplayCmd(&self.0).fmt(f)
    }
}

struct DisplayCmd<'a>(&'a [OsString]);

impl fmt::Display for DisplayCmd<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut it = self.0.iter();
        if let Some(e) = it.next() {
            write!(f, "{}", ShellEscape(e))?;
            for e in it {
                write!(f, " {}", ShellEscape(e))?;
            }
        }
        Ok(())
    }
}

struct DisplayEnvs<'a>(&'a [(OsString, OsString)]);

impl fmt::Display for DisplayEnvs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut it = self.0.iter();
        if let Some(e) = it.next() {
            write!(f, "{}={}", ShellEscape(&e.0), ShellEscape(&e.1))?;
            for e in it {
                write!(f, " {}={}", ShellEscape(&e.0), ShellEscape(&e.1))?;
            }
        }
        Ok(())
    }
}

struct ShellEscape<'a>(&'a OsStr);

impl fmt::Display for ShellEscape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // These characters need to be quoted or escaped in a bare word
        let special_chars = b"|&;<>()$`\\\"' \t\n\r*?[#~=%";
        // These characters need to be escaped in double-quotes
        let special_chars_in_dq = b"$`\\\"";

        let Some(utf8) = self.0.to_str() else {
            // Some bytes are unprintable.
            return write!(f, "<unprintable: {:?}>", self.0);
        };

        let bytes = utf8.as_bytes();
        if bytes.contains(&b'\'') {
            // Enclose in double quotes
            write!(f, "\"")?;
            for ch in utf8.chars() {
                if ch.is_ascii() && special_chars_in_dq.contains(&(ch as u8)) {
                    write!(f, "\\")?;
                }
                write!(f, "{ch}")?;
            }
            write!(f, "\"")
        } else if bytes.iter().any(|b| special_chars.contains(b)) {
            // Enclose in single quotes
            write!(f, "'{utf8}'")
        } else {
            write!(f, "{utf8}")
        }
    }
}

//! Interface to the demo program
use std::{
    fmt::Write,
    future::Future,
    path::{Path, PathBuf},
    pin::{pin, Pin},
    time::Duration,
};
use tokio::io::AsyncReadExt;

use crate::{subprocess, targets, trap};

/// The name of the demo program's crate, which is also the name of the
/// executable
const CRATE_NAME: &str = "semihost_demo";

/// The marker the Rust panic handler output starts with
const PANIC_MARKER: &str = "panicked at";

/// The output size at which the demo is considered to be out of control
const MAX_OUTPUT_LEN: usize = 1024 * 1024;

/// Interface to the demo program, encompassing the identity of the demo crate
/// as well as a reference to its build output directory.
pub(crate) struct Demo {
    rustflags: String,
    exe_path: PathBuf,
    target_arch_opt: targets::BuildOpt,
    link_dir: tempdir::TempDir,
    meta: Meta,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum DemoNewError {
    #[error("Error while changing the current directory to {0:?}.")]
    CdError(PathBuf, #[source] std::io::Error),
    #[error("Could not gather the Cargo metadata using `cargo metadata`.")]
    CargoMetadata(#[source] subprocess::SubprocessError),
    #[error("Could not parse the Cargo metadata.")]
    CargoMetadataParse(#[source] serde_json::Error),
    #[error("Could not read the demo metadata.")]
    DemoMetadata(#[source] std::io::Error),
    #[error("Could not parse the demo metadata.")]
    DemoMetadataParse(#[source] toml::de::Error),
    #[error("{0:?} is not a valid demo crate path.")]
    BadDemoPath(PathBuf),
    #[error("Error while creating a temporary directory.")]
    TempDirError(#[source] std::io::Error),
    #[error("Error while writing {0:?}.")]
    WriteError(PathBuf, #[source] std::io::Error),
}

/// The additional parameters used while building the executable image of the
/// demo.
pub(crate) struct BuildOpt {
    pub verbose: bool,
    pub log_level: LogLevel,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub(crate) enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum DemoRunError {
    #[error("Could not locate the compiled executable at {0:?}.")]
    ExeNotFound(PathBuf),
    #[error("The build command failed.")]
    Build(#[source] subprocess::SubprocessError),
    #[error("The image has an unexpected semihosting trap routine.")]
    TrapCheck(#[source] trap::TrapCheckError),
    #[error("Could not prepare the working directory.")]
    Workdir(#[source] std::io::Error),
    #[error("Could not run the demo.")]
    Run(#[source] anyhow::Error),
}

/// The demo did run, but its result was failure.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DemoFailure {
    #[error("Timed out")]
    Timeout,
    #[error("The output is too long")]
    TooLong,
    #[error("The demo panicked: '{0}'")]
    Panicked(String),
    #[error("The demo stopped without reporting success: '{0}'")]
    NoSuccessMarker(String),
    #[error("The output doesn't contain '{0}'")]
    MissingOutput(String),
    #[error("The demo didn't create {0:?} on the host")]
    MissingFile(PathBuf),
}

/// Demo metadata (`Demo.toml`).
#[derive(Default, Debug, serde::Deserialize)]
#[serde(default)]
pub(crate) struct Meta {
    run: MetaRun,
    /// Files to create in the working directory before running the demo
    seed: Vec<SeedFile>,
    expect: MetaExpect,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct MetaRun {
    /// The line the demo prints after every check has passed
    success_marker: String,
    /// Substrings that must appear in the output
    expected_output: Vec<String>,
}

impl Default for MetaRun {
    fn default() -> Self {
        Self {
            success_marker: "!- DEMO WAS SUCCESSFUL -!".to_owned(),
            expected_output: Vec::new(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct SeedFile {
    /// A path relative to the working directory
    path: PathBuf,
    #[serde(default)]
    contents: String,
}

#[derive(Default, Debug, serde::Deserialize)]
#[serde(default)]
struct MetaExpect {
    /// Files (relative to the working directory) the demo must create
    files: Vec<PathBuf>,
}

impl Meta {
    fn parse(data: &str) -> Result<Self, DemoNewError> {
        toml::de::from_str(data).map_err(DemoNewError::DemoMetadataParse)
    }
}

const CARGO_CMD: &str = "cargo";

impl Demo {
    pub(crate) fn new(
        crate_base_path: &Path,
        target: &'static dyn targets::Target,
        target_arch_opt: targets::BuildOpt,
    ) -> impl Future<Output = Result<Self, DemoNewError>> {
        // Locate the demo's crate
        let crate_path = crate_base_path.join(CRATE_NAME);
        log::debug!("demo.crate_path = {crate_path:?}");

        async move {
            if !crate_path.is_dir() {
                return Err(DemoNewError::BadDemoPath(crate_path));
            }

            Self::new_inner(crate_path, target, target_arch_opt).await
        }
    }

    async fn new_inner(
        crate_path: PathBuf,
        target: &'static dyn targets::Target,
        target_arch_opt: targets::BuildOpt,
    ) -> Result<Self, DemoNewError> {
        // Move to the crate directory so that `cargo` picks up the right
        // package
        log::debug!("cd-ing to '{}'", crate_path.display());
        std::env::set_current_dir(&crate_path)
            .map_err(|e| DemoNewError::CdError(crate_path.clone(), e))?;

        // Load the demo metadata
        let meta_path = crate_path.join("Demo.toml");
        log::debug!("Loading demo metadata from '{}'", meta_path.display());
        let meta = match tokio::fs::read_to_string(meta_path).await {
            Ok(data) => Meta::parse(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("`Demo.toml` wasn't found; using the default metadata");
                Meta::default()
            }
            Err(e) => {
                return Err(DemoNewError::DemoMetadata(e));
            }
        };
        log::trace!("demo.meta = {meta:?}");

        // Find the target directory
        let target_dir = {
            let metadata_json = subprocess::CmdBuilder::new(CARGO_CMD)
                .arg("metadata")
                .arg("--format-version=1")
                .arg("--no-deps")
                .spawn_capturing_stdout()
                .await
                .map_err(DemoNewError::CargoMetadata)?;

            #[derive(serde::Deserialize)]
            struct MetadataV1 {
                target_directory: String,
            }

            let crate_metadata: MetadataV1 =
                serde_json::from_str(&String::from_utf8_lossy(&metadata_json))
                    .map_err(DemoNewError::CargoMetadataParse)?;

            PathBuf::from(crate_metadata.target_directory)
        };
        log::debug!("target_dir = '{}'", target_dir.display());

        // Executable path
        let exe_path = target_dir
            .join(target_arch_opt.target_triple)
            .join("release")
            .join(CRATE_NAME);
        log::debug!("exe_path = '{}'", exe_path.display());

        // Put the generated `memory.x` in a directory, which the demo's
        // `build.rs` adds to the linker search path
        let link_dir =
            tempdir::TempDir::new("semihost_runner").map_err(DemoNewError::TempDirError)?;
        let memory_x_path = link_dir.path().join("memory.x");
        log::debug!("Writing '{}'", memory_x_path.display());
        std::fs::write(&memory_x_path, target.memory_layout_script())
            .map_err(|e| DemoNewError::WriteError(memory_x_path, e))?;

        // Derive `RUSTFLAGS`.
        let mut rustflags = std::env::var("RUSTFLAGS").unwrap_or_default();
        if !rustflags.is_empty() {
            // An unintentionally set `RUSTFLAGS` may cause a hard-to-understand
            // build failure, so warn the user about this behavior
            log::info!(
                "RUSTFLAGS appears to be non-empty; it will be combined with \
                the default flags for the current target"
            );
        }

        // `link.x` is provided by `cortex-m-rt` and includes `memory.x`
        let _ = write!(rustflags, " -C link-arg=-Tlink.x");

        log::debug!("rustflags = {rustflags:?}");

        Ok(Self {
            rustflags,
            exe_path,
            target_arch_opt,
            link_dir,
            meta,
        })
    }

    /// Get the path of the executable file produced by [`Self::compile`].
    pub(crate) fn exe_path(&self) -> PathBuf {
        self.exe_path.clone()
    }

    /// Compile an executable of the demo.
    pub(crate) async fn compile(
        &self,
        BuildOpt { verbose, log_level }: BuildOpt,
    ) -> Result<(), DemoRunError> {
        let Self {
            exe_path,
            target_arch_opt,
            rustflags,
            link_dir,
            ..
        } = self;

        // Delete `exe_path`
        if exe_path.exists() {
            if let Err(e) = std::fs::remove_file(exe_path) {
                // Failure is non-fatal
                log::warn!("Failed to remove '{}': {e}", exe_path.display());
            }
        }

        // Build the demo
        log::debug!("Building the demo");
        let cmd = subprocess::CmdBuilder::new(CARGO_CMD)
            .arg("build")
            .arg("--release")
            .arg("--target")
            .arg(target_arch_opt.target_triple)
            .arg(match log_level {
                LogLevel::Off => "--features=log/max_level_off",
                LogLevel::Error => "--features=log/max_level_error",
                LogLevel::Warn => "--features=log/max_level_warn",
                LogLevel::Info => "--features=log/max_level_info",
                LogLevel::Debug => "--features=log/max_level_debug",
                LogLevel::Trace => "--features=log/max_level_trace",
            })
            .args((!verbose).then_some("-q"))
            .env("SEMIHOST_DEMO_LINK_SEARCH", link_dir.path())
            .env("RUSTFLAGS", rustflags);
        let cmd_result = if verbose {
            cmd.spawn_expecting_success().await
        } else {
            // Hide `stderr` unless the command fails
            cmd.spawn_expecting_success_quiet().await
        };

        cmd_result.map_err(DemoRunError::Build)?;

        // Locate the executable
        if !exe_path.is_file() {
            return Err(DemoRunError::ExeNotFound(exe_path.clone()));
        }

        Ok(())
    }

    /// Check that the trap routine in `exe` is the one the debug host
    /// recognizes.
    pub(crate) async fn check_trap(&self, exe: &Path) -> Result<(), DemoRunError> {
        trap::check_image(exe)
            .await
            .map_err(DemoRunError::TrapCheck)
    }

    /// Create a working directory for the demo and put the seed files in it.
    pub(crate) fn prepare_workdir(&self) -> Result<tempdir::TempDir, DemoRunError> {
        let workdir = tempdir::TempDir::new(CRATE_NAME).map_err(DemoRunError::Workdir)?;
        log::debug!("workdir = '{}'", workdir.path().display());

        for seed in self.meta.seed.iter() {
            let path = workdir.path().join(&seed.path);
            log::debug!("Seeding '{}' ({} bytes)", path.display(), seed.contents.len());
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DemoRunError::Workdir)?;
            }
            std::fs::write(&path, &seed.contents).map_err(DemoRunError::Workdir)?;
        }

        Ok(workdir)
    }

    /// Run `exe` using the specified debug probe interface in `workdir`, which
    /// should be created by [`Self::prepare_workdir`].
    pub(crate) async fn run(
        &self,
        exe: &Path,
        workdir: &Path,
        debug_probe: &mut (impl targets::DebugProbe + ?Sized),
        timeout: Duration,
    ) -> Result<Result<(), DemoFailure>, DemoRunError> {
        log::debug!("Running the demo");
        let stream = debug_probe
            .program_and_get_output(exe, workdir)
            .await
            .map_err(DemoRunError::Run)?;
        log::trace!("run: Got a stream");

        let output = match read_until_markers(
            stream,
            [self.meta.run.success_marker.as_str(), PANIC_MARKER],
            timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(ReadError::Timeout) => return Ok(Err(DemoFailure::Timeout)),
            Err(ReadError::TooLong) => return Ok(Err(DemoFailure::TooLong)),
            Err(ReadError::Io(e)) => return Err(DemoRunError::Run(e.into())),
        };

        let output = String::from_utf8_lossy(&output);
        log::debug!("Output (lossy UTF-8) = {output:?}");

        Ok(self.meta.check_result(&output, workdir))
    }
}

impl Meta {
    /// Interpret the output of a finished run and the state of the working
    /// directory.
    fn check_result(&self, output: &str, workdir: &Path) -> Result<(), DemoFailure> {
        if let Some(i) = output.find(PANIC_MARKER) {
            return Err(DemoFailure::Panicked(output[i..].trim_end().to_owned()));
        }

        if !output.contains(&self.run.success_marker) {
            return Err(DemoFailure::NoSuccessMarker(output.to_owned()));
        }

        if let Some(line) = self
            .run
            .expected_output
            .iter()
            .find(|line| !output.contains(line.as_str()))
        {
            return Err(DemoFailure::MissingOutput(line.clone()));
        }

        for file in self.expect.files.iter() {
            let path = workdir.join(file);
            match std::fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => {
                    log::info!("The demo created '{}' ({} bytes)", file.display(), metadata.len());
                }
                _ => return Err(DemoFailure::MissingFile(file.clone())),
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
enum ReadError {
    Timeout,
    TooLong,
    Io(std::io::Error),
}

/// Read `stream` until one of `markers` appears or the stream ends.
async fn read_until_markers<P: AsRef<[u8]>>(
    mut stream: targets::DynAsyncRead<'_>,
    markers: impl IntoIterator<Item = P>,
    timeout: Duration,
) -> Result<Vec<u8>, ReadError> {
    let matcher = aho_corasick::AhoCorasickBuilder::new().build(markers);

    let mut output = Vec::new();
    let mut buffer = vec![0u8; 16384];

    loop {
        log::trace!("... calling `read`");
        let read_fut = stream.read(&mut buffer);
        let timeout_fut = tokio::time::sleep(timeout);

        let num_bytes = tokio::select! {
            read_result = read_fut => {
                log::trace!("... `read` resolved to {read_result:?}");
                read_result.map_err(ReadError::Io)?
            },
            _ = timeout_fut => {
                log::trace!("... `sleep` resolved earlier - timeout");
                log::trace!("... The output so far: {:?}", String::from_utf8_lossy(&output));
                return Err(ReadError::Timeout);
            },
        };

        if num_bytes == 0 {
            break;
        }

        output.extend_from_slice(&buffer[0..num_bytes]);

        // Check for markers, including ones straddling the previous chunk
        let check_len = (num_bytes + matcher.max_pattern_len() - 1).min(output.len());
        let i = output.len() - check_len;
        if let Some(m) = matcher.find(&output[i..]) {
            log::trace!(
                "... Found the marker at position {:?}",
                i + m.start()..i + m.end()
            );

            // Read the remaining output, which might include error details
            log::trace!("... Reading the remaining output");
            output.extend_from_slice(
                &read_to_end_timeout(stream.as_mut(), Duration::from_millis(300))
                    .await
                    .map_err(ReadError::Io)?,
            );
            break;
        }

        if output.len() > MAX_OUTPUT_LEN {
            return Err(ReadError::TooLong);
        }
    }

    Ok(output)
}

async fn read_to_end_timeout(
    mut stream: Pin<&mut (impl tokio::io::AsyncRead + ?Sized)>,
    timeout: Duration,
) -> tokio::io::Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut buffer = vec![0u8; 16384];
    let mut timeout_fut = pin!(tokio::time::sleep(timeout));

    log::trace!("read_to_end_timeout: Got a stream");

    loop {
        log::trace!("... calling `read`");
        let read_fut = stream.read(&mut buffer);

        let num_bytes = tokio::select! {
            read_result = read_fut => {
                log::trace!("... `read` resolved to {read_result:?}");
                read_result.unwrap_or(0)
            },
            _ = &mut timeout_fut => {
                log::trace!("... `sleep` resolved earlier - timeout");
                break;
            },
        };

        if num_bytes == 0 {
            break;
        }

        output.extend_from_slice(&buffer[0..num_bytes]);
    }

    Ok(output)
}

use anyhow::Context;
use clap::Parser;
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

mod demo;
mod subprocess;
mod targets;
mod trap;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("semihost_runner=info"),
    )
    .init();

    if let Err(e) = main_inner().await {
        log::error!("Command failed.\n{e:?}");
        std::process::exit(1);
    }
}

#[derive(Error, Debug)]
enum MainError {
    #[error("Could not initialize the demo interface.")]
    Demo(#[source] demo::DemoNewError),
    #[error("Could not connect to the target.")]
    ConnectTarget(#[source] anyhow::Error),
    #[error("Could not build or run the demo.")]
    RunDemo(#[source] demo::DemoRunError),
    #[error("The demo failed.")]
    DemoFail,
    #[error("The target architecture '{0}' is invalid or unsupported.")]
    BadTarget(targets::Arch),
}

/// Builds the semihosting demo and runs it on an emulated Arm-M board
#[derive(Parser)]
struct Opt {
    /// Target chip/board
    #[arg(short = 't', long = "target", value_parser = try_parse_target,
        required_unless_present = "help_targets")]
    target: Option<&'static dyn targets::Target>,
    /// Override target architecture
    ///
    /// See the documentation of `Arch::from_str` for full syntax.
    #[arg(short = 'a', long = "arch")]
    target_arch: Option<targets::Arch>,
    /// Print the list of supported targets and their architecture strings
    #[arg(long = "help-targets")]
    help_targets: bool,
    /// Log level of the demo program
    #[arg(short = 'l', long = "log-level", value_enum, ignore_case = true,
        default_value = "info")]
    log_level: demo::LogLevel,
    /// Display build progress and warnings
    #[arg(short = 'v')]
    verbose: bool,
    /// Run this prebuilt image instead of building the demo
    #[arg(long = "exe")]
    exe: Option<PathBuf>,
    /// Give up if the demo doesn't finish in this many seconds
    #[arg(long = "timeout", default_value_t = 35)]
    timeout: u64,
    /// Don't delete the host working directory after the run
    #[arg(long = "keep-workdir")]
    keep_workdir: bool,
}

fn try_parse_target(arg_target: &str) -> Result<&'static dyn targets::Target, String> {
    targets::TARGETS
        .iter()
        .find(|x| x.0 == arg_target)
        .map(|x| x.1)
        .ok_or_else(|| {
            let names: Vec<_> = targets::TARGETS.iter().map(|x| x.0).collect();
            format!("no such target; possible values: {}", names.join(", "))
        })
}

async fn main_inner() -> anyhow::Result<()> {
    // Parse arguments
    let opt = Opt::parse();

    // If `--help-targets` is specified, print all targets and exit,
    if opt.help_targets {
        println!("Supported targets:");
        for (name, target) in targets::TARGETS {
            println!("  {:30}{}", name, target.target_arch());
        }
        return Ok(());
    }

    let target = opt
        .target
        .context("No target was specified")?;

    // `Demo::new` changes the current directory
    let exe = match &opt.exe {
        Some(exe) => Some(env::current_dir()?.join(exe)),
        None => None,
    };

    // Find where the demo is located in this workspace, assuming
    // `semihost_runner` is running on the same environment as where it
    // was built.
    let crate_base_path = {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        log::debug!("CARGO_MANIFEST_DIR = {manifest_dir}");
        Path::new(manifest_dir)
            .parent()
            .context("Couldn't get the parent of `CARGO_MANIFEST_DIR`")?
    };

    let target_arch = opt.target_arch.unwrap_or_else(|| target.target_arch());
    log::debug!("target_arch = {target_arch}");

    let target_arch_opt = target_arch
        .build_opt()
        .ok_or(MainError::BadTarget(target_arch))?;
    log::debug!("target_arch_opt = {target_arch_opt:?}");

    // Initialize the demo interface
    let demo = demo::Demo::new(crate_base_path, target, target_arch_opt)
        .await
        .map_err(MainError::Demo)?;

    let exe = match exe {
        Some(exe) => {
            log::info!("Using the prebuilt image '{}'", exe.display());
            exe
        }
        None => {
            log::info!("Building the demo for {target_arch}");
            demo.compile(demo::BuildOpt {
                verbose: opt.verbose,
                log_level: opt.log_level,
            })
            .await
            .map_err(MainError::RunDemo)?;
            demo.exe_path()
        }
    };

    demo.check_trap(&exe).await.map_err(MainError::RunDemo)?;

    let workdir = demo.prepare_workdir().map_err(MainError::RunDemo)?;

    // Connect to the target
    log::debug!("Connecting to the target");
    let mut debug_probe = target.connect().await.map_err(MainError::ConnectTarget)?;

    log::info!("Running '{}'", exe.display());
    let result = demo
        .run(
            &exe,
            workdir.path(),
            &mut *debug_probe,
            Duration::from_secs(opt.timeout),
        )
        .await;

    if opt.keep_workdir {
        let path = workdir.into_path();
        log::info!("The working directory was kept at '{}'", path.display());
    }

    match result.map_err(MainError::RunDemo)? {
        Ok(()) => {
            log::info!("The demo was successful");
            Ok(())
        }
        Err(failure) => {
            // The demo did run, but the result was failure.
            log::error!("The demo failed: {failure}");
            Err(MainError::DemoFail.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Opt::command().debug_assert();
    }

    #[test]
    fn parse_options() {
        let opt = Opt::try_parse_from([
            "semihost_runner",
            "-t",
            "qemu_mps2_an505",
            "-l",
            "DEBUG",
            "--timeout",
            "10",
            "--keep-workdir",
        ])
        .unwrap();
        assert_eq!(opt.target.unwrap().target_arch(), targets::Arch::CORTEX_M33_FPU);
        assert!(matches!(opt.log_level, demo::LogLevel::Debug));
        assert_eq!(opt.timeout, 10);
        assert!(opt.keep_workdir);
        assert!(opt.exe.is_none());
    }

    #[test]
    fn target_is_required() {
        assert!(Opt::try_parse_from(["semihost_runner"]).is_err());
        assert!(Opt::try_parse_from(["semihost_runner", "-t", "qemu_virt"]).is_err());
        assert!(Opt::try_parse_from(["semihost_runner", "--help-targets"]).is_ok());
    }

    #[test]
    fn arch_override() {
        let opt =
            Opt::try_parse_from(["semihost_runner", "-t", "qemu_mps2_an385", "-a", "cortex_m0"])
                .unwrap();
        assert_eq!(opt.target_arch, Some(targets::Arch::CORTEX_M0));
        assert_eq!(opt.timeout, 35);
    }
}

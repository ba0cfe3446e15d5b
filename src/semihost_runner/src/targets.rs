use anyhow::Result;
use std::{fmt, future::Future, path::Path, pin::Pin};
use tokio::io::AsyncRead;

mod qemu;

pub trait Target: Send + Sync {
    /// Get the target architecture.
    fn target_arch(&self) -> Arch;

    /// Generate the `memory.x` file to be included by the linker script of
    /// `cortex-m-rt`.
    fn memory_layout_script(&self) -> String;

    /// Connect to the target.
    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn DebugProbe>>>>>;
}

pub trait DebugProbe: Send {
    /// Load the specified ELF image and run it from the beginning to capture
    /// its output. Relative paths opened by the program through semihosting
    /// are resolved in `workdir`.
    fn program_and_get_output(
        &mut self,
        exe: &Path,
        workdir: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<DynAsyncRead<'_>>> + '_>>;
}

pub type DynAsyncRead<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

pub static TARGETS: &[(&str, &dyn Target)] = &[
    ("qemu_mps2_an385", &qemu::arm::MPS2_AN385),
    ("qemu_mps2_an505", &qemu::arm::MPS2_AN505),
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arch {
    /// Arm M-Profile
    ArmM {
        /// Specifies the architecture version to use.
        version: ArmMVersion,
        /// The Floating-point extension.
        fpu: bool,
        /// The DSP extension.
        dsp: bool,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArmMVersion {
    Armv6M,
    Armv7M,
    Armv8MBaseline,
    Armv8MMainline,
}

/// A set of build options passed to `rustc` to build an application for some
/// target specified by [`Arch`].
#[derive(Debug, Default)]
pub struct BuildOpt {
    pub target_triple: &'static str,
}

impl Arch {
    const NAMED_ARCHS: &'static [(&'static str, Self)] = &[
        ("cortex_m0", Self::CORTEX_M0),
        ("cortex_m3", Self::CORTEX_M3),
        ("cortex_m4", Self::CORTEX_M4),
        ("cortex_m4f", Self::CORTEX_M4F),
        ("cortex_m23", Self::CORTEX_M23),
        ("cortex_m33", Self::CORTEX_M33),
    ];

    pub const CORTEX_M0: Self = Self::ArmM {
        version: ArmMVersion::Armv6M,
        fpu: false,
        dsp: false,
    };
    pub const CORTEX_M3: Self = Self::ArmM {
        version: ArmMVersion::Armv7M,
        fpu: false,
        dsp: false,
    };
    pub const CORTEX_M4: Self = Self::ArmM {
        version: ArmMVersion::Armv7M,
        fpu: false,
        dsp: true,
    };
    pub const CORTEX_M4F: Self = Self::ArmM {
        version: ArmMVersion::Armv7M,
        fpu: true,
        dsp: true,
    };
    pub const CORTEX_M23: Self = Self::ArmM {
        version: ArmMVersion::Armv8MBaseline,
        fpu: false,
        dsp: false,
    };
    pub const CORTEX_M33: Self = Self::ArmM {
        version: ArmMVersion::Armv8MMainline,
        fpu: false,
        dsp: false,
    };
    pub const CORTEX_M33_FPU: Self = Self::ArmM {
        version: ArmMVersion::Armv8MMainline,
        fpu: true,
        dsp: false,
    };

    pub fn build_opt(&self) -> Option<BuildOpt> {
        let target_triple = match self {
            Self::ArmM {
                version: ArmMVersion::Armv6M,
                fpu: false,
                dsp: false,
            } => "thumbv6m-none-eabi",

            Self::ArmM {
                version: ArmMVersion::Armv7M,
                fpu: false,
                dsp: false,
            } => "thumbv7m-none-eabi",

            Self::ArmM {
                version: ArmMVersion::Armv7M,
                fpu: false,
                dsp: true,
            } => "thumbv7em-none-eabi",

            Self::ArmM {
                version: ArmMVersion::Armv7M,
                fpu: true,
                dsp: true,
            } => "thumbv7em-none-eabihf",

            Self::ArmM {
                version: ArmMVersion::Armv8MBaseline,
                fpu: false,
                dsp: false,
            } => "thumbv8m.base-none-eabi",

            Self::ArmM {
                version: ArmMVersion::Armv8MMainline,
                fpu: false,
                dsp: false,
            } => "thumbv8m.main-none-eabi",

            Self::ArmM {
                version: ArmMVersion::Armv8MMainline,
                fpu: true,
                dsp: false,
            } => "thumbv8m.main-none-eabihf",

            Self::ArmM { .. } => return None,
        };

        Some(BuildOpt { target_triple })
    }

    fn with_feature_by_name(self, name: &str, enable: bool) -> Option<Self> {
        let Self::ArmM {
            version,
            mut fpu,
            mut dsp,
        } = self;
        match name {
            "fpu" => fpu = enable,
            "dsp" => dsp = enable,
            _ => return None,
        }
        Some(Self::ArmM { version, fpu, dsp })
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, fm: &mut fmt::Formatter) -> fmt::Result {
        let Self::ArmM {
            mut fpu,
            mut dsp,
            version,
        } = *self;
        match (version, fpu, dsp) {
            (ArmMVersion::Armv6M, _, _) => write!(fm, "cortex_m0")?,
            (ArmMVersion::Armv7M, true, true) => {
                write!(fm, "cortex_m4f")?;
                fpu = false;
                dsp = false;
            }
            (ArmMVersion::Armv7M, false, true) => {
                write!(fm, "cortex_m4")?;
                dsp = false;
            }
            (ArmMVersion::Armv7M, _, _) => write!(fm, "cortex_m3")?,
            (ArmMVersion::Armv8MBaseline, _, _) => write!(fm, "cortex_m23")?,
            (ArmMVersion::Armv8MMainline, _, _) => write!(fm, "cortex_m33")?,
        }
        if fpu {
            write!(fm, "+fpu")?;
        }
        if dsp {
            write!(fm, "+dsp")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ArchParseError {
    #[error("Unknown base architecture: '{0}'")]
    UnknownBase(String),
    #[error("Unknown feature: '{0}'")]
    UnknownFeature(String),
}

impl std::str::FromStr for Arch {
    type Err = ArchParseError;

    /// Parse a target architecture string.
    ///
    /// A target architecture string should be specified in the following form:
    /// `base+feat1-feat2`
    ///
    ///  - `base` chooses a named architecture from `NAMED_ARCHS`.
    ///  - `+feat1` enables the feature `feat1`.
    ///  - `-feat2` disables the feature `feat2`.
    ///
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut i = s.find(['-', '+']).unwrap_or(s.len());
        let base = &s[0..i];
        let mut arch = Self::NAMED_ARCHS
            .iter()
            .find(|x| x.0 == base)
            .ok_or_else(|| ArchParseError::UnknownBase(base.to_owned()))?
            .1;

        while i < s.len() {
            let add = s.as_bytes()[i] == b'+';
            i += 1;

            // Find the next `-` or `+`
            let k = s[i..].find(['-', '+']).map_or(s.len(), |k| k + i);

            let feature = &s[i..k];

            arch = arch
                .with_feature_by_name(feature, add)
                .ok_or_else(|| ArchParseError::UnknownFeature(feature.to_owned()))?;

            i = k;
        }

        Ok(arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_round_trip() {
        for (_, arch) in Arch::NAMED_ARCHS {
            let arch_str = arch.to_string();
            let arch2: Arch = arch_str.parse().unwrap();
            assert_eq!(*arch, arch2);
        }
    }

    #[test]
    fn arch_features() {
        assert_eq!(
            "cortex_m33+fpu".parse::<Arch>().unwrap(),
            Arch::CORTEX_M33_FPU
        );
        assert_eq!("cortex_m4f-fpu-dsp".parse::<Arch>().unwrap(), Arch::CORTEX_M3);
        assert!(matches!(
            "cortex_m3+mve".parse::<Arch>(),
            Err(ArchParseError::UnknownFeature(f)) if f == "mve"
        ));
        assert!(matches!(
            "cortex_a9".parse::<Arch>(),
            Err(ArchParseError::UnknownBase(_))
        ));
    }

    #[test]
    fn unsupported_combination() {
        let arch = Arch::ArmM {
            version: ArmMVersion::Armv6M,
            fpu: true,
            dsp: false,
        };
        assert!(arch.build_opt().is_none());
    }

    #[test]
    fn all_targets_are_buildable() {
        let mut names: Vec<_> = TARGETS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TARGETS.len(), "duplicate target names");

        for (name, target) in TARGETS {
            let arch = target.target_arch();
            assert!(arch.build_opt().is_some(), "{name}: {arch}");
            assert!(target.memory_layout_script().contains("MEMORY"), "{name}");
        }
    }
}

//! Checking the semihosting trap routine in a linked image
//!
//! The debug host only recognizes a request if the routine consists of exactly
//! the expected instructions, so the bytes of `__semihost_call` in the ELF are
//! compared against [`arm_semihosting::TRAP_SEQUENCE_THUMB`].
use goblin::elf::{section_header::SHT_NOBITS, Elf};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub(crate) enum TrapCheckError {
    #[error("Could not read {0:?}.")]
    Read(std::path::PathBuf, #[source] std::io::Error),
    #[error("Could not parse the ELF image.")]
    Parse(#[source] goblin::error::Error),
    #[error("The image doesn't define the symbol `{0}`.")]
    SymbolNotFound(&'static str),
    #[error("The symbol `{0}` doesn't point to file-backed contents.")]
    NoContents(&'static str),
    #[error("`{symbol}` is {actual:02x?}, but the debug host expects {expected:02x?}.")]
    Mismatch {
        symbol: &'static str,
        actual: Vec<u8>,
        expected: &'static [u8],
    },
}

/// Verify the trap routine of the T32 image at `exe`.
pub(crate) async fn check_image(exe: &Path) -> Result<(), TrapCheckError> {
    let image = tokio::fs::read(exe)
        .await
        .map_err(|e| TrapCheckError::Read(exe.to_owned(), e))?;
    check_elf(&image, &arm_semihosting::TRAP_SEQUENCE_THUMB)
}

fn check_elf(image: &[u8], expected: &'static [u8]) -> Result<(), TrapCheckError> {
    let symbol = arm_semihosting::TRAP_SYMBOL;
    let elf = Elf::parse(image).map_err(TrapCheckError::Parse)?;

    let sym = elf
        .syms
        .iter()
        .find(|sym| elf.strtab.get_at(sym.st_name) == Some(symbol))
        .ok_or(TrapCheckError::SymbolNotFound(symbol))?;

    // The lowest bit of a T32 function's address is the Thumb bit
    let address = sym.st_value & !1;
    log::debug!("{symbol} = {address:#x} (size = {})", sym.st_size);

    let section = elf
        .section_headers
        .get(sym.st_shndx)
        .filter(|sh| sh.sh_type != SHT_NOBITS)
        .ok_or(TrapCheckError::NoContents(symbol))?;

    let actual = address
        .checked_sub(section.sh_addr)
        .map(|offset| section.sh_offset + offset)
        .and_then(|start| {
            let start = usize::try_from(start).ok()?;
            image.get(start..start.checked_add(expected.len())?)
        })
        .ok_or(TrapCheckError::NoContents(symbol))?;

    check_bytes(symbol, actual, expected)?;

    if sym.st_size != 0 && sym.st_size != expected.len() as u64 {
        log::warn!(
            "`{symbol}` is {} bytes long; expected {}",
            sym.st_size,
            expected.len()
        );
    }

    Ok(())
}

fn check_bytes(
    symbol: &'static str,
    actual: &[u8],
    expected: &'static [u8],
) -> Result<(), TrapCheckError> {
    if actual == expected {
        Ok(())
    } else {
        Err(TrapCheckError::Mismatch {
            symbol,
            actual: actual.to_owned(),
            expected,
        })
    }
}

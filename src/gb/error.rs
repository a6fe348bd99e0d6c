use thiserror::Error;

pub type EmuResult<T> = Result<T, EmuError>;

/// Errors surfaced by the emulator core.
///
/// `MalformedRom` and `UnsupportedCartridge` can only occur while loading a
/// cartridge image, `SaveData` while importing or exporting battery RAM.
/// `IllegalOpcode` and `StateInvariant` abort the step loop; the former
/// indicates a runaway program counter, the latter a bug in the emulator.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("malformed ROM: {0}")]
    MalformedRom(String),

    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedCartridge(u8),

    #[error("save data error: {0}")]
    SaveData(String),

    #[error("illegal opcode {opcode:#04x} at {pc:#06x}")]
    IllegalOpcode { opcode: u8, pc: u16 },

    #[error("emulator invariant violated: {0}")]
    StateInvariant(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

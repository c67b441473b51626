use thiserror::Error;

/// Failures that can occur while parsing and loading an iNES cartridge image.
#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("failed to read ROM file: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is too short to contain an iNES header")]
    ShortHeader,

    #[error("not a valid iNES file (missing \"NES\\x1A\" magic)")]
    BadMagic,

    #[error("iNES version 2 is not supported")]
    Ines2NotSupported,

    #[error("mapper {0} is not supported")]
    UnsupportedMapper(u8),

    #[error("file is too short to contain the PRG/CHR data its header describes")]
    ShortBody,
}

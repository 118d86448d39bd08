use thiserror::Error;

/// Errors raised while setting up an emulation session.
///
/// Nothing inside the running core returns these: once a session exists,
/// faults are logged and surface through the execution-break flag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmuError {
    #[error("BIOS image must be exactly {expected} bytes, got {actual}")]
    BiosSize { expected: usize, actual: usize },

    #[error("ROM image is empty")]
    EmptyRom,

    #[error("ROM image is {actual} bytes, larger than the {max} byte cartridge space")]
    RomTooLarge { max: usize, actual: usize },
}

//! # Processor Modes
//!
//! The ARM7TDMI has seven operating modes. Each exception mode owns a
//! private copy of some registers ("banked" registers), swapped in when the
//! mode is entered:
//!
//! ```text
//! ┌────────────┬───────┬─────────────────────────────┐
//! │ Mode       │ M4-M0 │ Private registers           │
//! ├────────────┼───────┼─────────────────────────────┤
//! │ User       │ 10000 │ -                           │
//! │ System     │ 11111 │ - (shares User registers)   │
//! │ FIQ        │ 10001 │ R8-R14, SPSR                │
//! │ IRQ        │ 10010 │ R13-R14, SPSR               │
//! │ Supervisor │ 10011 │ R13-R14, SPSR               │
//! │ Abort      │ 10111 │ R13-R14, SPSR               │
//! │ Undefined  │ 11011 │ R13-R14, SPSR               │
//! └────────────┴───────┴─────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// The normal ARM program execution state.
    User = 0b10000,

    /// Designed to support a data transfer or channel process.
    Fiq = 0b10001,

    /// Used for general-purpose interrupt handling.
    Irq = 0b10010,

    /// Protected mode for the operating system
    Supervisor = 0b10011,

    /// Entered after a data or instruction prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed
    Undefined = 0b11011,

    /// A privileged user mode for the operating system.
    System = 0b11111,
}

impl Mode {
    pub const ALL: [Self; 7] = [
        Self::User,
        Self::Fiq,
        Self::Irq,
        Self::Supervisor,
        Self::Abort,
        Self::Undefined,
        Self::System,
    ];

    /// Which register bank this mode reads R13/R14 (and possibly R8-R12) from.
    #[must_use]
    pub const fn bank(self) -> Bank {
        match self {
            Self::User | Self::System => Bank::UserSystem,
            Self::Fiq => Bank::Fiq,
            Self::Irq => Bank::Irq,
            Self::Supervisor => Bank::Supervisor,
            Self::Abort => Bank::Abort,
            Self::Undefined => Bank::Undefined,
        }
    }

    /// Every mode but User may touch the control bits of CPSR.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::User)
    }

    /// Only exception modes own an SPSR.
    #[must_use]
    pub const fn has_spsr(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(format!("Unexpected value for Mode: 0b{n:05b}")),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "USR",
            Self::Fiq => "FIQ",
            Self::Irq => "IRQ",
            Self::Supervisor => "SVC",
            Self::Abort => "ABT",
            Self::Undefined => "UND",
            Self::System => "SYS",
        })
    }
}

/// Index of a banked register set. User and System share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bank {
    UserSystem = 0,
    Fiq = 1,
    Irq = 2,
    Supervisor = 3,
    Abort = 4,
    Undefined = 5,
}

impl Bank {
    pub const COUNT: usize = 6;

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

use serde::{Deserialize, Serialize};

/// How the arctangent BIOS services compute their result.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrigAccuracy {
    /// The firmware's fixed-point polynomial, bit for bit.
    #[default]
    Polynomial,
    /// Floating-point `atan`/`atan2` scaled to the same fixed-point range.
    Exact,
}

/// Knobs of an emulation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmuConfig {
    pub trig_accuracy: TrigAccuracy,

    /// Service SWIs in the emulator instead of jumping to the BIOS vector.
    pub hle_bios: bool,

    /// Start at the cartridge entry point with the post-boot register state.
    pub skip_bios_intro: bool,

    /// Upper bound on the clocks the CPU runs before peripherals catch up.
    pub cpu_step_clocks: u32,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            trig_accuracy: TrigAccuracy::default(),
            hle_bios: true,
            skip_bios_intro: true,
            cpu_step_clocks: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = EmuConfig::default();
        assert_eq!(config.trig_accuracy, TrigAccuracy::Polynomial);
        assert!(config.hle_bios);
        assert!(config.skip_bios_intro);
        assert_eq!(config.cpu_step_clocks, 64);
    }
}

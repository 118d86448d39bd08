use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use emu::config::{EmuConfig, TrigAccuracy};
use emu::error::EmuError;
use emu::gba::Gba;
use serde::Deserialize;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(version, about = "Runs a Game Boy Advance ROM headless.", long_about = None)]
struct Args {
    #[arg(name = "ROM")]
    rom: PathBuf,

    /// 16 KiB BIOS image. Without one the built-in vectors are used.
    #[arg(long, value_name = "PATH")]
    bios: Option<PathBuf>,

    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// TOML file with `[emu]` and `[log]` sections.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Floating-point arctangent instead of the firmware polynomial.
    #[arg(long)]
    exact_trig: bool,

    /// Let SWIs jump to the BIOS vector instead of emulating the services.
    #[arg(long)]
    no_hle: bool,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct RunnerConfig {
    emu: EmuConfig,
    log: LogConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
struct LogConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    filter: String,
    file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Error)]
enum RunnerError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Emu(#[from] EmuError),
}

fn read(path: &Path) -> Result<Vec<u8>, RunnerError> {
    fs::read(path).map_err(|source| RunnerError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(path: &Path) -> Result<RunnerConfig, RunnerError> {
    let text = fs::read_to_string(path).map_err(|source| RunnerError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| RunnerError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Command-line flags win over the config file.
fn apply_args(config: &mut RunnerConfig, args: &Args) {
    if args.exact_trig {
        config.emu.trig_accuracy = TrigAccuracy::Exact;
    }
    if args.no_hle {
        config.emu.hle_bios = false;
    }
    if let Some(path) = &args.log_file {
        config.log.file = Some(path.clone());
    }
}

/// Installs the subscriber. The returned guard flushes the log file when
/// dropped.
fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, RunnerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let console = fmt::layer().with_writer(std::io::stderr);

    let Some(path) = &config.file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .init();
        return Ok(None);
    };

    let file = File::create(path).map_err(|source| RunnerError::LogFile {
        path: path.clone(),
        source,
    })?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

fn print_summary(gba: &Gba) {
    let registers = gba.registers();
    for (row, chunk) in registers.chunks(4).enumerate() {
        let line = chunk
            .iter()
            .enumerate()
            .map(|(i, value)| format!("R{:<2} {value:08X}", row * 4 + i))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{line}");
    }
    println!("CPSR {}  {:?}", gba.cpsr(), gba.halt_state());
    println!("next {}", gba.next_instruction());
}

fn run(args: &Args) -> Result<(), RunnerError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RunnerConfig::default(),
    };
    apply_args(&mut config, args);
    let _guard = init_logging(&config.log)?;

    let rom = read(&args.rom)?;
    let bios = args.bios.as_deref().map(read).transpose()?;
    tracing::info!("loading {}", args.rom.display());
    let mut gba = Gba::new(config.emu, rom, bios)?;

    let started = Instant::now();
    let mut clocks = 0;
    for frame in 0..args.frames {
        clocks += gba.run_frame();
        if gba.is_break_requested() {
            tracing::warn!(
                "execution stopped during frame {frame} at 0x{:08X}",
                gba.cpu().current_address
            );
            break;
        }
    }
    tracing::info!(
        "{} frames, {clocks} clocks in {:.2?}",
        gba.frame(),
        started.elapsed()
    );

    print_summary(&gba);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("satsuma: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_file_sections() {
        let config: RunnerConfig = toml::from_str(
            r#"
            [emu]
            trig_accuracy = "exact"
            cpu_step_clocks = 128

            [log]
            filter = "emu=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.emu.trig_accuracy, TrigAccuracy::Exact);
        assert_eq!(config.emu.cpu_step_clocks, 128);
        assert!(config.emu.hle_bios);
        assert_eq!(config.log.filter, "emu=debug");
        assert_eq!(config.log.file, None);
    }

    #[test]
    fn empty_config_is_the_default() {
        let config: RunnerConfig = toml::from_str("").unwrap();
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn flags_override_the_file() {
        let args = Args::parse_from([
            "satsuma",
            "game.gba",
            "--no-hle",
            "--exact-trig",
            "--log-file",
            "run.log",
        ]);
        let mut config = RunnerConfig::default();
        apply_args(&mut config, &args);

        assert!(!config.emu.hle_bios);
        assert_eq!(config.emu.trig_accuracy, TrigAccuracy::Exact);
        assert_eq!(config.log.file, Some(PathBuf::from("run.log")));
        assert_eq!(args.frames, 60);
    }
}

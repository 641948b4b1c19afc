use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")\nbuilt:   ",
    env!("BUILD_TIMESTAMP"),
    "\ndsd lib: ",
    env!("DSD_VERSION"),
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting DSF/DSDIFF files and converting DSD audio to PCM or DoP",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat header warnings and damaged stream data as fatal errors.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a DSF or DSDIFF file to PCM, or pack it as DoP.
    Decode(DecodeArgs),

    /// Print stream information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input DSF or DSDIFF file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path; defaults to INPUT with the extension of the chosen format.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Output sample rate in Hz (DSD rate divided by 8, 16 or 32).
    #[arg(long, value_name = "HZ", default_value_t = 352_800)]
    pub sample_rate: u32,

    /// Integer bits per sample.
    #[arg(long, value_enum, default_value_t = BitDepth::TwentyFour)]
    pub bits: BitDepth,

    /// Write 32-bit float samples instead of integers.
    #[arg(long, conflicts_with = "bits")]
    pub float: bool,

    /// Disable TPDF dither on integer output.
    #[arg(long)]
    pub no_dither: bool,

    /// Gain applied before quantization, in dB.
    #[arg(long, value_name = "DB", default_value_t = 0.0, allow_negative_numbers = true)]
    pub scale: f64,

    /// Write one file for the whole stream, ignoring track markers.
    #[arg(long)]
    pub onefile: bool,

    /// Pack the DSD stream as DoP in 24-bit PCM instead of decimating.
    #[arg(long, conflicts_with_all = ["float", "sample_rate"])]
    pub dop: bool,

    /// Audio format for output.
    #[arg(long, value_enum, default_value_t = AudioFormat::Caf)]
    pub format: AudioFormat,

    /// Also write a YAML manifest describing the output files.
    #[arg(long)]
    pub manifest: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input DSF or DSDIFF file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Print a YAML document instead of the text report.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum BitDepth {
    #[value(name = "16")]
    Sixteen,
    #[value(name = "24")]
    TwentyFour,
    #[value(name = "32")]
    ThirtyTwo,
}

impl BitDepth {
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwo => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum AudioFormat {
    /// Core Audio Format (big-endian).
    Caf,
    /// Sony Wave64.
    W64,
    /// Raw little-endian PCM without a header.
    Pcm,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Caf => "caf",
            AudioFormat::W64 => "w64",
            AudioFormat::Pcm => "pcm",
        }
    }
}

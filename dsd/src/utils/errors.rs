#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("Short read at offset {offset}: wanted {wanted} bytes")]
    ShortRead { offset: u64, wanted: usize },

    #[error("Seek to {target} is beyond the end of the stream ({len} bytes)")]
    SeekOutOfRange { target: u64, len: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ContainerError {
    #[error("Expected chunk '{expected}', found '{found}'")]
    BadMagic { expected: String, found: String },

    #[error("Required chunk '{0}' not found")]
    MissingChunk(&'static str),

    #[error("Property chunk is missing required sub-chunk '{0}'")]
    MissingProperty(&'static str),

    #[error("Expected form type '{expected}', found '{found}'")]
    BadFormType { expected: String, found: String },

    #[error("Only one bit DSD is supported, file declares {0} bits per sample")]
    UnsupportedBitDepth(u32),

    #[error("Stream declares zero channels")]
    NoChannels,

    #[error("Stream declares an invalid sampling frequency of {0} Hz")]
    InvalidSamplingFrequency(u32),

    #[error("Block size per channel must be non-zero")]
    InvalidBlockSize,

    #[error("DST frame rate must be non-zero")]
    InvalidFrameRate,

    #[error("Compressed stream requires a DST frame codec")]
    MissingCodec,

    #[error("Unsupported compression type '{0}'")]
    UnsupportedCompression(String),

    #[error("Chunk '{0}' declares a length that overflows 64 bits")]
    LengthOverflow(&'static str),

    #[error("Only .dsf or .dff input files are supported: {0}")]
    UnsupportedInput(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ChunkWarning {
    #[error("Unknown chunk type '{id}' at offset {offset}")]
    Unknown { id: String, offset: u64 },

    #[error("Repeated chunk type '{id}' at offset {offset}")]
    Repeated { id: String, offset: u64 },

    #[error("Malformed '{id}' chunk at offset {offset}: {reason}")]
    Malformed {
        id: String,
        offset: u64,
        reason: String,
    },

    #[error("Could not parse ID3 tag: {0}")]
    Tag(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Incompatible sample rate combination: {input} Hz to {output} Hz")]
    UnsupportedRatio { input: u32, output: u32 },

    #[error("Sample rate {0} Hz is not supported by DoP")]
    UnsupportedDopRate(u32),

    #[error("Buffer length must be greater than zero")]
    ZeroBufferLength,

    #[error("Filter bank must contain at least one coefficient")]
    EmptyFilterBank,
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Frame {frame} failed to decode: {reason}")]
    DecodeFailed { frame: u64, reason: String },
}

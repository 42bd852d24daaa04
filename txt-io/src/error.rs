//! Error types for txt-io

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// txt-io error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error (connection refused, send/receive failure)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device answered with fewer (or more) bytes than the fixed frame size
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Frame size required by the protocol
        expected: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// Response magic id does not acknowledge the request
    #[error("{command}: response id {actual:#010x} does not match {expected:#010x}")]
    ResponseMismatch {
        /// Command the response belongs to
        command: &'static str,
        /// Acknowledgement id the protocol requires
        expected: u32,
        /// Id found in the response
        actual: u32,
    },

    /// Checksum of decompressed words does not match the transmitted CRC
    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// CRC carried in the frame header
        expected: u32,
        /// CRC computed over the unpacked words
        actual: u32,
    },

    /// Compressed response covers a different number of units than configured
    #[error("Response carries {actual} units, session has {expected}")]
    UnitCountMismatch {
        /// Master plus extension units of the session
        expected: usize,
        /// Unit count in the response header
        actual: usize,
    },

    /// Compressed bitstream ended early or encodes more words than expected
    #[error("Malformed bitstream: {0}")]
    Bitstream(String),

    /// Channel or unit index outside the device's range
    #[error("{kind} index {index} out of range (0..{limit})")]
    ChannelOutOfRange {
        /// Channel family (output, input, motor, counter, unit, remote)
        kind: &'static str,
        /// Requested index
        index: usize,
        /// Exclusive upper bound
        limit: usize,
    },

    /// Operation requires a running session
    #[error("Controller is not online")]
    NotOnline,

    /// The exchange loop stopped while the caller was waiting on it
    #[error("Exchange loop stopped")]
    Stopped,

    /// Operation not supported by the active transport
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Background thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::ChannelOutOfRange`]
    pub(crate) fn out_of_range(kind: &'static str, index: usize, limit: usize) -> Self {
        Error::ChannelOutOfRange { kind, index, limit }
    }
}

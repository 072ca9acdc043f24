/// Errors that can occur while decoding or reading the mirroring wire format.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The source reported end-of-data before the requested bytes arrived.
    ///
    /// `received == 0` means the source closed before the read started.
    #[error("stream truncated ({received} of {expected} bytes received)")]
    Truncated { expected: usize, received: usize },

    /// A fixed-size structure was decoded from too few bytes.
    #[error("malformed header (need {expected} bytes, got {actual})")]
    MalformedHeader { expected: usize, actual: usize },

    /// The declared payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing the stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the source closed before delivering a single requested byte.
    pub fn is_clean_eof(&self) -> bool {
        matches!(self, FrameError::Truncated { received: 0, .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

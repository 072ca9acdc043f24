use std::fmt;

use mirrorwire_frame::{CodecId, FrameError};
use mirrorwire_transport::TransportError;

/// The handshake reads that can fail, in wire order. The probe byte never
/// fails a handshake, so it has no step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    DeviceName,
    CodecMeta,
}

impl HandshakeStep {
    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeStep::DeviceName => "device-name",
            HandshakeStep::CodecMeta => "codec-meta",
        }
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a [`SessionError`], as reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TruncatedStream,
    HandshakeFailed,
    MalformedHeader,
    SourceClosed,
    PayloadTooLarge,
    Transport,
    Sink,
}

/// Errors that end a stream session. Every variant is terminal.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The source ended inside a frame header or payload.
    #[error("stream truncated ({received} of {expected} bytes received)")]
    TruncatedStream { expected: usize, received: usize },

    /// The source ended during one of the handshake reads.
    #[error("handshake failed at {step} ({received} of {expected} bytes received)")]
    HandshakeFailed {
        step: HandshakeStep,
        expected: usize,
        received: usize,
    },

    /// A fixed-size structure was decoded from too few bytes.
    #[error("malformed header (need {expected} bytes, got {actual})")]
    MalformedHeader { expected: usize, actual: usize },

    /// The session was cancelled, or is already closed.
    #[error("source closed")]
    SourceClosed,

    /// A frame header declared more payload than the session accepts.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Opening the byte source failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The byte source reported an I/O error other than end-of-data.
    #[error("stream I/O error: {0}")]
    Io(std::io::Error),

    /// A consumer sink failed to accept an event.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::TruncatedStream { .. } => ErrorKind::TruncatedStream,
            SessionError::HandshakeFailed { .. } => ErrorKind::HandshakeFailed,
            SessionError::MalformedHeader { .. } => ErrorKind::MalformedHeader,
            SessionError::SourceClosed => ErrorKind::SourceClosed,
            SessionError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            SessionError::Transport(_) | SessionError::Io(_) => ErrorKind::Transport,
            SessionError::Sink(_) => ErrorKind::Sink,
        }
    }

    /// Map a frame-level error raised during a handshake step.
    pub(crate) fn from_handshake(step: HandshakeStep, err: FrameError) -> Self {
        match err {
            FrameError::Truncated { expected, received } => SessionError::HandshakeFailed {
                step,
                expected,
                received,
            },
            other => other.into(),
        }
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Truncated { expected, received } => {
                SessionError::TruncatedStream { expected, received }
            }
            FrameError::MalformedHeader { expected, actual } => {
                SessionError::MalformedHeader { expected, actual }
            }
            FrameError::PayloadTooLarge { size, max } => {
                SessionError::PayloadTooLarge { size, max }
            }
            FrameError::Io(err) => SessionError::Io(err),
        }
    }
}

/// Errors raised by consumer sinks.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing to the sink's destination failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sink subprocess exited unsuccessfully.
    #[error("{program} exited with {status}")]
    ProcessFailed {
        program: String,
        status: std::process::ExitStatus,
    },

    /// A sink subprocess stopped accepting input.
    #[error("{0} closed its input")]
    ProcessGone(String),

    /// The sink has no way to handle this codec.
    #[error("no ffmpeg input format for codec {0}")]
    UnsupportedCodec(CodecId),
}

pub type Result<T> = std::result::Result<T, SessionError>;

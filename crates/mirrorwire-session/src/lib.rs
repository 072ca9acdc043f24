//! Stream sessions for device-mirroring video streams.
//!
//! This is the layer consumers use. Open a byte source, let the session run
//! the one-time handshake, then pull frames until the stream ends, or hand
//! the session to [`run_session`] / [`spawn_session`] with a [`FrameSink`].
//!
//! ```no_run
//! use mirrorwire_session::{FileSink, SessionConfig, StreamSession, run_session};
//! use mirrorwire_transport::Endpoint;
//!
//! let endpoint: Endpoint = "127.0.0.1:27183".parse()?;
//! let mut session = StreamSession::connect(&endpoint, SessionConfig::default())?;
//! let mut sink = FileSink::create("capture.h264")?;
//! let summary = run_session(&mut session, &mut sink)?;
//! println!("{} frames from {}", summary.frames, summary.meta.device_name());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cancel;
pub mod error;
pub mod handshake;
pub mod run;
pub mod session;
pub mod sink;
pub mod worker;

#[cfg(feature = "async")]
pub mod async_session;

pub use cancel::CancelHandle;
pub use error::{ErrorKind, HandshakeStep, Result, SessionError, SinkError};
pub use handshake::{
    perform_handshake, HandshakeConfig, HandshakeOutcome, ProbeResult, DEFAULT_PROBE_TIMEOUT,
    MIN_PROBE_TIMEOUT,
};
pub use run::{run_session, SessionSummary};
pub use session::{SessionConfig, SessionState, StreamSession};
pub use sink::{
    ffmpeg_input_format, ffmpeg_remux_command, FileSink, FrameSink, FrameStats, ProcessSink,
};
pub use worker::{spawn_session, SessionHandle};

#[cfg(feature = "async")]
pub use async_session::{perform_handshake_async, AsyncStreamSession};

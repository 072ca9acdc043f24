//! Byte-source abstraction for device-mirroring streams.
//!
//! The mirroring service is reached through a tunnel that some other tool
//! (typically `adb forward`) has already set up. This crate only opens the
//! resulting local endpoint and exposes it as a [`ByteSource`]:
//! - TCP (`tcp:127.0.0.1:27183` or bare `127.0.0.1:27183`)
//! - Unix domain sockets (`unix:/path/to.sock`, Unix only)
//!
//! This is the lowest layer of mirrorwire. Everything else reads through
//! the [`ByteSource`] trait defined here.

pub mod endpoint;
pub mod error;
pub mod traits;

#[cfg(feature = "async")]
pub mod async_stream;

pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use error::{Result, TransportError};
pub use traits::{ByteSource, MirrorStream, SourceCloser};

#[cfg(feature = "async")]
pub use async_stream::AsyncMirrorStream;

//! Reader for device-mirroring video streams.
//!
//! mirrorwire connects to a forwarded mirroring endpoint, performs the
//! one-time handshake (probe byte, device name, codec metadata) and then
//! yields length-prefixed video frames until the stream ends.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte sources and endpoints (TCP, Unix sockets)
//! - [`frame`]: wire codec, exact reads and the frame reader
//! - [`session`]: handshake, stream sessions, cancellation and sinks

/// Re-export transport types.
pub mod transport {
    pub use mirrorwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mirrorwire_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use mirrorwire_session::*;
}

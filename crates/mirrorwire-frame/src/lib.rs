//! Wire codec and frame reader for the device-mirroring video stream.
//!
//! The video socket carries, in order:
//! - an optional 1-byte probe ("dummy byte") on forwarded connections
//! - a 64-byte NUL-padded device name
//! - 12 bytes of codec metadata (codec id, width, height)
//! - repeated 12-byte frame headers, each followed by an opaque payload
//!
//! All integers are big-endian. Partial reads are absorbed by
//! [`read_exactly`]; callers always get complete structures.

pub mod codec;
pub mod error;
pub mod read;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_device_name, decode_frame, encode_device_name, encode_frame, CodecId, CodecMeta, Frame,
    FrameConfig, FrameHeader, StreamMeta, CODEC_META_LEN, DEFAULT_MAX_PAYLOAD, DEVICE_NAME_LEN,
    FRAME_HEADER_LEN, PTS_MASK,
};
pub use error::{FrameError, Result};
pub use read::{read_array, read_exactly};
pub use reader::FrameReader;
pub use writer::StreamWriter;

#[cfg(feature = "async")]
pub use async_codec::StreamCodec;

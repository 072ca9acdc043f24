use std::io::Read;

use tracing::{debug, trace};

use crate::codec::{Frame, FrameConfig, FrameHeader, FRAME_HEADER_LEN};
use crate::error::{FrameError, Result};
use crate::read::{read_array, read_exactly};

/// Reads complete frames (header + payload) from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames, in
/// wire order, one per call. Nothing is read ahead.
///
/// Once the stream ends (cleanly or not) the reader is fused: further calls
/// return `Ok(None)` without touching the stream.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
    finished: bool,
    frames_read: u64,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            finished: false,
            frames_read: 0,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` when the stream closes exactly at a frame boundary.
    /// A stream that closes inside a header or payload is
    /// [`FrameError::Truncated`].
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let result = self.read_one();
        match &result {
            Ok(Some(_)) => self.frames_read += 1,
            Ok(None) | Err(_) => self.finished = true,
        }
        result
    }

    fn read_one(&mut self) -> Result<Option<Frame>> {
        let raw: [u8; FRAME_HEADER_LEN] = match read_array(&mut self.inner) {
            Ok(raw) => raw,
            Err(err) if err.is_clean_eof() => {
                debug!(frames = self.frames_read, "end of stream at frame boundary");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let header = FrameHeader::decode(&raw)?;
        let size = header.payload_size as usize;
        if size > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.config.max_payload_size,
            });
        }

        let payload = read_exactly(&mut self.inner, size)?;
        trace!(
            pts = header.pts,
            size,
            config = header.is_config,
            keyframe = header.is_keyframe,
            "frame read"
        );

        Ok(Some(Frame::from_parts(header, payload)))
    }

    /// Whether end-of-stream or an error has been reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of complete frames returned so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

impl<T: Read> std::iter::FusedIterator for FrameReader<T> {}

use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_device_name, encode_frame, Frame, StreamMeta};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes the server side of the mirroring wire format to any `Write` stream.
///
/// Used to replay captured streams and to stand in for a device in tests.
pub struct StreamWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> StreamWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write the single probe byte sent on forwarded connections.
    pub fn write_probe_byte(&mut self) -> Result<()> {
        self.write_all(&[0u8])
    }

    /// Write the device name and codec metadata blocks.
    pub fn write_meta(&mut self, meta: &StreamMeta) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(&encode_device_name(meta.device_name()));
        self.buf.extend_from_slice(&meta.codec().to_bytes());
        self.flush_buf()
    }

    /// Write one frame header followed by its payload.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf);
        self.flush_buf()
    }

    fn flush_buf(&mut self) -> Result<()> {
        let buf = std::mem::take(&mut self.buf);
        let result = self.write_all(&buf);
        self.buf = buf;
        result
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < data.len() {
            match self.inner.write(&data[offset..]) {
                Ok(0) => {
                    return Err(FrameError::Io(std::io::Error::from(ErrorKind::WriteZero)))
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream, e.g. to inject malformed bytes.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{decode_device_name, CodecId, CodecMeta, FRAME_HEADER_LEN};
    use crate::reader::FrameReader;

    #[test]
    fn writes_handshake_layout() {
        let meta = StreamMeta::new(
            "Pixel",
            CodecMeta {
                codec_id: CodecId(1),
                width: 1280,
                height: 720,
            },
        );
        let mut writer = StreamWriter::new(Vec::new());
        writer.write_probe_byte().unwrap();
        writer.write_meta(&meta).unwrap();

        let wire = writer.into_inner();
        assert_eq!(wire.len(), 1 + 64 + 12);
        assert_eq!(decode_device_name(&wire[1..65]).unwrap(), "Pixel");
        assert_eq!(
            &wire[65..],
            &[0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x02, 0xD0]
        );
    }

    #[test]
    fn written_frames_read_back() {
        let mut writer = StreamWriter::new(Cursor::new(Vec::new()));
        let frame = Frame::new(false, true, 1_000, &b"idr"[..]).unwrap();
        writer.write_frame(&frame).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire.len(), FRAME_HEADER_LEN + 3);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(reader.next_frame().unwrap().unwrap(), frame);
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let sink = InterruptedOnce {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };
        let mut writer = StreamWriter::new(sink);
        writer.write_probe_byte().unwrap();
        assert_eq!(writer.get_ref().data, vec![0u8]);
    }

    #[test]
    fn zero_write_is_an_error() {
        let mut writer = StreamWriter::new(ZeroWriter);
        let err = writer.write_probe_byte().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WriteZero));
    }

    struct InterruptedOnce {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, FrameConfig, FrameHeader, FRAME_HEADER_LEN};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for the post-handshake frame loop.
///
/// Decoding yields one [`Frame`] per header + payload. End of input on an
/// empty buffer ends the stream; end of input with buffered bytes is
/// [`FrameError::Truncated`].
#[derive(Debug, Clone, Default)]
pub struct StreamCodec {
    config: FrameConfig,
}

impl StreamCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for StreamCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.config.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let err = if src.len() < FRAME_HEADER_LEN {
            FrameError::Truncated {
                expected: FRAME_HEADER_LEN,
                received: src.len(),
            }
        } else {
            let header = FrameHeader::decode(&src[..FRAME_HEADER_LEN])?;
            FrameError::Truncated {
                expected: header.payload_size as usize,
                received: src.len() - FRAME_HEADER_LEN,
            }
        };
        src.clear();
        Err(err)
    }
}

impl Encoder<&Frame> for StreamCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn decodes_frames_from_async_reader() {
        let mut wire = BytesMut::new();
        let frames = vec![
            Frame::new(true, false, 0, &b"cfg"[..]).unwrap(),
            Frame::new(false, true, 5, &b"key"[..]).unwrap(),
        ];
        for frame in &frames {
            encode_frame(frame, &mut wire);
        }

        let bytes = wire.to_vec();
        let mut framed = FramedRead::new(bytes.as_slice(), StreamCodec::default());
        assert_eq!(framed.next().await.unwrap().unwrap(), frames[0]);
        assert_eq!(framed.next().await.unwrap().unwrap(), frames[1]);
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_payload_at_eof_is_an_error() {
        let header = FrameHeader {
            payload_size: 100,
            ..FrameHeader::default()
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 40]);

        let mut framed = FramedRead::new(bytes.as_slice(), StreamCodec::default());
        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 100,
                received: 40
            }
        ));
    }

    #[tokio::test]
    async fn eof_after_complete_header_is_truncation() {
        let header = FrameHeader {
            payload_size: 10,
            ..FrameHeader::default()
        };
        let bytes = header.to_bytes().to_vec();

        let mut framed = FramedRead::new(bytes.as_slice(), StreamCodec::default());
        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 10,
                received: 0
            }
        ));
    }

    #[tokio::test]
    async fn encoder_writes_wire_format() {
        let frame = Frame::new(false, false, 77, &b"p"[..]).unwrap();
        let mut framed = FramedWrite::new(Vec::new(), StreamCodec::default());
        framed.send(&frame).await.unwrap();

        let wire = framed.into_inner();
        let mut buf = BytesMut::from(wire.as_slice());
        assert_eq!(
            decode_frame(&mut buf, usize::MAX).unwrap().unwrap(),
            frame
        );
    }
}

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::read::READ_CHUNK_SIZE;

/// Device name field: 64 bytes, UTF-8, NUL padded.
pub const DEVICE_NAME_LEN: usize = 64;

/// Codec metadata: codec id (4) + width (4) + height (4) = 12 bytes.
pub const CODEC_META_LEN: usize = 12;

/// Frame header: flags and pts (8) + payload size (4) = 12 bytes.
pub const FRAME_HEADER_LEN: usize = 12;

/// Low 62 bits of the first header word carry the presentation timestamp.
pub const PTS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

const FLAG_CONFIG: u64 = 1 << 63;
const FLAG_KEYFRAME: u64 = 1 << 62;

/// Default maximum payload size: anything a u32 length can declare.
pub const DEFAULT_MAX_PAYLOAD: usize = u32::MAX as usize;

/// Codec identifier, also readable as a four-character tag (MSB first).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecId(pub u32);

impl CodecId {
    pub const H264: CodecId = CodecId(u32::from_be_bytes(*b"h264"));
    pub const H265: CodecId = CodecId(u32::from_be_bytes(*b"h265"));
    pub const AV1: CodecId = CodecId(u32::from_be_bytes(*b"av01"));

    /// The four 8-bit segments of the id, most significant first.
    pub fn tag_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// The id as a four-character tag, one char per byte.
    pub fn tag(self) -> String {
        self.tag_bytes().iter().map(|&b| char::from(b)).collect()
    }

    /// Friendly codec name for the ids the mirroring server is known to send.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::H264 => Some("H.264"),
            Self::H265 => Some("H.265"),
            Self::AV1 => Some("AV1"),
            _ => None,
        }
    }
}

impl fmt::Debug for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecId({:#010x} {:?})", self.0, self.tag())
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for CodecId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Codec id and picture dimensions announced once after the device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecMeta {
    pub codec_id: CodecId,
    pub width: u32,
    pub height: u32,
}

impl CodecMeta {
    /// Decode the 12-byte codec metadata block.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut src = fixed(src, CODEC_META_LEN)?;
        Ok(Self {
            codec_id: CodecId(src.get_u32()),
            width: src.get_u32(),
            height: src.get_u32(),
        })
    }

    /// Encode into the 12-byte wire layout.
    pub fn to_bytes(&self) -> [u8; CODEC_META_LEN] {
        let mut out = [0u8; CODEC_META_LEN];
        out[0..4].copy_from_slice(&self.codec_id.0.to_be_bytes());
        out[4..8].copy_from_slice(&self.width.to_be_bytes());
        out[8..12].copy_from_slice(&self.height.to_be_bytes());
        out
    }
}

/// Everything the handshake announces. Built once per session, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMeta {
    device_name: String,
    codec: CodecMeta,
}

impl StreamMeta {
    pub fn new(device_name: impl Into<String>, codec: CodecMeta) -> Self {
        Self {
            device_name: device_name.into(),
            codec,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn codec_id(&self) -> CodecId {
        self.codec.codec_id
    }

    pub fn width(&self) -> u32 {
        self.codec.width
    }

    pub fn height(&self) -> u32 {
        self.codec.height
    }

    pub fn codec(&self) -> &CodecMeta {
        &self.codec
    }
}

/// Decode the 64-byte device name field.
///
/// Trailing NUL padding is trimmed; invalid UTF-8 is replaced lossily.
pub fn decode_device_name(src: &[u8]) -> Result<String> {
    let raw = fixed(src, DEVICE_NAME_LEN)?;
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

/// Encode a device name into the 64-byte NUL-padded field.
///
/// Names longer than the field are cut at the last char boundary that fits.
pub fn encode_device_name(name: &str) -> [u8; DEVICE_NAME_LEN] {
    let mut end = name.len().min(DEVICE_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = [0u8; DEVICE_NAME_LEN];
    out[..end].copy_from_slice(&name.as_bytes()[..end]);
    out
}

/// Per-frame header: two flags, a 62-bit timestamp and the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// The payload is codec configuration (parameter sets), not a picture.
    pub is_config: bool,
    /// The payload decodes without reference to earlier frames.
    pub is_keyframe: bool,
    /// Presentation timestamp, 62 significant bits.
    pub pts: u64,
    /// Payload length in bytes.
    pub payload_size: u32,
}

impl FrameHeader {
    /// Decode the 12-byte frame header.
    ///
    /// Wire format:
    /// ```text
    /// ┌───┬───┬──────────────────────┬──────────────────┐
    /// │ C │ K │ PTS (62 bits)        │ Payload size     │
    /// │b63│b62│ b61..b0              │ (4B BE)          │
    /// └───┴───┴──────────────────────┴──────────────────┘
    ///   └────── 8B BE ──────────────┘
    /// ```
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut src = fixed(src, FRAME_HEADER_LEN)?;
        let word = src.get_u64();
        let payload_size = src.get_u32();
        Ok(Self {
            is_config: word & FLAG_CONFIG != 0,
            is_keyframe: word & FLAG_KEYFRAME != 0,
            pts: word & PTS_MASK,
            payload_size,
        })
    }

    /// Encode into the 12-byte wire layout. Timestamp bits above 61 are dropped.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0..8].copy_from_slice(&self.flags_and_pts().to_be_bytes());
        out[8..12].copy_from_slice(&self.payload_size.to_be_bytes());
        out
    }

    /// The packed first header word.
    pub fn flags_and_pts(&self) -> u64 {
        let mut word = self.pts & PTS_MASK;
        if self.is_config {
            word |= FLAG_CONFIG;
        }
        if self.is_keyframe {
            word |= FLAG_KEYFRAME;
        }
        word
    }
}

/// A frame header plus its exclusively owned payload.
///
/// The payload length always equals `header.payload_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    /// Build a frame, deriving `payload_size` from the payload.
    pub fn new(
        is_config: bool,
        is_keyframe: bool,
        pts: u64,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        let payload_size = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        Ok(Self {
            header: FrameHeader {
                is_config,
                is_keyframe,
                pts: pts & PTS_MASK,
                payload_size,
            },
            payload,
        })
    }

    pub(crate) fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        debug_assert_eq!(header.payload_size as usize, payload.len());
        Self { header, payload }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn is_config(&self) -> bool {
        self.header.is_config
    }

    pub fn is_keyframe(&self) -> bool {
        self.header.is_keyframe
    }

    pub fn pts(&self) -> u64 {
        self.header.pts
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }
}

/// Append a frame (header + payload) in wire format.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(frame.wire_size());
    dst.put_slice(&frame.header.to_bytes());
    dst.put_slice(&frame.payload);
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. While waiting, the
/// buffer grows by at most one read chunk past what has arrived.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let header = FrameHeader::decode(&src[..FRAME_HEADER_LEN])?;
    let payload_len = header.payload_size as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = FRAME_HEADER_LEN + payload_len;
    if src.len() < total {
        src.reserve((total - src.len()).min(READ_CHUNK_SIZE));
        return Ok(None);
    }

    src.advance(FRAME_HEADER_LEN);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame::from_parts(header, payload)))
}

/// Configuration for frame reading.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size accepted from a header. Default: no limit beyond u32.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

fn fixed(src: &[u8], expected: usize) -> Result<&[u8]> {
    if src.len() < expected {
        return Err(FrameError::MalformedHeader {
            expected,
            actual: src.len(),
        });
    }
    Ok(&src[..expected])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_codec_meta() {
        let meta =
            CodecMeta::decode(&[0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x02, 0xD0])
                .unwrap();
        assert_eq!(meta.codec_id, CodecId(1));
        assert_eq!(meta.width, 1280);
        assert_eq!(meta.height, 720);
    }

    #[test]
    fn codec_id_tag_is_msb_first() {
        let meta = CodecMeta::decode(b"h264\x00\x00\x04\x38\x00\x00\x09\x60").unwrap();
        assert_eq!(meta.codec_id, CodecId::H264);
        assert_eq!(meta.codec_id.tag(), "h264");
        assert_eq!(meta.codec_id.name(), Some("H.264"));
        assert_eq!((meta.width, meta.height), (1080, 2400));
        assert_eq!(CodecId(0x6176_3031).tag_bytes(), *b"av01");
    }

    #[test]
    fn codec_meta_roundtrip() {
        let meta = CodecMeta {
            codec_id: CodecId::H265,
            width: 1920,
            height: 1080,
        };
        assert_eq!(CodecMeta::decode(&meta.to_bytes()).unwrap(), meta);
    }

    #[test]
    fn decodes_config_keyframe_header() {
        let header =
            FrameHeader::decode(&[0xC0, 0, 0, 0, 0, 0, 0, 0x05, 0, 0, 0, 0x03]).unwrap();
        assert!(header.is_config);
        assert!(header.is_keyframe);
        assert_eq!(header.pts, 5);
        assert_eq!(header.payload_size, 3);
    }

    #[test]
    fn header_roundtrip_across_flags_and_pts_range() {
        let timestamps = [0, 1, 33_333, 1 << 31, 1 << 40, PTS_MASK - 1, PTS_MASK];
        for is_config in [false, true] {
            for is_keyframe in [false, true] {
                for &pts in &timestamps {
                    let header = FrameHeader {
                        is_config,
                        is_keyframe,
                        pts,
                        payload_size: 0xDEAD_BEEF,
                    };
                    assert_eq!(FrameHeader::decode(&header.to_bytes()).unwrap(), header);
                }
            }
        }
    }

    #[test]
    fn oversized_pts_does_not_leak_into_flags() {
        let header = FrameHeader {
            is_config: false,
            is_keyframe: false,
            pts: u64::MAX,
            payload_size: 0,
        };
        let decoded = FrameHeader::decode(&header.to_bytes()).unwrap();
        assert!(!decoded.is_config);
        assert!(!decoded.is_keyframe);
        assert_eq!(decoded.pts, PTS_MASK);
    }

    #[test]
    fn short_input_is_malformed() {
        assert!(matches!(
            FrameHeader::decode(&[0u8; 11]),
            Err(FrameError::MalformedHeader {
                expected: FRAME_HEADER_LEN,
                actual: 11
            })
        ));
        assert!(matches!(
            CodecMeta::decode(&[0u8; 4]),
            Err(FrameError::MalformedHeader { .. })
        ));
        assert!(matches!(
            decode_device_name(&[0u8; 63]),
            Err(FrameError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn device_name_trims_nul_padding() {
        let mut raw = [0u8; DEVICE_NAME_LEN];
        raw[..5].copy_from_slice(b"Pixel");
        assert_eq!(decode_device_name(&raw).unwrap(), "Pixel");
        assert_eq!(decode_device_name(&[0u8; DEVICE_NAME_LEN]).unwrap(), "");
    }

    #[test]
    fn device_name_encoding_truncates_on_char_boundary() {
        let long = "é".repeat(40); // 80 bytes
        let raw = encode_device_name(&long);
        let decoded = decode_device_name(&raw).unwrap();
        assert_eq!(decoded, "é".repeat(32));

        let raw = encode_device_name("Pixel 8 Pro");
        assert_eq!(decode_device_name(&raw).unwrap(), "Pixel 8 Pro");
    }

    #[test]
    fn decode_frame_waits_for_complete_payload() {
        let frame = Frame::new(false, true, 42, &b"payload"[..]).unwrap();
        let mut wire = BytesMut::new();
        encode_frame(&frame, &mut wire);
        assert_eq!(wire.len(), frame.wire_size());

        let mut partial = BytesMut::from(&wire[..FRAME_HEADER_LEN + 3]);
        assert!(decode_frame(&mut partial, DEFAULT_MAX_PAYLOAD).unwrap().is_none());

        let decoded = decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_frame_rejects_oversized_payload() {
        let header = FrameHeader {
            payload_size: 1024,
            ..FrameHeader::default()
        };
        let mut wire = BytesMut::from(&header.to_bytes()[..]);
        assert!(matches!(
            decode_frame(&mut wire, 16),
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn decode_frame_does_not_reserve_declared_payload_up_front() {
        let header = FrameHeader {
            payload_size: 1 << 30,
            ..FrameHeader::default()
        };
        let mut wire = BytesMut::from(&header.to_bytes()[..]);
        assert!(decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(wire.len(), FRAME_HEADER_LEN);
        assert!(wire.capacity() < 1 << 20, "capacity {}", wire.capacity());
    }

    #[test]
    fn empty_payload_frame() {
        let frame = Frame::new(true, false, 0, Bytes::new()).unwrap();
        assert_eq!(frame.header().payload_size, 0);

        let mut wire = BytesMut::new();
        encode_frame(&frame, &mut wire);
        let decoded = decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert!(decoded.is_config());
        assert!(decoded.payload().is_empty());
    }
}

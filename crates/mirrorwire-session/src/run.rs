use mirrorwire_frame::StreamMeta;
use mirrorwire_transport::ByteSource;
use tracing::info;

use crate::error::{Result, SessionError};
use crate::session::StreamSession;
use crate::sink::FrameSink;

/// What a session delivered before ending cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub meta: StreamMeta,
    pub frames: u64,
    pub bytes: u64,
}

/// Drive `session` to completion, feeding `sink`.
///
/// The sink sees `on_meta` once, `on_frame` for every frame in wire order,
/// then exactly one of `on_end_of_stream` or `on_error`. A sink failure ends
/// the session with [`SessionError::Sink`] and is reported to the sink's
/// `on_error` as well.
pub fn run_session<S, K>(session: &mut StreamSession<S>, sink: &mut K) -> Result<SessionSummary>
where
    S: ByteSource,
    K: FrameSink + ?Sized,
{
    let meta = match session.handshake() {
        Ok(meta) => meta.clone(),
        Err(err) => {
            sink.on_error(&err);
            return Err(err);
        }
    };

    if let Err(err) = sink.on_meta(&meta) {
        let err = session.fail(SessionError::Sink(err));
        sink.on_error(&err);
        return Err(err);
    }

    let mut frames = 0u64;
    let mut bytes = 0u64;
    loop {
        match session.next_frame() {
            Ok(Some(frame)) => {
                if let Err(err) = sink.on_frame(&frame) {
                    let err = session.fail(SessionError::Sink(err));
                    sink.on_error(&err);
                    return Err(err);
                }
                frames += 1;
                bytes += frame.payload().len() as u64;
            }
            Ok(None) => break,
            Err(err) => {
                sink.on_error(&err);
                return Err(err);
            }
        }
    }

    sink.on_end_of_stream()?;
    info!(device = %meta.device_name(), frames, bytes, "session complete");

    Ok(SessionSummary {
        meta,
        frames,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use mirrorwire_frame::{CodecId, CodecMeta, Frame, FrameHeader, StreamWriter};

    use super::*;
    use crate::error::{ErrorKind, SinkError};
    use crate::handshake::HandshakeConfig;
    use crate::session::{SessionConfig, SessionState};

    #[derive(Debug, Default)]
    struct Recorder {
        events: Vec<String>,
        fail_on_frame: Option<usize>,
    }

    impl FrameSink for Recorder {
        fn on_meta(&mut self, meta: &StreamMeta) -> std::result::Result<(), SinkError> {
            self.events.push(format!("meta:{}", meta.device_name()));
            Ok(())
        }

        fn on_frame(&mut self, frame: &Frame) -> std::result::Result<(), SinkError> {
            let index = self.events.len();
            if self.fail_on_frame == Some(index) {
                return Err(SinkError::ProcessGone("recorder".into()));
            }
            self.events.push(format!("frame:{}", frame.pts()));
            Ok(())
        }

        fn on_end_of_stream(&mut self) -> std::result::Result<(), SinkError> {
            self.events.push("end".into());
            Ok(())
        }

        fn on_error(&mut self, err: &SessionError) {
            self.events.push(format!("error:{:?}", err.kind()));
        }
    }

    fn cfg() -> SessionConfig {
        SessionConfig {
            handshake: HandshakeConfig {
                expect_probe_byte: false,
                ..HandshakeConfig::default()
            },
            ..SessionConfig::default()
        }
    }

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let meta = StreamMeta::new(
            "Pixel",
            CodecMeta {
                codec_id: CodecId::H264,
                width: 1080,
                height: 2400,
            },
        );
        let mut writer = StreamWriter::new(Vec::new());
        writer.write_meta(&meta).unwrap();
        for frame in frames {
            writer.write_frame(frame).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn events_arrive_in_order() {
        let frames = [
            Frame::new(true, false, 0, &b"cfg"[..]).unwrap(),
            Frame::new(false, true, 1, &b"key"[..]).unwrap(),
            Frame::new(false, false, 2, &b"p"[..]).unwrap(),
        ];
        let mut session = StreamSession::new(Cursor::new(wire(&frames)), cfg());
        let mut sink = Recorder::default();

        let summary = run_session(&mut session, &mut sink).unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.bytes, 7);
        assert_eq!(summary.meta.device_name(), "Pixel");
        assert_eq!(
            sink.events,
            ["meta:Pixel", "frame:0", "frame:1", "frame:2", "end"]
        );
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn truncation_reported_once_to_sink() {
        let mut bytes = wire(&[Frame::new(false, true, 9, &b"ok"[..]).unwrap()]);
        let header = FrameHeader {
            payload_size: 100,
            ..FrameHeader::default()
        };
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&[0u8; 40]);

        let mut session = StreamSession::new(Cursor::new(bytes), cfg());
        let mut sink = Recorder::default();
        let err = run_session(&mut session, &mut sink).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TruncatedStream);
        assert_eq!(
            sink.events,
            ["meta:Pixel", "frame:9", "error:TruncatedStream"]
        );
    }

    #[test]
    fn handshake_failure_skips_meta() {
        let mut session = StreamSession::new(Cursor::new(vec![0u8; 10]), cfg());
        let mut sink = Recorder::default();
        let err = run_session(&mut session, &mut sink).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::HandshakeFailed);
        assert_eq!(sink.events, ["error:HandshakeFailed"]);
    }

    #[test]
    fn sink_failure_ends_session() {
        let frames = [
            Frame::new(false, true, 1, &b"a"[..]).unwrap(),
            Frame::new(false, false, 2, &b"b"[..]).unwrap(),
        ];
        let mut session = StreamSession::new(Cursor::new(wire(&frames)), cfg());
        let mut sink = Recorder {
            fail_on_frame: Some(2),
            ..Recorder::default()
        };

        let err = run_session(&mut session, &mut sink).unwrap_err();
        assert!(matches!(err, SessionError::Sink(SinkError::ProcessGone(_))));
        assert_eq!(sink.events, ["meta:Pixel", "frame:1", "error:Sink"]);
        assert_eq!(session.state(), SessionState::Failed);
    }
}

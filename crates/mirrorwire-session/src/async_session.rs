//! tokio-based handshake and frame stream.

use std::future::poll_fn;
use std::pin::Pin;

use futures_core::Stream;
use mirrorwire_frame::{
    decode_device_name, CodecMeta, Frame, FrameError, StreamCodec, StreamMeta, CODEC_META_LEN,
    DEVICE_NAME_LEN,
};
use mirrorwire_transport::{AsyncMirrorStream, Endpoint};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::error::{HandshakeStep, Result, SessionError};
use crate::handshake::{HandshakeConfig, HandshakeOutcome, ProbeResult, MIN_PROBE_TIMEOUT};
use crate::session::SessionConfig;

/// Async form of [`crate::perform_handshake`].
///
/// The probe byte is awaited under `tokio::time::timeout`; nothing else is
/// bounded.
pub async fn perform_handshake_async<R>(
    source: &mut R,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let probe = if config.expect_probe_byte {
        let timeout = config.probe_timeout.max(MIN_PROBE_TIMEOUT);
        let mut byte = [0u8; 1];
        match tokio::time::timeout(timeout, source.read(&mut byte)).await {
            Ok(Ok(0)) => ProbeResult::NotReceived,
            Ok(Ok(_)) => {
                debug!(value = byte[0], "probe byte received");
                ProbeResult::Received(byte[0])
            }
            Ok(Err(err)) => {
                warn!(%err, "probe byte read failed; proceeding");
                ProbeResult::NotReceived
            }
            Err(_) => {
                info!(?timeout, "no probe byte within timeout; proceeding");
                ProbeResult::NotReceived
            }
        }
    } else {
        ProbeResult::Skipped
    };

    let raw_name: [u8; DEVICE_NAME_LEN] = read_array_async(source)
        .await
        .map_err(|err| SessionError::from_handshake(HandshakeStep::DeviceName, err))?;
    let device_name = decode_device_name(&raw_name)?;

    let raw_meta: [u8; CODEC_META_LEN] = read_array_async(source)
        .await
        .map_err(|err| SessionError::from_handshake(HandshakeStep::CodecMeta, err))?;
    let codec = CodecMeta::decode(&raw_meta)?;

    info!(
        device = %device_name,
        codec = %codec.codec_id.tag(),
        width = codec.width,
        height = codec.height,
        "handshake complete"
    );

    Ok(HandshakeOutcome {
        meta: StreamMeta::new(device_name, codec),
        probe,
    })
}

async fn read_array_async<R, const N: usize>(
    source: &mut R,
) -> std::result::Result<[u8; N], FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut out = [0u8; N];
    let mut filled = 0;
    while filled < N {
        match source.read(&mut out[filled..]).await {
            Ok(0) => {
                return Err(FrameError::Truncated {
                    expected: N,
                    received: filled,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(out)
}

/// A stream session over an async source.
///
/// Opening performs the handshake; frames then come from a
/// [`FramedRead`] with [`StreamCodec`]. The first error or end of stream
/// fuses the session.
pub struct AsyncStreamSession<R> {
    meta: StreamMeta,
    probe: ProbeResult,
    frames: FramedRead<R, StreamCodec>,
    finished: bool,
}

impl AsyncStreamSession<AsyncMirrorStream> {
    pub async fn connect(endpoint: &Endpoint, config: &SessionConfig) -> Result<Self> {
        let stream = AsyncMirrorStream::connect(endpoint).await?;
        info!(%endpoint, "connected to mirroring endpoint");
        Self::open(stream, config).await
    }
}

impl<R: AsyncRead + Unpin> AsyncStreamSession<R> {
    /// Run the handshake on `source` and prepare the frame stream.
    pub async fn open(mut source: R, config: &SessionConfig) -> Result<Self> {
        let outcome = perform_handshake_async(&mut source, &config.handshake).await?;
        Ok(Self {
            meta: outcome.meta,
            probe: outcome.probe,
            frames: FramedRead::new(source, StreamCodec::new(config.frame.clone())),
            finished: false,
        })
    }

    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    pub fn probe(&self) -> ProbeResult {
        self.probe
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next frame, or `Ok(None)` at a clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let frames = &mut self.frames;
        match poll_fn(|cx| Pin::new(&mut *frames).poll_next(cx)).await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(err)) => {
                self.finished = true;
                Err(err.into())
            }
            None => {
                self.finished = true;
                debug!("end of stream");
                Ok(None)
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.frames.into_inner()
    }
}

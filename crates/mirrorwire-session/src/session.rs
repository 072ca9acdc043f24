use std::time::Duration;

use mirrorwire_frame::{Frame, FrameConfig, FrameReader, StreamMeta};
use mirrorwire_transport::{ByteSource, Endpoint, MirrorStream};
use tracing::{debug, info, warn};

use crate::cancel::CancelHandle;
use crate::error::{Result, SessionError};
use crate::handshake::{perform_handshake, HandshakeConfig, ProbeResult};

/// Lifecycle of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Source open, nothing read yet.
    Connected,
    /// Handshake reads in progress.
    Handshaking,
    /// Metadata known; frames are being read.
    Streaming,
    /// Clean end-of-stream or explicit close.
    Closed,
    /// Terminated by an error.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Session-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub handshake: HandshakeConfig,
    pub frame: FrameConfig,
    /// Bound on establishing the TCP connection in [`StreamSession::connect`].
    pub connect_timeout: Option<Duration>,
}

/// One handshake plus frame loop over one exclusively owned byte source.
///
/// The session reads the handshake on first use, then yields frames in wire
/// order until the source ends or fails. Either way it ends in a terminal
/// state and releases the source exactly once; [`close`](Self::close) and
/// `Drop` are idempotent. A session is never restarted in place.
pub struct StreamSession<S: ByteSource> {
    reader: Option<FrameReader<S>>,
    config: SessionConfig,
    state: SessionState,
    meta: Option<StreamMeta>,
    probe: Option<ProbeResult>,
    cancel: CancelHandle,
}

impl StreamSession<MirrorStream> {
    /// Connect to a forwarded endpoint and wrap the stream in a session.
    pub fn connect(endpoint: &Endpoint, config: SessionConfig) -> Result<Self> {
        let stream = match config.connect_timeout {
            Some(timeout) => MirrorStream::connect_timeout(endpoint, timeout)?,
            None => MirrorStream::connect(endpoint)?,
        };
        info!(%endpoint, peer = %stream.peer_label(), "connected to mirroring endpoint");
        Ok(Self::new(stream, config))
    }
}

impl<S: ByteSource> StreamSession<S> {
    /// Take ownership of an open source. No bytes are read yet.
    pub fn new(source: S, config: SessionConfig) -> Self {
        let closer = match source.closer() {
            Ok(closer) => closer,
            Err(err) => {
                warn!(%err, "source closer unavailable; cancellation applies between reads only");
                None
            }
        };

        Self {
            reader: Some(FrameReader::with_config(source, config.frame.clone())),
            config,
            state: SessionState::Connected,
            meta: None,
            probe: None,
            cancel: CancelHandle::new(closer),
        }
    }

    /// Run the handshake if it has not run yet and return the stream metadata.
    pub fn handshake(&mut self) -> Result<&StreamMeta> {
        match self.state {
            SessionState::Connected => {}
            SessionState::Streaming | SessionState::Handshaking => {
                return self.meta.as_ref().ok_or(SessionError::SourceClosed);
            }
            SessionState::Closed | SessionState::Failed => return Err(SessionError::SourceClosed),
        }

        if self.cancel.is_cancelled() {
            return Err(self.fail(SessionError::SourceClosed));
        }

        self.state = SessionState::Handshaking;
        let Some(reader) = self.reader.as_mut() else {
            return Err(self.fail(SessionError::SourceClosed));
        };

        match perform_handshake(reader.get_mut(), &self.config.handshake) {
            Ok(outcome) => {
                self.probe = Some(outcome.probe);
                self.state = SessionState::Streaming;
                Ok(&*self.meta.insert(outcome.meta))
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Read the next frame, running the handshake first if needed.
    ///
    /// `Ok(None)` is the clean end of the stream. After any terminal outcome
    /// further calls return `Ok(None)` without touching the source.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.state {
            SessionState::Connected => {
                self.handshake()?;
            }
            SessionState::Closed | SessionState::Failed => return Ok(None),
            SessionState::Handshaking | SessionState::Streaming => {}
        }

        if self.cancel.is_cancelled() {
            return Err(self.fail(SessionError::SourceClosed));
        }

        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        match reader.next_frame() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                if self.cancel.is_cancelled() {
                    return Err(self.fail(SessionError::SourceClosed));
                }
                let frames = reader.frames_read();
                info!(frames, "end of stream");
                self.release(SessionState::Closed);
                Ok(None)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Close the session and release the source. Idempotent.
    pub fn close(&mut self) {
        let next = if self.state.is_terminal() {
            self.state
        } else {
            SessionState::Closed
        };
        self.release(next);
    }

    /// Move to `Failed`, release the source, and hand back the error to report.
    ///
    /// Any failure observed after cancellation is reported as
    /// [`SessionError::SourceClosed`].
    pub(crate) fn fail(&mut self, err: SessionError) -> SessionError {
        let err = if self.cancel.is_cancelled() {
            SessionError::SourceClosed
        } else {
            err
        };
        warn!(error = %err, state = ?self.state, "session failed");
        self.release(SessionState::Failed);
        err
    }

    fn release(&mut self, state: SessionState) {
        self.state = state;
        if let Some(reader) = self.reader.take() {
            let mut source = reader.into_inner();
            if let Err(err) = source.close() {
                debug!(%err, "closing source failed");
            }
            self.cancel.disarm();
            debug!(?state, "source released");
        }
    }

    /// A handle that cancels this session from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stream metadata, once the handshake has completed.
    pub fn meta(&self) -> Option<&StreamMeta> {
        self.meta.as_ref()
    }

    /// Outcome of the probe step, once the handshake has completed.
    pub fn probe(&self) -> Option<ProbeResult> {
        self.probe
    }

    /// Frames delivered so far. Zero once the source has been released.
    pub fn frames_read(&self) -> u64 {
        self.reader.as_ref().map_or(0, FrameReader::frames_read)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<S: ByteSource> Iterator for StreamSession<S> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

impl<S: ByteSource> std::iter::FusedIterator for StreamSession<S> {}

impl<S: ByteSource> Drop for StreamSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

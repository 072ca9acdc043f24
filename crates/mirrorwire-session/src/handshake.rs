use std::io::{ErrorKind, Read};
use std::time::Duration;

use mirrorwire_frame::{
    decode_device_name, read_array, CodecMeta, StreamMeta, CODEC_META_LEN, DEVICE_NAME_LEN,
};
use mirrorwire_transport::ByteSource;
use tracing::{debug, info, warn};

use crate::error::{HandshakeStep, Result, SessionError};

/// How long to wait for the probe byte before assuming the transport omits it.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shortest probe wait. Sockets reject a zero read timeout.
pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(1);

/// Configuration for the one-time handshake reads.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Expect a single probe ("dummy") byte before the device name.
    ///
    /// Forwarded connections (`adb forward`) carry it; reverse tunnels do not.
    /// Enabling this on a transport that never sends it consumes the first
    /// byte of the device name, so it must match the transport.
    pub expect_probe_byte: bool,
    /// Bounded wait for the probe byte. Other reads are never bounded.
    /// Values below [`MIN_PROBE_TIMEOUT`] are raised to it.
    pub probe_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            expect_probe_byte: true,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// What happened at the optional probe step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The configuration did not expect a probe byte.
    Skipped,
    /// A probe byte arrived with this value.
    Received(u8),
    /// Nothing arrived within the timeout (or the source ended); the
    /// handshake carried on regardless.
    NotReceived,
}

/// Result of a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub meta: StreamMeta,
    pub probe: ProbeResult,
}

/// Perform the handshake reads in wire order and build the [`StreamMeta`].
///
/// The probe step never fails the handshake. A short device-name or codec
/// metadata read is [`SessionError::HandshakeFailed`] naming the step. There
/// are no retries; a caller wanting another attempt opens a new source.
pub fn perform_handshake<S: ByteSource + ?Sized>(
    source: &mut S,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome> {
    let probe = if config.expect_probe_byte {
        read_probe(source, config.probe_timeout)?
    } else {
        ProbeResult::Skipped
    };

    let raw_name: [u8; DEVICE_NAME_LEN] = read_array(source)
        .map_err(|err| SessionError::from_handshake(HandshakeStep::DeviceName, err))?;
    let device_name = decode_device_name(&raw_name)?;
    debug!(device = %device_name, "device name received");

    let raw_meta: [u8; CODEC_META_LEN] = read_array(source)
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

fn read_probe<S: ByteSource + ?Sized>(source: &mut S, timeout: Duration) -> Result<ProbeResult> {
    let timeout = timeout.max(MIN_PROBE_TIMEOUT);
    let bounded = match source.set_read_timeout(Some(timeout)) {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::Unsupported => {
            debug!("source cannot bound reads; probing without a timeout");
            false
        }
        Err(err) => {
            warn!(%err, "could not bound the probe read; probing without a timeout");
            false
        }
    };

    let mut byte = [0u8; 1];
    let probe = loop {
        match source.read(&mut byte) {
            Ok(0) => {
                debug!("source ended before the probe byte");
                break ProbeResult::NotReceived;
            }
            Ok(_) => {
                debug!(value = byte[0], "probe byte received");
                break ProbeResult::Received(byte[0]);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                info!(?timeout, "no probe byte within timeout; proceeding");
                break ProbeResult::NotReceived;
            }
            Err(err) => {
                warn!(%err, "probe byte read failed; proceeding");
                break ProbeResult::NotReceived;
            }
        }
    };

    if bounded {
        source.set_read_timeout(None).map_err(SessionError::Io)?;
    }

    Ok(probe)
}

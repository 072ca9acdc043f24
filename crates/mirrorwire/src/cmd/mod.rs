use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use mirrorwire_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use mirrorwire_session::{CancelHandle, HandshakeConfig, SessionConfig, StreamSession};
use mirrorwire_transport::{Endpoint, MirrorStream};

use crate::exit::{session_error, CliError, CliResult, INTERNAL, USAGE};

pub mod dump;
pub mod probe;
pub mod record;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Perform the handshake and print the stream metadata.
    Probe(ProbeArgs),
    /// Print frame headers as they arrive.
    Dump(DumpArgs),
    /// Record the raw elementary stream to a file.
    Record(RecordArgs),
    /// Pipe the stream through a transcoder (ffmpeg) into a container file.
    Transcode(TranscodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: crate::output::OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, format),
        Command::Dump(args) => dump::run(args, format),
        Command::Record(args) => record::run_record(args, format),
        Command::Transcode(args) => record::run_transcode(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Connection and handshake options shared by every streaming command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Forwarded endpoint: PORT, HOST:PORT, tcp:HOST:PORT or unix:PATH.
    pub endpoint: Endpoint,
    /// The transport does not send the probe byte (reverse tunnels).
    #[arg(long)]
    pub no_probe_byte: bool,
    /// How long to wait for the probe byte (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub probe_timeout: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Reject frames whose declared payload exceeds this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

impl SessionArgs {
    pub fn config(&self) -> CliResult<SessionConfig> {
        Ok(SessionConfig {
            handshake: HandshakeConfig {
                expect_probe_byte: !self.no_probe_byte,
                probe_timeout: parse_timeout(&self.probe_timeout)?,
            },
            frame: FrameConfig {
                max_payload_size: self.max_payload.unwrap_or(DEFAULT_MAX_PAYLOAD),
            },
            connect_timeout: Some(parse_timeout(&self.connect_timeout)?),
        })
    }

    /// Connect and install a Ctrl-C handler that cancels the session.
    pub fn open(&self) -> CliResult<StreamSession<MirrorStream>> {
        let config = self.config()?;
        let session = StreamSession::connect(&self.endpoint, config)
            .map_err(|err| session_error("connect failed", err))?;
        install_ctrlc_handler(session.cancel_handle())?;
        Ok(session)
    }
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Output file for the raw elementary stream (e.g. capture.h264).
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct TranscodeArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Output container file (e.g. capture.mp4).
    pub output: PathBuf,
    /// Transcoder program to run.
    #[arg(long, default_value = "ffmpeg", env = "MIRRORWIRE_FFMPEG")]
    pub program: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn install_ctrlc_handler(cancel: CancelHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timeout_seconds() {
        assert_eq!(parse_timeout("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_timeout_millis() {
        assert_eq!(parse_timeout("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_timeout_invalid() {
        assert_eq!(parse_timeout("0s").unwrap_err().code, USAGE);
        assert!(parse_timeout("bad").is_err());
        assert!(parse_timeout("").is_err());
    }

    #[test]
    fn session_args_map_onto_config() {
        let args = SessionArgs {
            endpoint: Endpoint::localhost(27183),
            no_probe_byte: true,
            probe_timeout: "250ms".into(),
            connect_timeout: "1s".into(),
            max_payload: Some(1 << 20),
        };
        let config = args.config().unwrap();
        assert!(!config.handshake.expect_probe_byte);
        assert_eq!(config.handshake.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.frame.max_payload_size, 1 << 20);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(1)));
    }
}

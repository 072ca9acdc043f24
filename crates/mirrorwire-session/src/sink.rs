//! Consumers of session events.
//!
//! A [`FrameSink`] receives the stream metadata once, then every frame in
//! wire order, then exactly one terminal event. Sinks compose as tuples, so
//! `(FileSink::create(path)?, FrameStats::default())` writes and counts.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use mirrorwire_frame::{CodecId, Frame, StreamMeta};
use tracing::{debug, info, warn};

use crate::error::{SessionError, SinkError};

/// Receives session events in order.
pub trait FrameSink {
    fn on_meta(&mut self, meta: &StreamMeta) -> Result<(), SinkError> {
        let _ = meta;
        Ok(())
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// The stream ended cleanly. Flush and release resources here.
    fn on_end_of_stream(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// The session failed. No further events follow.
    fn on_error(&mut self, err: &SessionError) {
        let _ = err;
    }
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    fn on_meta(&mut self, meta: &StreamMeta) -> Result<(), SinkError> {
        (**self).on_meta(meta)
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        (**self).on_frame(frame)
    }

    fn on_end_of_stream(&mut self) -> Result<(), SinkError> {
        (**self).on_end_of_stream()
    }

    fn on_error(&mut self, err: &SessionError) {
        (**self).on_error(err)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn on_meta(&mut self, meta: &StreamMeta) -> Result<(), SinkError> {
        (**self).on_meta(meta)
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        (**self).on_frame(frame)
    }

    fn on_end_of_stream(&mut self) -> Result<(), SinkError> {
        (**self).on_end_of_stream()
    }

    fn on_error(&mut self, err: &SessionError) {
        (**self).on_error(err)
    }
}

impl<A: FrameSink, B: FrameSink> FrameSink for (A, B) {
    fn on_meta(&mut self, meta: &StreamMeta) -> Result<(), SinkError> {
        self.0.on_meta(meta)?;
        self.1.on_meta(meta)
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.0.on_frame(frame)?;
        self.1.on_frame(frame)
    }

    /// Both halves always see the terminal event; the first error wins.
    fn on_end_of_stream(&mut self) -> Result<(), SinkError> {
        let first = self.0.on_end_of_stream();
        let second = self.1.on_end_of_stream();
        first.and(second)
    }

    fn on_error(&mut self, err: &SessionError) {
        self.0.on_error(err);
        self.1.on_error(err);
    }
}

/// Appends every payload to a writer, producing a raw elementary stream
/// (Annex-B for H.264/H.265).
#[derive(Debug)]
pub struct FileSink<W: Write> {
    out: W,
    written: u64,
}

impl FileSink<BufWriter<File>> {
    /// Create (or truncate) `path` and write payloads to it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        debug!(path = %path.display(), "recording raw stream");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FileSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Payload bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for FileSink<W> {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.out.write_all(frame.payload())?;
        self.written += frame.payload().len() as u64;
        Ok(())
    }

    fn on_end_of_stream(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }

    fn on_error(&mut self, _err: &SessionError) {
        // Keep whatever was received before the failure.
        if let Err(err) = self.out.flush() {
            warn!(%err, "flushing partial recording failed");
        }
    }
}

/// Pipes every payload into a child process's stdin.
///
/// The child is expected to exit once its stdin closes. A clean end of
/// stream closes stdin, waits, and turns a non-zero exit into
/// [`SinkError::ProcessFailed`].
#[derive(Debug)]
pub struct ProcessSink {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    finished: bool,
}

impl ProcessSink {
    /// Spawn `command` with a piped stdin. Stdout and stderr are discarded.
    pub fn spawn(mut command: Command) -> Result<Self, SinkError> {
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take();
        info!(%program, pid = child.id(), "sink process started");

        Ok(Self {
            program,
            child,
            stdin,
            finished: false,
        })
    }

    /// Remux the elementary stream of `codec` into `output` without
    /// re-encoding.
    pub fn ffmpeg_remux(
        program: impl AsRef<OsStr>,
        codec: CodecId,
        output: impl AsRef<Path>,
    ) -> Result<Self, SinkError> {
        Self::spawn(ffmpeg_remux_command(program, codec, output)?)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        drop(self.stdin.take());

        let status = self.child.wait()?;
        debug!(program = %self.program, %status, "sink process exited");
        if status.success() {
            Ok(())
        } else {
            Err(SinkError::ProcessFailed {
                program: self.program.clone(),
                status,
            })
        }
    }
}

/// ffmpeg demuxer name for a raw elementary stream of `codec`.
pub fn ffmpeg_input_format(codec: CodecId) -> Option<&'static str> {
    match codec {
        CodecId::H264 => Some("h264"),
        CodecId::H265 => Some("hevc"),
        CodecId::AV1 => Some("obu"),
        _ => None,
    }
}

/// Build the ffmpeg invocation that remuxes stdin into `output`.
pub fn ffmpeg_remux_command(
    program: impl AsRef<OsStr>,
    codec: CodecId,
    output: impl AsRef<Path>,
) -> Result<Command, SinkError> {
    let format = ffmpeg_input_format(codec).ok_or(SinkError::UnsupportedCodec(codec))?;
    let mut command = Command::new(program);
    command
        .args(["-f", format, "-i", "pipe:0", "-c:v", "copy"])
        .args(["-avoid_negative_ts", "make_zero", "-fflags", "+genpts", "-y"])
        .arg(output.as_ref());
    Ok(command)
}

impl FrameSink for ProcessSink {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SinkError::ProcessGone(self.program.clone()));
        };
        match stdin.write_all(frame.payload()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                warn!(program = %self.program, "sink process stopped reading");
                Err(SinkError::ProcessGone(self.program.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn on_end_of_stream(&mut self) -> Result<(), SinkError> {
        self.finish()
    }

    fn on_error(&mut self, _err: &SessionError) {
        if let Err(err) = self.finish() {
            warn!(%err, "sink process did not finish cleanly");
        }
    }
}

impl Drop for ProcessSink {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish();
        }
    }
}

/// Counts frames and bytes, logging a progress line every `log_every` frames.
#[derive(Debug, Clone)]
pub struct FrameStats {
    pub frames: u64,
    pub bytes: u64,
    pub config_frames: u64,
    pub keyframes: u64,
    log_every: u64,
    started: Instant,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(30)
    }
}

impl FrameStats {
    /// `log_every == 0` disables progress logging.
    pub fn new(log_every: u64) -> Self {
        Self {
            frames: 0,
            bytes: 0,
            config_frames: 0,
            keyframes: 0,
            log_every,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average frames per second since creation.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

impl FrameSink for FrameStats {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.frames += 1;
        self.bytes += frame.payload().len() as u64;
        if frame.is_config() {
            self.config_frames += 1;
        }
        if frame.is_keyframe() {
            self.keyframes += 1;
        }
        if self.log_every > 0 && self.frames % self.log_every == 0 {
            let fps = (self.fps() * 10.0).round() / 10.0;
            info!(frames = self.frames, bytes = self.bytes, fps, "streaming");
        }
        Ok(())
    }

    fn on_end_of_stream(&mut self) -> Result<(), SinkError> {
        info!(
            frames = self.frames,
            bytes = self.bytes,
            elapsed = ?self.elapsed(),
            "stream finished"
        );
        Ok(())
    }
}

/// Collects frames in memory.
impl FrameSink for Vec<Frame> {
    fn on_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(config: bool, key: bool, payload: &'static [u8]) -> Frame {
        Frame::new(config, key, 0, payload).unwrap()
    }

    #[test]
    fn file_sink_concatenates_payloads() {
        let mut sink = FileSink::new(Vec::new());
        sink.on_frame(&frame(true, false, b"\x00\x00\x00\x01sps")).unwrap();
        sink.on_frame(&frame(false, true, b"\x00\x00\x00\x01idr")).unwrap();
        sink.on_end_of_stream().unwrap();

        assert_eq!(sink.bytes_written(), 14);
        assert_eq!(sink.into_inner(), b"\x00\x00\x00\x01sps\x00\x00\x00\x01idr");
    }

    #[test]
    fn file_sink_creates_file() {
        let path =
            std::env::temp_dir().join(format!("mirrorwire-sink-{}.h264", std::process::id()));
        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.on_frame(&frame(false, false, b"abc")).unwrap();
            sink.on_end_of_stream().unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stats_count_flags() {
        let mut stats = FrameStats::new(0);
        stats.on_frame(&frame(true, false, b"12")).unwrap();
        stats.on_frame(&frame(false, true, b"345")).unwrap();
        stats.on_frame(&frame(false, false, b"6")).unwrap();

        assert_eq!(stats.frames, 3);
        assert_eq!(stats.bytes, 6);
        assert_eq!(stats.config_frames, 1);
        assert_eq!(stats.keyframes, 1);
    }

    #[test]
    fn tuple_sink_feeds_both() {
        let mut sink = (Vec::<Frame>::new(), FrameStats::new(0));
        sink.on_frame(&frame(false, true, b"x")).unwrap();
        sink.on_end_of_stream().unwrap();

        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.1.keyframes, 1);
    }

    #[cfg(unix)]
    #[test]
    fn process_sink_pipes_to_child() {
        let mut sink = ProcessSink::spawn(Command::new("cat")).unwrap();
        assert_eq!(sink.program(), "cat");
        sink.on_frame(&frame(false, false, b"payload")).unwrap();
        sink.on_end_of_stream().unwrap();
        // Second terminal call is a no-op.
        sink.on_end_of_stream().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn process_sink_reports_failed_exit() {
        let mut command = Command::new("sh");
        command.args(["-c", "cat >/dev/null; exit 3"]);
        let mut sink = ProcessSink::spawn(command).unwrap();
        sink.on_frame(&frame(false, false, b"data")).unwrap();

        let err = sink.on_end_of_stream().unwrap_err();
        match err {
            SinkError::ProcessFailed { program, status } => {
                assert_eq!(program, "sh");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn remux_command_follows_codec() {
        let command = ffmpeg_remux_command("ffmpeg", CodecId::H265, "out.mp4").unwrap();
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[..4], ["-f", "hevc", "-i", "pipe:0"]);
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));

        assert_eq!(ffmpeg_input_format(CodecId::H264), Some("h264"));
        assert_eq!(ffmpeg_input_format(CodecId::AV1), Some("obu"));
    }

    #[test]
    fn remux_rejects_unknown_codec() {
        let err = ProcessSink::ffmpeg_remux("ffmpeg", CodecId(7), "out.mp4").unwrap_err();
        assert!(matches!(err, SinkError::UnsupportedCodec(CodecId(7))));
        assert_eq!(err.to_string(), "no ffmpeg input format for codec 0x00000007");
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = ProcessSink::spawn(Command::new("mirrorwire-no-such-program")).unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }
}

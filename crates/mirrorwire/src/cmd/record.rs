use mirrorwire_session::{run_session, FileSink, FrameSink, FrameStats, ProcessSink, StreamSession};
use mirrorwire_transport::MirrorStream;
use tracing::info;

use crate::cmd::{RecordArgs, TranscodeArgs};
use crate::exit::{session_error, sink_error, CliResult, INTERRUPTED, SUCCESS};
use crate::output::{print_summary, OutputFormat, SummaryOutput};

pub fn run_record(args: RecordArgs, format: OutputFormat) -> CliResult<i32> {
    let session = args.session.open()?;
    let sink = FileSink::create(&args.output)
        .map_err(|err| sink_error("cannot create output file", err))?;
    info!(output = %args.output.display(), "recording raw stream; press Ctrl-C to stop");

    stream_into(session, sink, args.output.display().to_string(), format)
}

pub fn run_transcode(args: TranscodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.session.open()?;
    let codec = session
        .handshake()
        .map_err(|err| session_error("handshake failed", err))?
        .codec_id();
    let context = format!("cannot start {}", args.program.display());
    let sink = ProcessSink::ffmpeg_remux(&args.program, codec, &args.output)
        .map_err(|err| sink_error(&context, err))?;
    info!(output = %args.output.display(), "transcoding stream; press Ctrl-C to stop");

    stream_into(session, sink, args.output.display().to_string(), format)
}

/// Run the session into `sink` alongside a stats observer and print a summary.
///
/// Ctrl-C ends the recording early; the sink still finalizes its output and
/// the summary is printed with exit code `INTERRUPTED`.
fn stream_into<K: FrameSink>(
    mut session: StreamSession<MirrorStream>,
    sink: K,
    output: String,
    format: OutputFormat,
) -> CliResult<i32> {
    let cancel = session.cancel_handle();
    let mut sinks = (sink, FrameStats::default());

    let (code, interrupted) = match run_session(&mut session, &mut sinks) {
        Ok(_) => (SUCCESS, false),
        Err(_) if cancel.is_cancelled() => (INTERRUPTED, true),
        Err(err) => return Err(session_error("recording failed", err)),
    };

    let stats = &sinks.1;
    let out = SummaryOutput {
        device_name: session
            .meta()
            .map(|meta| meta.device_name().to_string())
            .unwrap_or_default(),
        output,
        frames: stats.frames,
        bytes: stats.bytes,
        keyframes: stats.keyframes,
        elapsed_ms: stats.elapsed().as_millis(),
        fps: (stats.fps() * 10.0).round() / 10.0,
        interrupted,
    };
    print_summary(&out, format);

    Ok(code)
}

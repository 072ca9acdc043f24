use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mirrorwire_frame::{Frame, StreamMeta};
use mirrorwire_session::ProbeResult;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct MetaOutput {
    pub endpoint: String,
    pub device_name: String,
    pub codec: String,
    pub codec_id: u32,
    pub width: u32,
    pub height: u32,
    pub probe: String,
}

impl MetaOutput {
    pub fn new(endpoint: String, meta: &StreamMeta, probe: Option<ProbeResult>) -> Self {
        let codec_id = meta.codec_id();
        Self {
            endpoint,
            device_name: meta.device_name().to_string(),
            codec: codec_id.name().map_or_else(|| codec_id.tag(), str::to_string),
            codec_id: codec_id.0,
            width: meta.width(),
            height: meta.height(),
            probe: probe_label(probe),
        }
    }
}

fn probe_label(probe: Option<ProbeResult>) -> String {
    match probe {
        Some(ProbeResult::Received(value)) => format!("received (0x{value:02x})"),
        Some(ProbeResult::NotReceived) => "not received".to_string(),
        Some(ProbeResult::Skipped) => "skipped".to_string(),
        None => "unknown".to_string(),
    }
}

pub fn print_meta(out: &MetaOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "CODEC", "RESOLUTION", "PROBE", "ENDPOINT"])
                .add_row(vec![
                    out.device_name.clone(),
                    format!("{} (0x{:08x})", out.codec, out.codec_id),
                    format!("{}x{}", out.width, out.height),
                    out.probe.clone(),
                    out.endpoint.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Stream Info:");
            println!("  Device:     {}", out.device_name);
            println!("  Codec:      {} (0x{:08x})", out.codec, out.codec_id);
            println!("  Resolution: {}x{}", out.width, out.height);
            println!("  Probe byte: {}", out.probe);
            println!("  Endpoint:   {}", out.endpoint);
        }
        OutputFormat::Raw => {
            println!("{}", out.device_name);
        }
    }
}

#[derive(Serialize)]
struct FrameOutput {
    index: u64,
    pts: u64,
    config: bool,
    keyframe: bool,
    size: usize,
}

/// Prints frame headers as they arrive.
///
/// Table output is buffered and rendered by [`FramePrinter::finish`]; raw
/// output writes the payload bytes themselves, producing an elementary
/// stream on stdout.
pub struct FramePrinter {
    format: OutputFormat,
    index: u64,
    table: Option<Table>,
}

impl FramePrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = matches!(format, OutputFormat::Table).then(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "PTS", "FLAGS", "SIZE"]);
            table
        });
        Self {
            format,
            index: 0,
            table,
        }
    }

    pub fn print(&mut self, frame: &Frame) {
        let out = FrameOutput {
            index: self.index,
            pts: frame.pts(),
            config: frame.is_config(),
            keyframe: frame.is_keyframe(),
            size: frame.payload().len(),
        };
        self.index += 1;

        match self.format {
            OutputFormat::Json => print_json(&out),
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        out.index.to_string(),
                        out.pts.to_string(),
                        flags_label(&out),
                        out.size.to_string(),
                    ]);
                }
            }
            OutputFormat::Pretty => {
                println!(
                    "frame={} pts={} flags={} size={}",
                    out.index,
                    out.pts,
                    flags_label(&out),
                    out.size
                );
            }
            OutputFormat::Raw => print_raw(frame.payload()),
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

fn flags_label(out: &FrameOutput) -> String {
    match (out.config, out.keyframe) {
        (true, true) => "config,key".to_string(),
        (true, false) => "config".to_string(),
        (false, true) => "key".to_string(),
        (false, false) => "-".to_string(),
    }
}

#[derive(Serialize)]
pub struct SummaryOutput {
    pub device_name: String,
    pub output: String,
    pub frames: u64,
    pub bytes: u64,
    pub keyframes: u64,
    pub elapsed_ms: u128,
    pub fps: f64,
    pub interrupted: bool,
}

pub fn print_summary(out: &SummaryOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "OUTPUT", "FRAMES", "BYTES", "FPS", "STATUS"])
                .add_row(vec![
                    out.device_name.clone(),
                    out.output.clone(),
                    out.frames.to_string(),
                    out.bytes.to_string(),
                    format!("{:.1}", out.fps),
                    status_label(out).to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "Recorded {} frames ({} bytes, {:.1} fps) from {} to {} [{}]",
                out.frames,
                out.bytes,
                out.fps,
                out.device_name,
                out.output,
                status_label(out)
            );
        }
        OutputFormat::Raw => {
            println!("{}", out.frames);
        }
    }
}

fn status_label(out: &SummaryOutput) -> &'static str {
    if out.interrupted {
        "interrupted"
    } else {
        "complete"
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorwire_frame::{CodecId, CodecMeta};

    #[test]
    fn meta_output_names_known_codecs() {
        let meta = StreamMeta::new(
            "Pixel",
            CodecMeta {
                codec_id: CodecId::H264,
                width: 1280,
                height: 720,
            },
        );
        let out = MetaOutput::new(
            "tcp:127.0.0.1:27183".into(),
            &meta,
            Some(ProbeResult::Received(0)),
        );
        assert_eq!(out.codec, "H.264");
        assert_eq!(out.probe, "received (0x00)");

        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"device_name\":\"Pixel\""));
        assert!(json.contains("\"width\":1280"));
    }

    #[test]
    fn flags_render_compactly() {
        let out = FrameOutput {
            index: 0,
            pts: 5,
            config: true,
            keyframe: true,
            size: 3,
        };
        assert_eq!(flags_label(&out), "config,key");
    }
}

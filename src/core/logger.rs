//! Wire transcript
//!
//! Records every command written to the device and every line read back,
//! with millisecond timestamps, so a failed run can be replayed by eye.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Shared handle used by the collector (RX) and the dispatcher (TX)
pub type Transcript = Arc<Mutex<TranscriptWriter>>;

/// On-disk layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptFormat {
    /// `[timestamp] TX|RX #seq text`
    #[default]
    Text,
    /// One JSON object per line
    JsonLines,
}

impl TranscriptFormat {
    /// `.jsonl` and `.json` get JSON lines, anything else text
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "json") => Self::JsonLines,
            _ => Self::Text,
        }
    }
}

/// Which way a transcript line went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// Command written to the device
    Tx,
    /// Line read from the device
    Rx,
    /// Harness annotation: case boundaries, aborts
    Note,
}

/// One transcript line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Wall-clock time of recording
    pub at: DateTime<Local>,
    /// Direction
    pub flow: Flow,
    /// Sequence number of the command or line; absent for notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Line text without terminator
    pub text: String,
}

impl TranscriptEntry {
    fn now(flow: Flow, seq: Option<u64>, text: &str) -> Self {
        Self {
            at: Local::now(),
            flow,
            seq,
            text: text.to_owned(),
        }
    }

    fn render_text(&self) -> String {
        let tag = match self.flow {
            Flow::Tx => "TX",
            Flow::Rx => "RX",
            Flow::Note => "##",
        };
        let seq = self.seq.map(|s| format!(" #{s}")).unwrap_or_default();
        format!("[{}] {tag}{seq} {}", self.at.format("%Y-%m-%d %H:%M:%S%.3f"), escape_controls(&self.text))
    }
}

/// Control bytes as `<XX>` so a stray escape from the firmware stays visible
fn escape_controls(text: &str) -> String {
    if !text.bytes().any(|b| b.is_ascii_control() && b != b'\t') {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match u8::try_from(ch) {
            Ok(b) if b.is_ascii_control() && b != b'\t' => {
                out.push('<');
                out.push_str(&hex::encode_upper([b]));
                out.push('>');
            }
            _ => out.push(ch),
        }
    }
    out
}

/// File-backed transcript. Buffered; flushed at every note and on drop.
pub struct TranscriptWriter {
    out: BufWriter<File>,
    format: TranscriptFormat,
    entries: usize,
}

impl TranscriptWriter {
    /// Create (truncate) `path`
    pub fn create(path: &Path, format: TranscriptFormat) -> io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            format,
            entries: 0,
        })
    }

    /// Open a shared transcript at `path`, format chosen by extension
    pub fn shared(path: &Path) -> io::Result<Transcript> {
        let writer = Self::create(path, TranscriptFormat::from_path(path))?;
        Ok(Arc::new(Mutex::new(writer)))
    }

    fn record(&mut self, entry: &TranscriptEntry) {
        let written = match self.format {
            TranscriptFormat::Text => writeln!(self.out, "{}", entry.render_text()),
            TranscriptFormat::JsonLines => serde_json::to_writer(&mut self.out, entry)
                .map_err(io::Error::from)
                .and_then(|()| self.out.write_all(b"\n")),
        };
        // A transcript that cannot be written must not fail the run
        if written.is_ok() {
            self.entries += 1;
        }
    }

    /// Record a sent command
    pub fn log_tx(&mut self, command: &str, seq: u64) {
        self.record(&TranscriptEntry::now(Flow::Tx, Some(seq), command));
    }

    /// Record a received line
    pub fn log_rx(&mut self, line: &str, seq: u64) {
        self.record(&TranscriptEntry::now(Flow::Rx, Some(seq), line));
    }

    /// Record an annotation and flush
    pub fn log_info(&mut self, message: &str) {
        self.record(&TranscriptEntry::now(Flow::Note, None, message));
        let _ = self.out.flush();
    }

    /// Entries written so far
    pub fn entries(&self) -> usize {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_bytes_are_escaped() {
        assert_eq!(escape_controls("Reg[100]: 5\u{1b}[0m"), "Reg[100]: 5<1B>[0m");
        assert_eq!(escape_controls("a\tb"), "a\tb");
        assert_eq!(escape_controls("Température"), "Température");

        let entry = TranscriptEntry::now(Flow::Rx, Some(7), "Reg[100]: 5\u{7}");
        assert!(entry.render_text().ends_with("RX #7 Reg[100]: 5<07>"));
        let note = TranscriptEntry::now(Flow::Note, None, "case RW-07");
        assert!(note.render_text().ends_with("## case RW-07"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TranscriptFormat::from_path(Path::new("run.jsonl")), TranscriptFormat::JsonLines);
        assert_eq!(TranscriptFormat::from_path(Path::new("run.log")), TranscriptFormat::Text);
    }

    #[test]
    fn test_json_lines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.jsonl");
        {
            let transcript = TranscriptWriter::shared(&path).unwrap();
            let mut writer = transcript.lock();
            writer.log_tx("read reg 100 1", 3);
            writer.log_rx("Reg[100]: 54321", 3);
            writer.log_info("case SYS-06 done");
            assert_eq!(writer.entries(), 3);
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: TranscriptEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.flow, Flow::Tx);
        assert_eq!(first.seq, Some(3));
        assert!(!lines[2].contains("seq"));
        assert!(lines[2].contains("\"note\""));
    }

    #[test]
    fn test_text_transcript_is_flushed_at_notes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.log");
        let mut writer = TranscriptWriter::create(&path, TranscriptFormat::Text).unwrap();
        writer.log_tx("show config", 1);
        writer.log_info("case SH-01");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("TX #1 show config"), "{content}");
        assert!(content.contains("## case SH-01"), "{content}");
    }
}

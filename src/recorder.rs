// src/recorder.rs
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::Path;
use log::{info, warn};
use crate::drivers::LinkError;
use crate::engine::FrameConsumer;
use crate::types::ReceivedFrame;

/// Writes every received frame as one CSV row: `timestamp_ms,interval_ms,ch0..chN`.
///
/// File recordings are line-buffered, so every finished row is on disk even if the
/// process is killed.
pub struct FrameRecorder<W: Write> {
    writer: Option<W>,
    rows: u64,
}

impl FrameRecorder<LineWriter<File>> {
    pub fn create(path: &Path, channel_count: usize) -> Result<Self, LinkError> {
        let file = File::create(path)?;
        info!("💾 Recording frames to {}", path.display());
        Self::new(LineWriter::new(file), channel_count)
    }
}

impl<W: Write> FrameRecorder<W> {
    pub fn new(mut writer: W, channel_count: usize) -> Result<Self, LinkError> {
        // 表头: timestamp, interval, 每个通道
        write!(writer, "timestamp_ms,interval_ms")?;
        for i in 0..channel_count {
            write!(writer, ",ch{i}")?;
        }
        writeln!(writer)?;
        Ok(Self {
            writer: Some(writer),
            rows: 0,
        })
    }

    #[cfg(test)]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn write_record(&mut self, frame: &ReceivedFrame) -> Result<(), LinkError> {
        if let Some(w) = &mut self.writer {
            write!(w, "{},{}", frame.received_at_ms, frame.interval_ms)?;
            for value in &frame.relative {
                write!(w, ",{value}")?;
            }
            writeln!(w)?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Flushes and hands back the writer; later frames are ignored.
    pub fn stop(&mut self) -> Option<W> {
        let mut w = self.writer.take()?;
        if let Err(e) = w.flush() {
            warn!("Recording flush failed: {e}");
        }
        info!("💾 Recording saved ({} rows).", self.rows);
        Some(w)
    }

    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }
}

impl<W: Write> FrameConsumer for FrameRecorder<W> {
    fn consume(&mut self, frame: &ReceivedFrame) {
        if let Err(e) = self.write_record(frame) {
            warn!("Recording row dropped: {e}");
        }
    }
    fn finish(&mut self) {
        self.stop();
    }
}

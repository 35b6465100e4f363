use anyhow::{Context, Result};
use cluster_common::{DataFormat, FrameSnapshot};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A stream of frames of unknown length.
pub trait TrajectoryReader {
    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<FrameSnapshot>>;
}

fn at_end<R: BufRead>(reader: &mut R) -> Result<bool> {
    Ok(reader.fill_buf().context("Failed to read trajectory")?.is_empty())
}

/// One JSON-encoded frame per line; blank lines are ignored.
pub struct JsonLinesReader<R> {
    reader: R,
    line: String,
    line_no: usize,
}

impl<R: BufRead> JsonLinesReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: String::new(), line_no: 0 }
    }
}

impl<R: BufRead> TrajectoryReader for JsonLinesReader<R> {
    fn next_frame(&mut self) -> Result<Option<FrameSnapshot>> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).context("Failed to read trajectory line")?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if self.line.trim().is_empty() {
                continue;
            }
            let frame = serde_json::from_str(&self.line)
                .with_context(|| format!("Invalid frame on trajectory line {}", self.line_no))?;
            return Ok(Some(frame));
        }
    }
}

/// Back-to-back bincode-encoded frames.
pub struct BincodeReader<R> {
    reader: R,
    frames_read: usize,
}

impl<R: BufRead> BincodeReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, frames_read: 0 }
    }
}

impl<R: BufRead> TrajectoryReader for BincodeReader<R> {
    fn next_frame(&mut self) -> Result<Option<FrameSnapshot>> {
        if at_end(&mut self.reader)? {
            return Ok(None);
        }
        let frame = bincode::deserialize_from(&mut self.reader)
            .with_context(|| format!("Failed to decode bincode frame {}", self.frames_read))?;
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

/// Back-to-back MessagePack-encoded frames.
pub struct MessagePackReader<R> {
    reader: R,
    frames_read: usize,
}

impl<R: BufRead> MessagePackReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, frames_read: 0 }
    }
}

impl<R: BufRead> TrajectoryReader for MessagePackReader<R> {
    fn next_frame(&mut self) -> Result<Option<FrameSnapshot>> {
        if at_end(&mut self.reader)? {
            return Ok(None);
        }
        let frame = rmp_serde::decode::from_read(&mut self.reader)
            .with_context(|| format!("Failed to decode MessagePack frame {}", self.frames_read))?;
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

/// Opens a trajectory file in the given format.
pub fn open_trajectory<P: AsRef<Path>>(path: P, format: DataFormat) -> Result<Box<dyn TrajectoryReader>> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open trajectory '{}'", path_ref.display()))?;
    let reader = BufReader::new(file);
    Ok(match format {
        DataFormat::Json => Box::new(JsonLinesReader::new(reader)),
        DataFormat::Bincode => Box::new(BincodeReader::new(reader)),
        DataFormat::MessagePack => Box::new(MessagePackReader::new(reader)),
    })
}

use super::{LineSource, RecordSink, SourcePoll, TransportError};
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Reads a text file line by line through a read-only memory map.
pub struct FileSource {
    mmap: Option<Mmap>,
    offset: usize,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        // Zero-length files cannot be mapped on every platform.
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: the map is read-only and the input is not expected to be
            // truncated while the pipeline runs.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { mmap, offset: 0 })
    }

    fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or_default()
    }
}

impl LineSource for FileSource {
    fn next_line(&mut self, _timeout: Duration) -> Result<SourcePoll, TransportError> {
        let bytes = self.bytes();
        if self.offset >= bytes.len() {
            return Ok(SourcePoll::Exhausted);
        }

        let rest = &bytes[self.offset..];
        let (line, consumed) = match rest.iter().position(|b| *b == b'\n') {
            Some(pos) => (&rest[..pos], pos + 1),
            None => (rest, rest.len()),
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = String::from_utf8_lossy(line).into_owned();

        self.offset += consumed;
        Ok(SourcePoll::Line(line))
    }
}

/// Writes one record per line to a file, creating parent directories.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl RecordSink for FileSink {
    fn write_record(&mut self, record: &str) -> Result<(), TransportError> {
        self.writer.write_all(record.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.writer.flush()?;
        Ok(())
    }
}

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info};
use xxhash_rust::xxh3::Xxh3;

use super::error::{FormatError, Result};
use super::format::{encode_header, encode_record, Footer, FORMAT_VERSION, SBT_MAGIC};
use super::io::WriteLeExt;
use crate::types::events::TraceEvent;
use crate::types::record::TraceMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Created,
    /// Header is out; the event count lives at `count_offset`
    Open { count_offset: u64 },
}

/// Append-only SBT writer.
///
/// Events are written in call order; the writer never sorts. The file is only
/// complete once [`SbtWriter::finalize`] has run.
pub struct SbtWriter<W: Write + Seek> {
    inner: W,
    state: WriterState,
    event_count: u64,
    hasher: Xxh3,
    scratch: Vec<u8>,
}

impl SbtWriter<BufWriter<File>> {
    /// Create (or truncate) a trace file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        debug!("Opened trace file for writing: {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Seek> SbtWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: WriterState::Created,
            event_count: 0,
            hasher: Xxh3::new(),
            scratch: Vec::with_capacity(256),
        }
    }

    /// Write the preamble and metadata block. Must precede any event.
    pub fn write_header(&mut self, metadata: &TraceMetadata) -> Result<()> {
        if self.state != WriterState::Created {
            return Err(FormatError::WriterState("header already written"));
        }

        let header = encode_header(metadata)?;
        let header_len = u32::try_from(header.len()).map_err(|_| FormatError::FieldTooLong {
            field: "header",
            len: header.len(),
            max: u32::MAX as usize,
        })?;

        self.inner.write_all(SBT_MAGIC)?;
        self.inner.write_u16_le(FORMAT_VERSION)?;
        self.inner.write_u32_le(header_len)?;
        self.inner.write_all(&header)?;

        let count_offset = self.inner.stream_position()?;
        // Placeholder, patched by finalize
        self.inner.write_u64_le(0)?;

        self.state = WriterState::Open { count_offset };
        debug!(
            "Wrote SBT header v{} ({} bytes, {} devices)",
            FORMAT_VERSION,
            header_len,
            metadata.devices.len()
        );
        Ok(())
    }

    pub fn write_event(&mut self, event: &TraceEvent) -> Result<()> {
        if !matches!(self.state, WriterState::Open { .. }) {
            return Err(FormatError::WriterState("write_header must precede events"));
        }

        self.scratch.clear();
        encode_record(event, &mut self.scratch)?;
        self.inner.write_all(&self.scratch)?;
        self.hasher.update(&self.scratch);
        self.event_count += 1;
        Ok(())
    }

    pub fn write_events(&mut self, events: &[TraceEvent]) -> Result<()> {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    /// Number of events written so far
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Append the footer, patch the event count and flush.
    ///
    /// Returns the underlying writer positioned at the end of the file.
    pub fn finalize(mut self) -> Result<W> {
        let WriterState::Open { count_offset } = self.state else {
            return Err(FormatError::WriterState("finalize before write_header"));
        };

        let footer = Footer {
            event_count: self.event_count,
            checksum: self.hasher.digest(),
        };
        footer.write_to(&mut self.inner)?;

        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(count_offset))?;
        self.inner.write_u64_le(self.event_count)?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;

        info!(
            "Finalized trace: {} events, {} bytes",
            self.event_count, end
        );
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::events::EventType;
    use std::io::Cursor;

    #[test]
    fn test_event_before_header_is_rejected() {
        let mut writer = SbtWriter::new(Cursor::new(Vec::new()));
        let err = writer
            .write_event(&TraceEvent::new(EventType::Marker, 0))
            .unwrap_err();
        assert!(matches!(err, FormatError::WriterState(_)));
        assert_eq!(writer.event_count(), 0);
    }

    #[test]
    fn test_header_written_once() {
        let mut writer = SbtWriter::new(Cursor::new(Vec::new()));
        writer.write_header(&TraceMetadata::default()).unwrap();
        assert!(matches!(
            writer.write_header(&TraceMetadata::default()),
            Err(FormatError::WriterState(_))
        ));
    }

    #[test]
    fn test_finalize_before_header_is_rejected() {
        let writer = SbtWriter::new(Cursor::new(Vec::new()));
        assert!(matches!(writer.finalize(), Err(FormatError::WriterState(_))));
    }

    #[test]
    fn test_finalize_patches_count_and_appends_footer() {
        let mut writer = SbtWriter::new(Cursor::new(Vec::new()));
        writer.write_header(&TraceMetadata::new("app")).unwrap();
        writer
            .write_events(&[
                TraceEvent::new(EventType::KernelLaunch, 1).with_name("k"),
                TraceEvent::new(EventType::StreamSync, 2),
            ])
            .unwrap();
        assert_eq!(writer.event_count(), 2);

        let bytes = writer.finalize().unwrap().into_inner();
        assert_eq!(&bytes[..4], SBT_MAGIC);
        assert_eq!(bytes[4..6], FORMAT_VERSION.to_le_bytes());

        let header_len = u32::from_le_bytes(bytes[6..10].try_into().unwrap()) as usize;
        let count_at = 10 + header_len;
        assert_eq!(bytes[count_at..count_at + 8], 2u64.to_le_bytes());

        let footer = &bytes[bytes.len() - 20..];
        assert_eq!(&footer[..4], b"SBTE");
        assert_eq!(footer[4..12], 2u64.to_le_bytes());
    }
}

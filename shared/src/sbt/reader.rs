use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use super::error::{FormatError, Result};
use super::format::{
    check_version, decode_header, decode_record, Footer, RecordError, FOOTER_LEN,
    MAX_HEADER_LEN, PREAMBLE_LEN, SBT_MAGIC,
};
use super::io::ReadLeExt;
use crate::types::events::TraceEvent;
use crate::types::record::TraceMetadata;

/// Records decoded per internal batch by `read_all`
const READ_BATCH: usize = 4096;

/// Outcome of [`SbtReader::recover_events`]
#[derive(Debug, Clone)]
pub struct RecoveredTrace {
    pub metadata: TraceMetadata,
    pub events: Vec<TraceEvent>,
    /// True when the file was properly finalized and fully verified
    pub complete: bool,
}

struct Header {
    version: u16,
    metadata: TraceMetadata,
    event_count: u64,
    events_start: u64,
}

/// Header plus a footer that agrees with it
struct Layout {
    header: Header,
    footer: Footer,
    events_end: u64,
}

struct EventCursor {
    index: u64,
    position: u64,
    hasher: Xxh3,
    verified: bool,
}

/// First streaming failure, replayed until [`SbtReader::rewind`]
#[derive(Debug, Clone)]
enum ReadFailure {
    Record {
        index: u64,
        offset: u64,
        reason: String,
    },
    Checksum {
        expected: u64,
        found: u64,
    },
    Io {
        kind: io::ErrorKind,
        message: String,
    },
}

impl ReadFailure {
    fn from_error(err: &FormatError) -> Self {
        match err {
            FormatError::CorruptRecord {
                index,
                offset,
                reason,
            } => ReadFailure::Record {
                index: *index,
                offset: *offset,
                reason: reason.clone(),
            },
            FormatError::ChecksumMismatch { expected, found } => ReadFailure::Checksum {
                expected: *expected,
                found: *found,
            },
            FormatError::Io(e) => ReadFailure::Io {
                kind: e.kind(),
                message: e.to_string(),
            },
            other => ReadFailure::Io {
                kind: io::ErrorKind::InvalidData,
                message: other.to_string(),
            },
        }
    }

    fn to_error(&self) -> FormatError {
        match self {
            ReadFailure::Record {
                index,
                offset,
                reason,
            } => FormatError::CorruptRecord {
                index: *index,
                offset: *offset,
                reason: reason.clone(),
            },
            ReadFailure::Checksum { expected, found } => FormatError::ChecksumMismatch {
                expected: *expected,
                found: *found,
            },
            ReadFailure::Io { kind, message } => {
                FormatError::Io(io::Error::new(*kind, message.clone()))
            }
        }
    }
}

impl EventCursor {
    fn new(position: u64) -> Self {
        Self {
            index: 0,
            position,
            hasher: Xxh3::new(),
            verified: false,
        }
    }
}

/// Feeds every byte read into the checksum and counts them
struct HashingReader<'a, R> {
    inner: &'a mut R,
    hasher: &'a mut Xxh3,
    read: u64,
}

impl<R: Read> Read for HashingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

fn truncated(offset: u64, context: &'static str) -> impl FnOnce(io::Error) -> FormatError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::Truncated { offset, context }
        } else {
            FormatError::Io(e)
        }
    }
}

fn read_header<R: Read + Seek>(r: &mut R) -> Result<Header> {
    r.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated(0, "magic"))?;
    if &magic != SBT_MAGIC {
        return Err(FormatError::InvalidMagic);
    }

    let version = r.read_u16_le().map_err(truncated(4, "format version"))?;
    check_version(version)?;

    let header_len = r.read_u32_le().map_err(truncated(6, "header length"))?;
    if header_len > MAX_HEADER_LEN {
        return Err(FormatError::CorruptHeader(format!(
            "header length {header_len} exceeds limit {MAX_HEADER_LEN}"
        )));
    }
    let bytes = r
        .read_exact_vec(header_len as usize)
        .map_err(truncated(PREAMBLE_LEN, "header"))?;
    let metadata = decode_header(version, &bytes)?;

    let count_offset = PREAMBLE_LEN + header_len as u64;
    let event_count = r
        .read_u64_le()
        .map_err(truncated(count_offset, "event count"))?;

    Ok(Header {
        version,
        metadata,
        event_count,
        events_start: count_offset + 8,
    })
}

fn load_layout<R: Read + Seek>(r: &mut R) -> Result<Layout> {
    let header = read_header(r)?;

    let file_len = r.seek(SeekFrom::End(0))?;
    if file_len < header.events_start + FOOTER_LEN {
        return Err(FormatError::Truncated {
            offset: file_len,
            context: "missing footer",
        });
    }
    let events_end = file_len - FOOTER_LEN;
    r.seek(SeekFrom::Start(events_end))?;
    let footer = Footer::read_from(r)
        .map_err(truncated(events_end, "footer"))?
        .ok_or(FormatError::Truncated {
            offset: events_end,
            context: "missing footer, trace was never finalized",
        })?;
    if footer.event_count != header.event_count {
        return Err(FormatError::Truncated {
            offset: header.events_start - 8,
            context: "event count was never finalized",
        });
    }

    Ok(Layout {
        header,
        footer,
        events_end,
    })
}

/// Reader for SBT containers.
///
/// Validation is lazy: the first call that needs the layout parses the
/// header and checks the footer, and the result is cached. Events can be
/// consumed in bounded batches with [`SbtReader::read_events`] so large
/// traces never have to be materialized at once.
pub struct SbtReader<R: Read + Seek> {
    inner: R,
    layout: Option<Layout>,
    cursor: Option<EventCursor>,
    failure: Option<ReadFailure>,
}

impl SbtReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("Opened trace file for reading: {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read + Seek> SbtReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            layout: None,
            cursor: None,
            failure: None,
        }
    }

    fn ensure_layout(&mut self) -> Result<&Layout> {
        let layout = match self.layout.take() {
            Some(layout) => layout,
            None => load_layout(&mut self.inner)?,
        };
        Ok(self.layout.insert(layout))
    }

    /// Cheap structural check: magic, version, header and footer.
    ///
    /// Does not read event records.
    pub fn is_valid(&mut self) -> bool {
        match self.ensure_layout() {
            Ok(_) => true,
            Err(e) => {
                debug!("Trace failed validation: {}", e);
                false
            }
        }
    }

    pub fn version(&mut self) -> Result<u16> {
        Ok(self.ensure_layout()?.header.version)
    }

    /// Header metadata, without touching event records
    pub fn read_metadata(&mut self) -> Result<TraceMetadata> {
        Ok(self.ensure_layout()?.header.metadata.clone())
    }

    pub fn event_count(&mut self) -> Result<u64> {
        Ok(self.ensure_layout()?.header.event_count)
    }

    /// Restart streaming from the first event, clearing any earlier failure
    pub fn rewind(&mut self) {
        self.cursor = None;
        self.failure = None;
    }

    /// Read up to `max` further events. Returns an empty batch once every
    /// event has been consumed.
    ///
    /// The record checksum is verified when the last event is read; a
    /// mismatch fails that call. After any failure every further call
    /// returns the same error until [`SbtReader::rewind`].
    pub fn read_events(&mut self, max: usize) -> Result<Vec<TraceEvent>> {
        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }

        let events_start = self.ensure_layout()?.header.events_start;
        let mut cursor = self
            .cursor
            .take()
            .unwrap_or_else(|| EventCursor::new(events_start));

        let result = self.decode_batch(&mut cursor, max);
        if let Err(e) = &result {
            self.failure = Some(ReadFailure::from_error(e));
        }
        self.cursor = Some(cursor);
        result
    }

    fn decode_batch(&mut self, cursor: &mut EventCursor, max: usize) -> Result<Vec<TraceEvent>> {
        let layout = self.ensure_layout()?;
        let event_count = layout.header.event_count;
        let events_end = layout.events_end;
        let expected_checksum = layout.footer.checksum;

        let remaining = event_count - cursor.index;
        let n = (max as u64).min(remaining) as usize;
        let mut out = Vec::with_capacity(n.min(READ_BATCH));

        if n > 0 {
            self.inner.seek(SeekFrom::Start(cursor.position))?;
        }
        for _ in 0..n {
            let record_start = cursor.position;
            let mut source = HashingReader {
                inner: &mut self.inner,
                hasher: &mut cursor.hasher,
                read: 0,
            };
            let decoded = decode_record(&mut source);
            let consumed = source.read;

            let event = match decoded {
                Ok(event) => event,
                Err(RecordError::Eof) => {
                    return Err(FormatError::CorruptRecord {
                        index: cursor.index,
                        offset: record_start,
                        reason: "record runs past end of file".to_string(),
                    })
                }
                Err(RecordError::Io(e)) => return Err(e.into()),
                Err(RecordError::Corrupt(reason)) => {
                    return Err(FormatError::CorruptRecord {
                        index: cursor.index,
                        offset: record_start,
                        reason,
                    })
                }
            };

            cursor.position += consumed;
            if cursor.position > events_end {
                return Err(FormatError::CorruptRecord {
                    index: cursor.index,
                    offset: record_start,
                    reason: "record overlaps footer".to_string(),
                });
            }
            cursor.index += 1;
            out.push(event);
        }

        if cursor.index == event_count && !cursor.verified {
            if cursor.position != events_end {
                return Err(FormatError::CorruptRecord {
                    index: cursor.index,
                    offset: cursor.position,
                    reason: format!(
                        "{} unexpected bytes before footer",
                        events_end - cursor.position
                    ),
                });
            }
            let found = cursor.hasher.digest();
            if found != expected_checksum {
                return Err(FormatError::ChecksumMismatch {
                    expected: expected_checksum,
                    found,
                });
            }
            cursor.verified = true;
        }

        Ok(out)
    }

    /// The full ordered event sequence. All or nothing: on error no events
    /// are returned.
    pub fn read_all(&mut self) -> Result<Vec<TraceEvent>> {
        self.rewind();
        let event_count = self.event_count()?;
        let mut events = Vec::with_capacity(event_count.min(READ_BATCH as u64 * 16) as usize);
        loop {
            let batch = self.read_events(READ_BATCH)?;
            if batch.is_empty() {
                break;
            }
            events.extend(batch);
        }
        self.rewind();
        Ok(events)
    }

    /// Tolerant read for traces whose writer never finalized.
    ///
    /// A finalized file goes through the strict path. Otherwise the header
    /// must still be intact, and every complete record up to the first short
    /// or undecodable one is returned.
    pub fn recover_events(&mut self) -> Result<RecoveredTrace> {
        if self.ensure_layout().is_ok() {
            let metadata = self.read_metadata()?;
            let events = self.read_all()?;
            return Ok(RecoveredTrace {
                metadata,
                events,
                complete: true,
            });
        }

        let header = read_header(&mut self.inner)?;
        self.inner.seek(SeekFrom::Start(header.events_start))?;

        let mut scratch_hasher = Xxh3::new();
        let mut events = Vec::new();
        let mut position = header.events_start;
        loop {
            let mut source = HashingReader {
                inner: &mut self.inner,
                hasher: &mut scratch_hasher,
                read: 0,
            };
            match decode_record(&mut source) {
                Ok(event) => {
                    position += source.read;
                    events.push(event);
                }
                Err(RecordError::Eof) => break,
                Err(RecordError::Corrupt(reason)) => {
                    warn!(
                        "Stopping recovery at record {} (offset {}): {}",
                        events.len(),
                        position,
                        reason
                    );
                    break;
                }
                Err(RecordError::Io(e)) => return Err(e.into()),
            }
        }

        warn!(
            "Recovered {} events from unfinalized trace ({} bytes of records)",
            events.len(),
            position - header.events_start
        );
        Ok(RecoveredTrace {
            metadata: header.metadata,
            events,
            complete: false,
        })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

//! On-disk layout: constants, header codec and event record codec.
//!
//! # Header schema evolution
//!
//! The header is bincode, which is positional, so every header shape ever
//! written keeps a mirror type here. Version 1 files carry
//! [`LegacyTraceMetadata`]; they are upgraded to the current
//! [`TraceMetadata`] with the new fields defaulted.

use std::io::{self, Read, Write};

use bincode::Options;
use serde::{Deserialize, Serialize};

use super::error::{FormatError, Result};
use super::io::{ReadLeExt, WriteLeExt};
use crate::types::events::{
    CallStack, EventType, FlowInfo, FlowType, KernelParams, MemoryParams, Payload, StackFrame,
    TraceEvent,
};
use crate::types::record::TraceMetadata;

pub const SBT_MAGIC: &[u8; 4] = b"SBT\0";
pub const FOOTER_MAGIC: &[u8; 4] = b"SBTE";

/// Version written by this build
pub const FORMAT_VERSION: u16 = 2;
/// Oldest version this build still reads
pub const MIN_SUPPORTED_VERSION: u16 = 1;

/// magic + version + header length
pub const PREAMBLE_LEN: u64 = 4 + 2 + 4;
/// magic + event count + checksum
pub const FOOTER_LEN: u64 = 4 + 8 + 8;
/// Upper bound on the encoded header, guards allocations on corrupt input
pub const MAX_HEADER_LEN: u32 = 16 * 1024 * 1024;

pub const FLAG_FLOW: u8 = 1 << 0;
pub const FLAG_CALL_STACK: u8 = 1 << 1;
pub const FLAG_PAYLOAD: u8 = 1 << 2;
pub const FLAG_ASYNC: u8 = 1 << 3;
const KNOWN_FLAGS: u8 = FLAG_FLOW | FLAG_CALL_STACK | FLAG_PAYLOAD | FLAG_ASYNC;

const PAYLOAD_KERNEL: u8 = 1;
const PAYLOAD_MEMORY: u8 = 2;
const PAYLOAD_COUNTER: u8 = 3;

/// Single bincode config for the header: fixint little-endian, so field
/// widths never depend on values or on the bincode defaults of the day.
fn header_bincode() -> impl bincode::config::Options {
    bincode::config::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_HEADER_LEN as u64)
}

/// Header shape of format version 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LegacyTraceMetadata {
    pub application_name: String,
    pub start_wall_clock: u64,
    pub schema_version: u32,
}

impl LegacyTraceMetadata {
    fn into_current(self) -> TraceMetadata {
        TraceMetadata {
            application_name: self.application_name,
            start_wall_clock: self.start_wall_clock,
            schema_version: self.schema_version,
            ..TraceMetadata::default()
        }
    }
}

pub(crate) fn check_version(version: u16) -> Result<()> {
    if !(MIN_SUPPORTED_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(FormatError::UnsupportedVersion {
            found: version,
            min: MIN_SUPPORTED_VERSION,
            max: FORMAT_VERSION,
        });
    }
    Ok(())
}

pub(crate) fn encode_header(metadata: &TraceMetadata) -> Result<Vec<u8>> {
    header_bincode()
        .serialize(metadata)
        .map_err(|e| FormatError::CorruptHeader(e.to_string()))
}

#[cfg(test)]
pub(crate) fn encode_legacy_header(metadata: &LegacyTraceMetadata) -> Vec<u8> {
    header_bincode().serialize(metadata).unwrap()
}

pub(crate) fn decode_header(version: u16, bytes: &[u8]) -> Result<TraceMetadata> {
    let decoded = match version {
        1 => header_bincode()
            .deserialize::<LegacyTraceMetadata>(bytes)
            .map(LegacyTraceMetadata::into_current),
        _ => header_bincode().deserialize::<TraceMetadata>(bytes),
    };
    decoded.map_err(|e| FormatError::CorruptHeader(e.to_string()))
}

/// Trailing block appended by `finalize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub event_count: u64,
    pub checksum: u64,
}

impl Footer {
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(FOOTER_MAGIC)?;
        w.write_u64_le(self.event_count)?;
        w.write_u64_le(self.checksum)
    }

    /// `None` when the magic is absent, i.e. the file was never finalized
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> io::Result<Option<Self>> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != FOOTER_MAGIC {
            return Ok(None);
        }
        Ok(Some(Self {
            event_count: r.read_u64_le()?,
            checksum: r.read_u64_le()?,
        }))
    }
}

fn len_u16(field: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| FormatError::FieldTooLong {
        field,
        len,
        max: u16::MAX as usize,
    })
}

/// Append one event record to `out`
pub(crate) fn encode_record(event: &TraceEvent, out: &mut Vec<u8>) -> Result<()> {
    let mut flags = 0u8;
    if event.flow.is_some() {
        flags |= FLAG_FLOW;
    }
    if event.call_stack.is_some() {
        flags |= FLAG_CALL_STACK;
    }
    if event.payload.is_some() {
        flags |= FLAG_PAYLOAD;
    }
    if event.is_async {
        flags |= FLAG_ASYNC;
    }

    let name = event.name.as_bytes();
    let name_len = len_u16("event name", name.len())?;

    out.write_u8(event.event_type as u8)?;
    out.write_u8(flags)?;
    out.write_u32_le(event.stream_id)?;
    out.write_u16_le(event.device_id)?;
    out.write_u64_le(event.timestamp)?;
    out.write_u64_le(event.duration)?;
    out.write_u16_le(name_len)?;
    out.write_all(name)?;

    if let Some(flow) = &event.flow {
        out.write_u64_le(flow.id)?;
        out.write_u8(flow.kind as u8)?;
        out.write_u8(flow.is_start as u8)?;
    }

    if let Some(stack) = &event.call_stack {
        out.write_u16_le(len_u16("call stack", stack.frames.len())?)?;
        for frame in &stack.frames {
            out.write_u64_le(frame.address)?;
            match &frame.symbol {
                Some(symbol) => {
                    out.write_u8(1)?;
                    out.write_u16_le(len_u16("frame symbol", symbol.len())?)?;
                    out.write_all(symbol.as_bytes())?;
                }
                None => out.write_u8(0)?,
            }
        }
    }

    if let Some(payload) = &event.payload {
        match payload {
            Payload::Kernel(k) => {
                out.write_u8(PAYLOAD_KERNEL)?;
                for v in [k.grid.0, k.grid.1, k.grid.2, k.block.0, k.block.1, k.block.2] {
                    out.write_u32_le(v)?;
                }
                out.write_u32_le(k.shared_mem_bytes)?;
                out.write_u32_le(k.registers_per_thread)?;
            }
            Payload::Memory(m) => {
                out.write_u8(PAYLOAD_MEMORY)?;
                out.write_u64_le(m.src_address)?;
                out.write_u64_le(m.dst_address)?;
                out.write_u64_le(m.size_bytes)?;
            }
            Payload::Counter { value } => {
                out.write_u8(PAYLOAD_COUNTER)?;
                out.write_u64_le(value.to_bits())?;
            }
        }
    }

    Ok(())
}

/// Why a record could not be decoded
pub(crate) enum RecordError {
    /// Input ended inside the record
    Eof,
    Io(io::Error),
    Corrupt(String),
}

impl From<io::Error> for RecordError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            RecordError::Eof
        } else {
            RecordError::Io(e)
        }
    }
}

fn read_string<R: Read + ?Sized>(
    r: &mut R,
    len: usize,
    what: &str,
) -> std::result::Result<String, RecordError> {
    let bytes = r.read_exact_vec(len)?;
    String::from_utf8(bytes).map_err(|_| RecordError::Corrupt(format!("{what} is not valid utf-8")))
}

/// Decode one event record
pub(crate) fn decode_record<R: Read + ?Sized>(
    r: &mut R,
) -> std::result::Result<TraceEvent, RecordError> {
    let type_byte = r.read_u8()?;
    let event_type = EventType::from_u8(type_byte)
        .ok_or_else(|| RecordError::Corrupt(format!("unknown event type {type_byte}")))?;
    let flags = r.read_u8()?;
    if flags & !KNOWN_FLAGS != 0 {
        return Err(RecordError::Corrupt(format!("unknown record flags {flags:#04x}")));
    }

    let stream_id = r.read_u32_le()?;
    let device_id = r.read_u16_le()?;
    let timestamp = r.read_u64_le()?;
    let duration = r.read_u64_le()?;
    let name_len = r.read_u16_le()? as usize;
    let name = read_string(r, name_len, "event name")?;

    let flow = if flags & FLAG_FLOW != 0 {
        let id = r.read_u64_le()?;
        let kind_byte = r.read_u8()?;
        let kind = FlowType::from_u8(kind_byte)
            .ok_or_else(|| RecordError::Corrupt(format!("unknown flow type {kind_byte}")))?;
        let is_start = match r.read_u8()? {
            0 => false,
            1 => true,
            other => return Err(RecordError::Corrupt(format!("invalid flow start flag {other}"))),
        };
        Some(FlowInfo { id, kind, is_start })
    } else {
        None
    };

    let call_stack = if flags & FLAG_CALL_STACK != 0 {
        let depth = r.read_u16_le()? as usize;
        let mut frames = Vec::with_capacity(depth);
        for _ in 0..depth {
            let address = r.read_u64_le()?;
            let symbol = match r.read_u8()? {
                0 => None,
                1 => {
                    let len = r.read_u16_le()? as usize;
                    Some(read_string(r, len, "frame symbol")?)
                }
                other => {
                    return Err(RecordError::Corrupt(format!("invalid symbol marker {other}")))
                }
            };
            frames.push(StackFrame { address, symbol });
        }
        Some(CallStack { frames })
    } else {
        None
    };

    let payload = if flags & FLAG_PAYLOAD != 0 {
        Some(match r.read_u8()? {
            PAYLOAD_KERNEL => {
                let mut v = [0u32; 8];
                for slot in v.iter_mut() {
                    *slot = r.read_u32_le()?;
                }
                Payload::Kernel(KernelParams {
                    grid: (v[0], v[1], v[2]),
                    block: (v[3], v[4], v[5]),
                    shared_mem_bytes: v[6],
                    registers_per_thread: v[7],
                })
            }
            PAYLOAD_MEMORY => Payload::Memory(MemoryParams {
                src_address: r.read_u64_le()?,
                dst_address: r.read_u64_le()?,
                size_bytes: r.read_u64_le()?,
            }),
            PAYLOAD_COUNTER => Payload::Counter {
                value: f64::from_bits(r.read_u64_le()?),
            },
            other => return Err(RecordError::Corrupt(format!("unknown payload tag {other}"))),
        })
    } else {
        None
    };

    Ok(TraceEvent {
        event_type,
        timestamp,
        duration,
        stream_id,
        device_id,
        name,
        is_async: flags & FLAG_ASYNC != 0,
        flow,
        call_stack,
        payload,
    })
}

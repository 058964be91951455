//! Protobuf wire-format scanning.
//!
//! A small zero-copy reader for the handful of places where we look at protobuf
//! bytes without a generated type: trace packets, statsd atom envelopes and atom
//! payloads. The reader never panics on bad input; malformed bytes end the scan
//! and leave the reader flagged so callers can decide whether that matters.

use thiserror::Error;

/// Wire type of a protobuf field as it appears in the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn from_tag(tag: u64) -> Option<Self> {
        match tag & 0x07 {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            // 3/4 are deprecated groups, 6/7 are not assigned.
            _ => None,
        }
    }

    fn as_raw(self) -> u64 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::Fixed32 => 5,
        }
    }
}

/// Errors produced when reading wire-format data strictly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed field at offset {offset}")]
    Malformed { offset: usize },

    #[error("truncated varint at offset {offset}")]
    TruncatedVarint { offset: usize },
}

/// The value of a single field, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    Fixed32(u32),
}

/// One decoded field: its id and raw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    pub id: u32,
    pub value: FieldValue<'a>,
}

impl FieldValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Varint(_) => WireType::Varint,
            FieldValue::Fixed64(_) => WireType::Fixed64,
            FieldValue::LengthDelimited(_) => WireType::LengthDelimited,
            FieldValue::Fixed32(_) => WireType::Fixed32,
        }
    }
}

impl<'a> Field<'a> {
    pub fn wire_type(&self) -> WireType {
        self.value.wire_type()
    }

    /// The payload of a length-delimited field, or an empty slice for any other wire type.
    pub fn as_bytes(&self) -> &'a [u8] {
        match self.value {
            FieldValue::LengthDelimited(bytes) => bytes,
            _ => &[],
        }
    }

    /// Integer view of the field, with the same truncation rules protobuf uses.
    pub fn as_u64(&self) -> u64 {
        match self.value {
            FieldValue::Varint(v) | FieldValue::Fixed64(v) => v,
            FieldValue::Fixed32(v) => v as u64,
            FieldValue::LengthDelimited(_) => 0,
        }
    }

    pub fn as_i64(&self) -> i64 {
        self.as_u64() as i64
    }

    pub fn as_f32(&self) -> f32 {
        match self.value {
            FieldValue::Fixed32(v) => f32::from_bits(v),
            _ => 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self.value {
            FieldValue::Fixed64(v) => f64::from_bits(v),
            _ => 0.0,
        }
    }
}

/// Iterator over the top-level fields of a protobuf message.
///
/// Iteration stops at the end of the buffer or at the first malformed field.
/// [`FieldReader::is_malformed`] tells the two apart.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    malformed: bool,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            malformed: false,
        }
    }

    /// True if the scan stopped because the input could not be decoded.
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Bytes not yet consumed.
    pub fn bytes_left(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_field(&mut self) -> Result<Field<'a>, WireError> {
        let start = self.pos;
        let tag = read_varint(self.buf, &mut self.pos)?;
        let id = tag >> 3;
        if id == 0 || id > u32::MAX as u64 {
            return Err(WireError::Malformed { offset: start });
        }
        let wire_type = WireType::from_tag(tag).ok_or(WireError::Malformed { offset: start })?;

        let value = match wire_type {
            WireType::Varint => FieldValue::Varint(read_varint(self.buf, &mut self.pos)?),
            WireType::Fixed64 => {
                let bytes = self.take(8, start)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                FieldValue::Fixed64(u64::from_le_bytes(raw))
            }
            WireType::Fixed32 => {
                let bytes = self.take(4, start)?;
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                FieldValue::Fixed32(u32::from_le_bytes(raw))
            }
            WireType::LengthDelimited => {
                let len = read_varint(self.buf, &mut self.pos)?;
                let len = usize::try_from(len).map_err(|_| WireError::Malformed { offset: start })?;
                FieldValue::LengthDelimited(self.take(len, start)?)
            }
        };

        Ok(Field {
            id: id as u32,
            value,
        })
    }

    fn take(&mut self, len: usize, field_start: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(WireError::Malformed {
                offset: field_start,
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }
}

impl<'a> Iterator for FieldReader<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.malformed || self.pos >= self.buf.len() {
            return None;
        }
        match self.read_field() {
            Ok(field) => Some(field),
            Err(_) => {
                self.malformed = true;
                None
            }
        }
    }
}

/// Read the first field of a message, if there is a well-formed one.
pub fn first_field(buf: &[u8]) -> Option<Field<'_>> {
    FieldReader::new(buf).next()
}

/// Read a varint starting at `*pos`, advancing `*pos` past it.
pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64, WireError> {
    let start = *pos;
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or(WireError::TruncatedVarint { offset: start })?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(WireError::TruncatedVarint { offset: start });
        }
    }
}

/// Decode a packed run of varints.
pub fn read_packed_varints(buf: &[u8]) -> Result<Vec<u64>, WireError> {
    let mut pos = 0;
    let mut values = Vec::new();
    while pos < buf.len() {
        values.push(read_varint(buf, &mut pos)?);
    }
    Ok(values)
}

pub fn zigzag_decode_64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn zigzag_decode_32(value: u64) -> i64 {
    let v = value as u32;
    (((v >> 1) as i32) ^ -((v & 1) as i32)) as i64
}

pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn write_tag(out: &mut Vec<u8>, field_id: u32, wire_type: WireType) {
    write_varint(out, ((field_id as u64) << 3) | wire_type.as_raw());
}

pub fn write_varint_field(out: &mut Vec<u8>, field_id: u32, value: u64) {
    write_tag(out, field_id, WireType::Varint);
    write_varint(out, value);
}

pub fn write_bytes_field(out: &mut Vec<u8>, field_id: u32, bytes: &[u8]) {
    write_tag(out, field_id, WireType::LengthDelimited);
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub fn write_fixed32_field(out: &mut Vec<u8>, field_id: u32, value: u32) {
    write_tag(out, field_id, WireType::Fixed32);
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_fixed64_field(out: &mut Vec<u8>, field_id: u32, value: u64) {
    write_tag(out, field_id, WireType::Fixed64);
    out.extend_from_slice(&value.to_le_bytes());
}

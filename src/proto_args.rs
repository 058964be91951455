//! Schema-driven conversion of protobuf messages into flat arguments.
//!
//! Given a message type from a [`DescriptorPool`], every leaf scalar field is
//! reported to an [`ArgsDelegate`] under a dotted key. Repeated fields get an
//! index in `key` (`foo[2].bar`) but not in `flat_key` (`foo.bar`), so all
//! entries of a repeated field share a flat key.

use std::collections::HashMap;

use thiserror::Error;

use crate::descriptors::{DescriptorPool, FieldDescriptor, FieldType};
use crate::wire::{self, FieldReader, FieldValue, WireType};

const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Key {
    pub flat_key: String,
    pub key: String,
}

impl Key {
    pub fn new(name: &str) -> Self {
        Self {
            flat_key: name.to_string(),
            key: name.to_string(),
        }
    }

    fn child(&self, name: &str) -> Self {
        if self.flat_key.is_empty() {
            return Self::new(name);
        }
        Self {
            flat_key: format!("{}.{}", self.flat_key, name),
            key: format!("{}.{}", self.key, name),
        }
    }

    fn indexed(mut self, index: usize) -> Self {
        self.key.push_str(&format!("[{index}]"));
        self
    }
}

/// Receiver for the arguments produced while parsing a message.
pub trait ArgsDelegate {
    fn add_integer(&mut self, key: &Key, value: i64);
    fn add_unsigned_integer(&mut self, key: &Key, value: u64);
    fn add_string(&mut self, key: &Key, value: &str);
    fn add_double(&mut self, key: &Key, value: f64);
    fn add_pointer(&mut self, key: &Key, value: u64);
    fn add_boolean(&mut self, key: &Key, value: bool);
    fn add_bytes(&mut self, key: &Key, value: &[u8]);
    /// Returns false if the delegate did not accept the value.
    fn add_json(&mut self, key: &Key, value: &str) -> bool;
    fn add_null(&mut self, key: &Key);
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsParseError {
    #[error("unknown message type {type_name}")]
    UnknownMessage { type_name: String },

    #[error("malformed {type_name} payload")]
    Malformed { type_name: String },

    #[error("field {field} has wire type {wire_type:?} which does not match its declared type")]
    WireTypeMismatch { field: String, wire_type: WireType },

    #[error("message nesting too deep at {field}")]
    TooDeep { field: String },
}

pub struct ProtoArgsParser<'p> {
    pool: &'p DescriptorPool,
}

impl<'p> ProtoArgsParser<'p> {
    pub fn new(pool: &'p DescriptorPool) -> Self {
        Self { pool }
    }

    /// Parse `bytes` as a `type_name` message, emitting every field found.
    pub fn parse_message(
        &self,
        bytes: &[u8],
        type_name: &str,
        delegate: &mut dyn ArgsDelegate,
    ) -> Result<(), ArgsParseError> {
        self.parse_message_internal(bytes, type_name, &Key::default(), delegate, 0)
    }

    fn parse_message_internal(
        &self,
        bytes: &[u8],
        type_name: &str,
        prefix: &Key,
        delegate: &mut dyn ArgsDelegate,
        depth: usize,
    ) -> Result<(), ArgsParseError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ArgsParseError::TooDeep {
                field: prefix.key.clone(),
            });
        }
        let descriptor =
            self.pool
                .find_message(type_name)
                .ok_or_else(|| ArgsParseError::UnknownMessage {
                    type_name: type_name.to_string(),
                })?;

        let mut next_index: HashMap<u32, usize> = HashMap::new();
        let mut reader = FieldReader::new(bytes);
        for field in reader.by_ref() {
            // Fields newer than our schema are skipped.
            let Some(fd) = descriptor.field(field.id) else {
                continue;
            };
            let key = prefix.child(&fd.name);

            if fd.repeated && is_packable(fd.field_type) {
                if let FieldValue::LengthDelimited(packed) = field.value {
                    for value in unpack(fd, packed)? {
                        let key = next_key(&key, fd, &mut next_index);
                        self.emit_scalar(fd, value, &key, delegate)?;
                    }
                    continue;
                }
            }

            let key = next_key(&key, fd, &mut next_index);
            if fd.field_type == FieldType::Message {
                let FieldValue::LengthDelimited(nested) = field.value else {
                    return Err(mismatch(fd, field.wire_type()));
                };
                self.parse_message_internal(nested, &fd.type_name, &key, delegate, depth + 1)?;
            } else {
                self.emit_scalar(fd, field.value, &key, delegate)?;
            }
        }

        if reader.is_malformed() {
            return Err(ArgsParseError::Malformed {
                type_name: type_name.to_string(),
            });
        }
        Ok(())
    }

    fn emit_scalar(
        &self,
        fd: &FieldDescriptor,
        value: FieldValue<'_>,
        key: &Key,
        delegate: &mut dyn ArgsDelegate,
    ) -> Result<(), ArgsParseError> {
        match (fd.field_type, value) {
            (FieldType::Int32, FieldValue::Varint(v)) => delegate.add_integer(key, v as i32 as i64),
            (FieldType::Int64, FieldValue::Varint(v)) => delegate.add_integer(key, v as i64),
            (FieldType::SInt32, FieldValue::Varint(v)) => {
                delegate.add_integer(key, wire::zigzag_decode_32(v))
            }
            (FieldType::SInt64, FieldValue::Varint(v)) => {
                delegate.add_integer(key, wire::zigzag_decode_64(v))
            }
            (FieldType::UInt32, FieldValue::Varint(v)) => {
                delegate.add_unsigned_integer(key, v as u32 as u64)
            }
            (FieldType::UInt64, FieldValue::Varint(v)) => delegate.add_unsigned_integer(key, v),
            (FieldType::Bool, FieldValue::Varint(v)) => delegate.add_boolean(key, v != 0),
            (FieldType::Enum, FieldValue::Varint(v)) => {
                let value = v as i32;
                match self
                    .pool
                    .find_enum(&fd.type_name)
                    .and_then(|e| e.value_name(value))
                {
                    Some(name) => delegate.add_string(key, name),
                    None => delegate.add_integer(key, value as i64),
                }
            }
            (FieldType::Fixed32, FieldValue::Fixed32(v)) => {
                delegate.add_unsigned_integer(key, v as u64)
            }
            (FieldType::SFixed32, FieldValue::Fixed32(v)) => {
                delegate.add_integer(key, v as i32 as i64)
            }
            (FieldType::Float, FieldValue::Fixed32(v)) => {
                delegate.add_double(key, f32::from_bits(v) as f64)
            }
            (FieldType::Fixed64, FieldValue::Fixed64(v)) => delegate.add_unsigned_integer(key, v),
            (FieldType::SFixed64, FieldValue::Fixed64(v)) => delegate.add_integer(key, v as i64),
            (FieldType::Double, FieldValue::Fixed64(v)) => {
                delegate.add_double(key, f64::from_bits(v))
            }
            (FieldType::String, FieldValue::LengthDelimited(bytes)) => {
                delegate.add_string(key, &String::from_utf8_lossy(bytes))
            }
            (FieldType::Bytes, FieldValue::LengthDelimited(bytes)) => {
                delegate.add_bytes(key, bytes)
            }
            (_, value) => return Err(mismatch(fd, value.wire_type())),
        }
        Ok(())
    }
}

fn mismatch(fd: &FieldDescriptor, wire_type: WireType) -> ArgsParseError {
    ArgsParseError::WireTypeMismatch {
        field: fd.name.clone(),
        wire_type,
    }
}

fn next_key(key: &Key, fd: &FieldDescriptor, next_index: &mut HashMap<u32, usize>) -> Key {
    if !fd.repeated {
        return key.clone();
    }
    let index = next_index.entry(fd.number).or_insert(0);
    let key = key.clone().indexed(*index);
    *index += 1;
    key
}

fn is_packable(field_type: FieldType) -> bool {
    !matches!(
        field_type,
        FieldType::String | FieldType::Bytes | FieldType::Message | FieldType::Group
    )
}

fn unpack<'a>(fd: &FieldDescriptor, packed: &'a [u8]) -> Result<Vec<FieldValue<'a>>, ArgsParseError> {
    let malformed = || ArgsParseError::Malformed {
        type_name: fd.name.clone(),
    };
    match fd.field_type {
        FieldType::Fixed32 | FieldType::SFixed32 | FieldType::Float => {
            if packed.len() % 4 != 0 {
                return Err(malformed());
            }
            Ok(packed
                .chunks_exact(4)
                .map(|c| FieldValue::Fixed32(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect())
        }
        FieldType::Fixed64 | FieldType::SFixed64 | FieldType::Double => {
            if packed.len() % 8 != 0 {
                return Err(malformed());
            }
            Ok(packed
                .chunks_exact(8)
                .map(|c| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(c);
                    FieldValue::Fixed64(u64::from_le_bytes(raw))
                })
                .collect())
        }
        _ => wire::read_packed_varints(packed)
            .map(|values| values.into_iter().map(FieldValue::Varint).collect())
            .map_err(|_| malformed()),
    }
}

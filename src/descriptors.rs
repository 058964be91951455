//! Descriptor pool built from a serialized `FileDescriptorSet`.
//!
//! Only what the args parser needs is kept: message fields by number and enum
//! value names. Everything is keyed by fully-qualified name with a leading dot,
//! e.g. `.android.os.statsd.Atom`.

use std::collections::{BTreeMap, HashMap};

use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorSet,
};
use protobuf::Message;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("failed to decode FileDescriptorSet: {0}")]
    Decode(#[from] protobuf::Error),

    #[error("field {field} of {message} has invalid number {number}")]
    InvalidFieldNumber {
        message: String,
        field: String,
        number: i32,
    },
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    UInt32,
    Enum,
    SFixed32,
    SFixed64,
    SInt32,
    SInt64,
}

impl From<Type> for FieldType {
    fn from(ty: Type) -> Self {
        match ty {
            Type::TYPE_DOUBLE => FieldType::Double,
            Type::TYPE_FLOAT => FieldType::Float,
            Type::TYPE_INT64 => FieldType::Int64,
            Type::TYPE_UINT64 => FieldType::UInt64,
            Type::TYPE_INT32 => FieldType::Int32,
            Type::TYPE_FIXED64 => FieldType::Fixed64,
            Type::TYPE_FIXED32 => FieldType::Fixed32,
            Type::TYPE_BOOL => FieldType::Bool,
            Type::TYPE_STRING => FieldType::String,
            Type::TYPE_GROUP => FieldType::Group,
            Type::TYPE_MESSAGE => FieldType::Message,
            Type::TYPE_BYTES => FieldType::Bytes,
            Type::TYPE_UINT32 => FieldType::UInt32,
            Type::TYPE_ENUM => FieldType::Enum,
            Type::TYPE_SFIXED32 => FieldType::SFixed32,
            Type::TYPE_SFIXED64 => FieldType::SFixed64,
            Type::TYPE_SINT32 => FieldType::SInt32,
            Type::TYPE_SINT64 => FieldType::SInt64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: u32,
    pub field_type: FieldType,
    /// Fully-qualified message or enum type for `Message`/`Enum` fields, empty otherwise.
    pub type_name: String,
    pub repeated: bool,
}

#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    full_name: String,
    fields: BTreeMap<u32, FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn fields(&self) -> &BTreeMap<u32, FieldDescriptor> {
        &self.fields
    }

    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.get(&number)
    }
}

#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    values: HashMap<i32, String>,
}

impl EnumDescriptor {
    pub fn value_name(&self, value: i32) -> Option<&str> {
        self.values.get(&value).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct DescriptorPool {
    messages: Vec<MessageDescriptor>,
    message_index: HashMap<String, usize>,
    enums: HashMap<String, EnumDescriptor>,
}

impl DescriptorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from the bytes of a serialized `FileDescriptorSet`.
    pub fn from_file_descriptor_set_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let mut pool = Self::new();
        pool.add_from_file_descriptor_set_bytes(bytes)?;
        Ok(pool)
    }

    pub fn add_from_file_descriptor_set_bytes(&mut self, bytes: &[u8]) -> Result<(), DescriptorError> {
        let set = FileDescriptorSet::parse_from_bytes(bytes)?;
        self.add_file_descriptor_set(&set)
    }

    pub fn add_file_descriptor_set(&mut self, set: &FileDescriptorSet) -> Result<(), DescriptorError> {
        let first_new = self.messages.len();
        for file in &set.file {
            let scope = if file.package().is_empty() {
                String::new()
            } else {
                format!(".{}", file.package())
            };
            for message in &file.message_type {
                self.add_message(&scope, message)?;
            }
            for enum_type in &file.enum_type {
                self.add_enum(&scope, enum_type);
            }
        }
        self.resolve_type_names(first_new);
        Ok(())
    }

    fn add_message(&mut self, scope: &str, proto: &DescriptorProto) -> Result<(), DescriptorError> {
        let full_name = format!("{}.{}", scope, proto.name());

        for nested in &proto.nested_type {
            self.add_message(&full_name, nested)?;
        }
        for enum_type in &proto.enum_type {
            self.add_enum(&full_name, enum_type);
        }

        if self.message_index.contains_key(&full_name) {
            debug!("Skipping duplicate message descriptor {}", full_name);
            return Ok(());
        }

        let mut fields = BTreeMap::new();
        for field in &proto.field {
            let descriptor = Self::field_descriptor(&full_name, field)?;
            fields.insert(descriptor.number, descriptor);
        }

        self.message_index.insert(full_name.clone(), self.messages.len());
        self.messages.push(MessageDescriptor { full_name, fields });
        Ok(())
    }

    fn field_descriptor(
        message: &str,
        field: &FieldDescriptorProto,
    ) -> Result<FieldDescriptor, DescriptorError> {
        let number = u32::try_from(field.number())
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| DescriptorError::InvalidFieldNumber {
                message: message.to_string(),
                field: field.name().to_string(),
                number: field.number(),
            })?;

        Ok(FieldDescriptor {
            name: field.name().to_string(),
            number,
            field_type: field.type_().into(),
            type_name: field.type_name().to_string(),
            repeated: field.label() == Label::LABEL_REPEATED,
        })
    }

    fn add_enum(&mut self, scope: &str, proto: &EnumDescriptorProto) {
        let full_name = format!("{}.{}", scope, proto.name());
        let values = proto
            .value
            .iter()
            .map(|v| (v.number(), v.name().to_string()))
            .collect();
        self.enums
            .entry(full_name)
            .or_insert(EnumDescriptor { values });
    }

    /// Turn relative type names into fully-qualified ones, using protobuf's
    /// innermost-scope-first lookup rules.
    fn resolve_type_names(&mut self, first_new: usize) {
        for idx in first_new..self.messages.len() {
            let scope = self.messages[idx].full_name.clone();
            let unresolved: Vec<(u32, String)> = self.messages[idx]
                .fields
                .values()
                .filter(|f| !f.type_name.is_empty() && !f.type_name.starts_with('.'))
                .map(|f| (f.number, f.type_name.clone()))
                .collect();

            for (number, type_name) in unresolved {
                if let Some(resolved) = self.resolve_relative(&scope, &type_name) {
                    if let Some(field) = self.messages[idx].fields.get_mut(&number) {
                        field.type_name = resolved;
                    }
                }
            }
        }
    }

    fn resolve_relative(&self, scope: &str, type_name: &str) -> Option<String> {
        let mut scope = scope;
        loop {
            let candidate = format!("{}.{}", scope, type_name);
            if self.message_index.contains_key(&candidate) || self.enums.contains_key(&candidate) {
                return Some(candidate);
            }
            if scope.is_empty() {
                return None;
            }
            scope = match scope.rfind('.') {
                Some(pos) => &scope[..pos],
                None => "",
            };
        }
    }

    /// Look up a message by name. The leading dot is optional.
    pub fn find_message(&self, name: &str) -> Option<&MessageDescriptor> {
        let idx = if name.starts_with('.') {
            self.message_index.get(name)
        } else {
            self.message_index.get(&format!(".{name}"))
        }?;
        self.messages.get(*idx)
    }

    pub fn find_enum(&self, name: &str) -> Option<&EnumDescriptor> {
        if name.starts_with('.') {
            self.enums.get(name)
        } else {
            self.enums.get(&format!(".{name}"))
        }
    }
}

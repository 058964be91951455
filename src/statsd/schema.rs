//! The atom schema: a descriptor pool plus the resolved top-level `Atom` message.

use crate::descriptors::{DescriptorError, DescriptorPool, MessageDescriptor};
use crate::proto_args::{ArgsDelegate, ArgsParseError, ProtoArgsParser};

use super::builtin;

/// Result of looking an atom id up in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomLookup<'a> {
    /// The `Atom` message itself could not be loaded.
    NoSchema,
    /// The id is a member of the `Atom` union; carries its declared name.
    Known(&'a str),
    /// The schema loaded but does not know this id.
    Unknown,
}

/// What the statsd importer needs from a schema registry.
pub trait AtomRegistry {
    fn atom_field(&self, field_id: u32) -> AtomLookup<'_>;

    /// Decode a full `Atom` payload into args using the schema.
    fn parse_atom(
        &self,
        payload: &[u8],
        delegate: &mut dyn ArgsDelegate,
    ) -> Result<(), ArgsParseError>;
}

/// Descriptor pool plus the name of its top-level `Atom` message.
#[derive(Debug)]
pub struct AtomSchema {
    pool: DescriptorPool,
    atom_message_name: String,
}

impl AtomSchema {
    /// Wrap `pool`, resolving `atom_message_name` in it. A missing message is
    /// not an error: the schema simply reports [`AtomLookup::NoSchema`].
    pub fn new(pool: DescriptorPool, atom_message_name: &str) -> Self {
        if pool.find_message(atom_message_name).is_none() {
            tracing::warn!("Atom message {} not found in descriptor pool", atom_message_name);
        }
        Self {
            pool,
            atom_message_name: atom_message_name.to_string(),
        }
    }

    pub fn from_descriptor_set_bytes(
        bytes: &[u8],
        atom_message_name: &str,
    ) -> Result<Self, DescriptorError> {
        let pool = DescriptorPool::from_file_descriptor_set_bytes(bytes)?;
        Ok(Self::new(pool, atom_message_name))
    }

    /// Schema for the atoms we ship descriptors for.
    pub fn builtin() -> Self {
        let mut pool = DescriptorPool::new();
        if let Err(e) = pool.add_file_descriptor_set(&builtin::atoms_descriptor_set()) {
            tracing::warn!("Failed to load built-in atom descriptors: {}", e);
        }
        Self::new(pool, builtin::ATOM_MESSAGE_NAME)
    }

    /// A schema that failed to load entirely.
    pub fn missing() -> Self {
        Self::new(DescriptorPool::new(), builtin::ATOM_MESSAGE_NAME)
    }

    pub fn atom_descriptor(&self) -> Option<&MessageDescriptor> {
        self.pool.find_message(&self.atom_message_name)
    }

    pub fn atom_message_name(&self) -> &str {
        &self.atom_message_name
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn into_pool(self) -> DescriptorPool {
        self.pool
    }
}

impl AtomRegistry for AtomSchema {
    fn atom_field(&self, field_id: u32) -> AtomLookup<'_> {
        match self.atom_descriptor() {
            None => AtomLookup::NoSchema,
            Some(atom) => match atom.field(field_id) {
                Some(field) => AtomLookup::Known(&field.name),
                None => AtomLookup::Unknown,
            },
        }
    }

    fn parse_atom(
        &self,
        payload: &[u8],
        delegate: &mut dyn ArgsDelegate,
    ) -> Result<(), ArgsParseError> {
        ProtoArgsParser::new(&self.pool).parse_message(payload, &self.atom_message_name, delegate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_knows_common_atoms() {
        let schema = AtomSchema::builtin();
        assert!(schema.atom_descriptor().is_some());
        assert_eq!(schema.atom_field(29), AtomLookup::Known("screen_state_changed"));
        assert_eq!(schema.atom_field(30), AtomLookup::Known("battery_level_changed"));
        assert_eq!(schema.atom_field(99_999), AtomLookup::Unknown);
    }

    #[test]
    fn test_missing_schema() {
        let schema = AtomSchema::missing();
        assert!(schema.atom_descriptor().is_none());
        assert_eq!(schema.atom_field(29), AtomLookup::NoSchema);
    }

    #[test]
    fn test_wrong_message_name_is_no_schema() {
        let pool = AtomSchema::builtin().pool;
        let schema = AtomSchema::new(pool, ".android.os.statsd.NotAtom");
        assert_eq!(schema.atom_field(29), AtomLookup::NoSchema);
    }
}

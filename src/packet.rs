//! Trace packet and statsd atom envelope views.
//!
//! We only need a handful of `TracePacket` fields, so rather than decoding the
//! whole packet into generated types we pick those fields straight off the wire.
//! This also keeps atom payloads as untouched byte slices, which matters because
//! the atom union is far larger than anything we could generate code for.

use crate::wire::{self, FieldReader, FieldValue};

/// `TracePacket.timestamp`
pub const TIMESTAMP_FIELD_NUMBER: u32 = 8;
/// `TracePacket.trusted_packet_sequence_id`
pub const TRUSTED_PACKET_SEQUENCE_ID_FIELD_NUMBER: u32 = 10;
/// `TracePacket.sequence_flags`
pub const SEQUENCE_FLAGS_FIELD_NUMBER: u32 = 13;
/// `TracePacket.incremental_state_cleared`
pub const INCREMENTAL_STATE_CLEARED_FIELD_NUMBER: u32 = 41;
/// `SequenceFlags.SEQ_INCREMENTAL_STATE_CLEARED`
pub const SEQ_INCREMENTAL_STATE_CLEARED: u64 = 1;
/// `TracePacket.statsd_atom`
pub const STATSD_ATOM_FIELD_NUMBER: u32 = 84;

/// `StatsdAtom.atom`
pub const ATOM_FIELD_NUMBER: u32 = 1;
/// `StatsdAtom.timestamp_nanos`
pub const TIMESTAMP_NANOS_FIELD_NUMBER: u32 = 2;

/// The parts of a `TracePacket` the importer looks at.
#[derive(Debug, Default, Clone)]
pub struct PacketView<'a> {
    pub timestamp: Option<u64>,
    pub trusted_packet_sequence_id: Option<u32>,
    /// Set by either the legacy bool or the sequence flag.
    pub incremental_state_cleared: bool,
    pub statsd_atom: Option<&'a [u8]>,
    fields: Vec<u32>,
    malformed: bool,
}

impl<'a> PacketView<'a> {
    /// Decode the packet fields we care about. Everything else is only recorded
    /// by id so modules can tell whether their field is present.
    pub fn decode(bytes: &'a [u8]) -> Self {
        let mut view = PacketView::default();
        let mut reader = FieldReader::new(bytes);
        for field in reader.by_ref() {
            if !view.fields.contains(&field.id) {
                view.fields.push(field.id);
            }
            match (field.id, field.value) {
                (TIMESTAMP_FIELD_NUMBER, FieldValue::Varint(ts)) => view.timestamp = Some(ts),
                (TRUSTED_PACKET_SEQUENCE_ID_FIELD_NUMBER, FieldValue::Varint(id)) => {
                    view.trusted_packet_sequence_id = Some(id as u32)
                }
                (SEQUENCE_FLAGS_FIELD_NUMBER, FieldValue::Varint(flags)) => {
                    view.incremental_state_cleared |= (flags & SEQ_INCREMENTAL_STATE_CLEARED) != 0
                }
                (INCREMENTAL_STATE_CLEARED_FIELD_NUMBER, FieldValue::Varint(cleared)) => {
                    view.incremental_state_cleared |= cleared != 0
                }
                (STATSD_ATOM_FIELD_NUMBER, FieldValue::LengthDelimited(bytes)) => {
                    view.statsd_atom = Some(bytes)
                }
                _ => {}
            }
        }
        view.malformed = reader.is_malformed();
        view
    }

    pub fn has_field(&self, field_id: u32) -> bool {
        self.fields.contains(&field_id)
    }

    /// Top-level field ids in the order they first appeared.
    pub fn field_ids(&self) -> &[u32] {
        &self.fields
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

/// A decoded `StatsdAtom` batch: atom payloads plus the optional parallel
/// per-atom timestamps.
#[derive(Debug, Default, Clone)]
pub struct StatsdAtomView<'a> {
    pub atoms: Vec<&'a [u8]>,
    pub timestamp_nanos: Vec<i64>,
    malformed: bool,
}

impl<'a> StatsdAtomView<'a> {
    pub fn decode(bytes: &'a [u8]) -> Self {
        let mut view = StatsdAtomView::default();
        let mut reader = FieldReader::new(bytes);
        for field in reader.by_ref() {
            match (field.id, field.value) {
                (ATOM_FIELD_NUMBER, FieldValue::LengthDelimited(atom)) => view.atoms.push(atom),
                (TIMESTAMP_NANOS_FIELD_NUMBER, FieldValue::Varint(ts)) => {
                    view.timestamp_nanos.push(ts as i64)
                }
                (TIMESTAMP_NANOS_FIELD_NUMBER, FieldValue::LengthDelimited(packed)) => {
                    match wire::read_packed_varints(packed) {
                        Ok(values) => view
                            .timestamp_nanos
                            .extend(values.into_iter().map(|v| v as i64)),
                        Err(_) => {
                            view.malformed = true;
                            break;
                        }
                    }
                }
                _ => {}
            }
        }
        view.malformed |= reader.is_malformed();
        view
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

/// Build a `TracePacket` holding a single atom tagged with its own timestamp.
pub fn encode_singleton_packet(ts: i64, atom: &[u8]) -> Vec<u8> {
    let mut statsd = Vec::with_capacity(atom.len() + 8);
    wire::write_bytes_field(&mut statsd, ATOM_FIELD_NUMBER, atom);

    let mut packet = Vec::with_capacity(statsd.len() + 16);
    wire::write_varint_field(&mut packet, TIMESTAMP_FIELD_NUMBER, ts as u64);
    wire::write_bytes_field(&mut packet, STATSD_ATOM_FIELD_NUMBER, &statsd);
    packet
}

/// Build a `StatsdAtom` batch envelope. Timestamps are written unpacked.
pub fn encode_statsd_atom(atoms: &[&[u8]], timestamp_nanos: &[i64]) -> Vec<u8> {
    let mut out = Vec::new();
    for atom in atoms {
        wire::write_bytes_field(&mut out, ATOM_FIELD_NUMBER, atom);
    }
    for ts in timestamp_nanos {
        wire::write_varint_field(&mut out, TIMESTAMP_NANOS_FIELD_NUMBER, *ts as u64);
    }
    out
}

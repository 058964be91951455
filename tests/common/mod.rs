//! Common test utilities for atomtrace integration tests.
//!
//! Trace packet headers are built with `perfetto_protos`; the `statsd_atom`
//! field is appended on the wire so the tests don't depend on the generated
//! bindings knowing about it.

#![allow(dead_code)]

use perfetto_protos::clock_snapshot::clock_snapshot::Clock;
use perfetto_protos::clock_snapshot::ClockSnapshot;
use perfetto_protos::trace_packet::trace_packet::Data;
use perfetto_protos::trace_packet::TracePacket;
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
};
use protobuf::Message;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use atomtrace::wire::{write_bytes_field, write_varint_field};

pub const STATSD_ATOM_FIELD: u32 = 84;

/// One atom: the union member `id` wrapping `body`.
pub fn atom(id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_bytes_field(&mut out, id, body);
    out
}

/// Message body with varint fields.
pub fn varints(fields: &[(u32, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (id, value) in fields {
        write_varint_field(&mut out, *id, *value);
    }
    out
}

/// `screen_state_changed { state }`
pub fn screen_state(state: u64) -> Vec<u8> {
    atom(29, &varints(&[(1, state)]))
}

pub struct TraceBuilder {
    packets: Vec<Vec<u8>>,
    sequence_id: u32,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self {
            packets: Vec::new(),
            sequence_id: 1,
        }
    }

    fn header(&self, ts: Option<u64>) -> TracePacket {
        let mut packet = TracePacket::new();
        if let Some(ts) = ts {
            packet.set_timestamp(ts);
        }
        packet.set_trusted_packet_sequence_id(self.sequence_id);
        packet
    }

    /// A `StatsdAtom` batch packet.
    pub fn statsd(mut self, ts: Option<u64>, atoms: &[Vec<u8>], timestamps: &[i64]) -> Self {
        let mut batch = Vec::new();
        for a in atoms {
            write_bytes_field(&mut batch, 1, a);
        }
        for t in timestamps {
            write_varint_field(&mut batch, 2, *t as u64);
        }

        let mut bytes = self.header(ts).write_to_bytes().unwrap();
        write_bytes_field(&mut bytes, STATSD_ATOM_FIELD, &batch);
        self.packets.push(bytes);
        self
    }

    /// A packet no importer claims.
    pub fn clock_snapshot(mut self, ts: u64) -> Self {
        let mut clock = Clock::new();
        clock.set_clock_id(6);
        clock.set_timestamp(ts);
        let mut snapshot = ClockSnapshot::new();
        snapshot.clocks.push(clock);

        let mut packet = self.header(Some(ts));
        packet.data = Some(Data::ClockSnapshot(snapshot));
        self.packets.push(packet.write_to_bytes().unwrap());
        self
    }

    /// Serialized `Trace`.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for packet in &self.packets {
            write_bytes_field(&mut out, 1, packet);
        }
        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

fn field(name: &str, number: i32, field_type: Type, type_name: Option<&str>) -> FieldDescriptorProto {
    let mut f = FieldDescriptorProto::new();
    f.set_name(name.to_string());
    f.set_number(number);
    f.set_label(Label::LABEL_OPTIONAL);
    f.set_type(field_type);
    if let Some(type_name) = type_name {
        f.set_type_name(type_name.to_string());
    }
    f
}

/// A schema for `.test.Atom` with one atom, `custom_event = 7`, whose
/// `CustomEvent` has `count` (int64 = 1) and `label` (string = 2).
pub fn custom_descriptor_set() -> Vec<u8> {
    let mut custom = DescriptorProto::new();
    custom.set_name("CustomEvent".to_string());
    custom.field.push(field("count", 1, Type::TYPE_INT64, None));
    custom.field.push(field("label", 2, Type::TYPE_STRING, None));

    let mut atom = DescriptorProto::new();
    atom.set_name("Atom".to_string());
    atom.field.push(field(
        "custom_event",
        7,
        Type::TYPE_MESSAGE,
        Some(".test.CustomEvent"),
    ));

    let mut file = FileDescriptorProto::new();
    file.set_name("test/atoms.proto".to_string());
    file.set_package("test".to_string());
    file.message_type.push(custom);
    file.message_type.push(atom);

    let mut set = FileDescriptorSet::new();
    set.file.push(file);
    set.write_to_bytes().unwrap()
}

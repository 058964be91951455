//! Import of statsd atoms (`TracePacket.statsd_atom`).
//!
//! A `StatsdAtom` packet carries a batch of atoms, each optionally with its own
//! timestamp. Tokenization splits the batch into one packet per atom so every
//! atom is sorted by its own timestamp. Parsing then turns each atom into an
//! instant slice on a single global track, named after the atom, with the atom
//! fields as args.
//!
//! `Atom` is a huge oneof and we deliberately don't generate code for it.
//! Atoms are decoded through the descriptor when the schema knows them, and
//! generically from wire types otherwise (see [`generic`]).

mod builtin;
pub mod generic;
pub mod inserter;
pub mod name_cache;
pub mod schema;

pub use builtin::ATOM_MESSAGE_NAME;
pub use generic::parse_generic_atom;
pub use inserter::SliceArgsInserter;
pub use name_cache::{AtomNameCache, AtomRoute, ResolvedAtom, MISSING_DESCRIPTOR_NAME};
pub use schema::{AtomLookup, AtomRegistry, AtomSchema};

use tracing::{debug, trace};

use crate::importer::{ModuleResult, ProtoImporterModule, TraceContext};
use crate::packet::{self, PacketView, StatsdAtomView, STATSD_ATOM_FIELD_NUMBER};
use crate::sorter::SequenceHandle;
use crate::storage::{Stat, TrackId, NULL_STRING_ID};
use crate::wire::{self, WireType};

pub const DEFAULT_TRACK_NAME: &str = "Statsd Atoms";

/// Atom ids from here up are reserved for vendor atoms. We can never have their
/// descriptors, so they are not counted as unknown.
pub const VENDOR_ATOM_ID_START: u32 = 100_000;

pub struct StatsdModule<R = AtomSchema> {
    registry: R,
    names: AtomNameCache,
    track_name: String,
    track: Option<TrackId>,
}

impl StatsdModule<AtomSchema> {
    /// Module using the built-in atom schema.
    pub fn builtin() -> Self {
        Self::new(AtomSchema::builtin())
    }
}

impl<R: AtomRegistry> StatsdModule<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            names: AtomNameCache::new(),
            track_name: DEFAULT_TRACK_NAME.to_string(),
            track: None,
        }
    }

    pub fn with_track_name(mut self, track_name: &str) -> Self {
        self.track_name = track_name.to_string();
        self
    }

    fn intern_track(&mut self, ctx: &mut TraceContext) -> TrackId {
        if let Some(track) = self.track {
            return track;
        }
        let name = ctx.storage.intern_string(&self.track_name);
        let track = ctx.track_tracker.intern_global_track(&mut ctx.storage, name);
        self.track = Some(track);
        track
    }

    fn parse_atom(&mut self, ctx: &mut TraceContext, ts: i64, payload: &[u8]) {
        // The single set member of the Atom oneof is the first field. Payloads
        // with several members are accepted; only the first one names the atom.
        let member = wire::first_field(payload);
        let atom_field_id = member.map_or(0, |f| f.id);

        let atom = self
            .names
            .resolve(&self.registry, &mut ctx.storage, atom_field_id);
        let track = self.intern_track(ctx);
        let Some(slice) =
            ctx.slice_tracker
                .scoped(&mut ctx.storage, ts, track, NULL_STRING_ID, atom.name, 0)
        else {
            return;
        };

        if atom.route == AtomRoute::Unknown && atom_field_id < VENDOR_ATOM_ID_START {
            ctx.storage.increment_stats(Stat::AtomUnknown);
        }

        let mut inserter = SliceArgsInserter::new(&mut ctx.storage, slice);
        let status = match atom.route {
            AtomRoute::Schema => self.registry.parse_atom(payload, &mut inserter),
            AtomRoute::Unknown | AtomRoute::NoSchema => {
                let body = match member {
                    Some(field) if field.wire_type() == WireType::LengthDelimited => {
                        field.as_bytes()
                    }
                    _ => payload,
                };
                parse_generic_atom(body, &mut inserter)
            }
        };

        if let Err(e) = status {
            debug!("Failed to decode atom {}: {}", atom_field_id, e);
            ctx.storage.increment_stats(Stat::AtomUnknown);
        }
    }
}

impl<R: AtomRegistry> ProtoImporterModule for StatsdModule<R> {
    fn name(&self) -> &'static str {
        "statsd"
    }

    fn registered_fields(&self) -> &'static [u32] {
        &[STATSD_ATOM_FIELD_NUMBER]
    }

    fn tokenize_packet(
        &mut self,
        ctx: &mut TraceContext,
        packet: &PacketView<'_>,
        packet_timestamp: i64,
        sequence: SequenceHandle,
        field_id: u32,
    ) -> ModuleResult {
        if field_id != STATSD_ATOM_FIELD_NUMBER {
            return ModuleResult::Ignored;
        }
        let Some(statsd_atom) = packet.statsd_atom else {
            return ModuleResult::Ignored;
        };

        let batch = StatsdAtomView::decode(statsd_atom);
        if batch.is_malformed() {
            debug!(
                "Malformed statsd atom batch, tokenizing {} atoms",
                batch.atoms.len()
            );
            ctx.storage.increment_stats(Stat::PacketMalformed);
        }

        let mut timestamps = batch.timestamp_nanos.iter();
        for atom in &batch.atoms {
            let atom_timestamp = match timestamps.next() {
                Some(ts) => *ts,
                None => {
                    ctx.storage.increment_stats(Stat::AtomTimestampMissing);
                    packet_timestamp
                }
            };

            let forged = packet::encode_singleton_packet(atom_timestamp, atom);
            ctx.sorter
                .push_trace_packet(atom_timestamp, sequence, forged);
        }
        trace!("Tokenized {} statsd atoms", batch.atoms.len());

        ModuleResult::Handled
    }

    fn parse_packet(
        &mut self,
        ctx: &mut TraceContext,
        packet: &PacketView<'_>,
        ts: i64,
        field_id: u32,
    ) {
        if field_id != STATSD_ATOM_FIELD_NUMBER {
            return;
        }
        let batch = StatsdAtomView::decode(packet.statsd_atom.unwrap_or_default());
        // Tokenization leaves exactly one atom per packet.
        assert_eq!(
            batch.atoms.len(),
            1,
            "statsd packet must hold exactly one atom after tokenization"
        );
        self.parse_atom(ctx, ts, batch.atoms[0]);
    }
}

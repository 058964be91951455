//! One import session: packets in, tables out.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ImportConfig};
use crate::importer::{ModuleResult, ProtoImporterModule, TraceContext};
use crate::packet::PacketView;
use crate::sorter::SequenceHandle;
use crate::statsd::{AtomRegistry, StatsdModule};
use crate::storage::{Stat, TraceStorage};
use crate::trace_reader::{open_trace_reader, TracePacketIterator};

/// Drives the two import passes over every packet of a trace.
///
/// Packets are tokenized as they are pushed and only parsed once
/// [`TraceProcessor::notify_end_of_file`] drains the sorter. A processor holds
/// the state of exactly one trace.
pub struct TraceProcessor {
    ctx: TraceContext,
    modules: Vec<Box<dyn ProtoImporterModule>>,
    field_owners: HashMap<u32, usize>,
    latest_timestamp: i64,
    generations: HashMap<u32, u32>,
    packets_seen: u64,
}

impl Default for TraceProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceProcessor {
    /// A processor with no modules; every packet is ignored until one is registered.
    pub fn new() -> Self {
        Self {
            ctx: TraceContext::new(),
            modules: Vec::new(),
            field_owners: HashMap::new(),
            latest_timestamp: 0,
            generations: HashMap::new(),
            packets_seen: 0,
        }
    }

    /// A processor importing statsd atoms with the schema and track `config` names.
    pub fn from_config(config: &ImportConfig) -> Result<Self, ConfigError> {
        let schema = config.load_schema()?;
        Ok(Self::with_statsd(
            StatsdModule::new(schema).with_track_name(&config.track_name),
        ))
    }

    pub fn with_statsd<R: AtomRegistry + 'static>(module: StatsdModule<R>) -> Self {
        let mut processor = Self::new();
        processor.register_module(Box::new(module));
        processor
    }

    pub fn register_module(&mut self, module: Box<dyn ProtoImporterModule>) {
        let index = self.modules.len();
        for &field_id in module.registered_fields() {
            if let Some(&owner) = self.field_owners.get(&field_id) {
                warn!(
                    "Field {} already handled by {}, not registering {}",
                    field_id,
                    self.modules[owner].name(),
                    module.name()
                );
                continue;
            }
            self.field_owners.insert(field_id, index);
        }
        self.modules.push(module);
    }

    /// Tokenize one serialized `TracePacket`.
    pub fn push_packet(&mut self, bytes: &[u8]) {
        self.packets_seen += 1;
        let packet = PacketView::decode(bytes);
        if packet.is_malformed() {
            debug!("Dropping malformed packet {}", self.packets_seen);
            self.ctx.storage.increment_stats(Stat::PacketMalformed);
            return;
        }

        let sequence_id = packet.trusted_packet_sequence_id.unwrap_or(0);
        let generation = self.generations.entry(sequence_id).or_insert(0);
        if packet.incremental_state_cleared {
            *generation += 1;
            debug!(
                "Sequence {} cleared its incremental state, now generation {}",
                sequence_id, *generation
            );
        }
        let sequence = SequenceHandle {
            sequence_id,
            generation: *generation,
        };

        let timestamp = match packet.timestamp {
            Some(ts) => {
                let ts = ts as i64;
                self.latest_timestamp = self.latest_timestamp.max(ts);
                ts
            }
            None => self.latest_timestamp,
        };

        for &field_id in packet.field_ids() {
            let Some(&owner) = self.field_owners.get(&field_id) else {
                continue;
            };
            let result = self.modules[owner].tokenize_packet(
                &mut self.ctx,
                &packet,
                timestamp,
                sequence,
                field_id,
            );
            if result == ModuleResult::Handled {
                return;
            }
        }
        self.ctx.storage.increment_stats(Stat::PacketIgnored);
    }

    /// Parse every tokenized packet in timestamp order.
    pub fn notify_end_of_file(&mut self) {
        let pending = self.ctx.sorter.len();
        while let Some(sorted) = self.ctx.sorter.extract_next() {
            let packet = PacketView::decode(&sorted.blob);
            let owner = packet
                .field_ids()
                .iter()
                .find_map(|id| self.field_owners.get(id).map(|&owner| (owner, *id)));
            if let Some((owner, field_id)) = owner {
                self.modules[owner].parse_packet(&mut self.ctx, &packet, sorted.ts, field_id);
            }
        }
        info!(
            "Parsed {} sorted packets from {} trace packets, {} slices",
            pending,
            self.packets_seen,
            self.ctx.storage.slices().len()
        );
    }

    /// Import a whole trace from `reader`, including the final parse pass.
    pub fn parse_trace<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for packet in TracePacketIterator::new(reader) {
            let packet = packet.with_context(|| {
                format!("Failed to read trace packet {}", self.packets_seen + 1)
            })?;
            self.push_packet(&packet);
        }
        self.notify_end_of_file();
        Ok(())
    }

    /// Import a trace file (plain or `.gz`).
    pub fn parse_trace_file(&mut self, path: &Path) -> Result<()> {
        let reader = open_trace_reader(path)?;
        self.parse_trace(reader)
            .with_context(|| format!("Failed to import {}", path.display()))
    }

    pub fn storage(&self) -> &TraceStorage {
        &self.ctx.storage
    }

    pub fn into_storage(self) -> TraceStorage {
        self.ctx.storage
    }
}

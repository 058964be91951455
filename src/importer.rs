//! Interface between the trace processor and per-packet-field importers.
//!
//! Import runs in two passes. During tokenization each packet is offered to the
//! module registered for one of its fields; the module may restructure it and
//! push the result into the sorter. Once the sorter has put every packet into
//! global timestamp order, parsing hands each packet back to its module to be
//! turned into tracks, slices and args.

use crate::packet::PacketView;
use crate::sorter::{SequenceHandle, TraceSorter};
use crate::storage::TraceStorage;
use crate::tracker::{SliceTracker, TrackTracker};

/// Outcome of offering a packet to a module during tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleResult {
    /// The module does not want this packet; another module may take it.
    Ignored,
    /// The module consumed the packet.
    Handled,
}

/// Everything importers write to during a session.
#[derive(Debug, Default)]
pub struct TraceContext {
    pub storage: TraceStorage,
    pub sorter: TraceSorter,
    pub track_tracker: TrackTracker,
    pub slice_tracker: SliceTracker,
}

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }
}

pub trait ProtoImporterModule {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// `TracePacket` field ids this module wants to see.
    fn registered_fields(&self) -> &'static [u32];

    /// Pre-sort pass. Timestamps resolved here decide where the packet ends
    /// up in the global order; nothing should be decoded beyond what that needs.
    fn tokenize_packet(
        &mut self,
        ctx: &mut TraceContext,
        packet: &PacketView<'_>,
        packet_timestamp: i64,
        sequence: SequenceHandle,
        field_id: u32,
    ) -> ModuleResult;

    /// Post-sort pass, called with packets in global timestamp order.
    fn parse_packet(
        &mut self,
        ctx: &mut TraceContext,
        packet: &PacketView<'_>,
        ts: i64,
        field_id: u32,
    );
}

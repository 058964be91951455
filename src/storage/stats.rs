//! Import statistics.
//!
//! Counters are identified by name in any output, so the names below are part
//! of the contract with whoever reads the stats table.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected in normal traces.
    Info,
    /// Some data could not be imported as recorded.
    DataLoss,
    /// Input was structurally wrong.
    Error,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::DataLoss => "data_loss",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    AtomTimestampMissing,
    AtomUnknown,
    SliceOutOfOrder,
    PacketMalformed,
    PacketIgnored,
}

impl Stat {
    pub const ALL: [Stat; 5] = [
        Stat::AtomTimestampMissing,
        Stat::AtomUnknown,
        Stat::SliceOutOfOrder,
        Stat::PacketMalformed,
        Stat::PacketIgnored,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stat::AtomTimestampMissing => "atom_timestamp_missing",
            Stat::AtomUnknown => "atom_unknown",
            Stat::SliceOutOfOrder => "slice_out_of_order",
            Stat::PacketMalformed => "packet_malformed",
            Stat::PacketIgnored => "packet_ignored",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Stat::AtomTimestampMissing => Severity::DataLoss,
            Stat::AtomUnknown => Severity::Info,
            Stat::SliceOutOfOrder => Severity::Error,
            Stat::PacketMalformed => Severity::Error,
            Stat::PacketIgnored => Severity::Info,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Stat::AtomTimestampMissing => {
                "A statsd atom had no per-atom timestamp; the packet timestamp was used."
            }
            Stat::AtomUnknown => {
                "A statsd atom could not be decoded with the atom schema. Its args were \
                 decoded generically from the wire types."
            }
            Stat::SliceOutOfOrder => {
                "A slice started before the previous slice on the same track and was dropped."
            }
            Stat::PacketMalformed => "A trace packet could not be fully decoded.",
            Stat::PacketIgnored => "A trace packet had no field any importer handles.",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatEntry {
    pub name: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub value: i64,
}

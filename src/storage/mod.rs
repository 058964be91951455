//! In-memory trace storage.
//!
//! Holds everything an import produces: interned strings, statistics counters
//! and the track, slice and args tables. Importers never keep their own copies
//! of this data, they only hold ids into it.

mod stats;

pub use stats::{Severity, Stat, StatEntry};

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Id of an interned string. Id 0 is always the empty string and doubles as "null".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StringId(pub u32);

pub const NULL_STRING_ID: StringId = StringId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SliceId(pub u32);

/// Deduplicating string store.
#[derive(Debug)]
pub struct StringPool {
    strings: Vec<String>,
    index: HashMap<String, StringId>,
}

impl StringPool {
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(String::new(), NULL_STRING_ID);
        Self {
            strings: vec![String::new()],
            index,
        }
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.index.get(s) {
            return *id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), id);
        id
    }

    pub fn get(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Tagged value of a single argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variadic {
    Integer(i64),
    UnsignedInteger(u64),
    String(StringId),
    Real(f64),
    Pointer(u64),
    Boolean(bool),
    Null,
    /// Raw bytes are not kept, only their length.
    Bytes(usize),
}

#[derive(Debug, Clone)]
pub struct TrackRow {
    pub id: TrackId,
    pub name: StringId,
}

#[derive(Debug, Clone)]
pub struct SliceRow {
    pub id: SliceId,
    pub ts: i64,
    pub dur: i64,
    pub track: TrackId,
    pub category: StringId,
    pub name: StringId,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct ArgRow {
    pub slice: SliceId,
    pub flat_key: StringId,
    pub key: StringId,
    pub value: Variadic,
}

/// Storage for a single import session.
#[derive(Debug, Default)]
pub struct TraceStorage {
    strings: StringPool,
    stats: [i64; Stat::ALL.len()],
    tracks: Vec<TrackRow>,
    slices: Vec<SliceRow>,
    args: Vec<ArgRow>,
}

impl TraceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_string(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    pub fn get_string(&self, id: StringId) -> &str {
        self.strings.get(id).unwrap_or("")
    }

    pub fn increment_stats(&mut self, stat: Stat) {
        self.increment_stats_by(stat, 1);
    }

    pub fn increment_stats_by(&mut self, stat: Stat, count: i64) {
        self.stats[stat.index()] += count;
    }

    pub fn stat(&self, stat: Stat) -> i64 {
        self.stats[stat.index()]
    }

    /// Every counter, including the ones still at zero.
    pub fn stats(&self) -> Vec<StatEntry> {
        Stat::ALL
            .iter()
            .map(|stat| StatEntry {
                name: stat.name(),
                severity: stat.severity(),
                description: stat.description(),
                value: self.stat(*stat),
            })
            .collect()
    }

    pub fn insert_track(&mut self, name: StringId) -> TrackId {
        let id = TrackId(self.tracks.len() as u32);
        self.tracks.push(TrackRow { id, name });
        id
    }

    pub fn insert_slice(&mut self, mut row: SliceRow) -> SliceId {
        let id = SliceId(self.slices.len() as u32);
        row.id = id;
        self.slices.push(row);
        id
    }

    pub fn add_arg(&mut self, slice: SliceId, flat_key: StringId, key: StringId, value: Variadic) {
        self.args.push(ArgRow {
            slice,
            flat_key,
            key,
            value,
        });
    }

    pub fn tracks(&self) -> &[TrackRow] {
        &self.tracks
    }

    pub fn slices(&self) -> &[SliceRow] {
        &self.slices
    }

    pub fn args(&self) -> &[ArgRow] {
        &self.args
    }

    pub fn args_for_slice(&self, slice: SliceId) -> impl Iterator<Item = &ArgRow> {
        self.args.iter().filter(move |arg| arg.slice == slice)
    }

    /// Resolve a stored value into something that no longer needs the string pool.
    pub fn resolve_value(&self, value: Variadic) -> ArgValue {
        match value {
            Variadic::Integer(v) => ArgValue::Int(v),
            Variadic::UnsignedInteger(v) => ArgValue::Uint(v),
            Variadic::String(id) => ArgValue::String(self.get_string(id).to_string()),
            Variadic::Real(v) => ArgValue::Real(v),
            Variadic::Pointer(v) => ArgValue::Pointer(v),
            Variadic::Boolean(v) => ArgValue::Bool(v),
            Variadic::Null => ArgValue::Null,
            Variadic::Bytes(len) => ArgValue::Bytes(len),
        }
    }

    /// Flatten the slice and args tables into self-contained records.
    pub fn export_slices(&self) -> Vec<SliceRecord> {
        let mut args_by_slice: HashMap<SliceId, Vec<ArgRecord>> = HashMap::new();
        for arg in &self.args {
            args_by_slice.entry(arg.slice).or_default().push(ArgRecord {
                flat_key: self.get_string(arg.flat_key).to_string(),
                key: self.get_string(arg.key).to_string(),
                value: self.resolve_value(arg.value),
            });
        }

        self.slices
            .iter()
            .map(|slice| SliceRecord {
                id: slice.id,
                ts: slice.ts,
                dur: slice.dur,
                track: self
                    .tracks
                    .get(slice.track.0 as usize)
                    .map(|t| self.get_string(t.name).to_string())
                    .unwrap_or_default(),
                name: self.get_string(slice.name).to_string(),
                args: args_by_slice.remove(&slice.id).unwrap_or_default(),
            })
            .collect()
    }
}

/// An argument value with strings resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Int(i64),
    Uint(u64),
    String(String),
    Real(f64),
    Pointer(u64),
    Bool(bool),
    Null,
    Bytes(usize),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Uint(v) => write!(f, "{v}"),
            ArgValue::String(s) => write!(f, "{s}"),
            ArgValue::Real(v) => write!(f, "{v}"),
            ArgValue::Pointer(v) => write!(f, "0x{v:x}"),
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Null => write!(f, "NULL"),
            ArgValue::Bytes(len) => write!(f, "<bytes size={len}>"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArgRecord {
    pub flat_key: String,
    pub key: String,
    pub value: ArgValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct SliceRecord {
    pub id: SliceId,
    pub ts: i64,
    pub dur: i64,
    pub track: String,
    pub name: String,
    pub args: Vec<ArgRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedups() {
        let mut storage = TraceStorage::new();
        let a = storage.intern_string("screen_state_changed");
        let b = storage.intern_string("screen_state_changed");
        let c = storage.intern_string("battery_level_changed");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(storage.get_string(a), "screen_state_changed");
        assert_eq!(storage.intern_string(""), NULL_STRING_ID);
    }

    #[test]
    fn test_stats_start_at_zero() {
        let mut storage = TraceStorage::new();
        assert!(storage.stats().iter().all(|s| s.value == 0));
        storage.increment_stats(Stat::AtomUnknown);
        storage.increment_stats_by(Stat::AtomTimestampMissing, 3);
        assert_eq!(storage.stat(Stat::AtomUnknown), 1);
        assert_eq!(storage.stat(Stat::AtomTimestampMissing), 3);

        let unknown = storage
            .stats()
            .into_iter()
            .find(|s| s.name == "atom_unknown")
            .unwrap();
        assert_eq!(unknown.value, 1);
        assert_eq!(unknown.description, Stat::AtomUnknown.description());
    }

    #[test]
    fn test_export_groups_args_by_slice() {
        let mut storage = TraceStorage::new();
        let track_name = storage.intern_string("Statsd Atoms");
        let track = storage.insert_track(track_name);
        let name = storage.intern_string("atom_5");
        let slice = storage.insert_slice(SliceRow {
            id: SliceId(0),
            ts: 10,
            dur: 0,
            track,
            category: NULL_STRING_ID,
            name,
            depth: 0,
        });
        let key = storage.intern_string("field_1");
        storage.add_arg(slice, key, key, Variadic::Integer(-4));
        storage.add_arg(slice, key, key, Variadic::Bytes(12));

        let records = storage.export_slices();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].track, "Statsd Atoms");
        assert_eq!(records[0].args.len(), 2);
        assert_eq!(records[0].args[0].value, ArgValue::Int(-4));
        assert_eq!(records[0].args[1].value.to_string(), "<bytes size=12>");
    }
}

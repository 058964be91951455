//! atomtrace library - import of statsd atoms from Perfetto traces.
//!
//! Statsd atoms arrive in batches inside `TracePacket.statsd_atom`. Each atom is
//! split out, globally sorted by its own timestamp, and recorded as an instant
//! slice on a single "Statsd Atoms" track with the atom's fields as args.
//!
//! # Modules
//!
//! - [`session`] - the import driver ([`TraceProcessor`])
//! - [`statsd`] - atom tokenization, naming and decoding
//! - [`storage`] - the resulting tables and statistics
//! - [`config`] - JSON import configuration
//!
//! # Example
//!
//! ```no_run
//! use atomtrace::{ImportConfig, TraceProcessor};
//! use std::path::Path;
//!
//! let mut tp = TraceProcessor::from_config(&ImportConfig::default())?;
//! tp.parse_trace_file(Path::new("trace.pb"))?;
//! for slice in tp.storage().export_slices() {
//!     println!("{} {}", slice.ts, slice.name);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod descriptors;
pub mod importer;
pub mod packet;
pub mod proto_args;
pub mod session;
pub mod sorter;
pub mod statsd;
pub mod storage;
pub mod trace_reader;
pub mod tracker;
pub mod wire;

pub use config::{ConfigError, ImportConfig};
pub use session::TraceProcessor;
pub use statsd::{AtomSchema, StatsdModule};
pub use storage::{ArgValue, SliceRecord, Stat, TraceStorage};

//! End-to-end import of statsd atoms from trace files.

mod common;

use atomtrace::statsd::MISSING_DESCRIPTOR_NAME;
use atomtrace::{ArgValue, ImportConfig, Stat, TraceProcessor};
use common::{atom, custom_descriptor_set, screen_state, temp_dir, varints, TraceBuilder};
use std::io::Write;

fn import(trace: &TraceBuilder, config: &ImportConfig) -> TraceProcessor {
    let dir = temp_dir();
    let path = trace.write_to(dir.path(), "trace.pb");
    let mut tp = TraceProcessor::from_config(config).expect("Failed to build processor");
    tp.parse_trace_file(&path).expect("Failed to import trace");
    tp
}

#[test]
fn test_atoms_from_several_packets_are_globally_sorted() {
    let trace = TraceBuilder::new()
        .clock_snapshot(10)
        .statsd(Some(1_000), &[screen_state(2), screen_state(1)], &[3_000, 1_000])
        .statsd(Some(2_000), &[atom(30, &varints(&[(1, 87)]))], &[2_000]);
    let tp = import(&trace, &ImportConfig::default());

    let slices = tp.storage().export_slices();
    let summary: Vec<(i64, &str)> = slices.iter().map(|s| (s.ts, s.name.as_str())).collect();
    assert_eq!(
        summary,
        vec![
            (1_000, "screen_state_changed"),
            (2_000, "battery_level_changed"),
            (3_000, "screen_state_changed"),
        ]
    );
    assert!(slices.iter().all(|s| s.dur == 0 && s.track == "Statsd Atoms"));
    assert_eq!(slices[1].args[0].key, "battery_level_changed.battery_level");
    assert_eq!(slices[1].args[0].value, ArgValue::Int(87));

    let storage = tp.storage();
    assert_eq!(storage.tracks().len(), 1);
    assert_eq!(storage.stat(Stat::PacketIgnored), 1);
    assert_eq!(storage.stat(Stat::AtomTimestampMissing), 0);
    assert_eq!(storage.stat(Stat::AtomUnknown), 0);
    assert_eq!(storage.stat(Stat::SliceOutOfOrder), 0);
}

#[test]
fn test_atoms_without_timestamps_take_the_packet_timestamp() {
    let trace = TraceBuilder::new().statsd(
        Some(500),
        &[screen_state(2), screen_state(1), screen_state(2)],
        &[100],
    );
    let tp = import(&trace, &ImportConfig::default());

    let ts: Vec<i64> = tp.storage().slices().iter().map(|s| s.ts).collect();
    assert_eq!(ts, vec![100, 500, 500]);
    assert_eq!(tp.storage().stat(Stat::AtomTimestampMissing), 2);
}

#[test]
fn test_unknown_and_vendor_atoms() {
    let trace = TraceBuilder::new().statsd(
        Some(1),
        &[
            atom(5_000, &varints(&[(7, 42)])),
            atom(100_500, &varints(&[(1, 1)])),
            atom(5_000, &varints(&[(7, 43)])),
        ],
        &[1, 2, 3],
    );
    let tp = import(&trace, &ImportConfig::default());

    let slices = tp.storage().export_slices();
    assert_eq!(slices[0].name, "atom_5000");
    assert_eq!(slices[1].name, "atom_100500");
    assert_eq!(slices[2].name, "atom_5000");
    assert_eq!(slices[0].args[0].key, "field_7");
    assert_eq!(slices[2].args[0].value, ArgValue::Int(43));
    // Vendor atoms are expected to be unknown.
    assert_eq!(tp.storage().stat(Stat::AtomUnknown), 2);
}

#[test]
fn test_many_atoms_share_one_name_and_track() {
    let atoms: Vec<Vec<u8>> = (0..1_000).map(|i| screen_state(i % 3)).collect();
    let timestamps: Vec<i64> = (0..1_000).collect();
    let trace = TraceBuilder::new().statsd(Some(0), &atoms, &timestamps);
    let tp = import(&trace, &ImportConfig::default());

    let storage = tp.storage();
    assert_eq!(storage.slices().len(), 1_000);
    assert_eq!(storage.tracks().len(), 1);
    let name = storage.slices()[0].name;
    assert!(storage.slices().iter().all(|s| s.name == name));
}

#[test]
fn test_gzipped_trace() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let trace = TraceBuilder::new().statsd(Some(1), &[screen_state(2)], &[1]);
    let dir = temp_dir();
    let path = dir.path().join("trace.pb.gz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
    encoder.write_all(&trace.build()).unwrap();
    encoder.finish().unwrap();

    let mut tp = TraceProcessor::from_config(&ImportConfig::default()).unwrap();
    tp.parse_trace_file(&path).unwrap();
    assert_eq!(tp.storage().export_slices()[0].name, "screen_state_changed");
}

#[test]
fn test_custom_descriptor_from_config_file() {
    let dir = temp_dir();
    let descriptor = dir.path().join("atoms.descriptor");
    std::fs::write(&descriptor, custom_descriptor_set()).unwrap();
    let config_path = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        serde_json::json!({
            "atom_message_name": ".test.Atom",
            "track_name": "Custom Atoms",
            "descriptor_path": descriptor,
        })
        .to_string(),
    )
    .unwrap();
    let config = ImportConfig::load(&config_path).unwrap();

    let mut body = varints(&[(1, 12)]);
    atomtrace::wire::write_bytes_field(&mut body, 2, b"hello");
    let trace = TraceBuilder::new().statsd(
        Some(1),
        &[atom(7, &body), screen_state(2)],
        &[1, 2],
    );
    let tp = import(&trace, &config);

    let slices = tp.storage().export_slices();
    assert_eq!(slices[0].name, "custom_event");
    assert_eq!(slices[0].track, "Custom Atoms");
    let args: Vec<(String, String)> = slices[0]
        .args
        .iter()
        .map(|a| (a.key.clone(), a.value.to_string()))
        .collect();
    assert_eq!(
        args,
        vec![
            ("custom_event.count".to_string(), "12".to_string()),
            ("custom_event.label".to_string(), "hello".to_string()),
        ]
    );
    // This schema doesn't know screen_state_changed.
    assert_eq!(slices[1].name, "atom_29");
    assert_eq!(tp.storage().stat(Stat::AtomUnknown), 1);
}

#[test]
fn test_schema_without_atom_message() {
    let dir = temp_dir();
    let descriptor = dir.path().join("atoms.descriptor");
    std::fs::write(&descriptor, custom_descriptor_set()).unwrap();
    let config = ImportConfig {
        atom_message_name: ".test.NoSuchAtom".to_string(),
        descriptor_path: Some(descriptor),
        ..Default::default()
    };

    let trace = TraceBuilder::new().statsd(Some(1), &[screen_state(2), screen_state(1)], &[1, 2]);
    let tp = import(&trace, &config);

    let slices = tp.storage().export_slices();
    assert_eq!(slices.len(), 2);
    assert!(slices.iter().all(|s| s.name == MISSING_DESCRIPTOR_NAME));
    assert_eq!(slices[1].args[0].key, "field_1");
    assert_eq!(slices[1].args[0].value, ArgValue::Int(1));
    assert_eq!(tp.storage().stat(Stat::AtomUnknown), 2);
}

#[test]
fn test_truncated_trace_is_an_error() {
    let mut bytes = TraceBuilder::new()
        .statsd(Some(1), &[screen_state(2)], &[1])
        .build();
    bytes.truncate(bytes.len() - 1);
    let dir = temp_dir();
    let path = dir.path().join("broken.pb");
    std::fs::write(&path, bytes).unwrap();

    let mut tp = TraceProcessor::from_config(&ImportConfig::default()).unwrap();
    let err = tp.parse_trace_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.pb"));
}

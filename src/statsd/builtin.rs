//! Built-in descriptors for a subset of the AOSP statsd atoms.
//!
//! Field numbers and names follow `frameworks/proto_logging/stats/atoms.proto`.
//! Traces using atoms outside this set still import; pass a full descriptor set
//! with `--descriptor` to get them decoded by name.

use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};

pub const ATOM_MESSAGE_NAME: &str = ".android.os.statsd.Atom";

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    let mut f = FieldDescriptorProto::new();
    f.set_name(name.to_string());
    f.set_number(number);
    f.set_label(Label::LABEL_OPTIONAL);
    f.set_type(ty);
    f
}

fn typed_field(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    let mut f = field(name, number, ty);
    f.set_type_name(type_name.to_string());
    f
}

fn repeated(mut f: FieldDescriptorProto) -> FieldDescriptorProto {
    f.set_label(Label::LABEL_REPEATED);
    f
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    let mut m = DescriptorProto::new();
    m.set_name(name.to_string());
    m.field = fields;
    m
}

fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    let mut e = EnumDescriptorProto::new();
    e.set_name(name.to_string());
    for (value_name, number) in values {
        let mut v = EnumValueDescriptorProto::new();
        v.set_name(value_name.to_string());
        v.set_number(*number);
        e.value.push(v);
    }
    e
}

fn file(name: &str, package: &str) -> FileDescriptorProto {
    let mut f = FileDescriptorProto::new();
    f.set_name(name.to_string());
    f.set_package(package.to_string());
    f
}

fn attribution_chain() -> FieldDescriptorProto {
    repeated(typed_field(
        "attribution_node",
        1,
        Type::TYPE_MESSAGE,
        ".android.os.statsd.AttributionNode",
    ))
}

/// (atom id, field name, message type) for every atom in the `Atom` union.
const ATOMS: &[(i32, &str, &str)] = &[
    (2, "ble_scan_state_changed", "BleScanStateChanged"),
    (4, "ble_scan_result_received", "BleScanResultReceived"),
    (9, "screen_brightness_changed", "ScreenBrightnessChanged"),
    (10, "wakelock_state_changed", "WakelockStateChanged"),
    (29, "screen_state_changed", "ScreenStateChanged"),
    (30, "battery_level_changed", "BatteryLevelChanged"),
    (31, "charging_state_changed", "ChargingStateChanged"),
    (32, "plugged_state_changed", "PluggedStateChanged"),
];

pub fn atoms_descriptor_set() -> FileDescriptorSet {
    let mut view_enums = file("frameworks/proto_logging/stats/enums/view/enums.proto", "android.view");
    view_enums.enum_type.push(enumeration(
        "DisplayStateEnum",
        &[
            ("DISPLAY_STATE_UNKNOWN", 0),
            ("DISPLAY_STATE_OFF", 1),
            ("DISPLAY_STATE_ON", 2),
            ("DISPLAY_STATE_DOZE", 3),
            ("DISPLAY_STATE_DOZE_SUSPEND", 4),
            ("DISPLAY_STATE_VR", 5),
            ("DISPLAY_STATE_ON_SUSPEND", 6),
        ],
    ));

    let mut os_enums = file("frameworks/proto_logging/stats/enums/os/enums.proto", "android.os");
    os_enums.enum_type.push(enumeration(
        "BatteryStatusEnum",
        &[
            ("BATTERY_STATUS_INVALID", 0),
            ("BATTERY_STATUS_UNKNOWN", 1),
            ("BATTERY_STATUS_CHARGING", 2),
            ("BATTERY_STATUS_DISCHARGING", 3),
            ("BATTERY_STATUS_NOT_CHARGING", 4),
            ("BATTERY_STATUS_FULL", 5),
        ],
    ));
    os_enums.enum_type.push(enumeration(
        "BatteryPluggedStateEnum",
        &[
            ("BATTERY_PLUGGED_NONE", 0),
            ("BATTERY_PLUGGED_AC", 1),
            ("BATTERY_PLUGGED_USB", 2),
            ("BATTERY_PLUGGED_WIRELESS", 4),
            ("BATTERY_PLUGGED_DOCK", 8),
        ],
    ));
    os_enums.enum_type.push(enumeration(
        "WakeLockLevelEnum",
        &[
            ("PARTIAL_WAKE_LOCK", 1),
            ("SCREEN_DIM_WAKE_LOCK", 6),
            ("SCREEN_BRIGHT_WAKE_LOCK", 10),
            ("FULL_WAKE_LOCK", 26),
            ("PROXIMITY_SCREEN_OFF_WAKE_LOCK", 32),
            ("DOZE_WAKE_LOCK", 64),
            ("DRAW_WAKE_LOCK", 128),
        ],
    ));

    let mut atoms = file("frameworks/proto_logging/stats/atoms.proto", "android.os.statsd");
    atoms.message_type.push(message(
        "AttributionNode",
        vec![
            field("uid", 1, Type::TYPE_INT32),
            field("tag", 2, Type::TYPE_STRING),
        ],
    ));

    let mut ble_scan = message(
        "BleScanStateChanged",
        vec![
            attribution_chain(),
            typed_field("state", 2, Type::TYPE_ENUM, "State"),
            field("is_filtered", 3, Type::TYPE_BOOL),
            field("is_first_match", 4, Type::TYPE_BOOL),
            field("is_opportunistic", 5, Type::TYPE_BOOL),
        ],
    );
    ble_scan
        .enum_type
        .push(enumeration("State", &[("OFF", 0), ("ON", 1), ("RESET", 2)]));
    atoms.message_type.push(ble_scan);

    atoms.message_type.push(message(
        "BleScanResultReceived",
        vec![attribution_chain(), field("num_results", 2, Type::TYPE_INT32)],
    ));
    atoms.message_type.push(message(
        "ScreenBrightnessChanged",
        vec![field("level", 1, Type::TYPE_INT32)],
    ));

    let mut wakelock = message(
        "WakelockStateChanged",
        vec![
            attribution_chain(),
            typed_field("type", 2, Type::TYPE_ENUM, ".android.os.WakeLockLevelEnum"),
            field("tag", 3, Type::TYPE_STRING),
            typed_field("state", 4, Type::TYPE_ENUM, "State"),
        ],
    );
    wakelock.enum_type.push(enumeration(
        "State",
        &[
            ("RELEASE", 0),
            ("ACQUIRE", 1),
            ("CHANGE_RELEASE", 2),
            ("CHANGE_ACQUIRE", 3),
        ],
    ));
    atoms.message_type.push(wakelock);

    atoms.message_type.push(message(
        "ScreenStateChanged",
        vec![typed_field("state", 1, Type::TYPE_ENUM, ".android.view.DisplayStateEnum")],
    ));
    atoms.message_type.push(message(
        "BatteryLevelChanged",
        vec![field("battery_level", 1, Type::TYPE_INT32)],
    ));
    atoms.message_type.push(message(
        "ChargingStateChanged",
        vec![typed_field("state", 1, Type::TYPE_ENUM, ".android.os.BatteryStatusEnum")],
    ));
    atoms.message_type.push(message(
        "PluggedStateChanged",
        vec![typed_field(
            "state",
            1,
            Type::TYPE_ENUM,
            ".android.os.BatteryPluggedStateEnum",
        )],
    ));

    let atom_fields = ATOMS
        .iter()
        .map(|(number, name, type_name)| {
            typed_field(
                name,
                *number,
                Type::TYPE_MESSAGE,
                &format!(".android.os.statsd.{type_name}"),
            )
        })
        .collect();
    atoms.message_type.push(message("Atom", atom_fields));

    let mut set = FileDescriptorSet::new();
    set.file.push(view_enums);
    set.file.push(os_enums);
    set.file.push(atoms);
    set
}

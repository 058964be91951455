//! Best-effort decoding of atoms we have no descriptor for.
//!
//! Without a schema only the wire type of each field is known, so:
//! - double, fixed64 and sfixed64 all show up as `field_N_assuming_double`
//! - float, fixed32 and sfixed32 all show up as `field_N_assuming_float`
//! - varints are reported as int64; sint32/sint64 come out still zig-zag encoded
//! - strings, nested messages and packed arrays only report their length
//!
//! Only top-level fields are visited.

use crate::proto_args::{ArgsDelegate, ArgsParseError, Key};
use crate::wire::{FieldReader, FieldValue};
use tracing::debug;

/// Emit one arg per top-level field of `bytes`.
///
/// Malformed bytes end the scan; fields read before that point are kept and the
/// result is still `Ok`.
pub fn parse_generic_atom(
    bytes: &[u8],
    delegate: &mut dyn ArgsDelegate,
) -> Result<(), ArgsParseError> {
    let mut reader = FieldReader::new(bytes);
    for field in reader.by_ref() {
        match field.value {
            FieldValue::LengthDelimited(value) => {
                delegate.add_bytes(&Key::new(&format!("field_{}", field.id)), value)
            }
            FieldValue::Varint(_) => {
                delegate.add_integer(&Key::new(&format!("field_{}", field.id)), field.as_i64())
            }
            FieldValue::Fixed32(_) => delegate.add_double(
                &Key::new(&format!("field_{}_assuming_float", field.id)),
                field.as_f32() as f64,
            ),
            FieldValue::Fixed64(_) => delegate.add_double(
                &Key::new(&format!("field_{}_assuming_double", field.id)),
                field.as_f64(),
            ),
        }
    }

    if reader.is_malformed() {
        debug!(
            "Unknown atom payload malformed, {} bytes not decoded",
            reader.bytes_left()
        );
    }
    Ok(())
}

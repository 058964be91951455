//! Bridges decoded atom args into the args table of one slice.

use crate::proto_args::{ArgsDelegate, Key};
use crate::storage::{SliceId, TraceStorage, Variadic};

pub struct SliceArgsInserter<'a> {
    storage: &'a mut TraceStorage,
    slice: SliceId,
}

impl<'a> SliceArgsInserter<'a> {
    pub fn new(storage: &'a mut TraceStorage, slice: SliceId) -> Self {
        Self { storage, slice }
    }

    fn add_arg(&mut self, key: &Key, value: Variadic) {
        let flat_key = self.storage.intern_string(&key.flat_key);
        let key = self.storage.intern_string(&key.key);
        self.storage.add_arg(self.slice, flat_key, key, value);
    }
}

impl ArgsDelegate for SliceArgsInserter<'_> {
    fn add_integer(&mut self, key: &Key, value: i64) {
        self.add_arg(key, Variadic::Integer(value));
    }

    fn add_unsigned_integer(&mut self, key: &Key, value: u64) {
        self.add_arg(key, Variadic::UnsignedInteger(value));
    }

    fn add_string(&mut self, key: &Key, value: &str) {
        let value = self.storage.intern_string(value);
        self.add_arg(key, Variadic::String(value));
    }

    fn add_double(&mut self, key: &Key, value: f64) {
        self.add_arg(key, Variadic::Real(value));
    }

    fn add_pointer(&mut self, key: &Key, value: u64) {
        self.add_arg(key, Variadic::Pointer(value));
    }

    fn add_boolean(&mut self, key: &Key, value: bool) {
        self.add_arg(key, Variadic::Boolean(value));
    }

    fn add_bytes(&mut self, key: &Key, value: &[u8]) {
        self.add_arg(key, Variadic::Bytes(value.len()));
    }

    fn add_json(&mut self, _key: &Key, _value: &str) -> bool {
        panic!("Unexpected JSON value when parsing statsd data");
    }

    fn add_null(&mut self, key: &Key) {
        self.add_arg(key, Variadic::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ArgValue;

    fn storage_with_slice() -> (TraceStorage, SliceId) {
        use crate::storage::{SliceRow, TrackId, NULL_STRING_ID};
        let mut storage = TraceStorage::new();
        let slice = storage.insert_slice(SliceRow {
            id: SliceId(0),
            ts: 0,
            dur: 0,
            track: TrackId(0),
            category: NULL_STRING_ID,
            name: NULL_STRING_ID,
            depth: 0,
        });
        (storage, slice)
    }

    #[test]
    fn test_every_value_kind_lands_on_the_slice() {
        let (mut storage, slice) = storage_with_slice();
        {
            let mut inserter = SliceArgsInserter::new(&mut storage, slice);
            let key = Key {
                flat_key: "a.b".to_string(),
                key: "a[1].b".to_string(),
            };
            inserter.add_integer(&key, -1);
            inserter.add_unsigned_integer(&key, 2);
            inserter.add_string(&key, "three");
            inserter.add_double(&key, 4.5);
            inserter.add_pointer(&key, 0xdead);
            inserter.add_boolean(&key, true);
            inserter.add_bytes(&key, &[0; 7]);
            inserter.add_null(&key);
        }

        let args: Vec<_> = storage.args_for_slice(slice).collect();
        assert_eq!(args.len(), 8);
        assert_eq!(storage.get_string(args[0].flat_key), "a.b");
        assert_eq!(storage.get_string(args[0].key), "a[1].b");
        assert_eq!(
            storage.resolve_value(args[2].value),
            ArgValue::String("three".to_string())
        );
        assert_eq!(storage.resolve_value(args[4].value).to_string(), "0xdead");
        assert_eq!(storage.resolve_value(args[6].value), ArgValue::Bytes(7));
        assert_eq!(storage.resolve_value(args[7].value), ArgValue::Null);
    }

    #[test]
    #[should_panic(expected = "Unexpected JSON value")]
    fn test_json_is_fatal() {
        let (mut storage, slice) = storage_with_slice();
        let mut inserter = SliceArgsInserter::new(&mut storage, slice);
        inserter.add_json(&Key::new("payload"), "{}");
    }
}
